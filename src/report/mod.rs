use chrono::{DateTime, Local};
use rust_decimal::Decimal;
use serde::Serialize;

use crate::{
    database::{table::bitcoin_price::PriceSample, PriceRepository},
    logging,
};

/// 報表頁面的 HTML 輸出
pub mod html;

/// 三項統計值︰最新價、最高價、最低價
#[derive(Serialize, Debug, Clone, PartialEq)]
pub struct Summary {
    pub latest: Decimal,
    pub max: Decimal,
    pub min: Decimal,
    pub samples: usize,
    pub criptomoeda: String,
    pub moeda: String,
    pub first_at: DateTime<Local>,
    pub last_at: DateTime<Local>,
}

/// 一次讀取資料表後整理出的報表
#[derive(Debug, Clone, PartialEq)]
pub struct Report {
    /// 依 id 由新到舊，直接用於表格
    pub recent: Vec<PriceSample>,
    /// 依時間由舊到新，用於折線圖
    pub series: Vec<PriceSample>,
    pub summary: Summary,
}

impl Report {
    /// 以 `ORDER BY id DESC` 讀出的資料建立報表，沒有資料時回傳 `None`
    pub fn from_rows(recent: Vec<PriceSample>) -> Option<Report> {
        let mut series = recent.clone();
        // 時間相同時以 id 決定先後
        series.sort_by(|a, b| a.data.cmp(&b.data).then(a.id.cmp(&b.id)));

        let first = series.first()?;
        let last = series.last()?;
        let max = series.iter().map(|s| s.valor).max()?;
        let min = series.iter().map(|s| s.valor).min()?;

        let summary = Summary {
            latest: last.valor,
            max,
            min,
            samples: series.len(),
            criptomoeda: last.criptomoeda.clone(),
            moeda: last.moeda.clone(),
            first_at: first.data,
            last_at: last.data,
        };

        Some(Report {
            recent,
            series,
            summary,
        })
    }
}

/// 報表頁面的三種狀態
#[derive(Debug, Clone, PartialEq)]
pub enum ReportView {
    Data(Report),
    /// 資料表是空的
    Empty,
    /// 讀取失敗，附上錯誤訊息顯示給使用者
    Unavailable(String),
}

/// 讀取全部報價並整理成報表；讀取失敗不會回傳錯誤，而是轉成 [`ReportView::Unavailable`]
pub async fn load(repo: &dyn PriceRepository) -> ReportView {
    match repo.fetch_all().await {
        Ok(rows) => match Report::from_rows(rows) {
            Some(report) => ReportView::Data(report),
            None => ReportView::Empty,
        },
        Err(why) => {
            logging::error_file_async(format!("Failed to load report because {:?}", why));
            ReportView::Unavailable(format!("{:#}", why))
        }
    }
}

#[cfg(test)]
mod tests {
    use chrono::Duration;
    use rust_decimal_macros::dec;

    use crate::database::{
        memory::MemoryRepository,
        table::bitcoin_price::NewPriceSample,
    };

    use super::*;

    fn sample(id: i64, valor: Decimal, data: DateTime<Local>) -> PriceSample {
        NewPriceSample::new(valor, "BTC".to_string(), "USD".to_string(), data).with_id(id)
    }

    /// 依插入順序建立，回傳 `ORDER BY id DESC` 的結果
    fn rows_desc(values: &[Decimal]) -> Vec<PriceSample> {
        let start = Local::now() - Duration::minutes(10);
        let mut rows: Vec<PriceSample> = values
            .iter()
            .enumerate()
            .map(|(i, v)| sample(i as i64 + 1, *v, start + Duration::seconds(15 * i as i64)))
            .collect();
        rows.reverse();
        rows
    }

    #[test]
    fn test_summary_of_three_rows() {
        let report = Report::from_rows(rows_desc(&[dec!(10), dec!(30), dec!(20)])).unwrap();

        assert_eq!(report.summary.max, dec!(30));
        assert_eq!(report.summary.min, dec!(10));
        assert_eq!(report.summary.latest, dec!(20));
        assert_eq!(report.summary.samples, 3);
        assert_eq!(report.recent[0].id, 3);
        assert_eq!(
            report.series.iter().map(|s| s.id).collect::<Vec<_>>(),
            vec![1, 2, 3]
        );
    }

    #[test]
    fn test_series_sorted_by_time_not_id() {
        let now = Local::now();
        // id 較大但觀測時間較早
        let rows = vec![
            sample(2, dec!(5), now - Duration::seconds(30)),
            sample(1, dec!(7), now),
        ];
        let report = Report::from_rows(rows).unwrap();
        assert_eq!(report.summary.latest, dec!(7));
        assert_eq!(report.series[0].id, 2);
    }

    #[test]
    fn test_equal_timestamps_use_id() {
        let now = Local::now();
        let rows = vec![sample(2, dec!(9), now), sample(1, dec!(8), now)];
        let report = Report::from_rows(rows).unwrap();
        assert_eq!(report.summary.latest, dec!(9));
    }

    #[test]
    fn test_empty_rows() {
        assert!(Report::from_rows(vec![]).is_none());
    }

    #[tokio::test]
    async fn test_load_states() {
        let repo = MemoryRepository::new();
        assert_eq!(load(&repo).await, ReportView::Empty);

        repo.insert(&NewPriceSample::new(
            dec!(10),
            "BTC".to_string(),
            "USD".to_string(),
            Local::now(),
        ))
        .await
        .unwrap();
        assert!(matches!(load(&repo).await, ReportView::Data(_)));

        repo.set_fail_fetch(true);
        assert_eq!(
            load(&repo).await,
            ReportView::Unavailable("connection refused".to_string())
        );
    }

    #[tokio::test]
    async fn test_load_reports_latest_inserted() {
        let repo = MemoryRepository::new();
        for v in [dec!(10), dec!(30), dec!(20)] {
            repo.insert(&NewPriceSample::new(
                v,
                "BTC".to_string(),
                "USD".to_string(),
                Local::now(),
            ))
            .await
            .unwrap();
        }

        match load(&repo).await {
            ReportView::Data(report) => {
                assert_eq!(report.summary.max, dec!(30));
                assert_eq!(report.summary.min, dec!(10));
                assert_eq!(report.summary.latest, dec!(20));
            }
            other => panic!("unexpected view {:?}", other),
        }
    }
}
