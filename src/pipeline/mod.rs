use std::{future::Future, sync::Arc, time::Duration};

use anyhow::{anyhow, Result};
use serde_json::Value;

use crate::{
    crawler::QuoteSource,
    database::{
        table::bitcoin_price::{NewPriceSample, PriceSample},
        PriceRepository,
    },
    error::PipelineError,
    logging,
};

pub use retry::{Backoff, RetryPolicy};
pub use transform::transform;

/// 失敗後的休息策略
pub mod retry;
/// 原始回應轉成報價
pub mod transform;

/// 單輪擷取中的階段
#[derive(Debug, Clone, Copy, PartialEq, Eq, strum::Display, strum::AsRefStr)]
pub enum CycleState {
    Fetching,
    Transforming,
    Persisting,
    Sleeping,
}

/// 單輪擷取的結果
#[derive(Debug, Clone, PartialEq)]
pub enum CycleOutcome {
    /// 成功寫入一筆
    Persisted(PriceSample),
    /// 非 200 或空白回應，直接進入休息
    NoQuote,
    /// 本輪失敗，已記錄日誌
    Failed(PipelineError),
}

impl CycleOutcome {
    pub fn is_success(&self) -> bool {
        matches!(self, CycleOutcome::Persisted(_))
    }
}

/// 擷取迴圈的累計統計
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct PipelineStats {
    pub cycles: u64,
    pub persisted: u64,
    pub no_quote: u64,
    pub failed: u64,
    pub consecutive_failures: u32,
}

impl PipelineStats {
    pub fn record(&mut self, outcome: &CycleOutcome) {
        self.cycles += 1;
        match outcome {
            CycleOutcome::Persisted(_) => {
                self.persisted += 1;
                self.consecutive_failures = 0;
                return;
            }
            CycleOutcome::NoQuote => self.no_quote += 1,
            CycleOutcome::Failed(_) => self.failed += 1,
        }
        self.consecutive_failures = self.consecutive_failures.saturating_add(1);
    }
}

/// 報價擷取流程︰抓取 → 轉換 → 寫入 → 休息，直到收到中斷訊號。
pub struct Pipeline {
    source: Arc<dyn QuoteSource>,
    repo: Arc<dyn PriceRepository>,
    policy: RetryPolicy,
}

impl Pipeline {
    pub fn new(
        source: Arc<dyn QuoteSource>,
        repo: Arc<dyn PriceRepository>,
        policy: RetryPolicy,
    ) -> Self {
        Pipeline {
            source,
            repo,
            policy,
        }
    }

    pub fn policy(&self) -> &RetryPolicy {
        &self.policy
    }

    /// 啟動前建立資料表（若不存在）
    ///
    /// # Errors
    /// 無法建立或確認資料表時回傳錯誤。
    pub async fn prepare(&self) -> Result<()> {
        self.repo.ensure_table().await?;
        logging::info_file_async("資料表建立/確認完成".to_string());
        Ok(())
    }

    /// 抓取一次報價
    pub async fn fetch(&self) -> Result<Option<Value>, PipelineError> {
        self.source.fetch_quote().await
    }

    /// 寫入一筆報價；失敗時 transaction 已經 rollback，這裡只記錄日誌並回傳錯誤給本輪
    pub async fn persist(&self, sample: &NewPriceSample) -> Result<PriceSample, PipelineError> {
        match self.repo.insert(sample).await {
            Ok(saved) => Ok(saved),
            Err(why) => {
                // 沒有 dead-letter，完整記錄樣本以便人工補寫
                logging::error_file_async(format!(
                    "Failed to persist {} because {:?}",
                    serde_json::to_string(sample).unwrap_or_else(|_| format!("{:?}", sample)),
                    why
                ));
                Err(PipelineError::Persistence(format!("{:?}", why)))
            }
        }
    }

    /// 執行一輪︰抓取、轉換、寫入。任何錯誤都只會反映在回傳的結果中
    pub async fn run_cycle(&self) -> CycleOutcome {
        enter(CycleState::Fetching);
        let raw = match self.fetch().await {
            Ok(Some(raw)) if !is_empty_body(&raw) => raw,
            Ok(_) => return CycleOutcome::NoQuote,
            Err(why) => return CycleOutcome::Failed(why),
        };

        enter(CycleState::Transforming);
        let sample = match transform(&raw) {
            Ok(sample) => sample,
            Err(why) => return CycleOutcome::Failed(why),
        };

        enter(CycleState::Persisting);
        match self.persist(&sample).await {
            Ok(saved) => CycleOutcome::Persisted(saved),
            Err(why) => CycleOutcome::Failed(why),
        }
    }

    /// 持續執行直到 `shutdown` 完成。
    ///
    /// 每輪的錯誤都不會中止迴圈；只有在設定了 `escalate_after` 且連續失敗達到次數時
    /// 才會回傳錯誤。
    pub async fn run<F>(&self, shutdown: F) -> Result<PipelineStats>
    where
        F: Future<Output = ()>,
    {
        tokio::pin!(shutdown);
        let mut stats = PipelineStats::default();

        loop {
            let outcome = tokio::select! {
                biased;
                _ = &mut shutdown => {
                    return Ok(stopped(stats));
                }
                outcome = self.run_cycle() => outcome,
            };

            stats.record(&outcome);
            report(&outcome, &stats);

            if self.policy.should_escalate(stats.consecutive_failures) {
                let msg = format!(
                    "Giving up after {} consecutive failed cycles ({:?})",
                    stats.consecutive_failures, stats
                );
                logging::error_file_async(msg.clone());
                return Err(anyhow!(msg));
            }

            let delay = self.next_delay(&outcome, &stats);
            enter(CycleState::Sleeping);
            tokio::select! {
                biased;
                _ = &mut shutdown => {
                    return Ok(stopped(stats));
                }
                _ = tokio::time::sleep(delay) => {}
            }
        }
    }

    fn next_delay(&self, outcome: &CycleOutcome, stats: &PipelineStats) -> Duration {
        if outcome.is_success() {
            self.policy.success_delay()
        } else {
            self.policy.failure_delay(stats.consecutive_failures)
        }
    }
}

fn enter(state: CycleState) {
    logging::debug_file_async(format!("cycle state -> {}", state));
}

/// `null`、空物件都視為沒有內容
fn is_empty_body(raw: &Value) -> bool {
    match raw {
        Value::Null => true,
        Value::Object(map) => map.is_empty(),
        _ => false,
    }
}

fn report(outcome: &CycleOutcome, stats: &PipelineStats) {
    match outcome {
        CycleOutcome::Persisted(saved) => logging::info_file_async(format!(
            "報價已寫入 id:{} {} {}/{} at {}",
            saved.id, saved.valor, saved.criptomoeda, saved.moeda, saved.data
        )),
        CycleOutcome::NoQuote => {
            logging::warn_file_async("No quote this cycle, skipping".to_string())
        }
        CycleOutcome::Failed(why) => logging::error_file_async(format!(
            "Cycle failed ({}) because {}",
            why.kind(),
            why
        )),
    }

    logging::debug_file_async(format!("{:?}", stats));
}

fn stopped(stats: PipelineStats) -> PipelineStats {
    logging::info_file_async(format!(
        "收到中斷訊號，擷取流程結束 {:?}",
        stats
    ));
    stats
}
