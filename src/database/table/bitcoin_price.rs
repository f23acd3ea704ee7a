use anyhow::{anyhow, Context, Result};
use async_trait::async_trait;
use chrono::{DateTime, Local};
use rust_decimal::Decimal;
use serde::Serialize;
use sqlx::{Postgres, Transaction};

use crate::{
    database::{PostgresSQL, PriceRepository},
    logging,
};

/// Postgres 識別字長度上限
const MAX_IDENTIFIER_LEN: usize = 63;

/// 一筆已寫入資料庫的報價 (`bitcoin_precos`)。
#[derive(sqlx::FromRow, Serialize, Debug, Clone, PartialEq)]
pub struct PriceSample {
    /// 流水號，由資料庫指派。
    pub id: i64,
    /// 報價。
    pub valor: Decimal,
    /// 幣別，例如 BTC。
    pub criptomoeda: String,
    /// 計價貨幣，例如 USD。
    pub moeda: String,
    /// 觀測時間。
    pub data: DateTime<Local>,
}

/// 尚未寫入的報價，由擷取流程的轉換步驟產生。
#[derive(Serialize, Debug, Clone, PartialEq)]
pub struct NewPriceSample {
    pub valor: Decimal,
    pub criptomoeda: String,
    pub moeda: String,
    pub data: DateTime<Local>,
}

impl NewPriceSample {
    pub fn new(valor: Decimal, criptomoeda: String, moeda: String, data: DateTime<Local>) -> Self {
        NewPriceSample {
            valor,
            criptomoeda,
            moeda,
            data,
        }
    }

    /// 帶入資料庫指派的 id 轉成 [`PriceSample`]
    pub fn with_id(self, id: i64) -> PriceSample {
        PriceSample {
            id,
            valor: self.valor,
            criptomoeda: self.criptomoeda,
            moeda: self.moeda,
            data: self.data,
        }
    }
}

/// 以 PostgreSQL 實作的報價資料表。
#[derive(Clone)]
pub struct BitcoinPriceTable {
    db: PostgresSQL,
    table: String,
}

impl BitcoinPriceTable {
    /// 建立資料表存取物件，`table` 必須是合法的 SQL 識別字（可含 schema）。
    ///
    /// # Errors
    /// 表名不合法時回傳錯誤。
    pub fn new(db: PostgresSQL, table: &str) -> Result<Self> {
        Ok(BitcoinPriceTable {
            db,
            table: validate_table_name(table)?,
        })
    }

    pub fn table(&self) -> &str {
        &self.table
    }

    fn create_sql(&self) -> String {
        format!(
            r#"
CREATE TABLE IF NOT EXISTS {table} (
    id BIGSERIAL PRIMARY KEY,
    valor NUMERIC(20, 8) NOT NULL CHECK (valor > 0),
    criptomoeda VARCHAR(16) NOT NULL,
    moeda VARCHAR(16) NOT NULL,
    data TIMESTAMPTZ NOT NULL DEFAULT now()
);"#,
            table = self.table
        )
    }

    fn insert_sql(&self) -> String {
        format!(
            r#"
INSERT INTO {table}
    (valor, criptomoeda, moeda, data)
VALUES
    ($1, $2, $3, $4)
RETURNING id, valor, criptomoeda, moeda, data;"#,
            table = self.table
        )
    }

    fn select_sql(&self) -> String {
        format!(
            "SELECT id, valor, criptomoeda, moeda, data FROM {table} ORDER BY id DESC;",
            table = self.table
        )
    }

    /// 回傳資料庫實際存下的值，`valor` 可能已被 NUMERIC(20, 8) 捨入
    async fn insert_in(
        &self,
        transaction: &mut Transaction<'static, Postgres>,
        sample: &NewPriceSample,
    ) -> Result<PriceSample> {
        let saved = sqlx::query_as::<_, PriceSample>(&self.insert_sql())
            .bind(sample.valor)
            .bind(&sample.criptomoeda)
            .bind(&sample.moeda)
            .bind(sample.data)
            .fetch_one(&mut **transaction)
            .await?;

        Ok(saved)
    }
}

#[async_trait]
impl PriceRepository for BitcoinPriceTable {
    async fn ensure_table(&self) -> Result<()> {
        sqlx::query(&self.create_sql())
            .execute(self.db.pool())
            .await
            .context(format!("Failed to create table {}", self.table))?;

        Ok(())
    }

    async fn insert(&self, sample: &NewPriceSample) -> Result<PriceSample> {
        let mut transaction = self.db.tx().await?;

        match self.insert_in(&mut transaction, sample).await {
            Ok(saved) => {
                transaction
                    .commit()
                    .await
                    .with_context(|| format!("Failed to commit insert into {}", self.table))?;
                Ok(saved)
            }
            Err(why) => {
                // rollback 失敗時仍回傳原本的寫入錯誤
                if let Err(rollback_err) = transaction.rollback().await {
                    logging::error_file_async(format!(
                        "Failed to rollback insert into {} because {:?}",
                        self.table, rollback_err
                    ));
                }

                Err(anyhow!(
                    "Failed to insert into {} because: {:?}",
                    self.table,
                    why
                ))
            }
        }
    }

    async fn fetch_all(&self) -> Result<Vec<PriceSample>> {
        sqlx::query_as::<_, PriceSample>(&self.select_sql())
            .fetch_all(self.db.pool())
            .await
            .context(format!("Failed to fetch all from {}", self.table))
    }
}

/// 檢查表名，只接受 `[A-Za-z_][A-Za-z0-9_]*`，可用一個 `.` 分隔 schema。
pub fn validate_table_name(name: &str) -> Result<String> {
    let parts: Vec<&str> = name.split('.').collect();
    if parts.len() > 2 {
        return Err(anyhow!("invalid table name {:?}: too many dots", name));
    }

    for part in &parts {
        let mut chars = part.chars();
        let valid_head = chars
            .next()
            .map(|c| c.is_ascii_alphabetic() || c == '_')
            .unwrap_or(false);
        if !valid_head
            || part.len() > MAX_IDENTIFIER_LEN
            || !chars.all(|c| c.is_ascii_alphanumeric() || c == '_')
        {
            return Err(anyhow!("invalid table name {:?}", name));
        }
    }

    Ok(name.to_string())
}
