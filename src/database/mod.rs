use std::time::Duration;

use anyhow::{Context, Result};
use async_trait::async_trait;
use sqlx::{
    postgres::{PgConnectOptions, PgPoolOptions},
    PgPool, Postgres, Transaction,
};

use crate::{
    config,
    database::table::bitcoin_price::{NewPriceSample, PriceSample},
};

#[cfg(test)]
pub mod memory;
pub mod table;

/// PostgreSQL 連線池封裝。
///
/// 由呼叫端傳入連線設定建立，不使用全域連線物件；每筆寫入都透過 [`PostgresSQL::tx`]
/// 取得自己的 transaction。
#[derive(Clone)]
pub struct PostgresSQL {
    /// SQLx PostgreSQL 連線池實例。
    pub pool: PgPool,
}

impl PostgresSQL {
    /// 建立 PostgreSQL 連線池。
    ///
    /// 連線是 lazy 建立的，資料庫暫時無法連線時不會在這裡失敗。
    ///
    /// # Errors
    /// 當連線設定不合法（例如 port 超出範圍）時回傳錯誤。
    pub fn new(settings: &config::PostgreSQL) -> Result<PostgresSQL> {
        let options = connect_options(settings)?;
        let db = PgPoolOptions::new()
            .max_lifetime(Some(Duration::from_secs(1800))) // 30 分鐘
            .max_connections(4) // 單一流程依序寫入，不需要太多連線
            .min_connections(0)
            .acquire_timeout(Duration::from_secs(5))
            .idle_timeout(Some(Duration::from_secs(600))) // 10 分鐘
            .connect_lazy_with(options);

        Ok(Self { pool: db })
    }

    /// 取得連線池參考。
    pub fn pool(&self) -> &PgPool {
        &self.pool
    }

    /// 從目前連線池建立一筆 transaction。
    ///
    /// # Errors
    /// 當 `BEGIN` 失敗時回傳錯誤。
    pub async fn tx(&self) -> Result<Transaction<'static, Postgres>> {
        Ok(self.pool().begin().await?)
    }
}

/// 由設定組出連線參數，密碼等欄位不需要自行做 URL 編碼
pub fn connect_options(settings: &config::PostgreSQL) -> Result<PgConnectOptions> {
    let port = u16::try_from(settings.port)
        .with_context(|| format!("POSTGRESQL_PORT {} is out of range", settings.port))?;

    Ok(PgConnectOptions::new()
        .host(&settings.host)
        .port(port)
        .username(&settings.user)
        .password(&settings.password)
        .database(&settings.db)
        .application_name("coin_price_crawler"))
}

/// 報價資料的存取介面，擷取流程與報表都只依賴這個 trait。
#[async_trait]
pub trait PriceRepository: Send + Sync {
    /// 建立資料表（若不存在），重複呼叫不會出錯。
    async fn ensure_table(&self) -> Result<()>;

    /// 在單一 transaction 中寫入一筆報價，失敗時 rollback 並回傳錯誤。
    async fn insert(&self, sample: &NewPriceSample) -> Result<PriceSample>;

    /// 依 id 由新到舊取出全部報價。
    async fn fetch_all(&self) -> Result<Vec<PriceSample>>;
}

#[cfg(test)]
mod tests {
    use super::*;

    fn settings(password: &str, port: i32) -> config::PostgreSQL {
        config::PostgreSQL {
            host: "db".to_string(),
            port,
            user: "u".to_string(),
            password: password.to_string(),
            db: "prices".to_string(),
            table: "bitcoin_precos".to_string(),
        }
    }

    #[test]
    fn test_connect_options() {
        let options = connect_options(&settings("p@ss/w:rd?#", 5433)).unwrap();
        assert_eq!(options.get_host(), "db");
        assert_eq!(options.get_port(), 5433);
        assert_eq!(options.get_username(), "u");
        assert_eq!(options.get_database(), Some("prices"));
        assert_eq!(options.get_application_name(), Some("coin_price_crawler"));
    }

    #[test]
    fn test_connect_options_rejects_bad_port() {
        assert!(connect_options(&settings("p", 70000)).is_err());
        assert!(connect_options(&settings("p", -1)).is_err());
    }
}
