use std::{env, path::PathBuf, str::FromStr, time::Duration};

use anyhow::{anyhow, Context, Result};
use config::{Config as config_config, File as config_file};
use serde::{Deserialize, Serialize};

const CONFIG_PATH: &str = "app.json";

#[derive(Serialize, Deserialize, Default, Debug, Clone)]
pub struct App {
    #[serde(default)]
    pub postgresql: PostgreSQL,
    #[serde(default)]
    pub crawler: Crawler,
    #[serde(default)]
    pub pipeline: Pipeline,
    #[serde(default)]
    pub dashboard: Dashboard,
}

const POSTGRESQL_HOST: &str = "POSTGRESQL_HOST";
const POSTGRESQL_PORT: &str = "POSTGRESQL_PORT";
const POSTGRESQL_USER: &str = "POSTGRESQL_USER";
const POSTGRESQL_PASSWORD: &str = "POSTGRESQL_PASSWORD";
const POSTGRESQL_DB: &str = "POSTGRESQL_DB";
const POSTGRESQL_TABLE: &str = "POSTGRESQL_TABLE";

#[derive(Serialize, Deserialize, Debug, Clone)]
pub struct PostgreSQL {
    #[serde(default)]
    pub host: String,
    #[serde(default = "default_postgresql_port")]
    pub port: i32,
    #[serde(default)]
    pub user: String,
    #[serde(default)]
    pub password: String,
    #[serde(default)]
    pub db: String,
    /// 存放報價的資料表名稱
    #[serde(default = "default_table")]
    pub table: String,
}

impl Default for PostgreSQL {
    fn default() -> Self {
        PostgreSQL {
            host: "localhost".to_string(),
            port: default_postgresql_port(),
            user: String::new(),
            password: String::new(),
            db: String::new(),
            table: default_table(),
        }
    }
}

const CRAWLER_QUOTE_URL: &str = "CRAWLER_QUOTE_URL";
const CRAWLER_CONNECT_TIMEOUT_SECS: &str = "CRAWLER_CONNECT_TIMEOUT_SECS";
const CRAWLER_TIMEOUT_SECS: &str = "CRAWLER_TIMEOUT_SECS";

#[derive(Serialize, Deserialize, Debug, Clone)]
pub struct Crawler {
    /// 報價來源 (Coinbase spot price)
    #[serde(default = "default_quote_url")]
    pub quote_url: String,
    #[serde(default = "default_connect_timeout_secs")]
    pub connect_timeout_secs: u64,
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
}

impl Default for Crawler {
    fn default() -> Self {
        Crawler {
            quote_url: default_quote_url(),
            connect_timeout_secs: default_connect_timeout_secs(),
            timeout_secs: default_timeout_secs(),
        }
    }
}

impl Crawler {
    pub fn connect_timeout(&self) -> Duration {
        Duration::from_secs(self.connect_timeout_secs)
    }

    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }
}

const PIPELINE_INTERVAL_SECS: &str = "PIPELINE_INTERVAL_SECS";
const PIPELINE_BACKOFF: &str = "PIPELINE_BACKOFF";
const PIPELINE_MAX_DELAY_SECS: &str = "PIPELINE_MAX_DELAY_SECS";
const PIPELINE_ESCALATE_AFTER: &str = "PIPELINE_ESCALATE_AFTER";

#[derive(Serialize, Deserialize, Debug, Clone)]
pub struct Pipeline {
    /// 每一輪抓取之間的休息秒數
    #[serde(default = "default_interval_secs")]
    pub interval_secs: u64,
    /// `fixed` 或 `exponential`
    #[serde(default = "default_backoff")]
    pub backoff: String,
    /// exponential 模式下休息時間的上限
    #[serde(default = "default_max_delay_secs")]
    pub max_delay_secs: u64,
    /// 連續失敗幾輪後結束程序，0 表示永不結束
    #[serde(default)]
    pub escalate_after: u32,
}

impl Default for Pipeline {
    fn default() -> Self {
        Pipeline {
            interval_secs: default_interval_secs(),
            backoff: default_backoff(),
            max_delay_secs: default_max_delay_secs(),
            escalate_after: 0,
        }
    }
}

const DASHBOARD_HOST: &str = "DASHBOARD_HOST";
const DASHBOARD_PORT: &str = "DASHBOARD_PORT";

#[derive(Serialize, Deserialize, Debug, Clone)]
pub struct Dashboard {
    #[serde(default = "default_dashboard_host")]
    pub host: String,
    #[serde(default = "default_dashboard_port")]
    pub port: u16,
}

impl Default for Dashboard {
    fn default() -> Self {
        Dashboard {
            host: default_dashboard_host(),
            port: default_dashboard_port(),
        }
    }
}

fn default_postgresql_port() -> i32 {
    5432
}

fn default_table() -> String {
    "bitcoin_precos".to_string()
}

fn default_quote_url() -> String {
    "https://api.coinbase.com/v2/prices/spot".to_string()
}

fn default_connect_timeout_secs() -> u64 {
    8
}

fn default_timeout_secs() -> u64 {
    15
}

fn default_interval_secs() -> u64 {
    15
}

fn default_backoff() -> String {
    "fixed".to_string()
}

fn default_max_delay_secs() -> u64 {
    300
}

fn default_dashboard_host() -> String {
    "0.0.0.0".to_string()
}

fn default_dashboard_port() -> u16 {
    8501
}

impl App {
    /// 讀取 app.json（若存在），再以環境變數覆蓋。
    ///
    /// # Errors
    /// 設定檔格式錯誤，或任何環境變數的值無法解析時回傳錯誤；呼叫端應直接結束程序。
    pub fn get() -> Result<Self> {
        App::get_with(|key| env::var(key).ok())
    }

    /// 同 [`App::get`]，但由 `lookup` 提供環境變數
    pub fn get_with<F>(lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let config_path = config_path();
        let config = if config_path.exists() {
            config_config::builder()
                .add_source(config_file::from(config_path))
                .build()?
                .try_deserialize::<App>()
                .context("Failed to deserialize app.json")?
        } else {
            App::default()
        };

        config.override_with(lookup)
    }

    /// 將來至於 env 的設定值覆蓋掉 json 上的設定值
    fn override_with<F>(mut self, lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(host) = lookup(POSTGRESQL_HOST) {
            self.postgresql.host = host;
        }

        if let Some(port) = lookup(POSTGRESQL_PORT) {
            self.postgresql.port = parse_env(POSTGRESQL_PORT, &port)?;
        }

        if let Some(user) = lookup(POSTGRESQL_USER) {
            self.postgresql.user = user;
        }

        if let Some(password) = lookup(POSTGRESQL_PASSWORD) {
            self.postgresql.password = password;
        }

        if let Some(db) = lookup(POSTGRESQL_DB) {
            self.postgresql.db = db;
        }

        if let Some(table) = lookup(POSTGRESQL_TABLE) {
            self.postgresql.table = table;
        }

        if let Some(url) = lookup(CRAWLER_QUOTE_URL) {
            self.crawler.quote_url = url;
        }

        if let Some(secs) = lookup(CRAWLER_CONNECT_TIMEOUT_SECS) {
            self.crawler.connect_timeout_secs = parse_env(CRAWLER_CONNECT_TIMEOUT_SECS, &secs)?;
        }

        if let Some(secs) = lookup(CRAWLER_TIMEOUT_SECS) {
            self.crawler.timeout_secs = parse_env(CRAWLER_TIMEOUT_SECS, &secs)?;
        }

        if let Some(secs) = lookup(PIPELINE_INTERVAL_SECS) {
            self.pipeline.interval_secs = parse_env(PIPELINE_INTERVAL_SECS, &secs)?;
        }

        if let Some(backoff) = lookup(PIPELINE_BACKOFF) {
            self.pipeline.backoff = backoff;
        }

        if let Some(secs) = lookup(PIPELINE_MAX_DELAY_SECS) {
            self.pipeline.max_delay_secs = parse_env(PIPELINE_MAX_DELAY_SECS, &secs)?;
        }

        if let Some(n) = lookup(PIPELINE_ESCALATE_AFTER) {
            self.pipeline.escalate_after = parse_env(PIPELINE_ESCALATE_AFTER, &n)?;
        }

        if let Some(host) = lookup(DASHBOARD_HOST) {
            self.dashboard.host = host;
        }

        if let Some(port) = lookup(DASHBOARD_PORT) {
            self.dashboard.port = parse_env(DASHBOARD_PORT, &port)?;
        }

        Ok(self)
    }
}

fn parse_env<T: FromStr>(key: &str, val: &str) -> Result<T> {
    T::from_str(val.trim()).map_err(|_| anyhow!("{} has an invalid value: {:?}", key, val))
}

/// 回傳設定檔的路徑
fn config_path() -> PathBuf {
    PathBuf::from(CONFIG_PATH)
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;

    use super::*;

    #[test]
    fn test_defaults() {
        let app = App::default();
        assert_eq!(app.postgresql.port, 5432);
        assert_eq!(app.postgresql.table, "bitcoin_precos");
        assert_eq!(app.crawler.quote_url, "https://api.coinbase.com/v2/prices/spot");
        assert_eq!(app.crawler.timeout(), Duration::from_secs(15));
        assert_eq!(app.pipeline.interval_secs, 15);
        assert_eq!(app.pipeline.backoff, "fixed");
        assert_eq!(app.pipeline.escalate_after, 0);
        assert_eq!(app.dashboard.port, 8501);
    }

    #[test]
    fn test_partial_json_keeps_defaults() {
        let app: App = serde_json::from_str(
            r#"{"postgresql":{"host":"db","user":"u","password":"p","db":"prices"},"pipeline":{"interval_secs":30}}"#,
        )
        .unwrap();
        assert_eq!(app.postgresql.host, "db");
        assert_eq!(app.postgresql.port, 5432);
        assert_eq!(app.postgresql.table, "bitcoin_precos");
        assert_eq!(app.pipeline.interval_secs, 30);
        assert_eq!(app.pipeline.max_delay_secs, 300);
        assert_eq!(app.dashboard.host, "0.0.0.0");
    }

    #[test]
    fn test_parse_env() {
        assert_eq!(parse_env::<u16>(DASHBOARD_PORT, " 8080 ").unwrap(), 8080);
        assert!(parse_env::<u16>(DASHBOARD_PORT, "eighty").is_err());
    }

    fn lookup_from(vars: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let vars: HashMap<String, String> = vars
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |key: &str| vars.get(key).cloned()
    }

    #[test]
    fn test_env_overrides() {
        let app = App::get_with(lookup_from(&[
            (POSTGRESQL_HOST, "db.prod"),
            (POSTGRESQL_USER, "alice"),
            (PIPELINE_INTERVAL_SECS, "30"),
            (DASHBOARD_PORT, "9000"),
        ]))
        .unwrap();
        assert_eq!(app.postgresql.host, "db.prod");
        assert_eq!(app.postgresql.user, "alice");
        assert_eq!(app.pipeline.interval_secs, 30);
        assert_eq!(app.dashboard.port, 9000);
    }

    #[test]
    fn test_invalid_env_value_fails_startup() {
        let result = App::get_with(lookup_from(&[
            (POSTGRESQL_HOST, "db.prod"),
            (POSTGRESQL_USER, "alice"),
            (PIPELINE_INTERVAL_SECS, "fifteen"),
        ]));
        let err = result.unwrap_err();
        assert!(err.to_string().contains(PIPELINE_INTERVAL_SECS));
    }
}
