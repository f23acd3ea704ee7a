use async_trait::async_trait;
use serde_json::Value;

use crate::error::PipelineError;

/// Coinbase 現貨報價
pub mod coinbase;

/// 報價來源
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait QuoteSource: Send + Sync {
    /// 取得一次報價的原始 JSON。
    ///
    /// HTTP 200 時回傳 `Some(body)`；其他狀態碼只記錄日誌並回傳 `None`，不重試。
    async fn fetch_quote(&self) -> Result<Option<Value>, PipelineError>;
}
