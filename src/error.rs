use thiserror::Error;

/// 擷取流程單輪失敗的原因。
///
/// 所有種類都只會讓該輪被略過，不會中止程序。
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum PipelineError {
    /// 連線失敗、逾時或無法讀取回應
    #[error("network error: {0}")]
    Network(String),

    /// 回應內容缺少欄位或格式錯誤
    #[error("parse error: {0}")]
    Parse(String),

    /// 寫入或 commit 失敗，transaction 已 rollback
    #[error("persistence error: {0}")]
    Persistence(String),
}

impl PipelineError {
    /// 用於日誌與統計的分類名稱
    pub fn kind(&self) -> &'static str {
        match self {
            PipelineError::Network(_) => "network",
            PipelineError::Parse(_) => "parse",
            PipelineError::Persistence(_) => "persistence",
        }
    }
}
