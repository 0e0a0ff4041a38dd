use thiserror::Error;

#[derive(Error, Debug)]
pub enum PlayerError {
    #[error("IO 错误: {0}")]
    IoError(#[from] std::io::Error),

    #[error("无法打开文件: {0}")]
    OpenError(String),

    #[error("无法找到视频流")]
    NoVideoStream,

    #[error("{stream} 流头部解析失败: {reason}")]
    HeaderParse { stream: &'static str, reason: String },

    #[error("配置错误: {0}")]
    ConfigError(String),

    #[error("JSON 错误: {0}")]
    JsonError(#[from] serde_json::Error),

    #[error("Anyhow 错误: {0}")]
    AnyhowError(#[from] anyhow::Error),
}

impl PlayerError {
    pub(crate) fn header(stream: &'static str, reason: impl ToString) -> Self {
        PlayerError::HeaderParse {
            stream,
            reason: reason.to_string(),
        }
    }

    /// 是否为头部阶段的致命错误（此时 on_initialize 尚未触发）
    pub fn is_header_failure(&self) -> bool {
        matches!(self, PlayerError::HeaderParse { .. } | PlayerError::NoVideoStream)
    }
}

pub type Result<T> = std::result::Result<T, PlayerError>;
