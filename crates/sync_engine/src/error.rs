//! Sync engine 错误类型

use thiserror::Error;

#[derive(Debug, Error)]
pub enum SyncError {
    /// 触发频率非法
    #[error("invalid sync rate {rate_hz} Hz")]
    InvalidRate { rate_hz: f64 },

    /// 不在 tokio runtime 中
    #[error("sync manager must be started inside a tokio runtime")]
    NoRuntime,
}

pub type Result<T> = std::result::Result<T, SyncError>;
