//! Session 错误类型

use std::path::PathBuf;

use thiserror::Error;

#[derive(Debug, Error)]
pub enum SessionError {
    /// 已在录制中
    #[error("a recording session is already active")]
    AlreadyRecording,

    /// 未在录制
    #[error("no recording session is active")]
    NotRecording,

    /// 目录或文件创建失败
    #[error("storage error at {path:?}: {source}")]
    Storage {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// 视频编码无法启动，录制未开始
    #[error("video recording could not start: {0}")]
    VideoStart(#[source] dispatcher::DispatcherError),

    /// 元数据写入失败
    #[error("failed to write metadata {path:?}: {message}")]
    Metadata { path: PathBuf, message: String },

    #[error("sync error: {0}")]
    Sync(#[from] sync_engine::SyncError),

    #[error("dispatcher error: {0}")]
    Dispatcher(#[from] dispatcher::DispatcherError),
}

impl SessionError {
    pub fn storage(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self::Storage {
            path: path.into(),
            source,
        }
    }

    pub fn metadata(path: impl Into<PathBuf>, message: impl Into<String>) -> Self {
        Self::Metadata {
            path: path.into(),
            message: message.into(),
        }
    }
}

pub type Result<T> = std::result::Result<T, SessionError>;
