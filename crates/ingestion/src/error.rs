//! Ingestion 错误类型

use thiserror::Error;

/// Ingestion 错误
#[derive(Debug, Error)]
pub enum IngestionError {
    /// 串口打开失败 (端口不存在 / 被占用)
    #[error("failed to open serial port '{port}': {message}")]
    LinkOpen {
        /// 端口名
        port: String,
        /// 错误消息
        message: String,
    },

    /// 链路未连接
    #[error("link '{link}' is not connected")]
    NotConnected {
        /// 链路名
        link: String,
    },

    /// 串口 I/O 失败 (超时不算错误)
    #[error("serial i/o error on '{port}': {source}")]
    Io {
        /// 端口名
        port: String,
        #[source]
        source: std::io::Error,
    },

    /// 读线程无法启动
    #[error("failed to spawn reader thread for '{link}': {source}")]
    ThreadSpawn {
        /// 链路名
        link: String,
        #[source]
        source: std::io::Error,
    },
}

impl IngestionError {
    pub fn link_open(port: impl Into<String>, message: impl Into<String>) -> Self {
        Self::LinkOpen {
            port: port.into(),
            message: message.into(),
        }
    }

    pub fn not_connected(link: impl Into<String>) -> Self {
        Self::NotConnected { link: link.into() }
    }

    pub fn io(port: impl Into<String>, source: std::io::Error) -> Self {
        Self::Io {
            port: port.into(),
            source,
        }
    }
}

impl From<IngestionError> for contracts::ContractError {
    fn from(err: IngestionError) -> Self {
        match err {
            IngestionError::NotConnected { link } => Self::not_connected(link),
            IngestionError::Io { port, source } => Self::device_command(port, source.to_string()),
            other => Self::Other(other.to_string()),
        }
    }
}

/// Ingestion Result 类型别名
pub type Result<T> = std::result::Result<T, IngestionError>;
