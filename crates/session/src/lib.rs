//! # Session
//!
//! 一次录制会话的协调：
//! - 按环境标签创建目录 (`root/road/weather/time/side`)
//! - 打开视频、GPS 轨迹、传感器日志写入器并接上设备事件
//! - 同步模式下驱动 `SyncManager`
//! - 所有写入器关闭后写出元数据 JSON
//!
//! ## 使用示例
//!
//! ```ignore
//! let recorder = SessionRecorder::new(blueprint, time_base, camera, gps, sensor)?;
//! let session = recorder.start().await?;
//! // ...
//! let done = recorder.stop().await?;
//! println!("{}", done.session.paths.metadata.display());
//! ```

pub mod error;
pub mod layout;
pub mod metadata;
mod recorder;

pub use error::{Result, SessionError};
pub use layout::{file_name, SessionPaths};
pub use metadata::{build_metadata, read_metadata, synchronization_info, write_metadata};
pub use recorder::{CompletedSession, EncoderFactory, RecordingSession, SessionRecorder};
