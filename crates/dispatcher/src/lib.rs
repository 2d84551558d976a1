//! # Dispatcher
//!
//! 数据落盘模块。
//!
//! 负责：
//! - GPS 轨迹 (GPX) 与传感器日志 (JSON / CSV) 的异步写入
//! - 相机帧限速、排队与编码
//! - 隔离慢 sink，不阻塞串口读线程和相机回调

pub mod encoder;
pub mod error;
pub mod handle;
pub mod metrics;
pub mod pipeline;
pub mod sinks;

pub use contracts::{RecordSink, VideoEncoder, VideoFileInfo};
pub use encoder::ImageSequenceEncoder;
pub use error::{DispatcherError, Result};
pub use handle::{SinkHandle, SinkSender};
pub use metrics::{SinkCounters, SinkStats};
pub use pipeline::{
    EncodedFileInfo, FrameAdmission, FrameEncodingPipeline, FrameRateLimiter, PipelineStats,
    ADMIT_RATIO, PROGRESS_EVERY,
};
pub use sinks::{GpxTrackWriter, SensorLogWriter, SENSOR_CSV_HEADER};
