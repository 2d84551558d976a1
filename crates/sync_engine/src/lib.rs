//! # Sync Engine
//!
//! 相机 / 传感器软件同步触发。
//!
//! 负责：
//! - 固定频率 (默认 30Hz) 的触发循环
//! - 每个 tick 并发触发相机与传感器请求，分别计时
//! - 延迟 / 同步误差统计与质量评级
//!
//! ## 使用示例
//!
//! ```ignore
//! use sync_engine::SyncManager;
//!
//! let manager = SyncManager::new(camera, sensor_link, time_base, &blueprint.sync)?;
//! manager.start()?;
//! // ...
//! let report = manager.stop().await;
//! println!("{}", report.quality.sync_quality_score);
//! ```

mod error;
mod manager;
pub mod quality;

// Re-exports
pub use error::{Result, SyncError};
pub use manager::{SyncManager, SyncState};

// Re-export contracts types
pub use contracts::{QualityScore, SyncQualityMetrics, SyncReport, SyncStatistics, SyncTick};
