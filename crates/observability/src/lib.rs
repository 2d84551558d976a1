//! # Observability
//!
//! 录制进程的日志与指标出口。
//!
//! - `tracing` 订阅者：JSON / Pretty / Compact 三种输出，`RUST_LOG` 优先
//! - 可选的按天滚动日志文件 `<log_dir>/SrVsDataset.YYYY-MM-DD.log`
//! - Prometheus 导出：同步 tick、帧队列、记录写入计数
//! - 内存统计：`RunningStats` 与 `SyncMetricsAggregator`，供元数据汇总使用
//!
//! ```ignore
//! observability::init_with_config(ObservabilityConfig {
//!     log_format: LogFormat::Compact,
//!     metrics_port: None,
//!     default_log_level: "debug".into(),
//!     log_dir: Some("logs".into()),
//! })?;
//! observability::record_sync_tick(&tick);
//! ```

pub mod metrics;

use std::net::{Ipv4Addr, SocketAddr};
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use metrics_exporter_prometheus::PrometheusBuilder;
use tracing::Subscriber;
use tracing_appender::rolling::{RollingFileAppender, Rotation};
use tracing_subscriber::{
    fmt, layer::SubscriberExt, registry::LookupSpan, util::SubscriberInitExt, EnvFilter, Layer,
};

pub use crate::metrics::{
    record_frame_dropped, record_frame_encoded, record_frame_enqueued, record_record_dispatched,
    record_sink_queue_depth, record_sync_tick, RunningStats, StatsSummary, SyncMetricsAggregator,
    SyncMetricsSummary,
};

/// 日志文件名前缀
pub const LOG_FILE_PREFIX: &str = "SrVsDataset";

/// Directives appended to the base level so serial polling chatter stays quiet
const QUIET_DIRECTIVES: &[&str] = &["ingestion::reader=info", "devices=info"];

/// 日志输出格式
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum LogFormat {
    /// 一行一个 JSON 对象，便于采集到日志系统
    #[default]
    Json,
    Pretty,
    Compact,
}

/// 初始化参数
#[derive(Debug, Clone)]
pub struct ObservabilityConfig {
    pub log_format: LogFormat,
    /// Prometheus 监听端口，`None` 不启动导出
    pub metrics_port: Option<u16>,
    /// `RUST_LOG` 未设置时使用的级别
    pub default_log_level: String,
    /// 日志文件目录，`None` 只输出到终端
    pub log_dir: Option<PathBuf>,
}

impl Default for ObservabilityConfig {
    fn default() -> Self {
        Self {
            log_format: LogFormat::Json,
            metrics_port: None,
            default_log_level: "info".to_string(),
            log_dir: None,
        }
    }
}

/// JSON 日志，不导出指标
pub fn init() -> Result<()> {
    init_with_config(ObservabilityConfig::default())
}

/// 安装全局 tracing 订阅者，按需启动 Prometheus 导出
///
/// 只能成功调用一次；重复调用返回错误。
pub fn init_with_config(config: ObservabilityConfig) -> Result<()> {
    let filter = build_filter(&config.default_log_level);

    let layer = match config.log_format {
        LogFormat::Json => fmt::layer()
            .json()
            .with_target(true)
            .with_thread_names(true)
            .with_current_span(true)
            .boxed(),
        LogFormat::Pretty => fmt::layer().pretty().with_thread_names(true).boxed(),
        LogFormat::Compact => fmt::layer().compact().with_target(false).boxed(),
    };

    let file = config
        .log_dir
        .as_deref()
        .map(|dir| {
            file_layer(dir).map(|layer| layer.with_filter(build_filter(&config.default_log_level)))
        })
        .transpose()?;

    tracing_subscriber::registry()
        .with(layer.with_filter(filter))
        .with(file)
        .try_init()
        .context("Failed to install tracing subscriber")?;

    if let Some(port) = config.metrics_port {
        install_exporter(port)?;
    }

    tracing::debug!(
        log_format = ?config.log_format,
        metrics_port = ?config.metrics_port,
        log_dir = ?config.log_dir,
        "Observability initialized"
    );
    Ok(())
}

/// 只启动 Prometheus 导出（tracing 已在别处初始化时使用）
pub fn init_metrics_only(port: u16) -> Result<()> {
    install_exporter(port)
}

/// 纯文本日志写入按天滚动的文件，写入不经缓冲，进程异常退出也不丢行
fn file_layer<S>(dir: &Path) -> Result<impl Layer<S> + Send + Sync>
where
    S: Subscriber + for<'a> LookupSpan<'a>,
{
    std::fs::create_dir_all(dir)
        .with_context(|| format!("Failed to create log directory {}", dir.display()))?;
    let appender = RollingFileAppender::builder()
        .rotation(Rotation::DAILY)
        .filename_prefix(LOG_FILE_PREFIX)
        .filename_suffix("log")
        .build(dir)
        .with_context(|| format!("Failed to open log file in {}", dir.display()))?;

    Ok(fmt::layer()
        .with_writer(appender)
        .with_ansi(false)
        .with_target(true)
        .with_thread_names(true))
}

fn build_filter(default_level: &str) -> EnvFilter {
    EnvFilter::try_from_default_env().unwrap_or_else(|_| {
        let mut directives = vec![default_level.to_string()];
        // 显式要求 trace/debug 时不压制
        if !matches!(default_level, "trace" | "debug") {
            directives.extend(QUIET_DIRECTIVES.iter().map(|d| d.to_string()));
        }
        EnvFilter::new(directives.join(","))
    })
}

fn install_exporter(port: u16) -> Result<()> {
    let addr = SocketAddr::from((Ipv4Addr::UNSPECIFIED, port));
    PrometheusBuilder::new()
        .with_http_listener(addr)
        .install()
        .with_context(|| format!("Failed to start Prometheus exporter on {addr}"))?;
    tracing::info!(%addr, "Prometheus metrics endpoint listening");
    Ok(())
}
