//! # SRVS Recorder CLI
//!
//! 命令行接口入口点。
//!
//! 提供：
//! - 配置加载与验证
//! - 单次录制会话的设备接线与生命周期管理
//! - 优雅关闭处理 (Ctrl+C / SIGTERM)

mod cli;
mod commands;
mod error;

use anyhow::Result;
use clap::Parser;
use observability::ObservabilityConfig;
use tracing::info;

use cli::{Cli, Commands};
use commands::{run_info, run_ports, run_recording, run_validate};

#[tokio::main]
async fn main() -> Result<()> {
    // Load .env file if present
    dotenvy::dotenv().ok();

    let cli = Cli::parse();

    observability::init_with_config(ObservabilityConfig {
        log_format: cli.log_format.into(),
        metrics_port: None,
        default_log_level: cli.log_level().to_string(),
        log_dir: cli.log_dir.clone(),
    })?;

    info!(
        version = env!("CARGO_PKG_VERSION"),
        "SRVS recorder starting"
    );

    let result = match &cli.command {
        Commands::Run(args) => run_recording(args).await,
        Commands::Validate(args) => run_validate(args),
        Commands::Info(args) => run_info(args),
        Commands::Ports(args) => run_ports(args),
    };

    if let Err(ref e) = result {
        tracing::error!(error = %e, "Command failed");
    }

    result
}
