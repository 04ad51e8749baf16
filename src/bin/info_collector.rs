//! info-collector - 定时多数据源采集服务
//!
//! 负责：
//! - 加载数据源并注册 Agent
//! - 定时采集 + 按需采集
//! - 通过 Unix Socket 或 stdio 提供命令接口
//! - 推送采集周期事件

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use anyhow::Result;
use clap::Parser;
use info_collector::service::{cleanup_stale_service, is_service_running, Service, ServiceConfig};
use info_collector::{AgentRegistry, CollectMode};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// 使用 stdin/stdout 代替 Unix Socket
    #[arg(long)]
    stdio: bool,

    /// 数据目录（socket、pid、sources.json）
    #[arg(long, env = "INFO_COLLECTOR_DATA_DIR")]
    data_dir: Option<PathBuf>,

    /// 数据源配置文件（默认 <data-dir>/sources.json）
    #[arg(long)]
    sources: Option<PathBuf>,

    /// 定时采集间隔（秒）
    #[arg(long)]
    interval_secs: Option<u64>,

    /// 单 Agent 超时（秒），0 表示不限
    #[arg(long)]
    agent_timeout_secs: Option<u64>,

    /// 启动时不立即采集
    #[arg(long)]
    no_initial_collect: bool,

    /// 并发采集所有 Agent
    #[arg(long)]
    parallel: bool,
}

#[tokio::main]
async fn main() -> Result<()> {
    // 初始化日志（写 stderr，stdio 模式下 stdout 只走协议）
    tracing_subscriber::registry()
        .with(fmt::layer().with_writer(std::io::stderr))
        .with(EnvFilter::from_default_env().add_directive("info_collector=info".parse()?))
        .init();

    tracing::info!("🚀 info-collector v{}", env!("CARGO_PKG_VERSION"));

    let cli = Cli::parse();
    let config = build_config(&cli);

    let registry = load_registry(&cli, &config)?;
    if registry.is_empty() {
        tracing::warn!("⚠️ No agents registered, collection cycles will be empty");
    }

    let service = Arc::new(Service::new(config.clone(), registry)?);

    if cli.stdio {
        service.run_stdio().await?;
    } else {
        // 检查是否已有 Service 运行
        if is_service_running(&config) {
            tracing::error!("❌ Service is already running, exiting");
            std::process::exit(1);
        }

        // 清理残留状态
        if let Err(e) = cleanup_stale_service(&config) {
            tracing::warn!("Failed to cleanup stale state: {}", e);
        }

        service.run().await?;
    }

    tracing::info!("👋 info-collector exiting");
    Ok(())
}

/// 环境变量为底，命令行参数覆盖
fn build_config(cli: &Cli) -> ServiceConfig {
    let mut config = ServiceConfig::default();

    if let Some(ref dir) = cli.data_dir {
        config.data_dir = dir.clone();
    }
    if let Some(secs) = cli.interval_secs.filter(|s| *s > 0) {
        config.collector.interval = Duration::from_secs(secs);
    }
    if let Some(secs) = cli.agent_timeout_secs {
        config.collector.agent_timeout = (secs > 0).then(|| Duration::from_secs(secs));
    }
    if cli.no_initial_collect {
        config.collector.collect_on_start = false;
    }
    if cli.parallel {
        config.collector.mode = CollectMode::Parallel;
    }

    config
}

#[cfg(feature = "http")]
fn load_registry(cli: &Cli, config: &ServiceConfig) -> Result<AgentRegistry> {
    let path = cli.sources.clone().unwrap_or_else(|| config.sources_path());
    if !path.exists() {
        tracing::warn!("Sources file not found: {}", path.display());
        return Ok(AgentRegistry::new());
    }

    let sources = info_collector::load_sources(&path)?;
    Ok(info_collector::build_registry(sources)?)
}

#[cfg(not(feature = "http"))]
fn load_registry(cli: &Cli, _config: &ServiceConfig) -> Result<AgentRegistry> {
    if cli.sources.is_some() {
        tracing::warn!("--sources requires the `http` feature, ignoring");
    }
    Ok(AgentRegistry::new())
}
