//! info-ctl - info-collector 命令行客户端

use std::path::PathBuf;

use anyhow::Result;
use clap::{Parser, Subcommand};
use info_collector::client::{connect, ClientConfig};
use info_collector::EventType;
use serde::Serialize;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// 数据目录（Service socket 所在目录）
    #[arg(long, env = "INFO_COLLECTOR_DATA_DIR")]
    data_dir: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// 触发采集（指定 --agent 时只采集该 Agent）
    Collect {
        #[arg(long)]
        agent: Option<String>,
    },
    /// 查看最新数据
    Data {
        #[arg(long)]
        agent: Option<String>,
    },
    /// 查看 Agent 状态
    Status,
    /// 查看历史采集记录
    History {
        #[arg(long)]
        agent: Option<String>,
        #[arg(long)]
        limit: Option<usize>,
    },
    /// 列出可用命令
    Commands,
    /// 持续打印采集周期事件
    Watch,
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::registry()
        .with(fmt::layer().with_writer(std::io::stderr))
        .with(EnvFilter::from_default_env())
        .init();

    let cli = Cli::parse();

    let mut config = ClientConfig::new("info-ctl");
    if let Some(dir) = cli.data_dir {
        config = config.with_data_dir(dir);
    }
    let mut client = connect(config).await?;

    match cli.command {
        Commands::Collect { agent: Some(agent) } => print_json(&client.collect_agent(&agent).await?)?,
        Commands::Collect { agent: None } => print_json(&client.collect_all().await?)?,
        Commands::Data { agent } => print_json(&client.get_latest_data(agent.as_deref()).await?)?,
        Commands::Status => print_json(&client.get_agent_status().await?)?,
        Commands::History { agent, limit } => print_json(&client.get_history(agent.as_deref(), limit).await?)?,
        Commands::Commands => print_json(&client.list_commands().await?)?,
        Commands::Watch => {
            client
                .subscribe(vec![EventType::CollectionCompleted, EventType::AgentFailed])
                .await?;
            while let Some(push) = client.recv_push().await {
                println!("{}", serde_json::to_string(&push)?);
            }
        }
    }

    Ok(())
}

fn print_json<T: Serialize>(value: &T) -> Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}
