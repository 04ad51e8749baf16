//! 错误类型定义

use std::time::Duration;

use thiserror::Error;

/// 库错误类型
#[derive(Error, Debug)]
pub enum Error {
    /// IO 错误
    #[error("IO 错误: {0}")]
    Io(#[from] std::io::Error),

    /// 序列化错误
    #[error("序列化错误: {0}")]
    Serialization(#[from] serde_json::Error),

    /// 配置错误
    #[error("配置错误: {0}")]
    Config(String),

    /// 连接错误
    #[error("连接错误: {0}")]
    Connection(String),

    /// 未知命令（Command Interface 唯一的校验失败）
    #[error("Unknown command: {0}")]
    UnknownCommand(String),

    /// Agent 名称重复
    #[error("Agent 已注册: {0}")]
    DuplicateAgent(String),

    /// 其他错误
    #[error("{0}")]
    Other(#[from] anyhow::Error),
}

/// Result 类型别名
pub type Result<T> = std::result::Result<T, Error>;

/// 单个 Agent 采集失败
///
/// 所有数据源特定的失败（网络、解析、限流……）都在 Agent 边界归一成这个类型，
/// 由 Collector 捕获并记录到 AgentRecord，永远不会传给 `collect_all` 的调用方。
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum CollectionError {
    #[error("network error: {0}")]
    Network(String),

    #[error("parse error: {0}")]
    Parse(String),

    #[error("rate limited")]
    RateLimited,

    #[error("timed out after {}s", .0.as_secs_f64())]
    Timeout(Duration),

    /// 采集任务 panic 或被取消
    #[error("collection aborted: {0}")]
    Aborted(String),

    #[error("{0}")]
    Other(String),
}

impl CollectionError {
    pub fn network(msg: impl Into<String>) -> Self {
        Self::Network(msg.into())
    }

    pub fn parse(msg: impl Into<String>) -> Self {
        Self::Parse(msg.into())
    }

    pub fn other(msg: impl Into<String>) -> Self {
        Self::Other(msg.into())
    }
}
