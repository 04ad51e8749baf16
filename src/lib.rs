//! info-collector - 定时多数据源采集服务
//!
//! 周期性运行一组相互独立的采集 Agent，把最新结果保存在内存仓库中，
//! 并通过命令接口暴露最新数据和 Agent 健康状态。
//!
//! # 核心功能
//!
//! - **Agent 契约**: `Agent` trait + `AgentRegistry`
//! - **内存仓库**: 每个 Agent 一份最新快照 + 状态记录 + 有限历史
//! - **采集编排**: 单 Agent 失败隔离（错误 / 超时 / panic）
//! - **定时调度**: 固定间隔触发，支持按需触发
//! - **命令接口**: `collect_all` / `get_latest_data` / `get_agent_status` / ...
//!
//! # Feature Flags
//!
//! - `service`: 常驻服务（Unix Socket / stdio + 事件推送）
//! - `client`: Service Client
//! - `http`: 通用 HTTP JSON 采集 Agent

pub mod agent;
pub mod collector;
pub mod command;
pub mod config;
pub mod error;
pub mod protocol;
pub mod scheduler;
pub mod store;
pub mod types;

#[cfg(feature = "http")]
pub mod sources;

#[cfg(feature = "service")]
pub mod service;

#[cfg(feature = "client")]
pub mod client;

// Re-exports
pub use agent::{Agent, AgentRegistry};
pub use collector::Collector;
pub use command::{command_specs, Command, CommandInterface, CommandSpec};
pub use config::{CollectMode, CollectorConfig};
pub use error::{CollectionError, Error, Result};
pub use scheduler::{Scheduler, SchedulerHandle, SchedulerState};
pub use store::DataStore;
pub use types::*;

// Protocol types (always available)
pub use protocol::{EventType, Push, Request, Response};

#[cfg(feature = "http")]
pub use sources::{build_registry, load_sources, HttpJsonAgent, SourceConfig};

#[cfg(feature = "service")]
pub use service::{cleanup_stale_service, is_service_running, Service, ServiceConfig};

#[cfg(feature = "client")]
pub use client::{connect, ClientConfig, ServiceClient};
