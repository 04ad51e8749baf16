//! IPC 协议定义
//!
//! 通信方式：Unix Socket 或 stdio + JSONL（每条消息一行 JSON + '\n'）

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::command::CommandSpec;
use crate::types::{CollectionOutcome, CycleReport, OutcomeStatus, Trigger};

/// 错误码：请求 JSON 无法解析
pub const CODE_BAD_REQUEST: i32 = 400;
/// 错误码：未知命令
pub const CODE_UNKNOWN_COMMAND: i32 = 404;
/// 错误码：命令执行失败
pub const CODE_INTERNAL: i32 = 500;

/// 请求类型（Client → Service）
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum Request {
    /// 握手
    Handshake {
        /// 组件名称：info-ctl / dashboard / ...
        component: String,
        /// 组件版本（用于日志和诊断）
        version: String,
    },

    /// 列出可用命令
    ListCommands,

    /// 调用命令
    Call {
        command: String,
        /// 命令参数，缺省为空
        #[serde(default)]
        arguments: serde_json::Value,
    },

    /// 订阅事件
    Subscribe {
        /// 要订阅的事件类型
        events: Vec<EventType>,
    },

    /// 取消订阅
    Unsubscribe {
        /// 要取消的事件类型
        events: Vec<EventType>,
    },

    /// 心跳（保持连接）
    Heartbeat,
}

impl Request {
    pub fn call(command: &str, arguments: serde_json::Value) -> Self {
        Request::Call {
            command: command.to_string(),
            arguments,
        }
    }
}

/// 响应类型（Service → Client）
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum Response {
    /// 成功
    Ok,

    /// 错误
    Error {
        code: i32,
        message: String,
    },

    /// 握手成功
    HandshakeOk {
        /// Service 版本
        service_version: String,
    },

    /// 命令列表
    Commands {
        commands: Vec<CommandSpec>,
    },

    /// 命令结果
    CallResult {
        command: String,
        data: serde_json::Value,
    },
}

/// 推送事件（Service → 订阅者）
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum Push {
    /// 一次采集周期结束
    CollectionCompleted {
        cycle_id: Uuid,
        trigger: Trigger,
        timestamp: DateTime<Utc>,
        results: Vec<CollectionOutcome>,
    },

    /// 某个 Agent 采集失败
    AgentFailed {
        cycle_id: Uuid,
        agent: String,
        error: String,
    },
}

impl Push {
    /// 推送消息的 type 标签（客户端据此区分推送和响应）
    pub const TAGS: &'static [&'static str] = &["CollectionCompleted", "AgentFailed"];

    /// 从周期报告展开推送：一个 CollectionCompleted + 每个失败 Agent 一个 AgentFailed
    pub fn from_report(report: &CycleReport) -> Vec<Push> {
        let mut pushes = vec![Push::CollectionCompleted {
            cycle_id: report.cycle_id,
            trigger: report.trigger,
            timestamp: report.finished_at,
            results: report.results.clone(),
        }];
        for outcome in &report.results {
            if let OutcomeStatus::Error { error } = &outcome.result {
                pushes.push(Push::AgentFailed {
                    cycle_id: report.cycle_id,
                    agent: outcome.agent.clone(),
                    error: error.clone(),
                });
            }
        }
        pushes
    }

    /// 对应的订阅类型
    pub fn event_type(&self) -> EventType {
        match self {
            Push::CollectionCompleted { .. } => EventType::CollectionCompleted,
            Push::AgentFailed { .. } => EventType::AgentFailed,
        }
    }
}

/// 事件类型（用于订阅）
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum EventType {
    CollectionCompleted,
    AgentFailed,
}
