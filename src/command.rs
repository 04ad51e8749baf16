//! Command Interface - 工具风格的请求/响应入口
//!
//! 与传输无关：Unix Socket、stdio 或进程内调用都走 `CommandInterface::dispatch`。
//! 唯一的校验失败是未知命令名；参数形状宽松，缺失或类型不对的可选参数按缺省处理。

use std::sync::Arc;

use serde::{Deserialize, Serialize};
use serde_json::{json, Value};

use crate::collector::Collector;
use crate::error::{Error, Result};
use crate::store::DataStore;

/// 历史查询默认条数
pub const DEFAULT_HISTORY_QUERY_LIMIT: usize = 10;

pub const COLLECT_ALL: &str = "collect_all";
pub const COLLECT_AGENT: &str = "collect_agent";
pub const GET_LATEST_DATA: &str = "get_latest_data";
pub const GET_AGENT_STATUS: &str = "get_agent_status";
pub const GET_HISTORY: &str = "get_history";

/// 已解析的命令
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Command {
    /// 触发全量采集
    CollectAll,
    /// 只采集一个 Agent
    CollectAgent { agent: Option<String> },
    /// 最新数据，`agent` 为空时返回全部
    GetLatestData { agent: Option<String> },
    /// Agent 状态列表
    GetAgentStatus,
    /// 历史采集记录
    GetHistory { agent: Option<String>, limit: usize },
}

impl Command {
    /// 按名称解析命令
    pub fn parse(name: &str, arguments: &Value) -> Result<Self> {
        match name {
            COLLECT_ALL => Ok(Command::CollectAll),
            COLLECT_AGENT => Ok(Command::CollectAgent {
                agent: string_arg(arguments, "agent"),
            }),
            GET_LATEST_DATA => Ok(Command::GetLatestData {
                agent: string_arg(arguments, "agent"),
            }),
            GET_AGENT_STATUS => Ok(Command::GetAgentStatus),
            GET_HISTORY => Ok(Command::GetHistory {
                agent: string_arg(arguments, "agent"),
                limit: arguments
                    .get("limit")
                    .and_then(Value::as_u64)
                    .map(|l| l as usize)
                    .unwrap_or(DEFAULT_HISTORY_QUERY_LIMIT),
            }),
            other => Err(Error::UnknownCommand(other.to_string())),
        }
    }

    pub fn name(&self) -> &'static str {
        match self {
            Command::CollectAll => COLLECT_ALL,
            Command::CollectAgent { .. } => COLLECT_AGENT,
            Command::GetLatestData { .. } => GET_LATEST_DATA,
            Command::GetAgentStatus => GET_AGENT_STATUS,
            Command::GetHistory { .. } => GET_HISTORY,
        }
    }
}

/// 非空字符串参数；其他形状一律视为缺省
fn string_arg(arguments: &Value, key: &str) -> Option<String> {
    arguments
        .get(key)
        .and_then(Value::as_str)
        .filter(|s| !s.is_empty())
        .map(str::to_string)
}

/// 命令描述（名称、说明、输入 schema）
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CommandSpec {
    pub name: String,
    pub description: String,
    pub input_schema: Value,
}

/// 所有可用命令
pub fn command_specs() -> Vec<CommandSpec> {
    let spec = |name: &str, description: &str, input_schema: Value| CommandSpec {
        name: name.to_string(),
        description: description.to_string(),
        input_schema,
    };

    let agent_property = json!({
        "type": "string",
        "description": "Optional: specific agent name",
    });

    vec![
        spec(
            COLLECT_ALL,
            "Trigger all agents to collect data",
            json!({"type": "object", "properties": {}}),
        ),
        spec(
            COLLECT_AGENT,
            "Trigger a single agent to collect data",
            json!({
                "type": "object",
                "properties": {"agent": {"type": "string", "description": "Agent name"}},
            }),
        ),
        spec(
            GET_LATEST_DATA,
            "Get the latest collected data from all agents",
            json!({"type": "object", "properties": {"agent": agent_property}}),
        ),
        spec(
            GET_AGENT_STATUS,
            "Get status of all agents",
            json!({"type": "object", "properties": {}}),
        ),
        spec(
            GET_HISTORY,
            "Get recent collection history",
            json!({
                "type": "object",
                "properties": {
                    "agent": agent_property,
                    "limit": {"type": "integer", "minimum": 1, "default": DEFAULT_HISTORY_QUERY_LIMIT},
                },
            }),
        ),
    ]
}

/// 命令分发器
pub struct CommandInterface {
    collector: Arc<Collector>,
    store: Arc<DataStore>,
}

impl CommandInterface {
    pub fn new(collector: Arc<Collector>) -> Self {
        let store = collector.store().clone();
        Self { collector, store }
    }

    /// 按名称分发，返回可序列化的结果
    pub async fn dispatch(&self, name: &str, arguments: &Value) -> Result<Value> {
        let command = Command::parse(name, arguments)?;
        self.execute(command).await
    }

    /// 执行已解析的命令
    pub async fn execute(&self, command: Command) -> Result<Value> {
        tracing::debug!("⚙️ Executing command: {}", command.name());

        let value = match command {
            Command::CollectAll => serde_json::to_value(self.collector.collect_all().await)?,
            Command::CollectAgent { agent } => {
                let outcome = match agent {
                    Some(name) => self.collector.collect_agent(&name).await,
                    None => None,
                };
                serde_json::to_value(outcome.into_iter().collect::<Vec<_>>())?
            }
            Command::GetLatestData { agent: Some(name) } => {
                serde_json::to_value(self.store.get_data_by_agent(&name))?
            }
            Command::GetLatestData { agent: None } => {
                // 按注册顺序输出 key
                let mut data = serde_json::Map::new();
                for (name, snapshot) in self.store.get_all_data() {
                    data.insert(name, serde_json::to_value(snapshot)?);
                }
                Value::Object(data)
            }
            Command::GetAgentStatus => serde_json::to_value(self.store.list_status())?,
            Command::GetHistory { agent, limit } => {
                serde_json::to_value(self.store.history(agent.as_deref(), limit))?
            }
        };

        Ok(value)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_known_commands() {
        assert_eq!(Command::parse("collect_all", &json!({})).unwrap(), Command::CollectAll);
        assert_eq!(
            Command::parse("get_agent_status", &Value::Null).unwrap(),
            Command::GetAgentStatus
        );
        assert_eq!(
            Command::parse("get_latest_data", &json!({"agent": "News"})).unwrap(),
            Command::GetLatestData {
                agent: Some("News".into())
            }
        );
    }

    #[test]
    fn test_parse_permissive_agent_param() {
        for args in [json!({}), Value::Null, json!({"agent": 42}), json!({"agent": ""})] {
            assert_eq!(
                Command::parse("get_latest_data", &args).unwrap(),
                Command::GetLatestData { agent: None }
            );
        }
    }

    #[test]
    fn test_parse_history_limit() {
        assert_eq!(
            Command::parse("get_history", &json!({})).unwrap(),
            Command::GetHistory {
                agent: None,
                limit: DEFAULT_HISTORY_QUERY_LIMIT
            }
        );
        assert_eq!(
            Command::parse("get_history", &json!({"agent": "News", "limit": 3})).unwrap(),
            Command::GetHistory {
                agent: Some("News".into()),
                limit: 3
            }
        );
    }

    #[test]
    fn test_parse_unknown_command() {
        let err = Command::parse("delete_everything", &json!({})).unwrap_err();
        assert!(matches!(err, Error::UnknownCommand(ref name) if name == "delete_everything"));
    }

    #[test]
    fn test_command_specs_cover_all_commands() {
        let names: Vec<String> = command_specs().into_iter().map(|s| s.name).collect();
        for name in [COLLECT_ALL, COLLECT_AGENT, GET_LATEST_DATA, GET_AGENT_STATUS, GET_HISTORY] {
            assert!(names.iter().any(|n| n == name), "missing {}", name);
            assert!(Command::parse(name, &json!({})).is_ok());
        }
    }
}
