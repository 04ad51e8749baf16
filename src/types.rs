//! 数据类型定义

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use std::sync::Arc;
use uuid::Uuid;

/// 采集到的单条数据（不透明的结构化记录，核心不解析内容）
pub type CollectedItem = serde_json::Map<String, serde_json::Value>;

/// 某个 Agent 最近一次成功采集的完整数据（按到达顺序）
pub type DataSnapshot = Vec<CollectedItem>;

/// Agent 状态
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum AgentStatus {
    Idle,
    Collecting,
    Success,
    Error,
}

impl FromStr for AgentStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "idle" => Ok(AgentStatus::Idle),
            "collecting" => Ok(AgentStatus::Collecting),
            "success" => Ok(AgentStatus::Success),
            "error" => Ok(AgentStatus::Error),
            _ => Err(format!("Invalid agent status: {}", s)),
        }
    }
}

impl fmt::Display for AgentStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AgentStatus::Idle => write!(f, "Idle"),
            AgentStatus::Collecting => write!(f, "Collecting"),
            AgentStatus::Success => write!(f, "Success"),
            AgentStatus::Error => write!(f, "Error"),
        }
    }
}

/// Agent 记录（每个注册的 Agent 一条，进程生命周期内不销毁）
#[derive(Debug, Clone, PartialEq)]
pub struct AgentRecord {
    pub name: String,
    pub status: AgentStatus,
    /// 最近一次完成的采集时间（成功或失败）
    pub last_collection_time: Option<DateTime<Utc>>,
    /// 最近一次成功采集的条数，失败时不变
    pub last_item_count: usize,
    /// 最近一次失败信息，成功后清除
    pub last_error: Option<String>,
}

impl AgentRecord {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            status: AgentStatus::Idle,
            last_collection_time: None,
            last_item_count: 0,
            last_error: None,
        }
    }

    pub fn summary(&self) -> AgentStatusSummary {
        AgentStatusSummary {
            name: self.name.clone(),
            status: self.status,
            last_collection: self.last_collection_time,
            items_collected: self.last_item_count,
            last_error: self.last_error.clone(),
        }
    }
}

/// 状态查询返回的摘要
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AgentStatusSummary {
    pub name: String,
    pub status: AgentStatus,
    pub last_collection: Option<DateTime<Utc>>,
    pub items_collected: usize,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_error: Option<String>,
}

/// 单个 Agent 在一次采集周期中的结果
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "lowercase")]
pub enum OutcomeStatus {
    #[serde(rename_all = "camelCase")]
    Success { items_collected: usize },
    Error { error: String },
}

/// 采集结果条目：`{agent, status, itemsCollected | error}`
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CollectionOutcome {
    pub agent: String,
    #[serde(flatten)]
    pub result: OutcomeStatus,
}

impl CollectionOutcome {
    pub fn success(agent: impl Into<String>, items_collected: usize) -> Self {
        Self {
            agent: agent.into(),
            result: OutcomeStatus::Success { items_collected },
        }
    }

    pub fn error(agent: impl Into<String>, error: impl Into<String>) -> Self {
        Self {
            agent: agent.into(),
            result: OutcomeStatus::Error {
                error: error.into(),
            },
        }
    }

    pub fn is_success(&self) -> bool {
        matches!(self.result, OutcomeStatus::Success { .. })
    }
}

/// 采集周期的触发来源
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Trigger {
    /// 启动时的首次采集
    Startup,
    /// 定时器触发
    Scheduled,
    /// 命令触发
    OnDemand,
}

/// 一次采集周期的报告（实时推送的输入）
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CycleReport {
    pub cycle_id: Uuid,
    pub trigger: Trigger,
    pub started_at: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,
    pub results: Vec<CollectionOutcome>,
}

impl CycleReport {
    pub fn success_count(&self) -> usize {
        self.results.iter().filter(|r| r.is_success()).count()
    }
}

/// 历史采集记录（与最新快照共享同一份数据）
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HistoryEntry {
    pub timestamp: DateTime<Utc>,
    pub data: Arc<DataSnapshot>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_outcome_serialize_success() {
        let outcome = CollectionOutcome::success("News", 2);
        let value = serde_json::to_value(&outcome).unwrap();
        assert_eq!(
            value,
            json!({"agent": "News", "status": "success", "itemsCollected": 2})
        );
    }

    #[test]
    fn test_outcome_serialize_error() {
        let outcome = CollectionOutcome::error("Market", "rate limited");
        let value = serde_json::to_value(&outcome).unwrap();
        assert_eq!(
            value,
            json!({"agent": "Market", "status": "error", "error": "rate limited"})
        );

        let parsed: CollectionOutcome = serde_json::from_value(value).unwrap();
        assert_eq!(parsed, outcome);
    }

    #[test]
    fn test_status_summary_field_names() {
        let mut record = AgentRecord::new("News");
        record.status = AgentStatus::Error;
        record.last_error = Some("boom".into());

        let value = serde_json::to_value(record.summary()).unwrap();
        assert_eq!(value["name"], "News");
        assert_eq!(value["status"], "Error");
        assert_eq!(value["itemsCollected"], 0);
        assert_eq!(value["lastError"], "boom");
        assert!(value["lastCollection"].is_null());
    }

    #[test]
    fn test_status_summary_skips_empty_error() {
        let value = serde_json::to_value(AgentRecord::new("News").summary()).unwrap();
        assert!(value.get("lastError").is_none());
        assert_eq!(value["status"], "Idle");
    }

    #[test]
    fn test_agent_status_from_str() {
        assert_eq!("success".parse::<AgentStatus>().unwrap(), AgentStatus::Success);
        assert_eq!("Collecting".parse::<AgentStatus>().unwrap(), AgentStatus::Collecting);
        assert!("running".parse::<AgentStatus>().is_err());
    }
}
