//! 采集 Agent 契约与注册表
//!
//! 每个 Agent 负责从一个外部数据源拉取一批数据。Agent 之间不共享可变状态，
//! 可以独立调用，失败互不影响。

use std::collections::HashSet;
use std::sync::Arc;

use async_trait::async_trait;

use crate::error::{CollectionError, Error, Result};
use crate::types::CollectedItem;

/// 采集 Agent
#[async_trait]
pub trait Agent: Send + Sync {
    /// 稳定名称，作为 DataStore 的 key 并出现在状态列表中
    fn name(&self) -> &str;

    /// 执行一次外部抓取，返回有限序列
    async fn collect(&self) -> std::result::Result<Vec<CollectedItem>, CollectionError>;
}

/// Agent 注册表
///
/// 进程启动时构建一次，通过 `Arc` 传给 Collector / Scheduler。
/// 名称唯一，保留注册顺序。
#[derive(Default, Clone)]
pub struct AgentRegistry {
    agents: Vec<Arc<dyn Agent>>,
    names: HashSet<String>,
}

impl AgentRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// 注册 Agent，名称重复时返回 `Error::DuplicateAgent`
    pub fn register(&mut self, agent: Arc<dyn Agent>) -> Result<()> {
        let name = agent.name().to_string();
        if !self.names.insert(name.clone()) {
            return Err(Error::DuplicateAgent(name));
        }
        tracing::debug!("🧩 Agent registered: {}", name);
        self.agents.push(agent);
        Ok(())
    }

    /// 链式注册
    pub fn with(mut self, agent: Arc<dyn Agent>) -> Result<Self> {
        self.register(agent)?;
        Ok(self)
    }

    pub fn get(&self, name: &str) -> Option<&Arc<dyn Agent>> {
        self.agents.iter().find(|a| a.name() == name)
    }

    pub fn iter(&self) -> impl Iterator<Item = &Arc<dyn Agent>> {
        self.agents.iter()
    }

    /// 按注册顺序返回名称
    pub fn names(&self) -> Vec<String> {
        self.agents.iter().map(|a| a.name().to_string()).collect()
    }

    pub fn len(&self) -> usize {
        self.agents.len()
    }

    pub fn is_empty(&self) -> bool {
        self.agents.is_empty()
    }
}

impl std::fmt::Debug for AgentRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AgentRegistry")
            .field("agents", &self.names())
            .finish()
    }
}
