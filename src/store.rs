//! 内存数据仓库
//!
//! 按 Agent 名称保存最近一次成功采集的快照和状态记录。
//!
//! 并发模型：外层 `RwLock` 只保护 key 集合，每个 Agent 的槽位各自一把 `Mutex`，
//! 不同 Agent 的写入互不阻塞；同一 Agent 的写入是原子的读改写，最后落地者生效。

use std::collections::{BTreeMap, HashMap, VecDeque};
use std::sync::Arc;

use chrono::Utc;
use parking_lot::{Mutex, RwLock};

use crate::config::DEFAULT_HISTORY_LIMIT;
use crate::types::{AgentRecord, AgentStatus, AgentStatusSummary, CollectedItem, DataSnapshot, HistoryEntry};

/// 单个 Agent 的存储槽位
#[derive(Debug)]
struct AgentSlot {
    record: AgentRecord,
    /// 最近一次成功的快照，从未成功时为 None
    snapshot: Option<Arc<DataSnapshot>>,
    /// 成功采集的历史（旧 → 新）
    history: VecDeque<HistoryEntry>,
}

impl AgentSlot {
    fn new(name: &str) -> Self {
        Self {
            record: AgentRecord::new(name),
            snapshot: None,
            history: VecDeque::new(),
        }
    }
}

/// 内存数据仓库
#[derive(Debug)]
pub struct DataStore {
    slots: RwLock<HashMap<String, Arc<Mutex<AgentSlot>>>>,
    /// 注册顺序
    order: RwLock<Vec<String>>,
    history_limit: usize,
}

impl DataStore {
    pub fn new() -> Self {
        Self::with_history_limit(DEFAULT_HISTORY_LIMIT)
    }

    pub fn with_history_limit(history_limit: usize) -> Self {
        Self {
            slots: RwLock::new(HashMap::new()),
            order: RwLock::new(Vec::new()),
            history_limit,
        }
    }

    /// 注册 Agent（状态 Idle）；已存在时不做任何修改
    pub fn register(&self, agent_name: &str) {
        self.slot(agent_name);
    }

    /// 获取槽位，不存在则按注册顺序追加
    fn slot(&self, agent_name: &str) -> Arc<Mutex<AgentSlot>> {
        if let Some(slot) = self.slots.read().get(agent_name) {
            return slot.clone();
        }

        let mut slots = self.slots.write();
        // 双重检查：拿写锁期间可能已被其他线程插入
        if let Some(slot) = slots.get(agent_name) {
            return slot.clone();
        }
        let slot = Arc::new(Mutex::new(AgentSlot::new(agent_name)));
        slots.insert(agent_name.to_string(), slot.clone());
        self.order.write().push(agent_name.to_string());
        slot
    }

    fn existing_slot(&self, agent_name: &str) -> Option<Arc<Mutex<AgentSlot>>> {
        self.slots.read().get(agent_name).cloned()
    }

    /// 标记为采集中
    pub fn mark_collecting(&self, agent_name: &str) {
        let slot = self.slot(agent_name);
        slot.lock().record.status = AgentStatus::Collecting;
    }

    /// 记录一次成功采集：整体替换快照，不合并、不去重
    pub fn record_success(&self, agent_name: &str, items: Vec<CollectedItem>) {
        let slot = self.slot(agent_name);
        let now = Utc::now();
        let count = items.len();
        let snapshot = Arc::new(items);

        let mut slot = slot.lock();
        slot.record.status = AgentStatus::Success;
        slot.record.last_collection_time = Some(now);
        slot.record.last_item_count = count;
        slot.record.last_error = None;
        slot.snapshot = Some(snapshot.clone());

        if self.history_limit > 0 {
            slot.history.push_back(HistoryEntry {
                timestamp: now,
                data: snapshot,
            });
            while slot.history.len() > self.history_limit {
                slot.history.pop_front();
            }
        }
    }

    /// 记录一次失败：只改状态，不动快照和条数
    pub fn record_failure(&self, agent_name: &str, error: &str) {
        let slot = self.slot(agent_name);
        let mut slot = slot.lock();
        slot.record.status = AgentStatus::Error;
        slot.record.last_collection_time = Some(Utc::now());
        slot.record.last_error = Some(error.to_string());
    }

    /// 所有至少成功过一次的 Agent 的当前快照（按注册顺序）
    pub fn get_all_data(&self) -> Vec<(String, DataSnapshot)> {
        let order = self.order.read().clone();
        order
            .into_iter()
            .filter_map(|name| {
                let snapshot = self.existing_slot(&name)?.lock().snapshot.clone()?;
                Some((name, (*snapshot).clone()))
            })
            .collect()
    }

    /// 指定 Agent 的当前快照；未知或从未成功时返回空
    pub fn get_data_by_agent(&self, agent_name: &str) -> DataSnapshot {
        self.existing_slot(agent_name)
            .and_then(|slot| slot.lock().snapshot.clone())
            .map(|snapshot| (*snapshot).clone())
            .unwrap_or_default()
    }

    /// 按注册顺序列出状态
    pub fn list_status(&self) -> Vec<AgentStatusSummary> {
        self.records().iter().map(AgentRecord::summary).collect()
    }

    /// 按注册顺序返回完整记录
    pub fn records(&self) -> Vec<AgentRecord> {
        let order = self.order.read().clone();
        order
            .iter()
            .filter_map(|name| self.existing_slot(name))
            .map(|slot| slot.lock().record.clone())
            .collect()
    }

    /// 单个 Agent 的记录
    pub fn record(&self, agent_name: &str) -> Option<AgentRecord> {
        self.existing_slot(agent_name)
            .map(|slot| slot.lock().record.clone())
    }

    /// 历史采集记录（每个 Agent 最近 `limit` 条，旧 → 新）
    ///
    /// 指定了 Agent 但从未出现过时，返回 `{agent: []}`
    pub fn history(&self, agent_name: Option<&str>, limit: usize) -> BTreeMap<String, Vec<HistoryEntry>> {
        let tail = |slot: &Arc<Mutex<AgentSlot>>| -> Vec<HistoryEntry> {
            let slot = slot.lock();
            let skip = slot.history.len().saturating_sub(limit);
            slot.history.iter().skip(skip).cloned().collect()
        };

        match agent_name {
            Some(name) => {
                let entries = self.existing_slot(name).map(|s| tail(&s)).unwrap_or_default();
                BTreeMap::from([(name.to_string(), entries)])
            }
            None => {
                let order = self.order.read().clone();
                order
                    .into_iter()
                    .filter_map(|name| {
                        let slot = self.existing_slot(&name)?;
                        Some((name, tail(&slot)))
                    })
                    .collect()
            }
        }
    }

    pub fn agent_count(&self) -> usize {
        self.order.read().len()
    }
}

impl Default for DataStore {
    fn default() -> Self {
        Self::new()
    }
}
