//! 采集服务 - 编排一次完整的采集周期
//!
//! 遍历所有注册的 Agent，逐个隔离执行，把结果写入 DataStore。
//! 单个 Agent 的失败（错误、超时、panic）只影响它自己的槽位。

use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use tokio::sync::broadcast;
use tokio::task::JoinHandle;
use tokio::time::Instant;
use uuid::Uuid;

use crate::agent::{Agent, AgentRegistry};
use crate::config::{CollectMode, CollectorConfig};
use crate::error::CollectionError;
use crate::store::DataStore;
use crate::types::{CollectedItem, CollectionOutcome, CycleReport, Trigger};

/// 周期报告通道容量
const REPORT_CHANNEL_CAPACITY: usize = 64;

type FetchResult = Result<Vec<CollectedItem>, CollectionError>;

/// 采集服务
pub struct Collector {
    registry: Arc<AgentRegistry>,
    store: Arc<DataStore>,
    agent_timeout: Option<Duration>,
    mode: CollectMode,
    reports: broadcast::Sender<CycleReport>,
}

impl Collector {
    /// 创建采集服务，并把所有 Agent 以 Idle 状态登记到 DataStore
    pub fn new(registry: Arc<AgentRegistry>, store: Arc<DataStore>, config: &CollectorConfig) -> Self {
        for agent in registry.iter() {
            store.register(agent.name());
        }

        let (reports, _) = broadcast::channel(REPORT_CHANNEL_CAPACITY);

        Self {
            registry,
            store,
            agent_timeout: config.agent_timeout,
            mode: config.mode,
            reports,
        }
    }

    pub fn store(&self) -> &Arc<DataStore> {
        &self.store
    }

    pub fn registry(&self) -> &Arc<AgentRegistry> {
        &self.registry
    }

    /// 订阅周期报告（实时推送的输入）
    pub fn subscribe(&self) -> broadcast::Receiver<CycleReport> {
        self.reports.subscribe()
    }

    /// 执行全量采集，按注册顺序返回每个 Agent 的结果
    pub async fn collect_all(&self) -> Vec<CollectionOutcome> {
        self.run_cycle(Trigger::OnDemand).await.results
    }

    /// 执行一次完整周期并发布报告
    pub async fn run_cycle(&self, trigger: Trigger) -> CycleReport {
        let cycle_id = Uuid::new_v4();
        let started_at = Utc::now();
        tracing::info!(
            "🔄 Collection cycle started: id={}, trigger={:?}, agents={}",
            cycle_id,
            trigger,
            self.registry.len()
        );

        let results = match self.mode {
            CollectMode::Sequential => {
                let mut results = Vec::with_capacity(self.registry.len());
                for agent in self.registry.iter() {
                    results.push(self.collect_one(agent).await);
                }
                results
            }
            CollectMode::Parallel => {
                // 先全部启动，再按注册顺序等待；超时从启动时刻算起
                let started = Instant::now();
                let pending: Vec<(String, JoinHandle<FetchResult>)> = self
                    .registry
                    .iter()
                    .map(|agent| {
                        self.store.mark_collecting(agent.name());
                        (agent.name().to_string(), spawn_fetch(agent))
                    })
                    .collect();

                let mut results = Vec::with_capacity(pending.len());
                for (name, handle) in pending {
                    let fetched = self.await_fetch(handle, started).await;
                    results.push(self.settle(&name, fetched));
                }
                results
            }
        };

        let report = CycleReport {
            cycle_id,
            trigger,
            started_at,
            finished_at: Utc::now(),
            results,
        };

        tracing::info!(
            "📊 Collection cycle finished: id={}, {}/{} succeeded",
            cycle_id,
            report.success_count(),
            report.results.len()
        );

        // 没有订阅者时 send 返回 Err，忽略即可
        let _ = self.reports.send(report.clone());
        report
    }

    /// 只采集指定 Agent；未注册时返回 None
    pub async fn collect_agent(&self, agent_name: &str) -> Option<CollectionOutcome> {
        let agent = self.registry.get(agent_name)?;
        Some(self.collect_one(agent).await)
    }

    /// 采集单个 Agent：标记 Collecting → 执行 → 记录结果
    async fn collect_one(&self, agent: &Arc<dyn Agent>) -> CollectionOutcome {
        let name = agent.name().to_string();
        self.store.mark_collecting(&name);
        tracing::debug!("Collecting data from {}...", name);

        let fetched = self.await_fetch(spawn_fetch(agent), Instant::now()).await;
        self.settle(&name, fetched)
    }

    /// 等待抓取任务结束，超时则取消任务
    async fn await_fetch(&self, mut handle: JoinHandle<FetchResult>, started: Instant) -> FetchResult {
        let joined = match self.agent_timeout {
            Some(limit) => match tokio::time::timeout_at(started + limit, &mut handle).await {
                Ok(joined) => joined,
                Err(_) => {
                    handle.abort();
                    return Err(CollectionError::Timeout(limit));
                }
            },
            None => handle.await,
        };

        joined.unwrap_or_else(|e| {
            let reason = if e.is_panic() { "agent panicked" } else { "agent task cancelled" };
            Err(CollectionError::Aborted(reason.to_string()))
        })
    }

    /// 把抓取结果写入 DataStore 并转换为结果条目
    fn settle(&self, name: &str, fetched: FetchResult) -> CollectionOutcome {
        match fetched {
            Ok(items) => {
                let count = items.len();
                self.store.record_success(name, items);
                tracing::debug!("✅ {} collected {} items", name, count);
                CollectionOutcome::success(name, count)
            }
            Err(e) => {
                let message = e.to_string();
                tracing::warn!("Error collecting from {}: {}", name, message);
                self.store.record_failure(name, &message);
                CollectionOutcome::error(name, message)
            }
        }
    }
}

/// 在独立任务中执行抓取，隔离 panic
fn spawn_fetch(agent: &Arc<dyn Agent>) -> JoinHandle<FetchResult> {
    let agent = agent.clone();
    tokio::spawn(async move { agent.collect().await })
}
