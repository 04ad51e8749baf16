//! 定时采集调度器
//!
//! 固定间隔触发一次 `run_cycle`。tick 处理器只负责 spawn 周期任务，不等待它结束，
//! 因此上一个周期还没跑完时，下一个 tick 会直接开始第二个并发周期（不排队、不合并）。

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio::time::{interval_at, Instant, MissedTickBehavior};

use crate::collector::Collector;
use crate::types::Trigger;

/// 调度器状态
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SchedulerState {
    /// 没有周期在执行
    Idle,
    /// 至少一个由调度器发起的周期正在执行
    Running,
}

/// 定时采集调度器
pub struct Scheduler {
    collector: Arc<Collector>,
    interval: Duration,
    /// 正在执行的周期数
    in_flight: Arc<AtomicUsize>,
}

impl Scheduler {
    pub fn new(collector: Arc<Collector>, interval: Duration) -> Self {
        Self {
            collector,
            interval,
            in_flight: Arc::new(AtomicUsize::new(0)),
        }
    }

    pub fn interval(&self) -> Duration {
        self.interval
    }

    pub fn state(&self) -> SchedulerState {
        if self.in_flight.load(Ordering::SeqCst) > 0 {
            SchedulerState::Running
        } else {
            SchedulerState::Idle
        }
    }

    /// 立即在后台执行一个周期（不等待结束）
    pub fn trigger(&self, trigger: Trigger) -> JoinHandle<()> {
        let collector = self.collector.clone();
        let in_flight = self.in_flight.clone();
        in_flight.fetch_add(1, Ordering::SeqCst);

        tokio::spawn(async move {
            // 周期内部不会失败，结束后总是回到 Idle
            let _guard = InFlightGuard(in_flight);
            collector.run_cycle(trigger).await;
        })
    }

    /// 启动定时器
    ///
    /// 第一个 tick 在一个间隔之后；启动时的首次采集由调用方决定是否 `trigger(Trigger::Startup)`。
    /// 返回的句柄持有定时器资源，`stop()` 或 drop 时释放。
    pub fn start(self: Arc<Self>) -> SchedulerHandle {
        let (shutdown_tx, mut shutdown_rx) = watch::channel(false);
        let scheduler = self.clone();

        let task = tokio::spawn(async move {
            let mut ticker = interval_at(Instant::now() + scheduler.interval, scheduler.interval);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

            tracing::info!(
                "⏰ Data collection scheduled every {}s",
                scheduler.interval.as_secs()
            );

            loop {
                tokio::select! {
                    _ = ticker.tick() => {
                        tracing::info!("Scheduled data collection started...");
                        scheduler.trigger(Trigger::Scheduled);
                    }
                    changed = shutdown_rx.changed() => {
                        if changed.is_err() || *shutdown_rx.borrow() {
                            break;
                        }
                    }
                }
            }

            tracing::info!("⏹️ Scheduler stopped");
        });

        SchedulerHandle {
            shutdown: shutdown_tx,
            task: Some(task),
        }
    }
}

/// 周期结束（包括被取消）时递减计数
struct InFlightGuard(Arc<AtomicUsize>);

impl Drop for InFlightGuard {
    fn drop(&mut self) {
        self.0.fetch_sub(1, Ordering::SeqCst);
    }
}

/// 定时器资源句柄
pub struct SchedulerHandle {
    shutdown: watch::Sender<bool>,
    task: Option<JoinHandle<()>>,
}

impl SchedulerHandle {
    /// 停止定时器并等待 tick 循环退出；已经开始的周期会继续跑完
    pub async fn stop(mut self) {
        let _ = self.shutdown.send(true);
        if let Some(task) = self.task.take() {
            let _ = task.await;
        }
    }
}

impl Drop for SchedulerHandle {
    fn drop(&mut self) {
        if let Some(task) = self.task.take() {
            task.abort();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::agent::{Agent, AgentRegistry};
    use crate::config::CollectorConfig;
    use crate::error::CollectionError;
    use crate::store::DataStore;
    use crate::types::CollectedItem;
    use async_trait::async_trait;
    use std::sync::atomic::AtomicU32;

    /// 每次调用耗时 `delay`，并记录调用次数
    struct Slow {
        calls: Arc<AtomicU32>,
        delay: Duration,
    }

    #[async_trait]
    impl Agent for Slow {
        fn name(&self) -> &str {
            "Slow"
        }

        async fn collect(&self) -> Result<Vec<CollectedItem>, CollectionError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            tokio::time::sleep(self.delay).await;
            Ok(Vec::new())
        }
    }

    fn scheduler(delay: Duration, interval: Duration) -> (Arc<Scheduler>, Arc<AtomicU32>) {
        let calls = Arc::new(AtomicU32::new(0));
        let registry = AgentRegistry::new()
            .with(Arc::new(Slow {
                calls: calls.clone(),
                delay,
            }))
            .unwrap();
        let config = CollectorConfig {
            agent_timeout: None,
            ..Default::default()
        };
        let collector = Arc::new(Collector::new(Arc::new(registry), Arc::new(DataStore::new()), &config));
        (Arc::new(Scheduler::new(collector, interval)), calls)
    }

    #[tokio::test(start_paused = true)]
    async fn test_ticks_at_fixed_interval() {
        let (scheduler, calls) = scheduler(Duration::from_millis(10), Duration::from_secs(60));
        let handle = scheduler.clone().start();

        // 启动后第一个间隔内不触发
        tokio::time::sleep(Duration::from_secs(59)).await;
        assert_eq!(calls.load(Ordering::SeqCst), 0);

        tokio::time::sleep(Duration::from_secs(2)).await;
        assert_eq!(calls.load(Ordering::SeqCst), 1);

        tokio::time::sleep(Duration::from_secs(60)).await;
        assert_eq!(calls.load(Ordering::SeqCst), 2);

        handle.stop().await;
        tokio::time::sleep(Duration::from_secs(300)).await;
        assert_eq!(calls.load(Ordering::SeqCst), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn test_overlapping_cycles_both_run() {
        // 周期耗时超过间隔：第二个 tick 开始并发周期
        let (scheduler, calls) = scheduler(Duration::from_secs(90), Duration::from_secs(60));
        let handle = scheduler.clone().start();

        tokio::time::sleep(Duration::from_secs(61)).await;
        assert_eq!(scheduler.state(), SchedulerState::Running);

        tokio::time::sleep(Duration::from_secs(60)).await;
        assert_eq!(calls.load(Ordering::SeqCst), 2);

        handle.stop().await;
        tokio::time::sleep(Duration::from_secs(200)).await;
        assert_eq!(scheduler.state(), SchedulerState::Idle);
    }

    #[tokio::test(start_paused = true)]
    async fn test_trigger_returns_to_idle() {
        let (scheduler, calls) = scheduler(Duration::from_secs(1), Duration::from_secs(600));
        assert_eq!(scheduler.state(), SchedulerState::Idle);

        let cycle = scheduler.trigger(Trigger::Startup);
        assert_eq!(scheduler.state(), SchedulerState::Running);

        cycle.await.unwrap();
        assert_eq!(scheduler.state(), SchedulerState::Idle);
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }
}
