//! 推送广播器
//!
//! 维护连接表（出站通道 + 订阅的事件类型），把采集周期的推送分发给订阅者

use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use parking_lot::RwLock;
use tokio::sync::mpsc;

use crate::protocol::{EventType, Push};
use crate::types::CycleReport;

/// 连接 ID
pub type ConnId = u64;

/// 消息发送通道
pub type MessageSender = mpsc::Sender<String>;

/// 一个已注册的连接
struct Connection {
    sender: MessageSender,
    events: HashSet<EventType>,
}

/// 推送广播器
pub struct Broadcaster {
    connections: RwLock<HashMap<ConnId, Connection>>,
    next_conn_id: AtomicU64,
}

impl Broadcaster {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    /// 注册新连接（初始不订阅任何事件），返回连接 ID
    pub fn register(&self, sender: MessageSender) -> ConnId {
        let conn_id = self.next_conn_id.fetch_add(1, Ordering::Relaxed);
        self.connections.write().insert(
            conn_id,
            Connection {
                sender,
                events: HashSet::new(),
            },
        );
        tracing::debug!("📡 Connection registered: conn_id={}", conn_id);
        conn_id
    }

    /// 注销连接；丢弃出站通道后，写任务会把已排队的消息写完再退出
    pub fn unregister(&self, conn_id: ConnId) {
        if self.connections.write().remove(&conn_id).is_some() {
            tracing::debug!("📡 Connection unregistered: conn_id={}", conn_id);
        }
    }

    pub fn subscribe(&self, conn_id: ConnId, events: Vec<EventType>) {
        if let Some(conn) = self.connections.write().get_mut(&conn_id) {
            tracing::debug!("📡 Subscribed: conn_id={}, events={:?}", conn_id, events);
            conn.events.extend(events);
        }
    }

    pub fn unsubscribe(&self, conn_id: ConnId, events: Vec<EventType>) {
        if let Some(conn) = self.connections.write().get_mut(&conn_id) {
            for event in &events {
                conn.events.remove(event);
            }
            tracing::debug!("📡 Unsubscribed: conn_id={}, events={:?}", conn_id, events);
        }
    }

    /// 把一个周期报告展开成推送并分发
    pub fn publish_report(&self, report: &CycleReport) -> usize {
        Push::from_report(report)
            .iter()
            .map(|push| self.broadcast(push))
            .sum()
    }

    /// 推送给订阅了该类型的连接（非阻塞，通道满时丢弃），返回成功投递数
    pub fn broadcast(&self, push: &Push) -> usize {
        let event_type = push.event_type();

        let message = match serde_json::to_string(push) {
            Ok(json) => format!("{}\n", json),
            Err(e) => {
                tracing::error!("Failed to serialize push: {}", e);
                return 0;
            }
        };

        let targets: Vec<(ConnId, MessageSender)> = self
            .connections
            .read()
            .iter()
            .filter(|(_, conn)| conn.events.contains(&event_type))
            .map(|(conn_id, conn)| (*conn_id, conn.sender.clone()))
            .collect();

        let mut delivered = 0;
        for (conn_id, sender) in targets {
            match sender.try_send(message.clone()) {
                Ok(()) => delivered += 1,
                Err(mpsc::error::TrySendError::Full(_)) => {
                    tracing::warn!("📡 Channel full, dropping {:?}: conn_id={}", event_type, conn_id);
                }
                Err(mpsc::error::TrySendError::Closed(_)) => {
                    tracing::debug!("📡 Channel closed: conn_id={}", conn_id);
                }
            }
        }

        tracing::trace!("📡 {:?} delivered to {} subscribers", event_type, delivered);
        delivered
    }

    pub fn connection_count(&self) -> usize {
        self.connections.read().len()
    }

    /// 发送响应到指定连接（等待通道空位）；连接已注销时返回 false
    pub async fn send_to(&self, conn_id: ConnId, message: String) -> bool {
        let sender = self.connections.read().get(&conn_id).map(|c| c.sender.clone());
        match sender {
            Some(sender) => sender.send(message).await.is_ok(),
            None => false,
        }
    }
}

impl Default for Broadcaster {
    fn default() -> Self {
        Self {
            connections: RwLock::new(HashMap::new()),
            next_conn_id: AtomicU64::new(1),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{CollectionOutcome, Trigger};
    use chrono::Utc;
    use uuid::Uuid;

    fn report_with_failure() -> CycleReport {
        CycleReport {
            cycle_id: Uuid::new_v4(),
            trigger: Trigger::OnDemand,
            started_at: Utc::now(),
            finished_at: Utc::now(),
            results: vec![
                CollectionOutcome::success("News", 2),
                CollectionOutcome::error("Market", "rate limited"),
            ],
        }
    }

    #[test]
    fn test_publish_report_respects_subscriptions() {
        let broadcaster = Broadcaster::new();

        let (tx1, mut rx1) = mpsc::channel(10);
        let (tx2, mut rx2) = mpsc::channel(10);
        let (tx3, mut rx3) = mpsc::channel(10);

        let conn1 = broadcaster.register(tx1);
        let conn2 = broadcaster.register(tx2);
        broadcaster.register(tx3);

        broadcaster.subscribe(conn1, vec![EventType::CollectionCompleted]);
        broadcaster.subscribe(conn2, vec![EventType::CollectionCompleted, EventType::AgentFailed]);

        // conn1: 1 条，conn2: 2 条，conn3 未订阅
        assert_eq!(broadcaster.publish_report(&report_with_failure()), 3);

        let line = rx1.try_recv().unwrap();
        assert!(line.ends_with('\n'));
        assert!(line.contains("\"type\":\"CollectionCompleted\""));
        assert!(rx1.try_recv().is_err());

        assert!(rx2.try_recv().unwrap().contains("CollectionCompleted"));
        assert!(rx2.try_recv().unwrap().contains("rate limited"));
        assert!(rx3.try_recv().is_err());
    }

    #[test]
    fn test_unsubscribe_stops_delivery() {
        let broadcaster = Broadcaster::new();
        let (tx, mut rx) = mpsc::channel(10);
        let conn = broadcaster.register(tx);

        broadcaster.subscribe(conn, vec![EventType::CollectionCompleted]);
        broadcaster.unsubscribe(conn, vec![EventType::CollectionCompleted]);
        assert_eq!(broadcaster.publish_report(&report_with_failure()), 0);

        assert!(rx.try_recv().is_err());
    }

    #[test]
    fn test_full_channel_drops_push() {
        let broadcaster = Broadcaster::new();
        let (tx, mut rx) = mpsc::channel(1);
        let conn = broadcaster.register(tx);
        broadcaster.subscribe(conn, vec![EventType::AgentFailed]);

        let pushes = Push::from_report(&report_with_failure());
        assert_eq!(broadcaster.broadcast(&pushes[1]), 1);
        assert_eq!(broadcaster.broadcast(&pushes[1]), 0);

        assert!(rx.try_recv().is_ok());
        assert!(rx.try_recv().is_err());
    }

    #[tokio::test]
    async fn test_unregister() {
        let broadcaster = Broadcaster::new();
        assert_eq!(broadcaster.connection_count(), 0);

        let (tx1, _rx1) = mpsc::channel(10);
        let conn1 = broadcaster.register(tx1);
        let (tx2, mut rx2) = mpsc::channel(10);
        let conn2 = broadcaster.register(tx2);
        assert_ne!(conn1, conn2);
        assert_eq!(broadcaster.connection_count(), 2);

        broadcaster.unregister(conn1);
        assert_eq!(broadcaster.connection_count(), 1);
        assert!(!broadcaster.send_to(conn1, "x\n".into()).await);
        assert!(broadcaster.send_to(conn2, "x\n".into()).await);
        assert_eq!(rx2.recv().await.as_deref(), Some("x\n"));
    }
}
