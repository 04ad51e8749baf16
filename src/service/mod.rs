//! Service 模块 - 常驻进程 + 定时采集 + 事件推送
//!
//! Service 负责：
//! - 启动时采集一次，此后按固定间隔定时采集
//! - 通过 Unix Socket 或 stdio 接收命令请求
//! - 把每个采集周期的结果推送给订阅者

mod broadcaster;
mod handler;
mod server;

// Re-export protocol types from crate root
pub use crate::protocol::{EventType, Push, Request, Response};
pub use broadcaster::{Broadcaster, ConnId};
pub use handler::{Handler, SERVICE_VERSION};
pub use server::{cleanup_stale_service, default_data_dir, is_service_running, Service, ServiceConfig};
