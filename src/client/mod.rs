//! Service Client 模块
//!
//! 提供连接 Service 的客户端功能

mod connect;

pub use connect::{connect, ClientConfig, ServiceClient};
