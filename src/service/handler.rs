//! 请求处理器
//!
//! 处理来自客户端的各类请求

use std::sync::Arc;

use super::broadcaster::{Broadcaster, ConnId};
use crate::command::{command_specs, CommandInterface};
use crate::error::Error;
use crate::protocol::{Request, Response, CODE_INTERNAL, CODE_UNKNOWN_COMMAND};

/// Service 版本号（跟随 crate 版本）
pub const SERVICE_VERSION: &str = env!("CARGO_PKG_VERSION");

/// 请求处理器
pub struct Handler {
    /// 命令分发
    commands: Arc<CommandInterface>,
    /// 广播器
    broadcaster: Arc<Broadcaster>,
}

impl Handler {
    /// 创建处理器
    pub fn new(commands: Arc<CommandInterface>, broadcaster: Arc<Broadcaster>) -> Self {
        Self {
            commands,
            broadcaster,
        }
    }

    /// 处理请求
    pub async fn handle(&self, conn_id: ConnId, request: Request) -> Response {
        match request {
            Request::Handshake { component, version } => {
                tracing::info!(
                    "🤝 握手: conn_id={}, component={}, version={}",
                    conn_id,
                    component,
                    version
                );
                Response::HandshakeOk {
                    service_version: SERVICE_VERSION.to_string(),
                }
            }

            Request::ListCommands => Response::Commands {
                commands: command_specs(),
            },

            Request::Call { command, arguments } => self.handle_call(conn_id, command, arguments).await,

            Request::Subscribe { events } => {
                self.broadcaster.subscribe(conn_id, events);
                Response::Ok
            }

            Request::Unsubscribe { events } => {
                self.broadcaster.unsubscribe(conn_id, events);
                Response::Ok
            }

            Request::Heartbeat => Response::Ok,
        }
    }

    /// 处理命令调用
    async fn handle_call(&self, conn_id: ConnId, command: String, arguments: serde_json::Value) -> Response {
        tracing::debug!("📥 Call: conn_id={}, command={}", conn_id, command);

        match self.commands.dispatch(&command, &arguments).await {
            Ok(data) => Response::CallResult { command, data },
            Err(e @ Error::UnknownCommand(_)) => {
                tracing::warn!("Unknown command from conn_id={}: {}", conn_id, command);
                Response::Error {
                    code: CODE_UNKNOWN_COMMAND,
                    message: e.to_string(),
                }
            }
            Err(e) => {
                tracing::error!("Command {} failed: {}", command, e);
                Response::Error {
                    code: CODE_INTERNAL,
                    message: format!("Command failed: {}", e),
                }
            }
        }
    }
}
