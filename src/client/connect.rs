//! Service Client 连接逻辑

use std::path::PathBuf;
use std::time::Duration;

use anyhow::{anyhow, Context, Result};
use serde_json::{json, Value};
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::net::unix::OwnedWriteHalf;
use tokio::net::UnixStream;
use tokio::sync::mpsc;
use tokio::time::sleep;

use crate::command::{CommandSpec, COLLECT_AGENT, COLLECT_ALL, GET_AGENT_STATUS, GET_HISTORY, GET_LATEST_DATA};
use crate::protocol::{EventType, Push, Request, Response};
use crate::types::{AgentStatusSummary, CollectionOutcome};

/// Client 配置
#[derive(Debug, Clone)]
pub struct ClientConfig {
    /// 数据目录（默认 ~/.info-collector）
    pub data_dir: PathBuf,
    /// 组件名称
    pub component: String,
    /// 组件版本
    pub version: String,
    /// 连接重试次数
    pub connect_retries: u32,
    /// 重试间隔（毫秒）
    pub retry_interval_ms: u64,
}

impl Default for ClientConfig {
    fn default() -> Self {
        let data_dir = std::env::var("INFO_COLLECTOR_DATA_DIR")
            .map(PathBuf::from)
            .unwrap_or_else(|_| {
                dirs::home_dir()
                    .unwrap_or_else(|| PathBuf::from("."))
                    .join(".info-collector")
            });

        Self {
            data_dir,
            component: "unknown".to_string(),
            version: env!("CARGO_PKG_VERSION").to_string(),
            connect_retries: 3,
            retry_interval_ms: 500,
        }
    }
}

impl ClientConfig {
    /// 创建新的配置
    pub fn new(component: &str) -> Self {
        Self {
            component: component.to_string(),
            ..Default::default()
        }
    }

    /// 设置数据目录
    pub fn with_data_dir(mut self, data_dir: PathBuf) -> Self {
        self.data_dir = data_dir;
        self
    }

    /// Socket 路径
    pub fn socket_path(&self) -> PathBuf {
        self.data_dir.join("service.sock")
    }
}

/// Service Client
pub struct ServiceClient {
    /// 写入端
    writer: OwnedWriteHalf,
    /// 响应接收通道
    response_rx: mpsc::Receiver<String>,
    /// 推送事件接收通道
    push_rx: mpsc::Receiver<String>,
    /// 握手返回的 Service 版本
    service_version: String,
}

impl ServiceClient {
    pub fn service_version(&self) -> &str {
        &self.service_version
    }

    /// 发送请求并等待响应
    pub async fn request(&mut self, request: &Request) -> Result<Response> {
        let request_json = serde_json::to_string(request)?;
        self.writer.write_all(format!("{}\n", request_json).as_bytes()).await?;

        let response_line = self
            .response_rx
            .recv()
            .await
            .ok_or_else(|| anyhow!("Connection closed"))?;

        Ok(serde_json::from_str(&response_line)?)
    }

    /// 调用命令，返回结果数据
    pub async fn call(&mut self, command: &str, arguments: Value) -> Result<Value> {
        match self.request(&Request::call(command, arguments)).await? {
            Response::CallResult { data, .. } => Ok(data),
            Response::Error { code, message } => Err(anyhow!("{} failed: {} (code={})", command, message, code)),
            other => Err(anyhow!("Unexpected response: {:?}", other)),
        }
    }

    /// 触发全量采集
    pub async fn collect_all(&mut self) -> Result<Vec<CollectionOutcome>> {
        let data = self.call(COLLECT_ALL, json!({})).await?;
        Ok(serde_json::from_value(data)?)
    }

    /// 只采集一个 Agent
    pub async fn collect_agent(&mut self, agent: &str) -> Result<Vec<CollectionOutcome>> {
        let data = self.call(COLLECT_AGENT, json!({ "agent": agent })).await?;
        Ok(serde_json::from_value(data)?)
    }

    /// 最新数据（指定 Agent 时为数组，否则为映射）
    pub async fn get_latest_data(&mut self, agent: Option<&str>) -> Result<Value> {
        let arguments = match agent {
            Some(agent) => json!({ "agent": agent }),
            None => json!({}),
        };
        self.call(GET_LATEST_DATA, arguments).await
    }

    /// Agent 状态
    pub async fn get_agent_status(&mut self) -> Result<Vec<AgentStatusSummary>> {
        let data = self.call(GET_AGENT_STATUS, json!({})).await?;
        Ok(serde_json::from_value(data)?)
    }

    /// 历史采集记录
    pub async fn get_history(&mut self, agent: Option<&str>, limit: Option<usize>) -> Result<Value> {
        let mut arguments = json!({});
        if let Some(agent) = agent {
            arguments["agent"] = json!(agent);
        }
        if let Some(limit) = limit {
            arguments["limit"] = json!(limit);
        }
        self.call(GET_HISTORY, arguments).await
    }

    /// 可用命令列表
    pub async fn list_commands(&mut self) -> Result<Vec<CommandSpec>> {
        match self.request(&Request::ListCommands).await? {
            Response::Commands { commands } => Ok(commands),
            other => Err(anyhow!("Unexpected response: {:?}", other)),
        }
    }

    /// 订阅事件
    pub async fn subscribe(&mut self, events: Vec<EventType>) -> Result<()> {
        match self.request(&Request::Subscribe { events }).await? {
            Response::Ok => Ok(()),
            Response::Error { code, message } => Err(anyhow!("Subscribe failed: {} (code={})", message, code)),
            _ => Err(anyhow!("Unexpected response")),
        }
    }

    /// 接收推送事件
    pub async fn recv_push(&mut self) -> Option<Push> {
        let line = self.push_rx.recv().await?;
        serde_json::from_str(&line).ok()
    }
}

/// 连接 Service（重试 `connect_retries` 次）并完成握手
pub async fn connect(config: ClientConfig) -> Result<ServiceClient> {
    let socket_path = config.socket_path();

    let mut last_error = None;
    for attempt in 1..=config.connect_retries.max(1) {
        match UnixStream::connect(&socket_path).await {
            Ok(stream) => {
                tracing::debug!("连接 Service 成功 (attempt={})", attempt);
                return finish_connect(config, stream).await;
            }
            Err(e) => {
                tracing::debug!("连接 Service 失败 (attempt={}): {}", attempt, e);
                last_error = Some(e);
                if attempt < config.connect_retries {
                    sleep(Duration::from_millis(config.retry_interval_ms)).await;
                }
            }
        }
    }

    Err(anyhow!(
        "无法连接 Service: {:?} ({})",
        socket_path,
        last_error.map(|e| e.to_string()).unwrap_or_default()
    ))
}

/// 完成连接（握手 + 启动读取任务）
async fn finish_connect(config: ClientConfig, stream: UnixStream) -> Result<ServiceClient> {
    let (reader, mut writer) = stream.into_split();
    let mut reader = BufReader::new(reader);

    // 发送握手
    let handshake = Request::Handshake {
        component: config.component.clone(),
        version: config.version.clone(),
    };
    writer
        .write_all(format!("{}\n", serde_json::to_string(&handshake)?).as_bytes())
        .await?;

    // 读取握手响应
    let mut line = String::new();
    reader.read_line(&mut line).await.context("读取握手响应失败")?;

    let service_version = match serde_json::from_str::<Response>(&line)? {
        Response::HandshakeOk { service_version } => {
            tracing::info!("握手成功: service_version={}", service_version);
            service_version
        }
        Response::Error { code, message } => {
            return Err(anyhow!("握手失败: {} (code={})", message, code));
        }
        _ => return Err(anyhow!("握手响应异常")),
    };

    let (response_tx, response_rx) = mpsc::channel(100);
    let (push_tx, push_rx) = mpsc::channel(100);

    // 读取任务：按 type 标签区分推送和响应
    tokio::spawn(async move {
        let mut line = String::new();
        loop {
            line.clear();
            match reader.read_line(&mut line).await {
                Ok(0) | Err(_) => break,
                Ok(_) => {
                    let message = line.trim().to_string();
                    if is_push(&message) {
                        // 推送积压时直接丢弃，不能阻塞响应
                        let _ = push_tx.try_send(message);
                    } else if response_tx.send(message).await.is_err() {
                        break;
                    }
                }
            }
        }
    });

    Ok(ServiceClient {
        writer,
        response_rx,
        push_rx,
        service_version,
    })
}

/// 是否为推送消息
fn is_push(line: &str) -> bool {
    serde_json::from_str::<Value>(line)
        .ok()
        .and_then(|v| v.get("type").and_then(Value::as_str).map(|t| Push::TAGS.contains(&t)))
        .unwrap_or(false)
}
