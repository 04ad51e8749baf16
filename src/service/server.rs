//! Service 服务器
//!
//! Unix Socket / stdio 服务，处理客户端请求，驱动定时采集并推送周期事件

use std::fs;
use std::os::unix::fs::PermissionsExt;
use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result};
use tokio::io::{AsyncBufRead, AsyncBufReadExt, AsyncWrite, AsyncWriteExt, BufReader, DuplexStream};
use tokio::net::{UnixListener, UnixStream};
use tokio::sync::{broadcast, mpsc};
use tokio::task::JoinHandle;

use super::broadcaster::{Broadcaster, ConnId};
use super::handler::Handler;
use crate::agent::AgentRegistry;
use crate::collector::Collector;
use crate::command::CommandInterface;
use crate::config::CollectorConfig;
use crate::protocol::{Request, Response, CODE_BAD_REQUEST};
use crate::scheduler::{Scheduler, SchedulerHandle};
use crate::store::DataStore;
use crate::types::Trigger;

/// 每个连接的出站消息缓冲
const OUTBOUND_BUFFER: usize = 100;

/// stdin 转发缓冲（字节）
const STDIN_BUFFER: usize = 64 * 1024;

/// Service 配置
#[derive(Debug, Clone)]
pub struct ServiceConfig {
    /// 数据目录（默认 ~/.info-collector）
    pub data_dir: PathBuf,
    /// 采集配置
    pub collector: CollectorConfig,
}

impl Default for ServiceConfig {
    fn default() -> Self {
        let data_dir = std::env::var("INFO_COLLECTOR_DATA_DIR")
            .map(PathBuf::from)
            .unwrap_or_else(|_| default_data_dir());

        Self {
            data_dir,
            collector: CollectorConfig::from_env(),
        }
    }
}

/// 默认数据目录
pub fn default_data_dir() -> PathBuf {
    dirs::home_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join(".info-collector")
}

impl ServiceConfig {
    /// Socket 路径
    pub fn socket_path(&self) -> PathBuf {
        self.data_dir.join("service.sock")
    }

    /// PID 文件路径
    pub fn pid_path(&self) -> PathBuf {
        self.data_dir.join("service.pid")
    }

    /// 数据源配置路径
    pub fn sources_path(&self) -> PathBuf {
        self.data_dir.join("sources.json")
    }
}

/// 采集服务
pub struct Service {
    config: ServiceConfig,
    collector: Arc<Collector>,
    scheduler: Arc<Scheduler>,
    broadcaster: Arc<Broadcaster>,
    handler: Arc<Handler>,
}

impl Service {
    /// 创建 Service
    pub fn new(config: ServiceConfig, registry: AgentRegistry) -> Result<Self> {
        // 确保数据目录存在
        fs::create_dir_all(&config.data_dir).context("创建数据目录失败")?;

        let store = Arc::new(DataStore::with_history_limit(config.collector.history_limit));
        let collector = Arc::new(Collector::new(Arc::new(registry), store, &config.collector));
        let scheduler = Arc::new(Scheduler::new(collector.clone(), config.collector.interval));

        // 创建广播器
        let broadcaster = Broadcaster::new();

        // 创建处理器
        let commands = Arc::new(CommandInterface::new(collector.clone()));
        let handler = Arc::new(Handler::new(commands, broadcaster.clone()));

        tracing::info!(
            "🧩 Initialized {} agents: {:?}",
            collector.registry().len(),
            collector.registry().names()
        );

        Ok(Self {
            config,
            collector,
            scheduler,
            broadcaster,
            handler,
        })
    }

    pub fn config(&self) -> &ServiceConfig {
        &self.config
    }

    pub fn collector(&self) -> &Arc<Collector> {
        &self.collector
    }

    /// 启动后台任务：周期报告转发、首次采集、定时器
    fn start_background(&self) -> (SchedulerHandle, JoinHandle<()>) {
        // 先订阅，保证首次采集的报告也能推送出去
        let forwarder = spawn_report_forwarder(self.collector.subscribe(), self.broadcaster.clone());

        if self.config.collector.collect_on_start {
            self.scheduler.trigger(Trigger::Startup);
        }

        (self.scheduler.clone().start(), forwarder)
    }

    /// 运行 Unix Socket 服务，直到收到 Ctrl-C
    pub async fn run(self: Arc<Self>) -> Result<()> {
        self.write_pid_file()?;

        // 清理旧的 socket 文件
        let socket_path = self.config.socket_path();
        if socket_path.exists() {
            fs::remove_file(&socket_path)?;
        }

        let listener = UnixListener::bind(&socket_path).context("绑定 socket 失败")?;

        // 设置 socket 权限为 0600
        fs::set_permissions(&socket_path, fs::Permissions::from_mode(0o600))?;

        tracing::info!("🚀 Service 启动: {:?}", socket_path);

        let (scheduler_handle, forwarder) = self.start_background();

        loop {
            tokio::select! {
                result = listener.accept() => {
                    match result {
                        Ok((stream, _)) => {
                            let service = self.clone();
                            tokio::spawn(async move {
                                if let Err(e) = service.handle_connection(stream).await {
                                    tracing::error!("处理连接失败: {}", e);
                                }
                            });
                        }
                        Err(e) => {
                            tracing::error!("接受连接失败: {}", e);
                        }
                    }
                }
                _ = tokio::signal::ctrl_c() => {
                    tracing::info!("收到中断信号，准备退出...");
                    break;
                }
            }
        }

        scheduler_handle.stop().await;
        forwarder.abort();
        self.cleanup();
        Ok(())
    }

    /// 运行 stdio 服务：stdin 读请求，stdout 写响应和推送，直到 stdin 关闭或 Ctrl-C
    pub async fn run_stdio(self: Arc<Self>) -> Result<()> {
        tracing::info!("🚀 Service 启动 (stdio)");

        let (scheduler_handle, forwarder) = self.start_background();
        let stdin = BufReader::new(forward_lines(std::io::BufReader::new(std::io::stdin())));

        tokio::select! {
            result = self.serve_stream(stdin, tokio::io::stdout()) => {
                if let Err(e) = result {
                    tracing::error!("stdio 处理失败: {}", e);
                }
            }
            _ = tokio::signal::ctrl_c() => {
                tracing::info!("收到中断信号，准备退出...");
            }
        }

        scheduler_handle.stop().await;
        forwarder.abort();
        Ok(())
    }

    /// 在一对读写流上服务一个连接，直到读端 EOF
    ///
    /// 返回前会等待写任务把已排队的响应全部写出。
    pub async fn serve_stream<R, W>(&self, reader: R, writer: W) -> Result<()>
    where
        R: AsyncBufRead + Unpin,
        W: AsyncWrite + Unpin + Send + 'static,
    {
        let (conn_id, write_handle) = self.open_connection(writer);
        tracing::debug!("📥 新连接: conn_id={}", conn_id);

        let result = self.serve_lines(conn_id, reader).await;

        // 注销后出站通道关闭，写任务写完剩余消息再退出
        self.broadcaster.unregister(conn_id);
        let _ = write_handle.await;
        tracing::debug!("📤 连接关闭: conn_id={}", conn_id);

        result
    }

    /// 处理单个 socket 连接
    async fn handle_connection(&self, stream: UnixStream) -> Result<()> {
        let (reader, writer) = stream.into_split();
        self.serve_stream(BufReader::new(reader), writer).await
    }

    /// 注册连接并启动发送任务
    fn open_connection<W>(&self, mut writer: W) -> (ConnId, JoinHandle<()>)
    where
        W: AsyncWrite + Unpin + Send + 'static,
    {
        let (tx, mut rx) = mpsc::channel::<String>(OUTBOUND_BUFFER);
        let conn_id = self.broadcaster.register(tx);

        let write_handle = tokio::spawn(async move {
            while let Some(msg) = rx.recv().await {
                if writer.write_all(msg.as_bytes()).await.is_err() {
                    break;
                }
                if writer.flush().await.is_err() {
                    break;
                }
            }
        });

        (conn_id, write_handle)
    }

    /// 逐行读取请求并回写响应，直到 EOF
    async fn serve_lines<R>(&self, conn_id: ConnId, mut reader: R) -> Result<()>
    where
        R: AsyncBufRead + Unpin,
    {
        let mut line = String::new();
        loop {
            line.clear();
            if reader.read_line(&mut line).await? == 0 {
                // 连接关闭
                return Ok(());
            }
            if line.trim().is_empty() {
                continue;
            }

            let response = match serde_json::from_str::<Request>(&line) {
                Ok(request) => self.handler.handle(conn_id, request).await,
                Err(e) => {
                    tracing::warn!("解析请求失败: {}", e);
                    Response::Error {
                        code: CODE_BAD_REQUEST,
                        message: format!("Invalid JSON: {}", e),
                    }
                }
            };

            let resp_json = serde_json::to_string(&response)?;
            if !self.broadcaster.send_to(conn_id, format!("{}\n", resp_json)).await {
                return Ok(());
            }
        }
    }

    /// 写入 PID 文件
    fn write_pid_file(&self) -> Result<()> {
        let pid = std::process::id();
        let pid_path = self.config.pid_path();
        fs::write(&pid_path, pid.to_string())?;
        fs::set_permissions(&pid_path, fs::Permissions::from_mode(0o600))?;
        tracing::debug!("📝 写入 PID 文件: {} (pid={})", pid_path.display(), pid);
        Ok(())
    }

    /// 清理资源
    fn cleanup(&self) {
        for path in [self.config.socket_path(), self.config.pid_path()] {
            if path.exists() {
                let _ = fs::remove_file(&path);
            }
        }
        tracing::info!("🧹 Service 清理完成");
    }
}

/// 在独立线程读取阻塞输入，逐行转发到异步读端
///
/// 读线程不属于运行时，Ctrl-C 后运行时关闭不会等待它。
fn forward_lines<R>(input: R) -> DuplexStream
where
    R: std::io::BufRead + Send + 'static,
{
    let (reader, mut writer) = tokio::io::duplex(STDIN_BUFFER);
    let (tx, mut rx) = mpsc::channel::<String>(OUTBOUND_BUFFER);

    std::thread::spawn(move || {
        for line in std::io::BufRead::lines(input) {
            let Ok(line) = line else { break };
            if tx.blocking_send(line).is_err() {
                break;
            }
        }
    });

    tokio::spawn(async move {
        while let Some(mut line) = rx.recv().await {
            line.push('\n');
            if writer.write_all(line.as_bytes()).await.is_err() {
                break;
            }
        }
    });

    reader
}

/// 把周期报告转成推送发给订阅者
fn spawn_report_forwarder(
    mut reports: broadcast::Receiver<crate::types::CycleReport>,
    broadcaster: Arc<Broadcaster>,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        loop {
            match reports.recv().await {
                Ok(report) => {
                    broadcaster.publish_report(&report);
                }
                Err(broadcast::error::RecvError::Lagged(skipped)) => {
                    tracing::warn!("📡 Report forwarder lagged, skipped {} reports", skipped);
                }
                Err(broadcast::error::RecvError::Closed) => break,
            }
        }
    })
}

/// 检查 Service 是否正在运行
pub fn is_service_running(config: &ServiceConfig) -> bool {
    let pid_path = config.pid_path();
    if !pid_path.exists() {
        return false;
    }

    let pid: i32 = match fs::read_to_string(&pid_path).ok().and_then(|s| s.trim().parse().ok()) {
        Some(p) => p,
        None => return false,
    };

    // 检查进程是否存在
    unsafe { libc::kill(pid, 0) == 0 }
}

/// 清理残留的 Service 状态
pub fn cleanup_stale_service(config: &ServiceConfig) -> Result<()> {
    let socket_path = config.socket_path();
    let pid_path = config.pid_path();

    if socket_path.exists() {
        fs::remove_file(&socket_path)?;
        tracing::debug!("🧹 删除残留 socket: {:?}", socket_path);
    }

    if pid_path.exists() {
        fs::remove_file(&pid_path)?;
        tracing::debug!("🧹 删除残留 PID 文件: {:?}", pid_path);
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_config_paths() {
        let config = ServiceConfig {
            data_dir: PathBuf::from("/tmp/test-info-collector"),
            collector: CollectorConfig::default(),
        };
        assert_eq!(config.socket_path(), PathBuf::from("/tmp/test-info-collector/service.sock"));
        assert_eq!(config.pid_path(), PathBuf::from("/tmp/test-info-collector/service.pid"));
        assert_eq!(config.sources_path(), PathBuf::from("/tmp/test-info-collector/sources.json"));
    }

    #[test]
    fn test_not_running_without_pid_file() {
        let dir = tempfile::tempdir().unwrap();
        let config = ServiceConfig {
            data_dir: dir.path().to_path_buf(),
            collector: CollectorConfig::default(),
        };
        assert!(!is_service_running(&config));

        fs::write(config.pid_path(), "not-a-pid").unwrap();
        assert!(!is_service_running(&config));

        cleanup_stale_service(&config).unwrap();
        assert!(!config.pid_path().exists());
    }

    #[tokio::test]
    async fn test_forward_lines_then_eof() {
        let input = std::io::Cursor::new(b"{\"type\":\"Heartbeat\"}\nsecond\n".to_vec());
        let mut lines = BufReader::new(forward_lines(input)).lines();

        assert_eq!(lines.next_line().await.unwrap().as_deref(), Some(r#"{"type":"Heartbeat"}"#));
        assert_eq!(lines.next_line().await.unwrap().as_deref(), Some("second"));
        assert_eq!(lines.next_line().await.unwrap(), None);
    }
}
