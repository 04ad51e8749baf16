//! 采集配置

use std::time::Duration;

/// 默认采集间隔：15 分钟
pub const DEFAULT_INTERVAL_SECS: u64 = 15 * 60;

/// 默认单 Agent 超时（与数据源抓取的 HTTP 超时一致）
pub const DEFAULT_AGENT_TIMEOUT_SECS: u64 = 30;

/// 每个 Agent 保留的历史条数
pub const DEFAULT_HISTORY_LIMIT: usize = 100;

/// 单个周期内 Agent 的执行方式
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum CollectMode {
    /// 按注册顺序逐个采集
    #[default]
    Sequential,
    /// 所有 Agent 并发采集，结果仍按注册顺序返回
    Parallel,
}

/// 采集配置
#[derive(Debug, Clone)]
pub struct CollectorConfig {
    /// 定时采集间隔
    pub interval: Duration,
    /// 单 Agent 超时，None 表示不限
    pub agent_timeout: Option<Duration>,
    /// 每个 Agent 的历史保留条数
    pub history_limit: usize,
    /// 启动时是否立即采集一次
    pub collect_on_start: bool,
    /// 周期内执行方式
    pub mode: CollectMode,
}

impl Default for CollectorConfig {
    fn default() -> Self {
        Self {
            interval: Duration::from_secs(DEFAULT_INTERVAL_SECS),
            agent_timeout: Some(Duration::from_secs(DEFAULT_AGENT_TIMEOUT_SECS)),
            history_limit: DEFAULT_HISTORY_LIMIT,
            collect_on_start: true,
            mode: CollectMode::Sequential,
        }
    }
}

impl CollectorConfig {
    /// 从环境变量读取，未设置或无法解析时使用默认值
    ///
    /// - `INFO_COLLECTOR_INTERVAL_SECS`
    /// - `INFO_COLLECTOR_AGENT_TIMEOUT_SECS`（0 表示不限）
    /// - `INFO_COLLECTOR_HISTORY_LIMIT`
    /// - `INFO_COLLECTOR_COLLECT_ON_START`
    /// - `INFO_COLLECTOR_PARALLEL`
    pub fn from_env() -> Self {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Self {
        let mut config = Self::default();

        if let Some(secs) = parse_var::<u64>(&lookup, "INFO_COLLECTOR_INTERVAL_SECS") {
            if secs > 0 {
                config.interval = Duration::from_secs(secs);
            } else {
                tracing::warn!("INFO_COLLECTOR_INTERVAL_SECS=0 ignored");
            }
        }

        if let Some(secs) = parse_var::<u64>(&lookup, "INFO_COLLECTOR_AGENT_TIMEOUT_SECS") {
            config.agent_timeout = (secs > 0).then(|| Duration::from_secs(secs));
        }

        if let Some(limit) = parse_var::<usize>(&lookup, "INFO_COLLECTOR_HISTORY_LIMIT") {
            config.history_limit = limit;
        }

        if let Some(flag) = parse_flag(&lookup, "INFO_COLLECTOR_COLLECT_ON_START") {
            config.collect_on_start = flag;
        }

        if parse_flag(&lookup, "INFO_COLLECTOR_PARALLEL") == Some(true) {
            config.mode = CollectMode::Parallel;
        }

        config
    }
}

fn parse_var<T: std::str::FromStr>(lookup: &impl Fn(&str) -> Option<String>, key: &str) -> Option<T> {
    let raw = lookup(key)?;
    match raw.trim().parse() {
        Ok(v) => Some(v),
        Err(_) => {
            tracing::warn!("Ignoring invalid {}={:?}", key, raw);
            None
        }
    }
}

fn parse_flag(lookup: &impl Fn(&str) -> Option<String>, key: &str) -> Option<bool> {
    let raw = lookup(key)?;
    match raw.trim().to_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Some(true),
        "0" | "false" | "no" | "off" => Some(false),
        _ => {
            tracing::warn!("Ignoring invalid {}={:?}", key, raw);
            None
        }
    }
}
