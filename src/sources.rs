//! 通用 HTTP JSON 采集 Agent
//!
//! 数据源在 `sources.json` 中声明：
//!
//! ```json
//! [
//!   {"name": "CryptoMarket", "url": "https://example.com/prices", "itemsPointer": "/data"}
//! ]
//! ```
//!
//! `itemsPointer` 是 JSON Pointer，指向响应中的数组；省略时响应本身应是数组。

use std::collections::HashMap;
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::agent::{Agent, AgentRegistry};
use crate::error::{CollectionError, Error, Result};
use crate::types::CollectedItem;

/// HTTP 请求超时
const REQUEST_TIMEOUT: Duration = Duration::from_secs(30);

/// 数据源配置
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SourceConfig {
    pub name: String,
    pub url: String,
    #[serde(default)]
    pub items_pointer: Option<String>,
    #[serde(default)]
    pub headers: HashMap<String, String>,
}

/// 读取数据源列表
pub fn load_sources(path: &Path) -> Result<Vec<SourceConfig>> {
    let raw = std::fs::read_to_string(path)?;
    let sources: Vec<SourceConfig> = serde_json::from_str(&raw)?;

    for source in &sources {
        if source.name.trim().is_empty() {
            return Err(Error::Config(format!("数据源缺少名称: {}", source.url)));
        }
    }

    tracing::info!("📚 Loaded {} sources from {}", sources.len(), path.display());
    Ok(sources)
}

/// 根据数据源配置构建注册表（名称重复时报错）
pub fn build_registry(sources: Vec<SourceConfig>) -> Result<AgentRegistry> {
    let client = reqwest::Client::builder()
        .timeout(REQUEST_TIMEOUT)
        .user_agent(concat!("info-collector/", env!("CARGO_PKG_VERSION")))
        .build()
        .map_err(|e| Error::Config(format!("HTTP client 创建失败: {}", e)))?;

    let mut registry = AgentRegistry::new();
    for source in sources {
        registry.register(Arc::new(HttpJsonAgent::new(source, client.clone())))?;
    }
    Ok(registry)
}

/// 拉取 JSON 并取出数组作为采集结果
pub struct HttpJsonAgent {
    source: SourceConfig,
    client: reqwest::Client,
}

impl HttpJsonAgent {
    pub fn new(source: SourceConfig, client: reqwest::Client) -> Self {
        Self { source, client }
    }
}

#[async_trait]
impl Agent for HttpJsonAgent {
    fn name(&self) -> &str {
        &self.source.name
    }

    async fn collect(&self) -> std::result::Result<Vec<CollectedItem>, CollectionError> {
        let mut request = self.client.get(&self.source.url);
        for (key, value) in &self.source.headers {
            request = request.header(key, value);
        }

        let response = request
            .send()
            .await
            .map_err(|e| CollectionError::network(e.to_string()))?;

        let status = response.status();
        if status == reqwest::StatusCode::TOO_MANY_REQUESTS {
            return Err(CollectionError::RateLimited);
        }
        if !status.is_success() {
            return Err(CollectionError::network(format!("HTTP {}", status)));
        }

        let body: Value = response
            .json()
            .await
            .map_err(|e| CollectionError::parse(e.to_string()))?;

        extract_items(body, self.source.items_pointer.as_deref())
    }
}

/// 从响应中取出条目；非对象元素包装成 `{"value": ...}`
pub fn extract_items(body: Value, pointer: Option<&str>) -> std::result::Result<Vec<CollectedItem>, CollectionError> {
    let target = match pointer {
        Some(p) => body
            .pointer(p)
            .cloned()
            .ok_or_else(|| CollectionError::parse(format!("pointer {} not found", p)))?,
        None => body,
    };

    let Value::Array(elements) = target else {
        return Err(CollectionError::parse("expected a JSON array"));
    };

    Ok(elements
        .into_iter()
        .map(|element| match element {
            Value::Object(map) => map,
            other => {
                let mut map = CollectedItem::new();
                map.insert("value".to_string(), other);
                map
            }
        })
        .collect())
}
