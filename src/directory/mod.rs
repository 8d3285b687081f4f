//! 代理目录服务
//! 从远程 HTTP 接口拉取候选代理列表，尽力解析，坏条目只记录不报错

use async_trait::async_trait;
use log::{debug, info, warn};
use serde::Serialize;
use std::time::Duration;
use thiserror::Error;
use url::Url;

use crate::config::DirectoryConfig;
use crate::proxy::ProxyCandidate;

#[derive(Debug, Clone, PartialEq, Eq, Error, Serialize)]
#[serde(tag = "kind", content = "detail")]
pub enum DirectoryError {
    /// 非 2xx 状态或网络错误
    #[error("directory unavailable: {0}")]
    Unavailable(String),
    /// 响应不是 JSON 或缺少 data 字段
    #[error("directory response malformed: {0}")]
    Malformed(String),
}

/// 候选代理的来源
#[async_trait]
pub trait DirectorySource: Send + Sync {
    /// 按服务端顺序返回候选列表，可能为空
    async fn fetch(&self) -> Result<Vec<ProxyCandidate>, DirectoryError>;
}

/// 基于 HTTP JSON 接口的目录服务
#[derive(Debug, Clone)]
pub struct HttpDirectory {
    url: Url,
    timeout: Duration,
}

impl HttpDirectory {
    pub fn new(url: Url, timeout: Duration) -> Self {
        Self { url, timeout }
    }

    pub fn from_config(config: &DirectoryConfig) -> anyhow::Result<Self> {
        Ok(Self::new(
            config.request_url()?,
            config.get_timeout_duration(),
        ))
    }

    pub fn url(&self) -> &Url {
        &self.url
    }
}

#[async_trait]
impl DirectorySource for HttpDirectory {
    async fn fetch(&self) -> Result<Vec<ProxyCandidate>, DirectoryError> {
        // 目录请求直连，不经过已安装的代理
        let client = reqwest::Client::builder()
            .timeout(self.timeout)
            .no_proxy()
            .build()
            .map_err(|e| DirectoryError::Unavailable(format!("创建 HTTP 客户端失败: {}", e)))?;

        debug!("请求目录服务 {}", self.url);
        let response = client
            .get(self.url.clone())
            .send()
            .await
            .map_err(|e| DirectoryError::Unavailable(e.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            return Err(DirectoryError::Unavailable(format!("HTTP {}", status)));
        }

        let body = response
            .text()
            .await
            .map_err(|e| DirectoryError::Unavailable(e.to_string()))?;

        let candidates = parse_candidates(&body)?;
        info!("目录服务返回 {} 个可用候选", candidates.len());
        Ok(candidates)
    }
}

/// 解析目录响应体
///
/// 顶层必须是带 `data` 列表的 JSON 对象；列表里缺主机或端口的条目被跳过，
/// 其余条目保持原顺序。
pub fn parse_candidates(body: &str) -> Result<Vec<ProxyCandidate>, DirectoryError> {
    let value: serde_json::Value =
        serde_json::from_str(body).map_err(|e| DirectoryError::Malformed(e.to_string()))?;

    let data = value
        .get("data")
        .ok_or_else(|| DirectoryError::Malformed("missing `data` field".to_string()))?;
    let entries = data
        .as_array()
        .ok_or_else(|| DirectoryError::Malformed("`data` is not a list".to_string()))?;

    let candidates: Vec<ProxyCandidate> = entries
        .iter()
        .enumerate()
        .filter_map(|(index, entry)| {
            let candidate = ProxyCandidate::from_directory_entry(entry);
            if candidate.is_none() {
                warn!("跳过第 {} 个目录条目（缺少主机或端口）: {}", index, entry);
            }
            candidate
        })
        .collect();

    Ok(candidates)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::{http_response, refused_addr, serve_once};

    fn directory_at(addr: std::net::SocketAddr) -> HttpDirectory {
        let url = Url::parse(&format!("http://{}/api/proxy-list?limit=2", addr)).unwrap();
        HttpDirectory::new(url, Duration::from_secs(5))
    }

    #[test]
    fn test_parse_keeps_order_and_drops_bad_entries() {
        let body = r#"{
            "data": [
                {"ip": "1.2.3.4", "port": "8080"},
                {"ip": "", "port": "80"},
                {"port": "3128"},
                {"ip": "9.9.9.9", "port": "abc"},
                {"ip": "5.6.7.8", "port": 3128}
            ],
            "total": 5
        }"#;
        let candidates = parse_candidates(body).unwrap();
        assert_eq!(
            candidates,
            vec![
                ProxyCandidate::new("1.2.3.4", 8080),
                ProxyCandidate::new("5.6.7.8", 3128),
            ]
        );
    }

    #[test]
    fn test_parse_well_formed_entries_pass_through() {
        let expected: Vec<ProxyCandidate> = (1..=5)
            .map(|i| ProxyCandidate::new(format!("10.0.0.{}", i), 8000 + i))
            .collect();
        let data: Vec<serde_json::Value> = expected
            .iter()
            .map(|c| serde_json::json!({"ip": c.host, "port": c.port.to_string()}))
            .collect();
        let body = serde_json::json!({ "data": data }).to_string();
        assert_eq!(parse_candidates(&body).unwrap(), expected);
    }

    #[test]
    fn test_parse_empty_list_is_not_an_error() {
        assert!(parse_candidates(r#"{"data": []}"#).unwrap().is_empty());
    }

    #[test]
    fn test_parse_malformed_bodies() {
        for body in ["<html>oops</html>", "", r#"{"items": []}"#, r#"{"data": {}}"#, "[]"] {
            assert!(
                matches!(parse_candidates(body), Err(DirectoryError::Malformed(_))),
                "body should be malformed: {:?}",
                body
            );
        }
    }

    #[tokio::test]
    async fn test_fetch_success() {
        let body = r#"{"data":[{"ip":"1.2.3.4","port":"8080"},{"ip":"5.6.7.8","port":"3128"}]}"#;
        let (addr, server) = serve_once(http_response("200 OK", body)).await;

        let candidates = directory_at(addr).fetch().await.unwrap();
        assert_eq!(candidates.len(), 2);
        assert_eq!(candidates[1], ProxyCandidate::new("5.6.7.8", 3128));

        let request = server.await.unwrap();
        assert!(request.starts_with("GET /api/proxy-list?limit=2 HTTP/1.1"));
    }

    #[tokio::test]
    async fn test_fetch_service_unavailable() {
        let (addr, _server) = serve_once(http_response("503 Service Unavailable", "")).await;
        let err = directory_at(addr).fetch().await.unwrap_err();
        assert_eq!(err, DirectoryError::Unavailable("HTTP 503 Service Unavailable".to_string()));
    }

    #[tokio::test]
    async fn test_fetch_malformed_body() {
        let (addr, _server) = serve_once(http_response("200 OK", "not json")).await;
        let err = directory_at(addr).fetch().await.unwrap_err();
        assert!(matches!(err, DirectoryError::Malformed(_)));
    }

    #[tokio::test]
    async fn test_fetch_connection_refused() {
        let addr = refused_addr().await;
        let err = directory_at(addr).fetch().await.unwrap_err();
        assert!(matches!(err, DirectoryError::Unavailable(_)));
    }
}
