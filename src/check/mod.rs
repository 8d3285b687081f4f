//! 候选代理的连通性探测
//! 通过候选代理请求一次探测地址，不做重试

use async_trait::async_trait;
use log::debug;
use reqwest::Client;
use serde::Serialize;
use std::time::{Duration, Instant};
use thiserror::Error;

use crate::proxy::{ProxyCandidate, routed_client_builder};

const USER_AGENT: &str = "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36";

/// 探测失败的原因
#[derive(Debug, Clone, PartialEq, Eq, Error, Serialize)]
#[serde(tag = "reason", content = "detail", rename_all = "kebab-case")]
pub enum ProbeFailure {
    #[error("network error: {0}")]
    NetworkError(String),
    #[error("timed out after {0}ms")]
    Timeout(u64),
    #[error("unexpected status {0}")]
    NonSuccessStatus(u16),
    #[error("malformed response: {0}")]
    MalformedResponse(String),
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "outcome", rename_all = "kebab-case")]
pub enum ProbeOutcome {
    Success,
    Failure(ProbeFailure),
}

impl ProbeOutcome {
    pub fn is_success(&self) -> bool {
        matches!(self, ProbeOutcome::Success)
    }
}

impl From<Result<(), ProbeFailure>> for ProbeOutcome {
    fn from(result: Result<(), ProbeFailure>) -> Self {
        match result {
            Ok(()) => ProbeOutcome::Success,
            Err(failure) => ProbeOutcome::Failure(failure),
        }
    }
}

#[async_trait]
pub trait CandidateProber: Send + Sync {
    /// 经 `candidate` 请求 `probe_target`，最多等待 `timeout`
    async fn check(
        &self,
        candidate: &ProxyCandidate,
        probe_target: &str,
        timeout: Duration,
    ) -> ProbeOutcome;
}

/// 用 reqwest 走 HTTP 代理发起探测请求
#[derive(Debug, Clone, Default)]
pub struct HttpProber;

impl HttpProber {
    pub fn new() -> Self {
        Self
    }
}

#[async_trait]
impl CandidateProber for HttpProber {
    async fn check(
        &self,
        candidate: &ProxyCandidate,
        probe_target: &str,
        timeout: Duration,
    ) -> ProbeOutcome {
        let client = match create_http_client(candidate, timeout) {
            Ok(client) => client,
            Err(failure) => return ProbeOutcome::Failure(failure),
        };

        let start = Instant::now();
        let result = match tokio::time::timeout(timeout, probe(&client, probe_target, timeout))
            .await
        {
            Ok(result) => result,
            Err(_) => Err(ProbeFailure::Timeout(timeout.as_millis() as u64)),
        };

        debug!(
            "探测 {} 经 {} 用时 {}ms: {:?}",
            probe_target,
            candidate,
            start.elapsed().as_millis(),
            result
        );
        result.into()
    }
}

/// 与 `ActiveProxy::client_builder` 走同一套路由配置，探测即是对刚安装代理的实测
fn create_http_client(candidate: &ProxyCandidate, timeout: Duration) -> Result<Client, ProbeFailure> {
    routed_client_builder(Some(candidate), timeout)
        .map_err(|e| ProbeFailure::NetworkError(format!("invalid proxy {}: {}", candidate, e)))?
        .user_agent(USER_AGENT)
        .build()
        .map_err(|e| ProbeFailure::NetworkError(format!("failed to create HTTP client: {}", e)))
}

async fn probe(client: &Client, probe_target: &str, timeout: Duration) -> Result<(), ProbeFailure> {
    let timeout_ms = timeout.as_millis() as u64;
    let transport_error = |e: reqwest::Error| {
        if e.is_timeout() {
            ProbeFailure::Timeout(timeout_ms)
        } else {
            ProbeFailure::NetworkError(e.to_string())
        }
    };

    let response = client
        .get(probe_target)
        .send()
        .await
        .map_err(transport_error)?;

    let status = response.status();
    if !status.is_success() {
        return Err(ProbeFailure::NonSuccessStatus(status.as_u16()));
    }

    let is_json = response
        .headers()
        .get(reqwest::header::CONTENT_TYPE)
        .and_then(|v| v.to_str().ok())
        .is_some_and(|v| v.contains("json"));

    let body = response.bytes().await.map_err(|e| {
        if e.is_timeout() {
            ProbeFailure::Timeout(timeout_ms)
        } else {
            ProbeFailure::MalformedResponse(e.to_string())
        }
    })?;

    if is_json {
        let value: serde_json::Value = serde_json::from_slice(&body)
            .map_err(|e| ProbeFailure::MalformedResponse(e.to_string()))?;
        if let Some(ip) = value.get("ip").and_then(|v| v.as_str()) {
            debug!("出口 IP: {}", ip);
        }
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::{http_response, refused_addr, serve_blackhole, serve_once};

    const PROBE_TARGET: &str = "http://probe.invalid/ip";

    fn candidate_at(addr: std::net::SocketAddr) -> ProxyCandidate {
        ProxyCandidate::new(addr.ip().to_string(), addr.port())
    }

    #[tokio::test]
    async fn test_success_through_proxy() {
        let (addr, proxy) = serve_once(http_response("200 OK", r#"{"ip":"5.6.7.8"}"#)).await;

        let outcome = HttpProber::new()
            .check(&candidate_at(addr), PROBE_TARGET, Duration::from_secs(5))
            .await;
        assert_eq!(outcome, ProbeOutcome::Success);

        // 请求必须以绝对地址形式发给代理
        let request = proxy.await.unwrap();
        assert!(request.starts_with("GET http://probe.invalid/ip HTTP/1.1"));
    }

    #[tokio::test]
    async fn test_non_success_status() {
        let (addr, _proxy) = serve_once(http_response("503 Service Unavailable", "")).await;
        let outcome = HttpProber::new()
            .check(&candidate_at(addr), PROBE_TARGET, Duration::from_secs(5))
            .await;
        assert_eq!(outcome, ProbeOutcome::Failure(ProbeFailure::NonSuccessStatus(503)));
    }

    #[tokio::test]
    async fn test_malformed_json_body() {
        let (addr, _proxy) = serve_once(http_response("200 OK", "<html>captive portal</html>")).await;
        let outcome = HttpProber::new()
            .check(&candidate_at(addr), PROBE_TARGET, Duration::from_secs(5))
            .await;
        assert!(matches!(
            outcome,
            ProbeOutcome::Failure(ProbeFailure::MalformedResponse(_))
        ));
    }

    #[tokio::test]
    async fn test_connection_refused() {
        let addr = refused_addr().await;
        let outcome = HttpProber::new()
            .check(&candidate_at(addr), PROBE_TARGET, Duration::from_secs(5))
            .await;
        assert!(matches!(
            outcome,
            ProbeOutcome::Failure(ProbeFailure::NetworkError(_))
        ));
    }

    #[tokio::test]
    async fn test_blackhole_proxy_times_out() {
        let (addr, _proxy) = serve_blackhole().await;
        let timeout = Duration::from_millis(300);

        let start = Instant::now();
        let outcome = HttpProber::new()
            .check(&candidate_at(addr), PROBE_TARGET, timeout)
            .await;
        let elapsed = start.elapsed();

        assert_eq!(outcome, ProbeOutcome::Failure(ProbeFailure::Timeout(300)));
        assert!(elapsed < timeout + Duration::from_secs(1), "took {:?}", elapsed);
    }

    #[test]
    fn test_outcome_from_result() {
        assert!(ProbeOutcome::from(Ok(())).is_success());
        assert!(!ProbeOutcome::from(Err(ProbeFailure::Timeout(1))).is_success());
    }
}
