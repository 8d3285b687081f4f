//! 代理候选节点
//! 目录服务返回的条目和手动输入的 `host:port` 都会解析成 `ProxyCandidate`

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use thiserror::Error;

mod active;

pub use active::{ActiveProxy, ProxyInstaller};
pub(crate) use active::routed_client_builder;

/// 一个候选 HTTP 代理（主机 + 端口）
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ProxyCandidate {
    pub host: String,
    pub port: u16,
}

/// `host:port` 文本解析失败的原因
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum CandidateParseError {
    #[error("missing ':' between host and port in {0:?}")]
    MissingSeparator(String),
    #[error("host is empty")]
    EmptyHost,
    #[error("port {0:?} is not a number")]
    InvalidPort(String),
    #[error("port {0} is out of range 1-65535")]
    PortOutOfRange(u64),
}

impl ProxyCandidate {
    pub fn new(host: impl Into<String>, port: u16) -> Self {
        Self {
            host: host.into(),
            port,
        }
    }

    /// 代理地址（host:port）
    pub fn address(&self) -> String {
        if self.host.contains(':') {
            format!("[{}]:{}", self.host, self.port)
        } else {
            format!("{}:{}", self.host, self.port)
        }
    }

    /// 以 HTTP 代理方式使用时的 URL
    pub fn to_proxy_url(&self) -> String {
        format!("http://{}", self.address())
    }

    /// 从目录服务的一个 JSON 条目中提取候选节点
    ///
    /// 主机取 `ip`（没有则取 `host`），端口可以是数字或数字字符串。
    /// 字段缺失或端口非法时返回 `None`，由调用方决定是否记录日志。
    pub fn from_directory_entry(entry: &serde_json::Value) -> Option<Self> {
        let host = entry
            .get("ip")
            .and_then(|v| v.as_str())
            .or_else(|| entry.get("host").and_then(|v| v.as_str()))
            .map(str::trim)
            .filter(|h| !h.is_empty())?;

        let port = match entry.get("port")? {
            serde_json::Value::Number(n) => n.as_u64()?,
            serde_json::Value::String(s) => s.trim().parse::<u64>().ok()?,
            _ => return None,
        };

        let port = u16::try_from(port).ok().filter(|p| *p != 0)?;
        Some(Self::new(host, port))
    }
}

impl fmt::Display for ProxyCandidate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.address())
    }
}

impl FromStr for ProxyCandidate {
    type Err = CandidateParseError;

    /// 解析用户输入的 `host:port`，例如 `127.0.0.1:8080` 或 `[::1]:3128`
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let s = s.trim();
        let (host, port) = s
            .rsplit_once(':')
            .ok_or_else(|| CandidateParseError::MissingSeparator(s.to_string()))?;

        let host = host.trim_start_matches('[').trim_end_matches(']').trim();
        if host.is_empty() {
            return Err(CandidateParseError::EmptyHost);
        }

        let port_str = port.trim();
        let port: u64 = port_str
            .parse()
            .map_err(|_| CandidateParseError::InvalidPort(port_str.to_string()))?;
        let port = u16::try_from(port)
            .ok()
            .filter(|p| *p != 0)
            .ok_or(CandidateParseError::PortOutOfRange(port))?;

        Ok(Self::new(host, port))
    }
}
