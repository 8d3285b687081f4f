//! 代理发现与验证
//! 从目录服务获取候选代理，逐个验证，把第一个可用的设为进程级出站代理

pub mod check;
pub mod config;
pub mod directory;
pub mod proxy;
pub mod select;
pub mod ui;

#[cfg(test)]
mod test_support;

pub use check::{CandidateProber, HttpProber, ProbeFailure, ProbeOutcome};
pub use config::{Config, DirectoryConfig};
pub use directory::{DirectoryError, DirectorySource, HttpDirectory};
pub use proxy::{ActiveProxy, CandidateParseError, ProxyCandidate, ProxyInstaller};
pub use select::{
    Attempt, CancelToken, SelectionOptions, SelectionOrchestrator, SelectionReport,
    SelectionResult,
};
