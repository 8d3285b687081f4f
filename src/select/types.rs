//! 选择结果与运行报告

use chrono::{DateTime, Utc};
use serde::Serialize;
use std::fs;
use std::path::Path;

use crate::check::ProbeOutcome;
use crate::directory::DirectoryError;
use crate::proxy::ProxyCandidate;

/// 一次选择运行的最终结果
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "result", rename_all = "snake_case")]
pub enum SelectionResult {
    /// 找到可用代理，且仍处于安装状态
    Selected(ProxyCandidate),
    /// 目录服务没有返回可用条目
    NoCandidates,
    /// 尝试过至少一个候选，全部未通过探测
    AllFailed,
    DirectoryError(DirectoryError),
    Cancelled,
    /// 同一时刻已有一次运行在进行
    AlreadyRunning,
}

impl SelectionResult {
    pub fn is_selected(&self) -> bool {
        matches!(self, SelectionResult::Selected(_))
    }

    pub fn selected(&self) -> Option<&ProxyCandidate> {
        match self {
            SelectionResult::Selected(candidate) => Some(candidate),
            _ => None,
        }
    }

    /// 给用户看的状态信息
    pub fn message(&self) -> String {
        match self {
            SelectionResult::Selected(candidate) => {
                format!("代理已设置: {}", candidate)
            }
            SelectionResult::NoCandidates => "目录服务没有返回可用的代理".to_string(),
            SelectionResult::AllFailed => "所有候选代理均未通过检测".to_string(),
            SelectionResult::DirectoryError(e) => format!("获取代理列表失败: {}", e),
            SelectionResult::Cancelled => "代理选择已取消".to_string(),
            SelectionResult::AlreadyRunning => "已有代理选择正在进行".to_string(),
        }
    }
}

/// 单个候选的探测记录
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Attempt {
    pub candidate: ProxyCandidate,
    pub outcome: ProbeOutcome,
    pub elapsed_ms: u64,
}

#[derive(Debug, Clone, Serialize)]
pub struct SelectionReport {
    pub result: SelectionResult,
    pub attempts: Vec<Attempt>,
    pub started_at: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,
}

impl SelectionReport {
    pub(crate) fn new(
        result: SelectionResult,
        attempts: Vec<Attempt>,
        started_at: DateTime<Utc>,
    ) -> Self {
        Self {
            result,
            attempts,
            started_at,
            finished_at: Utc::now(),
        }
    }

    pub fn tried(&self) -> Vec<&ProxyCandidate> {
        self.attempts.iter().map(|a| &a.candidate).collect()
    }

    pub fn save_to_file<P: AsRef<Path>>(&self, path: P) -> anyhow::Result<()> {
        let content = serde_json::to_string_pretty(self)?;
        fs::write(path, content)?;
        Ok(())
    }
}
