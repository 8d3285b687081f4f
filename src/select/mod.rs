//! 代理选择流程
//! 拉取候选 → 按顺序逐个安装并探测 → 第一个通过的保留安装

mod types;

pub use types::{Attempt, SelectionReport, SelectionResult};

use chrono::Utc;
use log::{debug, info, warn};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::{Duration, Instant};

use crate::check::{CandidateProber, ProbeOutcome};
use crate::config::Config;
use crate::directory::DirectorySource;
use crate::proxy::{ProxyCandidate, ProxyInstaller};
use crate::ui::progress::ProgressTracker;

/// 选择流程的固定参数
#[derive(Debug, Clone, PartialEq)]
pub struct SelectionOptions {
    pub probe_target: String,
    pub probe_timeout: Duration,
    /// 最多探测多少个候选，0 表示不限
    pub max_attempts: usize,
    /// 全部失败时清除已安装的代理
    pub clear_on_exhaustion: bool,
}

impl SelectionOptions {
    pub fn from_config(config: &Config) -> Self {
        Self {
            probe_target: config.probe_url.clone(),
            probe_timeout: config.get_timeout_duration(),
            max_attempts: config.max_attempts,
            clear_on_exhaustion: config.clear_on_exhaustion,
        }
    }
}

impl Default for SelectionOptions {
    fn default() -> Self {
        Self::from_config(&Config::default())
    }
}

/// 取消标记，在当前探测结束后生效
#[derive(Debug, Clone, Default)]
pub struct CancelToken(Arc<AtomicBool>);

impl CancelToken {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }
}

pub struct SelectionOrchestrator {
    directory: Arc<dyn DirectorySource>,
    prober: Arc<dyn CandidateProber>,
    installer: Arc<dyn ProxyInstaller>,
    options: SelectionOptions,
    progress: ProgressTracker,
}

impl SelectionOrchestrator {
    pub fn new(
        directory: Arc<dyn DirectorySource>,
        prober: Arc<dyn CandidateProber>,
        installer: Arc<dyn ProxyInstaller>,
        options: SelectionOptions,
    ) -> Self {
        Self {
            directory,
            prober,
            installer,
            options,
            progress: ProgressTracker::hidden(),
        }
    }

    pub fn with_progress(mut self, progress: ProgressTracker) -> Self {
        self.progress = progress;
        self
    }

    pub fn options(&self) -> &SelectionOptions {
        &self.options
    }

    pub async fn select_and_apply(&self) -> SelectionReport {
        self.select_and_apply_with(&CancelToken::new()).await
    }

    /// 运行一次完整的选择流程
    ///
    /// 共享同一安装器的另一运行尚未结束时立即返回 `AlreadyRunning`，不排队。
    pub async fn select_and_apply_with(&self, cancel: &CancelToken) -> SelectionReport {
        let started_at = Utc::now();
        let Some(_guard) = self.installer.try_begin_run() else {
            warn!("已有代理选择正在进行，拒绝本次请求");
            return SelectionReport::new(SelectionResult::AlreadyRunning, vec![], started_at);
        };

        self.progress.start_fetch();
        let candidates = match self.directory.fetch().await {
            Ok(candidates) => candidates,
            Err(e) => {
                warn!("获取候选代理失败: {}", e);
                let result = SelectionResult::DirectoryError(e);
                self.progress.finish_fetch(&result.message());
                self.progress.finalize(&result.message());
                return SelectionReport::new(result, vec![], started_at);
            }
        };
        self.progress
            .finish_fetch(&format!("获取到 {} 个候选代理", candidates.len()));

        if candidates.is_empty() {
            info!("目录服务没有返回可用候选");
            let result = SelectionResult::NoCandidates;
            self.progress.finalize(&result.message());
            return SelectionReport::new(result, vec![], started_at);
        }

        let limit = match self.options.max_attempts {
            0 => candidates.len(),
            n => n.min(candidates.len()),
        };
        self.progress.set_total_candidates(limit as u64);

        let mut attempts = Vec::with_capacity(limit);
        for (index, candidate) in candidates.into_iter().take(limit).enumerate() {
            if cancel.is_cancelled() {
                return self.finish_unselected(SelectionResult::Cancelled, attempts, started_at);
            }

            debug!("探测第 {}/{} 个候选 {}", index + 1, limit, candidate);
            self.progress.start_candidate(&candidate);

            let (outcome, elapsed) = self.try_candidate(&candidate).await;
            self.progress.record_outcome(&outcome);
            let success = outcome.is_success();
            attempts.push(Attempt {
                candidate: candidate.clone(),
                outcome,
                elapsed_ms: elapsed.as_millis() as u64,
            });

            if success {
                info!("选中代理 {}（第 {} 个候选）", candidate, index + 1);
                let result = SelectionResult::Selected(candidate);
                self.progress.finalize(&result.message());
                return SelectionReport::new(result, attempts, started_at);
            }
        }

        let result = if cancel.is_cancelled() {
            SelectionResult::Cancelled
        } else {
            SelectionResult::AllFailed
        };
        self.finish_unselected(result, attempts, started_at)
    }

    /// 手动指定代理
    ///
    /// `verify` 为 false 时直接安装；为 true 时先安装再探测，失败则恢复之前的代理。
    pub async fn apply_manual(&self, candidate: ProxyCandidate, verify: bool) -> SelectionReport {
        let started_at = Utc::now();
        let Some(_guard) = self.installer.try_begin_run() else {
            return SelectionReport::new(SelectionResult::AlreadyRunning, vec![], started_at);
        };

        if !verify {
            self.installer.apply(&candidate);
            info!("已手动设置代理 {}", candidate);
            return SelectionReport::new(SelectionResult::Selected(candidate), vec![], started_at);
        }

        let previous = self.installer.current();
        let (outcome, elapsed) = self.try_candidate(&candidate).await;
        let success = outcome.is_success();
        let attempts = vec![Attempt {
            candidate: candidate.clone(),
            outcome,
            elapsed_ms: elapsed.as_millis() as u64,
        }];

        if success {
            info!("已手动设置代理 {}", candidate);
            return SelectionReport::new(SelectionResult::Selected(candidate), attempts, started_at);
        }

        match previous {
            Some(previous) => self.installer.apply(&previous),
            None => self.installer.clear(),
        }
        SelectionReport::new(SelectionResult::AllFailed, attempts, started_at)
    }

    /// 先安装，再经已安装的代理探测
    async fn try_candidate(&self, candidate: &ProxyCandidate) -> (ProbeOutcome, Duration) {
        self.installer.apply(candidate);

        let start = Instant::now();
        let outcome = self
            .prober
            .check(candidate, &self.options.probe_target, self.options.probe_timeout)
            .await;
        let elapsed = start.elapsed();

        if let ProbeOutcome::Failure(reason) = &outcome {
            info!("候选 {} 未通过探测: {}", candidate, reason);
        }
        (outcome, elapsed)
    }

    fn finish_unselected(
        &self,
        result: SelectionResult,
        attempts: Vec<Attempt>,
        started_at: chrono::DateTime<Utc>,
    ) -> SelectionReport {
        // 此时已安装的代理一定没有通过探测
        if self.options.clear_on_exhaustion && !attempts.is_empty() {
            self.installer.clear();
        }
        warn!("{}（共尝试 {} 个候选）", result.message(), attempts.len());
        self.progress.finalize(&result.message());
        SelectionReport::new(result, attempts, started_at)
    }
}
