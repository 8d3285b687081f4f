use indicatif::{MultiProgress, ProgressBar, ProgressStyle};
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use crate::check::ProbeOutcome;
use crate::proxy::ProxyCandidate;

/// 目录拉取和逐个探测的终端进度显示
#[derive(Clone)]
pub struct ProgressTracker {
    multi_progress: Option<Arc<MultiProgress>>,
    fetch_progress: Option<ProgressBar>,
    probe_progress: Option<ProgressBar>,
    checked_nodes: Arc<AtomicU64>,
    failed_nodes: Arc<AtomicU64>,
}

impl ProgressTracker {
    pub fn new(enabled: bool) -> Self {
        if !enabled {
            return Self::hidden();
        }

        let multi_progress = Arc::new(MultiProgress::new());

        // 目录拉取
        let fetch_progress = multi_progress.add(ProgressBar::new_spinner());
        fetch_progress.set_style(
            ProgressStyle::with_template("{spinner:.green} [{elapsed_precise}] {msg}")
                .unwrap_or_else(|_| ProgressStyle::default_spinner()),
        );

        // 候选探测
        let probe_progress = multi_progress.add(ProgressBar::new(0));
        probe_progress.set_style(
            ProgressStyle::with_template(
                "  {spinner:.yellow} 探测候选: [{bar:30.yellow}] {pos}/{len} {msg}",
            )
            .unwrap_or_else(|_| ProgressStyle::default_bar())
            .progress_chars("█▉▊▋▌▍▎▏  "),
        );

        Self {
            multi_progress: Some(multi_progress),
            fetch_progress: Some(fetch_progress),
            probe_progress: Some(probe_progress),
            checked_nodes: Arc::new(AtomicU64::new(0)),
            failed_nodes: Arc::new(AtomicU64::new(0)),
        }
    }

    /// 不输出任何内容，只计数
    pub fn hidden() -> Self {
        Self {
            multi_progress: None,
            fetch_progress: None,
            probe_progress: None,
            checked_nodes: Arc::new(AtomicU64::new(0)),
            failed_nodes: Arc::new(AtomicU64::new(0)),
        }
    }

    pub fn is_enabled(&self) -> bool {
        self.multi_progress.is_some()
    }

    pub fn start_fetch(&self) {
        if let Some(pb) = &self.fetch_progress {
            pb.enable_steady_tick(Duration::from_millis(100));
            pb.set_message("正在获取候选代理...");
        }
    }

    pub fn finish_fetch(&self, message: &str) {
        if let Some(pb) = &self.fetch_progress {
            pb.finish_with_message(message.to_string());
        }
    }

    pub fn set_total_candidates(&self, total: u64) {
        self.checked_nodes.store(0, Ordering::Relaxed);
        self.failed_nodes.store(0, Ordering::Relaxed);
        if let Some(pb) = &self.probe_progress {
            pb.set_length(total);
            pb.set_position(0);
        }
    }

    pub fn start_candidate(&self, candidate: &ProxyCandidate) {
        if let Some(pb) = &self.probe_progress {
            pb.set_message(candidate.to_string());
        }
    }

    pub fn record_outcome(&self, outcome: &ProbeOutcome) {
        self.checked_nodes.fetch_add(1, Ordering::Relaxed);
        if !outcome.is_success() {
            self.failed_nodes.fetch_add(1, Ordering::Relaxed);
        }
        if let Some(pb) = &self.probe_progress {
            pb.inc(1);
        }
    }

    pub fn checked(&self) -> u64 {
        self.checked_nodes.load(Ordering::Relaxed)
    }

    pub fn failed(&self) -> u64 {
        self.failed_nodes.load(Ordering::Relaxed)
    }

    /// 隐藏模式下恒为 true
    pub fn is_finished(&self) -> bool {
        self.probe_progress
            .as_ref()
            .is_none_or(|pb| pb.is_finished())
    }

    pub fn finalize(&self, message: &str) {
        if let Some(pb) = &self.fetch_progress {
            if !pb.is_finished() {
                pb.finish_and_clear();
            }
        }
        if let Some(pb) = &self.probe_progress {
            pb.finish_with_message(format!(
                "{} (已探测 {}, 失败 {})",
                message,
                self.checked(),
                self.failed()
            ));
        }
    }
}
