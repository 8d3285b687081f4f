//! 进程级出站代理配置
//! 同一时刻最多安装一个代理，后写覆盖先写

use lazy_static::lazy_static;
use log::{debug, info};
use std::sync::{Arc, RwLock};
use std::time::Duration;
use tokio::sync::{Mutex, OwnedMutexGuard};

use super::ProxyCandidate;

/// 安装/清除进程级代理的接口
///
/// 安装是本地状态修改，不会失败；重复调用以最后一次为准。
pub trait ProxyInstaller: Send + Sync {
    fn apply(&self, candidate: &ProxyCandidate);
    fn clear(&self);
    fn current(&self) -> Option<ProxyCandidate>;

    /// 占用选择运行权；已有运行持有时返回 `None`
    ///
    /// 运行权跟随代理槽位本身，共享同一个安装器的所有编排器互斥。
    fn try_begin_run(&self) -> Option<OwnedMutexGuard<()>>;
}

impl<T: ProxyInstaller + ?Sized> ProxyInstaller for &T {
    fn apply(&self, candidate: &ProxyCandidate) {
        (**self).apply(candidate)
    }

    fn clear(&self) {
        (**self).clear()
    }

    fn current(&self) -> Option<ProxyCandidate> {
        (**self).current()
    }

    fn try_begin_run(&self) -> Option<OwnedMutexGuard<()>> {
        (**self).try_begin_run()
    }
}

lazy_static! {
    static ref GLOBAL_ACTIVE_PROXY: ActiveProxy = ActiveProxy::new();
}

/// 当前生效的出站代理
#[derive(Debug, Default)]
pub struct ActiveProxy {
    slot: RwLock<Option<ProxyCandidate>>,
    run_lock: Arc<Mutex<()>>,
}

/// 经 `proxy` 路由的客户端构建器；`None` 表示直连
pub(crate) fn routed_client_builder(
    proxy: Option<&ProxyCandidate>,
    timeout: Duration,
) -> reqwest::Result<reqwest::ClientBuilder> {
    let builder = reqwest::Client::builder().timeout(timeout);
    Ok(match proxy {
        Some(candidate) => builder.proxy(reqwest::Proxy::all(candidate.to_proxy_url())?),
        None => builder.no_proxy(),
    })
}

impl ActiveProxy {
    pub fn new() -> Self {
        Self::default()
    }

    /// 整个进程共享的实例
    pub fn global() -> &'static ActiveProxy {
        &GLOBAL_ACTIVE_PROXY
    }

    /// 按当前代理配置好的客户端构建器，供后续所有出站请求使用
    pub fn client_builder(&self, timeout: Duration) -> anyhow::Result<reqwest::ClientBuilder> {
        Ok(routed_client_builder(self.current().as_ref(), timeout)?)
    }
}

impl ProxyInstaller for ActiveProxy {
    fn apply(&self, candidate: &ProxyCandidate) {
        // 锁中毒时仍然写入：槽位只有一个 Option，不存在半写状态
        let mut slot = self.slot.write().unwrap_or_else(|e| e.into_inner());
        debug!("安装代理 {}", candidate);
        *slot = Some(candidate.clone());
    }

    fn clear(&self) {
        let mut slot = self.slot.write().unwrap_or_else(|e| e.into_inner());
        if let Some(previous) = slot.take() {
            info!("已清除代理 {}", previous);
        }
    }

    fn try_begin_run(&self) -> Option<OwnedMutexGuard<()>> {
        self.run_lock.clone().try_lock_owned().ok()
    }

    fn current(&self) -> Option<ProxyCandidate> {
        self.slot.read().unwrap_or_else(|e| e.into_inner()).clone()
    }
}
