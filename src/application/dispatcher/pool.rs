use crate::infrastructure::proxy::ProxyHandle;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use tokio::sync::RwLock;

/// Replaceable set of egress points, handed out round-robin.
pub struct ProxyPool {
    proxies: RwLock<Arc<Vec<ProxyHandle>>>,
    cursor: AtomicUsize,
    direct: ProxyHandle,
}

impl Default for ProxyPool {
    fn default() -> Self {
        Self::new(Vec::new())
    }
}

impl ProxyPool {
    pub fn new(proxies: Vec<ProxyHandle>) -> Self {
        Self {
            proxies: RwLock::new(Arc::new(proxies)),
            cursor: AtomicUsize::new(0),
            direct: ProxyHandle::direct(),
        }
    }

    /// Swaps the whole set; units already running keep the proxy they got.
    pub async fn set_proxies(&self, proxies: Vec<ProxyHandle>) {
        tracing::info!(count = proxies.len(), "Replacing proxy list");
        *self.proxies.write().await = Arc::new(proxies);
    }

    pub async fn len(&self) -> usize {
        self.proxies.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.len().await == 0
    }

    /// Next proxy in rotation, or a direct handle when the pool is empty.
    pub async fn next(&self) -> ProxyHandle {
        let proxies = Arc::clone(&*self.proxies.read().await);
        if proxies.is_empty() {
            return self.direct.clone();
        }
        let idx = self.cursor.fetch_add(1, Ordering::Relaxed) % proxies.len();
        proxies[idx].clone()
    }
}
