//! Shared embedding provider handles.
//!
//! Loading a model is expensive, so call sites that want the same model
//! should share one provider. [`EmbedderCache`] is an explicit,
//! cloneable handle for that: create one per application (or per test),
//! pass it to whoever needs a provider, and call [`reset`](EmbedderCache::reset)
//! to drop everything it holds.

use crate::embedding::EmbeddingProvider;
use semdex_core::Result;
use std::collections::HashMap;
use std::future::Future;
use std::sync::Arc;
use tokio::sync::Mutex;

/// Cache of initialized embedding providers keyed by name.
///
/// Cloning is cheap; clones share the same underlying map.
#[derive(Clone, Default)]
pub struct EmbedderCache {
    providers: Arc<Mutex<HashMap<String, Arc<dyn EmbeddingProvider>>>>,
}

impl EmbedderCache {
    /// Create an empty cache.
    pub fn new() -> Self {
        Self::default()
    }

    /// Return the provider registered under `name`, creating and
    /// initializing it with `factory` on first use.
    ///
    /// Concurrent callers asking for the same name wait for the first
    /// load instead of starting their own.
    pub async fn get_or_init<F, Fut>(
        &self,
        name: &str,
        factory: F,
    ) -> Result<Arc<dyn EmbeddingProvider>>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<Arc<dyn EmbeddingProvider>>>,
    {
        let mut providers = self.providers.lock().await;
        if let Some(provider) = providers.get(name) {
            return Ok(Arc::clone(provider));
        }

        log::debug!("Loading embedding provider '{name}'");
        let provider = factory().await?;
        if !provider.is_initialized() {
            provider.init().await?;
        }

        providers.insert(name.to_string(), Arc::clone(&provider));
        Ok(provider)
    }

    /// The provider registered under `name`, if any.
    pub async fn get(&self, name: &str) -> Option<Arc<dyn EmbeddingProvider>> {
        self.providers.lock().await.get(name).cloned()
    }

    /// Number of cached providers.
    pub async fn len(&self) -> usize {
        self.providers.lock().await.len()
    }

    /// Whether the cache holds no providers.
    pub async fn is_empty(&self) -> bool {
        self.providers.lock().await.is_empty()
    }

    /// Drop every cached provider.
    pub async fn reset(&self) {
        self.providers.lock().await.clear();
    }
}

impl std::fmt::Debug for EmbedderCache {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EmbedderCache").finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::embedding::MockEmbeddingProvider;
    use std::sync::atomic::{AtomicUsize, Ordering};

    fn counting_factory(
        loads: Arc<AtomicUsize>,
    ) -> impl FnOnce() -> std::future::Ready<Result<Arc<dyn EmbeddingProvider>>> {
        move || {
            loads.fetch_add(1, Ordering::SeqCst);
            let provider: Arc<dyn EmbeddingProvider> =
                Arc::new(MockEmbeddingProvider::uninitialized(8));
            std::future::ready(Ok(provider))
        }
    }

    #[tokio::test]
    async fn test_loads_once_per_name() {
        let cache = EmbedderCache::new();
        let loads = Arc::new(AtomicUsize::new(0));

        let a = cache
            .get_or_init("mock", counting_factory(loads.clone()))
            .await
            .unwrap();
        let b = cache
            .get_or_init("mock", counting_factory(loads.clone()))
            .await
            .unwrap();

        assert_eq!(loads.load(Ordering::SeqCst), 1);
        assert!(Arc::ptr_eq(&a, &b));
        assert_eq!(cache.len().await, 1);
    }

    #[tokio::test]
    async fn test_initializes_provider() {
        let cache = EmbedderCache::new();
        let provider = cache
            .get_or_init("mock", counting_factory(Arc::new(AtomicUsize::new(0))))
            .await
            .unwrap();

        assert!(provider.is_initialized());
        assert!(provider.embed("ready").await.is_ok());
    }

    #[tokio::test]
    async fn test_clones_share_state() {
        let cache = EmbedderCache::new();
        let clone = cache.clone();
        let loads = Arc::new(AtomicUsize::new(0));

        cache
            .get_or_init("shared", counting_factory(loads.clone()))
            .await
            .unwrap();
        assert!(clone.get("shared").await.is_some());

        clone
            .get_or_init("shared", counting_factory(loads.clone()))
            .await
            .unwrap();
        assert_eq!(loads.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_reset_forces_reload() {
        let cache = EmbedderCache::new();
        let loads = Arc::new(AtomicUsize::new(0));

        cache
            .get_or_init("mock", counting_factory(loads.clone()))
            .await
            .unwrap();
        cache.reset().await;
        assert!(cache.is_empty().await);

        cache
            .get_or_init("mock", counting_factory(loads.clone()))
            .await
            .unwrap();
        assert_eq!(loads.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn test_factory_error_is_not_cached() {
        let cache = EmbedderCache::new();
        let result = cache
            .get_or_init("broken", || async {
                Err(semdex_core::Error::operation("model missing"))
            })
            .await;

        assert!(result.is_err());
        assert!(cache.get("broken").await.is_none());
    }
}
