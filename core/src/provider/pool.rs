use std::collections::HashMap;
use std::ops::{Deref, DerefMut};
use std::sync::Arc;

use parking_lot::Mutex;
use serde::Deserialize;
use tracing::{debug, instrument};

use super::{DotProvider, ProviderFactory};
use crate::Error;

/// Configuration of a [ProviderPool], usually parsed from the query string
/// of a provider address.
#[derive(Clone, Debug, PartialEq, Eq, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct PoolConfig {
    /// How many idle instances to keep around per data source.
    #[serde(default = "default_max_idle")]
    pub max_idle: usize,
}

impl Default for PoolConfig {
    fn default() -> Self {
        Self {
            max_idle: default_max_idle(),
        }
    }
}

fn default_max_idle() -> usize {
    8
}

/// Lends [DotProvider] instances bound to a data source and takes them back.
///
/// Instances are never shared; a borrower has exclusive use of one until it
/// drops the [PooledProvider].
pub struct ProviderPool {
    factory: Arc<dyn ProviderFactory>,
    idle: Mutex<HashMap<String, Vec<Box<dyn DotProvider>>>>,
    config: PoolConfig,
}

impl ProviderPool {
    pub fn new(factory: Arc<dyn ProviderFactory>, config: PoolConfig) -> Self {
        Self {
            factory,
            idle: Default::default(),
            config,
        }
    }

    /// Borrows an instance bound to `source`, reusing an idle one if possible.
    #[instrument(skip(self))]
    pub async fn get(self: &Arc<Self>, source: &str) -> Result<PooledProvider, Error> {
        let reused = self
            .idle
            .lock()
            .get_mut(source)
            .and_then(|instances| instances.pop());

        let provider = match reused {
            Some(provider) => provider,
            None => {
                debug!("creating new provider instance");
                let mut provider = self.factory.instance().await?;
                provider.init(source).await?;
                provider
            }
        };

        Ok(PooledProvider {
            provider: Some(provider),
            pool: self.clone(),
        })
    }

    /// Number of idle instances held for `source`.
    pub fn idle_count(&self, source: &str) -> usize {
        self.idle.lock().get(source).map_or(0, Vec::len)
    }

    fn put(&self, mut provider: Box<dyn DotProvider>) {
        let Some(source) = provider.source().map(str::to_string) else {
            return;
        };
        provider.reset();

        let mut idle = self.idle.lock();
        let instances = idle.entry(source).or_default();
        if instances.len() < self.config.max_idle {
            instances.push(provider);
        }
    }
}

/// A [DotProvider] borrowed from a [ProviderPool]. Returned on drop.
pub struct PooledProvider {
    provider: Option<Box<dyn DotProvider>>,
    pool: Arc<ProviderPool>,
}

impl PooledProvider {
    /// Drops the instance instead of returning it to the pool, for instances
    /// left in an unknown state by a failed operation.
    pub fn discard(mut self) {
        self.provider.take();
    }
}

impl Deref for PooledProvider {
    type Target = dyn DotProvider;

    fn deref(&self) -> &Self::Target {
        self.provider
            .as_deref()
            .expect("provider is only taken on drop or discard")
    }
}

impl DerefMut for PooledProvider {
    fn deref_mut(&mut self) -> &mut Self::Target {
        self.provider
            .as_deref_mut()
            .expect("provider is only taken on drop or discard")
    }
}

impl Drop for PooledProvider {
    fn drop(&mut self) {
        if let Some(provider) = self.provider.take() {
            self.pool.put(provider);
        }
    }
}
