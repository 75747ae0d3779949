use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use parking_lot::Mutex;

use crate::provider::{
    DotProvider, Fields, MemoryProvider, MemoryStore, PoolConfig, ProviderFactory, ProviderPool,
    Row,
};
use crate::Error;


/// Hands out [FlakyProvider]s over a [MemoryStore], failing page reads on
/// demand.
#[derive(Clone, Default)]
pub struct FlakyFactory {
    store: MemoryStore,
    /// Remaining failures, by lower page bound.
    failures: Arc<Mutex<HashMap<u64, u32>>>,
    /// Reads attempted, by lower page bound.
    attempts: Arc<Mutex<HashMap<u64, u32>>>,
    /// Hide whether rows exist past a page, forcing the short-page rule.
    blind: bool,
}

impl FlakyFactory {
    pub fn new(store: MemoryStore) -> Self {
        Self {
            store,
            ..Default::default()
        }
    }

    pub fn blind(mut self) -> Self {
        self.blind = true;
        self
    }

    /// Makes the next `times` reads of the page starting at `lower` fail.
    pub fn fail_page(self, lower: u64, times: u32) -> Self {
        self.failures.lock().insert(lower, times);
        self
    }

    pub fn attempts(&self, lower: u64) -> u32 {
        self.attempts.lock().get(&lower).copied().unwrap_or_default()
    }

    pub fn pool(&self) -> Arc<ProviderPool> {
        Arc::new(ProviderPool::new(
            Arc::new(self.clone()),
            PoolConfig::default(),
        ))
    }
}

#[async_trait]
impl ProviderFactory for FlakyFactory {
    async fn instance(&self) -> Result<Box<dyn DotProvider>, Error> {
        Ok(Box::new(FlakyProvider {
            inner: MemoryProvider::new(self.store.clone()),
            factory: self.clone(),
            lower: None,
        }))
    }
}

pub struct FlakyProvider {
    inner: MemoryProvider,
    factory: FlakyFactory,
    lower: Option<u64>,
}

#[async_trait]
impl DotProvider for FlakyProvider {
    async fn init(&mut self, source: &str) -> Result<(), Error> {
        self.inner.init(source).await
    }

    fn source(&self) -> Option<&str> {
        self.inner.source()
    }

    fn init_fields(&mut self, fields: Fields) {
        self.lower = fields.range.as_ref().map(|r| r.start);
        self.inner.init_fields(fields)
    }

    async fn construct(&mut self) -> Result<(), Error> {
        self.inner.construct().await
    }

    async fn create(&mut self) -> Result<(), Error> {
        self.inner.create().await
    }

    async fn update(&mut self) -> Result<(), Error> {
        self.inner.update().await
    }

    async fn destroy(&mut self) -> Result<(), Error> {
        self.inner.destroy().await
    }

    async fn begin(&mut self) -> Result<bool, Error> {
        if let Some(lower) = self.lower {
            *self.factory.attempts.lock().entry(lower).or_default() += 1;

            let mut failures = self.factory.failures.lock();
            if let Some(remaining) = failures.get_mut(&lower).filter(|r| **r > 0) {
                *remaining -= 1;
                return Err(Error::StorageError(format!("page {} failed", lower)));
            }
        }
        self.inner.begin().await
    }

    fn has_more(&self) -> bool {
        self.inner.has_more()
    }

    async fn produce(&mut self) -> Result<Row, Error> {
        self.inner.produce().await
    }

    fn rows_beyond_range(&self) -> Option<bool> {
        if self.factory.blind {
            None
        } else {
            self.inner.rows_beyond_range()
        }
    }

    async fn finalize(&mut self) -> Result<(), Error> {
        self.inner.finalize().await
    }

    fn reset(&mut self) {
        self.lower = None;
        self.inner.reset()
    }
}
