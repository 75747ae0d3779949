//! Shared test data: small trees, node configurations and a seeded
//! in-memory store.
use std::sync::Arc;

use lazy_static::lazy_static;

use crate::provider::{MemoryStore, PoolConfig, ProviderPool};
use crate::{Dot, QueryParams};

lazy_static! {
    /// A query writing `name` (required) and `age` (optional, digits only)
    /// to table `people` of data source `app`.
    pub static ref QUERY_CONFIG: String = serde_json::json!({
        "dot": {
            "query": {
                "q": [
                    {
                        "name": "name",
                        "type": "required",
                        "cdest": { "table": "people", "ds": "app" }
                    },
                    {
                        "name": "age",
                        "filter": { "type": "regex.gate", "value": "^[0-9]+$" },
                        "cdest": { "table": "people", "ds": "app" }
                    }
                ]
            }
        }
    })
    .to_string();

    /// Creates table `people` in data source `app`.
    pub static ref CONSTRUCT_CONFIG: String = serde_json::json!({
        "dot": {
            "construct": {
                "table": "people",
                "ds": "app",
                "d": [
                    { "name": "id", "type": "integer" },
                    { "name": "name", "type": "text" },
                    { "name": "age", "type": "integer" }
                ]
            }
        }
    })
    .to_string();

    /// A query without requirements or destinations, which always succeeds.
    pub static ref PASS_CONFIG: String = serde_json::json!({
        "dot": { "query": { "q": [] } }
    })
    .to_string();

    /// The smallest interesting tree: `/a` and `/a/b` below the root.
    pub static ref SCENARIO_DOTS: Vec<Dot> = vec![
        Dot::new(0, 0, "root", ""),
        Dot::new(1, 0, "a", QUERY_CONFIG.as_str()),
        Dot::new(2, 1, "b", QUERY_CONFIG.as_str()),
    ];
}

/// `count` dots (root included) where dot `i` hangs below dot
/// `(i - 1) / branching`: a chain for 1, a full tree of that degree otherwise.
pub fn generated_dots(count: u64, branching: u64) -> Vec<Dot> {
    let branching = branching.max(1);
    std::iter::once(Dot::new(0, 0, "root", ""))
        .chain((1..count).map(|i| Dot::new(i, (i - 1) / branching, format!("n{}", i), "")))
        .collect()
}

/// A fresh store and a pool handing out providers for it.
pub fn memory_pool() -> (MemoryStore, Arc<ProviderPool>) {
    let store = MemoryStore::default();
    let pool = Arc::new(ProviderPool::new(
        Arc::new(store.clone()),
        PoolConfig::default(),
    ));
    (store, pool)
}

/// Builds request parameters with a single value each.
pub fn params(pairs: &[(&str, &str)]) -> QueryParams {
    pairs
        .iter()
        .map(|(k, v)| (k.to_string(), vec![v.to_string()]))
        .collect()
}
