//! The in-memory dot tree: loaded from a backing store, enriched with depth
//! and subtree metadata, and indexed by route.
use std::collections::HashMap;
use std::sync::Arc;

use thiserror::Error;
use tokio::task::JoinError;
use tracing::{info, instrument};

use crate::provider::ProviderPool;
use crate::{Dot, MetaDot};

mod loader;
mod meta;
mod routes;

pub use self::loader::{store_dots, Fanout, LoaderConfig, PAGE_SIZE};
pub use self::routes::RESERVED_SEGMENT;

/// Errors that make a tree unusable. Fatal to startup.
#[derive(Debug, Error)]
pub enum LoadError {
    #[error("loading dots [{lower}, {upper}) failed after retry: {source}")]
    PageFailed {
        lower: u64,
        upper: u64,
        source: crate::Error,
    },

    #[error("dot {0} was loaded more than once")]
    DuplicateId(u64),

    #[error("no root dot (id 0, parent 0) was loaded")]
    MissingRoot,

    #[error("dot {id} references missing parent {parent_id}")]
    MissingParent { id: u64, parent_id: u64 },

    #[error("dot {0} is part of a parent cycle")]
    Cycle(u64),

    #[error("page task failed: {0}")]
    Join(#[from] JoinError),
}

#[derive(Debug, Error, PartialEq)]
pub enum RouteError {
    #[error("route {0} is claimed by more than one dot")]
    DuplicateRoute(String),

    #[error("dot {id} has name {name:?}, which is not a route segment")]
    InvalidName { id: u64, name: String },
}

/// All dots of the tree, keyed by id, by name, and (once generated) by route.
#[derive(Debug, Default)]
pub struct DotTree {
    dots: HashMap<u64, MetaDot>,
    name_ids: HashMap<String, u64>,
    routes: HashMap<String, u64>,
}

impl DotTree {
    /// Loads every dot from the backing store behind `pool`, then computes
    /// their metadata. No tree is returned unless the whole load succeeds.
    #[instrument(skip_all, fields(source = %config.source, table = %config.table))]
    pub async fn load(pool: Arc<ProviderPool>, config: &LoaderConfig) -> Result<Self, LoadError> {
        let dots = loader::load_dots(pool, config).await?;
        let tree = Self::from_dots(dots)?;
        info!(dots = tree.len(), "dot tree loaded");
        Ok(tree)
    }

    /// Builds a tree out of already fetched dots.
    pub fn from_dots(dots: impl IntoIterator<Item = Dot>) -> Result<Self, LoadError> {
        let mut tree = Self::default();
        for dot in dots {
            if tree.dots.contains_key(&dot.id) {
                return Err(LoadError::DuplicateId(dot.id));
            }
            tree.name_ids.insert(dot.name.clone(), dot.id);
            tree.dots.insert(dot.id, MetaDot::new(dot));
        }

        meta::fill_meta_dots(&mut tree.dots)?;
        Ok(tree)
    }

    /// Assigns every non-root dot its canonical route and indexes it.
    /// Must run before routes can be looked up.
    pub fn generate_routes(&mut self) -> Result<(), RouteError> {
        self.routes = routes::build_routes(&mut self.dots)?;
        Ok(())
    }

    /// Given a route, returns the corresponding dot.
    pub fn get_dot(&self, route: &str) -> Option<&MetaDot> {
        self.routes.get(route).and_then(|id| self.dots.get(id))
    }

    pub fn dot(&self, id: u64) -> Option<&MetaDot> {
        self.dots.get(&id)
    }

    /// Looks up a dot id by name. Names are only unique among siblings, so
    /// for repeated names the last dot loaded wins.
    pub fn id_for_name(&self, name: &str) -> Option<u64> {
        self.name_ids.get(name).copied()
    }

    pub fn len(&self) -> usize {
        self.dots.len()
    }

    pub fn is_empty(&self) -> bool {
        self.dots.is_empty()
    }

    /// All routed dots, ordered by route.
    pub fn routes(&self) -> Vec<(&str, &MetaDot)> {
        let mut routes = self
            .routes
            .iter()
            .filter_map(|(route, id)| Some((route.as_str(), self.dots.get(id)?)))
            .collect::<Vec<_>>();
        routes.sort_by_key(|(route, _)| *route);
        routes
    }

    /// All dots, ordered by id.
    pub fn dots(&self) -> Vec<&MetaDot> {
        let mut dots = self.dots.values().collect::<Vec<_>>();
        dots.sort_by_key(|d| d.id());
        dots
    }

    /// Diagnostic dump of every dot as a JSON array, ordered by id.
    pub fn to_json(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string(&self.dots())
    }
}
