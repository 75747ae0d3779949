//! Request dispatch over the route tree.
//!
//! Every routed dot gets a mailbox and a dispatcher task. A request enters
//! at its entry route and is handed from mailbox to mailbox, one segment at
//! a time, until it reaches its target or a dot reports errors.
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use thiserror::Error;
use tokio::sync::mpsc;
use tokio::task::JoinSet;
use tokio_util::sync::CancellationToken;
use tracing::{info, instrument, warn};

use crate::provider::ProviderPool;
use crate::tree::{DotTree, RouteError, RESERVED_SEGMENT};
use crate::{DotError, ErrorKind, Outcome, QueryParams, RequestDot};

mod config;
mod dispatcher;
mod ops;
mod patterns;

pub use self::config::{
    ConfigError, ConstructSet, DestroySet, Destination, DotConfig, FieldDefinition, Filter,
    FilterKind, ParamKind, QueryParam, QuerySet,
};
pub use self::patterns::PatternCache;

use self::dispatcher::Dispatcher;

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct DispatchConfig {
    /// Requests buffered per route before senders wait.
    pub mailbox_capacity: usize,
    /// How long [DotRouter::request] waits for an outcome.
    pub request_timeout: Duration,
}

impl Default for DispatchConfig {
    fn default() -> Self {
        Self {
            mailbox_capacity: 100,
            request_timeout: Duration::from_secs(30),
        }
    }
}

/// Failures at the call boundary. Failures while processing a request are
/// delivered as its [Outcome] instead.
#[derive(Debug, Error, PartialEq)]
pub enum DispatchError {
    #[error("no dot serves route {0}")]
    RouteNotFound(String),

    #[error("no outcome within {0:?}")]
    Timeout(Duration),

    #[error("request dropped without an outcome")]
    Dropped,

    #[error("dispatcher is shut down")]
    Closed,
}

/// Whether `route` addresses a configuration document.
pub(crate) fn is_reserved(route: &str) -> bool {
    route.rsplit('/').next() == Some(RESERVED_SEGMENT)
}

/// Everything dispatchers share. Read-only once built.
pub(crate) struct Routing {
    tree: DotTree,
    patterns: PatternCache,
    mailboxes: HashMap<String, mpsc::Sender<RequestDot>>,
    pool: Arc<ProviderPool>,
}

/// The running dispatch engine: one dispatcher per route.
pub struct DotRouter {
    routing: Arc<Routing>,
    config: DispatchConfig,
    cancel: CancellationToken,
    tasks: JoinSet<()>,
}

impl DotRouter {
    /// Generates routes for `tree`, parses every dot's configuration and
    /// starts one dispatcher per route. Must be called within a tokio runtime.
    ///
    /// A dot's configuration is read from its `dot.json` child if it has
    /// one, and from its own value otherwise. Configuration errors don't
    /// prevent startup; they are reported to every request reaching the dot.
    #[instrument(skip_all, fields(dots = tree.len()))]
    pub fn start(
        mut tree: DotTree,
        pool: Arc<ProviderPool>,
        config: DispatchConfig,
    ) -> Result<Self, RouteError> {
        tree.generate_routes()?;

        let mut patterns = PatternCache::default();
        let mut nodes = Vec::new();
        for (route, dot) in tree.routes() {
            if is_reserved(route) {
                continue;
            }
            let value = tree
                .get_dot(&format!("{}/{}", route, RESERVED_SEGMENT))
                .unwrap_or(dot)
                .value();
            let dot_config =
                DotConfig::parse(value).and_then(|c| c.compile_patterns(&mut patterns).map(|_| c));
            if let Err(e) = &dot_config {
                warn!(dot.id = dot.id(), dot.route = route, err = %e, "invalid dot config");
            }
            nodes.push((dot.clone(), route.to_string(), dot_config));
        }

        let mut mailboxes = HashMap::with_capacity(nodes.len());
        let mut receivers = Vec::with_capacity(nodes.len());
        for (dot, route, dot_config) in nodes {
            let (tx, rx) = mpsc::channel(config.mailbox_capacity.max(1));
            mailboxes.insert(route.clone(), tx);
            receivers.push((dot, route, dot_config, rx));
        }

        let routing = Arc::new(Routing {
            tree,
            patterns,
            mailboxes,
            pool,
        });

        let cancel = CancellationToken::new();
        let mut tasks = JoinSet::new();
        for (dot, route, dot_config, rx) in receivers {
            let dispatcher = Dispatcher::new(dot, route, dot_config, routing.clone());
            tasks.spawn(dispatcher.run(rx, cancel.clone()));
        }
        info!(routes = tasks.len(), "dispatchers started");

        Ok(Self {
            routing,
            config,
            cancel,
            tasks,
        })
    }

    pub fn tree(&self) -> &DotTree {
        &self.routing.tree
    }

    /// Number of compiled filter patterns.
    pub fn pattern_count(&self) -> usize {
        self.routing.patterns.len()
    }

    /// Delivers `rd` to the dispatcher of its entry route. The outcome
    /// arrives on the request's [crate::PendingResult].
    pub async fn submit(&self, rd: RequestDot) -> Result<(), DispatchError> {
        let entry = rd.current_sub_route();
        if is_reserved(entry) {
            // configuration documents are dots too, but never dispatched to
            let Some(dot) = self.routing.tree.get_dot(entry) else {
                return Err(DispatchError::RouteNotFound(entry.to_string()));
            };
            let mut errors = DotError::new(dot.id());
            errors.push(
                ErrorKind::Protocol,
                "subroute should never directly reference dot.json",
            );
            rd.complete(Outcome::Failed(errors));
            return Ok(());
        }

        let mailbox = self
            .routing
            .mailboxes
            .get(entry)
            .ok_or_else(|| DispatchError::RouteNotFound(entry.to_string()))?;
        mailbox.send(rd).await.map_err(|_| DispatchError::Closed)
    }

    /// Issues one request and waits for its outcome, up to the configured
    /// request timeout.
    #[instrument(skip(self, params))]
    pub async fn request(
        &self,
        params: QueryParams,
        entry: &str,
        target: &str,
    ) -> Result<Outcome, DispatchError> {
        let (rd, pending) = RequestDot::new(params, entry, target);
        self.submit(rd).await?;
        pending.wait(self.config.request_timeout).await
    }

    /// Stops every dispatcher and waits for them to finish. Requests still
    /// queued are dropped, so their callers see [DispatchError::Dropped].
    pub async fn shutdown(mut self) {
        self.cancel.cancel();
        while let Some(result) = self.tasks.join_next().await {
            if let Err(e) = result {
                warn!(err = %e, "dispatcher task failed");
            }
        }
        info!("dispatchers stopped");
    }
}
