use std::sync::Arc;

use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, instrument, Instrument};

use super::config::{ConfigError, DotConfig};
use super::{is_reserved, ops, Routing};
use crate::{DotError, ErrorKind, MetaDot, Outcome, RequestDot};

/// The long-lived task serving one route.
pub(super) struct Dispatcher {
    dot: MetaDot,
    route: String,
    config: Result<DotConfig, ConfigError>,
    routing: Arc<Routing>,
}

impl Dispatcher {
    pub(super) fn new(
        dot: MetaDot,
        route: String,
        config: Result<DotConfig, ConfigError>,
        routing: Arc<Routing>,
    ) -> Self {
        Self {
            dot,
            route,
            config,
            routing,
        }
    }

    /// Processes requests from the mailbox, one at a time, until cancelled.
    pub(super) async fn run(
        self,
        mut mailbox: mpsc::Receiver<RequestDot>,
        cancel: CancellationToken,
    ) {
        debug!(dot.id = self.dot.id(), dot.route = %self.route, "dispatcher started");
        loop {
            tokio::select! {
                biased;
                _ = cancel.cancelled() => break,
                rd = mailbox.recv() => match rd {
                    Some(rd) => self.handle(rd).await,
                    None => break,
                },
            }
        }
        debug!(dot.route = %self.route, "dispatcher stopped");
    }

    /// One hop: run this dot's operation, then complete, fail or forward.
    #[instrument(skip_all, fields(dot.id = self.dot.id(), dot.route = %self.route, target = %rd.route_complete()))]
    async fn handle(&self, mut rd: RequestDot) {
        rd.dot = self.dot.dot().clone();
        let mut errors = DotError::new(self.dot.id());

        if is_reserved(rd.current_sub_route()) {
            errors.push(
                ErrorKind::Protocol,
                "subroute should never directly reference dot.json",
            );
            return rd.complete(Outcome::Failed(errors));
        }
        if rd.current_sub_route() != self.route {
            errors.push(
                ErrorKind::Protocol,
                format!(
                    "subroute {} does not match the dot route",
                    rd.current_sub_route()
                ),
            );
            return rd.complete(Outcome::Failed(errors));
        }

        match &self.config {
            Err(e) => errors.push(
                ErrorKind::Configuration,
                format!("{}: {}", self.route, e),
            ),
            Ok(DotConfig::Query(query)) => {
                ops::query(
                    query,
                    &rd,
                    &self.dot,
                    &self.routing.pool,
                    &self.routing.patterns,
                    &mut errors,
                )
                .await
            }
            Ok(DotConfig::Construct(construct)) => {
                ops::construct(construct, &self.dot, &self.routing.pool, &mut errors).await
            }
            Ok(DotConfig::Destroy(destroy)) => ops::destroy(destroy, &self.dot).await,
        }

        // errors short-circuit, even on the target itself
        if !errors.is_empty() {
            return rd.complete(Outcome::Failed(errors));
        }
        if rd.is_complete() {
            let complete = rd.route_complete().to_string();
            return rd.complete(Outcome::Complete { complete });
        }

        let Some(next) = next_route(&self.route, rd.route_complete()) else {
            errors.push(
                ErrorKind::Protocol,
                format!(
                    "route {} does not continue below {}",
                    rd.route_complete(),
                    self.route
                ),
            );
            return rd.complete(Outcome::Failed(errors));
        };
        let mailbox = match self.routing.mailboxes.get(&next) {
            Some(mailbox) if !is_reserved(&next) => mailbox.clone(),
            _ => {
                errors.push(ErrorKind::Protocol, format!("no dot at route {}", next));
                return rd.complete(Outcome::Failed(errors));
            }
        };

        debug!(next = %next, "forwarding");
        rd.advance(next);
        tokio::spawn(
            async move {
                if let Err(mpsc::error::SendError(rd)) = mailbox.send(rd).await {
                    errors.push(ErrorKind::Protocol, "next hop unavailable");
                    rd.complete(Outcome::Failed(errors));
                }
            }
            .in_current_span(),
        );
    }
}

/// The route one segment further along `target`, if `target` continues
/// below `current`.
fn next_route(current: &str, target: &str) -> Option<String> {
    let rest = target.strip_prefix(current)?.strip_prefix('/')?;
    let segment = rest.split('/').next().filter(|s| !s.is_empty())?;
    Some(format!("{}/{}", current, segment))
}
