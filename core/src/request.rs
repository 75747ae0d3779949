use std::collections::HashMap;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tokio::sync::oneshot;
use tracing::debug;

use crate::dispatch::DispatchError;
use crate::{Dot, DotError};

/// Request parameters by name. Value order is significant to the caller.
pub type QueryParams = HashMap<String, Vec<String>>;

/// The single result a caller receives for a request.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Outcome {
    /// The request reached its target route without errors.
    Complete { complete: String },
    /// Processing stopped at the dot named in the error.
    Failed(DotError),
}

impl Outcome {
    pub fn is_failed(&self) -> bool {
        matches!(self, Outcome::Failed(_))
    }

    /// Renders the user-visible JSON payload.
    pub fn to_json(&self) -> String {
        serde_json::to_string(self).unwrap_or_else(|e| {
            tracing::error!(err = %e, "outcome serialization error");
            r#"{"errors":[{"kind":"protocol","message":"system error"}]}"#.to_string()
        })
    }
}

/// One in-flight request, walking the route tree hop by hop.
#[derive(Debug)]
pub struct RequestDot {
    /// Identity of the dot currently processing the request.
    pub dot: Dot,
    pub query_params: QueryParams,
    current_sub_route: String,
    route_complete: String,
    result_tx: oneshot::Sender<Outcome>,
}

impl RequestDot {
    /// Creates a request entering the tree at `entry` and heading for `target`.
    /// The returned [PendingResult] receives its outcome exactly once.
    pub fn new(
        query_params: QueryParams,
        entry: impl Into<String>,
        target: impl Into<String>,
    ) -> (Self, PendingResult) {
        let (result_tx, result_rx) = oneshot::channel();
        (
            Self {
                dot: Dot::default(),
                query_params,
                current_sub_route: entry.into(),
                route_complete: target.into(),
                result_tx,
            },
            PendingResult { result_rx },
        )
    }

    /// The route the request has reached.
    pub fn current_sub_route(&self) -> &str {
        &self.current_sub_route
    }

    /// The full target route.
    pub fn route_complete(&self) -> &str {
        &self.route_complete
    }

    pub fn is_complete(&self) -> bool {
        self.current_sub_route == self.route_complete
    }

    /// First value for `name`, if present and non-empty.
    pub fn param(&self, name: &str) -> Option<&str> {
        self.query_params
            .get(name)
            .and_then(|values| values.first())
            .map(String::as_str)
            .filter(|v| !v.is_empty())
    }

    pub(crate) fn advance(&mut self, next_route: String) {
        self.current_sub_route = next_route;
    }

    /// Delivers the outcome, consuming the request.
    pub(crate) fn complete(self, outcome: Outcome) {
        if self.result_tx.send(outcome).is_err() {
            debug!(route = %self.route_complete, "caller stopped waiting for the result");
        }
    }
}

/// The caller's side of a [RequestDot].
#[derive(Debug)]
pub struct PendingResult {
    result_rx: oneshot::Receiver<Outcome>,
}

impl PendingResult {
    /// Waits for the outcome without a deadline.
    pub async fn recv(self) -> Result<Outcome, DispatchError> {
        self.result_rx.await.map_err(|_| DispatchError::Dropped)
    }

    /// Waits for the outcome, giving up after `deadline`.
    /// Expiry leaves the request in flight; it is not interrupted mid-hop.
    pub async fn wait(self, deadline: Duration) -> Result<Outcome, DispatchError> {
        match tokio::time::timeout(deadline, self.result_rx).await {
            Ok(Ok(outcome)) => Ok(outcome),
            Ok(Err(_)) => Err(DispatchError::Dropped),
            Err(_) => Err(DispatchError::Timeout(deadline)),
        }
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use super::{Outcome, QueryParams, RequestDot};
    use crate::dispatch::DispatchError;
    use crate::{DotError, ErrorKind};

    #[test]
    fn param_skips_empty_values() {
        let params = QueryParams::from([
            ("a".to_string(), vec!["1".to_string(), "2".to_string()]),
            ("b".to_string(), vec![String::new()]),
            ("c".to_string(), vec![]),
        ]);
        let (rd, _pending) = RequestDot::new(params, "/x", "/x");

        assert_eq!(Some("1"), rd.param("a"));
        assert_eq!(None, rd.param("b"));
        assert_eq!(None, rd.param("c"));
        assert_eq!(None, rd.param("d"));
        assert!(rd.is_complete());
    }

    #[tokio::test]
    async fn outcome_delivered_once() {
        let (rd, pending) = RequestDot::new(QueryParams::new(), "/a", "/a");
        rd.complete(Outcome::Complete {
            complete: "/a".into(),
        });

        let outcome = pending.wait(Duration::from_secs(1)).await.expect("outcome");
        assert_eq!(r#"{"complete":"/a"}"#, outcome.to_json());
    }

    #[tokio::test]
    async fn dropped_request() {
        let (rd, pending) = RequestDot::new(QueryParams::new(), "/a", "/a/b");
        drop(rd);

        assert_eq!(Err(DispatchError::Dropped), pending.recv().await);
    }

    #[tokio::test(start_paused = true)]
    async fn deadline_expires() {
        let (_rd, pending) = RequestDot::new(QueryParams::new(), "/a", "/a/b");

        assert_eq!(
            Err(DispatchError::Timeout(Duration::from_secs(5))),
            pending.wait(Duration::from_secs(5)).await
        );
    }

    #[test]
    fn failed_outcome_round_trips() {
        let mut err = DotError::new(1);
        err.push(ErrorKind::Protocol, "nope");
        let json = Outcome::Failed(err.clone()).to_json();

        let parsed: Outcome = serde_json::from_str(&json).unwrap();
        assert_eq!(Outcome::Failed(err), parsed);
        assert!(parsed.is_failed());
    }
}
