mod dot;
mod errors;
mod request;

pub mod dispatch;
pub mod fixtures;
pub mod provider;
pub mod tree;

pub use dot::{Dot, DotError, DotErrorEntry, ErrorKind, MetaDot, DOT_COLUMNS};
pub use errors::Error;
pub use request::{Outcome, PendingResult, QueryParams, RequestDot};

#[cfg(test)]
mod tests;
