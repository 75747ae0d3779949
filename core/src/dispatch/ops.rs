//! The operations a dot can perform against its backing store.
//!
//! Problems found along the way are recorded in the request's [DotError];
//! processing continues across the remaining parameters so the caller sees
//! every problem at once.
use std::sync::Arc;

use tracing::{debug, instrument};

use super::config::{ConstructSet, DestroySet, ParamKind, QuerySet};
use super::patterns::PatternCache;
use crate::provider::{Fields, ProviderPool};
use crate::{DotError, ErrorKind, MetaDot, RequestDot};

/// Destination shared by all parameters of a query set.
#[derive(Default)]
struct Destination<'a> {
    table: Option<&'a str>,
    ds: Option<&'a str>,
}

impl<'a> Destination<'a> {
    /// Records `next` as the destination or checks it against the one
    /// recorded earlier. Returns whether it is consistent.
    fn merge(
        &mut self,
        next: &'a super::config::Destination,
        dot_name: &str,
        param: &str,
        errors: &mut DotError,
    ) -> bool {
        let mut consistent = true;
        let mut conflicting = false;

        for (slot, value, what) in [
            (&mut self.table, next.table.as_deref(), "table"),
            (&mut self.ds, next.ds.as_deref(), "datasource"),
        ] {
            match (value, *slot) {
                (None, _) => {
                    errors.push(
                        ErrorKind::Validation,
                        format!("missing required {} for dot: {}", what, dot_name),
                    );
                    consistent = false;
                }
                (Some(value), None) => *slot = Some(value),
                (Some(value), Some(existing)) if value != existing => conflicting = true,
                _ => {}
            }
        }

        if conflicting {
            errors.push(
                ErrorKind::Validation,
                format!("dot defined with multiple object destinations: {}", param),
            );
        }
        consistent && !conflicting
    }
}

/// Validates the request's parameters and writes those with a destination
/// as one row.
#[instrument(skip_all, fields(dot.id = dot.id(), params = query.q.len()))]
pub(super) async fn query(
    query: &QuerySet,
    rd: &RequestDot,
    dot: &MetaDot,
    pool: &Arc<ProviderPool>,
    patterns: &PatternCache,
    errors: &mut DotError,
) {
    let mut destination = Destination::default();
    let mut fields = Vec::new();
    let mut values = Vec::new();

    for param in &query.q {
        let value = rd.param(&param.name);

        if param.kind == ParamKind::Required && value.is_none() {
            errors.push(
                ErrorKind::Validation,
                format!("missing required parameter: {}", param.name),
            );
            continue;
        }

        if let Some(filter) = &param.filter {
            // optional and absent, nothing to check
            let Some(value) = value else { continue };
            if !patterns.is_match(&filter.value, value) {
                errors.push(
                    ErrorKind::Validation,
                    format!("incorrect parameter format: {}", param.name),
                );
                continue;
            }
        }

        if let Some(cdest) = &param.cdest {
            if destination.merge(cdest, dot.name(), &param.name, errors) {
                if let Some(value) = value {
                    fields.push(param.name.clone());
                    values.push(value.to_string());
                }
            }
        }
    }

    if !errors.is_empty() || fields.is_empty() {
        return;
    }
    let (Some(table), Some(ds)) = (destination.table, destination.ds) else {
        return;
    };

    let mut provider = match pool.get(ds).await {
        Ok(provider) => provider,
        Err(e) => {
            errors.push(
                ErrorKind::BackingStore,
                format!("data source {} unavailable: {}", ds, e),
            );
            return;
        }
    };
    provider.init_fields(Fields::new(table).with_fields(fields).with_values(values));
    if let Err(e) = provider.create().await {
        provider.discard();
        errors.push(
            ErrorKind::BackingStore,
            format!("failure to create row in {}: {}", table, e),
        );
    }
}

/// Creates the configured table.
#[instrument(skip_all, fields(dot.id = dot.id(), table = ?construct.table))]
pub(super) async fn construct(
    construct: &ConstructSet,
    dot: &MetaDot,
    pool: &Arc<ProviderPool>,
    errors: &mut DotError,
) {
    let Some(table) = construct.table.as_deref() else {
        errors.push(
            ErrorKind::Validation,
            format!("missing required table for dot: {}", dot.name()),
        );
        return;
    };
    let Some(ds) = construct.ds.as_deref() else {
        errors.push(
            ErrorKind::Validation,
            format!("missing required datasource for dot: {}", dot.name()),
        );
        return;
    };

    let mut definitions = Vec::with_capacity(construct.d.len());
    for field in &construct.d {
        if field.name.is_empty() || field.kind.is_empty() {
            errors.push(
                ErrorKind::Validation,
                format!(
                    "invalid field definition for table {}: {:?} {:?}",
                    table, field.name, field.kind
                ),
            );
            return;
        }
        definitions.push(format!("{} {}", field.name, field.kind));
    }

    let mut provider = match pool.get(ds).await {
        Ok(provider) => provider,
        Err(e) => {
            errors.push(
                ErrorKind::BackingStore,
                format!("data source {} unavailable: {}", ds, e),
            );
            return;
        }
    };
    provider.init_fields(Fields::new(table).with_fields(definitions));
    if let Err(e) = provider.construct().await {
        provider.discard();
        errors.push(
            ErrorKind::BackingStore,
            format!("failure to create table {}: {}", table, e),
        );
    }
}

pub(super) async fn destroy(_destroy: &DestroySet, dot: &MetaDot) {
    debug!(dot.id = dot.id(), "destroy requested, nothing to tear down");
}
