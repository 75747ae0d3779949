use std::collections::{HashMap, VecDeque};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use parking_lot::RwLock;
use tracing::{instrument, warn};

use super::{DotProvider, Fields, ProviderFactory, Row};
use crate::{Dot, Error, DOT_COLUMNS};

#[derive(Debug, Clone, Default)]
struct Table {
    columns: Vec<String>,
    rows: Vec<Row>,
}

impl Table {
    fn column(&self, name: &str) -> Result<usize, Error> {
        self.columns
            .iter()
            .position(|c| c.eq_ignore_ascii_case(name))
            .ok_or_else(|| Error::InvalidRequest(format!("unknown column {}", name)))
    }

    fn row_id(&self, row: &Row) -> Option<u64> {
        let idx = self.column("id").ok()?;
        row.get(idx)?.parse().ok()
    }
}

type Tables = HashMap<String, Table>;

/// An in-process backing store holding named data sources of tables.
///
/// Clones share the same data.
#[derive(Clone)]
pub struct MemoryStore {
    sources: Arc<RwLock<HashMap<String, Tables>>>,
    available: Arc<AtomicBool>,
}

impl Default for MemoryStore {
    fn default() -> Self {
        Self {
            sources: Default::default(),
            available: Arc::new(AtomicBool::new(true)),
        }
    }
}

impl MemoryStore {
    /// Makes every subsequent operation fail, as if the store was unreachable.
    pub fn set_available(&self, available: bool) {
        self.available.store(available, Ordering::SeqCst);
    }

    fn check_available(&self) -> Result<(), Error> {
        if self.available.load(Ordering::SeqCst) {
            Ok(())
        } else {
            Err(Error::StorageError("store unreachable".into()))
        }
    }

    /// Writes dots straight into `table` of `source`, creating it if needed.
    pub fn insert_dots(&self, source: &str, table: &str, dots: impl IntoIterator<Item = Dot>) {
        let mut sources = self.sources.write();
        let table = sources
            .entry(source.to_string())
            .or_default()
            .entry(table.to_string())
            .or_insert_with(|| Table {
                columns: DOT_COLUMNS.iter().map(|c| c.to_string()).collect(),
                rows: vec![],
            });
        table.rows.extend(dots.into_iter().map(|d| d.to_row()));
    }

    /// Number of rows in a table, or None if it doesn't exist.
    pub fn row_count(&self, source: &str, table: &str) -> Option<usize> {
        self.sources
            .read()
            .get(source)
            .and_then(|tables| tables.get(table))
            .map(|t| t.rows.len())
    }

    /// Columns of a table, or None if it doesn't exist.
    pub fn columns(&self, source: &str, table: &str) -> Option<Vec<String>> {
        self.sources
            .read()
            .get(source)
            .and_then(|tables| tables.get(table))
            .map(|t| t.columns.clone())
    }

    fn with_table<T>(
        &self,
        source: &str,
        table: &str,
        f: impl FnOnce(&mut Table) -> Result<T, Error>,
    ) -> Result<T, Error> {
        self.check_available()?;
        let mut sources = self.sources.write();
        let table_data = sources
            .get_mut(source)
            .and_then(|tables| tables.get_mut(table))
            .ok_or_else(|| Error::InvalidRequest(format!("no such table: {}", table)))?;
        f(table_data)
    }
}

#[async_trait]
impl ProviderFactory for MemoryStore {
    async fn instance(&self) -> Result<Box<dyn DotProvider>, Error> {
        Ok(Box::new(MemoryProvider::new(self.clone())))
    }
}

struct Cursor {
    rows: VecDeque<Row>,
    rows_beyond: Option<bool>,
}

/// A [DotProvider] over a [MemoryStore].
pub struct MemoryProvider {
    store: MemoryStore,
    source: Option<String>,
    fields: Option<Fields>,
    cursor: Option<Cursor>,
    rows_beyond: Option<bool>,
}

impl MemoryProvider {
    pub fn new(store: MemoryStore) -> Self {
        Self {
            store,
            source: None,
            fields: None,
            cursor: None,
            rows_beyond: None,
        }
    }

    fn bound(&self) -> Result<(&str, &Fields), Error> {
        match (&self.source, &self.fields) {
            (Some(source), Some(fields)) => Ok((source, fields)),
            _ => Err(Error::NotBound),
        }
    }
}

#[async_trait]
impl DotProvider for MemoryProvider {
    async fn init(&mut self, source: &str) -> Result<(), Error> {
        self.store.check_available()?;
        self.store
            .sources
            .write()
            .entry(source.to_string())
            .or_default();
        self.source = Some(source.to_string());
        Ok(())
    }

    fn source(&self) -> Option<&str> {
        self.source.as_deref()
    }

    fn init_fields(&mut self, fields: Fields) {
        self.fields = Some(fields);
    }

    #[instrument(skip(self), err)]
    async fn construct(&mut self) -> Result<(), Error> {
        let (source, fields) = self.bound()?;
        self.store.check_available()?;

        let mut columns = Vec::with_capacity(fields.fields.len());
        for definition in &fields.fields {
            let name = definition
                .split_whitespace()
                .next()
                .ok_or_else(|| Error::InvalidRequest("empty field definition".into()))?;
            columns.push(name.to_string());
        }
        if columns.is_empty() {
            return Err(Error::InvalidRequest(format!(
                "table {} needs at least one field",
                fields.table
            )));
        }

        let mut sources = self.store.sources.write();
        let tables = sources.entry(source.to_string()).or_default();
        if tables.contains_key(&fields.table) {
            return Err(Error::StorageError(format!(
                "table {} already exists",
                fields.table
            )));
        }
        tables.insert(
            fields.table.clone(),
            Table {
                columns,
                rows: vec![],
            },
        );
        Ok(())
    }

    #[instrument(skip(self), err)]
    async fn create(&mut self) -> Result<(), Error> {
        let (source, fields) = self.bound()?;
        if fields.fields.len() != fields.values.len() {
            return Err(Error::InvalidRequest(format!(
                "{} fields but {} values",
                fields.fields.len(),
                fields.values.len()
            )));
        }

        self.store.with_table(source, &fields.table, |table| {
            let mut row = vec![String::new(); table.columns.len()];
            for (field, value) in fields.fields.iter().zip(&fields.values) {
                row[table.column(field)?] = value.clone();
            }
            table.rows.push(row);
            Ok(())
        })
    }

    #[instrument(skip(self), err)]
    async fn update(&mut self) -> Result<(), Error> {
        let (source, fields) = self.bound()?;
        if fields.fields.len() != fields.values.len() {
            return Err(Error::InvalidRequest(format!(
                "{} fields but {} values",
                fields.fields.len(),
                fields.values.len()
            )));
        }

        self.store.with_table(source, &fields.table, |table| {
            let targets = fields
                .fields
                .iter()
                .map(|f| table.column(f))
                .collect::<Result<Vec<_>, _>>()?;

            let ids = table
                .rows
                .iter()
                .map(|row| table.row_id(row))
                .collect::<Vec<_>>();

            for (row, id) in table.rows.iter_mut().zip(ids) {
                let in_range = match (&fields.range, id) {
                    (None, _) => true,
                    (Some(range), Some(id)) => range.contains(&id),
                    (Some(_), None) => false,
                };
                if in_range {
                    for (idx, value) in targets.iter().zip(&fields.values) {
                        row[*idx] = value.clone();
                    }
                }
            }
            Ok(())
        })
    }

    #[instrument(skip(self), err)]
    async fn destroy(&mut self) -> Result<(), Error> {
        let (source, fields) = self.bound()?;
        self.store.check_available()?;

        self.store
            .sources
            .write()
            .get_mut(source)
            .and_then(|tables| tables.remove(&fields.table))
            .map(|_| ())
            .ok_or_else(|| Error::InvalidRequest(format!("no such table: {}", fields.table)))
    }

    async fn begin(&mut self) -> Result<bool, Error> {
        let (source, fields) = self.bound()?;
        if self.cursor.is_some() {
            return Err(Error::InvalidRequest("cursor already open".into()));
        }

        let cursor = self.store.with_table(source, &fields.table, |table| {
            let projection = fields
                .fields
                .iter()
                .map(|f| table.column(f))
                .collect::<Result<Vec<_>, _>>()?;

            let mut selected: Vec<(Option<u64>, Row)> = Vec::new();
            let mut rows_beyond = false;
            for row in &table.rows {
                let id = table.row_id(row);
                if let (Some(range), Some(id)) = (&fields.range, id) {
                    if id >= range.end {
                        rows_beyond = true;
                    }
                    if !range.contains(&id) {
                        continue;
                    }
                } else if fields.range.is_some() {
                    // rows without a usable id never match a range
                    continue;
                }
                selected.push((id, projection.iter().map(|i| row[*i].clone()).collect()));
            }
            selected.sort_by_key(|(id, _)| *id);

            Ok(Cursor {
                rows: selected.into_iter().map(|(_, row)| row).collect(),
                rows_beyond: fields.range.as_ref().map(|_| rows_beyond),
            })
        })?;

        let has_rows = !cursor.rows.is_empty();
        self.cursor = Some(cursor);
        Ok(has_rows)
    }

    fn has_more(&self) -> bool {
        self.cursor.as_ref().is_some_and(|c| !c.rows.is_empty())
    }

    async fn produce(&mut self) -> Result<Row, Error> {
        self.cursor
            .as_mut()
            .ok_or_else(|| Error::InvalidRequest("no open cursor".into()))?
            .rows
            .pop_front()
            .ok_or_else(|| Error::InvalidRequest("cursor exhausted".into()))
    }

    fn rows_beyond_range(&self) -> Option<bool> {
        self.cursor
            .as_ref()
            .map(|c| c.rows_beyond)
            .unwrap_or(self.rows_beyond)
    }

    async fn finalize(&mut self) -> Result<(), Error> {
        match self.cursor.take() {
            Some(cursor) => {
                if !cursor.rows.is_empty() {
                    warn!(remaining = cursor.rows.len(), "finalizing unread cursor");
                }
                self.rows_beyond = cursor.rows_beyond;
                Ok(())
            }
            None => Err(Error::InvalidRequest("finalize without begin".into())),
        }
    }

    fn reset(&mut self) {
        self.fields = None;
        self.cursor = None;
        self.rows_beyond = None;
    }
}
