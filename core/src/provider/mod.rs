use std::ops::Range;

use async_trait::async_trait;

use crate::Error;

mod from_addr;
mod memory;
mod pool;

pub use self::from_addr::from_addr;
pub use self::memory::{MemoryProvider, MemoryStore};
pub use self::pool::{PoolConfig, PooledProvider, ProviderPool};

/// A single row, one string per requested column.
pub type Row = Vec<String>;

/// Target of the next operation on a [DotProvider].
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Fields {
    /// Table to operate on.
    pub table: String,
    /// Ordered column names. For [DotProvider::construct] these are
    /// `"<name> <type>"` definitions.
    pub fields: Vec<String>,
    /// Ordered values for [DotProvider::create] and [DotProvider::update],
    /// positionally matching `fields`.
    pub values: Vec<String>,
    /// Id window for paginated reads, `[lower, upper)`.
    pub range: Option<Range<u64>>,
}

impl Fields {
    pub fn new(table: impl Into<String>) -> Self {
        Self {
            table: table.into(),
            ..Default::default()
        }
    }

    pub fn with_fields<I, S>(mut self, fields: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.fields = fields.into_iter().map(Into::into).collect();
        self
    }

    pub fn with_values<I, S>(mut self, values: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.values = values.into_iter().map(Into::into).collect();
        self
    }

    pub fn with_range(mut self, range: Range<u64>) -> Self {
        self.range = Some(range);
        self
    }
}

/// The capability interface a backing-store driver implements.
///
/// An instance is bound to one data source with [DotProvider::init], then
/// configured with [DotProvider::init_fields] before every data operation.
/// Reads follow a cursor protocol: [DotProvider::begin], then
/// [DotProvider::produce] while [DotProvider::has_more], then exactly one
/// [DotProvider::finalize].
///
/// Mutations either fully succeed or fail; there is no partial success.
#[async_trait]
pub trait DotProvider: Send {
    /// Binds the instance to a named data source. Idempotent.
    async fn init(&mut self, source: &str) -> Result<(), Error>;

    /// The data source this instance is bound to, if any.
    fn source(&self) -> Option<&str>;

    /// Configures the target of the next operation.
    fn init_fields(&mut self, fields: Fields);

    /// Creates the configured table from its field definitions.
    async fn construct(&mut self) -> Result<(), Error>;

    /// Inserts one row built from the configured fields and values.
    async fn create(&mut self) -> Result<(), Error>;

    /// Rewrites the configured fields on all rows in the configured range,
    /// or on every row if no range is set.
    async fn update(&mut self) -> Result<(), Error>;

    /// Removes the configured table.
    async fn destroy(&mut self) -> Result<(), Error>;

    /// Opens a read cursor over the configured range.
    /// Returns false if the range holds no rows.
    async fn begin(&mut self) -> Result<bool, Error>;

    /// Whether another row can be produced from the open cursor.
    fn has_more(&self) -> bool;

    /// Returns the current row's configured columns and advances.
    async fn produce(&mut self) -> Result<Row, Error>;

    /// Whether rows exist past the upper bound of the range read by the
    /// last [DotProvider::begin]. Providers that can't tell return None.
    fn rows_beyond_range(&self) -> Option<bool> {
        None
    }

    /// Releases the cursor opened by [DotProvider::begin].
    async fn finalize(&mut self) -> Result<(), Error>;

    /// Drops any configured fields and open cursor, keeping the source binding.
    fn reset(&mut self);
}

/// Creates fresh, unbound [DotProvider] instances for a [ProviderPool].
#[async_trait]
pub trait ProviderFactory: Send + Sync {
    async fn instance(&self) -> Result<Box<dyn DotProvider>, Error>;
}
