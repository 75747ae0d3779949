use serde::{Deserialize, Serialize};
use tracing::warn;

use crate::provider::Row;
use crate::Error;

/// Columns a dots table exposes, in the order [Dot::try_from] expects them.
pub const DOT_COLUMNS: [&str; 4] = ["id", "parent_id", "name", "value"];

/// A stored tree-node record.
///
/// Id 0 is reserved for the virtual root, which is its own parent.
/// `id` and `parent_id` are read from seed documents, but never written
/// out in diagnostic dumps.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct Dot {
    #[serde(skip_serializing)]
    pub id: u64,
    #[serde(skip_serializing, default)]
    pub parent_id: u64,
    pub name: String,
    #[serde(default)]
    pub value: String,
}

impl Dot {
    pub fn new(id: u64, parent_id: u64, name: impl Into<String>, value: impl Into<String>) -> Self {
        Self {
            id,
            parent_id,
            name: name.into(),
            value: value.into(),
        }
    }

    pub fn is_root(&self) -> bool {
        self.id == 0 && self.parent_id == 0
    }

    /// Returns the row representation, ordered like [DOT_COLUMNS].
    pub fn to_row(&self) -> Row {
        vec![
            self.id.to_string(),
            self.parent_id.to_string(),
            self.name.clone(),
            self.value.clone(),
        ]
    }
}

impl TryFrom<Row> for Dot {
    type Error = Error;

    fn try_from(row: Row) -> Result<Self, Self::Error> {
        let [id, parent_id, name, value]: [String; 4] = row.try_into().map_err(|row: Row| {
            Error::StorageError(format!("dot row has {} columns, expected 4", row.len()))
        })?;

        let parse_id = |column: &str, s: &str| {
            s.trim()
                .parse::<u64>()
                .map_err(|e| Error::StorageError(format!("invalid {} {:?}: {}", column, s, e)))
        };

        Ok(Dot {
            id: parse_id("id", &id)?,
            parent_id: parse_id("parent_id", &parent_id)?,
            name,
            value,
        })
    }
}

/// A [Dot] enriched with tree metadata computed at load time.
/// Never mutated once the tree has been built.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "PascalCase")]
pub struct MetaDot {
    #[serde(flatten)]
    pub(crate) dot: Dot,
    pub(crate) parent_name: String,
    pub(crate) depth: u64,
    pub(crate) children: u64,
    pub(crate) dot_route: Option<String>,
}

impl MetaDot {
    pub(crate) fn new(dot: Dot) -> Self {
        Self {
            dot,
            parent_name: String::new(),
            depth: 0,
            children: 0,
            dot_route: None,
        }
    }

    pub fn dot(&self) -> &Dot {
        &self.dot
    }

    pub fn id(&self) -> u64 {
        self.dot.id
    }

    pub fn parent_id(&self) -> u64 {
        self.dot.parent_id
    }

    pub fn name(&self) -> &str {
        &self.dot.name
    }

    pub fn value(&self) -> &str {
        &self.dot.value
    }

    pub fn parent_name(&self) -> &str {
        &self.parent_name
    }

    /// Distance, in edges, from this dot up to the root.
    pub fn depth(&self) -> u64 {
        self.depth
    }

    /// Number of dots in the subtree below this one, not just direct children.
    pub fn children(&self) -> u64 {
        self.children
    }

    /// The canonical route, once routes have been generated.
    pub fn route(&self) -> Option<&str> {
        self.dot_route.as_deref()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    /// The dot's configuration is invalid or names no supported operation.
    Configuration,
    /// The request failed a requirement the dot places on it.
    Validation,
    /// The backing store rejected an operation.
    BackingStore,
    /// The request arrived somewhere it should never be.
    Protocol,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DotErrorEntry {
    pub kind: ErrorKind,
    pub message: String,
}

/// Errors accumulated by one request while being processed by one dot.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DotError {
    pub id: u64,
    errors: Vec<DotErrorEntry>,
}

impl DotError {
    pub fn new(id: u64) -> Self {
        Self { id, errors: vec![] }
    }

    pub fn push(&mut self, kind: ErrorKind, message: impl Into<String>) {
        let message = message.into();
        warn!(dot.id = self.id, ?kind, %message, "dot processing error");
        self.errors.push(DotErrorEntry { kind, message });
    }

    pub fn is_empty(&self) -> bool {
        self.errors.is_empty()
    }

    pub fn errors(&self) -> &[DotErrorEntry] {
        &self.errors
    }
}
