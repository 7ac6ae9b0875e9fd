use arrow_schema::{Field, Schema};
use serde::{Deserialize, Serialize};

/// Whether a data source is an unbounded append log or a changelog with one
/// live row per key.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum SourceKind {
    Stream,
    Table,
}

impl std::fmt::Display for SourceKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            SourceKind::Stream => write!(f, "STREAM"),
            SourceKind::Table => write!(f, "TABLE"),
        }
    }
}

/// A named, schema-typed data source backed by a substrate topic.
///
/// Immutable once published: redefinition replaces the whole entry, never a
/// field of it.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DataSource {
    pub name: String,
    pub schema: Schema,
    /// Field the backing topic is partitioned by, when the source is keyed.
    pub key_field: Option<String>,
    pub kind: SourceKind,
    /// Physical backing topic name.
    pub topic: String,
}

impl DataSource {
    pub fn new(
        name: impl Into<String>,
        schema: Schema,
        key_field: Option<String>,
        kind: SourceKind,
        topic: impl Into<String>,
    ) -> Self {
        Self {
            name: name.into(),
            schema,
            key_field,
            kind,
            topic: topic.into(),
        }
    }

    pub fn field(&self, name: &str) -> Option<&Field> {
        self.schema
            .fields()
            .iter()
            .find(|f| f.name() == name)
            .map(|f| f.as_ref())
    }
}
