//! Dialect-neutral schema model.

use std::fmt;

use serde::{Deserialize, Serialize};

/// A database table with its columns and indexes.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Table {
    /// Table name.
    pub name: String,
    /// Table comment; filled from the name when the catalog has none.
    pub comment: String,
    /// Columns in ordinal order.
    #[serde(default)]
    pub columns: Vec<Column>,
    /// Indexes, primary first once sorted.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub indexes: Vec<Index>,
}

impl Table {
    /// Create an empty table.
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            ..Default::default()
        }
    }

    /// Set the comment.
    pub fn with_comment(mut self, comment: impl Into<String>) -> Self {
        self.comment = comment.into();
        self
    }

    /// Human-readable title derived from the table name.
    pub fn title(&self) -> String {
        crate::title::title(&self.name)
    }

    /// Whether the table is marked to be skipped by its comment.
    pub fn ignore(&self) -> bool {
        self.comment.trim().to_lowercase() == "ignore"
    }

    /// The primary index, if any.
    pub fn primary_index(&self) -> Option<&Index> {
        self.indexes.iter().find(|i| i.primary)
    }

    /// Look up a column by name.
    pub fn column(&self, name: &str) -> Option<&Column> {
        self.columns.iter().find(|c| c.name == name)
    }
}

/// A table or query result column.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Column {
    /// Column name.
    pub name: String,
    /// Raw dialect type, with display widths stripped where applicable.
    #[serde(rename = "type")]
    pub column_type: String,
    /// Raw dialect data type hint.
    #[serde(rename = "datatype")]
    pub data_type: String,
    /// Canonical type.
    #[serde(default)]
    pub normalized_type: CanonicalType,
    /// Key marker.
    #[serde(default, skip_serializing_if = "ColumnKey::is_none")]
    pub key: ColumnKey,
    /// Column comment.
    pub comment: String,
    /// Character length, numeric precision or integer byte width.
    #[serde(default, skip_serializing_if = "is_zero")]
    pub size: u32,
    /// Allowed values for enum columns, sorted.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub values: Vec<String>,
}

fn is_zero(size: &u32) -> bool {
    *size == 0
}

impl Column {
    /// Create a column with a raw type used for both type and data type.
    pub fn new(name: impl Into<String>, column_type: impl Into<String>) -> Self {
        let column_type = column_type.into();
        Self {
            name: name.into(),
            data_type: column_type.clone(),
            column_type,
            ..Default::default()
        }
    }

    /// Set the key marker.
    pub fn with_key(mut self, key: ColumnKey) -> Self {
        self.key = key;
        self
    }

    /// Human-readable title derived from the column name.
    pub fn title(&self) -> String {
        crate::title::title(&self.name)
    }

    /// Whether this column is part of the primary key.
    pub fn is_primary(&self) -> bool {
        self.key == ColumnKey::Primary
    }
}

/// An index over one or more columns.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Index {
    /// Index name; empty for a synthesized primary key.
    #[serde(default)]
    pub name: String,
    /// Indexed columns in key order.
    pub columns: Vec<String>,
    /// Whether this is the primary key.
    #[serde(default)]
    pub primary: bool,
    /// Whether the index enforces uniqueness.
    #[serde(default)]
    pub unique: bool,
}

impl Index {
    /// Create a non-unique index.
    pub fn new(name: impl Into<String>, columns: Vec<String>) -> Self {
        Self {
            name: name.into(),
            columns,
            ..Default::default()
        }
    }

    /// Mark as the primary key (which is also unique).
    pub fn primary(mut self) -> Self {
        self.primary = true;
        self.unique = true;
        self
    }

    /// Mark as unique.
    pub fn unique(mut self) -> Self {
        self.unique = true;
        self
    }
}

/// Canonical column type shared by every dialect.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CanonicalType {
    /// Any integer width
    Integer,
    /// Character and JSON data
    Text,
    /// Fixed and floating point numbers
    Decimal,
    /// Booleans and bits
    Boolean,
    /// Calendar date
    Date,
    /// Date and time
    Timestamp,
    /// Closed set of string values
    Enum,
    /// Raw bytes
    Blob,
    /// Anything else
    #[default]
    Unknown,
}

impl CanonicalType {
    /// Lowercase name.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Integer => "integer",
            Self::Text => "text",
            Self::Decimal => "decimal",
            Self::Boolean => "boolean",
            Self::Date => "date",
            Self::Timestamp => "timestamp",
            Self::Enum => "enum",
            Self::Blob => "blob",
            Self::Unknown => "unknown",
        }
    }
}

impl fmt::Display for CanonicalType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Key marker of a column.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ColumnKey {
    /// Not part of any key
    #[default]
    #[serde(rename = "")]
    None,
    /// Part of the primary key
    #[serde(rename = "PRI")]
    Primary,
    /// First column of a unique index (MySQL `DESCRIBE` only)
    #[serde(rename = "UNI")]
    Unique,
    /// Indexed or foreign-key-like
    #[serde(rename = "MUL")]
    Multiple,
}

impl ColumnKey {
    /// Parse a catalog key string; unknown values map to `None`.
    pub fn parse(key: &str) -> Self {
        match key.trim().to_uppercase().as_str() {
            "PRI" => Self::Primary,
            "UNI" => Self::Unique,
            "MUL" => Self::Multiple,
            _ => Self::None,
        }
    }

    /// Catalog spelling of the key.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::None => "",
            Self::Primary => "PRI",
            Self::Unique => "UNI",
            Self::Multiple => "MUL",
        }
    }

    /// Whether the column has no key marker.
    pub fn is_none(&self) -> bool {
        *self == Self::None
    }
}

impl fmt::Display for ColumnKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_table_ignore() {
        assert!(Table::new("audit").with_comment("  Ignore ").ignore());
        assert!(!Table::new("audit").with_comment("ignored table").ignore());
        assert!(!Table::new("audit").ignore());
    }

    #[test]
    fn test_column_key_parse() {
        assert_eq!(ColumnKey::parse("PRI"), ColumnKey::Primary);
        assert_eq!(ColumnKey::parse("uni"), ColumnKey::Unique);
        assert_eq!(ColumnKey::parse("MUL"), ColumnKey::Multiple);
        assert_eq!(ColumnKey::parse(""), ColumnKey::None);
        assert_eq!(ColumnKey::parse("PRIMARY KEY"), ColumnKey::None);
    }

    #[test]
    fn test_column_serialization() {
        let mut column = Column::new("status", "enum").with_key(ColumnKey::Multiple);
        column.normalized_type = CanonicalType::Enum;
        column.values = vec!["active".into(), "deleted".into()];

        let json = serde_json::to_value(&column).unwrap();
        assert_eq!(json["type"], "enum");
        assert_eq!(json["datatype"], "enum");
        assert_eq!(json["normalized_type"], "enum");
        assert_eq!(json["key"], "MUL");
        assert_eq!(json["values"][1], "deleted");
        assert!(json.get("size").is_none());
    }

    #[test]
    fn test_empty_key_is_omitted() {
        let json = serde_json::to_value(Column::new("id", "int")).unwrap();
        assert!(json.get("key").is_none());
        assert_eq!(json["normalized_type"], "unknown");
    }

    #[test]
    fn test_table_round_trip() {
        let table = Table {
            name: "users".into(),
            comment: "Users".into(),
            columns: vec![Column::new("id", "bigint").with_key(ColumnKey::Primary)],
            indexes: vec![Index::new("PRIMARY", vec!["id".into()]).primary()],
        };
        let json = serde_json::to_string(&table).unwrap();
        let back: Table = serde_json::from_str(&json).unwrap();
        assert_eq!(back, table);
        assert!(back.column("id").unwrap().is_primary());
        assert_eq!(back.primary_index().unwrap().name, "PRIMARY");
    }

    #[test]
    fn test_canonical_type_display() {
        assert_eq!(CanonicalType::Timestamp.to_string(), "timestamp");
        assert_eq!(CanonicalType::default(), CanonicalType::Unknown);
    }
}
