//! Mapping native column types onto [`CanonicalType`].
//!
//! Everything here is pure: describers feed catalog strings in and copy the
//! results onto [`Column`] values.

use std::collections::HashSet;
use std::sync::LazyLock;

use regex_lite::Regex;

use crate::model::{CanonicalType, Column, ColumnKey, Index};

static ENUM_PATTERN: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)enum\s*\(\s*'([^']*)'\s*(?:,\s*'([^']*)'\s*)*\)").expect("valid enum pattern")
});

static QUOTED_VALUE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"'([^']*)'").expect("valid quoted value pattern"));

static VARCHAR_PATTERN: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(varchar|char)\s*\(\s*(\d+)\s*\)").expect("valid varchar pattern")
});

static NUMERIC_PATTERN: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(numeric|decimal)\s*\(\s*(\d+)\s*,\s*(\d+)\s*\)").expect("valid numeric pattern")
});

static INT_DISPLAY_WIDTH: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(\w*int|serial)\s*\(\s*\d+\s*\)").expect("valid display width pattern")
});

// Substring classes, checked in order. The first hit wins.
const BOOLEAN_TOKENS: &[&str] = &["bool", "bit"];
const TIMESTAMP_TOKENS: &[&str] = &["timestamp", "datetime"];
const DATE_TOKENS: &[&str] = &["date"];
const DECIMAL_TOKENS: &[&str] = &["decimal", "numeric", "float", "double"];
const TEXT_TOKENS: &[&str] = &["varchar", "char", "string", "text", "json"];
const BLOB_TOKENS: &[&str] = &["blob", "binary", "bytea"];

// Whole words only: `point` and `interval` contain "int" but are not integers.
const INTEGER_WORDS: &[&str] = &[
    "int", "integer", "int2", "int4", "int8", "tinyint", "smallint", "mediumint", "bigint",
    "serial", "smallserial", "bigserial", "serial2", "serial4", "serial8", "long", "short",
];

fn contains_any(haystack: &str, tokens: &[&str]) -> bool {
    tokens.iter().any(|t| haystack.contains(t))
}

fn has_integer_word(raw: &str) -> bool {
    raw.split(|c: char| !c.is_ascii_alphanumeric())
        .any(|word| INTEGER_WORDS.contains(&word))
}

/// Classify a raw type.
///
/// Enum detection comes first: the raw type or the hint mentioning `enum`,
/// or `values` already being populated, makes the column an enum and sorts
/// the values. Boolean, temporal, decimal, text and blob classes are
/// substring matches, so `longtext` is text and `longblob` a blob. Integers
/// match whole words of the type (`bigint`, `int8`, `INTEGER`), which keeps
/// `point` and `interval` out of [`CanonicalType::Integer`].
pub fn normalize(raw_type: &str, data_type: &str, values: &mut [String]) -> CanonicalType {
    let raw = raw_type.to_lowercase();
    let hint = data_type.to_lowercase();

    if raw.contains("enum") || hint.contains("enum") || !values.is_empty() {
        values.sort();
        return CanonicalType::Enum;
    }

    if contains_any(&raw, BOOLEAN_TOKENS) {
        CanonicalType::Boolean
    } else if contains_any(&raw, TIMESTAMP_TOKENS) {
        CanonicalType::Timestamp
    } else if contains_any(&raw, DATE_TOKENS) {
        CanonicalType::Date
    } else if contains_any(&raw, DECIMAL_TOKENS) {
        CanonicalType::Decimal
    } else if contains_any(&raw, TEXT_TOKENS) {
        CanonicalType::Text
    } else if contains_any(&raw, BLOB_TOKENS) || hint.contains("blob") {
        CanonicalType::Blob
    } else if has_integer_word(&raw) {
        CanonicalType::Integer
    } else {
        CanonicalType::Unknown
    }
}

/// Normalize a column in place.
pub fn normalize_column(column: &mut Column) {
    column.normalized_type = normalize(&column.column_type, &column.data_type, &mut column.values);
}

/// Values of a MySQL `enum('a','b')` type, in declaration order.
///
/// Returns an empty list when the type is not an enum.
///
/// ```rust
/// use mig_introspect::normalize::extract_enum_values;
///
/// assert_eq!(extract_enum_values("enum('b','a')"), vec!["b", "a"]);
/// assert!(extract_enum_values("varchar(10)").is_empty());
/// ```
pub fn extract_enum_values(raw_type: &str) -> Vec<String> {
    if !ENUM_PATTERN.is_match(raw_type) {
        return Vec::new();
    }

    QUOTED_VALUE
        .captures_iter(raw_type)
        .filter_map(|caps| caps.get(1))
        .map(|m| m.as_str().to_string())
        .collect()
}

/// Split a MySQL-style type into its base and a meaningful size.
///
/// `varchar(n)` and `char(n)` report the length, `decimal(p,s)` and
/// `numeric(p,s)` the precision. Integer display widths carry no storage
/// meaning and are stripped: `bigint(20) unsigned` becomes
/// `bigint unsigned` with size 0. Anything else is returned lowercased.
pub fn parse_sized_type(raw_type: &str) -> (String, u32) {
    let lower = raw_type.trim().to_lowercase();

    if let Some(caps) = VARCHAR_PATTERN.captures(&lower) {
        return (caps[1].to_string(), caps[2].parse().unwrap_or(0));
    }

    if let Some(caps) = NUMERIC_PATTERN.captures(&lower) {
        return (caps[1].to_string(), caps[2].parse().unwrap_or(0));
    }

    if INT_DISPLAY_WIDTH.is_match(&lower) {
        let stripped = INT_DISPLAY_WIDTH.replace_all(&lower, |caps: &regex_lite::Captures<'_>| {
            caps[0].split('(').next().unwrap_or_default().trim().to_string()
        });
        return (stripped.into_owned(), 0);
    }

    (lower, 0)
}

/// Byte width of a PostgreSQL integer type.
///
/// Returns `("integer", width)` for the integer aliases and the lowercased
/// input with width 0 for anything else.
pub fn parse_postgres_int_type(raw_type: &str) -> (String, u32) {
    let lower = raw_type.trim().to_lowercase();
    match lower.as_str() {
        "int2" | "smallint" => ("integer".to_string(), 2),
        "int4" | "integer" | "int" => ("integer".to_string(), 4),
        "int8" | "bigint" => ("integer".to_string(), 8),
        _ => (lower, 0),
    }
}

/// Mark indexed and `*_id` columns as [`ColumnKey::Multiple`].
///
/// This is a naming heuristic: a column ending in `_id` is assumed to be a
/// foreign key whether or not a constraint exists. Primary key columns keep
/// their marker. Names are compared case-insensitively.
pub fn enrich_key_metadata(columns: &mut [Column], indexes: &[Index]) {
    let indexed: HashSet<String> = indexes
        .iter()
        .filter(|idx| !idx.primary)
        .flat_map(|idx| idx.columns.iter().map(|c| c.to_lowercase()))
        .collect();

    for column in columns.iter_mut() {
        if column.key == ColumnKey::Primary {
            continue;
        }
        let name = column.name.to_lowercase();
        if indexed.contains(&name) || name.ends_with("_id") {
            column.key = ColumnKey::Multiple;
        }
    }
}

/// Order indexes: primary first, then by comma-joined column list.
pub fn sort_indexes(indexes: &mut [Index]) {
    indexes.sort_by(|a, b| {
        b.primary
            .cmp(&a.primary)
            .then_with(|| a.columns.join(",").cmp(&b.columns.join(",")))
    });
}

#[cfg(test)]
mod tests {
    use pretty_assertions::assert_eq;

    use super::*;

    fn classify(raw: &str) -> CanonicalType {
        normalize(raw, raw, &mut [])
    }

    #[test]
    fn test_integer_types() {
        assert_eq!(classify("bigint(20) unsigned"), CanonicalType::Integer);
        assert_eq!(classify("int8"), CanonicalType::Integer);
        assert_eq!(classify("INTEGER"), CanonicalType::Integer);
        assert_eq!(classify("smallserial"), CanonicalType::Integer);
        assert_eq!(classify("tinyint"), CanonicalType::Integer);
    }

    #[test]
    fn test_other_classes() {
        assert_eq!(classify("tinyint(1) boolean"), CanonicalType::Boolean);
        assert_eq!(classify("bit(1)"), CanonicalType::Boolean);
        assert_eq!(classify("timestamptz"), CanonicalType::Timestamp);
        assert_eq!(classify("datetime(6)"), CanonicalType::Timestamp);
        assert_eq!(classify("date"), CanonicalType::Date);
        assert_eq!(classify("decimal(10,2)"), CanonicalType::Decimal);
        assert_eq!(classify("double precision"), CanonicalType::Decimal);
        assert_eq!(classify("varchar(255)"), CanonicalType::Text);
        assert_eq!(classify("jsonb"), CanonicalType::Text);
        assert_eq!(classify("blob"), CanonicalType::Blob);
        assert_eq!(classify("uuid"), CanonicalType::Unknown);
    }

    #[test]
    fn test_long_and_medium_types_keep_their_class() {
        assert_eq!(classify("longtext"), CanonicalType::Text);
        assert_eq!(classify("mediumtext"), CanonicalType::Text);
        assert_eq!(classify("longblob"), CanonicalType::Blob);
        assert_eq!(classify("mediumblob"), CanonicalType::Blob);
        assert_eq!(classify("varbinary(16)"), CanonicalType::Blob);
        assert_eq!(classify("mediumint(8) unsigned"), CanonicalType::Integer);
        assert_eq!(classify("long"), CanonicalType::Integer);
    }

    #[test]
    fn test_int_substrings_are_not_integers() {
        assert_eq!(classify("point"), CanonicalType::Unknown);
        assert_eq!(classify("interval"), CanonicalType::Unknown);
        assert_eq!(classify("multipoint"), CanonicalType::Unknown);
        assert_eq!(classify("int4range"), CanonicalType::Unknown);
    }

    #[test]
    fn test_blob_from_hint() {
        assert_eq!(normalize("bytea", "blob", &mut []), CanonicalType::Blob);
    }

    #[test]
    fn test_enum_sorts_values() {
        let mut values = extract_enum_values("enum('c','a','b')");
        assert_eq!(normalize("enum('c','a','b')", "enum", &mut values), CanonicalType::Enum);
        assert_eq!(values, vec!["a", "b", "c"]);
    }

    #[test]
    fn test_values_imply_enum() {
        let mut values = vec!["on".to_string(), "off".to_string()];
        assert_eq!(normalize("mood", "USER-DEFINED", &mut values), CanonicalType::Enum);
        assert_eq!(values, vec!["off", "on"]);
    }

    #[test]
    fn test_extract_enum_values() {
        assert_eq!(
            extract_enum_values("ENUM( 'draft' , 'published', '' )"),
            vec!["draft", "published", ""]
        );
        assert!(extract_enum_values("set('a','b')").is_empty());
    }

    #[test]
    fn test_parse_sized_type() {
        assert_eq!(parse_sized_type("VARCHAR(191)"), ("varchar".to_string(), 191));
        assert_eq!(parse_sized_type("char(36)"), ("char".to_string(), 36));
        assert_eq!(parse_sized_type("decimal(10,2)"), ("decimal".to_string(), 10));
        assert_eq!(
            parse_sized_type("bigint(20) unsigned"),
            ("bigint unsigned".to_string(), 0)
        );
        assert_eq!(parse_sized_type("int(11)"), ("int".to_string(), 0));
        assert_eq!(parse_sized_type(" text "), ("text".to_string(), 0));
    }

    #[test]
    fn test_parse_postgres_int_type() {
        assert_eq!(parse_postgres_int_type("int2"), ("integer".to_string(), 2));
        assert_eq!(parse_postgres_int_type("INTEGER"), ("integer".to_string(), 4));
        assert_eq!(parse_postgres_int_type("int8"), ("integer".to_string(), 8));
        assert_eq!(parse_postgres_int_type("varchar"), ("varchar".to_string(), 0));
    }

    #[test]
    fn test_enrich_key_metadata() {
        let mut columns = vec![
            Column::new("id", "bigint").with_key(ColumnKey::Primary),
            Column::new("Owner_ID", "bigint"),
            Column::new("email", "varchar"),
            Column::new("note", "text"),
        ];
        let indexes = vec![
            Index::new("PRIMARY", vec!["id".into()]).primary(),
            Index::new("idx_email", vec!["EMAIL".into()]).unique(),
        ];

        enrich_key_metadata(&mut columns, &indexes);

        let keys: Vec<_> = columns.iter().map(|c| c.key).collect();
        assert_eq!(
            keys,
            vec![
                ColumnKey::Primary,
                ColumnKey::Multiple,
                ColumnKey::Multiple,
                ColumnKey::None
            ]
        );
    }

    #[test]
    fn test_primary_index_columns_are_not_marked() {
        let mut columns = vec![Column::new("tenant", "int"), Column::new("slug", "text")];
        let indexes = vec![Index::new("pk", vec!["tenant".into(), "slug".into()]).primary()];
        enrich_key_metadata(&mut columns, &indexes);
        assert!(columns.iter().all(|c| c.key == ColumnKey::None));
    }

    #[test]
    fn test_sort_indexes() {
        let mut indexes = vec![
            Index::new("idx_b", vec!["b".into()]),
            Index::new("PRIMARY", vec!["id".into()]).primary(),
            Index::new("idx_a", vec!["a".into()]),
        ];
        sort_indexes(&mut indexes);
        let names: Vec<_> = indexes.iter().map(|i| i.name.as_str()).collect();
        assert_eq!(names, vec!["PRIMARY", "idx_a", "idx_b"]);
    }
}
