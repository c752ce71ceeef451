//! Splitting migration files into executable statements.
//!
//! This is line based, not a SQL parser: `--` comments are removed wherever
//! they appear (string literals included) and a statement ends at a `;` that
//! closes its line.

use std::sync::LazyLock;

use regex_lite::{Captures, Regex};
use uuid::Uuid;

static LINE_COMMENT: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\s*--.*").expect("valid comment pattern"));

static STATEMENT_END: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?m);[ \t\r]*$").expect("valid statement end pattern"));

static UUID_CALL: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?i)uuid\(\)").expect("valid uuid pattern"));

/// Split migration file contents into trimmed, non-empty statements.
///
/// Every `uuid()` call (any case) is replaced by its own quoted v4 UUID
/// literal, so seed data can carry fresh identifiers.
///
/// ```
/// use mig_migrate::split_statements;
///
/// let stmts = split_statements("-- users\nCREATE TABLE users (id INT);\nINSERT INTO users VALUES (1);\n");
/// assert_eq!(stmts, vec!["CREATE TABLE users (id INT)", "INSERT INTO users VALUES (1)"]);
/// ```
pub fn split_statements(contents: &str) -> Vec<String> {
    let stripped = LINE_COMMENT.replace_all(contents, "");

    STATEMENT_END
        .split(&stripped)
        .map(str::trim)
        .filter(|stmt| !stmt.is_empty())
        .map(expand_builtins)
        .collect()
}

fn expand_builtins(stmt: &str) -> String {
    UUID_CALL
        .replace_all(stmt, |_: &Captures<'_>| format!("'{}'", Uuid::new_v4()))
        .into_owned()
}

#[cfg(test)]
mod tests {
    use pretty_assertions::assert_eq;

    use super::*;

    #[test]
    fn test_split_multiple() {
        let contents = "\
-- pulse tables
CREATE TABLE pulse (
    id INTEGER PRIMARY KEY, -- row id
    name TEXT NOT NULL
);

CREATE INDEX idx_pulse_name ON pulse (name);
INSERT INTO pulse (name) VALUES ('a');
";
        let stmts = split_statements(contents);
        assert_eq!(stmts.len(), 3);
        assert_eq!(
            stmts[0],
            "CREATE TABLE pulse (\n    id INTEGER PRIMARY KEY,\n    name TEXT NOT NULL\n)"
        );
        assert_eq!(stmts[1], "CREATE INDEX idx_pulse_name ON pulse (name)");
        assert_eq!(stmts[2], "INSERT INTO pulse (name) VALUES ('a')");
    }

    #[test]
    fn test_semicolon_mid_line_does_not_split() {
        let stmts = split_statements("SELECT 1; SELECT 2;\n");
        assert_eq!(stmts, vec!["SELECT 1; SELECT 2"]);
    }

    #[test]
    fn test_trailing_statement_without_semicolon() {
        let stmts = split_statements("CREATE TABLE a (x INT);\nCREATE TABLE b (y INT)");
        assert_eq!(stmts, vec!["CREATE TABLE a (x INT)", "CREATE TABLE b (y INT)"]);
    }

    #[test]
    fn test_crlf_line_endings() {
        let stmts = split_statements("CREATE TABLE a (x INT);\r\nCREATE TABLE b (y INT);\r\n");
        assert_eq!(stmts, vec!["CREATE TABLE a (x INT)", "CREATE TABLE b (y INT)"]);
    }

    #[test]
    fn test_comment_only_yields_nothing() {
        assert!(split_statements("-- x").is_empty());
        assert!(split_statements("").is_empty());
        assert!(split_statements("\n;\n;\n").is_empty());
    }

    #[test]
    fn test_uuid_calls_are_independent() {
        let stmts = split_statements("INSERT INTO t VALUES (uuid(), UUID());\n");
        assert_eq!(stmts.len(), 1);

        let stmt = &stmts[0];
        assert!(!stmt.to_lowercase().contains("uuid()"));

        let literals: Vec<&str> = stmt.split('\'').skip(1).step_by(2).collect();
        assert_eq!(literals.len(), 2);
        assert_ne!(literals[0], literals[1]);
        for literal in literals {
            let parsed = Uuid::parse_str(literal).unwrap();
            assert_eq!(parsed.get_version_num(), 4);
        }
    }
}
