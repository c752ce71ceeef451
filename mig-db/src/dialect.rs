//! SQL dialect detection.

use std::fmt;

use crate::error::{DbError, DbResult};

/// The database engines mig knows how to talk to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Dialect {
    /// PostgreSQL database
    Postgres,
    /// MySQL database
    MySql,
    /// SQLite database
    Sqlite,
}

impl Dialect {
    /// Infer the dialect from a connection string.
    ///
    /// The scheme in front of `://` wins when it is recognised. Without one,
    /// a go-style MySQL DSN (`user:pass@tcp(host:3306)/db`) is detected by its
    /// `@tcp(` or `@unix(` marker, and everything else is treated as an
    /// embedded SQLite database.
    ///
    /// ```rust
    /// use mig_db::Dialect;
    ///
    /// assert_eq!(Dialect::from_dsn("postgres://localhost/db"), Dialect::Postgres);
    /// assert_eq!(Dialect::from_dsn("root:pw@tcp(db:3306)/app"), Dialect::MySql);
    /// assert_eq!(Dialect::from_dsn(":memory:"), Dialect::Sqlite);
    /// ```
    pub fn from_dsn(dsn: &str) -> Self {
        if let Some((scheme, _)) = dsn.split_once("://") {
            match scheme {
                "postgres" | "postgresql" => return Self::Postgres,
                "mysql" => return Self::MySql,
                "sqlite" | "file" => return Self::Sqlite,
                _ => {}
            }
        }

        if dsn.contains("@tcp(") || dsn.contains("@unix(") {
            return Self::MySql;
        }

        Self::Sqlite
    }

    /// Look up a dialect by driver name.
    pub fn from_name(name: &str) -> DbResult<Self> {
        match name.to_lowercase().as_str() {
            "postgres" | "postgresql" | "pgx" => Ok(Self::Postgres),
            "mysql" => Ok(Self::MySql),
            "sqlite" | "sqlite3" => Ok(Self::Sqlite),
            _ => Err(DbError::UnknownDialect(name.to_string())),
        }
    }

    /// Canonical driver name.
    pub fn name(&self) -> &'static str {
        match self {
            Self::Postgres => "postgres",
            Self::MySql => "mysql",
            Self::Sqlite => "sqlite",
        }
    }

    /// Whether the driver for this dialect was compiled in.
    pub fn is_enabled(&self) -> bool {
        match self {
            Self::Postgres => cfg!(feature = "postgres"),
            Self::MySql => cfg!(feature = "mysql"),
            Self::Sqlite => cfg!(feature = "sqlite"),
        }
    }
}

impl fmt::Display for Dialect {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}
