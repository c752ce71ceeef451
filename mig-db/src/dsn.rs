//! DSN normalization, masking and parsing.
//!
//! Connection strings arrive in two families: scheme-prefixed URLs
//! (`postgres://`, `mysql://`, `sqlite://`) and driver-native strings such as
//! the go-style MySQL form `user:pass@tcp(host:port)/db?opt=val`. This module
//! normalizes both into the string each dialect expects and then into the
//! pieces the SQLx drivers need.

use std::sync::LazyLock;

use regex_lite::Regex;

use crate::dialect::Dialect;
use crate::error::{DbError, DbResult};

/// Session options appended to every MySQL DSN that does not set them.
const MYSQL_DEFAULT_OPTIONS: &[(&str, &str)] = &[
    ("collation=", "&collation=utf8mb4_general_ci"),
    ("parseTime=", "&parseTime=true"),
    ("loc=", "&loc=Local"),
];

static DSN_MASKER: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(.)(?:.*)(.):(.)(?:.*)(.)@").expect("valid DSN mask pattern"));

/// Normalize a DSN for its inferred dialect.
///
/// ```rust
/// use mig_db::dsn::clean_dsn;
///
/// assert_eq!(
///     clean_dsn("mysql://root:pw@tcp(db:3306)/app"),
///     "root:pw@tcp(db:3306)/app?collation=utf8mb4_general_ci&parseTime=true&loc=Local",
/// );
/// assert_eq!(clean_dsn("postgres://localhost/app"), "postgres://localhost/app");
/// ```
pub fn clean_dsn(dsn: &str) -> String {
    clean_dsn_for(dsn, Dialect::from_dsn(dsn))
}

/// Normalize a DSN for an explicit dialect.
pub fn clean_dsn_for(dsn: &str, dialect: Dialect) -> String {
    let mut dsn = match dialect {
        Dialect::MySql => dsn.strip_prefix("mysql://").unwrap_or(dsn).to_string(),
        Dialect::Sqlite => dsn.strip_prefix("sqlite://").unwrap_or(dsn).to_string(),
        // The postgres driver wants the full URL.
        Dialect::Postgres => return dsn.to_string(),
    };

    if dialect != Dialect::MySql {
        return dsn;
    }

    if !dsn.contains('?') {
        dsn.push('?');
    }
    for (key, option) in MYSQL_DEFAULT_OPTIONS {
        if !dsn.contains(key) {
            dsn.push_str(option);
        }
    }
    dsn.replacen("?&", "?", 1)
}

/// Hide credentials in a DSN before it is written to logs.
///
/// SQLite DSNs are file paths and are returned unchanged.
pub fn mask_dsn(dsn: &str, dialect: Dialect) -> String {
    if dialect == Dialect::Sqlite {
        return dsn.to_string();
    }
    DSN_MASKER.replace_all(dsn, "$1****$2:$3****$4@").into_owned()
}

/// Network address of a MySQL server.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MySqlAddr {
    /// TCP host with an optional port.
    Tcp {
        /// Host name or IP address.
        host: String,
        /// Port, when one was given.
        port: Option<u16>,
    },
    /// Unix domain socket path.
    Unix(String),
}

/// A parsed go-style MySQL DSN:
/// `[user[:password]@][net[(addr)]]/dbname[?param1=value1&paramN=valueN]`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MySqlDsn {
    /// User name.
    pub user: Option<String>,
    /// Password.
    pub password: Option<String>,
    /// Server address.
    pub addr: MySqlAddr,
    /// Default schema.
    pub database: Option<String>,
    /// Query parameters in order of appearance.
    pub params: Vec<(String, String)>,
}

impl MySqlDsn {
    /// Parse a cleaned MySQL DSN.
    pub fn parse(dsn: &str) -> DbResult<Self> {
        let (head, query) = match dsn.split_once('?') {
            Some((head, query)) => (head, Some(query)),
            None => (dsn, None),
        };

        let (server, database) = match head.rfind('/') {
            Some(pos) => (&head[..pos], &head[pos + 1..]),
            None => {
                return Err(DbError::config(format!(
                    "invalid MySQL DSN, missing '/' before the database name: {}",
                    mask_dsn(dsn, Dialect::MySql)
                )));
            }
        };

        let (credentials, address) = match server.rfind('@') {
            Some(pos) => (Some(&server[..pos]), &server[pos + 1..]),
            None => (None, server),
        };

        let (user, password) = match credentials {
            Some(creds) => match creds.split_once(':') {
                Some((user, password)) => (Some(user.to_string()), Some(password.to_string())),
                None => (Some(creds.to_string()), None),
            },
            None => (None, None),
        };

        let params = query
            .map(|q| {
                url::form_urlencoded::parse(q.as_bytes())
                    .map(|(k, v)| (k.into_owned(), v.into_owned()))
                    .collect()
            })
            .unwrap_or_default();

        Ok(Self {
            user: user.filter(|u| !u.is_empty()),
            password,
            addr: parse_mysql_addr(address)?,
            database: Some(database.to_string()).filter(|d| !d.is_empty()),
            params,
        })
    }

    /// Look up a query parameter.
    pub fn param(&self, key: &str) -> Option<&str> {
        self.params
            .iter()
            .find(|(k, _)| k == key)
            .map(|(_, v)| v.as_str())
    }
}

fn parse_mysql_addr(address: &str) -> DbResult<MySqlAddr> {
    let (net, addr) = match address.split_once('(') {
        Some((net, rest)) => {
            let addr = rest.strip_suffix(')').ok_or_else(|| {
                DbError::config(format!("invalid MySQL address, unclosed '(': {address}"))
            })?;
            (net, addr)
        }
        None if address.is_empty() => ("tcp", ""),
        None => ("tcp", address),
    };

    match net {
        "unix" => Ok(MySqlAddr::Unix(addr.to_string())),
        "tcp" | "" => {
            if addr.is_empty() {
                return Ok(MySqlAddr::Tcp {
                    host: "localhost".to_string(),
                    port: None,
                });
            }
            match addr.rsplit_once(':') {
                Some((host, port)) => {
                    let port = port
                        .parse::<u16>()
                        .map_err(|e| DbError::config(format!("invalid MySQL port '{port}': {e}")))?;
                    Ok(MySqlAddr::Tcp {
                        host: host.to_string(),
                        port: Some(port),
                    })
                }
                None => Ok(MySqlAddr::Tcp {
                    host: addr.to_string(),
                    port: None,
                }),
            }
        }
        other => Err(DbError::config(format!("unsupported MySQL network: {other}"))),
    }
}

/// Where a SQLite database lives.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SqliteTarget {
    /// A private in-memory database.
    Memory,
    /// A database file on disk.
    File(String),
    /// A `sqlite:` URL handed to the driver as-is.
    Url(String),
}

impl SqliteTarget {
    /// Classify a cleaned SQLite DSN.
    pub fn parse(dsn: &str) -> Self {
        if dsn.starts_with("sqlite:") {
            if dsn == "sqlite::memory:" {
                return Self::Memory;
            }
            return Self::Url(dsn.to_string());
        }

        let dsn = dsn
            .strip_prefix("file://")
            .or_else(|| dsn.strip_prefix("file:"))
            .unwrap_or(dsn);
        let (path, query) = match dsn.split_once('?') {
            Some((path, query)) => (path, query),
            None => (dsn, ""),
        };

        let memory_mode = url::form_urlencoded::parse(query.as_bytes())
            .any(|(k, v)| k == "mode" && v == "memory");
        if path == ":memory:" || path.is_empty() || memory_mode {
            Self::Memory
        } else {
            Self::File(path.to_string())
        }
    }

    /// Whether the database disappears with its last connection.
    pub fn is_memory(&self) -> bool {
        matches!(self, Self::Memory)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_clean_mysql_adds_options() {
        assert_eq!(
            clean_dsn("root:pw@tcp(db:3306)/app"),
            "root:pw@tcp(db:3306)/app?collation=utf8mb4_general_ci&parseTime=true&loc=Local"
        );
    }

    #[test]
    fn test_clean_mysql_keeps_existing_options() {
        assert_eq!(
            clean_dsn("mysql://root:pw@tcp(db:3306)/app?parseTime=false"),
            "root:pw@tcp(db:3306)/app?parseTime=false&collation=utf8mb4_general_ci&loc=Local"
        );
        assert_eq!(
            clean_dsn("root:pw@tcp(db)/app?collation=utf8_bin&parseTime=true&loc=UTC"),
            "root:pw@tcp(db)/app?collation=utf8_bin&parseTime=true&loc=UTC"
        );
    }

    #[test]
    fn test_clean_sqlite_and_postgres() {
        assert_eq!(clean_dsn("sqlite://./app.db"), "./app.db");
        assert_eq!(clean_dsn(":memory:"), ":memory:");
        assert_eq!(
            clean_dsn("postgresql://u:p@localhost:5432/app?sslmode=disable"),
            "postgresql://u:p@localhost:5432/app?sslmode=disable"
        );
    }

    #[test]
    fn test_mask_dsn() {
        assert_eq!(
            mask_dsn("root:secret@tcp(db:3306)/app", Dialect::MySql),
            "r****t:s****t@tcp(db:3306)/app"
        );
        assert_eq!(mask_dsn("./secret.db", Dialect::Sqlite), "./secret.db");
    }

    #[test]
    fn test_parse_mysql_tcp() {
        let dsn = MySqlDsn::parse("root:pw@tcp(db.local:3307)/app?collation=utf8mb4_general_ci&loc=Local")
            .unwrap();
        assert_eq!(dsn.user.as_deref(), Some("root"));
        assert_eq!(dsn.password.as_deref(), Some("pw"));
        assert_eq!(
            dsn.addr,
            MySqlAddr::Tcp {
                host: "db.local".into(),
                port: Some(3307)
            }
        );
        assert_eq!(dsn.database.as_deref(), Some("app"));
        assert_eq!(dsn.param("collation"), Some("utf8mb4_general_ci"));
        assert_eq!(dsn.param("parseTime"), None);
    }

    #[test]
    fn test_parse_mysql_password_with_at_sign() {
        let dsn = MySqlDsn::parse("app:p@ss@tcp(db)/shop").unwrap();
        assert_eq!(dsn.user.as_deref(), Some("app"));
        assert_eq!(dsn.password.as_deref(), Some("p@ss"));
        assert_eq!(
            dsn.addr,
            MySqlAddr::Tcp {
                host: "db".into(),
                port: None
            }
        );
    }

    #[test]
    fn test_parse_mysql_unix_and_defaults() {
        let dsn = MySqlDsn::parse("root@unix(/run/mysqld/mysqld.sock)/app").unwrap();
        assert_eq!(dsn.addr, MySqlAddr::Unix("/run/mysqld/mysqld.sock".into()));
        assert_eq!(dsn.password, None);

        let dsn = MySqlDsn::parse("/app").unwrap();
        assert_eq!(dsn.user, None);
        assert_eq!(
            dsn.addr,
            MySqlAddr::Tcp {
                host: "localhost".into(),
                port: None
            }
        );
    }

    #[test]
    fn test_parse_mysql_errors() {
        assert!(MySqlDsn::parse("root:pw@tcp(db:3306)").is_err());
        assert!(MySqlDsn::parse("root:pw@tcp(db:99999)/app").is_err());
        assert!(MySqlDsn::parse("root:pw@pipe(x)/app").is_err());
    }

    #[test]
    fn test_sqlite_target() {
        assert_eq!(SqliteTarget::parse(":memory:"), SqliteTarget::Memory);
        assert_eq!(SqliteTarget::parse("sqlite::memory:"), SqliteTarget::Memory);
        assert_eq!(SqliteTarget::parse("file::memory:?cache=shared"), SqliteTarget::Memory);
        assert_eq!(SqliteTarget::parse("file:app.db?mode=memory"), SqliteTarget::Memory);
        assert_eq!(SqliteTarget::parse("./app.db"), SqliteTarget::File("./app.db".into()));
        assert_eq!(SqliteTarget::parse("file:app.db"), SqliteTarget::File("app.db".into()));
        assert_eq!(SqliteTarget::parse("file://./app.db"), SqliteTarget::File("./app.db".into()));
        assert_eq!(
            SqliteTarget::parse("sqlite:app.db?mode=rwc"),
            SqliteTarget::Url("sqlite:app.db?mode=rwc".into())
        );
    }
}
