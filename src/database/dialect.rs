//! MySQL/MariaDB compatibility handling.
//!
//! Older servers lack fractional-second DATETIME columns, `RENAME INDEX` and `RENAME COLUMN`.
//! [`CompatOptions`] lets a deployment force the legacy behaviors; when version detection is
//! enabled, [`Dialect::resolve`] also turns on whatever the detected server needs.

use serde::{Deserialize, Serialize};
use std::fmt;

use crate::error::{Error, Result, ValidationErrors};

pub const DEFAULT_STRING_SIZE: u32 = 256;
pub const DEFAULT_DATETIME_PRECISION: u8 = 3;

#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
#[serde(default)]
pub struct CompatOptions {
    /// Column width used when a string field carries no explicit size
    pub default_string_size: u32,
    pub disable_datetime_precision: bool,
    /// Rename indexes by dropping and recreating them
    pub dont_support_rename_index: bool,
    /// Rename columns with `CHANGE` instead of `RENAME COLUMN`
    pub dont_support_rename_column: bool,
    /// Do not query the server version on connect
    pub skip_initialize_with_version: bool,
    /// Use this version string instead of asking the server
    pub server_version: Option<String>,
}

impl Default for CompatOptions {
    fn default() -> Self {
        Self {
            default_string_size: DEFAULT_STRING_SIZE,
            disable_datetime_precision: false,
            dont_support_rename_index: false,
            dont_support_rename_column: false,
            skip_initialize_with_version: false,
            server_version: None,
        }
    }
}

impl CompatOptions {
    /// Whether connecting has to ask the server for `VERSION()`.
    pub fn needs_probe(&self) -> bool {
        !self.skip_initialize_with_version && self.server_version.is_none()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Flavor {
    MySql,
    MariaDb,
}

/// Parsed `SELECT VERSION()` output.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ServerVersion {
    pub flavor: Flavor,
    pub major: u32,
    pub minor: u32,
    pub patch: u32,
    raw: String,
}

impl ServerVersion {
    pub fn parse(raw: &str) -> Result<Self> {
        let trimmed = raw.trim();
        let flavor = if trimmed.to_ascii_lowercase().contains("mariadb") {
            Flavor::MariaDb
        } else {
            Flavor::MySql
        };

        // MariaDB may report "5.5.5-10.6.12-MariaDB" for old replication clients
        let numeric = match flavor {
            Flavor::MariaDb => trimmed.strip_prefix("5.5.5-").unwrap_or(trimmed),
            Flavor::MySql => trimmed,
        };
        let numeric = numeric
            .split(|c: char| c != '.' && !c.is_ascii_digit())
            .next()
            .unwrap_or_default();

        let mut parts = numeric.split('.').map(|p| p.parse::<u32>());
        let major = match parts.next() {
            Some(Ok(major)) => major,
            _ => {
                return Err(Error::Validation(ValidationErrors::Single {
                    field: "server_version".to_string(),
                    message: format!("unrecognized server version '{}'", trimmed),
                }));
            }
        };
        let minor = parts.next().and_then(|p| p.ok()).unwrap_or(0);
        let patch = parts.next().and_then(|p| p.ok()).unwrap_or(0);

        Ok(Self {
            flavor,
            major,
            minor,
            patch,
            raw: trimmed.to_string(),
        })
    }

    pub fn raw(&self) -> &str {
        &self.raw
    }

    pub fn is_mariadb(&self) -> bool {
        self.flavor == Flavor::MariaDb
    }

    fn mysql_before(&self, major: u32, minor: u32) -> bool {
        self.flavor == Flavor::MySql && (self.major, self.minor) < (major, minor)
    }
}

impl fmt::Display for ServerVersion {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.raw)
    }
}

/// Effective SQL dialect for one connection pool.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Dialect {
    pub default_string_size: u32,
    pub disable_datetime_precision: bool,
    pub dont_support_rename_index: bool,
    pub dont_support_rename_column: bool,
    pub server_version: Option<ServerVersion>,
}

impl Dialect {
    /// Combines configured flags with what `version` requires. A flag set in `options`
    /// is never turned off by detection.
    pub fn resolve(options: &CompatOptions, version: Option<ServerVersion>) -> Self {
        let mut dialect = Self {
            default_string_size: options.default_string_size,
            disable_datetime_precision: options.disable_datetime_precision,
            dont_support_rename_index: options.dont_support_rename_index,
            dont_support_rename_column: options.dont_support_rename_column,
            server_version: None,
        };

        if let Some(version) = &version {
            if version.is_mariadb() {
                dialect.dont_support_rename_index = true;
                dialect.dont_support_rename_column = true;
            } else if version.mysql_before(5, 6) {
                dialect.disable_datetime_precision = true;
                dialect.dont_support_rename_index = true;
                dialect.dont_support_rename_column = true;
            } else if version.mysql_before(5, 7) {
                dialect.dont_support_rename_index = true;
                dialect.dont_support_rename_column = true;
            } else if version.mysql_before(8, 0) {
                dialect.dont_support_rename_column = true;
            }
        }

        dialect.server_version = version;
        dialect
    }

    /// Column type for a string field, falling back to `default_string_size`.
    pub fn string_type(&self, size: Option<u32>) -> String {
        let size = size.filter(|s| *s > 0).unwrap_or(self.default_string_size);
        match size {
            0 => "longtext".to_string(),
            1..=65535 => format!("varchar({})", size),
            65536..=16_777_215 => "mediumtext".to_string(),
            _ => "longtext".to_string(),
        }
    }

    pub fn datetime_type(&self, precision: Option<u8>) -> String {
        if self.disable_datetime_precision {
            return "DATETIME".to_string();
        }
        let precision = precision.unwrap_or(DEFAULT_DATETIME_PRECISION).min(6);
        if precision == 0 {
            "DATETIME".to_string()
        } else {
            format!("DATETIME({})", precision)
        }
    }

    /// Statements renaming an index. Without native support the index is dropped and
    /// rebuilt on `columns`.
    pub fn rename_index_sql(
        &self,
        table: &str,
        old_name: &str,
        new_name: &str,
        columns: &[&str],
    ) -> Vec<String> {
        if !self.dont_support_rename_index {
            return vec![format!(
                "ALTER TABLE {} RENAME INDEX {} TO {}",
                quote(table),
                quote(old_name),
                quote(new_name)
            )];
        }

        let columns = columns.iter().map(|c| quote(c)).collect::<Vec<_>>().join(", ");
        vec![
            format!("ALTER TABLE {} DROP INDEX {}", quote(table), quote(old_name)),
            format!("CREATE INDEX {} ON {} ({})", quote(new_name), quote(table), columns),
        ]
    }

    /// Statement renaming a column. `CHANGE` needs the full column definition.
    pub fn rename_column_sql(
        &self,
        table: &str,
        old_name: &str,
        new_name: &str,
        definition: &str,
    ) -> String {
        if self.dont_support_rename_column {
            format!(
                "ALTER TABLE {} CHANGE {} {} {}",
                quote(table),
                quote(old_name),
                quote(new_name),
                definition
            )
        } else {
            format!(
                "ALTER TABLE {} RENAME COLUMN {} TO {}",
                quote(table),
                quote(old_name),
                quote(new_name)
            )
        }
    }
}

impl Default for Dialect {
    fn default() -> Self {
        Self::resolve(&CompatOptions::default(), None)
    }
}

fn quote(ident: &str) -> String {
    format!("`{}`", ident.replace('`', "``"))
}
