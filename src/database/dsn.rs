//! Data source names in the `user:password@tcp(host:port)/dbname?param=value` form.

use secrecy::{ExposeSecret, SecretString};
use sqlx::mysql::MySqlConnectOptions;
use std::fmt;

use crate::error::{Error, Result};

pub const DEFAULT_PORT: u16 = 3306;
pub const DEFAULT_HOST: &str = "127.0.0.1";
pub const DEFAULT_CHARSET: &str = "utf8mb4";

/// Session time zone requested by the `loc` parameter.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TimeZone {
    /// Leave the session on the server's zone.
    Local,
    Utc,
    Named(String),
}

impl TimeZone {
    pub fn from_param(value: &str) -> Self {
        match value {
            "Local" | "local" | "" => TimeZone::Local,
            "UTC" | "utc" => TimeZone::Utc,
            other => TimeZone::Named(other.to_string()),
        }
    }

    fn session_value(&self) -> Option<String> {
        match self {
            TimeZone::Local => None,
            TimeZone::Utc => Some("+00:00".to_string()),
            TimeZone::Named(name) => Some(name.clone()),
        }
    }
}

impl fmt::Display for TimeZone {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TimeZone::Local => write!(f, "Local"),
            TimeZone::Utc => write!(f, "UTC"),
            TimeZone::Named(name) => write!(f, "{}", name),
        }
    }
}

/// Parsed data source name. `Display` masks the password.
#[derive(Debug, Clone)]
pub struct Dsn {
    pub user: String,
    pub password: SecretString,
    pub host: String,
    pub port: u16,
    pub database: String,
    pub charset: String,
    pub parse_time: bool,
    pub loc: TimeZone,
}

impl Dsn {
    pub fn parse(raw: &str) -> Result<Self> {
        let raw = raw.trim();
        if raw.is_empty() {
            return Err(invalid("empty data source name"));
        }

        // The database name follows the last '/', so passwords may contain '/' and '@'
        let (prefix, tail) = raw
            .rsplit_once('/')
            .ok_or_else(|| invalid("missing '/' before database name"))?;

        let (userinfo, netaddr) = match prefix.rsplit_once('@') {
            Some((userinfo, netaddr)) => (Some(userinfo), netaddr),
            None => (None, prefix),
        };

        let (user, password) = match userinfo {
            Some(info) => match info.split_once(':') {
                Some((user, password)) => (user.to_string(), password.to_string()),
                None => (info.to_string(), String::new()),
            },
            None => (String::new(), String::new()),
        };

        let (host, port) = parse_netaddr(netaddr)?;

        let (database, query) = match tail.split_once('?') {
            Some((database, query)) => (database, Some(query)),
            None => (tail, None),
        };
        if database.is_empty() {
            return Err(invalid("missing database name"));
        }

        let mut dsn = Dsn {
            user,
            password: SecretString::from(password),
            host,
            port,
            database: database.to_string(),
            charset: DEFAULT_CHARSET.to_string(),
            parse_time: false,
            loc: TimeZone::Utc,
        };

        for pair in query.unwrap_or_default().split('&').filter(|p| !p.is_empty()) {
            let (key, value) = pair
                .split_once('=')
                .ok_or_else(|| invalid(format!("parameter '{}' has no value", pair)))?;
            let value = percent_decode(value)?;
            match key {
                "charset" => {
                    // The driver accepts a fallback list; the first entry is what we request
                    let first = value.split(',').next().unwrap_or_default();
                    if first.is_empty() {
                        return Err(invalid("empty charset"));
                    }
                    dsn.charset = first.to_string();
                }
                "parseTime" => dsn.parse_time = parse_bool(key, &value)?,
                "loc" => dsn.loc = TimeZone::from_param(&value),
                other => return Err(invalid(format!("unsupported parameter '{}'", other))),
            }
        }

        Ok(dsn)
    }

    /// Connection options for sqlx's MySQL driver.
    pub fn connect_options(&self) -> MySqlConnectOptions {
        let mut options = MySqlConnectOptions::new()
            .host(&self.host)
            .port(self.port)
            .username(&self.user)
            .database(&self.database)
            .charset(&self.charset)
            .timezone(self.loc.session_value());

        let password = self.password.expose_secret();
        if !password.is_empty() {
            options = options.password(password);
        }
        options
    }
}

impl fmt::Display for Dsn {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let host = if self.host.contains(':') {
            format!("[{}]", self.host)
        } else {
            self.host.clone()
        };
        write!(
            f,
            "{}:***@tcp({}:{})/{}?charset={}&parseTime={}&loc={}",
            self.user,
            host,
            self.port,
            self.database,
            self.charset,
            if self.parse_time { "True" } else { "False" },
            self.loc
        )
    }
}

fn invalid(msg: impl Into<String>) -> Error {
    Error::InvalidDsn(msg.into())
}

/// `tcp(host:port)`, `tcp` or nothing. Other transports are not supported.
fn parse_netaddr(netaddr: &str) -> Result<(String, u16)> {
    if netaddr.is_empty() {
        return Ok((DEFAULT_HOST.to_string(), DEFAULT_PORT));
    }

    let (net, addr) = match netaddr.split_once('(') {
        Some((net, rest)) => {
            let addr = rest
                .strip_suffix(')')
                .ok_or_else(|| invalid("unclosed '(' in network address"))?;
            (net, Some(addr))
        }
        None => (netaddr, None),
    };

    if net != "tcp" {
        return Err(invalid(format!("unsupported network '{}'", net)));
    }

    let Some(addr) = addr.filter(|a| !a.is_empty()) else {
        return Ok((DEFAULT_HOST.to_string(), DEFAULT_PORT));
    };

    // [::1]:3306 or [::1]
    if let Some(rest) = addr.strip_prefix('[') {
        let (host, after) = rest
            .split_once(']')
            .ok_or_else(|| invalid("unclosed '[' in address"))?;
        let port = match after.strip_prefix(':') {
            Some(port) => parse_port(port)?,
            None if after.is_empty() => DEFAULT_PORT,
            None => return Err(invalid(format!("malformed address '{}'", addr))),
        };
        return Ok((host.to_string(), port));
    }

    match addr.rsplit_once(':') {
        Some((host, port)) if !host.contains(':') => {
            if host.is_empty() {
                return Err(invalid("missing host"));
            }
            Ok((host.to_string(), parse_port(port)?))
        }
        Some(_) => Err(invalid(format!("IPv6 address '{}' must be bracketed", addr))),
        None => Ok((addr.to_string(), DEFAULT_PORT)),
    }
}

fn parse_port(port: &str) -> Result<u16> {
    match port.parse::<u16>() {
        Ok(0) | Err(_) => Err(invalid(format!("invalid port '{}'", port))),
        Ok(port) => Ok(port),
    }
}

fn parse_bool(key: &str, value: &str) -> Result<bool> {
    match value {
        "1" | "t" | "T" | "true" | "TRUE" | "True" => Ok(true),
        "0" | "f" | "F" | "false" | "FALSE" | "False" => Ok(false),
        other => Err(invalid(format!("invalid boolean '{}' for {}", other, key))),
    }
}

/// Decodes `%XX` escapes. Escapes must spell valid UTF-8.
fn percent_decode(value: &str) -> Result<String> {
    urlencoding::decode(value)
        .map(|decoded| decoded.into_owned())
        .map_err(|_| invalid(format!("'{}' is not valid UTF-8", value)))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_full_dsn() {
        let dsn = Dsn::parse("u:p@tcp(127.0.0.1:3306)/db?charset=utf8mb4&parseTime=True&loc=Local")
            .unwrap();

        assert_eq!(dsn.user, "u");
        assert_eq!(dsn.password.expose_secret(), "p");
        assert_eq!(dsn.host, "127.0.0.1");
        assert_eq!(dsn.port, 3306);
        assert_eq!(dsn.database, "db");
        assert_eq!(dsn.charset, "utf8mb4");
        assert!(dsn.parse_time);
        assert_eq!(dsn.loc, TimeZone::Local);
    }

    #[test]
    fn test_password_may_contain_separators() {
        let dsn = Dsn::parse("blog:p@ss/w:rd@tcp(db:3307)/little_blog").unwrap();
        assert_eq!(dsn.user, "blog");
        assert_eq!(dsn.password.expose_secret(), "p@ss/w:rd");
        assert_eq!(dsn.host, "db");
        assert_eq!(dsn.port, 3307);
        assert_eq!(dsn.database, "little_blog");
    }

    #[test]
    fn test_defaults_without_address_or_params() {
        let dsn = Dsn::parse("root@/blog").unwrap();
        assert_eq!(dsn.user, "root");
        assert_eq!(dsn.password.expose_secret(), "");
        assert_eq!(dsn.host, DEFAULT_HOST);
        assert_eq!(dsn.port, DEFAULT_PORT);
        assert_eq!(dsn.charset, DEFAULT_CHARSET);
        assert!(!dsn.parse_time);
        assert_eq!(dsn.loc, TimeZone::Utc);

        let dsn = Dsn::parse("u:p@tcp(db.local)/blog").unwrap();
        assert_eq!(dsn.host, "db.local");
        assert_eq!(dsn.port, DEFAULT_PORT);
    }

    #[test]
    fn test_ipv6_address() {
        let dsn = Dsn::parse("u:p@tcp([::1]:3310)/blog").unwrap();
        assert_eq!(dsn.host, "::1");
        assert_eq!(dsn.port, 3310);
        assert_eq!(dsn.to_string(), "u:***@tcp([::1]:3310)/blog?charset=utf8mb4&parseTime=False&loc=UTC");
    }

    #[test]
    fn test_escaped_location() {
        let dsn = Dsn::parse("u:p@tcp(h:1)/d?loc=Asia%2FShanghai").unwrap();
        assert_eq!(dsn.loc, TimeZone::Named("Asia/Shanghai".to_string()));

        let dsn = Dsn::parse("u:p@tcp(h:1)/d?loc=America%2FSao_Paulo&charset=utf8mb4%2Cutf8").unwrap();
        assert_eq!(dsn.loc, TimeZone::Named("America/Sao_Paulo".to_string()));
        assert_eq!(dsn.charset, "utf8mb4");
    }

    #[test]
    fn test_malformed_dsns_are_rejected() {
        let cases = [
            "",
            "u:p@tcp(127.0.0.1:3306)",
            "u:p@tcp(127.0.0.1:3306)/",
            "u:p@tcp(127.0.0.1:3306/db",
            "u:p@unix(/tmp/mysql.sock)/db",
            "u:p@tcp(127.0.0.1:notaport)/db",
            "u:p@tcp(127.0.0.1:0)/db",
            "u:p@tcp(::1:3306)/db",
            "u:p@tcp(h:1)/db?parseTime=maybe",
            "u:p@tcp(h:1)/db?charset",
            "u:p@tcp(h:1)/db?loc=%ff",
            "u:p@tcp(h:1)/db?readTimeout=1s",
        ];

        for raw in cases {
            let result = Dsn::parse(raw);
            assert!(
                matches!(result, Err(Error::InvalidDsn(_))),
                "expected {raw:?} to be rejected"
            );
        }
    }

    #[test]
    fn test_display_masks_password() {
        let dsn = Dsn::parse("u:topsecret@tcp(10.0.0.5:3306)/db?charset=utf8mb4&parseTime=True&loc=Local")
            .unwrap();
        let shown = dsn.to_string();

        assert!(!shown.contains("topsecret"));
        assert_eq!(
            shown,
            "u:***@tcp(10.0.0.5:3306)/db?charset=utf8mb4&parseTime=True&loc=Local"
        );
        assert!(!format!("{:?}", dsn).contains("topsecret"));
    }
}
