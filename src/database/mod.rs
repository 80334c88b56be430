//! MySQL connection factory.
//!
//! [`connect`] opens a pool, works out the server dialect and hands back a
//! [`Database`] handle together with the [`Cleanup`] that releases it:
//!
//! ```ignore
//! let config = littleblog::load_config()?;
//! let (db, cleanup) = littleblog::database::connect(&config.database).await?;
//! let result = run(&db).await;
//! cleanup.close().await?;
//! result
//! ```

pub mod dialect;
pub mod dsn;

use async_trait::async_trait;
use sqlx::mysql::MySqlPoolOptions;
use std::sync::Arc;
use std::time::Duration;
use tokio::time::Instant;

use crate::config::DatabaseConfig;
use crate::error::{Error, Result};
use dialect::{Dialect, ServerVersion};
use dsn::Dsn;

/// Database connection pool type
pub type DbPool = sqlx::MySqlPool;

/// Ready-to-use handle: the pool plus the dialect negotiated with the server.
///
/// Cloning is cheap and shares the same pool.
#[derive(Debug, Clone)]
pub struct Database {
    pool: DbPool,
    dialect: Dialect,
}

impl Database {
    pub fn pool(&self) -> &DbPool {
        &self.pool
    }

    pub fn dialect(&self) -> &Dialect {
        &self.dialect
    }

    /// Round-trips a trivial query.
    pub async fn ping(&self) -> Result<()> {
        sqlx::query("SELECT 1").execute(&self.pool).await?;
        Ok(())
    }
}

/// Something [`Cleanup`] can release.
#[async_trait]
pub trait PoolResource: Send + Sync {
    /// Stops handing out connections and closes the open ones.
    async fn close(&self);

    fn is_closed(&self) -> bool;

    /// Connections currently open, idle or checked out.
    fn open_connections(&self) -> u32;
}

#[async_trait]
impl PoolResource for DbPool {
    async fn close(&self) {
        sqlx::Pool::close(self).await
    }

    fn is_closed(&self) -> bool {
        sqlx::Pool::is_closed(self)
    }

    fn open_connections(&self) -> u32 {
        self.size()
    }
}

/// Releases a pool exactly once.
///
/// `close` consumes the value, so a second release does not type-check. Closing waits for
/// checked-out connections to come back, bounded by the close timeout.
#[must_use = "call `close` to release the connection pool"]
pub struct Cleanup {
    resource: Arc<dyn PoolResource>,
    timeout: Duration,
    released: bool,
}

impl Cleanup {
    pub fn new(resource: Arc<dyn PoolResource>, timeout: Duration) -> Self {
        Self {
            resource,
            timeout,
            released: false,
        }
    }

    pub async fn close(mut self) -> Result<()> {
        self.released = true;

        if self.resource.is_closed() {
            return Err(Error::Release(
                "pool was already closed by another owner".to_string(),
            ));
        }

        tracing::debug!(
            open_connections = self.resource.open_connections(),
            "Closing database pool"
        );

        if tokio::time::timeout(self.timeout, self.resource.close())
            .await
            .is_err()
        {
            return Err(Error::Timeout(format!(
                "closing the pool exceeded {:?} with {} connection(s) still open",
                self.timeout,
                self.resource.open_connections()
            )));
        }

        let remaining = self.resource.open_connections();
        if remaining > 0 {
            return Err(Error::Release(format!(
                "{} connection(s) still open after close",
                remaining
            )));
        }

        tracing::info!("Database pool closed");
        Ok(())
    }
}

impl Drop for Cleanup {
    fn drop(&mut self) {
        if !self.released && !self.resource.is_closed() {
            tracing::warn!(
                "Cleanup dropped without close(); the pool stays open until its last handle is dropped"
            );
        }
    }
}

impl std::fmt::Debug for Cleanup {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Cleanup")
            .field("timeout", &self.timeout)
            .field("released", &self.released)
            .finish()
    }
}

/// Opens the configured database, bounded by `connect_timeout_seconds`.
pub async fn connect(config: &DatabaseConfig) -> Result<(Database, Cleanup)> {
    connect_with_timeout(config, config.connect_timeout()).await
}

/// Opens the configured database, giving up after `deadline`.
///
/// The deadline covers every connect attempt, retry backoff and the version probe.
/// Attempts split the time left between them, so a failure that outlasts the
/// deadline surfaces as the driver's last error rather than a bare timeout.
pub async fn connect_with_timeout(
    config: &DatabaseConfig,
    deadline: Duration,
) -> Result<(Database, Cleanup)> {
    config.validate()?;
    let dsn = config.dsn()?;
    let pinned = config
        .compat
        .server_version
        .as_deref()
        .map(ServerVersion::parse)
        .transpose()?;

    tracing::info!(dsn = %dsn, max_connections = config.max_connections, "Connecting to database");

    let expires_at = Instant::now() + deadline;
    let pool = open_pool(config, &dsn, expires_at).await?;

    let probed = if config.compat.needs_probe() {
        match tokio::time::timeout_at(expires_at, probe_version(&pool)).await {
            Ok(Ok(version)) => Some(version),
            Ok(Err(e)) => {
                pool.close().await;
                return Err(e);
            }
            Err(_) => {
                pool.close().await;
                return Err(Error::Timeout(format!(
                    "version probe on {} exceeded {:?}",
                    dsn, deadline
                )));
            }
        }
    } else {
        None
    };

    let version = pinned.or(probed);
    let dialect = Dialect::resolve(&config.compat, version);

    tracing::info!(
        server_version = dialect.server_version.as_ref().map(|v| v.raw()).unwrap_or("unknown"),
        default_string_size = dialect.default_string_size,
        disable_datetime_precision = dialect.disable_datetime_precision,
        dont_support_rename_index = dialect.dont_support_rename_index,
        dont_support_rename_column = dialect.dont_support_rename_column,
        "Database connected"
    );

    let cleanup = Cleanup::new(Arc::new(pool.clone()), config.close_timeout());
    Ok((Database { pool, dialect }, cleanup))
}

async fn open_pool(config: &DatabaseConfig, dsn: &Dsn, expires_at: Instant) -> Result<DbPool> {
    let options = dsn.connect_options();

    let pool = retry_until(
        expires_at,
        config.connect_retries,
        config.retry_backoff(),
        |budget| {
            MySqlPoolOptions::new()
                .max_connections(config.max_connections)
                .acquire_timeout(budget)
                .connect_with(options.clone())
        },
    )
    .await?;

    Ok(pool)
}

/// Runs `attempt` until it succeeds or another try is no longer allowed.
///
/// Each attempt is handed its share of the remaining time: what is left divided
/// by the attempts still allowed, this one included.
async fn retry_until<T, F, Fut>(
    expires_at: Instant,
    retries: u32,
    backoff: Duration,
    mut attempt: F,
) -> std::result::Result<T, sqlx::Error>
where
    F: FnMut(Duration) -> Fut,
    Fut: std::future::Future<Output = std::result::Result<T, sqlx::Error>>,
{
    let mut backoff = backoff;
    let mut retried = 0;

    loop {
        let remaining = expires_at.saturating_duration_since(Instant::now());
        let budget = remaining / (retries - retried + 1);

        let err = match attempt(budget).await {
            Ok(value) => return Ok(value),
            Err(e) => e,
        };

        if retried >= retries || !is_transient(&err) {
            return Err(err);
        }
        if Instant::now() + backoff >= expires_at {
            tracing::warn!(
                attempt = retried + 1,
                backoff_ms = backoff.as_millis() as u64,
                "Connect deadline leaves no room for another attempt"
            );
            return Err(err);
        }

        retried += 1;
        tracing::warn!(
            attempt = retried,
            max_retries = retries,
            backoff_ms = backoff.as_millis() as u64,
            error = %err,
            "Database connect failed, retrying"
        );
        tokio::time::sleep(backoff).await;
        backoff = backoff.saturating_mul(2);
    }
}

/// Network trouble is worth retrying; rejected credentials or an unknown database are not.
fn is_transient(err: &sqlx::Error) -> bool {
    matches!(
        err,
        sqlx::Error::Io(_) | sqlx::Error::PoolTimedOut | sqlx::Error::Tls(_)
    )
}

async fn probe_version(pool: &DbPool) -> Result<ServerVersion> {
    let raw: String = sqlx::query_scalar("SELECT VERSION()")
        .fetch_one(pool)
        .await?;
    tracing::debug!(version = %raw, "Probed server version");
    ServerVersion::parse(&raw)
}
