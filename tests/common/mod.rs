//! Shared helpers for the integration tests.

use async_trait::async_trait;
use littleblog::config::DatabaseConfig;
use littleblog::database::PoolResource;
use secrecy::SecretString;
use std::sync::atomic::{AtomicBool, AtomicU32, Ordering};
use std::time::Duration;

/// Database config pointing at `dsn`, with short timeouts suited to tests.
#[allow(dead_code)]
pub fn config_with_dsn(dsn: &str) -> DatabaseConfig {
    DatabaseConfig {
        dsn: Some(SecretString::from(dsn.to_string())),
        connect_timeout_seconds: 2,
        close_timeout_seconds: 2,
        ..DatabaseConfig::default()
    }
}

/// Config for the live MySQL server named by `LITTLEBLOG__DATABASE__DSN`.
#[allow(dead_code)]
pub fn live_config() -> DatabaseConfig {
    dotenvy::dotenv().ok();
    let dsn = std::env::var("LITTLEBLOG__DATABASE__DSN")
        .expect("LITTLEBLOG__DATABASE__DSN required");
    DatabaseConfig {
        connect_timeout_seconds: 10,
        ..config_with_dsn(&dsn)
    }
}

/// How a [`CountingPool`] behaves when closed.
#[allow(dead_code)]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CloseBehavior {
    /// Every connection is released.
    Releases,
    /// Close completes but connections stay open.
    Leaks,
    /// Close never completes, like a pool waiting on a stuck query.
    Hangs,
}

/// Test double that tracks open connections and close calls.
#[allow(dead_code)]
pub struct CountingPool {
    open: AtomicU32,
    closed: AtomicBool,
    close_calls: AtomicU32,
    behavior: CloseBehavior,
}

#[allow(dead_code)]
impl CountingPool {
    pub fn new(open: u32, behavior: CloseBehavior) -> Self {
        Self {
            open: AtomicU32::new(open),
            closed: AtomicBool::new(false),
            close_calls: AtomicU32::new(0),
            behavior,
        }
    }

    pub fn close_calls(&self) -> u32 {
        self.close_calls.load(Ordering::SeqCst)
    }

    /// Marks the pool closed as if another owner had released it.
    pub fn close_elsewhere(&self) {
        self.closed.store(true, Ordering::SeqCst);
        self.open.store(0, Ordering::SeqCst);
    }
}

#[async_trait]
impl PoolResource for CountingPool {
    async fn close(&self) {
        self.close_calls.fetch_add(1, Ordering::SeqCst);
        self.closed.store(true, Ordering::SeqCst);

        match self.behavior {
            CloseBehavior::Releases => self.open.store(0, Ordering::SeqCst),
            CloseBehavior::Leaks => {}
            CloseBehavior::Hangs => {
                tokio::time::sleep(Duration::from_secs(3600)).await;
            }
        }
    }

    fn is_closed(&self) -> bool {
        self.closed.load(Ordering::SeqCst)
    }

    fn open_connections(&self) -> u32 {
        self.open.load(Ordering::SeqCst)
    }
}
