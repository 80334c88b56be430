pub mod config;
pub mod database;
pub mod error;
pub mod models;
pub mod telemetry;

pub use crate::config::Config;
pub use database::{Cleanup, Database, DbPool, connect};
pub use error::{Error, Result};

/// Load configuration from environment variables
pub fn load_config() -> Result<Config> {
    Ok(Config::load()?)
}
