//! Service configuration from CLI flags and environment

use anyhow::{Context, Result};
use clap::Parser;
use std::net::SocketAddr;
use std::path::PathBuf;

#[derive(Parser, Debug, Clone)]
#[command(name = "account-service")]
#[command(about = "Account, authentication and role-based access API")]
pub struct Config {
    /// Address the HTTP server binds to
    #[arg(long, env = "BIND_ADDR", default_value = "0.0.0.0:3000")]
    pub bind_addr: SocketAddr,

    /// SQLite database file; relative paths resolve against the crate directory
    #[arg(long, env = "AUTH_DB_PATH", default_value = "account_service.db")]
    pub db_path: String,

    /// Requests allowed per client per minute
    #[arg(long, env = "RATE_LIMIT_PER_MINUTE", default_value = "60")]
    pub rate_limit_per_minute: u32,

    /// bcrypt work factor (4-31)
    #[arg(long, env = "BCRYPT_COST", default_value_t = bcrypt::DEFAULT_COST)]
    pub bcrypt_cost: u32,

    /// Seed demo users and fixture cards into an empty database
    #[arg(long, env = "SEED_DEMO_DATA", default_value_t = false)]
    pub seed_demo_data: bool,
}

impl Config {
    /// Validate values clap cannot express
    pub fn validate(&self) -> Result<()> {
        if !(4..=31).contains(&self.bcrypt_cost) {
            anyhow::bail!("BCRYPT_COST must be between 4 and 31, got {}", self.bcrypt_cost);
        }
        if self.rate_limit_per_minute == 0 {
            anyhow::bail!("RATE_LIMIT_PER_MINUTE must be positive");
        }
        if self.db_path.trim().is_empty() {
            anyhow::bail!("AUTH_DB_PATH must not be empty");
        }
        Ok(())
    }

    /// Database path with relative paths anchored at the crate directory,
    /// not the caller's cwd.
    pub fn resolved_db_path(&self) -> Result<String> {
        let p = PathBuf::from(self.db_path.trim());
        let resolved = if p.is_absolute() {
            p
        } else {
            PathBuf::from(env!("CARGO_MANIFEST_DIR")).join(p)
        };
        resolved
            .to_str()
            .map(str::to_string)
            .context("Database path is not valid UTF-8")
    }
}
