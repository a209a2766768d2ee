//! CLI argument parsing and startup helpers for the maintenance binary.

use std::time::Duration;

use clap::{Parser, Subcommand};
use tracing::{error, info};

use crate::config::{AuthConfig, DEFAULT_SESSION_RETENTION};
use crate::db::Database;
use crate::error::{AuthResult, now_secs};

#[derive(clap::ValueEnum, Clone, Debug, Default)]
pub enum LogFormat {
    #[default]
    Pretty,
    Json,
    Compact,
}

#[derive(Parser, Debug, Clone)]
#[command(name = "sessioncore", about = "Session and token maintenance")]
pub struct Args {
    /// Path to SQLite database file
    #[arg(short, long, env = "SESSIONCORE_DATABASE", default_value = "sessioncore.db")]
    pub database: String,

    /// Days to keep expired or revoked sessions before deleting them
    #[arg(
        long,
        env = "SESSIONCORE_RETENTION_DAYS",
        default_value_t = DEFAULT_SESSION_RETENTION.as_secs() / 86400
    )]
    pub retention_days: u64,

    /// Log output format
    #[arg(short, long, env = "SESSIONCORE_LOG_FORMAT", default_value = "pretty")]
    pub log_format: LogFormat,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand, Debug, Clone)]
pub enum Command {
    /// Delete stale sessions once and exit
    Cleanup,
    /// List active sessions of a user
    Sessions {
        #[arg(long)]
        user: String,
    },
    /// Revoke every session of a user
    RevokeAll {
        #[arg(long)]
        user: String,
        /// Session id to keep
        #[arg(long)]
        except: Option<String>,
    },
    /// List recorded security events of a user
    Events {
        #[arg(long)]
        user: String,
        #[arg(long, default_value_t = 50)]
        limit: i64,
    },
}

/// Initialize logging based on the specified format.
pub fn init_logging(format: &LogFormat) {
    match format {
        LogFormat::Pretty => tracing_subscriber::fmt::init(),
        LogFormat::Json => tracing_subscriber::fmt().json().init(),
        LogFormat::Compact => tracing_subscriber::fmt().compact().init(),
    }
}

/// Build the configuration from validated arguments.
pub fn build_config(args: &Args) -> AuthConfig {
    AuthConfig {
        session_retention: Duration::from_secs(args.retention_days * 24 * 60 * 60),
        ..AuthConfig::default()
    }
}

/// Open the database, logging errors if it fails.
pub async fn open_database(path: &str) -> Option<Database> {
    match Database::open(path).await {
        Ok(db) => {
            info!(path = %path, "Database opened");
            Some(db)
        }
        Err(e) => {
            error!(path = %path, error = %e, "Failed to open database");
            None
        }
    }
}

/// Revoke every session of `user` except `except`. Needs only the
/// database: nothing is signed.
pub async fn handle_revoke_all(
    db: &Database,
    user: &str,
    except: Option<&str>,
) -> AuthResult<u64> {
    let count = db
        .sessions()
        .revoke_all_for_user(user, except, now_secs()?)
        .await?;
    info!(user_id = %user, count, "Revoked sessions from the command line");
    Ok(count)
}
