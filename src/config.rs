//! Server configuration from CLI flags and environment variables.

use std::path::PathBuf;

use anyhow::Result;
use clap::Args;

use crate::db::Database;

pub const DEFAULT_PORT: u16 = 3000;
pub const DEFAULT_BIND: &str = "127.0.0.1";

#[derive(Debug, Clone, Args)]
pub struct ServeArgs {
    /// Port for HTTP API
    #[arg(short, long, env = "PMBOARD_PORT", default_value_t = DEFAULT_PORT)]
    pub port: u16,

    /// Address to bind to
    #[arg(long, env = "PMBOARD_BIND", default_value = DEFAULT_BIND)]
    pub bind: String,

    /// SQLite database file (defaults to the platform data directory)
    #[arg(long, env = "PMBOARD_DB")]
    pub db: Option<PathBuf>,

    /// Directory for uploaded attachments
    #[arg(long, env = "PMBOARD_UPLOAD_DIR")]
    pub uploads: Option<PathBuf>,

    /// Public URL used in generated agent instructions
    #[arg(long, env = "PMBOARD_PUBLIC_URL")]
    pub base_url: Option<String>,
}

impl Default for ServeArgs {
    fn default() -> Self {
        Self {
            port: DEFAULT_PORT,
            bind: DEFAULT_BIND.into(),
            db: None,
            uploads: None,
            base_url: None,
        }
    }
}

/// Fully resolved settings for a server run.
#[derive(Debug, Clone)]
pub struct Config {
    pub bind: String,
    pub port: u16,
    pub db_path: PathBuf,
    pub upload_dir: PathBuf,
    /// Never ends with a slash.
    pub base_url: String,
}

impl Config {
    pub fn from_args(args: ServeArgs) -> Result<Self> {
        let data_dir = match (&args.db, &args.uploads) {
            (Some(_), Some(_)) => None,
            _ => Some(Database::default_data_dir()?),
        };
        Ok(Self::resolve(args, data_dir))
    }

    fn resolve(args: ServeArgs, data_dir: Option<PathBuf>) -> Self {
        let data_dir = data_dir.unwrap_or_default();
        let base_url = args
            .base_url
            .filter(|url| !url.trim().is_empty())
            .unwrap_or_else(|| format!("http://{}:{}", args.bind, args.port));

        Self {
            db_path: args.db.unwrap_or_else(|| data_dir.join("pmboard.db")),
            upload_dir: args.uploads.unwrap_or_else(|| data_dir.join("uploads")),
            base_url: base_url.trim_end_matches('/').to_string(),
            bind: args.bind,
            port: args.port,
        }
    }

    pub fn listen_addr(&self) -> String {
        format!("{}:{}", self.bind, self.port)
    }
}
