use std::path::PathBuf;

use tracing_subscriber::EnvFilter;

pub const DB_ENV: &str = "MILESTONES_DB";
pub const LOG_ENV: &str = "MILESTONES_LOG";
pub const ACTOR_ENV: &str = "MILESTONES_ACTOR";
pub const ROLE_ENV: &str = "MILESTONES_ROLE";

const DEFAULT_DB_NAME: &str = "milestones.db";
const DEFAULT_LOG_FILTER: &str = "milestones=warn";

#[derive(Debug, Clone)]
pub struct Config {
    pub db_path: PathBuf,
    pub log_filter: String,
}

impl Config {
    pub fn from_env() -> Self {
        Self {
            db_path: db_path(),
            log_filter: std::env::var(LOG_ENV).unwrap_or_else(|_| DEFAULT_LOG_FILTER.to_string()),
        }
    }
}

pub fn db_path() -> PathBuf {
    if let Ok(path) = std::env::var(DB_ENV) {
        return PathBuf::from(path);
    }

    let path = default_db_path();
    if let Some(dir) = path.parent() {
        std::fs::create_dir_all(dir).ok();
    }
    path
}

fn default_db_path() -> PathBuf {
    dirs::config_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join("milestones")
        .join(DEFAULT_DB_NAME)
}

/// Logs go to stderr so that `--json` output on stdout stays parseable.
/// `RUST_LOG` overrides the configured filter.
pub fn init_logging(config: &Config) {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(&config.log_filter));

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();
}
