// Store configuration and database path resolution

use eyre::{Context, Result};
use serde::{Deserialize, Serialize};
use std::ffi::OsString;
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Database file used when nothing else is configured
pub const DEFAULT_DB_FILE: &str = "todo.db";

/// Environment variable supplying the default database path
pub const DB_PATH_ENV: &str = "DB_PATH";

const DEFAULT_BUSY_TIMEOUT_MS: u64 = 5000;

/// Store configuration, loadable from YAML
///
/// ```yaml
/// db_path: /home/me/.local/share/todo/todo.db
/// busy_timeout_ms: 2000
/// reject_recompletion: true
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Database file; overridden by an explicit path, overrides `DB_PATH`
    pub db_path: Option<PathBuf>,
    /// How long SQLite waits on a locked database before failing
    pub busy_timeout_ms: u64,
    /// Make `mark_completed` fail on an already-completed task
    pub reject_recompletion: bool,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            db_path: None,
            busy_timeout_ms: DEFAULT_BUSY_TIMEOUT_MS,
            reject_recompletion: false,
        }
    }
}

impl Config {
    /// Load configuration from a YAML file
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        let content = fs::read_to_string(path).with_context(|| format!("Failed to read config file {:?}", path))?;
        let config: Config =
            serde_yaml::from_str(&content).with_context(|| format!("Failed to parse config file {:?}", path))?;
        Ok(config)
    }

    pub fn busy_timeout(&self) -> Duration {
        Duration::from_millis(self.busy_timeout_ms)
    }

    /// Pick the database path: explicit, then `db_path`, then `DB_PATH`, then `todo.db`
    pub fn resolve_db_path(&self, explicit: Option<&Path>) -> PathBuf {
        let explicit = explicit.or(self.db_path.as_deref());
        resolve_from(explicit, std::env::var_os(DB_PATH_ENV))
    }
}

/// Pick the database path: explicit, then `DB_PATH`, then `todo.db`
pub fn resolve_db_path(explicit: Option<&Path>) -> PathBuf {
    resolve_from(explicit, std::env::var_os(DB_PATH_ENV))
}

fn resolve_from(explicit: Option<&Path>, env_value: Option<OsString>) -> PathBuf {
    if let Some(path) = explicit {
        return path.to_path_buf();
    }
    match env_value {
        Some(value) if !value.is_empty() => PathBuf::from(value),
        _ => PathBuf::from(DEFAULT_DB_FILE),
    }
}
