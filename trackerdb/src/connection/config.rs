use crate::error::{Result, TrackerDbError};
use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;

/// Environment variable holding a connection string, e.g.
/// `db=tracker.db timeout=2 shared_cache=true`
pub const CONNECTION_ENV: &str = "TRACKERDB_CONNECTION";

/// How to reach the database file
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConnectionConfig {
    pub path: PathBuf,
    /// How long a statement waits on a locked database before failing
    pub busy_timeout: Duration,
    pub shared_cache: bool,
}

impl Default for ConnectionConfig {
    fn default() -> Self {
        ConnectionConfig {
            path: PathBuf::from("tracker.db"),
            busy_timeout: Duration::from_secs(2),
            shared_cache: true,
        }
    }
}

impl ConnectionConfig {
    /// Read the connection string from `TRACKERDB_CONNECTION`, or fall back to
    /// the defaults when it is unset.
    pub fn from_env() -> Result<Self> {
        match std::env::var(CONNECTION_ENV) {
            Ok(s) if !s.trim().is_empty() => s.parse(),
            _ => Ok(ConnectionConfig::default()),
        }
    }

    /// Render back into connection string form
    pub fn connection_string(&self) -> String {
        format!(
            "db={} timeout={} shared_cache={}",
            self.path.display(),
            self.busy_timeout.as_secs(),
            self.shared_cache
        )
    }
}

/// Parses whitespace-separated `key=value` pairs. Keys not given keep their
/// default.
impl FromStr for ConnectionConfig {
    type Err = TrackerDbError;

    fn from_str(s: &str) -> Result<Self> {
        let mut config = ConnectionConfig::default();

        for pair in s.split_whitespace() {
            let (key, value) = pair.split_once('=').ok_or_else(|| {
                TrackerDbError::Config(format!("expected key=value, found '{pair}'")).logged()
            })?;

            match key {
                "db" => {
                    if value.is_empty() {
                        return Err(TrackerDbError::Config("db path is empty".into()).logged());
                    }
                    config.path = PathBuf::from(value);
                }
                "timeout" => {
                    let secs: u64 = value.parse().map_err(|_| {
                        TrackerDbError::Config(format!("timeout must be whole seconds, found '{value}'"))
                            .logged()
                    })?;
                    config.busy_timeout = Duration::from_secs(secs);
                }
                "shared_cache" => {
                    config.shared_cache = match value {
                        "true" | "1" | "on" => true,
                        "false" | "0" | "off" => false,
                        _ => {
                            return Err(TrackerDbError::Config(format!(
                                "shared_cache must be true or false, found '{value}'"
                            ))
                            .logged())
                        }
                    };
                }
                _ => {
                    return Err(TrackerDbError::Config(format!(
                        "unknown connection option '{key}'"
                    ))
                    .logged())
                }
            }
        }

        Ok(config)
    }
}
