// Connection manager - one live SQLite connection for the whole process

mod config;

pub use config::{ConnectionConfig, CONNECTION_ENV};

use crate::error::{Result, TrackerDbError};
use once_cell::sync::OnceCell;
use rusqlite::{Connection, OpenFlags};
use std::collections::HashMap;
use std::sync::{Mutex, MutexGuard};

static INSTANCE: OnceCell<Database> = OnceCell::new();

/// A single SQLite connection. SQLite with a shared cache misbehaves under
/// repeated open/close cycles, so the process keeps one of these open for
/// its whole lifetime (see [`Database::get_connection`]). Every statement
/// runs under the inner lock.
///
/// The database also records which Storable type owns each table, so two
/// types never share one table no matter which `Store` they go through.
pub struct Database {
    conn: Mutex<Connection>,
    config: Option<ConnectionConfig>,
    /// lowercased table name -> fully qualified type name that claimed it
    tables: Mutex<HashMap<String, &'static str>>,
}

impl Database {
    /// Open (or create) the database file described by `config`.
    pub fn open(config: ConnectionConfig) -> Result<Self> {
        if let Some(parent) = config.path.parent() {
            if !parent.as_os_str().is_empty() && !parent.exists() {
                std::fs::create_dir_all(parent)
                    .map_err(|e| TrackerDbError::Io(e).logged())?;
            }
        }

        let mut flags = OpenFlags::default();
        if config.shared_cache {
            flags |= OpenFlags::SQLITE_OPEN_SHARED_CACHE;
        }

        let conn = Connection::open_with_flags(&config.path, flags).map_err(|e| {
            log::error!("Failed to open {}: {e}", config.path.display());
            TrackerDbError::Connection(format!("{}: {e}", config.path.display()))
        })?;
        conn.busy_timeout(config.busy_timeout)
            .map_err(|e| TrackerDbError::Connection(format!("busy_timeout: {e}")).logged())?;

        log::info!("Opened database {}", config.connection_string());
        Ok(Database::with_connection(conn, Some(config)))
    }

    /// Open a private in-memory database (for testing).
    pub fn open_in_memory() -> Result<Self> {
        let conn = Connection::open_in_memory()
            .map_err(|e| TrackerDbError::Connection(format!(":memory:: {e}")).logged())?;
        Ok(Database::with_connection(conn, None))
    }

    fn with_connection(conn: Connection, config: Option<ConnectionConfig>) -> Self {
        Database {
            conn: Mutex::new(conn),
            config,
            tables: Mutex::new(HashMap::new()),
        }
    }

    /// Initialize the process-wide connection. Only the first call opens
    /// anything; later calls hand back the existing connection.
    pub fn init(config: ConnectionConfig) -> Result<&'static Database> {
        let db = INSTANCE.get_or_try_init(|| Database::open(config.clone()))?;
        if db.config.as_ref() != Some(&config) {
            log::warn!(
                "Database already initialized; ignoring connection '{}'",
                config.connection_string()
            );
        }
        Ok(db)
    }

    /// The process-wide connection, opened on first use with
    /// [`ConnectionConfig::from_env`].
    pub fn get_connection() -> Result<&'static Database> {
        INSTANCE.get_or_try_init(|| Database::open(ConnectionConfig::from_env()?))
    }

    /// The config this connection was opened with, `None` when in memory
    pub fn config(&self) -> Option<&ConnectionConfig> {
        self.config.as_ref()
    }

    /// Lock the connection for the duration of one storage operation.
    pub(crate) fn lock(&self) -> Result<MutexGuard<'_, Connection>> {
        self.conn
            .lock()
            .map_err(|_| TrackerDbError::Connection("connection lock poisoned".into()).logged())
    }

    /// Claim `table` for the type named `requested`. The first type to ask
    /// owns the table for the life of the connection; another type asking
    /// for the same name, in any letter case, is a `TableNameCollision`.
    pub(crate) fn claim_table(&self, table: &str, requested: &'static str) -> Result<()> {
        let mut tables = self
            .tables
            .lock()
            .map_err(|_| TrackerDbError::Connection("table registry lock poisoned".into()).logged())?;

        let owner = *tables
            .entry(table.to_ascii_lowercase())
            .or_insert(requested);
        if owner != requested {
            return Err(TrackerDbError::TableNameCollision {
                table: table.to_string(),
                existing: owner.to_string(),
                requested: requested.to_string(),
            }
            .logged());
        }
        Ok(())
    }
}
