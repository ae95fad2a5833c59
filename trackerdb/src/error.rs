use thiserror::Error;

#[derive(Error, Debug)]
pub enum TrackerDbError {
    #[error("Connection error: {0}")]
    Connection(String),

    #[error("Config error: {0}")]
    Config(String),

    #[error("Schema query failed for table {table}: {source}")]
    SchemaQuery {
        table: String,
        #[source]
        source: rusqlite::Error,
    },

    #[error("DDL failed: {sql}: {source}")]
    Ddl {
        sql: String,
        #[source]
        source: rusqlite::Error,
    },

    #[error("Count failed for table {table}: {source}")]
    Count {
        table: String,
        #[source]
        source: rusqlite::Error,
    },

    #[error("Insert failed: {sql}: {source}")]
    Insert {
        sql: String,
        #[source]
        source: rusqlite::Error,
    },

    #[error("Update failed: {sql}: {source}")]
    Update {
        sql: String,
        #[source]
        source: rusqlite::Error,
    },

    #[error("Delete failed: {sql}: {source}")]
    Delete {
        sql: String,
        #[source]
        source: rusqlite::Error,
    },

    #[error("Retrieve failed for table {table}: {source}")]
    Retrieve {
        table: String,
        #[source]
        source: rusqlite::Error,
    },

    #[error("No row with {column} = {id} in table {table}")]
    IdentityConstraintViolation {
        table: String,
        column: String,
        id: i64,
    },

    #[error("Unrecognized cell: {0}")]
    UnrecognizedCell(String),

    #[error("Invalid schema for table {table}: {reason}")]
    InvalidSchema { table: String, reason: String },

    #[error("Row has {actual} cells but schema has {expected} columns")]
    RowShape { expected: usize, actual: usize },

    #[error("Column not found: {0}")]
    MissingColumn(String),

    #[error("Column {column} expected {expected}, found {found}")]
    ColumnType {
        column: String,
        expected: String,
        found: String,
    },

    #[error("Invalid identifier: {0:?}")]
    InvalidIdentifier(String),

    #[error("Table name {table} is claimed by both {existing} and {requested}")]
    TableNameCollision {
        table: String,
        existing: String,
        requested: String,
    },

    #[error("SQLite error: {0}")]
    Sqlite(#[from] rusqlite::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl TrackerDbError {
    /// Write the error to the log and hand it back. Failures raised by a SQL
    /// call log their statement where they happen; everything else goes
    /// through here.
    pub(crate) fn logged(self) -> Self {
        log::error!("{self}");
        self
    }
}

pub type Result<T> = std::result::Result<T, TrackerDbError>;
