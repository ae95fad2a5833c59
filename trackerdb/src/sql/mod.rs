//! SQL text for every statement the storage engine issues.
//!
//! Identifiers are validated before being spliced in, and values go through
//! [`Cell::to_sql_literal`].

use crate::data::{primary_key, Cell, ColumnProperties, Data};
use crate::error::{Result, TrackerDbError};
use crate::storable::validate_identifier;

/// Bookkeeping table recording the highest id ever handed out per table
pub const SEQUENCE_TABLE: &str = "storable_sequence";

/// SQLite matches table names without regard to case, and so does this.
pub fn table_exists(table: &str) -> Result<String> {
    Ok(format!(
        "SELECT name FROM sqlite_master WHERE type='table' AND name='{}' COLLATE NOCASE",
        validate_identifier(table)?
    ))
}

pub fn create_table(table: &str, schema: &[ColumnProperties]) -> Result<String> {
    validate_identifier(table)?;
    if schema.is_empty() {
        return Err(TrackerDbError::InvalidSchema {
            table: table.to_string(),
            reason: "no columns".to_string(),
        }
        .logged());
    }
    primary_key(table, schema)?;

    let columns = schema
        .iter()
        .map(|c| validate_identifier(&c.name).map(|_| c.definition()))
        .collect::<Result<Vec<_>>>()?;

    Ok(format!(
        "CREATE TABLE IF NOT EXISTS {table} ({})",
        columns.join(", ")
    ))
}

pub fn drop_table(table: &str) -> Result<String> {
    Ok(format!("DROP TABLE {}", validate_identifier(table)?))
}

pub fn count_rows(table: &str) -> Result<String> {
    Ok(format!("SELECT count(*) FROM {}", validate_identifier(table)?))
}

pub fn select_all(table: &str) -> Result<String> {
    Ok(format!("SELECT * FROM {}", validate_identifier(table)?))
}

pub fn select_by_id(table: &str, pk: &str, id: i64) -> Result<String> {
    Ok(format!(
        "SELECT * FROM {} WHERE {}={id}",
        validate_identifier(table)?,
        validate_identifier(pk)?
    ))
}

pub fn max_id(table: &str, pk: &str) -> Result<String> {
    Ok(format!(
        "SELECT COALESCE(MAX({}), 0) FROM {}",
        validate_identifier(pk)?,
        validate_identifier(table)?
    ))
}

pub fn table_info(table: &str) -> Result<String> {
    Ok(format!("PRAGMA table_info({})", validate_identifier(table)?))
}

/// `INSERT INTO t(cols) VALUES (literals)`, one statement per row of `data`
pub fn insert(data: &Data) -> Result<Vec<String>> {
    validate_identifier(&data.table_name)?;
    data.check_shape()?;

    let columns = data
        .schema
        .iter()
        .map(|c| validate_identifier(&c.name))
        .collect::<Result<Vec<_>>>()?
        .join(", ");

    data.rows
        .iter()
        .map(|row| {
            let values = row
                .cells()
                .iter()
                .map(Cell::to_sql_literal)
                .collect::<Result<Vec<_>>>()?
                .join(", ");
            Ok(format!(
                "INSERT INTO {}({columns}) VALUES ({values})",
                data.table_name
            ))
        })
        .collect()
}

/// `UPDATE t SET col=val,... WHERE pk=id` for the first row of `data`. The
/// primary key column itself is not rewritten.
pub fn update(data: &Data) -> Result<String> {
    let table = validate_identifier(&data.table_name)?;
    data.check_shape()?;
    let pk = primary_key(table, &data.schema)?;
    let row = data.rows.first().ok_or_else(|| {
        TrackerDbError::RowShape {
            expected: data.schema.len(),
            actual: 0,
        }
        .logged()
    })?;

    let mut assignments = Vec::new();
    let mut id = None;
    for (column, cell) in data.schema.iter().zip(row.cells()) {
        validate_identifier(&column.name)?;
        if column.name == pk.name {
            id = cell.as_i64();
            continue;
        }
        assignments.push(format!("{}={}", column.name, cell.to_sql_literal()?));
    }

    let Some(id) = id else {
        return Err(TrackerDbError::ColumnType {
            column: pk.name.clone(),
            expected: "integer id".to_string(),
            found: format!("{:?}", row.cell(&data.schema, &pk.name)?),
        }
        .logged());
    };

    if assignments.is_empty() {
        return Err(TrackerDbError::InvalidSchema {
            table: table.to_string(),
            reason: "no columns besides the primary key".to_string(),
        }
        .logged());
    }

    Ok(format!(
        "UPDATE {table} SET {} WHERE {}={id}",
        assignments.join(","),
        pk.name
    ))
}

pub fn delete(table: &str, pk: &str, id: i64) -> Result<String> {
    Ok(format!(
        "DELETE FROM {} WHERE {}={id}",
        validate_identifier(table)?,
        validate_identifier(pk)?
    ))
}

pub fn create_sequence_table() -> String {
    format!(
        "CREATE TABLE IF NOT EXISTS {SEQUENCE_TABLE} (table_name TEXT PRIMARY KEY, last_id INTEGER NOT NULL)"
    )
}

/// Sequence rows are keyed by the lowercased table name, matching how
/// SQLite resolves the table itself.
pub fn select_sequence(table: &str) -> Result<String> {
    Ok(format!(
        "SELECT last_id FROM {SEQUENCE_TABLE} WHERE table_name='{}'",
        validate_identifier(table)?.to_ascii_lowercase()
    ))
}

pub fn record_sequence(table: &str, last_id: i64) -> Result<String> {
    Ok(format!(
        "INSERT OR REPLACE INTO {SEQUENCE_TABLE} (table_name, last_id) VALUES ('{}', {last_id})",
        validate_identifier(table)?.to_ascii_lowercase()
    ))
}
