// Row/Data model - the wire format between Storables and the storage engine

use crate::error::{Result, TrackerDbError};
use chrono::NaiveDateTime;
use rusqlite::types::ValueRef;
use serde::Serialize;
use std::fmt;

/// Text format used for `DateTime` cells, both as SQL literal and when parsing
/// DATETIME/TIMESTAMP columns back out of SQLite.
pub const DATETIME_FORMAT: &str = "%Y-%m-%d %H:%M:%S";

/// SQLite storage class of a column
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum DataType {
    Real,
    Integer,
    Text,
    Null,
    Blob,
}

impl DataType {
    /// Map a declared column type to a storage class. Mostly SQLite's affinity
    /// rules, except DATE/TIME declarations map to TEXT.
    pub fn from_declared(decl: &str) -> DataType {
        let decl = decl.to_ascii_uppercase();
        if decl.contains("INT") {
            DataType::Integer
        } else if decl.contains("CHAR") || decl.contains("CLOB") || decl.contains("TEXT") {
            DataType::Text
        } else if decl.contains("BLOB") {
            DataType::Blob
        } else if decl.contains("REAL") || decl.contains("FLOA") || decl.contains("DOUB") {
            DataType::Real
        } else if decl.contains("DATE") || decl.contains("TIME") {
            DataType::Text
        } else if decl.is_empty() {
            DataType::Null
        } else {
            DataType::Real
        }
    }
}

impl fmt::Display for DataType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            DataType::Real => "REAL",
            DataType::Integer => "INTEGER",
            DataType::Text => "TEXT",
            DataType::Null => "NULL",
            DataType::Blob => "BLOB",
        };
        f.write_str(s)
    }
}

/// Column constraint
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub enum Constraint {
    None,
    PrimaryKey,
    Unique,
    NotNull,
    /// CHECK with its boolean expression, e.g. `fat >= 0`
    Check(String),
}

impl fmt::Display for Constraint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Constraint::None => Ok(()),
            Constraint::PrimaryKey => f.write_str("PRIMARY KEY"),
            Constraint::Unique => f.write_str("UNIQUE"),
            Constraint::NotNull => f.write_str("NOT NULL"),
            Constraint::Check(expr) => write!(f, "CHECK ({expr})"),
        }
    }
}

/// Name, type and constraint of a single column
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ColumnProperties {
    pub name: String,
    pub data_type: DataType,
    pub constraint: Constraint,
}

impl ColumnProperties {
    pub fn new(name: impl Into<String>, data_type: DataType, constraint: Constraint) -> Self {
        ColumnProperties {
            name: name.into(),
            data_type,
            constraint,
        }
    }

    /// Render as a column definition: `name type constraint`
    pub fn definition(&self) -> String {
        match self.constraint {
            Constraint::None => format!("{} {}", self.name, self.data_type),
            _ => format!("{} {} {}", self.name, self.data_type, self.constraint),
        }
    }
}

/// Find the single PRIMARY KEY column of a schema.
pub fn primary_key<'a>(table: &str, schema: &'a [ColumnProperties]) -> Result<&'a ColumnProperties> {
    let mut keys = schema
        .iter()
        .filter(|c| c.constraint == Constraint::PrimaryKey);

    match (keys.next(), keys.next()) {
        (Some(pk), None) => Ok(pk),
        (None, _) => Err(TrackerDbError::InvalidSchema {
            table: table.to_string(),
            reason: "no PRIMARY KEY column".to_string(),
        }
        .logged()),
        (Some(_), Some(_)) => Err(TrackerDbError::InvalidSchema {
            table: table.to_string(),
            reason: "more than one PRIMARY KEY column".to_string(),
        }
        .logged()),
    }
}

/// A single value of a row
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum Cell {
    Real(f64),
    Integer(i32),
    BigInt(i64),
    UnsignedBigInt(u64),
    Text(String),
    DateTime(NaiveDateTime),
    Null,
}

impl Cell {
    /// The storage class this cell is written as
    pub fn data_type(&self) -> DataType {
        match self {
            Cell::Real(_) => DataType::Real,
            Cell::Integer(_) | Cell::BigInt(_) | Cell::UnsignedBigInt(_) => DataType::Integer,
            Cell::Text(_) | Cell::DateTime(_) => DataType::Text,
            Cell::Null => DataType::Null,
        }
    }

    /// Render the cell as a SQL literal.
    ///
    /// SQLite integers are signed 64-bit, so an `UnsignedBigInt` above
    /// `i64::MAX` is rejected rather than stored as a lossy REAL.
    pub fn to_sql_literal(&self) -> Result<String> {
        match self {
            Cell::Real(v) if !v.is_finite() => Err(TrackerDbError::UnrecognizedCell(format!(
                "non-finite real {v} has no SQL literal"
            ))
            .logged()),
            Cell::UnsignedBigInt(v) if i64::try_from(*v).is_err() => {
                Err(TrackerDbError::UnrecognizedCell(format!(
                    "unsigned integer {v} does not fit a SQLite INTEGER"
                ))
                .logged())
            }
            // Debug keeps the decimal point on whole numbers (10.0, not 10)
            Cell::Real(v) => Ok(format!("{v:?}")),
            Cell::Integer(v) => Ok(v.to_string()),
            Cell::BigInt(v) => Ok(v.to_string()),
            Cell::UnsignedBigInt(v) => Ok(v.to_string()),
            Cell::Text(s) => Ok(format!("'{}'", s.replace('\'', "''"))),
            Cell::DateTime(dt) => Ok(format!("'{}'", dt.format(DATETIME_FORMAT))),
            Cell::Null => Ok("NULL".to_string()),
        }
    }

    pub fn as_f64(&self) -> Option<f64> {
        match self {
            Cell::Real(v) => Some(*v),
            Cell::Integer(v) => Some(f64::from(*v)),
            Cell::BigInt(v) => Some(*v as f64),
            Cell::UnsignedBigInt(v) => Some(*v as f64),
            _ => None,
        }
    }

    pub fn as_i64(&self) -> Option<i64> {
        match self {
            Cell::Integer(v) => Some(i64::from(*v)),
            Cell::BigInt(v) => Some(*v),
            Cell::UnsignedBigInt(v) => i64::try_from(*v).ok(),
            _ => None,
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            Cell::Text(s) => Some(s),
            _ => None,
        }
    }

    pub fn as_datetime(&self) -> Option<NaiveDateTime> {
        match self {
            Cell::DateTime(dt) => Some(*dt),
            Cell::Text(s) => NaiveDateTime::parse_from_str(s, DATETIME_FORMAT).ok(),
            _ => None,
        }
    }

    pub fn is_null(&self) -> bool {
        matches!(self, Cell::Null)
    }

    /// Build a cell from a value read off a SQLite cursor. `declared` is the
    /// column's declared type, used to recover DATETIME values stored as text.
    pub fn from_value(value: ValueRef<'_>, declared: Option<&str>) -> Result<Cell> {
        match value {
            ValueRef::Null => Ok(Cell::Null),
            ValueRef::Integer(i) => Ok(Cell::BigInt(i)),
            ValueRef::Real(f) => Ok(Cell::Real(f)),
            ValueRef::Text(bytes) => {
                let text = std::str::from_utf8(bytes).map_err(|e| {
                    TrackerDbError::UnrecognizedCell(format!("text is not UTF-8: {e}")).logged()
                })?;
                if declared.is_some_and(is_datetime_decl) {
                    if let Ok(dt) = NaiveDateTime::parse_from_str(text, DATETIME_FORMAT) {
                        return Ok(Cell::DateTime(dt));
                    }
                }
                Ok(Cell::Text(text.to_string()))
            }
            ValueRef::Blob(b) => Err(TrackerDbError::UnrecognizedCell(format!(
                "blob of {} bytes",
                b.len()
            ))
            .logged()),
        }
    }
}

fn is_datetime_decl(decl: &str) -> bool {
    let decl = decl.to_ascii_uppercase();
    decl.contains("DATE") || decl.contains("TIME")
}

impl fmt::Display for Cell {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Cell::Real(v) => write!(f, "{v:?}"),
            Cell::Integer(v) => write!(f, "{v}"),
            Cell::BigInt(v) => write!(f, "{v}"),
            Cell::UnsignedBigInt(v) => write!(f, "{v}"),
            Cell::Text(s) => f.write_str(s),
            Cell::DateTime(dt) => write!(f, "{}", dt.format(DATETIME_FORMAT)),
            Cell::Null => Ok(()),
        }
    }
}

/// One record, positionally aligned with a schema
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
#[serde(transparent)]
pub struct Row(pub Vec<Cell>);

impl Row {
    pub fn new(cells: Vec<Cell>) -> Self {
        Row(cells)
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn cells(&self) -> &[Cell] {
        &self.0
    }

    /// Look up the cell for `column` using the schema's column order.
    pub fn cell<'a>(&'a self, schema: &[ColumnProperties], column: &str) -> Result<&'a Cell> {
        if schema.len() != self.len() {
            return Err(TrackerDbError::RowShape {
                expected: schema.len(),
                actual: self.len(),
            }
            .logged());
        }
        schema
            .iter()
            .position(|c| c.name == column)
            .map(|i| &self.0[i])
            .ok_or_else(|| TrackerDbError::MissingColumn(column.to_string()).logged())
    }
}

/// Formats the row the way the sqlite shell does: `1|taco|10.0`
impl fmt::Display for Row {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (i, cell) in self.0.iter().enumerate() {
            if i > 0 {
                f.write_str("|")?;
            }
            write!(f, "{cell}")?;
        }
        Ok(())
    }
}

/// A table name, its schema, and rows aligned with that schema
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Data {
    pub table_name: String,
    pub schema: Vec<ColumnProperties>,
    pub rows: Vec<Row>,
}

impl Data {
    /// A single-row insert payload
    pub fn single(table_name: impl Into<String>, schema: Vec<ColumnProperties>, row: Row) -> Self {
        Data {
            table_name: table_name.into(),
            schema,
            rows: vec![row],
        }
    }

    /// Check that every row has one cell per schema column.
    pub fn check_shape(&self) -> Result<()> {
        for row in &self.rows {
            if row.len() != self.schema.len() {
                return Err(TrackerDbError::RowShape {
                    expected: self.schema.len(),
                    actual: row.len(),
                }
                .logged());
            }
        }
        Ok(())
    }
}
