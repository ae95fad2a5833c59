//! The contract every persisted domain entity implements.

mod naming;

pub use naming::{type_to_string, validate_identifier};

use crate::data::{ColumnProperties, Data, Row};
use crate::error::Result;

/// A domain entity that maps to one row of its own table.
///
/// The table is named after the type (see [`type_to_string`]), so two
/// `Storable` types with the same bare name cannot share a [`Store`].
///
/// Instances are created through [`Store::make`], which assigns the id, and
/// rebuilt from the database with `Default` followed by [`Storable::set_data`].
///
/// [`Store`]: crate::store::Store
/// [`Store::make`]: crate::store::Store::make
pub trait Storable: Default + 'static {
    /// The unique id, also the value of the PRIMARY KEY column
    fn id(&self) -> i64;

    /// Assign the id. Only the storage engine should call this.
    fn set_id(&mut self, id: i64);

    fn name(&self) -> &str;

    fn set_name(&mut self, name: &str);

    /// Serialize into a single-row payload. The schema must contain exactly
    /// one PRIMARY KEY column holding `id()`.
    fn get_data(&self) -> Data;

    /// Populate from a row read out of the database. Columns are looked up
    /// by name, so the schema order need not match `get_data`.
    fn set_data(&mut self, schema: &[ColumnProperties], row: &Row) -> Result<()>;

    /// The object's row the way the sqlite shell prints it
    fn str(&self) -> String {
        self.get_data()
            .rows
            .iter()
            .map(Row::to_string)
            .collect::<Vec<_>>()
            .join("\n")
    }

    /// Name of the table backing this type
    fn table_name() -> String {
        type_to_string::<Self>()
    }
}
