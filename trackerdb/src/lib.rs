pub mod connection;
pub mod data;
pub mod error;
pub mod food;
pub mod sql;
pub mod storable;
pub mod store;

pub use connection::{ConnectionConfig, Database};
pub use data::{Cell, ColumnProperties, Constraint, Data, DataType, Row};
pub use error::{Result, TrackerDbError};
pub use food::{Food, Macronutrients};
pub use storable::Storable;
pub use store::{Handle, Store};
