// Food - macronutrient record for a single food

use crate::data::{Cell, ColumnProperties, Constraint, Data, DataType, Row};
use crate::error::{Result, TrackerDbError};
use crate::storable::Storable;
use serde::Serialize;

/// Macronutrient content in grams
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize)]
pub struct Macronutrients {
    pub fat: f64,
    pub carbohydrate: f64,
    /// Portion of `carbohydrate` that is fiber
    pub fiber: f64,
    pub protein: f64,
}

impl Macronutrients {
    pub fn new(fat: f64, carbohydrate: f64, fiber: f64, protein: f64) -> Self {
        Macronutrients {
            fat,
            carbohydrate,
            fiber,
            protein,
        }
    }

    pub fn set_fat(&mut self, fat: f64) {
        self.fat = fat;
    }

    pub fn set_carbohydrate(&mut self, carbohydrate: f64) {
        self.carbohydrate = carbohydrate;
    }

    pub fn set_fiber(&mut self, fiber: f64) {
        self.fiber = fiber;
    }

    pub fn set_protein(&mut self, protein: f64) {
        self.protein = protein;
    }

    /// Energy in kcal using the 9/4/4 Atwater factors
    pub fn calories(&self) -> f64 {
        9.0 * self.fat + 4.0 * self.carbohydrate + 4.0 * self.protein
    }
}

/// A food and its macronutrients
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct Food {
    id: i64,
    name: String,
    macronutrients: Macronutrients,
}

impl Food {
    pub fn new(name: impl Into<String>, macronutrients: Macronutrients) -> Self {
        Food {
            id: 0,
            name: name.into(),
            macronutrients,
        }
    }

    pub fn macronutrients(&self) -> Macronutrients {
        self.macronutrients
    }

    pub fn set_macronutrients(&mut self, macronutrients: Macronutrients) {
        self.macronutrients = macronutrients;
    }

    /// The table layout for `Food`
    pub fn schema() -> Vec<ColumnProperties> {
        vec![
            ColumnProperties::new("id", DataType::Integer, Constraint::PrimaryKey),
            ColumnProperties::new("name", DataType::Text, Constraint::NotNull),
            ColumnProperties::new("fat", DataType::Real, Constraint::None),
            ColumnProperties::new("carbohydrate", DataType::Real, Constraint::None),
            ColumnProperties::new("fiber", DataType::Real, Constraint::None),
            ColumnProperties::new("protein", DataType::Real, Constraint::None),
        ]
    }
}

impl Storable for Food {
    fn id(&self) -> i64 {
        self.id
    }

    fn set_id(&mut self, id: i64) {
        self.id = id;
    }

    fn name(&self) -> &str {
        &self.name
    }

    fn set_name(&mut self, name: &str) {
        self.name = name.to_string();
    }

    fn get_data(&self) -> Data {
        let m = &self.macronutrients;
        Data::single(
            Self::table_name(),
            Self::schema(),
            Row::new(vec![
                Cell::BigInt(self.id),
                Cell::Text(self.name.clone()),
                Cell::Real(m.fat),
                Cell::Real(m.carbohydrate),
                Cell::Real(m.fiber),
                Cell::Real(m.protein),
            ]),
        )
    }

    fn set_data(&mut self, schema: &[ColumnProperties], row: &Row) -> Result<()> {
        let id = row.cell(schema, "id")?;
        self.id = id.as_i64().ok_or_else(|| type_error("id", "integer", id))?;

        let name = row.cell(schema, "name")?;
        self.name = name
            .as_str()
            .ok_or_else(|| type_error("name", "text", name))?
            .to_string();

        self.macronutrients = Macronutrients {
            fat: real(schema, row, "fat")?,
            carbohydrate: real(schema, row, "carbohydrate")?,
            fiber: real(schema, row, "fiber")?,
            protein: real(schema, row, "protein")?,
        };
        Ok(())
    }
}

/// NULL reads as zero grams
fn real(schema: &[ColumnProperties], row: &Row, column: &str) -> Result<f64> {
    let cell = row.cell(schema, column)?;
    if cell.is_null() {
        return Ok(0.0);
    }
    cell.as_f64().ok_or_else(|| type_error(column, "number", cell))
}

fn type_error(column: &str, expected: &str, found: &Cell) -> TrackerDbError {
    TrackerDbError::ColumnType {
        column: column.to_string(),
        expected: expected.to_string(),
        found: format!("{found:?}"),
    }
    .logged()
}
