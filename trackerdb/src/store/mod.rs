mod cache;

pub use cache::Handle;

use crate::connection::Database;
use crate::data::{primary_key, Cell, ColumnProperties, Constraint, Data, DataType, Row};
use crate::error::{Result, TrackerDbError};
use crate::sql::{self, SEQUENCE_TABLE};
use crate::storable::{validate_identifier, Storable};
use cache::Caches;
use rusqlite::{Connection, OptionalExtension};
use std::collections::BTreeSet;

/// The storage engine. Maps [`Storable`] types to tables on a [`Database`]
/// and owns the in-memory cache of live objects.
///
/// Objects are created with [`Store::make`] and addressed through
/// [`Handle`]s. Mutate them with [`Store::get_mut`] or [`Store::edit`];
/// changes reach the database on the next [`Store::update`].
pub struct Store<'db> {
    db: &'db Database,
    caches: Caches,
}

impl<'db> Store<'db> {
    pub fn new(db: &'db Database) -> Self {
        Store {
            db,
            caches: Caches::default(),
        }
    }

    /// A store over the process-wide connection.
    pub fn global() -> Result<Store<'static>> {
        Ok(Store::new(Database::get_connection()?))
    }

    pub fn database(&self) -> &'db Database {
        self.db
    }

    /// Resolve the table for `T`, rejecting a second type that would map to
    /// the same table on this database.
    fn table<T: Storable>(&self) -> Result<String> {
        let table = T::table_name();
        validate_identifier(&table)?;
        let requested = std::any::type_name::<T>();

        if table.eq_ignore_ascii_case(SEQUENCE_TABLE) {
            return Err(TrackerDbError::TableNameCollision {
                table,
                existing: "the id sequence".to_string(),
                requested: requested.to_string(),
            }
            .logged());
        }

        self.db.claim_table(&table, requested)?;
        Ok(table)
    }

    // ── Schema Operations ────────────────────────────────────────────

    /// Whether `T`'s table exists.
    pub fn table_exists<T: Storable>(&self) -> Result<bool> {
        let table = self.table::<T>()?;
        let conn = self.db.lock()?;
        table_exists_on(&conn, &table)
    }

    /// Create `T`'s table unless it already exists.
    pub fn create_table<T: Storable>(&self, schema: &[ColumnProperties]) -> Result<()> {
        let table = self.table::<T>()?;
        let conn = self.db.lock()?;
        create_table_on(&conn, &table, schema)
    }

    /// Drop `T`'s table. A missing table is not an error.
    pub fn drop_table<T: Storable>(&self) -> Result<()> {
        let table = self.table::<T>()?;
        let conn = self.db.lock()?;
        if !table_exists_on(&conn, &table)? {
            log::debug!("Table {table} does not exist, nothing to drop");
            return Ok(());
        }

        let sql = sql::drop_table(&table)?;
        log::debug!("{sql}");
        conn.execute_batch(&sql).map_err(|e| ddl_error(sql, e))?;
        log::info!("Dropped table {table}");
        Ok(())
    }

    /// Number of rows in `T`'s table, 0 if the table does not exist.
    pub fn count_rows<T: Storable>(&self) -> Result<usize> {
        let table = self.table::<T>()?;
        let conn = self.db.lock()?;
        if !table_exists_on(&conn, &table)? {
            return Ok(0);
        }

        let sql = sql::count_rows(&table)?;
        log::debug!("{sql}");
        let count: i64 = conn.query_row(&sql, [], |row| row.get(0)).map_err(|e| {
            log::error!("{sql}: {e}");
            TrackerDbError::Count {
                table: table.clone(),
                source: e,
            }
        })?;
        Ok(usize::try_from(count).unwrap_or_default())
    }

    /// The schema of `T`'s table as SQLite reports it, empty if the table
    /// does not exist.
    pub fn table_schema<T: Storable>(&self) -> Result<Vec<ColumnProperties>> {
        let table = self.table::<T>()?;
        let conn = self.db.lock()?;
        if !table_exists_on(&conn, &table)? {
            return Ok(Vec::new());
        }
        table_schema_on(&conn, &table)
    }

    // ── Identity ─────────────────────────────────────────────────────

    /// Allocate an id no row of `T` has ever had.
    ///
    /// Ids only grow: the highest id handed out per table is recorded in
    /// the sequence table, so deleting rows (or dropping the table) never
    /// makes an id available again.
    pub fn get_new_id<T: Storable>(&self) -> Result<i64> {
        let table = self.table::<T>()?;
        let conn = self.db.lock()?;
        next_id_on(&conn, &table)
    }

    // ── CRUD ─────────────────────────────────────────────────────────

    /// Write `storable` as a new row, creating the table if needed.
    pub fn insert<T: Storable>(&self, storable: &T) -> Result<()> {
        let table = self.table::<T>()?;
        let data = payload(&table, storable)?;
        let conn = self.db.lock()?;
        insert_on(&conn, &table, &data)
    }

    /// Write the current state of `storable` over its existing row.
    ///
    /// Fails with [`TrackerDbError::IdentityConstraintViolation`] if no row
    /// has its id.
    pub fn update<T: Storable>(&self, storable: &T) -> Result<()> {
        let table = self.table::<T>()?;
        let data = payload(&table, storable)?;
        let pk = primary_key(&table, &data.schema)?.name.clone();
        let missing = || TrackerDbError::IdentityConstraintViolation {
            table: table.clone(),
            column: pk.clone(),
            id: storable.id(),
        };

        let conn = self.db.lock()?;
        if !table_exists_on(&conn, &table)? {
            log::error!("Update of {table} id {} before the table exists", storable.id());
            return Err(missing());
        }

        let sql = sql::update(&data)?;
        log::debug!("{sql}");
        let changed = conn.execute(&sql, []).map_err(|e| {
            log::error!("{sql}: {e}");
            TrackerDbError::Update {
                sql: sql.clone(),
                source: e,
            }
        })?;

        if changed == 0 {
            log::error!("Update of {table} matched no row: {sql}");
            return Err(missing());
        }
        Ok(())
    }

    /// Remove the object from the database and from the cache.
    pub fn delete_storable<T: Storable>(&mut self, handle: Handle<T>) -> Result<()> {
        let table = self.table::<T>()?;
        {
            let conn = self.db.lock()?;
            if table_exists_on(&conn, &table)? {
                let schema = table_schema_on(&conn, &table)?;
                let pk = primary_key(&table, &schema)?;
                let sql = sql::delete(&table, &pk.name, handle.id())?;
                log::debug!("{sql}");
                let removed = conn.execute(&sql, []).map_err(|e| {
                    log::error!("{sql}: {e}");
                    TrackerDbError::Delete {
                        sql: sql.clone(),
                        source: e,
                    }
                })?;
                if removed == 0 {
                    log::warn!("No row of {table} with id {} to delete", handle.id());
                }
            }
        }

        self.caches.get_mut::<T>().remove(handle.id());
        Ok(())
    }

    /// Give `value` a fresh id, insert it, and move it into the cache.
    /// The only way new objects should be created.
    pub fn make<T: Storable>(&mut self, mut value: T) -> Result<Handle<T>> {
        let table = self.table::<T>()?;
        {
            let conn = self.db.lock()?;
            let id = next_id_on(&conn, &table)?;
            value.set_id(id);
            let data = payload(&table, &value)?;
            insert_on(&conn, &table, &data)?;
        }

        log::debug!("Made {table} id {}", value.id());
        Ok(self.caches.get_mut::<T>().insert(value))
    }

    /// Load every row of `T`'s table and bring the cache in line with it.
    ///
    /// Rows not yet cached are built with `Default` + [`Storable::set_data`].
    /// Objects already cached are kept as they are, unsaved edits included.
    /// Cached objects whose row is gone are evicted. An absent table yields
    /// no handles.
    pub fn retrieve_all<T: Storable>(&mut self) -> Result<Vec<Handle<T>>> {
        let table = self.table::<T>()?;
        let loaded: Vec<T> = {
            let conn = self.db.lock()?;
            if table_exists_on(&conn, &table)? {
                select_on(&conn, &table, &sql::select_all(&table)?)?
            } else {
                Vec::new()
            }
        };

        let ids: BTreeSet<i64> = loaded.iter().map(Storable::id).collect();
        let cache = self.caches.get_mut::<T>();
        cache.retain(|id| ids.contains(&id));
        for object in loaded {
            if !cache.contains(object.id()) {
                cache.insert(object);
            }
        }

        Ok(ids.into_iter().map(Handle::new).collect())
    }

    /// Look an object up by id, from the cache if it is live there or else
    /// from the database.
    pub fn find<T: Storable>(&mut self, id: i64) -> Result<Option<Handle<T>>> {
        if self.caches.get::<T>().is_some_and(|c| c.contains(id)) {
            return Ok(Some(Handle::new(id)));
        }

        let table = self.table::<T>()?;
        let found: Option<T> = {
            let conn = self.db.lock()?;
            if !table_exists_on(&conn, &table)? {
                return Ok(None);
            }
            let schema = table_schema_on(&conn, &table)?;
            let pk = primary_key(&table, &schema)?;
            select_on(&conn, &table, &sql::select_by_id(&table, &pk.name, id)?)?
                .into_iter()
                .next()
        };

        Ok(found.map(|object| self.caches.get_mut::<T>().insert(object)))
    }

    /// Apply `f` to the cached object and write the result straight back,
    /// the round-trip a UI property setter performs. If the write fails the
    /// cache keeps the edited value.
    pub fn edit<T: Storable>(&mut self, handle: Handle<T>, f: impl FnOnce(&mut T)) -> Result<()> {
        let object = self.get_mut(handle).ok_or_else(|| not_cached::<T>(handle))?;
        f(object);
        let object = self.get(handle).ok_or_else(|| not_cached::<T>(handle))?;
        self.update(object)
    }

    // ── Cache ────────────────────────────────────────────────────────

    pub fn get<T: Storable>(&self, handle: Handle<T>) -> Option<&T> {
        self.caches.get::<T>()?.get(handle.id())
    }

    pub fn get_mut<T: Storable>(&mut self, handle: Handle<T>) -> Option<&mut T> {
        self.caches.get_mut::<T>().get_mut(handle.id())
    }

    /// Live objects of `T`, in id order
    pub fn cached<T: Storable>(&self) -> impl Iterator<Item = &T> {
        self.caches.get::<T>().into_iter().flat_map(|c| c.iter())
    }

    pub fn cached_count<T: Storable>(&self) -> usize {
        self.caches.get::<T>().map_or(0, |c| c.len())
    }
}

fn not_cached<T: Storable>(handle: Handle<T>) -> TrackerDbError {
    TrackerDbError::IdentityConstraintViolation {
        table: T::table_name(),
        column: "id".to_string(),
        id: handle.id(),
    }
    .logged()
}

/// `storable.get_data()`, checked against the table it is being written to
fn payload<T: Storable>(table: &str, storable: &T) -> Result<Data> {
    let data = storable.get_data();
    if data.table_name != table {
        return Err(TrackerDbError::InvalidSchema {
            table: table.to_string(),
            reason: format!("payload names table {}", data.table_name),
        }
        .logged());
    }
    data.check_shape()?;
    Ok(data)
}

fn ddl_error(sql: String, source: rusqlite::Error) -> TrackerDbError {
    log::error!("{sql}: {source}");
    TrackerDbError::Ddl { sql, source }
}

fn schema_query_error(table: &str, sql: &str, source: rusqlite::Error) -> TrackerDbError {
    log::error!("{sql}: {source}");
    TrackerDbError::SchemaQuery {
        table: table.to_string(),
        source,
    }
}

fn retrieve_error(table: &str, sql: &str, source: rusqlite::Error) -> TrackerDbError {
    log::error!("{sql}: {source}");
    TrackerDbError::Retrieve {
        table: table.to_string(),
        source,
    }
}

// The helpers below run with the connection lock already held.

fn table_exists_on(conn: &Connection, table: &str) -> Result<bool> {
    let sql = sql::table_exists(table)?;
    log::debug!("{sql}");
    conn.prepare(&sql)
        .and_then(|mut stmt| stmt.exists([]))
        .map_err(|e| schema_query_error(table, &sql, e))
}

fn create_table_on(conn: &Connection, table: &str, schema: &[ColumnProperties]) -> Result<()> {
    if table_exists_on(conn, table)? {
        return Ok(());
    }

    let sql = sql::create_table(table, schema)?;
    log::debug!("{sql}");
    conn.execute_batch(&sql).map_err(|e| ddl_error(sql, e))?;
    log::info!("Created table {table}");
    Ok(())
}

/// Column layout from `PRAGMA table_info`, with the PRIMARY KEY and NOT NULL
/// columns marked.
fn table_schema_on(conn: &Connection, table: &str) -> Result<Vec<ColumnProperties>> {
    let sql = sql::table_info(table)?;
    log::debug!("{sql}");
    let mut stmt = conn
        .prepare(&sql)
        .map_err(|e| schema_query_error(table, &sql, e))?;
    let columns = stmt
        .query_map([], |row| {
            let name: String = row.get("name")?;
            let decl: String = row.get("type")?;
            let not_null: bool = row.get("notnull")?;
            let pk: i64 = row.get("pk")?;
            let constraint = if pk > 0 {
                Constraint::PrimaryKey
            } else if not_null {
                Constraint::NotNull
            } else {
                Constraint::None
            };
            Ok(ColumnProperties::new(name, DataType::from_declared(&decl), constraint))
        })
        .and_then(|rows| rows.collect::<rusqlite::Result<Vec<_>>>())
        .map_err(|e| schema_query_error(table, &sql, e))?;
    Ok(columns)
}

fn next_id_on(conn: &Connection, table: &str) -> Result<i64> {
    let create = sql::create_sequence_table();
    log::debug!("{create}");
    conn.execute_batch(&create).map_err(|e| ddl_error(create, e))?;

    let select = sql::select_sequence(table)?;
    log::debug!("{select}");
    let last: i64 = conn
        .query_row(&select, [], |row| row.get(0))
        .optional()
        .map_err(|e| schema_query_error(table, &select, e))?
        .unwrap_or(0);

    let max = if table_exists_on(conn, table)? {
        let schema = table_schema_on(conn, table)?;
        let pk = primary_key(table, &schema)?;
        let sql = sql::max_id(table, &pk.name)?;
        log::debug!("{sql}");
        conn.query_row(&sql, [], |row| row.get::<_, i64>(0))
            .map_err(|e| schema_query_error(table, &sql, e))?
    } else {
        0
    };

    let next = last.max(max) + 1;
    let record = sql::record_sequence(table, next)?;
    log::debug!("{record}");
    conn.execute(&record, []).map_err(|e| {
        log::error!("{record}: {e}");
        TrackerDbError::Insert {
            sql: record.clone(),
            source: e,
        }
    })?;
    Ok(next)
}

fn insert_on(conn: &Connection, table: &str, data: &Data) -> Result<()> {
    create_table_on(conn, table, &data.schema)?;

    for sql in sql::insert(data)? {
        log::debug!("{sql}");
        conn.execute(&sql, []).map_err(|e| {
            log::error!("{sql}: {e}");
            TrackerDbError::Insert {
                sql: sql.clone(),
                source: e,
            }
        })?;
    }
    Ok(())
}

/// Run a `SELECT *` style query and build one `T` per result row. The
/// schema handed to `set_data` comes from the cursor's column names and
/// declared types, with the table's PRIMARY KEY marked.
fn select_on<T: Storable>(conn: &Connection, table: &str, sql: &str) -> Result<Vec<T>> {
    log::debug!("{sql}");
    let key = table_schema_on(conn, table)?
        .into_iter()
        .find(|c| c.constraint == Constraint::PrimaryKey)
        .map(|c| c.name);

    let mut stmt = conn
        .prepare(sql)
        .map_err(|e| retrieve_error(table, sql, e))?;

    let declared: Vec<Option<String>> = stmt
        .columns()
        .iter()
        .map(|c| c.decl_type().map(str::to_string))
        .collect();
    let schema: Vec<ColumnProperties> = stmt
        .column_names()
        .into_iter()
        .zip(&declared)
        .map(|(name, decl)| {
            let data_type = decl.as_deref().map_or(DataType::Null, DataType::from_declared);
            let constraint = if key.as_deref() == Some(name) {
                Constraint::PrimaryKey
            } else {
                Constraint::None
            };
            ColumnProperties::new(name, data_type, constraint)
        })
        .collect();

    let mut rows = stmt.query([]).map_err(|e| retrieve_error(table, sql, e))?;
    let mut objects = Vec::new();
    while let Some(row) = rows.next().map_err(|e| retrieve_error(table, sql, e))? {
        let cells = declared
            .iter()
            .enumerate()
            .map(|(i, decl)| {
                let value = row.get_ref(i).map_err(|e| retrieve_error(table, sql, e))?;
                Cell::from_value(value, decl.as_deref())
            })
            .collect::<Result<Vec<_>>>()?;

        let mut object = T::default();
        object.set_data(&schema, &Row::new(cells))?;
        objects.push(object);
    }
    Ok(objects)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::food::{Food, Macronutrients};
    use chrono::{NaiveDate, NaiveDateTime};
    use pretty_assertions::assert_eq;

    fn taco() -> Food {
        Food::new("taco", Macronutrients::new(10.0, 20.0, 2.0, 15.0))
    }

    fn burrito() -> Food {
        Food::new("burrito", Macronutrients::new(18.0, 70.0, 9.0, 25.0))
    }

    /// A second Storable, with a timestamp column
    #[derive(Debug, Clone, PartialEq)]
    struct WeighIn {
        id: i64,
        name: String,
        kilograms: f64,
        taken_at: NaiveDateTime,
    }

    impl Default for WeighIn {
        fn default() -> Self {
            WeighIn {
                id: 0,
                name: String::new(),
                kilograms: 0.0,
                taken_at: NaiveDate::from_ymd_opt(1970, 1, 1)
                    .unwrap()
                    .and_hms_opt(0, 0, 0)
                    .unwrap(),
            }
        }
    }

    impl Storable for WeighIn {
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
            Data::single(
                Self::table_name(),
                vec![
                    ColumnProperties::new("id", DataType::Integer, Constraint::PrimaryKey),
                    ColumnProperties::new("name", DataType::Text, Constraint::None),
                    ColumnProperties::new(
                        "kilograms",
                        DataType::Real,
                        Constraint::Check("kilograms > 0".into()),
                    ),
                    ColumnProperties::new("taken_at", DataType::Text, Constraint::NotNull),
                ],
                Row::new(vec![
                    Cell::BigInt(self.id),
                    Cell::Text(self.name.clone()),
                    Cell::Real(self.kilograms),
                    Cell::DateTime(self.taken_at),
                ]),
            )
        }

        fn set_data(&mut self, schema: &[ColumnProperties], row: &Row) -> Result<()> {
            self.id = row.cell(schema, "id")?.as_i64().unwrap_or_default();
            self.name = row.cell(schema, "name")?.as_str().unwrap_or_default().to_string();
            self.kilograms = row.cell(schema, "kilograms")?.as_f64().unwrap_or_default();
            self.taken_at = row
                .cell(schema, "taken_at")?
                .as_datetime()
                .ok_or_else(|| TrackerDbError::MissingColumn("taken_at".into()))?;
            Ok(())
        }
    }

    /// A Storable with just an id and a name, for table-naming tests
    macro_rules! named_storable {
        ($name:ident) => {
            #[allow(non_camel_case_types)]
            #[derive(Debug, Default)]
            pub struct $name {
                pub id: i64,
                pub name: String,
            }

            impl Storable for $name {
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
                    Data::single(
                        Self::table_name(),
                        vec![
                            ColumnProperties::new("id", DataType::Integer, Constraint::PrimaryKey),
                            ColumnProperties::new("label", DataType::Text, Constraint::None),
                        ],
                        Row::new(vec![Cell::BigInt(self.id), Cell::Text(self.name.clone())]),
                    )
                }

                fn set_data(&mut self, schema: &[ColumnProperties], row: &Row) -> Result<()> {
                    self.id = row.cell(schema, "id")?.as_i64().unwrap_or_default();
                    self.name = row.cell(schema, "label")?.as_str().unwrap_or_default().to_string();
                    Ok(())
                }
            }
        };
    }

    mod legacy {
        use super::*;

        // Same bare name as `crate::food::Food`
        named_storable!(Food);
    }

    mod shouting {
        use super::*;

        named_storable!(FOOD);
        named_storable!(STORABLE_SEQUENCE);
    }

    #[test]
    fn test_table_exists_after_create() {
        let db = Database::open_in_memory().unwrap();
        let store = Store::new(&db);

        assert!(!store.table_exists::<Food>().unwrap());
        store.create_table::<Food>(&Food::schema()).unwrap();
        assert!(store.table_exists::<Food>().unwrap());
    }

    #[test]
    fn test_table_exists_after_insert() {
        let db = Database::open_in_memory().unwrap();
        let store = Store::new(&db);

        let mut food = taco();
        food.set_id(1);
        store.insert(&food).unwrap();
        assert!(store.table_exists::<Food>().unwrap());
        assert_eq!(store.count_rows::<Food>().unwrap(), 1);
    }

    #[test]
    fn test_create_table_is_idempotent() {
        let db = Database::open_in_memory().unwrap();
        let store = Store::new(&db);

        store.create_table::<Food>(&Food::schema()).unwrap();
        let before = store.table_schema::<Food>().unwrap();

        // A different schema is ignored once the table exists
        let other = vec![ColumnProperties::new("id", DataType::Integer, Constraint::PrimaryKey)];
        store.create_table::<Food>(&other).unwrap();
        store.create_table::<Food>(&Food::schema()).unwrap();

        assert_eq!(store.table_schema::<Food>().unwrap(), before);
    }

    #[test]
    fn test_table_schema_marks_constraints() {
        let db = Database::open_in_memory().unwrap();
        let store = Store::new(&db);

        assert!(store.table_schema::<Food>().unwrap().is_empty());
        store.create_table::<Food>(&Food::schema()).unwrap();
        assert_eq!(store.table_schema::<Food>().unwrap(), Food::schema());
    }

    #[test]
    fn test_drop_missing_table_is_noop() {
        let db = Database::open_in_memory().unwrap();
        let store = Store::new(&db);

        store.drop_table::<Food>().unwrap();
        store.drop_table::<Food>().unwrap();
        assert!(!store.table_exists::<Food>().unwrap());
    }

    #[test]
    fn test_drop_table() {
        let db = Database::open_in_memory().unwrap();
        let mut store = Store::new(&db);

        store.make(taco()).unwrap();
        store.drop_table::<Food>().unwrap();

        assert!(!store.table_exists::<Food>().unwrap());
        assert_eq!(store.count_rows::<Food>().unwrap(), 0);
        assert!(store.retrieve_all::<Food>().unwrap().is_empty());
    }

    #[test]
    fn test_make_then_retrieve_taco() {
        let db = Database::open_in_memory().unwrap();
        let mut store = Store::new(&db);
        store.make(taco()).unwrap();

        // Read back through a store with a cold cache
        let mut fresh = Store::new(&db);
        let all = fresh.retrieve_all::<Food>().unwrap();
        assert_eq!(all.len(), 1);

        let food = fresh.get(all[0]).unwrap();
        assert!(food.id() > 0);
        assert_eq!(food.name(), "taco");
        assert_eq!(
            food.macronutrients(),
            Macronutrients::new(10.0, 20.0, 2.0, 15.0)
        );
    }

    #[test]
    fn test_delete_taco() {
        let db = Database::open_in_memory().unwrap();
        let mut store = Store::new(&db);
        let taco = store.make(taco()).unwrap();

        store.delete_storable(taco).unwrap();

        assert!(store.get(taco).is_none());
        assert!(store.retrieve_all::<Food>().unwrap().is_empty());
        assert_eq!(store.count_rows::<Food>().unwrap(), 0);
    }

    #[test]
    fn test_delete_uncached_object() {
        let db = Database::open_in_memory().unwrap();
        let mut store = Store::new(&db);
        let handle = store.make(taco()).unwrap();

        let mut other = Store::new(&db);
        other.delete_storable(handle).unwrap();
        assert_eq!(other.count_rows::<Food>().unwrap(), 0);

        // Deleting from an absent table only touches the cache
        other.drop_table::<Food>().unwrap();
        other.delete_storable(handle).unwrap();
    }

    #[test]
    fn test_make_assigns_increasing_ids() {
        let db = Database::open_in_memory().unwrap();
        let mut store = Store::new(&db);

        let a = store.make(taco()).unwrap();
        let b = store.make(burrito()).unwrap();
        assert_eq!(a.id(), 1);
        assert_eq!(b.id(), 2);
        assert_eq!(store.get(b).unwrap().id(), 2);
    }

    #[test]
    fn test_new_ids_never_reuse_deleted_ids() {
        let db = Database::open_in_memory().unwrap();
        let mut store = Store::new(&db);

        let first = store.make(taco()).unwrap();
        let second = store.make(burrito()).unwrap();
        store.delete_storable(second).unwrap();
        let third = store.make(burrito()).unwrap();
        assert!(third.id() > second.id());

        store.delete_storable(first).unwrap();
        store.delete_storable(third).unwrap();
        store.drop_table::<Food>().unwrap();
        let fourth = store.make(taco()).unwrap();
        assert!(fourth.id() > third.id());
    }

    #[test]
    fn test_new_id_skips_ids_inserted_directly() {
        let db = Database::open_in_memory().unwrap();
        let store = Store::new(&db);

        assert_eq!(store.get_new_id::<Food>().unwrap(), 1);

        let mut food = taco();
        food.set_id(40);
        store.insert(&food).unwrap();
        assert_eq!(store.get_new_id::<Food>().unwrap(), 41);
        assert_eq!(store.get_new_id::<Food>().unwrap(), 42);
    }

    #[test]
    fn test_count_matches_retrieve_all() {
        let db = Database::open_in_memory().unwrap();
        let mut store = Store::new(&db);

        assert_eq!(store.count_rows::<Food>().unwrap(), 0);
        for _ in 0..3 {
            store.make(taco()).unwrap();
        }
        let doomed = store.make(burrito()).unwrap();
        store.delete_storable(doomed).unwrap();

        let all = store.retrieve_all::<Food>().unwrap();
        assert_eq!(store.count_rows::<Food>().unwrap(), all.len());
        assert_eq!(all.len(), 3);
    }

    #[test]
    fn test_update_writes_live_changes() {
        let db = Database::open_in_memory().unwrap();
        let mut store = Store::new(&db);
        let handle = store.make(taco()).unwrap();

        let food = store.get_mut(handle).unwrap();
        food.set_name("fish taco");
        let mut macros = food.macronutrients();
        macros.set_protein(22.0);
        food.set_macronutrients(macros);
        store.update(store.get(handle).unwrap()).unwrap();

        let mut fresh = Store::new(&db);
        let reloaded = fresh.find::<Food>(handle.id()).unwrap().unwrap();
        let food = fresh.get(reloaded).unwrap();
        assert_eq!(food.name(), "fish taco");
        assert_eq!(food.macronutrients().protein, 22.0);
    }

    #[test]
    fn test_edit_round_trips_through_database() {
        let db = Database::open_in_memory().unwrap();
        let mut store = Store::new(&db);
        let handle = store.make(taco()).unwrap();

        store
            .edit(handle, |food: &mut Food| food.set_name("al pastor"))
            .unwrap();

        let mut fresh = Store::new(&db);
        let all = fresh.retrieve_all::<Food>().unwrap();
        assert_eq!(fresh.get(all[0]).unwrap().name(), "al pastor");
    }

    #[test]
    fn test_update_never_inserted_fails() {
        let db = Database::open_in_memory().unwrap();
        let mut store = Store::new(&db);

        let mut ghost = taco();
        ghost.set_id(99);
        assert!(matches!(
            store.update(&ghost),
            Err(TrackerDbError::IdentityConstraintViolation { id: 99, .. })
        ));

        store.make(burrito()).unwrap();
        assert!(matches!(
            store.update(&ghost),
            Err(TrackerDbError::IdentityConstraintViolation { id: 99, .. })
        ));
    }

    #[test]
    fn test_edit_deleted_handle_fails() {
        let db = Database::open_in_memory().unwrap();
        let mut store = Store::new(&db);
        let handle = store.make(taco()).unwrap();
        store.delete_storable(handle).unwrap();

        let result = store.edit(handle, |food: &mut Food| food.set_name("gone"));
        assert!(matches!(
            result,
            Err(TrackerDbError::IdentityConstraintViolation { .. })
        ));
    }

    #[test]
    fn test_insert_duplicate_id_is_reported() {
        let db = Database::open_in_memory().unwrap();
        let store = Store::new(&db);

        let mut food = taco();
        food.set_id(1);
        store.insert(&food).unwrap();
        assert!(matches!(
            store.insert(&food),
            Err(TrackerDbError::Insert { .. })
        ));
    }

    #[test]
    fn test_insert_rejects_unrenderable_cell() {
        let db = Database::open_in_memory().unwrap();
        let mut store = Store::new(&db);

        let food = Food::new("mystery", Macronutrients::new(f64::NAN, 0.0, 0.0, 0.0));
        assert!(matches!(
            store.make(food),
            Err(TrackerDbError::UnrecognizedCell(_))
        ));
        assert_eq!(store.cached_count::<Food>(), 0);
    }

    #[test]
    fn test_retrieve_all_reconciles_cache() {
        let db = Database::open_in_memory().unwrap();
        let mut store = Store::new(&db);
        let handle = store.make(taco()).unwrap();

        // An unsaved edit survives a reload
        store.get_mut(handle).unwrap().set_name("unsaved");
        let all = store.retrieve_all::<Food>().unwrap();
        assert_eq!(all, vec![handle]);
        assert_eq!(store.get(handle).unwrap().name(), "unsaved");

        // Rows added behind the store's back appear, removed ones are evicted
        let mut outside = burrito();
        outside.set_id(50);
        Store::new(&db).insert(&outside).unwrap();
        db.lock()
            .unwrap()
            .execute("DELETE FROM Food WHERE id=1", [])
            .unwrap();

        let all = store.retrieve_all::<Food>().unwrap();
        assert_eq!(all.len(), 1);
        assert_eq!(all[0].id(), 50);
        assert!(store.get(handle).is_none());
        assert_eq!(store.get(all[0]).unwrap().name(), "burrito");
    }

    #[test]
    fn test_find() {
        let db = Database::open_in_memory().unwrap();
        let mut store = Store::new(&db);

        assert!(store.find::<Food>(1).unwrap().is_none());
        let handle = store.make(taco()).unwrap();
        assert_eq!(store.find::<Food>(handle.id()).unwrap(), Some(handle));

        let mut fresh = Store::new(&db);
        assert_eq!(fresh.cached_count::<Food>(), 0);
        let found = fresh.find::<Food>(handle.id()).unwrap().unwrap();
        assert_eq!(fresh.get(found).unwrap().name(), "taco");
        assert_eq!(fresh.cached_count::<Food>(), 1);
        assert!(fresh.find::<Food>(handle.id() + 1).unwrap().is_none());
    }

    #[test]
    fn test_handles_survive_cache_growth() {
        let db = Database::open_in_memory().unwrap();
        let mut store = Store::new(&db);

        let first = store.make(taco()).unwrap();
        for i in 0..100 {
            store.make(Food::new(format!("snack {i}"), Macronutrients::default())).unwrap();
        }

        assert_eq!(store.get(first).unwrap().name(), "taco");
        assert_eq!(store.cached::<Food>().count(), 101);
        assert_eq!(store.cached::<Food>().next().unwrap().id(), first.id());
    }

    #[test]
    fn test_table_name_collision() {
        let db = Database::open_in_memory().unwrap();
        let mut store = Store::new(&db);

        store.make(taco()).unwrap();
        let result = store.make(legacy::Food {
            id: 0,
            name: "old".into(),
        });
        assert!(matches!(
            result,
            Err(TrackerDbError::TableNameCollision { .. })
        ));
        assert!(store.table_exists::<legacy::Food>().is_err());
    }

    #[test]
    fn test_table_name_collision_across_stores() {
        let db = Database::open_in_memory().unwrap();
        let mut foods = Store::new(&db);
        foods.make(taco()).unwrap();

        let mut other = Store::new(&db);
        let result = other.make(legacy::Food {
            id: 0,
            name: "old".into(),
        });
        assert!(matches!(
            result,
            Err(TrackerDbError::TableNameCollision { .. })
        ));
        assert_eq!(foods.retrieve_all::<Food>().unwrap().len(), 1);

        // The owning type is still welcome through any store
        let mut third = Store::new(&db);
        assert_eq!(third.retrieve_all::<Food>().unwrap().len(), 1);
    }

    #[test]
    fn test_table_names_differing_in_case_collide() {
        let db = Database::open_in_memory().unwrap();
        let mut store = Store::new(&db);
        store.make(taco()).unwrap();

        assert!(matches!(
            store.table_exists::<shouting::FOOD>(),
            Err(TrackerDbError::TableNameCollision { .. })
        ));
        let result = Store::new(&db).make(shouting::FOOD {
            id: 0,
            name: "loud".into(),
        });
        assert!(matches!(
            result,
            Err(TrackerDbError::TableNameCollision { .. })
        ));
        assert_eq!(store.count_rows::<Food>().unwrap(), 1);
    }

    #[test]
    fn test_table_exists_ignores_case() {
        let db = Database::open_in_memory().unwrap();
        db.lock()
            .unwrap()
            .execute_batch("CREATE TABLE FOOD (id INTEGER PRIMARY KEY, name TEXT)")
            .unwrap();

        let store = Store::new(&db);
        assert!(store.table_exists::<Food>().unwrap());
    }

    #[test]
    fn test_sequence_table_name_is_reserved() {
        let db = Database::open_in_memory().unwrap();
        let mut store = Store::new(&db);

        let result = store.make(shouting::STORABLE_SEQUENCE::default());
        assert!(matches!(
            result,
            Err(TrackerDbError::TableNameCollision { .. })
        ));
    }

    #[test]
    fn test_datetime_round_trip() {
        let db = Database::open_in_memory().unwrap();
        let mut store = Store::new(&db);

        let taken_at = NaiveDate::from_ymd_opt(2019, 3, 30)
            .unwrap()
            .and_hms_opt(7, 45, 0)
            .unwrap();
        let handle = store
            .make(WeighIn {
                id: 0,
                name: "morning".into(),
                kilograms: 81.5,
                taken_at,
            })
            .unwrap();

        let mut fresh = Store::new(&db);
        let all = fresh.retrieve_all::<WeighIn>().unwrap();
        let weigh_in = fresh.get(all[0]).unwrap();
        assert_eq!(weigh_in.id, handle.id());
        assert_eq!(weigh_in.taken_at, taken_at);
        assert_eq!(weigh_in.kilograms, 81.5);
    }

    #[test]
    fn test_check_constraint_is_enforced() {
        let db = Database::open_in_memory().unwrap();
        let mut store = Store::new(&db);

        let result = store.make(WeighIn {
            name: "broken scale".into(),
            kilograms: -1.0,
            ..WeighIn::default()
        });
        assert!(matches!(result, Err(TrackerDbError::Insert { .. })));
        assert_eq!(store.count_rows::<WeighIn>().unwrap(), 0);
    }

    #[test]
    fn test_str() {
        let db = Database::open_in_memory().unwrap();
        let mut store = Store::new(&db);
        let handle = store.make(taco()).unwrap();
        assert_eq!(store.get(handle).unwrap().str(), "1|taco|10.0|20.0|2.0|15.0");
    }
}
