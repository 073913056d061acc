//! Schema-bearing row façade.
//!
//! A [`Table`] is a thin, non-owning view: it holds a `&mut` borrow of
//! the owning [`crate::database::Database`] and a container name, and
//! translates `insert`/`select`/`update`/`delete` into the row engine's
//! `insert`/`read`/`update`/`delete`/`scan` primitives. It carries no
//! storage of its own — schema and the auto-increment id high-water
//! mark live on the `Database` so they survive across repeated
//! `Database::table` borrows.

use crate::adapters::query::{Query, matches as query_matches, query_from_fields};
use crate::database::Database;
use crate::error::Error;
use crate::value::{Record, Value};

/// Does `value`'s runtime type match the schema's declared type tag?
/// `Null` is always accepted regardless of column type — the distilled
/// spec does not ask for a not-null constraint, only that declared,
/// present values match their column's type.
fn type_matches(tag: &str, value: &Value) -> bool {
    if matches!(value, Value::Null) {
        return true;
    }
    match tag.to_ascii_lowercase().as_str() {
        "int" | "integer" => matches!(value, Value::Int(_)),
        "float" | "double" => matches!(value, Value::Float(_) | Value::Int(_)),
        "bool" | "boolean" => matches!(value, Value::Bool(_)),
        "string" | "object" => true,
        _ => true,
    }
}

/// A schema-validated table. Rows carry an auto-increment integer `id`
/// assigned on insert (or, if the caller supplies one, tracked as the
/// new high-water mark for subsequent auto-assignment).
pub struct Table<'a> {
    db: &'a mut Database,
    name: String,
}

impl<'a> Table<'a> {
    pub(crate) fn new(db: &'a mut Database, name: String) -> Table<'a> {
        Table { db, name }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    fn validate(&self, record: &Record) -> Result<(), Error> {
        let schema = self
            .db
            .table_schema(&self.name)
            .ok_or_else(|| Error::NotFound(format!("table '{}'", self.name)))?;
        for (field, value) in record.iter() {
            if field == "id" {
                continue;
            }
            let Some(tag) = schema.get(field) else {
                return Err(Error::SchemaViolation(format!("unknown column '{field}' on table '{}'", self.name)));
            };
            if !type_matches(tag, value) {
                return Err(Error::SchemaViolation(format!(
                    "column '{field}' on table '{}' expects type '{tag}', got '{}'",
                    self.name,
                    value.type_name()
                )));
            }
        }
        Ok(())
    }

    /// Insert a row, validating it against the table's schema. Returns
    /// the assigned (or caller-supplied) `id`.
    pub fn insert(&mut self, mut record: Record) -> Result<Value, Error> {
        self.validate(&record)?;
        let id = match record.get("id").cloned() {
            Some(Value::Int(id)) => {
                self.db.observe_table_id(&self.name, id);
                id
            }
            Some(_) => return Err(Error::SchemaViolation("'id' must be an integer".to_string())),
            None => self.db.next_table_id(&self.name),
        };
        record.set("id", Value::Int(id));
        self.db.row_engine_mut().insert(&self.name, Value::Int(id), record)?;
        Ok(Value::Int(id))
    }

    /// Point lookup by `id`.
    pub fn read(&mut self, id: i64) -> Result<Option<Record>, Error> {
        Ok(self.db.row_engine_mut().read(&self.name, &Value::Int(id))?)
    }

    /// Rows matching `query` (or every row, if `query` is `None`).
    pub fn select(&mut self, query: Option<&Record>) -> Result<Vec<Record>, Error> {
        let query: Option<Query> = query.map(|q| query_from_fields(q.iter().map(|(k, v)| (k.to_string(), v.clone())).collect()));
        let rows = self.db.row_engine_mut().scan(&self.name)?;
        Ok(rows
            .into_iter()
            .filter(|(_, record)| query.as_ref().is_none_or(|q| query_matches(record, q)))
            .map(|(_, record)| record)
            .collect())
    }

    /// Merge `set`'s fields into every row matching `query`, returning
    /// the count of rows updated. Fields absent from `set` are left
    /// untouched on the matched row (field-level replacement, not
    /// whole-record replacement).
    pub fn update(&mut self, query: Option<&Record>, set: &Record) -> Result<usize, Error> {
        let matches = self.select(query)?;
        let mut updated = 0;
        for mut row in matches {
            let Some(Value::Int(id)) = row.get("id").cloned() else {
                continue;
            };
            for (field, value) in set.iter() {
                row.set(field, value.clone());
            }
            row.set("id", Value::Int(id));
            self.validate(&row)?;
            if self.db.row_engine_mut().update(&self.name, &Value::Int(id), row)? {
                updated += 1;
            }
        }
        Ok(updated)
    }

    /// Delete every row matching `query`, returning the count removed.
    pub fn delete(&mut self, query: Option<&Record>) -> Result<usize, Error> {
        let matches = self.select(query)?;
        let mut removed = 0;
        for row in matches {
            let Some(Value::Int(id)) = row.get("id").cloned() else {
                continue;
            };
            if self.db.row_engine_mut().delete(&self.name, &Value::Int(id))? {
                removed += 1;
            }
        }
        Ok(removed)
    }

    /// Count rows matching `query` (or the whole table, if `None`).
    pub fn count(&mut self, query: Option<&Record>) -> Result<usize, Error> {
        Ok(self.select(query)?.len())
    }

    /// Build a secondary index over `field`. A logged no-op on the LSM
    /// engine (see [`crate::row::RowEngine::create_index`]).
    pub fn create_index(&mut self, field: &str) -> Result<(), Error> {
        Ok(self.db.row_engine_mut().create_index(&self.name, field)?)
    }
}
