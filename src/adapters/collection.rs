//! Schemaless document façade.
//!
//! Mirrors [`super::table::Table`]'s shape but drops schema validation
//! and the integer auto-increment id in favor of a generated `_id`
//! (millisecond timestamp + random suffix — a ULID-style identifier,
//! not a true ULID, grounded on the pack's use of `rand` for id
//! generation) and MongoDB-flavored update operators (`$set`/`$unset`/
//! `$inc`).

use rand::Rng;
use std::time::{SystemTime, UNIX_EPOCH};

use crate::adapters::query::{Query, matches as query_matches, query_from_fields};
use crate::database::Database;
use crate::error::Error;
use crate::value::{Record, Value};

fn generate_id() -> String {
    let millis = SystemTime::now().duration_since(UNIX_EPOCH).map(|d| d.as_millis()).unwrap_or(0);
    let suffix: u32 = rand::rng().random();
    format!("{millis:013x}{suffix:08x}")
}

/// A schemaless document collection.
pub struct Collection<'a> {
    db: &'a mut Database,
    name: String,
}

impl<'a> Collection<'a> {
    pub(crate) fn new(db: &'a mut Database, name: String) -> Collection<'a> {
        Collection { db, name }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Insert a document, generating `_id` if the caller didn't supply
    /// one. Returns the assigned `_id`.
    pub fn insert_one(&mut self, mut doc: Record) -> Result<Value, Error> {
        let id = match doc.get("_id").cloned() {
            Some(Value::Str(id)) => id,
            Some(_) => return Err(Error::SchemaViolation("'_id' must be a string".to_string())),
            None => generate_id(),
        };
        doc.set("_id", Value::Str(id.clone()));
        self.db.row_engine_mut().insert(&self.name, Value::Str(id.clone()), doc)?;
        Ok(Value::Str(id))
    }

    /// Point lookup by `_id`.
    pub fn find_by_id(&mut self, id: &str) -> Result<Option<Record>, Error> {
        Ok(self.db.row_engine_mut().read(&self.name, &Value::Str(id.to_string()))?)
    }

    /// Documents matching `query` (or every document, if `query` is
    /// `None`).
    pub fn find(&mut self, query: Option<&Record>) -> Result<Vec<Record>, Error> {
        let query: Option<Query> = query.map(|q| query_from_fields(q.iter().map(|(k, v)| (k.to_string(), v.clone())).collect()));
        let rows = self.db.row_engine_mut().scan(&self.name)?;
        Ok(rows
            .into_iter()
            .filter(|(_, doc)| query.as_ref().is_none_or(|q| query_matches(doc, q)))
            .map(|(_, doc)| doc)
            .collect())
    }

    /// Apply `ops` (a record with any of `$set`, `$unset`, `$inc` keys,
    /// each a nested map of field→value) to the first document
    /// matching `query`. Returns whether a document was updated.
    pub fn update_one(&mut self, query: Option<&Record>, ops: &Record) -> Result<bool, Error> {
        let Some(mut doc) = self.find(query)?.into_iter().next() else {
            return Ok(false);
        };
        let Some(Value::Str(id)) = doc.get("_id").cloned() else {
            return Ok(false);
        };
        apply_ops(&mut doc, ops);
        doc.set("_id", Value::Str(id.clone()));
        Ok(self.db.row_engine_mut().update(&self.name, &Value::Str(id), doc)?)
    }

    /// Apply `ops` to every document matching `query`, returning the
    /// count updated.
    pub fn update_many(&mut self, query: Option<&Record>, ops: &Record) -> Result<usize, Error> {
        let docs = self.find(query)?;
        let mut updated = 0;
        for mut doc in docs {
            let Some(Value::Str(id)) = doc.get("_id").cloned() else {
                continue;
            };
            apply_ops(&mut doc, ops);
            doc.set("_id", Value::Str(id.clone()));
            if self.db.row_engine_mut().update(&self.name, &Value::Str(id), doc)? {
                updated += 1;
            }
        }
        Ok(updated)
    }

    /// Delete the first document matching `query`. Returns whether a
    /// document was removed.
    pub fn delete_one(&mut self, query: Option<&Record>) -> Result<bool, Error> {
        let Some(doc) = self.find(query)?.into_iter().next() else {
            return Ok(false);
        };
        let Some(Value::Str(id)) = doc.get("_id").cloned() else {
            return Ok(false);
        };
        Ok(self.db.row_engine_mut().delete(&self.name, &Value::Str(id))?)
    }

    /// Delete every document matching `query`, returning the count
    /// removed.
    pub fn delete_many(&mut self, query: Option<&Record>) -> Result<usize, Error> {
        let docs = self.find(query)?;
        let mut removed = 0;
        for doc in docs {
            let Some(Value::Str(id)) = doc.get("_id").cloned() else {
                continue;
            };
            if self.db.row_engine_mut().delete(&self.name, &Value::Str(id))? {
                removed += 1;
            }
        }
        Ok(removed)
    }

    /// Count documents matching `query` (or the whole collection, if
    /// `None`).
    pub fn count_documents(&mut self, query: Option<&Record>) -> Result<usize, Error> {
        Ok(self.find(query)?.len())
    }

    /// Build a secondary index over `field`. A logged no-op on the LSM
    /// engine.
    pub fn create_index(&mut self, field: &str) -> Result<(), Error> {
        Ok(self.db.row_engine_mut().create_index(&self.name, field)?)
    }
}

fn apply_ops(doc: &mut Record, ops: &Record) {
    if let Some(Value::Map(fields)) = ops.get("$set") {
        for (field, value) in fields {
            doc.set(field, value.clone());
        }
    }
    if let Some(Value::Map(fields)) = ops.get("$unset") {
        for (field, _) in fields {
            doc.remove(field);
        }
    }
    if let Some(Value::Map(fields)) = ops.get("$inc") {
        for (field, delta) in fields {
            let current = doc.get(field).and_then(Value::as_f64).unwrap_or(0.0);
            let delta = delta.as_f64().unwrap_or(0.0);
            let new_value = current + delta;
            match (doc.get(field), delta.fract() == 0.0 && new_value.fract() == 0.0) {
                (Some(Value::Int(_)), true) | (None, true) => doc.set(field, Value::Int(new_value as i64)),
                _ => doc.set(field, Value::Float(new_value)),
            }
        }
    }
}
