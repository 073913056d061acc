//! Predicate matcher shared by [`super::table::Table`] and
//! [`super::collection::Collection`].
//!
//! Grounded on `pyhybriddb/query/processor.py::QueryProcessor::_matches_query`:
//! a query is a field→value map. A plain value means exact equality; a
//! nested map of `$gt`/`$lt`/`$gte`/`$lte`/`$ne` means a comparison
//! against [`crate::value::Value::partial_compare`]. Fields absent from
//! the document never match. Logical `$and`/`$or` composition is out of
//! scope — the original leaves it unimplemented too (`query.rs`'s
//! sibling `TODO` in the original source), so this crate does not add
//! it either.

use crate::value::{Record, Value};

/// One query predicate on a single field: either exact equality or one
/// comparison operator.
#[derive(Debug, Clone)]
pub enum Predicate {
    Eq(Value),
    Gt(Value),
    Lt(Value),
    Gte(Value),
    Lte(Value),
    Ne(Value),
}

/// A query is a field → predicate map, evaluated as a logical AND
/// across every entry — a document matches only if every field's
/// predicate holds.
pub type Query = Vec<(String, Predicate)>;

/// Build a query from field→value pairs: a plain [`Value`] becomes
/// [`Predicate::Eq`]; a [`Value::Map`] whose keys are all `$op` entries
/// fans out into one comparison predicate per entry, so a range query
/// like `{"age": {"$gte": 18, "$lte": 65}}` produces two predicates on
/// `age` that the caller ANDs together. Unknown operators contribute no
/// predicate at all, mirroring the original's silent skip of
/// unrecognized operators.
pub fn query_from_fields(fields: Vec<(String, Value)>) -> Query {
    fields
        .into_iter()
        .flat_map(|(field, value)| match value {
            Value::Map(entries) if !entries.is_empty() && entries.iter().all(|(k, _)| k.starts_with('$')) => entries
                .into_iter()
                .filter_map(|(op, op_val)| {
                    let predicate = match op.as_str() {
                        "$gt" => Predicate::Gt(op_val),
                        "$lt" => Predicate::Lt(op_val),
                        "$gte" => Predicate::Gte(op_val),
                        "$lte" => Predicate::Lte(op_val),
                        "$ne" => Predicate::Ne(op_val),
                        _ => return None,
                    };
                    Some((field.clone(), predicate))
                })
                .collect::<Vec<_>>(),
            other => vec![(field, Predicate::Eq(other))],
        })
        .collect()
}

/// Does `record` satisfy every predicate in `query`?
pub fn matches(record: &Record, query: &Query) -> bool {
    query.iter().all(|(field, predicate)| {
        let Some(doc_val) = record.get(field) else {
            return false;
        };
        match predicate {
            Predicate::Eq(v) => doc_val == v,
            Predicate::Ne(v) => doc_val != v,
            Predicate::Gt(v) => matches!(doc_val.partial_compare(v), Some(std::cmp::Ordering::Greater)),
            Predicate::Lt(v) => matches!(doc_val.partial_compare(v), Some(std::cmp::Ordering::Less)),
            Predicate::Gte(v) => matches!(doc_val.partial_compare(v), Some(std::cmp::Ordering::Greater | std::cmp::Ordering::Equal)),
            Predicate::Lte(v) => matches!(doc_val.partial_compare(v), Some(std::cmp::Ordering::Less | std::cmp::Ordering::Equal)),
        }
    })
}
