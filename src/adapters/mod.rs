//! Thin façades over [`crate::row::RowEngine`]: the schema-bearing
//! [`table::Table`] and the schemaless [`collection::Collection`].
//!
//! Neither adapter owns storage — both borrow the engine living inside
//! [`crate::database::Database`] and translate tabular/document
//! operations into the row tier's `insert`/`read`/`update`/`delete`/
//! `scan` primitives. [`query::matches`] implements the predicate
//! language (`$gt`/`$lt`/`$gte`/`$lte`/`$ne`, plus exact equality) both
//! adapters filter with, grounded on
//! `pyhybriddb/query/processor.py::_matches_query`.

pub mod collection;
pub mod query;
pub mod table;

pub use collection::Collection;
pub use table::Table;
