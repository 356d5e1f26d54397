//! Litegraph - Cypher-to-SQL translation for SQLite-backed property graphs
//!
//! This crate translates a subset of the Cypher graph query language into
//! parameterized SQL over a fixed relational schema:
//! - `nodes(id, label, properties)` where `label` is a JSON array and
//!   `properties` is a JSON object
//! - `edges(id, type, source_id, target_id, properties)`
//!
//! The host owns parsing (the AST in [`cypher_ast`] is the input contract),
//! statement execution, and registration of the `cypher_*` scalar helpers
//! the emitted SQL calls into (`cypher_not`, `cypher_and`, `cypher_or`,
//! `cypher_lt`/`lte`/`gt`/`gte`, `cypher_equals`, `cypher_case_eq`).
//!
//! Entry point: [`translate`].

pub mod cypher_ast;
pub mod sqlite_query_generator;

pub use sqlite_query_generator::{translate, SqlStatement, Translation};
pub use sqlite_query_generator::errors::TranslatorError;
