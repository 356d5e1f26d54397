//! AST contract for the Cypher-to-SQL translator.
//!
//! The host's parser produces this tree; the translator in
//! [`crate::sqlite_query_generator`] consumes it. Nothing in this module
//! parses text - it is the shape of the input, nothing more.

pub mod ast;

pub use ast::*;
