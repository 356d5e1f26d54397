//! Unit test suite entry point.
//!
//! Run with: cargo test --test unit

mod helpers;

mod statement_tests;
mod validation_tests;
