//! Structured queries
//!
//! Queries are plain JSON values built with the [`operators`] helpers,
//! normalized into a typed [`Predicate`] tree and compiled to parameterized
//! SQL by the [`compiler`].

pub mod compiler;
pub mod operators;
pub mod predicate;

pub use compiler::{compile, escape_id, CompiledQuery, OrderDirection, RawQuery, SqlSelectBuilder};
pub use predicate::{Condition, Predicate};
