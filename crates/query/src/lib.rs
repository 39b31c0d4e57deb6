//! Backend-agnostic filter compiler for the sediment document layer.
//!
//! Turns dynamically-shaped filter trees into parameterized SQL boolean
//! expressions:
//! - [`filter`] — the closed tagged-variant filter model and its boundary
//!   parser
//! - [`value`] — typed bound values ([`SqlValue`])
//! - [`compile`] — predicate generation, placeholder binding, and the
//!   [`combine_where`] helper
//!
//! Malformed filter input never raises: it degrades to an always-true
//! predicate (logged via `tracing`). See the module docs in [`compile`].

#![forbid(unsafe_code)]

pub mod compile;
pub mod filter;
pub mod value;

pub use compile::{
    ALWAYS_FALSE, ALWAYS_TRUE, CompiledWhere, Compiler, PHYSICAL_COLUMNS, TIMESTAMP_COLUMNS,
    combine_where, compile,
};
pub use filter::{Filter, Operator};
pub use value::SqlValue;
