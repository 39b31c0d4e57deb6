//! Shared test tooling for the sediment workspace.
//!
//! Currently just [`strategies`] — reusable proptest generators for domain
//! values, used as a dev-dependency by the query and store crates.

#![forbid(unsafe_code)]

pub mod strategies;
