//! PostgreSQL storage layer for the plan database.
//!
//! Owns the schema (embedded migrations), the row models, and the query
//! functions. Domain rules live in `arho-core`; this crate only moves rows.

pub mod config;
pub mod models;
pub mod pool;
pub mod queries;
pub mod value;
