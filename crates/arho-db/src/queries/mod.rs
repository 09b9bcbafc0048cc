//! Database query functions, one module per table family.
//!
//! Single-statement functions take `impl PgExecutor` so they compose into
//! the caller's transaction; multi-statement consistency logic lives in
//! `arho-core::lifecycle`.

pub mod codes;
pub mod dates;
pub mod documents;
pub mod groups;
pub mod objects;
pub mod organisations;
pub mod plans;
pub mod regulations;
