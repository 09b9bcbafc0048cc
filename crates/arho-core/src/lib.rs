//! Domain logic for the arho plan database: the reference-code registry,
//! the lifecycle state machine and its consistency rules, geometry checks,
//! the plan-object classifier, the wire serializer/deserializer, and the
//! client for the national planning-data API.

pub mod classify;
pub mod client;
pub mod codes;
pub mod geometry;
pub mod graph;
pub mod lifecycle;
pub mod wire;
