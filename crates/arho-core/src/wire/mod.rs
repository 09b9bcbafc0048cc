//! Wire-format mapping: the JSON schema mandated by the national API,
//! the serializer from the plan graph, the deserializer back, and the
//! transactional importer.

pub mod deserialize;
pub mod import;
pub mod schema;
pub mod serialize;

pub use deserialize::{DeserializeError, ImportMetadata, plan_from_wire};
pub use import::{ImportError, import_plan};
pub use schema::{WirePlan, WirePlanMatter};
pub use serialize::{plan_matter_to_wire, plan_to_wire};
