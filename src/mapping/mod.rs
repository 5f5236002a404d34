//! Identifier mapping between domain entities and remote resources.
//!
//! Keys are explicit composites of endpoint identity, resource kind and
//! domain id. Values are the numbers the remote tracker handed back.

mod identifier_map;
mod store;

pub use identifier_map::IdentifierMap;
pub use store::{MapKey, MappingStore, RemoteId, ResourceKind};
