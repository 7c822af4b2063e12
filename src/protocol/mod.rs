//! Protocols
//!
//! Phase/Protocol data model, the read-only repository interface and the
//! built-in protocol library.

mod library;
mod phase;
mod repository;

pub use library::{builtin_protocols, BUILTIN_IDS};
pub use phase::{FrequencySpec, Phase, Protocol, DURATION_EPSILON};
pub use repository::{InMemoryProtocolRepository, ProtocolRepository};
