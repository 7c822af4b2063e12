//! Persistence hand-off
//!
//! Session records flow engine -> [`PersistenceDispatcher`] -> [`SessionStore`],
//! with the [`Spool`] as local durable fallback when the store fails.

mod dispatcher;
mod spool;
mod store;

pub use dispatcher::PersistenceDispatcher;
pub use spool::{RetryReport, Spool, SpoolEnvelope};
pub use store::{JsonFileStore, MemoryStore, SessionStore};
