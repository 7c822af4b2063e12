//! Read-only protocol repository

use std::collections::BTreeMap;
use std::fs;
use std::path::Path;
use std::sync::Arc;

use tracing::debug;

use super::library::builtin_protocols;
use super::phase::Protocol;
use crate::error::{EntrainError, Result};

/// Source of protocols by id
///
/// The engine only ever reads protocols; creation and storage belong to the
/// implementor.
pub trait ProtocolRepository: Send + Sync {
    /// Fetch a protocol by id
    fn get(&self, id: &str) -> Result<Arc<Protocol>>;

    /// List available protocol ids
    fn ids(&self) -> Vec<String>;
}

/// In-memory repository, pre-loaded with the built-in library
#[derive(Debug, Clone, Default)]
pub struct InMemoryProtocolRepository {
    protocols: BTreeMap<String, Arc<Protocol>>,
}

impl InMemoryProtocolRepository {
    /// Empty repository
    pub fn new() -> Self {
        Self::default()
    }

    /// Repository holding the built-in protocols
    pub fn with_builtins() -> Result<Self> {
        let mut repo = Self::new();
        for protocol in builtin_protocols()? {
            repo.insert(protocol);
        }
        Ok(repo)
    }

    /// Add or replace a protocol
    pub fn insert(&mut self, protocol: Protocol) {
        self.protocols
            .insert(protocol.id().to_string(), Arc::new(protocol));
    }

    /// Load a protocol JSON file and add it
    pub fn load_file(&mut self, path: &Path) -> Result<Arc<Protocol>> {
        let content = fs::read_to_string(path)?;
        let protocol = Protocol::from_json(&content)?;
        debug!(id = protocol.id(), path = %path.display(), "loaded protocol");
        let id = protocol.id().to_string();
        self.insert(protocol);
        self.get(&id)
    }
}

impl ProtocolRepository for InMemoryProtocolRepository {
    fn get(&self, id: &str) -> Result<Arc<Protocol>> {
        self.protocols
            .get(id)
            .cloned()
            .ok_or_else(|| EntrainError::ProtocolNotFound { id: id.to_string() })
    }

    fn ids(&self) -> Vec<String> {
        self.protocols.keys().cloned().collect()
    }
}
