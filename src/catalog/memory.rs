//! In-memory catalog
//!
//! Holds message and node definitions in memory with an identifier index.
//! Catalogs can be built in code or loaded from a JSON description of the
//! same definitions.

use super::{codec, Catalog, MessageDef, NodeDef};
use crate::error::{CanVisError, Result, ResultExt};
use crate::types::SignalMap;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::Path;

/// Serialized form of a catalog
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct CatalogFile {
    #[serde(default)]
    pub messages: Vec<MessageDef>,
    #[serde(default)]
    pub nodes: Vec<NodeDef>,
}

/// Catalog held entirely in memory
#[derive(Debug, Clone, Default)]
pub struct InMemoryCatalog {
    messages: Vec<MessageDef>,
    nodes: Vec<NodeDef>,
    index: HashMap<u32, usize>,
}

impl InMemoryCatalog {
    /// Build a catalog from definitions
    pub fn new(messages: Vec<MessageDef>, nodes: Vec<NodeDef>) -> Self {
        let index = messages
            .iter()
            .enumerate()
            .map(|(i, m)| (m.frame_id, i))
            .collect();
        Self {
            messages,
            nodes,
            index,
        }
    }

    /// Add a message, replacing any existing message with the same id
    pub fn with_message(mut self, message: MessageDef) -> Self {
        match self.index.get(&message.frame_id) {
            Some(&i) => self.messages[i] = message,
            None => {
                self.index.insert(message.frame_id, self.messages.len());
                self.messages.push(message);
            }
        }
        self
    }

    /// Add a node
    pub fn with_node(mut self, node: NodeDef) -> Self {
        self.nodes.push(node);
        self
    }

    /// Parse a catalog from its JSON description
    pub fn from_json(json: &str) -> Result<Self> {
        let file: CatalogFile = serde_json::from_str(json)?;
        Ok(Self::new(file.messages, file.nodes))
    }

    /// Load a catalog from a JSON file
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let json = std::fs::read_to_string(path)
            .map_err(CanVisError::from)
            .with_context(|| format!("Failed to read catalog {}", path.display()))?;
        let catalog = Self::from_json(&json)?;
        tracing::info!(
            "Loaded catalog {} ({} messages, {} nodes)",
            path.display(),
            catalog.messages.len(),
            catalog.nodes.len()
        );
        Ok(catalog)
    }

    /// Serialize to the JSON description
    pub fn to_json(&self) -> Result<String> {
        let file = CatalogFile {
            messages: self.messages.clone(),
            nodes: self.nodes.clone(),
        };
        Ok(serde_json::to_string_pretty(&file)?)
    }

    fn lookup(&self, id: u32) -> Option<&MessageDef> {
        self.index.get(&id).map(|&i| &self.messages[i])
    }
}

impl Catalog for InMemoryCatalog {
    fn decode(&self, id: u32, payload: &[u8]) -> Result<Option<SignalMap>> {
        match self.lookup(id) {
            Some(message) => codec::decode_message(message, payload).map(Some),
            None => Ok(None),
        }
    }

    fn message_name(&self, id: u32) -> Option<String> {
        self.lookup(id).map(|m| m.name.clone())
    }

    fn encode(&self, id: u32, values: &SignalMap) -> Result<Vec<u8>> {
        let message = self.lookup(id).ok_or(CanVisError::UnknownMessage(id))?;
        codec::encode_message(message, values)
    }

    fn messages(&self) -> &[MessageDef] {
        &self.messages
    }

    fn nodes(&self) -> &[NodeDef] {
        &self.nodes
    }

    fn message(&self, id: u32) -> Option<&MessageDef> {
        self.lookup(id)
    }
}
