//! Message catalog contract
//!
//! The catalog maps frame identifiers to message layouts and provides the
//! decode/encode operations the workers depend on. Workers only ever see a
//! [`SharedCatalog`]; replacing the catalog swaps that reference and never
//! mutates the catalog behind it.
//!
//! # Components
//!
//! - [`Catalog`] - Narrow contract consumed by the ingestion, search and
//!   transmit workers
//! - [`MessageDef`] / [`SignalDef`] / [`NodeDef`] - Catalog definitions used
//!   for enumeration and search
//! - [`codec`] - Bit-level signal packing shared by catalog implementations
//! - [`InMemoryCatalog`] - Catalog held in memory, loadable from JSON

pub mod codec;
pub mod memory;

pub use memory::InMemoryCatalog;

use crate::error::Result;
use crate::types::SignalMap;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;

/// Shared, immutable catalog reference handed to each worker
pub type SharedCatalog = Arc<dyn Catalog>;

/// Decode/encode and enumeration contract of a message catalog
pub trait Catalog: Send + Sync {
    /// Decode a payload into physical signal values.
    ///
    /// Returns `Ok(None)` when the identifier is not in the catalog and an
    /// error when the payload does not fit the message layout.
    fn decode(&self, id: u32, payload: &[u8]) -> Result<Option<SignalMap>>;

    /// Name of the message with this identifier
    fn message_name(&self, id: u32) -> Option<String>;

    /// Encode physical signal values into a payload
    fn encode(&self, id: u32, values: &SignalMap) -> Result<Vec<u8>>;

    /// All messages in the catalog
    fn messages(&self) -> &[MessageDef];

    /// All nodes in the catalog
    fn nodes(&self) -> &[NodeDef];

    /// Look up a message definition by identifier
    fn message(&self, id: u32) -> Option<&MessageDef> {
        self.messages().iter().find(|m| m.frame_id == id)
    }
}

/// Bit numbering of a signal
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum ByteOrder {
    /// Intel; start bit is the least significant bit
    #[default]
    LittleEndian,
    /// Motorola; start bit is the most significant bit
    BigEndian,
}

impl fmt::Display for ByteOrder {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ByteOrder::LittleEndian => write!(f, "little_endian"),
            ByteOrder::BigEndian => write!(f, "big_endian"),
        }
    }
}

/// A signal within a message
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SignalDef {
    pub name: String,
    pub start_bit: u16,
    pub length: u16,
    #[serde(default)]
    pub byte_order: ByteOrder,
    #[serde(default)]
    pub is_signed: bool,
    #[serde(default = "default_scale")]
    pub scale: f64,
    #[serde(default)]
    pub offset: f64,
    #[serde(default)]
    pub unit: String,
    #[serde(default)]
    pub minimum: Option<f64>,
    #[serde(default)]
    pub maximum: Option<f64>,
    #[serde(default)]
    pub comment: Option<String>,
    #[serde(default)]
    pub receivers: Vec<String>,
    /// Value table: raw value to label
    #[serde(default)]
    pub choices: BTreeMap<i64, String>,
}

fn default_scale() -> f64 {
    1.0
}

impl SignalDef {
    /// Create an unsigned little-endian signal with unit scale
    pub fn new(name: impl Into<String>, start_bit: u16, length: u16) -> Self {
        Self {
            name: name.into(),
            start_bit,
            length,
            byte_order: ByteOrder::LittleEndian,
            is_signed: false,
            scale: 1.0,
            offset: 0.0,
            unit: String::new(),
            minimum: None,
            maximum: None,
            comment: None,
            receivers: Vec::new(),
            choices: BTreeMap::new(),
        }
    }

    pub fn big_endian(mut self) -> Self {
        self.byte_order = ByteOrder::BigEndian;
        self
    }

    pub fn signed(mut self) -> Self {
        self.is_signed = true;
        self
    }

    pub fn scaled(mut self, scale: f64, offset: f64) -> Self {
        self.scale = scale;
        self.offset = offset;
        self
    }

    pub fn unit(mut self, unit: impl Into<String>) -> Self {
        self.unit = unit.into();
        self
    }

    pub fn bounds(mut self, minimum: f64, maximum: f64) -> Self {
        self.minimum = Some(minimum);
        self.maximum = Some(maximum);
        self
    }

    pub fn comment(mut self, comment: impl Into<String>) -> Self {
        self.comment = Some(comment.into());
        self
    }

    pub fn choice(mut self, value: i64, label: impl Into<String>) -> Self {
        self.choices.insert(value, label.into());
        self
    }

    /// Bounds that should be enforced on encode.
    ///
    /// A `0..0` range is the catalog convention for "unbounded".
    pub fn enforced_bounds(&self) -> Option<(f64, f64)> {
        match (self.minimum, self.maximum) {
            (Some(min), Some(max)) if !(min == 0.0 && max == 0.0) => Some((min, max)),
            _ => None,
        }
    }
}

/// A message in the catalog
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MessageDef {
    pub name: String,
    pub frame_id: u32,
    #[serde(default)]
    pub is_extended: bool,
    pub length: u8,
    #[serde(default)]
    pub signals: Vec<SignalDef>,
    #[serde(default)]
    pub senders: Vec<String>,
    #[serde(default)]
    pub comment: Option<String>,
}

impl MessageDef {
    pub fn new(name: impl Into<String>, frame_id: u32, length: u8) -> Self {
        Self {
            name: name.into(),
            frame_id,
            is_extended: frame_id > crate::types::MAX_STANDARD_ID,
            length,
            signals: Vec::new(),
            senders: Vec::new(),
            comment: None,
        }
    }

    pub fn with_signal(mut self, signal: SignalDef) -> Self {
        self.signals.push(signal);
        self
    }

    pub fn with_sender(mut self, sender: impl Into<String>) -> Self {
        self.senders.push(sender.into());
        self
    }

    pub fn with_comment(mut self, comment: impl Into<String>) -> Self {
        self.comment = Some(comment.into());
        self
    }

    /// Identifier formatted for display, e.g. `0x200`
    pub fn id_label(&self) -> String {
        format!("0x{:X}", self.frame_id)
    }
}

/// A node (ECU) in the catalog
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NodeDef {
    pub name: String,
    #[serde(default)]
    pub comment: Option<String>,
}

impl NodeDef {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            comment: None,
        }
    }

    pub fn with_comment(mut self, comment: impl Into<String>) -> Self {
        self.comment = Some(comment.into());
        self
    }
}
