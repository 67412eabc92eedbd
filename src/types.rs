//! Core data types for canvis-rs
//!
//! This module contains the fundamental data structures passed between the
//! workers and the display layer.
//!
//! # Main Types
//!
//! - [`RawFrame`] - A frame as supplied by the transport, possibly incomplete
//! - [`Frame`] - A normalised frame, optionally decoded against the catalog
//! - [`PipelineStats`] - Statistics snapshot emitted by the ingestion pipeline
//! - [`TransmissionConfig`] - Snapshot of a periodic transmission
//! - [`ComposedFrame`] - An outgoing frame encoded from signal values
//!
//! # Payload Limits
//!
//! Classic frames carry at most [`MAX_CLASSIC_PAYLOAD`] bytes, FD frames at
//! most [`MAX_FD_PAYLOAD`]. Identifiers are bounded by [`MAX_STANDARD_ID`] or
//! [`MAX_EXTENDED_ID`] depending on the extended-id flag.

use crate::error::{CanVisError, Result};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

/// Maximum payload of a classic frame
pub const MAX_CLASSIC_PAYLOAD: usize = 8;

/// Maximum payload of an FD frame
pub const MAX_FD_PAYLOAD: usize = 64;

/// Largest 11-bit identifier
pub const MAX_STANDARD_ID: u32 = 0x7FF;

/// Largest 29-bit identifier
pub const MAX_EXTENDED_ID: u32 = 0x1FFF_FFFF;

/// Decoded signal values keyed by signal name
pub type SignalMap = BTreeMap<String, f64>;

/// Direction of a frame relative to this node
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
pub enum Direction {
    /// Received from the bus
    #[default]
    Rx,
    /// Transmitted by us
    Tx,
}

impl fmt::Display for Direction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Direction::Rx => write!(f, "RX"),
            Direction::Tx => write!(f, "TX"),
        }
    }
}

impl FromStr for Direction {
    type Err = CanVisError;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_ascii_lowercase().as_str() {
            "rx" => Ok(Direction::Rx),
            "tx" => Ok(Direction::Tx),
            other => Err(CanVisError::Config(format!("unknown direction '{}'", other))),
        }
    }
}

/// A frame as handed over by the transport
///
/// Timestamp and declared length may be missing; they are filled in when
/// the pipeline normalises the frame.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
pub struct RawFrame {
    /// Frame identifier
    pub id: u32,
    /// Payload bytes
    pub data: Vec<u8>,
    /// Capture timestamp, if the transport supplied one
    pub timestamp: Option<DateTime<Utc>>,
    /// 29-bit identifier
    pub is_extended: bool,
    /// FD framing (payload up to 64 bytes)
    pub is_fd: bool,
    /// Received or transmitted
    pub direction: Direction,
    /// Declared length, if the transport supplied one
    pub dlc: Option<u8>,
}

impl RawFrame {
    /// Create a received classic frame with no timestamp
    pub fn new(id: u32, data: impl Into<Vec<u8>>) -> Self {
        Self {
            id,
            data: data.into(),
            ..Default::default()
        }
    }

    /// Set the direction
    pub fn with_direction(mut self, direction: Direction) -> Self {
        self.direction = direction;
        self
    }

    /// Set the capture timestamp
    pub fn with_timestamp(mut self, timestamp: DateTime<Utc>) -> Self {
        self.timestamp = Some(timestamp);
        self
    }

    /// Mark the identifier as 29-bit
    pub fn extended(mut self) -> Self {
        self.is_extended = true;
        self
    }

    /// Mark the frame as FD
    pub fn fd(mut self) -> Self {
        self.is_fd = true;
        self
    }
}

/// A normalised frame ready for decoding, filtering and display
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Frame {
    /// Frame identifier
    pub id: u32,
    /// Payload bytes
    pub data: Vec<u8>,
    /// Capture timestamp
    pub timestamp: DateTime<Utc>,
    /// 29-bit identifier
    pub is_extended: bool,
    /// FD framing
    pub is_fd: bool,
    /// Received or transmitted
    pub direction: Direction,
    /// Decoded signals, when the catalog knows this id
    pub signals: Option<SignalMap>,
    /// Catalog message name, when the catalog knows this id
    pub message_name: Option<String>,
    /// Declared length
    pub dlc: u8,
    /// Occurrences of this id seen so far, including this one
    pub count: u64,
}

impl Frame {
    /// Normalise a raw frame, defaulting what is safe and rejecting the rest
    pub fn from_raw(raw: RawFrame) -> Result<Self> {
        let max_payload = if raw.is_fd {
            MAX_FD_PAYLOAD
        } else {
            MAX_CLASSIC_PAYLOAD
        };
        if raw.data.len() > max_payload {
            return Err(CanVisError::InvalidFrame(format!(
                "0x{:X}: payload of {} bytes exceeds {}",
                raw.id,
                raw.data.len(),
                max_payload
            )));
        }

        let max_id = if raw.is_extended {
            MAX_EXTENDED_ID
        } else {
            MAX_STANDARD_ID
        };
        if raw.id > max_id {
            return Err(CanVisError::InvalidFrame(format!(
                "identifier 0x{:X} out of range",
                raw.id
            )));
        }

        // A declared length may exceed the payload (remote frames) but not
        // the framing limit
        let dlc = raw.dlc.unwrap_or(raw.data.len() as u8);
        if dlc as usize > max_payload {
            return Err(CanVisError::InvalidFrame(format!(
                "0x{:X}: declared length {} exceeds {}",
                raw.id, dlc, max_payload
            )));
        }

        Ok(Self {
            id: raw.id,
            timestamp: raw.timestamp.unwrap_or_else(Utc::now),
            is_extended: raw.is_extended,
            is_fd: raw.is_fd,
            direction: raw.direction,
            signals: None,
            message_name: None,
            dlc,
            count: 1,
            data: raw.data,
        })
    }

    /// Payload as contiguous uppercase hex, e.g. `DEADBEEF`
    pub fn hex_data(&self) -> String {
        let mut out = String::with_capacity(self.data.len() * 2);
        for byte in &self.data {
            out.push_str(&format!("{:02X}", byte));
        }
        out
    }

    /// Identifier formatted for display, e.g. `0x1F0`
    pub fn id_label(&self) -> String {
        format!("0x{:X}", self.id)
    }

    /// Whether the decode step produced signals
    pub fn is_decoded(&self) -> bool {
        self.signals.is_some()
    }
}

/// Statistics snapshot from the ingestion pipeline
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct PipelineStats {
    /// Frames accepted since start
    pub total_received: u64,
    /// Rate over the last closed statistics window
    pub messages_per_second: f64,
    /// Frames that passed the filter
    pub filtered_count: u64,
    /// Percentage of decode attempts that yielded signals
    pub decode_success_rate: f64,
    /// Processing time accumulated over the last window in milliseconds
    pub processing_time_ms: f64,
    /// Frames currently retained
    pub buffer_len: usize,
    /// Events dropped because the display side did not keep up
    pub dropped_events: u64,
}

/// Snapshot of a periodic transmission
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TransmissionConfig {
    /// Message to transmit
    pub message_id: u32,
    /// Repeat interval in milliseconds
    pub interval_ms: u64,
    /// Whether ticks still act
    pub enabled: bool,
    /// When the transmission was armed
    pub start_time: DateTime<Utc>,
    /// Frames sent so far
    pub sent_count: u64,
}

/// An outgoing frame produced by the composer
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ComposedFrame {
    /// Message identifier
    pub id: u32,
    /// Encoded payload
    pub data: Vec<u8>,
    /// Payload length
    pub dlc: u8,
    /// Signal values the payload was encoded from
    pub signals: SignalMap,
}

impl ComposedFrame {
    /// Convert into a raw transmitted frame for the ingestion pipeline
    pub fn to_raw(&self) -> RawFrame {
        RawFrame {
            id: self.id,
            data: self.data.clone(),
            timestamp: Some(Utc::now()),
            is_extended: self.id > MAX_STANDARD_ID,
            is_fd: self.data.len() > MAX_CLASSIC_PAYLOAD,
            direction: Direction::Tx,
            dlc: Some(self.dlc),
        }
    }
}
