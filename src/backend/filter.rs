//! Frame filter criteria
//!
//! [`FilterCriteria`] is replaced wholesale on update and evaluated by the
//! ingestion worker both for new batches and for re-scans of the retained
//! buffer. Clauses are checked in a fixed order and short-circuit on the
//! first failure:
//!
//! 1. identifier range
//! 2. direction
//! 3. payload hex substring
//! 4. catalog message name substring
//! 5. decoded signal name substring
//!
//! Substring clauses are case-insensitive.

use crate::types::{Direction, Frame};
use serde::{Deserialize, Serialize};

/// Filter applied to decoded frames
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct FilterCriteria {
    /// Lowest accepted identifier
    pub id_min: Option<u32>,
    /// Highest accepted identifier
    pub id_max: Option<u32>,
    /// Accepted direction
    pub direction: Option<Direction>,
    /// Substring of the payload hex, e.g. `DEAD`
    pub data_pattern: Option<String>,
    /// Substring of the catalog message name
    pub message_pattern: Option<String>,
    /// Substring of any decoded signal name
    pub signal_pattern: Option<String>,
    /// When false every frame passes
    pub enabled: bool,
}

impl FilterCriteria {
    /// Criteria that let everything through
    pub fn disabled() -> Self {
        Self::default()
    }

    /// Enabled criteria with no clauses set
    pub fn enabled() -> Self {
        Self {
            enabled: true,
            ..Default::default()
        }
    }

    pub fn id_range(mut self, min: u32, max: u32) -> Self {
        self.id_min = Some(min);
        self.id_max = Some(max);
        self
    }

    pub fn direction(mut self, direction: Direction) -> Self {
        self.direction = Some(direction);
        self
    }

    pub fn data(mut self, pattern: impl Into<String>) -> Self {
        self.data_pattern = Some(pattern.into());
        self
    }

    pub fn message(mut self, pattern: impl Into<String>) -> Self {
        self.message_pattern = Some(pattern.into());
        self
    }

    pub fn signal(mut self, pattern: impl Into<String>) -> Self {
        self.signal_pattern = Some(pattern.into());
        self
    }

    /// Evaluate the predicate against a frame
    pub fn matches(&self, frame: &Frame) -> bool {
        if !self.enabled {
            return true;
        }

        if let Some(min) = self.id_min {
            if frame.id < min {
                return false;
            }
        }
        if let Some(max) = self.id_max {
            if frame.id > max {
                return false;
            }
        }

        if let Some(direction) = self.direction {
            if frame.direction != direction {
                return false;
            }
        }

        if let Some(pattern) = non_empty(&self.data_pattern) {
            let pattern: String = pattern
                .chars()
                .filter(|c| !c.is_whitespace())
                .collect::<String>()
                .to_ascii_uppercase();
            if !frame.hex_data().contains(&pattern) {
                return false;
            }
        }

        if let Some(pattern) = non_empty(&self.message_pattern) {
            let pattern = pattern.to_lowercase();
            match &frame.message_name {
                Some(name) if name.to_lowercase().contains(&pattern) => {}
                _ => return false,
            }
        }

        if let Some(pattern) = non_empty(&self.signal_pattern) {
            let pattern = pattern.to_lowercase();
            let hit = frame.signals.as_ref().is_some_and(|signals| {
                signals
                    .keys()
                    .any(|name| name.to_lowercase().contains(&pattern))
            });
            if !hit {
                return false;
            }
        }

        true
    }
}

fn non_empty(pattern: &Option<String>) -> Option<&str> {
    pattern.as_deref().filter(|p| !p.trim().is_empty())
}
