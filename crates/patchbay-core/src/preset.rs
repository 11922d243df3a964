//! Preset entity: a named routing configuration mapped onto a device bank
//!
//! Presets are plain data; all validated mutation goes through the store so
//! the durable record and the in-memory map never disagree.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use uuid::Uuid;

/// Lowest bank number the device can recall
pub const BANK_MIN: u8 = 1;

/// Highest bank number the device can recall (the MB-76 stores 32)
pub const BANK_MAX: u8 = 32;

/// Check a bank number against the device's addressable range
pub fn bank_in_range(bank: u8) -> bool {
    (BANK_MIN..=BANK_MAX).contains(&bank)
}

/// Unique identifier for a preset
///
/// A random v4 UUID, assigned once at creation. Doubles as the durable
/// record name, so collision-free generation matters more than readability.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct PresetId(Uuid);

impl PresetId {
    /// Allocate a fresh id
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }

    /// Parse an id from its canonical hyphenated form (as used in record names)
    pub fn parse(s: &str) -> Result<Self, uuid::Error> {
        Uuid::parse_str(s).map(Self)
    }
}

impl Default for PresetId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for PresetId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Routing matrix: input id (string-encoded integer) -> outputs it feeds
///
/// Descriptive metadata only; nothing here is range-checked or transmitted
/// to the device by this crate.
pub type RoutingMatrix = BTreeMap<String, Vec<u32>>;

/// A named routing configuration and the bank it recalls
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Preset {
    /// Unique identifier, immutable once created
    pub id: PresetId,

    /// Display name (no uniqueness constraint)
    pub name: String,

    /// Device bank this preset recalls (1-32); several presets may share a bank
    pub bank_number: u8,

    /// Which outputs each input feeds
    #[serde(default)]
    pub routing_matrix: RoutingMatrix,

    /// Free-text description
    #[serde(default)]
    pub description: String,

    /// Set once at creation, never changed
    pub created_at: DateTime<Utc>,

    /// Refreshed on every mutation of name/bank/routing/description
    pub updated_at: DateTime<Utc>,
}

impl Preset {
    /// Number of distinct input keys in the routing matrix
    pub fn route_count(&self) -> usize {
        self.routing_matrix.len()
    }

    /// Outputs a given input feeds (empty slice if the input is unrouted)
    pub fn outputs_for(&self, input: u32) -> &[u32] {
        self.routing_matrix
            .get(&input.to_string())
            .map(Vec::as_slice)
            .unwrap_or(&[])
    }

    /// Build the compact listing view
    pub fn summary(&self) -> PresetSummary {
        PresetSummary {
            id: self.id,
            name: self.name.clone(),
            bank_number: self.bank_number,
            description: self.description.clone(),
            route_count: self.route_count(),
            updated_at: self.updated_at,
        }
    }
}

/// Field set for creating a preset; the store assigns id and timestamps
#[derive(Debug, Clone)]
pub struct NewPreset {
    pub name: String,
    pub bank_number: u8,
    pub routing_matrix: RoutingMatrix,
    pub description: String,
}

impl Default for NewPreset {
    fn default() -> Self {
        Self {
            name: "New Preset".to_string(),
            bank_number: BANK_MIN,
            routing_matrix: RoutingMatrix::new(),
            description: String::new(),
        }
    }
}

/// Partial update for a preset
///
/// Only supplied fields change; `None` leaves a field untouched. This is the
/// whole updatable surface: id and created_at have no patch field on purpose.
#[derive(Debug, Clone, Default)]
pub struct PresetPatch {
    pub name: Option<String>,
    pub bank_number: Option<u8>,
    pub routing_matrix: Option<RoutingMatrix>,
    pub description: Option<String>,
}

/// Compact listing view of a preset
#[derive(Debug, Clone, Serialize)]
pub struct PresetSummary {
    pub id: PresetId,
    pub name: String,
    pub bank_number: u8,
    pub description: String,
    pub route_count: usize,
    pub updated_at: DateTime<Utc>,
}
