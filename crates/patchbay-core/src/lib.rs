//! Preset storage for the patchbay controller
//!
//! This crate provides:
//! - The preset entity: a named routing configuration mapped onto one of the
//!   device's 32 banks
//! - A durable, crash-recoverable preset store (one record per preset,
//!   write-through on every mutation)
//! - The record-storage trait and its directory-backed implementation
//!
//! # Architecture
//!
//! ```text
//! host / CLI → PresetStore (in-memory map) → RecordStorage → {id}.yaml files
//! ```
//!
//! The in-memory map is the single source of truth while the process runs.
//! Every mutation persists its record first; a failed write fails the
//! operation and leaves the map untouched, so memory and disk stay in
//! agreement. Corrupt records found at startup are skipped with a warning
//! rather than aborting the load.

mod preset;
mod storage;
mod store;

pub use preset::{
    bank_in_range, NewPreset, Preset, PresetId, PresetPatch, PresetSummary, RoutingMatrix,
    BANK_MAX, BANK_MIN,
};
pub use storage::{default_presets_dir, DirectoryStorage, RecordStorage};
pub use store::{PresetStore, StoreError};
