//! In-memory preset store with write-through persistence
//!
//! The store owns every preset for the lifetime of the process. Records are
//! loaded once at startup; every mutation persists its record before the
//! in-memory map changes, so memory and disk never disagree.

use std::collections::HashMap;

use chrono::Utc;

use crate::preset::{
    bank_in_range, NewPreset, Preset, PresetId, PresetPatch, PresetSummary, BANK_MAX, BANK_MIN,
};
use crate::storage::RecordStorage;

/// Error type for preset store operations
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("Bank number {0} out of range (1-32)")]
    InvalidBank(u8),

    #[error("Preset not found: {0}")]
    NotFound(PresetId),

    #[error("Record I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Record format error: {0}")]
    Format(#[from] serde_yaml::Error),
}

/// Durable, crash-recoverable preset store
///
/// The in-memory map is the single source of truth while the process runs;
/// the record storage keeps one durable record per preset id. Mutating
/// operations take `&mut self`, so a concurrent host wraps the store in a
/// single mutex.
pub struct PresetStore {
    /// Durable record backend
    storage: Box<dyn RecordStorage>,
    /// Process-wide preset cache, keyed by id
    presets: HashMap<PresetId, Preset>,
}

impl PresetStore {
    /// Load every record the storage holds.
    ///
    /// Records that fail to read or parse are skipped with a warning so one
    /// corrupt file cannot keep the remaining presets from loading. A storage
    /// backend that cannot list records at all is a hard error.
    pub fn open(storage: Box<dyn RecordStorage>) -> Result<Self, StoreError> {
        let mut presets = HashMap::new();

        for record_id in storage.list_ids()? {
            let bytes = match storage.read(&record_id) {
                Ok(bytes) => bytes,
                Err(e) => {
                    log::warn!("PresetStore: Skipping unreadable record '{}': {}", record_id, e);
                    continue;
                }
            };

            match serde_yaml::from_slice::<Preset>(&bytes) {
                Ok(preset) => {
                    if preset.id.to_string() != record_id {
                        log::warn!(
                            "PresetStore: Record '{}' carries id {}, keeping the embedded id",
                            record_id,
                            preset.id
                        );
                    }
                    presets.insert(preset.id, preset);
                }
                Err(e) => {
                    log::warn!("PresetStore: Skipping corrupt record '{}': {}", record_id, e);
                }
            }
        }

        log::info!("PresetStore: Loaded {} preset(s)", presets.len());
        Ok(Self { storage, presets })
    }

    /// Create a preset, persist its record, and return it.
    ///
    /// An out-of-range bank number is rejected before anything is written.
    pub fn create(&mut self, new: NewPreset) -> Result<Preset, StoreError> {
        if !bank_in_range(new.bank_number) {
            return Err(StoreError::InvalidBank(new.bank_number));
        }

        let now = Utc::now();
        let preset = Preset {
            id: PresetId::new(),
            name: new.name,
            bank_number: new.bank_number,
            routing_matrix: new.routing_matrix,
            description: new.description,
            created_at: now,
            updated_at: now,
        };

        self.persist(&preset)?;
        log::info!(
            "PresetStore: Created preset '{}' ({}) on bank {}",
            preset.name,
            preset.id,
            preset.bank_number
        );
        self.presets.insert(preset.id, preset.clone());
        Ok(preset)
    }

    /// Look up a preset by id (no I/O)
    pub fn get(&self, id: PresetId) -> Option<&Preset> {
        self.presets.get(&id)
    }

    /// First preset assigned to the given bank, `None` when the bank has no
    /// preset.
    ///
    /// Banks are not unique; with several candidates the lowest name wins so
    /// repeated lookups agree with `list()` order.
    pub fn get_by_bank(&self, bank: u8) -> Option<&Preset> {
        self.presets
            .values()
            .filter(|p| p.bank_number == bank)
            .min_by(|a, b| a.name.cmp(&b.name))
    }

    /// All presets, sorted by (bank_number, name) ascending
    pub fn list(&self) -> Vec<Preset> {
        let mut presets: Vec<Preset> = self.presets.values().cloned().collect();
        presets.sort_by(|a, b| {
            (a.bank_number, a.name.as_str()).cmp(&(b.bank_number, b.name.as_str()))
        });
        presets
    }

    /// Compact listing of every preset, same order as `list()`
    pub fn summary(&self) -> Vec<PresetSummary> {
        self.list().iter().map(Preset::summary).collect()
    }

    /// Apply a partial update and re-persist the record.
    ///
    /// Only supplied fields change. An out-of-range bank number fails the
    /// whole update with nothing mutated, in memory or on disk.
    pub fn update(&mut self, id: PresetId, patch: PresetPatch) -> Result<Preset, StoreError> {
        let mut preset = self
            .presets
            .get(&id)
            .cloned()
            .ok_or(StoreError::NotFound(id))?;

        if let Some(bank) = patch.bank_number {
            if !bank_in_range(bank) {
                return Err(StoreError::InvalidBank(bank));
            }
        }

        if let Some(name) = patch.name {
            preset.name = name;
        }
        if let Some(bank) = patch.bank_number {
            preset.bank_number = bank;
        }
        if let Some(matrix) = patch.routing_matrix {
            preset.routing_matrix = matrix;
        }
        if let Some(description) = patch.description {
            preset.description = description;
        }
        preset.updated_at = Utc::now();

        self.persist(&preset)?;
        self.presets.insert(id, preset.clone());
        Ok(preset)
    }

    /// Remove a preset and its durable record.
    ///
    /// An unknown id is a no-op returning `Ok(false)`, not an error. A record
    /// already missing from storage does not block deletion: the map entry is
    /// what the caller sees, so it must go regardless.
    pub fn delete(&mut self, id: PresetId) -> Result<bool, StoreError> {
        if !self.presets.contains_key(&id) {
            return Ok(false);
        }

        match self.storage.remove(&id.to_string()) {
            Ok(()) => {}
            Err(StoreError::Io(e)) if e.kind() == std::io::ErrorKind::NotFound => {
                log::warn!("PresetStore: Record for {} was already gone", id);
            }
            Err(e) => return Err(e),
        }
        self.presets.remove(&id);
        log::info!("PresetStore: Deleted preset {}", id);
        Ok(true)
    }

    /// Seed one default preset per device bank.
    ///
    /// Only acts on an empty store; an already-populated store is left alone
    /// and reports zero. Returns how many presets were created.
    pub fn create_defaults(&mut self) -> Result<usize, StoreError> {
        if !self.presets.is_empty() {
            return Ok(0);
        }

        for bank in BANK_MIN..=BANK_MAX {
            self.create(NewPreset {
                name: format!("Bank {}", bank),
                bank_number: bank,
                description: format!("Default preset for bank {}", bank),
                ..NewPreset::default()
            })?;
        }
        Ok(usize::from(BANK_MAX - BANK_MIN + 1))
    }

    /// Number of presets currently held
    pub fn len(&self) -> usize {
        self.presets.len()
    }

    /// True when the store holds no presets
    pub fn is_empty(&self) -> bool {
        self.presets.is_empty()
    }

    /// Serialize and write one record. The map is only touched after this
    /// succeeds, keeping memory and disk in agreement.
    fn persist(&mut self, preset: &Preset) -> Result<(), StoreError> {
        let yaml = serde_yaml::to_string(preset)?;
        self.storage.write(&preset.id.to_string(), yaml.as_bytes())
    }
}
