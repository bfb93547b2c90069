//! Buffer of loaded compiled units.

use std::collections::{BTreeMap, BTreeSet};
use std::mem;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Mutex;

use formscope_common::UnitRecord;

use crate::bridge::lock;
use crate::bytecode::analyze_unit;
use crate::domain::UnitName;

/// Dotted unit name → record. Re-defining a unit replaces its record.
#[derive(Debug)]
pub struct UnitBridge {
    units: Mutex<BTreeMap<String, UnitRecord>>,
    enabled: AtomicBool,
}

impl Default for UnitBridge {
    fn default() -> Self {
        Self::new()
    }
}

impl UnitBridge {
    #[must_use]
    pub fn new() -> Self {
        Self { units: Mutex::new(BTreeMap::new()), enabled: AtomicBool::new(true) }
    }

    /// Analyze `bytes` and record the unit under its normalized name.
    ///
    /// The visitor runs before the buffer is locked. Returns the stored
    /// record, or `None` when the bridge is disabled or the name is empty.
    pub fn capture(&self, internal_name: &str, bytes: &[u8]) -> Option<UnitRecord> {
        if !self.is_enabled() || internal_name.is_empty() {
            return None;
        }
        let name = UnitName::new(internal_name).into_string();
        let mut metrics = analyze_unit(bytes);
        metrics.references.remove(&name);

        let record = UnitRecord::new(name.clone(), bytes.len(), metrics);
        lock(&self.units).insert(name, record.clone());
        Some(record)
    }

    /// Record for a unit, by dotted or internal name.
    pub fn get(&self, name: &str) -> Option<UnitRecord> {
        lock(&self.units).get(UnitName::new(name).as_str()).cloned()
    }

    /// Copy of every record, ordered by name.
    pub fn units(&self) -> Vec<UnitRecord> {
        lock(&self.units).values().cloned().collect()
    }

    /// Remove and return every record.
    pub fn drain(&self) -> Vec<UnitRecord> {
        let taken = mem::take(&mut *lock(&self.units));
        taken.into_values().collect()
    }

    /// Union of outgoing references across all recorded units.
    pub fn all_referenced_units(&self) -> BTreeSet<String> {
        lock(&self.units)
            .values()
            .flat_map(|record| record.references.iter().cloned())
            .collect()
    }

    pub fn total_byte_size(&self) -> usize {
        lock(&self.units).values().map(|record| record.byte_size).sum()
    }

    pub fn clear(&self) {
        lock(&self.units).clear();
    }

    pub fn len(&self) -> usize {
        lock(&self.units).len()
    }

    pub fn is_empty(&self) -> bool {
        lock(&self.units).is_empty()
    }

    pub fn set_enabled(&self, enabled: bool) {
        self.enabled.store(enabled, Ordering::Relaxed);
    }

    pub fn is_enabled(&self) -> bool {
        self.enabled.load(Ordering::Relaxed)
    }
}
