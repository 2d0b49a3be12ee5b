//! Process-wide store of the latest known location per driver.
//!
//! Every read returns an owned copy; no caller ever holds a reference
//! into the map.

use std::sync::Arc;

use dashmap::DashMap;
use tracking_core::{DriverId, DriverLocation};

/// Latest-known location per driver. Cloning yields another handle to
/// the same store.
#[derive(Debug, Clone, Default)]
pub struct LocationCache {
    entries: Arc<DashMap<DriverId, DriverLocation>>,
}

impl LocationCache {
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert or replace the record for `location.driver_id`.
    ///
    /// Last write wins in receipt order; timestamps are not compared.
    pub fn upsert(&self, location: DriverLocation) -> Option<DriverLocation> {
        self.entries.insert(location.driver_id, location)
    }

    /// Set presence on an existing record. Returns `false`, leaving the
    /// cache untouched, when there is no record to attach presence to.
    pub fn patch_presence(&self, driver_id: DriverId, is_online: bool) -> bool {
        match self.entries.get_mut(&driver_id) {
            Some(mut entry) => {
                let patched = entry.with_presence(is_online);
                *entry = patched;
                true
            }
            None => false,
        }
    }

    pub fn get(&self, driver_id: DriverId) -> Option<DriverLocation> {
        self.entries.get(&driver_id).map(|entry| entry.value().clone())
    }

    /// Snapshot of every record, order unspecified.
    pub fn all(&self) -> Vec<DriverLocation> {
        self.entries.iter().map(|entry| entry.value().clone()).collect()
    }

    pub fn is_online(&self, driver_id: DriverId) -> bool {
        self.entries.get(&driver_id).map_or(false, |entry| entry.is_online)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn clear(&self) {
        self.entries.clear();
    }
}
