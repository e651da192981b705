//! Asset database
//!
//! Maps stable uids to asset locations and their metadata. Uids survive
//! re-registration: adding a known location again keeps its original uid so
//! references to it are not broken.

use crate::error::AssetError;
use crate::meta::AssetMeta;
use crate::writer::atomic_write_bincode;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::Path;
use uuid::Uuid;

/// One database row
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct DatabaseEntry {
    /// Key string of the asset
    pub location: String,
    /// Metadata of the asset
    pub meta: AssetMeta,
}

/// Persisted uid → location table
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct AssetDatabase {
    entries: BTreeMap<Uuid, DatabaseEntry>,
}

impl AssetDatabase {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register an asset
    ///
    /// A known location returns its existing uid. With `override_meta` the
    /// stored metadata is replaced, still under the original uid. A new
    /// location whose uid already belongs to another asset (a copied
    /// sidecar) gets a fresh uid; the returned uid is the one stored.
    pub fn add_asset(&mut self, location: &str, meta: &AssetMeta, override_meta: bool) -> Uuid {
        if let Some(existing) = self.get_uuid(location) {
            if override_meta {
                let mut meta = meta.clone();
                meta.uid = existing;
                self.entries.insert(
                    existing,
                    DatabaseEntry {
                        location: location.to_string(),
                        meta,
                    },
                );
            }
            return existing;
        }

        let mut meta = meta.clone();
        if let Some(other) = self.entries.get(&meta.uid) {
            let fresh = Uuid::new_v4();
            log::warn!(
                "Uid {} of {} is already used by {}, assigning {}",
                meta.uid,
                location,
                other.location,
                fresh
            );
            meta.uid = fresh;
        }

        log::trace!("add_asset - {} -> {}", meta.uid, location);
        let uid = meta.uid;
        self.entries.insert(
            uid,
            DatabaseEntry {
                location: location.to_string(),
                meta,
            },
        );
        uid
    }

    /// Uid registered for a location
    pub fn get_uuid(&self, location: &str) -> Option<Uuid> {
        self.entries
            .iter()
            .find(|(_, entry)| entry.location == location)
            .map(|(uid, _)| *uid)
    }

    /// Entry for a uid
    pub fn get_metadata(&self, uid: &Uuid) -> Option<&DatabaseEntry> {
        self.entries.get(uid)
    }

    /// Move an asset to a new location, keeping its uid
    pub fn rename_asset(&mut self, old_location: &str, new_location: &str) -> bool {
        match self.get_uuid(old_location) {
            Some(uid) => {
                if let Some(entry) = self.entries.get_mut(&uid) {
                    entry.location = new_location.to_string();
                }
                true
            }
            None => false,
        }
    }

    /// Remove the asset at a location
    pub fn remove_asset(&mut self, location: &str) -> Option<Uuid> {
        let uid = self.get_uuid(location)?;
        self.entries.remove(&uid);
        Some(uid)
    }

    /// Drop every entry
    pub fn remove_all(&mut self) {
        self.entries.clear();
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Iterate entries in uid order
    pub fn iter(&self) -> impl Iterator<Item = (&Uuid, &DatabaseEntry)> {
        self.entries.iter()
    }

    /// Copy of the entries whose location belongs to `root`
    pub fn filtered(&self, root: &str) -> AssetDatabase {
        let prefix = format!("{}:/", root);
        AssetDatabase {
            entries: self
                .entries
                .iter()
                .filter(|(_, e)| e.location.starts_with(&prefix))
                .map(|(k, v)| (*k, v.clone()))
                .collect(),
        }
    }

    /// Merge another database, its entries winning on uid clashes
    pub fn merge(&mut self, other: AssetDatabase) {
        self.entries.extend(other.entries);
    }

    /// Persist atomically as bincode
    pub fn save(&self, path: &Path) -> Result<(), AssetError> {
        atomic_write_bincode(path, self)?;
        log::info!("Saved asset database with {} entries to {}", self.len(), path.display());
        Ok(())
    }

    /// Load a database written by [`save`](Self::save)
    pub fn load(path: &Path) -> Result<Self, AssetError> {
        let bytes = std::fs::read(path)?;
        Ok(bincode::deserialize(&bytes)?)
    }
}
