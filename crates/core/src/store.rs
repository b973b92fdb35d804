//! In-memory observation store.
//!
//! Implements both [`ObsLookup`] and [`ObsPersistence`] over a map guarded by one `RwLock`. The
//! store can be loaded from and written back to a JSON snapshot file:
//!
//! ```text
//! { "observations": [ { "external_id": "...", "date_time": "...", ... } ] }
//! ```
//!
//! Lookup matching:
//! 1. When the identity carries an external id, the live record with that id.
//! 2. Otherwise live records with the same concept and date-time, narrowed by value when the
//!    identity has one.
//!
//! Voided records never match.

use crate::constants::DEFAULT_VOID_REASON;
use crate::error::{LookupError, PersistenceError, PersistenceResult, StoreError, StoreResult};
use crate::model::{ObsIdentity, ObservationRecord};
use crate::services::{LookupOutcome, MatchPolicy, ObsLookup, ObsPersistence};
use obsq_types::NonEmptyText;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fs;
use std::path::Path;
use std::sync::{RwLock, RwLockReadGuard, RwLockWriteGuard};

type RecordMap = BTreeMap<NonEmptyText, ObservationRecord>;

#[derive(Debug, Default)]
pub struct InMemoryObsStore {
    records: RwLock<RecordMap>,
}

#[derive(Debug, Default, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
struct StoreSnapshot {
    #[serde(default)]
    observations: Vec<ObservationRecord>,
}

impl InMemoryObsStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Build a store from records, rejecting duplicate external ids.
    pub fn from_records(records: impl IntoIterator<Item = ObservationRecord>) -> StoreResult<Self> {
        let mut map = RecordMap::new();
        for record in records {
            let id = record.external_id.clone();
            if map.insert(id.clone(), record).is_some() {
                return Err(StoreError::DuplicateExternalId(id.into_inner()));
            }
        }
        Ok(Self {
            records: RwLock::new(map),
        })
    }

    /// Load a snapshot file. A missing file yields an empty store.
    pub fn load(path: &Path) -> StoreResult<Self> {
        if !path.exists() {
            tracing::debug!("no store snapshot at {}, starting empty", path.display());
            return Ok(Self::new());
        }

        let text = fs::read_to_string(path).map_err(StoreError::FileRead)?;
        let mut deserializer = serde_json::Deserializer::from_str(&text);
        let snapshot: StoreSnapshot = serde_path_to_error::deserialize(&mut deserializer)
            .map_err(|err| {
                let path = err.path().to_string();
                StoreError::Schema {
                    path: if path.is_empty() { "<root>".into() } else { path },
                    message: err.into_inner().to_string(),
                }
            })?;

        tracing::debug!(
            "loaded {} observations from {}",
            snapshot.observations.len(),
            path.display()
        );
        Self::from_records(snapshot.observations)
    }

    /// Write every record, voided ones included, to a snapshot file.
    pub fn persist(&self, path: &Path) -> StoreResult<()> {
        let snapshot = StoreSnapshot {
            observations: self.records()?,
        };
        let text = serde_json::to_string_pretty(&snapshot).map_err(StoreError::Serialization)?;
        fs::write(path, text).map_err(StoreError::FileWrite)
    }

    /// All records ordered by external id.
    pub fn records(&self) -> StoreResult<Vec<ObservationRecord>> {
        let records = self.records.read().map_err(|_| StoreError::Poisoned)?;
        Ok(records.values().cloned().collect())
    }

    pub fn get(&self, external_id: &str) -> Option<ObservationRecord> {
        let id = NonEmptyText::non_blank(external_id)?;
        let records = self.records.read().ok()?;
        records.get(&id).cloned()
    }

    fn read(&self) -> Result<RwLockReadGuard<'_, RecordMap>, LookupError> {
        self.records
            .read()
            .map_err(|_| LookupError::Backend("store lock poisoned".into()))
    }

    fn write(&self) -> PersistenceResult<RwLockWriteGuard<'_, RecordMap>> {
        self.records
            .write()
            .map_err(|_| PersistenceError::Backend("store lock poisoned".into()))
    }
}

fn candidates<'a>(records: &'a RecordMap, identity: &ObsIdentity) -> Vec<&'a ObservationRecord> {
    if let Some(id) = &identity.external_id {
        return records.get(id).filter(|r| !r.voided).into_iter().collect();
    }

    let (Some(concept_id), Some(date_time)) = (identity.concept_id, identity.date_time) else {
        return Vec::new();
    };

    records
        .values()
        .filter(|r| !r.voided && r.concept_id == concept_id && r.date_time == date_time)
        .filter(|r| {
            identity
                .value
                .as_ref()
                .map_or(true, |value| r.value.trim() == value.as_str())
        })
        .collect()
}

fn save_into(records: &mut RecordMap, record: &ObservationRecord) -> PersistenceResult<()> {
    if let Some(existing) = records.get(&record.external_id) {
        if existing.voided {
            return Err(PersistenceError::AlreadyVoided(record.external_id.to_string()));
        }
        if existing.concept_id != record.concept_id {
            return Err(PersistenceError::Conflict(record.external_id.to_string()));
        }
    }
    records.insert(record.external_id.clone(), record.clone());
    Ok(())
}

fn live_mut<'a>(
    records: &'a mut RecordMap,
    record: &ObservationRecord,
) -> PersistenceResult<&'a mut ObservationRecord> {
    let stored = records
        .get_mut(&record.external_id)
        .ok_or_else(|| PersistenceError::NotFound(record.external_id.to_string()))?;
    if stored.voided {
        return Err(PersistenceError::AlreadyVoided(record.external_id.to_string()));
    }
    Ok(stored)
}

impl ObsLookup for InMemoryObsStore {
    fn find_unique_match(
        &self,
        identity: &ObsIdentity,
        policy: MatchPolicy,
    ) -> Result<LookupOutcome, LookupError> {
        let records = self.read()?;
        let mut found = candidates(&records, identity);

        let outcome = match (found.len(), policy) {
            (0, _) => LookupOutcome::NoMatch,
            (1, _) => LookupOutcome::Unique(found[0].clone()),
            (n, MatchPolicy::ExactUnique) => LookupOutcome::Ambiguous { candidates: n },
            (_, MatchPolicy::FirstMatch) => {
                found.sort_by(|a, b| b.date_time.cmp(&a.date_time));
                LookupOutcome::Unique(found[0].clone())
            }
        };
        Ok(outcome)
    }
}

impl ObsPersistence for InMemoryObsStore {
    fn save(&self, record: &ObservationRecord) -> PersistenceResult<()> {
        save_into(&mut *self.write()?, record)
    }

    fn void(&self, record: &ObservationRecord, reason: &str) -> PersistenceResult<()> {
        let mut records = self.write()?;
        let stored = live_mut(&mut records, record)?;
        stored.voided = true;
        stored.void_reason = Some(reason.to_owned());
        Ok(())
    }

    fn unvoid(&self, record: &ObservationRecord) -> PersistenceResult<()> {
        let mut records = self.write()?;
        let stored = records
            .get_mut(&record.external_id)
            .ok_or_else(|| PersistenceError::NotFound(record.external_id.to_string()))?;
        stored.voided = false;
        stored.void_reason = None;
        Ok(())
    }

    fn delete(&self, record: &ObservationRecord) -> PersistenceResult<()> {
        self.write()?
            .remove(&record.external_id)
            .map(|_| ())
            .ok_or_else(|| PersistenceError::NotFound(record.external_id.to_string()))
    }

    /// Both writes happen under one write lock, so no lookup can observe the original voided
    /// without its replacement. Nothing is written unless both checks pass.
    fn void_and_replace(
        &self,
        voided: &ObservationRecord,
        replacement: &ObservationRecord,
    ) -> PersistenceResult<()> {
        let mut records = self.write()?;

        live_mut(&mut records, voided)?;
        if records.contains_key(&replacement.external_id) {
            return Err(PersistenceError::Conflict(
                replacement.external_id.to_string(),
            ));
        }

        let reason = voided
            .void_reason
            .clone()
            .unwrap_or_else(|| DEFAULT_VOID_REASON.to_owned());
        let stored = live_mut(&mut records, voided)?;
        stored.voided = true;
        stored.void_reason = Some(reason);
        records.insert(replacement.external_id.clone(), replacement.clone());
        Ok(())
    }
}
