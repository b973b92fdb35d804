//! Applying approved changes and deciding what happens to the saved record.

use crate::config::DisposalStrategy;
use crate::constants::DEFAULT_VOID_REASON;
use crate::model::ObservationRecord;
use crate::validator::ApprovedChanges;
use obsq_types::NonEmptyText;
use uuid::Uuid;

/// What the persistence service must do for one applied update.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum PersistenceIntent {
    /// Save the updated record over the saved one.
    Save(ObservationRecord),
    /// Void `original` and save `replacement` as one unit.
    VoidAndReplace {
        original: ObservationRecord,
        replacement: ObservationRecord,
    },
}

#[derive(Clone, Copy, Debug)]
pub struct MergeEngine {
    strategy: DisposalStrategy,
}

impl MergeEngine {
    pub fn new(strategy: DisposalStrategy) -> Self {
        Self { strategy }
    }

    pub fn strategy(&self) -> DisposalStrategy {
        self.strategy
    }

    /// Build the persistence intent for `changes` applied to `resolved`.
    ///
    /// Returns `None` when no approved field differs from the saved record. The concept id is
    /// carried over untouched.
    pub fn apply(
        &self,
        resolved: &ObservationRecord,
        changes: &ApprovedChanges,
        queue_uuid: &str,
    ) -> Option<PersistenceIntent> {
        let date_time = changes.date_time.filter(|dt| *dt != resolved.date_time);
        let value = changes
            .value
            .as_ref()
            .filter(|v| v.as_str() != resolved.value.trim());
        if date_time.is_none() && value.is_none() {
            return None;
        }

        let mut updated = resolved.clone();
        if let Some(date_time) = date_time {
            updated.date_time = date_time;
        }
        if let Some(value) = value {
            updated.value = value.to_string();
        }

        let intent = match self.strategy {
            DisposalStrategy::UpdateInPlace => {
                updated.voided = false;
                PersistenceIntent::Save(updated)
            }
            DisposalStrategy::VoidAndReplace => {
                let mut original = resolved.clone();
                original.voided = true;
                original.void_reason = Some(format!("{DEFAULT_VOID_REASON} {queue_uuid}"));

                updated.external_id = NonEmptyText::from(Uuid::new_v4());
                updated.voided = false;
                updated.void_reason = None;
                updated.previous_version = Some(resolved.external_id.clone());

                PersistenceIntent::VoidAndReplace {
                    original,
                    replacement: updated,
                }
            }
        };

        tracing::debug!(
            "merged {:?} into obs {} using {}",
            changes.fields(),
            resolved.external_id,
            self.strategy
        );
        Some(intent)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{DateTime, TimeZone, Utc};
    use obsq_types::ConceptId;

    fn saved() -> ObservationRecord {
        ObservationRecord::new(
            NonEmptyText::new("abc-1").unwrap(),
            Utc.with_ymd_and_hms(2024, 1, 5, 10, 0, 0).unwrap(),
            "98",
            ConceptId::new(5089).unwrap(),
        )
    }

    fn later() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 1, 6, 9, 30, 0).unwrap()
    }

    fn value_change() -> ApprovedChanges {
        ApprovedChanges {
            date_time: None,
            value: NonEmptyText::non_blank("120"),
        }
    }

    #[test]
    fn nothing_to_apply_yields_no_intent() {
        let engine = MergeEngine::new(DisposalStrategy::VoidAndReplace);
        assert_eq!(engine.apply(&saved(), &ApprovedChanges::default(), "q-1"), None);
    }

    #[test]
    fn approved_values_matching_saved_record_yield_no_intent() {
        let engine = MergeEngine::new(DisposalStrategy::UpdateInPlace);
        let changes = ApprovedChanges {
            date_time: Some(saved().date_time),
            value: NonEmptyText::non_blank("98"),
        };

        assert_eq!(engine.apply(&saved(), &changes, "q-1"), None);
    }

    #[test]
    fn update_in_place_keeps_identity_and_concept() {
        let engine = MergeEngine::new(DisposalStrategy::UpdateInPlace);

        let intent = engine.apply(&saved(), &value_change(), "q-1").unwrap();

        let PersistenceIntent::Save(updated) = intent else {
            panic!("expected save intent");
        };
        assert_eq!(updated.external_id, saved().external_id);
        assert_eq!(updated.value, "120");
        assert_eq!(updated.date_time, saved().date_time);
        assert_eq!(updated.concept_id, saved().concept_id);
        assert!(!updated.voided);
    }

    #[test]
    fn void_and_replace_links_replacement_to_tombstone() {
        let engine = MergeEngine::new(DisposalStrategy::VoidAndReplace);
        let changes = ApprovedChanges {
            date_time: Some(later()),
            value: None,
        };

        let intent = engine.apply(&saved(), &changes, "q-7").unwrap();

        let PersistenceIntent::VoidAndReplace {
            original,
            replacement,
        } = intent
        else {
            panic!("expected void-and-replace intent");
        };

        assert!(original.voided);
        assert_eq!(original.external_id, saved().external_id);
        assert_eq!(original.date_time, saved().date_time);
        assert_eq!(
            original.void_reason.as_deref(),
            Some(format!("{DEFAULT_VOID_REASON} q-7").as_str())
        );

        assert!(!replacement.voided);
        assert_ne!(replacement.external_id, saved().external_id);
        assert_eq!(replacement.previous_version, Some(saved().external_id));
        assert_eq!(replacement.date_time, later());
        assert_eq!(replacement.value, "98");
        assert_eq!(replacement.concept_id, saved().concept_id);
    }
}
