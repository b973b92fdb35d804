//! Observation and queue record types.

use chrono::{DateTime, Utc};
use obsq_types::{ConceptId, NonEmptyText};
use serde::{Deserialize, Serialize};
use std::fmt;

/// A saved clinical observation.
///
/// Once `voided` is set the record is a tombstone kept for audit history. `concept_id` identifies
/// what was measured and never changes after creation.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ObservationRecord {
    pub external_id: NonEmptyText,
    pub date_time: DateTime<Utc>,
    pub value: String,
    pub concept_id: ConceptId,
    #[serde(default)]
    pub voided: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub void_reason: Option<String>,
    /// External id of the record this one replaced, if it was created by a void-and-replace.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub previous_version: Option<NonEmptyText>,
}

impl ObservationRecord {
    pub fn new(
        external_id: NonEmptyText,
        date_time: DateTime<Utc>,
        value: impl Into<String>,
        concept_id: ConceptId,
    ) -> Self {
        Self {
            external_id,
            date_time,
            value: value.into(),
            concept_id,
            voided: false,
            void_reason: None,
            previous_version: None,
        }
    }
}

/// A mutable observation field that an update may change.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum ObsField {
    DateTime,
    Value,
}

impl fmt::Display for ObsField {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ObsField::DateTime => f.write_str("obs date-time"),
            ObsField::Value => f.write_str("obs value"),
        }
    }
}

/// Natural-key fields used to find the saved observation an update refers to.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct ObsIdentity {
    pub external_id: Option<NonEmptyText>,
    pub date_time: Option<DateTime<Utc>>,
    pub value: Option<NonEmptyText>,
    pub concept_id: Option<ConceptId>,
}

impl ObsIdentity {
    /// An identity can be looked up by external id alone, or by concept and date-time together.
    pub fn is_resolvable(&self) -> bool {
        self.external_id.is_some() || (self.concept_id.is_some() && self.date_time.is_some())
    }
}

/// A record taken from the processing queue.
///
/// `payload` is the already-parsed JSON document. Queues that store the payload as text may pass
/// it as a JSON string; the handler parses it before extracting fields.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct QueueRecord {
    pub uuid: String,
    pub discriminator: String,
    pub payload: serde_json::Value,
}

impl QueueRecord {
    pub fn new(
        uuid: impl Into<String>,
        discriminator: impl Into<String>,
        payload: serde_json::Value,
    ) -> Self {
        Self {
            uuid: uuid.into(),
            discriminator: discriminator.into(),
            payload,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn identity_needs_id_or_concept_and_date() {
        let mut identity = ObsIdentity::default();
        assert!(!identity.is_resolvable());

        identity.concept_id = Some(ConceptId::new(5089).unwrap());
        assert!(!identity.is_resolvable());

        identity.date_time = Some(Utc.with_ymd_and_hms(2024, 1, 5, 10, 0, 0).unwrap());
        assert!(identity.is_resolvable());

        let by_id = ObsIdentity {
            external_id: NonEmptyText::non_blank("abc-1"),
            ..ObsIdentity::default()
        };
        assert!(by_id.is_resolvable());
    }

    #[test]
    fn record_round_trips_without_optional_audit_fields() {
        let record = ObservationRecord::new(
            NonEmptyText::new("abc-1").unwrap(),
            Utc.with_ymd_and_hms(2024, 1, 5, 10, 0, 0).unwrap(),
            "98",
            ConceptId::new(5089).unwrap(),
        );

        let json = serde_json::to_value(&record).unwrap();
        assert!(json.get("void_reason").is_none());
        assert!(json.get("previous_version").is_none());

        let back: ObservationRecord = serde_json::from_value(json).unwrap();
        assert_eq!(back, record);
    }
}
