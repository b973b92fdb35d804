//! Building the proposed change out of a queue payload.

use crate::constants::{
    DATE_TIME_CONFIRMED_KEY, OBS_CONCEPT_ID_KEY, OBS_DATE_TIME_KEY, OBS_UUID_KEY, OBS_VALUE_KEY,
    VALUE_CONFIRMED_KEY,
};
use crate::error::PayloadFormatError;
use crate::failure::FailureCollector;
use crate::model::ObsIdentity;
use crate::payload::{extract, FieldPath};
use chrono::{DateTime, Utc};
use obsq_types::{ConceptId, NonEmptyText};
use serde_json::Value;

/// The observation fields a client wants to change, plus its confirmation of each change.
///
/// Built once per processing attempt from the payload and discarded afterwards. The identity
/// fields double as the proposed new values: a present `date_time` or `value` is both a lookup
/// hint and a requested change.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct ProposedChange {
    pub external_id: Option<NonEmptyText>,
    pub date_time: Option<DateTime<Utc>>,
    pub value: Option<NonEmptyText>,
    pub concept_id: Option<ConceptId>,
    pub date_time_change_confirmed: bool,
    pub value_change_confirmed: bool,
}

impl ProposedChange {
    /// Extract every field from `payload`.
    ///
    /// Each field is read independently. A malformed field is collected as a format failure and
    /// left unset, so the remaining fields still build. An absent confirmation flag means the
    /// change is not confirmed.
    pub fn from_payload(payload: &Value, failures: &mut FailureCollector) -> Self {
        let external_id = read(payload, OBS_UUID_KEY, failures);
        let date_time = read(payload, OBS_DATE_TIME_KEY, failures);
        let value = read(payload, OBS_VALUE_KEY, failures);
        let concept_id = read::<i64>(payload, OBS_CONCEPT_ID_KEY, failures)
            .and_then(|raw| failures.record(concept_id(raw)));
        let date_time_change_confirmed =
            read(payload, DATE_TIME_CONFIRMED_KEY, failures).unwrap_or(false);
        let value_change_confirmed = read(payload, VALUE_CONFIRMED_KEY, failures).unwrap_or(false);

        Self {
            external_id,
            date_time,
            value,
            concept_id,
            date_time_change_confirmed,
            value_change_confirmed,
        }
    }

    /// The natural-key fields handed to the lookup service.
    pub fn identity(&self) -> ObsIdentity {
        ObsIdentity {
            external_id: self.external_id.clone(),
            date_time: self.date_time,
            value: self.value.clone(),
            concept_id: self.concept_id,
        }
    }
}

fn read<T: crate::payload::PayloadField>(
    payload: &Value,
    key: &str,
    failures: &mut FailureCollector,
) -> Option<T> {
    failures
        .record(extract::<T>(payload, &FieldPath::obs(key)))
        .flatten()
}

fn concept_id(raw: i64) -> Result<ConceptId, PayloadFormatError> {
    ConceptId::new(raw).map_err(|_| PayloadFormatError {
        path: FieldPath::obs(OBS_CONCEPT_ID_KEY).to_string(),
        expected: "a positive concept id",
        found: format!("number {raw}"),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ProcessingFailure;
    use chrono::TimeZone;
    use serde_json::json;

    #[test]
    fn builds_every_field_from_payload() {
        let payload = json!({
            "obs": {
                "obs.uuid": "abc-1",
                "obs.obs_date_time": "2024-01-05T10:00Z",
                "obs.obs_value": "120",
                "obs.concept_id": 5089,
                "obs.value_date_time_change_validated": false,
                "obs.obs_value_change_validated": true
            }
        });
        let mut failures = FailureCollector::new();

        let proposal = ProposedChange::from_payload(&payload, &mut failures);

        assert!(!failures.has_failures());
        assert_eq!(proposal.external_id.as_ref().map(|t| t.as_str()), Some("abc-1"));
        assert_eq!(
            proposal.date_time,
            Some(Utc.with_ymd_and_hms(2024, 1, 5, 10, 0, 0).unwrap())
        );
        assert_eq!(proposal.value.as_ref().map(|t| t.as_str()), Some("120"));
        assert_eq!(proposal.concept_id.map(ConceptId::get), Some(5089));
        assert!(!proposal.date_time_change_confirmed);
        assert!(proposal.value_change_confirmed);
    }

    #[test]
    fn missing_flags_mean_unconfirmed() {
        let payload = json!({"obs": {"obs.uuid": "abc-1"}});
        let mut failures = FailureCollector::new();

        let proposal = ProposedChange::from_payload(&payload, &mut failures);

        assert!(!failures.has_failures());
        assert!(!proposal.date_time_change_confirmed);
        assert!(!proposal.value_change_confirmed);
        assert_eq!(proposal.date_time, None);
        assert_eq!(proposal.value, None);
    }

    #[test]
    fn malformed_fields_are_collected_and_others_still_build() {
        let payload = json!({
            "obs": {
                "obs.uuid": "abc-1",
                "obs.obs_date_time": "next tuesday",
                "obs.concept_id": -4,
                "obs.obs_value": "98"
            }
        });
        let mut failures = FailureCollector::new();

        let proposal = ProposedChange::from_payload(&payload, &mut failures);

        assert_eq!(failures.failures().len(), 2);
        assert!(failures
            .failures()
            .iter()
            .all(|f| matches!(f, ProcessingFailure::PayloadFormat(_))));
        assert_eq!(proposal.date_time, None);
        assert_eq!(proposal.concept_id, None);
        assert_eq!(proposal.value.as_ref().map(|t| t.as_str()), Some("98"));
        assert!(proposal.identity().is_resolvable());
    }
}
