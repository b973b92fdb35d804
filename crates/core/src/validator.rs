//! Confirmation gate for proposed field changes.
//!
//! Any change to recorded clinical history needs an explicit confirmation flag sent alongside the
//! data. A change without one is not dropped silently: it is collected as a failure so the whole
//! record lands in manual review.

use crate::error::ProcessingFailure;
use crate::failure::FailureCollector;
use crate::model::{ObsField, ObservationRecord};
use crate::proposal::ProposedChange;
use chrono::{DateTime, Utc};
use obsq_types::NonEmptyText;

/// Field changes that passed the confirmation gate.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct ApprovedChanges {
    pub date_time: Option<DateTime<Utc>>,
    pub value: Option<NonEmptyText>,
}

impl ApprovedChanges {
    pub fn is_empty(&self) -> bool {
        self.date_time.is_none() && self.value.is_none()
    }

    pub fn fields(&self) -> Vec<ObsField> {
        let mut fields = Vec::new();
        if self.date_time.is_some() {
            fields.push(ObsField::DateTime);
        }
        if self.value.is_some() {
            fields.push(ObsField::Value);
        }
        fields
    }
}

pub struct ChangeValidator;

impl ChangeValidator {
    /// Visit every mutable field and sort each requested change into approved or failed.
    ///
    /// A field is skipped only when the proposal leaves it out. A present field needs its flag even
    /// when it repeats the saved value. The caller must discard the approved set if `failures` is
    /// non-empty afterwards.
    pub fn validate(
        proposal: &ProposedChange,
        resolved: &ObservationRecord,
        failures: &mut FailureCollector,
    ) -> ApprovedChanges {
        let date_time = gate(
            ObsField::DateTime,
            proposal.date_time,
            proposal.date_time_change_confirmed,
            failures,
        );
        let value = gate(
            ObsField::Value,
            proposal.value.clone(),
            proposal.value_change_confirmed,
            failures,
        );

        let changes = ApprovedChanges { date_time, value };
        tracing::debug!(
            "approved {:?} for obs {}",
            changes.fields(),
            resolved.external_id
        );
        changes
    }
}

fn gate<T>(
    field: ObsField,
    change: Option<T>,
    confirmed: bool,
    failures: &mut FailureCollector,
) -> Option<T> {
    let change = change?;
    if confirmed {
        Some(change)
    } else {
        failures.collect(ProcessingFailure::UnconfirmedChange(field));
        None
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
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

    #[test]
    fn absent_fields_are_skipped() {
        let mut failures = FailureCollector::new();

        let changes = ChangeValidator::validate(&ProposedChange::default(), &saved(), &mut failures);

        assert!(changes.is_empty());
        assert!(!failures.has_failures());
    }

    #[test]
    fn confirmed_changes_are_approved() {
        let proposal = ProposedChange {
            date_time: Some(later()),
            value: NonEmptyText::non_blank("120"),
            date_time_change_confirmed: true,
            value_change_confirmed: true,
            ..ProposedChange::default()
        };
        let mut failures = FailureCollector::new();

        let changes = ChangeValidator::validate(&proposal, &saved(), &mut failures);

        assert!(!failures.has_failures());
        assert_eq!(changes.date_time, Some(later()));
        assert_eq!(changes.value.map(NonEmptyText::into_inner), Some("120".into()));
    }

    #[test]
    fn unconfirmed_changes_fail_and_are_not_approved() {
        let proposal = ProposedChange {
            date_time: Some(later()),
            value: NonEmptyText::non_blank("120"),
            ..ProposedChange::default()
        };
        let mut failures = FailureCollector::new();

        let changes = ChangeValidator::validate(&proposal, &saved(), &mut failures);

        assert!(changes.is_empty());
        assert_eq!(
            failures.failures(),
            [
                ProcessingFailure::UnconfirmedChange(ObsField::DateTime),
                ProcessingFailure::UnconfirmedChange(ObsField::Value),
            ]
        );
    }

    #[test]
    fn every_field_is_visited_even_after_a_failure() {
        let proposal = ProposedChange {
            date_time: Some(later()),
            value: NonEmptyText::non_blank("120"),
            value_change_confirmed: true,
            ..ProposedChange::default()
        };
        let mut failures = FailureCollector::new();

        let changes = ChangeValidator::validate(&proposal, &saved(), &mut failures);

        assert_eq!(
            failures.failures(),
            [ProcessingFailure::UnconfirmedChange(ObsField::DateTime)]
        );
        assert_eq!(changes.fields(), [ObsField::Value]);
    }

    #[test]
    fn values_equal_to_saved_record_still_need_confirmation() {
        let proposal = ProposedChange {
            date_time: Some(saved().date_time),
            value: NonEmptyText::non_blank(" 98 "),
            ..ProposedChange::default()
        };
        let mut failures = FailureCollector::new();

        let changes = ChangeValidator::validate(&proposal, &saved(), &mut failures);

        assert!(changes.is_empty());
        assert_eq!(
            failures.failures(),
            [
                ProcessingFailure::UnconfirmedChange(ObsField::DateTime),
                ProcessingFailure::UnconfirmedChange(ObsField::Value),
            ]
        );
    }

    #[test]
    fn confirmed_values_equal_to_saved_record_are_approved() {
        let proposal = ProposedChange {
            date_time: Some(saved().date_time),
            value: NonEmptyText::non_blank("98"),
            date_time_change_confirmed: true,
            value_change_confirmed: true,
            ..ProposedChange::default()
        };
        let mut failures = FailureCollector::new();

        let changes = ChangeValidator::validate(&proposal, &saved(), &mut failures);

        assert!(!failures.has_failures());
        assert_eq!(changes.fields(), [ObsField::DateTime, ObsField::Value]);
    }
}
