//! Failure accumulation for a single queued record.
//!
//! Every stage of the pipeline reports problems into one [`FailureCollector`] instead of returning
//! early, so a rejected record carries all of its problems at once. The collector is created per
//! call and never shared between records.

use crate::error::{ProcessingFailure, QueueProcessorError};

#[derive(Debug, Default)]
pub struct FailureCollector {
    failures: Vec<ProcessingFailure>,
}

impl FailureCollector {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn collect(&mut self, failure: impl Into<ProcessingFailure>) {
        self.failures.push(failure.into());
    }

    /// Keep the success value of `result`, or collect its error and return `None`.
    pub fn record<T, E>(&mut self, result: Result<T, E>) -> Option<T>
    where
        E: Into<ProcessingFailure>,
    {
        match result {
            Ok(value) => Some(value),
            Err(e) => {
                self.collect(e);
                None
            }
        }
    }

    pub fn has_failures(&self) -> bool {
        !self.failures.is_empty()
    }

    pub fn failures(&self) -> &[ProcessingFailure] {
        &self.failures
    }

    /// Turn the collected failures into the aggregate error. Only called once a failure has been
    /// collected.
    pub(crate) fn raise(self, queue_uuid: &str) -> QueueProcessorError {
        QueueProcessorError {
            queue_uuid: queue_uuid.to_owned(),
            failures: self.failures,
        }
    }

    /// `Ok(value)` when nothing was collected, otherwise the aggregate error.
    pub fn finish<T>(self, queue_uuid: &str, value: T) -> Result<T, QueueProcessorError> {
        if self.has_failures() {
            Err(self.raise(queue_uuid))
        } else {
            Ok(value)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::PayloadFormatError;
    use crate::model::ObsField;

    #[test]
    fn empty_collector_finishes_with_value() {
        let collector = FailureCollector::new();
        assert!(!collector.has_failures());
        assert_eq!(collector.finish("q-1", 42), Ok(42));
    }

    #[test]
    fn collects_every_failure_in_order() {
        let mut collector = FailureCollector::new();
        collector.collect(ProcessingFailure::UnconfirmedChange(ObsField::DateTime));
        collector.collect(ProcessingFailure::UnconfirmedChange(ObsField::Value));

        let err = collector.finish("q-2", ()).unwrap_err();
        assert_eq!(err.queue_uuid, "q-2");
        assert_eq!(
            err.failures,
            vec![
                ProcessingFailure::UnconfirmedChange(ObsField::DateTime),
                ProcessingFailure::UnconfirmedChange(ObsField::Value),
            ]
        );
    }

    #[test]
    fn record_folds_errors_and_passes_values_through() {
        let mut collector = FailureCollector::new();

        let ok: Result<u8, PayloadFormatError> = Ok(7);
        assert_eq!(collector.record(ok), Some(7));

        let bad: Result<u8, PayloadFormatError> = Err(PayloadFormatError {
            path: "$['obs']['obs.concept_id']".into(),
            expected: "an integer",
            found: "text \"x\"".into(),
        });
        assert_eq!(collector.record(bad), None);
        assert_eq!(collector.failures().len(), 1);
        assert!(matches!(
            collector.failures()[0],
            ProcessingFailure::PayloadFormat(_)
        ));
    }
}
