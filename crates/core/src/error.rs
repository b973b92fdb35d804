use crate::model::ObsField;

/// A payload field was present but could not be read as the expected type.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("payload field {path} should be {expected}, found {found}")]
pub struct PayloadFormatError {
    pub path: String,
    pub expected: &'static str,
    pub found: String,
}

/// A field path expression could not be parsed.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("invalid field path {expr:?}: {reason}")]
pub struct PathError {
    pub expr: String,
    pub reason: &'static str,
}

/// Errors raised by a lookup backend while searching for saved observations.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum LookupError {
    #[error("lookup backend unavailable: {0}")]
    Backend(String),
}

/// Errors raised by a persistence backend.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum PersistenceError {
    #[error("observation {0} not found")]
    NotFound(String),
    #[error("observation {0} is voided and cannot be modified")]
    AlreadyVoided(String),
    #[error("observation {0} already exists")]
    Conflict(String),
    #[error("persistence backend error: {0}")]
    Backend(String),
    #[error("saving replacement for observation {original} failed; void was rolled back: {source}")]
    ReplacementFailed {
        original: String,
        #[source]
        source: Box<PersistenceError>,
    },
    #[error(
        "saving replacement for observation {original} failed and rollback also failed: save={save_error}; rollback={rollback_error}"
    )]
    RollbackFailed {
        original: String,
        #[source]
        save_error: Box<PersistenceError>,
        rollback_error: Box<PersistenceError>,
    },
}

pub type PersistenceResult<T> = std::result::Result<T, PersistenceError>;

/// One problem found while processing a single queued record.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ProcessingFailure {
    #[error(transparent)]
    PayloadFormat(#[from] PayloadFormatError),
    #[error("unable to uniquely identify obs for this observation update form data: {reason}")]
    AmbiguousOrMissingMatch { reason: String },
    #[error("change of {0} requires manual review")]
    UnconfirmedChange(ObsField),
    #[error("lookup failed: {0}")]
    Lookup(#[from] LookupError),
    #[error("persistence failed: {0}")]
    Persistence(#[from] PersistenceError),
    #[error("discriminator {found:?} is not handled by the obs update handler")]
    UnsupportedDiscriminator { found: String },
}

impl ProcessingFailure {
    pub(crate) fn unmatched(reason: impl Into<String>) -> Self {
        Self::AmbiguousOrMissingMatch {
            reason: reason.into(),
        }
    }
}

/// Every failure found while processing one queued record.
///
/// This is the only error `validate` and `process` return. The handler never returns one with an
/// empty failure list.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("queue record {queue_uuid} rejected: {}", join_messages(.failures))]
pub struct QueueProcessorError {
    pub queue_uuid: String,
    pub failures: Vec<ProcessingFailure>,
}

impl QueueProcessorError {
    pub(crate) fn single(queue_uuid: impl Into<String>, failure: ProcessingFailure) -> Self {
        Self {
            queue_uuid: queue_uuid.into(),
            failures: vec![failure],
        }
    }

    /// Failure messages in the order they were found, for attaching to an error queue entry.
    pub fn messages(&self) -> Vec<String> {
        self.failures.iter().map(ToString::to_string).collect()
    }

    /// True when the record can never succeed without a human editing it.
    ///
    /// Lookup and persistence failures come from the backends and may clear up on their own.
    pub fn requires_manual_review(&self) -> bool {
        self.failures.iter().any(|f| {
            !matches!(
                f,
                ProcessingFailure::Lookup(_) | ProcessingFailure::Persistence(_)
            )
        })
    }
}

fn join_messages(failures: &[ProcessingFailure]) -> String {
    failures
        .iter()
        .map(ToString::to_string)
        .collect::<Vec<_>>()
        .join("; ")
}

/// Errors produced while resolving configuration at startup.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ConfigError {
    #[error("unknown update strategy {0:?} (expected \"update-in-place\" or \"void-and-replace\")")]
    UnknownStrategy(String),
}

/// Errors produced while loading or saving an observation store snapshot.
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("failed to read store snapshot: {0}")]
    FileRead(std::io::Error),
    #[error("failed to write store snapshot: {0}")]
    FileWrite(std::io::Error),
    #[error("store snapshot schema mismatch at {path}: {message}")]
    Schema { path: String, message: String },
    #[error("failed to serialize store snapshot: {0}")]
    Serialization(serde_json::Error),
    #[error("duplicate observation external id {0} in snapshot")]
    DuplicateExternalId(String),
    #[error("store lock poisoned")]
    Poisoned,
}

pub type StoreResult<T> = std::result::Result<T, StoreError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn aggregate_display_lists_every_failure() {
        let err = QueueProcessorError {
            queue_uuid: "q-1".into(),
            failures: vec![
                ProcessingFailure::UnconfirmedChange(ObsField::DateTime),
                ProcessingFailure::UnconfirmedChange(ObsField::Value),
            ],
        };

        let text = err.to_string();
        assert!(text.starts_with("queue record q-1 rejected: "));
        assert!(text.contains("change of obs date-time requires manual review"));
        assert!(text.contains("change of obs value requires manual review"));
        assert_eq!(err.messages().len(), 2);
    }

    #[test]
    fn backend_only_failures_do_not_require_manual_review() {
        let transient = QueueProcessorError::single(
            "q-2",
            ProcessingFailure::Persistence(PersistenceError::Backend("disk full".into())),
        );
        assert!(!transient.requires_manual_review());

        let terminal = QueueProcessorError::single("q-3", ProcessingFailure::unmatched("no match"));
        assert!(terminal.requires_manual_review());
    }
}
