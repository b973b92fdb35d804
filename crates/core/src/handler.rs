//! Queue handler for `json-obs-update` records.
//!
//! Pipeline for one record:
//!
//! ```text
//! Received -> Extracted -> Resolved -> Validated -> Applied | Unchanged | Rejected
//! ```
//!
//! - `Resolved` is only reached with exactly one live saved observation.
//! - `Validated` visits every field and may still reject the record.
//! - A rejected record has made no persistence call. It is reported as one
//!   [`QueueProcessorError`] carrying every failure found, and is not worth retrying until a human
//!   has corrected it.
//!
//! The handler keeps no per-record state. Everything a single call needs lives in an
//! `UpdateContext` local to that call, so one handler can serve many worker threads.
//!
//! Clones of a handler share one commit lock. Resolution holds it shared and persistence holds it
//! exclusively, so a resolve running through the handler never observes a void-and-replace half
//! applied, even when the persistence backend performs the two writes separately.

use crate::config::CoreConfig;
use crate::constants::OBS_UPDATE_DISCRIMINATOR;
use crate::error::{ProcessingFailure, QueueProcessorError};
use crate::failure::FailureCollector;
use crate::merge::{MergeEngine, PersistenceIntent};
use crate::model::{ObservationRecord, QueueRecord};
use crate::payload;
use crate::proposal::ProposedChange;
use crate::resolver::Resolver;
use crate::services::{ObsLookup, ObsPersistence};
use crate::validator::{ApprovedChanges, ChangeValidator};
use obsq_types::NonEmptyText;
use std::sync::{Arc, PoisonError, RwLock};

/// A record that passed validation and is ready to merge.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ValidatedUpdate {
    pub queue_uuid: String,
    pub proposal: ProposedChange,
    pub resolved: ObservationRecord,
    pub changes: ApprovedChanges,
}

/// Successful result of [`ObsUpdateHandler::process`].
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum ProcessOutcome {
    /// The saved record was updated in place.
    Updated { external_id: NonEmptyText },
    /// The saved record was voided and a replacement saved.
    Replaced {
        voided: NonEmptyText,
        replacement: NonEmptyText,
    },
    /// The payload asked for no change; nothing was persisted.
    Unchanged { external_id: NonEmptyText },
}

/// State for one `validate`/`process` call.
struct UpdateContext<'r> {
    record: &'r QueueRecord,
    proposal: ProposedChange,
    resolved: Option<ObservationRecord>,
    failures: FailureCollector,
}

impl<'r> UpdateContext<'r> {
    fn new(record: &'r QueueRecord) -> Self {
        Self {
            record,
            proposal: ProposedChange::default(),
            resolved: None,
            failures: FailureCollector::new(),
        }
    }

    fn extract(&mut self, document: &serde_json::Value) {
        self.proposal = ProposedChange::from_payload(document, &mut self.failures);
    }

    fn resolve(&mut self, lookup: &dyn ObsLookup) -> Result<(), ProcessingFailure> {
        self.resolved = Some(Resolver::new(lookup).resolve(&self.proposal)?);
        Ok(())
    }

    /// Gate the proposal against the resolved record and close out the call.
    fn finish(mut self) -> Result<ValidatedUpdate, QueueProcessorError> {
        let Some(resolved) = self.resolved.take() else {
            return Err(self.reject(ProcessingFailure::unmatched("no saved observation resolved")));
        };
        let changes = ChangeValidator::validate(&self.proposal, &resolved, &mut self.failures);

        let queue_uuid = self.record.uuid.clone();
        self.failures.finish(
            &queue_uuid,
            ValidatedUpdate {
                queue_uuid: queue_uuid.clone(),
                proposal: self.proposal,
                resolved,
                changes,
            },
        )
    }

    fn reject(mut self, failure: ProcessingFailure) -> QueueProcessorError {
        self.failures.collect(failure);
        self.failures.raise(&self.record.uuid)
    }
}

#[derive(Clone)]
pub struct ObsUpdateHandler {
    merge: MergeEngine,
    lookup: Arc<dyn ObsLookup>,
    persistence: Arc<dyn ObsPersistence>,
    commit_lock: Arc<RwLock<()>>,
}

impl ObsUpdateHandler {
    pub fn new(
        cfg: &CoreConfig,
        lookup: Arc<dyn ObsLookup>,
        persistence: Arc<dyn ObsPersistence>,
    ) -> Self {
        Self {
            merge: MergeEngine::new(cfg.disposal_strategy()),
            lookup,
            persistence,
            commit_lock: Arc::new(RwLock::new(())),
        }
    }

    pub fn discriminator(&self) -> &'static str {
        OBS_UPDATE_DISCRIMINATOR
    }

    pub fn accept(&self, record: &QueueRecord) -> bool {
        record.discriminator == OBS_UPDATE_DISCRIMINATOR
    }

    /// Extract, resolve and validate a record without persisting anything.
    ///
    /// Calling this repeatedly on the same record gives the same result.
    pub fn validate(&self, record: &QueueRecord) -> Result<ValidatedUpdate, QueueProcessorError> {
        tracing::info!("Validating obs update form data: {}", record.uuid);
        self.validate_in(UpdateContext::new(record))
            .inspect_err(|e| tracing::warn!("{e}"))
    }

    fn validate_in(
        &self,
        mut ctx: UpdateContext<'_>,
    ) -> Result<ValidatedUpdate, QueueProcessorError> {
        let record = ctx.record;
        if !self.accept(record) {
            let found = record.discriminator.clone();
            return Err(ctx.reject(ProcessingFailure::UnsupportedDiscriminator { found }));
        }

        let document = match payload::document(&record.payload) {
            Ok(document) => document,
            Err(e) => return Err(ctx.reject(e.into())),
        };
        ctx.extract(&document);

        // The lock guards no data, so a poisoned lock is still usable.
        let resolution = {
            let _shared = self
                .commit_lock
                .read()
                .unwrap_or_else(PoisonError::into_inner);
            ctx.resolve(self.lookup.as_ref())
        };
        if let Err(failure) = resolution {
            return Err(ctx.reject(failure));
        }

        ctx.finish()
    }

    /// Validate a record and, if it passes, apply its changes.
    pub fn process(&self, record: &QueueRecord) -> Result<ProcessOutcome, QueueProcessorError> {
        tracing::info!("Processing obs update form data: {}", record.uuid);

        let validated = self
            .validate_in(UpdateContext::new(record))
            .inspect_err(|e| tracing::warn!("{e}"))?;

        let Some(intent) = self
            .merge
            .apply(&validated.resolved, &validated.changes, &record.uuid)
        else {
            tracing::info!(
                "obs update {} requests no change to obs {}",
                record.uuid,
                validated.resolved.external_id
            );
            return Ok(ProcessOutcome::Unchanged {
                external_id: validated.resolved.external_id,
            });
        };

        self.persist(intent).map_err(|failure| {
            tracing::error!("failed to persist obs update {}: {failure}", record.uuid);
            QueueProcessorError::single(&record.uuid, failure)
        })
    }

    fn persist(&self, intent: PersistenceIntent) -> Result<ProcessOutcome, ProcessingFailure> {
        let _exclusive = self
            .commit_lock
            .write()
            .unwrap_or_else(PoisonError::into_inner);

        match intent {
            PersistenceIntent::Save(updated) => {
                self.persistence.save(&updated)?;
                tracing::info!("updated obs {} in place", updated.external_id);
                Ok(ProcessOutcome::Updated {
                    external_id: updated.external_id,
                })
            }
            PersistenceIntent::VoidAndReplace {
                original,
                replacement,
            } => {
                self.persistence.void_and_replace(&original, &replacement)?;
                tracing::info!(
                    "voided obs {} and saved replacement {}",
                    original.external_id,
                    replacement.external_id
                );
                Ok(ProcessOutcome::Replaced {
                    voided: original.external_id,
                    replacement: replacement.external_id,
                })
            }
        }
    }
}
