//! Contracts for the lookup and persistence collaborators.
//!
//! The handler never reaches for a global service: both collaborators are passed in when it is
//! constructed. Implementations must be safe to share between worker threads.

use crate::constants::DEFAULT_VOID_REASON;
use crate::error::{LookupError, PersistenceError, PersistenceResult};
use crate::model::{ObsIdentity, ObservationRecord};

/// How strictly a lookup must match.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum MatchPolicy {
    /// Exactly one candidate, otherwise the match is ambiguous. Used by the update handler.
    ExactUnique,
    /// The most recent candidate wins.
    FirstMatch,
}

/// Result of matching an identity against saved observations.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum LookupOutcome {
    Unique(ObservationRecord),
    NoMatch,
    Ambiguous { candidates: usize },
}

/// Finds previously saved observations.
///
/// The matching algorithm belongs to the implementation.
pub trait ObsLookup: Send + Sync {
    fn find_unique_match(
        &self,
        identity: &ObsIdentity,
        policy: MatchPolicy,
    ) -> Result<LookupOutcome, LookupError>;
}

/// Writes observations.
pub trait ObsPersistence: Send + Sync {
    /// Insert a new record or update a live one. Voided records cannot be saved over.
    fn save(&self, record: &ObservationRecord) -> PersistenceResult<()>;

    /// Mark a saved record voided with `reason`.
    fn void(&self, record: &ObservationRecord, reason: &str) -> PersistenceResult<()>;

    /// Clear the voided flag. Only used to roll back a failed void-and-replace.
    fn unvoid(&self, record: &ObservationRecord) -> PersistenceResult<()>;

    fn delete(&self, record: &ObservationRecord) -> PersistenceResult<()>;

    /// Void `voided` and save `replacement` as one unit.
    ///
    /// `voided` is the tombstone produced by the merge step; its `void_reason` is passed to
    /// [`ObsPersistence::void`]. The default implementation voids first, then saves the
    /// replacement, and unvoids the original if the save fails. [`crate::ObsUpdateHandler`] holds
    /// its commit lock across the call, so resolutions made through the handler never see one
    /// write without the other. Backends that can hold their own lock or transaction across both
    /// writes should override this to protect readers outside the handler too.
    fn void_and_replace(
        &self,
        voided: &ObservationRecord,
        replacement: &ObservationRecord,
    ) -> PersistenceResult<()> {
        let reason = voided.void_reason.as_deref().unwrap_or(DEFAULT_VOID_REASON);
        self.void(voided, reason)?;

        let Err(save_error) = self.save(replacement) else {
            return Ok(());
        };

        let original = voided.external_id.to_string();
        match self.unvoid(voided) {
            Ok(()) => Err(PersistenceError::ReplacementFailed {
                original,
                source: Box::new(save_error),
            }),
            Err(rollback_error) => Err(PersistenceError::RollbackFailed {
                original,
                save_error: Box::new(save_error),
                rollback_error: Box::new(rollback_error),
            }),
        }
    }
}
