//! Resolving a proposed change to the one saved observation it refers to.
//!
//! Resolution fails closed: no match, more than one match, or a voided match all stop processing.
//! Guessing the "most likely" record risks writing into the wrong patient's history.

use crate::error::ProcessingFailure;
use crate::model::ObservationRecord;
use crate::proposal::ProposedChange;
use crate::services::{LookupOutcome, MatchPolicy, ObsLookup};

pub struct Resolver<'a> {
    lookup: &'a dyn ObsLookup,
}

impl<'a> Resolver<'a> {
    pub fn new(lookup: &'a dyn ObsLookup) -> Self {
        Self { lookup }
    }

    pub fn resolve(&self, proposal: &ProposedChange) -> Result<ObservationRecord, ProcessingFailure> {
        let identity = proposal.identity();
        if !identity.is_resolvable() {
            return Err(ProcessingFailure::unmatched(
                "payload carries neither an obs uuid nor a concept id with an obs date-time",
            ));
        }

        match self
            .lookup
            .find_unique_match(&identity, MatchPolicy::ExactUnique)?
        {
            LookupOutcome::Unique(record) if record.voided => Err(ProcessingFailure::unmatched(
                format!("matched observation {} is voided", record.external_id),
            )),
            LookupOutcome::Unique(record) => {
                tracing::debug!("resolved obs update to saved obs {}", record.external_id);
                Ok(record)
            }
            LookupOutcome::NoMatch => Err(ProcessingFailure::unmatched("no saved observation matches")),
            LookupOutcome::Ambiguous { candidates } => Err(ProcessingFailure::unmatched(format!(
                "{candidates} saved observations match"
            ))),
        }
    }
}
