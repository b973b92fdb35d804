//! # obsq core
//!
//! Reconciliation of queued observation updates from disconnected clients.
//!
//! A queued `json-obs-update` record proposes a new value and/or date-time for an observation the
//! client saw earlier. This crate:
//! - reads the proposal out of the JSON payload ([`payload`], [`proposal`])
//! - resolves it to exactly one saved observation ([`resolver`])
//! - gates each change on the client's confirmation flag ([`validator`])
//! - applies approved changes, voiding and replacing the saved record rather than overwriting it
//!   unless configured otherwise ([`merge`])
//! - reports every problem for a record as one [`QueueProcessorError`] ([`failure`])
//!
//! **No transport or queue concerns**: fetching records from a queue, retrying, and routing
//! rejected records to an error queue belong to the host. Saved observations are reached only
//! through the [`ObsLookup`] and [`ObsPersistence`] traits passed to [`ObsUpdateHandler::new`].

pub mod config;
pub mod constants;
pub mod error;
pub mod failure;
pub mod handler;
pub mod merge;
pub mod model;
pub mod payload;
pub mod proposal;
pub mod resolver;
pub mod services;
pub mod store;
pub mod validator;

pub use config::{disposal_strategy_from_env_value, CoreConfig, DisposalStrategy};
pub use error::{
    ConfigError, LookupError, PayloadFormatError, PersistenceError, ProcessingFailure,
    QueueProcessorError, StoreError,
};
pub use handler::{ObsUpdateHandler, ProcessOutcome, ValidatedUpdate};
pub use model::{ObsField, ObsIdentity, ObservationRecord, QueueRecord};
pub use services::{LookupOutcome, MatchPolicy, ObsLookup, ObsPersistence};
pub use store::InMemoryObsStore;

// Re-export the validated primitives used in public signatures.
pub use obsq_types::{ConceptId, NonEmptyText, TypesError};
