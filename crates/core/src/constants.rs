//! Constants used throughout the obs queue core crate.
//!
//! Payload keys are kept here so the handler, the tests and the documentation agree on the exact
//! strings the mobile client sends.

/// Discriminator carried by queue records this handler processes.
pub const OBS_UPDATE_DISCRIMINATOR: &str = "json-obs-update";

/// Top-level payload object holding every observation field.
pub const OBS_NAMESPACE: &str = "obs";

/// Key of the saved observation's external id.
pub const OBS_UUID_KEY: &str = "obs.uuid";

/// Key of the proposed observation date-time.
pub const OBS_DATE_TIME_KEY: &str = "obs.obs_date_time";

/// Key of the proposed observation value.
pub const OBS_VALUE_KEY: &str = "obs.obs_value";

/// Key of the observed concept's id.
pub const OBS_CONCEPT_ID_KEY: &str = "obs.concept_id";

/// Key of the flag confirming a date-time change.
pub const DATE_TIME_CONFIRMED_KEY: &str = "obs.value_date_time_change_validated";

/// Key of the flag confirming a value change.
pub const VALUE_CONFIRMED_KEY: &str = "obs.obs_value_change_validated";

/// Void reason used when a persistence call receives a voided record without one.
pub const DEFAULT_VOID_REASON: &str = "Superseded by queued obs update";
