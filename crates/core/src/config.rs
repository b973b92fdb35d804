//! Core runtime configuration.
//!
//! Configuration is resolved once at process startup and passed into the handler. Parsing helpers
//! take the raw value as an argument so the core never reads process environment variables while
//! records are being processed.

use crate::error::ConfigError;
use std::fmt;
use std::str::FromStr;

/// What happens to the saved observation when an update is applied.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum DisposalStrategy {
    /// Overwrite the saved record's fields and save it again.
    UpdateInPlace,
    /// Void the saved record and save an updated copy that points back at it.
    #[default]
    VoidAndReplace,
}

impl DisposalStrategy {
    pub fn as_str(self) -> &'static str {
        match self {
            DisposalStrategy::UpdateInPlace => "update-in-place",
            DisposalStrategy::VoidAndReplace => "void-and-replace",
        }
    }
}

impl fmt::Display for DisposalStrategy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for DisposalStrategy {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().replace('_', "-").as_str() {
            "update-in-place" => Ok(DisposalStrategy::UpdateInPlace),
            "void-and-replace" => Ok(DisposalStrategy::VoidAndReplace),
            _ => Err(ConfigError::UnknownStrategy(s.to_owned())),
        }
    }
}

/// Core configuration resolved at startup.
#[derive(Clone, Debug, Default)]
pub struct CoreConfig {
    disposal_strategy: DisposalStrategy,
}

impl CoreConfig {
    pub fn new(disposal_strategy: DisposalStrategy) -> Self {
        Self { disposal_strategy }
    }

    pub fn disposal_strategy(&self) -> DisposalStrategy {
        self.disposal_strategy
    }
}

/// Parse the disposal strategy from an optional string value.
///
/// If `value` is `None` or empty/whitespace, returns the default (void-and-replace).
pub fn disposal_strategy_from_env_value(
    value: Option<String>,
) -> Result<DisposalStrategy, ConfigError> {
    let value = value
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty());
    let parsed = value.map(|v| v.parse::<DisposalStrategy>()).transpose()?;

    Ok(parsed.unwrap_or_default())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_strategy_is_void_and_replace() {
        assert_eq!(
            disposal_strategy_from_env_value(None).unwrap(),
            DisposalStrategy::VoidAndReplace
        );
        assert_eq!(
            disposal_strategy_from_env_value(Some("   ".into())).unwrap(),
            DisposalStrategy::VoidAndReplace
        );
        assert_eq!(
            CoreConfig::default().disposal_strategy(),
            DisposalStrategy::VoidAndReplace
        );
    }

    #[test]
    fn parses_strategy_names_loosely() {
        for raw in ["update-in-place", "UPDATE_IN_PLACE", " Update-In-Place "] {
            assert_eq!(
                disposal_strategy_from_env_value(Some(raw.into())).unwrap(),
                DisposalStrategy::UpdateInPlace,
                "{raw}"
            );
        }
        assert_eq!(
            "void_and_replace".parse::<DisposalStrategy>().unwrap(),
            DisposalStrategy::VoidAndReplace
        );
    }

    #[test]
    fn rejects_unknown_strategy() {
        assert_eq!(
            disposal_strategy_from_env_value(Some("delete".into())),
            Err(ConfigError::UnknownStrategy("delete".into()))
        );
    }

    #[test]
    fn display_round_trips() {
        for strategy in [
            DisposalStrategy::UpdateInPlace,
            DisposalStrategy::VoidAndReplace,
        ] {
            assert_eq!(strategy.to_string().parse::<DisposalStrategy>().unwrap(), strategy);
        }
    }
}
