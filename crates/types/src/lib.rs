//! Validated primitives shared by the observation queue crates.
//!
//! Queue payloads arrive from disconnected mobile clients, so every free-text field may be blank
//! and every numeric reference may be nonsense. The types here make "present and meaningful" a
//! property of the value rather than something each caller has to re-check.

use std::fmt;
use std::str::FromStr;

/// Errors that can occur when constructing validated primitives.
#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum TypesError {
    /// The input text was empty or whitespace only.
    #[error("text cannot be blank")]
    BlankText,
    /// A concept reference must be a positive integer.
    #[error("concept id must be a positive integer, got {0}")]
    InvalidConceptId(i64),
    /// A concept reference string did not parse as an integer.
    #[error("concept id is not an integer: {0:?}")]
    UnparseableConceptId(String),
}

/// Text guaranteed to contain at least one non-whitespace character.
///
/// Input is trimmed on construction, so `"  120 "` and `"120"` compare equal.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct NonEmptyText(String);

impl NonEmptyText {
    pub fn new(input: impl AsRef<str>) -> Result<Self, TypesError> {
        let trimmed = input.as_ref().trim();
        if trimmed.is_empty() {
            return Err(TypesError::BlankText);
        }
        Ok(Self(trimmed.to_owned()))
    }

    /// Like [`NonEmptyText::new`] but maps blank input to `None`.
    ///
    /// Clients send `""` for "no value", so blank text is treated the same as a missing field.
    pub fn non_blank(input: impl AsRef<str>) -> Option<Self> {
        Self::new(input).ok()
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn into_inner(self) -> String {
        self.0
    }
}

/// A hyphenated UUID is never blank, so this conversion cannot fail.
impl From<uuid::Uuid> for NonEmptyText {
    fn from(id: uuid::Uuid) -> Self {
        Self(id.hyphenated().to_string())
    }
}

impl fmt::Display for NonEmptyText {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl AsRef<str> for NonEmptyText {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

impl serde::Serialize for NonEmptyText {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: serde::Serializer,
    {
        serializer.serialize_str(&self.0)
    }
}

impl<'de> serde::Deserialize<'de> for NonEmptyText {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: serde::Deserializer<'de>,
    {
        let s = String::deserialize(deserializer)?;
        NonEmptyText::new(&s).map_err(serde::de::Error::custom)
    }
}

/// Reference to the controlled-vocabulary concept an observation measures.
///
/// Concept ids are database keys in the upstream dictionary and are always positive.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ConceptId(u32);

impl ConceptId {
    pub fn new(raw: i64) -> Result<Self, TypesError> {
        match u32::try_from(raw) {
            Ok(id) if id > 0 => Ok(Self(id)),
            _ => Err(TypesError::InvalidConceptId(raw)),
        }
    }

    pub fn get(self) -> u32 {
        self.0
    }
}

impl fmt::Display for ConceptId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl FromStr for ConceptId {
    type Err = TypesError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let raw: i64 = s
            .trim()
            .parse()
            .map_err(|_| TypesError::UnparseableConceptId(s.to_owned()))?;
        Self::new(raw)
    }
}

impl serde::Serialize for ConceptId {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: serde::Serializer,
    {
        serializer.serialize_u32(self.0)
    }
}

impl<'de> serde::Deserialize<'de> for ConceptId {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: serde::Deserializer<'de>,
    {
        let raw = i64::deserialize(deserializer)?;
        ConceptId::new(raw).map_err(serde::de::Error::custom)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn non_empty_text_trims_and_rejects_blank() {
        assert_eq!(NonEmptyText::new("  120 ").unwrap().as_str(), "120");
        assert_eq!(NonEmptyText::new(" \t\n"), Err(TypesError::BlankText));
        assert!(NonEmptyText::non_blank("").is_none());
    }

    #[test]
    fn non_empty_text_deserialize_rejects_blank() {
        let ok: NonEmptyText = serde_json::from_str("\"positive\"").unwrap();
        assert_eq!(ok.to_string(), "positive");

        let err = serde_json::from_str::<NonEmptyText>("\"   \"");
        assert!(err.is_err());
    }

    #[test]
    fn non_empty_text_from_uuid_is_hyphenated() {
        let id = uuid::Uuid::nil();
        assert_eq!(
            NonEmptyText::from(id).as_str(),
            "00000000-0000-0000-0000-000000000000"
        );
    }

    #[test]
    fn concept_id_must_be_positive() {
        assert_eq!(ConceptId::new(5089).unwrap().get(), 5089);
        assert_eq!(ConceptId::new(0), Err(TypesError::InvalidConceptId(0)));
        assert_eq!(ConceptId::new(-3), Err(TypesError::InvalidConceptId(-3)));
        assert!(ConceptId::new(i64::from(u32::MAX) + 1).is_err());
    }

    #[test]
    fn concept_id_parses_from_string() {
        assert_eq!("  5090 ".parse::<ConceptId>().unwrap().get(), 5090);
        assert!(matches!(
            "weight".parse::<ConceptId>(),
            Err(TypesError::UnparseableConceptId(_))
        ));
    }

    #[test]
    fn concept_id_serde_uses_plain_integer() {
        let id = ConceptId::new(1234).unwrap();
        assert_eq!(serde_json::to_string(&id).unwrap(), "1234");
        assert!(serde_json::from_str::<ConceptId>("-1").is_err());
    }
}
