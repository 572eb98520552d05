//! Validated identifier types shared across the clinic estimator crates.
//!
//! These wrappers guarantee their invariants once constructed, so the estimator and the API
//! layers never need to re-check a patient identifier or a diagnosis code.

use std::fmt;
use std::str::FromStr;

/// Errors that can occur when creating validated identifier types.
#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum TypesError {
    /// The patient identifier was zero or not a positive integer.
    #[error("patient id must be a positive integer, got '{0}'")]
    InvalidPatientId(String),
    /// The input text was empty or contained only whitespace.
    #[error("diagnosis code cannot be empty")]
    EmptyCode,
    /// The diagnosis code does not follow the ICD-10 shape (`A00` or `A00.0`).
    #[error("invalid ICD-10 code '{0}'")]
    InvalidCode(String),
}

/// Identifier of a patient in the appointment store.
///
/// Patient ids are positive integers assigned by the store. Zero is rejected so that a
/// defaulted numeric field can never be mistaken for a real patient.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, serde::Serialize)]
#[serde(transparent)]
pub struct PatientId(u64);

impl PatientId {
    /// Creates a new `PatientId`.
    ///
    /// # Errors
    ///
    /// Returns `TypesError::InvalidPatientId` if `value` is zero.
    pub fn new(value: u64) -> Result<Self, TypesError> {
        if value == 0 {
            return Err(TypesError::InvalidPatientId(value.to_string()));
        }
        Ok(Self(value))
    }

    /// Returns the raw numeric identifier.
    pub fn get(self) -> u64 {
        self.0
    }
}

impl fmt::Display for PatientId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl FromStr for PatientId {
    type Err = TypesError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let value = s
            .trim()
            .parse::<u64>()
            .map_err(|_| TypesError::InvalidPatientId(s.to_string()))?;
        Self::new(value)
    }
}

impl<'de> serde::Deserialize<'de> for PatientId {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: serde::Deserializer<'de>,
    {
        let value = u64::deserialize(deserializer)?;
        PatientId::new(value).map_err(serde::de::Error::custom)
    }
}

/// An ICD-10 (CID-10) diagnosis code such as `M79.3` or `S72`.
///
/// Input is trimmed and upper-cased. The accepted shape is one letter, two digits and an
/// optional dot followed by one or two alphanumeric characters.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct CidCode(String);

impl CidCode {
    /// Creates a new `CidCode` from the given input.
    ///
    /// # Errors
    ///
    /// Returns `TypesError::EmptyCode` for blank input and `TypesError::InvalidCode` when the
    /// input does not look like an ICD-10 code.
    pub fn new(input: impl AsRef<str>) -> Result<Self, TypesError> {
        let trimmed = input.as_ref().trim();
        if trimmed.is_empty() {
            return Err(TypesError::EmptyCode);
        }
        let code = trimmed.to_ascii_uppercase();
        if !Self::is_well_formed(&code) {
            return Err(TypesError::InvalidCode(trimmed.to_string()));
        }
        Ok(Self(code))
    }

    fn is_well_formed(code: &str) -> bool {
        let bytes = code.as_bytes();
        if bytes.len() < 3 {
            return false;
        }
        let head_ok = bytes[0].is_ascii_uppercase()
            && bytes[1].is_ascii_digit()
            && bytes[2].is_ascii_digit();
        if !head_ok {
            return false;
        }
        match &bytes[3..] {
            [] => true,
            [b'.', rest @ ..] => {
                (1..=2).contains(&rest.len()) && rest.iter().all(|b| b.is_ascii_alphanumeric())
            }
            _ => false,
        }
    }

    /// Returns the code as a string slice.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for CidCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl AsRef<str> for CidCode {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

impl FromStr for CidCode {
    type Err = TypesError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::new(s)
    }
}

impl serde::Serialize for CidCode {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: serde::Serializer,
    {
        serializer.serialize_str(&self.0)
    }
}

impl<'de> serde::Deserialize<'de> for CidCode {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: serde::Deserializer<'de>,
    {
        let s = String::deserialize(deserializer)?;
        CidCode::new(&s).map_err(serde::de::Error::custom)
    }
}
