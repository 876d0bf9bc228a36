//! Shared primitive IDs, callsigns, and contest-related enums.

use std::fmt;

use serde::{Deserialize, Serialize};

/// Exchange field name, e.g. `CQZONE` or `QTHX[HA]`.
pub type FieldName = String;

/// Monotonic journal sequence number.
pub type ObsSeq = u64;

/// Index of a [`crate::field::spec::FieldSpec`] inside its registry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct FieldId(pub(crate) usize);

impl FieldId {
    /// Raw registry index.
    pub fn index(self) -> usize {
        self.0
    }
}

/// Normalized (trimmed, uppercase) callsign.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct Callsign(String);

impl Callsign {
    /// Normalizes `value` into a callsign.
    pub fn new(value: impl AsRef<str>) -> Self {
        Self(value.as_ref().trim().to_ascii_uppercase())
    }

    /// Borrowed callsign text.
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Returns true when the text is empty after normalization.
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl fmt::Display for Callsign {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for Callsign {
    fn from(value: &str) -> Self {
        Self::new(value)
    }
}

/// Emission mode bucket.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Mode {
    /// Continuous Wave.
    CW,
    /// Single side-band phone.
    SSB,
    /// Any digital mode.
    Digital,
    /// Any non-standard mode.
    Other,
}

impl fmt::Display for Mode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let text = match self {
            Self::CW => "CW",
            Self::SSB => "SSB",
            Self::Digital => "DIGI",
            Self::Other => "OTHER",
        };
        f.write_str(text)
    }
}
