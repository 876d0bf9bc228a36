//! Logged-value observations and their persistence wrappers.

use serde::{Deserialize, Serialize};

use crate::types::{FieldName, ObsSeq};

/// Version number for serialized [`ObservationEnvelope`] payloads.
pub const OBS_FORMAT_VERSION: u16 = 1;

/// Value seen in a logged QSO for one callsign and field.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct Observation {
    /// Normalized callsign.
    pub call: String,
    /// Field or choice-group name.
    pub field: FieldName,
    /// Canonical logged value.
    pub value: String,
}

impl Observation {
    /// Builds an observation; the callsign is normalized.
    pub fn new(call: impl AsRef<str>, field: impl Into<FieldName>, value: impl Into<String>) -> Self {
        Self {
            call: crate::types::Callsign::new(call).as_str().to_string(),
            field: field.into(),
            value: value.into(),
        }
    }
}

/// Journal row metadata plus observation payload.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StoredObservation {
    /// Monotonic journal sequence.
    pub seq: ObsSeq,
    /// Time logged in milliseconds.
    pub ts_ms: u64,
    /// Observation body.
    pub observation: Observation,
}

/// Versioned wrapper for stable on-disk payload decoding.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ObservationEnvelope {
    /// Payload format version.
    pub format_version: u16,
    /// Wrapped observation.
    pub stored: StoredObservation,
}

impl ObservationEnvelope {
    /// Constructs an envelope using [`OBS_FORMAT_VERSION`].
    pub fn new(stored: StoredObservation) -> Self {
        Self {
            format_version: OBS_FORMAT_VERSION,
            stored,
        }
    }
}

/// Observed cache entries as of `last_seq`.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CacheSnapshotV1 {
    /// Last journal sequence folded into this snapshot.
    pub last_seq: ObsSeq,
    /// Observed entries, sorted.
    pub observations: Vec<Observation>,
}
