//! Expected exchange values by callsign.

/// Memoizing guess cache.
pub mod cache;
/// Historical records and prefix zone lookups.
pub mod history;
/// Per-field prefill files.
pub mod prefill;
/// Hard-coded field extraction rules.
pub mod rules;
