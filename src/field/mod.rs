//! Exchange field grammars and the per-contest registry.

/// Cut-number normalization and callsign grammar.
pub mod cut;
/// Field registry and choice-group expansion.
pub mod registry;
/// Grammar source readers.
pub mod source;
/// Single-field validation and canonicalization.
pub mod spec;
