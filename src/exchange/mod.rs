//! Received-exchange templates, matching, and results.

/// Token-to-field assignment.
pub mod matcher;
/// Parse result types.
pub mod parsed;
/// Templates and the template provider interface.
pub mod template;
