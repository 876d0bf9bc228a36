//! Runtime event stream payloads.

use crate::types::{FieldName, ObsSeq};

/// Events emitted from the single-writer runtime loop.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ExchangeEvent {
    /// An exchange was matched against its template.
    Parsed {
        /// Whether the parse is loggable.
        valid: bool,
    },
    /// Too few tokens for the template's required slots.
    FieldCountMismatch {
        /// Required slots.
        expected: usize,
        /// Exchange tokens supplied.
        found: usize,
    },
    /// Tokens were left over or a required slot stayed empty.
    Unparseable {
        /// Received text.
        exchange: String,
    },
    /// The operator corrected the callsign inside the exchange.
    ReplacementCall {
        /// Corrected callsign.
        call: String,
    },
    /// A field gained a canonical value.
    ValueLearned {
        /// Field name.
        field: FieldName,
        /// New canonical value.
        value: String,
    },
    /// A field's mult status changed.
    MultStatusChanged {
        /// Field name.
        field: FieldName,
        /// New status.
        is_mult: bool,
    },
    /// Persistence has reached at least this observation sequence.
    DurableUpTo {
        /// Highest sequence known durable.
        obs_seq: ObsSeq,
    },
}
