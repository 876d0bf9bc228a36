//! Result of one exchange parse.

use serde::{Deserialize, Serialize};

use crate::types::FieldName;

use super::matcher::ExchangeError;

/// One template slot after matching.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ParsedField {
    /// Resolved field name; for a choice slot, the member that matched.
    pub name: FieldName,
    /// Template slot name (the `+`-joined group for choice slots).
    pub slot: FieldName,
    /// Canonical value, empty for an unfilled optional slot.
    pub value: String,
    /// Mult status of the resolved field.
    pub is_mult: bool,
}

/// Fully typed exchange, one field per template slot in template order.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ParsedExchange {
    fields: Vec<ParsedField>,
    replacement_call: Option<String>,
    valid: bool,
    received: Vec<String>,
}

impl ParsedExchange {
    pub(crate) fn new(
        fields: Vec<ParsedField>,
        replacement_call: Option<String>,
        valid: bool,
        received: Vec<String>,
    ) -> Self {
        Self {
            fields,
            replacement_call,
            valid,
            received,
        }
    }

    /// Fields in template order.
    pub fn fields(&self) -> &[ParsedField] {
        &self.fields
    }

    /// Callsign that should replace the one on screen.
    pub fn replacement_call(&self) -> Option<&str> {
        self.replacement_call.as_deref()
    }

    /// Whether every required slot was filled and no token was left over.
    pub fn is_valid(&self) -> bool {
        self.valid
    }

    /// Tokens as received, before any were removed.
    pub fn received(&self) -> &[String] {
        &self.received
    }

    /// Value of a field by resolved name or slot name.
    pub fn value(&self, name: &str) -> Option<&str> {
        self.fields
            .iter()
            .find(|f| f.name == name || f.slot == name)
            .map(|f| f.value.as_str())
    }

    /// Non-empty values of mult fields.
    pub fn mult_values(&self) -> impl Iterator<Item = &ParsedField> {
        self.fields
            .iter()
            .filter(|f| f.is_mult && !f.value.is_empty())
    }

    /// Converts an invalid parse into [`ExchangeError::Unparseable`].
    pub fn into_result(self) -> Result<Self, ExchangeError> {
        if self.valid {
            Ok(self)
        } else {
            Err(ExchangeError::Unparseable {
                exchange: self.received.join(" "),
            })
        }
    }
}
