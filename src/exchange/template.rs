//! Ordered exchange templates and the provider interface.

use serde::{Deserialize, Serialize};

use crate::{
    config::ContestConfig,
    field::registry::{choice_members, is_choice_name},
    types::{FieldName, Mode},
};

/// One template slot: a field name or a `+`-joined choice group.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TemplateEntry {
    /// Field or choice-group name.
    pub name: FieldName,
    /// Whether the slot may stay empty in a valid exchange.
    pub optional: bool,
}

impl TemplateEntry {
    /// Required slot.
    pub fn required(name: impl Into<FieldName>) -> Self {
        Self {
            name: name.into(),
            optional: false,
        }
    }

    /// Optional slot.
    pub fn optional(name: impl Into<FieldName>) -> Self {
        Self {
            name: name.into(),
            optional: true,
        }
    }

    /// Returns true for choice-group slots.
    pub fn is_choice(&self) -> bool {
        is_choice_name(&self.name)
    }

    /// Underlying field names, in declaration order.
    pub fn members(&self) -> impl Iterator<Item = &str> {
        choice_members(&self.name)
    }
}

/// Ordered sequence of slots expected in a received exchange.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExchangeTemplate {
    entries: Vec<TemplateEntry>,
}

impl ExchangeTemplate {
    /// Creates a template from slots.
    pub fn new(entries: Vec<TemplateEntry>) -> Self {
        Self { entries }
    }

    /// Template whose slots are all required.
    pub fn required(names: &[&str]) -> Self {
        Self::new(names.iter().map(|n| TemplateEntry::required(*n)).collect())
    }

    /// Slots in order.
    pub fn entries(&self) -> &[TemplateEntry] {
        &self.entries
    }

    /// Number of slots.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Returns true when there are no slots.
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Number of non-optional slots.
    pub fn required_count(&self) -> usize {
        self.entries.iter().filter(|e| !e.optional).count()
    }
}

/// Supplies the template for a country/mode combination.
pub trait TemplateProvider: Send + Sync {
    /// Template for a station in `country` worked on `mode`.
    fn template(&self, country: &str, mode: Mode) -> Option<ExchangeTemplate>;
}

impl TemplateProvider for ContestConfig {
    fn template(&self, country: &str, mode: Mode) -> Option<ExchangeTemplate> {
        self.template_for(country, mode)
    }
}

/// Provider that returns the same template everywhere.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FixedTemplate(pub ExchangeTemplate);

impl TemplateProvider for FixedTemplate {
    fn template(&self, _country: &str, _mode: Mode) -> Option<ExchangeTemplate> {
        Some(self.0.clone())
    }
}
