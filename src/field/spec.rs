//! Grammar and canonicalization table for one named exchange field.

use std::{
    borrow::Cow,
    collections::{BTreeMap, BTreeSet},
};

use hashbrown::HashMap;
use regex::Regex;
use tracing::debug;

use crate::types::FieldName;

use super::cut::normalize_cut_numbers;

/// Canonical value -> accepted spellings, plus the derived reverse index.
///
/// Every accepted value maps to exactly one canonical value, and every
/// canonical value is a member of its own class.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct EquivalenceTable {
    classes: BTreeMap<String, BTreeSet<String>>,
    value_to_canonical: HashMap<String, String>,
}

impl EquivalenceTable {
    /// Creates an empty table.
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns true when no value is accepted.
    pub fn is_empty(&self) -> bool {
        self.classes.is_empty()
    }

    /// Number of equivalence classes.
    pub fn len(&self) -> usize {
        self.classes.len()
    }

    /// Returns true when `value` belongs to any class.
    pub fn contains(&self, value: &str) -> bool {
        self.value_to_canonical.contains_key(value)
    }

    /// Canonical value of the class containing `value`.
    pub fn canonical_of(&self, value: &str) -> Option<&str> {
        self.value_to_canonical.get(value).map(String::as_str)
    }

    /// Canonical values in sorted order.
    pub fn canonical_values(&self) -> impl Iterator<Item = &str> {
        self.classes.keys().map(String::as_str)
    }

    /// Accepted spellings of the class whose canonical value is `canonical`.
    pub fn class_of(&self, canonical: &str) -> Option<&BTreeSet<String>> {
        self.classes.get(canonical)
    }

    /// Adds `value` as a singleton class. Returns false when `value` is
    /// already accepted (as a canonical value or as an alternative).
    pub fn add_canonical(&mut self, value: &str) -> bool {
        if value.is_empty() || self.value_to_canonical.contains_key(value) {
            return false;
        }
        self.classes
            .insert(value.to_string(), BTreeSet::from([value.to_string()]));
        self.value_to_canonical
            .insert(value.to_string(), value.to_string());
        true
    }

    /// Adds `alt` to the class of `canonical`, creating the class if needed.
    ///
    /// If `canonical` is itself an alternative of another class, `alt` joins
    /// that class. An `alt` already mapped elsewhere keeps its first mapping.
    /// Returns true when the table changed.
    pub fn add_legal(&mut self, canonical: &str, alt: &str) -> bool {
        if canonical.is_empty() {
            return false;
        }
        let created = self.add_canonical(canonical);
        let target = match self.value_to_canonical.get(canonical) {
            Some(c) => c.clone(),
            None => return created,
        };

        if alt.is_empty() {
            return created;
        }
        if let Some(existing) = self.value_to_canonical.get(alt) {
            if *existing != target {
                debug!(alt, existing = %existing, wanted = %target, "alternative already mapped");
            }
            return created;
        }

        self.classes
            .entry(target.clone())
            .or_default()
            .insert(alt.to_string());
        self.value_to_canonical.insert(alt.to_string(), target);
        true
    }
}

/// Validation and canonicalization contract for one exchange field.
///
/// A string matching `pattern` is legal and already canonical. Enumerated
/// values are checked independently of the pattern, so a field may carry a
/// regex for the general case plus a list of known exceptions. A field with
/// neither accepts nothing.
#[derive(Debug, Clone)]
pub struct FieldSpec {
    name: FieldName,
    is_mult: bool,
    numeric: bool,
    pattern: Option<Regex>,
    table: EquivalenceTable,
}

impl FieldSpec {
    /// Creates a field that accepts nothing.
    pub fn new(name: impl Into<FieldName>) -> Self {
        Self {
            name: name.into(),
            is_mult: false,
            numeric: false,
            pattern: None,
            table: EquivalenceTable::new(),
        }
    }

    /// Compiles `text` as a whole-token pattern.
    pub fn compile_pattern(text: &str) -> Result<Regex, regex::Error> {
        Regex::new(&format!("^(?:{})$", text.trim()))
    }

    /// Builder-style pattern setter.
    pub fn with_pattern(mut self, pattern: Regex) -> Self {
        self.pattern = Some(pattern);
        self
    }

    /// Builder-style enumerated table setter.
    pub fn with_table(mut self, table: EquivalenceTable) -> Self {
        self.table = table;
        self
    }

    /// Builder-style cut-number flag.
    pub fn with_numeric(mut self, numeric: bool) -> Self {
        self.numeric = numeric;
        self
    }

    /// Builder-style mult flag.
    pub fn with_mult(mut self, is_mult: bool) -> Self {
        self.is_mult = is_mult;
        self
    }

    /// Field name.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Whether values of this field currently count as multipliers.
    pub fn is_mult(&self) -> bool {
        self.is_mult
    }

    /// Changes the mult status.
    pub fn set_mult(&mut self, is_mult: bool) {
        self.is_mult = is_mult;
    }

    /// Whether tokens pass through cut-number normalization first.
    pub fn is_numeric(&self) -> bool {
        self.numeric
    }

    /// Regex grammar, if any.
    pub fn pattern(&self) -> Option<&Regex> {
        self.pattern.as_ref()
    }

    /// Replaces the regex grammar.
    pub fn set_pattern(&mut self, pattern: Option<Regex>) {
        self.pattern = pattern;
    }

    /// Enumerated equivalence classes.
    pub fn table(&self) -> &EquivalenceTable {
        &self.table
    }

    /// Returns true when the field has no grammar at all.
    pub fn accepts_nothing(&self) -> bool {
        self.pattern.is_none() && self.table.is_empty()
    }

    /// Returns true when `value` is a legal value of this field.
    ///
    /// Numeric fields also accept the cut-number form of a token that is not
    /// legal as sent.
    pub fn is_legal_value(&self, value: &str) -> bool {
        self.legal_as_sent(value)
            || self
                .cut_form(value)
                .is_some_and(|cut| self.legal_as_sent(&cut))
    }

    /// Canonical spelling of `value`, or `None` when it is not legal.
    pub fn canonical_value(&self, value: &str) -> Option<String> {
        self.canonical_as_sent(value)
            .or_else(|| self.cut_form(value).and_then(|cut| self.canonical_as_sent(&cut)))
    }

    /// Adds `value` as a new canonical value; no-op when already known.
    pub fn add_canonical_value(&mut self, value: &str) -> bool {
        self.table.add_canonical(value.trim())
    }

    /// Adds `alt` as an accepted spelling of `canonical`.
    pub fn add_legal_value(&mut self, canonical: &str, alt: &str) -> bool {
        self.table.add_legal(canonical.trim(), alt.trim())
    }

    /// Canonical enumerated values in sorted order.
    pub fn canonical_values(&self) -> Vec<String> {
        self.table.canonical_values().map(str::to_string).collect()
    }

    fn legal_as_sent(&self, value: &str) -> bool {
        self.pattern.as_ref().is_some_and(|re| re.is_match(value)) || self.table.contains(value)
    }

    fn canonical_as_sent(&self, value: &str) -> Option<String> {
        if let Some(canonical) = self.table.canonical_of(value) {
            return Some(canonical.to_string());
        }
        self.pattern
            .as_ref()
            .filter(|re| re.is_match(value))
            .map(|_| value.to_string())
    }

    // Only a token that actually changes under cut-number rewriting.
    fn cut_form(&self, value: &str) -> Option<String> {
        if !self.numeric {
            return None;
        }
        match normalize_cut_numbers(value) {
            Cow::Owned(cut) => Some(cut),
            Cow::Borrowed(_) => None,
        }
    }
}
