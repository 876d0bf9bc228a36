//! Token-to-field assignment for received exchanges.
//!
//! Tokens are matched against template slots by legality alone, so field
//! order in the received text does not matter. Assignment runs constraint
//! propagation to a fixpoint and, when that stalls, assigns the earliest
//! unresolved token to its first candidate slot in template order. A single
//! callsign-shaped leftover token is taken as a corrected callsign.

use std::collections::BTreeSet;

use tracing::{debug, warn};

use crate::field::{
    cut::looks_like_callsign,
    registry::{FieldKind, FieldSpecRegistry},
    spec::FieldSpec,
};

use super::{
    parsed::{ParsedExchange, ParsedField},
    template::ExchangeTemplate,
};

/// Failure surfaced to the operator for one parse attempt.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ExchangeError {
    /// Fewer exchange tokens than required slots.
    #[error("expected {expected} exchange fields, found {found}")]
    FieldCountMismatch {
        /// Required slots in the template.
        expected: usize,
        /// Tokens left after removing an explicit replacement call.
        found: usize,
    },

    /// Tokens could not be assigned to the template.
    #[error("unable to parse exchange: {exchange}")]
    Unparseable {
        /// Received text.
        exchange: String,
    },
}

/// Assigns received tokens to the slots of an [`ExchangeTemplate`].
#[derive(Debug, Clone, Copy)]
pub struct ExchangeMatcher<'a> {
    registry: &'a FieldSpecRegistry,
}

impl<'a> ExchangeMatcher<'a> {
    /// Creates a matcher over `registry`.
    pub fn new(registry: &'a FieldSpecRegistry) -> Self {
        Self { registry }
    }

    /// Splits `text` on whitespace, uppercases it, and parses the tokens.
    pub fn parse(
        &self,
        text: &str,
        template: &ExchangeTemplate,
    ) -> Result<ParsedExchange, ExchangeError> {
        let tokens: Vec<String> = text
            .split_whitespace()
            .map(str::to_ascii_uppercase)
            .collect();
        self.parse_tokens(&tokens, template)
    }

    /// Parses tokens in received order.
    ///
    /// Returns [`ExchangeError::FieldCountMismatch`] before any assignment
    /// when there are fewer exchange tokens than required slots. Otherwise
    /// the result carries `is_valid() == false` when assignment fails.
    pub fn parse_tokens<S: AsRef<str>>(
        &self,
        tokens: &[S],
        template: &ExchangeTemplate,
    ) -> Result<ParsedExchange, ExchangeError> {
        let received: Vec<String> = tokens.iter().map(|t| t.as_ref().to_string()).collect();

        let mut replacement_call = None;
        let mut exchange_tokens: Vec<&str> = Vec::with_capacity(tokens.len());
        for token in &received {
            if token.contains('.') {
                let call = token.replace('.', "");
                if replacement_call.is_none() && !call.is_empty() {
                    debug!(call = %call, "explicit replacement call");
                    replacement_call = Some(call);
                }
            } else {
                exchange_tokens.push(token.as_str());
            }
        }

        let expected = template.required_count();
        if exchange_tokens.len() < expected {
            return Err(ExchangeError::FieldCountMismatch {
                expected,
                found: exchange_tokens.len(),
            });
        }

        let slots: Vec<Option<FieldKind<'_>>> = template
            .entries()
            .iter()
            .map(|entry| {
                let kind = self.registry.kind(&entry.name);
                if kind.is_none() {
                    warn!(field = %entry.name, "template field has no spec");
                }
                kind
            })
            .collect();

        let candidates: Vec<BTreeSet<usize>> = exchange_tokens
            .iter()
            .map(|token| {
                slots
                    .iter()
                    .enumerate()
                    .filter(|(_, kind)| kind.is_some_and(|k| self.is_legal(k, token)))
                    .map(|(idx, _)| idx)
                    .collect::<BTreeSet<usize>>()
            })
            .collect();

        let mut assignment = Assignment::new(candidates, slots.len());
        assignment.solve();

        let mut leftovers = assignment.unassigned_tokens();
        if leftovers.len() == 1 && replacement_call.is_none() {
            let token = exchange_tokens[leftovers[0]];
            if looks_like_callsign(token) {
                debug!(call = token, "leftover token taken as replacement call");
                replacement_call = Some(token.to_string());
                leftovers.clear();
            }
        }

        let mut all_required_filled = true;
        let fields = template
            .entries()
            .iter()
            .zip(&slots)
            .enumerate()
            .map(|(slot_idx, (entry, kind))| {
                let token = assignment.slot_token[slot_idx].map(|t| exchange_tokens[t]);
                let resolved = match (kind, token) {
                    (Some(kind), Some(token)) => self.resolve(*kind, token),
                    _ => None,
                };

                match (resolved, token) {
                    (Some(spec), Some(token)) => ParsedField {
                        name: spec.name().to_string(),
                        slot: entry.name.clone(),
                        value: spec
                            .canonical_value(token)
                            .unwrap_or_else(|| token.to_string()),
                        is_mult: spec.is_mult(),
                    },
                    _ => {
                        if !entry.optional {
                            all_required_filled = false;
                        }
                        ParsedField {
                            name: entry.name.clone(),
                            slot: entry.name.clone(),
                            value: String::new(),
                            is_mult: self.registry.is_mult(&entry.name),
                        }
                    }
                }
            })
            .collect();

        let valid = all_required_filled && leftovers.is_empty();
        if !valid {
            debug!(
                leftovers = leftovers.len(),
                all_required_filled, "exchange did not parse"
            );
        }

        Ok(ParsedExchange::new(fields, replacement_call, valid, received))
    }

    fn is_legal(&self, kind: FieldKind<'_>, token: &str) -> bool {
        match kind {
            FieldKind::Single(id) => self.registry.get(id).is_legal_value(token),
            FieldKind::Choice(ids) => ids
                .iter()
                .any(|id| self.registry.get(*id).is_legal_value(token)),
        }
    }

    fn resolve(
        &self,
        kind: FieldKind<'_>,
        token: &str,
    ) -> Option<&'a FieldSpec> {
        let registry = self.registry;
        match kind {
            FieldKind::Single(id) => Some(registry.get(id)),
            FieldKind::Choice(ids) => ids
                .iter()
                .map(|id| registry.get(*id))
                .find(|spec| spec.is_legal_value(token)),
        }
    }
}

/// Working state of one assignment run, indexed by token position and slot.
#[derive(Debug)]
struct Assignment {
    candidates: Vec<BTreeSet<usize>>,
    token_slot: Vec<Option<usize>>,
    slot_token: Vec<Option<usize>>,
}

impl Assignment {
    fn new(candidates: Vec<BTreeSet<usize>>, slot_count: usize) -> Self {
        let token_count = candidates.len();
        Self {
            candidates,
            token_slot: vec![None; token_count],
            slot_token: vec![None; slot_count],
        }
    }

    fn solve(&mut self) {
        loop {
            self.propagate();

            let next = (0..self.candidates.len())
                .find(|&t| self.token_slot[t].is_none() && !self.candidates[t].is_empty());
            let Some(token) = next else {
                break;
            };
            let Some(&slot) = self.candidates[token].first() else {
                break;
            };
            debug!(token, slot, "disambiguated by template order");
            self.assign(token, slot);
        }
    }

    fn propagate(&mut self) {
        loop {
            let mut changed = false;
            for token in 0..self.candidates.len() {
                if self.token_slot[token].is_some() || self.candidates[token].len() != 1 {
                    continue;
                }
                if let Some(&slot) = self.candidates[token].first() {
                    debug!(token, slot, "confirmed assignment");
                    self.assign(token, slot);
                    changed = true;
                }
            }
            if !changed {
                break;
            }
        }
    }

    fn assign(&mut self, token: usize, slot: usize) {
        self.token_slot[token] = Some(slot);
        self.slot_token[slot] = Some(token);
        self.candidates[token].clear();
        for (other, set) in self.candidates.iter_mut().enumerate() {
            if other != token {
                set.remove(&slot);
            }
        }
    }

    fn unassigned_tokens(&self) -> Vec<usize> {
        (0..self.token_slot.len())
            .filter(|&t| self.token_slot[t].is_none())
            .collect()
    }
}
