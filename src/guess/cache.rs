//! Memoized per-callsign field guesses.
//!
//! A guess is computed at most once per `(callsign, field)` key: prefill
//! table first, then the field's [`GuessRule`] over the historical record.
//! Empty results are cached too. Values seen in logged QSOs overwrite guesses
//! and are the only entries that survive a restart (see [`GuessCache::snapshot`]).

use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use hashbrown::HashMap;
use tracing::debug;

use crate::{
    exchange::parsed::ParsedExchange,
    field::registry::SharedRegistry,
    observation::Observation,
    types::{Callsign, FieldName},
};

use super::{
    history::{HistorySource, LocationLookup},
    prefill::PrefillTable,
    rules::rule_for,
};

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
struct GuessKey {
    call: String,
    field: FieldName,
}

#[derive(Debug, Clone)]
struct Entry {
    value: String,
    observed: bool,
}

/// Thread-safe memo of expected exchange values by callsign.
pub struct GuessCache {
    memo: Mutex<HashMap<GuessKey, Entry>>,
    history: Arc<dyn HistorySource>,
    locations: Option<Arc<dyn LocationLookup>>,
    prefill: PrefillTable,
    registry: SharedRegistry,
}

impl GuessCache {
    /// Creates an empty cache over `history`, canonicalizing through `registry`.
    pub fn new(registry: SharedRegistry, history: Arc<dyn HistorySource>) -> Self {
        Self {
            memo: Mutex::new(HashMap::new()),
            history,
            locations: None,
            prefill: PrefillTable::new(),
            registry,
        }
    }

    /// Adds a prefix-based zone lookup used when a record lacks a zone.
    pub fn with_locations(mut self, locations: Arc<dyn LocationLookup>) -> Self {
        self.locations = Some(locations);
        self
    }

    /// Adds prefill tables, consulted before the historical record.
    pub fn with_prefill(mut self, prefill: PrefillTable) -> Self {
        self.prefill = prefill;
        self
    }

    fn memo(&self) -> MutexGuard<'_, HashMap<GuessKey, Entry>> {
        self.memo.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Expected value of `field` for `call`; empty when nothing is known.
    ///
    /// The memo lock is held for the whole lookup so concurrent callers
    /// compute each key once.
    pub fn guess_value(&self, call: &str, field: &str) -> String {
        let key = GuessKey {
            call: Callsign::new(call).as_str().to_string(),
            field: field.to_string(),
        };

        let mut memo = self.memo();
        if let Some(entry) = memo.get(&key) {
            return entry.value.clone();
        }

        let value = self.compute(&key.call, field);
        debug!(call = %key.call, field, value = %value, "guess computed");
        memo.insert(
            key,
            Entry {
                value: value.clone(),
                observed: false,
            },
        );
        value
    }

    fn compute(&self, call: &str, field: &str) -> String {
        let raw = self.prefill.get(field, call).map(str::to_string).or_else(|| {
            let rule = rule_for(field)?;
            let record = self.history.lookup(call);
            rule.evaluate(call, record.as_ref(), self.locations.as_deref())
        });
        let Some(raw) = raw.map(|v| v.trim().to_ascii_uppercase()) else {
            return String::new();
        };

        let registry = self.registry.read().unwrap_or_else(PoisonError::into_inner);
        registry.canonical_value(field, &raw).unwrap_or(raw)
    }

    /// Overwrites the entry for `(call, field)` with an observed value.
    pub fn set_value(&self, call: &str, field: &str, value: &str) {
        let key = GuessKey {
            call: Callsign::new(call).as_str().to_string(),
            field: field.to_string(),
        };
        self.memo().insert(
            key,
            Entry {
                value: value.to_string(),
                observed: true,
            },
        );
    }

    /// Stores every non-empty value of a valid logged exchange, under the
    /// resolved field name and, for choice slots, the group name too.
    /// Returns the observations written.
    pub fn record_logged(&self, call: &str, exchange: &ParsedExchange) -> Vec<Observation> {
        if !exchange.is_valid() {
            return Vec::new();
        }
        let call = exchange
            .replacement_call()
            .map(Callsign::new)
            .unwrap_or_else(|| Callsign::new(call));

        let mut observations = Vec::new();
        for field in exchange.fields().iter().filter(|f| !f.value.is_empty()) {
            observations.push(Observation::new(call.as_str(), field.name.clone(), field.value.clone()));
            if field.slot != field.name {
                observations.push(Observation::new(call.as_str(), field.slot.clone(), field.value.clone()));
            }
        }
        self.restore(observations.iter().cloned());
        observations
    }

    /// Applies observations as [`GuessCache::set_value`] would. Returns the
    /// number applied.
    pub fn restore(&self, observations: impl IntoIterator<Item = Observation>) -> usize {
        let mut memo = self.memo();
        let mut applied = 0;
        for obs in observations {
            memo.insert(
                GuessKey {
                    call: obs.call,
                    field: obs.field,
                },
                Entry {
                    value: obs.value,
                    observed: true,
                },
            );
            applied += 1;
        }
        applied
    }

    /// Observed entries, sorted by callsign then field.
    pub fn snapshot(&self) -> Vec<Observation> {
        let mut out: Vec<Observation> = self
            .memo()
            .iter()
            .filter(|(_, entry)| entry.observed)
            .map(|(key, entry)| Observation {
                call: key.call.clone(),
                field: key.field.clone(),
                value: entry.value.clone(),
            })
            .collect();
        out.sort();
        out
    }

    /// Memoized value without computing a guess.
    pub fn cached(&self, call: &str, field: &str) -> Option<String> {
        let key = GuessKey {
            call: Callsign::new(call).as_str().to_string(),
            field: field.to_string(),
        };
        self.memo().get(&key).map(|entry| entry.value.clone())
    }

    /// Number of memoized keys.
    pub fn len(&self) -> usize {
        self.memo().len()
    }

    /// Returns true when nothing is memoized.
    pub fn is_empty(&self) -> bool {
        self.memo().is_empty()
    }
}
