//! Per-field prefill tables of expected values by callsign.

use std::path::Path;

use hashbrown::HashMap;
use tracing::{info, warn};

use crate::{config::ContestConfig, field::source::SourceError, types::Callsign};

/// Field -> callsign -> expected value.
#[derive(Debug, Clone, Default)]
pub struct PrefillTable {
    by_field: HashMap<String, HashMap<String, String>>,
}

impl PrefillTable {
    /// Creates an empty table.
    pub fn new() -> Self {
        Self::default()
    }

    /// Loads every prefill file named in `config`; unreadable files are
    /// logged and skipped.
    pub fn from_config(config: &ContestConfig) -> Self {
        let mut table = Self::new();
        for (field, path) in &config.prefill {
            match table.load(field, path) {
                Ok(count) => info!(field = %field, count, "prefill loaded"),
                Err(err) => warn!(field = %field, error = %err, "prefill unavailable"),
            }
        }
        table
    }

    /// Reads a `CALL VALUE` file for `field`. Returns the number of entries.
    pub fn load(&mut self, field: &str, path: impl AsRef<Path>) -> Result<usize, SourceError> {
        let path = path.as_ref();
        let text = std::fs::read_to_string(path).map_err(|source| SourceError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        Ok(self.parse_into(field, &text))
    }

    /// Parses `CALL VALUE` (or `CALL,VALUE`) lines for `field`. Returns the
    /// number of entries added.
    pub fn parse_into(&mut self, field: &str, text: &str) -> usize {
        let mut added = 0;
        for line in text.lines() {
            let line = line.trim();
            if line.is_empty() || line.starts_with(';') || line.starts_with("//") {
                continue;
            }
            let mut cols = line
                .split(|c: char| c == ',' || c.is_whitespace())
                .filter(|c| !c.is_empty());
            let (Some(call), Some(value)) = (cols.next(), cols.next()) else {
                continue;
            };
            self.insert(field, call, value);
            added += 1;
        }
        added
    }

    /// Sets the expected value of `field` for `call`.
    pub fn insert(&mut self, field: &str, call: &str, value: &str) {
        self.by_field
            .entry(field.to_string())
            .or_default()
            .insert(Callsign::new(call).as_str().to_string(), value.trim().to_ascii_uppercase());
    }

    /// Expected value of `field` for `call` (already normalized).
    pub fn get(&self, field: &str, call: &str) -> Option<&str> {
        self.by_field
            .get(field)
            .and_then(|calls| calls.get(call))
            .map(String::as_str)
    }

    /// Returns true when no field has prefill data.
    pub fn is_empty(&self) -> bool {
        self.by_field.values().all(HashMap::is_empty)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_space_and_comma_separated_lines() {
        let mut table = PrefillTable::new();
        let added = table.parse_into("NAME", "; names\nk1ar  tom\nN2IC,steve\nW1AW\n\n");
        assert_eq!(added, 2);
        assert_eq!(table.get("NAME", "K1AR"), Some("TOM"));
        assert_eq!(table.get("NAME", "N2IC"), Some("STEVE"));
        assert_eq!(table.get("NAME", "W1AW"), None);
        assert_eq!(table.get("QTH", "K1AR"), None);
    }

    #[test]
    fn from_config_skips_missing_files() {
        let dir = tempfile::tempdir().unwrap();
        let good = dir.path().join("foc.txt");
        std::fs::write(&good, "G4BUE 1\n").unwrap();

        let mut config = ContestConfig::default();
        config.prefill.insert("FOC".to_string(), good);
        config.prefill.insert("NAME".to_string(), dir.path().join("missing.txt"));

        let table = PrefillTable::from_config(&config);
        assert_eq!(table.get("FOC", "G4BUE"), Some("1"));
        assert!(!table.is_empty());
    }
}
