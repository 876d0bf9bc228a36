//! Readers for the line-oriented grammar sources a field is built from.

use std::collections::{BTreeMap, BTreeSet};
use std::fs;
use std::io;
use std::path::{Path, PathBuf};

use hashbrown::HashMap;
use tracing::warn;

use super::spec::EquivalenceTable;

/// Failure reading or compiling a grammar source.
#[derive(Debug, thiserror::Error)]
pub enum SourceError {
    /// A grammar file exists but could not be read.
    #[error("failed to read {path}: {source}")]
    Io {
        /// File that failed.
        path: PathBuf,
        /// Underlying I/O error.
        #[source]
        source: io::Error,
    },

    /// A regex definition did not compile.
    #[error("invalid regex for field {field}: {source}")]
    Regex {
        /// Field whose definition is invalid.
        field: String,
        /// Compiler error.
        #[source]
        source: regex::Error,
    },
}

/// `FIELD: regex` definitions keyed by field name; first non-empty entry wins.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RegexDefinitions {
    patterns: BTreeMap<String, String>,
}

impl RegexDefinitions {
    /// Parses definition text. Only the first colon on a line is significant.
    pub fn parse(text: &str) -> Self {
        let mut patterns = BTreeMap::new();
        for line in text.lines() {
            let line = line.trim();
            if is_comment_or_blank(line) {
                continue;
            }
            let Some((name, pattern)) = line.split_once(':') else {
                continue;
            };
            let (name, pattern) = (name.trim(), pattern.trim());
            if name.is_empty() || pattern.is_empty() {
                continue;
            }
            patterns
                .entry(name.to_string())
                .or_insert_with(|| pattern.to_string());
        }
        Self { patterns }
    }

    /// Reads and parses a definition file.
    pub fn load(path: impl AsRef<Path>) -> Result<Self, SourceError> {
        let path = path.as_ref();
        let text = fs::read_to_string(path).map_err(|source| SourceError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        Ok(Self::parse(&text))
    }

    /// Pattern text for `field`.
    pub fn get(&self, field: &str) -> Option<&str> {
        self.patterns.get(field).map(String::as_str)
    }

    /// Adds a definition unless `field` already has one.
    pub fn insert(&mut self, field: impl Into<String>, pattern: impl Into<String>) {
        self.patterns.entry(field.into()).or_insert_with(|| pattern.into());
    }

    /// Number of defined fields.
    pub fn len(&self) -> usize {
        self.patterns.len()
    }

    /// Returns true when nothing is defined.
    pub fn is_empty(&self) -> bool {
        self.patterns.is_empty()
    }
}

/// Parses a `<field>.values` source.
///
/// Each line is either `CANONICAL` or `CANONICAL=alt1,alt2,...`.
pub fn parse_values(text: &str) -> EquivalenceTable {
    let mut table = EquivalenceTable::new();
    for line in text.lines() {
        let line = line.trim();
        if is_comment_or_blank(line) {
            continue;
        }
        match line.split_once('=') {
            Some((canonical, alts)) => {
                let canonical = canonical.trim();
                table.add_canonical(canonical);
                for alt in alts.split(',').map(str::trim).filter(|a| !a.is_empty()) {
                    table.add_legal(canonical, alt);
                }
            }
            None => {
                table.add_canonical(line);
            }
        }
    }
    table
}

/// Applies per-country configured values; `a|b|c` makes one class with
/// canonical value `a`.
pub fn apply_country_overrides(table: &mut EquivalenceTable, values: &BTreeSet<String>) {
    for value in values {
        let mut parts = value.split('|').map(str::trim).filter(|p| !p.is_empty());
        let Some(canonical) = parts.next() else {
            continue;
        };
        table.add_canonical(canonical);
        for alt in parts {
            table.add_legal(canonical, alt);
        }
    }
}

/// Country prefix named by a field such as `QTHX[HA]`.
pub fn country_context(field: &str) -> Option<&str> {
    let inner = field.strip_suffix(']')?;
    let open = inner.rfind('[')?;
    let prefix = &inner[open + 1..];
    (!prefix.is_empty()).then_some(prefix)
}

fn is_comment_or_blank(line: &str) -> bool {
    line.is_empty() || line.starts_with(';') || line.starts_with("//")
}

/// Supplies raw grammar text for field construction.
pub trait GrammarSource {
    /// Regex text for `field`, if defined.
    fn regex_for(&self, field: &str) -> Option<String>;
    /// Contents of the `.values` source for `field`; `Ok(None)` when absent.
    fn values_for(&self, field: &str) -> Result<Option<String>, SourceError>;
}

/// Grammar files on disk: one regex definition file plus a directory of
/// `<field>.values` files.
#[derive(Debug, Clone, Default)]
pub struct FsGrammarSource {
    regexes: RegexDefinitions,
    values_dir: Option<PathBuf>,
}

impl FsGrammarSource {
    /// Opens the sources. An unreadable regex file is logged and treated as
    /// empty.
    pub fn open(regex_file: Option<&Path>, values_dir: Option<&Path>) -> Self {
        let regexes = match regex_file {
            Some(path) => RegexDefinitions::load(path).unwrap_or_else(|err| {
                warn!(error = %err, "regex definitions unavailable");
                RegexDefinitions::default()
            }),
            None => RegexDefinitions::default(),
        };
        Self {
            regexes,
            values_dir: values_dir.map(Path::to_path_buf),
        }
    }

    /// Parsed regex definitions.
    pub fn regexes(&self) -> &RegexDefinitions {
        &self.regexes
    }
}

impl GrammarSource for FsGrammarSource {
    fn regex_for(&self, field: &str) -> Option<String> {
        self.regexes.get(field).map(str::to_string)
    }

    fn values_for(&self, field: &str) -> Result<Option<String>, SourceError> {
        let Some(dir) = &self.values_dir else {
            return Ok(None);
        };
        let path = dir.join(format!("{field}.values"));
        match fs::read_to_string(&path) {
            Ok(text) => Ok(Some(text)),
            Err(err) if err.kind() == io::ErrorKind::NotFound => Ok(None),
            Err(source) => Err(SourceError::Io { path, source }),
        }
    }
}

/// In-memory grammar text, for tests and embedded contest definitions.
#[derive(Debug, Clone, Default)]
pub struct InMemoryGrammarSource {
    regexes: RegexDefinitions,
    values: HashMap<String, String>,
}

impl InMemoryGrammarSource {
    /// Creates an empty source.
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds a regex definition (first one wins).
    pub fn insert_regex(&mut self, field: impl Into<String>, pattern: impl Into<String>) {
        self.regexes.insert(field, pattern);
    }

    /// Sets the `.values` text of `field`.
    pub fn insert_values(&mut self, field: impl Into<String>, text: impl Into<String>) {
        self.values.insert(field.into(), text.into());
    }
}

impl GrammarSource for InMemoryGrammarSource {
    fn regex_for(&self, field: &str) -> Option<String> {
        self.regexes.get(field).map(str::to_string)
    }

    fn values_for(&self, field: &str) -> Result<Option<String>, SourceError> {
        Ok(self.values.get(field).cloned())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn regex_definitions_first_non_empty_wins() {
        let defs = RegexDefinitions::parse(
            "RST: [1-5][1-9][1-9]\n\nCQZONE:\nCQZONE: [1-9]|[1-3][0-9]|40\nCQZONE: 99\nTIME: [0-2][0-9]:[0-5][0-9]\n",
        );
        assert_eq!(defs.get("RST"), Some("[1-5][1-9][1-9]"));
        assert_eq!(defs.get("CQZONE"), Some("[1-9]|[1-3][0-9]|40"));
        assert_eq!(defs.get("TIME"), Some("[0-2][0-9]:[0-5][0-9]"));
        assert_eq!(defs.len(), 3);
    }

    #[test]
    fn values_source_builds_classes() {
        let table = parse_values(
            "; sections\n// more comments\n\nENY\n NNY = NY-N , NORTHNY,\nWNY=\n",
        );
        assert_eq!(table.len(), 3);
        assert_eq!(table.canonical_of("NORTHNY"), Some("NNY"));
        assert_eq!(table.canonical_of("NNY"), Some("NNY"));
        assert_eq!(table.canonical_of("WNY"), Some("WNY"));
        assert!(!table.contains("; sections"));
    }

    #[test]
    fn country_overrides_expand_pipes() {
        let mut table = EquivalenceTable::new();
        let values = BTreeSet::from(["BP|BUDAPEST|BPEST".to_string(), "GY".to_string()]);
        apply_country_overrides(&mut table, &values);
        assert_eq!(table.canonical_of("BUDAPEST"), Some("BP"));
        assert_eq!(table.canonical_of("BPEST"), Some("BP"));
        assert_eq!(table.canonical_of("GY"), Some("GY"));
    }

    #[test]
    fn country_context_reads_bracketed_prefix() {
        assert_eq!(country_context("QTHX[HA]"), Some("HA"));
        assert_eq!(country_context("QTHX[]"), None);
        assert_eq!(country_context("CQZONE"), None);
    }

    #[test]
    fn missing_values_file_is_not_an_error() {
        let dir = std::env::temp_dir().join("qsoexch-no-such-dir");
        let source = FsGrammarSource::open(None, Some(&dir));
        assert!(source.values_for("SECTION").unwrap().is_none());
        assert!(source.regexes().is_empty());
    }
}
