//! Contest configuration: exchange templates, mult fields, grammar locations.

use std::collections::{BTreeMap, BTreeSet};
use std::fs;
use std::io;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::{
    exchange::template::{ExchangeTemplate, TemplateEntry},
    field::{cut::DEFAULT_NUMERIC_FIELDS, source::FsGrammarSource},
    types::Mode,
};

/// Failure loading a [`ContestConfig`].
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    /// The file could not be read.
    #[error("failed to read {path}: {source}")]
    Io {
        /// Config path.
        path: PathBuf,
        /// Underlying I/O error.
        #[source]
        source: io::Error,
    },

    /// The JSON did not decode.
    #[error("config parse failed: {0}")]
    Json(#[from] serde_json::Error),

    /// The file extension is not a supported config format.
    #[error("unsupported config extension '{0}'; expected .json")]
    UnsupportedExtension(String),
}

fn any_country() -> Vec<String> {
    vec!["*".to_string()]
}

/// One exchange definition, selected by the other station's country and
/// the current mode.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExchangeRule {
    /// Country prefixes this rule applies to; `*` matches any.
    #[serde(default = "any_country")]
    pub countries: Vec<String>,
    /// Modes this rule applies to; empty matches any.
    #[serde(default)]
    pub modes: Vec<Mode>,
    /// Field names in order; choice groups are `+`-joined.
    pub fields: Vec<String>,
    /// Names from `fields` that may be left empty.
    #[serde(default)]
    pub optional: Vec<String>,
}

impl ExchangeRule {
    /// Returns true when this rule covers `country` on `mode`.
    pub fn matches(&self, country: &str, mode: Mode) -> bool {
        let country_ok = self
            .countries
            .iter()
            .any(|c| c == "*" || c.eq_ignore_ascii_case(country));
        let mode_ok = self.modes.is_empty() || self.modes.contains(&mode);
        country_ok && mode_ok
    }

    /// Ordered template for this rule.
    pub fn template(&self) -> ExchangeTemplate {
        ExchangeTemplate::new(
            self.fields
                .iter()
                .map(|name| {
                    let name = name.trim();
                    TemplateEntry {
                        name: name.to_string(),
                        optional: self.optional.iter().any(|o| o.trim() == name),
                    }
                })
                .collect(),
        )
    }
}

/// Per-contest configuration.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ContestConfig {
    /// Contest name.
    pub name: String,
    /// Fields that count as multipliers.
    pub mult_fields: Vec<String>,
    /// Fields that receive cut-number normalization, in addition to the
    /// built-in numeric fields.
    pub numeric_fields: Vec<String>,
    /// Exchange rules; the first matching rule wins.
    pub exchange: Vec<ExchangeRule>,
    /// Country prefix -> values for fields named `FIELD[PREFIX]`.
    pub country_overrides: BTreeMap<String, BTreeSet<String>>,
    /// `FIELD: regex` definition file.
    pub regex_file: Option<PathBuf>,
    /// Directory holding `<field>.values` files.
    pub values_dir: Option<PathBuf>,
    /// Field name -> prefill file of `CALL VALUE` lines.
    pub prefill: BTreeMap<String, PathBuf>,
}

impl ContestConfig {
    /// Decodes a JSON config.
    pub fn from_json_str(input: &str) -> Result<Self, ConfigError> {
        Ok(serde_json::from_str(input)?)
    }

    /// Loads a config file; relative paths inside it resolve against the
    /// file's directory.
    pub fn from_path(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let ext = path
            .extension()
            .and_then(|v| v.to_str())
            .unwrap_or_default()
            .to_ascii_lowercase();
        if ext != "json" {
            return Err(ConfigError::UnsupportedExtension(ext));
        }

        let raw = fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        let mut config = Self::from_json_str(&raw)?;
        if let Some(base) = path.parent() {
            config.resolve_paths(base);
        }
        Ok(config)
    }

    fn resolve_paths(&mut self, base: &Path) {
        let join = |p: &mut PathBuf| {
            if p.is_relative() {
                *p = base.join(&*p);
            }
        };
        if let Some(p) = self.regex_file.as_mut() {
            join(p);
        }
        if let Some(p) = self.values_dir.as_mut() {
            join(p);
        }
        for p in self.prefill.values_mut() {
            join(p);
        }
    }

    /// Every field name referenced by any exchange rule, first-seen order.
    pub fn referenced_field_names(&self) -> Vec<String> {
        let mut seen = BTreeSet::new();
        let mut out = Vec::new();
        for rule in &self.exchange {
            for name in &rule.fields {
                let name = name.trim();
                if seen.insert(name.to_string()) {
                    out.push(name.to_string());
                }
            }
        }
        out
    }

    /// Returns true when `field` is configured as a multiplier.
    pub fn is_mult_field(&self, field: &str) -> bool {
        self.mult_fields.iter().any(|m| m == field)
    }

    /// Returns true when `field` receives cut-number normalization.
    pub fn is_numeric_field(&self, field: &str) -> bool {
        DEFAULT_NUMERIC_FIELDS.contains(&field) || self.numeric_fields.iter().any(|n| n == field)
    }

    /// Template for a station in `country` worked on `mode`.
    pub fn template_for(&self, country: &str, mode: Mode) -> Option<ExchangeTemplate> {
        self.exchange
            .iter()
            .find(|rule| rule.matches(country, mode))
            .map(ExchangeRule::template)
    }

    /// Filesystem grammar sources named by this config.
    pub fn grammar_source(&self) -> FsGrammarSource {
        FsGrammarSource::open(self.regex_file.as_deref(), self.values_dir.as_deref())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const IARU: &str = r#"{
        "name": "IARU-HF",
        "mult_fields": ["ITUZONE", "SOCIETY"],
        "exchange": [
            { "countries": ["W", "VE"], "modes": ["SSB"], "fields": ["RS", "ITUZONE+SOCIETY"] },
            { "fields": ["RST", "ITUZONE+SOCIETY", "NAME"], "optional": ["NAME"] }
        ],
        "regex_file": "exchange-fields.dat"
    }"#;

    #[test]
    fn decodes_rules_and_defaults() {
        let cfg = ContestConfig::from_json_str(IARU).unwrap();
        assert_eq!(cfg.name, "IARU-HF");
        assert_eq!(cfg.exchange[1].countries, vec!["*"]);
        assert!(cfg.values_dir.is_none());
        assert!(cfg.is_mult_field("SOCIETY"));
        assert!(!cfg.is_mult_field("RST"));
        assert!(cfg.is_numeric_field("ITUZONE"));
        assert!(!cfg.is_numeric_field("SOCIETY"));
        assert!(!cfg.is_numeric_field("SKCC"));
    }

    #[test]
    fn first_matching_rule_wins() {
        let cfg = ContestConfig::from_json_str(IARU).unwrap();
        let ssb = cfg.template_for("VE", Mode::SSB).unwrap();
        assert_eq!(ssb.entries()[0].name, "RS");

        let cw = cfg.template_for("VE", Mode::CW).unwrap();
        assert_eq!(cw.len(), 3);
        assert!(cw.entries()[2].optional);
        assert!(!cw.entries()[1].optional);
    }

    #[test]
    fn referenced_names_are_deduplicated_in_order() {
        let cfg = ContestConfig::from_json_str(IARU).unwrap();
        assert_eq!(
            cfg.referenced_field_names(),
            vec!["RS", "ITUZONE+SOCIETY", "RST", "NAME"]
        );
    }

    #[test]
    fn from_path_resolves_relative_paths() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("iaru.json");
        fs::write(&path, IARU).unwrap();

        let cfg = ContestConfig::from_path(&path).unwrap();
        assert_eq!(cfg.regex_file, Some(dir.path().join("exchange-fields.dat")));
    }

    #[test]
    fn from_path_rejects_other_extensions() {
        let err = ContestConfig::from_path("contest.yaml").unwrap_err();
        assert!(matches!(err, ConfigError::UnsupportedExtension(ref e) if e == "yaml"));
    }
}
