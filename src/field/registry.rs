//! Name -> [`FieldSpec`] mapping built once per contest.

use std::sync::{Arc, RwLock};

use hashbrown::HashMap;
use tracing::{info, warn};

use crate::{
    config::ContestConfig,
    types::{FieldId, FieldName},
};

use super::{
    source::{GrammarSource, SourceError, apply_country_overrides, country_context, parse_values},
    spec::{EquivalenceTable, FieldSpec},
};

/// Registry shared between the input runtime and the guess cache.
pub type SharedRegistry = Arc<RwLock<FieldSpecRegistry>>;

/// How a template name resolves in the registry.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FieldKind<'a> {
    /// One concrete field.
    Single(FieldId),
    /// A `+`-joined choice group; members in declaration order.
    Choice(&'a [FieldId]),
}

/// All field specs of one contest, plus expanded choice groups.
#[derive(Debug, Clone, Default)]
pub struct FieldSpecRegistry {
    specs: Vec<FieldSpec>,
    by_name: HashMap<FieldName, FieldId>,
    choices: HashMap<FieldName, Vec<FieldId>>,
}

impl FieldSpecRegistry {
    /// Creates an empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// Wraps the registry for sharing.
    pub fn into_shared(self) -> SharedRegistry {
        Arc::new(RwLock::new(self))
    }

    /// Builds specs for every field referenced by `config`, reading grammar
    /// text from `source`. Load failures degrade the affected field to one
    /// that accepts nothing.
    pub fn build(config: &ContestConfig, source: &dyn GrammarSource) -> Self {
        let mut registry = Self::new();
        for name in config.referenced_field_names() {
            if is_choice_name(&name) {
                let members: Vec<FieldId> = choice_members(&name)
                    .map(|member| registry.ensure_loaded(member, config, source))
                    .collect();
                registry.choices.insert(name, members);
            } else {
                registry.ensure_loaded(&name, config, source);
            }
        }
        info!(
            contest = %config.name,
            fields = registry.specs.len(),
            choices = registry.choices.len(),
            "field registry built"
        );
        registry
    }

    fn ensure_loaded(
        &mut self,
        name: &str,
        config: &ContestConfig,
        source: &dyn GrammarSource,
    ) -> FieldId {
        if let Some(id) = self.by_name.get(name) {
            return *id;
        }
        self.insert(load_field(name, config, source))
    }

    /// Adds or replaces a field spec.
    pub fn insert(&mut self, spec: FieldSpec) -> FieldId {
        if let Some(id) = self.by_name.get(spec.name()).copied() {
            self.specs[id.0] = spec;
            return id;
        }
        let id = FieldId(self.specs.len());
        self.by_name.insert(spec.name().to_string(), id);
        self.specs.push(spec);
        id
    }

    /// Registers a choice group over already-inserted members. Returns
    /// false if any member is unknown.
    pub fn insert_choice(&mut self, members: &[&str]) -> bool {
        let ids: Option<Vec<FieldId>> = members.iter().map(|m| self.id_of(m)).collect();
        match ids {
            Some(ids) if ids.len() >= 2 => {
                self.choices.insert(members.join("+"), ids);
                true
            }
            _ => false,
        }
    }

    /// Number of concrete fields.
    pub fn len(&self) -> usize {
        self.specs.len()
    }

    /// Returns true when no field is registered.
    pub fn is_empty(&self) -> bool {
        self.specs.is_empty()
    }

    /// Concrete field names in registration order.
    pub fn field_names(&self) -> impl Iterator<Item = &str> {
        self.specs.iter().map(FieldSpec::name)
    }

    /// Id of a concrete field.
    pub fn id_of(&self, name: &str) -> Option<FieldId> {
        self.by_name.get(name).copied()
    }

    /// Spec by id.
    pub fn get(&self, id: FieldId) -> &FieldSpec {
        &self.specs[id.0]
    }

    /// Spec of a concrete field by name.
    pub fn spec(&self, name: &str) -> Option<&FieldSpec> {
        self.id_of(name).map(|id| self.get(id))
    }

    fn spec_mut(&mut self, name: &str) -> Option<&mut FieldSpec> {
        let id = self.id_of(name)?;
        Some(&mut self.specs[id.0])
    }

    /// Resolves a template name to a single field or a choice group.
    pub fn kind(&self, name: &str) -> Option<FieldKind<'_>> {
        if let Some(id) = self.id_of(name) {
            return Some(FieldKind::Single(id));
        }
        self.choices
            .get(name)
            .map(|ids| FieldKind::Choice(ids.as_slice()))
    }

    /// Legality of `value` for a field or choice group.
    pub fn is_legal_value(&self, name: &str, value: &str) -> bool {
        self.resolve_value(name, value).is_some()
    }

    /// First concrete field of `name` for which `value` is legal.
    pub fn resolve_value(&self, name: &str, value: &str) -> Option<FieldId> {
        match self.kind(name)? {
            FieldKind::Single(id) => self.get(id).is_legal_value(value).then_some(id),
            FieldKind::Choice(ids) => ids
                .iter()
                .copied()
                .find(|id| self.get(*id).is_legal_value(value)),
        }
    }

    /// Canonical form of `value` for a field or choice group.
    pub fn canonical_value(&self, name: &str, value: &str) -> Option<String> {
        let id = self.resolve_value(name, value)?;
        self.get(id).canonical_value(value)
    }

    /// Mult status of a concrete field; unknown and choice names are false.
    pub fn is_mult(&self, name: &str) -> bool {
        self.spec(name).is_some_and(FieldSpec::is_mult)
    }

    /// Changes mult status. Returns false when `name` is not a concrete field.
    pub fn set_mult(&mut self, name: &str, is_mult: bool) -> bool {
        match self.spec_mut(name) {
            Some(spec) => {
                spec.set_mult(is_mult);
                true
            }
            None => false,
        }
    }

    /// Registers `value` as canonical for `name`. Returns true when new.
    pub fn learn_value(&mut self, name: &str, value: &str) -> bool {
        self.spec_mut(name)
            .is_some_and(|spec| spec.add_canonical_value(value))
    }

    /// Registers `alt` as a spelling of `canonical` for `name`.
    pub fn add_legal_value(&mut self, name: &str, canonical: &str, alt: &str) -> bool {
        self.spec_mut(name)
            .is_some_and(|spec| spec.add_legal_value(canonical, alt))
    }

    /// Sorted canonical enumerated values of `name`.
    pub fn canonical_values(&self, name: &str) -> Vec<String> {
        self.spec(name)
            .map(FieldSpec::canonical_values)
            .unwrap_or_default()
    }
}

/// Returns true for `+`-joined choice-group names.
pub fn is_choice_name(name: &str) -> bool {
    choice_members(name).nth(1).is_some()
}

/// Member names of a choice group, in declaration order.
pub fn choice_members(name: &str) -> impl Iterator<Item = &str> {
    name.split('+').map(str::trim).filter(|m| !m.is_empty())
}

fn load_field(name: &str, config: &ContestConfig, source: &dyn GrammarSource) -> FieldSpec {
    let pattern = source.regex_for(name).and_then(|text| {
        FieldSpec::compile_pattern(&text)
            .map_err(|err| SourceError::Regex {
                field: name.to_string(),
                source: err,
            })
            .inspect_err(|err| warn!(field = name, error = %err, "ignoring field pattern"))
            .ok()
    });

    let mut table = match source.values_for(name) {
        Ok(Some(text)) => parse_values(&text),
        Ok(None) => EquivalenceTable::new(),
        Err(err) => {
            warn!(field = name, error = %err, "ignoring field values");
            EquivalenceTable::new()
        }
    };

    if let Some(values) = country_context(name).and_then(|pfx| config.country_overrides.get(pfx)) {
        apply_country_overrides(&mut table, values);
    }

    let mut spec = FieldSpec::new(name)
        .with_table(table)
        .with_mult(config.is_mult_field(name))
        .with_numeric(config.is_numeric_field(name));
    spec.set_pattern(pattern);

    if spec.accepts_nothing() {
        warn!(field = name, "field has no grammar and will reject every value");
    }
    spec
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{config::ExchangeRule, field::source::InMemoryGrammarSource};
    use std::collections::BTreeSet;

    fn config(fields: &[&str]) -> ContestConfig {
        ContestConfig {
            name: "TEST".to_string(),
            mult_fields: vec!["ITUZONE".to_string(), "SOCIETY".to_string()],
            exchange: vec![ExchangeRule {
                countries: vec!["*".to_string()],
                modes: vec![],
                fields: fields.iter().map(|f| f.to_string()).collect(),
                optional: vec![],
            }],
            ..ContestConfig::default()
        }
    }

    fn source() -> InMemoryGrammarSource {
        let mut src = InMemoryGrammarSource::new();
        src.insert_regex("RST", "[1-5][1-9][1-9]");
        src.insert_regex("ITUZONE", "[1-9]|[1-8][0-9]|90");
        src.insert_values("SOCIETY", "HQ\nAC\nR1=IARUR1\n");
        src
    }

    #[test]
    fn choice_groups_expand_to_members() {
        let reg = FieldSpecRegistry::build(&config(&["RST", "ITUZONE+SOCIETY"]), &source());
        assert_eq!(reg.len(), 3);
        assert_eq!(reg.field_names().collect::<Vec<_>>(), vec!["RST", "ITUZONE", "SOCIETY"]);
        assert!(matches!(reg.kind("ITUZONE+SOCIETY"), Some(FieldKind::Choice(ids)) if ids.len() == 2));
        assert!(matches!(reg.kind("RST"), Some(FieldKind::Single(_))));
        assert!(reg.kind("CQZONE").is_none());
    }

    #[test]
    fn choice_resolution_uses_declaration_order() {
        let reg = FieldSpecRegistry::build(&config(&["ITUZONE+SOCIETY"]), &source());
        let society = reg.id_of("SOCIETY").unwrap();
        let itu = reg.id_of("ITUZONE").unwrap();
        assert_eq!(reg.resolve_value("ITUZONE+SOCIETY", "HQ"), Some(society));
        assert_eq!(reg.resolve_value("ITUZONE+SOCIETY", "8"), Some(itu));
        assert_eq!(reg.canonical_value("ITUZONE+SOCIETY", "IARUR1").as_deref(), Some("R1"));
        assert!(!reg.is_legal_value("ITUZONE+SOCIETY", "XX"));
    }

    #[test]
    fn mult_status_comes_from_config_and_can_change() {
        let mut reg = FieldSpecRegistry::build(&config(&["RST", "ITUZONE+SOCIETY"]), &source());
        assert!(reg.is_mult("ITUZONE"));
        assert!(!reg.is_mult("RST"));
        assert!(!reg.is_mult("ITUZONE+SOCIETY"));
        assert!(reg.set_mult("RST", true));
        assert!(reg.is_mult("RST"));
        assert!(!reg.set_mult("NOPE", true));
    }

    #[test]
    fn bad_regex_degrades_field() {
        let mut src = source();
        src.insert_regex("CHECK", "[0-9");
        let reg = FieldSpecRegistry::build(&config(&["CHECK"]), &src);
        let check = reg.spec("CHECK").unwrap();
        assert!(check.accepts_nothing());
        assert!(!check.is_legal_value("79"));
    }

    #[test]
    fn country_overrides_apply_only_in_country_context() {
        let mut cfg = config(&["QTHX[HA]", "QTHX"]);
        cfg.country_overrides
            .insert("HA".to_string(), BTreeSet::from(["BP|BUDAPEST".to_string()]));
        let reg = FieldSpecRegistry::build(&cfg, &InMemoryGrammarSource::new());
        assert_eq!(reg.canonical_value("QTHX[HA]", "BUDAPEST").as_deref(), Some("BP"));
        assert!(!reg.is_legal_value("QTHX", "BP"));
    }

    #[test]
    fn learned_values_become_canonical() {
        let mut reg = FieldSpecRegistry::build(&config(&["ITUZONE+SOCIETY"]), &source());
        assert!(!reg.is_legal_value("SOCIETY", "DARC"));
        assert!(reg.learn_value("SOCIETY", "DARC"));
        assert!(!reg.learn_value("SOCIETY", "DARC"));
        assert!(reg.is_legal_value("ITUZONE+SOCIETY", "DARC"));
        assert_eq!(reg.canonical_values("SOCIETY"), vec!["AC", "DARC", "HQ", "R1"]);
    }

    #[test]
    fn insert_choice_requires_known_members() {
        let mut reg = FieldSpecRegistry::new();
        reg.insert(FieldSpec::new("A"));
        reg.insert(FieldSpec::new("B"));
        assert!(reg.insert_choice(&["A", "B"]));
        assert!(!reg.insert_choice(&["A", "C"]));
        assert!(reg.kind("A+B").is_some());
    }
}
