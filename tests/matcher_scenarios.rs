use qsoexch::{
    config::{ContestConfig, ExchangeRule},
    exchange::{
        matcher::{ExchangeError, ExchangeMatcher},
        template::{ExchangeTemplate, TemplateEntry},
    },
    field::{registry::FieldSpecRegistry, source::InMemoryGrammarSource},
};

fn registry() -> FieldSpecRegistry {
    let config = ContestConfig {
        name: "TEST".to_string(),
        mult_fields: vec!["ITUZONE".to_string(), "SOCIETY".to_string(), "SECTION".to_string()],
        exchange: vec![ExchangeRule {
            countries: vec!["*".to_string()],
            modes: vec![],
            fields: ["RST", "CQZONE", "ITUZONE+SOCIETY", "SECTION", "NAME", "ITUZONE"]
                .iter()
                .map(|f| f.to_string())
                .collect(),
            optional: vec![],
        }],
        ..ContestConfig::default()
    };

    let mut source = InMemoryGrammarSource::new();
    source.insert_regex("RST", "[1-5][1-9][1-9]");
    source.insert_regex("CQZONE", "[1-9]|[1-3][0-9]|40");
    source.insert_regex("ITUZONE", "[1-9]|[1-8][0-9]|90");
    source.insert_regex("NAME", "[A-Z]{2,}");
    source.insert_values("SOCIETY", "HQ\nAC\nR1=IARUR1\n");
    source.insert_values("SECTION", "NH\nENY\nONE=ONTARIOEAST\n");
    FieldSpecRegistry::build(&config, &source)
}

#[test]
fn scenario_a_tokens_in_template_order() {
    let reg = registry();
    let template = ExchangeTemplate::required(&["RST", "CQZONE"]);
    let parsed = ExchangeMatcher::new(&reg).parse("599 14", &template).unwrap();

    assert!(parsed.is_valid());
    assert_eq!(parsed.value("RST"), Some("599"));
    assert_eq!(parsed.value("CQZONE"), Some("14"));
    assert!(parsed.replacement_call().is_none());
}

#[test]
fn scenario_b_swapped_tokens_give_same_result() {
    let reg = registry();
    let template = ExchangeTemplate::required(&["RST", "CQZONE"]);
    let matcher = ExchangeMatcher::new(&reg);
    let a = matcher.parse("599 14", &template).unwrap();
    let b = matcher.parse("14 599", &template).unwrap();

    assert!(b.is_valid());
    assert_eq!(a.fields(), b.fields());
}

#[test]
fn scenario_c_choice_slot_resolves_to_society() {
    let reg = registry();
    let template = ExchangeTemplate::required(&["RST", "ITUZONE+SOCIETY"]);
    let parsed = ExchangeMatcher::new(&reg).parse("599 HQ", &template).unwrap();

    assert!(parsed.is_valid());
    let slot = &parsed.fields()[1];
    assert_eq!(slot.name, "SOCIETY");
    assert_eq!(slot.slot, "ITUZONE+SOCIETY");
    assert_eq!(slot.value, "HQ");
    assert!(slot.is_mult);
    assert_eq!(parsed.value("ITUZONE+SOCIETY"), Some("HQ"));
}

#[test]
fn choice_slot_takes_first_legal_member() {
    let reg = registry();
    let template = ExchangeTemplate::required(&["ITUZONE+SOCIETY"]);
    let parsed = ExchangeMatcher::new(&reg).parse("8", &template).unwrap();
    assert_eq!(parsed.fields()[0].name, "ITUZONE");

    let parsed = ExchangeMatcher::new(&reg).parse("iarur1", &template).unwrap();
    assert_eq!(parsed.fields()[0].name, "SOCIETY");
    assert_eq!(parsed.fields()[0].value, "R1");
}

#[test]
fn scenario_d_dotted_token_is_replacement_call() {
    let reg = registry();
    let template = ExchangeTemplate::required(&["CQZONE"]);
    let parsed = ExchangeMatcher::new(&reg).parse("W4.AMJ 14", &template).unwrap();

    assert!(parsed.is_valid());
    assert_eq!(parsed.replacement_call(), Some("W4AMJ"));
    assert_eq!(parsed.value("CQZONE"), Some("14"));
    assert_eq!(parsed.received(), ["W4.AMJ", "14"]);
}

#[test]
fn first_dotted_token_wins() {
    let reg = registry();
    let template = ExchangeTemplate::required(&["CQZONE"]);
    let parsed = ExchangeMatcher::new(&reg)
        .parse("K1.AR 5 .N2IC", &template)
        .unwrap();
    assert_eq!(parsed.replacement_call(), Some("K1AR"));
    assert!(parsed.is_valid());
}

#[test]
fn scenario_f_field_count_mismatch_short_circuits() {
    let reg = registry();
    let template = ExchangeTemplate::required(&["RST", "CQZONE", "SECTION"]);
    let err = ExchangeMatcher::new(&reg).parse("599 14", &template).unwrap_err();

    assert_eq!(err, ExchangeError::FieldCountMismatch { expected: 3, found: 2 });
    assert_eq!(err.to_string(), "expected 3 exchange fields, found 2");
}

#[test]
fn dotted_tokens_do_not_count_toward_field_total() {
    let reg = registry();
    let template = ExchangeTemplate::required(&["RST", "CQZONE"]);
    let err = ExchangeMatcher::new(&reg).parse("K1.AR 599", &template).unwrap_err();
    assert_eq!(err, ExchangeError::FieldCountMismatch { expected: 2, found: 1 });
}

#[test]
fn ambiguous_tokens_follow_earliest_token_then_template_order() {
    let reg = registry();
    let template = ExchangeTemplate::required(&["CQZONE", "ITUZONE"]);
    let matcher = ExchangeMatcher::new(&reg);

    let parsed = matcher.parse("5 8", &template).unwrap();
    assert_eq!(parsed.value("CQZONE"), Some("5"));
    assert_eq!(parsed.value("ITUZONE"), Some("8"));

    let parsed = matcher.parse("8 5", &template).unwrap();
    assert_eq!(parsed.value("CQZONE"), Some("8"));
    assert_eq!(parsed.value("ITUZONE"), Some("5"));
}

#[test]
fn propagation_resolves_before_disambiguation() {
    let reg = registry();
    let template = ExchangeTemplate::required(&["CQZONE", "ITUZONE"]);
    // 75 is only a legal ITU zone, which leaves 5 for the CQ zone.
    let parsed = ExchangeMatcher::new(&reg).parse("75 5", &template).unwrap();
    assert_eq!(parsed.value("CQZONE"), Some("5"));
    assert_eq!(parsed.value("ITUZONE"), Some("75"));
}

#[test]
fn cut_numbers_apply_to_numeric_fields() {
    let reg = registry();
    let template = ExchangeTemplate::required(&["RST", "CQZONE"]);
    let parsed = ExchangeMatcher::new(&reg).parse("599 AT", &template).unwrap();
    assert!(parsed.is_valid());
    assert_eq!(parsed.value("CQZONE"), Some("10"));
}

#[test]
fn values_are_canonicalized() {
    let reg = registry();
    let template = ExchangeTemplate::required(&["RST", "SECTION"]);
    let parsed = ExchangeMatcher::new(&reg).parse("ontarioeast 599", &template).unwrap();
    assert_eq!(parsed.value("SECTION"), Some("ONE"));
    assert_eq!(parsed.mult_values().map(|f| f.value.as_str()).collect::<Vec<_>>(), vec!["ONE"]);
}

#[test]
fn single_callsign_leftover_becomes_replacement_call() {
    let reg = registry();
    let template = ExchangeTemplate::required(&["RST", "CQZONE"]);
    let parsed = ExchangeMatcher::new(&reg).parse("599 14 k1ar", &template).unwrap();
    assert!(parsed.is_valid());
    assert_eq!(parsed.replacement_call(), Some("K1AR"));
}

#[test]
fn explicit_call_blocks_leftover_heuristic() {
    let reg = registry();
    let template = ExchangeTemplate::required(&["RST", "CQZONE"]);
    let parsed = ExchangeMatcher::new(&reg)
        .parse("N2.IC 599 14 K1AR", &template)
        .unwrap();
    assert_eq!(parsed.replacement_call(), Some("N2IC"));
    assert!(!parsed.is_valid());
}

#[test]
fn two_callsign_leftovers_are_unparseable() {
    let reg = registry();
    let template = ExchangeTemplate::required(&["RST", "CQZONE"]);
    let parsed = ExchangeMatcher::new(&reg)
        .parse("599 14 K1AR N2IC", &template)
        .unwrap();
    assert!(!parsed.is_valid());
    assert!(parsed.replacement_call().is_none());
}

#[test]
fn leftover_garbage_is_unparseable() {
    let reg = registry();
    let template = ExchangeTemplate::required(&["RST", "CQZONE"]);
    let parsed = ExchangeMatcher::new(&reg).parse("599 14 ???", &template).unwrap();
    assert!(!parsed.is_valid());

    let err = parsed.into_result().unwrap_err();
    assert_eq!(
        err,
        ExchangeError::Unparseable {
            exchange: "599 14 ???".to_string()
        }
    );
    assert_eq!(err.to_string(), "unable to parse exchange: 599 14 ???");
}

#[test]
fn optional_slots_may_stay_empty() {
    let reg = registry();
    let template = ExchangeTemplate::new(vec![
        TemplateEntry::required("RST"),
        TemplateEntry::optional("NAME"),
    ]);
    let parsed = ExchangeMatcher::new(&reg).parse("599", &template).unwrap();
    assert!(parsed.is_valid());
    assert_eq!(parsed.value("NAME"), Some(""));

    let parsed = ExchangeMatcher::new(&reg).parse("599 TOM", &template).unwrap();
    assert_eq!(parsed.value("NAME"), Some("TOM"));
}

#[test]
fn unknown_template_field_can_never_be_filled() {
    let reg = registry();
    let template = ExchangeTemplate::required(&["RST", "POWER"]);
    let parsed = ExchangeMatcher::new(&reg).parse("599 100", &template).unwrap();
    assert!(!parsed.is_valid());
    assert_eq!(parsed.value("POWER"), Some(""));
}

#[test]
fn empty_template_accepts_empty_input() {
    let reg = registry();
    let template = ExchangeTemplate::new(vec![]);
    let parsed = ExchangeMatcher::new(&reg).parse("", &template).unwrap();
    assert!(parsed.is_valid());
    assert!(parsed.fields().is_empty());
}
