//! Fixed extraction rules from historical data to exchange fields.

use crate::field::registry::{choice_members, is_choice_name};

use super::history::{Attribute, HistoricalRecord, LocationLookup};

/// Geographic fallback for a zone field.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Zone {
    /// CQ zone.
    Cq,
    /// ITU zone.
    Itu,
}

/// How a field's guess is derived.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum GuessRule {
    /// Read one record attribute.
    Record(Attribute),
    /// Read a record attribute, else look the zone up by callsign prefix.
    RecordOrLocation(Attribute, Zone),
    /// First non-empty result, in order.
    FirstOf(Vec<GuessRule>),
}

impl GuessRule {
    /// Evaluates the rule; `None` when no source has a value.
    pub fn evaluate(
        &self,
        call: &str,
        record: Option<&HistoricalRecord>,
        locations: Option<&dyn LocationLookup>,
    ) -> Option<String> {
        match self {
            Self::Record(attr) => record.and_then(|r| r.get(*attr)).map(str::to_string),
            Self::RecordOrLocation(attr, zone) => record
                .and_then(|r| r.get(*attr))
                .map(str::to_string)
                .or_else(|| {
                    let locations = locations?;
                    let zone = match zone {
                        Zone::Cq => locations.cq_zone(call),
                        Zone::Itu => locations.itu_zone(call),
                    };
                    zone.map(|z| z.to_string())
                }),
            Self::FirstOf(rules) => rules
                .iter()
                .find_map(|rule| rule.evaluate(call, record, locations)),
        }
    }
}

/// Rule for `field`, or `None` when the field has no historical source.
pub fn rule_for(field: &str) -> Option<GuessRule> {
    use Attribute::*;

    let rule = match field {
        "AGE" => GuessRule::Record(Age),
        "CHECK" => GuessRule::Record(Check),
        "CQZONE" => GuessRule::RecordOrLocation(CqZone, Zone::Cq),
        "ITUZONE" => GuessRule::RecordOrLocation(ItuZone, Zone::Itu),
        "CWPOWER" => GuessRule::Record(CwPower),
        "SSBPOWER" => GuessRule::Record(SsbPower),
        "POWER" => GuessRule::FirstOf(vec![GuessRule::Record(CwPower), GuessRule::Record(SsbPower)]),
        "PREC" => GuessRule::Record(Precedence),
        "NAME" => GuessRule::Record(Name),
        "QTH" => GuessRule::Record(Qth),
        "SECTION" => GuessRule::Record(Section),
        "STATE" | "10MSTATE" | "160MSTATE" => GuessRule::Record(State),
        "SOCIETY" => GuessRule::Record(Society),
        "GRID" => GuessRule::Record(Grid),
        "FOC" => GuessRule::Record(Foc),
        "SKCC" => GuessRule::Record(Skcc),
        "DOK" => GuessRule::Record(Dok),
        "10MNUM" => GuessRule::Record(TenTen),
        // HQ stations send their society instead of a zone.
        "ITUZONE+SOCIETY" => GuessRule::FirstOf(vec![
            GuessRule::Record(Society),
            GuessRule::RecordOrLocation(ItuZone, Zone::Itu),
        ]),
        _ if field.starts_with("QTHX[") => GuessRule::Record(Qth),
        _ if is_choice_name(field) => {
            let rules: Vec<GuessRule> = choice_members(field).filter_map(rule_for).collect();
            if rules.is_empty() {
                return None;
            }
            GuessRule::FirstOf(rules)
        }
        _ => return None,
    };
    Some(rule)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::guess::history::{PrefixLocations, PrefixZones};

    fn record() -> HistoricalRecord {
        HistoricalRecord {
            itu_zone: Some("9".to_string()),
            check: Some("72".to_string()),
            ..HistoricalRecord::new("VE3ABC")
        }
    }

    fn locations() -> PrefixLocations {
        let mut locs = PrefixLocations::new();
        locs.insert("VE3", PrefixZones { cq: 4, itu: 4 });
        locs
    }

    #[test]
    fn zone_falls_back_to_location() {
        let rule = rule_for("CQZONE").unwrap();
        let locs = locations();
        assert_eq!(rule.evaluate("VE3ABC", Some(&record()), Some(&locs)).as_deref(), Some("4"));
        assert_eq!(rule.evaluate("VE3ABC", None, None), None);

        let itu = rule_for("ITUZONE").unwrap();
        assert_eq!(itu.evaluate("VE3ABC", Some(&record()), Some(&locs)).as_deref(), Some("9"));
    }

    #[test]
    fn society_takes_priority_in_iaru_choice() {
        let rule = rule_for("ITUZONE+SOCIETY").unwrap();
        let hq = HistoricalRecord {
            society: Some("RAC".to_string()),
            ..record()
        };
        assert_eq!(rule.evaluate("VE3ABC", Some(&hq), None).as_deref(), Some("RAC"));
        assert_eq!(rule.evaluate("VE3ABC", Some(&record()), None).as_deref(), Some("9"));
    }

    #[test]
    fn generic_choice_uses_member_order() {
        let rule = rule_for("CHECK+NAME").unwrap();
        assert_eq!(
            rule,
            GuessRule::FirstOf(vec![GuessRule::Record(Attribute::Check), GuessRule::Record(Attribute::Name)])
        );
        assert!(rule_for("RST").is_none());
        assert!(rule_for("RST+SERNO").is_none());
        assert_eq!(rule_for("QTHX[HA]"), Some(GuessRule::Record(Attribute::Qth)));
    }
}
