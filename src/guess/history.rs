//! Historical station data and geographic lookups consulted for guesses.

use hashbrown::HashMap;
use serde::{Deserialize, Serialize};

use crate::types::Callsign;

/// Named attribute of a [`HistoricalRecord`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Attribute {
    /// Operator age.
    Age,
    /// Year first licensed (ARRL Sweepstakes check).
    Check,
    /// CQ zone.
    CqZone,
    /// ITU zone.
    ItuZone,
    /// Power sent on CW.
    CwPower,
    /// Power sent on phone.
    SsbPower,
    /// Sweepstakes precedence.
    Precedence,
    /// Operator name.
    Name,
    /// Free-form location.
    Qth,
    /// ARRL/RAC section.
    Section,
    /// US state or Canadian province.
    State,
    /// IARU member society.
    Society,
    /// Maidenhead grid square.
    Grid,
    /// FOC membership number.
    Foc,
    /// SKCC membership number.
    Skcc,
    /// DARC DOK.
    Dok,
    /// Ten-Ten membership number.
    TenTen,
}

/// Canonical per-callsign attributes from a station-data roster.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct HistoricalRecord {
    /// Station callsign.
    pub call: String,
    /// Operator age.
    pub age: Option<String>,
    /// Sweepstakes check.
    pub check: Option<String>,
    /// CQ zone.
    pub cq_zone: Option<String>,
    /// ITU zone.
    pub itu_zone: Option<String>,
    /// CW power.
    pub cw_power: Option<String>,
    /// Phone power.
    pub ssb_power: Option<String>,
    /// Sweepstakes precedence.
    pub precedence: Option<String>,
    /// Operator name.
    pub name: Option<String>,
    /// Free-form location.
    pub qth: Option<String>,
    /// Section.
    pub section: Option<String>,
    /// State or province.
    pub state: Option<String>,
    /// IARU society.
    pub society: Option<String>,
    /// Grid square.
    pub grid: Option<String>,
    /// FOC number.
    pub foc: Option<String>,
    /// SKCC number.
    pub skcc: Option<String>,
    /// DARC DOK.
    pub dok: Option<String>,
    /// Ten-Ten number.
    pub ten_ten: Option<String>,
}

impl HistoricalRecord {
    /// Empty record for `call`.
    pub fn new(call: impl AsRef<str>) -> Self {
        Self {
            call: Callsign::new(call).as_str().to_string(),
            ..Self::default()
        }
    }

    /// Non-empty value of `attr`.
    pub fn get(&self, attr: Attribute) -> Option<&str> {
        let value = match attr {
            Attribute::Age => &self.age,
            Attribute::Check => &self.check,
            Attribute::CqZone => &self.cq_zone,
            Attribute::ItuZone => &self.itu_zone,
            Attribute::CwPower => &self.cw_power,
            Attribute::SsbPower => &self.ssb_power,
            Attribute::Precedence => &self.precedence,
            Attribute::Name => &self.name,
            Attribute::Qth => &self.qth,
            Attribute::Section => &self.section,
            Attribute::State => &self.state,
            Attribute::Society => &self.society,
            Attribute::Grid => &self.grid,
            Attribute::Foc => &self.foc,
            Attribute::Skcc => &self.skcc,
            Attribute::Dok => &self.dok,
            Attribute::TenTen => &self.ten_ten,
        };
        value.as_deref().map(str::trim).filter(|v| !v.is_empty())
    }
}

/// Read-only roster of historical records keyed by callsign.
pub trait HistorySource: Send + Sync {
    /// Record for `call` (already normalized), if any.
    fn lookup(&self, call: &str) -> Option<HistoricalRecord>;
}

/// Zone assignment derived from a callsign's prefix.
pub trait LocationLookup: Send + Sync {
    /// CQ zone of `call`.
    fn cq_zone(&self, call: &str) -> Option<u32>;
    /// ITU zone of `call`.
    fn itu_zone(&self, call: &str) -> Option<u32>;
}

/// Roster held in memory.
#[derive(Debug, Clone, Default)]
pub struct InMemoryHistory {
    records: HashMap<String, HistoricalRecord>,
}

impl InMemoryHistory {
    /// Creates an empty roster.
    pub fn new() -> Self {
        Self::default()
    }

    /// Decodes a JSON array of records.
    pub fn from_json_str(input: &str) -> Result<Self, serde_json::Error> {
        let records: Vec<HistoricalRecord> = serde_json::from_str(input)?;
        let mut history = Self::new();
        for record in records {
            history.insert(record);
        }
        Ok(history)
    }

    /// Adds or replaces the record for its callsign.
    pub fn insert(&mut self, record: HistoricalRecord) {
        let call = Callsign::new(&record.call);
        self.records.insert(call.as_str().to_string(), record);
    }

    /// Number of records.
    pub fn len(&self) -> usize {
        self.records.len()
    }

    /// Returns true when empty.
    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }
}

impl HistorySource for InMemoryHistory {
    fn lookup(&self, call: &str) -> Option<HistoricalRecord> {
        self.records.get(call).cloned()
    }
}

/// Zones of one prefix.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PrefixZones {
    /// CQ zone.
    pub cq: u32,
    /// ITU zone.
    pub itu: u32,
}

/// Longest-prefix zone table.
#[derive(Debug, Clone, Default)]
pub struct PrefixLocations {
    prefixes: HashMap<String, PrefixZones>,
    longest: usize,
}

impl PrefixLocations {
    /// Creates an empty table.
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds zones for `prefix`.
    pub fn insert(&mut self, prefix: impl AsRef<str>, zones: PrefixZones) {
        let prefix = prefix.as_ref().trim().to_ascii_uppercase();
        self.longest = self.longest.max(prefix.len());
        self.prefixes.insert(prefix, zones);
    }

    fn zones(&self, call: &str) -> Option<PrefixZones> {
        // VE3/G4ABC and G4ABC/VE3 both locate by the shorter part; /P and
        // /QRP carry no location.
        let base = match call.split_once('/') {
            Some((left, right)) => {
                let right_locates =
                    right.len() < left.len() && right.chars().any(|c| c.is_ascii_digit());
                if right_locates { right } else { left }
            }
            None => call,
        };
        let max = self.longest.min(base.len());
        (1..=max)
            .rev()
            .find_map(|len| base.get(..len).and_then(|p| self.prefixes.get(p)))
            .copied()
    }
}

impl LocationLookup for PrefixLocations {
    fn cq_zone(&self, call: &str) -> Option<u32> {
        self.zones(call).map(|z| z.cq)
    }

    fn itu_zone(&self, call: &str) -> Option<u32> {
        self.zones(call).map(|z| z.itu)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn record_get_skips_blank_values() {
        let record = HistoricalRecord {
            name: Some("  ".to_string()),
            cq_zone: Some(" 4 ".to_string()),
            ..HistoricalRecord::new("ve3abc")
        };
        assert_eq!(record.call, "VE3ABC");
        assert_eq!(record.get(Attribute::Name), None);
        assert_eq!(record.get(Attribute::CqZone), Some("4"));
        assert_eq!(record.get(Attribute::Society), None);
    }

    #[test]
    fn history_decodes_json_roster() {
        let history = InMemoryHistory::from_json_str(
            r#"[{"call": "k1ar", "check": "76", "section": "NH"}, {"call": "DL1ABC", "dok": "A01"}]"#,
        )
        .unwrap();
        assert_eq!(history.len(), 2);
        let rec = history.lookup("K1AR").unwrap();
        assert_eq!(rec.get(Attribute::Check), Some("76"));
        assert!(history.lookup("W1AW").is_none());
    }

    #[test]
    fn unlisted_roster_columns_are_ignored() {
        let history = InMemoryHistory::from_json_str(
            r#"[{"call": "N2IC", "section": "STX", "userText": "tnx", "exch1": "599"}]"#,
        )
        .unwrap();
        let rec = history.lookup("N2IC").unwrap();
        assert_eq!(rec.get(Attribute::Section), Some("STX"));
        assert_eq!(rec, HistoricalRecord {
            section: Some("STX".to_string()),
            ..HistoricalRecord::new("N2IC")
        });
    }

    #[test]
    fn longest_prefix_wins() {
        let mut locs = PrefixLocations::new();
        locs.insert("VE", PrefixZones { cq: 5, itu: 9 });
        locs.insert("VE3", PrefixZones { cq: 4, itu: 4 });
        locs.insert("G", PrefixZones { cq: 14, itu: 27 });
        assert_eq!(locs.cq_zone("VE3ABC"), Some(4));
        assert_eq!(locs.cq_zone("VE1XYZ"), Some(5));
        assert_eq!(locs.itu_zone("G4ABC"), Some(27));
        assert_eq!(locs.itu_zone("VE3/G4ABC"), Some(4));
        assert_eq!(locs.itu_zone("G4ABC/VE3"), Some(4));
        assert_eq!(locs.cq_zone("G4ABC/P"), Some(14));
        assert_eq!(locs.cq_zone("JA1ABC"), None);
    }
}
