//! Pure condition checks run against every polled aircraft.
//!
//! Nothing here touches I/O or cooldown state: a matcher only says which
//! conditions hold for one snapshot. The dispatcher decides whether they fire.

use serde::Serialize;
use std::collections::BTreeMap;

use crate::cooldown::AlertKey;
use crate::reference_data::AircraftReference;
use crate::sightings::AircraftSnapshot;
use crate::watchlist::Watchlist;

pub const DEFAULT_MILITARY_PREFIXES: &[&str] = &["PAT", "ANVIL", "RCH", "TRACTR", "SLICK"];

pub fn default_squawk_meanings() -> BTreeMap<String, String> {
    [
        ("7500", "Aircraft Hijacking"),
        ("7600", "Radio Failure"),
        ("7700", "Emergency"),
        ("5000", "NORAD"),
        ("5400", "NORAD"),
        ("6100", "NORAD"),
        ("6400", "NORAD"),
        ("7777", "Military intercept"),
        ("0000", "discrete VFR operations"),
        ("1277", "Search & Rescue"),
    ]
    .into_iter()
    .map(|(code, meaning)| (code.to_string(), meaning.to_string()))
    .collect()
}

pub fn default_military_prefixes() -> Vec<String> {
    DEFAULT_MILITARY_PREFIXES
        .iter()
        .map(|p| p.to_string())
        .collect()
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub enum AlertClass {
    Squawk,
    Watchlist,
    MilitaryCallsign,
}

impl AlertClass {
    /// Heading of the alert body (`<title> Alert!`)
    pub fn title(&self) -> &'static str {
        match self {
            AlertClass::Squawk => "Squawk",
            AlertClass::Watchlist => "Watchlist",
            AlertClass::MilitaryCallsign => "Military Callsign",
        }
    }

    pub fn subject(&self) -> &'static str {
        match self {
            AlertClass::Squawk => "SQUAWK ALERT!",
            AlertClass::Watchlist => "WATCHLIST ALERT!",
            AlertClass::MilitaryCallsign => "MILITARY CALLSIGN",
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            AlertClass::Squawk => "squawk",
            AlertClass::Watchlist => "watchlist",
            AlertClass::MilitaryCallsign => "military",
        }
    }
}

/// A condition that held for one snapshot
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CandidateAlert {
    pub class: AlertClass,
    pub hex: String,
    /// Class-specific line, e.g. `Squawk: 7700 (Emergency)`
    pub detail: String,
    pub snapshot: AircraftSnapshot,
    pub context: Option<AircraftReference>,
    /// Cooldown class: `squawk`, or `watchlist:<entry key>`
    pub cooldown_class: String,
}

impl CandidateAlert {
    fn new(
        class: AlertClass,
        cooldown_class: String,
        detail: String,
        snapshot: &AircraftSnapshot,
        context: Option<&AircraftReference>,
    ) -> Self {
        Self {
            class,
            hex: snapshot.hex.clone(),
            detail,
            snapshot: snapshot.clone(),
            context: context.cloned(),
            cooldown_class,
        }
    }

    pub fn key(&self) -> AlertKey {
        AlertKey::new(self.cooldown_class.clone(), &self.hex)
    }
}

/// Informational event; logged, never notified
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct MilitarySighting {
    pub prefix: String,
    pub alert: CandidateAlert,
}

/// Everything the matchers found for one snapshot
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Evaluation {
    pub military: Option<MilitarySighting>,
    pub candidates: Vec<CandidateAlert>,
}

#[derive(Debug, Clone)]
pub struct ConditionMatchers {
    squawk_meanings: BTreeMap<String, String>,
    military_prefixes: Vec<String>,
    watchlist: Watchlist,
}

impl ConditionMatchers {
    pub fn new(
        squawk_meanings: BTreeMap<String, String>,
        military_prefixes: Vec<String>,
        watchlist: Watchlist,
    ) -> Self {
        Self {
            squawk_meanings,
            military_prefixes: military_prefixes
                .into_iter()
                .map(|p| p.trim().to_uppercase())
                .filter(|p| !p.is_empty())
                .collect(),
            watchlist,
        }
    }

    pub fn with_defaults(watchlist: Watchlist) -> Self {
        Self::new(default_squawk_meanings(), default_military_prefixes(), watchlist)
    }

    pub fn watchlist(&self) -> &Watchlist {
        &self.watchlist
    }

    pub fn evaluate(
        &self,
        snapshot: &AircraftSnapshot,
        context: Option<&AircraftReference>,
    ) -> Evaluation {
        let mut candidates = Vec::new();
        candidates.extend(self.match_squawk(snapshot, context));
        candidates.extend(self.match_watchlist(snapshot, context));
        Evaluation {
            military: self.match_military(snapshot, context),
            candidates,
        }
    }

    /// First configured prefix the callsign starts with
    pub fn match_military(
        &self,
        snapshot: &AircraftSnapshot,
        context: Option<&AircraftReference>,
    ) -> Option<MilitarySighting> {
        let callsign = snapshot.callsign();
        if callsign.is_empty() {
            return None;
        }
        let prefix = self
            .military_prefixes
            .iter()
            .find(|prefix| callsign.starts_with(prefix.as_str()))?;

        Some(MilitarySighting {
            prefix: prefix.clone(),
            alert: CandidateAlert::new(
                AlertClass::MilitaryCallsign,
                AlertClass::MilitaryCallsign.as_str().to_string(),
                format!("Callsign Prefix: {prefix}"),
                snapshot,
                context,
            ),
        })
    }

    pub fn match_squawk(
        &self,
        snapshot: &AircraftSnapshot,
        context: Option<&AircraftReference>,
    ) -> Option<CandidateAlert> {
        let code = snapshot.squawk.as_deref()?.trim();
        let meaning = self.squawk_meanings.get(code)?;
        Some(CandidateAlert::new(
            AlertClass::Squawk,
            AlertClass::Squawk.as_str().to_string(),
            format!("Squawk: {code} ({meaning})"),
            snapshot,
            context,
        ))
    }

    /// One candidate per matching entry, in watchlist order
    pub fn match_watchlist(
        &self,
        snapshot: &AircraftSnapshot,
        context: Option<&AircraftReference>,
    ) -> Vec<CandidateAlert> {
        self.watchlist
            .matching(&snapshot.hex, snapshot.callsign())
            .map(|entry| {
                CandidateAlert::new(
                    AlertClass::Watchlist,
                    format!("watchlist:{}", entry.key),
                    format!("Label: {}", entry.label),
                    snapshot,
                    context,
                )
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn snapshot(hex: &str, flight: Option<&str>, squawk: Option<&str>) -> AircraftSnapshot {
        AircraftSnapshot {
            flight: flight.map(str::to_string),
            squawk: squawk.map(str::to_string),
            ..AircraftSnapshot::new(hex)
        }
    }

    fn matchers(watchlist: &str) -> ConditionMatchers {
        ConditionMatchers::with_defaults(Watchlist::parse(watchlist))
    }

    #[test]
    fn test_emergency_squawk_yields_one_candidate() {
        let m = matchers("");
        let eval = m.evaluate(&snapshot("abc123", None, Some("7700")), None);

        assert_eq!(eval.candidates.len(), 1);
        let alert = &eval.candidates[0];
        assert_eq!(alert.class, AlertClass::Squawk);
        assert_eq!(alert.detail, "Squawk: 7700 (Emergency)");
        assert_eq!(alert.key(), AlertKey::new("squawk", "ABC123"));
    }

    #[test]
    fn test_ordinary_squawk_yields_nothing() {
        let m = matchers("");
        assert!(m.match_squawk(&snapshot("abc123", None, Some("1234")), None).is_none());
        assert!(m.match_squawk(&snapshot("abc123", None, None), None).is_none());
    }

    #[test]
    fn test_watchlist_candidate_per_entry() {
        let m = matchers("DAL*:Delta\nA12345:Governor\n");
        let eval = m.evaluate(&snapshot("A12345", Some("DAL88"), None), None);

        let keys: Vec<_> = eval.candidates.iter().map(|c| c.key()).collect();
        assert_eq!(
            keys,
            vec![
                AlertKey::new("watchlist:DAL*", "A12345"),
                AlertKey::new("watchlist:A12345", "A12345"),
            ]
        );
        assert_eq!(eval.candidates[0].detail, "Label: Delta");
        assert_eq!(eval.candidates[1].detail, "Label: Governor");
    }

    #[test]
    fn test_watchlist_glob_does_not_match_other_airline() {
        let m = matchers("DAL*:Delta\n");
        assert!(m.match_watchlist(&snapshot("A00001", Some("UAL123"), None), None).is_empty());
    }

    #[test]
    fn test_military_prefix_first_match() {
        let m = ConditionMatchers::new(
            default_squawk_meanings(),
            vec!["RCH".into(), "RC".into()],
            Watchlist::default(),
        );
        let event = m
            .match_military(&snapshot("AE07E1", Some("RCH405"), None), None)
            .unwrap();
        assert_eq!(event.prefix, "RCH");
        assert_eq!(event.alert.class, AlertClass::MilitaryCallsign);

        assert!(m.match_military(&snapshot("AE07E1", None, None), None).is_none());
        assert!(m.match_military(&snapshot("A00001", Some("DAL1"), None), None).is_none());
    }

    #[test]
    fn test_military_is_not_a_candidate() {
        let m = matchers("");
        let eval = m.evaluate(&snapshot("AE07E1", Some("PAT21"), Some("4321")), None);
        assert!(eval.military.is_some());
        assert!(eval.candidates.is_empty());
    }

    #[test]
    fn test_candidate_carries_reference_context() {
        let m = matchers("");
        let context = AircraftReference {
            operator: Some("US Army".into()),
            aircraft_type: Some("UH-60".into()),
            image_link: None,
        };
        let alert = m
            .match_squawk(&snapshot("AE0001", None, Some("7600")), Some(&context))
            .unwrap();
        assert_eq!(alert.context, Some(context));
        assert_eq!(alert.detail, "Squawk: 7600 (Radio Failure)");
    }
}
