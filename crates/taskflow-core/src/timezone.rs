//! Free-text country/city → IANA zone resolution.
//!
//! Lookups are case-insensitive and never fail: a miss logs a warning and
//! falls back to the configured default zone.

use chrono_tz::Tz;
use tracing::warn;

/// Zone used when nothing else is configured.
pub const DEFAULT_ZONE: Tz = Tz::Asia__Kolkata;

const COUNTRY_ZONES: &[(&str, Tz)] = &[
    ("india", Tz::Asia__Kolkata),
    ("nepal", Tz::Asia__Kathmandu),
    ("usa", Tz::America__New_York),
    ("united states", Tz::America__New_York),
    ("uk", Tz::Europe__London),
    ("united kingdom", Tz::Europe__London),
    ("canada", Tz::America__Toronto),
    ("australia", Tz::Australia__Sydney),
    ("germany", Tz::Europe__Berlin),
    ("france", Tz::Europe__Paris),
    ("japan", Tz::Asia__Tokyo),
    ("china", Tz::Asia__Shanghai),
    ("singapore", Tz::Asia__Singapore),
    ("uae", Tz::Asia__Dubai),
    ("united arab emirates", Tz::Asia__Dubai),
    ("saudi arabia", Tz::Asia__Riyadh),
];

const CITY_ZONES: &[(&str, Tz)] = &[
    ("mumbai", Tz::Asia__Kolkata),
    ("delhi", Tz::Asia__Kolkata),
    ("bangalore", Tz::Asia__Kolkata),
    ("chennai", Tz::Asia__Kolkata),
    ("kolkata", Tz::Asia__Kolkata),
    ("kathmandu", Tz::Asia__Kathmandu),
    ("new york", Tz::America__New_York),
    ("los angeles", Tz::America__Los_Angeles),
    ("london", Tz::Europe__London),
    ("toronto", Tz::America__Toronto),
    ("sydney", Tz::Australia__Sydney),
    ("tokyo", Tz::Asia__Tokyo),
];

/// Zone words that may appear inside a free-text time ("3pm IST"), mapped to a country.
const HINT_WORDS: &[(&[&str], &str)] = &[
    (&["india", "indian", "ist"], "India"),
    (&["usa", "america", "est", "pst", "cst"], "USA"),
    (&["uk", "britain", "london", "gmt", "bst"], "UK"),
];

/// Maps a user's country or city to a fixed zone.
#[derive(Debug, Clone, Copy)]
pub struct TimezoneResolver {
    default_zone: Tz,
}

impl Default for TimezoneResolver {
    fn default() -> Self {
        Self::new(DEFAULT_ZONE)
    }
}

impl TimezoneResolver {
    /// Create a resolver that falls back to `default_zone` on a miss.
    pub fn new(default_zone: Tz) -> Self {
        Self { default_zone }
    }

    /// The fallback zone.
    pub fn default_zone(&self) -> Tz {
        self.default_zone
    }

    /// Resolve a zone: country table first, then city table, then the default.
    pub fn resolve(&self, country: Option<&str>, location: Option<&str>) -> Tz {
        if let Some(tz) = country.and_then(|c| lookup(COUNTRY_ZONES, c)) {
            return tz;
        }
        if let Some(tz) = location.and_then(|l| lookup(CITY_ZONES, l)) {
            return tz;
        }
        warn!(
            "could not determine timezone for country={country:?}, location={location:?}, \
             defaulting to {}",
            self.default_zone
        );
        self.default_zone
    }

    /// Resolve a single free-text place that may be either a country or a city.
    pub fn resolve_place(&self, place: &str) -> Tz {
        self.resolve(Some(place), Some(place))
    }

    /// Parse a stored zone id, falling back to the default for unknown ids.
    pub fn zone_or_default(&self, zone_id: &str) -> Tz {
        zone_id.parse::<Tz>().unwrap_or_else(|_| {
            warn!("unknown zone id '{zone_id}', using {}", self.default_zone);
            self.default_zone
        })
    }
}

/// Whether `name` is in the country table.
pub fn is_known_country(name: &str) -> bool {
    lookup(COUNTRY_ZONES, name).is_some()
}

/// Infer a country from zone words inside a free-text time expression.
pub fn detect_country_hint(text: &str) -> Option<&'static str> {
    let lower = text.to_lowercase();
    let words: Vec<&str> = lower
        .split(|c: char| !c.is_alphanumeric())
        .filter(|w| !w.is_empty())
        .collect();
    HINT_WORDS
        .iter()
        .find(|(hints, _)| hints.iter().any(|h| words.contains(h)))
        .map(|(_, country)| *country)
}

fn lookup(table: &[(&str, Tz)], key: &str) -> Option<Tz> {
    let key = key.trim().to_lowercase();
    table
        .iter()
        .find(|(name, _)| *name == key)
        .map(|(_, tz)| *tz)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_country_lookup_case_insensitive() {
        let r = TimezoneResolver::default();
        assert_eq!(r.resolve(Some("  United Kingdom "), None), Tz::Europe__London);
        assert_eq!(r.resolve(Some("JAPAN"), None), Tz::Asia__Tokyo);
    }

    #[test]
    fn test_country_wins_over_city() {
        let r = TimezoneResolver::default();
        assert_eq!(
            r.resolve(Some("germany"), Some("tokyo")),
            Tz::Europe__Berlin
        );
    }

    #[test]
    fn test_city_used_when_country_unknown() {
        let r = TimezoneResolver::default();
        assert_eq!(
            r.resolve(Some("atlantis"), Some("Los Angeles")),
            Tz::America__Los_Angeles
        );
        assert_eq!(r.resolve(None, Some("kathmandu")), Tz::Asia__Kathmandu);
    }

    #[test]
    fn test_miss_returns_configured_default() {
        let r = TimezoneResolver::new(Tz::Europe__Paris);
        assert_eq!(r.resolve(Some("narnia"), Some("gotham")), Tz::Europe__Paris);
        assert_eq!(r.resolve(None, None), Tz::Europe__Paris);
    }

    #[test]
    fn test_resolve_place_accepts_either_table() {
        let r = TimezoneResolver::default();
        assert_eq!(r.resolve_place("Singapore"), Tz::Asia__Singapore);
        assert_eq!(r.resolve_place("toronto"), Tz::America__Toronto);
        assert!(is_known_country(" UAE"));
        assert!(!is_known_country("toronto"));
    }

    #[test]
    fn test_zone_or_default() {
        let r = TimezoneResolver::default();
        assert_eq!(r.zone_or_default("Asia/Dubai"), Tz::Asia__Dubai);
        assert_eq!(r.zone_or_default("Mars/Olympus"), DEFAULT_ZONE);
    }

    #[test]
    fn test_detect_country_hint() {
        assert_eq!(detect_country_hint("tomorrow 3pm IST"), Some("India"));
        assert_eq!(detect_country_hint("at 9am pst"), Some("USA"));
        assert_eq!(detect_country_hint("noon London time"), Some("UK"));
        // "test" contains "est" but is not a zone word.
        assert_eq!(detect_country_hint("test at 5pm"), None);
    }
}
