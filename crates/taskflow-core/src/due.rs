//! Due-time parsing for reminder requests.
//!
//! The language service hands us a free-text time ("tomorrow at 3pm",
//! "in 2 hours", "2026-01-05 09:30"). This module turns the common shapes
//! into an absolute instant in the user's zone. Anything it cannot read
//! yields `None` so the caller can ask for clarification.

use chrono::{DateTime, Duration, NaiveDate, NaiveDateTime, NaiveTime, TimeZone, Timelike};
use chrono_tz::Tz;

const LOCAL_FORMATS: &[&str] = &[
    "%Y-%m-%dT%H:%M:%S%.f",
    "%Y-%m-%dT%H:%M",
    "%Y-%m-%d %H:%M:%S%.f",
    "%Y-%m-%d %H:%M",
];

/// Parse `text` relative to `now`, interpreting wall-clock values in `tz`.
pub fn parse_due_time(text: &str, tz: Tz, now: DateTime<Tz>) -> Option<DateTime<Tz>> {
    let trimmed = text.trim();
    if trimmed.is_empty() {
        return None;
    }

    if let Ok(dt) = DateTime::parse_from_rfc3339(&trimmed.replace(' ', "T")) {
        return Some(dt.with_timezone(&tz));
    }
    for fmt in LOCAL_FORMATS {
        if let Ok(naive) = NaiveDateTime::parse_from_str(trimmed, fmt) {
            return localize(tz, naive);
        }
    }

    let lower = trimmed.to_lowercase();
    let words: Vec<&str> = lower
        .split(|c: char| c.is_whitespace() || c == ',')
        .filter(|w| !w.is_empty())
        .collect();

    if let Some(offset) = relative_offset(&words) {
        // Out-of-range amounts are unreadable, not a panic.
        return now.checked_add_signed(offset);
    }

    let day_offset = if words.contains(&"tomorrow") {
        Some(1)
    } else if words.contains(&"today") || words.contains(&"tonight") {
        Some(0)
    } else {
        None
    };
    let clock = clock_time(&words);

    match (day_offset, clock) {
        (Some(days), clock) => {
            let date = now.date_naive() + Duration::days(days);
            let time = clock.unwrap_or_else(|| {
                NaiveTime::from_hms_opt(now.hour(), now.minute(), 0).unwrap_or(NaiveTime::MIN)
            });
            localize(tz, date.and_time(time))
        }
        (None, Some(time)) => {
            let today = localize(tz, now.date_naive().and_time(time))?;
            if today > now {
                Some(today)
            } else {
                let tomorrow: NaiveDate = now.date_naive() + Duration::days(1);
                localize(tz, tomorrow.and_time(time))
            }
        }
        (None, None) => None,
    }
}

/// Resolve a wall-clock time in `tz`; ambiguous times take the earlier instant.
fn localize(tz: Tz, naive: NaiveDateTime) -> Option<DateTime<Tz>> {
    tz.from_local_datetime(&naive).earliest()
}

/// `in N minutes|hours|days`, also accepting glued forms like `in 30min`.
fn relative_offset(words: &[&str]) -> Option<Duration> {
    let pos = words.iter().position(|w| *w == "in")?;
    let first = words.get(pos + 1)?;
    let digits: String = first.chars().take_while(|c| c.is_ascii_digit()).collect();
    let amount: i64 = digits.parse().ok()?;
    let glued = &first[digits.len()..];
    let unit = if glued.is_empty() {
        *words.get(pos + 2)?
    } else {
        glued
    };

    if unit.starts_with("min") {
        Duration::try_minutes(amount)
    } else if unit.starts_with("hour") || unit.starts_with("hr") {
        Duration::try_hours(amount)
    } else if unit.starts_with("day") {
        Duration::try_days(amount)
    } else {
        None
    }
}

/// Find the first clock time: `3pm`, `3 pm`, `3:30pm`, `15:00`, `noon`, `midnight`.
fn clock_time(words: &[&str]) -> Option<NaiveTime> {
    for (i, word) in words.iter().enumerate() {
        match *word {
            "noon" => return NaiveTime::from_hms_opt(12, 0, 0),
            "midnight" => return NaiveTime::from_hms_opt(0, 0, 0),
            _ => {}
        }

        let (body, meridiem) = if let Some(b) = word.strip_suffix("am") {
            (b, Some(false))
        } else if let Some(b) = word.strip_suffix("pm") {
            (b, Some(true))
        } else {
            match words.get(i + 1) {
                Some(&"am") => (*word, Some(false)),
                Some(&"pm") => (*word, Some(true)),
                _ => (*word, None),
            }
        };
        if body.is_empty() || !body.starts_with(|c: char| c.is_ascii_digit()) {
            continue;
        }

        let (hour, minute) = match body.split_once(':') {
            Some((h, m)) => (h.parse::<u32>().ok(), m.parse::<u32>().ok()),
            // A bare number is only a time when it carries am/pm.
            None if meridiem.is_some() => (body.parse::<u32>().ok(), Some(0)),
            None => (None, None),
        };
        let (Some(mut hour), Some(minute)) = (hour, minute) else {
            continue;
        };

        match meridiem {
            Some(pm) => {
                if hour == 0 || hour > 12 {
                    continue;
                }
                if pm && hour != 12 {
                    hour += 12;
                } else if !pm && hour == 12 {
                    hour = 0;
                }
            }
            None if hour > 23 => continue,
            None => {}
        }
        if let Some(t) = NaiveTime::from_hms_opt(hour, minute, 0) {
            return Some(t);
        }
    }
    None
}
