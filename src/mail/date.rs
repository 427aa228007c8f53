//! Normalization of RFC 2822 style `Date` header values

use chrono::{DateTime, FixedOffset, Utc};
use tracing::warn;

/// Layout every recognized date is rewritten to
pub const DATE_OUTPUT_FORMAT: &str = "%Y-%m-%d %H:%M:%S";

/// How the trailing time zone name is written after the numeric offset
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum ZoneName {
    /// `-0600 CST`
    Bare,
    /// `-0600 (CST)`
    Parenthesized,
    /// `-0600`
    Absent,
}

#[derive(Debug, Clone, Copy)]
struct DateFormat {
    zone_name: ZoneName,
    pattern: &'static str,
}

/// Known date layouts in priority order. `%d` accepts single and double digit
/// days. The weekday prefix is optional for every layout and is never checked
/// against the calendar date.
const DATE_FORMATS: &[DateFormat] = &[
    DateFormat {
        zone_name: ZoneName::Bare,
        pattern: "%d %b %Y %H:%M:%S %z",
    },
    DateFormat {
        zone_name: ZoneName::Parenthesized,
        pattern: "%d %b %Y %H:%M:%S %z",
    },
    DateFormat {
        zone_name: ZoneName::Absent,
        pattern: "%d %b %Y %H:%M:%S %z",
    },
    DateFormat {
        zone_name: ZoneName::Absent,
        pattern: "%d %b %Y %H:%M %z",
    },
];

impl DateFormat {
    fn parse(&self, input: &str) -> Option<DateTime<FixedOffset>> {
        let without_zone = strip_zone_name(input, self.zone_name)?;
        let without_weekday = strip_weekday(without_zone);
        DateTime::parse_from_str(without_weekday, self.pattern).ok()
    }
}

fn strip_zone_name(input: &str, zone_name: ZoneName) -> Option<&str> {
    if zone_name == ZoneName::Absent {
        return Some(input);
    }

    let (rest, last) = input.rsplit_once(char::is_whitespace)?;
    let name = match zone_name {
        ZoneName::Parenthesized => last.strip_prefix('(')?.strip_suffix(')')?,
        _ => last,
    };

    if name.is_empty() || !name.chars().all(|c| c.is_ascii_alphabetic()) {
        return None;
    }

    Some(rest.trim_end())
}

fn strip_weekday(input: &str) -> &str {
    match input.split_once(',') {
        Some((day, rest)) if day.trim().chars().all(|c| c.is_ascii_alphabetic()) => {
            rest.trim_start()
        }
        _ => input,
    }
}

/// Rewrites a mail date as `YYYY-MM-DD HH:MM:SS`, keeping the wall clock time
/// of the sender's offset.
///
/// Unrecognized input is returned trimmed but otherwise untouched.
pub fn normalize_date(input: &str) -> String {
    let trimmed = input.trim();

    for format in DATE_FORMATS {
        if let Some(parsed) = format.parse(trimmed) {
            return parsed.format(DATE_OUTPUT_FORMAT).to_string();
        }
    }

    warn!(date = trimmed, "Unable to parse mail date, keeping it as sent");
    trimmed.to_owned()
}

/// Current UTC time in the normalized layout, used when a mail carries no
/// `Date` header.
pub fn received_date() -> String {
    Utc::now().format(DATE_OUTPUT_FORMAT).to_string()
}
