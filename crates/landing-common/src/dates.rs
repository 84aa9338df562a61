//! Date and time stamps for output directories and object keys
//!
//! Extraction output lands under `<root>/<YYYYMMDD>/<database>`. An unsupported
//! format or zone falls back to UTC with the default format.

use chrono::format::{Item, StrftimeItems};
use chrono::{DateTime, FixedOffset, Local, Utc};
use tracing::warn;

/// Default format for [`current_date`]
pub const DEFAULT_DATE_FORMAT: &str = "%Y%m%d";

/// Default format for [`current_time`]
pub const DEFAULT_TIME_FORMAT: &str = "%H%M%S";

/// Default format for [`current_date_time`]
pub const DEFAULT_DATE_TIME_FORMAT: &str = "%Y%m%d%H%M%S";

/// Timezone a stamp is rendered in
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Zone {
    Utc,
    Local,
    Fixed(FixedOffset),
}

impl std::str::FromStr for Zone {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        let trimmed = s.trim();
        match trimmed.to_ascii_lowercase().as_str() {
            "utc" | "z" | "gmt" => return Ok(Zone::Utc),
            "local" => return Ok(Zone::Local),
            _ => {},
        }
        parse_offset(trimmed)
            .map(Zone::Fixed)
            .ok_or_else(|| format!("Invalid time zone: {}", s))
    }
}

/// Parse `+HH:MM`, `-HH:MM`, `+HHMM` or `+HH`
fn parse_offset(s: &str) -> Option<FixedOffset> {
    let (sign, rest) = match s.as_bytes().first()? {
        b'+' => (1, &s[1..]),
        b'-' => (-1, &s[1..]),
        _ => return None,
    };

    let digits: String = rest.chars().filter(|c| *c != ':').collect();
    if !digits.chars().all(|c| c.is_ascii_digit()) {
        return None;
    }
    let (hours, minutes) = match digits.len() {
        2 => (digits.parse::<i32>().ok()?, 0),
        4 => (digits[..2].parse::<i32>().ok()?, digits[2..].parse::<i32>().ok()?),
        _ => return None,
    };
    if hours > 23 || minutes > 59 {
        return None;
    }

    FixedOffset::east_opt(sign * (hours * 3600 + minutes * 60))
}

fn is_valid_format(format: &str) -> bool {
    !format.is_empty() && !StrftimeItems::new(format).any(|item| matches!(item, Item::Error))
}

fn render(now: DateTime<Utc>, format: &str, zone: &str, fallback: &str) -> String {
    let parsed_zone = zone.parse::<Zone>();
    match (parsed_zone, is_valid_format(format)) {
        (Ok(Zone::Utc), true) => now.format(format).to_string(),
        (Ok(Zone::Local), true) => now.with_timezone(&Local).format(format).to_string(),
        (Ok(Zone::Fixed(offset)), true) => now.with_timezone(&offset).format(format).to_string(),
        (zone_result, format_ok) => {
            warn!(
                format = %format,
                zone = %zone,
                zone_valid = zone_result.is_ok(),
                format_valid = format_ok,
                "Unsupported date format or zone, falling back to UTC default"
            );
            now.format(fallback).to_string()
        },
    }
}

/// Current date, e.g. `20240130`
pub fn current_date(format: &str, zone: &str) -> String {
    render(Utc::now(), format, zone, DEFAULT_DATE_FORMAT)
}

/// Current time of day, e.g. `232118`
pub fn current_time(format: &str, zone: &str) -> String {
    render(Utc::now(), format, zone, DEFAULT_TIME_FORMAT)
}

/// Current date and time, e.g. `20240130232118`
pub fn current_date_time(format: &str, zone: &str) -> String {
    render(Utc::now(), format, zone, DEFAULT_DATE_TIME_FORMAT)
}

/// Today's date in UTC with the default format
pub fn today() -> String {
    current_date(DEFAULT_DATE_FORMAT, "UTC")
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn fixed_instant() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2022, 1, 30, 23, 21, 18).unwrap()
    }

    #[test]
    fn test_render_defaults() {
        let now = fixed_instant();
        assert_eq!(render(now, DEFAULT_DATE_FORMAT, "UTC", DEFAULT_DATE_FORMAT), "20220130");
        assert_eq!(render(now, DEFAULT_TIME_FORMAT, "utc", DEFAULT_TIME_FORMAT), "232118");
        assert_eq!(
            render(now, DEFAULT_DATE_TIME_FORMAT, "UTC", DEFAULT_DATE_TIME_FORMAT),
            "20220130232118"
        );
    }

    #[test]
    fn test_render_fixed_offset_crosses_midnight() {
        let now = fixed_instant();
        assert_eq!(render(now, "%Y-%m-%d", "+05:30", DEFAULT_DATE_FORMAT), "2022-01-31");
        assert_eq!(render(now, "%H%M", "-0100", DEFAULT_TIME_FORMAT), "2221");
    }

    #[test]
    fn test_invalid_zone_falls_back_to_utc_default() {
        let now = fixed_instant();
        assert_eq!(render(now, "%d/%m/%Y", "Mars/Olympus", DEFAULT_DATE_FORMAT), "20220130");
    }

    #[test]
    fn test_invalid_format_falls_back() {
        let now = fixed_instant();
        assert_eq!(render(now, "%Q", "UTC", DEFAULT_DATE_FORMAT), "20220130");
        assert_eq!(render(now, "", "UTC", DEFAULT_TIME_FORMAT), "232118");
    }

    #[test]
    fn test_zone_parsing() {
        assert_eq!("UTC".parse::<Zone>().unwrap(), Zone::Utc);
        assert_eq!("local".parse::<Zone>().unwrap(), Zone::Local);
        assert_eq!(
            "+02".parse::<Zone>().unwrap(),
            Zone::Fixed(FixedOffset::east_opt(7200).unwrap())
        );
        assert!("+25:00".parse::<Zone>().is_err());
        assert!("Europe/Paris".parse::<Zone>().is_err());
    }

    #[test]
    fn test_today_shape() {
        let date = today();
        assert_eq!(date.len(), 8);
        assert!(date.chars().all(|c| c.is_ascii_digit()));
    }
}
