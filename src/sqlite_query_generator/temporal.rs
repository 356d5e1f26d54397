//! Temporal value handling.
//!
//! Cypher temporal values travel through the SQL layer as ISO-8601 strings
//! inside JSON; ordering at runtime is the `cypher_lt`-family helpers'
//! problem. What lives here is everything the translator can do at
//! translation time:
//! - parsing of ISO and compact literal forms (`2020`, `202006`, `2020183`,
//!   `2020W052`, `20200630`, with the dashed equivalents),
//! - construction from component maps (calendar, week, ordinal, quarter),
//! - duration values with lowering to `DATETIME(base, modifier, ..)` chains,
//! - the offset-normalized UTC nanosecond ordering key the helper functions
//!   are specified against.

use chrono::{Datelike, NaiveDate, NaiveDateTime, NaiveTime, Timelike};
use lazy_static::lazy_static;
use regex::Regex;
use serde_json::Value;

use super::errors::TranslatorError;

/// Which temporal constructor a string or map is being parsed for.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TemporalKind {
    Date,
    LocalTime,
    Time,
    LocalDateTime,
    DateTime,
}

impl TemporalKind {
    pub fn function_name(&self) -> &'static str {
        match self {
            TemporalKind::Date => "date",
            TemporalKind::LocalTime => "localtime",
            TemporalKind::Time => "time",
            TemporalKind::LocalDateTime => "localdatetime",
            TemporalKind::DateTime => "datetime",
        }
    }

    /// The SQLite scalar used when a dynamic operand must be normalized at
    /// runtime instead of at translation time.
    pub fn sqlite_function(&self) -> &'static str {
        match self {
            TemporalKind::Date => "DATE",
            TemporalKind::LocalTime | TemporalKind::Time => "TIME",
            TemporalKind::LocalDateTime | TemporalKind::DateTime => "DATETIME",
        }
    }
}

lazy_static! {
    static ref COMPACT_WEEK_DATE: Regex =
        Regex::new(r"^(\d{4})-?W(\d{2})-?(\d)?$").unwrap();
    static ref COMPACT_QUARTER_DATE: Regex =
        Regex::new(r"^(\d{4})-?Q([1-4])-?(\d{2})?$").unwrap();
    static ref COMPACT_TIME: Regex = Regex::new(
        r"^(\d{2})(?::?(\d{2}))?(?::?(\d{2}))?(?:[.,](\d{1,9}))?(Z|[+-]\d{2}(?::?\d{2})?)?$"
    )
    .unwrap();
}

/// A parsed temporal value, held in components so each constructor kind can
/// render its own canonical string.
#[derive(Debug, Clone, PartialEq)]
pub struct TemporalValue {
    pub date: Option<NaiveDate>,
    pub time: Option<NaiveTime>,
    pub nanosecond: u32,
    /// Offset from UTC in seconds; `None` for local forms.
    pub offset_seconds: Option<i32>,
}

impl TemporalValue {
    fn date_only(date: NaiveDate) -> Self {
        TemporalValue {
            date: Some(date),
            time: None,
            nanosecond: 0,
            offset_seconds: None,
        }
    }

    /// Canonical ISO rendering for the given constructor kind.
    pub fn render(&self, kind: TemporalKind) -> String {
        let date = self
            .date
            .map(|d| format!("{:04}-{:02}-{:02}", d.year(), d.month(), d.day()));
        let time = self.time.map(|t| {
            let mut s = format!("{:02}:{:02}:{:02}", t.hour(), t.minute(), t.second());
            if self.nanosecond > 0 {
                s.push_str(&format!(".{:09}", self.nanosecond));
                while s.ends_with('0') {
                    s.pop();
                }
            }
            s
        });
        let offset = match self.offset_seconds {
            Some(0) => "Z".to_string(),
            Some(secs) => {
                let sign = if secs < 0 { '-' } else { '+' };
                let abs = secs.abs();
                format!("{}{:02}:{:02}", sign, abs / 3600, (abs % 3600) / 60)
            }
            None => String::new(),
        };
        match kind {
            TemporalKind::Date => date.unwrap_or_default(),
            TemporalKind::LocalTime => time.unwrap_or_default(),
            TemporalKind::Time => format!("{}{}", time.unwrap_or_default(), offset),
            TemporalKind::LocalDateTime => {
                format!("{}T{}", date.unwrap_or_default(), time.unwrap_or_default())
            }
            TemporalKind::DateTime => format!(
                "{}T{}{}",
                date.unwrap_or_default(),
                time.unwrap_or_default(),
                offset
            ),
        }
    }

    /// Offset-normalized UTC nanosecond scalar; the ordering key contract
    /// the host's `cypher_lt`-family helpers implement for temporal strings.
    /// Dates order at midnight, times on the epoch date, local forms as UTC.
    pub fn utc_order_key(&self) -> i128 {
        let date = self
            .date
            .unwrap_or_else(|| NaiveDate::from_ymd_opt(1970, 1, 1).unwrap());
        let time = self.time.unwrap_or_else(|| NaiveTime::MIN);
        let dt = NaiveDateTime::new(date, time);
        let epoch_secs = dt.and_utc().timestamp() as i128 - self.offset_seconds.unwrap_or(0) as i128;
        epoch_secs * 1_000_000_000 + self.nanosecond as i128
    }
}

fn invalid(kind: TemporalKind, input: &str) -> TranslatorError {
    TranslatorError::invalid_argument(format!(
        "cannot parse '{}' as a {} value",
        input,
        kind.function_name()
    ))
}

/// Parse a temporal string for `kind`, accepting ISO and compact forms.
pub fn parse_temporal_string(kind: TemporalKind, input: &str) -> Result<TemporalValue, TranslatorError> {
    let input = input.trim();
    match kind {
        TemporalKind::Date => parse_date_part(input).ok_or_else(|| invalid(kind, input)),
        TemporalKind::LocalTime | TemporalKind::Time => {
            let value = parse_time_part(input).ok_or_else(|| invalid(kind, input))?;
            if kind == TemporalKind::LocalTime && value.offset_seconds.is_some() {
                return Err(invalid(kind, input));
            }
            Ok(value)
        }
        TemporalKind::LocalDateTime | TemporalKind::DateTime => {
            let (date_part, time_part) = match input.split_once('T') {
                Some((d, t)) => (d, Some(t)),
                None => (input, None),
            };
            let date = parse_date_part(date_part).ok_or_else(|| invalid(kind, input))?;
            let mut value = match time_part {
                Some(t) if !t.is_empty() => {
                    let time = parse_time_part(t).ok_or_else(|| invalid(kind, input))?;
                    TemporalValue {
                        date: date.date,
                        time: time.time,
                        nanosecond: time.nanosecond,
                        offset_seconds: time.offset_seconds,
                    }
                }
                _ => TemporalValue {
                    time: Some(NaiveTime::MIN),
                    ..date
                },
            };
            if kind == TemporalKind::LocalDateTime && value.offset_seconds.is_some() {
                return Err(invalid(kind, input));
            }
            if kind == TemporalKind::DateTime && value.offset_seconds.is_none() {
                value.offset_seconds = Some(0);
            }
            Ok(value)
        }
    }
}

fn parse_date_part(input: &str) -> Option<TemporalValue> {
    if let Some(caps) = COMPACT_WEEK_DATE.captures(input) {
        let year: i32 = caps[1].parse().ok()?;
        let week: u32 = caps[2].parse().ok()?;
        let day: u32 = caps.get(3).map_or(Some(1), |d| d.as_str().parse().ok())?;
        let weekday = chrono::Weekday::try_from((day as u8).checked_sub(1)?).ok()?;
        return NaiveDate::from_isoywd_opt(year, week, weekday).map(TemporalValue::date_only);
    }
    if let Some(caps) = COMPACT_QUARTER_DATE.captures(input) {
        let year: i32 = caps[1].parse().ok()?;
        let quarter: u32 = caps[2].parse().ok()?;
        let day: u32 = caps.get(3).map_or(Some(1), |d| d.as_str().parse().ok())?;
        let start = NaiveDate::from_ymd_opt(year, (quarter - 1) * 3 + 1, 1)?;
        return start
            .checked_add_days(chrono::Days::new((day as u64).checked_sub(1)?))
            .map(TemporalValue::date_only);
    }

    let digits: String = input.chars().filter(|c| *c != '-').collect();
    let dashed = input.contains('-');
    if !digits.chars().all(|c| c.is_ascii_digit()) {
        return None;
    }
    let date = match digits.len() {
        // YYYY
        4 => NaiveDate::from_ymd_opt(digits.parse().ok()?, 1, 1),
        // YYYYMM / YYYY-MM (the compact 6-digit form is month per ISO-8601-1)
        6 => NaiveDate::from_ymd_opt(digits[..4].parse().ok()?, digits[4..].parse().ok()?, 1),
        // YYYYDDD / YYYY-DDD ordinal
        7 => NaiveDate::from_yo_opt(digits[..4].parse().ok()?, digits[4..].parse().ok()?),
        // YYYYMMDD / YYYY-MM-DD
        8 => {
            // 8 digits with dashes must be YYYY-MM-DD shaped
            if dashed && input.len() != 10 {
                return None;
            }
            NaiveDate::from_ymd_opt(
                digits[..4].parse().ok()?,
                digits[4..6].parse().ok()?,
                digits[6..].parse().ok()?,
            )
        }
        _ => None,
    }?;
    Some(TemporalValue::date_only(date))
}

fn parse_time_part(input: &str) -> Option<TemporalValue> {
    let caps = COMPACT_TIME.captures(input)?;
    let hour: u32 = caps[1].parse().ok()?;
    let minute: u32 = caps.get(2).map_or(Some(0), |m| m.as_str().parse().ok())?;
    let second: u32 = caps.get(3).map_or(Some(0), |s| s.as_str().parse().ok())?;
    let nanosecond = caps
        .get(4)
        .map(|f| {
            let mut text = f.as_str().to_string();
            while text.len() < 9 {
                text.push('0');
            }
            text.parse::<u32>().unwrap_or(0)
        })
        .unwrap_or(0);
    let offset_seconds = caps.get(5).map(|o| parse_offset(o.as_str())).flatten();
    if caps.get(5).is_some() && offset_seconds.is_none() {
        return None;
    }
    Some(TemporalValue {
        date: None,
        time: NaiveTime::from_hms_opt(hour, minute, second),
        nanosecond,
        offset_seconds,
    })
}

fn parse_offset(input: &str) -> Option<i32> {
    if input == "Z" {
        return Some(0);
    }
    let (sign, rest) = match input.split_at(1) {
        ("+", rest) => (1, rest),
        ("-", rest) => (-1, rest),
        _ => return None,
    };
    let digits: String = rest.chars().filter(|c| *c != ':').collect();
    let (hours, minutes) = match digits.len() {
        2 => (digits.parse::<i32>().ok()?, 0),
        4 => (
            digits[..2].parse::<i32>().ok()?,
            digits[2..].parse::<i32>().ok()?,
        ),
        _ => return None,
    };
    Some(sign * (hours * 3600 + minutes * 60))
}

fn component(entries: &[(String, Value)], key: &str) -> Option<i64> {
    entries
        .iter()
        .find(|(k, _)| k == key)
        .and_then(|(_, v)| v.as_i64())
}

/// Construct a temporal value from a component map. Calendar
/// (`year`/`month`/`day`), week (`year`/`week`/`dayOfWeek`), ordinal
/// (`year`/`ordinalDay`), and quarter (`year`/`quarter`/`dayOfQuarter`)
/// date forms are supported, plus the time-of-day and `timezone` fields.
pub fn temporal_from_map(
    kind: TemporalKind,
    entries: &[(String, Value)],
) -> Result<TemporalValue, TranslatorError> {
    let bad = |detail: &str| {
        TranslatorError::invalid_argument(format!(
            "invalid {} component map: {}",
            kind.function_name(),
            detail
        ))
    };

    let date = if kind == TemporalKind::LocalTime || kind == TemporalKind::Time {
        None
    } else {
        let year = component(entries, "year").ok_or_else(|| bad("missing 'year'"))? as i32;
        let date = if let Some(week) = component(entries, "week") {
            let day = component(entries, "dayOfWeek").unwrap_or(1);
            let weekday = chrono::Weekday::try_from(
                u8::try_from(day - 1).map_err(|_| bad("dayOfWeek out of range"))?,
            )
            .map_err(|_| bad("dayOfWeek out of range"))?;
            NaiveDate::from_isoywd_opt(year, week as u32, weekday)
        } else if let Some(ordinal) = component(entries, "ordinalDay") {
            NaiveDate::from_yo_opt(year, ordinal as u32)
        } else if let Some(quarter) = component(entries, "quarter") {
            if !(1..=4).contains(&quarter) {
                return Err(bad("quarter out of range"));
            }
            let day = component(entries, "dayOfQuarter").unwrap_or(1);
            NaiveDate::from_ymd_opt(year, (quarter as u32 - 1) * 3 + 1, 1).and_then(|start| {
                start.checked_add_days(chrono::Days::new(u64::try_from(day - 1).ok()?))
            })
        } else {
            let month = component(entries, "month").unwrap_or(1);
            let day = component(entries, "day").unwrap_or(1);
            NaiveDate::from_ymd_opt(year, month as u32, day as u32)
        };
        Some(date.ok_or_else(|| bad("components do not form a valid date"))?)
    };

    let (time, nanosecond) = if kind == TemporalKind::Date {
        (None, 0)
    } else {
        let hour = component(entries, "hour").unwrap_or(0);
        let minute = component(entries, "minute").unwrap_or(0);
        let second = component(entries, "second").unwrap_or(0);
        let nanos = component(entries, "millisecond").unwrap_or(0) * 1_000_000
            + component(entries, "microsecond").unwrap_or(0) * 1_000
            + component(entries, "nanosecond").unwrap_or(0);
        let time = NaiveTime::from_hms_opt(hour as u32, minute as u32, second as u32)
            .ok_or_else(|| bad("components do not form a valid time"))?;
        (
            Some(time),
            u32::try_from(nanos).map_err(|_| bad("sub-second component out of range"))?,
        )
    };

    let offset_seconds = match entries.iter().find(|(k, _)| k == "timezone") {
        Some((_, Value::String(tz))) => Some(
            parse_offset(tz)
                .ok_or_else(|| bad("timezone must be an offset like '+01:00' or 'Z'"))?,
        ),
        Some(_) => return Err(bad("timezone must be a string")),
        None => match kind {
            TemporalKind::Time | TemporalKind::DateTime => Some(0),
            _ => None,
        },
    };

    Ok(TemporalValue {
        date,
        time: if kind == TemporalKind::Date {
            None
        } else {
            time.or(Some(NaiveTime::MIN))
        },
        nanosecond,
        offset_seconds,
    })
}

/// A Cypher duration, normalized to the month/day/second component triple
/// Cypher keeps distinct (months and days do not have a fixed length, so
/// they never fold into each other).
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct DurationValue {
    pub months: i64,
    pub days: i64,
    pub seconds: i64,
    pub nanoseconds: i64,
}

impl DurationValue {
    /// Build from a `duration({..})` component map.
    pub fn from_map(entries: &[(String, Value)]) -> Result<Self, TranslatorError> {
        const KEYS: [&str; 10] = [
            "years",
            "months",
            "weeks",
            "days",
            "hours",
            "minutes",
            "seconds",
            "milliseconds",
            "microseconds",
            "nanoseconds",
        ];
        for (key, value) in entries {
            if !KEYS.contains(&key.as_str()) {
                return Err(TranslatorError::invalid_argument(format!(
                    "unknown duration component '{}'",
                    key
                )));
            }
            if value.as_i64().is_none() {
                return Err(TranslatorError::invalid_argument(format!(
                    "duration component '{}' must be an integer",
                    key
                )));
            }
        }
        let get = |key: &str| component(entries, key).unwrap_or(0);
        let nanos = get("milliseconds") * 1_000_000 + get("microseconds") * 1_000 + get("nanoseconds");
        Ok(DurationValue {
            months: get("years") * 12 + get("months"),
            days: get("weeks") * 7 + get("days"),
            seconds: get("hours") * 3600 + get("minutes") * 60 + get("seconds") + nanos / 1_000_000_000,
            nanoseconds: nanos % 1_000_000_000,
        })
    }

    /// ISO-8601 rendering, e.g. `P1Y2M3DT4H5M6.5S`.
    pub fn to_iso_string(&self) -> String {
        if self.months == 0 && self.days == 0 && self.seconds == 0 && self.nanoseconds == 0 {
            return "PT0S".to_string();
        }
        let mut out = String::from("P");
        if self.months / 12 != 0 {
            out.push_str(&format!("{}Y", self.months / 12));
        }
        if self.months % 12 != 0 {
            out.push_str(&format!("{}M", self.months % 12));
        }
        if self.days != 0 {
            out.push_str(&format!("{}D", self.days));
        }
        if self.seconds != 0 || self.nanoseconds != 0 {
            out.push('T');
            let (h, m, s) = (self.seconds / 3600, (self.seconds % 3600) / 60, self.seconds % 60);
            if h != 0 {
                out.push_str(&format!("{}H", h));
            }
            if m != 0 {
                out.push_str(&format!("{}M", m));
            }
            if s != 0 || self.nanoseconds != 0 {
                if self.nanoseconds != 0 {
                    let mut frac = format!("{:09}", self.nanoseconds.abs());
                    while frac.ends_with('0') {
                        frac.pop();
                    }
                    out.push_str(&format!("{}.{}S", s, frac));
                } else {
                    out.push_str(&format!("{}S", s));
                }
            }
        }
        out
    }

    /// Parse the `P..T..` form produced by [`Self::to_iso_string`].
    pub fn parse_iso(input: &str) -> Option<Self> {
        lazy_static! {
            static ref ISO_DURATION: Regex = Regex::new(
                r"^(-)?P(?:(-?\d+)Y)?(?:(-?\d+)M)?(?:(-?\d+)W)?(?:(-?\d+)D)?(?:T(?:(-?\d+)H)?(?:(-?\d+)M)?(?:(-?\d+(?:\.\d+)?)S)?)?$"
            )
            .unwrap();
        }
        let caps = ISO_DURATION.captures(input.trim())?;
        let sign: i64 = if caps.get(1).is_some() { -1 } else { 1 };
        let int = |i: usize| -> i64 {
            caps.get(i)
                .and_then(|m| m.as_str().parse::<i64>().ok())
                .unwrap_or(0)
        };
        let (secs, nanos) = match caps.get(8) {
            Some(m) => {
                let text = m.as_str();
                let (whole, frac) = text.split_once('.').unwrap_or((text, ""));
                let mut frac = frac.to_string();
                while frac.len() < 9 {
                    frac.push('0');
                }
                (
                    whole.parse::<i64>().ok()?,
                    frac[..9].parse::<i64>().ok().unwrap_or(0),
                )
            }
            None => (0, 0),
        };
        Some(DurationValue {
            months: sign * (int(2) * 12 + int(3)),
            days: sign * (int(4) * 7 + int(5)),
            seconds: sign * (int(6) * 3600 + int(7) * 60 + secs),
            nanoseconds: sign * nanos,
        })
    }

    /// SQLite `DATETIME(base, modifier, ..)` modifier list, `negate`d for
    /// subtraction. Sub-second precision folds into the seconds modifier.
    pub fn to_modifiers(&self, negate: bool) -> Vec<String> {
        let sign = if negate { -1 } else { 1 };
        let mut out = Vec::new();
        if self.months != 0 {
            out.push(format!("{:+} months", sign as i64 * self.months));
        }
        if self.days != 0 {
            out.push(format!("{:+} days", sign as i64 * self.days));
        }
        if self.seconds != 0 || self.nanoseconds != 0 {
            let total = self.seconds as f64 + self.nanoseconds as f64 / 1e9;
            out.push(format!("{:+} seconds", sign as f64 * total));
        }
        if out.is_empty() {
            out.push("+0 seconds".to_string());
        }
        out
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use test_case::test_case;

    #[test_case("2020", "2020-01-01"; "year only")]
    #[test_case("202006", "2020-06-01"; "compact year month")]
    #[test_case("2020-06", "2020-06-01"; "dashed year month")]
    #[test_case("2020183", "2020-07-01"; "compact ordinal")]
    #[test_case("2020-183", "2020-07-01"; "dashed ordinal")]
    #[test_case("20200630", "2020-06-30"; "compact calendar")]
    #[test_case("2020-06-30", "2020-06-30"; "iso calendar")]
    #[test_case("2020W052", "2020-01-28"; "compact week date")]
    #[test_case("2020-W05-2", "2020-01-28"; "dashed week date")]
    #[test_case("2020Q205", "2020-04-05"; "compact quarter date")]
    #[test_case("2020-Q2-05", "2020-04-05"; "dashed quarter date")]
    fn parses_date_forms(input: &str, expected: &str) {
        let value = parse_temporal_string(TemporalKind::Date, input).unwrap();
        assert_eq!(value.render(TemporalKind::Date), expected);
    }

    #[test_case("12", "12:00:00")]
    #[test_case("1230", "12:30:00")]
    #[test_case("12:30:40.5", "12:30:40.5")]
    fn parses_time_forms(input: &str, expected: &str) {
        let value = parse_temporal_string(TemporalKind::LocalTime, input).unwrap();
        assert_eq!(value.render(TemporalKind::LocalTime), expected);
    }

    #[test]
    fn datetime_defaults_to_utc() {
        let value = parse_temporal_string(TemporalKind::DateTime, "2020-06-30T12:00:00").unwrap();
        assert_eq!(value.render(TemporalKind::DateTime), "2020-06-30T12:00:00Z");
    }

    #[test]
    fn datetime_keeps_offset() {
        let value =
            parse_temporal_string(TemporalKind::DateTime, "2020-06-30T12:00:00+02:00").unwrap();
        assert_eq!(
            value.render(TemporalKind::DateTime),
            "2020-06-30T12:00:00+02:00"
        );
    }

    #[test]
    fn localtime_rejects_offset() {
        assert!(parse_temporal_string(TemporalKind::LocalTime, "12:00:00Z").is_err());
    }

    #[test]
    fn order_key_normalizes_offsets() {
        let utc = parse_temporal_string(TemporalKind::DateTime, "2020-06-30T10:00:00Z").unwrap();
        let plus2 =
            parse_temporal_string(TemporalKind::DateTime, "2020-06-30T12:00:00+02:00").unwrap();
        assert_eq!(utc.utc_order_key(), plus2.utc_order_key());
    }

    #[test]
    fn map_construction_calendar_and_week() {
        let cal = temporal_from_map(
            TemporalKind::Date,
            &[
                ("year".to_string(), json!(2020)),
                ("month".to_string(), json!(6)),
                ("day".to_string(), json!(30)),
            ],
        )
        .unwrap();
        assert_eq!(cal.render(TemporalKind::Date), "2020-06-30");

        let week = temporal_from_map(
            TemporalKind::Date,
            &[
                ("year".to_string(), json!(2020)),
                ("week".to_string(), json!(5)),
                ("dayOfWeek".to_string(), json!(2)),
            ],
        )
        .unwrap();
        assert_eq!(week.render(TemporalKind::Date), "2020-01-28");
    }

    #[test]
    fn map_construction_quarter() {
        let value = temporal_from_map(
            TemporalKind::Date,
            &[
                ("year".to_string(), json!(2020)),
                ("quarter".to_string(), json!(3)),
                ("dayOfQuarter".to_string(), json!(10)),
            ],
        )
        .unwrap();
        assert_eq!(value.render(TemporalKind::Date), "2020-07-10");
    }

    #[test]
    fn duration_map_normalizes() {
        let d = DurationValue::from_map(&[
            ("years".to_string(), json!(1)),
            ("months".to_string(), json!(2)),
            ("weeks".to_string(), json!(1)),
            ("days".to_string(), json!(3)),
            ("minutes".to_string(), json!(90)),
        ])
        .unwrap();
        assert_eq!(d.months, 14);
        assert_eq!(d.days, 10);
        assert_eq!(d.seconds, 5400);
        assert_eq!(d.to_iso_string(), "P1Y2M10DT1H30M");
    }

    #[test]
    fn duration_iso_roundtrip() {
        let d = DurationValue {
            months: 14,
            days: 3,
            seconds: 3601,
            nanoseconds: 500_000_000,
        };
        assert_eq!(DurationValue::parse_iso(&d.to_iso_string()), Some(d));
    }

    #[test]
    fn duration_modifiers() {
        let d = DurationValue {
            months: 2,
            days: -3,
            seconds: 90,
            nanoseconds: 0,
        };
        assert_eq!(
            d.to_modifiers(false),
            vec!["+2 months", "-3 days", "+90 seconds"]
        );
        assert_eq!(
            d.to_modifiers(true),
            vec!["-2 months", "+3 days", "-90 seconds"]
        );
    }

    #[test]
    fn rejects_unknown_duration_component() {
        assert!(DurationValue::from_map(&[("fortnights".to_string(), json!(1))]).is_err());
    }
}
