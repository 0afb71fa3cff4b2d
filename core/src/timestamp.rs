//! Timestamp parsing and timezone conversion.
//!
//! Source files carry timestamps as free-form text. Parsing never fails:
//! anything we cannot read becomes `None` and the row carries on.
//! A parsed value remembers whether the text carried a UTC offset, because
//! naive values are interpreted according to `NaiveTimePolicy`.

use crate::config::NaiveTimePolicy;
use chrono::{DateTime, FixedOffset, NaiveDate, NaiveDateTime, Offset, TimeZone, Utc};
use chrono_tz::Tz;
use serde::{Serialize, Serializer};
use std::fmt;

const ZONED_FORMATS: &[&str] = &["%Y-%m-%d %H:%M:%S%.f%:z", "%Y-%m-%d %H:%M:%S%.f%z"];

const NAIVE_FORMATS: &[&str] = &[
    "%Y-%m-%dT%H:%M:%S%.f",
    "%Y-%m-%d %H:%M:%S%.f",
    "%Y-%m-%dT%H:%M",
    "%Y-%m-%d %H:%M",
];

const DATE_FORMATS: &[&str] = &["%Y-%m-%d", "%m/%d/%Y"];

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Timestamp {
    /// No offset in the source text.
    Naive(NaiveDateTime),
    /// Offset given in the source text, or produced by a timezone conversion.
    Zoned(DateTime<FixedOffset>),
}

impl Timestamp {
    /// Lenient parse. Returns `None` for blank or unrecognized text.
    pub fn parse(raw: &str) -> Option<Self> {
        let raw = raw.trim();
        if raw.is_empty() {
            return None;
        }
        if let Ok(dt) = DateTime::parse_from_rfc3339(raw) {
            return Some(Timestamp::Zoned(dt));
        }
        for fmt in ZONED_FORMATS {
            if let Ok(dt) = DateTime::parse_from_str(raw, fmt) {
                return Some(Timestamp::Zoned(dt));
            }
        }
        for fmt in NAIVE_FORMATS {
            if let Ok(naive) = NaiveDateTime::parse_from_str(raw, fmt) {
                return Some(Timestamp::Naive(naive));
            }
        }
        DATE_FORMATS
            .iter()
            .find_map(|fmt| NaiveDate::parse_from_str(raw, fmt).ok())
            .and_then(|date| date.and_hms_opt(0, 0, 0))
            .map(Timestamp::Naive)
    }

    /// The UTC instant. Naive values are read as UTC.
    pub fn instant(&self) -> NaiveDateTime {
        match self {
            Timestamp::Naive(naive) => *naive,
            Timestamp::Zoned(dt) => dt.naive_utc(),
        }
    }

    pub fn is_zoned(&self) -> bool {
        matches!(self, Timestamp::Zoned(_))
    }

    /// Express this timestamp in `tz`.
    ///
    /// Returns `None` when the policy reads a naive value as wall-clock time
    /// and that time does not exist (spring-forward gap) or is ambiguous
    /// (fall-back overlap) in `tz`.
    pub fn in_timezone(&self, tz: Tz, policy: NaiveTimePolicy) -> Option<Timestamp> {
        let local = match (self, policy) {
            (Timestamp::Zoned(dt), _) => dt.with_timezone(&tz),
            (Timestamp::Naive(naive), NaiveTimePolicy::AssumeUtc) => {
                Utc.from_utc_datetime(naive).with_timezone(&tz)
            }
            (Timestamp::Naive(naive), NaiveTimePolicy::ReferrerWallClock) => {
                tz.from_local_datetime(naive).single()?
            }
        };
        let offset = local.offset().fix();
        Some(Timestamp::Zoned(local.with_timezone(&offset)))
    }
}

impl fmt::Display for Timestamp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Timestamp::Naive(naive) => write!(f, "{}", naive.format("%Y-%m-%d %H:%M:%S%.f")),
            Timestamp::Zoned(dt) => write!(f, "{}", dt.format("%Y-%m-%d %H:%M:%S%.f%:z")),
        }
    }
}

impl Serialize for Timestamp {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

/// Resolve an IANA timezone name such as `Asia/Jakarta`.
pub fn parse_timezone(raw: &str) -> Option<Tz> {
    raw.trim().parse::<Tz>().ok()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn naive(s: &str) -> NaiveDateTime {
        NaiveDateTime::parse_from_str(s, "%Y-%m-%d %H:%M:%S").unwrap()
    }

    #[test]
    fn parses_common_layouts() {
        let expected = naive("2024-03-10 02:30:00");
        for raw in [
            "2024-03-10T02:30:00",
            "2024-03-10 02:30:00",
            "2024-03-10 02:30",
            " 2024-03-10T02:30:00 ",
        ] {
            assert_eq!(Timestamp::parse(raw), Some(Timestamp::Naive(expected)), "{raw}");
        }
        assert_eq!(
            Timestamp::parse("03/10/2024"),
            Some(Timestamp::Naive(naive("2024-03-10 00:00:00")))
        );
    }

    #[test]
    fn keeps_fractional_seconds() {
        let ts = Timestamp::parse("2024-05-01 08:00:00.250").unwrap();
        assert_eq!(ts.to_string(), "2024-05-01 08:00:00.250");
    }

    #[test]
    fn offset_text_is_zoned_and_normalizes_to_utc() {
        let ts = Timestamp::parse("2024-05-01T10:00:00+07:00").unwrap();
        assert!(ts.is_zoned());
        assert_eq!(ts.instant(), naive("2024-05-01 03:00:00"));

        let spaced = Timestamp::parse("2024-05-01 10:00:00+07:00").unwrap();
        assert_eq!(spaced.instant(), ts.instant());
    }

    #[test]
    fn garbage_is_none() {
        for raw in ["", "   ", "not a date", "2024-13-45", "yesterday"] {
            assert_eq!(Timestamp::parse(raw), None, "{raw}");
        }
    }

    #[test]
    fn display_round_trips_through_parse() {
        let zoned = Timestamp::parse("2024-01-15T09:00:00-05:00").unwrap();
        assert_eq!(Timestamp::parse(&zoned.to_string()), Some(zoned));
        let plain = Timestamp::parse("2024-01-15 09:00:00").unwrap();
        assert_eq!(Timestamp::parse(&plain.to_string()), Some(plain));
    }

    #[test]
    fn utc_reading_converts_into_zone() {
        let tz = parse_timezone("America/New_York").unwrap();
        let ts = Timestamp::parse("2024-03-10T02:30:00").unwrap();
        let local = ts.in_timezone(tz, NaiveTimePolicy::AssumeUtc).unwrap();
        assert_eq!(local.to_string(), "2024-03-09 21:30:00-05:00");
        assert_eq!(local.instant(), ts.instant());
    }

    #[test]
    fn wall_clock_reading_in_dst_gap_is_none() {
        let tz = parse_timezone("America/New_York").unwrap();
        let ts = Timestamp::parse("2024-03-10T02:30:00").unwrap();
        assert_eq!(ts.in_timezone(tz, NaiveTimePolicy::ReferrerWallClock), None);
    }

    #[test]
    fn wall_clock_reading_in_dst_overlap_is_none() {
        let tz = parse_timezone("America/New_York").unwrap();
        let ts = Timestamp::parse("2024-11-03T01:30:00").unwrap();
        assert_eq!(ts.in_timezone(tz, NaiveTimePolicy::ReferrerWallClock), None);
    }

    #[test]
    fn zoned_input_ignores_naive_policy() {
        let tz = parse_timezone("Asia/Jakarta").unwrap();
        let ts = Timestamp::parse("2024-03-10T02:30:00Z").unwrap();
        let a = ts.in_timezone(tz, NaiveTimePolicy::AssumeUtc);
        let b = ts.in_timezone(tz, NaiveTimePolicy::ReferrerWallClock);
        assert_eq!(a, b);
        assert_eq!(a.unwrap().to_string(), "2024-03-10 09:30:00+07:00");
    }

    #[test]
    fn unknown_timezone_name_is_none() {
        assert!(parse_timezone("Mars/Olympus_Mons").is_none());
        assert!(parse_timezone("").is_none());
        assert!(parse_timezone(" Europe/London ").is_some());
    }
}
