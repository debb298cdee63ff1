//! Date and time recognition for airline-written values.

use std::sync::LazyLock;

use chrono::{DateTime, NaiveDate, NaiveDateTime, NaiveTime};
use regex::{Captures, Regex};

const MONTH: &str = r"(Jan(?:uary)?|Feb(?:ruary)?|Mar(?:ch)?|Apr(?:il)?|May|Jun(?:e)?|Jul(?:y)?|Aug(?:ust)?|Sep(?:t(?:ember)?)?|Oct(?:ober)?|Nov(?:ember)?|Dec(?:ember)?)";

static ISO_DATE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\b(\d{4})-(\d{2})-(\d{2})\b").expect("valid date regex"));

static MONTH_DAY_YEAR: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(&format!(r"(?i)\b{MONTH}\.?\s+(\d{{1,2}}),?\s+(\d{{4}})\b")).expect("valid date regex")
});

static DAY_MONTH_YEAR: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(&format!(r"(?i)\b(\d{{1,2}})\s+{MONTH}\.?,?\s+(\d{{4}})\b")).expect("valid date regex")
});

static US_DATE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\b(\d{1,2})/(\d{1,2})/(\d{4})\b").expect("valid date regex"));

static CLOCK_TIME: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"\b(\d{1,2}):(\d{2})(?::(\d{2}))?(?:\s*([AaPp])\.?[Mm]\.?)?").expect("valid time regex")
});

/// Parse a machine-readable timestamp (schema.org style).
///
/// Offsets are dropped: the wall-clock time the airline wrote is kept.
pub fn parse_timestamp(raw: &str) -> Option<NaiveDateTime> {
    let s = raw.trim();
    if s.is_empty() {
        return None;
    }
    if let Ok(dt) = DateTime::parse_from_rfc3339(s) {
        return Some(dt.naive_local());
    }
    if let Ok(dt) = DateTime::parse_from_str(s, "%Y-%m-%dT%H:%M:%S%z") {
        return Some(dt.naive_local());
    }
    const FORMATS: &[&str] = &[
        "%Y-%m-%dT%H:%M:%S%.f",
        "%Y-%m-%dT%H:%M",
        "%Y-%m-%d %H:%M:%S",
        "%Y-%m-%d %H:%M",
    ];
    FORMATS
        .iter()
        .find_map(|fmt| NaiveDateTime::parse_from_str(s, fmt).ok())
}

/// Parse a human-written value such as `"Oct 14, 2024 10:30 AM"`.
///
/// Returns the full timestamp when a date and a clock time are both present,
/// otherwise just the date.
pub fn parse_loose(raw: &str) -> (Option<NaiveDateTime>, Option<NaiveDate>) {
    if let Some(ts) = parse_timestamp(raw) {
        return (Some(ts), Some(ts.date()));
    }
    let Some(date) = find_date(raw) else {
        return (None, None);
    };
    let time = find_time(raw);
    (time.map(|t| date.and_time(t)), Some(date))
}

/// The earliest date in `text` written in one of the recognised shapes:
/// `2024-10-14`, `October 14, 2024`, `Oct 14, 2024`, `14 October 2024`,
/// `14 Oct 2024`, `10/14/2024` (US order).
pub fn find_date(text: &str) -> Option<NaiveDate> {
    let candidates = [
        first_valid(&ISO_DATE, text, |c| ymd(&c[1], &c[2], &c[3])),
        first_valid(&MONTH_DAY_YEAR, text, |c| {
            ymd(&c[3], &month_number(&c[1])?.to_string(), &c[2])
        }),
        first_valid(&DAY_MONTH_YEAR, text, |c| {
            ymd(&c[3], &month_number(&c[2])?.to_string(), &c[1])
        }),
        first_valid(&US_DATE, text, |c| ymd(&c[3], &c[1], &c[2])),
    ];
    candidates
        .into_iter()
        .flatten()
        .min_by_key(|(pos, _)| *pos)
        .map(|(_, date)| date)
}

/// The first clock time in `text` (`10:30`, `7:05 PM`, `19:05:00`).
pub fn find_time(text: &str) -> Option<NaiveTime> {
    CLOCK_TIME.captures_iter(text).find_map(|c| {
        let mut hour: u32 = c[1].parse().ok()?;
        let minute: u32 = c[2].parse().ok()?;
        let second: u32 = c.get(3).map_or(Some(0), |s| s.as_str().parse().ok())?;
        match c.get(4).map(|m| m.as_str().to_ascii_lowercase()) {
            Some(ref half) if half == "p" && hour < 12 => hour += 12,
            Some(ref half) if half == "a" && hour == 12 => hour = 0,
            _ => {}
        }
        NaiveTime::from_hms_opt(hour, minute, second)
    })
}

fn first_valid<F>(re: &Regex, text: &str, build: F) -> Option<(usize, NaiveDate)>
where
    F: Fn(&Captures<'_>) -> Option<NaiveDate>,
{
    re.captures_iter(text).find_map(|c| {
        let start = c.get(0)?.start();
        build(&c).map(|d| (start, d))
    })
}

fn ymd(year: &str, month: &str, day: &str) -> Option<NaiveDate> {
    NaiveDate::from_ymd_opt(year.parse().ok()?, month.parse().ok()?, day.parse().ok()?)
}

fn month_number(name: &str) -> Option<u32> {
    const MONTHS: [&str; 12] = [
        "jan", "feb", "mar", "apr", "may", "jun", "jul", "aug", "sep", "oct", "nov", "dec",
    ];
    let prefix = name.get(..3)?.to_ascii_lowercase();
    MONTHS
        .iter()
        .position(|m| *m == prefix)
        .map(|i| i as u32 + 1)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn date(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).unwrap()
    }

    #[test]
    fn test_find_date_shapes() {
        let expected = date(2024, 10, 14);
        for text in [
            "Travel date: 2024-10-14",
            "Departs October 14, 2024",
            "Departs Oct 14, 2024",
            "Departs Oct. 14 2024",
            "Departs 14 October 2024",
            "Departs 14 Oct 2024",
            "Departs 10/14/2024",
        ] {
            assert_eq!(find_date(text), Some(expected), "{text}");
        }
    }

    #[test]
    fn test_find_date_prefers_earliest() {
        assert_eq!(
            find_date("Outbound 14 Oct 2024, return 2024-10-20"),
            Some(date(2024, 10, 14))
        );
    }

    #[test]
    fn test_find_date_skips_impossible_dates() {
        assert_eq!(find_date("13/45/2024 then 2024-02-30 then 01/02/2024"), Some(date(2024, 1, 2)));
    }

    #[test]
    fn test_parse_timestamp() {
        let ts = parse_timestamp("2024-10-14T08:30:00-07:00").unwrap();
        assert_eq!(ts.to_string(), "2024-10-14 08:30:00");
        assert!(parse_timestamp("2024-10-14T08:30").is_some());
        assert!(parse_timestamp("2024-10-14 08:30:00").is_some());
        assert!(parse_timestamp("2024-10-14").is_none());
        assert!(parse_timestamp("soon").is_none());
    }

    #[test]
    fn test_parse_loose() {
        let (ts, day) = parse_loose("Mon, Oct 14, 2024 7:05 PM");
        assert_eq!(day, Some(date(2024, 10, 14)));
        assert_eq!(ts.unwrap().to_string(), "2024-10-14 19:05:00");

        let (ts, day) = parse_loose("14 October 2024");
        assert_eq!(ts, None);
        assert_eq!(day, Some(date(2024, 10, 14)));
    }

    #[test]
    fn test_find_time_twelve_hour_clock() {
        assert_eq!(find_time("12:15 am"), NaiveTime::from_hms_opt(0, 15, 0));
        assert_eq!(find_time("12:15 PM"), NaiveTime::from_hms_opt(12, 15, 0));
        assert_eq!(find_time("departs 06:45"), NaiveTime::from_hms_opt(6, 45, 0));
    }
}
