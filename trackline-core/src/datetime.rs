//! Permissive timestamp parsing for position-report exports.
//!
//! Order: ISO-8601, then the explicit US/ISO patterns seen in the exports,
//! then a generic fallback. Parsing never fails loudly; unparseable text is
//! `None`. Every pattern must consume the whole input.

use chrono::{DateTime, NaiveDate, NaiveDateTime};

/// Output format for normalized timestamps.
pub const OUTPUT_FORMAT: &str = "%Y-%m-%d %H:%M:%S";

/// ISO-8601 forms accepted after stripping a trailing `Z`.
const ISO_DATETIME_FORMATS: &[&str] = &[
    "%Y-%m-%dT%H:%M:%S%.f",
    "%Y-%m-%d %H:%M:%S%.f",
    "%Y-%m-%dT%H:%M",
    "%Y-%m-%d %H:%M",
];

/// Explicit date+time patterns, tried in order.
pub const EXPLICIT_DATETIME_FORMATS: &[&str] = &[
    "%Y-%m-%d %H:%M:%S",
    "%Y-%m-%d %H:%M",
    "%m/%d/%Y %H:%M:%S",
    "%m/%d/%Y %H:%M",
    "%Y/%m/%d %H:%M:%S",
    "%Y/%m/%d %H:%M",
    "%m/%d/%Y %I:%M:%S %p",
    "%m/%d/%Y %I:%M %p",
];

/// Explicit date-only patterns (midnight).
pub const EXPLICIT_DATE_FORMATS: &[&str] = &["%Y-%m-%d", "%m/%d/%Y", "%Y/%m/%d"];

const FALLBACK_DATETIME_FORMATS: &[&str] = &[
    "%m/%d/%Y %H:%M:%S%.f",
    "%m/%d/%Y %I:%M:%S%p",
    "%m/%d/%Y %I:%M%p",
    "%d-%b-%Y %H:%M:%S",
    "%d-%b-%Y %H:%M",
    "%d %b %Y %H:%M:%S",
    "%d %b %Y %H:%M",
    "%b %d %Y %H:%M:%S",
    "%b %d %Y %H:%M",
    "%b %d, %Y %H:%M:%S",
    "%Y%m%d%H%M%S",
    "%Y%m%dT%H%M%S",
];

const FALLBACK_DATE_FORMATS: &[&str] = &[
    "%d-%b-%Y",
    "%d %b %Y",
    "%b %d %Y",
    "%b %d, %Y",
    "%Y%m%d",
];

/// Parse free-form timestamp text. Blank input is `None`.
pub fn parse_timestamp(text: &str) -> Option<NaiveDateTime> {
    let s = text.trim();
    if s.is_empty() {
        return None;
    }
    parse_iso(s)
        .or_else(|| parse_explicit(s))
        .or_else(|| parse_fallback(s))
}

/// Format a timestamp the way outputs store it.
pub fn format_timestamp(ts: &NaiveDateTime) -> String {
    ts.format(OUTPUT_FORMAT).to_string()
}

fn parse_iso(s: &str) -> Option<NaiveDateTime> {
    if let Ok(dt) = DateTime::parse_from_rfc3339(s) {
        return Some(dt.naive_utc());
    }
    let s = s
        .strip_suffix('Z')
        .or_else(|| s.strip_suffix('z'))
        .unwrap_or(s);
    ISO_DATETIME_FORMATS
        .iter()
        .find_map(|fmt| NaiveDateTime::parse_from_str(s, fmt).ok())
        .or_else(|| date_at_midnight(s, "%Y-%m-%d"))
}

fn parse_explicit(s: &str) -> Option<NaiveDateTime> {
    EXPLICIT_DATETIME_FORMATS
        .iter()
        .find_map(|fmt| NaiveDateTime::parse_from_str(s, fmt).ok())
        .or_else(|| {
            EXPLICIT_DATE_FORMATS
                .iter()
                .find_map(|fmt| date_at_midnight(s, fmt))
        })
}

fn parse_fallback(s: &str) -> Option<NaiveDateTime> {
    let collapsed = s.split_whitespace().collect::<Vec<_>>().join(" ");
    if let Ok(dt) = DateTime::parse_from_rfc2822(&collapsed) {
        return Some(dt.naive_utc());
    }
    if collapsed != s {
        if let Some(dt) = parse_iso(&collapsed).or_else(|| parse_explicit(&collapsed)) {
            return Some(dt);
        }
    }
    FALLBACK_DATETIME_FORMATS
        .iter()
        .find_map(|fmt| NaiveDateTime::parse_from_str(&collapsed, fmt).ok())
        .or_else(|| {
            FALLBACK_DATE_FORMATS
                .iter()
                .find_map(|fmt| date_at_midnight(&collapsed, fmt))
        })
}

fn date_at_midnight(s: &str, fmt: &str) -> Option<NaiveDateTime> {
    NaiveDate::parse_from_str(s, fmt)
        .ok()
        .and_then(|d| d.and_hms_opt(0, 0, 0))
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    fn dt(y: i32, mo: u32, d: u32, h: u32, mi: u32, s: u32) -> NaiveDateTime {
        NaiveDate::from_ymd_opt(y, mo, d)
            .unwrap()
            .and_hms_opt(h, mi, s)
            .unwrap()
    }

    #[test]
    fn test_blank_is_none() {
        assert_eq!(parse_timestamp(""), None);
        assert_eq!(parse_timestamp("   \t "), None);
    }

    #[test]
    fn test_iso_variants() {
        let want = dt(2015, 3, 4, 13, 5, 9);
        assert_eq!(parse_timestamp("2015-03-04T13:05:09"), Some(want));
        assert_eq!(parse_timestamp("2015-03-04T13:05:09Z"), Some(want));
        assert_eq!(parse_timestamp("2015-03-04T13:05:09z"), Some(want));
        assert_eq!(parse_timestamp("2015-03-04 13:05:09"), Some(want));
        assert_eq!(parse_timestamp("2015-03-04T08:05:09-05:00"), Some(want));
        assert_eq!(
            parse_timestamp("2015-03-04T13:05:09.250").map(|t| t.and_utc().timestamp_subsec_millis()),
            Some(250)
        );
        assert_eq!(parse_timestamp("2015-03-04"), Some(dt(2015, 3, 4, 0, 0, 0)));
    }

    #[test]
    fn test_explicit_formats_round_trip() {
        let known = dt(2015, 4, 7, 13, 23, 45);
        for fmt in EXPLICIT_DATETIME_FORMATS {
            let text = known.format(fmt).to_string();
            let mut expected = known;
            if !fmt.contains("%S") {
                expected = dt(2015, 4, 7, 13, 23, 0);
            }
            assert_eq!(parse_timestamp(&text), Some(expected), "format {fmt} text {text}");
        }
        for fmt in EXPLICIT_DATE_FORMATS {
            let text = known.format(fmt).to_string();
            assert_eq!(
                parse_timestamp(&text),
                Some(dt(2015, 4, 7, 0, 0, 0)),
                "format {fmt} text {text}"
            );
        }
    }

    #[test]
    fn test_twelve_hour_clock() {
        assert_eq!(parse_timestamp("5/4/2013 1:23 PM"), Some(dt(2013, 5, 4, 13, 23, 0)));
        assert_eq!(parse_timestamp("5/4/2013 12:05:00 am"), Some(dt(2013, 5, 4, 0, 5, 0)));
    }

    #[test]
    fn test_unpadded_us_dates() {
        assert_eq!(parse_timestamp("5/4/2013 13:23"), Some(dt(2013, 5, 4, 13, 23, 0)));
        assert_eq!(parse_timestamp("5/4/2013"), Some(dt(2013, 5, 4, 0, 0, 0)));
    }

    #[test]
    fn test_trailing_garbage_rejected() {
        assert_eq!(parse_timestamp("2015-03-04 13:05:09 garbage"), None);
        assert_eq!(parse_timestamp("03/04/2015 13:05xyz"), None);
        assert_eq!(parse_timestamp("not a date"), None);
    }

    #[test]
    fn test_fallback_forms() {
        assert_eq!(parse_timestamp("5/4/2013  1:23"), Some(dt(2013, 5, 4, 1, 23, 0)));
        assert_eq!(
            parse_timestamp("04-Mar-2015 13:05:00"),
            Some(dt(2015, 3, 4, 13, 5, 0))
        );
        assert_eq!(parse_timestamp("Mar 4 2015 13:05"), Some(dt(2015, 3, 4, 13, 5, 0)));
        assert_eq!(
            parse_timestamp("Wed, 04 Mar 2015 13:05:00 +0000"),
            Some(dt(2015, 3, 4, 13, 5, 0))
        );
        assert_eq!(parse_timestamp("20150304130500"), Some(dt(2015, 3, 4, 13, 5, 0)));
        assert_eq!(parse_timestamp("5/4/2013 1:23PM"), Some(dt(2013, 5, 4, 13, 23, 0)));
    }

    #[test]
    fn test_deterministic() {
        let inputs = ["2015-03-04T13:05:09Z", "5/4/2013 1:23 PM", "junk", ""];
        for input in inputs {
            assert_eq!(parse_timestamp(input), parse_timestamp(input));
        }
    }

    #[test]
    fn test_format_timestamp() {
        assert_eq!(format_timestamp(&dt(2015, 3, 4, 1, 2, 3)), "2015-03-04 01:02:03");
    }
}
