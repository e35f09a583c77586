// "HhMMm" durations as produced by the aggregate queries.
//
// A duration is an integer number of minutes. Parsing is lenient: anything
// that does not match the grammar counts as zero minutes.
use once_cell::sync::Lazy;
use regex::Regex;
use serde::{Serialize, Serializer};
use std::fmt;
use std::iter::Sum;
use std::ops::Add;

static DURATION_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(-?\d+)h\s*(-?\d+)m").expect("duration pattern is valid")
});

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default)]
pub struct Duration {
    minutes: i64,
}

impl Duration {
    pub const ZERO: Duration = Duration { minutes: 0 };

    pub fn from_minutes(minutes: i64) -> Self {
        Self { minutes }
    }

    pub fn minutes(self) -> i64 {
        self.minutes
    }

    /// Parse `"{H}h{MM}m"`; returns zero minutes when the text does not match.
    pub fn parse(s: &str) -> Self {
        let Some(caps) = DURATION_RE.captures(s) else {
            return Self::ZERO;
        };
        let hours = caps[1].parse::<i64>();
        let minutes = caps[2].parse::<i64>();
        match (hours, minutes) {
            (Ok(h), Ok(m)) => h
                .checked_mul(60)
                .and_then(|h| h.checked_add(m))
                .map(Self::from_minutes)
                .unwrap_or(Self::ZERO),
            _ => Self::ZERO,
        }
    }
}

impl fmt::Display for Duration {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        // Hours are floored, so -30 minutes renders as "-1h30m".
        let hours = self.minutes.div_euclid(60);
        let rest = (self.minutes % 60).abs();
        write!(f, "{}h{:02}m", hours, rest)
    }
}

impl Serialize for Duration {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

impl Add for Duration {
    type Output = Duration;

    fn add(self, rhs: Duration) -> Duration {
        Duration::from_minutes(self.minutes.saturating_add(rhs.minutes))
    }
}

impl Sum for Duration {
    fn sum<I: Iterator<Item = Duration>>(iter: I) -> Duration {
        iter.fold(Duration::ZERO, Add::add)
    }
}

pub fn parse(s: &str) -> i64 {
    Duration::parse(s).minutes()
}

pub fn format(minutes: i64) -> String {
    Duration::from_minutes(minutes).to_string()
}

/// Parse every entry, add the minutes, format the result.
pub fn sum<S: AsRef<str>>(durations: &[S]) -> String {
    durations
        .iter()
        .map(|d| Duration::parse(d.as_ref()))
        .sum::<Duration>()
        .to_string()
}

/// Average of durations weighted by a count, rounded half up to the minute.
///
/// A zero (or negative) total weight yields "0h00m".
pub fn weighted_average<S: AsRef<str>>(entries: &[(S, i64)]) -> String {
    let mut weighted = 0i64;
    let mut weights = 0i64;
    for (d, w) in entries {
        let minutes = Duration::parse(d.as_ref()).minutes();
        weighted = weighted.saturating_add(minutes.saturating_mul(*w));
        weights = weights.saturating_add(*w);
    }
    let avg = if weights > 0 {
        crate::util::round_half_up(weighted as f64 / weights as f64)
    } else {
        0
    };
    format(avg)
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn parses_well_formed_values() {
        assert_eq!(parse("1h30m"), 90);
        assert_eq!(parse("0h05m"), 5);
        assert_eq!(parse("12h 07m"), 727);
        assert_eq!(parse("-1h30m"), -30);
    }

    #[test]
    fn malformed_values_count_as_zero() {
        assert_eq!(parse(""), 0);
        assert_eq!(parse("n/a"), 0);
        assert_eq!(parse("90"), 0);
        assert_eq!(parse("99999999999999999999h00m"), 0);
    }

    #[test]
    fn formats_with_padded_minutes() {
        assert_eq!(format(0), "0h00m");
        assert_eq!(format(65), "1h05m");
        assert_eq!(format(600), "10h00m");
        assert_eq!(format(-30), "-1h30m");
        assert_eq!(format(-90), "-2h30m");
        // floored hours with an absolute remainder: -10 minutes is not "-0h10m"
        assert_eq!(format(-10), "-1h10m");
    }

    #[test]
    fn sums_durations() {
        assert_eq!(sum(&["1h30m", "0h45m"]), "2h15m");
        assert_eq!(sum::<&str>(&[]), "0h00m");
        assert_eq!(sum(&["1h00m", "garbage", "0h30m"]), "1h30m");
    }

    #[test]
    fn weighted_average_rounds_and_guards_zero_weight() {
        assert_eq!(weighted_average(&[("1h00m", 1), ("2h00m", 1)]), "1h30m");
        // (10 * 2 + 15 * 1) / 3 = 11.67 -> 12
        assert_eq!(weighted_average(&[("0h10m", 2), ("0h15m", 1)]), "0h12m");
        assert_eq!(weighted_average(&[("3h00m", 0)]), "0h00m");
        assert_eq!(weighted_average::<&str>(&[]), "0h00m");
    }

    proptest! {
        #[test]
        fn format_then_parse_is_identity(minutes in 0i64..1_000_000) {
            prop_assert_eq!(parse(&format(minutes)), minutes);
        }

        #[test]
        fn well_formed_text_round_trips(h in 0i64..10_000, m in 0i64..60) {
            let text = format!("{}h{:02}m", h, m);
            prop_assert_eq!(format(parse(&text)), text);
        }
    }
}
