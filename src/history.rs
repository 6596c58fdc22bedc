//! Fixed lookback ranges for historical price queries.

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum HistoryRange {
    Day,
    Week,
    Month,
    Quarter,
}

impl HistoryRange {
    /// Lenient parse: unrecognized strings fall back to one day.
    pub fn parse(s: &str) -> Self {
        match s {
            "7d" => HistoryRange::Week,
            "30d" => HistoryRange::Month,
            "90d" => HistoryRange::Quarter,
            _ => HistoryRange::Day,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            HistoryRange::Day => "1d",
            HistoryRange::Week => "7d",
            HistoryRange::Month => "30d",
            HistoryRange::Quarter => "90d",
        }
    }

    pub fn window_minutes(&self) -> i64 {
        match self {
            HistoryRange::Day => 1_440,
            HistoryRange::Week => 10_080,
            HistoryRange::Month => 43_200,
            HistoryRange::Quarter => 129_600,
        }
    }

    pub fn window_secs(&self) -> i64 {
        self.window_minutes() * 60
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_known_ranges() {
        assert_eq!(HistoryRange::parse("1d"), HistoryRange::Day);
        assert_eq!(HistoryRange::parse("7d"), HistoryRange::Week);
        assert_eq!(HistoryRange::parse("30d"), HistoryRange::Month);
        assert_eq!(HistoryRange::parse("90d"), HistoryRange::Quarter);
    }

    #[test]
    fn test_parse_unknown_falls_back_to_day() {
        assert_eq!(HistoryRange::parse(""), HistoryRange::Day);
        assert_eq!(HistoryRange::parse("365d"), HistoryRange::Day);
        assert_eq!(HistoryRange::parse("week"), HistoryRange::Day);
    }

    #[test]
    fn test_window_minutes() {
        assert_eq!(HistoryRange::Day.window_minutes(), 1_440);
        assert_eq!(HistoryRange::Week.window_minutes(), 10_080);
        assert_eq!(HistoryRange::Month.window_minutes(), 43_200);
        assert_eq!(HistoryRange::Quarter.window_minutes(), 129_600);
    }

    #[test]
    fn test_as_str_round_trip() {
        for range in [
            HistoryRange::Day,
            HistoryRange::Week,
            HistoryRange::Month,
            HistoryRange::Quarter,
        ] {
            assert_eq!(HistoryRange::parse(range.as_str()), range);
        }
    }
}
