//! Calendar month value type (`YYYY-MM`).

use chrono::{DateTime, Datelike, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::fmt;
use std::str::FromStr;
use thiserror::Error;

/// A calendar month. Ordering is chronological, which matches the
/// lexicographic ordering of the zero-padded `YYYY-MM` token.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct Month {
    year: i32,
    month: u32,
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("invalid month token '{0}', expected YYYY-MM")]
pub struct ParseMonthError(pub String);

impl Month {
    pub fn new(year: i32, month: u32) -> Option<Self> {
        if (1..=12).contains(&month) && (0..=9999).contains(&year) {
            Some(Self { year, month })
        } else {
            None
        }
    }

    pub fn from_date(date: NaiveDate) -> Self {
        Self {
            year: date.year(),
            month: date.month(),
        }
    }

    /// Month containing the given instant (UTC).
    pub fn of(instant: DateTime<Utc>) -> Self {
        Self::from_date(instant.date_naive())
    }

    pub fn year(&self) -> i32 {
        self.year
    }

    pub fn month(&self) -> u32 {
        self.month
    }

    pub fn next(&self) -> Self {
        if self.month == 12 {
            Self {
                year: self.year + 1,
                month: 1,
            }
        } else {
            Self {
                year: self.year,
                month: self.month + 1,
            }
        }
    }
}

impl fmt::Display for Month {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:04}-{:02}", self.year, self.month)
    }
}

impl FromStr for Month {
    type Err = ParseMonthError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let bytes = s.as_bytes();
        let well_formed = bytes.len() == 7
            && bytes[4] == b'-'
            && bytes[..4].iter().all(u8::is_ascii_digit)
            && bytes[5..].iter().all(u8::is_ascii_digit);
        if !well_formed {
            return Err(ParseMonthError(s.to_string()));
        }

        let year: i32 = s[..4].parse().map_err(|_| ParseMonthError(s.to_string()))?;
        let month: u32 = s[5..].parse().map_err(|_| ParseMonthError(s.to_string()))?;
        Month::new(year, month).ok_or_else(|| ParseMonthError(s.to_string()))
    }
}

impl TryFrom<String> for Month {
    type Error = ParseMonthError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

impl From<Month> for String {
    fn from(value: Month) -> Self {
        value.to_string()
    }
}

/// Parse a list of tokens into an ordered, deduplicated set.
pub fn parse_months<I, S>(tokens: I) -> Result<BTreeSet<Month>, ParseMonthError>
where
    I: IntoIterator<Item = S>,
    S: AsRef<str>,
{
    tokens.into_iter().map(|t| t.as_ref().parse()).collect()
}

/// Render a set back into its token list (for storage).
pub fn month_tokens(months: &BTreeSet<Month>) -> Vec<String> {
    months.iter().map(Month::to_string).collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_and_display() {
        let month: Month = "2025-03".parse().unwrap();
        assert_eq!(month.year(), 2025);
        assert_eq!(month.month(), 3);
        assert_eq!(month.to_string(), "2025-03");
    }

    #[test]
    fn test_rejects_malformed_tokens() {
        for token in ["2025-3", "2025-13", "2025-00", "25-03", "2025/03", "2025-03-01", ""] {
            assert!(token.parse::<Month>().is_err(), "{token} should be rejected");
        }
    }

    #[test]
    fn test_ordering_matches_token_ordering() {
        let mut tokens = vec!["2025-10", "2024-12", "2025-02", "2025-01"];
        let mut months: Vec<Month> = tokens.iter().map(|t| t.parse().unwrap()).collect();
        tokens.sort();
        months.sort();
        let rendered: Vec<String> = months.iter().map(Month::to_string).collect();
        assert_eq!(rendered, tokens);
    }

    #[test]
    fn test_next_wraps_years() {
        let december: Month = "2024-12".parse().unwrap();
        assert_eq!(december.next().to_string(), "2025-01");
        assert_eq!(december.next().next().to_string(), "2025-02");
    }

    #[test]
    fn test_parse_months_dedups_and_sorts() {
        let set = parse_months(["2025-05", "2025-03", "2025-05"]).unwrap();
        assert_eq!(month_tokens(&set), vec!["2025-03", "2025-05"]);
    }

    #[test]
    fn test_serde_uses_token() {
        let month: Month = "2025-07".parse().unwrap();
        assert_eq!(serde_json::to_string(&month).unwrap(), "\"2025-07\"");
        let back: Month = serde_json::from_str("\"2025-07\"").unwrap();
        assert_eq!(back, month);
        assert!(serde_json::from_str::<Month>("\"July\"").is_err());
    }
}
