//! Natural-language date resolution for English date lines.
//!
//! Document date lines come in many shapes:
//!
//! - `January 5, 2021 Tuesday`
//! - `Jan 5, 2021 10:23 AM GMT`
//! - `Tuesday, 5th January 2021`
//! - `2021-01-05`
//! - `01/05/2021` (month first)
//!
//! Weekdays, times, and zone names are ignored. A line naming only a month
//! and year resolves to the first of that month.

use chrono::NaiveDate;

const MONTHS: [&str; 12] = [
    "january",
    "february",
    "march",
    "april",
    "may",
    "june",
    "july",
    "august",
    "september",
    "october",
    "november",
    "december",
];

/// Resolve a free-form English date line to a calendar date.
pub fn parse_date(raw: &str) -> Option<NaiveDate> {
    let raw = raw.trim();
    if raw.is_empty() {
        return None;
    }

    let first = raw.split_whitespace().next().unwrap_or_default();
    if let Ok(d) = NaiveDate::parse_from_str(first.trim_end_matches(','), "%Y-%m-%d") {
        return Some(d);
    }

    let tokens: Vec<String> = raw
        .split(|c: char| c.is_whitespace() || c == ',')
        .map(|t| t.trim_end_matches('.').to_lowercase())
        .filter(|t| !t.is_empty())
        .collect();

    match tokens.iter().find_map(|t| month_from_name(t)) {
        Some(month) => {
            let numbers: Vec<u32> = tokens.iter().filter_map(|t| numeric_token(t)).collect();
            let year = numbers.iter().copied().find(|n| (1000..=9999).contains(n))?;
            let day = numbers
                .iter()
                .copied()
                .find(|n| (1..=31).contains(n))
                .unwrap_or(1);
            NaiveDate::from_ymd_opt(year as i32, month, day)
        }
        None => tokens.iter().find_map(|t| parse_slashed(t)),
    }
}

fn month_from_name(token: &str) -> Option<u32> {
    if token.len() < 3 || !token.chars().all(|c| c.is_ascii_alphabetic()) {
        return None;
    }
    MONTHS
        .iter()
        .position(|m| m.starts_with(token))
        .map(|i| i as u32 + 1)
}

/// Digits with an optional ordinal suffix (`5`, `5th`, `21st`). Clock
/// times and anything else are not numeric tokens.
fn numeric_token(token: &str) -> Option<u32> {
    let digits = ["st", "nd", "rd", "th"]
        .iter()
        .find_map(|suffix| token.strip_suffix(suffix))
        .unwrap_or(token);
    if digits.is_empty() || !digits.bytes().all(|b| b.is_ascii_digit()) {
        return None;
    }
    digits.parse().ok()
}

fn parse_slashed(token: &str) -> Option<NaiveDate> {
    if !token.contains('/') {
        return None;
    }
    NaiveDate::parse_from_str(token, "%m/%d/%Y")
        .or_else(|_| NaiveDate::parse_from_str(token, "%d/%m/%Y"))
        .ok()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ymd(y: i32, m: u32, d: u32) -> Option<NaiveDate> {
        NaiveDate::from_ymd_opt(y, m, d)
    }

    #[test]
    fn abbreviated_month() {
        assert_eq!(parse_date("Jan 5, 2021"), ymd(2021, 1, 5));
        assert_eq!(parse_date("Sept. 30, 2019"), ymd(2019, 9, 30));
    }

    #[test]
    fn full_line_with_weekday_and_time() {
        assert_eq!(
            parse_date("January 5, 2021 Tuesday 10:23 AM GMT"),
            ymd(2021, 1, 5)
        );
        assert_eq!(parse_date("Tuesday, March 2, 2010"), ymd(2010, 3, 2));
    }

    #[test]
    fn day_first_with_ordinal() {
        assert_eq!(parse_date("5th January 2021"), ymd(2021, 1, 5));
        assert_eq!(parse_date("21 February 2015"), ymd(2015, 2, 21));
    }

    #[test]
    fn iso_and_slashed() {
        assert_eq!(parse_date("2021-01-05"), ymd(2021, 1, 5));
        assert_eq!(parse_date("01/05/2021"), ymd(2021, 1, 5));
        assert_eq!(parse_date("25/12/2020"), ymd(2020, 12, 25));
    }

    #[test]
    fn month_and_year_only() {
        assert_eq!(parse_date("December 2008"), ymd(2008, 12, 1));
    }

    #[test]
    fn unresolvable() {
        assert_eq!(parse_date(""), None);
        assert_eq!(parse_date("Agence France Presse"), None);
        assert_eq!(parse_date("February 30, 2021"), None);
        assert_eq!(parse_date("January 5"), None);
    }
}
