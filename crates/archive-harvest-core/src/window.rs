//! Monthly query windows.
//!
//! A window is one calendar month. The source caps every query at 1000
//! results, so a date range is narrowed one month at a time and each month
//! is paged independently.

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use std::fmt;

/// One calendar month used to narrow a query.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct Window {
    pub year: i32,
    pub month: u32,
}

impl Window {
    pub fn new(year: i32, month: u32) -> Self {
        Self { year, month }
    }

    /// `YYYY-MM`, also the artifact directory name for this window.
    pub fn label(&self) -> String {
        format!("{}-{:02}", self.year, self.month)
    }

    /// First calendar day of the month.
    pub fn first_day(&self) -> Option<NaiveDate> {
        NaiveDate::from_ymd_opt(self.year, self.month, 1)
    }

    /// Last calendar day of the month (leap years respected).
    pub fn last_day(&self) -> Option<NaiveDate> {
        let (year, month) = if self.month == 12 {
            (self.year + 1, 1)
        } else {
            (self.year, self.month + 1)
        };
        NaiveDate::from_ymd_opt(year, month, 1)?.pred_opt()
    }
}

impl fmt::Display for Window {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.label())
    }
}

/// Enumerate one window per month for years in `[start, end)`, in
/// chronological order. An empty or inverted range yields no windows.
pub fn plan_windows(start: i32, end: i32) -> Vec<Window> {
    (start..end)
        .flat_map(|year| (1..=12).map(move |month| Window::new(year, month)))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn one_year_yields_twelve_windows_in_order() {
        let windows = plan_windows(2020, 2021);
        assert_eq!(windows.len(), 12);
        for (i, w) in windows.iter().enumerate() {
            assert_eq!(*w, Window::new(2020, i as u32 + 1));
        }
    }

    #[test]
    fn empty_and_inverted_ranges() {
        assert!(plan_windows(2020, 2020).is_empty());
        assert!(plan_windows(2021, 2020).is_empty());
    }

    #[test]
    fn multi_year_is_chronological() {
        let windows = plan_windows(2019, 2021);
        assert_eq!(windows.len(), 24);
        assert_eq!(windows[11], Window::new(2019, 12));
        assert_eq!(windows[12], Window::new(2020, 1));
        assert!(windows.windows(2).all(|pair| pair[0] < pair[1]));
    }

    #[test]
    fn month_bounds() {
        let feb = Window::new(2020, 2);
        assert_eq!(feb.first_day(), NaiveDate::from_ymd_opt(2020, 2, 1));
        assert_eq!(feb.last_day(), NaiveDate::from_ymd_opt(2020, 2, 29));
        let dec = Window::new(2021, 12);
        assert_eq!(dec.last_day(), NaiveDate::from_ymd_opt(2021, 12, 31));
    }

    #[test]
    fn label_is_zero_padded() {
        let w = Window::new(2008, 3);
        assert_eq!(w.label(), "2008-03");
        assert_eq!(w.to_string(), "2008-03");
    }
}
