// Reporting window for a reference year.
use chrono::{Datelike, NaiveDate};
use serde::Serialize;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct Period {
    pub start: NaiveDate,
    pub end: NaiveDate,
    pub reference_year: i32,
}

impl Period {
    /// Resolve the window for `reference_year` as seen on `today`.
    ///
    /// The current year runs from January 1st to `today` inclusive; any other
    /// year covers January 1st to December 31st. `today` is always injected so
    /// resolution never reads the clock.
    pub fn resolve(reference_year: i32, today: NaiveDate) -> Self {
        let start = NaiveDate::from_ymd_opt(reference_year, 1, 1).unwrap_or(NaiveDate::MIN);
        let end = if reference_year == today.year() {
            today
        } else {
            NaiveDate::from_ymd_opt(reference_year, 12, 31).unwrap_or(NaiveDate::MAX)
        };
        Self {
            start,
            end,
            reference_year,
        }
    }

    /// The full calendar year before this one, used for year-over-year deltas.
    pub fn previous(&self, today: NaiveDate) -> Self {
        Self::resolve(self.reference_year - 1, today)
    }

    pub fn contains(&self, date: NaiveDate) -> bool {
        self.start <= date && date <= self.end
    }
}
