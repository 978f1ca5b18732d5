use chrono::{Datelike, NaiveDate};
use serde::{Deserialize, Serialize};
use std::fmt;

/// A reporting period (year, month) as published by the remote source.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Period {
    pub year: i32,
    pub month: u32,
}

impl Period {
    pub fn new(year: i32, month: u32) -> Self {
        Period { year, month }
    }

    pub fn from_date(date: NaiveDate) -> Self {
        Period::new(date.year(), date.month())
    }

    pub fn month_label(&self) -> String {
        format!("{:02}", self.month)
    }

    /// `YYYY_MM`, used for period directories and artifact names.
    pub fn dir_label(&self) -> String {
        format!("{}_{:02}", self.year, self.month)
    }

    /// Reporting data for year N only starts appearing in May of year N.
    pub fn search_year(today: NaiveDate) -> i32 {
        if today.month() >= 5 {
            today.year()
        } else {
            today.year() - 1
        }
    }

    /// First market year of the rolling history window.
    pub fn history_start_year(&self) -> i32 {
        if self.month >= 5 {
            self.year - 10
        } else {
            self.year - 11
        }
    }

    pub fn market_years(&self) -> std::ops::RangeInclusive<i32> {
        self.history_start_year()..=self.year
    }
}

impl fmt::Display for Period {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}-{:02}", self.year, self.month)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WatermarkEntry {
    pub year: i32,
    pub month: String,
}

impl Default for WatermarkEntry {
    fn default() -> Self {
        WatermarkEntry {
            year: 0,
            month: "0".to_string(),
        }
    }
}

impl WatermarkEntry {
    pub fn matches(&self, period: &Period) -> bool {
        self.year == period.year && self.month == period.month_label()
    }

    pub fn as_period(&self) -> Period {
        Period::new(self.year, self.month.trim().parse().unwrap_or(0))
    }
}

impl From<Period> for WatermarkEntry {
    fn from(period: Period) -> Self {
        WatermarkEntry {
            year: period.year,
            month: period.month_label(),
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Watermark {
    #[serde(default)]
    pub last_fetched: WatermarkEntry,
    #[serde(default)]
    pub last_updated: WatermarkEntry,
}

impl Watermark {
    pub fn is_fetched(&self, period: &Period) -> bool {
        self.last_fetched.matches(period)
    }
}
