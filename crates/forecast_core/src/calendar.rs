//! Calendar features and the pluggable holiday calendar.
//!
//! The engine only needs a yes/no holiday answer; richer regional calendars
//! are expected to live behind the [`HolidayCalendar`] trait.

use chrono::{DateTime, Datelike, NaiveDate, Timelike, Utc, Weekday};
use serde::{Deserialize, Serialize};

/// Answers whether a UTC date is a holiday.
pub trait HolidayCalendar: Send + Sync {
    fn is_holiday(&self, date: NaiveDate) -> bool;
}

/// Built-in table of major US holidays: New Year's Day, Independence Day,
/// Thanksgiving, Christmas.
#[derive(Debug, Clone, Copy, Default)]
pub struct UsHolidays;

impl HolidayCalendar for UsHolidays {
    fn is_holiday(&self, date: NaiveDate) -> bool {
        match (date.month(), date.day()) {
            (1, 1) | (7, 4) | (12, 25) => true,
            (11, day) => day == thanksgiving_day(date.year()),
            _ => false,
        }
    }
}

/// Day-of-month of US Thanksgiving (fourth Thursday of November).
fn thanksgiving_day(year: i32) -> u32 {
    let first = NaiveDate::from_ymd_opt(year, 11, 1).expect("November 1st exists");
    let offset = (Weekday::Thu.num_days_from_monday() + 7
        - first.weekday().num_days_from_monday())
        % 7;
    1 + offset + 21
}

/// A calendar that never reports a holiday. Useful for tests and for
/// deployments that feed holidays from an external collaborator.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoHolidays;

impl HolidayCalendar for NoHolidays {
    fn is_holiday(&self, _date: NaiveDate) -> bool {
        false
    }
}

/// Calendar-derived slice of a feature vector, computed in UTC.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct CalendarFeatures {
    pub hour: u32,
    pub weekday: Weekday,
    pub weekend: bool,
    pub holiday: bool,
    pub week_of_year: u32,
    pub month: u32,
}

impl CalendarFeatures {
    pub fn for_time(time: DateTime<Utc>, calendar: &dyn HolidayCalendar) -> Self {
        let weekday = time.weekday();
        Self {
            hour: time.hour(),
            weekday,
            weekend: matches!(weekday, Weekday::Sat | Weekday::Sun),
            holiday: calendar.is_holiday(time.date_naive()),
            week_of_year: time.iso_week().week(),
            month: time.month(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn thanksgiving_lands_on_fourth_thursday() {
        // 2025-11-27 and 2024-11-28 are the fourth Thursdays.
        assert_eq!(thanksgiving_day(2025), 27);
        assert_eq!(thanksgiving_day(2024), 28);
        assert_eq!(thanksgiving_day(2026), 26);
    }

    #[test]
    fn us_holidays_cover_fixed_dates() {
        let cal = UsHolidays;
        for (y, m, d) in [(2025, 1, 1), (2025, 7, 4), (2025, 12, 25), (2025, 11, 27)] {
            let date = NaiveDate::from_ymd_opt(y, m, d).expect("valid date");
            assert!(cal.is_holiday(date), "{date} should be a holiday");
        }
        let ordinary = NaiveDate::from_ymd_opt(2025, 3, 14).expect("valid date");
        assert!(!cal.is_holiday(ordinary));
    }

    #[test]
    fn features_capture_friday_evening() {
        let time = Utc.with_ymd_and_hms(2025, 3, 14, 18, 30, 0).single().expect("valid");
        let features = CalendarFeatures::for_time(time, &UsHolidays);
        assert_eq!(features.hour, 18);
        assert_eq!(features.weekday, Weekday::Fri);
        assert!(!features.weekend);
        assert!(!features.holiday);
        assert_eq!(features.month, 3);
    }

    #[test]
    fn weekend_flag_set_on_saturday_and_sunday() {
        let sat = Utc.with_ymd_and_hms(2025, 3, 15, 12, 0, 0).single().expect("valid");
        let sun = Utc.with_ymd_and_hms(2025, 3, 16, 12, 0, 0).single().expect("valid");
        assert!(CalendarFeatures::for_time(sat, &NoHolidays).weekend);
        assert!(CalendarFeatures::for_time(sun, &NoHolidays).weekend);
    }
}
