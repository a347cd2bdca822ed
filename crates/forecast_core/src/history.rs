//! Observed demand history: one append-only record per (cell, 15-minute
//! bucket).

use chrono::{DateTime, Datelike, Duration, Timelike, Utc, Weekday};
use h3o::CellIndex;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::types::WeatherKind;

/// Width of a demand bucket in minutes.
pub const BUCKET_MINUTES: i64 = 15;

/// Truncate a timestamp to the start of its 15-minute bucket.
pub fn bucket_start(ts: DateTime<Utc>) -> DateTime<Utc> {
    let secs = ts.timestamp();
    let bucket = secs - secs.rem_euclid(BUCKET_MINUTES * 60);
    DateTime::from_timestamp(bucket, 0).expect("bucket start within range")
}

/// Weather in effect while a bucket was recorded.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct WeatherSnapshot {
    pub kind: WeatherKind,
    pub temperature_c: f64,
    pub precipitation_mm: f64,
}

/// One bucket of observed reality for a cell.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HistoricalDemandRecord {
    pub id: Uuid,
    pub cell: CellIndex,
    /// Start of the 15-minute bucket this record covers.
    pub bucket_start: DateTime<Utc>,
    pub hour: u32,
    pub weekday: Weekday,
    pub holiday: bool,
    pub ride_requests: u32,
    pub completed_rides: u32,
    pub available_drivers: u32,
    pub avg_wait_minutes: f64,
    pub surge_multiplier: f64,
    pub weather: Option<WeatherSnapshot>,
    pub created_at: DateTime<Utc>,
}

impl HistoricalDemandRecord {
    /// Record for the bucket containing `observed_at`. Calendar fields are
    /// derived from the bucket start, not the raw observation time.
    pub fn new(
        cell: CellIndex,
        observed_at: DateTime<Utc>,
        ride_requests: u32,
        completed_rides: u32,
        available_drivers: u32,
        avg_wait_minutes: f64,
        surge_multiplier: f64,
    ) -> Self {
        let bucket = bucket_start(observed_at);
        Self {
            id: Uuid::new_v4(),
            cell,
            bucket_start: bucket,
            hour: bucket.hour(),
            weekday: bucket.weekday(),
            holiday: false,
            ride_requests,
            completed_rides,
            available_drivers,
            avg_wait_minutes,
            surge_multiplier,
            weather: None,
            created_at: observed_at,
        }
    }

    pub fn with_holiday(mut self, holiday: bool) -> Self {
        self.holiday = holiday;
        self
    }

    pub fn with_weather(mut self, weather: Option<WeatherSnapshot>) -> Self {
        self.weather = weather;
        self
    }
}

/// Historical mean and spread for a (cell, hour, weekday) slot.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct SlotStats {
    pub average: f64,
    /// Population standard deviation; 0.0 with fewer than two samples.
    pub std_dev: f64,
    pub samples: usize,
}

impl SlotStats {
    /// Summarize ride counts for a slot. With fewer than two samples the
    /// spread is unknowable and reported as zero.
    pub fn from_counts(counts: &[u32]) -> Self {
        if counts.is_empty() {
            return Self::default();
        }
        let n = counts.len() as f64;
        let average = counts.iter().map(|c| *c as f64).sum::<f64>() / n;
        let std_dev = if counts.len() < 2 {
            0.0
        } else {
            let variance = counts
                .iter()
                .map(|c| {
                    let d = *c as f64 - average;
                    d * d
                })
                .sum::<f64>()
                / n;
            variance.sqrt()
        };
        Self {
            average,
            std_dev,
            samples: counts.len(),
        }
    }
}

/// The bucket a prediction's target time falls into, `weeks` weeks earlier.
/// Used for the one- and two-week lagging demand features.
pub fn lagged_bucket(target: DateTime<Utc>, weeks: i64) -> DateTime<Utc> {
    bucket_start(target - Duration::weeks(weeks))
}
