//! Persisted engine output: a demand prediction for one cell and horizon.

use chrono::{DateTime, Utc};
use h3o::CellIndex;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::types::{DemandLevel, Timeframe};

/// Weighted contribution of each model channel, for explainability.
/// The seven values sum to the predicted ride count (before the zero floor).
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct FeatureContributions {
    pub historical_pattern: f64,
    pub recent_trend: f64,
    pub time_of_day: f64,
    pub day_of_week: f64,
    pub weather: f64,
    pub events: f64,
    pub seasonal: f64,
}

impl FeatureContributions {
    pub fn total(&self) -> f64 {
        self.historical_pattern
            + self.recent_trend
            + self.time_of_day
            + self.day_of_week
            + self.weather
            + self.events
            + self.seasonal
    }
}

/// A short-horizon demand forecast for one cell.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DemandPrediction {
    pub id: Uuid,
    pub cell: CellIndex,
    pub target_time: DateTime<Utc>,
    pub generated_at: DateTime<Utc>,
    pub timeframe: Timeframe,
    pub predicted_rides: f64,
    pub lower_bound: f64,
    pub upper_bound: f64,
    pub confidence: f64,
    pub demand_level: DemandLevel,
    pub recommended_drivers: u32,
    pub expected_surge: f64,
    pub hotspot_score: f64,
    /// 1 = highest priority for driver attention.
    pub reposition_priority: u8,
    pub contributions: FeatureContributions,
}

impl DemandPrediction {
    /// A prediction older than twice its horizon no longer describes the
    /// near future and should be refreshed or purged.
    pub fn is_stale(&self, now: DateTime<Utc>) -> bool {
        now - self.generated_at > self.timeframe.horizon() * 2
    }
}
