//! Shared domain types: forecast horizons, demand levels, weather
//! observations, and the response shapes of the query surface.

use chrono::{DateTime, Duration, Utc};
use h3o::CellIndex;
use serde::{Deserialize, Serialize};

use crate::spatial::BoundingBox;

/// Forecast horizon tag. The target time of a prediction is the generation
/// time plus the horizon.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Timeframe {
    #[serde(rename = "15m")]
    Min15,
    #[serde(rename = "30m")]
    Min30,
    #[serde(rename = "1h")]
    Hour1,
    #[serde(rename = "2h")]
    Hour2,
    #[serde(rename = "4h")]
    Hour4,
}

impl Timeframe {
    pub const ALL: [Timeframe; 5] = [
        Timeframe::Min15,
        Timeframe::Min30,
        Timeframe::Hour1,
        Timeframe::Hour2,
        Timeframe::Hour4,
    ];

    pub fn horizon(&self) -> Duration {
        match self {
            Timeframe::Min15 => Duration::minutes(15),
            Timeframe::Min30 => Duration::minutes(30),
            Timeframe::Hour1 => Duration::hours(1),
            Timeframe::Hour2 => Duration::hours(2),
            Timeframe::Hour4 => Duration::hours(4),
        }
    }

    pub fn tag(&self) -> &'static str {
        match self {
            Timeframe::Min15 => "15m",
            Timeframe::Min30 => "30m",
            Timeframe::Hour1 => "1h",
            Timeframe::Hour2 => "2h",
            Timeframe::Hour4 => "4h",
        }
    }
}

/// Categorical demand bin derived from the predicted/historical ratio.
///
/// Ordered from quietest to busiest so heatmap filtering can use `>=`.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
)]
#[serde(rename_all = "kebab-case")]
pub enum DemandLevel {
    VeryLow,
    Low,
    Normal,
    High,
    VeryHigh,
    Extreme,
}

impl DemandLevel {
    /// Bin the ratio of predicted rides to the historical baseline.
    pub fn from_ratio(ratio: f64) -> Self {
        if ratio <= 0.3 {
            DemandLevel::VeryLow
        } else if ratio <= 0.7 {
            DemandLevel::Low
        } else if ratio <= 1.3 {
            DemandLevel::Normal
        } else if ratio <= 1.8 {
            DemandLevel::High
        } else if ratio <= 2.5 {
            DemandLevel::VeryHigh
        } else {
            DemandLevel::Extreme
        }
    }
}

/// Weather condition class. Code 0 means the condition is unknown; an absent
/// or failed weather read is always represented as `None` upstream, never as
/// a fabricated observation.
///
/// Serializes as its numeric condition code (see [`WeatherKind::code`]), the
/// form persisted on history records and spoken on the wire.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WeatherKind {
    Unknown,
    Clear,
    Clouds,
    Drizzle,
    Rain,
    Thunderstorm,
    Snow,
    Fog,
}

impl WeatherKind {
    /// Numeric condition code used in persisted records and on the wire.
    pub fn code(&self) -> u8 {
        match self {
            WeatherKind::Unknown => 0,
            WeatherKind::Clear => 1,
            WeatherKind::Clouds => 2,
            WeatherKind::Drizzle => 3,
            WeatherKind::Rain => 4,
            WeatherKind::Thunderstorm => 5,
            WeatherKind::Snow => 6,
            WeatherKind::Fog => 7,
        }
    }

    /// Inverse of [`WeatherKind::code`]; unassigned codes map to `Unknown`.
    pub fn from_code(code: u8) -> Self {
        match code {
            1 => WeatherKind::Clear,
            2 => WeatherKind::Clouds,
            3 => WeatherKind::Drizzle,
            4 => WeatherKind::Rain,
            5 => WeatherKind::Thunderstorm,
            6 => WeatherKind::Snow,
            7 => WeatherKind::Fog,
            _ => WeatherKind::Unknown,
        }
    }

    pub fn is_snow(&self) -> bool {
        matches!(self, WeatherKind::Snow)
    }

    pub fn is_rain(&self) -> bool {
        matches!(
            self,
            WeatherKind::Drizzle | WeatherKind::Rain | WeatherKind::Thunderstorm
        )
    }
}

impl Serialize for WeatherKind {
    fn serialize<S: serde::Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_u8(self.code())
    }
}

impl<'de> Deserialize<'de> for WeatherKind {
    fn deserialize<D: serde::Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        Ok(WeatherKind::from_code(u8::deserialize(deserializer)?))
    }
}

/// Live weather at a cell center, as reported by the weather collaborator.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct WeatherObservation {
    pub kind: WeatherKind,
    pub temperature_c: f64,
    /// Probability of precipitation over the next hour, 0.0-1.0.
    pub precipitation_probability: f64,
    /// Precipitation currently falling, in millimetres per hour.
    pub precipitation_mm: f64,
}

/// A ranked hotspot cell from the query surface.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HotspotZone {
    pub cell: CellIndex,
    pub center_lat: f64,
    pub center_lng: f64,
    pub timeframe: Timeframe,
    pub predicted_rides: f64,
    pub hotspot_score: f64,
    pub demand_level: DemandLevel,
    pub expected_surge: f64,
    pub recommended_drivers: u32,
    pub reposition_priority: u8,
}

/// One cell of a demand heatmap, annotated with the live driver count.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HeatmapCell {
    pub cell: CellIndex,
    pub center_lat: f64,
    pub center_lng: f64,
    pub predicted_rides: f64,
    pub demand_level: DemandLevel,
    pub hotspot_score: f64,
    pub expected_surge: f64,
    pub current_drivers: u32,
}

/// Heatmap snapshot for a bounding box and timeframe.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Heatmap {
    pub bounds: BoundingBox,
    pub timeframe: Timeframe,
    pub generated_at: DateTime<Utc>,
    pub zones: Vec<HeatmapCell>,
}

/// Why a relocation target was recommended to a driver.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RepositionReason {
    HighSurge,
    DriverShortage,
    VeryHighDemand,
    BetterEarnings,
}

impl RepositionReason {
    pub fn describe(&self) -> &'static str {
        match self {
            RepositionReason::HighSurge => "high surge",
            RepositionReason::DriverShortage => "driver shortage",
            RepositionReason::VeryHighDemand => "very high demand",
            RepositionReason::BetterEarnings => "better earnings",
        }
    }
}

/// A single relocation target offered to a driver.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RepositionRecommendation {
    pub cell: CellIndex,
    pub center_lat: f64,
    pub center_lng: f64,
    pub distance_km: f64,
    pub hotspot_score: f64,
    pub expected_surge: f64,
    pub demand_level: DemandLevel,
    pub expected_rides_per_driver: f64,
    pub earnings_estimate: f64,
    /// 1 = relocate first, 10 = barely worth it.
    pub priority: u8,
    pub reason: RepositionReason,
    pub arrival_eta: DateTime<Utc>,
}

/// The zone a driver is currently sitting in, when a fresh prediction exists.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CurrentZone {
    pub cell: CellIndex,
    pub predicted_rides: f64,
    pub demand_level: DemandLevel,
    pub expected_surge: f64,
}

/// Response for a driver's repositioning query.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RepositionResponse {
    pub driver_id: String,
    pub current_zone: Option<CurrentZone>,
    pub recommendations: Vec<RepositionRecommendation>,
    /// Earnings estimate of the top-ranked recommendation, 0.0 when empty.
    pub estimated_earnings: f64,
}

/// Rolling accuracy metrics for one timeframe.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AccuracyMetrics {
    pub timeframe: Timeframe,
    pub days_back: u32,
    /// Matured predictions that had a realized bucket to compare against.
    pub samples: usize,
    pub mean_absolute_error: f64,
    /// Zero-actual buckets are excluded from the percent error.
    pub mean_absolute_percent_error: f64,
    /// Fraction of samples whose actual fell inside the 95% interval.
    pub within_interval_rate: f64,
}

impl AccuracyMetrics {
    pub fn empty(timeframe: Timeframe, days_back: u32) -> Self {
        Self {
            timeframe,
            days_back,
            samples: 0,
            mean_absolute_error: 0.0,
            mean_absolute_percent_error: 0.0,
            within_interval_rate: 0.0,
        }
    }
}
