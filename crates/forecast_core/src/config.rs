//! Engine configuration and the hot-swappable model weights.

use std::sync::Arc;

use arc_swap::ArcSwap;
use h3o::Resolution;
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Default per-ride base fare used in earnings estimates (unit-less dollars).
pub const DEFAULT_BASE_FARE: f64 = 15.0;

/// Tuning knobs for the forecasting engine.
#[derive(Debug, Clone, Copy)]
pub struct ForecastConfig {
    /// H3 resolution demand is aggregated at.
    pub resolution: Resolution,
    /// Weeks of history consulted for the (cell, hour, weekday) baseline.
    pub lookback_weeks: u32,
    /// Base fare per expected ride in driver earnings estimates.
    pub base_fare_per_ride: f64,
    /// Assumed travel speed for repositioning ETAs, km/h.
    pub reposition_speed_kmh: f64,
    /// Default search radius for reposition targets, km.
    pub default_max_reposition_km: f64,
    /// Default number of reposition recommendations returned.
    pub default_reposition_limit: usize,
    /// Hotspots fetched as reposition candidates before distance filtering.
    pub reposition_candidates: usize,
    /// Cap on cells tiled for an area prediction request.
    pub max_area_cells: usize,
    /// Radius around a cell center searched for special events, km.
    pub event_search_radius_km: f64,
    /// Half-width of the event time window around the target time, hours.
    pub event_window_hours: i64,
}

impl Default for ForecastConfig {
    fn default() -> Self {
        Self {
            resolution: Resolution::Nine,
            lookback_weeks: 4,
            base_fare_per_ride: DEFAULT_BASE_FARE,
            reposition_speed_kmh: 30.0,
            default_max_reposition_km: 10.0,
            default_reposition_limit: 3,
            reposition_candidates: 20,
            max_area_cells: 512,
            event_search_radius_km: 5.0,
            event_window_hours: 2,
        }
    }
}

#[derive(Debug, Clone, Error)]
#[error("model weight {name} must be non-negative, got {value}")]
pub struct InvalidWeight {
    pub name: &'static str,
    pub value: f64,
}

/// Per-channel weights of the prediction ensemble. Defaults sum to 1.0.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ModelWeights {
    pub historical_pattern: f64,
    pub recent_trend: f64,
    pub time_of_day: f64,
    pub day_of_week: f64,
    pub weather: f64,
    pub events: f64,
    pub seasonal: f64,
}

impl Default for ModelWeights {
    fn default() -> Self {
        Self {
            historical_pattern: 0.35,
            recent_trend: 0.25,
            time_of_day: 0.15,
            day_of_week: 0.10,
            weather: 0.08,
            events: 0.05,
            seasonal: 0.02,
        }
    }
}

impl ModelWeights {
    /// Validate that every channel weight is non-negative and finite.
    pub fn validated(self) -> Result<Self, InvalidWeight> {
        for (name, value) in self.named() {
            if !value.is_finite() || value < 0.0 {
                return Err(InvalidWeight { name, value });
            }
        }
        Ok(self)
    }

    /// All weights scaled by a positive constant. Scaling scales the
    /// predicted ride count by the same constant.
    pub fn scaled(self, factor: f64) -> Self {
        Self {
            historical_pattern: self.historical_pattern * factor,
            recent_trend: self.recent_trend * factor,
            time_of_day: self.time_of_day * factor,
            day_of_week: self.day_of_week * factor,
            weather: self.weather * factor,
            events: self.events * factor,
            seasonal: self.seasonal * factor,
        }
    }

    fn named(&self) -> [(&'static str, f64); 7] {
        [
            ("historical_pattern", self.historical_pattern),
            ("recent_trend", self.recent_trend),
            ("time_of_day", self.time_of_day),
            ("day_of_week", self.day_of_week),
            ("weather", self.weather),
            ("events", self.events),
            ("seasonal", self.seasonal),
        ]
    }
}

/// Hot-swap handle for [`ModelWeights`].
///
/// Readers take an atomic snapshot per prediction; a configuration reload
/// replaces the whole record. No collaborator call is ever made while the
/// snapshot is being taken.
#[derive(Debug)]
pub struct WeightsHandle {
    inner: ArcSwap<ModelWeights>,
}

impl WeightsHandle {
    pub fn new(weights: ModelWeights) -> Result<Self, InvalidWeight> {
        Ok(Self {
            inner: ArcSwap::from_pointee(weights.validated()?),
        })
    }

    /// Current weights as an owned snapshot.
    pub fn snapshot(&self) -> ModelWeights {
        **self.inner.load()
    }

    /// Replace the whole record atomically.
    pub fn replace(&self, weights: ModelWeights) -> Result<(), InvalidWeight> {
        self.inner.store(Arc::new(weights.validated()?));
        Ok(())
    }
}

impl Default for WeightsHandle {
    fn default() -> Self {
        Self {
            inner: ArcSwap::from_pointee(ModelWeights::default()),
        }
    }
}
