//! Fixtures shared across test modules: a neutral feature vector and
//! collaborators that always fail, for exercising degradation paths.

use async_trait::async_trait;
use chrono::{DateTime, TimeZone, Utc, Weekday};
use h3o::CellIndex;

use crate::calendar::CalendarFeatures;
use crate::error::StoreError;
use crate::features::FeatureVector;
use crate::history::{HistoricalDemandRecord, SlotStats};
use crate::prediction::DemandPrediction;
use crate::spatial::BoundingBox;
use crate::stores::{
    DriverLocator, HistoryStore, PredictionStore, StoreResult, WeatherProvider,
};
use crate::types::{Timeframe, WeatherObservation};

/// A fixed resolution-10 test cell (same one the H3 docs use).
pub fn test_cell() -> CellIndex {
    CellIndex::try_from(0x8a1fb46622dffff).expect("valid cell")
}

/// A quiet Wednesday afternoon with no history, no weather, no events.
/// Tests override the fields they care about.
pub fn feature_fixture() -> FeatureVector {
    let target_time = Utc
        .with_ymd_and_hms(2025, 4, 16, 15, 0, 0)
        .single()
        .expect("valid time");
    FeatureVector {
        cell: test_cell(),
        target_time,
        calendar: CalendarFeatures {
            hour: 15,
            weekday: Weekday::Wed,
            weekend: false,
            holiday: false,
            week_of_year: 16,
            month: 4,
        },
        historical_average: 0.0,
        historical_std: 0.0,
        recent_15m: 0,
        recent_60m: 0,
        trend: 0.0,
        drivers_in_cell: 0,
        neighbor_avg_30m: 0.0,
        weather: None,
        event_nearby: false,
        event_attendance: 0,
        lag_1w: 0.0,
        lag_2w: 0.0,
    }
}

fn down() -> StoreError {
    StoreError::new("collaborator down")
}

/// Weather provider that always fails.
#[derive(Debug, Default)]
pub struct FailingWeather;

#[async_trait]
impl WeatherProvider for FailingWeather {
    async fn current(&self, _lat: f64, _lng: f64) -> StoreResult<Option<WeatherObservation>> {
        Err(down())
    }
}

/// Driver locator that always fails.
#[derive(Debug, Default)]
pub struct FailingDrivers;

#[async_trait]
impl DriverLocator for FailingDrivers {
    async fn drivers_in_cell(&self, _cell: CellIndex) -> StoreResult<u32> {
        Err(down())
    }
}

/// History store that always fails.
#[derive(Debug, Default)]
pub struct FailingHistory;

#[async_trait]
impl HistoryStore for FailingHistory {
    async fn record(&self, _record: HistoricalDemandRecord) -> StoreResult<()> {
        Err(down())
    }

    async fn slot_stats(
        &self,
        _cell: CellIndex,
        _hour: u32,
        _weekday: Weekday,
        _weeks_back: u32,
        _now: DateTime<Utc>,
    ) -> StoreResult<SlotStats> {
        Err(down())
    }

    async fn demand_in_window(
        &self,
        _cell: CellIndex,
        _from: DateTime<Utc>,
        _to: DateTime<Utc>,
    ) -> StoreResult<u32> {
        Err(down())
    }

    async fn demand_trend(&self, _cell: CellIndex, _now: DateTime<Utc>) -> StoreResult<f64> {
        Err(down())
    }

    async fn mean_demand_in_window(
        &self,
        _cells: &[CellIndex],
        _from: DateTime<Utc>,
        _to: DateTime<Utc>,
    ) -> StoreResult<f64> {
        Err(down())
    }

    async fn demand_at_bucket(
        &self,
        _cell: CellIndex,
        _bucket_start: DateTime<Utc>,
    ) -> StoreResult<Option<u32>> {
        Err(down())
    }
}

/// Prediction store that always fails.
#[derive(Debug, Default)]
pub struct FailingPredictions;

#[async_trait]
impl PredictionStore for FailingPredictions {
    async fn put(&self, _prediction: DemandPrediction) -> StoreResult<()> {
        Err(down())
    }

    async fn latest_for_cell(
        &self,
        _cell: CellIndex,
        _timeframe: Timeframe,
    ) -> StoreResult<Option<DemandPrediction>> {
        Err(down())
    }

    async fn top_by_score(
        &self,
        _timeframe: Timeframe,
        _limit: usize,
    ) -> StoreResult<Vec<DemandPrediction>> {
        Err(down())
    }

    async fn in_bounds(
        &self,
        _bounds: &BoundingBox,
        _timeframe: Timeframe,
    ) -> StoreResult<Vec<DemandPrediction>> {
        Err(down())
    }

    async fn matured(
        &self,
        _timeframe: Timeframe,
        _since: DateTime<Utc>,
        _now: DateTime<Utc>,
    ) -> StoreResult<Vec<DemandPrediction>> {
        Err(down())
    }
}
