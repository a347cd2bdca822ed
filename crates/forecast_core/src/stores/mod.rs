//! Collaborator interfaces the engine consumes.
//!
//! The engine owns no database: history, predictions, and events are reached
//! through these traits so a test harness (or a relational adapter) can
//! substitute its own implementation. No transactional semantics are assumed
//! across interfaces; every method is an independent read or append.

use async_trait::async_trait;
use chrono::{DateTime, Utc, Weekday};
use h3o::CellIndex;

use crate::error::StoreError;
use crate::history::{HistoricalDemandRecord, SlotStats};
use crate::prediction::DemandPrediction;
use crate::spatial::BoundingBox;
use crate::types::{Timeframe, WeatherObservation};

#[cfg(feature = "memory-stores")]
pub mod memory;

pub type StoreResult<T> = Result<T, StoreError>;

/// Observed demand history in 15-minute buckets (append-only).
#[async_trait]
pub trait HistoryStore: Send + Sync {
    /// Persist one bucket of observed demand. At most one record exists per
    /// (cell, bucket); re-recording the same bucket replaces it.
    async fn record(&self, record: HistoricalDemandRecord) -> StoreResult<()>;

    /// Mean and spread of ride requests for the (cell, hour, weekday) slot
    /// over the trailing `weeks_back` weeks.
    async fn slot_stats(
        &self,
        cell: CellIndex,
        hour: u32,
        weekday: Weekday,
        weeks_back: u32,
        now: DateTime<Utc>,
    ) -> StoreResult<SlotStats>;

    /// Total ride requests at `cell` across buckets intersecting `[from, to)`.
    async fn demand_in_window(
        &self,
        cell: CellIndex,
        from: DateTime<Utc>,
        to: DateTime<Utc>,
    ) -> StoreResult<u32>;

    /// Demand trend at `cell` over the trailing hour, normalized to roughly
    /// [-1, +1] (negative = cooling off, positive = heating up).
    async fn demand_trend(&self, cell: CellIndex, now: DateTime<Utc>) -> StoreResult<f64>;

    /// Mean of the per-cell ride-request totals over `[from, to)`, across
    /// `cells`. Used for the neighborhood demand feature.
    async fn mean_demand_in_window(
        &self,
        cells: &[CellIndex],
        from: DateTime<Utc>,
        to: DateTime<Utc>,
    ) -> StoreResult<f64>;

    /// Ride requests recorded for the exact bucket starting at
    /// `bucket_start`, if any.
    async fn demand_at_bucket(
        &self,
        cell: CellIndex,
        bucket_start: DateTime<Utc>,
    ) -> StoreResult<Option<u32>>;
}

/// Generated predictions, written by the engine and read by the query
/// surface.
#[async_trait]
pub trait PredictionStore: Send + Sync {
    async fn put(&self, prediction: DemandPrediction) -> StoreResult<()>;

    /// Most recently generated prediction for the (cell, timeframe) pair.
    async fn latest_for_cell(
        &self,
        cell: CellIndex,
        timeframe: Timeframe,
    ) -> StoreResult<Option<DemandPrediction>>;

    /// Latest prediction per cell for the timeframe, ranked by hotspot score
    /// descending; ties broken by larger predicted rides, then by cell.
    async fn top_by_score(
        &self,
        timeframe: Timeframe,
        limit: usize,
    ) -> StoreResult<Vec<DemandPrediction>>;

    /// Latest prediction per cell whose cell center lies inside `bounds`.
    async fn in_bounds(
        &self,
        bounds: &BoundingBox,
        timeframe: Timeframe,
    ) -> StoreResult<Vec<DemandPrediction>>;

    /// Predictions whose target time has already passed, generated within
    /// `[since, now]`. Input to accuracy evaluation.
    async fn matured(
        &self,
        timeframe: Timeframe,
        since: DateTime<Utc>,
        now: DateTime<Utc>,
    ) -> StoreResult<Vec<DemandPrediction>>;
}

/// Special events with spatial and temporal extent.
#[async_trait]
pub trait EventStore: Send + Sync {
    async fn put(&self, event: crate::events::SpecialEvent) -> StoreResult<()>;

    /// Events within reach of `(lat, lng)` whose window intersects
    /// `[from, to]`. An event is in reach when the distance to its center is
    /// within `radius_km` or within the event's own impact radius.
    async fn near(
        &self,
        lat: f64,
        lng: f64,
        radius_km: f64,
        from: DateTime<Utc>,
        to: DateTime<Utc>,
    ) -> StoreResult<Vec<crate::events::SpecialEvent>>;

    /// Events starting (or already running) within `horizon` of `now`.
    async fn upcoming(
        &self,
        now: DateTime<Utc>,
        horizon: chrono::Duration,
    ) -> StoreResult<Vec<crate::events::SpecialEvent>>;
}

/// Live weather for a coordinate pair. `None` means the provider has no
/// current observation; the engine substitutes neutral defaults.
#[async_trait]
pub trait WeatherProvider: Send + Sync {
    async fn current(&self, lat: f64, lng: f64) -> StoreResult<Option<WeatherObservation>>;
}

/// Live driver supply per cell.
#[async_trait]
pub trait DriverLocator: Send + Sync {
    async fn drivers_in_cell(&self, cell: CellIndex) -> StoreResult<u32>;
}
