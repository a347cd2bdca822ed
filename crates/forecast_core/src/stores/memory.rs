//! In-memory store implementations.
//!
//! These back the test harness and local runs, and double as the reference
//! semantics for the store contracts. All of them are plain maps behind a
//! `parking_lot` lock; none of them suspend.

use std::collections::BTreeMap;

use async_trait::async_trait;
use chrono::{DateTime, Duration, Utc, Weekday};
use h3o::CellIndex;
use parking_lot::RwLock;

use crate::events::SpecialEvent;
use crate::history::{bucket_start, HistoricalDemandRecord, SlotStats, BUCKET_MINUTES};
use crate::prediction::DemandPrediction;
use crate::spatial::{haversine_km, BoundingBox};
use crate::stores::{
    DriverLocator, EventStore, HistoryStore, PredictionStore, StoreResult, WeatherProvider,
};
use crate::types::{Timeframe, WeatherObservation};

/// History keyed by (cell, bucket start); one record per bucket.
#[derive(Debug, Default)]
pub struct MemoryHistoryStore {
    records: RwLock<BTreeMap<(CellIndex, DateTime<Utc>), HistoricalDemandRecord>>,
}

impl MemoryHistoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.records.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.read().is_empty()
    }

    /// The full record for the bucket containing `ts`, if one was written.
    pub fn record_for(
        &self,
        cell: CellIndex,
        ts: DateTime<Utc>,
    ) -> Option<HistoricalDemandRecord> {
        self.records.read().get(&(cell, bucket_start(ts))).cloned()
    }

    fn requests_in_window(&self, cell: CellIndex, from: DateTime<Utc>, to: DateTime<Utc>) -> u32 {
        let records = self.records.read();
        records
            .range((cell, bucket_start(from))..(cell, to))
            .map(|(_, r)| r.ride_requests)
            .sum()
    }
}

#[async_trait]
impl HistoryStore for MemoryHistoryStore {
    async fn record(&self, record: HistoricalDemandRecord) -> StoreResult<()> {
        let key = (record.cell, record.bucket_start);
        self.records.write().insert(key, record);
        Ok(())
    }

    async fn slot_stats(
        &self,
        cell: CellIndex,
        hour: u32,
        weekday: Weekday,
        weeks_back: u32,
        now: DateTime<Utc>,
    ) -> StoreResult<SlotStats> {
        let horizon = now - Duration::weeks(weeks_back as i64);
        let records = self.records.read();
        let counts: Vec<u32> = records
            .range((cell, horizon)..(cell, now))
            .filter(|(_, r)| r.hour == hour && r.weekday == weekday)
            .map(|(_, r)| r.ride_requests)
            .collect();
        Ok(SlotStats::from_counts(&counts))
    }

    async fn demand_in_window(
        &self,
        cell: CellIndex,
        from: DateTime<Utc>,
        to: DateTime<Utc>,
    ) -> StoreResult<u32> {
        Ok(self.requests_in_window(cell, from, to))
    }

    async fn demand_trend(&self, cell: CellIndex, now: DateTime<Utc>) -> StoreResult<f64> {
        // Least-squares slope over the four completed buckets before `now`
        // (the partial current bucket would bias the slope down), normalized
        // by the mean so the result lands in roughly [-1, +1].
        let mut counts = [0.0f64; 4];
        let newest = bucket_start(now);
        for (i, slot) in counts.iter_mut().enumerate() {
            let from = newest - Duration::minutes(BUCKET_MINUTES * (4 - i as i64));
            *slot = self.requests_in_window(cell, from, from + Duration::minutes(BUCKET_MINUTES))
                as f64;
        }

        let mean = counts.iter().sum::<f64>() / 4.0;
        let x_mean = 1.5;
        let mut num = 0.0;
        let mut den = 0.0;
        for (i, y) in counts.iter().enumerate() {
            let dx = i as f64 - x_mean;
            num += dx * (y - mean);
            den += dx * dx;
        }
        let slope = num / den;
        Ok((slope / (mean + 1.0)).clamp(-1.0, 1.0))
    }

    async fn mean_demand_in_window(
        &self,
        cells: &[CellIndex],
        from: DateTime<Utc>,
        to: DateTime<Utc>,
    ) -> StoreResult<f64> {
        if cells.is_empty() {
            return Ok(0.0);
        }
        let total: u32 = cells
            .iter()
            .map(|cell| self.requests_in_window(*cell, from, to))
            .sum();
        Ok(total as f64 / cells.len() as f64)
    }

    async fn demand_at_bucket(
        &self,
        cell: CellIndex,
        bucket: DateTime<Utc>,
    ) -> StoreResult<Option<u32>> {
        let records = self.records.read();
        Ok(records
            .get(&(cell, bucket_start(bucket)))
            .map(|r| r.ride_requests))
    }
}

/// Append log of predictions with a latest-per-(cell, timeframe) view.
#[derive(Debug, Default)]
pub struct MemoryPredictionStore {
    predictions: RwLock<Vec<DemandPrediction>>,
}

impl MemoryPredictionStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.predictions.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.predictions.read().is_empty()
    }

    fn latest_per_cell(&self, timeframe: Timeframe) -> Vec<DemandPrediction> {
        let predictions = self.predictions.read();
        let mut latest: BTreeMap<CellIndex, &DemandPrediction> = BTreeMap::new();
        for p in predictions.iter().filter(|p| p.timeframe == timeframe) {
            match latest.get(&p.cell) {
                Some(seen) if seen.generated_at >= p.generated_at => {}
                _ => {
                    latest.insert(p.cell, p);
                }
            }
        }
        latest.into_values().cloned().collect()
    }
}

#[async_trait]
impl PredictionStore for MemoryPredictionStore {
    async fn put(&self, prediction: DemandPrediction) -> StoreResult<()> {
        self.predictions.write().push(prediction);
        Ok(())
    }

    async fn latest_for_cell(
        &self,
        cell: CellIndex,
        timeframe: Timeframe,
    ) -> StoreResult<Option<DemandPrediction>> {
        let predictions = self.predictions.read();
        Ok(predictions
            .iter()
            .filter(|p| p.cell == cell && p.timeframe == timeframe)
            .max_by_key(|p| p.generated_at)
            .cloned())
    }

    async fn top_by_score(
        &self,
        timeframe: Timeframe,
        limit: usize,
    ) -> StoreResult<Vec<DemandPrediction>> {
        let mut latest = self.latest_per_cell(timeframe);
        latest.sort_by(|a, b| {
            b.hotspot_score
                .total_cmp(&a.hotspot_score)
                .then_with(|| b.predicted_rides.total_cmp(&a.predicted_rides))
                .then_with(|| a.cell.cmp(&b.cell))
        });
        latest.truncate(limit);
        Ok(latest)
    }

    async fn in_bounds(
        &self,
        bounds: &BoundingBox,
        timeframe: Timeframe,
    ) -> StoreResult<Vec<DemandPrediction>> {
        Ok(self
            .latest_per_cell(timeframe)
            .into_iter()
            .filter(|p| {
                let center: h3o::LatLng = p.cell.into();
                bounds.contains(center.lat(), center.lng())
            })
            .collect())
    }

    async fn matured(
        &self,
        timeframe: Timeframe,
        since: DateTime<Utc>,
        now: DateTime<Utc>,
    ) -> StoreResult<Vec<DemandPrediction>> {
        let predictions = self.predictions.read();
        Ok(predictions
            .iter()
            .filter(|p| {
                p.timeframe == timeframe
                    && p.target_time <= now
                    && p.target_time >= since
            })
            .cloned()
            .collect())
    }
}

/// Linear scan over events with a Haversine reach filter.
#[derive(Debug, Default)]
pub struct MemoryEventStore {
    events: RwLock<Vec<SpecialEvent>>,
}

impl MemoryEventStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.events.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.events.read().is_empty()
    }
}

#[async_trait]
impl EventStore for MemoryEventStore {
    async fn put(&self, event: SpecialEvent) -> StoreResult<()> {
        self.events.write().push(event);
        Ok(())
    }

    async fn near(
        &self,
        lat: f64,
        lng: f64,
        radius_km: f64,
        from: DateTime<Utc>,
        to: DateTime<Utc>,
    ) -> StoreResult<Vec<SpecialEvent>> {
        let events = self.events.read();
        Ok(events
            .iter()
            .filter(|ev| {
                let distance = haversine_km(lat, lng, ev.lat, ev.lng);
                distance <= radius_km.max(ev.impact_radius_km) && ev.overlaps(from, to)
            })
            .cloned()
            .collect())
    }

    async fn upcoming(
        &self,
        now: DateTime<Utc>,
        horizon: Duration,
    ) -> StoreResult<Vec<SpecialEvent>> {
        let events = self.events.read();
        let mut upcoming: Vec<SpecialEvent> = events
            .iter()
            .filter(|ev| ev.end_time >= now && ev.start_time <= now + horizon)
            .cloned()
            .collect();
        upcoming.sort_by_key(|ev| ev.start_time);
        Ok(upcoming)
    }
}

/// Weather provider returning a fixed observation. Handy as a local default.
#[derive(Debug, Default)]
pub struct StaticWeather {
    pub observation: Option<WeatherObservation>,
}

#[async_trait]
impl WeatherProvider for StaticWeather {
    async fn current(&self, _lat: f64, _lng: f64) -> StoreResult<Option<WeatherObservation>> {
        Ok(self.observation)
    }
}

/// Driver locator with a fixed per-cell count.
#[derive(Debug, Default)]
pub struct StaticDrivers {
    counts: RwLock<BTreeMap<CellIndex, u32>>,
}

impl StaticDrivers {
    pub fn set(&self, cell: CellIndex, count: u32) {
        self.counts.write().insert(cell, count);
    }
}

#[async_trait]
impl DriverLocator for StaticDrivers {
    async fn drivers_in_cell(&self, cell: CellIndex) -> StoreResult<u32> {
        Ok(self.counts.read().get(&cell).copied().unwrap_or(0))
    }
}
