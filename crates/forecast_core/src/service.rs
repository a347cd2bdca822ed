//! The engine's inbound operation surface.
//!
//! `DemandForecastService` owns no database; it is generic over the five
//! collaborator interfaces and composes the feature builder, the model, and
//! the query services. HTTP routing, authentication, and persistence
//! adapters live outside this crate.

use std::sync::Arc;

use chrono::{DateTime, Duration, Utc};
use h3o::CellIndex;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use crate::accuracy::AccuracyService;
use crate::calendar::{HolidayCalendar, UsHolidays};
use crate::config::{ForecastConfig, InvalidWeight, ModelWeights, WeightsHandle};
use crate::error::ForecastError;
use crate::events::{EventKind, SpecialEvent};
use crate::features::FeatureBuilder;
use crate::history::{HistoricalDemandRecord, WeatherSnapshot};
use crate::hotspots::HotspotService;
use crate::model;
use crate::prediction::DemandPrediction;
use crate::reposition::RepositionService;
use crate::spatial::{BoundingBox, GeoIndex};
use crate::stores::{DriverLocator, EventStore, HistoryStore, PredictionStore, WeatherProvider};
use crate::types::{
    AccuracyMetrics, DemandLevel, Heatmap, HotspotZone, RepositionResponse, Timeframe,
};

/// Hotspot listings are capped to keep the query surface bounded.
const MAX_HOTSPOT_LIMIT: usize = 100;

pub struct DemandForecastService<H, P, E, W, D> {
    history: Arc<H>,
    predictions: Arc<P>,
    events: Arc<E>,
    weather: Arc<W>,
    geo: GeoIndex,
    config: ForecastConfig,
    weights: WeightsHandle,
    calendar: Arc<dyn HolidayCalendar>,
    features: FeatureBuilder<H, E, W, D>,
    hotspots: HotspotService<P, D>,
    reposition: RepositionService<P, D>,
    accuracy: AccuracyService<P, H>,
}

impl<H, P, E, W, D> DemandForecastService<H, P, E, W, D>
where
    H: HistoryStore,
    P: PredictionStore,
    E: EventStore,
    W: WeatherProvider,
    D: DriverLocator,
{
    pub fn new(
        history: Arc<H>,
        predictions: Arc<P>,
        events: Arc<E>,
        weather: Arc<W>,
        drivers: Arc<D>,
        config: ForecastConfig,
    ) -> Self {
        Self::with_calendar(
            history,
            predictions,
            events,
            weather,
            drivers,
            config,
            Arc::new(UsHolidays),
        )
    }

    pub fn with_calendar(
        history: Arc<H>,
        predictions: Arc<P>,
        events: Arc<E>,
        weather: Arc<W>,
        drivers: Arc<D>,
        config: ForecastConfig,
        calendar: Arc<dyn HolidayCalendar>,
    ) -> Self {
        let geo = GeoIndex::new(config.resolution);
        let features = FeatureBuilder::new(
            history.clone(),
            events.clone(),
            weather.clone(),
            drivers.clone(),
            geo,
            calendar.clone(),
            config,
        );
        let hotspots = HotspotService::new(predictions.clone(), drivers.clone(), geo);
        let reposition = RepositionService::new(predictions.clone(), drivers, geo, config);
        let accuracy = AccuracyService::new(predictions.clone(), history.clone());
        Self {
            history,
            predictions,
            events,
            weather,
            geo,
            config,
            weights: WeightsHandle::default(),
            calendar,
            features,
            hotspots,
            reposition,
            accuracy,
        }
    }

    /// Current model weights snapshot.
    pub fn weights(&self) -> ModelWeights {
        self.weights.snapshot()
    }

    /// Replace the model weights wholesale (configuration reload).
    pub fn set_weights(&self, weights: ModelWeights) -> Result<(), InvalidWeight> {
        self.weights.replace(weights)
    }

    pub fn geo(&self) -> &GeoIndex {
        &self.geo
    }

    /// Forecast demand for the cell containing `(lat, lng)`.
    pub async fn generate_prediction(
        &self,
        lat: f64,
        lng: f64,
        timeframe: Timeframe,
        cancel: &CancellationToken,
    ) -> Result<DemandPrediction, ForecastError> {
        let cell = self.geo.cell_at(lat, lng)?;
        self.predict_cell(cell, timeframe, Utc::now(), cancel).await
    }

    /// Forecast demand for every cell tiling `bounds`.
    pub async fn generate_predictions_for_area(
        &self,
        bounds: &BoundingBox,
        timeframe: Timeframe,
        cancel: &CancellationToken,
    ) -> Result<Vec<DemandPrediction>, ForecastError> {
        let mut cells = self.geo.tile(bounds)?;
        if cells.len() > self.config.max_area_cells {
            warn!(
                requested = cells.len(),
                kept = self.config.max_area_cells,
                "area tiling capped"
            );
            cells.truncate(self.config.max_area_cells);
        }

        let now = Utc::now();
        let mut predictions = Vec::with_capacity(cells.len());
        for cell in cells {
            if cancel.is_cancelled() {
                return Err(ForecastError::Cancelled);
            }
            predictions.push(self.predict_cell(cell, timeframe, now, cancel).await?);
        }
        Ok(predictions)
    }

    /// The highest-scoring cells for a timeframe. `limit` is clamped to
    /// 1..=100.
    pub async fn get_top_hotspots(
        &self,
        timeframe: Timeframe,
        limit: usize,
        cancel: &CancellationToken,
    ) -> Result<Vec<HotspotZone>, ForecastError> {
        let limit = limit.clamp(1, MAX_HOTSPOT_LIMIT);
        self.hotspots.top_hotspots(timeframe, limit, cancel).await
    }

    /// Demand heatmap for a bounding box, filtered to `min_level`.
    pub async fn get_demand_heatmap(
        &self,
        bounds: &BoundingBox,
        timeframe: Timeframe,
        min_level: DemandLevel,
        cancel: &CancellationToken,
    ) -> Result<Heatmap, ForecastError> {
        self.hotspots
            .heatmap(bounds, timeframe, min_level, Utc::now(), cancel)
            .await
    }

    /// Relocation targets for a driver.
    pub async fn get_reposition_recommendations(
        &self,
        driver_id: &str,
        lat: f64,
        lng: f64,
        max_distance_km: Option<f64>,
        limit: Option<usize>,
        cancel: &CancellationToken,
    ) -> Result<RepositionResponse, ForecastError> {
        self.reposition
            .recommend(driver_id, lat, lng, max_distance_km, limit, Utc::now(), cancel)
            .await
    }

    /// Register a special event. The demand multiplier is derived from the
    /// attendee count.
    #[allow(clippy::too_many_arguments)]
    pub async fn create_event(
        &self,
        name: String,
        kind: EventKind,
        lat: f64,
        lng: f64,
        start_time: DateTime<Utc>,
        end_time: DateTime<Utc>,
        expected_attendees: u32,
        impact_radius_km: Option<f64>,
        recurring: bool,
    ) -> Result<SpecialEvent, ForecastError> {
        if start_time >= end_time {
            return Err(ForecastError::InvalidTimeRange {
                start: start_time,
                end: end_time,
            });
        }
        let cell = self.geo.cell_at(lat, lng)?;
        let event = SpecialEvent::new(
            name,
            kind,
            lat,
            lng,
            cell,
            start_time,
            end_time,
            expected_attendees,
            impact_radius_km,
            recurring,
            Utc::now(),
        );
        self.events.put(event.clone()).await?;
        Ok(event)
    }

    /// Events starting within `hours_ahead` hours (or already running).
    /// A store failure degrades to an empty listing.
    pub async fn get_upcoming_events(&self, hours_ahead: i64) -> Vec<SpecialEvent> {
        match self
            .events
            .upcoming(Utc::now(), Duration::hours(hours_ahead))
            .await
        {
            Ok(events) => events,
            Err(err) => {
                warn!(%err, "upcoming-events lookup failed");
                Vec::new()
            }
        }
    }

    /// Record one bucket of observed demand for a cell. Entry point of the
    /// background snapshot recorder.
    pub async fn record_demand_snapshot(
        &self,
        cell: CellIndex,
        ride_requests: u32,
        completed_rides: u32,
        available_drivers: u32,
        avg_wait_minutes: f64,
        surge_multiplier: f64,
    ) -> Result<(), ForecastError> {
        let now = Utc::now();
        let (lat, lng) = self.geo.center_of(cell);

        // Attach live weather when the provider has it; the record is
        // complete without it.
        let weather = match self.weather.current(lat, lng).await {
            Ok(observation) => observation.map(|obs| WeatherSnapshot {
                kind: obs.kind,
                temperature_c: obs.temperature_c,
                precipitation_mm: obs.precipitation_mm,
            }),
            Err(err) => {
                debug!(%cell, %err, "weather unavailable for snapshot");
                None
            }
        };

        let record = HistoricalDemandRecord::new(
            cell,
            now,
            ride_requests,
            completed_rides,
            available_drivers,
            avg_wait_minutes,
            surge_multiplier,
        )
        .with_holiday(self.calendar.is_holiday(now.date_naive()))
        .with_weather(weather);

        self.history.record(record).await?;
        Ok(())
    }

    /// Accuracy metrics over the trailing `days_back` days.
    pub async fn get_model_accuracy(
        &self,
        timeframe: Timeframe,
        days_back: u32,
        cancel: &CancellationToken,
    ) -> Result<AccuracyMetrics, ForecastError> {
        self.accuracy
            .model_accuracy(timeframe, days_back, Utc::now(), cancel)
            .await
    }

    /// Shared prediction path: build features, run the model, persist
    /// best-effort, return the prediction regardless.
    async fn predict_cell(
        &self,
        cell: CellIndex,
        timeframe: Timeframe,
        now: DateTime<Utc>,
        cancel: &CancellationToken,
    ) -> Result<DemandPrediction, ForecastError> {
        let target_time = now + timeframe.horizon();
        let features = self.features.build(cell, target_time, now, cancel).await?;
        let weights = self.weights.snapshot();
        let prediction = model::predict(&features, &weights, timeframe, now);

        // A cancelled call must not leave a partial write behind.
        if cancel.is_cancelled() {
            return Err(ForecastError::Cancelled);
        }
        if let Err(err) = self.predictions.put(prediction.clone()).await {
            warn!(%cell, %err, "prediction persistence failed");
        }
        Ok(prediction)
    }
}
