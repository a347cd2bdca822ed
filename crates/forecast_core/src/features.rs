//! Feature assembly: everything the prediction model needs for one
//! (cell, target time) pair, gathered from the collaborator interfaces.
//!
//! All reads are issued concurrently and are read-only. Best-effort
//! collaborators degrade to neutral defaults; only cancellation aborts a
//! build.

use std::sync::Arc;

use chrono::{DateTime, Duration, Utc};
use h3o::CellIndex;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use crate::calendar::{CalendarFeatures, HolidayCalendar};
use crate::config::ForecastConfig;
use crate::error::ForecastError;
use crate::history::{lagged_bucket, SlotStats};
use crate::spatial::GeoIndex;
use crate::stores::{DriverLocator, EventStore, HistoryStore, WeatherProvider};
use crate::types::WeatherObservation;

/// Input to the prediction model. Transient; never persisted directly.
#[derive(Debug, Clone)]
pub struct FeatureVector {
    pub cell: CellIndex,
    pub target_time: DateTime<Utc>,
    pub calendar: CalendarFeatures,
    /// Mean rides for this (cell, hour, weekday) slot over the look-back.
    pub historical_average: f64,
    pub historical_std: f64,
    /// Ride requests over the trailing 15 minutes.
    pub recent_15m: u32,
    /// Ride requests over the trailing 60 minutes.
    pub recent_60m: u32,
    /// Demand trend over the trailing hour, roughly [-1, +1].
    pub trend: f64,
    pub drivers_in_cell: u32,
    /// Mean demand across the six neighbor cells over the last 30 minutes.
    pub neighbor_avg_30m: f64,
    /// `None` when the provider has no observation; suppresses the weather
    /// contribution and its confidence bonus.
    pub weather: Option<WeatherObservation>,
    pub event_nearby: bool,
    /// Largest expected attendance among nearby events.
    pub event_attendance: u32,
    /// Rides in the bucket one week before the target bucket.
    pub lag_1w: f64,
    /// Rides in the bucket two weeks before the target bucket.
    pub lag_2w: f64,
}

/// Assembles feature vectors by fanning out reads to the collaborators.
pub struct FeatureBuilder<H, E, W, D> {
    history: Arc<H>,
    events: Arc<E>,
    weather: Arc<W>,
    drivers: Arc<D>,
    geo: GeoIndex,
    calendar: Arc<dyn HolidayCalendar>,
    config: ForecastConfig,
}

impl<H, E, W, D> FeatureBuilder<H, E, W, D>
where
    H: HistoryStore,
    E: EventStore,
    W: WeatherProvider,
    D: DriverLocator,
{
    pub fn new(
        history: Arc<H>,
        events: Arc<E>,
        weather: Arc<W>,
        drivers: Arc<D>,
        geo: GeoIndex,
        calendar: Arc<dyn HolidayCalendar>,
        config: ForecastConfig,
    ) -> Self {
        Self {
            history,
            events,
            weather,
            drivers,
            geo,
            calendar,
            config,
        }
    }

    /// Build the feature vector for `(cell, target_time)` as seen at `now`.
    ///
    /// Returns `Cancelled` if the token fires while reads are in flight;
    /// every other collaborator failure is absorbed into a neutral default.
    pub async fn build(
        &self,
        cell: CellIndex,
        target_time: DateTime<Utc>,
        now: DateTime<Utc>,
        cancel: &CancellationToken,
    ) -> Result<FeatureVector, ForecastError> {
        if cancel.is_cancelled() {
            return Err(ForecastError::Cancelled);
        }
        tokio::select! {
            _ = cancel.cancelled() => Err(ForecastError::Cancelled),
            features = self.gather(cell, target_time, now) => Ok(features),
        }
    }

    async fn gather(
        &self,
        cell: CellIndex,
        target_time: DateTime<Utc>,
        now: DateTime<Utc>,
    ) -> FeatureVector {
        let calendar = CalendarFeatures::for_time(target_time, self.calendar.as_ref());
        let (center_lat, center_lng) = self.geo.center_of(cell);
        let neighbors = self.geo.neighbors_of(cell);
        let event_window = Duration::hours(self.config.event_window_hours);

        let (
            slot,
            recent_15m,
            recent_60m,
            trend,
            drivers,
            neighbor_avg,
            weather,
            nearby_events,
            lag_1w,
            lag_2w,
        ) = tokio::join!(
            self.history.slot_stats(
                cell,
                calendar.hour,
                calendar.weekday,
                self.config.lookback_weeks,
                now,
            ),
            self.history
                .demand_in_window(cell, now - Duration::minutes(15), now),
            self.history
                .demand_in_window(cell, now - Duration::minutes(60), now),
            self.history.demand_trend(cell, now),
            self.drivers.drivers_in_cell(cell),
            self.history.mean_demand_in_window(
                &neighbors,
                now - Duration::minutes(30),
                now,
            ),
            self.weather.current(center_lat, center_lng),
            self.events.near(
                center_lat,
                center_lng,
                self.config.event_search_radius_km,
                target_time - event_window,
                target_time + event_window,
            ),
            self.history.demand_at_bucket(cell, lagged_bucket(target_time, 1)),
            self.history.demand_at_bucket(cell, lagged_bucket(target_time, 2)),
        );

        // The slot baseline is essential; everything else is best-effort.
        let slot = slot.unwrap_or_else(|err| {
            warn!(%cell, %err, "historical slot stats unavailable, assuming empty history");
            SlotStats::default()
        });

        let events = nearby_events.unwrap_or_else(|err| {
            debug!(%cell, %err, "event lookup failed, assuming no events");
            Vec::new()
        });
        let event_attendance = events
            .iter()
            .map(|ev| ev.expected_attendees)
            .max()
            .unwrap_or(0);

        FeatureVector {
            cell,
            target_time,
            calendar,
            historical_average: slot.average,
            historical_std: slot.std_dev,
            recent_15m: recover(recent_15m, 0, cell, "recent 15m demand"),
            recent_60m: recover(recent_60m, 0, cell, "recent 60m demand"),
            trend: recover(trend, 0.0, cell, "demand trend"),
            drivers_in_cell: recover(drivers, 0, cell, "driver count"),
            neighbor_avg_30m: recover(neighbor_avg, 0.0, cell, "neighbor demand"),
            weather: recover(weather, None, cell, "weather"),
            event_nearby: !events.is_empty(),
            event_attendance,
            lag_1w: recover(lag_1w, None, cell, "1-week lag").unwrap_or(0) as f64,
            lag_2w: recover(lag_2w, None, cell, "2-week lag").unwrap_or(0) as f64,
        }
    }
}

/// Collapse a best-effort read failure into its neutral default.
fn recover<T>(
    result: Result<T, crate::error::StoreError>,
    neutral: T,
    cell: CellIndex,
    what: &str,
) -> T {
    match result {
        Ok(value) => value,
        Err(err) => {
            debug!(%cell, %err, "{what} unavailable, using neutral default");
            neutral
        }
    }
}
