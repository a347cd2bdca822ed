//! Hotspot ranking and demand heatmaps over persisted predictions.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use tokio_util::sync::CancellationToken;
use tracing::debug;

use crate::error::ForecastError;
use crate::prediction::DemandPrediction;
use crate::spatial::{BoundingBox, GeoIndex};
use crate::stores::{DriverLocator, PredictionStore};
use crate::types::{DemandLevel, Heatmap, HeatmapCell, HotspotZone, Timeframe};

/// Aggregates per-cell predictions into ranked lists and heatmaps.
pub struct HotspotService<P, D> {
    predictions: Arc<P>,
    drivers: Arc<D>,
    geo: GeoIndex,
}

impl<P, D> HotspotService<P, D>
where
    P: PredictionStore,
    D: DriverLocator,
{
    pub fn new(predictions: Arc<P>, drivers: Arc<D>, geo: GeoIndex) -> Self {
        Self {
            predictions,
            drivers,
            geo,
        }
    }

    /// The `limit` highest-scoring cells for the timeframe.
    pub async fn top_hotspots(
        &self,
        timeframe: Timeframe,
        limit: usize,
        cancel: &CancellationToken,
    ) -> Result<Vec<HotspotZone>, ForecastError> {
        if cancel.is_cancelled() {
            return Err(ForecastError::Cancelled);
        }
        let ranked = tokio::select! {
            _ = cancel.cancelled() => return Err(ForecastError::Cancelled),
            ranked = self.predictions.top_by_score(timeframe, limit) => ranked?,
        };
        Ok(ranked.iter().map(|p| self.to_zone(p)).collect())
    }

    /// Snapshot of demand inside `bounds`, filtered to `min_level` and
    /// annotated with live driver counts.
    pub async fn heatmap(
        &self,
        bounds: &BoundingBox,
        timeframe: Timeframe,
        min_level: DemandLevel,
        now: DateTime<Utc>,
        cancel: &CancellationToken,
    ) -> Result<Heatmap, ForecastError> {
        bounds.validate()?;
        if cancel.is_cancelled() {
            return Err(ForecastError::Cancelled);
        }

        let inside = tokio::select! {
            _ = cancel.cancelled() => return Err(ForecastError::Cancelled),
            inside = self.predictions.in_bounds(bounds, timeframe) => inside?,
        };

        let mut zones = Vec::with_capacity(inside.len());
        for p in inside {
            if p.demand_level < min_level {
                continue;
            }
            let (lat, lng) = self.geo.center_of(p.cell);
            if !bounds.contains(lat, lng) {
                continue;
            }
            if cancel.is_cancelled() {
                return Err(ForecastError::Cancelled);
            }
            // Driver counts are decoration; a dead locator degrades to zero.
            let current_drivers = self
                .drivers
                .drivers_in_cell(p.cell)
                .await
                .unwrap_or_else(|err| {
                    debug!(cell = %p.cell, %err, "driver count unavailable for heatmap");
                    0
                });
            zones.push(HeatmapCell {
                cell: p.cell,
                center_lat: lat,
                center_lng: lng,
                predicted_rides: p.predicted_rides,
                demand_level: p.demand_level,
                hotspot_score: p.hotspot_score,
                expected_surge: p.expected_surge,
                current_drivers,
            });
        }

        Ok(Heatmap {
            bounds: *bounds,
            timeframe,
            generated_at: now,
            zones,
        })
    }

    fn to_zone(&self, p: &DemandPrediction) -> HotspotZone {
        let (lat, lng) = self.geo.center_of(p.cell);
        HotspotZone {
            cell: p.cell,
            center_lat: lat,
            center_lng: lng,
            timeframe: p.timeframe,
            predicted_rides: p.predicted_rides,
            hotspot_score: p.hotspot_score,
            demand_level: p.demand_level,
            expected_surge: p.expected_surge,
            recommended_drivers: p.recommended_drivers,
            reposition_priority: p.reposition_priority,
        }
    }
}

#[cfg(all(test, feature = "memory-stores"))]
mod tests {
    use super::*;
    use crate::prediction::FeatureContributions;
    use crate::stores::memory::{MemoryPredictionStore, StaticDrivers};
    use crate::stores::PredictionStore as _;
    use chrono::TimeZone;
    use h3o::CellIndex;
    use uuid::Uuid;

    fn noon() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2025, 3, 14, 12, 0, 0).single().expect("valid")
    }

    fn prediction(cell: CellIndex, score: f64, level: DemandLevel) -> DemandPrediction {
        let now = noon();
        DemandPrediction {
            id: Uuid::new_v4(),
            cell,
            target_time: now + chrono::Duration::minutes(30),
            generated_at: now,
            timeframe: Timeframe::Min30,
            predicted_rides: score / 2.0,
            lower_bound: 0.0,
            upper_bound: score,
            confidence: 0.8,
            demand_level: level,
            recommended_drivers: 6,
            expected_surge: 1.5,
            hotspot_score: score,
            reposition_priority: 3,
            contributions: FeatureContributions::default(),
        }
    }

    fn service() -> (
        HotspotService<MemoryPredictionStore, StaticDrivers>,
        Arc<MemoryPredictionStore>,
        Arc<StaticDrivers>,
    ) {
        let store = Arc::new(MemoryPredictionStore::new());
        let drivers = Arc::new(StaticDrivers::default());
        let service = HotspotService::new(store.clone(), drivers.clone(), GeoIndex::default());
        (service, store, drivers)
    }

    #[tokio::test]
    async fn top_hotspots_rank_by_score() {
        let (service, store, _) = service();
        let geo = GeoIndex::default();
        let hot = geo.cell_at(37.7749, -122.4194).expect("cell");
        let warm = geo.cell_at(37.7849, -122.4094).expect("cell");
        store
            .put(prediction(warm, 40.0, DemandLevel::Normal))
            .await
            .expect("put");
        store
            .put(prediction(hot, 90.0, DemandLevel::VeryHigh))
            .await
            .expect("put");

        let top = service
            .top_hotspots(Timeframe::Min30, 10, &CancellationToken::new())
            .await
            .expect("hotspots");
        assert_eq!(top.len(), 2);
        assert_eq!(top[0].cell, hot);
        assert_eq!(top[0].hotspot_score, 90.0);
    }

    #[tokio::test]
    async fn heatmap_filters_level_and_bounds() {
        let (service, store, drivers) = service();
        let geo = GeoIndex::default();
        let inside = geo.cell_at(37.78, -122.42).expect("cell");
        let outside = geo.cell_at(37.90, -122.42).expect("cell");
        let quiet = geo.cell_at(37.781, -122.417).expect("cell");

        store
            .put(prediction(inside, 80.0, DemandLevel::High))
            .await
            .expect("put");
        store
            .put(prediction(outside, 85.0, DemandLevel::High))
            .await
            .expect("put");
        store
            .put(prediction(quiet, 10.0, DemandLevel::Low))
            .await
            .expect("put");
        drivers.set(inside, 7);

        let bounds = BoundingBox::new(37.76, 37.80, -122.44, -122.40).expect("box");
        let heatmap = service
            .heatmap(
                &bounds,
                Timeframe::Min30,
                DemandLevel::Normal,
                noon(),
                &CancellationToken::new(),
            )
            .await
            .expect("heatmap");

        assert_eq!(heatmap.zones.len(), 1);
        assert_eq!(heatmap.zones[0].cell, inside);
        assert_eq!(heatmap.zones[0].current_drivers, 7);
        assert_eq!(heatmap.timeframe, Timeframe::Min30);
    }

    #[tokio::test]
    async fn heatmap_rejects_degenerate_bounds() {
        let (service, _, _) = service();
        let bounds = BoundingBox {
            lat_min: 38.0,
            lat_max: 37.0,
            lng_min: -122.44,
            lng_max: -122.40,
        };
        let result = service
            .heatmap(
                &bounds,
                Timeframe::Min30,
                DemandLevel::VeryLow,
                noon(),
                &CancellationToken::new(),
            )
            .await;
        assert!(matches!(result, Err(ForecastError::InvalidBBox(_))));
    }

    #[tokio::test]
    async fn cancelled_token_short_circuits() {
        let (service, _, _) = service();
        let token = CancellationToken::new();
        token.cancel();
        let result = service.top_hotspots(Timeframe::Min30, 5, &token).await;
        assert!(matches!(result, Err(ForecastError::Cancelled)));
    }
}
