//! Personalized repositioning: pick the best reachable hotspot cells for a
//! driver, trading expected earnings against travel cost.

use std::sync::Arc;

use chrono::{DateTime, Duration, Utc};
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use crate::config::ForecastConfig;
use crate::error::ForecastError;
use crate::hotspots::HotspotService;
use crate::model::engine::priority_from_score;
use crate::spatial::{distance_to_cell_km, GeoIndex};
use crate::stores::{DriverLocator, PredictionStore};
use crate::types::{
    CurrentZone, DemandLevel, HotspotZone, RepositionReason, RepositionRecommendation,
    RepositionResponse, Timeframe,
};

/// Driver shortage gap (recommended minus live drivers) that earns the
/// "driver shortage" reason on its own.
const SHORTAGE_GAP: i64 = 5;

/// Surge at or above which relocating is justified by fare multiplier alone.
const SURGE_REASON_FLOOR: f64 = 2.0;

/// Per-kilometre penalty applied to a hotspot's score when ranking targets.
const DISTANCE_PENALTY: f64 = 5.0;

pub struct RepositionService<P, D> {
    hotspots: HotspotService<P, D>,
    predictions: Arc<P>,
    drivers: Arc<D>,
    geo: GeoIndex,
    config: ForecastConfig,
}

impl<P, D> RepositionService<P, D>
where
    P: PredictionStore,
    D: DriverLocator,
{
    pub fn new(
        predictions: Arc<P>,
        drivers: Arc<D>,
        geo: GeoIndex,
        config: ForecastConfig,
    ) -> Self {
        Self {
            hotspots: HotspotService::new(predictions.clone(), drivers.clone(), geo),
            predictions,
            drivers,
            geo,
            config,
        }
    }

    /// Recommend relocation targets for a driver at `(lat, lng)`.
    ///
    /// Store failures degrade to an empty recommendation list; only invalid
    /// coordinates and cancellation are surfaced.
    pub async fn recommend(
        &self,
        driver_id: &str,
        lat: f64,
        lng: f64,
        max_distance_km: Option<f64>,
        limit: Option<usize>,
        now: DateTime<Utc>,
        cancel: &CancellationToken,
    ) -> Result<RepositionResponse, ForecastError> {
        let max_distance_km = max_distance_km.unwrap_or(self.config.default_max_reposition_km);
        let limit = limit.unwrap_or(self.config.default_reposition_limit);
        let driver_cell = self.geo.cell_at(lat, lng)?;
        if cancel.is_cancelled() {
            return Err(ForecastError::Cancelled);
        }

        let current_zone = match self
            .predictions
            .latest_for_cell(driver_cell, Timeframe::Min30)
            .await
        {
            Ok(prediction) => prediction.map(|p| CurrentZone {
                cell: p.cell,
                predicted_rides: p.predicted_rides,
                demand_level: p.demand_level,
                expected_surge: p.expected_surge,
            }),
            Err(err) => {
                warn!(%driver_id, %err, "current-zone lookup failed");
                None
            }
        };

        let candidates = match self
            .hotspots
            .top_hotspots(Timeframe::Min30, self.config.reposition_candidates, cancel)
            .await
        {
            Ok(zones) => zones,
            Err(ForecastError::Cancelled) => return Err(ForecastError::Cancelled),
            Err(err) => {
                warn!(%driver_id, %err, "hotspot lookup failed, no recommendations");
                Vec::new()
            }
        };

        let mut ranked: Vec<(f64, RepositionRecommendation)> = Vec::new();
        for zone in candidates {
            if zone.cell == driver_cell {
                continue;
            }
            let distance_km = distance_to_cell_km(lat, lng, zone.cell);
            if distance_km > max_distance_km {
                continue;
            }
            if cancel.is_cancelled() {
                return Err(ForecastError::Cancelled);
            }
            let current_drivers = self
                .drivers
                .drivers_in_cell(zone.cell)
                .await
                .unwrap_or_else(|err| {
                    debug!(cell = %zone.cell, %err, "driver count unavailable");
                    0
                });
            ranked.push(self.score_candidate(&zone, distance_km, current_drivers, now));
        }

        // Best rank first; equal ranks go to the bigger payout.
        ranked.sort_by(|a, b| {
            b.0.total_cmp(&a.0)
                .then_with(|| b.1.earnings_estimate.total_cmp(&a.1.earnings_estimate))
        });
        let recommendations: Vec<RepositionRecommendation> =
            ranked.into_iter().take(limit).map(|(_, rec)| rec).collect();

        let estimated_earnings = recommendations
            .first()
            .map(|rec| rec.earnings_estimate)
            .unwrap_or(0.0);

        Ok(RepositionResponse {
            driver_id: driver_id.to_string(),
            current_zone,
            recommendations,
            estimated_earnings,
        })
    }

    fn score_candidate(
        &self,
        zone: &HotspotZone,
        distance_km: f64,
        current_drivers: u32,
        now: DateTime<Utc>,
    ) -> (f64, RepositionRecommendation) {
        let expected_rides_per_driver =
            zone.predicted_rides / f64::from(zone.recommended_drivers.max(1));
        let base_earnings = self.config.base_fare_per_ride * expected_rides_per_driver;
        let earnings_estimate = base_earnings * zone.expected_surge;

        let rank = zone.hotspot_score - DISTANCE_PENALTY * distance_km;
        let travel_secs = distance_km / self.config.reposition_speed_kmh * 3600.0;

        let gap = i64::from(zone.recommended_drivers) - i64::from(current_drivers);
        let reason = if zone.expected_surge >= SURGE_REASON_FLOOR {
            RepositionReason::HighSurge
        } else if gap > SHORTAGE_GAP {
            RepositionReason::DriverShortage
        } else if zone.demand_level >= DemandLevel::VeryHigh {
            RepositionReason::VeryHighDemand
        } else {
            RepositionReason::BetterEarnings
        };

        let recommendation = RepositionRecommendation {
            cell: zone.cell,
            center_lat: zone.center_lat,
            center_lng: zone.center_lng,
            distance_km,
            hotspot_score: zone.hotspot_score,
            expected_surge: zone.expected_surge,
            demand_level: zone.demand_level,
            expected_rides_per_driver,
            earnings_estimate,
            priority: priority_from_score(rank),
            reason,
            arrival_eta: now + Duration::seconds(travel_secs as i64),
        };
        (rank, recommendation)
    }
}

#[cfg(all(test, feature = "memory-stores"))]
mod tests {
    use super::*;
    use crate::prediction::{DemandPrediction, FeatureContributions};
    use crate::stores::memory::{MemoryPredictionStore, StaticDrivers};
    use crate::stores::PredictionStore as _;
    use chrono::TimeZone;
    use h3o::CellIndex;
    use uuid::Uuid;

    const DRIVER: (f64, f64) = (37.7749, -122.4194);

    fn noon() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2025, 3, 14, 12, 0, 0).single().expect("valid")
    }

    #[allow(clippy::too_many_arguments)]
    fn prediction(
        cell: CellIndex,
        score: f64,
        rides: f64,
        recommended: u32,
        surge: f64,
        level: DemandLevel,
    ) -> DemandPrediction {
        let now = noon();
        DemandPrediction {
            id: Uuid::new_v4(),
            cell,
            target_time: now + Duration::minutes(30),
            generated_at: now,
            timeframe: Timeframe::Min30,
            predicted_rides: rides,
            lower_bound: 0.0,
            upper_bound: rides * 2.0,
            confidence: 0.8,
            demand_level: level,
            recommended_drivers: recommended,
            expected_surge: surge,
            hotspot_score: score,
            reposition_priority: 3,
            contributions: FeatureContributions::default(),
        }
    }

    fn service() -> (
        RepositionService<MemoryPredictionStore, StaticDrivers>,
        Arc<MemoryPredictionStore>,
        Arc<StaticDrivers>,
    ) {
        let store = Arc::new(MemoryPredictionStore::new());
        let drivers = Arc::new(StaticDrivers::default());
        let service = RepositionService::new(
            store.clone(),
            drivers.clone(),
            GeoIndex::default(),
            ForecastConfig::default(),
        );
        (service, store, drivers)
    }

    /// S5 layout: three hotspots at ~1 km, ~6 km and ~0.5 km from the driver.
    async fn seed_s5(
        store: &MemoryPredictionStore,
        drivers: &StaticDrivers,
    ) -> (CellIndex, CellIndex, CellIndex) {
        let geo = GeoIndex::default();
        let near_strong = geo.cell_at(37.7839, -122.4194).expect("cell"); // ~1 km
        let far_surging = geo.cell_at(37.8249, -122.4194).expect("cell"); // ~5.6 km
        let near_weak = geo.cell_at(37.7794, -122.4194).expect("cell"); // ~0.5 km

        store
            .put(prediction(near_strong, 80.0, 20.0, 8, 1.6, DemandLevel::Normal))
            .await
            .expect("put");
        store
            .put(prediction(far_surging, 90.0, 30.0, 12, 2.2, DemandLevel::High))
            .await
            .expect("put");
        store
            .put(prediction(near_weak, 60.0, 6.0, 3, 1.0, DemandLevel::Low))
            .await
            .expect("put");

        drivers.set(near_strong, 4);
        drivers.set(far_surging, 9);
        drivers.set(near_weak, 2);
        (near_strong, far_surging, near_weak)
    }

    #[tokio::test]
    async fn ranks_by_score_minus_travel_cost() {
        let (service, store, drivers) = service();
        let (near_strong, far_surging, near_weak) = seed_s5(&store, &drivers).await;

        let response = service
            .recommend("driver-7", DRIVER.0, DRIVER.1, Some(10.0), Some(3), noon(), &CancellationToken::new())
            .await
            .expect("recommend");

        let cells: Vec<CellIndex> = response.recommendations.iter().map(|r| r.cell).collect();
        assert_eq!(cells, vec![near_strong, far_surging, near_weak]);

        assert_eq!(response.recommendations[0].reason, RepositionReason::BetterEarnings);
        assert_eq!(response.recommendations[1].reason, RepositionReason::HighSurge);
        assert_eq!(response.recommendations[2].reason, RepositionReason::BetterEarnings);

        let top = &response.recommendations[0];
        assert!((response.estimated_earnings - top.earnings_estimate).abs() < 1e-12);
        let expected = 15.0 * (20.0 / 8.0) * 1.6;
        assert!((top.earnings_estimate - expected).abs() < 1e-9);
    }

    #[tokio::test]
    async fn max_distance_drops_far_candidates() {
        let (service, store, drivers) = service();
        let (near_strong, far_surging, near_weak) = seed_s5(&store, &drivers).await;

        let response = service
            .recommend("driver-7", DRIVER.0, DRIVER.1, Some(5.0), Some(3), noon(), &CancellationToken::new())
            .await
            .expect("recommend");

        let cells: Vec<CellIndex> = response.recommendations.iter().map(|r| r.cell).collect();
        assert!(cells.contains(&near_strong));
        assert!(cells.contains(&near_weak));
        assert!(!cells.contains(&far_surging));
    }

    #[tokio::test]
    async fn own_cell_is_never_recommended() {
        let (service, store, _) = service();
        let geo = GeoIndex::default();
        let own = geo.cell_at(DRIVER.0, DRIVER.1).expect("cell");
        store
            .put(prediction(own, 95.0, 40.0, 20, 2.5, DemandLevel::Extreme))
            .await
            .expect("put");

        let response = service
            .recommend("driver-7", DRIVER.0, DRIVER.1, None, None, noon(), &CancellationToken::new())
            .await
            .expect("recommend");

        assert!(response.recommendations.is_empty());
        assert_eq!(response.estimated_earnings, 0.0);
        // But the own-cell prediction does describe the current zone.
        let current = response.current_zone.expect("current zone");
        assert_eq!(current.cell, own);
        assert_eq!(current.expected_surge, 2.5);
    }

    #[tokio::test]
    async fn shortage_and_demand_reasons_take_their_turn() {
        let (service, store, drivers) = service();
        let geo = GeoIndex::default();
        let short_staffed = geo.cell_at(37.7839, -122.4194).expect("cell");
        let frenzied = geo.cell_at(37.7794, -122.4294).expect("cell");

        // Below the surge floor, gap of 10 > 5: shortage.
        store
            .put(prediction(short_staffed, 70.0, 24.0, 12, 1.8, DemandLevel::High))
            .await
            .expect("put");
        drivers.set(short_staffed, 2);
        // Below the surge floor, small gap, very-high level.
        store
            .put(prediction(frenzied, 65.0, 18.0, 9, 1.9, DemandLevel::VeryHigh))
            .await
            .expect("put");
        drivers.set(frenzied, 8);

        let response = service
            .recommend("driver-7", DRIVER.0, DRIVER.1, None, None, noon(), &CancellationToken::new())
            .await
            .expect("recommend");

        let by_cell = |cell: CellIndex| {
            response
                .recommendations
                .iter()
                .find(|r| r.cell == cell)
                .expect("recommended")
        };
        assert_eq!(by_cell(short_staffed).reason, RepositionReason::DriverShortage);
        assert_eq!(by_cell(frenzied).reason, RepositionReason::VeryHighDemand);
    }

    #[tokio::test]
    async fn eta_reflects_travel_speed() {
        let (service, store, drivers) = service();
        let (near_strong, _, _) = seed_s5(&store, &drivers).await;

        let now = noon();
        let response = service
            .recommend("driver-7", DRIVER.0, DRIVER.1, None, None, now, &CancellationToken::new())
            .await
            .expect("recommend");
        let top = response
            .recommendations
            .iter()
            .find(|r| r.cell == near_strong)
            .expect("present");

        let expected_secs = top.distance_km / 30.0 * 3600.0;
        let actual_secs = (top.arrival_eta - now).num_seconds() as f64;
        assert!((actual_secs - expected_secs).abs() <= 1.0);
    }

    #[tokio::test]
    async fn invalid_driver_location_is_rejected() {
        let (service, _, _) = service();
        let result = service
            .recommend("driver-7", 120.0, 0.0, None, None, noon(), &CancellationToken::new())
            .await;
        assert!(matches!(result, Err(ForecastError::InvalidLocation { .. })));
    }

    #[tokio::test]
    async fn close_perfect_cell_gets_top_priority() {
        let (service, store, drivers) = service();
        let geo = GeoIndex::default();
        // A cell essentially on top of the driver with a saturated score.
        let jackpot = geo.cell_at(37.7752, -122.4197).expect("cell");
        store
            .put(prediction(jackpot, 100.0, 50.0, 25, 3.0, DemandLevel::Extreme))
            .await
            .expect("put");
        drivers.set(jackpot, 1);

        let response = service
            .recommend("driver-7", 37.7800, -122.4194, None, None, noon(), &CancellationToken::new())
            .await
            .expect("recommend");
        let top = &response.recommendations[0];
        assert_eq!(top.priority, 1);
    }
}
