//! The weighted ensemble: feature vector in, demand prediction out.
//!
//! `predict` is a pure function over its inputs; it performs no I/O and
//! cannot fail. Persistence of the result is the caller's concern.

use chrono::{DateTime, Utc};
use uuid::Uuid;

use crate::config::ModelWeights;
use crate::features::FeatureVector;
use crate::model::channels;
use crate::prediction::{DemandPrediction, FeatureContributions};
use crate::types::{DemandLevel, Timeframe};

/// z-score of the 95% interval.
const Z_95: f64 = 1.96;

/// Ratio denominator floor: keeps sparse cells from flapping into "extreme"
/// on a handful of rides.
const BASELINE_FLOOR: f64 = 10.0;

/// Run the ensemble for one feature vector.
pub fn predict(
    features: &FeatureVector,
    weights: &ModelWeights,
    timeframe: Timeframe,
    now: DateTime<Utc>,
) -> DemandPrediction {
    let estimates = channels::estimate(features);
    let contributions = FeatureContributions {
        historical_pattern: weights.historical_pattern * estimates.historical_pattern,
        recent_trend: weights.recent_trend * estimates.recent_trend,
        time_of_day: weights.time_of_day * estimates.time_of_day,
        day_of_week: weights.day_of_week * estimates.day_of_week,
        weather: weights.weather * estimates.weather,
        events: weights.events * estimates.events,
        seasonal: weights.seasonal * estimates.seasonal,
    };
    let predicted_rides = contributions.total().max(0.0);

    let confidence = confidence(features);
    let std_err = features.historical_std * (1.0 - confidence);
    let lower_bound = (predicted_rides - Z_95 * std_err).max(0.0);
    let upper_bound = predicted_rides + Z_95 * std_err;

    let ratio = predicted_rides / features.historical_average.max(BASELINE_FLOOR);
    let demand_level = DemandLevel::from_ratio(ratio);
    let recommended_drivers = recommended_drivers(predicted_rides);
    let expected_surge = expected_surge(predicted_rides, features.drivers_in_cell);
    let hotspot_score = hotspot_score(
        predicted_rides,
        recommended_drivers,
        features.drivers_in_cell,
        expected_surge,
        features.trend,
    );

    DemandPrediction {
        id: Uuid::new_v4(),
        cell: features.cell,
        target_time: features.target_time,
        generated_at: now,
        timeframe,
        predicted_rides,
        lower_bound,
        upper_bound,
        confidence,
        demand_level,
        recommended_drivers,
        expected_surge,
        hotspot_score,
        reposition_priority: priority_from_score(hotspot_score),
        contributions,
    }
}

/// Confidence in [0.5, 0.95], earned from the quality of the inputs.
fn confidence(features: &FeatureVector) -> f64 {
    let mut confidence: f64 = 0.5;
    if features.historical_average > 0.0 {
        confidence += 0.2;
    }
    if features.recent_60m > 0 {
        confidence += 0.1;
    }
    if features.weather.is_some() {
        confidence += 0.1;
    }
    if features.historical_std < 0.5 * features.historical_average {
        confidence += 0.1;
    }
    confidence.min(0.95)
}

/// Drivers needed to serve the predicted rides with headroom. At least one.
pub fn recommended_drivers(predicted_rides: f64) -> u32 {
    ((predicted_rides / 2.0 * 1.2).ceil() as u32).max(1)
}

/// Piecewise-linear surge in the rides-per-driver ratio: 1.0 at ratio <= 1,
/// +0.5 per unit of ratio, capped at 3.0.
pub fn expected_surge(predicted_rides: f64, drivers: u32) -> f64 {
    let ratio = predicted_rides / f64::from(drivers.max(1));
    (1.0 + 0.5 * (ratio - 1.0)).clamp(1.0, 3.0)
}

/// Composite 0-100 score ranking cells for driver attention.
pub fn hotspot_score(
    predicted_rides: f64,
    recommended_drivers: u32,
    current_drivers: u32,
    surge: f64,
    trend: f64,
) -> f64 {
    let volume = (2.0 * predicted_rides).min(100.0);
    let shortage =
        (20.0 * (f64::from(recommended_drivers) - f64::from(current_drivers))).clamp(0.0, 100.0);
    let surge_score = (surge - 1.0) * 50.0;
    let trend_score = (50.0 + 10.0 * trend).clamp(0.0, 100.0);
    0.4 * volume + 0.3 * shortage + 0.2 * surge_score + 0.1 * trend_score
}

/// Fold a 0-100 score into the 1-10 priority scale (1 = act first).
pub fn priority_from_score(score: f64) -> u8 {
    (10.0 - score / 10.0).round().clamp(1.0, 10.0) as u8
}
