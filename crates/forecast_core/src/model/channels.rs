//! The seven channel contribution functions of the prediction ensemble.
//!
//! Each channel estimates rides for the 15-minute slot being forecast; the
//! engine blends them with the configured weights. Channels that depend on
//! absent data (weather, events) contribute zero rather than a fabricated
//! baseline.

use chrono::Weekday;

use crate::events::attendee_multiplier;
use crate::features::FeatureVector;
use crate::types::WeatherObservation;

/// Holiday discount on the historical baseline.
const HOLIDAY_FACTOR: f64 = 0.7;

/// Raw (unweighted) per-channel ride estimates.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct ChannelEstimates {
    pub historical_pattern: f64,
    pub recent_trend: f64,
    pub time_of_day: f64,
    pub day_of_week: f64,
    pub weather: f64,
    pub events: f64,
    pub seasonal: f64,
}

pub fn estimate(features: &FeatureVector) -> ChannelEstimates {
    let base = features.historical_average;
    ChannelEstimates {
        historical_pattern: historical_pattern(features),
        recent_trend: recent_trend(features),
        time_of_day: base * time_of_day_multiplier(features.calendar.hour, features.calendar.weekend),
        day_of_week: base * day_of_week_multiplier(features.calendar.weekday),
        weather: features
            .weather
            .map(|obs| base * weather_multiplier(&obs))
            .unwrap_or(0.0),
        events: if features.event_nearby {
            base * attendee_multiplier(features.event_attendance)
        } else {
            0.0
        },
        seasonal: base * seasonal_multiplier(features.calendar.month),
    }
}

/// Historical slot average, discounted on holidays.
fn historical_pattern(features: &FeatureVector) -> f64 {
    if features.calendar.holiday {
        features.historical_average * HOLIDAY_FACTOR
    } else {
        features.historical_average
    }
}

/// Quarter-hour extrapolation of the trailing hour, tilted by the trend.
fn recent_trend(features: &FeatureVector) -> f64 {
    let tilt = (1.0 + features.trend * 0.1).clamp(0.5, 2.0);
    features.recent_60m as f64 * tilt / 4.0
}

/// Rush-hour and late-night multipliers. Late nights run hotter on weekends.
pub fn time_of_day_multiplier(hour: u32, weekend: bool) -> f64 {
    match hour {
        7..=9 => 1.5,
        17..=19 => 1.6,
        22..=23 | 0..=2 => {
            if weekend {
                1.4
            } else {
                1.2
            }
        }
        11..=14 => 1.1,
        _ => 1.0,
    }
}

pub fn day_of_week_multiplier(weekday: Weekday) -> f64 {
    match weekday {
        Weekday::Sun => 0.8,
        Weekday::Fri => 1.2,
        Weekday::Sat => 1.1,
        _ => 1.0,
    }
}

/// Bad weather pushes riders off sidewalks and into cars.
pub fn weather_multiplier(obs: &WeatherObservation) -> f64 {
    if obs.kind.is_snow() {
        1.5
    } else if obs.kind.is_rain() {
        1.3
    } else if obs.precipitation_probability > 0.7 {
        1.2
    } else {
        1.0
    }
}

/// Mild seasonal swing: winter up, summer down.
pub fn seasonal_multiplier(month: u32) -> f64 {
    match month {
        12 | 1 | 2 => 1.1,
        6 | 7 | 8 => 0.95,
        _ => 1.0,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_helpers::feature_fixture;
    use crate::types::WeatherKind;

    #[test]
    fn time_of_day_peaks_at_evening_rush() {
        assert_eq!(time_of_day_multiplier(8, false), 1.5);
        assert_eq!(time_of_day_multiplier(18, false), 1.6);
        assert_eq!(time_of_day_multiplier(23, false), 1.2);
        assert_eq!(time_of_day_multiplier(23, true), 1.4);
        assert_eq!(time_of_day_multiplier(1, true), 1.4);
        assert_eq!(time_of_day_multiplier(12, false), 1.1);
        assert_eq!(time_of_day_multiplier(4, false), 1.0);
        assert_eq!(time_of_day_multiplier(15, false), 1.0);
    }

    #[test]
    fn day_of_week_favours_friday() {
        assert_eq!(day_of_week_multiplier(Weekday::Fri), 1.2);
        assert_eq!(day_of_week_multiplier(Weekday::Sat), 1.1);
        assert_eq!(day_of_week_multiplier(Weekday::Sun), 0.8);
        assert_eq!(day_of_week_multiplier(Weekday::Wed), 1.0);
    }

    #[test]
    fn weather_multiplier_orders_conditions() {
        let obs = |kind, prob| WeatherObservation {
            kind,
            temperature_c: 10.0,
            precipitation_probability: prob,
            precipitation_mm: 0.0,
        };
        assert_eq!(weather_multiplier(&obs(WeatherKind::Snow, 0.0)), 1.5);
        assert_eq!(weather_multiplier(&obs(WeatherKind::Rain, 0.0)), 1.3);
        assert_eq!(weather_multiplier(&obs(WeatherKind::Drizzle, 0.0)), 1.3);
        assert_eq!(weather_multiplier(&obs(WeatherKind::Clear, 0.9)), 1.2);
        assert_eq!(weather_multiplier(&obs(WeatherKind::Clear, 0.2)), 1.0);
    }

    #[test]
    fn seasonal_multiplier_by_month() {
        assert_eq!(seasonal_multiplier(12), 1.1);
        assert_eq!(seasonal_multiplier(1), 1.1);
        assert_eq!(seasonal_multiplier(7), 0.95);
        assert_eq!(seasonal_multiplier(4), 1.0);
    }

    #[test]
    fn holiday_discounts_the_baseline() {
        let mut features = feature_fixture();
        features.historical_average = 30.0;
        features.calendar.holiday = true;
        let estimates = estimate(&features);
        assert!((estimates.historical_pattern - 21.0).abs() < 1e-12);
    }

    #[test]
    fn trend_tilts_the_hourly_extrapolation() {
        let mut features = feature_fixture();
        features.recent_60m = 40;
        features.trend = 0.4;
        let estimates = estimate(&features);
        assert!((estimates.recent_trend - 40.0 * 1.04 / 4.0).abs() < 1e-12);

        // An extreme negative trend is clamped at the halving floor.
        features.trend = -8.0;
        let floored = estimate(&features);
        assert!((floored.recent_trend - 40.0 * 0.5 / 4.0).abs() < 1e-12);
    }

    #[test]
    fn absent_weather_and_events_contribute_zero() {
        let mut features = feature_fixture();
        features.historical_average = 20.0;
        features.weather = None;
        features.event_nearby = false;
        let estimates = estimate(&features);
        assert_eq!(estimates.weather, 0.0);
        assert_eq!(estimates.events, 0.0);
    }

    #[test]
    fn nearby_event_scales_with_attendance() {
        let mut features = feature_fixture();
        features.historical_average = 10.0;
        features.event_nearby = true;
        features.event_attendance = 25_000;
        let estimates = estimate(&features);
        assert!((estimates.events - 25.0).abs() < 1e-12);
    }
}
