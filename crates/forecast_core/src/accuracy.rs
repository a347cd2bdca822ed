//! Model accuracy: matured predictions compared against realized demand.

use std::sync::Arc;

use chrono::{DateTime, Duration, Utc};
use tokio_util::sync::CancellationToken;
use tracing::warn;

use crate::error::ForecastError;
use crate::history::bucket_start;
use crate::stores::{HistoryStore, PredictionStore};
use crate::types::{AccuracyMetrics, Timeframe};

/// Read-only comparison of past predictions to what actually happened.
pub struct AccuracyService<P, H> {
    predictions: Arc<P>,
    history: Arc<H>,
}

impl<P, H> AccuracyService<P, H>
where
    P: PredictionStore,
    H: HistoryStore,
{
    pub fn new(predictions: Arc<P>, history: Arc<H>) -> Self {
        Self {
            predictions,
            history,
        }
    }

    /// Accuracy over the trailing `days_back` days for one timeframe.
    ///
    /// Predictions whose target bucket was never recorded are skipped;
    /// zero-actual buckets are excluded from the percent error. Store
    /// failures degrade to empty metrics.
    pub async fn model_accuracy(
        &self,
        timeframe: Timeframe,
        days_back: u32,
        now: DateTime<Utc>,
        cancel: &CancellationToken,
    ) -> Result<AccuracyMetrics, ForecastError> {
        if cancel.is_cancelled() {
            return Err(ForecastError::Cancelled);
        }
        let since = now - Duration::days(days_back as i64);
        let matured = tokio::select! {
            _ = cancel.cancelled() => return Err(ForecastError::Cancelled),
            matured = self.predictions.matured(timeframe, since, now) => match matured {
                Ok(matured) => matured,
                Err(err) => {
                    warn!(%err, timeframe = timeframe.tag(), "matured predictions unavailable");
                    return Ok(AccuracyMetrics::empty(timeframe, days_back));
                }
            },
        };

        let mut samples = 0usize;
        let mut abs_error_sum = 0.0;
        let mut pct_error_sum = 0.0;
        let mut pct_samples = 0usize;
        let mut within_interval = 0usize;

        for prediction in &matured {
            if cancel.is_cancelled() {
                return Err(ForecastError::Cancelled);
            }
            let bucket = bucket_start(prediction.target_time);
            let actual = match self.history.demand_at_bucket(prediction.cell, bucket).await {
                Ok(Some(actual)) => f64::from(actual),
                Ok(None) => continue,
                Err(err) => {
                    warn!(%err, cell = %prediction.cell, "realized demand unavailable");
                    continue;
                }
            };

            samples += 1;
            abs_error_sum += (prediction.predicted_rides - actual).abs();
            if actual > 0.0 {
                pct_error_sum += ((prediction.predicted_rides - actual) / actual).abs();
                pct_samples += 1;
            }
            if actual >= prediction.lower_bound && actual <= prediction.upper_bound {
                within_interval += 1;
            }
        }

        if samples == 0 {
            return Ok(AccuracyMetrics::empty(timeframe, days_back));
        }
        Ok(AccuracyMetrics {
            timeframe,
            days_back,
            samples,
            mean_absolute_error: abs_error_sum / samples as f64,
            mean_absolute_percent_error: if pct_samples > 0 {
                pct_error_sum / pct_samples as f64 * 100.0
            } else {
                0.0
            },
            within_interval_rate: within_interval as f64 / samples as f64,
        })
    }
}
