//! # Demand Forecasting Core
//!
//! Short-horizon ride-demand forecasting and driver repositioning for a
//! ride-hailing marketplace.
//!
//! ## Overview
//!
//! This crate provides the forecasting engine, including:
//!
//! - **Spatial Indexing**: H3-based cell conversion, neighborhoods, tiling
//! - **Feature Assembly**: concurrent fan-out over history, weather, driver
//!   and event collaborators, with per-channel failure isolation
//! - **Prediction Model**: a weighted ensemble with confidence estimation,
//!   interval bounds, and derived surge/hotspot/priority outputs
//! - **Query Surface**: hotspot rankings, demand heatmaps, personalized
//!   repositioning recommendations, and accuracy metrics
//!
//! ## Key Concepts
//!
//! - **Cells**: all spatial aggregation keys on an H3 cell at a fixed
//!   resolution (default 9, ~240m)
//! - **Buckets**: observed demand is recorded in 15-minute buckets, exactly
//!   one record per (cell, bucket)
//! - **Substitutable stores**: the engine owns no database; collaborators
//!   are async traits a harness can replace with in-memory fakes
//! - **Best-effort collaborators**: weather, driver counts, neighbors and
//!   events degrade to neutral defaults instead of failing a prediction
//!
//! ## Example
//!
//! ```rust,no_run
//! use std::sync::Arc;
//! use forecast_core::config::ForecastConfig;
//! use forecast_core::service::DemandForecastService;
//! use forecast_core::stores::memory::{
//!     MemoryEventStore, MemoryHistoryStore, MemoryPredictionStore, StaticDrivers, StaticWeather,
//! };
//! use forecast_core::types::Timeframe;
//! use tokio_util::sync::CancellationToken;
//!
//! # async fn run() -> Result<(), forecast_core::error::ForecastError> {
//! let service = DemandForecastService::new(
//!     Arc::new(MemoryHistoryStore::new()),
//!     Arc::new(MemoryPredictionStore::new()),
//!     Arc::new(MemoryEventStore::new()),
//!     Arc::new(StaticWeather::default()),
//!     Arc::new(StaticDrivers::default()),
//!     ForecastConfig::default(),
//! );
//! let prediction = service
//!     .generate_prediction(37.7749, -122.4194, Timeframe::Min30, &CancellationToken::new())
//!     .await?;
//! println!("{} rides expected", prediction.predicted_rides);
//! # Ok(())
//! # }
//! ```

pub mod accuracy;
pub mod calendar;
pub mod config;
pub mod error;
pub mod events;
pub mod features;
pub mod history;
pub mod hotspots;
pub mod model;
pub mod prediction;
pub mod reposition;
pub mod service;
pub mod spatial;
pub mod stores;
pub mod types;

#[cfg(any(test, feature = "test-helpers"))]
pub mod test_helpers;

pub use config::{ForecastConfig, ModelWeights};
pub use error::ForecastError;
pub use prediction::DemandPrediction;
pub use service::DemandForecastService;
pub use types::Timeframe;
