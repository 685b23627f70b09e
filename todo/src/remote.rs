//! Simulated remote fetch for exercising loading and error states.
//!
//! Each call waits a random 1-3 seconds (scaled by configuration) and fails
//! one time in five. It has no bearing on the list store.

use chrono::{DateTime, Utc};
use liststate_core::environment::Clock;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use serde::{Deserialize, Serialize};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use thiserror::Error;

/// Shortest simulated latency, before scaling
pub const BASE_LATENCY_MS: f64 = 1000.0;

/// Random latency added on top of the base, before scaling
pub const LATENCY_SPREAD_MS: f64 = 2000.0;

/// Probability that a fetch fails
pub const FAILURE_RATE: f64 = 0.2;

/// Payload of a successful fetch
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct FetchedData {
    /// Random id in `0..1000`
    pub id: u32,
    /// Human-readable message
    pub message: String,
    /// When the response was produced
    pub timestamp: DateTime<Utc>,
}

/// Fetch failures
#[derive(Error, Clone, Debug, PartialEq, Eq)]
pub enum FetchError {
    /// The simulated request failed
    #[error("failed to fetch data")]
    Failed,
}

/// Fake API with random latency and failures
pub struct SimulatedApi<R = StdRng> {
    rng: Mutex<R>,
    latency_scale: f64,
    clock: Arc<dyn Clock>,
}

impl SimulatedApi<StdRng> {
    /// Creates an API seeded from system entropy
    #[must_use]
    pub fn new(latency_scale: f64, clock: Arc<dyn Clock>) -> Self {
        Self::with_rng(StdRng::from_entropy(), latency_scale, clock)
    }
}

impl<R: Rng + Send> SimulatedApi<R> {
    /// Creates an API drawing from `rng`
    #[must_use]
    pub fn with_rng(rng: R, latency_scale: f64, clock: Arc<dyn Clock>) -> Self {
        Self {
            rng: Mutex::new(rng),
            latency_scale: latency_scale.max(0.0),
            clock,
        }
    }

    /// Performs one simulated request
    ///
    /// # Errors
    ///
    /// Returns [`FetchError::Failed`] for the simulated failure case.
    #[tracing::instrument(skip(self))]
    pub async fn fetch(&self) -> Result<FetchedData, FetchError> {
        let (latency_ms, fails, id) = {
            let mut rng = self
                .rng
                .lock()
                .unwrap_or_else(std::sync::PoisonError::into_inner);
            let latency_ms = LATENCY_SPREAD_MS.mul_add(rng.gen_range(0.0..1.0), BASE_LATENCY_MS);
            (latency_ms, rng.gen_bool(FAILURE_RATE), rng.gen_range(0..1000))
        };

        let delay = Duration::try_from_secs_f64(latency_ms * self.latency_scale / 1000.0)
            .unwrap_or(Duration::MAX);
        tracing::debug!(delay_ms = delay.as_millis(), "Simulating request");
        tokio::time::sleep(delay).await;

        if fails {
            tracing::warn!("Simulated request failed");
            metrics::counter!("todo.fetch.failures").increment(1);
            return Err(FetchError::Failed);
        }

        Ok(FetchedData {
            id,
            message: "Data fetched successfully".to_string(),
            timestamp: self.clock.now(),
        })
    }
}

impl<R> std::fmt::Debug for SimulatedApi<R> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SimulatedApi")
            .field("latency_scale", &self.latency_scale)
            .finish_non_exhaustive()
    }
}
