//! Artificial latency applied before every simulated request settles.
use std::{
    fmt::Debug,
    sync::{Arc, Mutex},
    time::Duration,
};

use async_trait::async_trait;
use rand::{rngs::StdRng, Rng, SeedableRng};
use serde::{Deserialize, Serialize};
use tracing::{event, instrument, Level};

use crate::{error::Result, utils::acquire_lock};

/// Delay capability consumed by the [`LatencyScheduler`]
#[async_trait]
pub trait Timer: Debug + Send + Sync {
    /// Resolves once `duration` has elapsed
    async fn after(&self, duration: Duration) -> Elapsed;
}

/// Sentinel returned once a suspension completes
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Elapsed;

#[derive(Clone, Copy, Debug, Default)]
pub struct TokioTimer;

#[async_trait]
impl Timer for TokioTimer {
    async fn after(&self, duration: Duration) -> Elapsed {
        tokio::time::sleep(duration).await;
        Elapsed
    }
}

/// Latency bounds in milliseconds
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub struct LatencyConfig {
    pub min_time: u64,
    pub max_time: u64,
    /// When set, every request waits exactly this long
    pub absolute_time: Option<u64>,
}

impl Default for LatencyConfig {
    fn default() -> Self {
        Self {
            min_time: 0,
            max_time: 2000,
            absolute_time: None,
        }
    }
}

/// Partial [`LatencyConfig`]: only the fields that are set get merged
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub struct LatencyOptions {
    #[serde(default)]
    pub min_time: Option<u64>,
    #[serde(default)]
    pub max_time: Option<u64>,
    #[serde(default)]
    pub absolute_time: Option<u64>,
}

impl LatencyOptions {
    /// No latency at all
    pub fn none() -> Self {
        Self::absolute(0)
    }

    pub fn absolute(ms: u64) -> Self {
        Self {
            absolute_time: Some(ms),
            ..Default::default()
        }
    }

    pub fn between(min_time: u64, max_time: u64) -> Self {
        Self {
            min_time: Some(min_time),
            max_time: Some(max_time),
            absolute_time: None,
        }
    }
}

impl LatencyConfig {
    /// Merges `options` on top of this config without discarding the fields `options` leaves unset
    pub fn merge(&mut self, options: &LatencyOptions) {
        if let Some(min_time) = options.min_time {
            self.min_time = min_time;
        }
        if let Some(max_time) = options.max_time {
            self.max_time = max_time;
        }
        if let Some(absolute_time) = options.absolute_time {
            self.absolute_time = Some(absolute_time);
        }
    }
}

#[derive(Debug)]
struct State {
    config: LatencyConfig,
    rng: StdRng,
}

#[derive(Debug)]
pub struct LatencyScheduler {
    state: Mutex<State>,
    timer: Arc<dyn Timer>,
}

impl Default for LatencyScheduler {
    fn default() -> Self {
        Self::new(LatencyConfig::default(), Arc::new(TokioTimer))
    }
}

impl LatencyScheduler {
    pub fn new(config: LatencyConfig, timer: Arc<dyn Timer>) -> Self {
        Self {
            state: Mutex::new(State {
                config,
                rng: StdRng::from_entropy(),
            }),
            timer,
        }
    }

    pub fn configure(&self, options: &LatencyOptions) -> Result<()> {
        acquire_lock(&self.state, "LatencyScheduler")?
            .config
            .merge(options);
        Ok(())
    }

    /// Removes a fixed latency previously configured, going back to the random bounds
    pub fn clear_absolute_time(&self) -> Result<()> {
        acquire_lock(&self.state, "LatencyScheduler")?.config.absolute_time = None;
        Ok(())
    }

    pub fn config(&self) -> Result<LatencyConfig> {
        Ok(acquire_lock(&self.state, "LatencyScheduler")?.config)
    }

    /// Computes the next delay: `absolute_time` if configured, otherwise a uniform random value in
    /// `[min_time, max_time)` (`min_time` if that range is empty)
    pub fn next_delay(&self) -> Result<Duration> {
        let mut state = acquire_lock(&self.state, "LatencyScheduler")?;
        let config = state.config;
        let ms = match config.absolute_time {
            Some(ms) => ms,
            None if config.min_time >= config.max_time => config.min_time,
            None => state.rng.gen_range(config.min_time..config.max_time),
        };
        Ok(Duration::from_millis(ms))
    }

    /// Suspends for the next delay
    #[instrument(name = "latency::delay", level = "debug", skip(self))]
    pub async fn delay(&self) -> Result<Elapsed> {
        let delay = self.next_delay()?;
        event!(Level::DEBUG, "Simulating {:?} of latency", delay);
        if delay.is_zero() {
            return Ok(Elapsed);
        }
        Ok(self.timer.after(delay).await)
    }
}
