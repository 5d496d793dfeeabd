//! Shake gesture detection over a stream of accelerometer samples.
//!
//! A shake is three strong impulses (above 2.7 g) that are each at least
//! 500 ms apart and together fall inside a rolling 3 s window.

use anyhow::Result;
use tokio::sync::mpsc;
use tracing::{debug, trace};

use crate::config::Config;

pub const GRAVITY_EARTH: f32 = 9.80665;
pub const SHAKE_THRESHOLD_GRAVITY: f32 = 2.7;
pub const SHAKE_SLOP_TIME_MS: i64 = 500;
pub const SHAKE_COUNT_RESET_TIME_MS: i64 = 3000;
pub const REQUIRED_SHAKES: u32 = 3;

const SAMPLE_CHANNEL_CAPACITY: usize = 64;

/// One accelerometer reading in m/s².
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct AccelSample {
    pub x: f32,
    pub y: f32,
    pub z: f32,
    pub timestamp_ms: i64,
}

impl AccelSample {
    pub fn new(x: f32, y: f32, z: f32, timestamp_ms: i64) -> Self {
        Self {
            x,
            y,
            z,
            timestamp_ms,
        }
    }

    /// Acceleration magnitude in units of standard gravity.
    pub fn g_force(&self) -> f32 {
        let gx = self.x / GRAVITY_EARTH;
        let gy = self.y / GRAVITY_EARTH;
        let gz = self.z / GRAVITY_EARTH;
        (gx * gx + gy * gy + gz * gz).sqrt()
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ShakeState {
    pub last_shake_time_ms: Option<i64>,
    pub consecutive_count: u32,
}

pub trait ShakeListener: Send {
    fn on_shake(&mut self);
}

impl<F: FnMut() + Send> ShakeListener for F {
    fn on_shake(&mut self) {
        self()
    }
}

/// Source of accelerometer samples.
///
/// `register` starts delivery into `sink`; delivery ends when the sampler
/// drops its sender or `unregister` is called.
pub trait MotionSampler: Send {
    fn register(&mut self, sink: mpsc::Sender<AccelSample>) -> Result<()>;
    fn unregister(&mut self);
}

#[derive(Default)]
pub struct ShakeDetector {
    listener: Option<Box<dyn ShakeListener>>,
    state: Option<ShakeState>,
}

impl std::fmt::Debug for ShakeDetector {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ShakeDetector")
            .field("has_listener", &self.listener.is_some())
            .field("state", &self.state)
            .finish()
    }
}

impl ShakeDetector {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_listener(listener: impl ShakeListener + 'static) -> Self {
        let mut detector = Self::new();
        detector.set_on_shake_listener(listener);
        detector
    }

    pub fn set_on_shake_listener(&mut self, listener: impl ShakeListener + 'static) {
        self.listener = Some(Box::new(listener));
    }

    pub fn state(&self) -> Option<ShakeState> {
        self.state
    }

    /// Begin a fresh rolling window.
    pub fn start_listening(&mut self) {
        self.state = Some(ShakeState::default());
    }

    /// Drop the rolling window; the next sample starts a new one.
    pub fn stop_listening(&mut self) {
        self.state = None;
    }

    pub fn is_listening(&self) -> bool {
        self.state.is_some()
    }

    /// Feed one sample. Returns true when it completed a shake.
    pub fn on_sample(&mut self, x: f32, y: f32, z: f32, timestamp_ms: i64) -> bool {
        self.process(AccelSample::new(x, y, z, timestamp_ms))
    }

    pub fn process(&mut self, sample: AccelSample) -> bool {
        // NaN compares false, so malformed samples never count.
        if !(sample.g_force() > SHAKE_THRESHOLD_GRAVITY) {
            return false;
        }
        let now = sample.timestamp_ms;
        let state = self.state.get_or_insert_with(ShakeState::default);

        if let Some(last) = state.last_shake_time_ms {
            let elapsed = now.saturating_sub(last);
            if elapsed < SHAKE_SLOP_TIME_MS {
                trace!(elapsed, "impulse ignored inside debounce window");
                return false;
            }
            if elapsed > SHAKE_COUNT_RESET_TIME_MS {
                state.consecutive_count = 0;
            }
        }

        state.last_shake_time_ms = Some(now);
        state.consecutive_count += 1;
        trace!(count = state.consecutive_count, "shake impulse");

        if state.consecutive_count >= REQUIRED_SHAKES {
            state.consecutive_count = 0;
            debug!(timestamp_ms = now, "shake detected");
            if let Some(listener) = self.listener.as_mut() {
                listener.on_shake();
            }
            return true;
        }
        false
    }

    /// Consume samples until the channel closes. Returns the number of shakes.
    pub async fn listen(&mut self, mut samples: mpsc::Receiver<AccelSample>) -> usize {
        self.start_listening();
        let mut shakes = 0;
        while let Some(sample) = samples.recv().await {
            if self.process(sample) {
                shakes += 1;
            }
        }
        self.stop_listening();
        shakes
    }

    /// Register with `sampler`, pump its samples, and unregister once the
    /// stream ends.
    pub async fn run<M: MotionSampler + ?Sized>(&mut self, sampler: &mut M) -> Result<usize> {
        let (tx, rx) = mpsc::channel(SAMPLE_CHANNEL_CAPACITY);
        sampler.register(tx)?;
        let shakes = self.listen(rx).await;
        sampler.unregister();
        Ok(shakes)
    }
}

/// Shake listener that flips the sort direction of one folder.
#[derive(Debug, Clone)]
pub struct ShakeSortToggle {
    config: Config,
    folder: String,
}

impl ShakeSortToggle {
    pub fn new(config: Config, folder: impl Into<String>) -> Self {
        Self {
            config,
            folder: folder.into(),
        }
    }

    pub fn folder(&self) -> &str {
        &self.folder
    }
}

impl ShakeListener for ShakeSortToggle {
    fn on_shake(&mut self) {
        if !self.config.enable_shake_toggle_sorting() {
            debug!("shake ignored, toggle sorting disabled");
            return;
        }
        self.config.toggle_sort_order(&self.folder);
    }
}
