//! Injectable time and randomness, so backoff scheduling and crash-loop
//! detection can be tested deterministically without real sleeps.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Mutex;
use std::time::{Duration, Instant, SystemTime, UNIX_EPOCH};

pub trait Clock: Send + Sync {
    /// Monotonic instant, used for uptime and elapsed-time math.
    fn now(&self) -> Instant;
    /// Wall-clock seconds since the epoch, used for event timestamps.
    fn unix_time(&self) -> f64;
}

#[derive(Debug, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> Instant {
        Instant::now()
    }

    fn unix_time(&self) -> f64 {
        SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .unwrap_or_default()
            .as_secs_f64()
    }
}

/// A clock that only advances when told to. `now()` is anchored to process
/// start plus an offset so it remains monotonic with `Instant` ordering.
pub struct VirtualClock {
    start: Instant,
    offset_ms: AtomicU64,
    unix_origin: Mutex<f64>,
}

impl VirtualClock {
    pub fn new() -> Self {
        Self {
            start: Instant::now(),
            offset_ms: AtomicU64::new(0),
            unix_origin: Mutex::new(1_700_000_000.0),
        }
    }

    pub fn advance(&self, delta: Duration) {
        self.offset_ms
            .fetch_add(delta.as_millis() as u64, Ordering::SeqCst);
    }
}

impl Default for VirtualClock {
    fn default() -> Self {
        Self::new()
    }
}

impl Clock for VirtualClock {
    fn now(&self) -> Instant {
        self.start + Duration::from_millis(self.offset_ms.load(Ordering::SeqCst))
    }

    fn unix_time(&self) -> f64 {
        *self.unix_origin.lock().unwrap() + self.offset_ms.load(Ordering::SeqCst) as f64 / 1000.0
    }
}

/// A source of jitter, abstracted so backoff tests can pin it to zero.
pub trait Jitter: Send + Sync {
    /// A value in `[0.0, 1.0)`.
    fn fraction(&self) -> f64;
}

#[derive(Debug, Default)]
pub struct ThreadJitter;

impl Jitter for ThreadJitter {
    fn fraction(&self) -> f64 {
        use rand::Rng;
        rand::rng().random::<f64>()
    }
}

/// Always returns zero, for deterministic backoff-schedule tests.
#[derive(Debug, Default)]
pub struct ZeroJitter;

impl Jitter for ZeroJitter {
    fn fraction(&self) -> f64 {
        0.0
    }
}
