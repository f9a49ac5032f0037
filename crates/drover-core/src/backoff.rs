//! Respawn backoff
//!
//! One counter per master tracks respawn attempts that are still "in flight":
//! it goes up when a respawn is scheduled and comes back down
//! [`BACKOFF_DECAY`] after that respawn's spawn is issued. The delay for a new
//! attempt is `1s * 2^(in_flight + r)` with `r` uniform in `[0, 1)`, so a
//! crash loop backs off exponentially while a pool that stays up drifts back
//! to one-second respawns.

use rand::Rng;
use std::sync::atomic::{AtomicU32, Ordering};
use std::time::Duration;

/// Delay for an attempt with no other respawns in flight (before jitter)
pub const RESPAWN_BASE_DELAY: Duration = Duration::from_millis(1000);

/// How long after a respawn is issued before it stops counting against backoff
pub const BACKOFF_DECAY: Duration = Duration::from_secs(1);

/// Counter of in-flight respawn attempts; never negative
#[derive(Debug, Default)]
pub struct RespawnBackoff {
    in_flight: AtomicU32,
}

impl RespawnBackoff {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a new attempt and return the backoff level it runs at
    pub fn begin(&self) -> u32 {
        self.in_flight.fetch_add(1, Ordering::SeqCst)
    }

    /// Age one attempt out of the window
    pub fn finish(&self) {
        let _ = self
            .in_flight
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1));
    }

    pub fn in_flight(&self) -> u32 {
        self.in_flight.load(Ordering::SeqCst)
    }

    /// Register an attempt and compute its jittered delay
    pub fn next_delay(&self) -> (u32, Duration) {
        let backoff = self.begin();
        let jitter: f64 = rand::thread_rng().r#gen();
        (backoff, delay_for(backoff, jitter))
    }
}

/// `RESPAWN_BASE_DELAY * 2^(backoff + jitter)`, in whole milliseconds.
///
/// `jitter` is clamped to `[0, 1]` and the result stays strictly below the
/// next level's base delay. Delays too large to represent saturate to
/// [`Duration::MAX`].
pub fn delay_for(backoff: u32, jitter: f64) -> Duration {
    let jitter = if jitter.is_finite() {
        jitter.clamp(0.0, 1.0)
    } else {
        0.0
    };

    let base_ms = RESPAWN_BASE_DELAY.as_millis() as u64;
    let Some(level_ms) = 1u64
        .checked_shl(backoff)
        .and_then(|factor| factor.checked_mul(base_ms))
    else {
        return Duration::MAX;
    };

    let ceiling_ms = level_ms.saturating_mul(2) - 1;
    let jittered_ms = (level_ms as f64 * 2f64.powf(jitter)).floor() as u64;
    Duration::from_millis(jittered_ms.clamp(level_ms, ceiling_ms))
}
