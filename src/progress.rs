use std::time::Duration;
use tokio::time::Instant;

/// Fraction of the track played, always within `0.0..=1.0`.
///
/// Unknown positions and durations (NaN, negative, zero) collapse to `0.0`.
pub fn progress_fraction(current_ms: f64, duration_ms: f64) -> f64 {
    // f64::max drops NaN, so an unknown position reads as 0
    let fraction = current_ms.max(0.0) / duration_ms;
    if fraction.is_finite() {
        fraction.clamp(0.0, 1.0)
    } else {
        0.0
    }
}

/// Suppresses progress publishing for a fixed window after each seek, so a
/// sample taken before the seek landed can't drag the slider back.
#[derive(Debug, Clone)]
pub struct SeekCooldown {
    window: Duration,
    last_seek: Option<Instant>,
}

impl SeekCooldown {
    pub fn new(window: Duration) -> Self {
        Self {
            window,
            last_seek: None,
        }
    }

    pub fn arm(&mut self, at: Instant) {
        self.last_seek = Some(at);
    }

    /// True once strictly more than `window` has passed since the last seek.
    pub fn allows(&self, now: Instant) -> bool {
        match self.last_seek {
            Some(seek) => now.saturating_duration_since(seek) > self.window,
            None => true,
        }
    }
}
