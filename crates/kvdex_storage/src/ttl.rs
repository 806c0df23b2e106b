//! Deletion marker lifetimes.

use rand::Rng;
use std::time::Duration;

/// Randomized lifetime for deletion markers.
///
/// Each marker draws its own lifetime from `min..=max` so markers written in
/// the same burst do not all expire at once.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DeletionTtl {
    min: Duration,
    max: Duration,
}

impl DeletionTtl {
    /// Creates a lifetime range. The bounds are swapped if given in reverse.
    #[must_use]
    pub fn new(min: Duration, max: Duration) -> Self {
        if min <= max {
            Self { min, max }
        } else {
            Self { min: max, max: min }
        }
    }

    /// A fixed lifetime without jitter.
    #[must_use]
    pub fn fixed(ttl: Duration) -> Self {
        Self { min: ttl, max: ttl }
    }

    /// Lower bound.
    #[must_use]
    pub fn min(&self) -> Duration {
        self.min
    }

    /// Upper bound.
    #[must_use]
    pub fn max(&self) -> Duration {
        self.max
    }

    /// Draws a lifetime for one marker.
    #[must_use]
    pub fn sample(&self) -> Duration {
        if self.min == self.max {
            return self.min;
        }
        let millis = rand::thread_rng()
            .gen_range(self.min.as_millis() as u64..=self.max.as_millis() as u64);
        Duration::from_millis(millis)
    }
}

impl Default for DeletionTtl {
    fn default() -> Self {
        Self::new(Duration::from_secs(600), Duration::from_secs(1200))
    }
}
