//! Granule clock
//!
//! Ogg pages carry a granule position: the number of samples decoded from the
//! start of the stream up to the last packet finishing on that page. The
//! playout duration of a page is the difference to the previous page.

use std::time::Duration;

/// Opus in Ogg always counts granules at 48 kHz, whatever the input rate was
pub const OPUS_GRANULE_RATE: u32 = 48_000;

/// Granule value meaning "no packet finishes on this page"
pub const NO_GRANULE: u64 = u64::MAX;

/// Converts successive granule positions into per-page durations.
///
/// Durations are truncated to whole milliseconds and the sub-millisecond
/// remainder of each page is dropped.
#[derive(Debug, Clone)]
pub struct GranuleClock {
    last_granule: u64,
    sample_rate: u32,
}

impl GranuleClock {
    /// Create a clock for the given sample rate, starting at granule 0
    pub fn new(sample_rate: u32) -> Self {
        Self {
            last_granule: 0,
            sample_rate,
        }
    }

    /// Granule position of the last page that advanced the clock
    pub fn last_granule(&self) -> u64 {
        self.last_granule
    }

    /// Record the granule position of the next page and return its duration
    pub fn advance(&mut self, granule: u64) -> Duration {
        if granule == NO_GRANULE {
            return Duration::ZERO;
        }

        let samples = match granule.checked_sub(self.last_granule) {
            Some(samples) => samples,
            None => {
                tracing::warn!(
                    "Granule position went backwards ({} -> {}), treating page as zero length",
                    self.last_granule,
                    granule
                );
                0
            }
        };
        self.last_granule = granule;

        samples_to_duration(samples, self.sample_rate)
    }
}

impl Default for GranuleClock {
    fn default() -> Self {
        Self::new(OPUS_GRANULE_RATE)
    }
}

/// Convert a sample count into whole milliseconds of playout
pub fn samples_to_duration(samples: u64, sample_rate: u32) -> Duration {
    if sample_rate == 0 {
        return Duration::ZERO;
    }

    let millis = (samples as u128 * 1000) / sample_rate as u128;
    Duration::from_millis(millis.min(u64::MAX as u128) as u64)
}
