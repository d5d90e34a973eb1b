//! Trace downsampling
//!
//! Reduces a raw, irregularly sampled trace to at most one sample per sampling
//! interval. The first sample of each gap-separated run is kept: after sorting,
//! a sample is retained when it is at least `sampling_interval` seconds after
//! the previously retained one.

use crate::types::LocationSample;

/// Downsampler for raw traces
pub struct TraceSampler;

impl TraceSampler {
    /// Sort by timestamp and keep samples spaced at least `sampling_interval` apart.
    ///
    /// Samples sharing a timestamp keep their input order; only the first of them
    /// can be retained. Never fails, even on empty input.
    pub fn compress(raw: &[LocationSample], sampling_interval: i64) -> Vec<LocationSample> {
        let mut sorted = raw.to_vec();
        sorted.sort_by_key(|s| s.timestamp);

        let mut compressed: Vec<LocationSample> = Vec::with_capacity(sorted.len());
        for sample in sorted {
            let too_close = compressed.last().is_some_and(|last| {
                last.timestamp
                    .checked_add(sampling_interval)
                    .map_or(true, |next| sample.timestamp < next)
            });
            if !too_close {
                compressed.push(sample);
            }
        }
        compressed
    }
}
