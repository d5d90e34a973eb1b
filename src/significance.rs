//! Significance filtering
//!
//! Drops clusters whose point count implies a dwell time below the threshold.

use crate::types::{Cluster, ClusterAssignment, LocationSample};

/// Filter for clusters with too little dwell time
pub struct SignificanceFilter;

impl SignificanceFilter {
    /// Minimum point count for a cluster to be significant (truncating division)
    pub fn min_size(time_threshold: i64, sampling_interval: i64) -> i64 {
        time_threshold / sampling_interval
    }

    /// Split the trace into clusters and keep those with at least `min_size` points.
    ///
    /// Clusters come back in id order; the order carries no meaning.
    pub fn filter(
        assignment: &ClusterAssignment,
        samples: &[LocationSample],
        time_threshold: i64,
        sampling_interval: i64,
    ) -> Vec<Cluster> {
        let min_size = Self::min_size(time_threshold, sampling_interval);

        assignment
            .group(samples)
            .into_iter()
            .enumerate()
            .filter(|(_, points)| !points.is_empty() && points.len() as i64 >= min_size)
            .map(|(index, points)| Cluster::new(index + 1, points.into_iter().copied().collect()))
            .collect()
    }
}
