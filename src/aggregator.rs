//! Place aggregation
//!
//! Turns tagged clusters into place records: centroid over all member points
//! and a cluster-wide dwell estimate. Untagged clusters are dropped.

use crate::types::{PlaceRecord, TaggedCluster};

/// Aggregator producing final place records
pub struct PlaceAggregator;

impl PlaceAggregator {
    /// Aggregate tagged clusters into place records for `user_id`
    pub fn aggregate(
        tagged: Vec<TaggedCluster>,
        sampling_interval: i64,
        user_id: &str,
    ) -> Vec<PlaceRecord> {
        tagged
            .into_iter()
            .filter(|t| !t.tags.is_empty() && !t.cluster.is_empty())
            .map(|t| {
                let count = t.cluster.len();
                let (sum_lat, sum_lon) = t
                    .cluster
                    .points
                    .iter()
                    .fold((0.0, 0.0), |(la, lo), p| (la + p.latitude, lo + p.longitude));

                PlaceRecord {
                    latitude: sum_lat / count as f64,
                    longitude: sum_lon / count as f64,
                    estimate_time: (count as i64).saturating_mul(sampling_interval),
                    tags: t.tags,
                    user_id: user_id.to_string(),
                }
            })
            .collect()
    }
}
