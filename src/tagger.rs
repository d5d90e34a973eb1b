//! Time-window tagging
//!
//! A cluster is tagged with a window when the share of the trace's in-window
//! samples that fall inside the cluster exceeds the ratio threshold. Only
//! samples on non-excluded weekdays count, both globally and per cluster.

use crate::config::ExcludedWeekdays;
use crate::types::{Cluster, LocationSample, Tag, TaggedCluster, TimeWindow};
use chrono::{Datelike, FixedOffset, Timelike};

/// Tagger settings shared by every cluster of one run
#[derive(Debug, Clone)]
pub struct TaggingParams<'a> {
    pub windows: &'a [TimeWindow],
    pub ratio_threshold: f64,
    pub sampling_interval: i64,
    pub offset: FixedOffset,
    pub excluded_weekdays: &'a ExcludedWeekdays,
}

/// Assigns time-window tags to clusters
pub struct TimeWindowTagger;

impl TimeWindowTagger {
    /// Count samples per window, skipping excluded weekdays.
    ///
    /// A sample counts toward every window containing its local hour.
    pub fn count_in_windows<'s, I>(
        samples: I,
        windows: &[TimeWindow],
        offset: &FixedOffset,
        excluded_weekdays: &ExcludedWeekdays,
    ) -> Vec<usize>
    where
        I: IntoIterator<Item = &'s LocationSample>,
    {
        let mut counts = vec![0usize; windows.len()];
        for sample in samples {
            let Some(local) = sample.local_time(offset) else {
                continue;
            };
            if excluded_weekdays.contains(local.weekday()) {
                continue;
            }
            let hour = local.hour();
            for (count, window) in counts.iter_mut().zip(windows) {
                if window.contains_hour(hour) {
                    *count += 1;
                }
            }
        }
        counts
    }

    /// Tags for one cluster given the trace-wide window counts
    pub fn tags_for(
        cluster: &Cluster,
        global_counts: &[usize],
        params: &TaggingParams<'_>,
    ) -> Vec<Tag> {
        let cluster_counts = Self::count_in_windows(
            &cluster.points,
            params.windows,
            &params.offset,
            params.excluded_weekdays,
        );

        params
            .windows
            .iter()
            .zip(global_counts.iter().zip(cluster_counts))
            .filter_map(|(window, (&global, local))| {
                if global == 0 {
                    return None;
                }
                let ratio = local as f64 / global as f64;
                (ratio > params.ratio_threshold).then(|| Tag {
                    tag: window.name.clone(),
                    estimated_time: (local as i64).saturating_mul(params.sampling_interval),
                    ratio,
                })
            })
            .collect()
    }

    /// Tag every cluster against the statistics of the whole compressed trace
    pub fn tag(
        clusters: Vec<Cluster>,
        trace: &[LocationSample],
        params: &TaggingParams<'_>,
    ) -> Vec<TaggedCluster> {
        let global_counts = Self::count_in_windows(
            trace,
            params.windows,
            &params.offset,
            params.excluded_weekdays,
        );

        clusters
            .into_iter()
            .map(|cluster| {
                let tags = Self::tags_for(&cluster, &global_counts, params);
                TaggedCluster { cluster, tags }
            })
            .collect()
    }
}
