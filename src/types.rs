//! Core types for the place recognition pipeline
//!
//! This module defines the data that flows through each stage: raw location
//! samples, cluster assignments, time-window tags, aggregated places, and the
//! flat records exchanged with the storage layer.

use chrono::{DateTime, FixedOffset, TimeZone, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// A single timestamped GPS fix
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct LocationSample {
    /// Seconds since the Unix epoch
    pub timestamp: i64,
    /// Latitude in degrees
    pub latitude: f64,
    /// Longitude in degrees
    pub longitude: f64,
}

impl LocationSample {
    pub fn new(timestamp: i64, latitude: f64, longitude: f64) -> Self {
        Self {
            timestamp,
            latitude,
            longitude,
        }
    }

    /// Wall-clock time of this sample in the given offset, if the timestamp is representable
    pub fn local_time(&self, offset: &FixedOffset) -> Option<DateTime<FixedOffset>> {
        offset.timestamp_opt(self.timestamp, 0).single()
    }
}

/// Cluster id per sample index, ids in `1..=cluster_count`
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ClusterAssignment {
    labels: Vec<usize>,
    cluster_count: usize,
}

impl ClusterAssignment {
    /// Build an assignment from per-sample labels.
    ///
    /// Labels must be dense and 1-based; `cluster_count` is the largest label.
    pub fn from_labels(labels: Vec<usize>) -> Self {
        let cluster_count = labels.iter().copied().max().unwrap_or(0);
        Self {
            labels,
            cluster_count,
        }
    }

    pub fn labels(&self) -> &[usize] {
        &self.labels
    }

    /// Number of distinct clusters (K)
    pub fn cluster_count(&self) -> usize {
        self.cluster_count
    }

    pub fn len(&self) -> usize {
        self.labels.len()
    }

    pub fn is_empty(&self) -> bool {
        self.labels.is_empty()
    }

    /// Group samples by cluster id. Index `k` of the result holds cluster `k + 1`.
    pub fn group<'a>(&self, samples: &'a [LocationSample]) -> Vec<Vec<&'a LocationSample>> {
        let mut groups = vec![Vec::new(); self.cluster_count];
        for (sample, &label) in samples.iter().zip(&self.labels) {
            if let Some(group) = label.checked_sub(1).and_then(|k| groups.get_mut(k)) {
                group.push(sample);
            }
        }
        groups
    }
}

/// A set of samples sharing one cluster id
#[derive(Debug, Clone, PartialEq)]
pub struct Cluster {
    /// Cluster id from the assignment it was taken from
    pub id: usize,
    pub points: Vec<LocationSample>,
}

impl Cluster {
    pub fn new(id: usize, points: Vec<LocationSample>) -> Self {
        Self { id, points }
    }

    pub fn len(&self) -> usize {
        self.points.len()
    }

    pub fn is_empty(&self) -> bool {
        self.points.is_empty()
    }
}

/// A named set of hours of the day
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TimeWindow {
    pub name: String,
    /// Hours of the day in `0..=23`
    pub hours: Vec<u32>,
}

impl TimeWindow {
    pub fn new(name: impl Into<String>, hours: impl IntoIterator<Item = u32>) -> Self {
        Self {
            name: name.into(),
            hours: hours.into_iter().collect(),
        }
    }

    pub fn contains_hour(&self, hour: u32) -> bool {
        self.hours.contains(&hour)
    }
}

/// Tag assigned to a cluster for one time window
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Tag {
    /// Name of the time window
    pub tag: String,
    /// In-window dwell estimate (seconds)
    pub estimated_time: i64,
    /// Cluster in-window count relative to trace-wide in-window count (0-1)
    pub ratio: f64,
}

/// A cluster that passed significance filtering, with its tags
#[derive(Debug, Clone, PartialEq)]
pub struct TaggedCluster {
    pub cluster: Cluster,
    pub tags: Vec<Tag>,
}

/// A recognized place: cluster centroid, total dwell estimate and tags
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PlaceRecord {
    pub latitude: f64,
    pub longitude: f64,
    /// Cluster-wide dwell estimate (seconds)
    pub estimate_time: i64,
    pub tags: Vec<Tag>,
    #[serde(default)]
    pub user_id: String,
}

impl PlaceRecord {
    /// Flatten into one storage record per tag
    pub fn to_tag_records(&self) -> Vec<PlaceTagRecord> {
        self.tags
            .iter()
            .map(|tag| PlaceTagRecord {
                latitude: self.latitude,
                longitude: self.longitude,
                tag: tag.tag.clone(),
                ratio: tag.ratio,
                estimate_time: self.estimate_time,
                user_id: self.user_id.clone(),
            })
            .collect()
    }
}

/// Persisted place/tag pair, one per tag of a [`PlaceRecord`]
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PlaceTagRecord {
    pub latitude: f64,
    pub longitude: f64,
    pub tag: String,
    pub ratio: f64,
    pub estimate_time: i64,
    pub user_id: String,
}

/// A stored place record with its storage metadata
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StoredPlace {
    pub object_id: String,
    pub created_at: DateTime<Utc>,
    #[serde(flatten)]
    pub record: PlaceTagRecord,
}

/// A raw trace point as stored, annotated with nearby place tags
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TracePoint {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub object_id: Option<String>,
    #[serde(default)]
    pub user_id: String,
    pub timestamp: i64,
    pub latitude: f64,
    pub longitude: f64,
    /// Tags of recognized places near this point
    #[serde(default)]
    pub near: Vec<String>,
    /// Fields of the stored record that this crate does not interpret
    #[serde(flatten)]
    pub extra: HashMap<String, serde_json::Value>,
}

impl TracePoint {
    pub fn new(user_id: impl Into<String>, sample: LocationSample) -> Self {
        Self {
            object_id: None,
            user_id: user_id.into(),
            timestamp: sample.timestamp,
            latitude: sample.latitude,
            longitude: sample.longitude,
            near: Vec::new(),
            extra: HashMap::new(),
        }
    }

    pub fn sample(&self) -> LocationSample {
        LocationSample::new(self.timestamp, self.latitude, self.longitude)
    }
}
