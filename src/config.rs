//! Recognition configuration
//!
//! All thresholds of the pipeline live here. Every field has a default so a
//! partial JSON document is a valid configuration.

use crate::error::{PlaceError, Result};
use crate::types::TimeWindow;
use chrono::{FixedOffset, Weekday};
use serde::{Deserialize, Serialize};

/// Default cut distance for flat clustering (degrees)
pub const DEFAULT_MAX_CLUSTER_RADIUS: f64 = 0.0125;

/// Default downsampling interval (seconds)
pub const DEFAULT_SAMPLING_INTERVAL: i64 = 600;

/// Default minimum in-window fraction for a tag
pub const DEFAULT_RATIO_THRESHOLD: f64 = 0.4;

/// Default proximity threshold for trace annotation (meters)
pub const DEFAULT_NEAR_DISTANCE_M: f64 = 200.0;

/// Default age after which stored results are recomputed (days)
pub const DEFAULT_CACHE_TTL_DAYS: i64 = 7;

/// Significance threshold in sampling intervals when none is configured
pub const DEFAULT_TIME_THRESHOLD_INTERVALS: i64 = 3;

/// Default named time windows: "home" at night, "office" during working hours
pub fn default_time_windows() -> Vec<TimeWindow> {
    vec![
        TimeWindow::new("home", 0..=7),
        TimeWindow::new("office", [9, 10, 11, 14, 15, 16, 17]),
    ]
}

impl TimeWindow {
    /// Pair hour sets with names positionally.
    pub fn from_parallel(ranges: Vec<Vec<u32>>, tags: Vec<String>) -> Result<Vec<TimeWindow>> {
        if ranges.len() != tags.len() {
            return Err(PlaceError::InvalidConfig(format!(
                "{} time ranges but {} tags",
                ranges.len(),
                tags.len()
            )));
        }
        Ok(tags
            .into_iter()
            .zip(ranges)
            .map(|(name, hours)| TimeWindow::new(name, hours))
            .collect())
    }
}

/// Days of the week that do not count toward time-window statistics
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ExcludedWeekdays(pub Vec<Weekday>);

impl Default for ExcludedWeekdays {
    fn default() -> Self {
        Self::weekend()
    }
}

impl ExcludedWeekdays {
    /// Saturday and Sunday
    pub fn weekend() -> Self {
        Self(vec![Weekday::Sat, Weekday::Sun])
    }

    /// Monday and Sunday, matching the weekday-index skip of the legacy recognizer.
    ///
    /// Kept selectable until product confirms which days are meant to be excluded.
    pub fn reference_behavior() -> Self {
        Self(vec![Weekday::Mon, Weekday::Sun])
    }

    pub fn none() -> Self {
        Self(Vec::new())
    }

    pub fn contains(&self, day: Weekday) -> bool {
        self.0.contains(&day)
    }
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct PositionalWindows {
    time_ranges: Option<Vec<Vec<u32>>>,
    tag_of_time_ranges: Option<Vec<String>>,
}

/// Configuration for one recognition run
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct RecognitionConfig {
    /// Cut distance for flat clustering (degrees, planar)
    pub max_cluster_radius: f64,
    /// Downsampling granularity and dwell-time unit (seconds)
    pub sampling_interval: i64,
    /// Named hour-of-day windows
    pub time_windows: Vec<TimeWindow>,
    /// Minimum dwell for cluster significance (seconds); 3 × sampling interval when unset
    #[serde(skip_serializing_if = "Option::is_none")]
    pub time_threshold: Option<i64>,
    /// Minimum in-window fraction to assign a tag (0-1)
    pub ratio_threshold: f64,
    /// Proximity threshold for trace annotation (meters)
    pub near_distance: f64,
    /// Staleness threshold for stored results (days)
    pub cache_ttl_days: i64,
    /// Offset from UTC used for local hour and weekday (seconds)
    pub utc_offset_seconds: i32,
    /// Weekdays ignored by the time-window tagger
    pub excluded_weekdays: ExcludedWeekdays,
}

impl Default for RecognitionConfig {
    fn default() -> Self {
        Self {
            max_cluster_radius: DEFAULT_MAX_CLUSTER_RADIUS,
            sampling_interval: DEFAULT_SAMPLING_INTERVAL,
            time_windows: default_time_windows(),
            time_threshold: None,
            ratio_threshold: DEFAULT_RATIO_THRESHOLD,
            near_distance: DEFAULT_NEAR_DISTANCE_M,
            cache_ttl_days: DEFAULT_CACHE_TTL_DAYS,
            utc_offset_seconds: 0,
            excluded_weekdays: ExcludedWeekdays::default(),
        }
    }
}

impl RecognitionConfig {
    /// Load a configuration from JSON and validate it.
    ///
    /// Accepts the positional `timeRanges`/`tagOfTimeRanges` pair in place of
    /// `timeWindows`.
    pub fn from_json(json: &str) -> Result<Self> {
        let mut config: RecognitionConfig = serde_json::from_str(json)?;
        let positional: PositionalWindows = serde_json::from_str(json)?;
        match (positional.time_ranges, positional.tag_of_time_ranges) {
            (Some(ranges), Some(tags)) => {
                config.time_windows = TimeWindow::from_parallel(ranges, tags)?
            }
            (None, None) => {}
            _ => {
                return Err(PlaceError::InvalidConfig(
                    "timeRanges and tagOfTimeRanges must be given together".to_string(),
                ))
            }
        }
        config.validate()?;
        Ok(config)
    }

    /// Serialize configuration to JSON
    pub fn to_json(&self) -> Result<String> {
        Ok(serde_json::to_string_pretty(self)?)
    }

    /// Significance threshold actually applied (seconds)
    pub fn effective_time_threshold(&self) -> i64 {
        self.time_threshold
            .unwrap_or_else(|| {
                DEFAULT_TIME_THRESHOLD_INTERVALS.saturating_mul(self.sampling_interval)
            })
    }

    /// Fixed offset for local calendar computations
    pub fn local_offset(&self) -> Result<FixedOffset> {
        FixedOffset::east_opt(self.utc_offset_seconds).ok_or_else(|| {
            PlaceError::InvalidConfig(format!(
                "utcOffsetSeconds out of range: {}",
                self.utc_offset_seconds
            ))
        })
    }

    /// Check invariants that the pipeline relies on
    pub fn validate(&self) -> Result<()> {
        if self.sampling_interval <= 0 {
            return Err(PlaceError::InvalidConfig(format!(
                "samplingInterval must be positive, got {}",
                self.sampling_interval
            )));
        }
        if self.time_threshold.is_none()
            && DEFAULT_TIME_THRESHOLD_INTERVALS
                .checked_mul(self.sampling_interval)
                .is_none()
        {
            return Err(PlaceError::InvalidConfig(format!(
                "samplingInterval {} is too large to derive timeThreshold",
                self.sampling_interval
            )));
        }
        if !(0.0..=1.0).contains(&self.ratio_threshold) {
            return Err(PlaceError::InvalidConfig(format!(
                "ratioThreshold must be within [0, 1], got {}",
                self.ratio_threshold
            )));
        }
        if !self.max_cluster_radius.is_finite() || self.max_cluster_radius <= 0.0 {
            return Err(PlaceError::InvalidConfig(format!(
                "maxClusterRadius must be a positive number, got {}",
                self.max_cluster_radius
            )));
        }
        if !self.near_distance.is_finite() || self.near_distance < 0.0 {
            return Err(PlaceError::InvalidConfig(format!(
                "nearDistance must be a non-negative number, got {}",
                self.near_distance
            )));
        }
        if let Some(threshold) = self.time_threshold {
            if threshold < 0 {
                return Err(PlaceError::InvalidConfig(format!(
                    "timeThreshold must not be negative, got {}",
                    threshold
                )));
            }
        }
        for window in &self.time_windows {
            if window.name.trim().is_empty() {
                return Err(PlaceError::InvalidConfig(
                    "time window names must not be empty".to_string(),
                ));
            }
            if let Some(hour) = window.hours.iter().find(|&&h| h > 23) {
                return Err(PlaceError::InvalidConfig(format!(
                    "time window '{}' has hour {} outside 0-23",
                    window.name, hour
                )));
            }
        }
        self.local_offset()?;
        Ok(())
    }
}
