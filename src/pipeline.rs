//! Pipeline orchestration
//!
//! This module provides the public API for place recognition. It chains the
//! stages from raw trace to place records and owns the read-through cache
//! policy for stored results.

use crate::aggregator::PlaceAggregator;
use crate::annotator::ProximityAnnotator;
use crate::clustering::SpatialClusterer;
use crate::config::RecognitionConfig;
use crate::error::{PlaceError, Result};
use crate::observer::{LogObserver, PipelineEvent, PipelineObserver};
use crate::sampler::TraceSampler;
use crate::significance::SignificanceFilter;
use crate::store::PlaceStore;
use crate::tagger::{TaggingParams, TimeWindowTagger};
use crate::types::{LocationSample, PlaceRecord, PlaceTagRecord, StoredPlace};
use chrono::{DateTime, Utc};

/// Run stages 1-5 on a raw trace (stateless, one-shot).
///
/// Pipeline stages:
/// 1. TraceSampler - Sort and downsample the trace
/// 2. SpatialClusterer - Centroid-linkage clustering and distance cut
/// 3. SignificanceFilter - Drop clusters with too little dwell time
/// 4. TimeWindowTagger - Tag clusters by time-of-day distribution
/// 5. PlaceAggregator - Centroid and dwell estimate per tagged cluster
pub fn cluster_places(
    user_id: &str,
    raw: &[LocationSample],
    config: &RecognitionConfig,
    observer: &dyn PipelineObserver,
) -> Result<Vec<PlaceRecord>> {
    config.validate()?;
    let offset = config.local_offset()?;

    // Stage 1: Downsample
    let usable: Vec<LocationSample> = raw
        .iter()
        .filter(|s| is_valid_coordinate(s))
        .copied()
        .collect();
    let compressed = TraceSampler::compress(&usable, config.sampling_interval);
    observer.on_event(&PipelineEvent::TraceCompressed {
        raw: raw.len(),
        compressed: compressed.len(),
    });

    // Stage 2: Cluster
    let assignment = SpatialClusterer::cluster(&compressed, config.max_cluster_radius)?;
    observer.on_event(&PipelineEvent::ClustersFormed {
        clusters: assignment.cluster_count(),
    });

    // Stage 3: Filter by dwell significance
    let time_threshold = config.effective_time_threshold();
    let valid = SignificanceFilter::filter(
        &assignment,
        &compressed,
        time_threshold,
        config.sampling_interval,
    );
    observer.on_event(&PipelineEvent::ClustersFiltered {
        valid: valid.len(),
        min_size: SignificanceFilter::min_size(time_threshold, config.sampling_interval),
    });

    // Stage 4: Tag by time windows
    let params = TaggingParams {
        windows: &config.time_windows,
        ratio_threshold: config.ratio_threshold,
        sampling_interval: config.sampling_interval,
        offset,
        excluded_weekdays: &config.excluded_weekdays,
    };
    let tagged = TimeWindowTagger::tag(valid, &compressed, &params);

    // Stage 5: Aggregate
    let places = PlaceAggregator::aggregate(tagged, config.sampling_interval, user_id);
    observer.on_event(&PipelineEvent::PlacesTagged {
        places: places.len(),
    });

    Ok(places)
}

fn is_valid_coordinate(sample: &LocationSample) -> bool {
    sample.latitude.is_finite()
        && sample.longitude.is_finite()
        && (-90.0..=90.0).contains(&sample.latitude)
        && (-180.0..=180.0).contains(&sample.longitude)
}

/// Parse a JSON array of `{timestamp, latitude, longitude}` records and cluster it.
pub fn cluster_places_json(trace_json: &str, config: &RecognitionConfig) -> Result<String> {
    let samples: Vec<LocationSample> = serde_json::from_str(trace_json)?;
    let places = cluster_places("", &samples, config, &LogObserver)?;
    let records: Vec<PlaceTagRecord> = places.iter().flat_map(|p| p.to_tag_records()).collect();
    Ok(serde_json::to_string(&records)?)
}

/// Outcome of a recognition request
#[derive(Debug, Clone, PartialEq)]
pub enum Recognition {
    /// Stored records younger than the cache TTL, returned unchanged
    Cached(Vec<StoredPlace>),
    /// Freshly computed and saved records
    Computed(Vec<StoredPlace>),
}

impl Recognition {
    pub fn places(&self) -> &[StoredPlace] {
        match self {
            Recognition::Cached(places) | Recognition::Computed(places) => places,
        }
    }

    pub fn into_places(self) -> Vec<StoredPlace> {
        match self {
            Recognition::Cached(places) | Recognition::Computed(places) => places,
        }
    }

    pub fn is_cached(&self) -> bool {
        matches!(self, Recognition::Cached(_))
    }
}

/// Stateful recognizer over an injected store.
///
/// Concurrent runs for the same user are not serialized here; the store must
/// provide that if it matters.
pub struct PlaceRecognizer<S, O = LogObserver> {
    store: S,
    config: RecognitionConfig,
    observer: O,
}

impl<S: PlaceStore> PlaceRecognizer<S, LogObserver> {
    /// Create a recognizer with default settings logging through `log`
    pub fn new(store: S) -> Self {
        Self {
            store,
            config: RecognitionConfig::default(),
            observer: LogObserver,
        }
    }
}

impl<S: PlaceStore, O: PipelineObserver> PlaceRecognizer<S, O> {
    /// Create a recognizer with a specific configuration and observer
    pub fn with_config(store: S, config: RecognitionConfig, observer: O) -> Result<Self> {
        config.validate()?;
        Ok(Self {
            store,
            config,
            observer,
        })
    }

    pub fn config(&self) -> &RecognitionConfig {
        &self.config
    }

    pub fn store(&self) -> &S {
        &self.store
    }

    pub fn store_mut(&mut self) -> &mut S {
        &mut self.store
    }

    /// Recognize places for a user, reusing stored results younger than the TTL
    pub fn recognize(&mut self, user_id: &str) -> Result<Recognition> {
        self.recognize_at(user_id, Utc::now())
    }

    /// Same as [`recognize`](Self::recognize) with an explicit current time
    pub fn recognize_at(&mut self, user_id: &str, now: DateTime<Utc>) -> Result<Recognition> {
        if user_id.trim().is_empty() {
            return Err(PlaceError::InvalidRequest("user id required".to_string()));
        }

        let cached = match self.store.fetch_places(user_id) {
            Ok(places) => places,
            Err(e) => {
                self.observer.on_event(&PipelineEvent::CacheReadFailed {
                    user_id: user_id.to_string(),
                    reason: e.to_string(),
                });
                Vec::new()
            }
        };

        let result = self.refresh(user_id, cached, now);
        if let Err(e) = &result {
            self.observer.on_event(&PipelineEvent::RunFailed {
                user_id: user_id.to_string(),
                reason: e.to_string(),
            });
        }
        result
    }

    fn refresh(
        &mut self,
        user_id: &str,
        cached: Vec<StoredPlace>,
        now: DateTime<Utc>,
    ) -> Result<Recognition> {
        if let Some(oldest) = cached.iter().map(|p| p.created_at).min() {
            let age_days = (now - oldest).num_days();
            if age_days < self.config.cache_ttl_days {
                self.observer.on_event(&PipelineEvent::CacheHit {
                    user_id: user_id.to_string(),
                    records: cached.len(),
                });
                return Ok(Recognition::Cached(cached));
            }

            self.observer.on_event(&PipelineEvent::CacheExpired {
                user_id: user_id.to_string(),
                age_days,
                records: cached.len(),
            });
            self.store.delete_places(user_id, &cached)?;
        }

        self.observer.on_event(&PipelineEvent::RunStarted {
            user_id: user_id.to_string(),
        });
        let trace = self.store.fetch_trace(user_id)?;
        let places = cluster_places(user_id, &trace, &self.config, &self.observer)?;

        let records: Vec<PlaceTagRecord> =
            places.iter().flat_map(|p| p.to_tag_records()).collect();
        if records.is_empty() {
            return Ok(Recognition::Computed(Vec::new()));
        }

        let stored = self.store.save_places(user_id, &records, now)?;
        self.observer.on_event(&PipelineEvent::PlacesSaved {
            user_id: user_id.to_string(),
            records: stored.len(),
        });
        Ok(Recognition::Computed(stored))
    }

    /// Overwrite the near-tags of a user's stored trace points from stored places.
    ///
    /// Returns the number of points that received at least one tag.
    pub fn annotate(&mut self, user_id: &str) -> Result<usize> {
        if user_id.trim().is_empty() {
            return Err(PlaceError::InvalidRequest("user id required".to_string()));
        }

        let mut points = self.store.fetch_trace_points(user_id)?;
        let places: Vec<PlaceTagRecord> = self
            .store
            .fetch_places(user_id)?
            .into_iter()
            .map(|p| p.record)
            .collect();

        let tagged = ProximityAnnotator::annotate(&mut points, &places, self.config.near_distance);
        self.store.update_trace_points(user_id, &points)?;

        self.observer.on_event(&PipelineEvent::TraceAnnotated {
            user_id: user_id.to_string(),
            points: points.len(),
            tagged,
        });
        Ok(tagged)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::distance::meters_to_lat_degrees;
    use crate::error::StorageError;
    use crate::observer::testing::RecordingObserver;
    use crate::observer::NoopObserver;
    use crate::store::InMemoryStore;
    use chrono::{Duration, TimeZone};
    use pretty_assertions::assert_eq;

    // 2024-01-16 is a Tuesday.
    fn tue(hour: u32, minute: u32) -> i64 {
        Utc.with_ymd_and_hms(2024, 1, 16, hour, minute, 0)
            .unwrap()
            .timestamp()
    }

    /// 8 weekday samples at (1.0, 1.0), six of them in home hours
    fn home_trace() -> Vec<LocationSample> {
        [1, 2, 3, 4, 5, 6, 12, 13]
            .iter()
            .map(|&h| LocationSample::new(tue(h, 0), 1.0, 1.0))
            .collect()
    }

    /// Home at night plus an office cluster during working hours, with dense raw sampling
    fn two_place_trace() -> Vec<LocationSample> {
        let mut raw = Vec::new();
        for day in 15..=17 {
            for minute in (0..8 * 60).step_by(2) {
                let ts = Utc.with_ymd_and_hms(2024, 1, day, 0, 0, 0).unwrap().timestamp()
                    + minute * 60;
                raw.push(LocationSample::new(ts, 39.9000, 116.3000));
            }
            for minute in (9 * 60..18 * 60).step_by(2) {
                let ts = Utc.with_ymd_and_hms(2024, 1, day, 0, 0, 0).unwrap().timestamp()
                    + minute * 60;
                raw.push(LocationSample::new(ts, 39.9800, 116.4800));
            }
        }
        raw.reverse();
        raw
    }

    fn now() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 2, 1, 12, 0, 0).unwrap()
    }

    #[test]
    fn test_home_scenario_end_to_end() {
        let places =
            cluster_places("u1", &home_trace(), &RecognitionConfig::default(), &NoopObserver)
                .unwrap();

        assert_eq!(places.len(), 1);
        let place = &places[0];
        assert_eq!((place.latitude, place.longitude), (1.0, 1.0));
        assert_eq!(place.estimate_time, 4800);
        assert_eq!(place.tags.len(), 1);
        assert_eq!(place.tags[0].tag, "home");
        assert_eq!(place.tags[0].ratio, 1.0);
        assert_eq!(place.tags[0].estimated_time, 3600);

        let records = place.to_tag_records();
        assert_eq!(records[0].estimate_time, 4800);
        assert_eq!(records[0].user_id, "u1");
    }

    #[test]
    fn test_two_places_recognized() {
        let places = cluster_places(
            "u",
            &two_place_trace(),
            &RecognitionConfig::default(),
            &NoopObserver,
        )
        .unwrap();

        assert_eq!(places.len(), 2);
        let home = places
            .iter()
            .find(|p| p.tags.iter().any(|t| t.tag == "home"))
            .unwrap();
        let office = places
            .iter()
            .find(|p| p.tags.iter().any(|t| t.tag == "office"))
            .unwrap();
        assert!((home.latitude - 39.9).abs() < 1e-9);
        assert!((office.longitude - 116.48).abs() < 1e-9);
        assert_eq!(home.tags.len(), 1);
        assert_eq!(office.tags.len(), 1);
    }

    #[test]
    fn test_insufficient_data_after_downsampling() {
        // Three fixes within one sampling interval collapse to a single sample.
        let raw = vec![
            LocationSample::new(0, 1.0, 1.0),
            LocationSample::new(100, 1.0, 1.0),
            LocationSample::new(200, 1.0, 1.0),
        ];
        let result = cluster_places("u", &raw, &RecognitionConfig::default(), &NoopObserver);
        assert!(matches!(
            result,
            Err(PlaceError::InsufficientData { samples: 1 })
        ));
    }

    #[test]
    fn test_size_two_cluster_dropped() {
        let mut raw = home_trace();
        raw.push(LocationSample::new(tue(14, 0), 5.0, 5.0));
        raw.push(LocationSample::new(tue(15, 0), 5.0, 5.0));

        let places =
            cluster_places("u", &raw, &RecognitionConfig::default(), &NoopObserver).unwrap();
        assert_eq!(places.len(), 1);
        assert_eq!((places[0].latitude, places[0].longitude), (1.0, 1.0));
    }

    #[test]
    fn test_invalid_coordinates_skipped() {
        let mut raw = home_trace();
        raw.push(LocationSample::new(tue(14, 0), f64::NAN, 1.0));
        raw.push(LocationSample::new(tue(15, 0), 95.0, 1.0));

        let observer = RecordingObserver::default();
        let places = cluster_places("u", &raw, &RecognitionConfig::default(), &observer).unwrap();

        assert_eq!(places.len(), 1);
        assert_eq!(places[0].estimate_time, 4800);
        assert!(observer.contains(|e| matches!(
            e,
            PipelineEvent::TraceCompressed {
                raw: 10,
                compressed: 8
            }
        )));
    }

    #[test]
    fn test_huge_sampling_interval_does_not_overflow() {
        let raw = vec![
            LocationSample::new(0, 1.0, 1.0),
            LocationSample::new(1 << 62, 1.0, 1.0),
        ];

        let derived = RecognitionConfig {
            sampling_interval: 1 << 62,
            ..Default::default()
        };
        assert!(matches!(
            cluster_places("u", &raw, &derived, &NoopObserver),
            Err(PlaceError::InvalidConfig(_))
        ));

        // 1970-01-01 00:00 is a Thursday in home hours; 2^62 s has no calendar date.
        let explicit = RecognitionConfig {
            sampling_interval: 1 << 62,
            time_threshold: Some(1 << 62),
            ..Default::default()
        };
        let places = cluster_places("u", &raw, &explicit, &NoopObserver).unwrap();
        assert_eq!(places.len(), 1);
        assert_eq!(places[0].estimate_time, i64::MAX);
        assert_eq!(places[0].tags[0].tag, "home");
        assert_eq!(places[0].tags[0].estimated_time, 1 << 62);
    }

    #[test]
    fn test_invalid_config_rejected() {
        let config = RecognitionConfig {
            sampling_interval: -5,
            ..Default::default()
        };
        let result = cluster_places("u", &home_trace(), &config, &NoopObserver);
        assert!(matches!(result, Err(PlaceError::InvalidConfig(_))));
    }

    #[test]
    fn test_cluster_places_json() {
        let json = serde_json::to_string(&home_trace()).unwrap();
        let out = cluster_places_json(&json, &RecognitionConfig::default()).unwrap();

        let records: Vec<serde_json::Value> = serde_json::from_str(&out).unwrap();
        assert_eq!(records.len(), 1);
        assert_eq!(records[0]["tag"], "home");
        assert_eq!(records[0]["estimateTime"], 4800);
        assert_eq!(records[0]["ratio"], 1.0);
    }

    #[test]
    fn test_recognize_computes_then_caches() {
        let mut store = InMemoryStore::new();
        store.insert_trace("u", &home_trace());
        let mut recognizer =
            PlaceRecognizer::with_config(store, RecognitionConfig::default(), NoopObserver)
                .unwrap();

        assert_eq!(recognizer.config().cache_ttl_days, 7);
        let first = recognizer.recognize_at("u", now()).unwrap();
        assert!(!first.is_cached());
        assert_eq!(first.places().len(), 1);
        assert_eq!(recognizer.store().trace_reads(), 1);

        let second = recognizer
            .recognize_at("u", now() + Duration::days(6))
            .unwrap();
        assert!(second.is_cached());
        assert_eq!(first.places(), second.places());
        assert_eq!(
            serde_json::to_string(first.places()).unwrap(),
            serde_json::to_string(second.places()).unwrap()
        );
        assert_eq!(recognizer.store().trace_reads(), 1);
        assert_eq!(recognizer.store().place_writes(), 1);
    }

    #[test]
    fn test_stale_cache_replaced() {
        let mut store = InMemoryStore::new();
        store.insert_trace("u", &home_trace());
        let mut recognizer =
            PlaceRecognizer::with_config(store, RecognitionConfig::default(), NoopObserver)
                .unwrap();

        let first = recognizer.recognize_at("u", now()).unwrap().into_places();
        let later = now() + Duration::days(7);
        let second = recognizer.recognize_at("u", later).unwrap();

        assert!(!second.is_cached());
        assert_eq!(recognizer.store().trace_reads(), 2);

        let stored = recognizer.store().fetch_places("u").unwrap();
        assert_eq!(stored.len(), 1);
        assert_ne!(stored[0].object_id, first[0].object_id);
        assert_eq!(stored[0].created_at, later);
    }

    #[test]
    fn test_cache_read_failure_recomputes() {
        let mut store = InMemoryStore::new();
        store.insert_trace("u", &home_trace());
        store.fail_place_reads("connection reset");
        let observer = RecordingObserver::default();
        let mut recognizer =
            PlaceRecognizer::with_config(store, RecognitionConfig::default(), &observer).unwrap();

        let result = recognizer.recognize_at("u", now()).unwrap();

        assert!(!result.is_cached());
        assert_eq!(result.places().len(), 1);
        assert!(observer.contains(|e| matches!(e, PipelineEvent::CacheReadFailed { .. })));
    }

    #[test]
    fn test_failures_reported_and_returned() {
        let store = InMemoryStore::new();
        let observer = RecordingObserver::default();
        let mut recognizer =
            PlaceRecognizer::with_config(store, RecognitionConfig::default(), &observer).unwrap();

        let missing = recognizer.recognize_at("ghost", now());
        assert!(matches!(
            missing,
            Err(PlaceError::Storage(StorageError::NotFound(_)))
        ));
        assert!(observer.contains(|e| matches!(e, PipelineEvent::RunFailed { .. })));

        recognizer
            .store_mut()
            .insert_trace("sparse", &[LocationSample::new(0, 1.0, 1.0)]);
        let sparse = recognizer.recognize_at("sparse", now());
        assert!(matches!(sparse, Err(PlaceError::InsufficientData { .. })));
    }

    #[test]
    fn test_empty_user_id_rejected() {
        let mut recognizer = PlaceRecognizer::new(InMemoryStore::new());
        assert!(matches!(
            recognizer.recognize_at("  ", now()),
            Err(PlaceError::InvalidRequest(_))
        ));
        assert!(matches!(
            recognizer.annotate(""),
            Err(PlaceError::InvalidRequest(_))
        ));
    }

    #[test]
    fn test_no_places_nothing_saved() {
        // Weekend-only trace: every window has a zero global count.
        let raw: Vec<LocationSample> = (0..6)
            .map(|i| {
                let ts = Utc.with_ymd_and_hms(2024, 1, 20, 2, 0, 0).unwrap().timestamp();
                LocationSample::new(ts + i * 600, 1.0, 1.0)
            })
            .collect();
        let mut store = InMemoryStore::new();
        store.insert_trace("u", &raw);
        let mut recognizer =
            PlaceRecognizer::with_config(store, RecognitionConfig::default(), NoopObserver)
                .unwrap();

        let result = recognizer.recognize_at("u", now()).unwrap();
        assert_eq!(result, Recognition::Computed(vec![]));
        assert_eq!(recognizer.store().place_writes(), 0);
    }

    #[test]
    fn test_annotate_from_stored_places() {
        let mut store = InMemoryStore::new();
        let mut trace = home_trace();
        trace.push(LocationSample::new(
            tue(20, 0),
            1.0 + meters_to_lat_degrees(150.0),
            1.0,
        ));
        trace.push(LocationSample::new(
            tue(21, 0),
            1.0 + meters_to_lat_degrees(300.0),
            1.0,
        ));
        store.insert_trace("u", &trace);

        let observer = RecordingObserver::default();
        let mut recognizer =
            PlaceRecognizer::with_config(store, RecognitionConfig::default(), &observer).unwrap();
        recognizer.recognize_at("u", now()).unwrap();

        let tagged = recognizer.annotate("u").unwrap();
        assert_eq!(tagged, 9);

        let points = recognizer.store().fetch_trace_points("u").unwrap();
        let far = points
            .iter()
            .find(|p| p.timestamp == tue(21, 0))
            .unwrap();
        assert!(far.near.is_empty());
        let near = points
            .iter()
            .find(|p| p.timestamp == tue(20, 0))
            .unwrap();
        assert_eq!(near.near, vec!["home".to_string()]);
        assert!(observer.contains(|e| matches!(
            e,
            PipelineEvent::TraceAnnotated {
                points: 10,
                tagged: 9,
                ..
            }
        )));
    }
}
