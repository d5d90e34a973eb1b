//! Pipeline observability
//!
//! Stages report progress through an injected [`PipelineObserver`]. The default
//! [`LogObserver`] forwards events to the `log` facade; embedders can collect
//! events themselves or discard them with [`NoopObserver`].

use log::{debug, error, info, warn};

/// Something noteworthy that happened during a run
#[derive(Debug, Clone, PartialEq)]
pub enum PipelineEvent {
    RunStarted { user_id: String },
    TraceCompressed { raw: usize, compressed: usize },
    ClustersFormed { clusters: usize },
    ClustersFiltered { valid: usize, min_size: i64 },
    PlacesTagged { places: usize },
    CacheHit { user_id: String, records: usize },
    CacheExpired { user_id: String, age_days: i64, records: usize },
    CacheReadFailed { user_id: String, reason: String },
    PlacesSaved { user_id: String, records: usize },
    RunFailed { user_id: String, reason: String },
    TraceAnnotated { user_id: String, points: usize, tagged: usize },
}

/// Receiver of pipeline events
pub trait PipelineObserver {
    fn on_event(&self, event: &PipelineEvent);
}

impl<T: PipelineObserver + ?Sized> PipelineObserver for &T {
    fn on_event(&self, event: &PipelineEvent) {
        (**self).on_event(event)
    }
}

/// Forwards events to the `log` crate
#[derive(Debug, Clone, Copy, Default)]
pub struct LogObserver;

impl PipelineObserver for LogObserver {
    fn on_event(&self, event: &PipelineEvent) {
        match event {
            PipelineEvent::RunStarted { user_id } => info!("start place cluster for {}", user_id),
            PipelineEvent::TraceCompressed { raw, compressed } => {
                debug!("{} raw records, {} standardized records", raw, compressed)
            }
            PipelineEvent::ClustersFormed { clusters } => debug!("{} clusters", clusters),
            PipelineEvent::ClustersFiltered { valid, min_size } => {
                debug!("{} valid clusters (min size {})", valid, min_size)
            }
            PipelineEvent::PlacesTagged { places } => info!("{} tagged places", places),
            PipelineEvent::CacheHit { user_id, records } => {
                info!("returning {} cached place records for {}", records, user_id)
            }
            PipelineEvent::CacheExpired {
                user_id,
                age_days,
                records,
            } => info!(
                "dropping {} place records for {} ({} days old)",
                records, user_id, age_days
            ),
            PipelineEvent::CacheReadFailed { user_id, reason } => {
                warn!("reading place records for {} failed: {}", user_id, reason)
            }
            PipelineEvent::PlacesSaved { user_id, records } => {
                info!("saved {} place records for {}", records, user_id)
            }
            PipelineEvent::RunFailed { user_id, reason } => {
                error!("place clustering for {} failed: {}", user_id, reason)
            }
            PipelineEvent::TraceAnnotated {
                user_id,
                points,
                tagged,
            } => info!(
                "added near tags for {}: {} of {} trace points",
                user_id, tagged, points
            ),
        }
    }
}

/// Discards every event
#[derive(Debug, Clone, Copy, Default)]
pub struct NoopObserver;

impl PipelineObserver for NoopObserver {
    fn on_event(&self, _event: &PipelineEvent) {}
}

#[cfg(test)]
pub(crate) mod testing {
    use super::*;
    use std::cell::RefCell;

    /// Collects events for assertions
    #[derive(Default)]
    pub struct RecordingObserver {
        pub events: RefCell<Vec<PipelineEvent>>,
    }

    impl PipelineObserver for RecordingObserver {
        fn on_event(&self, event: &PipelineEvent) {
            self.events.borrow_mut().push(event.clone());
        }
    }

    impl RecordingObserver {
        pub fn contains(&self, predicate: impl Fn(&PipelineEvent) -> bool) -> bool {
            self.events.borrow().iter().any(predicate)
        }
    }
}
