//! Storage collaborator
//!
//! The recognizer never owns a connection. It is handed a [`PlaceStore`] that
//! can read a user's trace, read and replace stored place records, and write
//! back annotated trace points. [`InMemoryStore`] backs tests, the CLI and the
//! FFI layer.

use crate::error::StorageError;
use crate::types::{LocationSample, PlaceTagRecord, StoredPlace, TracePoint};
use chrono::{DateTime, Utc};
use std::cell::Cell;
use std::collections::HashMap;
use uuid::Uuid;

/// Persistence capability injected into the recognizer
pub trait PlaceStore {
    /// Full raw trace of a user. Unknown users yield `StorageError::NotFound`.
    fn fetch_trace(&self, user_id: &str) -> Result<Vec<LocationSample>, StorageError>;

    /// Stored place records of a user; empty when none were saved.
    fn fetch_places(&self, user_id: &str) -> Result<Vec<StoredPlace>, StorageError>;

    /// Persist place records, returning them with their storage metadata
    fn save_places(
        &mut self,
        user_id: &str,
        records: &[PlaceTagRecord],
        created_at: DateTime<Utc>,
    ) -> Result<Vec<StoredPlace>, StorageError>;

    /// Remove the given stored records
    fn delete_places(&mut self, user_id: &str, places: &[StoredPlace]) -> Result<(), StorageError>;

    /// Stored trace points of a user, including their current annotations
    fn fetch_trace_points(&self, user_id: &str) -> Result<Vec<TracePoint>, StorageError>;

    /// Overwrite stored trace points (matched by object id)
    fn update_trace_points(
        &mut self,
        user_id: &str,
        points: &[TracePoint],
    ) -> Result<(), StorageError>;
}

/// In-process store keyed by user id
#[derive(Debug, Default, Clone)]
pub struct InMemoryStore {
    traces: HashMap<String, Vec<TracePoint>>,
    places: HashMap<String, Vec<StoredPlace>>,
    place_read_failure: Option<String>,
    trace_reads: Cell<usize>,
    place_writes: usize,
}

impl InMemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add raw samples to a user's trace, assigning object ids
    pub fn insert_trace(&mut self, user_id: &str, samples: &[LocationSample]) {
        let trace = self.traces.entry(user_id.to_string()).or_default();
        trace.extend(samples.iter().map(|&s| {
            let mut point = TracePoint::new(user_id, s);
            point.object_id = Some(Uuid::new_v4().to_string());
            point
        }));
    }

    /// Replace a user's stored place records
    pub fn insert_places(&mut self, user_id: &str, places: Vec<StoredPlace>) {
        self.places.insert(user_id.to_string(), places);
    }

    /// Make every subsequent `fetch_places` fail with a backend error
    pub fn fail_place_reads(&mut self, reason: impl Into<String>) {
        self.place_read_failure = Some(reason.into());
    }

    /// Number of `fetch_trace` calls
    pub fn trace_reads(&self) -> usize {
        self.trace_reads.get()
    }

    /// Number of `save_places` calls
    pub fn place_writes(&self) -> usize {
        self.place_writes
    }
}

impl PlaceStore for InMemoryStore {
    fn fetch_trace(&self, user_id: &str) -> Result<Vec<LocationSample>, StorageError> {
        self.trace_reads.set(self.trace_reads.get() + 1);
        self.traces
            .get(user_id)
            .map(|points| points.iter().map(TracePoint::sample).collect())
            .ok_or_else(|| StorageError::NotFound(format!("trace of user {}", user_id)))
    }

    fn fetch_places(&self, user_id: &str) -> Result<Vec<StoredPlace>, StorageError> {
        if let Some(reason) = &self.place_read_failure {
            return Err(StorageError::Backend(reason.clone()));
        }
        Ok(self.places.get(user_id).cloned().unwrap_or_default())
    }

    fn save_places(
        &mut self,
        user_id: &str,
        records: &[PlaceTagRecord],
        created_at: DateTime<Utc>,
    ) -> Result<Vec<StoredPlace>, StorageError> {
        self.place_writes += 1;
        let stored: Vec<StoredPlace> = records
            .iter()
            .map(|record| StoredPlace {
                object_id: Uuid::new_v4().to_string(),
                created_at,
                record: record.clone(),
            })
            .collect();
        self.places
            .entry(user_id.to_string())
            .or_default()
            .extend(stored.iter().cloned());
        Ok(stored)
    }

    fn delete_places(&mut self, user_id: &str, places: &[StoredPlace]) -> Result<(), StorageError> {
        if let Some(existing) = self.places.get_mut(user_id) {
            existing.retain(|p| !places.iter().any(|d| d.object_id == p.object_id));
        }
        Ok(())
    }

    fn fetch_trace_points(&self, user_id: &str) -> Result<Vec<TracePoint>, StorageError> {
        self.traces
            .get(user_id)
            .cloned()
            .ok_or_else(|| StorageError::NotFound(format!("trace of user {}", user_id)))
    }

    fn update_trace_points(
        &mut self,
        user_id: &str,
        points: &[TracePoint],
    ) -> Result<(), StorageError> {
        let existing = self
            .traces
            .get_mut(user_id)
            .ok_or_else(|| StorageError::NotFound(format!("trace of user {}", user_id)))?;

        for update in points {
            let slot = existing
                .iter_mut()
                .find(|p| p.object_id.is_some() && p.object_id == update.object_id);
            match slot {
                Some(point) => *point = update.clone(),
                None => {
                    return Err(StorageError::NotFound(format!(
                        "trace point {:?} of user {}",
                        update.object_id, user_id
                    )))
                }
            }
        }
        Ok(())
    }
}
