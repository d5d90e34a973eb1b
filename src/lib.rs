//! placesense - Significant place recognition from location traces
//!
//! placesense turns a user's raw, irregularly sampled GPS trace into named
//! places ("home", "office") through a deterministic pipeline: downsampling →
//! centroid-linkage clustering → significance filtering → time-window tagging
//! → aggregation. Recognized places can then be joined back onto the trace.
//!
//! ## Modules
//!
//! - **Stages**: [`sampler`], [`clustering`], [`significance`], [`tagger`],
//!   [`aggregator`], [`annotator`]
//! - **Orchestration**: [`pipeline`] with a cache over an injected [`store`]
//! - **Interop**: [`ffi`] for C callers, the `places` binary behind the `cli` feature

pub mod aggregator;
pub mod annotator;
pub mod clustering;
pub mod config;
pub mod distance;
pub mod error;
pub mod observer;
pub mod pipeline;
pub mod sampler;
pub mod significance;
pub mod store;
pub mod tagger;
pub mod types;

// FFI bindings for C interop (always available for cdylib/staticlib builds)
pub mod ffi;

pub use config::{ExcludedWeekdays, RecognitionConfig};
pub use error::{PlaceError, StorageError};
pub use observer::{LogObserver, NoopObserver, PipelineEvent, PipelineObserver};
pub use pipeline::{cluster_places, cluster_places_json, PlaceRecognizer, Recognition};
pub use store::{InMemoryStore, PlaceStore};
pub use types::{
    LocationSample, PlaceRecord, PlaceTagRecord, StoredPlace, Tag, TimeWindow, TracePoint,
};

/// Library version
pub const PLACESENSE_VERSION: &str = env!("CARGO_PKG_VERSION");

/// Producer name reported by the CLI
pub const PRODUCER_NAME: &str = "placesense";
