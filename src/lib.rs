//! earshot
//!
//! An HTTP server that exposes stored, multi-dimensional audio-analysis
//! features. A client requests a named feature of a named document,
//! optionally restricted to a sub-range, and receives it rendered in an
//! appropriate wire format: raw bytes, a PNG visualization, encoded audio,
//! or JSON. An interactive console evaluates expressions against the stored
//! documents and hands back shareable preview URLs for their results.
//!
//! # Overview
//!
//! The interesting parts are range-request resolution and content
//! negotiation:
//!
//! - [`RangeSpec`] parses the `Range` header into one of two incompatible
//!   unit systems — `bytes=` addresses a feature's persisted stream,
//!   `seconds=` addresses a window of time at picosecond precision.
//! - [`SerializerRegistry`] holds an ordered, closed set of content
//!   strategies and resolves exactly one per request by first match. The
//!   order matters: several predicates overlap.
//! - [`introspect::extract`] statically recovers which (document, feature)
//!   pair a console statement refers to, without executing it, so a preview
//!   URL can be synthesized for the evaluated value.
//! - [`TempStore`] keeps preview results addressable by generated id for
//!   the lifetime of the process (bounded, oldest-first eviction).
//!
//! # Quick Start
//!
//! ```rust,no_run
//! use earshot::{
//!     EarshotApp, FeatureSet, FeatureSpec, MemoryFeatureStore, NdArray, Scope, ServeConfig,
//! };
//! use std::sync::Arc;
//!
//! # fn main() -> earshot::Result<()> {
//! let store = MemoryFeatureStore::new();
//! store.insert_series(
//!     "doc-1",
//!     "loudness",
//!     NdArray::vector(vec![0.1, 0.6, 0.3]),
//!     1_000_000_000_000,
//! );
//!
//! let features: FeatureSet = [
//!     FeatureSpec::audio("audio"),
//!     FeatureSpec::series("loudness", 1),
//! ]
//! .into_iter()
//! .collect();
//!
//! let app = EarshotApp::new(
//!     Arc::new(ServeConfig::default()),
//!     Arc::new(store),
//!     features,
//!     "loudness",
//!     "audio",
//!     Scope::new(),
//! )?;
//!
//! let (result, partial) = app.feature_result("doc-1", "loudness", "seconds=0-2")?;
//! assert_eq!(result.content_type, "image/png");
//! assert!(!partial);
//! # Ok(())
//! # }
//! ```
//!
//! # Architecture
//!
//! - [`EarshotApp`]: assembles the registry, stores and scope behind the two
//!   request flows
//! - [`server`]: hyper-based HTTP surface (feature, temp, repl and console
//!   routes)
//! - [`FeatureStore`]: boundary to the external extraction pipeline
//! - [`render`] / [`audio`]: PNG rendering and FLAC encoding of fetched data
//! - [`script`]: the console's expression language and caller-owned scope

pub mod app;
pub mod audio;
pub mod config;
pub mod context;
pub mod error;
pub mod features;
pub mod introspect;
pub mod metrics;
pub mod range;
pub mod render;
pub mod script;
pub mod serializers;
pub mod server;
pub mod store;

// Re-export commonly used types
pub use app::{EarshotApp, ReplOutcome};
pub use config::ServeConfig;
pub use context::{RequestContext, TempResult, Value};
pub use error::{Result, ServeError};
pub use features::{
    AudioWindow, FeatureKind, FeatureReader, FeatureSet, FeatureSpec, FeatureStore,
    MemoryFeatureStore, NdArray, SearchHit, SearchResults,
};
pub use metrics::{MetricsSnapshot, ServeMetrics};
pub use range::{RangeSpec, TimeSlice};
pub use script::{Interpreter, Scope, ScriptValue};
pub use serializers::{ContentStrategy, SerializerRegistry};
pub use store::{TempStore, TempStoreStats};
