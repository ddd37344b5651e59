//! Content negotiation
//!
//! An ordered, closed set of content strategies. Each strategy declares a
//! predicate over a [`RequestContext`] and a content type; the registry
//! resolves exactly one strategy per context by first match. The priority
//! order is part of the contract: several predicates overlap (any fixed-rate
//! series satisfies both the time-window image strategy and the generic
//! array strategy), so reordering changes behavior.

use crate::audio;
use crate::context::{RequestContext, TempResult, Value};
use crate::error::{Result, ServeError};
use crate::features::{
    FeatureSpec, FeatureStore, AUDIO_CONTENT_TYPE, IMAGE_CONTENT_TYPE,
    SEARCH_RESULTS_CONTENT_TYPE,
};
use crate::range::{RangeSpec, TimeSlice};
use crate::render;
use serde::Serialize;
use std::io::{Read, Seek, SeekFrom};
use tracing::debug;

/// One serialization rule mapping a request context to response bytes
#[derive(Debug, Clone)]
pub enum ContentStrategy {
    /// Encode the sample window covered by a time range into a compressed
    /// audio container
    CompressedAudio,
    /// Render the frames of a fixed-rate series covered by a time range
    TimeSeriesImage,
    /// Stream the feature's persisted bytes verbatim, honoring byte ranges
    Passthrough { content_type: String },
    /// Render a numeric array (supplied or fetched whole) as an image
    NumericArrayImage,
    /// Serialize a search-result container as JSON with preview URLs
    StructuredJson {
        base_path: String,
        visualization_key: String,
        audio_key: String,
    },
}

impl ContentStrategy {
    /// Short name used in logs
    pub fn name(&self) -> &'static str {
        match self {
            ContentStrategy::CompressedAudio => "compressed-audio",
            ContentStrategy::TimeSeriesImage => "time-series-image",
            ContentStrategy::Passthrough { .. } => "passthrough",
            ContentStrategy::NumericArrayImage => "numeric-array-image",
            ContentStrategy::StructuredJson { .. } => "structured-json",
        }
    }

    /// Whether this strategy claims the given context
    pub fn matches(&self, ctx: &RequestContext) -> bool {
        match self {
            ContentStrategy::CompressedAudio => {
                ctx.feature.as_ref().is_some_and(FeatureSpec::is_audio)
                    && matches!(ctx.slice, RangeSpec::Time(_))
            }
            ContentStrategy::TimeSeriesImage => {
                ctx.feature
                    .as_ref()
                    .is_some_and(FeatureSpec::is_constant_rate)
                    && matches!(ctx.slice, RangeSpec::Time(_))
            }
            ContentStrategy::Passthrough { content_type } => ctx
                .feature
                .as_ref()
                .is_some_and(|f| f.content_type == *content_type),
            ContentStrategy::NumericArrayImage => {
                ctx.feature
                    .as_ref()
                    .is_some_and(FeatureSpec::is_constant_rate)
                    || ctx
                        .value
                        .as_ref()
                        .and_then(Value::as_array)
                        .is_some_and(|a| matches!(a.rank(), 1 | 2))
            }
            ContentStrategy::StructuredJson { .. } => {
                ctx.value.as_ref().and_then(Value::as_search).is_some()
            }
        }
    }

    /// The content type this strategy produces
    pub fn content_type(&self) -> &str {
        match self {
            ContentStrategy::CompressedAudio => AUDIO_CONTENT_TYPE,
            ContentStrategy::TimeSeriesImage => IMAGE_CONTENT_TYPE,
            ContentStrategy::Passthrough { content_type } => content_type,
            ContentStrategy::NumericArrayImage => IMAGE_CONTENT_TYPE,
            ContentStrategy::StructuredJson { .. } => SEARCH_RESULTS_CONTENT_TYPE,
        }
    }

    /// Produce the serialized result for a context this strategy matched
    pub fn serialize(&self, ctx: &RequestContext, store: &dyn FeatureStore) -> Result<TempResult> {
        match self {
            ContentStrategy::CompressedAudio => self.serialize_audio(ctx, store),
            ContentStrategy::TimeSeriesImage => self.serialize_series_image(ctx, store),
            ContentStrategy::Passthrough { .. } => self.serialize_passthrough(ctx, store),
            ContentStrategy::NumericArrayImage => self.serialize_array_image(ctx, store),
            ContentStrategy::StructuredJson { .. } => self.serialize_search(ctx),
        }
    }

    fn document_and_feature<'a>(ctx: &'a RequestContext) -> Result<(&'a str, &'a FeatureSpec)> {
        let document = ctx
            .document
            .as_deref()
            .ok_or_else(|| ServeError::Internal("context has no document".to_string()))?;
        let feature = ctx
            .feature
            .as_ref()
            .ok_or_else(|| ServeError::Internal("context has no feature".to_string()))?;
        Ok((document, feature))
    }

    fn time_window(ctx: &RequestContext) -> Result<TimeSlice> {
        ctx.slice
            .as_time()
            .copied()
            .ok_or_else(|| ServeError::Internal("slice is not a time range".to_string()))
    }

    fn serialize_audio(&self, ctx: &RequestContext, store: &dyn FeatureStore) -> Result<TempResult> {
        let (document, feature) = Self::document_and_feature(ctx)?;
        let window = Self::time_window(ctx)?;
        let samples = store.read_audio(document, feature, &window)?;
        let encoded = audio::encode(&samples)?;
        Ok(TempResult::partial(
            encoded,
            AUDIO_CONTENT_TYPE,
            !window.is_full(),
        ))
    }

    fn serialize_series_image(
        &self,
        ctx: &RequestContext,
        store: &dyn FeatureStore,
    ) -> Result<TempResult> {
        let (document, feature) = Self::document_and_feature(ctx)?;
        let window = Self::time_window(ctx)?;
        let data = store.read_series(document, feature, &window)?;
        render::generate_image(&data)
    }

    fn serialize_passthrough(
        &self,
        ctx: &RequestContext,
        store: &dyn FeatureStore,
    ) -> Result<TempResult> {
        let (document, feature) = Self::document_and_feature(ctx)?;
        let mut flo = store.open_bytes(document, feature)?;
        let mut data = Vec::new();

        match ctx.slice {
            RangeSpec::Bytes { start, stop } => {
                let len = flo.seek(SeekFrom::End(0))?;
                if start > len {
                    return Err(ServeError::UnsatisfiableRange(format!(
                        "byte {} of {}",
                        start, len
                    )));
                }
                flo.seek(SeekFrom::Start(start))?;
                match stop {
                    Some(stop) => {
                        let take = stop.saturating_sub(start);
                        flo.take(take).read_to_end(&mut data)?;
                    }
                    None => {
                        flo.read_to_end(&mut data)?;
                    }
                }
            }
            _ => {
                flo.read_to_end(&mut data)?;
            }
        }

        // The 206 decision for byte ranges lives at the HTTP boundary.
        Ok(TempResult::new(data, self.content_type()))
    }

    fn serialize_array_image(
        &self,
        ctx: &RequestContext,
        store: &dyn FeatureStore,
    ) -> Result<TempResult> {
        let data = match ctx.value.as_ref().and_then(Value::as_array) {
            Some(array) => array.clone(),
            None => {
                let (document, feature) = Self::document_and_feature(ctx)?;
                store.read_series(document, feature, &TimeSlice::full())?
            }
        };
        render::generate_image(&data)
    }

    fn serialize_search(&self, ctx: &RequestContext) -> Result<TempResult> {
        let (base_path, visualization_key, audio_key) = match self {
            ContentStrategy::StructuredJson {
                base_path,
                visualization_key,
                audio_key,
            } => (base_path, visualization_key, audio_key),
            _ => unreachable!("serialize_search on non-json strategy"),
        };
        let results = ctx
            .value
            .as_ref()
            .and_then(Value::as_search)
            .ok_or_else(|| ServeError::Internal("context has no search results".to_string()))?;

        #[derive(Serialize)]
        struct SliceSeconds {
            start_seconds: f64,
            duration_seconds: Option<f64>,
        }

        #[derive(Serialize)]
        struct ResultEntry {
            audio: String,
            visualization: String,
            slice: SliceSeconds,
        }

        #[derive(Serialize)]
        struct Output {
            results: Vec<ResultEntry>,
        }

        let output = Output {
            results: results
                .hits
                .iter()
                .map(|hit| ResultEntry {
                    audio: format!("{}/{}/{}", base_path, hit.document_id, audio_key),
                    visualization: format!(
                        "{}/{}/{}",
                        base_path, hit.document_id, visualization_key
                    ),
                    slice: SliceSeconds {
                        start_seconds: hit.span.start_seconds(),
                        duration_seconds: hit.span.duration_seconds(),
                    },
                })
                .collect(),
        };

        let body = serde_json::to_vec(&output)
            .map_err(|e| ServeError::Internal(format!("search-results encoding: {}", e)))?;
        Ok(TempResult::new(body, SEARCH_RESULTS_CONTENT_TYPE))
    }
}

/// Ordered set of content strategies with first-match resolution
#[derive(Debug, Clone)]
pub struct SerializerRegistry {
    strategies: Vec<ContentStrategy>,
}

impl SerializerRegistry {
    /// Build the registry in its fixed priority order
    ///
    /// # Arguments
    /// * `base_path` - URL prefix used in synthesized preview URLs
    /// * `visualization_key` / `audio_key` - the fixed features every
    ///   search-result entry links to (not derived per hit)
    pub fn new(
        base_path: impl Into<String>,
        visualization_key: impl Into<String>,
        audio_key: impl Into<String>,
    ) -> Self {
        SerializerRegistry {
            strategies: vec![
                ContentStrategy::CompressedAudio,
                ContentStrategy::TimeSeriesImage,
                ContentStrategy::Passthrough {
                    content_type: "application/json".to_string(),
                },
                ContentStrategy::Passthrough {
                    content_type: AUDIO_CONTENT_TYPE.to_string(),
                },
                ContentStrategy::NumericArrayImage,
                ContentStrategy::StructuredJson {
                    base_path: base_path.into(),
                    visualization_key: visualization_key.into(),
                    audio_key: audio_key.into(),
                },
            ],
        }
    }

    /// Resolve the first strategy whose predicate claims the context
    ///
    /// # Returns
    /// * `Err(ServeError::NoMatchingSerializer)` when nothing claims it;
    ///   callers must not attempt a best-effort fallback
    pub fn resolve(&self, ctx: &RequestContext) -> Result<&ContentStrategy> {
        let strategy = self
            .strategies
            .iter()
            .find(|s| s.matches(ctx))
            .ok_or(ServeError::NoMatchingSerializer)?;
        debug!(strategy = strategy.name(), "resolved content strategy");
        Ok(strategy)
    }

    /// Resolve and produce a result in one step
    pub fn serialize(&self, ctx: &RequestContext, store: &dyn FeatureStore) -> Result<TempResult> {
        self.resolve(ctx)?.serialize(ctx, store)
    }
}
