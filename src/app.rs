//! Application assembly
//!
//! [`EarshotApp`] wires the serializer registry, the ephemeral result store,
//! the REPL scope and the storage boundary together, and implements the two
//! request flows the HTTP layer delegates to: direct feature fetches and
//! evaluate-and-preview.

use crate::config::ServeConfig;
use crate::context::{RequestContext, TempResult};
use crate::error::{Result, ServeError};
use crate::features::{FeatureSet, FeatureStore};
use crate::introspect;
use crate::metrics::ServeMetrics;
use crate::range::RangeSpec;
use crate::script::{Interpreter, Scope, ScriptValue};
use crate::serializers::SerializerRegistry;
use crate::store::TempStore;
use std::sync::{Arc, RwLock};
use std::time::Duration;
use tracing::{debug, warn};

/// Outcome of one REPL evaluation
#[derive(Debug, Clone, PartialEq)]
pub struct ReplOutcome {
    /// Display form of the evaluated value (empty for assignments)
    pub result: String,
    /// Preview URL, when the value could be serialized
    pub url: Option<String>,
    /// Content type of the stored preview
    pub content_type: Option<String>,
}

/// The assembled server state shared by all request handlers
pub struct EarshotApp {
    config: Arc<ServeConfig>,
    store: Arc<dyn FeatureStore>,
    features: FeatureSet,
    registry: SerializerRegistry,
    temp: TempStore,
    scope: RwLock<Scope>,
    metrics: ServeMetrics,
}

impl EarshotApp {
    /// Assemble an app
    ///
    /// # Arguments
    /// * `visualization_key` / `audio_key` - the fixed features search-result
    ///   entries link to; both must be members of `features`
    /// * `scope` - initial REPL scope (typically binding a document or two)
    pub fn new(
        config: Arc<ServeConfig>,
        store: Arc<dyn FeatureStore>,
        features: FeatureSet,
        visualization_key: &str,
        audio_key: &str,
        scope: Scope,
    ) -> Result<Self> {
        for key in [visualization_key, audio_key] {
            if !features.contains(key) {
                return Err(ServeError::Config(format!(
                    "'{}' is not a member of the feature set",
                    key
                )));
            }
        }

        let registry =
            SerializerRegistry::new(config.base_path.clone(), visualization_key, audio_key);
        let temp = TempStore::with_ttl(
            config.temp_capacity,
            config.temp_ttl_secs.map(Duration::from_secs),
        );

        Ok(EarshotApp {
            config,
            store,
            features,
            registry,
            temp,
            scope: RwLock::new(scope),
            metrics: ServeMetrics::new(),
        })
    }

    pub fn config(&self) -> &ServeConfig {
        &self.config
    }

    pub fn features(&self) -> &FeatureSet {
        &self.features
    }

    pub fn metrics(&self) -> &ServeMetrics {
        &self.metrics
    }

    pub fn temp(&self) -> &TempStore {
        &self.temp
    }

    /// Resolve a strategy for the context and produce its result
    pub fn serialize(&self, ctx: &RequestContext) -> Result<TempResult> {
        self.registry.serialize(ctx, self.store.as_ref())
    }

    /// Handle a direct feature fetch
    ///
    /// # Arguments
    /// * `range_header` - raw `Range` header value, empty when absent
    ///
    /// # Returns
    /// The serialized result and whether the response is partial content
    pub fn feature_result(
        &self,
        document: &str,
        feature_key: &str,
        range_header: &str,
    ) -> Result<(TempResult, bool)> {
        self.metrics.record_feature_request();

        if !self.store.contains_document(document) {
            return Err(ServeError::NotFound(format!("document '{}'", document)));
        }
        let feature = self
            .features
            .get(feature_key)
            .ok_or_else(|| ServeError::NotFound(format!("feature '{}'", feature_key)))?
            .clone();

        let slice = RangeSpec::parse(range_header)?;
        let ctx = RequestContext::for_feature(document, feature, slice);
        let result = self.serialize(&ctx).inspect_err(|e| {
            self.metrics.record_serialize_failure();
            warn!(document, feature_key, error = %e, "feature serialization failed");
        })?;

        // Byte-range requests are partial even though the passthrough
        // strategy leaves the flag unset.
        let partial = result.is_partial || slice.is_byte_range();
        Ok((result, partial))
    }

    /// Fetch a stored preview result by id
    pub fn temp_result(&self, id: &str) -> Option<TempResult> {
        let result = self.temp.get(id);
        self.metrics.record_temp_lookup(result.is_some());
        result
    }

    /// Handle one REPL statement: evaluate, introspect, attempt a preview
    ///
    /// A preview that no strategy claims is simply omitted; any other
    /// serialization failure propagates and fails the request. Assignments
    /// produce an empty result and never attempt a preview.
    pub fn repl(&self, statement: &str) -> Result<ReplOutcome> {
        self.metrics.record_preview_request();

        let interpreter = Interpreter::new(self.store.as_ref(), &self.features);
        let value = {
            let mut scope = self.scope.write().unwrap_or_else(|e| e.into_inner());
            interpreter.execute(statement, &mut scope)?
        };

        let mut outcome = ReplOutcome {
            result: value.display(),
            url: None,
            content_type: None,
        };

        // Side-effecting statements answer with an empty result and no URL.
        if value == ScriptValue::Unit {
            return Ok(outcome);
        }

        let (document, feature) = {
            let scope = self.scope.read().unwrap_or_else(|e| e.into_inner());
            introspect::extract(statement, &scope, &self.features)
        };
        debug!(?document, feature = ?feature.as_ref().map(|f| &f.key), "introspected statement");

        let ctx = RequestContext::for_value(document, feature, value.preview_value());
        match self.serialize(&ctx) {
            Ok(result) => {
                let content_type = result.content_type.clone();
                let id = self.temp.insert(result);
                outcome.url = Some(format!("{}/temp/{}", self.config.base_path, id));
                outcome.content_type = Some(content_type);
            }
            // The preview is optional; the evaluated result still stands.
            Err(ServeError::NoMatchingSerializer) => {
                debug!("no serializer claimed the preview context");
            }
            Err(e) => {
                self.metrics.record_serialize_failure();
                return Err(e);
            }
        }

        Ok(outcome)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::features::{AudioWindow, FeatureSpec, MemoryFeatureStore, NdArray};

    fn demo_app() -> EarshotApp {
        let store = MemoryFeatureStore::new();
        let samples: Vec<f32> = (0..8000).map(|i| (i as f32 / 20.0).sin() * 0.4).collect();
        store
            .insert_audio("demo", "audio", AudioWindow::mono(samples, 8000))
            .unwrap();
        store.insert_series(
            "demo",
            "loudness",
            NdArray::vector((0..20).map(|i| i as f64 / 20.0).collect()),
            50_000_000_000,
        );

        let features: FeatureSet = [
            FeatureSpec::audio("audio"),
            FeatureSpec::series("loudness", 1),
        ]
        .into_iter()
        .collect();

        let mut scope = Scope::new();
        scope.bind("doc", ScriptValue::Document("demo".to_string()));

        EarshotApp::new(
            Arc::new(ServeConfig::default()),
            Arc::new(store),
            features,
            "loudness",
            "audio",
            scope,
        )
        .unwrap()
    }

    #[test]
    fn test_unknown_visualization_feature_is_rejected() {
        let store = MemoryFeatureStore::new();
        let features: FeatureSet = [FeatureSpec::audio("audio")].into_iter().collect();
        let result = EarshotApp::new(
            Arc::new(ServeConfig::default()),
            Arc::new(store),
            features,
            "missing",
            "audio",
            Scope::new(),
        );
        assert!(matches!(result, Err(ServeError::Config(_))));
    }

    #[test]
    fn test_feature_result_full_fetch() {
        let app = demo_app();
        let (result, partial) = app.feature_result("demo", "audio", "").unwrap();
        assert!(!partial);
        assert_eq!(result.content_type, "audio/flac");
    }

    #[test]
    fn test_feature_result_byte_range_is_partial() {
        let app = demo_app();
        let (result, partial) = app.feature_result("demo", "audio", "bytes=0-99").unwrap();
        assert!(partial);
        assert_eq!(result.data.len(), 99);
    }

    #[test]
    fn test_feature_result_unknown_document() {
        let app = demo_app();
        assert!(matches!(
            app.feature_result("nope", "audio", ""),
            Err(ServeError::NotFound(_))
        ));
    }

    #[test]
    fn test_feature_result_bad_unit() {
        let app = demo_app();
        assert!(matches!(
            app.feature_result("demo", "audio", "pages=0-1"),
            Err(ServeError::RangeUnitUnsupported(_))
        ));
    }

    #[test]
    fn test_repl_preview_stores_result() {
        let app = demo_app();
        let outcome = app.repl("doc.loudness").unwrap();
        assert_eq!(outcome.content_type.as_deref(), Some("image/png"));
        let url = outcome.url.unwrap();
        let id = url.rsplit('/').next().unwrap();
        assert!(app.temp_result(id).is_some());
    }

    #[test]
    fn test_repl_plain_arithmetic_has_no_url() {
        let app = demo_app();
        let outcome = app.repl("1 + 1").unwrap();
        assert_eq!(outcome.result, "2");
        assert!(outcome.url.is_none());
        assert!(outcome.content_type.is_none());
    }

    #[test]
    fn test_repl_assignment_is_silent() {
        let app = demo_app();
        let outcome = app.repl("x = doc.loudness").unwrap();
        assert_eq!(outcome.result, "");
        assert!(outcome.url.is_none());

        // The binding is visible to the next statement.
        let outcome = app.repl("x[3]").unwrap();
        assert_eq!(outcome.result, "0.15");
    }

    #[test]
    fn test_repl_error_propagates() {
        let app = demo_app();
        assert!(matches!(app.repl("nope + 1"), Err(ServeError::Eval(_))));
    }
}
