//! Request context and serialized-result models

use crate::features::{FeatureSpec, NdArray, SearchResults};
use crate::range::RangeSpec;
use bytes::Bytes;
use std::time::SystemTime;

/// Raw computed value attached to a request context
///
/// Feature requests carry no value (the feature identifies what to fetch);
/// REPL previews carry the value the evaluated expression produced.
#[derive(Debug, Clone, PartialEq)]
pub enum Value {
    Array(NdArray),
    Search(SearchResults),
}

impl Value {
    pub fn as_array(&self) -> Option<&NdArray> {
        match self {
            Value::Array(a) => Some(a),
            _ => None,
        }
    }

    pub fn as_search(&self) -> Option<&SearchResults> {
        match self {
            Value::Search(s) => Some(s),
            _ => None,
        }
    }
}

/// Immutable bundle describing one negotiation request
///
/// `feature`-driven retrieval and `value`-driven retrieval are each
/// meaningful on their own; when both are present the feature identifies how
/// the data would be computed while the value overrides what gets serialized.
#[derive(Debug, Clone, Default)]
pub struct RequestContext {
    /// Target document id, an opaque handle into the external store
    pub document: Option<String>,
    /// Target feature descriptor
    pub feature: Option<FeatureSpec>,
    /// Requested sub-range of the feature's data
    pub slice: RangeSpec,
    /// Raw computed value, when the caller already holds one
    pub value: Option<Value>,
}

impl RequestContext {
    /// Context for a direct feature fetch
    pub fn for_feature(document: impl Into<String>, feature: FeatureSpec, slice: RangeSpec) -> Self {
        RequestContext {
            document: Some(document.into()),
            feature: Some(feature),
            slice,
            value: None,
        }
    }

    /// Context for a REPL preview of an already-computed value
    pub fn for_value(
        document: Option<String>,
        feature: Option<FeatureSpec>,
        value: Option<Value>,
    ) -> Self {
        RequestContext {
            document,
            feature,
            slice: RangeSpec::Full,
            value,
        }
    }
}

/// The realized output of one serialization
///
/// Created by exactly one content-strategy invocation and immutable after
/// creation; ownership moves to either the HTTP response writer or the
/// ephemeral result store.
#[derive(Debug, Clone)]
pub struct TempResult {
    pub data: Bytes,
    pub content_type: String,
    pub created_at: SystemTime,
    pub is_partial: bool,
}

impl TempResult {
    pub fn new(data: impl Into<Bytes>, content_type: impl Into<String>) -> Self {
        TempResult {
            data: data.into(),
            content_type: content_type.into(),
            created_at: SystemTime::now(),
            is_partial: false,
        }
    }

    pub fn partial(data: impl Into<Bytes>, content_type: impl Into<String>, is_partial: bool) -> Self {
        TempResult {
            is_partial,
            ..TempResult::new(data, content_type)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_feature_context_has_no_value() {
        let ctx = RequestContext::for_feature("doc", FeatureSpec::audio("audio"), RangeSpec::Full);
        assert_eq!(ctx.document.as_deref(), Some("doc"));
        assert!(ctx.value.is_none());
    }

    #[test]
    fn test_value_context_uses_full_slice() {
        let ctx = RequestContext::for_value(None, None, Some(Value::Array(NdArray::vector(vec![1.0]))));
        assert_eq!(ctx.slice, RangeSpec::Full);
        assert!(ctx.feature.is_none());
    }

    #[test]
    fn test_result_defaults_to_full() {
        let result = TempResult::new(vec![1u8, 2, 3], "application/json");
        assert!(!result.is_partial);
        assert_eq!(result.data.len(), 3);
    }
}
