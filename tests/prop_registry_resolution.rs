// Property: registry resolution is deterministic and follows the fixed
// priority order, for arbitrary contexts.

use earshot::{
    FeatureSpec, NdArray, RangeSpec, RequestContext, SearchHit, SearchResults, SerializerRegistry,
    ServeError, TimeSlice, Value,
};
use proptest::prelude::*;

fn registry() -> SerializerRegistry {
    SerializerRegistry::new("/earshot", "spectrogram", "audio")
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(100))]

    /// Resolving the same context twice always lands on the same strategy.
    #[test]
    fn prop_resolution_is_deterministic(
        start in 0.0f64..100.0,
        extent in 0.0f64..100.0,
        audio in proptest::bool::ANY,
    ) {
        let feature = if audio {
            FeatureSpec::audio("audio")
        } else {
            FeatureSpec::series("loudness", 1)
        };
        let slice = RangeSpec::Time(TimeSlice::from_seconds(start, Some(start + extent)));
        let ctx = RequestContext::for_feature("doc", feature, slice);

        let reg = registry();
        let first = reg.resolve(&ctx).expect("context must resolve").name();
        let second = reg.resolve(&ctx).expect("context must resolve").name();
        prop_assert_eq!(first, second);
    }

    /// An audio feature with a time slice always outranks every other
    /// strategy, whatever the window.
    #[test]
    fn prop_audio_time_slice_outranks(
        start in 0.0f64..100.0,
        bounded in proptest::bool::ANY,
    ) {
        let slice = RangeSpec::Time(TimeSlice::from_seconds(
            start,
            if bounded { Some(start + 1.0) } else { None },
        ));
        let ctx = RequestContext::for_feature("doc", FeatureSpec::audio("audio"), slice);

        prop_assert_eq!(registry().resolve(&ctx).unwrap().name(), "compressed-audio");
    }

    /// An audio feature with a byte slice or no slice streams through the
    /// passthrough strategy instead.
    #[test]
    fn prop_audio_byte_slice_is_passthrough(
        start in 0u64..1000u64,
        bounded in proptest::bool::ANY,
    ) {
        let slice = RangeSpec::Bytes {
            start,
            stop: if bounded { Some(start + 1) } else { None },
        };
        let ctx = RequestContext::for_feature("doc", FeatureSpec::audio("audio"), slice);

        prop_assert_eq!(registry().resolve(&ctx).unwrap().name(), "passthrough");
    }

    /// A rank-1 or rank-2 array value resolves to the array-image strategy
    /// regardless of its contents.
    #[test]
    fn prop_low_rank_arrays_render(
        len in 1usize..64,
        two_dee in proptest::bool::ANY,
        fill in -1000.0f64..1000.0,
    ) {
        let array = if two_dee {
            NdArray::matrix(len, 3, vec![fill; len * 3]).unwrap()
        } else {
            NdArray::vector(vec![fill; len])
        };
        let ctx = RequestContext::for_value(None, None, Some(Value::Array(array)));

        prop_assert_eq!(registry().resolve(&ctx).unwrap().name(), "numeric-array-image");
    }

    /// Arrays of rank three or higher never match any strategy, and the
    /// caller gets the no-match error rather than a fallback.
    #[test]
    fn prop_high_rank_arrays_never_match(rank in 3usize..6) {
        let shape = vec![2usize; rank];
        let len = shape.iter().product();
        let array = NdArray::new(shape, vec![0.0; len]).unwrap();
        let ctx = RequestContext::for_value(None, None, Some(Value::Array(array)));

        prop_assert!(matches!(
            registry().resolve(&ctx),
            Err(ServeError::NoMatchingSerializer)
        ));
    }

    /// Search results resolve to the structured JSON strategy no matter how
    /// many hits they carry.
    #[test]
    fn prop_search_results_resolve_json(hits in 0usize..16) {
        let results = SearchResults {
            hits: (0..hits)
                .map(|i| SearchHit {
                    document_id: format!("doc-{}", i),
                    span: TimeSlice::from_seconds(i as f64, Some(i as f64 + 1.0)),
                })
                .collect(),
        };
        let ctx = RequestContext::for_value(None, None, Some(Value::Search(results)));

        prop_assert_eq!(registry().resolve(&ctx).unwrap().name(), "structured-json");
    }
}
