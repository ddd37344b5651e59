//! Feature and document model, plus the storage boundary
//!
//! A document is an addressable unit (by opaque id) owning a set of named
//! features. A feature is a named, typed computed property of a document; it
//! carries a content type and an encoder kind. The extraction pipeline that
//! computes and persists feature values is an external collaborator hidden
//! behind [`FeatureStore`]; everything in this crate talks to it through that
//! trait. [`MemoryFeatureStore`] is the in-memory implementation used by the
//! binary and the test suite.

use crate::audio;
use crate::error::{Result, ServeError};
use crate::range::TimeSlice;
use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::io::{Cursor, Read, Seek};
use std::sync::RwLock;

/// Content type of encoded audio produced and served by this crate
pub const AUDIO_CONTENT_TYPE: &str = "audio/flac";

/// Content type of rendered feature visualizations
pub const IMAGE_CONTENT_TYPE: &str = "image/png";

/// Content type of serialized search results
pub const SEARCH_RESULTS_CONTENT_TYPE: &str = "application/vnd.earshot.searchresults+json";

/// Encoder kind of a feature, doubling as its dimensionality hint
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum FeatureKind {
    /// Persisted encoded audio with decoded-sample access
    Audio,
    /// Numeric frames at a fixed rate; `rank` is 1 for a scalar series and 2
    /// for a per-frame vector (e.g. a spectrogram)
    ConstantRateSeries { rank: usize },
    /// An opaque byte stream (e.g. JSON documents)
    Packed,
}

/// Descriptor of a named feature within a document's feature set
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FeatureSpec {
    /// Key unique within the owning document type's feature set
    pub key: String,
    /// Content type of the feature's persisted encoding
    pub content_type: String,
    /// Encoder kind / dimensionality hint
    pub kind: FeatureKind,
}

impl FeatureSpec {
    /// An audio feature persisted through the audio container encoder
    pub fn audio(key: impl Into<String>) -> Self {
        FeatureSpec {
            key: key.into(),
            content_type: AUDIO_CONTENT_TYPE.to_string(),
            kind: FeatureKind::Audio,
        }
    }

    /// A fixed-rate numeric time series of the given rank
    pub fn series(key: impl Into<String>, rank: usize) -> Self {
        FeatureSpec {
            key: key.into(),
            content_type: "application/octet-stream".to_string(),
            kind: FeatureKind::ConstantRateSeries { rank },
        }
    }

    /// An opaque feature persisted as JSON
    pub fn packed_json(key: impl Into<String>) -> Self {
        FeatureSpec {
            key: key.into(),
            content_type: "application/json".to_string(),
            kind: FeatureKind::Packed,
        }
    }

    /// Whether this feature's persisted form is encoded audio
    pub fn is_audio(&self) -> bool {
        self.kind == FeatureKind::Audio
    }

    /// Whether this feature is a fixed-rate time series
    pub fn is_constant_rate(&self) -> bool {
        matches!(self.kind, FeatureKind::ConstantRateSeries { .. })
    }
}

/// The known feature-key set of a document type
///
/// Iteration order is insertion order, so listings are stable.
#[derive(Debug, Clone, Default)]
pub struct FeatureSet {
    features: IndexMap<String, FeatureSpec>,
}

impl FeatureSet {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a feature under its key, replacing any previous entry
    pub fn insert(&mut self, spec: FeatureSpec) {
        self.features.insert(spec.key.clone(), spec);
    }

    pub fn contains(&self, key: &str) -> bool {
        self.features.contains_key(key)
    }

    pub fn get(&self, key: &str) -> Option<&FeatureSpec> {
        self.features.get(key)
    }

    pub fn keys(&self) -> impl Iterator<Item = &str> {
        self.features.keys().map(|k| k.as_str())
    }

    pub fn len(&self) -> usize {
        self.features.len()
    }

    pub fn is_empty(&self) -> bool {
        self.features.is_empty()
    }
}

impl FromIterator<FeatureSpec> for FeatureSet {
    fn from_iter<T: IntoIterator<Item = FeatureSpec>>(iter: T) -> Self {
        let mut set = FeatureSet::new();
        for spec in iter {
            set.insert(spec);
        }
        set
    }
}

/// A small row-major numeric array of rank 1 or 2 (higher ranks are storable
/// but not renderable)
#[derive(Debug, Clone, PartialEq)]
pub struct NdArray {
    shape: Vec<usize>,
    data: Vec<f64>,
}

impl NdArray {
    /// Create an array, checking that the shape accounts for every element
    pub fn new(shape: Vec<usize>, data: Vec<f64>) -> Result<Self> {
        let expected: usize = shape.iter().product();
        if expected != data.len() {
            return Err(ServeError::Internal(format!(
                "shape {:?} expects {} elements, got {}",
                shape,
                expected,
                data.len()
            )));
        }
        Ok(NdArray { shape, data })
    }

    /// A rank-1 array over the given samples
    pub fn vector(data: Vec<f64>) -> Self {
        NdArray {
            shape: vec![data.len()],
            data,
        }
    }

    /// A rank-2 array of `rows` frames with `cols` bins each
    pub fn matrix(rows: usize, cols: usize, data: Vec<f64>) -> Result<Self> {
        NdArray::new(vec![rows, cols], data)
    }

    pub fn rank(&self) -> usize {
        self.shape.len()
    }

    pub fn shape(&self) -> &[usize] {
        &self.shape
    }

    pub fn data(&self) -> &[f64] {
        &self.data
    }

    /// Number of frames along the leading axis
    pub fn frames(&self) -> usize {
        self.shape.first().copied().unwrap_or(0)
    }

    /// Elements per frame (1 for rank 1)
    pub fn frame_width(&self) -> usize {
        self.shape.iter().skip(1).product()
    }

    /// One frame of a rank-2 array
    pub fn row(&self, index: usize) -> &[f64] {
        let width = self.frame_width();
        &self.data[index * width..(index + 1) * width]
    }

    /// Copy out `count` frames starting at `start` along the leading axis
    pub fn frame_window(&self, start: usize, count: usize) -> NdArray {
        let width = self.frame_width();
        let data = self.data[start * width..(start + count) * width].to_vec();
        let mut shape = self.shape.clone();
        shape[0] = count;
        NdArray { shape, data }
    }
}

/// A window of raw audio samples fetched from the store
#[derive(Debug, Clone, PartialEq)]
pub struct AudioWindow {
    /// Interleaved samples in `[-1.0, 1.0]`
    pub samples: Vec<f32>,
    pub channels: u16,
    pub sample_rate: u32,
}

impl AudioWindow {
    pub fn mono(samples: Vec<f32>, sample_rate: u32) -> Self {
        AudioWindow {
            samples,
            channels: 1,
            sample_rate,
        }
    }

    /// Number of sample frames (positions in time)
    pub fn frames(&self) -> usize {
        if self.channels == 0 {
            0
        } else {
            self.samples.len() / self.channels as usize
        }
    }
}

/// One hit of a similarity search: a document and the window that matched
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SearchHit {
    pub document_id: String,
    pub span: TimeSlice,
}

/// A structured multi-result container produced by a search
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SearchResults {
    pub hits: Vec<SearchHit>,
}

/// Seekable reader over a feature's persisted/decoded byte stream
pub trait FeatureReader: Read + Seek + Send {}

impl<T: Read + Seek + Send> FeatureReader for T {}

/// Boundary to the external feature-extraction pipeline and its storage
///
/// Implementations must treat requests outside the available data as
/// [`ServeError::UnsatisfiableRange`] and unknown documents or features as
/// [`ServeError::NotFound`].
pub trait FeatureStore: Send + Sync {
    /// Whether a document with this id exists in the store
    fn contains_document(&self, id: &str) -> bool;

    /// Open the feature's persisted byte stream (decoded where the encoding
    /// is a transport detail, verbatim where the encoding is the payload)
    fn open_bytes(&self, document: &str, feature: &FeatureSpec) -> Result<Box<dyn FeatureReader>>;

    /// Fetch the frames of a fixed-rate series covered by the given window
    fn read_series(
        &self,
        document: &str,
        feature: &FeatureSpec,
        window: &TimeSlice,
    ) -> Result<NdArray>;

    /// Fetch the raw samples of an audio feature covered by the given window
    fn read_audio(
        &self,
        document: &str,
        feature: &FeatureSpec,
        window: &TimeSlice,
    ) -> Result<AudioWindow>;
}

/// One persisted feature value inside [`MemoryFeatureStore`]
enum Stored {
    Packed(Vec<u8>),
    Series {
        array: NdArray,
        /// Duration of one frame in picoseconds
        frame_duration_ps: i64,
    },
    Audio {
        window: AudioWindow,
        /// The window passed through the audio container encoder once, at
        /// insertion time; served verbatim by `open_bytes`
        encoded: Vec<u8>,
    },
}

/// In-memory feature store used by the binary and the test suite
#[derive(Default)]
pub struct MemoryFeatureStore {
    documents: RwLock<HashMap<String, HashMap<String, Stored>>>,
}

impl MemoryFeatureStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Persist an opaque byte feature
    pub fn insert_packed(&self, document: &str, key: &str, bytes: Vec<u8>) {
        self.insert(document, key, Stored::Packed(bytes));
    }

    /// Persist a fixed-rate series with the given frame duration
    pub fn insert_series(&self, document: &str, key: &str, array: NdArray, frame_duration_ps: i64) {
        self.insert(
            document,
            key,
            Stored::Series {
                array,
                // A frame must cover a nonzero span of time.
                frame_duration_ps: frame_duration_ps.max(1),
            },
        );
    }

    /// Persist an audio feature, encoding it once for byte-stream access
    pub fn insert_audio(&self, document: &str, key: &str, window: AudioWindow) -> Result<()> {
        let encoded = audio::encode(&window)?;
        self.insert(document, key, Stored::Audio { window, encoded });
        Ok(())
    }

    fn insert(&self, document: &str, key: &str, value: Stored) {
        let mut documents = self.documents.write().unwrap_or_else(|e| e.into_inner());
        documents
            .entry(document.to_string())
            .or_default()
            .insert(key.to_string(), value);
    }

    fn with_feature<T>(
        &self,
        document: &str,
        feature: &FeatureSpec,
        f: impl FnOnce(&Stored) -> Result<T>,
    ) -> Result<T> {
        let documents = self.documents.read().unwrap_or_else(|e| e.into_inner());
        let doc = documents
            .get(document)
            .ok_or_else(|| ServeError::NotFound(format!("document '{}'", document)))?;
        let stored = doc.get(&feature.key).ok_or_else(|| {
            ServeError::NotFound(format!("feature '{}' of document '{}'", feature.key, document))
        })?;
        f(stored)
    }
}

impl FeatureStore for MemoryFeatureStore {
    fn contains_document(&self, id: &str) -> bool {
        let documents = self.documents.read().unwrap_or_else(|e| e.into_inner());
        documents.contains_key(id)
    }

    fn open_bytes(&self, document: &str, feature: &FeatureSpec) -> Result<Box<dyn FeatureReader>> {
        self.with_feature(document, feature, |stored| {
            let bytes: Vec<u8> = match stored {
                Stored::Packed(bytes) => bytes.clone(),
                Stored::Audio { encoded, .. } => encoded.clone(),
                // Fixed-rate frames stream as packed little-endian f64.
                Stored::Series { array, .. } => array
                    .data()
                    .iter()
                    .flat_map(|v| v.to_le_bytes())
                    .collect(),
            };
            Ok(Box::new(Cursor::new(bytes)) as Box<dyn FeatureReader>)
        })
    }

    fn read_series(
        &self,
        document: &str,
        feature: &FeatureSpec,
        window: &TimeSlice,
    ) -> Result<NdArray> {
        self.with_feature(document, feature, |stored| {
            let (array, frame_duration_ps) = match stored {
                Stored::Series {
                    array,
                    frame_duration_ps,
                } => (array, *frame_duration_ps),
                _ => {
                    return Err(ServeError::Internal(format!(
                        "feature '{}' is not a fixed-rate series",
                        feature.key
                    )))
                }
            };

            if window.start_ps < 0 {
                return Err(ServeError::UnsatisfiableRange(format!(
                    "negative start {}ps",
                    window.start_ps
                )));
            }

            let frames = array.frames() as i64;
            let start = window.start_ps / frame_duration_ps;
            if start > frames {
                return Err(ServeError::UnsatisfiableRange(format!(
                    "window starts at frame {} of {}",
                    start, frames
                )));
            }

            let count = match window.duration_ps {
                // Round the window end up to a whole frame.
                Some(d) => ((d + frame_duration_ps - 1) / frame_duration_ps).min(frames - start),
                None => frames - start,
            };
            Ok(array.frame_window(start as usize, count.max(0) as usize))
        })
    }

    fn read_audio(
        &self,
        document: &str,
        feature: &FeatureSpec,
        window: &TimeSlice,
    ) -> Result<AudioWindow> {
        self.with_feature(document, feature, |stored| {
            let audio = match stored {
                Stored::Audio { window, .. } => window,
                _ => {
                    return Err(ServeError::Internal(format!(
                        "feature '{}' is not audio",
                        feature.key
                    )))
                }
            };

            if window.start_ps < 0 {
                return Err(ServeError::UnsatisfiableRange(format!(
                    "negative start {}ps",
                    window.start_ps
                )));
            }

            let rate = audio.sample_rate as f64;
            let frames = audio.frames() as i64;
            let start = (window.start_seconds() * rate).round() as i64;
            if start > frames {
                return Err(ServeError::UnsatisfiableRange(format!(
                    "window starts at sample {} of {}",
                    start, frames
                )));
            }

            let count = match window.duration_seconds() {
                Some(d) => ((d * rate).round() as i64).min(frames - start),
                None => frames - start,
            };

            let channels = audio.channels as usize;
            let begin = start as usize * channels;
            let end = begin + count.max(0) as usize * channels;
            Ok(AudioWindow {
                samples: audio.samples[begin..end].to_vec(),
                channels: audio.channels,
                sample_rate: audio.sample_rate,
            })
        })
    }
}
