//! Audio container encoding
//!
//! Turns a raw sample window into a compressed FLAC stream, in memory. Each
//! call owns its encoder state; nothing is shared between requests.

use crate::error::{Result, ServeError};
use crate::features::AudioWindow;
use flacenc::bitsink::ByteSink;
use flacenc::component::BitRepr;
use flacenc::error::Verify;

const BITS_PER_SAMPLE: usize = 16;

/// Encode a sample window into a FLAC container
pub fn encode(window: &AudioWindow) -> Result<Vec<u8>> {
    if window.samples.is_empty() {
        return Err(ServeError::Encode("empty sample window".to_string()));
    }
    if window.channels == 0 {
        return Err(ServeError::Encode("zero channels".to_string()));
    }

    let scale = ((1i32 << (BITS_PER_SAMPLE - 1)) - 1) as f32;
    let samples: Vec<i32> = window
        .samples
        .iter()
        .map(|s| (s.clamp(-1.0, 1.0) * scale).round() as i32)
        .collect();

    let config = flacenc::config::Encoder::default()
        .into_verified()
        .map_err(|e| ServeError::Encode(format!("invalid encoder config: {:?}", e)))?;
    let source = flacenc::source::MemSource::from_samples(
        &samples,
        window.channels as usize,
        BITS_PER_SAMPLE,
        window.sample_rate as usize,
    );
    let stream = flacenc::encode_with_fixed_block_size(&config, source, config.block_size)
        .map_err(|e| ServeError::Encode(format!("{:?}", e)))?;

    let mut sink = ByteSink::new();
    stream
        .write(&mut sink)
        .map_err(|e| ServeError::Encode(format!("{:?}", e)))?;
    Ok(sink.as_slice().to_vec())
}
