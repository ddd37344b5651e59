//! Numeric-array rendering
//!
//! Turns a fetched or computed array into PNG bytes: rank 1 draws a line
//! plot, rank 2 draws a rotated log-scale grayscale matrix (time along the
//! horizontal axis, axes hidden, tight bounds), anything higher is rejected.
//! Every invocation draws into its own freshly-allocated buffer; there is no
//! shared drawing context between requests.

use crate::context::TempResult;
use crate::error::{Result, ServeError};
use crate::features::{NdArray, IMAGE_CONTENT_TYPE};
use image::ImageEncoder;
use plotters::prelude::*;

const WIDTH: u32 = 640;
const HEIGHT: u32 = 480;

/// Render an array as a PNG image
pub fn generate_image(array: &NdArray) -> Result<TempResult> {
    let pixels = match array.rank() {
        1 => line_plot(array.data())?,
        2 => matrix_plot(array)?,
        rank => return Err(ServeError::UnsupportedRank(rank)),
    };
    Ok(TempResult::new(encode_png(&pixels)?, IMAGE_CONTENT_TYPE))
}

fn render_err<E: std::fmt::Display>(e: E) -> ServeError {
    ServeError::Render(e.to_string())
}

fn line_plot(data: &[f64]) -> Result<Vec<u8>> {
    let mut pixels = vec![0u8; (WIDTH * HEIGHT * 3) as usize];
    {
        let root = BitMapBackend::with_buffer(&mut pixels, (WIDTH, HEIGHT)).into_drawing_area();
        root.fill(&WHITE).map_err(render_err)?;

        if !data.is_empty() {
            let (mut lo, mut hi) = data.iter().fold((f64::MAX, f64::MIN), |(lo, hi), v| {
                (lo.min(*v), hi.max(*v))
            });
            if lo >= hi {
                // Constant signals still need a non-degenerate vertical range.
                lo -= 1.0;
                hi += 1.0;
            }
            let x_max = (data.len() - 1).max(1) as f64;

            let mut chart = ChartBuilder::on(&root)
                .margin(8)
                .build_cartesian_2d(0f64..x_max, lo..hi)
                .map_err(render_err)?;
            chart
                .draw_series(LineSeries::new(
                    data.iter().enumerate().map(|(i, v)| (i as f64, *v)),
                    &BLUE,
                ))
                .map_err(render_err)?;
        }

        root.present().map_err(render_err)?;
    }
    Ok(pixels)
}

fn matrix_plot(array: &NdArray) -> Result<Vec<u8>> {
    let frames = array.frames();
    let bins = array.frame_width();

    let mut pixels = vec![0u8; (WIDTH * HEIGHT * 3) as usize];
    {
        let root = BitMapBackend::with_buffer(&mut pixels, (WIDTH, HEIGHT)).into_drawing_area();
        root.fill(&WHITE).map_err(render_err)?;

        if frames > 0 && bins > 0 {
            let loudness = |v: f64| (1.0 + v.abs()).ln();
            let peak = array.data().iter().map(|v| loudness(*v)).fold(0.0, f64::max);

            let mut chart = ChartBuilder::on(&root)
                .build_cartesian_2d(0f64..frames as f64, 0f64..bins as f64)
                .map_err(render_err)?;
            chart
                .draw_series((0..frames).flat_map(|t| (0..bins).map(move |b| (t, b))).map(
                    |(t, b)| {
                        let level = if peak > 0.0 {
                            loudness(array.row(t)[b]) / peak
                        } else {
                            0.0
                        };
                        let gray = (level * 255.0) as u8;
                        Rectangle::new(
                            [(t as f64, b as f64), ((t + 1) as f64, (b + 1) as f64)],
                            RGBColor(gray, gray, gray).filled(),
                        )
                    },
                ))
                .map_err(render_err)?;
        }

        root.present().map_err(render_err)?;
    }
    Ok(pixels)
}

fn encode_png(pixels: &[u8]) -> Result<Vec<u8>> {
    let mut out = Vec::new();
    image::codecs::png::PngEncoder::new(&mut out)
        .write_image(pixels, WIDTH, HEIGHT, image::ExtendedColorType::Rgb8)
        .map_err(render_err)?;
    Ok(out)
}
