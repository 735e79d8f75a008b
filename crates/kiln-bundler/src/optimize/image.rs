//! Raster recompression.
//!
//! - JPEG: transcoded losslessly to progressive encoding.
//! - GIF: frames rewritten interlaced with their palettes, timing and loop
//!   count untouched.
//! - PNG: quantized to a 256-entry palette, kept only while the error
//!   stays within [`PNG_MIN_PSNR`]; otherwise recompressed losslessly.
//!
//! PNG and SVG results are returned only when smaller than the input.
//! JPEG and GIF rewrites are lossless and always returned.

use std::borrow::Cow;
use std::io::Cursor;

use color_quant::NeuQuant;
use image::codecs::png::{CompressionType, FilterType, PngEncoder};
use image::{DynamicImage, ImageFormat, RgbaImage};
use rustc_hash::FxHashMap;

/// Palette size used when quantizing PNGs.
pub const PNG_PALETTE_SIZE: usize = 256;
/// NeuQuant sampling factor: 1 is best, 30 fastest.
pub const PNG_QUANT_SAMPLING: i32 = 10;
/// Quantized PNGs whose peak signal-to-noise ratio falls below this many
/// decibels are recompressed losslessly instead.
pub const PNG_MIN_PSNR: f64 = 32.0;

/// Recompress `bytes` according to `ext` (with leading dot). `Ok(None)`
/// keeps the input as it is.
pub fn recompress(ext: &str, bytes: &[u8]) -> Result<Option<Vec<u8>>, String> {
    let out = match ext {
        ".png" => Some(recompress_png(bytes)?),
        ".jpg" | ".jpeg" => return super::jpeg::to_progressive(bytes),
        ".gif" => return recompress_gif(bytes).map(Some),
        ".svg" => Some(super::svg::optimize_svg(bytes)?),
        _ => None,
    };
    Ok(out.filter(|out| out.len() < bytes.len()))
}

fn recompress_png(bytes: &[u8]) -> Result<Vec<u8>, String> {
    let img = image::load_from_memory_with_format(bytes, ImageFormat::Png)
        .map_err(|e| format!("failed to decode PNG image: {e}"))?;
    let rgba = img.to_rgba8();

    match quantize(&rgba) {
        Some(palette) => encode_indexed(&rgba, &palette),
        None => encode_lossless(&img),
    }
}

/// A palette and per-pixel indices into it.
struct Indexed {
    colors: Vec<[u8; 4]>,
    indices: Vec<u8>,
}

/// Exact palette when the image has few enough colors, otherwise NeuQuant.
/// `None` when quantization would exceed the error bound.
fn quantize(rgba: &RgbaImage) -> Option<Indexed> {
    if let Some(exact) = exact_palette(rgba) {
        return Some(exact);
    }

    let quant = NeuQuant::new(PNG_QUANT_SAMPLING, PNG_PALETTE_SIZE, rgba.as_raw());
    let colors: Vec<[u8; 4]> = quant
        .color_map_rgba()
        .chunks_exact(4)
        .map(|c| [c[0], c[1], c[2], c[3]])
        .collect();
    let indices: Vec<u8> = rgba
        .pixels()
        .map(|p| quant.index_of(&p.0) as u8)
        .collect();

    let indexed = Indexed { colors, indices };
    (psnr(rgba, &indexed) >= PNG_MIN_PSNR).then_some(indexed)
}

fn exact_palette(rgba: &RgbaImage) -> Option<Indexed> {
    let mut lookup: FxHashMap<[u8; 4], u8> = FxHashMap::default();
    let mut colors = Vec::new();
    let mut indices = Vec::with_capacity(rgba.pixels().len());
    for pixel in rgba.pixels() {
        let index = match lookup.get(&pixel.0) {
            Some(&index) => index,
            None => {
                if colors.len() == PNG_PALETTE_SIZE {
                    return None;
                }
                let index = colors.len() as u8;
                colors.push(pixel.0);
                lookup.insert(pixel.0, index);
                index
            }
        };
        indices.push(index);
    }
    Some(Indexed { colors, indices })
}

/// Peak signal-to-noise ratio of the quantized image over all channels.
fn psnr(rgba: &RgbaImage, indexed: &Indexed) -> f64 {
    let mut squared = 0u64;
    for (pixel, &index) in rgba.pixels().zip(&indexed.indices) {
        let Some(color) = indexed.colors.get(usize::from(index)) else {
            return 0.0;
        };
        for (a, b) in pixel.0.iter().zip(color) {
            let d = i64::from(*a) - i64::from(*b);
            squared += (d * d) as u64;
        }
    }
    let samples = (indexed.indices.len() * 4).max(1) as f64;
    let mse = squared as f64 / samples;
    if mse == 0.0 {
        return f64::INFINITY;
    }
    10.0 * (255.0 * 255.0 / mse).log10()
}

fn encode_indexed(rgba: &RgbaImage, indexed: &Indexed) -> Result<Vec<u8>, String> {
    let palette: Vec<u8> = indexed.colors.iter().flat_map(|c| [c[0], c[1], c[2]]).collect();
    let alpha: Vec<u8> = indexed.colors.iter().map(|c| c[3]).collect();

    let mut out = Vec::new();
    {
        let mut encoder = png::Encoder::new(&mut out, rgba.width(), rgba.height());
        encoder.set_color(png::ColorType::Indexed);
        encoder.set_depth(png::BitDepth::Eight);
        encoder.set_palette(palette);
        if alpha.iter().any(|&a| a != u8::MAX) {
            encoder.set_trns(alpha);
        }
        encoder.set_compression(png::Compression::High);
        encoder.set_filter(png::Filter::NoFilter);
        let mut writer = encoder
            .write_header()
            .map_err(|e| format!("failed to encode PNG: {e}"))?;
        writer
            .write_image_data(&indexed.indices)
            .map_err(|e| format!("failed to encode PNG: {e}"))?;
        writer
            .finish()
            .map_err(|e| format!("failed to encode PNG: {e}"))?;
    }
    Ok(out)
}

fn encode_lossless(img: &DynamicImage) -> Result<Vec<u8>, String> {
    let mut out = Vec::new();
    let encoder =
        PngEncoder::new_with_quality(&mut out, CompressionType::Best, FilterType::Adaptive);
    img.write_with_encoder(encoder)
        .map_err(|e| format!("failed to encode PNG: {e}"))?;
    Ok(out)
}

fn recompress_gif(bytes: &[u8]) -> Result<Vec<u8>, String> {
    let mut options = gif::DecodeOptions::new();
    options.set_color_output(gif::ColorOutput::Indexed);
    let mut decoder = options
        .read_info(Cursor::new(bytes))
        .map_err(|e| format!("failed to decode GIF: {e}"))?;

    let mut frames = Vec::new();
    while let Some(frame) = decoder
        .read_next_frame()
        .map_err(|e| format!("failed to decode GIF frames: {e}"))?
    {
        frames.push(frame.clone());
    }
    if frames.is_empty() {
        return Err("GIF has no frames".to_string());
    }

    let repeat = decoder.repeat();
    let palette = decoder.global_palette().unwrap_or_default().to_vec();
    let mut out = Vec::new();
    {
        let mut encoder = gif::Encoder::new(&mut out, decoder.width(), decoder.height(), &palette)
            .map_err(|e| format!("failed to encode GIF: {e}"))?;
        // `Finite(0)` means the source had no loop extension; none is written.
        encoder
            .set_repeat(repeat)
            .map_err(|e| format!("failed to encode GIF: {e}"))?;
        for mut frame in frames {
            let rows = interlace(&frame.buffer, usize::from(frame.width), usize::from(frame.height));
            frame.buffer = Cow::Owned(rows);
            frame.interlaced = true;
            encoder
                .write_frame(&frame)
                .map_err(|e| format!("failed to encode GIF: {e}"))?;
        }
    }
    Ok(out)
}

/// Reorder rows into the four GIF interlace passes.
fn interlace(buffer: &[u8], width: usize, height: usize) -> Vec<u8> {
    let mut out = Vec::with_capacity(buffer.len());
    for (first, step) in [(0, 8), (4, 8), (2, 4), (1, 2)] {
        for row in (first..height).step_by(step) {
            if let Some(line) = buffer.get(row * width..(row + 1) * width) {
                out.extend_from_slice(line);
            }
        }
    }
    out
}
