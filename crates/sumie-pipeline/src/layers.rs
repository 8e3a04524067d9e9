//! Color-layer extraction: split the source image into per-color pixel
//! masks.
//!
//! Each pixel's RGB channels are quantized onto a uniform grid whose
//! resolution follows `settings.color_simplification` (higher → fewer,
//! coarser layers). Pixels sharing a quantized color form one
//! [`ColorLayer`] with a full-image boolean mask.
//!
//! Layers are mutually exclusive per pixel by construction and together
//! cover the whole image. Any other extractor honoring that contract
//! can replace this stage via
//! [`Pipeline::replace_stage`](crate::Pipeline::replace_stage).

use std::collections::BTreeMap;

use crate::pipeline::PipelineStage;
use crate::types::{ColorLayer, ColorRgb, PipelineContext, StageError};

/// Fewest quantization levels per channel (at `color_simplification = 1`).
pub const MIN_LEVELS: u32 = 2;

/// Most quantization levels per channel (at `color_simplification = 0`).
pub const MAX_LEVELS: u32 = 32;

/// Pipeline stage producing [`PipelineContext::color_layers`].
///
/// Stage name: `"color-layers"`.
#[derive(Debug, Clone, Copy, Default)]
pub struct ColorLayerStage;

impl PipelineStage for ColorLayerStage {
    fn name(&self) -> &str {
        "color-layers"
    }

    fn run(&self, context: &mut PipelineContext) -> Result<(), StageError> {
        let levels = quantization_levels(context.settings.color_simplification);
        let layers = extract_layers(context, levels);

        context.record("layers.levels", serde_json::json!(levels));
        context.record("layers.count", serde_json::json!(layers.len()));
        context.color_layers = Some(layers);
        Ok(())
    }
}

/// Map `color_simplification` to a per-channel level count.
///
/// Linear from [`MAX_LEVELS`] at 0.0 down to [`MIN_LEVELS`] at 1.0.
#[must_use]
#[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
pub fn quantization_levels(color_simplification: f64) -> u32 {
    let span = f64::from(MAX_LEVELS - MIN_LEVELS);
    let levels = span.mul_add(-color_simplification.clamp(0.0, 1.0), f64::from(MAX_LEVELS));
    (levels.round() as u32).max(MIN_LEVELS)
}

/// Snap one channel value to the center of its quantization bucket.
#[must_use]
#[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
pub fn quantize_channel(value: u8, levels: u32) -> u8 {
    let step = 256.0 / f64::from(levels.max(1));
    let bucket = (f64::from(value) / step).floor().min(f64::from(levels - 1));
    ((bucket + 0.5) * step).floor().min(255.0) as u8
}

/// Quantize a pixel's RGB channels; alpha is not part of clustering and
/// is normalized to opaque in the layer key.
fn quantize_pixel(pixel: image::Rgba<u8>, levels: u32) -> ColorRgb {
    ColorRgb::opaque(
        quantize_channel(pixel.0[0], levels),
        quantize_channel(pixel.0[1], levels),
        quantize_channel(pixel.0[2], levels),
    )
}

/// Build one mask per quantized color, scanning the image row-major.
fn extract_layers(context: &PipelineContext, levels: u32) -> Vec<ColorLayer> {
    let mask_len = context.width() as usize * context.height() as usize;
    let mut layers: BTreeMap<ColorRgb, ColorLayer> = BTreeMap::new();

    for (index, pixel) in context.image.pixels().enumerate() {
        let color = quantize_pixel(*pixel, levels);
        let layer = layers.entry(color).or_insert_with(|| ColorLayer {
            color,
            pixels: vec![false; mask_len],
            area: 0,
        });
        layer.pixels[index] = true;
        layer.area += 1;
    }

    layers.into_values().collect()
}
