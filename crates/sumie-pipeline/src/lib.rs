//! sumie-pipeline: raster-to-vector conversion core (sans-IO).
//!
//! Turns a decoded RGBA bitmap into filled vector path primitives
//! approximating the image's color regions:
//! color-layer extraction -> contour tracing -> path building.
//!
//! Stages live in a runtime-mutable [`Pipeline`], so callers can swap or
//! omit stages (fast previews, alternative extractors) and re-run the
//! same pipeline with adjusted settings in an iterative refinement loop.
//!
//! This crate has **no I/O dependencies** -- it operates on in-memory
//! pixel buffers and returns structured data. Decoding, serialization to
//! SVG text, and refinement of that text live in downstream crates.

pub mod layers;
pub mod paths;
pub mod pipeline;
pub mod trace;
pub mod types;

pub use layers::ColorLayerStage;
pub use paths::PathBuildStage;
pub use pipeline::{InsertOutcome, Pipeline, PipelineStage};
pub use trace::ContourTraceStage;
pub use types::{
    ColorLayer, ColorRgb, Contour, ContourMap, ConversionSettings, PathElement, PipelineContext,
    PipelineError, Point, Polyline, RgbaImage, StageError,
};

/// Run the default conversion pipeline over a decoded image.
///
/// Builds the three-stage pipeline (color-layer extraction, contour
/// tracing, path building), executes it against a fresh context, and
/// returns the terminal path list.
///
/// # Pipeline steps
///
/// 1. Quantize pixels into per-color layers (`color_simplification`)
/// 2. Trace and simplify each layer's region boundaries (`complexity`)
/// 3. Render contours into filled path elements (`path_smoothing`)
///
/// An image whose regions all fall below the detail threshold yields an
/// empty path list; that is a valid outcome, not an error.
///
/// # Errors
///
/// Returns [`PipelineError::Stage`] if any stage fails.
pub fn convert(
    image: RgbaImage,
    settings: ConversionSettings,
) -> Result<Vec<PathElement>, PipelineError> {
    let context = Pipeline::with_default_stages()
        .execute(PipelineContext::new(image, settings))?;
    Ok(context.paths.unwrap_or_default())
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    /// 4x4 white image with a 2x2 black square at pixels (1,1)-(2,2).
    fn black_square_on_white() -> RgbaImage {
        RgbaImage::from_fn(4, 4, |x, y| {
            if (1..=2).contains(&x) && (1..=2).contains(&y) {
                image::Rgba([0, 0, 0, 255])
            } else {
                image::Rgba([255, 255, 255, 255])
            }
        })
    }

    #[test]
    fn tiny_image_prunes_everything_at_default_detail() {
        // With settings 0.5 across the board the detail threshold is
        // max(2, 50 - 0.5 * 45) = 28. The 4-pixel black region and the
        // 12-pixel white border both fall below it, so the conversion
        // legitimately produces no paths.
        let settings = ConversionSettings::new(0.5, 0.5, 0.5);
        let paths = convert(black_square_on_white(), settings).unwrap();
        assert!(paths.is_empty());
    }

    #[test]
    fn tiny_image_context_records_all_pruned_outcome() {
        let settings = ConversionSettings::new(0.5, 0.5, 0.5);
        let context = Pipeline::with_default_stages()
            .execute(PipelineContext::new(black_square_on_white(), settings))
            .unwrap();

        assert_eq!(context.metadata["trace.min_size"], serde_json::json!(28));
        assert_eq!(context.metadata["trace.contour_count"], serde_json::json!(0));
        // Both color layers exist; the contour map is empty, not absent.
        assert_eq!(context.metadata["layers.count"], serde_json::json!(2));
        assert!(context.contours.unwrap().is_empty());
        assert_eq!(context.paths.unwrap(), Vec::new());
    }

    #[test]
    fn large_regions_survive_at_full_complexity() {
        // A 16x16 half-black half-white image at complexity 1.0
        // (threshold 5) produces a filled path for each region.
        let image = RgbaImage::from_fn(16, 16, |x, _| {
            if x < 8 {
                image::Rgba([0, 0, 0, 255])
            } else {
                image::Rgba([255, 255, 255, 255])
            }
        });
        let settings = ConversionSettings::new(1.0, 0.5, 0.0);
        let paths = convert(image, settings).unwrap();

        assert_eq!(paths.len(), 2);
        for path in &paths {
            assert!(path.d.starts_with('M'), "path data: {}", path.d);
            assert!(path.fill.starts_with('#'));
        }
    }

    #[test]
    fn rerunning_with_adjusted_settings_uses_fresh_context() {
        // Iterative-caller pattern: same pipeline, new context per pass.
        let pipeline = Pipeline::with_default_stages();
        let image = black_square_on_white();

        let coarse = pipeline
            .execute(PipelineContext::new(
                image.clone(),
                ConversionSettings::new(0.5, 0.5, 0.5),
            ))
            .unwrap();
        let fine = pipeline
            .execute(PipelineContext::new(
                image,
                ConversionSettings::new(1.0, 0.5, 0.5),
            ))
            .unwrap();

        assert_eq!(coarse.metadata["trace.min_size"], serde_json::json!(28));
        assert_eq!(fine.metadata["trace.min_size"], serde_json::json!(5));
        // At threshold 5 the 12-pixel white frame survives.
        assert!(fine.metadata["trace.contour_count"] != serde_json::json!(0));
    }
}
