//! Integration test: convert a synthetic two-color image end to end and
//! refine the serialized output.

#![allow(clippy::unwrap_used, clippy::expect_used)]

use sumie_pipeline::{ConversionSettings, RgbaImage, convert};
use sumie_svg::{BorderStyle, RefineOptions, SvgMetadata, refine, to_svg};

/// 48x48 white canvas with a centered 16x16 red square.
///
/// Large enough that the white region's boundary polygon covers more
/// than 95% of the view box, so refinement treats it as background.
fn red_square_on_white() -> RgbaImage {
    RgbaImage::from_fn(48, 48, |x, y| {
        if (16..32).contains(&x) && (16..32).contains(&y) {
            image::Rgba([255, 0, 0, 255])
        } else {
            image::Rgba([255, 255, 255, 255])
        }
    })
}

#[test]
fn red_square_pipeline_to_refined_svg() {
    // Full complexity keeps both regions; zero smoothing keeps the path
    // data polygonal so the background heuristic can judge it.
    let settings = ConversionSettings::new(1.0, 0.5, 0.0);
    let paths = convert(red_square_on_white(), settings).unwrap();
    eprintln!("pipeline produced {} paths", paths.len());
    assert_eq!(paths.len(), 2, "one white region, one red region");

    let metadata = SvgMetadata {
        title: Some("red-square"),
        description: Some("complexity=1.0 colors=0.5 smoothing=0.0"),
    };
    let svg = to_svg(&paths, 48, 48, &metadata);
    assert!(svg.contains("<title>red-square</title>"));
    assert!(svg.contains(r#"viewBox="0 0 48 48""#));
    assert_eq!(svg.matches("<path").count(), 2);

    // At 17 quantization levels white snaps to #f8f8f8 and red to
    // #f80707 -- near-white background, clearly-red foreground.
    assert!(svg.contains(r##"fill="#f8f8f8""##), "svg: {svg}");
    assert!(svg.contains(r##"fill="#f80707""##), "svg: {svg}");

    let refined = refine(&svg, &RefineOptions::default()).unwrap();
    eprintln!("refined from {} to {} bytes", svg.len(), refined.len());

    // The full-canvas white region was removed as background; the red
    // square survived.
    assert_eq!(refined.matches("<path").count(), 1);
    assert!(!refined.contains("#f8f8f8"), "background gone: {refined}");
    assert!(refined.contains("#f80707"));
}

#[test]
fn refined_output_with_border_overlay() {
    let settings = ConversionSettings::new(1.0, 0.5, 0.0);
    let paths = convert(red_square_on_white(), settings).unwrap();
    let svg = to_svg(&paths, 48, 48, &SvgMetadata::default());

    let options = RefineOptions {
        border: Some(BorderStyle::Circle {
            stroke: "#333333".to_owned(),
            width: 2.0,
        }),
        ..RefineOptions::default()
    };
    let refined = refine(&svg, &options).unwrap();

    // The view box gained the fixed 8-unit padding on every side.
    assert!(refined.contains(r#"viewBox="-8 -8 64 64""#), "refined: {refined}");
    assert!(refined.contains("<circle"), "refined: {refined}");
    assert!(refined.contains(r##"stroke="#333333""##));
}

#[test]
fn smoothed_output_serializes_quadratics() {
    let settings = ConversionSettings::new(1.0, 0.5, 1.0);
    let paths = convert(red_square_on_white(), settings).unwrap();
    let svg = to_svg(&paths, 48, 48, &SvgMetadata::default());
    assert!(svg.contains('Q'), "expected quadratic commands: {svg}");
}
