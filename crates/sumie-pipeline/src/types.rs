//! Shared types for the sumie conversion pipeline.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

/// Re-export `RgbaImage` so downstream crates can hold the decoded
/// source image without depending on `image` directly.
pub use image::RgbaImage;

/// A 2D point in image coordinates.
///
/// Coordinates are integer-valued while a region boundary is being
/// traced and become fractional after simplification and smoothing.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Point {
    /// Horizontal position (pixels from left edge).
    pub x: f64,
    /// Vertical position (pixels from top edge).
    pub y: f64,
}

impl Point {
    /// Create a new point.
    #[must_use]
    pub const fn new(x: f64, y: f64) -> Self {
        Self { x, y }
    }

    /// Squared Euclidean distance to another point.
    ///
    /// Avoids the square root for comparison purposes.
    #[must_use]
    pub fn distance_squared(self, other: Self) -> f64 {
        let dx = self.x - other.x;
        let dy = self.y - other.y;
        dx.mul_add(dx, dy * dy)
    }

    /// Euclidean distance to another point.
    #[must_use]
    pub fn distance(self, other: Self) -> f64 {
        self.distance_squared(other).sqrt()
    }
}

/// A sequence of connected points forming a path segment.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Polyline(Vec<Point>);

impl Polyline {
    /// Create a new polyline from a vector of points.
    #[must_use]
    pub const fn new(points: Vec<Point>) -> Self {
        Self(points)
    }

    /// Returns `true` if the polyline has no points.
    #[must_use]
    pub const fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Returns the number of points in the polyline.
    #[must_use]
    pub const fn len(&self) -> usize {
        self.0.len()
    }

    /// Returns the first point, if any.
    #[must_use]
    pub fn first(&self) -> Option<&Point> {
        self.0.first()
    }

    /// Returns the last point, if any.
    #[must_use]
    pub fn last(&self) -> Option<&Point> {
        self.0.last()
    }

    /// Returns a slice of all points.
    #[must_use]
    pub fn points(&self) -> &[Point] {
        &self.0
    }

    /// Consumes the polyline and returns the underlying vector of points.
    #[must_use]
    pub fn into_points(self) -> Vec<Point> {
        self.0
    }
}

/// An RGBA color with 0-255 channels.
///
/// Implements `Ord`/`Hash` so quantized colors can key the contour map
/// deterministically.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct ColorRgb {
    /// Red channel.
    pub r: u8,
    /// Green channel.
    pub g: u8,
    /// Blue channel.
    pub b: u8,
    /// Alpha channel.
    pub a: u8,
}

impl ColorRgb {
    /// Create a fully opaque color.
    #[must_use]
    pub const fn opaque(r: u8, g: u8, b: u8) -> Self {
        Self { r, g, b, a: 255 }
    }

    /// Euclidean distance between two colors in RGB space.
    ///
    /// Alpha is ignored; the pipeline makes no claim to perceptual
    /// color-space correctness beyond plain RGB distance.
    #[must_use]
    pub fn distance(self, other: Self) -> f64 {
        let dr = f64::from(self.r) - f64::from(other.r);
        let dg = f64::from(self.g) - f64::from(other.g);
        let db = f64::from(self.b) - f64::from(other.b);
        db.mul_add(db, dr.mul_add(dr, dg * dg)).sqrt()
    }

    /// Format as a `#rrggbb` hex string (alpha is not emitted).
    #[must_use]
    pub fn to_hex(self) -> String {
        format!("#{:02x}{:02x}{:02x}", self.r, self.g, self.b)
    }

    /// Parse a CSS-style color value as produced by SVG serializers.
    ///
    /// Supports `#rgb`, `#rrggbb`, `rgb(r, g, b)`, and the `white` /
    /// `black` keywords. Returns `None` for `none`, gradients, and
    /// anything else unrecognized.
    #[must_use]
    pub fn parse_css(value: &str) -> Option<Self> {
        let value = value.trim();
        match value.to_ascii_lowercase().as_str() {
            "white" => return Some(Self::opaque(255, 255, 255)),
            "black" => return Some(Self::opaque(0, 0, 0)),
            _ => {}
        }
        if let Some(hex) = value.strip_prefix('#') {
            return Self::parse_hex(hex);
        }
        if let Some(body) = value
            .strip_prefix("rgb(")
            .and_then(|rest| rest.strip_suffix(')'))
        {
            let mut channels = body.split(',').map(|c| c.trim().parse::<u8>().ok());
            let r = channels.next().flatten()?;
            let g = channels.next().flatten()?;
            let b = channels.next().flatten()?;
            if channels.next().is_some() {
                return None;
            }
            return Some(Self::opaque(r, g, b));
        }
        None
    }

    /// Parse the body of a `#rgb` or `#rrggbb` hex color.
    #[allow(clippy::cast_possible_truncation)]
    fn parse_hex(hex: &str) -> Option<Self> {
        match hex.len() {
            3 => {
                let mut digits = hex.chars().map(|c| c.to_digit(16));
                let r = digits.next().flatten()?;
                let g = digits.next().flatten()?;
                let b = digits.next().flatten()?;
                Some(Self::opaque(
                    (r * 17) as u8,
                    (g * 17) as u8,
                    (b * 17) as u8,
                ))
            }
            6 => {
                let r = u8::from_str_radix(hex.get(0..2)?, 16).ok()?;
                let g = u8::from_str_radix(hex.get(2..4)?, 16).ok()?;
                let b = u8::from_str_radix(hex.get(4..6)?, 16).ok()?;
                Some(Self::opaque(r, g, b))
            }
            _ => None,
        }
    }
}

/// A pixel mask isolating the pixels assigned to one quantized color.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ColorLayer {
    /// The quantized color shared by every pixel in this layer.
    pub color: ColorRgb,
    /// Row-major membership mask; length equals `width * height` of the
    /// source image. `true` marks a pixel belonging to this layer.
    pub pixels: Vec<bool>,
    /// Number of `true` entries in `pixels`.
    pub area: usize,
}

/// An ordered polyline approximating one traced region boundary.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Contour {
    /// The simplified boundary polyline.
    pub points: Polyline,
    /// Whether the boundary loops back on itself (endpoints within
    /// [`CLOSE_DISTANCE`](crate::trace::CLOSE_DISTANCE) pixels).
    pub closed: bool,
    /// Unsigned enclosed area via the shoelace formula.
    pub area: f64,
}

/// The terminal vector output unit: path data plus styling.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PathElement {
    /// SVG path data (`M`/`L`/`Q`/`Z` commands).
    pub d: String,
    /// Fill color as a CSS value (`#rrggbb`).
    pub fill: String,
    /// Optional stroke color.
    pub stroke: Option<String>,
    /// Optional stroke width in user units.
    pub stroke_width: Option<f64>,
    /// Optional opacity in `[0, 1]`.
    pub opacity: Option<f64>,
}

impl PathElement {
    /// Create a filled path with no stroke or opacity.
    #[must_use]
    pub const fn filled(d: String, fill: String) -> Self {
        Self {
            d,
            fill,
            stroke: None,
            stroke_width: None,
            opacity: None,
        }
    }
}

/// User-facing conversion settings, each normalized to `[0, 1]`.
///
/// Callers are expected to pre-clamp; [`ConversionSettings::new`] clamps
/// again as defense-in-depth so out-of-range values can never drive the
/// threshold formulas negative.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ConversionSettings {
    /// Detail retention. Higher values lower the minimum contour size,
    /// keeping smaller features.
    pub complexity: f64,
    /// Color clustering coarseness. Higher values produce fewer, coarser
    /// color layers.
    pub color_simplification: f64,
    /// Path smoothing amount, consumed when contours are rendered into
    /// path data (0 = polygonal, 1 = fully rounded corners).
    pub path_smoothing: f64,
}

impl ConversionSettings {
    /// Default value for every setting.
    pub const DEFAULT: f64 = 0.5;

    /// Create settings, clamping each field to `[0, 1]`.
    #[must_use]
    pub fn new(complexity: f64, color_simplification: f64, path_smoothing: f64) -> Self {
        Self {
            complexity: complexity.clamp(0.0, 1.0),
            color_simplification: color_simplification.clamp(0.0, 1.0),
            path_smoothing: path_smoothing.clamp(0.0, 1.0),
        }
    }
}

impl Default for ConversionSettings {
    fn default() -> Self {
        Self {
            complexity: Self::DEFAULT,
            color_simplification: Self::DEFAULT,
            path_smoothing: Self::DEFAULT,
        }
    }
}

/// Contours grouped by the quantized color of their source layer.
///
/// `BTreeMap` keeps color keys in a deterministic order so downstream
/// output is reproducible run-to-run.
pub type ContourMap = BTreeMap<ColorRgb, Vec<Contour>>;

/// The mutable state threaded through one conversion attempt.
///
/// A context is created once per attempt, privately owned by it, and
/// consumed by [`Pipeline::execute`](crate::Pipeline::execute); it is
/// never shared between attempts. Stages read the fields earlier stages
/// populated and add their own:
///
/// - `color_layers` is `Some` only after layer extraction has run;
/// - `contours` requires `color_layers`;
/// - `paths` requires `contours`.
///
/// Stages enforce this ordering by failing fast with
/// [`StageError::Configuration`] instead of computing missing
/// prerequisites implicitly.
#[derive(Debug, Clone)]
pub struct PipelineContext {
    /// The decoded source image (RGBA, 0-255 per channel).
    pub image: RgbaImage,
    /// Settings for this conversion attempt.
    pub settings: ConversionSettings,
    /// Per-color pixel masks, populated by layer extraction.
    pub color_layers: Option<Vec<ColorLayer>>,
    /// Traced contours per color key, populated by contour tracing.
    pub contours: Option<ContourMap>,
    /// Terminal vector output, populated by path building.
    pub paths: Option<Vec<PathElement>>,
    /// Free-form per-stage diagnostics. Not consumed by any stage.
    pub metadata: BTreeMap<String, serde_json::Value>,
}

impl PipelineContext {
    /// Create a context from an already-decoded image.
    #[must_use]
    pub fn new(image: RgbaImage, settings: ConversionSettings) -> Self {
        Self {
            image,
            settings,
            color_layers: None,
            contours: None,
            paths: None,
            metadata: BTreeMap::new(),
        }
    }

    /// Create a context from a raw RGBA buffer.
    ///
    /// # Errors
    ///
    /// Returns [`PipelineError::InvalidImage`] if `data.len()` is not
    /// `width * height * 4`.
    pub fn from_raw(
        width: u32,
        height: u32,
        data: Vec<u8>,
        settings: ConversionSettings,
    ) -> Result<Self, PipelineError> {
        let expected = width as usize * height as usize * 4;
        let actual = data.len();
        let image = RgbaImage::from_raw(width, height, data).ok_or_else(|| {
            PipelineError::InvalidImage(format!(
                "buffer length {actual} does not match {width}x{height} RGBA ({expected} bytes)"
            ))
        })?;
        Ok(Self::new(image, settings))
    }

    /// Source image width in pixels.
    #[must_use]
    pub fn width(&self) -> u32 {
        self.image.width()
    }

    /// Source image height in pixels.
    #[must_use]
    pub fn height(&self) -> u32 {
        self.image.height()
    }

    /// Record a diagnostic value under the given key.
    pub fn record(&mut self, key: &str, value: serde_json::Value) {
        self.metadata.insert(key.to_owned(), value);
    }
}

/// Error raised inside a single pipeline stage.
#[derive(Debug, thiserror::Error)]
pub enum StageError {
    /// A stage precondition was violated (e.g. contour tracing invoked
    /// before layer extraction). Fatal; never retried internally.
    #[error("configuration error: {0}")]
    Configuration(String),

    /// The stage itself failed while processing.
    #[error("{0}")]
    Failed(String),
}

/// Errors that can abort a conversion attempt.
#[derive(Debug, thiserror::Error)]
pub enum PipelineError {
    /// A raw pixel buffer did not match its declared dimensions.
    #[error("invalid image buffer: {0}")]
    InvalidImage(String),

    /// A stage failed; embeds the failing stage's name and the original
    /// error. The partially-mutated context is dropped, never returned.
    #[error("stage '{stage}' failed: {source}")]
    Stage {
        /// Name of the failing stage.
        stage: String,
        /// The stage's original error.
        #[source]
        source: StageError,
    },
}
