//! Path building: render traced contours into terminal [`PathElement`]s.
//!
//! Each contour becomes one filled path whose data is either polygonal
//! (`M`/`L`/`Z`) or corner-rounded with quadratic midpoint smoothing,
//! depending on `settings.path_smoothing`. Fill color comes from the
//! contour's layer color key.

use std::fmt::Write;

use crate::pipeline::PipelineStage;
use crate::types::{PathElement, PipelineContext, Point, StageError};

/// Decimal places kept when formatting path coordinates.
const COORD_DECIMALS: usize = 2;

/// Pipeline stage producing [`PipelineContext::paths`].
///
/// Stage name: `"paths"`. Requires `contours`; fails with a
/// configuration error when tracing has not run. An empty contour map is
/// valid input (everything was pruned) and yields an empty path list.
#[derive(Debug, Clone, Copy, Default)]
pub struct PathBuildStage;

impl PipelineStage for PathBuildStage {
    fn name(&self) -> &str {
        "paths"
    }

    fn run(&self, context: &mut PipelineContext) -> Result<(), StageError> {
        let contours = context.contours.as_ref().ok_or_else(|| {
            StageError::Configuration(
                "contours not traced; run the trace stage first".to_owned(),
            )
        })?;

        let smoothing = context.settings.path_smoothing;
        let mut paths = Vec::new();
        for (color, traced) in contours {
            let fill = color.to_hex();
            for contour in traced {
                let points = contour.points.points();
                if points.len() < 2 {
                    continue;
                }
                let d = path_data(points, contour.closed, smoothing);
                paths.push(PathElement::filled(d, fill.clone()));
            }
        }

        context.record("paths.count", serde_json::json!(paths.len()));
        context.paths = Some(paths);
        Ok(())
    }
}

/// Render a contour polyline as SVG path data.
///
/// `smoothing` of zero produces polygonal output; anything above zero
/// rounds corners with quadratic segments whose control points are
/// pulled from the segment chord toward the original vertex by the
/// smoothing factor, so the parameter blends continuously from chamfered
/// to fully rounded.
#[must_use]
pub fn path_data(points: &[Point], closed: bool, smoothing: f64) -> String {
    if points.len() < 2 {
        return String::new();
    }
    if smoothing <= f64::EPSILON || points.len() < 3 {
        polygonal_data(points, closed)
    } else if closed {
        smoothed_closed_data(points, smoothing)
    } else {
        smoothed_open_data(points, smoothing)
    }
}

/// `M`/`L` data, with a trailing `Z` for closed contours.
fn polygonal_data(points: &[Point], closed: bool) -> String {
    let mut d = String::new();
    for (i, p) in points.iter().enumerate() {
        let cmd = if i == 0 { 'M' } else { 'L' };
        if i > 0 {
            d.push(' ');
        }
        let _ = write!(d, "{cmd} {} {}", fmt_coord(p.x), fmt_coord(p.y));
    }
    if closed {
        d.push_str(" Z");
    }
    d
}

/// Quadratic midpoint smoothing around a closed loop.
///
/// On-curve points sit at segment midpoints; each vertex contributes one
/// `Q` whose control point is `lerp(chord midpoint, vertex, smoothing)`.
fn smoothed_closed_data(points: &[Point], smoothing: f64) -> String {
    let n = points.len();
    let mids: Vec<Point> = (0..n)
        .map(|i| midpoint(points[i], points[(i + 1) % n]))
        .collect();

    let mut d = String::new();
    let _ = write!(d, "M {} {}", fmt_coord(mids[0].x), fmt_coord(mids[0].y));
    for i in 1..=n {
        let vertex = points[i % n];
        let from = mids[i - 1];
        let to = mids[i % n];
        let ctrl = lerp(midpoint(from, to), vertex, smoothing);
        let _ = write!(
            d,
            " Q {} {} {} {}",
            fmt_coord(ctrl.x),
            fmt_coord(ctrl.y),
            fmt_coord(to.x),
            fmt_coord(to.y),
        );
    }
    d.push_str(" Z");
    d
}

/// Quadratic midpoint smoothing along an open polyline.
///
/// The endpoints stay fixed; interior vertices are rounded the same way
/// as in the closed case.
fn smoothed_open_data(points: &[Point], smoothing: f64) -> String {
    let n = points.len();
    let mids: Vec<Point> = points.windows(2).map(|w| midpoint(w[0], w[1])).collect();

    let mut d = String::new();
    let first = points[0];
    let _ = write!(d, "M {} {}", fmt_coord(first.x), fmt_coord(first.y));
    let _ = write!(d, " L {} {}", fmt_coord(mids[0].x), fmt_coord(mids[0].y));
    for i in 1..n - 1 {
        let from = mids[i - 1];
        let to = mids[i];
        let ctrl = lerp(midpoint(from, to), points[i], smoothing);
        let _ = write!(
            d,
            " Q {} {} {} {}",
            fmt_coord(ctrl.x),
            fmt_coord(ctrl.y),
            fmt_coord(to.x),
            fmt_coord(to.y),
        );
    }
    let last = points[n - 1];
    let _ = write!(d, " L {} {}", fmt_coord(last.x), fmt_coord(last.y));
    d
}

/// Midpoint of two points.
fn midpoint(a: Point, b: Point) -> Point {
    Point::new((a.x + b.x) / 2.0, (a.y + b.y) / 2.0)
}

/// Linear interpolation from `a` toward `b` by `t`.
fn lerp(a: Point, b: Point, t: f64) -> Point {
    Point::new(
        (b.x - a.x).mul_add(t, a.x),
        (b.y - a.y).mul_add(t, a.y),
    )
}

/// Format a coordinate at fixed precision, trimming trailing zeros.
fn fmt_coord(value: f64) -> String {
    let formatted = format!("{value:.prec$}", prec = COORD_DECIMALS);
    let trimmed = formatted.trim_end_matches('0').trim_end_matches('.');
    if trimmed.is_empty() || trimmed == "-" || trimmed == "-0" {
        "0".to_owned()
    } else {
        trimmed.to_owned()
    }
}
