//! Contour tracing: extract simplified boundary polylines from each
//! color layer.
//!
//! For every layer the stage walks the pixel grid row-major, flood-fills
//! each connected foreground region exactly once (8-connected), and
//! classifies the region's edge pixels. The unordered edge set is chained
//! into a polyline by a greedy nearest-neighbor pass, then reduced with
//! recursive Douglas-Peucker simplification. Regions too small for the
//! complexity-derived detail threshold are discarded as noise.
//!
//! # Known approximation
//!
//! The nearest-neighbor chain is a heuristic, not a topological boundary
//! follower: on strongly concave regions, or when one quantized color
//! forms disjoint islands inside a single connected mask, the chain can
//! stitch across gaps that a true border-following algorithm would keep
//! separate. Simplification collapses most of the resulting jitter in
//! practice.

use crate::pipeline::PipelineStage;
use crate::types::{Contour, ContourMap, PipelineContext, Point, Polyline, StageError};

/// Douglas-Peucker tolerance in pixels.
pub const SIMPLIFY_TOLERANCE: f64 = 1.5;

/// Maximum endpoint gap for a contour to count as closed.
///
/// Adjacent or diagonal boundary pixels that survive simplification sit
/// within `sqrt(2)` of each other; 2.0 adds slack for dropped endpoints.
pub const CLOSE_DISTANCE: f64 = 2.0;

/// Base of the detail-threshold formula (minimum size at complexity 0).
const DETAIL_BASE: f64 = 50.0;

/// Span of the detail-threshold formula (how much complexity 1 removes).
const DETAIL_SPAN: f64 = 45.0;

/// Hard floor for the detail threshold.
const DETAIL_FLOOR: usize = 2;

/// Minimum boundary point count for a contour to survive.
///
/// `max(2, round(50 - complexity * 45))`: complexity 0 keeps only
/// regions with 50+ boundary points, complexity 1 keeps anything with 5+.
#[must_use]
#[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
pub fn detail_threshold(complexity: f64) -> usize {
    let raw = DETAIL_SPAN
        .mul_add(-complexity.clamp(0.0, 1.0), DETAIL_BASE)
        .round();
    (raw as usize).max(DETAIL_FLOOR)
}

/// Unsigned polygon area via the shoelace formula.
///
/// Half the absolute sum of cross products of consecutive vertex pairs,
/// with the last vertex wrapping back to the first. Fewer than three
/// vertices enclose nothing.
#[must_use]
pub fn shoelace_area(points: &[Point]) -> f64 {
    if points.len() < 3 {
        return 0.0;
    }
    let mut sum = 0.0;
    for (i, a) in points.iter().enumerate() {
        let b = points[(i + 1) % points.len()];
        sum += a.x.mul_add(b.y, -(b.x * a.y));
    }
    sum.abs() / 2.0
}

/// Pipeline stage producing [`PipelineContext::contours`].
///
/// Stage name: `"trace"`. Requires `color_layers`; fails with a
/// configuration error when layer extraction has not run.
#[derive(Debug, Clone, Copy, Default)]
pub struct ContourTraceStage;

impl PipelineStage for ContourTraceStage {
    fn name(&self) -> &str {
        "trace"
    }

    fn run(&self, context: &mut PipelineContext) -> Result<(), StageError> {
        let layers = context.color_layers.as_ref().ok_or_else(|| {
            StageError::Configuration(
                "color layers not extracted; run the color-layers stage first".to_owned(),
            )
        })?;

        let width = context.width() as usize;
        let height = context.height() as usize;
        let min_size = detail_threshold(context.settings.complexity);

        let mut contours = ContourMap::new();
        let mut total = 0_usize;
        for layer in layers {
            let traced = trace_layer(&layer.pixels, width, height, min_size);
            if traced.is_empty() {
                continue;
            }
            total += traced.len();
            contours.insert(layer.color, traced);
        }

        context.record("trace.min_size", serde_json::json!(min_size));
        context.record("trace.contour_count", serde_json::json!(total));
        context.contours = Some(contours);
        Ok(())
    }
}

/// Trace every connected region of one layer mask.
fn trace_layer(mask: &[bool], width: usize, height: usize, min_size: usize) -> Vec<Contour> {
    let mut visited = vec![false; mask.len()];
    let mut contours = Vec::new();

    for start in 0..mask.len() {
        if visited[start] || !mask[start] {
            continue;
        }

        let edges = collect_region_edges(mask, width, height, start, &mut visited);
        if edges.len() < min_size {
            continue;
        }

        let ordered = order_nearest_neighbor(&edges);
        let simplified = simplify(&ordered, SIMPLIFY_TOLERANCE);
        if simplified.len() < min_size {
            continue;
        }

        let closed = match (simplified.first(), simplified.last()) {
            (Some(first), Some(last)) => first.distance(*last) <= CLOSE_DISTANCE,
            _ => false,
        };
        let area = shoelace_area(&simplified);
        contours.push(Contour {
            points: Polyline::new(simplified),
            closed,
            area,
        });
    }

    contours
}

/// Flood-fill one 8-connected region and return its edge points.
///
/// Marks every connected foreground pixel visited exactly once, so the
/// cost over a whole layer is O(pixels). A pixel is an edge point when
/// it touches the image border or has any 8-neighbor outside the mask.
#[allow(clippy::cast_precision_loss, clippy::cast_possible_wrap, clippy::cast_sign_loss)]
fn collect_region_edges(
    mask: &[bool],
    width: usize,
    height: usize,
    start: usize,
    visited: &mut [bool],
) -> Vec<Point> {
    let mut stack = vec![start];
    visited[start] = true;
    let mut edges = Vec::new();

    while let Some(index) = stack.pop() {
        let x = (index % width) as isize;
        let y = (index / width) as isize;
        let mut boundary = x == 0 || y == 0 || x == width as isize - 1 || y == height as isize - 1;

        for dy in -1_isize..=1 {
            for dx in -1_isize..=1 {
                if dx == 0 && dy == 0 {
                    continue;
                }
                let nx = x + dx;
                let ny = y + dy;
                if nx < 0 || ny < 0 || nx >= width as isize || ny >= height as isize {
                    continue;
                }
                let neighbor = ny as usize * width + nx as usize;
                if mask[neighbor] {
                    if !visited[neighbor] {
                        visited[neighbor] = true;
                        stack.push(neighbor);
                    }
                } else {
                    boundary = true;
                }
            }
        }

        if boundary {
            edges.push(Point::new(x as f64, y as f64));
        }
    }

    edges
}

/// Chain an unordered edge-point set into a polyline, greedily.
///
/// Starts from an arbitrary point and repeatedly appends the nearest
/// unvisited point. O(E²) over the edge count, which is bounded by the
/// region perimeter rather than the image area. See the module docs for
/// why this is an approximation.
fn order_nearest_neighbor(points: &[Point]) -> Vec<Point> {
    if points.is_empty() {
        return Vec::new();
    }

    let n = points.len();
    let mut visited = vec![false; n];
    let mut ordered = Vec::with_capacity(n);
    visited[0] = true;
    ordered.push(points[0]);

    for _ in 1..n {
        // ordered is non-empty: seeded above and grown every iteration.
        let Some(current) = ordered.last().copied() else {
            break;
        };

        let mut best: Option<usize> = None;
        let mut best_dist = f64::INFINITY;
        for (j, candidate) in points.iter().enumerate() {
            if visited[j] {
                continue;
            }
            let dist = current.distance_squared(*candidate);
            if dist < best_dist {
                best_dist = dist;
                best = Some(j);
            }
        }

        if let Some(j) = best {
            visited[j] = true;
            ordered.push(points[j]);
        }
    }

    ordered
}

/// Simplify a polyline with the recursive Douglas-Peucker algorithm.
///
/// Splits a segment at its point of maximum perpendicular deviation from
/// the chord between its endpoints when that deviation exceeds
/// `tolerance`; otherwise the segment collapses to its two endpoints.
/// Polylines with fewer than 3 points are returned unchanged.
fn simplify(points: &[Point], tolerance: f64) -> Vec<Point> {
    if points.len() < 3 {
        return points.to_vec();
    }

    let mut kept = vec![false; points.len()];
    kept[0] = true;
    kept[points.len() - 1] = true;
    rdp_recurse(points, 0, points.len() - 1, tolerance, &mut kept);

    points
        .iter()
        .zip(&kept)
        .filter(|&(_, keep)| *keep)
        .map(|(&p, _)| p)
        .collect()
}

/// Recursive step: keep the farthest point of the span when it deviates
/// past tolerance, then recurse into both halves.
fn rdp_recurse(points: &[Point], start: usize, end: usize, tolerance: f64, kept: &mut [bool]) {
    if end <= start + 1 {
        return;
    }

    let mut max_dist = 0.0;
    let mut max_idx = start;
    for i in (start + 1)..end {
        let d = perpendicular_distance(points[i], points[start], points[end]);
        if d > max_dist {
            max_dist = d;
            max_idx = i;
        }
    }

    if max_dist > tolerance {
        kept[max_idx] = true;
        rdp_recurse(points, start, max_idx, tolerance, kept);
        rdp_recurse(points, max_idx, end, tolerance, kept);
    }
}

/// Perpendicular distance from `p` to the line through `a` and `b`.
///
/// `|cross(b - a, p - a)| / |b - a|`; falls back to point distance when
/// `a` and `b` coincide.
fn perpendicular_distance(p: Point, a: Point, b: Point) -> f64 {
    let dx = b.x - a.x;
    let dy = b.y - a.y;
    let length_sq = dx.mul_add(dx, dy * dy);

    if length_sq == 0.0 {
        return p.distance(a);
    }

    let cross = dx.mul_add(a.y - p.y, -(dy * (a.x - p.x)));
    cross.abs() / length_sq.sqrt()
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use crate::types::{ColorLayer, ColorRgb, ConversionSettings, PipelineContext};

    /// Build a context with one hand-made layer over a blank image.
    fn context_with_layer(width: u32, height: u32, mask: Vec<bool>) -> PipelineContext {
        let settings = ConversionSettings::new(1.0, 0.5, 0.5);
        let data = vec![0_u8; width as usize * height as usize * 4];
        let mut ctx = PipelineContext::from_raw(width, height, data, settings).unwrap();
        let area = mask.iter().filter(|&&p| p).count();
        ctx.color_layers = Some(vec![ColorLayer {
            color: ColorRgb::opaque(10, 20, 30),
            pixels: mask,
            area,
        }]);
        ctx
    }

    /// Mask with `true` inside the given rectangle (x0..x1, y0..y1 exclusive).
    fn rect_mask(width: usize, height: usize, x0: usize, y0: usize, x1: usize, y1: usize) -> Vec<bool> {
        let mut mask = vec![false; width * height];
        for y in y0..y1 {
            for x in x0..x1 {
                mask[y * width + x] = true;
            }
        }
        mask
    }

    // --- detail_threshold ---

    #[test]
    fn threshold_at_complexity_extremes() {
        assert_eq!(detail_threshold(0.0), 50);
        assert_eq!(detail_threshold(1.0), 5);
    }

    #[test]
    fn threshold_at_midpoint_rounds_up() {
        // 50 - 0.5 * 45 = 27.5, rounded to 28.
        assert_eq!(detail_threshold(0.5), 28);
    }

    #[test]
    fn threshold_clamps_out_of_range_complexity() {
        assert_eq!(detail_threshold(7.0), 5);
        assert_eq!(detail_threshold(-3.0), 50);
    }

    // --- shoelace_area ---

    #[test]
    fn shoelace_unit_square() {
        let square = [
            Point::new(0.0, 0.0),
            Point::new(1.0, 0.0),
            Point::new(1.0, 1.0),
            Point::new(0.0, 1.0),
        ];
        assert!((shoelace_area(&square) - 1.0).abs() < 1e-12);
    }

    #[test]
    fn shoelace_winding_independent() {
        let ccw = [
            Point::new(0.0, 0.0),
            Point::new(0.0, 2.0),
            Point::new(2.0, 2.0),
            Point::new(2.0, 0.0),
        ];
        assert!((shoelace_area(&ccw) - 4.0).abs() < 1e-12);
    }

    #[test]
    fn shoelace_degenerate_is_zero() {
        assert!(shoelace_area(&[]).abs() < f64::EPSILON);
        assert!(shoelace_area(&[Point::new(1.0, 1.0), Point::new(2.0, 2.0)]).abs() < f64::EPSILON);
    }

    // --- ordering ---

    #[test]
    fn nearest_neighbor_chains_a_line() {
        // Shuffled collinear points come back in spatial order.
        let points = [
            Point::new(0.0, 0.0),
            Point::new(3.0, 0.0),
            Point::new(1.0, 0.0),
            Point::new(2.0, 0.0),
        ];
        let ordered = order_nearest_neighbor(&points);
        let xs: Vec<f64> = ordered.iter().map(|p| p.x).collect();
        assert_eq!(xs, vec![0.0, 1.0, 2.0, 3.0]);
    }

    #[test]
    fn nearest_neighbor_empty_input() {
        assert!(order_nearest_neighbor(&[]).is_empty());
    }

    // --- simplification ---

    #[test]
    fn simplify_collapses_collinear_points() {
        let line: Vec<Point> = (0..10).map(|i| Point::new(f64::from(i), 0.0)).collect();
        let result = simplify(&line, SIMPLIFY_TOLERANCE);
        assert_eq!(result.len(), 2);
    }

    #[test]
    fn simplify_keeps_corners() {
        let corner = vec![
            Point::new(0.0, 0.0),
            Point::new(5.0, 0.0),
            Point::new(10.0, 0.0),
            Point::new(10.0, 5.0),
            Point::new(10.0, 10.0),
        ];
        let result = simplify(&corner, SIMPLIFY_TOLERANCE);
        assert_eq!(
            result,
            vec![
                Point::new(0.0, 0.0),
                Point::new(10.0, 0.0),
                Point::new(10.0, 10.0),
            ],
        );
    }

    #[test]
    fn simplify_short_polyline_unchanged() {
        let two = vec![Point::new(0.0, 0.0), Point::new(1.0, 1.0)];
        assert_eq!(simplify(&two, SIMPLIFY_TOLERANCE), two);
    }

    #[test]
    fn perpendicular_distance_on_axis() {
        let d = perpendicular_distance(
            Point::new(1.0, 3.0),
            Point::new(0.0, 0.0),
            Point::new(2.0, 0.0),
        );
        assert!((d - 3.0).abs() < 1e-10);
    }

    #[test]
    fn perpendicular_distance_coincident_endpoints() {
        let d = perpendicular_distance(
            Point::new(3.0, 4.0),
            Point::new(0.0, 0.0),
            Point::new(0.0, 0.0),
        );
        assert!((d - 5.0).abs() < 1e-10);
    }

    // --- stage behavior ---

    #[test]
    fn missing_layers_is_a_configuration_error() {
        let settings = ConversionSettings::default();
        let mut ctx = PipelineContext::from_raw(4, 4, vec![0; 64], settings).unwrap();

        let result = ContourTraceStage.run(&mut ctx);
        assert!(matches!(result, Err(StageError::Configuration(_))));
        // Nothing was left behind in the context.
        assert!(ctx.contours.is_none());
        assert!(ctx.paths.is_none());
        assert!(ctx.metadata.is_empty());
    }

    #[test]
    fn solid_square_traces_one_closed_contour() {
        // 6x6 solid layer at complexity 1.0 (min_size 5). The boundary
        // polygon passes through pixel centers, so a side-s square
        // encloses (s - 1)^2.
        let mut ctx = context_with_layer(6, 6, rect_mask(6, 6, 0, 0, 6, 6));
        ContourTraceStage.run(&mut ctx).unwrap();

        let contours = ctx.contours.unwrap();
        assert_eq!(contours.len(), 1);
        let traced = &contours[&ColorRgb::opaque(10, 20, 30)];
        assert_eq!(traced.len(), 1);
        assert!(traced[0].closed, "perimeter loop should close");
        assert!(
            (traced[0].area - 25.0).abs() <= 2.0,
            "expected area near 25, got {}",
            traced[0].area,
        );
    }

    #[test]
    fn larger_square_area_scales() {
        let mut ctx = context_with_layer(10, 10, rect_mask(10, 10, 0, 0, 10, 10));
        ContourTraceStage.run(&mut ctx).unwrap();

        let contours = ctx.contours.unwrap();
        let traced = &contours[&ColorRgb::opaque(10, 20, 30)];
        assert_eq!(traced.len(), 1);
        assert!(
            (traced[0].area - 81.0).abs() <= 3.0,
            "expected area near 81, got {}",
            traced[0].area,
        );
    }

    #[test]
    fn tiny_region_is_pruned_as_noise() {
        // A 2x2 region has 4 edge points, below min_size 5.
        let mut ctx = context_with_layer(8, 8, rect_mask(8, 8, 3, 3, 5, 5));
        ContourTraceStage.run(&mut ctx).unwrap();

        let contours = ctx.contours.unwrap();
        assert!(contours.is_empty(), "expected empty contour map");
        assert_eq!(ctx.metadata["trace.contour_count"], serde_json::json!(0));
    }

    #[test]
    fn thin_line_pruned_after_simplification() {
        // A 1-pixel-tall run has 10 edge points (passes the pre-filter at
        // min_size 5) but simplifies to its 2 endpoints, below min_size.
        let mut ctx = context_with_layer(12, 3, rect_mask(12, 3, 1, 1, 11, 2));
        ContourTraceStage.run(&mut ctx).unwrap();

        assert!(ctx.contours.unwrap().is_empty());
    }

    #[test]
    fn disjoint_regions_trace_separately() {
        let mut mask = rect_mask(16, 8, 0, 0, 7, 7);
        for (index, value) in rect_mask(16, 8, 9, 0, 16, 7).into_iter().enumerate() {
            if value {
                mask[index] = true;
            }
        }
        let mut ctx = context_with_layer(16, 8, mask);
        ContourTraceStage.run(&mut ctx).unwrap();

        let contours = ctx.contours.unwrap();
        let traced = &contours[&ColorRgb::opaque(10, 20, 30)];
        assert_eq!(traced.len(), 2, "two disjoint squares, two contours");
    }

    #[test]
    fn metadata_records_threshold_and_count() {
        let mut ctx = context_with_layer(6, 6, rect_mask(6, 6, 0, 0, 6, 6));
        ContourTraceStage.run(&mut ctx).unwrap();
        assert_eq!(ctx.metadata["trace.min_size"], serde_json::json!(5));
        assert_eq!(ctx.metadata["trace.contour_count"], serde_json::json!(1));
    }
}
