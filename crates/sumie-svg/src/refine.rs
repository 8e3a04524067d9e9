//! Markup refinement: shrink serialized SVG and remove artifacts.
//!
//! Passes run in a fixed order over the parsed [`SvgTree`]:
//! background removal → color-block merging → empty-element removal →
//! path-precision rounding → group flattening → border overlay →
//! caller-supplied custom transform.
//!
//! Background detection and color merging are heuristics: an off-white
//! background can slip through, and a genuinely full-canvas white shape
//! can be removed. Such misses degrade output quality silently — they
//! are never errors.

use sumie_pipeline::ColorRgb;

use crate::tree::{NodeId, RefineError, SvgTree};

/// Minimum channel value for a fill to count as near-white.
const NEAR_WHITE_MIN: u8 = 246;

/// Fraction of the view box a shape must cover to count as background.
const BACKGROUND_COVERAGE: f64 = 0.95;

/// Maximum origin offset (as a fraction of the view box size) for a
/// shape to count as background.
const BACKGROUND_OFFSET: f64 = 0.05;

/// Default Euclidean RGB distance within which fills merge.
pub const DEFAULT_MERGE_THRESHOLD: f64 = 20.0;

/// Default decimal places kept when rounding path data.
pub const DEFAULT_PRECISION: usize = 2;

/// View-box padding added by the border overlay, in user units.
const BORDER_PADDING: f64 = 8.0;

/// Elements a group may be flattened into.
const DRAWABLE_TAGS: [&str; 8] = [
    "path", "rect", "circle", "ellipse", "line", "polyline", "polygon", "g",
];

/// Border overlay shape and stroke styling.
#[derive(Debug, Clone, PartialEq)]
pub enum BorderStyle {
    /// Rounded rectangle hugging the padded view box.
    Rounded {
        /// Corner radius in user units.
        radius: f64,
        /// Stroke color.
        stroke: String,
        /// Stroke width in user units.
        width: f64,
    },
    /// Circle inscribed in the padded view box.
    Circle {
        /// Stroke color.
        stroke: String,
        /// Stroke width in user units.
        width: f64,
    },
}

/// Options for [`refine`].
#[derive(Debug, Clone, PartialEq)]
pub struct RefineOptions {
    /// Euclidean RGB distance within which path fills merge.
    pub merge_threshold: f64,
    /// Decimal places kept when rounding path data coordinates.
    pub precision: usize,
    /// Optional border overlay, drawn after all size-reducing passes.
    pub border: Option<BorderStyle>,
}

impl Default for RefineOptions {
    fn default() -> Self {
        Self {
            merge_threshold: DEFAULT_MERGE_THRESHOLD,
            precision: DEFAULT_PRECISION,
            border: None,
        }
    }
}

/// Run every refinement pass over serialized markup.
///
/// # Errors
///
/// Returns [`RefineError::Parse`] when the markup cannot be parsed.
pub fn refine(svg_text: &str, options: &RefineOptions) -> Result<String, RefineError> {
    let mut tree = SvgTree::parse(svg_text)?;
    remove_background(&mut tree);
    merge_color_blocks(&mut tree, options.merge_threshold);
    remove_empty_elements(&mut tree);
    round_path_precision(&mut tree, options.precision);
    flatten_groups(&mut tree);
    if let Some(border) = &options.border {
        apply_border(&mut tree, border);
    }
    Ok(tree.write())
}

/// Like [`refine`], applying an arbitrary text transform last.
///
/// The escape hatch for rewrites the structured passes cannot express.
///
/// # Errors
///
/// Returns [`RefineError::Parse`] when the markup cannot be parsed.
pub fn refine_with<F>(
    svg_text: &str,
    options: &RefineOptions,
    custom: F,
) -> Result<String, RefineError>
where
    F: FnOnce(String) -> String,
{
    Ok(custom(refine(svg_text, options)?))
}

/// The document's coordinate space: `(min_x, min_y, width, height)`.
///
/// Read from the root `viewBox`, falling back to numeric
/// `width`/`height` attributes.
fn view_box(tree: &SvgTree) -> Option<(f64, f64, f64, f64)> {
    let root = tree.root();
    if let Some(raw) = tree.attr(root, "viewBox") {
        let mut parts = raw.split_whitespace().map(str::parse::<f64>);
        let min_x = parts.next()?.ok()?;
        let min_y = parts.next()?.ok()?;
        let width = parts.next()?.ok()?;
        let height = parts.next()?.ok()?;
        return Some((min_x, min_y, width, height));
    }
    let width = parse_length(tree.attr(root, "width")?)?;
    let height = parse_length(tree.attr(root, "height")?)?;
    Some((0.0, 0.0, width, height))
}

/// Parse a length attribute, tolerating a `px` suffix.
fn parse_length(value: &str) -> Option<f64> {
    value.trim().trim_end_matches("px").parse().ok()
}

/// Remove a near-white, view-box-covering background shape.
///
/// Scans in document order for the first `<rect>` or simple rectangular
/// `<path>` whose fill is near-white (every channel > 245), whose
/// bounding box covers at least 95% of the view box, and whose origin
/// sits within 5% of the view-box origin. Returns whether a shape was
/// removed.
pub fn remove_background(tree: &mut SvgTree) -> bool {
    let Some((vb_x, vb_y, vb_w, vb_h)) = view_box(tree) else {
        return false;
    };
    if vb_w <= 0.0 || vb_h <= 0.0 {
        return false;
    }

    let candidate = tree
        .descendant_elements(tree.root())
        .into_iter()
        .find(|&id| {
            let near_white = tree
                .attr(id, "fill")
                .and_then(ColorRgb::parse_css)
                .is_some_and(is_near_white);
            if !near_white {
                return false;
            }
            let bbox = match tree.tag(id) {
                Some("rect") => rect_bounds(tree, id),
                Some("path") => tree.attr(id, "d").and_then(path_bounds),
                _ => None,
            };
            bbox.is_some_and(|(x, y, w, h)| {
                w * h >= BACKGROUND_COVERAGE * vb_w * vb_h
                    && (x - vb_x).abs() <= BACKGROUND_OFFSET * vb_w
                    && (y - vb_y).abs() <= BACKGROUND_OFFSET * vb_h
            })
        });

    candidate.is_some_and(|id| {
        tree.detach(id);
        true
    })
}

fn is_near_white(color: ColorRgb) -> bool {
    color.r >= NEAR_WHITE_MIN && color.g >= NEAR_WHITE_MIN && color.b >= NEAR_WHITE_MIN
}

/// Bounding box of a `<rect>` from its geometry attributes.
fn rect_bounds(tree: &SvgTree, id: NodeId) -> Option<(f64, f64, f64, f64)> {
    let x = tree.attr(id, "x").and_then(parse_length).unwrap_or(0.0);
    let y = tree.attr(id, "y").and_then(parse_length).unwrap_or(0.0);
    let width = parse_length(tree.attr(id, "width")?)?;
    let height = parse_length(tree.attr(id, "height")?)?;
    Some((x, y, width, height))
}

/// Bounding box of simple path data.
///
/// Supports the straight-edge commands a rectangular background can be
/// written with (`M`, `L`, `H`, `V`, `Z`, absolute or relative). Curved
/// or arc commands return `None` — such a path is never treated as a
/// background rectangle.
fn path_bounds(d: &str) -> Option<(f64, f64, f64, f64)> {
    let mut min_x = f64::INFINITY;
    let mut min_y = f64::INFINITY;
    let mut max_x = f64::NEG_INFINITY;
    let mut max_y = f64::NEG_INFINITY;
    let mut x = 0.0;
    let mut y = 0.0;
    let mut seen = false;

    let mut command = ' ';
    let mut numbers = NumberScanner::new(d);
    while let Some(token) = numbers.next_token() {
        match token {
            PathToken::Command(c) => match c {
                'M' | 'L' | 'H' | 'V' | 'Z' | 'm' | 'l' | 'h' | 'v' | 'z' => command = c,
                _ => return None,
            },
            PathToken::Number(value) => {
                match command {
                    'M' | 'L' => {
                        x = value;
                        y = numbers.next_number()?;
                    }
                    'm' | 'l' => {
                        x += value;
                        y += numbers.next_number()?;
                    }
                    'H' => x = value,
                    'h' => x += value,
                    'V' => y = value,
                    'v' => y += value,
                    _ => return None,
                }
                seen = true;
                min_x = min_x.min(x);
                min_y = min_y.min(y);
                max_x = max_x.max(x);
                max_y = max_y.max(y);
            }
        }
    }

    seen.then_some((min_x, min_y, max_x - min_x, max_y - min_y))
}

/// Merge paths whose fill colors cluster within `threshold`.
///
/// Greedy clustering in document order: each parseable fill joins the
/// first cluster whose representative color is within the threshold,
/// otherwise it starts a new cluster. Every cluster's path data is
/// concatenated into its first member; the rest are removed. Trades
/// color fidelity for fewer elements.
pub fn merge_color_blocks(tree: &mut SvgTree, threshold: f64) {
    let paths: Vec<(NodeId, ColorRgb)> = tree
        .descendant_elements(tree.root())
        .into_iter()
        .filter(|&id| tree.tag(id) == Some("path"))
        .filter_map(|id| {
            let color = tree.attr(id, "fill").and_then(ColorRgb::parse_css)?;
            Some((id, color))
        })
        .collect();

    let mut clusters: Vec<(ColorRgb, Vec<NodeId>)> = Vec::new();
    for (id, color) in paths {
        match clusters
            .iter_mut()
            .find(|(representative, _)| representative.distance(color) <= threshold)
        {
            Some((_, members)) => members.push(id),
            None => clusters.push((color, vec![id])),
        }
    }

    for (_, members) in clusters {
        let Some((&keeper, rest)) = members.split_first() else {
            continue;
        };
        if rest.is_empty() {
            continue;
        }
        let mut merged = tree.attr(keeper, "d").unwrap_or_default().to_owned();
        for &member in rest {
            if let Some(d) = tree.attr(member, "d") {
                if !merged.is_empty() && !d.is_empty() {
                    merged.push(' ');
                }
                merged.push_str(d);
            }
            tree.detach(member);
        }
        tree.set_attr(keeper, "d", &merged);
    }
}

/// Strip degenerate leftovers: paths that draw nothing and childless
/// groups. Iterates to a fixed point, since removing paths can empty
/// their enclosing groups.
pub fn remove_empty_elements(tree: &mut SvgTree) {
    loop {
        let removable: Vec<NodeId> = tree
            .descendant_elements(tree.root())
            .into_iter()
            .filter(|&id| match tree.tag(id) {
                Some("path") => tree.attr(id, "d").is_none_or(is_degenerate_path_data),
                Some("g") => tree.children(id).is_empty(),
                _ => false,
            })
            .collect();
        if removable.is_empty() {
            return;
        }
        for id in removable {
            tree.detach(id);
        }
    }
}

/// Whether path data draws nothing visible.
///
/// Empty data, or a lone move with no drawing command and no implicit
/// line-to coordinates, is degenerate.
fn is_degenerate_path_data(d: &str) -> bool {
    let mut command_count = 0_usize;
    let mut number_count = 0_usize;
    let mut only_moves = true;
    let mut scanner = NumberScanner::new(d);
    while let Some(token) = scanner.next_token() {
        match token {
            PathToken::Command(c) => {
                command_count += 1;
                if !matches!(c, 'M' | 'm') {
                    only_moves = false;
                }
            }
            PathToken::Number(_) => number_count += 1,
        }
    }
    if command_count == 0 {
        return true;
    }
    // "M x y" with extra coordinate pairs is an implicit polyline.
    only_moves && number_count <= 2
}

/// Round every numeric token in path data to `precision` decimals.
///
/// Trailing zeros are trimmed, so `12.34567` at precision 2 becomes
/// `12.35` and `10.00` becomes `10`.
pub fn round_path_precision(tree: &mut SvgTree, precision: usize) {
    let paths: Vec<NodeId> = tree
        .descendant_elements(tree.root())
        .into_iter()
        .filter(|&id| tree.tag(id) == Some("path"))
        .collect();
    for id in paths {
        if let Some(d) = tree.attr(id, "d") {
            let rounded = round_numbers(d, precision);
            tree.set_attr(id, "d", &rounded);
        }
    }
}

/// Rewrite every number in `input` at the given precision.
fn round_numbers(input: &str, precision: usize) -> String {
    let mut out = String::with_capacity(input.len());
    let mut scanner = NumberScanner::new(input);
    let mut last_end = 0;
    while let Some((start, end, value)) = scanner.next_number_span() {
        out.push_str(&input[last_end..start]);
        out.push_str(&format_rounded(value, precision));
        last_end = end;
    }
    out.push_str(&input[last_end..]);
    out
}

/// Format a number at fixed precision with trailing zeros trimmed.
fn format_rounded(value: f64, precision: usize) -> String {
    let formatted = format!("{value:.precision$}");
    if !formatted.contains('.') {
        return formatted;
    }
    let trimmed = formatted.trim_end_matches('0').trim_end_matches('.');
    if trimmed.is_empty() || trimmed == "-" || trimmed == "-0" {
        "0".to_owned()
    } else {
        trimmed.to_owned()
    }
}

/// Collapse groups wrapping exactly one drawable child.
///
/// The group's attributes transfer to the child (child attributes win on
/// conflict-free names; any shared attribute name blocks the collapse).
/// Loops to a fixed point — each pass strictly reduces the group count
/// or changes nothing, so the pass is idempotent once stable. Returns
/// the number of groups collapsed.
pub fn flatten_groups(tree: &mut SvgTree) -> usize {
    let mut collapsed = 0_usize;
    loop {
        let target = tree
            .descendant_elements(tree.root())
            .into_iter()
            .find(|&id| is_collapsible_group(tree, id));
        let Some(group) = target else {
            return collapsed;
        };
        let child = tree.children(group)[0];
        let transferred: Vec<(String, String)> = tree
            .attrs(group)
            .iter()
            .map(|(name, value)| (name.clone(), value.clone()))
            .collect();
        for (name, value) in transferred {
            tree.set_attr(child, &name, &value);
        }
        tree.replace(group, child);
        collapsed += 1;
    }
}

/// A `<g>` with exactly one drawable element child and no attribute
/// names in common with that child.
fn is_collapsible_group(tree: &SvgTree, id: NodeId) -> bool {
    if tree.tag(id) != Some("g") || tree.parent(id).is_none() {
        return false;
    }
    let children = tree.children(id);
    if children.len() != 1 {
        return false;
    }
    let child = children[0];
    let Some(tag) = tree.tag(child) else {
        return false;
    };
    if !DRAWABLE_TAGS.contains(&tag) {
        return false;
    }
    tree.attrs(id)
        .iter()
        .all(|(name, _)| !tree.has_attr(child, name))
}

/// Inflate the view box and draw a border stroke sized to the new
/// bounds.
///
/// Runs after all size-reducing passes so the padding math is not
/// disturbed. Returns whether a border was added (a document with no
/// resolvable view box is left untouched).
pub fn apply_border(tree: &mut SvgTree, style: &BorderStyle) -> bool {
    let Some((vb_x, vb_y, vb_w, vb_h)) = view_box(tree) else {
        return false;
    };

    let new_x = vb_x - BORDER_PADDING;
    let new_y = vb_y - BORDER_PADDING;
    let new_w = 2.0_f64.mul_add(BORDER_PADDING, vb_w);
    let new_h = 2.0_f64.mul_add(BORDER_PADDING, vb_h);

    let root = tree.root();
    tree.set_attr(
        root,
        "viewBox",
        &format!(
            "{} {} {} {}",
            format_rounded(new_x, DEFAULT_PRECISION),
            format_rounded(new_y, DEFAULT_PRECISION),
            format_rounded(new_w, DEFAULT_PRECISION),
            format_rounded(new_h, DEFAULT_PRECISION),
        ),
    );

    match style {
        BorderStyle::Rounded {
            radius,
            stroke,
            width,
        } => {
            let border = tree.new_element("rect");
            tree.set_attr(border, "x", &format_rounded(new_x + width / 2.0, 2));
            tree.set_attr(border, "y", &format_rounded(new_y + width / 2.0, 2));
            tree.set_attr(border, "width", &format_rounded(new_w - width, 2));
            tree.set_attr(border, "height", &format_rounded(new_h - width, 2));
            tree.set_attr(border, "rx", &format_rounded(*radius, 2));
            tree.set_attr(border, "fill", "none");
            tree.set_attr(border, "stroke", stroke);
            tree.set_attr(border, "stroke-width", &format_rounded(*width, 2));
            tree.append_child(root, border);
        }
        BorderStyle::Circle { stroke, width } => {
            let border = tree.new_element("circle");
            let cx = new_x + new_w / 2.0;
            let cy = new_y + new_h / 2.0;
            let r = (new_w.min(new_h) - width) / 2.0;
            tree.set_attr(border, "cx", &format_rounded(cx, 2));
            tree.set_attr(border, "cy", &format_rounded(cy, 2));
            tree.set_attr(border, "r", &format_rounded(r, 2));
            tree.set_attr(border, "fill", "none");
            tree.set_attr(border, "stroke", stroke);
            tree.set_attr(border, "stroke-width", &format_rounded(*width, 2));
            tree.append_child(root, border);
        }
    }
    true
}

/// A token from path data: a command letter or a number.
enum PathToken {
    Command(char),
    Number(f64),
}

/// Incremental scanner over path-data commands and numbers.
struct NumberScanner<'a> {
    input: &'a str,
    pos: usize,
}

impl<'a> NumberScanner<'a> {
    const fn new(input: &'a str) -> Self {
        Self { input, pos: 0 }
    }

    /// Next command letter or number, skipping separators.
    fn next_token(&mut self) -> Option<PathToken> {
        let bytes = self.input.as_bytes();
        while self.pos < bytes.len() {
            let b = bytes[self.pos];
            if b.is_ascii_alphabetic() {
                self.pos += 1;
                return Some(PathToken::Command(b as char));
            }
            if b.is_ascii_digit() || b == b'.' || b == b'-' || b == b'+' {
                return self.next_number_span().map(|(_, _, v)| PathToken::Number(v));
            }
            self.pos += 1;
        }
        None
    }

    /// Next number only, skipping separators and command letters.
    fn next_number(&mut self) -> Option<f64> {
        loop {
            match self.next_token()? {
                PathToken::Number(value) => return Some(value),
                PathToken::Command(_) => {}
            }
        }
    }

    /// Next number with its byte span `(start, end, value)`.
    fn next_number_span(&mut self) -> Option<(usize, usize, f64)> {
        let bytes = self.input.as_bytes();
        // Find the start of the next numeric token.
        while self.pos < bytes.len() {
            let b = bytes[self.pos];
            let sign_starts_number = (b == b'-' || b == b'+')
                && bytes
                    .get(self.pos + 1)
                    .is_some_and(|&n| n.is_ascii_digit() || n == b'.');
            if b.is_ascii_digit() || b == b'.' || sign_starts_number {
                break;
            }
            self.pos += 1;
        }
        if self.pos >= bytes.len() {
            return None;
        }

        let start = self.pos;
        let mut end = start;
        if bytes[end] == b'-' || bytes[end] == b'+' {
            end += 1;
        }
        let mut seen_dot = false;
        while end < bytes.len() {
            let b = bytes[end];
            if b.is_ascii_digit() {
                end += 1;
            } else if b == b'.' && !seen_dot {
                seen_dot = true;
                end += 1;
            } else {
                break;
            }
        }
        self.pos = end;
        let value = self.input[start..end].parse().ok()?;
        Some((start, end, value))
    }
}
