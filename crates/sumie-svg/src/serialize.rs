//! SVG export serializer.
//!
//! Converts [`PathElement`]s into an SVG string using the [`svg`] crate
//! for document construction, XML escaping, and attribute formatting.
//!
//! Each element becomes one `<path>` carrying its data, fill, and any
//! optional stroke/opacity styling. Optional [`SvgMetadata`] embeds
//! `<title>` and `<desc>` elements for accessibility and to help file
//! managers identify exported files.
//!
//! This is a pure function with no I/O -- it returns a `String`.

use svg::Document;
use svg::node::Text;
use svg::node::element::{Description, Path, Title};

use sumie_pipeline::PathElement;

/// Metadata to embed in the SVG document.
///
/// Both fields are optional. When present, a `<title>` and/or `<desc>`
/// element is emitted immediately after the opening `<svg>` tag. Text
/// values are XML-escaped automatically by the `svg` crate.
#[derive(Debug, Clone, Default)]
pub struct SvgMetadata<'a> {
    /// Document title — emitted as `<title>`.
    ///
    /// Typically the source image filename (without extension).
    pub title: Option<&'a str>,

    /// Document description — emitted as `<desc>`.
    ///
    /// Typically the conversion settings, so exported files are
    /// distinguishable.
    pub description: Option<&'a str>,
}

/// Serialize path elements into an SVG document string.
///
/// The `viewBox` spans `0 0 width height` so the SVG coordinate space
/// matches the source image pixel grid. Elements with empty path data
/// are skipped.
///
/// # Examples
///
/// ```
/// use sumie_pipeline::PathElement;
/// use sumie_svg::{SvgMetadata, to_svg};
///
/// let paths = vec![PathElement::filled(
///     "M 0 0 L 4 0 L 4 4 Z".to_owned(),
///     "#336699".to_owned(),
/// )];
/// let svg = to_svg(&paths, 8, 8, &SvgMetadata::default());
/// assert!(svg.contains(r#"viewBox="0 0 8 8""#));
/// assert!(svg.contains(r##"fill="#336699""##));
/// ```
#[must_use]
pub fn to_svg(
    paths: &[PathElement],
    width: u32,
    height: u32,
    metadata: &SvgMetadata<'_>,
) -> String {
    let mut doc = Document::new()
        .set("width", width)
        .set("height", height)
        .set("viewBox", (0, 0, width, height));

    if let Some(title) = metadata.title {
        doc = doc.add(Title::new(title));
    }
    if let Some(description) = metadata.description {
        doc = doc.add(Description::new().add(Text::new(description)));
    }

    for element in paths {
        if element.d.is_empty() {
            continue;
        }
        let mut path = Path::new()
            .set("d", element.d.as_str())
            .set("fill", element.fill.as_str());
        if let Some(stroke) = &element.stroke {
            path = path.set("stroke", stroke.as_str());
        }
        if let Some(stroke_width) = element.stroke_width {
            path = path.set("stroke-width", stroke_width);
        }
        if let Some(opacity) = element.opacity {
            path = path.set("opacity", opacity);
        }
        doc = doc.add(path);
    }

    // The svg crate omits the XML declaration, so we prepend it.
    format!("<?xml version=\"1.0\" encoding=\"UTF-8\"?>\n{doc}\n")
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    fn filled(d: &str, fill: &str) -> PathElement {
        PathElement::filled(d.to_owned(), fill.to_owned())
    }

    #[test]
    fn empty_path_list_produces_valid_svg() {
        let svg = to_svg(&[], 100, 50, &SvgMetadata::default());
        assert!(svg.starts_with(r#"<?xml version="1.0" encoding="UTF-8"?>"#));
        assert!(svg.contains(r#"xmlns="http://www.w3.org/2000/svg""#));
        assert!(svg.contains(r#"width="100""#));
        assert!(svg.contains(r#"height="50""#));
        assert!(svg.contains(r#"viewBox="0 0 100 50""#));
        assert!(!svg.contains("<path"));
    }

    #[test]
    fn one_path_per_element() {
        let paths = vec![
            filled("M 0 0 L 1 1", "#ff0000"),
            filled("M 2 2 L 3 3", "#00ff00"),
        ];
        let svg = to_svg(&paths, 10, 10, &SvgMetadata::default());
        assert_eq!(svg.matches("<path").count(), 2);
        assert!(svg.contains(r#"d="M 0 0 L 1 1""#));
        assert!(svg.contains(r##"fill="#00ff00""##));
    }

    #[test]
    fn empty_path_data_is_skipped() {
        let paths = vec![filled("", "#ff0000"), filled("M 0 0 L 1 1", "#00ff00")];
        let svg = to_svg(&paths, 10, 10, &SvgMetadata::default());
        assert_eq!(svg.matches("<path").count(), 1);
    }

    #[test]
    fn optional_styling_attributes_are_emitted() {
        let mut element = filled("M 0 0 L 1 1", "#123456");
        element.stroke = Some("#654321".to_owned());
        element.stroke_width = Some(1.5);
        element.opacity = Some(0.8);
        let svg = to_svg(&[element], 10, 10, &SvgMetadata::default());
        assert!(svg.contains(r##"stroke="#654321""##));
        assert!(svg.contains(r#"stroke-width="1.5""#));
        assert!(svg.contains(r#"opacity="0.8""#));
    }

    #[test]
    fn styling_attributes_are_omitted_when_unset() {
        let svg = to_svg(
            &[filled("M 0 0 L 1 1", "#123456")],
            10,
            10,
            &SvgMetadata::default(),
        );
        assert!(!svg.contains("stroke"));
        assert!(!svg.contains("opacity"));
    }

    #[test]
    fn title_and_desc_emitted_when_present() {
        let metadata = SvgMetadata {
            title: Some("sunset"),
            description: Some("complexity=0.5"),
        };
        let svg = to_svg(&[], 10, 10, &metadata);
        assert!(svg.contains("<title>sunset</title>"));
        assert!(svg.contains("<desc>complexity=0.5</desc>"));
    }

    #[test]
    fn title_special_characters_are_escaped() {
        let metadata = SvgMetadata {
            title: Some("a <b> & c"),
            description: None,
        };
        let svg = to_svg(&[], 10, 10, &metadata);
        assert!(svg.contains("<title>a &lt;b&gt; &amp; c</title>"));
    }

    #[test]
    fn output_round_trips_through_the_refine_tree() {
        let paths = vec![filled("M 0 0 L 4 0 L 4 4 Z", "#336699")];
        let svg = to_svg(&paths, 8, 8, &SvgMetadata::default());
        let tree = crate::tree::SvgTree::parse(&svg).unwrap();
        assert_eq!(tree.tag(tree.root()), Some("svg"));
        assert_eq!(tree.attr(tree.root(), "viewBox"), Some("0 0 8 8"));
    }
}
