//! Arena-backed SVG node tree.
//!
//! Refinement operates on typed elements rather than pattern-matched
//! text: markup is parsed once into an arena of nodes addressed by
//! index, transformed structurally, and written back out. The parser
//! covers the markup shapes our own serializer and common vectorizer
//! output produce — prolog, comments, elements with quoted attributes,
//! and text content. Comments are dropped; the writer always emits a
//! fresh XML declaration and compact (whitespace-free) element nesting.

/// Errors raised while refining serialized SVG markup.
#[derive(Debug, thiserror::Error)]
pub enum RefineError {
    /// The input markup could not be parsed.
    #[error("malformed svg: {0}")]
    Parse(String),
}

/// Index of a node within its [`SvgTree`] arena.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct NodeId(usize);

/// What a node holds: an element with attributes, or character data.
#[derive(Debug, Clone)]
pub enum NodeKind {
    /// An element like `<path .../>`.
    Element {
        /// Tag name, e.g. `"svg"`, `"g"`, `"path"`.
        tag: String,
        /// Attributes in document order.
        attrs: Vec<(String, String)>,
    },
    /// Text content between tags (entity-decoded).
    Text(String),
}

#[derive(Debug, Clone)]
struct Node {
    kind: NodeKind,
    parent: Option<NodeId>,
    children: Vec<NodeId>,
}

/// An SVG document as an arena of nodes.
///
/// Detached nodes stay allocated in the arena but are unreachable from
/// the root; the writer only serializes the reachable tree.
#[derive(Debug, Clone)]
pub struct SvgTree {
    nodes: Vec<Node>,
    root: NodeId,
}

impl SvgTree {
    /// Parse markup into a tree.
    ///
    /// # Errors
    ///
    /// Returns [`RefineError::Parse`] when the markup is malformed or
    /// uses constructs outside the supported subset (e.g. CDATA).
    pub fn parse(input: &str) -> Result<Self, RefineError> {
        Parser::new(input).parse()
    }

    /// The root element (normally `<svg>`).
    #[must_use]
    pub const fn root(&self) -> NodeId {
        self.root
    }

    /// The node's kind.
    #[must_use]
    pub fn kind(&self, id: NodeId) -> &NodeKind {
        &self.nodes[id.0].kind
    }

    /// The element's tag name, or `None` for text nodes.
    #[must_use]
    pub fn tag(&self, id: NodeId) -> Option<&str> {
        match &self.nodes[id.0].kind {
            NodeKind::Element { tag, .. } => Some(tag),
            NodeKind::Text(_) => None,
        }
    }

    /// Child ids in document order.
    #[must_use]
    pub fn children(&self, id: NodeId) -> &[NodeId] {
        &self.nodes[id.0].children
    }

    /// The node's parent, or `None` for the root and detached nodes.
    #[must_use]
    pub fn parent(&self, id: NodeId) -> Option<NodeId> {
        self.nodes[id.0].parent
    }

    /// Look up an attribute value.
    #[must_use]
    pub fn attr(&self, id: NodeId, name: &str) -> Option<&str> {
        match &self.nodes[id.0].kind {
            NodeKind::Element { attrs, .. } => attrs
                .iter()
                .find(|(key, _)| key == name)
                .map(|(_, value)| value.as_str()),
            NodeKind::Text(_) => None,
        }
    }

    /// All attributes of an element, in document order.
    #[must_use]
    pub fn attrs(&self, id: NodeId) -> &[(String, String)] {
        match &self.nodes[id.0].kind {
            NodeKind::Element { attrs, .. } => attrs,
            NodeKind::Text(_) => &[],
        }
    }

    /// Set (or add) an attribute on an element. No-op on text nodes.
    pub fn set_attr(&mut self, id: NodeId, name: &str, value: &str) {
        if let NodeKind::Element { attrs, .. } = &mut self.nodes[id.0].kind {
            if let Some(entry) = attrs.iter_mut().find(|(key, _)| key == name) {
                entry.1 = value.to_owned();
            } else {
                attrs.push((name.to_owned(), value.to_owned()));
            }
        }
    }

    /// Whether the element carries the given attribute.
    #[must_use]
    pub fn has_attr(&self, id: NodeId, name: &str) -> bool {
        self.attr(id, name).is_some()
    }

    /// Allocate a new element without attaching it anywhere.
    pub fn new_element(&mut self, tag: &str) -> NodeId {
        let id = NodeId(self.nodes.len());
        self.nodes.push(Node {
            kind: NodeKind::Element {
                tag: tag.to_owned(),
                attrs: Vec::new(),
            },
            parent: None,
            children: Vec::new(),
        });
        id
    }

    /// Append `child` to `parent`'s child list, detaching it from any
    /// previous parent first.
    pub fn append_child(&mut self, parent: NodeId, child: NodeId) {
        self.detach(child);
        self.nodes[child.0].parent = Some(parent);
        self.nodes[parent.0].children.push(child);
    }

    /// Remove a node from its parent's child list.
    ///
    /// The node (and its subtree) stays in the arena but becomes
    /// unreachable; the writer will not serialize it.
    pub fn detach(&mut self, id: NodeId) {
        if let Some(parent) = self.nodes[id.0].parent.take() {
            self.nodes[parent.0].children.retain(|&c| c != id);
        }
    }

    /// Swap `old` for `new` at `old`'s position in its parent.
    ///
    /// Returns `false` (doing nothing) when `old` has no parent.
    pub fn replace(&mut self, old: NodeId, new: NodeId) -> bool {
        let Some(parent) = self.nodes[old.0].parent else {
            return false;
        };
        self.detach(new);
        let Some(slot) = self.nodes[parent.0]
            .children
            .iter()
            .position(|&c| c == old)
        else {
            return false;
        };
        self.nodes[parent.0].children[slot] = new;
        self.nodes[old.0].parent = None;
        self.nodes[new.0].parent = Some(parent);
        true
    }

    /// All element ids reachable from `start`, pre-order, including
    /// `start` itself. Text nodes are skipped.
    #[must_use]
    pub fn descendant_elements(&self, start: NodeId) -> Vec<NodeId> {
        let mut out = Vec::new();
        let mut stack = vec![start];
        while let Some(id) = stack.pop() {
            if matches!(self.nodes[id.0].kind, NodeKind::Element { .. }) {
                out.push(id);
            }
            // Reverse so pop order matches document order.
            for &child in self.nodes[id.0].children.iter().rev() {
                stack.push(child);
            }
        }
        out
    }

    /// Serialize the reachable tree back to markup.
    ///
    /// Emits an XML declaration followed by compact nesting (no
    /// indentation or inter-element whitespace). Also available through
    /// `Display` / `to_string()`.
    #[must_use]
    pub fn write(&self) -> String {
        let mut out = String::from("<?xml version=\"1.0\" encoding=\"UTF-8\"?>\n");
        self.write_node(self.root, &mut out);
        out.push('\n');
        out
    }

    fn write_node(&self, id: NodeId, out: &mut String) {
        match &self.nodes[id.0].kind {
            NodeKind::Text(text) => out.push_str(&escape_text(text)),
            NodeKind::Element { tag, attrs } => {
                out.push('<');
                out.push_str(tag);
                for (name, value) in attrs {
                    out.push(' ');
                    out.push_str(name);
                    out.push_str("=\"");
                    out.push_str(&escape_attr(value));
                    out.push('"');
                }
                if self.nodes[id.0].children.is_empty() {
                    out.push_str("/>");
                } else {
                    out.push('>');
                    for &child in &self.nodes[id.0].children {
                        self.write_node(child, out);
                    }
                    out.push_str("</");
                    out.push_str(tag);
                    out.push('>');
                }
            }
        }
    }
}

impl std::fmt::Display for SvgTree {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.write())
    }
}

/// Escape text content (`&`, `<`, `>`).
fn escape_text(input: &str) -> String {
    let mut out = String::with_capacity(input.len());
    for ch in input.chars() {
        match ch {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            other => out.push(other),
        }
    }
    out
}

/// Escape attribute values (`&`, `<`, `>`, `"`).
fn escape_attr(input: &str) -> String {
    let mut out = String::with_capacity(input.len());
    for ch in input.chars() {
        match ch {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '"' => out.push_str("&quot;"),
            other => out.push(other),
        }
    }
    out
}

/// Decode the five predefined XML entities. Unknown entities pass
/// through verbatim.
fn unescape(input: &str) -> String {
    let mut out = String::with_capacity(input.len());
    let mut rest = input;
    while let Some(pos) = rest.find('&') {
        out.push_str(&rest[..pos]);
        rest = &rest[pos..];
        let mut replaced = false;
        for (entity, ch) in [
            ("&amp;", '&'),
            ("&lt;", '<'),
            ("&gt;", '>'),
            ("&quot;", '"'),
            ("&apos;", '\''),
        ] {
            if let Some(tail) = rest.strip_prefix(entity) {
                out.push(ch);
                rest = tail;
                replaced = true;
                break;
            }
        }
        if !replaced {
            out.push('&');
            rest = &rest[1..];
        }
    }
    out.push_str(rest);
    out
}

/// Recursive-descent parser over the supported markup subset.
struct Parser<'a> {
    input: &'a str,
    pos: usize,
}

impl<'a> Parser<'a> {
    const fn new(input: &'a str) -> Self {
        Self { input, pos: 0 }
    }

    fn parse(mut self) -> Result<SvgTree, RefineError> {
        let mut tree = SvgTree {
            nodes: Vec::new(),
            root: NodeId(0),
        };

        self.skip_misc()?;
        if !self.starts_with("<") {
            return Err(self.error("expected root element"));
        }
        let root = self.parse_element(&mut tree)?;
        tree.root = root;
        self.skip_misc()?;
        if self.pos < self.input.len() {
            return Err(self.error("trailing content after root element"));
        }
        Ok(tree)
    }

    /// Skip whitespace, the XML prolog, doctype, and comments.
    fn skip_misc(&mut self) -> Result<(), RefineError> {
        loop {
            self.skip_whitespace();
            if self.starts_with("<?") {
                self.consume_until("?>")?;
            } else if self.starts_with("<!--") {
                self.consume_until("-->")?;
            } else if self.starts_with("<!DOCTYPE") || self.starts_with("<!doctype") {
                self.consume_until(">")?;
            } else {
                return Ok(());
            }
        }
    }

    fn parse_element(&mut self, tree: &mut SvgTree) -> Result<NodeId, RefineError> {
        self.expect('<')?;
        let tag = self.read_name()?;
        let mut attrs = Vec::new();
        loop {
            self.skip_whitespace();
            if self.starts_with("/>") {
                self.pos += 2;
                return Ok(self.push_element(tree, tag, attrs, Vec::new()));
            }
            if self.starts_with(">") {
                self.pos += 1;
                break;
            }
            let name = self.read_name()?;
            self.skip_whitespace();
            self.expect('=')?;
            self.skip_whitespace();
            let value = self.read_quoted()?;
            attrs.push((name, unescape(&value)));
        }

        // Children until the matching close tag.
        let mut children = Vec::new();
        loop {
            if self.starts_with("</") {
                self.pos += 2;
                let close = self.read_name()?;
                if close != tag {
                    return Err(self.error(&format!("mismatched </{close}> for <{tag}>")));
                }
                self.skip_whitespace();
                self.expect('>')?;
                return Ok(self.push_element(tree, tag, attrs, children));
            }
            if self.starts_with("<!--") {
                self.consume_until("-->")?;
                continue;
            }
            if self.starts_with("<![") {
                return Err(self.error("CDATA sections are not supported"));
            }
            if self.starts_with("<") {
                children.push(self.parse_element(tree)?);
                continue;
            }
            let text = self.read_text()?;
            if !text.trim().is_empty() {
                let id = NodeId(tree.nodes.len());
                tree.nodes.push(Node {
                    kind: NodeKind::Text(unescape(&text)),
                    parent: None,
                    children: Vec::new(),
                });
                children.push(id);
            }
        }
    }

    fn push_element(
        &self,
        tree: &mut SvgTree,
        tag: String,
        attrs: Vec<(String, String)>,
        children: Vec<NodeId>,
    ) -> NodeId {
        let id = NodeId(tree.nodes.len());
        tree.nodes.push(Node {
            kind: NodeKind::Element { tag, attrs },
            parent: None,
            children: children.clone(),
        });
        for child in children {
            tree.nodes[child.0].parent = Some(id);
        }
        id
    }

    fn starts_with(&self, prefix: &str) -> bool {
        self.input[self.pos..].starts_with(prefix)
    }

    fn skip_whitespace(&mut self) {
        let rest = &self.input[self.pos..];
        let trimmed = rest.trim_start();
        self.pos += rest.len() - trimmed.len();
    }

    fn expect(&mut self, expected: char) -> Result<(), RefineError> {
        if self.input[self.pos..].starts_with(expected) {
            self.pos += expected.len_utf8();
            Ok(())
        } else {
            Err(self.error(&format!("expected '{expected}'")))
        }
    }

    fn consume_until(&mut self, marker: &str) -> Result<(), RefineError> {
        match self.input[self.pos..].find(marker) {
            Some(offset) => {
                self.pos += offset + marker.len();
                Ok(())
            }
            None => Err(self.error(&format!("unterminated construct (missing '{marker}')"))),
        }
    }

    /// Tag or attribute name: alphanumerics plus `-`, `_`, `:`, `.`.
    fn read_name(&mut self) -> Result<String, RefineError> {
        let rest = &self.input[self.pos..];
        let end = rest
            .find(|c: char| !(c.is_ascii_alphanumeric() || matches!(c, '-' | '_' | ':' | '.')))
            .unwrap_or(rest.len());
        if end == 0 {
            return Err(self.error("expected a name"));
        }
        let name = rest[..end].to_owned();
        self.pos += end;
        Ok(name)
    }

    /// Single- or double-quoted attribute value.
    fn read_quoted(&mut self) -> Result<String, RefineError> {
        let quote = self.input[self.pos..]
            .chars()
            .next()
            .filter(|&c| c == '"' || c == '\'')
            .ok_or_else(|| self.error("expected a quoted attribute value"))?;
        self.pos += 1;
        let rest = &self.input[self.pos..];
        let end = rest
            .find(quote)
            .ok_or_else(|| self.error("unterminated attribute value"))?;
        let value = rest[..end].to_owned();
        self.pos += end + 1;
        Ok(value)
    }

    /// Raw text up to the next `<`.
    fn read_text(&mut self) -> Result<String, RefineError> {
        let rest = &self.input[self.pos..];
        let end = rest.find('<').ok_or_else(|| self.error("unclosed element"))?;
        let text = rest[..end].to_owned();
        self.pos += end;
        Ok(text)
    }

    fn error(&self, message: &str) -> RefineError {
        RefineError::Parse(format!("{message} at byte {}", self.pos))
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    const SAMPLE: &str = concat!(
        "<?xml version=\"1.0\" encoding=\"UTF-8\"?>\n",
        "<svg xmlns=\"http://www.w3.org/2000/svg\" viewBox=\"0 0 10 10\">\n",
        "<title>demo &amp; test</title>\n",
        "<g fill=\"#ff0000\">\n",
        "<path d=\"M 0 0 L 5 5\"/>\n",
        "</g>\n",
        "</svg>\n",
    );

    #[test]
    fn parses_root_and_children() {
        let tree = SvgTree::parse(SAMPLE).unwrap();
        assert_eq!(tree.tag(tree.root()), Some("svg"));
        assert_eq!(tree.attr(tree.root(), "viewBox"), Some("0 0 10 10"));
        assert_eq!(tree.children(tree.root()).len(), 2);
    }

    #[test]
    fn text_content_is_entity_decoded() {
        let tree = SvgTree::parse(SAMPLE).unwrap();
        let title = tree.children(tree.root())[0];
        assert_eq!(tree.tag(title), Some("title"));
        let text = tree.children(title)[0];
        match tree.kind(text) {
            NodeKind::Text(content) => assert_eq!(content, "demo & test"),
            NodeKind::Element { .. } => unreachable!("expected text node"),
        }
    }

    #[test]
    fn descendants_in_document_order() {
        let tree = SvgTree::parse(SAMPLE).unwrap();
        let tags: Vec<&str> = tree
            .descendant_elements(tree.root())
            .into_iter()
            .filter_map(|id| tree.tag(id))
            .collect();
        assert_eq!(tags, vec!["svg", "title", "g", "path"]);
    }

    #[test]
    fn round_trip_preserves_structure() {
        let tree = SvgTree::parse(SAMPLE).unwrap();
        let written = tree.to_string();
        let reparsed = SvgTree::parse(&written).unwrap();
        assert_eq!(
            tree.descendant_elements(tree.root()).len(),
            reparsed.descendant_elements(reparsed.root()).len(),
        );
        assert!(written.contains("demo &amp; test"));
        assert!(written.contains(r#"d="M 0 0 L 5 5""#));
    }

    #[test]
    fn self_closing_and_single_quotes() {
        let tree = SvgTree::parse("<svg><rect x='1' width='2'/></svg>").unwrap();
        let rect = tree.children(tree.root())[0];
        assert_eq!(tree.attr(rect, "x"), Some("1"));
        assert_eq!(tree.attr(rect, "width"), Some("2"));
        assert!(tree.children(rect).is_empty());
    }

    #[test]
    fn comments_are_dropped() {
        let tree = SvgTree::parse("<svg><!-- note --><path d=\"M 0 0 L 1 1\"/></svg>").unwrap();
        assert_eq!(tree.children(tree.root()).len(), 1);
    }

    #[test]
    fn detach_makes_node_unreachable() {
        let mut tree = SvgTree::parse("<svg><path d=\"M 0 0 L 1 1\"/><g/></svg>").unwrap();
        let path = tree.children(tree.root())[0];
        tree.detach(path);
        assert_eq!(tree.children(tree.root()).len(), 1);
        assert!(!tree.to_string().contains("<path"));
    }

    #[test]
    fn replace_swaps_in_position() {
        let mut tree = SvgTree::parse("<svg><g><path d=\"M 0 0 L 1 1\"/></g><rect/></svg>").unwrap();
        let group = tree.children(tree.root())[0];
        let path = tree.children(group)[0];
        assert!(tree.replace(group, path));
        assert_eq!(tree.tag(tree.children(tree.root())[0]), Some("path"));
        assert_eq!(tree.parent(path), Some(tree.root()));
    }

    #[test]
    fn set_attr_updates_and_adds() {
        let mut tree = SvgTree::parse("<svg width=\"4\"/>").unwrap();
        tree.set_attr(tree.root(), "width", "8");
        tree.set_attr(tree.root(), "height", "6");
        assert_eq!(tree.attr(tree.root(), "width"), Some("8"));
        assert_eq!(tree.attr(tree.root(), "height"), Some("6"));
    }

    #[test]
    fn mismatched_close_tag_is_an_error() {
        let result = SvgTree::parse("<svg><g></svg></g>");
        assert!(matches!(result, Err(RefineError::Parse(_))));
    }

    #[test]
    fn truncated_input_is_an_error() {
        assert!(matches!(
            SvgTree::parse("<svg><path d=\"M 0 0"),
            Err(RefineError::Parse(_)),
        ));
        assert!(matches!(SvgTree::parse(""), Err(RefineError::Parse(_))));
    }

    #[test]
    fn attribute_entities_round_trip() {
        let mut tree = SvgTree::parse("<svg/>").unwrap();
        tree.set_attr(tree.root(), "data-label", "a<b & \"c\"");
        let written = tree.to_string();
        assert!(written.contains("a&lt;b &amp; &quot;c&quot;"));
        let reparsed = SvgTree::parse(&written).unwrap();
        assert_eq!(reparsed.attr(reparsed.root(), "data-label"), Some("a<b & \"c\""));
    }
}
