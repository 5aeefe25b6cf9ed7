//! Markup values and their serialization.
//!
//! Scripts can hand parsed markup to `write` instead of raw strings. The
//! formatter owns serialization and tag wrapping; wrapping happens at the
//! tree level so the emitted markup stays well-formed.

/// A parsed markup value: an element with children, or a text leaf.
#[derive(Debug, Clone, PartialEq)]
pub enum MarkupNode {
    Element { tag: String, children: Vec<MarkupNode> },
    Text(String),
}

impl MarkupNode {
    pub fn element(tag: impl Into<String>) -> Self {
        MarkupNode::Element { tag: tag.into(), children: Vec::new() }
    }

    pub fn element_with_text(tag: impl Into<String>, text: impl Into<String>) -> Self {
        MarkupNode::Element {
            tag: tag.into(),
            children: vec![MarkupNode::Text(text.into())],
        }
    }

    pub fn text(content: impl Into<String>) -> Self {
        MarkupNode::Text(content.into())
    }

    /// Append a child, returning the element. Text leaves are unchanged.
    pub fn append(mut self, child: MarkupNode) -> Self {
        if let MarkupNode::Element { children, .. } = &mut self {
            children.push(child);
        }
        self
    }
}

/// Serialization of markup values and raw client-script wrapping.
pub trait MarkupFormatter: Send + Sync {
    fn serialize(&self, node: &MarkupNode) -> String;

    /// Wrap a node in `tag` at the tree level, before serialization.
    fn wrap(&self, node: MarkupNode, tag: &str) -> MarkupNode {
        MarkupNode::Element { tag: tag.to_string(), children: vec![node] }
    }

    /// Wrap raw client-script code in a script element.
    fn wrap_script(&self, code: &str) -> String;
}

/// Plain HTML serialization with text escaping.
pub struct HtmlFormatter;

impl HtmlFormatter {
    fn escape(text: &str) -> String {
        let mut escaped = String::with_capacity(text.len());
        for c in text.chars() {
            match c {
                '&' => escaped.push_str("&amp;"),
                '<' => escaped.push_str("&lt;"),
                '>' => escaped.push_str("&gt;"),
                _ => escaped.push(c),
            }
        }
        escaped
    }
}

impl MarkupFormatter for HtmlFormatter {
    fn serialize(&self, node: &MarkupNode) -> String {
        match node {
            MarkupNode::Text(text) => Self::escape(text),
            MarkupNode::Element { tag, children } => {
                let mut out = String::new();
                out.push('<');
                out.push_str(tag);
                out.push('>');
                for child in children {
                    out.push_str(&self.serialize(child));
                }
                out.push_str("</");
                out.push_str(tag);
                out.push('>');
                out
            }
        }
    }

    fn wrap_script(&self, code: &str) -> String {
        format!("<script>{code}</script>")
    }
}
