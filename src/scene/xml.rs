//! Attribute helpers for level XML.
//!
//! Numeric attributes follow the lenient level-file convention: a missing
//! attribute takes the default, an unparsable one reads as zero.

use roxmltree::Node;

/// First child element named `name`.
pub(crate) fn child<'a, 'input>(node: Node<'a, 'input>, name: &str) -> Option<Node<'a, 'input>> {
    node.children().find(|c| c.is_element() && c.has_tag_name(name))
}

/// Every child element named `name`, in document order.
pub(crate) fn children<'a, 'input: 'a>(
    node: Node<'a, 'input>,
    name: &'a str,
) -> impl Iterator<Item = Node<'a, 'input>> + 'a {
    node.children().filter(move |c| c.is_element() && c.has_tag_name(name))
}

pub(crate) fn attr_str<'a>(node: Node<'a, '_>, name: &str, default: &'a str) -> &'a str {
    node.attribute(name).unwrap_or(default)
}

pub(crate) fn attr_f32(node: Node<'_, '_>, name: &str, default: f32) -> f32 {
    match node.attribute(name) {
        Some(value) => value.trim().parse().unwrap_or(0.0),
        None => default,
    }
}

pub(crate) fn attr_i32(node: Node<'_, '_>, name: &str, default: i32) -> i32 {
    match node.attribute(name) {
        Some(value) => value.trim().parse().unwrap_or(0),
        None => default,
    }
}

/// Only the literal `true` is true.
pub(crate) fn attr_bool(node: Node<'_, '_>, name: &str) -> bool {
    node.attribute(name) == Some("true")
}

#[cfg(test)]
mod tests {
    use super::*;
    use roxmltree::Document;

    #[test]
    fn test_lenient_numbers() {
        let doc = Document::parse(r#"<p x="1.5" y="abc" flag="true" other="TRUE"/>"#).unwrap();
        let node = doc.root_element();
        assert_eq!(attr_f32(node, "x", 9.0), 1.5);
        assert_eq!(attr_f32(node, "y", 9.0), 0.0);
        assert_eq!(attr_f32(node, "z", 9.0), 9.0);
        assert_eq!(attr_i32(node, "z", -1), -1);
        assert!(attr_bool(node, "flag"));
        assert!(!attr_bool(node, "other"));
    }
}
