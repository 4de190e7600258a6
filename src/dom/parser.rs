//! XHTML import and markup export
//!
//! Page snapshots handed over by the host are well-formed XHTML, so they are
//! read with roxmltree and copied into the arena. Export writes markup back
//! in the same shape so snapshots round-trip.

use thiserror::Error;

use super::document::{Document, NodeData, NodeId};

#[derive(Error, Debug)]
pub enum ParseError {
    #[error("Malformed markup: {0}")]
    Malformed(#[from] roxmltree::Error),
}

/// Elements written as `<tag/>`
const VOID_TAGS: &[&str] = &["area", "br", "col", "hr", "img", "input", "link", "meta", "source", "wbr"];

/// Parse an XHTML snapshot into a fresh document.
///
/// Accepts a full `<html>` document, a bare `<body>`, or any single root
/// element (which is then placed inside the body).
pub fn parse_xhtml(markup: &str) -> Result<Document, ParseError> {
    let source = roxmltree::Document::parse(markup)?;
    let mut doc = Document::new();
    let body = doc.body();

    let root = source.root_element();
    let content_root = match root.tag_name().name().to_ascii_lowercase().as_str() {
        "html" => root
            .children()
            .find(|n| n.is_element() && n.tag_name().name().eq_ignore_ascii_case("body")),
        "body" => Some(root),
        _ => None,
    };

    match content_root {
        Some(source_body) => {
            for attr in source_body.attributes() {
                doc.set_attr(body, attr.name(), attr.value());
            }
            for child in source_body.children() {
                import(&mut doc, body, child);
            }
        }
        None => import(&mut doc, body, root),
    }

    Ok(doc)
}

fn import(doc: &mut Document, parent: NodeId, node: roxmltree::Node<'_, '_>) {
    if node.is_text() {
        if let Some(value) = node.text() {
            let text = doc.create_text(value);
            doc.append_child(parent, text);
        }
        return;
    }
    if !node.is_element() {
        return;
    }
    let element = doc.create_element(node.tag_name().name());
    for attr in node.attributes() {
        doc.set_attr(element, attr.name(), attr.value());
    }
    doc.append_child(parent, element);
    for child in node.children() {
        import(doc, element, child);
    }
}

/// Markup of a node and its subtree
pub fn outer_html(doc: &Document, id: NodeId) -> String {
    let mut out = String::new();
    write_node(doc, id, &mut out);
    out
}

/// Markup of a node's children
pub fn inner_html(doc: &Document, id: NodeId) -> String {
    let mut out = String::new();
    for &child in doc.children(id) {
        write_node(doc, child, &mut out);
    }
    out
}

fn write_node(doc: &Document, id: NodeId, out: &mut String) {
    match doc.data(id) {
        NodeData::Text(value) => out.push_str(&html_escape::encode_text(value)),
        NodeData::Element { tag, attrs } => {
            out.push('<');
            out.push_str(tag);
            for (name, value) in attrs {
                out.push(' ');
                out.push_str(name);
                out.push_str("=\"");
                out.push_str(&html_escape::encode_double_quoted_attribute(value));
                out.push('"');
            }
            if VOID_TAGS.contains(&tag.as_str()) && doc.children(id).is_empty() {
                out.push_str("/>");
                return;
            }
            out.push('>');
            for &child in doc.children(id) {
                write_node(doc, child, out);
            }
            out.push_str("</");
            out.push_str(tag);
            out.push('>');
        }
    }
}
