//! Lenient HTML parsing using html5ever
//!
//! Renderer output is a body fragment; it is wrapped in a minimal document so
//! html5ever recovers from anything malformed the way a browser would.

use html5ever::tendril::TendrilSink;
use html5ever::{parse_document, ParseOpts};
use markup5ever_rcdom::{Handle, NodeData, RcDom};

/// Parse an HTML fragment into a document.
///
/// The returned `RcDom` owns the tree; handles taken from it are only
/// populated while it is alive.
pub fn parse_fragment(html: &str) -> RcDom {
    let wrapped = format!("<!DOCTYPE html><html><head></head><body>{}</body></html>", html);
    parse_document(RcDom::default(), ParseOpts::default())
        .from_utf8()
        .one(wrapped.as_bytes())
}

/// The `<body>` element holding the parsed fragment
pub fn fragment_body(dom: &RcDom) -> Option<Handle> {
    find_first_element(&dom.document, "body")
}

/// Get the first element with the given local name
pub fn find_first_element(handle: &Handle, name: &str) -> Option<Handle> {
    if element_name(handle).as_deref() == Some(name) {
        return Some(handle.clone());
    }

    for child in handle.children.borrow().iter() {
        if let Some(found) = find_first_element(child, name) {
            return Some(found);
        }
    }

    None
}

/// Lowercase local name of an element node
pub fn element_name(handle: &Handle) -> Option<String> {
    match handle.data {
        NodeData::Element { ref name, .. } => Some(name.local.as_ref().to_ascii_lowercase()),
        _ => None,
    }
}

/// Value of an attribute on an element node
pub fn attribute(handle: &Handle, attr: &str) -> Option<String> {
    match handle.data {
        NodeData::Element { ref attrs, .. } => attrs
            .borrow()
            .iter()
            .find(|a| a.name.local.as_ref().eq_ignore_ascii_case(attr))
            .map(|a| a.value.to_string()),
        _ => None,
    }
}

/// All attributes of an element node as (name, value) pairs
pub fn attributes(handle: &Handle) -> Vec<(String, String)> {
    match handle.data {
        NodeData::Element { ref attrs, .. } => attrs
            .borrow()
            .iter()
            .map(|a| {
                let name = match a.name.prefix {
                    Some(ref prefix) => format!("{}:{}", prefix.as_ref(), a.name.local.as_ref()),
                    None => a.name.local.as_ref().to_string(),
                };
                (name.to_ascii_lowercase(), a.value.to_string())
            })
            .collect(),
        _ => Vec::new(),
    }
}

/// Concatenated text of a node and its descendants
pub fn text_content(handle: &Handle) -> String {
    let mut out = String::new();
    collect_text(handle, &mut out);
    out
}

fn collect_text(handle: &Handle, out: &mut String) {
    if let NodeData::Text { ref contents } = handle.data {
        out.push_str(&contents.borrow());
    }
    for child in handle.children.borrow().iter() {
        collect_text(child, out);
    }
}

/// Whether a node carries nothing visible (whitespace text or a comment)
pub fn is_blank(handle: &Handle) -> bool {
    match handle.data {
        NodeData::Text { ref contents } => contents.borrow().trim().is_empty(),
        NodeData::Comment { .. } => true,
        _ => false,
    }
}

/// Detach the first element child of `parent` if it is a `<tag>`,
/// skipping leading blank nodes. Returns the removed element.
pub fn remove_leading_element(parent: &Handle, tag: &str) -> Option<Handle> {
    let mut children = parent.children.borrow_mut();
    let idx = children.iter().position(|child| !is_blank(child))?;
    if element_name(&children[idx]).as_deref() != Some(tag) {
        return None;
    }
    Some(children.remove(idx))
}
