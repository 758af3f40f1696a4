//! Rendered HTML to ENML
//!
//! Walks the parsed HTML tree and re-emits it using only the ENML vocabulary:
//! allowed elements are kept with their allowed attributes, anything else is
//! unwrapped so its text survives, and local media references become
//! `<en-media>` elements backed by collected resources.

use std::path::{Path, PathBuf};
use std::sync::LazyLock;

use markup5ever_rcdom::{Handle, NodeData};
use regex::Regex;

use super::dom;
use super::resources::collect_resource;
use super::whitelist::{is_allowed_attribute, is_allowed_element, is_void_element};
use crate::enex::{strip_non_xml_chars, Resource, ENML_DTD};
use crate::error::Result;

const XML_DECLARATION: &str = r#"<?xml version="1.0" encoding="UTF-8" standalone="no"?>"#;

/// Elements that may point at a media file, and the attribute holding the path
const MEDIA_SOURCES: &[(&str, &str)] = &[
    ("img", "src"),
    ("video", "src"),
    ("audio", "src"),
    ("embed", "src"),
    ("source", "src"),
    ("a", "href"),
];

/// A URL scheme prefix; two characters minimum so `C:\` paths stay local
static URL_SCHEME_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^[A-Za-z][A-Za-z0-9+.\-]+:").expect("valid scheme regex"));

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TransformOptions {
    /// Turn links to local files into attachments
    pub collect_linked_files: bool,
    /// Reuse an existing resource when the same bytes are referenced again
    pub dedup_resources: bool,
}

impl Default for TransformOptions {
    fn default() -> Self {
        Self {
            collect_linked_files: true,
            dedup_resources: false,
        }
    }
}

/// Output of the transform for one note
#[derive(Debug, Clone)]
pub struct EnmlDocument {
    /// Complete ENML document ready for `<content>`
    pub content: String,
    /// Resources referenced from `content`, in reference order
    pub resources: Vec<Resource>,
    /// Text of the leading `<h1>` that was dropped, if any
    pub removed_heading: Option<String>,
}

/// Convert rendered HTML into an ENML document.
///
/// Relative media paths are resolved against `base_dir`. A reference to a
/// missing file fails the whole note with `MissingResource`.
pub fn html_to_enml(html: &str, base_dir: &Path, options: &TransformOptions) -> Result<EnmlDocument> {
    let mut writer = EnmlWriter::new(base_dir, options);
    let mut removed_heading = None;

    let document = dom::parse_fragment(html);
    if let Some(body) = dom::fragment_body(&document) {
        // The title heading duplicates the note title
        removed_heading = dom::remove_leading_element(&body, "h1")
            .map(|h1| collapse_whitespace(&dom::text_content(&h1)))
            .filter(|text| !text.is_empty());

        for child in body.children.borrow().iter() {
            writer.visit(child)?;
        }
    }

    let (body, resources) = writer.finish();
    Ok(EnmlDocument {
        content: wrap_en_note(&body),
        resources,
        removed_heading,
    })
}

/// Wrap ENML body markup into a standalone ENML document
pub fn wrap_en_note(body: &str) -> String {
    format!(
        "{}\n<!DOCTYPE en-note SYSTEM \"{}\">\n<en-note>{}</en-note>",
        XML_DECLARATION, ENML_DTD, body
    )
}

/// Depth-first visitor emitting ENML markup
struct EnmlWriter<'a> {
    out: String,
    base_dir: &'a Path,
    options: &'a TransformOptions,
    resources: Vec<Resource>,
    /// Number of `<a>` elements currently open in the output
    open_links: usize,
}

impl<'a> EnmlWriter<'a> {
    fn new(base_dir: &'a Path, options: &'a TransformOptions) -> Self {
        Self {
            out: String::new(),
            base_dir,
            options,
            resources: Vec::new(),
            open_links: 0,
        }
    }

    fn finish(self) -> (String, Vec<Resource>) {
        (self.out, self.resources)
    }

    fn visit(&mut self, handle: &Handle) -> Result<()> {
        match handle.data {
            NodeData::Text { ref contents } => {
                self.push_text(&contents.borrow());
                Ok(())
            }
            NodeData::Element { .. } => self.visit_element(handle),
            // Comments, doctypes and processing instructions have no ENML form
            _ => Ok(()),
        }
    }

    fn visit_children(&mut self, handle: &Handle) -> Result<()> {
        for child in handle.children.borrow().iter() {
            self.visit(child)?;
        }
        Ok(())
    }

    fn visit_element(&mut self, handle: &Handle) -> Result<()> {
        let Some(tag) = dom::element_name(handle) else {
            return Ok(());
        };

        if tag == "input" {
            return self.visit_input(handle);
        }

        if let Some(target) = media_target(handle, &tag) {
            if is_remote(&target) {
                if !is_allowed_element(&tag) {
                    return self.emit_remote_link(handle, &target);
                }
            } else if let Some(path) = local_path(&target) {
                if tag != "a" {
                    return self.emit_media(handle, &tag, &path);
                }
                if self.options.collect_linked_files {
                    // Keep the link text, then attach the file itself
                    self.visit_children(handle)?;
                    return self.emit_media(handle, &tag, &path);
                }
                return self.visit_children(handle);
            }
        }

        // `en-*` markup is only ever generated here, never passed through
        if !is_allowed_element(&tag) || tag.starts_with("en-") {
            return self.visit_children(handle);
        }

        let attrs = kept_attributes(handle, &tag);
        if tag == "a" {
            if self.open_links > 0 || !attrs.iter().any(|(name, _)| name == "href" || name == "name") {
                // Nested links and links with nowhere to go are just their text
                return self.visit_children(handle);
            }
            self.open_tag("a", &attrs);
            self.out.push('>');
            self.open_links += 1;
            let result = self.visit_children(handle);
            self.open_links -= 1;
            result?;
            self.close_tag("a");
            return Ok(());
        }

        self.open_tag(&tag, &attrs);
        if is_void_element(&tag) {
            self.out.push_str("/>");
            return Ok(());
        }
        self.out.push('>');
        self.visit_children(handle)?;
        self.close_tag(&tag);
        Ok(())
    }

    /// Task-list checkboxes become `<en-todo>`, other inputs vanish
    fn visit_input(&mut self, handle: &Handle) -> Result<()> {
        let is_checkbox = dom::attribute(handle, "type")
            .map(|t| t.eq_ignore_ascii_case("checkbox"))
            .unwrap_or(false);
        if is_checkbox {
            let checked = dom::attribute(handle, "checked").is_some();
            self.out.push_str(&format!("<en-todo checked=\"{}\"/>", checked));
        }
        Ok(())
    }

    /// Replace a local reference with `<en-media>` and record its resource
    fn emit_media(&mut self, handle: &Handle, tag: &str, relative: &Path) -> Result<()> {
        let width = dom::attribute(handle, "width").and_then(|v| parse_dimension(&v));
        let height = dom::attribute(handle, "height").and_then(|v| parse_dimension(&v));

        let path = self.base_dir.join(relative);
        let resource = collect_resource(&path, (width, height))?;

        let mut attrs = vec![
            ("type".to_string(), resource.mime.clone()),
            ("hash".to_string(), resource.hash.clone()),
        ];
        if tag != "a" {
            for name in ["alt", "title"] {
                if let Some(value) = dom::attribute(handle, name) {
                    attrs.push((name.to_string(), value));
                }
            }
        }
        if let Some(w) = width {
            attrs.push(("width".to_string(), w.to_string()));
        }
        if let Some(h) = height {
            attrs.push(("height".to_string(), h.to_string()));
        }

        self.open_tag("en-media", &attrs);
        self.out.push_str("/>");

        let duplicate = self.options.dedup_resources
            && self.resources.iter().any(|r| r.hash == resource.hash);
        if !duplicate {
            self.resources.push(resource);
        }
        Ok(())
    }

    /// Media tags with no ENML form pointing at a remote URL become a link
    fn emit_remote_link(&mut self, handle: &Handle, url: &str) -> Result<()> {
        let nested = self.open_links > 0;
        if !nested {
            self.open_tag("a", &[("href".to_string(), url.to_string())]);
            self.out.push('>');
            self.open_links += 1;
        }
        let before = self.out.len();
        let result = self.visit_children(handle);
        if !nested {
            self.open_links -= 1;
        }
        result?;
        if self.out[before..].trim().is_empty() {
            self.out.truncate(before);
            self.push_text(url);
        }
        if !nested {
            self.close_tag("a");
        }
        Ok(())
    }

    fn open_tag(&mut self, tag: &str, attrs: &[(String, String)]) {
        self.out.push('<');
        self.out.push_str(tag);
        for (name, value) in attrs {
            self.out.push(' ');
            self.out.push_str(name);
            self.out.push_str("=\"");
            self.out.push_str(&escape(value));
            self.out.push('"');
        }
    }

    fn close_tag(&mut self, tag: &str) {
        self.out.push_str("</");
        self.out.push_str(tag);
        self.out.push('>');
    }

    fn push_text(&mut self, text: &str) {
        self.out.push_str(&escape(text));
    }
}

/// Value of the element's media attribute, if it is a media element
fn media_target(handle: &Handle, tag: &str) -> Option<String> {
    let (_, attr) = MEDIA_SOURCES.iter().find(|(name, _)| *name == tag)?;
    dom::attribute(handle, attr)
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
}

/// Whether a reference is an absolute URL (`https:`, `mailto:`, `data:`...)
pub fn is_remote(target: &str) -> bool {
    URL_SCHEME_RE.is_match(target) || target.starts_with("//")
}

/// Decode a relative file reference; `None` for in-page anchors
fn local_path(target: &str) -> Option<PathBuf> {
    let without_fragment = target.split('#').next().unwrap_or_default();
    let without_query = without_fragment.split('?').next().unwrap_or_default();
    if without_query.is_empty() {
        return None;
    }
    let decoded = urlencoding::decode(without_query)
        .map(|s| s.into_owned())
        .unwrap_or_else(|_| without_query.to_string());
    Some(PathBuf::from(decoded))
}

/// Attributes of `handle` that ENML allows on `tag`
fn kept_attributes(handle: &Handle, tag: &str) -> Vec<(String, String)> {
    dom::attributes(handle)
        .into_iter()
        .filter(|(name, _)| is_allowed_attribute(tag, name))
        .filter(|(name, value)| match name.as_str() {
            "href" => is_remote(value) && !value.trim_start().to_ascii_lowercase().starts_with("javascript:"),
            "src" => is_remote(value),
            _ => true,
        })
        .collect()
}

/// Leading digits of `100`, `100px`
fn parse_dimension(value: &str) -> Option<u32> {
    let digits: String = value.trim().chars().take_while(|c| c.is_ascii_digit()).collect();
    digits.parse().ok().filter(|v| *v > 0)
}

fn collapse_whitespace(text: &str) -> String {
    text.split_whitespace().collect::<Vec<_>>().join(" ")
}

/// XML-escape text, dropping characters XML 1.0 cannot carry
fn escape(text: &str) -> String {
    let clean = strip_non_xml_chars(text);
    quick_xml::escape::escape(clean.as_str()).into_owned()
}
