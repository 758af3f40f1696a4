//! Structural validation of the export document
//!
//! Checks the serialized export against built-in grammars for
//! `evernote-export4.dtd` and `enml2.dtd`: allowed elements and attributes,
//! child ordering, timestamp and title formats, and that every `<en-media>`
//! points at one of its note's resources. Grammars are compiled on first use
//! and kept in a [`SchemaCache`] owned by the caller for the length of a run.

use std::collections::{HashMap, HashSet};
use std::sync::Arc;

use base64::{engine::general_purpose::STANDARD as BASE64, Engine};
use quick_xml::events::{BytesStart, Event};
use quick_xml::Reader;

use super::models::{is_xml_char, parse_enex_date, ENEX_DTD, ENML_DTD, MAX_TITLE_CHARS};
use crate::enml::whitelist;
use crate::error::{ConvertError, Result};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Occurs {
    One,
    Optional,
    Many,
}

/// Ordered child sequence, as in `(title, content, created?, ...)`
type ContentModel = Vec<(&'static str, Occurs)>;

/// Compiled rules of one DTD
#[derive(Debug)]
pub struct Grammar {
    system_id: String,
    root: &'static str,
    attributes: HashMap<&'static str, HashSet<&'static str>>,
    sequences: HashMap<&'static str, ContentModel>,
}

impl Grammar {
    pub fn system_id(&self) -> &str {
        &self.system_id
    }

    pub fn root(&self) -> &str {
        self.root
    }

    pub fn allows_element(&self, name: &str) -> bool {
        self.attributes.contains_key(name)
    }

    pub fn allows_attribute(&self, element: &str, attr: &str) -> bool {
        self.attributes
            .get(element)
            .map(|attrs| attrs.contains(attr))
            .unwrap_or(false)
    }

    fn sequence(&self, element: &str) -> Option<&ContentModel> {
        self.sequences.get(element)
    }

    fn export() -> Self {
        use Occurs::*;

        let note_attributes = [
            "subject-date", "latitude", "longitude", "altitude", "author", "source", "source-url",
            "source-application", "reminder-order", "reminder-time", "reminder-done-time",
            "place-name", "content-class", "application-data",
        ];
        let resource_attributes = [
            "source-url", "timestamp", "latitude", "longitude", "altitude", "camera-make",
            "camera-model", "reco-type", "file-name", "attachment", "application-data",
        ];

        let mut attributes: HashMap<&'static str, HashSet<&'static str>> = HashMap::new();
        attributes.insert("en-export", ["export-date", "application", "version"].into());
        attributes.insert("data", ["encoding"].into());
        attributes.insert("application-data", ["key"].into());
        for name in [
            "note", "title", "content", "created", "updated", "tag", "note-attributes", "resource",
            "mime", "width", "height", "duration", "recognition", "resource-attributes",
            "alternate-data",
        ] {
            attributes.entry(name).or_default();
        }
        for name in note_attributes.into_iter().chain(resource_attributes) {
            attributes.entry(name).or_default();
        }

        let optional = |names: &[&'static str]| -> ContentModel {
            names
                .iter()
                .map(|n| (*n, if *n == "application-data" { Many } else { Optional }))
                .collect()
        };

        let mut sequences = HashMap::new();
        sequences.insert("en-export", vec![("note", Many)]);
        sequences.insert(
            "note",
            vec![
                ("title", One),
                ("content", One),
                ("created", Optional),
                ("updated", Optional),
                ("tag", Many),
                ("note-attributes", Optional),
                ("resource", Many),
            ],
        );
        sequences.insert(
            "resource",
            vec![
                ("data", One),
                ("mime", One),
                ("width", Optional),
                ("height", Optional),
                ("duration", Optional),
                ("recognition", Optional),
                ("resource-attributes", Optional),
                ("alternate-data", Optional),
            ],
        );
        sequences.insert("note-attributes", optional(&note_attributes));
        sequences.insert("resource-attributes", optional(&resource_attributes));

        Self {
            system_id: ENEX_DTD.to_string(),
            root: "en-export",
            attributes,
            sequences,
        }
    }

    fn enml() -> Self {
        let attributes = whitelist::element_names()
            .map(|name| (name, whitelist::allowed_attributes(name).into_iter().collect()))
            .collect();

        Self {
            system_id: ENML_DTD.to_string(),
            root: "en-note",
            attributes,
            sequences: HashMap::new(),
        }
    }
}

/// Grammars keyed by DOCTYPE system id, compiled once per run
#[derive(Debug, Default)]
pub struct SchemaCache {
    grammars: HashMap<String, Arc<Grammar>>,
}

impl SchemaCache {
    pub fn new() -> Self {
        Self::default()
    }

    /// Grammar for a DOCTYPE system id, compiling it on first request
    pub fn grammar(&mut self, system_id: &str) -> Result<Arc<Grammar>> {
        if let Some(grammar) = self.grammars.get(system_id) {
            return Ok(Arc::clone(grammar));
        }

        let grammar = match system_id {
            ENEX_DTD => Grammar::export(),
            ENML_DTD => Grammar::enml(),
            other => {
                return Err(ConvertError::validation(
                    "DOCTYPE",
                    format!("no grammar available for {}", other),
                ))
            }
        };
        log::debug!("Compiled grammar for {}", system_id);

        let grammar = Arc::new(grammar);
        self.grammars.insert(system_id.to_string(), Arc::clone(&grammar));
        Ok(grammar)
    }

    /// Number of grammars compiled so far
    pub fn len(&self) -> usize {
        self.grammars.len()
    }

    pub fn is_empty(&self) -> bool {
        self.grammars.is_empty()
    }
}

/// Tracks one element's children against its content model
struct SequenceCursor {
    slot: usize,
    seen_in_slot: bool,
}

impl SequenceCursor {
    fn new() -> Self {
        Self {
            slot: 0,
            seen_in_slot: false,
        }
    }

    fn accept(&mut self, model: &ContentModel, child: &str) -> std::result::Result<(), String> {
        while self.slot < model.len() {
            let (name, occurs) = model[self.slot];
            if name == child {
                if self.seen_in_slot && occurs != Occurs::Many {
                    return Err(format!("<{}> may appear only once", child));
                }
                self.seen_in_slot = true;
                return Ok(());
            }
            if occurs == Occurs::One && !self.seen_in_slot {
                return Err(format!("expected <{}> before <{}>", name, child));
            }
            self.slot += 1;
            self.seen_in_slot = false;
        }
        Err(format!("<{}> is not allowed here", child))
    }

    fn finish(&self, model: &ContentModel) -> std::result::Result<(), String> {
        for (i, (name, occurs)) in model.iter().enumerate().skip(self.slot) {
            let satisfied = i == self.slot && self.seen_in_slot;
            if *occurs == Occurs::One && !satisfied {
                return Err(format!("missing <{}>", name));
            }
        }
        Ok(())
    }
}

/// Per-note facts gathered while reading
#[derive(Default)]
struct NoteState {
    index: usize,
    title: String,
    resource_hashes: HashSet<String>,
    media_hashes: Vec<String>,
}

impl NoteState {
    fn location(&self, path: &str) -> String {
        if self.title.is_empty() {
            format!("note {} {}", self.index, path)
        } else {
            format!("note {} ({}) {}", self.index, self.title, path)
        }
    }
}

/// Validate a serialized export document.
///
/// Returns the first problem found as `ConvertError::Validation`.
pub fn validate_export(xml: &[u8], schemas: &mut SchemaCache) -> Result<()> {
    let xml = std::str::from_utf8(xml)
        .map_err(|e| ConvertError::validation("document", format!("not UTF-8: {}", e)))?;

    let mut reader = Reader::from_str(xml);
    let mut buf = Vec::new();

    let mut grammar: Option<Arc<Grammar>> = None;
    let mut stack: Vec<(String, SequenceCursor)> = Vec::new();
    let mut text = String::new();
    let mut note = NoteState::default();
    let mut note_count = 0;
    let mut saw_root = false;

    loop {
        let position = reader.buffer_position() as u64;
        let event = reader.read_event_into(&mut buf).map_err(|e| {
            ConvertError::validation(format!("byte {}", position), format!("malformed XML: {}", e))
        })?;

        match event {
            Event::DocType(ref e) => {
                let system_id = doctype_system_id(&String::from_utf8_lossy(e))
                    .ok_or_else(|| ConvertError::validation("DOCTYPE", "missing system id"))?;
                grammar = Some(schemas.grammar(&system_id)?);
            }
            Event::Start(ref e) | Event::Empty(ref e) => {
                let is_empty = matches!(event, Event::Empty(_));
                let grammar = grammar
                    .as_ref()
                    .ok_or_else(|| ConvertError::validation("document", "missing DOCTYPE"))?;
                let name = element_name(e);
                let path = element_path(&stack, &name);

                match stack.last_mut() {
                    None => {
                        if saw_root || name != grammar.root() {
                            return Err(ConvertError::validation(
                                path,
                                format!("root element must be <{}>", grammar.root()),
                            ));
                        }
                        saw_root = true;
                    }
                    Some((parent, cursor)) => {
                        let model = grammar.sequence(parent).ok_or_else(|| {
                            ConvertError::validation(note.location(&path), "unexpected child element")
                        })?;
                        cursor
                            .accept(model, &name)
                            .map_err(|msg| ConvertError::validation(note.location(&path), msg))?;
                    }
                }
                check_element(grammar, e, &name)
                    .map_err(|msg| ConvertError::validation(note.location(&path), msg))?;

                if name == "note" {
                    note_count += 1;
                    note = NoteState {
                        index: note_count,
                        ..Default::default()
                    };
                }

                text.clear();
                if is_empty {
                    close_element(grammar, &name, &path, &SequenceCursor::new(), "", &mut note, schemas)?;
                } else {
                    stack.push((name, SequenceCursor::new()));
                }
            }
            Event::Text(ref e) => {
                let unescaped = e.unescape().map_err(|err| {
                    ConvertError::validation(format!("byte {}", position), err.to_string())
                })?;
                text.push_str(&unescaped);
            }
            Event::CData(ref e) => {
                text.push_str(&String::from_utf8_lossy(e));
            }
            Event::End(_) => {
                let grammar = grammar
                    .as_ref()
                    .ok_or_else(|| ConvertError::validation("document", "missing DOCTYPE"))?;
                let Some((name, cursor)) = stack.pop() else {
                    return Err(ConvertError::validation(format!("byte {}", position), "unbalanced end tag"));
                };
                let path = element_path(&stack, &name);
                close_element(grammar, &name, &path, &cursor, &text, &mut note, schemas)?;
                text.clear();
            }
            Event::Eof => break,
            _ => {}
        }
        buf.clear();
    }

    if !saw_root {
        return Err(ConvertError::validation("document", "no root element"));
    }
    if note_count == 0 {
        return Err(ConvertError::validation("/en-export", "export contains no notes"));
    }
    Ok(())
}

/// Checks run when an element closes, with its collected text
fn close_element(
    grammar: &Grammar,
    name: &str,
    path: &str,
    cursor: &SequenceCursor,
    text: &str,
    note: &mut NoteState,
    schemas: &mut SchemaCache,
) -> Result<()> {
    let fail = |note: &NoteState, msg: String| ConvertError::validation(note.location(path), msg);

    if let Some(model) = grammar.sequence(name) {
        cursor.finish(model).map_err(|msg| fail(&*note, msg))?;
    }

    match name {
        "title" => {
            note.title = text.to_string();
            check_title(text).map_err(|msg| fail(&*note, msg))?;
        }
        "tag" => {
            check_tag(text).map_err(|msg| fail(&*note, msg))?;
        }
        "created" | "updated" => {
            if parse_enex_date(text).is_none() {
                return Err(fail(&*note, format!("timestamp {:?} is not yyyyMMddThhmmssZ", text)));
            }
        }
        "mime" if text.trim().is_empty() => {
            return Err(fail(&*note, "empty MIME type".to_string()));
        }
        "data" => {
            let cleaned: String = text.chars().filter(|c| !c.is_whitespace()).collect();
            let data = BASE64
                .decode(cleaned.as_bytes())
                .map_err(|e| fail(&*note, format!("invalid base64: {}", e)))?;
            note.resource_hashes.insert(format!("{:x}", md5::compute(&data)));
        }
        "content" => {
            let hashes = validate_enml(text, schemas)
                .map_err(|msg| fail(&*note, format!("invalid ENML: {}", msg)))?;
            note.media_hashes = hashes;
        }
        "note" => {
            if let Some(hash) = note.media_hashes.iter().find(|h| !note.resource_hashes.contains(*h)) {
                return Err(fail(&*note, format!("en-media hash {} has no matching resource", hash)));
            }
        }
        _ => {}
    }
    Ok(())
}

fn check_title(title: &str) -> std::result::Result<(), String> {
    let chars = title.chars().count();
    if chars == 0 || chars > MAX_TITLE_CHARS {
        return Err(format!("title must be 1-{} characters, got {}", MAX_TITLE_CHARS, chars));
    }
    if title.contains(['\n', '\r']) {
        return Err("title contains a line break".to_string());
    }
    if title.trim() != title {
        return Err("title has surrounding whitespace".to_string());
    }
    check_xml_chars(title)
}

fn check_tag(tag: &str) -> std::result::Result<(), String> {
    if tag.trim().is_empty() {
        return Err("empty tag".to_string());
    }
    check_xml_chars(tag)
}

fn check_xml_chars(text: &str) -> std::result::Result<(), String> {
    match text.chars().find(|c| !is_xml_char(*c)) {
        Some(c) => Err(format!("character U+{:04X} is not allowed in XML", c as u32)),
        None => Ok(()),
    }
}

/// Validate one note's ENML document, returning its en-media hashes
fn validate_enml(content: &str, schemas: &mut SchemaCache) -> std::result::Result<Vec<String>, String> {
    let mut reader = Reader::from_str(content);
    let mut buf = Vec::new();
    let mut grammar: Option<Arc<Grammar>> = None;
    let mut stack: Vec<String> = Vec::new();
    let mut saw_root = false;
    let mut hashes = Vec::new();

    loop {
        let position = reader.buffer_position() as u64;
        let event = reader
            .read_event_into(&mut buf)
            .map_err(|e| format!("byte {}: {}", position, e))?;

        match event {
            Event::DocType(ref e) => {
                let system_id = doctype_system_id(&String::from_utf8_lossy(e))
                    .ok_or_else(|| "DOCTYPE without system id".to_string())?;
                grammar = Some(schemas.grammar(&system_id).map_err(|e| e.to_string())?);
            }
            Event::Start(ref e) | Event::Empty(ref e) => {
                let grammar = grammar.as_ref().ok_or_else(|| "missing DOCTYPE".to_string())?;
                let name = element_name(e);
                let path = format!("/{}", stack.iter().chain([&name]).cloned().collect::<Vec<_>>().join("/"));

                if stack.is_empty() {
                    if saw_root || name != grammar.root() {
                        return Err(format!("{}: root element must be <{}>", path, grammar.root()));
                    }
                    saw_root = true;
                }
                check_element(grammar, e, &name).map_err(|msg| format!("{}: {}", path, msg))?;
                check_nesting(&stack, &name).map_err(|msg| format!("{}: {}", path, msg))?;

                if name == "en-media" {
                    let hash = attribute_value(e, "hash")
                        .ok_or_else(|| format!("{}: en-media without hash", path))?;
                    if attribute_value(e, "type").is_none() {
                        return Err(format!("{}: en-media without type", path));
                    }
                    hashes.push(hash);
                }

                if matches!(event, Event::Start(_)) {
                    stack.push(name);
                }
            }
            Event::End(_) => {
                stack.pop();
            }
            Event::Text(ref e) => {
                let blank = e.unescape().map(|t| t.trim().is_empty()).unwrap_or(false);
                match stack.last() {
                    None if !blank => return Err(format!("byte {}: text outside <en-note>", position)),
                    Some(parent) if !blank && whitelist::is_void_element(parent) => {
                        return Err(format!("byte {}: <{}> must be empty", position, parent))
                    }
                    _ => {}
                }
            }
            Event::Eof => break,
            _ => {}
        }
        buf.clear();
    }

    if !saw_root {
        return Err("no <en-note> root".to_string());
    }
    Ok(hashes)
}

/// Placement rules the flat whitelist cannot express
fn check_nesting(stack: &[String], name: &str) -> std::result::Result<(), String> {
    if let Some(parent) = stack.last() {
        if whitelist::is_void_element(parent) {
            return Err(format!("<{}> must be empty", parent));
        }
        if name == "en-note" {
            return Err("<en-note> cannot be nested".to_string());
        }
    }
    if name == "a" && stack.iter().any(|open| open == "a") {
        return Err("<a> cannot contain another <a>".to_string());
    }
    Ok(())
}

/// Element allowed and every attribute allowed on it
fn check_element(grammar: &Grammar, e: &BytesStart, name: &str) -> std::result::Result<(), String> {
    if !grammar.allows_element(name) {
        return Err(format!("<{}> is not part of {}", name, grammar.system_id()));
    }
    for attr in e.attributes() {
        let attr = attr.map_err(|err| format!("bad attribute: {}", err))?;
        let key = String::from_utf8_lossy(attr.key.as_ref()).to_string();
        if !grammar.allows_attribute(name, &key) {
            return Err(format!("attribute {} not allowed on <{}>", key, name));
        }
    }
    Ok(())
}

fn element_name(e: &BytesStart) -> String {
    String::from_utf8_lossy(e.name().as_ref()).to_string()
}

fn attribute_value(e: &BytesStart, key: &str) -> Option<String> {
    e.attributes()
        .filter_map(|a| a.ok())
        .find(|a| a.key.as_ref() == key.as_bytes())
        .and_then(|a| a.unescape_value().ok().map(|v| v.to_string()))
        .filter(|v| !v.is_empty())
}

fn element_path(stack: &[(String, SequenceCursor)], name: &str) -> String {
    let mut path = String::new();
    for (parent, _) in stack {
        path.push('/');
        path.push_str(parent);
    }
    path.push('/');
    path.push_str(name);
    path
}

/// The quoted system id of `<!DOCTYPE root SYSTEM "...">`
fn doctype_system_id(doctype: &str) -> Option<String> {
    let end = doctype.rfind('"')?;
    let start = doctype[..end].rfind('"')?;
    Some(doctype[start + 1..end].to_string())
}
