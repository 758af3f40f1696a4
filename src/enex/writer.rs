use std::fs;
use std::path::{Path, PathBuf};

use base64::{engine::general_purpose::STANDARD as BASE64, Engine};
use chrono::{DateTime, Utc};
use quick_xml::events::{BytesCData, BytesDecl, BytesEnd, BytesStart, BytesText, Event};
use quick_xml::Writer;

use super::models::{format_enex_date, Note, Resource, ENEX_DTD};
use super::validate::{validate_export, SchemaCache};
use crate::error::{ConvertError, Result};

pub const APP_NAME: &str = "md2enex";
pub const APP_VERSION: &str = env!("CARGO_PKG_VERSION");

/// Accumulates notes in input order and serializes them as one export
#[derive(Debug, Default)]
pub struct ExportBuilder {
    notes: Vec<Note>,
}

impl ExportBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, note: Note) {
        self.notes.push(note);
    }

    pub fn len(&self) -> usize {
        self.notes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.notes.is_empty()
    }

    pub fn notes(&self) -> &[Note] {
        &self.notes
    }

    /// Serialize without validating
    pub fn serialize(&self, export_date: DateTime<Utc>) -> Result<Vec<u8>> {
        let mut writer = Writer::new_with_indent(Vec::new(), b' ', 2);

        writer.write_event(Event::Decl(BytesDecl::new("1.0", Some("UTF-8"), None)))?;
        writer.write_event(Event::DocType(BytesText::from_escaped(format!(
            "en-export SYSTEM \"{}\"",
            ENEX_DTD
        ))))?;

        let date = format_enex_date(&export_date);
        let root = BytesStart::new("en-export").with_attributes([
            ("export-date", date.as_str()),
            ("application", APP_NAME),
            ("version", APP_VERSION),
        ]);
        writer.write_event(Event::Start(root))?;
        for note in &self.notes {
            write_note(&mut writer, note)?;
        }
        writer.write_event(Event::End(BytesEnd::new("en-export")))?;

        let mut bytes = writer.into_inner();
        bytes.push(b'\n');
        Ok(bytes)
    }

    /// Serialize and validate the export.
    ///
    /// An empty builder or a document failing validation yields an error and
    /// no bytes.
    pub fn finish(&self, export_date: DateTime<Utc>, schemas: &mut SchemaCache) -> Result<Vec<u8>> {
        if self.notes.is_empty() {
            return Err(ConvertError::validation("/en-export", "export contains no notes"));
        }
        let bytes = self.serialize(export_date)?;
        validate_export(&bytes, schemas)?;
        Ok(bytes)
    }

    /// Finish and atomically write the export to `path`
    pub fn write_to(&self, path: &Path, export_date: DateTime<Utc>, schemas: &mut SchemaCache) -> Result<()> {
        let bytes = self.finish(export_date, schemas)?;
        write_atomic(path, &bytes)?;
        log::info!("Wrote {} notes to {}", self.notes.len(), path.display());
        Ok(())
    }
}

fn write_note(writer: &mut Writer<Vec<u8>>, note: &Note) -> Result<()> {
    writer.write_event(Event::Start(BytesStart::new("note")))?;

    text_element(writer, "title", &note.title)?;

    writer.write_event(Event::Start(BytesStart::new("content")))?;
    for chunk in cdata_chunks(&note.content) {
        writer.write_event(Event::CData(BytesCData::new(chunk)))?;
    }
    writer.write_event(Event::End(BytesEnd::new("content")))?;

    text_element(writer, "created", &format_enex_date(&note.created))?;
    text_element(writer, "updated", &format_enex_date(&note.updated))?;
    for tag in &note.tags {
        text_element(writer, "tag", tag)?;
    }
    writer.write_event(Event::Empty(BytesStart::new("note-attributes")))?;

    for resource in &note.resources {
        write_resource(writer, resource)?;
    }

    writer.write_event(Event::End(BytesEnd::new("note")))?;
    Ok(())
}

fn write_resource(writer: &mut Writer<Vec<u8>>, resource: &Resource) -> Result<()> {
    writer.write_event(Event::Start(BytesStart::new("resource")))?;

    let data = BytesStart::new("data").with_attributes([("encoding", "base64")]);
    writer.write_event(Event::Start(data))?;
    writer.write_event(Event::Text(BytesText::new(&BASE64.encode(&resource.data))))?;
    writer.write_event(Event::End(BytesEnd::new("data")))?;

    text_element(writer, "mime", &resource.mime)?;
    if let Some(width) = resource.width {
        text_element(writer, "width", &width.to_string())?;
    }
    if let Some(height) = resource.height {
        text_element(writer, "height", &height.to_string())?;
    }

    writer.write_event(Event::Start(BytesStart::new("resource-attributes")))?;
    text_element(writer, "file-name", &resource.file_name)?;
    writer.write_event(Event::End(BytesEnd::new("resource-attributes")))?;

    writer.write_event(Event::End(BytesEnd::new("resource")))?;
    Ok(())
}

fn text_element(writer: &mut Writer<Vec<u8>>, name: &str, text: &str) -> Result<()> {
    writer.write_event(Event::Start(BytesStart::new(name)))?;
    writer.write_event(Event::Text(BytesText::new(text)))?;
    writer.write_event(Event::End(BytesEnd::new(name)))?;
    Ok(())
}

/// Split text so no CDATA section contains `]]>`
fn cdata_chunks(text: &str) -> Vec<&str> {
    let mut chunks = Vec::new();
    let mut rest = text;
    while let Some(pos) = rest.find("]]>") {
        // `]]` closes this section, `>` opens the next
        chunks.push(&rest[..pos + 2]);
        rest = &rest[pos + 2..];
    }
    chunks.push(rest);
    chunks
}

/// Write via a sibling temp file and rename into place
pub fn write_atomic(path: &Path, bytes: &[u8]) -> Result<()> {
    let tmp_path = temp_path(path);
    if let Err(e) = fs::write(&tmp_path, bytes).and_then(|_| fs::rename(&tmp_path, path)) {
        let _ = fs::remove_file(&tmp_path);
        return Err(e.into());
    }
    Ok(())
}

fn temp_path(path: &Path) -> PathBuf {
    let mut name = path.file_name().map(|n| n.to_os_string()).unwrap_or_default();
    name.push(".tmp");
    path.with_file_name(name)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::enml::wrap_en_note;
    use chrono::TimeZone;
    use tempfile::TempDir;

    fn date() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 3, 1, 12, 0, 0).unwrap()
    }

    fn note(title: &str, body: &str) -> Note {
        Note {
            title: title.to_string(),
            content: wrap_en_note(body),
            created: date(),
            updated: date(),
            tags: vec!["work".to_string()],
            resources: Vec::new(),
        }
    }

    fn resource(data: &[u8]) -> Resource {
        Resource {
            data: data.to_vec(),
            mime: "image/png".to_string(),
            file_name: "pic.png".to_string(),
            width: Some(4),
            height: None,
            hash: format!("{:x}", md5::compute(data)),
        }
    }

    #[test]
    fn test_serialize_layout() {
        let mut builder = ExportBuilder::new();
        builder.push(note("First & last", "<p>Body</p>"));
        let xml = String::from_utf8(builder.serialize(date()).unwrap()).unwrap();

        assert!(xml.starts_with(r#"<?xml version="1.0" encoding="UTF-8"?>"#));
        assert!(xml.contains(r#"<!DOCTYPE en-export SYSTEM "http://xml.evernote.com/pub/evernote-export4.dtd">"#));
        assert!(xml.contains(&format!(
            r#"<en-export export-date="20240301T120000Z" application="md2enex" version="{}">"#,
            APP_VERSION
        )));
        assert!(xml.contains("<title>First &amp; last</title>"));
        assert!(xml.contains("<content><![CDATA[<?xml"));
        assert!(xml.contains("<created>20240301T120000Z</created>"));
        assert!(xml.contains("<tag>work</tag>"));
        assert!(xml.contains("<note-attributes/>"));

        let order = ["<title>", "<content>", "<created>", "<updated>", "<tag>", "<note-attributes/>"];
        let positions: Vec<usize> = order.iter().map(|t| xml.find(t).unwrap()).collect();
        assert!(positions.windows(2).all(|w| w[0] < w[1]));
    }

    #[test]
    fn test_resource_serialization() {
        let res = resource(b"pixels");
        let mut n = note("Pic", &format!(r#"<en-media type="image/png" hash="{}"/>"#, res.hash));
        n.resources.push(res);

        let mut builder = ExportBuilder::new();
        builder.push(n);
        let xml = String::from_utf8(builder.finish(date(), &mut SchemaCache::new()).unwrap()).unwrap();

        assert!(xml.contains(r#"<data encoding="base64">cGl4ZWxz</data>"#));
        assert!(xml.contains("<mime>image/png</mime>"));
        assert!(xml.contains("<width>4</width>"));
        assert!(!xml.contains("<height>"));
        assert!(xml.contains("<file-name>pic.png</file-name>"));
    }

    #[test]
    fn test_cdata_split() {
        assert_eq!(cdata_chunks("plain"), vec!["plain"]);
        assert_eq!(cdata_chunks("a]]>b"), vec!["a]]", ">b"]);
        assert_eq!(cdata_chunks("]]>]]>"), vec!["]]", ">]]", ">"]);

        let mut builder = ExportBuilder::new();
        builder.push(note("Code", "<pre>x[a[0]]&gt;y</pre>"));
        builder.push(note("Raw", "<p>a]]>b</p>"));
        let xml = builder.serialize(date()).unwrap();
        assert!(String::from_utf8_lossy(&xml).contains("]]]]><![CDATA[>"));
    }

    #[test]
    fn test_finish_rejects_empty() {
        let err = ExportBuilder::new().finish(date(), &mut SchemaCache::new()).unwrap_err();
        assert!(matches!(err, ConvertError::Validation { .. }));
    }

    #[test]
    fn test_finish_validates() {
        let mut builder = ExportBuilder::new();
        builder.push(note("Bad", "<p><script>x</script></p>"));
        let err = builder.finish(date(), &mut SchemaCache::new()).unwrap_err();
        assert!(matches!(err, ConvertError::Validation { .. }));
    }

    #[test]
    fn test_write_atomic() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("out.enex");
        fs::write(&path, "old").unwrap();

        write_atomic(&path, b"new").unwrap();
        assert_eq!(fs::read(&path).unwrap(), b"new");
        assert!(!dir.path().join("out.enex.tmp").exists());
    }

    #[test]
    fn test_write_atomic_failure_leaves_no_file() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("missing").join("out.enex");
        assert!(write_atomic(&path, b"x").is_err());
        assert!(!path.exists());
    }

    #[test]
    fn test_write_to_skips_invalid_export() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("out.enex");
        let mut builder = ExportBuilder::new();
        builder.push(note("Bad", "<form/>"));
        assert!(builder.write_to(&path, date(), &mut SchemaCache::new()).is_err());
        assert!(!path.exists());
    }
}
