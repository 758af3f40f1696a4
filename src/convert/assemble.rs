use std::fs;
use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};

use crate::config::{ConvertConfig, TitleSource};
use crate::enex::{strip_non_xml_chars, Note, MAX_TITLE_CHARS};
use crate::enml::EnmlDocument;
use crate::error::{ConvertError, Result};

/// One markdown file as read from disk
#[derive(Debug, Clone)]
pub struct DocumentSource {
    pub path: PathBuf,
    pub text: String,
    pub created: DateTime<Utc>,
    pub modified: DateTime<Utc>,
}

impl DocumentSource {
    /// Read a document and its timestamps.
    ///
    /// Creation time is the birth time where the filesystem records one,
    /// otherwise the modification time.
    pub fn read(path: &Path) -> Result<Self> {
        let text = fs::read_to_string(path)?;
        let metadata = fs::metadata(path)?;
        let modified = metadata.modified()?;
        let created = metadata.created().unwrap_or(modified);

        Ok(Self {
            path: path.to_path_buf(),
            text,
            created: created.into(),
            modified: modified.into(),
        })
    }

    /// Directory media paths are resolved against
    pub fn base_dir(&self) -> &Path {
        self.path.parent().unwrap_or_else(|| Path::new("."))
    }

    fn file_stem(&self) -> String {
        self.path
            .file_stem()
            .map(|s| s.to_string_lossy().to_string())
            .unwrap_or_default()
    }
}

/// Combine a document's pieces into a note
pub fn assemble_note(
    source: &DocumentSource,
    tags: Vec<String>,
    document: EnmlDocument,
    config: &ConvertConfig,
) -> Result<Note> {
    let title = match (config.title_source, document.removed_heading.as_deref()) {
        (TitleSource::Heading, Some(heading)) => sanitize_title(heading),
        _ => sanitize_title(&source.file_stem()),
    };
    if title.is_empty() {
        return Err(ConvertError::Title(format!(
            "{} yields an empty title",
            source.path.display()
        )));
    }

    let mut note_tags: Vec<String> = Vec::new();
    for tag in tags.into_iter().chain(config.import_tag.clone()) {
        let tag = strip_non_xml_chars(&tag).trim().to_string();
        if !tag.is_empty() && !note_tags.contains(&tag) {
            note_tags.push(tag);
        }
    }

    Ok(Note {
        title,
        content: document.content,
        created: source.created,
        updated: source.modified,
        tags: note_tags,
        resources: document.resources,
    })
}

/// Line breaks become spaces, characters XML cannot carry and surrounding
/// whitespace go, and the result is cut to the longest title Evernote accepts
pub fn sanitize_title(raw: &str) -> String {
    let single_line = strip_non_xml_chars(raw).replace("\r\n", " ").replace(['\r', '\n'], " ");
    let trimmed = single_line.trim();
    if trimmed.chars().count() <= MAX_TITLE_CHARS {
        return trimmed.to_string();
    }
    let truncated: String = trimmed.chars().take(MAX_TITLE_CHARS).collect();
    truncated.trim_end().to_string()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::enml::wrap_en_note;
    use chrono::TimeZone;

    fn source(name: &str) -> DocumentSource {
        DocumentSource {
            path: PathBuf::from("/notes").join(name),
            text: String::new(),
            created: Utc.with_ymd_and_hms(2023, 1, 2, 3, 4, 5).unwrap(),
            modified: Utc.with_ymd_and_hms(2024, 6, 7, 8, 9, 10).unwrap(),
        }
    }

    fn document(heading: Option<&str>) -> EnmlDocument {
        EnmlDocument {
            content: wrap_en_note("<p>body</p>"),
            resources: Vec::new(),
            removed_heading: heading.map(str::to_string),
        }
    }

    #[test]
    fn test_title_from_file_name() {
        let note = assemble_note(
            &source("Meeting notes.md"),
            Vec::new(),
            document(Some("Agenda")),
            &ConvertConfig::default(),
        )
        .unwrap();
        assert_eq!(note.title, "Meeting notes");
        assert_eq!(note.created, Utc.with_ymd_and_hms(2023, 1, 2, 3, 4, 5).unwrap());
        assert_eq!(note.updated, Utc.with_ymd_and_hms(2024, 6, 7, 8, 9, 10).unwrap());
    }

    #[test]
    fn test_title_from_heading() {
        let config = ConvertConfig {
            title_source: TitleSource::Heading,
            ..Default::default()
        };
        let note = assemble_note(&source("a.md"), Vec::new(), document(Some("Agenda")), &config).unwrap();
        assert_eq!(note.title, "Agenda");

        let note = assemble_note(&source("a.md"), Vec::new(), document(None), &config).unwrap();
        assert_eq!(note.title, "a");
    }

    #[test]
    fn test_empty_title_is_an_error() {
        let err = assemble_note(&source("   .md"), Vec::new(), document(None), &ConvertConfig::default())
            .unwrap_err();
        assert!(matches!(err, ConvertError::Title(_)));
        assert!(err.is_file_scoped());
    }

    #[test]
    fn test_sanitize_title() {
        assert_eq!(sanitize_title("  two\nlines\r\nhere "), "two lines here");
        assert_eq!(sanitize_title(&"a".repeat(300)).len(), MAX_TITLE_CHARS);
        assert_eq!(sanitize_title(&"ü".repeat(300)).chars().count(), MAX_TITLE_CHARS);
        assert_eq!(sanitize_title("bell\u{7}ing"), "belling");
        assert_eq!(sanitize_title("\u{1}\u{2}"), "");
    }

    #[test]
    fn test_tags_drop_control_characters() {
        let tags = vec!["bad\u{1}tag".to_string(), "\u{1b}".to_string()];
        let note = assemble_note(&source("a.md"), tags, document(None), &ConvertConfig::default()).unwrap();
        assert_eq!(note.tags, vec!["badtag"]);
    }

    #[test]
    fn test_tags_merge_import_tag() {
        let config = ConvertConfig {
            import_tag: Some("imported".to_string()),
            ..Default::default()
        };
        let tags = vec!["work".to_string(), " ".to_string(), "imported".to_string()];
        let note = assemble_note(&source("a.md"), tags, document(None), &config).unwrap();
        assert_eq!(note.tags, vec!["work", "imported"]);
    }

    mod integration_tests {
        use super::*;
        use tempfile::TempDir;

        #[test]
        fn test_read_document_source() {
            let dir = TempDir::new().unwrap();
            let path = dir.path().join("note.md");
            fs::write(&path, "# Hi\n").unwrap();

            let source = DocumentSource::read(&path).unwrap();
            assert_eq!(source.text, "# Hi\n");
            assert_eq!(source.base_dir(), dir.path());
            assert!((Utc::now() - source.modified).num_minutes() < 5);
        }

        #[test]
        fn test_read_missing_document() {
            let dir = TempDir::new().unwrap();
            let err = DocumentSource::read(&dir.path().join("gone.md")).unwrap_err();
            assert!(matches!(err, ConvertError::Io(_)));
        }
    }
}
