use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use serde::Serialize;
use walkdir::WalkDir;

use super::assemble::{assemble_note, DocumentSource};
use crate::config::ConvertConfig;
use crate::enex::{ExportBuilder, Note, SchemaCache};
use crate::enml::{html_to_enml, TransformOptions};
use crate::error::{ConvertError, Result};
use crate::markdown::{split_front_matter, MarkdownRenderer};

/// A file that made it into the export
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ConvertedFile {
    pub path: PathBuf,
    pub title: String,
    pub tags: usize,
    pub resources: usize,
}

/// A file left out of the export, with the reason
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SkippedFile {
    pub path: PathBuf,
    pub reason: String,
}

/// Outcome of converting one directory
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ConversionReport {
    pub directory: PathBuf,
    pub found: usize,
    pub converted: Vec<ConvertedFile>,
    pub skipped: Vec<SkippedFile>,
    /// Where the export was written; `None` when nothing was written
    pub output: Option<PathBuf>,
    /// Why nothing was written
    pub failure: Option<String>,
}

impl ConversionReport {
    fn new(directory: &Path, found: usize) -> Self {
        Self {
            directory: directory.to_path_buf(),
            found,
            converted: Vec::new(),
            skipped: Vec::new(),
            output: None,
            failure: None,
        }
    }

    /// 0 when everything was written, 1 when the export was written without
    /// some files, 2 when no export was produced
    pub fn exit_code(&self) -> i32 {
        match (&self.output, self.skipped.is_empty()) {
            (None, _) => 2,
            (Some(_), false) => 1,
            (Some(_), true) => 0,
        }
    }
}

/// Markdown files directly inside `dir`, ordered by lowercase file name
pub fn list_markdown_files(dir: &Path, config: &ConvertConfig) -> Result<Vec<PathBuf>> {
    if !dir.is_dir() {
        return Err(ConvertError::DirectoryNotFound(dir.to_path_buf()));
    }

    let mut files: Vec<PathBuf> = WalkDir::new(dir)
        .min_depth(1)
        .max_depth(1)
        .follow_links(true)
        .into_iter()
        .filter_map(|e| e.ok())
        .filter(|e| e.file_type().is_file())
        .map(|e| e.into_path())
        .filter(|path| {
            let hidden = path
                .file_name()
                .map(|n| n.to_string_lossy().starts_with('.'))
                .unwrap_or(true);
            let eligible = path
                .extension()
                .map(|ext| config.accepts_extension(&ext.to_string_lossy()))
                .unwrap_or(false);
            !hidden && eligible
        })
        .collect();

    if files.is_empty() {
        return Err(ConvertError::NoMarkdownFiles(dir.to_path_buf()));
    }

    files.sort_by_cached_key(|path| {
        let name = path
            .file_name()
            .map(|n| n.to_string_lossy().to_string())
            .unwrap_or_default();
        (name.to_lowercase(), name)
    });
    log::debug!("Found {} markdown files in {}", files.len(), dir.display());
    Ok(files)
}

/// Convert one markdown file into a note
pub fn convert_file(path: &Path, config: &ConvertConfig, renderer: &dyn MarkdownRenderer) -> Result<Note> {
    log::debug!("Converting {}", path.display());

    let source = DocumentSource::read(path)?;
    let front_matter = split_front_matter(&source.text);

    let html = renderer.render(&front_matter.body)?;
    log::debug!("Rendered HTML for {}:\n{}", path.display(), html);

    let options = TransformOptions {
        collect_linked_files: config.collect_linked_files,
        dedup_resources: config.dedup_resources,
    };
    let document = html_to_enml(&html, source.base_dir(), &options)?;
    log::debug!("ENML for {}:\n{}", path.display(), document.content);

    assemble_note(&source, front_matter.tags, document, config)
}

/// Convert every markdown file in `dir` and write one export to `output`.
///
/// Only directory problems are returned as errors. Per-file failures land in
/// `skipped`; a rejected export lands in `failure` with no file written.
pub fn convert_directory(
    dir: &Path,
    output: &Path,
    config: &ConvertConfig,
    renderer: &dyn MarkdownRenderer,
) -> Result<ConversionReport> {
    convert_directory_at(dir, output, config, renderer, Utc::now())
}

/// `convert_directory` with a fixed export timestamp
pub fn convert_directory_at(
    dir: &Path,
    output: &Path,
    config: &ConvertConfig,
    renderer: &dyn MarkdownRenderer,
    export_date: DateTime<Utc>,
) -> Result<ConversionReport> {
    let files = list_markdown_files(dir, config)?;
    let mut report = ConversionReport::new(dir, files.len());
    let mut builder = ExportBuilder::new();

    for path in files {
        match convert_file(&path, config, renderer) {
            Ok(note) => {
                report.converted.push(ConvertedFile {
                    path: path.clone(),
                    title: note.title.clone(),
                    tags: note.tags.len(),
                    resources: note.resources.len(),
                });
                builder.push(note);
            }
            Err(e) if e.is_file_scoped() => {
                log::warn!("Skipping {}: {}", path.display(), e);
                report.skipped.push(SkippedFile {
                    path,
                    reason: e.to_string(),
                });
            }
            Err(e) => return Err(e),
        }
    }

    if builder.is_empty() {
        report.failure = Some("no notes were converted".to_string());
        return Ok(report);
    }

    let mut schemas = SchemaCache::new();
    match builder.write_to(output, export_date, &mut schemas) {
        Ok(()) => report.output = Some(output.to_path_buf()),
        Err(e @ ConvertError::Validation { .. }) => {
            log::error!("Export rejected: {}", e);
            report.failure = Some(e.to_string());
        }
        Err(e) => return Err(e),
    }
    Ok(report)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::markdown::BuiltinRenderer;
    use std::fs;
    use tempfile::TempDir;

    /// Echoes markdown as a paragraph; fails on bodies mentioning FAIL
    struct StubRenderer;

    impl MarkdownRenderer for StubRenderer {
        fn render(&self, markdown: &str) -> Result<String> {
            if markdown.contains("FAIL") {
                return Err(ConvertError::Render("stub renderer refused".to_string()));
            }
            Ok(format!("<p>{}</p>", markdown.trim()))
        }
    }

    fn export_date() -> DateTime<Utc> {
        DateTime::parse_from_rfc3339("2024-05-01T10:00:00Z").unwrap().with_timezone(&Utc)
    }

    fn write(dir: &Path, name: &str, content: &str) {
        fs::write(dir.join(name), content).unwrap();
    }

    #[test]
    fn test_exit_codes() {
        let mut report = ConversionReport::new(Path::new("."), 1);
        assert_eq!(report.exit_code(), 2);

        report.output = Some(PathBuf::from("out.enex"));
        assert_eq!(report.exit_code(), 0);

        report.skipped.push(SkippedFile {
            path: PathBuf::from("x.md"),
            reason: "bad".to_string(),
        });
        assert_eq!(report.exit_code(), 1);
    }

    mod integration_tests {
        use super::*;
        use crate::enml::resources::fixtures::png_bytes;

        fn run(dir: &Path, renderer: &dyn MarkdownRenderer) -> (ConversionReport, PathBuf) {
            let output = dir.join("out").join("export.enex");
            fs::create_dir_all(output.parent().unwrap()).unwrap();
            let report =
                convert_directory_at(dir, &output, &ConvertConfig::default(), renderer, export_date()).unwrap();
            (report, output)
        }

        #[test]
        fn test_two_notes_end_to_end() {
            let dir = TempDir::new().unwrap();
            write(dir.path(), "a.md", "Hello world\n");
            write(dir.path(), "b.md", "---\ntags: [work]\n---\n![pic](pic.png)\n");
            fs::write(dir.path().join("pic.png"), png_bytes(3, 2)).unwrap();

            let (report, output) = run(dir.path(), &BuiltinRenderer::default());
            assert_eq!(report.found, 2);
            assert_eq!(report.exit_code(), 0);
            assert_eq!(report.converted[0].title, "a");
            assert_eq!(report.converted[1].title, "b");

            let xml = fs::read_to_string(output).unwrap();
            assert_eq!(xml.matches("<note>").count(), 2);

            let a_start = xml.find("<title>a</title>").unwrap();
            let b_start = xml.find("<title>b</title>").unwrap();
            assert!(a_start < b_start);

            let (note_a, note_b) = xml.split_at(b_start);
            assert!(note_a.contains("Hello world"));
            assert!(!note_a.contains("<tag>"));
            assert!(!note_a.contains("<resource>"));

            assert!(note_b.contains("<tag>work</tag>"));
            assert_eq!(note_b.matches("<resource>").count(), 1);
            assert!(note_b.contains("<mime>image/png</mime>"));
            let hash = format!("{:x}", md5::compute(png_bytes(3, 2)));
            assert!(note_b.contains(&format!(r#"hash="{}""#, hash)));
        }

        #[test]
        fn test_missing_media_skips_only_that_file() {
            let dir = TempDir::new().unwrap();
            write(dir.path(), "a.md", "First\n");
            write(dir.path(), "b.md", "![gone](missing.png)\n");
            write(dir.path(), "c.md", "Third\n");

            let (report, output) = run(dir.path(), &BuiltinRenderer::default());
            assert_eq!(report.converted.len(), 2);
            assert_eq!(report.skipped.len(), 1);
            assert!(report.skipped[0].path.ends_with("b.md"));
            assert!(report.skipped[0].reason.contains("missing.png"));
            assert_eq!(report.exit_code(), 1);

            let xml = fs::read_to_string(output).unwrap();
            assert_eq!(xml.matches("<note>").count(), 2);
        }

        #[test]
        fn test_control_characters_never_reach_export() {
            let dir = TempDir::new().unwrap();
            write(dir.path(), "tagged.md", "---\ntags: [\"bad\\x01tag\", work]\n---\nBody\n");
            write(dir.path(), "bell\u{7}.md", "Ring\n");

            let (report, output) = run(dir.path(), &BuiltinRenderer::default());
            assert_eq!(report.exit_code(), 0);

            let bytes = fs::read(output).unwrap();
            assert!(!bytes.contains(&0x01));
            assert!(!bytes.contains(&0x07));
            let xml = String::from_utf8(bytes).unwrap();
            assert!(xml.contains("<tag>badtag</tag>"));
            assert!(xml.contains("<title>bell</title>"));
        }

        #[test]
        fn test_render_failure_is_recorded() {
            let dir = TempDir::new().unwrap();
            write(dir.path(), "a.md", "fine");
            write(dir.path(), "b.md", "FAIL");

            let (report, _) = run(dir.path(), &StubRenderer);
            assert_eq!(report.converted.len(), 1);
            assert!(report.skipped[0].reason.contains("stub renderer refused"));
        }

        #[test]
        fn test_nothing_converted_writes_nothing() {
            let dir = TempDir::new().unwrap();
            write(dir.path(), "a.md", "FAIL");

            let (report, output) = run(dir.path(), &StubRenderer);
            assert!(report.output.is_none());
            assert!(report.failure.is_some());
            assert_eq!(report.exit_code(), 2);
            assert!(!output.exists());
        }

        #[test]
        fn test_rerun_is_byte_identical() {
            let dir = TempDir::new().unwrap();
            write(dir.path(), "note.md", "---\nkeywords: x, y\n---\nSome *text*\nnext line\n");
            fs::write(dir.path().join("pic.png"), png_bytes(1, 1)).unwrap();
            write(dir.path(), "pic-note.md", "![p](pic.png)");

            let (_, output) = run(dir.path(), &BuiltinRenderer::default());
            let first = fs::read(&output).unwrap();
            let (_, output) = run(dir.path(), &BuiltinRenderer::default());
            let second = fs::read(&output).unwrap();
            assert_eq!(first, second);
        }

        #[test]
        fn test_listing_order_and_filtering() {
            let dir = TempDir::new().unwrap();
            for name in ["b.md", "A.md", "c.MD", "notes.txt", ".hidden.md"] {
                write(dir.path(), name, "x");
            }
            fs::create_dir(dir.path().join("sub")).unwrap();
            write(&dir.path().join("sub"), "nested.md", "x");

            let files = list_markdown_files(dir.path(), &ConvertConfig::default()).unwrap();
            let names: Vec<String> = files
                .iter()
                .map(|p| p.file_name().unwrap().to_string_lossy().to_string())
                .collect();
            assert_eq!(names, vec!["A.md", "b.md", "c.MD"]);
        }

        #[test]
        fn test_directory_errors() {
            let dir = TempDir::new().unwrap();
            let config = ConvertConfig::default();

            let err = list_markdown_files(&dir.path().join("nope"), &config).unwrap_err();
            assert!(matches!(err, ConvertError::DirectoryNotFound(_)));

            write(dir.path(), "readme.txt", "x");
            let err = convert_directory(dir.path(), &dir.path().join("o.enex"), &config, &StubRenderer)
                .unwrap_err();
            assert!(matches!(err, ConvertError::NoMarkdownFiles(_)));
            assert!(!err.is_file_scoped());
        }
    }
}
