//! Conversion settings
//!
//! Loaded from an optional TOML file and then overridden by command line flags.

use std::fs;
use std::path::Path;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::{ConvertError, Result};

/// Which markdown renderer produces the intermediate HTML
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "lowercase")]
pub enum RendererKind {
    /// External `pandoc` process
    #[default]
    Pandoc,
    /// In-process pulldown-cmark
    Builtin,
}

/// Where a note title comes from
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "kebab-case")]
pub enum TitleSource {
    /// The markdown file name without extension
    #[default]
    FileName,
    /// The leading level-1 heading, falling back to the file name
    Heading,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "kebab-case", default)]
pub struct ConvertConfig {
    pub renderer: RendererKind,
    /// Executable used when `renderer = "pandoc"`
    pub pandoc_path: String,
    pub render_timeout_secs: u64,
    /// Render soft line breaks as `<br/>`
    pub hard_line_breaks: bool,
    pub title_source: TitleSource,
    /// Share one resource entry between references to identical bytes
    pub dedup_resources: bool,
    /// Turn `<a href>` links to local files into attachments
    pub collect_linked_files: bool,
    /// Extra tag stamped on every note
    #[serde(skip_serializing_if = "Option::is_none")]
    pub import_tag: Option<String>,
    /// Eligible file extensions (case-insensitive, without dot)
    pub extensions: Vec<String>,
}

impl Default for ConvertConfig {
    fn default() -> Self {
        Self {
            renderer: RendererKind::Pandoc,
            pandoc_path: "pandoc".to_string(),
            render_timeout_secs: 30,
            hard_line_breaks: true,
            title_source: TitleSource::FileName,
            dedup_resources: false,
            collect_linked_files: true,
            import_tag: None,
            extensions: vec!["md".to_string()],
        }
    }
}

impl ConvertConfig {
    /// Load settings from a TOML file; missing keys keep their defaults
    pub fn load(path: &Path) -> Result<Self> {
        let content = fs::read_to_string(path)
            .map_err(|e| ConvertError::Config(format!("{}: {}", path.display(), e)))?;
        Self::from_toml(&content)
    }

    pub fn from_toml(content: &str) -> Result<Self> {
        let config: Self =
            toml::from_str(content).map_err(|e| ConvertError::Config(e.to_string()))?;
        config.check()?;
        Ok(config)
    }

    pub fn render_timeout(&self) -> Duration {
        Duration::from_secs(self.render_timeout_secs)
    }

    /// Whether a file with this extension should be converted
    pub fn accepts_extension(&self, ext: &str) -> bool {
        self.extensions
            .iter()
            .any(|allowed| allowed.trim_start_matches('.').eq_ignore_ascii_case(ext))
    }

    /// Reject settings the converter cannot run with
    pub fn check(&self) -> Result<()> {
        if self.render_timeout_secs == 0 {
            return Err(ConvertError::Config(
                "render-timeout-secs must be greater than zero".to_string(),
            ));
        }
        if self.extensions.is_empty() {
            return Err(ConvertError::Config("extensions must not be empty".to_string()));
        }
        if self.renderer == RendererKind::Pandoc && self.pandoc_path.trim().is_empty() {
            return Err(ConvertError::Config("pandoc-path must not be empty".to_string()));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = ConvertConfig::default();
        assert_eq!(config.renderer, RendererKind::Pandoc);
        assert!(config.hard_line_breaks);
        assert!(!config.dedup_resources);
        assert_eq!(config.render_timeout(), Duration::from_secs(30));
        assert!(config.accepts_extension("MD"));
        assert!(!config.accepts_extension("txt"));
    }

    #[test]
    fn test_partial_toml_keeps_defaults() {
        let config = ConvertConfig::from_toml(
            r#"
renderer = "builtin"
title-source = "heading"
extensions = ["md", ".markdown"]
"#,
        )
        .unwrap();

        assert_eq!(config.renderer, RendererKind::Builtin);
        assert_eq!(config.title_source, TitleSource::Heading);
        assert!(config.accepts_extension("markdown"));
        assert_eq!(config.pandoc_path, "pandoc");
        assert!(config.collect_linked_files);
    }

    #[test]
    fn test_invalid_toml_is_config_error() {
        let err = ConvertConfig::from_toml("renderer = \"word\"").unwrap_err();
        assert!(matches!(err, ConvertError::Config(_)));

        let err = ConvertConfig::from_toml("render-timeout-secs = 0").unwrap_err();
        assert!(matches!(err, ConvertError::Config(_)));
    }
}
