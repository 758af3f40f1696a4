use std::path::PathBuf;
use std::time::Duration;

/// Errors raised while converting markdown notes into an export document
#[derive(Debug, thiserror::Error)]
pub enum ConvertError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("XML error: {0}")]
    Xml(#[from] quick_xml::Error),

    #[error("Render error: {0}")]
    Render(String),

    #[error("Renderer timed out after {0:?}")]
    RenderTimeout(Duration),

    #[error("Media file not found: {0}")]
    MissingResource(PathBuf),

    #[error("Invalid title: {0}")]
    Title(String),

    #[error("Validation failed at {location}: {message}")]
    Validation { location: String, message: String },

    #[error("Invalid configuration: {0}")]
    Config(String),

    #[error("Invalid directory: {0}")]
    DirectoryNotFound(PathBuf),

    #[error("No markdown files found in {0}")]
    NoMarkdownFiles(PathBuf),
}

impl ConvertError {
    pub fn validation(location: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Validation {
            location: location.into(),
            message: message.into(),
        }
    }

    /// Whether this failure only sinks the file being converted.
    ///
    /// Directory, configuration and final-document failures abort the run;
    /// everything raised while turning one markdown file into a note is
    /// recorded and the run moves on to the next file.
    pub fn is_file_scoped(&self) -> bool {
        matches!(
            self,
            Self::Io(_)
                | Self::Xml(_)
                | Self::Render(_)
                | Self::RenderTimeout(_)
                | Self::MissingResource(_)
                | Self::Title(_)
        )
    }
}

pub type Result<T> = std::result::Result<T, ConvertError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_file_scoped_classification() {
        assert!(ConvertError::Render("exit status 1".into()).is_file_scoped());
        assert!(ConvertError::RenderTimeout(Duration::from_secs(1)).is_file_scoped());
        assert!(ConvertError::MissingResource(PathBuf::from("pic.png")).is_file_scoped());
        assert!(ConvertError::Title("empty".into()).is_file_scoped());

        assert!(!ConvertError::validation("note 1", "bad").is_file_scoped());
        assert!(!ConvertError::DirectoryNotFound(PathBuf::from("/nope")).is_file_scoped());
        assert!(!ConvertError::NoMarkdownFiles(PathBuf::from(".")).is_file_scoped());
        assert!(!ConvertError::Config("bad".into()).is_file_scoped());
    }

    #[test]
    fn test_validation_display() {
        let err = ConvertError::validation("note 2 (b) /en-note/script", "element not allowed");
        assert_eq!(
            err.to_string(),
            "Validation failed at note 2 (b) /en-note/script: element not allowed"
        );
    }
}
