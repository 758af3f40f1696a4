//! Convert a directory of markdown notes into one Evernote `.enex` export.
//!
//! Each file goes through front-matter extraction, markdown rendering, the
//! HTML to ENML transform (collecting local media as resources) and note
//! assembly. The notes are then serialized, validated and written atomically.

pub mod config;
pub mod convert;
pub mod enex;
pub mod enml;
pub mod error;
pub mod markdown;

pub use config::{ConvertConfig, RendererKind, TitleSource};
pub use convert::{convert_directory, convert_file, ConversionReport};
pub use error::{ConvertError, Result};
pub use markdown::{renderer_for, MarkdownRenderer};
