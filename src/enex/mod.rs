//! Evernote export (.enex) document
//!
//! - Note and resource models plus the export timestamp format
//! - Serialization of the accumulated notes into one export file
//! - Structural validation against the export and ENML grammars

mod models;
pub mod validate;
pub mod writer;

pub use models::*;
pub use validate::{validate_export, SchemaCache};
pub use writer::{write_atomic, ExportBuilder, APP_NAME, APP_VERSION};
