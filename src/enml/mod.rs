//! ENML (Evernote Note Markup Language) generation
//!
//! Turns renderer HTML into note content:
//! - Lenient parsing of the HTML fragment
//! - Tag and attribute whitelisting against the ENML vocabulary
//! - Local images, audio, video and linked files become `<en-media>` resources
//! - The redundant leading title heading is dropped

pub mod dom;
pub(crate) mod resources;
mod transform;
pub mod whitelist;

pub use resources::{collect_resource, detect_mime, image_dimensions};
pub use transform::*;
