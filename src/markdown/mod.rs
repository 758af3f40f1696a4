//! Markdown input handling
//!
//! Splits YAML front-matter from the body and renders the body to HTML.

mod frontmatter;
mod render;

pub use frontmatter::*;
pub use render::*;
