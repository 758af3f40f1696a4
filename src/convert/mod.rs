//! Directory to export orchestration
//!
//! Reads each markdown file, runs it through front-matter extraction,
//! rendering and the ENML transform, assembles the note, and collects the
//! results into one export. Failures confined to a single file are recorded
//! and the run continues.

mod assemble;
mod pipeline;

pub use assemble::*;
pub use pipeline::*;
