//! Markdown to HTML rendering
//!
//! The converter only needs text in, HTML out. `PandocRenderer` shells out to
//! pandoc; `BuiltinRenderer` keeps everything in-process with pulldown-cmark.

use std::io::{Read, Write};
use std::process::{Child, Command, Stdio};
use std::thread;
use std::time::{Duration, Instant};

use pulldown_cmark::{html, Event, Options, Parser};

use crate::config::{ConvertConfig, RendererKind};
use crate::error::{ConvertError, Result};

/// How often a running renderer process is polled for completion
const POLL_INTERVAL: Duration = Duration::from_millis(20);

/// Turns a markdown body into an HTML fragment
pub trait MarkdownRenderer {
    fn render(&self, markdown: &str) -> Result<String>;
}

/// Build the renderer selected by the configuration
pub fn renderer_for(config: &ConvertConfig) -> Box<dyn MarkdownRenderer> {
    match config.renderer {
        RendererKind::Pandoc => Box::new(PandocRenderer {
            program: config.pandoc_path.clone(),
            timeout: config.render_timeout(),
            hard_line_breaks: config.hard_line_breaks,
        }),
        RendererKind::Builtin => Box::new(BuiltinRenderer {
            hard_line_breaks: config.hard_line_breaks,
        }),
    }
}

/// In-process CommonMark renderer
#[derive(Debug, Clone)]
pub struct BuiltinRenderer {
    pub hard_line_breaks: bool,
}

impl Default for BuiltinRenderer {
    fn default() -> Self {
        Self {
            hard_line_breaks: true,
        }
    }
}

impl MarkdownRenderer for BuiltinRenderer {
    fn render(&self, markdown: &str) -> Result<String> {
        let mut options = Options::empty();
        options.insert(Options::ENABLE_TABLES);
        options.insert(Options::ENABLE_STRIKETHROUGH);
        options.insert(Options::ENABLE_TASKLISTS);
        options.insert(Options::ENABLE_FOOTNOTES);

        let hard = self.hard_line_breaks;
        let parser = Parser::new_ext(markdown, options).map(|event| match event {
            Event::SoftBreak if hard => Event::HardBreak,
            other => other,
        });

        let mut out = String::with_capacity(markdown.len() * 3 / 2);
        html::push_html(&mut out, parser);
        Ok(out)
    }
}

/// External pandoc process, bounded by a timeout
#[derive(Debug, Clone)]
pub struct PandocRenderer {
    pub program: String,
    pub timeout: Duration,
    pub hard_line_breaks: bool,
}

impl PandocRenderer {
    fn input_format(&self) -> String {
        let mut format = String::from("markdown+emoji");
        if self.hard_line_breaks {
            format.push_str("+hard_line_breaks");
        }
        format.push_str("-smart-auto_identifiers");
        format
    }
}

impl MarkdownRenderer for PandocRenderer {
    fn render(&self, markdown: &str) -> Result<String> {
        let mut child = Command::new(&self.program)
            .args(["--from", &self.input_format(), "--to", "html", "--wrap=none"])
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .spawn()
            .map_err(|e| ConvertError::Render(format!("{}: {}", self.program, e)))?;

        run_with_timeout(&mut child, markdown.as_bytes().to_vec(), self.timeout)
    }
}

/// Feed stdin, drain stdout/stderr and wait for the child, killing it if the
/// deadline passes first.
fn run_with_timeout(child: &mut Child, input: Vec<u8>, timeout: Duration) -> Result<String> {
    let mut stdin = child
        .stdin
        .take()
        .ok_or_else(|| ConvertError::Render("renderer stdin unavailable".to_string()))?;
    let mut stdout = child
        .stdout
        .take()
        .ok_or_else(|| ConvertError::Render("renderer stdout unavailable".to_string()))?;
    let mut stderr = child
        .stderr
        .take()
        .ok_or_else(|| ConvertError::Render("renderer stderr unavailable".to_string()))?;

    // Separate threads so a chatty child can never block on a full pipe.
    let writer = thread::spawn(move || stdin.write_all(&input));
    let out_reader = thread::spawn(move || {
        let mut buf = Vec::new();
        stdout.read_to_end(&mut buf).map(|_| buf)
    });
    let err_reader = thread::spawn(move || {
        let mut buf = Vec::new();
        stderr.read_to_end(&mut buf).map(|_| buf)
    });

    let deadline = Instant::now() + timeout;
    let status = loop {
        if let Some(status) = child.try_wait()? {
            break status;
        }
        if Instant::now() >= deadline {
            if let Err(e) = child.kill() {
                log::warn!("Failed to kill timed-out renderer: {}", e);
            }
            let _ = child.wait();
            return Err(ConvertError::RenderTimeout(timeout));
        }
        thread::sleep(POLL_INTERVAL);
    };

    let joined = |name: &str| ConvertError::Render(format!("renderer {} thread panicked", name));
    match writer.join().map_err(|_| joined("stdin"))? {
        Ok(()) => {}
        // The child may exit without reading all of its input
        Err(e) if e.kind() == std::io::ErrorKind::BrokenPipe => {}
        Err(e) => return Err(e.into()),
    }
    let out = out_reader.join().map_err(|_| joined("stdout"))??;
    let err = err_reader.join().map_err(|_| joined("stderr"))??;

    if !status.success() {
        return Err(ConvertError::Render(format!(
            "renderer exited with {}: {}",
            status,
            String::from_utf8_lossy(&err).trim()
        )));
    }

    String::from_utf8(out)
        .map_err(|e| ConvertError::Render(format!("renderer produced invalid UTF-8: {}", e)))
}
