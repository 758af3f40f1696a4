mod report;

use std::path::PathBuf;

use anyhow::Context;
use clap::Parser;
use md2enex_lib::{convert_directory, renderer_for, ConvertConfig, RendererKind, TitleSource};

#[derive(Parser)]
#[command(
    name = "md2enex",
    about = "Convert a directory of markdown notes into an Evernote .enex export",
    version,
    disable_version_flag = true
)]
struct Cli {
    /// Directory containing the markdown files (not searched recursively)
    directory: PathBuf,

    /// Export file to write
    #[arg(short, long, default_value = "export.enex")]
    output: PathBuf,

    /// TOML settings file; flags below override it
    #[arg(long)]
    config: Option<PathBuf>,

    /// Markdown renderer
    #[arg(long)]
    renderer: Option<Renderer>,

    /// Path to the pandoc executable
    #[arg(long, value_name = "PATH")]
    pandoc: Option<String>,

    /// Seconds a single render may take
    #[arg(long, value_name = "SECS")]
    timeout: Option<u64>,

    /// Keep soft line breaks as spaces
    #[arg(long)]
    no_hard_breaks: bool,

    /// Title notes from their leading heading instead of the file name
    #[arg(long)]
    title_from_heading: bool,

    /// Share one resource between references to identical files
    #[arg(long)]
    dedup_resources: bool,

    /// Extra tag added to every note
    #[arg(long, value_name = "TAG")]
    import_tag: Option<String>,

    /// Report format
    #[arg(long, default_value = "plain")]
    format: OutputFormat,

    /// Disable ANSI colors
    #[arg(long)]
    no_color: bool,

    /// Debug logging
    #[arg(long)]
    verbose: bool,

    /// Print version
    #[arg(short = 'v', long, action = clap::ArgAction::Version)]
    version: Option<bool>,
}

#[derive(Clone, Debug, clap::ValueEnum)]
pub enum OutputFormat {
    Plain,
    Json,
}

#[derive(Clone, Copy, Debug, clap::ValueEnum)]
enum Renderer {
    Pandoc,
    Builtin,
}

impl Cli {
    /// Settings file (or defaults) with command line overrides applied
    fn load_config(&self) -> anyhow::Result<ConvertConfig> {
        let mut config = match &self.config {
            Some(path) => ConvertConfig::load(path)
                .with_context(|| format!("Failed to load settings from {}", path.display()))?,
            None => ConvertConfig::default(),
        };

        if let Some(renderer) = self.renderer {
            config.renderer = match renderer {
                Renderer::Pandoc => RendererKind::Pandoc,
                Renderer::Builtin => RendererKind::Builtin,
            };
        }
        if let Some(pandoc) = &self.pandoc {
            config.pandoc_path = pandoc.clone();
        }
        if let Some(timeout) = self.timeout {
            config.render_timeout_secs = timeout;
        }
        if self.no_hard_breaks {
            config.hard_line_breaks = false;
        }
        if self.title_from_heading {
            config.title_source = TitleSource::Heading;
        }
        if self.dedup_resources {
            config.dedup_resources = true;
        }
        if let Some(tag) = &self.import_tag {
            config.import_tag = Some(tag.clone());
        }

        config.check()?;
        Ok(config)
    }
}

fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let default_level = if cli.verbose { "debug" } else { "warn" };
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(default_level)).init();

    let use_color = !cli.no_color && atty_check();
    let config = cli.load_config()?;
    let renderer = renderer_for(&config);

    let report = convert_directory(&cli.directory, &cli.output, &config, renderer.as_ref())
        .with_context(|| format!("Failed to convert {}", cli.directory.display()))?;

    report::print(&report, &cli.format, use_color)?;
    std::process::exit(report.exit_code());
}

/// Check if stdout is a terminal (for color support)
fn atty_check() -> bool {
    unsafe { libc_isatty(1) != 0 }
}

extern "C" {
    #[link_name = "isatty"]
    fn libc_isatty(fd: i32) -> i32;
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::error::ErrorKind;

    #[test]
    fn test_short_v_prints_version() {
        for flag in ["-v", "--version"] {
            let err = Cli::try_parse_from(["md2enex", flag]).err().unwrap();
            assert_eq!(err.kind(), ErrorKind::DisplayVersion);
        }
    }

    #[test]
    fn test_verbose_is_long_only() {
        let cli = Cli::try_parse_from(["md2enex", "notes", "--verbose"]).unwrap();
        assert!(cli.verbose);
        assert_eq!(cli.directory, PathBuf::from("notes"));
        assert_eq!(cli.output, PathBuf::from("export.enex"));
    }

    #[test]
    fn test_flags_override_config() {
        let cli = Cli::try_parse_from([
            "md2enex",
            "notes",
            "--renderer",
            "builtin",
            "--timeout",
            "5",
            "--import-tag",
            "imported",
        ])
        .unwrap();
        let config = cli.load_config().unwrap();
        assert!(matches!(config.renderer, RendererKind::Builtin));
        assert_eq!(config.render_timeout_secs, 5);
        assert_eq!(config.import_tag.as_deref(), Some("imported"));
    }
}
