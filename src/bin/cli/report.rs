use anyhow::Result;
use md2enex_lib::ConversionReport;

use crate::OutputFormat;

const RESET: &str = "\x1b[0m";
const BOLD: &str = "\x1b[1m";
const GREEN: &str = "\x1b[32m";
const YELLOW: &str = "\x1b[33m";
const RED: &str = "\x1b[31m";

pub fn print(report: &ConversionReport, format: &OutputFormat, use_color: bool) -> Result<()> {
    match format {
        OutputFormat::Json => {
            println!("{}", serde_json::to_string_pretty(report)?);
        }
        OutputFormat::Plain => {
            for line in plain_lines(report, use_color) {
                println!("{}", line);
            }
        }
    }
    Ok(())
}

fn paint(text: &str, color: &str, use_color: bool) -> String {
    if use_color {
        format!("{}{}{}", color, text, RESET)
    } else {
        text.to_string()
    }
}

fn plain_lines(report: &ConversionReport, use_color: bool) -> Vec<String> {
    let mut lines = vec![format!(
        "{} markdown files in {}: {} converted, {} skipped",
        report.found,
        report.directory.display(),
        report.converted.len(),
        report.skipped.len()
    )];

    for file in &report.converted {
        let mut detail = Vec::new();
        if file.tags > 0 {
            detail.push(format!("{} tags", file.tags));
        }
        if file.resources > 0 {
            detail.push(format!("{} resources", file.resources));
        }
        let suffix = if detail.is_empty() {
            String::new()
        } else {
            format!(" ({})", detail.join(", "))
        };
        lines.push(format!("  {} {}{}", paint("ok", GREEN, use_color), file.title, suffix));
    }

    for file in &report.skipped {
        lines.push(format!(
            "  {} {}: {}",
            paint("skipped", YELLOW, use_color),
            file.path.display(),
            file.reason
        ));
    }

    match (&report.output, &report.failure) {
        (Some(path), _) => lines.push(format!("Wrote {}", paint(&path.display().to_string(), BOLD, use_color))),
        (None, Some(reason)) => lines.push(paint(&format!("No export written: {}", reason), RED, use_color)),
        (None, None) => lines.push(paint("No export written", RED, use_color)),
    }
    lines
}
