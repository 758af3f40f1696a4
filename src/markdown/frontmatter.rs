//! YAML front-matter extraction
//!
//! A document may open with a block fenced by `---` lines. Only `tags` and
//! `keywords` are read from it; anything unparseable is treated as if there
//! were no block at all.

use std::collections::HashMap;

/// Marker line opening and closing the front-matter block
const DELIMITER: &str = "---";

/// Keys whose values become note tags
const TAG_KEYS: [&str; 2] = ["tags", "keywords"];

/// Result of splitting a document
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct FrontMatter {
    /// Deduplicated tags, in first-seen order
    pub tags: Vec<String>,
    /// Markdown with the block removed
    pub body: String,
}

/// Split a markdown document into its front-matter tags and body.
///
/// Never fails: a missing or malformed block yields no tags and the original
/// text unchanged.
pub fn split_front_matter(content: &str) -> FrontMatter {
    let Some((yaml, body)) = find_block(content) else {
        return FrontMatter {
            tags: Vec::new(),
            body: content.to_string(),
        };
    };

    match serde_yaml::from_str::<Option<HashMap<String, serde_yaml::Value>>>(yaml) {
        Ok(fields) => FrontMatter {
            tags: fields.as_ref().map(extract_tags).unwrap_or_default(),
            body: body.to_string(),
        },
        Err(e) => {
            log::warn!("Ignoring malformed front-matter: {}", e);
            FrontMatter {
                tags: Vec::new(),
                body: content.to_string(),
            }
        }
    }
}

/// Locate the fenced block; returns (yaml text, remaining body)
fn find_block(content: &str) -> Option<(&str, &str)> {
    let content = content.strip_prefix('\u{feff}').unwrap_or(content);
    let (first, mut rest) = split_line(content);
    if first.trim_end() != DELIMITER {
        return None;
    }

    let yaml_start = rest;
    let mut yaml_len = 0;
    while !rest.is_empty() {
        let (line, after) = split_line(rest);
        if line.trim_end() == DELIMITER {
            let yaml = &yaml_start[..yaml_len];
            let body = after.trim_start_matches(['\r', '\n']);
            return Some((yaml, body));
        }
        yaml_len += rest.len() - after.len();
        rest = after;
    }

    None
}

/// Split off the first line, dropping its terminator
fn split_line(text: &str) -> (&str, &str) {
    match text.find('\n') {
        Some(idx) => (text[..idx].trim_end_matches('\r'), &text[idx + 1..]),
        None => (text, ""),
    }
}

/// Merge `tags` and `keywords` into one deduplicated list
fn extract_tags(fields: &HashMap<String, serde_yaml::Value>) -> Vec<String> {
    let mut tags: Vec<String> = Vec::new();

    for key in TAG_KEYS {
        let Some(value) = fields.get(key) else {
            continue;
        };
        for tag in tag_values(value) {
            if !tags.contains(&tag) {
                tags.push(tag);
            }
        }
    }

    tags
}

fn tag_values(value: &serde_yaml::Value) -> Vec<String> {
    match value {
        serde_yaml::Value::Sequence(seq) => seq.iter().filter_map(scalar_to_tag).collect(),
        // Tags might be comma-separated
        serde_yaml::Value::String(s) => s
            .split(',')
            .map(str::trim)
            .filter(|t| !t.is_empty())
            .map(str::to_string)
            .collect(),
        other => scalar_to_tag(other).into_iter().collect(),
    }
}

fn scalar_to_tag(value: &serde_yaml::Value) -> Option<String> {
    let tag = match value {
        serde_yaml::Value::String(s) => s.trim().to_string(),
        serde_yaml::Value::Number(n) => n.to_string(),
        serde_yaml::Value::Bool(b) => b.to_string(),
        _ => return None,
    };
    (!tag.is_empty()).then_some(tag)
}
