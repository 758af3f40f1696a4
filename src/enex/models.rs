use chrono::{DateTime, NaiveDateTime, Utc};
use serde::Serialize;

/// DOCTYPE system id of the export container
pub const ENEX_DTD: &str = "http://xml.evernote.com/pub/evernote-export4.dtd";
/// DOCTYPE system id of the note content
pub const ENML_DTD: &str = "http://xml.evernote.com/pub/enml2.dtd";

/// Timestamp layout required by the export DTD (20231231T235959Z)
const ENEX_DATE_FORMAT: &str = "%Y%m%dT%H%M%SZ";

/// Longest title Evernote accepts, in characters
pub const MAX_TITLE_CHARS: usize = 255;

/// One embedded attachment of a note
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Resource {
    #[serde(skip)]
    pub data: Vec<u8>,
    pub mime: String,
    pub file_name: String,
    pub width: Option<u32>,
    pub height: Option<u32>,
    /// Lowercase hex MD5 of `data`; referenced by `<en-media hash>`
    pub hash: String,
}

/// One note of the export document
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Note {
    pub title: String,
    /// Complete ENML document (declaration, DOCTYPE, `<en-note>` root)
    pub content: String,
    pub created: DateTime<Utc>,
    pub updated: DateTime<Utc>,
    pub tags: Vec<String>,
    pub resources: Vec<Resource>,
}

/// Whether XML 1.0 can carry `c` at all, escaped or not
pub fn is_xml_char(c: char) -> bool {
    matches!(c, '\t' | '\n' | '\r' | '\u{20}'..='\u{D7FF}' | '\u{E000}'..='\u{FFFD}' | '\u{10000}'..='\u{10FFFF}')
}

/// Drop characters XML 1.0 cannot carry
pub fn strip_non_xml_chars(text: &str) -> String {
    text.chars().filter(|c| is_xml_char(*c)).collect()
}

/// Format a timestamp the way `<created>`/`<updated>`/`export-date` expect
pub fn format_enex_date(date: &DateTime<Utc>) -> String {
    date.format(ENEX_DATE_FORMAT).to_string()
}

/// Parse Evernote date format (YYYYMMDDTHHmmssZ)
pub fn parse_enex_date(date_str: &str) -> Option<DateTime<Utc>> {
    let clean = date_str.trim();
    if clean.len() != 16 || !clean.ends_with('Z') {
        return None;
    }

    NaiveDateTime::parse_from_str(clean, ENEX_DATE_FORMAT)
        .ok()
        .map(|dt| dt.and_utc())
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Datelike, TimeZone};

    #[test]
    fn test_format_enex_date() {
        let date = Utc.with_ymd_and_hms(2022, 8, 17, 15, 51, 34).unwrap();
        assert_eq!(format_enex_date(&date), "20220817T155134Z");
    }

    #[test]
    fn test_strip_non_xml_chars() {
        assert_eq!(strip_non_xml_chars("bad\u{1}tag\u{FFFF}"), "badtag");
        assert_eq!(strip_non_xml_chars("tab\tand é 🎉"), "tab\tand é 🎉");
        assert!(!is_xml_char('\u{0}'));
        assert!(is_xml_char('\n'));
    }

    #[test]
    fn test_parse_enex_date() {
        let date = parse_enex_date("20231231T235959Z").unwrap();
        assert_eq!(date.year(), 2023);
        assert_eq!(date.month(), 12);
        assert_eq!(date.day(), 31);

        assert!(parse_enex_date("20231231T235959").is_none());
        assert!(parse_enex_date("2023-12-31T23:59:59Z").is_none());
        assert!(parse_enex_date("20231331T235959Z").is_none());
    }
}
