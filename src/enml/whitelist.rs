//! ENML element and attribute vocabulary
//!
//! Mirrors http://xml.evernote.com/pub/enml2.dtd. The transformer uses it to
//! decide what survives; the validator uses it to check the result.

/// Attributes every ENML element accepts (`%attrs;` minus the forbidden
/// `id`/`class`/event handlers)
const CORE_ATTRS: &[&str] = &["style", "title", "lang", "xml:lang", "dir"];

/// Elements that never have content and serialize as `<tag/>`
const VOID_ELEMENTS: &[&str] = &["br", "hr", "img", "col", "area", "en-media", "en-todo", "en-crypt"];

/// (element, attributes allowed beyond `CORE_ATTRS`)
const ELEMENTS: &[(&str, &[&str])] = &[
    ("a", &["charset", "type", "name", "href", "hreflang", "rel", "rev", "shape", "coords", "target"]),
    ("abbr", &[]),
    ("acronym", &[]),
    ("address", &[]),
    ("area", &["shape", "coords", "href", "nohref", "alt", "target"]),
    ("b", &[]),
    ("bdo", &[]),
    ("big", &[]),
    ("blockquote", &["cite"]),
    ("br", &["clear"]),
    ("caption", &["align"]),
    ("center", &[]),
    ("cite", &[]),
    ("code", &[]),
    ("col", &["span", "width", "align", "char", "charoff", "valign"]),
    ("colgroup", &["span", "width", "align", "char", "charoff", "valign"]),
    ("dd", &[]),
    ("del", &["cite", "datetime"]),
    ("dfn", &[]),
    ("div", &["align"]),
    ("dl", &["compact"]),
    ("dt", &[]),
    ("em", &[]),
    ("font", &["size", "color", "face"]),
    ("h1", &["align"]),
    ("h2", &["align"]),
    ("h3", &["align"]),
    ("h4", &["align"]),
    ("h5", &["align"]),
    ("h6", &["align"]),
    ("hr", &["align", "noshade", "size", "width"]),
    ("i", &[]),
    ("img", &["src", "alt", "name", "longdesc", "height", "width", "usemap", "ismap", "align", "border", "hspace", "vspace"]),
    ("ins", &["cite", "datetime"]),
    ("kbd", &[]),
    ("li", &["type", "value"]),
    ("map", &["name"]),
    ("ol", &["type", "compact", "start"]),
    ("p", &["align"]),
    ("pre", &["width", "xml:space"]),
    ("q", &["cite"]),
    ("s", &[]),
    ("samp", &[]),
    ("small", &[]),
    ("span", &[]),
    ("strike", &[]),
    ("strong", &[]),
    ("sub", &[]),
    ("sup", &[]),
    ("table", &["summary", "width", "border", "frame", "rules", "cellspacing", "cellpadding", "align", "bgcolor"]),
    ("tbody", &["align", "char", "charoff", "valign"]),
    ("td", &["abbr", "axis", "headers", "scope", "rowspan", "colspan", "align", "char", "charoff", "valign", "nowrap", "bgcolor", "width", "height"]),
    ("tfoot", &["align", "char", "charoff", "valign"]),
    ("th", &["abbr", "axis", "headers", "scope", "rowspan", "colspan", "align", "char", "charoff", "valign", "nowrap", "bgcolor", "width", "height"]),
    ("thead", &["align", "char", "charoff", "valign"]),
    ("tr", &["align", "char", "charoff", "valign", "bgcolor"]),
    ("tt", &[]),
    ("u", &[]),
    ("ul", &["type", "compact"]),
    ("var", &[]),
    ("xmp", &[]),
    ("en-note", &["bgcolor", "text"]),
    ("en-media", &["type", "hash", "height", "width", "usemap", "align", "border", "hspace", "vspace", "longdesc", "alt", "valign"]),
    ("en-todo", &["checked"]),
    ("en-crypt", &["hint", "cipher", "length"]),
];

fn lookup(tag: &str) -> Option<&'static [&'static str]> {
    ELEMENTS
        .iter()
        .find(|(name, _)| *name == tag)
        .map(|(_, attrs)| *attrs)
}

/// Whether `tag` may appear in ENML content
pub fn is_allowed_element(tag: &str) -> bool {
    lookup(tag).is_some()
}

/// Whether `attr` may appear on `tag`
pub fn is_allowed_attribute(tag: &str, attr: &str) -> bool {
    let Some(extra) = lookup(tag) else {
        return false;
    };
    // en-todo and en-crypt don't take the common attributes
    let core = !matches!(tag, "en-todo" | "en-crypt") && CORE_ATTRS.contains(&attr);
    core || extra.contains(&attr)
}

/// Every ENML element name
pub fn element_names() -> impl Iterator<Item = &'static str> {
    ELEMENTS.iter().map(|(name, _)| *name)
}

/// Full attribute list accepted on `tag`, including the common ones
pub fn allowed_attributes(tag: &str) -> Vec<&'static str> {
    let Some(extra) = lookup(tag) else {
        return Vec::new();
    };
    let mut attrs: Vec<&'static str> = Vec::new();
    if !matches!(tag, "en-todo" | "en-crypt") {
        attrs.extend_from_slice(CORE_ATTRS);
    }
    attrs.extend_from_slice(extra);
    attrs
}

pub fn is_void_element(tag: &str) -> bool {
    VOID_ELEMENTS.contains(&tag)
}
