//! Tolerant HTML scanning: element lookup, attribute access, and HTML-to-text
//! flattening.
//!
//! Airline templates are rarely well-formed, so nothing here builds a DOM or
//! fails. Tags are tokenized with a regex, elements are matched to their
//! closing tag by depth, and unclosed elements run to the end of the input.

use std::sync::LazyLock;

use regex::Regex;

static TAG_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r#"(?s)<(/?)([A-Za-z][A-Za-z0-9:-]*)((?:[^>"']|"[^"]*"|'[^']*')*)>"#)
        .expect("valid tag regex")
});

static ATTR_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r#"([A-Za-z_:@][-A-Za-z0-9_:.]*)\s*(?:=\s*(?:"([^"]*)"|'([^']*)'|([^\s"'>]+)))?"#)
        .expect("valid attribute regex")
});

static NUMERIC_ENTITY_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"&#(?:[xX]([0-9A-Fa-f]{1,6})|([0-9]{1,7}));").expect("valid entity regex"));

/// Elements that never have content or a closing tag.
const VOID_ELEMENTS: &[&str] = &[
    "area", "base", "br", "col", "embed", "hr", "img", "input", "link", "meta", "source", "wbr",
];

/// Elements whose content is never visible text.
const HIDDEN_ELEMENTS: &[&str] = &["script", "style", "head", "title", "noscript"];

/// Elements that start a new line when flattened.
const BLOCK_ELEMENTS: &[&str] = &[
    "br", "p", "div", "tr", "li", "ul", "ol", "table", "tbody", "thead", "h1", "h2", "h3", "h4",
    "h5", "h6", "hr", "blockquote", "section", "article", "header", "footer",
];

/// A single tag occurrence.
#[derive(Debug, Clone)]
struct Tag {
    start: usize,
    end: usize,
    name: String,
    closing: bool,
    self_closing: bool,
    attrs_raw: (usize, usize),
}

fn tokenize(html: &str) -> Vec<Tag> {
    TAG_RE
        .captures_iter(html)
        .filter_map(|caps| {
            let whole = caps.get(0)?;
            let attrs = caps.get(3)?;
            Some(Tag {
                start: whole.start(),
                end: whole.end(),
                name: caps.get(2)?.as_str().to_ascii_lowercase(),
                closing: caps.get(1).is_some_and(|m| !m.as_str().is_empty()),
                self_closing: attrs.as_str().trim_end().ends_with('/'),
                attrs_raw: (attrs.start(), attrs.end()),
            })
        })
        .collect()
}

/// An element located in an HTML string.
#[derive(Debug, Clone)]
pub struct Element<'a> {
    /// Lower-case tag name.
    pub name: String,
    /// Attributes with lower-case names and entity-decoded values.
    pub attrs: Vec<(String, String)>,
    /// Everything between the opening and closing tag.
    pub inner: &'a str,
    /// Byte offset of the opening tag in the scanned string.
    pub start: usize,
}

impl Element<'_> {
    /// Attribute value by (case-insensitive) name.
    pub fn attr(&self, name: &str) -> Option<&str> {
        self.attrs
            .iter()
            .find(|(k, _)| k.eq_ignore_ascii_case(name))
            .map(|(_, v)| v.as_str())
    }

    /// Visible text of the element on a single line.
    pub fn text(&self) -> String {
        inline_text(self.inner)
    }
}

/// Parse the attribute section of a tag.
fn parse_attrs(raw: &str) -> Vec<(String, String)> {
    ATTR_RE
        .captures_iter(raw)
        .filter_map(|caps| {
            let name = caps.get(1)?.as_str().to_ascii_lowercase();
            let value = caps
                .get(2)
                .or_else(|| caps.get(3))
                .or_else(|| caps.get(4))
                .map(|m| decode_entities(m.as_str()))
                .unwrap_or_default();
            Some((name, value))
        })
        .collect()
}

/// Find every element accepted by `keep`, in document order.
///
/// `keep` receives the lower-case tag name and the parsed attributes.
/// Nested matches are all returned (an outer table and the table inside it).
pub fn find_elements<'a, F>(html: &'a str, mut keep: F) -> Vec<Element<'a>>
where
    F: FnMut(&str, &[(String, String)]) -> bool,
{
    let tags = tokenize(html);
    let mut out = Vec::new();

    for (i, tag) in tags.iter().enumerate() {
        if tag.closing {
            continue;
        }
        let attrs = parse_attrs(&html[tag.attrs_raw.0..tag.attrs_raw.1]);
        if !keep(&tag.name, &attrs) {
            continue;
        }

        let inner = if tag.self_closing || VOID_ELEMENTS.contains(&tag.name.as_str()) {
            ""
        } else {
            let close = matching_close(&tags[i + 1..], &tag.name);
            let inner_end = close.map_or(html.len(), |c| c.start);
            &html[tag.end..inner_end]
        };

        out.push(Element {
            name: tag.name.clone(),
            attrs,
            inner,
            start: tag.start,
        });
    }

    out
}

/// Find the closing tag that balances an opening `name` tag.
fn matching_close<'t>(rest: &'t [Tag], name: &str) -> Option<&'t Tag> {
    let mut depth = 0usize;
    for tag in rest.iter().filter(|t| t.name == name) {
        if tag.closing {
            if depth == 0 {
                return Some(tag);
            }
            depth -= 1;
        } else if !tag.self_closing {
            depth += 1;
        }
    }
    None
}

/// All elements with the given tag name.
pub fn elements_by_tag<'a>(html: &'a str, tag: &str) -> Vec<Element<'a>> {
    find_elements(html, |name, _| name == tag)
}

/// Remove every `tag` element (with its content) from `html`.
///
/// Used to look at a table without the tables nested in its cells.
pub fn strip_elements(html: &str, tag: &str) -> String {
    let tags = tokenize(html);
    let mut result = String::with_capacity(html.len());
    let mut cursor = 0usize;
    let mut i = 0usize;

    while i < tags.len() {
        let t = &tags[i];
        if t.name == tag && !t.closing && t.start >= cursor {
            result.push_str(&html[cursor..t.start]);
            match matching_close(&tags[i + 1..], tag) {
                Some(close) => {
                    cursor = close.end;
                    while i < tags.len() && tags[i].start < cursor {
                        i += 1;
                    }
                    continue;
                }
                None => {
                    cursor = html.len();
                    break;
                }
            }
        }
        i += 1;
    }

    if cursor < html.len() {
        result.push_str(&html[cursor..]);
    }
    result
}

/// Convert HTML to plain text.
///
/// - Drops scripts, styles and `<head>`
/// - Starts a new line at block elements (`<p>`, `<div>`, `<tr>`, `<br>`, …)
/// - Separates table cells with a space
/// - Decodes HTML entities
/// - Collapses runs of blank lines
pub fn html_to_text(html: &str) -> String {
    let tags = tokenize(html);
    let mut raw = String::with_capacity(html.len());
    let mut cursor = 0usize;
    let mut hidden_until: Option<&str> = None;

    for tag in &tags {
        if hidden_until.is_none() {
            raw.push_str(&html[cursor..tag.start]);
        }
        cursor = tag.end;

        if let Some(hidden) = hidden_until {
            if tag.closing && tag.name == hidden {
                hidden_until = None;
            }
            continue;
        }

        let name = tag.name.as_str();
        if !tag.closing && !tag.self_closing && HIDDEN_ELEMENTS.contains(&name) {
            hidden_until = HIDDEN_ELEMENTS.iter().copied().find(|h| *h == name);
        } else if BLOCK_ELEMENTS.contains(&name) {
            raw.push('\n');
        } else if name == "td" || name == "th" {
            raw.push(' ');
        }
    }
    if hidden_until.is_none() && cursor < html.len() {
        raw.push_str(&html[cursor..]);
    }

    let decoded = decode_entities(&raw);

    // Collapse blank lines and trim each line
    let mut prev_was_blank = false;
    let mut cleaned = String::with_capacity(decoded.len());
    for line in decoded.lines() {
        let line = line.split_whitespace().collect::<Vec<_>>().join(" ");
        if line.is_empty() {
            if !prev_was_blank {
                cleaned.push('\n');
                prev_was_blank = true;
            }
        } else {
            cleaned.push_str(&line);
            cleaned.push('\n');
            prev_was_blank = false;
        }
    }

    cleaned.trim().to_string()
}

/// Visible text of an HTML fragment collapsed to one line.
pub fn inline_text(fragment: &str) -> String {
    html_to_text(fragment)
        .split_whitespace()
        .collect::<Vec<_>>()
        .join(" ")
}

/// Decode named and numeric HTML entities.
pub fn decode_entities(s: &str) -> String {
    if !s.contains('&') {
        return s.to_string();
    }
    let numeric = NUMERIC_ENTITY_RE.replace_all(s, |caps: &regex::Captures<'_>| {
        let code = match (caps.get(1), caps.get(2)) {
            (Some(hex), _) => u32::from_str_radix(hex.as_str(), 16).ok(),
            (_, Some(dec)) => dec.as_str().parse::<u32>().ok(),
            _ => None,
        };
        code.and_then(char::from_u32)
            .map(|c| if c == '\u{a0}' { ' ' } else { c })
            .map(String::from)
            .unwrap_or_default()
    });

    numeric
        .replace("&nbsp;", " ")
        .replace("&lt;", "<")
        .replace("&gt;", ">")
        .replace("&quot;", "\"")
        .replace("&apos;", "'")
        .replace("&rarr;", "→")
        .replace("&ndash;", "–")
        .replace("&mdash;", "—")
        .replace("&amp;", "&")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_html_to_text_basic() {
        let html = "<p>Hello <b>world</b></p><p>Second paragraph</p>";
        let text = html_to_text(html);
        assert!(text.contains("Hello world"));
        assert!(text.contains("Second paragraph"));
    }

    #[test]
    fn test_html_to_text_entities() {
        assert_eq!(html_to_text("Tom &amp; Jerry &lt;3&gt;"), "Tom & Jerry <3>");
        assert_eq!(html_to_text("SFO&#160;&rarr;&#x20;JFK"), "SFO → JFK");
    }

    #[test]
    fn test_html_to_text_removes_scripts_and_styles() {
        let html = r#"Before<script type="application/ld+json">{"a":1}</script><style>p{}</style>After"#;
        assert_eq!(html_to_text(html), "BeforeAfter");
    }

    #[test]
    fn test_html_to_text_table_cells_are_separated() {
        let html = "<table><tr><td>Flight</td><td>UA123</td></tr></table>";
        assert_eq!(html_to_text(html), "Flight UA123");
    }

    #[test]
    fn test_find_elements_with_attributes() {
        let html = r#"<div itemscope itemtype="http://schema.org/FlightReservation"><meta itemprop="reservationNumber" content="ABC123"/></div>"#;
        let found = find_elements(html, |_, attrs| attrs.iter().any(|(k, _)| k == "itemprop"));
        assert_eq!(found.len(), 1);
        assert_eq!(found[0].name, "meta");
        assert_eq!(found[0].attr("content"), Some("ABC123"));
        assert_eq!(found[0].inner, "");
    }

    #[test]
    fn test_nested_elements_are_balanced() {
        let html = "<table id=a><tr><td><table id=b><tr><td>x</td></tr></table></td></tr></table>";
        let tables = elements_by_tag(html, "table");
        assert_eq!(tables.len(), 2);
        assert_eq!(tables[0].attr("id"), Some("a"));
        assert!(tables[0].inner.contains("id=b"));
        assert_eq!(tables[1].inner, "<tr><td>x</td></tr>");
    }

    #[test]
    fn test_unclosed_element_runs_to_end() {
        let html = "<table><tr><td>Flight</td><td>UA1";
        let tables = elements_by_tag(html, "table");
        assert_eq!(tables.len(), 1);
        assert!(tables[0].inner.ends_with("UA1"));
    }

    #[test]
    fn test_strip_elements_removes_nested_tables() {
        let html = "<tr><td>outer</td><td><table><tr><td>inner</td></tr></table></td></tr>";
        let stripped = strip_elements(html, "table");
        assert!(stripped.contains("outer"));
        assert!(!stripped.contains("inner"));
    }

    #[test]
    fn test_attribute_quoting_styles() {
        let html = r#"<td class='label' data-x=plain title="a &amp; b">v</td>"#;
        let cells = elements_by_tag(html, "td");
        assert_eq!(cells[0].attr("class"), Some("label"));
        assert_eq!(cells[0].attr("data-x"), Some("plain"));
        assert_eq!(cells[0].attr("TITLE"), Some("a & b"));
        assert_eq!(cells[0].text(), "v");
    }
}
