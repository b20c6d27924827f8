// src/extract.rs
//! Reduce a fetched HTML page to a [`PageDigest`]: the stable, comparable form
//! stored in snapshots. Nothing time-dependent goes into the digest, so the
//! same page always hashes the same.

use std::fmt::Write as _;

use once_cell::sync::OnceCell;
use regex::Regex;
use scraper::{ElementRef, Html, Node, Selector};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

/// Selectors that usually carry activity listings or registration controls.
pub const ACTIVITY_SELECTORS: &[&str] = &[
    ".activity",
    ".event",
    ".program",
    ".tour",
    "[class*=\"activity\"]",
    "[class*=\"event\"]",
    "[class*=\"registration\"]",
    "button[class*=\"register\"]",
    "a[class*=\"register\"]",
    ".btn",
    "button",
    "a[href*=\"register\"]",
];

/// Availability wording worth tracking (matched case-insensitively).
pub const STATUS_KEYWORDS: &[&str] = &[
    "available",
    "sold out",
    "full",
    "register",
    "book now",
    "reserve",
    "waitlist",
];

const MIN_ACTIVITY_TEXT: usize = 5;
const INVISIBLE_TAGS: &[&str] = &["script", "style", "noscript", "template"];

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PageDigest {
    pub title: String,
    pub forms: Vec<FormDigest>,
    pub activities: Vec<Activity>,
    pub status: Vec<StatusLine>,
    /// SHA-256 of the whole visible text, catches edits outside the sections above.
    pub text_hash: String,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct FormDigest {
    pub action: String,
    pub method: String,
    pub controls: Vec<FormControl>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct FormControl {
    pub kind: String,
    pub name: String,
    pub value: String,
    pub text: String,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Activity {
    pub selector: String,
    pub text: String,
    pub href: String,
    pub classes: Vec<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct StatusLine {
    pub keyword: String,
    pub text: String,
    pub parent_tag: String,
}

impl PageDigest {
    /// Hex SHA-256 of the digest's canonical JSON.
    pub fn content_hash(&self) -> String {
        let bytes = serde_json::to_vec(self)
            .expect("PageDigest holds only strings and vecs; serialization cannot fail");
        sha256_hex(&bytes)
    }
}

/// Compiled per-target ignore patterns.
#[derive(Debug, Clone, Default)]
pub struct IgnoreSet {
    patterns: Vec<Regex>,
}

impl IgnoreSet {
    pub fn new<S: AsRef<str>>(patterns: &[S]) -> Result<Self, regex::Error> {
        let patterns = patterns
            .iter()
            .map(|p| Regex::new(p.as_ref()))
            .collect::<Result<Vec<_>, _>>()?;
        Ok(Self { patterns })
    }

    pub fn is_empty(&self) -> bool {
        self.patterns.is_empty()
    }

    fn strip(&self, s: &str) -> String {
        let mut out = s.to_string();
        for re in &self.patterns {
            out = re.replace_all(&out, "").into_owned();
        }
        out
    }
}

/// Normalize text: decode entities, drop ignored fragments, collapse whitespace, trim.
pub fn normalize_text(s: &str, ignore: &IgnoreSet) -> String {
    let decoded = html_escape::decode_html_entities(s);
    let stripped = if ignore.is_empty() {
        decoded.into_owned()
    } else {
        ignore.strip(&decoded)
    };

    static RE_WS: OnceCell<Regex> = OnceCell::new();
    let re_ws = RE_WS.get_or_init(|| Regex::new(r"\s+").expect("static regex"));
    re_ws.replace_all(&stripped, " ").trim().to_string()
}

/// Build the digest of an HTML document.
pub fn extract_digest(html: &str, ignore: &IgnoreSet) -> PageDigest {
    let doc = Html::parse_document(html);

    PageDigest {
        title: select_first_text(&doc, "title", ignore),
        forms: extract_forms(&doc, ignore),
        activities: extract_activities(&doc, ignore),
        status: extract_status(&doc, ignore),
        text_hash: sha256_hex(visible_text(&doc, ignore).as_bytes()),
    }
}

fn element_text(el: &ElementRef, ignore: &IgnoreSet) -> String {
    let joined = el.text().collect::<Vec<_>>().join(" ");
    normalize_text(&joined, ignore)
}

fn attr(el: &ElementRef, name: &str) -> String {
    el.value().attr(name).unwrap_or_default().trim().to_string()
}

fn select_first_text(doc: &Html, sel: &str, ignore: &IgnoreSet) -> String {
    let Ok(selector) = Selector::parse(sel) else {
        return String::new();
    };
    doc.select(&selector)
        .next()
        .map(|el| element_text(&el, ignore))
        .unwrap_or_default()
}

fn extract_forms(doc: &Html, ignore: &IgnoreSet) -> Vec<FormDigest> {
    let (Ok(form_sel), Ok(control_sel)) = (
        Selector::parse("form"),
        Selector::parse("input, select, textarea, button"),
    ) else {
        return Vec::new();
    };

    doc.select(&form_sel)
        .map(|form| FormDigest {
            action: attr(&form, "action"),
            method: attr(&form, "method").to_ascii_lowercase(),
            controls: form
                .select(&control_sel)
                .map(|c| {
                    let kind = c
                        .value()
                        .attr("type")
                        .map(|t| t.trim().to_ascii_lowercase())
                        .unwrap_or_else(|| c.value().name().to_string());
                    FormControl {
                        kind,
                        name: attr(&c, "name"),
                        value: normalize_text(&attr(&c, "value"), ignore),
                        text: element_text(&c, ignore),
                    }
                })
                .collect(),
        })
        .collect()
}

fn extract_activities(doc: &Html, ignore: &IgnoreSet) -> Vec<Activity> {
    let mut out = Vec::new();
    for sel in ACTIVITY_SELECTORS {
        let Ok(selector) = Selector::parse(sel) else {
            tracing::debug!(selector = *sel, "skipping unparsable selector");
            continue;
        };
        for el in doc.select(&selector) {
            let text = element_text(&el, ignore);
            if text.chars().count() <= MIN_ACTIVITY_TEXT {
                continue;
            }
            out.push(Activity {
                selector: (*sel).to_string(),
                text,
                href: attr(&el, "href"),
                classes: el.value().classes().map(str::to_string).collect(),
            });
        }
    }
    out
}

fn is_invisible_tag(node: &Node) -> bool {
    node.as_element()
        .is_some_and(|e| INVISIBLE_TAGS.contains(&e.name()))
}

fn extract_status(doc: &Html, ignore: &IgnoreSet) -> Vec<StatusLine> {
    let mut out = Vec::new();
    for keyword in STATUS_KEYWORDS {
        for node in doc.tree.nodes() {
            let Some(text) = node.value().as_text() else {
                continue;
            };
            if node.ancestors().any(|a| is_invisible_tag(a.value())) {
                continue;
            }
            let text = normalize_text(text, ignore);
            if text.is_empty() || !text.to_lowercase().contains(*keyword) {
                continue;
            }
            let parent_tag = node
                .parent()
                .and_then(|p| p.value().as_element().map(|e| e.name().to_string()))
                .unwrap_or_default();
            out.push(StatusLine {
                keyword: (*keyword).to_string(),
                text,
                parent_tag,
            });
        }
    }
    out
}

fn visible_text(doc: &Html, ignore: &IgnoreSet) -> String {
    let body = Selector::parse("body")
        .ok()
        .and_then(|s| doc.select(&s).next());
    let root = body.map(|b| *b).unwrap_or_else(|| doc.tree.root());

    let joined = root
        .descendants()
        .filter(|n| !n.ancestors().any(|a| is_invisible_tag(a.value())))
        .filter_map(|n| n.value().as_text().map(|t| t.to_string()))
        .collect::<Vec<_>>()
        .join(" ");
    normalize_text(&joined, ignore)
}

pub(crate) fn sha256_hex(bytes: &[u8]) -> String {
    let digest = Sha256::digest(bytes);
    let mut out = String::with_capacity(64);
    for b in digest.iter() {
        let _ = write!(&mut out, "{:02x}", b);
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    const PAGE: &str = r#"<html><head><title> Campus  Tours </title>
        <script>var stamp = "available at 12:00";</script></head>
        <body>
          <div class="event">Morning Campus Tour</div>
          <form action="/book" method="POST">
            <select name="slot"><option>9am</option></select>
            <button type="submit">Book now</button>
          </form>
          <p>Information session: sold out</p>
          <a href="/register?id=1">Register here</a>
        </body></html>"#;

    #[test]
    fn normalize_text_collapses_ws_and_entities() {
        let out = normalize_text("  Hello,&nbsp;&nbsp; world \n\t ok ", &IgnoreSet::default());
        assert_eq!(out, "Hello, world ok");
    }

    #[test]
    fn ignore_patterns_strip_text() {
        let ig = IgnoreSet::new(&[r"Updated \d{2}:\d{2}"]).unwrap();
        assert_eq!(normalize_text("Tours Updated 10:45 today", &ig), "Tours today");
    }

    #[test]
    fn extracts_sections() {
        let d = extract_digest(PAGE, &IgnoreSet::default());
        assert_eq!(d.title, "Campus Tours");
        assert_eq!(d.forms.len(), 1);
        assert_eq!(d.forms[0].action, "/book");
        assert_eq!(d.forms[0].method, "post");
        let kinds: Vec<_> = d.forms[0].controls.iter().map(|c| c.kind.as_str()).collect();
        assert_eq!(kinds, vec!["select", "submit"]);
        assert!(d
            .activities
            .iter()
            .any(|a| a.selector == ".event" && a.text == "Morning Campus Tour"));
        assert!(d
            .activities
            .iter()
            .any(|a| a.href == "/register?id=1"));
        assert!(d
            .status
            .iter()
            .any(|s| s.keyword == "sold out" && s.parent_tag == "p"));
        // script text never counts
        assert!(!d.status.iter().any(|s| s.text.contains("12:00")));
    }

    #[test]
    fn whitespace_only_edits_do_not_change_hash() {
        let a = extract_digest(PAGE, &IgnoreSet::default());
        let b = extract_digest(&PAGE.replace("  ", "\n    "), &IgnoreSet::default());
        assert_eq!(a.content_hash(), b.content_hash());
    }

    #[test]
    fn visible_text_edit_changes_hash() {
        let a = extract_digest(PAGE, &IgnoreSet::default());
        let b = extract_digest(
            &PAGE.replace("Information session", "Info session"),
            &IgnoreSet::default(),
        );
        assert_ne!(a.content_hash(), b.content_hash());
    }

    #[test]
    fn sha256_hex_is_64_chars() {
        assert_eq!(sha256_hex(b"abc").len(), 64);
    }
}
