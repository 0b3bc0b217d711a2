//! Markup cleaning for retrieved page text.
//!
//! [`MarkupCleaner`] turns HTML-ish page dumps into plain prose. It removes
//! script/style/navigation blocks, tags, comments, tracking query parameters,
//! boilerplate lines and oversized tables of contents, decodes entities and
//! normalizes whitespace.
//!
//! Every removal pass only ever shortens the text, and whitespace
//! normalization is idempotent on its own, so [`MarkupCleaner::clean`] runs
//! the passes until the text stops changing. The result is a fixed point:
//! cleaning it again returns it unchanged.

use lazy_static::lazy_static;
use regex::{Captures, Regex};

use crate::traits::TextCleaner;

/// Elements whose whole content is dropped.
const DROPPED_BLOCKS: &[&str] = &[
    "script", "style", "noscript", "nav", "header", "footer", "aside", "form", "iframe", "svg",
];

/// Query parameters that only exist for tracking.
const TRACKING_PARAMS: &[&str] = &[
    "fbclid", "gclid", "dclid", "msclkid", "mc_cid", "mc_eid", "igshid", "yclid", "_hsenc", "_hsmi",
    "ref_src",
];

/// Tables of contents with more entries than this are removed.
pub const MAX_TOC_ENTRIES: usize = 8;

/// TOC entries are short; longer lines end the table.
const TOC_ENTRY_MAX_WORDS: usize = 12;

lazy_static! {
    static ref BLOCK_REGEXES: Vec<Regex> = DROPPED_BLOCKS
        .iter()
        .map(|tag| Regex::new(&format!(r"(?is)<{tag}\b[^>]*>.*?</{tag}\s*>")).unwrap())
        .collect();

    static ref COMMENT_REGEX: Regex = Regex::new(r"(?s)<!--.*?-->").unwrap();

    static ref BREAKING_TAG_REGEX: Regex = Regex::new(
        r"(?i)</?(?:p|div|br|hr|li|ul|ol|dl|dt|dd|tr|td|th|table|h[1-6]|section|article|main|blockquote|pre)\b[^<>]*>"
    ).unwrap();

    static ref TAG_REGEX: Regex = Regex::new(r"<[a-zA-Z!/][^<>]*>").unwrap();

    static ref ENTITY_REGEX: Regex = Regex::new(
        r"&(?:(amp|lt|gt|quot|apos|nbsp)|#(\d{1,7})|#[xX]([0-9a-fA-F]{1,6}));"
    ).unwrap();

    static ref URL_REGEX: Regex = Regex::new(r#"https?://[^\s<>"'()\[\]]+"#).unwrap();

    static ref BOILERPLATE_LINE: Regex = Regex::new(
        r"(?im)^[ \t]*(?:skip to (?:main )?content|accept (?:all )?cookies|we use cookies\b.{0,80}|share (?:this|on) \w+.{0,40}|subscribe to our newsletter.{0,40}|follow us\b.{0,40}|all rights reserved\.?|back to top|saltar al contenido|aceptar (?:todas las )?cookies|suscr[ií]bete.{0,40})[ \t]*$"
    ).unwrap();

    static ref TOC_HEADING: Regex = Regex::new(
        r"(?i)^#*\s*(?:table of contents|contents|in this article|on this page|tabla de contenidos?|[ií]ndice|contenidos?)\s*:?$"
    ).unwrap();
}

/// Regex-based [`TextCleaner`].
#[derive(Debug, Clone, Default)]
pub struct MarkupCleaner;

impl MarkupCleaner {
    pub fn new() -> Self {
        Self
    }

    pub fn clean(&self, raw: &str) -> String {
        let mut current = normalize_whitespace(&strip(raw));
        loop {
            let next = normalize_whitespace(&strip(&current));
            if next == current {
                return current;
            }
            current = next;
        }
    }
}

impl TextCleaner for MarkupCleaner {
    fn clean(&self, raw: &str) -> String {
        MarkupCleaner::clean(self, raw)
    }
}

/// One round of removals. Never makes the text longer.
fn strip(text: &str) -> String {
    let mut out = text.to_string();

    for block in BLOCK_REGEXES.iter() {
        out = block.replace_all(&out, "\n").into_owned();
    }
    out = COMMENT_REGEX.replace_all(&out, "").into_owned();
    out = BREAKING_TAG_REGEX.replace_all(&out, "\n").into_owned();
    out = TAG_REGEX.replace_all(&out, "").into_owned();
    out = ENTITY_REGEX.replace_all(&out, decode_entity).into_owned();
    out = URL_REGEX
        .replace_all(&out, |caps: &Captures| strip_tracking(&caps[0]))
        .into_owned();
    out = BOILERPLATE_LINE.replace_all(&out, "").into_owned();

    drop_oversized_toc(&out)
}

fn decode_entity(caps: &Captures) -> String {
    if let Some(name) = caps.get(1) {
        return match name.as_str() {
            "amp" => "&",
            "lt" => "<",
            "gt" => ">",
            "quot" => "\"",
            "apos" => "'",
            _ => " ",
        }
        .to_string();
    }

    let code = match (caps.get(2), caps.get(3)) {
        (Some(dec), _) => dec.as_str().parse::<u32>().ok(),
        (_, Some(hex)) => u32::from_str_radix(hex.as_str(), 16).ok(),
        _ => None,
    };

    match code.and_then(char::from_u32) {
        Some(c) if c != '\0' => c.to_string(),
        _ => caps[0].to_string(),
    }
}

fn is_tracking_param(key: &str) -> bool {
    let key = key.to_ascii_lowercase();
    key.starts_with("utm_") || TRACKING_PARAMS.contains(&key.as_str())
}

/// Remove tracking parameters from a URL. Untouched URLs come back as-is.
fn strip_tracking(url: &str) -> String {
    let (without_fragment, fragment) = match url.find('#') {
        Some(i) => url.split_at(i),
        None => (url, ""),
    };
    let Some((base, query)) = without_fragment.split_once('?') else {
        return url.to_string();
    };

    let params: Vec<&str> = query.split('&').collect();
    let kept: Vec<&str> = params
        .iter()
        .copied()
        .filter(|p| !is_tracking_param(p.split('=').next().unwrap_or("")))
        .collect();

    if kept.len() == params.len() {
        return url.to_string();
    }

    let mut cleaned = base.to_string();
    if !kept.is_empty() {
        cleaned.push('?');
        cleaned.push_str(&kept.join("&"));
    }
    cleaned.push_str(fragment);
    cleaned
}

fn drop_oversized_toc(text: &str) -> String {
    let lines: Vec<&str> = text.split('\n').collect();
    let mut keep = vec![true; lines.len()];
    let mut changed = false;
    let mut i = 0;

    while i < lines.len() {
        if !TOC_HEADING.is_match(lines[i].trim()) {
            i += 1;
            continue;
        }

        let mut end = i + 1;
        let mut entries = 0;
        while end < lines.len() {
            let line = lines[end].trim();
            if line.is_empty() {
                end += 1;
                continue;
            }
            if line.split_whitespace().count() > TOC_ENTRY_MAX_WORDS {
                break;
            }
            entries += 1;
            end += 1;
        }

        if entries > MAX_TOC_ENTRIES {
            keep[i..end].iter_mut().for_each(|k| *k = false);
            changed = true;
            i = end;
        } else {
            i += 1;
        }
    }

    if !changed {
        return text.to_string();
    }

    lines
        .iter()
        .zip(keep)
        .filter_map(|(line, keep)| keep.then_some(*line))
        .collect::<Vec<_>>()
        .join("\n")
}

/// Single spaces inside lines, no blank-line runs, nothing at the edges.
fn normalize_whitespace(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    let mut blank_run = false;

    for line in text.split('\n') {
        let line = line.split_whitespace().collect::<Vec<_>>().join(" ");
        if line.is_empty() {
            blank_run = !out.is_empty();
            continue;
        }
        if !out.is_empty() {
            out.push('\n');
            if blank_run {
                out.push('\n');
            }
        }
        blank_run = false;
        out.push_str(&line);
    }

    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    fn clean(raw: &str) -> String {
        MarkupCleaner::new().clean(raw)
    }

    #[test]
    fn strips_scripts_styles_and_navigation() {
        let html = r#"<html><head><style>body { color: red }</style><script>track()</script></head>
            <body><nav><a href="/">Home</a> | <a href="/blog">Blog</a></nav>
            <h1>Marketing digital</h1><p>El marketing <b>online</b> crece.</p>
            <footer>© 2024 Acme</footer></body></html>"#;

        assert_eq!(clean(html), "Marketing digital\n\nEl marketing online crece.");
    }

    #[test]
    fn removes_tracking_parameters_only() {
        let text = "See https://example.com/post?utm_source=news&id=7&fbclid=abc#top and https://example.com/?q=seo";
        assert_eq!(
            clean(text),
            "See https://example.com/post?id=7#top and https://example.com/?q=seo"
        );
        assert_eq!(
            clean("https://example.com/a?utm_medium=x"),
            "https://example.com/a"
        );
    }

    #[test]
    fn decodes_entities() {
        assert_eq!(clean("Tom &amp; Jerry&#39;s &quot;show&quot;&nbsp;today"), "Tom & Jerry's \"show\" today");
    }

    #[test]
    fn drops_oversized_table_of_contents() {
        let mut text = String::from("Intro paragraph.\nTable of contents\n");
        for i in 1..=12 {
            text.push_str(&format!("{}. Section {}\n", i, i));
        }
        text.push_str("This closing paragraph is long enough to not look like a table of contents entry at all.");

        let cleaned = clean(&text);
        assert!(!cleaned.contains("Section 3"));
        assert!(cleaned.starts_with("Intro paragraph."));
        assert!(cleaned.ends_with("entry at all."));
    }

    #[test]
    fn keeps_short_table_of_contents() {
        let text = "Contents\nOne\nTwo\nThree";
        assert_eq!(clean(text), text);
    }

    #[test]
    fn drops_boilerplate_lines() {
        let text = "Skip to content\nReal text here.\nAccept all cookies";
        assert_eq!(clean(text), "Real text here.");
    }

    #[test]
    fn clean_text_is_unchanged() {
        let text = "Plain paragraph one.\n\nPlain paragraph two with a link https://example.com/x?id=1.";
        assert_eq!(clean(text), text);
    }

    #[test]
    fn nested_entities_settle() {
        let once = clean("&amp;lt;b&amp;gt;bold&amp;lt;/b&amp;gt;");
        assert_eq!(clean(&once), once);
    }

    proptest! {
        #[test]
        fn cleaning_is_idempotent(raw in ".{0,400}") {
            let once = clean(&raw);
            prop_assert_eq!(clean(&once), once);
        }

        #[test]
        fn cleaning_markup_is_idempotent(
            parts in prop::collection::vec(
                prop_oneof![
                    Just("<p>".to_string()),
                    Just("</p>".to_string()),
                    Just("<script>x()</script>".to_string()),
                    Just("<nav>menu</nav>".to_string()),
                    Just("&amp;".to_string()),
                    Just("&lt;".to_string()),
                    Just("&gt;".to_string()),
                    Just("\n".to_string()),
                    Just("Contents".to_string()),
                    Just("https://a.com/?utm_source=x&k=v".to_string()),
                    "[a-z ]{0,12}",
                ],
                0..60,
            )
        ) {
            let raw = parts.concat();
            let once = clean(&raw);
            prop_assert_eq!(clean(&once), once);
        }
    }
}
