//! Page fields a site audit needs, read from a parsed HTML tree.

use scraper::{ElementRef, Html, Node, Selector};

use crate::formats::Headings;

const MAX_HREFS: usize = 500;
const MAX_SITEMAP_LOCS: usize = 20_000;

/// Elements whose text never counts as visible content.
const HIDDEN_ELEMENTS: [&str; 4] = ["script", "style", "noscript", "template"];

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct MetaTag {
    pub key: String,
    pub content: String,
}

#[derive(Debug, Clone, Default)]
pub struct Document {
    pub title: Option<String>,
    pub meta: Vec<MetaTag>,
    pub canonical: Option<String>,
    pub headings: Headings,
    pub hrefs: Vec<String>,
    pub text: String,
}

impl Document {
    pub fn parse(html: &str) -> Self {
        let document = Html::parse_document(html);

        let title = element_texts(&document, "title").into_iter().next();

        let meta = select(&document, "meta[name], meta[property]")
            .into_iter()
            .filter_map(|el| {
                let attrs = el.value();
                let key = attrs.attr("name").or_else(|| attrs.attr("property"))?;
                let content = attrs.attr("content")?;
                Some(MetaTag {
                    key: key.trim().to_ascii_lowercase(),
                    content: content.trim().to_string(),
                })
            })
            .collect();

        let canonical = select(&document, "link[rel][href]")
            .into_iter()
            .find(|el| {
                el.value().attr("rel").is_some_and(|rel| {
                    rel.split_whitespace()
                        .any(|r| r.eq_ignore_ascii_case("canonical"))
                })
            })
            .and_then(|el| el.value().attr("href"))
            .map(|href| href.trim().to_string());

        let headings = Headings {
            h1: element_texts(&document, "h1"),
            h2: element_texts(&document, "h2"),
            h3: element_texts(&document, "h3"),
        };

        let hrefs = select(&document, "a[href]")
            .into_iter()
            .filter_map(|el| el.value().attr("href"))
            .map(str::trim)
            .filter(|href| !href.is_empty() && !href.starts_with('#'))
            .take(MAX_HREFS)
            .map(str::to_string)
            .collect();

        let text = select(&document, "body")
            .into_iter()
            .next()
            .map(visible_text)
            .unwrap_or_default();

        Self {
            title,
            meta,
            canonical,
            headings,
            hrefs,
            text,
        }
    }

    pub fn meta_content(&self, key: &str) -> Option<&str> {
        self.meta
            .iter()
            .find(|m| m.key == key)
            .map(|m| m.content.as_str())
    }
}

fn select<'a>(document: &'a Html, selector: &str) -> Vec<ElementRef<'a>> {
    match Selector::parse(selector) {
        Ok(selector) => document.select(&selector).collect(),
        Err(err) => {
            tracing::debug!(selector, ?err, "invalid selector");
            Vec::new()
        }
    }
}

fn element_texts(document: &Html, selector: &str) -> Vec<String> {
    select(document, selector)
        .into_iter()
        .map(|el| collapse_whitespace(&el.text().collect::<Vec<_>>().join(" ")))
        .filter(|text| !text.is_empty())
        .collect()
}

fn visible_text(body: ElementRef<'_>) -> String {
    let mut parts = Vec::new();
    for node in body.descendants() {
        let Node::Text(text) = node.value() else {
            continue;
        };
        let hidden = node.ancestors().any(|ancestor| {
            ancestor
                .value()
                .as_element()
                .is_some_and(|el| HIDDEN_ELEMENTS.contains(&el.name()))
        });
        if !hidden {
            parts.push(&**text);
        }
    }
    collapse_whitespace(&parts.join(" "))
}

fn collapse_whitespace(input: &str) -> String {
    input.split_whitespace().collect::<Vec<_>>().join(" ")
}

/// `<loc>` entries of a sitemap or sitemap index.
pub fn extract_xml_locs(xml: &str) -> Vec<String> {
    let lower = xml.to_ascii_lowercase();
    let mut locs = Vec::new();

    let mut pos = 0usize;
    while locs.len() < MAX_SITEMAP_LOCS {
        let Some(start_rel) = lower[pos..].find("<loc>") else {
            break;
        };
        let start = pos + start_rel + "<loc>".len();
        let Some(end_rel) = lower[start..].find("</loc>") else {
            break;
        };
        let end = start + end_rel;
        let raw = decode_xml_entities(xml[start..end].trim());
        if !raw.is_empty() {
            locs.push(raw);
        }
        pos = end + "</loc>".len();
    }

    locs
}

fn decode_xml_entities(input: &str) -> String {
    if !input.contains('&') {
        return input.to_string();
    }
    input
        .replace("&lt;", "<")
        .replace("&gt;", ">")
        .replace("&quot;", "\"")
        .replace("&apos;", "'")
        .replace("&amp;", "&")
}

#[cfg(test)]
mod tests {
    use super::*;

    const PAGE: &str = r##"<!doctype html>
<html>
  <head>
    <title> SEO Tips &amp; Tricks </title>
    <meta name="description" content="Practical advice">
    <meta property="og:title" content='OG Title' />
    <link rel="canonical" href="https://example.com/tips">
    <style>body { color: red; }</style>
  </head>
  <body>
    <h1>Main <em>heading</em></h1>
    <h2>First</h2><h2>Second</h2>
    <abbr title="x">abbr</abbr>
    <article><p>Hello   world.</p></article>
    <a href="/about">About</a>
    <a class="x" href=contact>Contact</a>
    <a href="#top">Top</a>
    <script>var hidden = "<p>nope</p>";</script>
  </body>
</html>
"##;

    #[test]
    fn parses_head_fields() {
        let doc = Document::parse(PAGE);
        assert_eq!(doc.title.as_deref(), Some("SEO Tips & Tricks"));
        assert_eq!(doc.meta_content("description"), Some("Practical advice"));
        assert_eq!(doc.meta_content("og:title"), Some("OG Title"));
        assert_eq!(doc.canonical.as_deref(), Some("https://example.com/tips"));
    }

    #[test]
    fn parses_headings_and_links() {
        let doc = Document::parse(PAGE);
        assert_eq!(doc.headings.h1, vec!["Main heading"]);
        assert_eq!(doc.headings.h2, vec!["First", "Second"]);
        assert!(doc.headings.h3.is_empty());
        assert_eq!(doc.hrefs, vec!["/about", "contact"]);
    }

    #[test]
    fn visible_text_skips_scripts_and_styles() {
        let doc = Document::parse(PAGE);
        assert!(doc.text.contains("Hello world."));
        assert!(!doc.text.contains("hidden"));
        assert!(!doc.text.contains("color"));
        assert!(!doc.text.contains("SEO Tips"));
    }

    #[test]
    fn quoted_angle_brackets_do_not_end_a_tag() {
        let doc = Document::parse(
            r#"<html><head><meta content="Tips > tricks" name="description"></head>
<body><a title="a>b" href="/x">X</a></body></html>"#,
        );
        assert_eq!(doc.meta_content("description"), Some("Tips > tricks"));
        assert_eq!(doc.hrefs, vec!["/x"]);
    }

    #[test]
    fn extracts_sitemap_locs() {
        let xml = r#"<urlset>
  <url><loc> https://example.com/a </loc></url>
  <url><LOC>https://example.com/b?x=1&amp;y=2</LOC></url>
</urlset>"#;
        assert_eq!(
            extract_xml_locs(xml),
            vec!["https://example.com/a", "https://example.com/b?x=1&y=2"]
        );
    }
}
