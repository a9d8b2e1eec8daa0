//! Read-only queries over a snapshot of a rendered page.
//!
//! The browser hands back serialised HTML; everything that is "query
//! elements / read inner text" happens here, synchronously, on a parsed
//! [`scraper::Html`] tree. `Html` is not `Send`, so a [`Dom`] must never be
//! held across an `.await`.

use scraper::{ElementRef, Html, Node, Selector};

/// Tags whose text is never visible.
const HIDDEN_TAGS: &[&str] = &["script", "style", "noscript", "template", "svg"];

/// Parse a CSS selector, logging and returning `None` when it is invalid.
pub fn parse_selector(selector: &str) -> Option<Selector> {
    match Selector::parse(selector) {
        Ok(sel) => Some(sel),
        Err(e) => {
            tracing::debug!(%selector, error = %e, "Invalid selector");
            None
        }
    }
}

/// Visible text of an element with whitespace collapsed.
pub fn element_text(el: ElementRef<'_>) -> String {
    let mut out = String::new();
    for node in el.descendants() {
        let Node::Text(text) = node.value() else {
            continue;
        };
        let hidden = node.ancestors().any(|a| match a.value() {
            Node::Element(e) => HIDDEN_TAGS.contains(&e.name()),
            _ => false,
        });
        if hidden {
            continue;
        }
        for word in text.split_whitespace() {
            if !out.is_empty() {
                out.push(' ');
            }
            out.push_str(word);
        }
    }
    out
}

/// Whether an element is marked as disabled by attribute or class name.
pub fn is_disabled(el: ElementRef<'_>) -> bool {
    let value = el.value();
    value.attr("disabled").is_some()
        || value
            .attr("aria-disabled")
            .is_some_and(|v| v.eq_ignore_ascii_case("true"))
        || value
            .attr("class")
            .is_some_and(|c| c.to_lowercase().contains("disabled"))
}

/// A parsed page.
pub struct Dom {
    html: Html,
}

impl Dom {
    pub fn parse(html: &str) -> Self {
        Self {
            html: Html::parse_document(html),
        }
    }

    /// The underlying tree, for callers that need to walk elements themselves.
    pub fn html(&self) -> &Html {
        &self.html
    }

    /// Contents of `<title>`, trimmed.
    pub fn title(&self) -> String {
        parse_selector("title")
            .and_then(|sel| self.html.select(&sel).next().map(element_text))
            .unwrap_or_default()
    }

    /// Visible text of `<body>` (or of the whole document if there is none).
    pub fn body_text(&self) -> String {
        parse_selector("body")
            .and_then(|sel| self.html.select(&sel).next())
            .map(element_text)
            .unwrap_or_else(|| element_text(self.html.root_element()))
    }

    /// Number of elements matching `selector` (0 for an invalid selector).
    pub fn count(&self, selector: &str) -> usize {
        parse_selector(selector)
            .map(|sel| self.html.select(&sel).count())
            .unwrap_or(0)
    }

    /// Text of the first element matching `selector`, if non-empty.
    pub fn text_of(&self, selector: &str) -> Option<String> {
        let sel = parse_selector(selector)?;
        let el = self.html.select(&sel).next()?;
        let text = element_text(el);
        (!text.is_empty()).then_some(text)
    }

    /// Try `selectors` in order; the first one that yields non-empty text
    /// accepted by `accept` wins.
    pub fn first_text<F>(&self, selectors: &[&str], accept: F) -> Option<String>
    where
        F: Fn(&str) -> bool,
    {
        selectors
            .iter()
            .filter_map(|s| self.text_of(s))
            .find(|text| accept(text))
    }

    /// Document-order index of the first element matching `selector` whose
    /// text contains `needle` (case-insensitive).
    pub fn position_with_text(&self, selector: &str, needle: &str) -> Option<usize> {
        let sel = parse_selector(selector)?;
        let needle = needle.to_lowercase();
        self.html
            .select(&sel)
            .position(|el| element_text(el).to_lowercase().contains(&needle))
    }

    /// `href` of the `index`-th element matching `selector`.
    pub fn nth_href(&self, selector: &str, index: usize) -> Option<String> {
        let sel = parse_selector(selector)?;
        self.html
            .select(&sel)
            .nth(index)
            .and_then(|el| el.value().attr("href"))
            .map(str::to_string)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const PAGE: &str = r#"
        <html><head><title> Careers at Acme </title><style>.x{}</style></head>
        <body>
          <h1>Join   us</h1>
          <script>var hidden = "apply now";</script>
          <div class="job-card"><a href="/jobs/1">Engineer</a></div>
          <div class="job-card"><a href="/jobs/2">Designer</a></div>
          <button class="next disabled">Next</button>
          <a aria-disabled="true" href="/p/3">Next</a>
          <a href="/p/2">next page</a>
        </body></html>
    "#;

    #[test]
    fn title_and_body_text_skip_hidden_content() {
        let dom = Dom::parse(PAGE);
        assert_eq!(dom.title(), "Careers at Acme");
        let body = dom.body_text();
        assert!(body.starts_with("Join us"));
        assert!(!body.contains("hidden"));
    }

    #[test]
    fn counts_and_first_text() {
        let dom = Dom::parse(PAGE);
        assert_eq!(dom.count(".job-card"), 2);
        assert_eq!(dom.count("[[not a selector"), 0);
        let text = dom.first_text(&[".missing", ".job-card a"], |_| true);
        assert_eq!(text.as_deref(), Some("Engineer"));
        let long = dom.first_text(&[".job-card a"], |t| t.len() > 100);
        assert_eq!(long, None);
    }

    #[test]
    fn position_and_href_lookup() {
        let dom = Dom::parse(PAGE);
        assert_eq!(dom.position_with_text("a", "next page"), Some(3));
        assert_eq!(dom.nth_href("a", 3).as_deref(), Some("/p/2"));
        assert_eq!(dom.nth_href("a", 42), None);
    }

    #[test]
    fn disabled_detection() {
        let dom = Dom::parse(PAGE);
        let sel = parse_selector("button, a[aria-disabled], a[href='/p/2']").unwrap();
        let flags: Vec<bool> = dom.html().select(&sel).map(is_disabled).collect();
        assert_eq!(flags, vec![true, true, false]);
    }
}
