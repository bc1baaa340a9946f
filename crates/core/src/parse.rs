//! HTML parsing and DOM navigation.
//!
//! This module provides the [`Document`] and [`Element`] types used by the
//! extractors to query forum pages with CSS selectors and to flatten post
//! bodies into text lines.
//!
//! # Example
//!
//! ```rust
//! use threadcard_core::parse::Document;
//!
//! let html = r#"
//!     <html>
//!         <body>
//!             <h1 id="thread_subject">Title</h1>
//!             <table><tr><td class="t_f">First line<br>Second line</td></tr></table>
//!         </body>
//!     </html>
//! "#;
//!
//! let doc = Document::parse(html);
//! let subject = doc.select_first("#thread_subject").unwrap().unwrap();
//! assert_eq!(subject.text(), "Title");
//!
//! let body = doc.select_first("td.t_f").unwrap().unwrap();
//! assert_eq!(body.text_lines(), vec!["First line", "Second line"]);
//! ```

use scraper::{ElementRef, Html, Node, Selector};
use url::Url;

use crate::error::ParseError;

/// Line emitted before the text of a quoted block.
pub const QUOTE_OPEN: &str = "[quote]";
/// Line emitted after the text of a quoted block.
pub const QUOTE_CLOSE: &str = "[/quote]";

type SelectResult<T> = std::result::Result<T, ParseError>;

fn compile(selector: &str) -> SelectResult<Selector> {
    Selector::parse(selector).map_err(|e| ParseError::Selector(format!("{}: {}", selector, e)))
}

/// Represents a parsed HTML document.
///
/// # Example
///
/// ```rust
/// use threadcard_core::parse::Document;
///
/// let html = "<html><head><title>Test</title></head><body><p>Hello</p></body></html>";
/// let doc = Document::parse(html);
/// assert_eq!(doc.title(), Some("Test".to_string()));
/// ```
pub struct Document {
    html: Html,
    base_url: Option<Url>,
}

impl Document {
    /// Parses HTML from a string.
    pub fn parse(html: &str) -> Self {
        Self { html: Html::parse_document(html), base_url: None }
    }

    /// Parses HTML from a string, resolving relative links against `base_url`.
    pub fn parse_with_base(html: &str, base_url: Url) -> Self {
        Self { html: Html::parse_document(html), base_url: Some(base_url) }
    }

    pub fn base_url(&self) -> Option<&Url> {
        self.base_url.as_ref()
    }

    /// Selects elements using a CSS selector.
    ///
    /// # Errors
    ///
    /// Returns [`ParseError::Selector`] if the selector is invalid.
    ///
    /// # Example
    ///
    /// ```rust
    /// use threadcard_core::parse::Document;
    ///
    /// let html = r#"<p class="content">First</p><p class="content">Second</p>"#;
    /// let doc = Document::parse(html);
    /// let elements = doc.select("p.content").unwrap();
    /// assert_eq!(elements.len(), 2);
    /// ```
    pub fn select(&'_ self, selector: &str) -> SelectResult<Vec<Element<'_>>> {
        let sel = compile(selector)?;
        Ok(self.html.select(&sel).map(|el| Element { element: el }).collect())
    }

    /// First element matching the selector, in document order.
    pub fn select_first(&'_ self, selector: &str) -> SelectResult<Option<Element<'_>>> {
        let sel = compile(selector)?;
        Ok(self.html.select(&sel).next().map(|el| Element { element: el }))
    }

    /// Content of the `<title>` element, if present.
    pub fn title(&self) -> Option<String> {
        let selector = Selector::parse("title").ok()?;
        self.html.select(&selector).next().map(|el| el.text().collect::<String>())
    }

    /// Resolves a link found in the document to an absolute URL.
    ///
    /// Relative links need a base URL; without one only absolute links resolve.
    pub fn resolve_url(&self, href: &str) -> Option<String> {
        let href = href.trim();
        if href.is_empty() {
            return None;
        }
        match &self.base_url {
            Some(base) => base.join(href).ok().map(String::from),
            None => Url::parse(href).ok().map(String::from),
        }
    }
}

/// A wrapper around scraper's ElementRef.
///
/// # Example
///
/// ```rust
/// use threadcard_core::parse::Document;
///
/// let html = r#"<a href="https://example.com">Link text</a>"#;
/// let doc = Document::parse(html);
/// let link = &doc.select("a").unwrap()[0];
///
/// assert_eq!(link.text(), "Link text");
/// assert_eq!(link.attr("href"), Some("https://example.com"));
/// ```
#[derive(Clone, Debug)]
pub struct Element<'a> {
    element: ElementRef<'a>,
}

impl<'a> Element<'a> {
    /// Concatenation of all text nodes within this element.
    pub fn text(&self) -> String {
        self.element.text().collect()
    }

    /// Trimmed text content, or `None` when it is blank.
    pub fn text_trimmed(&self) -> Option<String> {
        let text = self.text();
        let trimmed = text.trim();
        if trimmed.is_empty() { None } else { Some(trimmed.to_string()) }
    }

    pub fn attr(&self, name: &str) -> Option<&'a str> {
        self.element.value().attr(name)
    }

    /// Lowercase tag name (e.g. "div", "a", "img").
    pub fn tag_name(&self) -> String {
        self.element.value().name().to_lowercase()
    }

    pub fn inner_html(&self) -> String {
        self.element.inner_html()
    }

    /// Selects descendant elements using a CSS selector.
    ///
    /// # Errors
    ///
    /// Returns [`ParseError::Selector`] if the selector is invalid.
    pub fn select(&self, selector: &str) -> SelectResult<Vec<Element<'a>>> {
        let sel = compile(selector)?;
        Ok(self.element.select(&sel).map(|el| Element { element: el }).collect())
    }

    pub fn select_first(&self, selector: &str) -> SelectResult<Option<Element<'a>>> {
        let sel = compile(selector)?;
        Ok(self.element.select(&sel).next().map(|el| Element { element: el }))
    }

    /// `href` of the nearest enclosing `<a>` that has one.
    pub fn ancestor_link(&self) -> Option<&'a str> {
        self.element
            .ancestors()
            .filter_map(ElementRef::wrap)
            .filter(|el| el.value().name() == "a")
            .find_map(|el| el.value().attr("href"))
    }

    /// Flattens the element into text lines.
    ///
    /// Every non-blank text node becomes one trimmed line. Script and style
    /// content is skipped, and the text of a `<blockquote>` is framed by
    /// [`QUOTE_OPEN`] and [`QUOTE_CLOSE`] lines.
    pub fn text_lines(&self) -> Vec<String> {
        let mut lines = Vec::new();
        collect_lines(self.element, &mut lines);
        lines
    }
}

fn collect_lines(element: ElementRef<'_>, lines: &mut Vec<String>) {
    for child in element.children() {
        match child.value() {
            Node::Text(text) => {
                let trimmed = text.trim();
                if !trimmed.is_empty() {
                    lines.push(trimmed.to_string());
                }
            }
            Node::Element(el) => {
                let name = el.name();
                if matches!(name, "script" | "style") {
                    continue;
                }
                let Some(child_ref) = ElementRef::wrap(child) else {
                    continue;
                };
                if name == "blockquote" {
                    lines.push(QUOTE_OPEN.to_string());
                    collect_lines(child_ref, lines);
                    lines.push(QUOTE_CLOSE.to_string());
                } else {
                    collect_lines(child_ref, lines);
                }
            }
            _ => {}
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const SAMPLE_HTML: &str = r#"
        <!DOCTYPE html>
        <html lang="zh-CN">
        <head>
            <meta charset="UTF-8">
            <title>Test Page</title>
            <style>.x { color: red; }</style>
        </head>
        <body>
            <h1>Heading</h1>
            <p class="content">Paragraph 1</p>
            <p class="content">Paragraph 2</p>
            <a href="https://example.com/go"><span><img id="inner" src="a.png"></span></a>
            <div id="post">
                First line<br>
                <script>var x = 1;</script>
                <div class="quote"><blockquote>Quoted <font>words</font></blockquote></div>
                Last line
            </div>
        </body>
        </html>
    "#;

    #[test]
    fn test_parse_document() {
        let doc = Document::parse(SAMPLE_HTML);
        assert_eq!(doc.title(), Some("Test Page".to_string()));
    }

    #[test]
    fn test_select_elements() {
        let doc = Document::parse(SAMPLE_HTML);
        let elements = doc.select("p.content").unwrap();

        assert_eq!(elements.len(), 2);
        assert_eq!(elements[0].text(), "Paragraph 1");
        assert_eq!(elements[1].text(), "Paragraph 2");
        assert_eq!(doc.select_first("h1").unwrap().unwrap().tag_name(), "h1");
        assert!(doc.select_first("table").unwrap().is_none());
    }

    #[test]
    fn test_invalid_selector() {
        let doc = Document::parse(SAMPLE_HTML);
        assert!(matches!(doc.select("[[invalid"), Err(ParseError::Selector(_))));
    }

    #[test]
    fn test_ancestor_link() {
        let doc = Document::parse(SAMPLE_HTML);
        let img = doc.select_first("#inner").unwrap().unwrap();
        assert_eq!(img.ancestor_link(), Some("https://example.com/go"));

        let heading = doc.select_first("h1").unwrap().unwrap();
        assert_eq!(heading.ancestor_link(), None);
    }

    #[test]
    fn test_text_lines_marks_quotes() {
        let doc = Document::parse(SAMPLE_HTML);
        let post = doc.select_first("#post").unwrap().unwrap();
        assert_eq!(post.text_lines(), vec!["First line", "[quote]", "Quoted", "words", "[/quote]", "Last line"]);
    }

    #[test]
    fn test_resolve_url() {
        let doc = Document::parse_with_base("<p></p>", Url::parse("https://keylol.com/t1-1-1").unwrap());
        assert_eq!(
            doc.resolve_url("data/attachment/forum/a.jpg").as_deref(),
            Some("https://keylol.com/data/attachment/forum/a.jpg")
        );
        assert_eq!(doc.resolve_url("https://img.example.com/b.png").as_deref(), Some("https://img.example.com/b.png"));
        assert_eq!(doc.resolve_url("  "), None);

        let bare = Document::parse("<p></p>");
        assert_eq!(bare.resolve_url("relative.png"), None);
    }
}
