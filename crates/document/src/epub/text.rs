//! XHTML → plain paragraphs.

use crate::consts;
use scraper::node::Node;
use scraper::{ElementRef, Html};

/// Collapse every whitespace run to a single space and trim the ends.
pub(crate) fn collapse(text: &str) -> String {
    text.split_whitespace().collect::<Vec<_>>().join(" ")
}

/// A parsed spine item.
pub(crate) struct Chapter {
    document: Html,
}
impl Chapter {
    pub fn parse(html: &str) -> Self {
        Self {
            document: Html::parse_document(html),
        }
    }

    /// Text of the first `h1`..`h6`, if it has any.
    pub fn first_heading(&self) -> Option<String> {
        self.document
            .select(&consts::HEADING_SELECTOR)
            .map(|el| collapse(&el.text().collect::<String>()))
            .find(|text| !text.is_empty())
    }

    /// Walk `<body>` (or the root element when there is none) and return one
    /// whitespace-normalized string per paragraph.
    pub fn paragraphs(&self) -> Vec<String> {
        let root = self
            .document
            .select(&consts::BODY_SELECTOR)
            .next()
            .unwrap_or_else(|| self.document.root_element());
        let mut walker = Walker::default();
        walker.visit(root);
        walker.flush();
        walker.paragraphs
    }
}

#[derive(Default)]
struct Walker {
    tokens: Vec<String>,
    paragraphs: Vec<String>,
}
impl Walker {
    fn visit(&mut self, element: ElementRef<'_>) {
        for child in element.children() {
            match child.value() {
                Node::Text(text) => self.tokens.extend(text.split_whitespace().map(str::to_string)),
                Node::Element(el) => {
                    let name = el.name();
                    if consts::SKIPPED_TAGS.contains(&name) {
                        continue;
                    }
                    if name == "br" {
                        self.flush();
                        continue;
                    }
                    let Some(child) = ElementRef::wrap(child) else {
                        continue;
                    };
                    let block = consts::BLOCK_TAGS.contains(&name);
                    if block {
                        self.flush();
                    }
                    self.visit(child);
                    if block {
                        self.flush();
                    }
                },
                _ => {},
            }
        }
    }

    fn flush(&mut self) {
        if self.tokens.is_empty() {
            return;
        }
        self.paragraphs.push(self.tokens.join(" "));
        self.tokens.clear();
    }
}
