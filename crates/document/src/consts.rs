use scraper::Selector;
use std::sync::LazyLock;

macro_rules! selector {
    ($name:ident, $css:expr) => {
        pub(crate) static $name: LazyLock<Selector> = LazyLock::new(|| Selector::parse($css).unwrap());
    };
}

pub(crate) const CONTAINER_PATH: &str = "META-INF/container.xml";
pub(crate) const NCX_MEDIA_TYPE: &str = "application/x-dtbncx+xml";

// Package documents are XML, but html5ever lowercases every tag and attribute
// name it sees, so the selectors below are all lowercase on purpose.
selector!(ROOTFILE_SELECTOR, "rootfile[full-path]");
selector!(MANIFEST_ITEM_SELECTOR, "manifest item[id][href]");
selector!(SPINE_SELECTOR, "spine");
selector!(SPINE_ITEMREF_SELECTOR, "spine itemref[idref]");
selector!(NAV_POINT_SELECTOR, "navpoint");
selector!(NAV_LABEL_TEXT_SELECTOR, "navlabel text");
selector!(NAV_CONTENT_SELECTOR, "content[src]");
selector!(NAV_SELECTOR, "nav");
selector!(NAV_LINK_SELECTOR, "a[href]");
selector!(BODY_SELECTOR, "body");
selector!(HEADING_SELECTOR, "h1, h2, h3, h4, h5, h6");

/// Subtrees that never contribute readable text.
pub(crate) const SKIPPED_TAGS: &[&str] = &["script", "style", "noscript", "svg", "math"];

/// Tags treated as paragraph boundaries.
pub(crate) const BLOCK_TAGS: &[&str] = &[
    "p", "div", "section", "article", "header", "footer", "main", "aside", "ul", "ol", "li", "blockquote", "pre",
    "table", "thead", "tbody", "tr", "td", "th", "h1", "h2", "h3", "h4", "h5", "h6", "nav",
];
