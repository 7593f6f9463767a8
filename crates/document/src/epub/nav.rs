//! Chapter titles from the NCX table of contents and the EPUB 3 `<nav>`
//! document. Both map a resolved archive path to the first label that points
//! at it; fragments are dropped so `ch1.xhtml#s2` and `ch1.xhtml` collide.

use super::archive::{parent, resolve};
use super::text::collapse;
use crate::consts;
use scraper::Html;
use std::collections::HashMap;

pub(crate) type Titles = HashMap<String, String>;

/// Titles from an NCX document located at `ncx_path`.
pub(crate) fn ncx_titles(ncx_path: &str, ncx: &str) -> Titles {
    let base = parent(ncx_path);
    let document = Html::parse_document(ncx);
    let mut titles = Titles::new();
    for point in document.select(&consts::NAV_POINT_SELECTOR) {
        let label = point
            .select(&consts::NAV_LABEL_TEXT_SELECTOR)
            .next()
            .map(|el| collapse(&el.text().collect::<String>()));
        let src = point.select(&consts::NAV_CONTENT_SELECTOR).next().and_then(|el| el.value().attr("src"));
        if let (Some(label), Some(src)) = (label, src)
            && !label.is_empty()
        {
            titles.entry(resolve(base, src)).or_insert(label);
        }
    }
    titles
}

/// Titles from an XHTML navigation document located at `nav_path`.
///
/// Prefers the `<nav epub:type="toc">` element and falls back to the first
/// `<nav>` in the document.
pub(crate) fn nav_titles(nav_path: &str, nav: &str) -> Titles {
    let base = parent(nav_path);
    let document = Html::parse_document(nav);
    let mut navs = document.select(&consts::NAV_SELECTOR).collect::<Vec<_>>();
    let toc = navs
        .iter()
        .position(|el| el.value().attr("epub:type").is_some_and(|t| t.split_whitespace().any(|t| t == "toc")))
        .unwrap_or(0);
    let mut titles = Titles::new();
    if navs.is_empty() {
        return titles;
    }
    let nav = navs.swap_remove(toc);
    for link in nav.select(&consts::NAV_LINK_SELECTOR) {
        let label = collapse(&link.text().collect::<String>());
        if let Some(href) = link.value().attr("href")
            && !label.is_empty()
        {
            titles.entry(resolve(base, href)).or_insert(label);
        }
    }
    titles
}
