//! PDF adapter.
//!
//! Text is pulled page-by-page with [`lopdf`]. Each page starts with a
//! `--- Page N ---` banner (offset `0`) followed by its normalized lines
//! (offsets counting up from `1`). Scanned, image-only PDFs fail fast rather
//! than opening as a wall of banners.

use crate::error::{ErrorKind, Result};
use crate::model::{Document, Format, LineAnchor};
use exn::ResultExt;
use std::path::Path;
use tracing::instrument;

/// Load a PDF from disk.
#[instrument(skip(path), fields(path = %path.display()))]
pub fn load(path: &Path) -> Result<Document> {
    let pdf = lopdf::Document::load(path).or_raise(|| ErrorKind::InvalidPdf)?;
    let pages = pdf.get_pages();
    let count = u32::try_from(pages.len()).or_raise(|| ErrorKind::InvalidPdf)?;
    let texts = (1..=count).map(|number| {
        // Missing entries in the page tree are skipped entirely; a page that
        // exists but refuses to yield text is treated as blank.
        let text = pages.get(&number).map(|_| match pdf.extract_text(&[number]) {
            Ok(text) => text,
            Err(err) => {
                tracing::warn!(page = number, error = %err, "Failed to extract page text");
                String::new()
            },
        });
        (number, text)
    });
    from_pages(crate::title_from_path(path), texts)
}

/// Assemble a PDF [`Document`] from `(page number, text)` pairs, where a
/// `None` text marks a null page that is skipped.
pub fn from_pages(title: impl Into<String>, pages: impl IntoIterator<Item = (u32, Option<String>)>) -> Result<Document> {
    let mut document = Document::new(title, Format::Pdf);
    let mut has_text = false;
    for (number, text) in pages {
        let Some(text) = text else {
            continue;
        };
        document.push(format!("--- Page {number} ---"), LineAnchor::page(0, number, 0));
        for (offset, line) in (1..).zip(normalize(&text)) {
            has_text |= !line.is_empty();
            document.push(line, LineAnchor::page(0, number, offset));
        }
    }
    if !has_text {
        exn::bail!(ErrorKind::NoExtractableText);
    }
    tracing::debug!(lines = document.len(), "Loaded PDF document");
    Ok(document)
}

/// Normalize extracted page text into display lines.
///
/// Line endings are unified, whitespace inside each line is collapsed to
/// single spaces, and consecutive blank lines collapse into one. Leading and
/// trailing blank lines are dropped.
pub(crate) fn normalize(text: &str) -> Vec<String> {
    let text = text.replace("\r\n", "\n").replace('\r', "\n");
    let mut lines: Vec<String> = Vec::new();
    for raw in text.trim().split('\n') {
        let line = raw.split_whitespace().collect::<Vec<_>>().join(" ");
        if line.is_empty() && lines.last().is_none_or(|previous| previous.is_empty()) {
            continue;
        }
        lines.push(line);
    }
    while lines.last().is_some_and(|line| line.is_empty()) {
        lines.pop();
    }
    lines
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    #[rstest]
    #[case("hello", &["hello"])]
    #[case("  hello \t  world  ", &["hello world"])]
    #[case("a\r\nb\rc\nd", &["a", "b", "c", "d"])]
    #[case("a\n\n\n\nb", &["a", "", "b"])]
    #[case("\n\n  a  \n \n\t\n b \n\n", &["a", "", "b"])]
    #[case("   \n\r\n ", &[])]
    fn test_normalize(#[case] input: &str, #[case] expected: &[&str]) {
        assert_eq!(normalize(input), expected);
    }

    #[test]
    fn test_from_pages_banners_and_offsets() {
        let pages = [(1, Some("hello".to_string())), (2, Some("world\n\nagain".to_string()))];
        let document = from_pages("t", pages).unwrap();
        assert_eq!(
            document.lines(),
            ["--- Page 1 ---", "hello", "--- Page 2 ---", "world", "", "again"]
        );
        let pages: Vec<_> = document.anchors().iter().map(|a| a.page).collect();
        assert_eq!(pages, [Some(1), Some(1), Some(2), Some(2), Some(2), Some(2)]);
        let offsets: Vec<_> = document.anchors().iter().map(|a| a.offset).collect();
        assert_eq!(offsets, [Some(0), Some(1), Some(0), Some(1), Some(2), Some(3)]);
        assert!(document.anchors().iter().all(|a| a.spine.is_none()));
    }

    #[test]
    fn test_from_pages_skips_null_pages() {
        let pages = [(1, None), (2, Some("text".to_string()))];
        let document = from_pages("t", pages).unwrap();
        assert_eq!(document.lines(), ["--- Page 2 ---", "text"]);
    }

    #[test]
    fn test_from_pages_without_text_fails() {
        let pages = [(1, Some("   ".to_string())), (2, Some(String::new())), (3, None)];
        let err = from_pages("t", pages).unwrap_err();
        assert_eq!(*err, ErrorKind::NoExtractableText);
    }

    #[test]
    fn test_from_pages_with_no_pages_fails() {
        let err = from_pages("t", Vec::new()).unwrap_err();
        assert_eq!(*err, ErrorKind::NoExtractableText);
    }

    #[test]
    fn test_blank_pdf_on_disk_fails() {
        use lopdf::{Object, Stream, dictionary};

        let mut pdf = lopdf::Document::with_version("1.5");
        let pages_id = pdf.new_object_id();
        let content_id = pdf.add_object(Stream::new(dictionary! {}, Vec::new()));
        let page_id = pdf.add_object(dictionary! {
            "Type" => "Page",
            "Parent" => pages_id,
            "Contents" => content_id,
            "MediaBox" => vec![0.into(), 0.into(), 595.into(), 842.into()],
        });
        pdf.objects.insert(
            pages_id,
            Object::Dictionary(dictionary! {
                "Type" => "Pages",
                "Kids" => vec![page_id.into()],
                "Count" => 1,
            }),
        );
        let catalog_id = pdf.add_object(dictionary! { "Type" => "Catalog", "Pages" => pages_id });
        pdf.trailer.set("Root", catalog_id);
        let file = tempfile::Builder::new().suffix(".pdf").tempfile().unwrap();
        pdf.save(file.path()).unwrap();

        let err = load(file.path()).unwrap_err();
        assert_eq!(*err, ErrorKind::NoExtractableText);
    }
}
