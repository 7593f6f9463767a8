//! The open book and the reader's position in it.

use libra_document::{Document, encode};
use libra_store::models::CachedEbook;

/// Lines moved by `h`/`l`.
pub const PAGE_JUMP: i64 = 20;

#[derive(Debug, Clone)]
pub struct OpenBook {
    pub ebook: CachedEbook,
    pub document: Document,
    /// First visible line; also the reading position.
    pub top: usize,
    /// Location last persisted for this book.
    saved: Option<String>,
}
impl OpenBook {
    pub fn new(ebook: CachedEbook, document: Document, line: usize) -> Self {
        let top = document.clamp(i64::try_from(line).unwrap_or(i64::MAX));
        let mut book = Self {
            ebook,
            document,
            top,
            saved: None,
        };
        book.saved = Some(book.location());
        book
    }

    pub fn scroll(&mut self, delta: i64) {
        let top = i64::try_from(self.top).unwrap_or(i64::MAX);
        self.top = self.document.clamp(top.saturating_add(delta));
    }

    pub fn to_start(&mut self) {
        self.top = 0;
    }

    pub fn to_end(&mut self) {
        self.top = self.document.clamp(i64::MAX);
    }

    pub fn location(&self) -> String {
        encode(&self.document, i64::try_from(self.top).unwrap_or(i64::MAX))
    }

    /// Share of the book read, one decimal.
    pub fn percent(&self) -> f64 {
        let total = self.document.len();
        if total == 0 {
            return 0.0;
        }
        let percent = (self.top + 1) as f64 * 100.0 / total as f64;
        (percent * 10.0).round() / 10.0
    }

    pub fn is_dirty(&self) -> bool {
        self.saved.as_deref() != Some(self.location().as_str())
    }

    pub fn mark_saved(&mut self) {
        self.saved = Some(self.location());
    }

    pub fn visible(&self, height: usize) -> &[String] {
        let lines = self.document.lines();
        let start = self.top.min(lines.len());
        let end = start.saturating_add(height).min(lines.len());
        &lines[start..end]
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use libra_document::Format;
    use uuid::Uuid;

    fn ebook() -> CachedEbook {
        CachedEbook {
            id: Uuid::from_u128(1),
            title: "Numbers".to_string(),
            author: None,
            description: None,
            format: "txt".to_string(),
            language_code: None,
            storage_key: "/books/numbers.txt".to_string(),
            file_path: None,
            file_size_bytes: 0,
            checksum_sha256: String::new(),
            row_version: 1,
            updated_at: None,
            deleted_at: None,
        }
    }

    fn book(lines: usize) -> OpenBook {
        let document = Document::from_rows(
            "Numbers",
            Format::Txt,
            (0..lines).map(|n| (n.to_string(), None::<u32>, None::<u32>, None::<u32>)),
        );
        OpenBook::new(ebook(), document, 0)
    }

    #[test]
    fn test_scrolling_is_clamped() {
        let mut book = book(50);
        book.scroll(-1);
        assert_eq!(book.top, 0);
        book.scroll(PAGE_JUMP);
        assert_eq!(book.top, 20);
        book.to_end();
        assert_eq!(book.top, 49);
        book.scroll(PAGE_JUMP);
        assert_eq!(book.top, 49);
        book.to_start();
        assert_eq!(book.visible(3), ["0", "1", "2"]);
    }

    #[test]
    fn test_location_and_dirty_tracking() {
        let mut book = book(4);
        assert!(!book.is_dirty());
        book.scroll(2);
        assert_eq!(book.location(), "fmt=txt;line=2");
        assert_eq!(book.percent(), 75.0);
        assert!(book.is_dirty());
        book.mark_saved();
        assert!(!book.is_dirty());
    }
}
