mod consts;
pub mod epub;
pub mod error;
pub mod location;
mod model;
pub mod pdf;
pub mod txt;

use std::path::Path;
use tracing::instrument;

use crate::error::Result;
pub use crate::location::{decode, encode};
pub use crate::model::{Document, Format, LineAnchor};

/// Easy, top-level entrypoint: load any supported file into a [`Document`].
///
/// The adapter is picked from the file extension (`.txt` or none, `.pdf`,
/// `.epub`); anything else fails with
/// [`UnsupportedFormat`](crate::error::ErrorKind::UnsupportedFormat) before
/// the file is touched.
#[instrument(skip(path), fields(path = %path.as_ref().display()))]
pub fn load(path: impl AsRef<Path>) -> Result<Document> {
    let path = path.as_ref();
    match Format::from_path(path)? {
        Format::Txt => txt::load(path),
        Format::Pdf => pdf::load(path),
        Format::Epub => epub::load(path),
    }
}

/// Fallback title for documents without embedded metadata: the file stem.
pub(crate) fn title_from_path(path: &Path) -> String {
    path.file_stem()
        .or_else(|| path.file_name())
        .map(|name| name.to_string_lossy().into_owned())
        .unwrap_or_default()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ErrorKind;
    use std::io::Write;

    #[test]
    fn test_load_dispatches_on_extension() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("notes.txt");
        std::fs::write(&path, "first\nsecond\n").unwrap();
        let document = load(&path).unwrap();
        assert_eq!(document.format, Format::Txt);
        assert_eq!(document.title, "notes");
        assert_eq!(document.lines(), ["first", "second"]);

        let path = dir.path().join("book.epub");
        let mut file = std::fs::File::create(&path).unwrap();
        file.write_all(&epub::fixture::build(&[
            ("META-INF/container.xml", epub::fixture::CONTAINER),
            (
                "OEBPS/content.opf",
                &epub::fixture::opf(r#"<item id="c" href="c.xhtml" media-type="application/xhtml+xml"/>"#, r#"<itemref idref="c"/>"#),
            ),
            ("OEBPS/c.xhtml", &epub::fixture::xhtml("<p>only</p>")),
        ]))
        .unwrap();
        drop(file);
        let document = load(&path).unwrap();
        assert_eq!(document.format, Format::Epub);
        assert_eq!(document.lines(), ["=== Chapter: c ===", "only"]);
    }

    #[test]
    fn test_load_unsupported_extension() {
        let err = load("/nowhere/book.mobi").unwrap_err();
        assert_eq!(*err, ErrorKind::UnsupportedFormat);
        assert_eq!((*err).to_string(), "unsupported document format");
    }

    #[test]
    fn test_load_missing_file() {
        let err = load("/definitely/not/here.txt").unwrap_err();
        assert_eq!(*err, ErrorKind::Io);
    }
}
