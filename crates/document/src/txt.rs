//! Plain-text adapter.

use crate::error::{ErrorKind, Result};
use crate::model::{Document, Format, LineAnchor};
use exn::ResultExt;
use std::fs::File;
use std::io::{BufRead, BufReader, Read};
use std::path::Path;
use tracing::instrument;

/// Load a UTF-8 text file, one display line per source line.
#[instrument(skip(path), fields(path = %path.display()))]
pub fn load(path: &Path) -> Result<Document> {
    let file = File::open(path).or_raise(|| ErrorKind::Io)?;
    from_reader(crate::title_from_path(path), file)
}

/// Stream lines from any reader into a TXT [`Document`].
///
/// An empty input still produces a single empty line so the reader always
/// has a cursor target.
pub fn from_reader(title: impl Into<String>, reader: impl Read) -> Result<Document> {
    let mut document = Document::new(title, Format::Txt);
    for line in BufReader::new(reader).lines() {
        let line = line.or_raise(|| ErrorKind::Io)?;
        let index = document.len();
        document.push(line, LineAnchor::text(index));
    }
    if document.is_empty() {
        document.push(String::new(), LineAnchor::text(0));
    }
    tracing::debug!(lines = document.len(), "Loaded text document");
    Ok(document)
}
