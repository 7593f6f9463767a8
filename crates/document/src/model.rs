use crate::error::{Error, ErrorKind, Result};
use std::fmt::{Display, Formatter, Result as FmtResult};
use std::path::Path;
use std::str::FromStr;

/// A supported source format.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash)]
pub enum Format {
    #[default]
    Txt,
    Pdf,
    Epub,
}
impl Format {
    pub fn as_str(&self) -> &'static str {
        match self {
            Format::Txt => "txt",
            Format::Pdf => "pdf",
            Format::Epub => "epub",
        }
    }

    /// File extension (with leading dot) used when storing an imported copy.
    pub fn extension(&self) -> &'static str {
        match self {
            Format::Txt => ".txt",
            Format::Pdf => ".pdf",
            Format::Epub => ".epub",
        }
    }

    /// Detect the adapter from a file extension.
    ///
    /// Files without an extension are treated as plain text.
    pub fn from_path(path: impl AsRef<Path>) -> Result<Self> {
        match path.as_ref().extension().and_then(|ext| ext.to_str()) {
            None => Ok(Format::Txt),
            Some(ext) => ext.parse(),
        }
    }
}
impl FromStr for Format {
    type Err = Error;
    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.trim().trim_start_matches('.').to_lowercase().as_str() {
            "" | "txt" | "text" => Ok(Format::Txt),
            "pdf" => Ok(Format::Pdf),
            "epub" => Ok(Format::Epub),
            _ => exn::bail!(ErrorKind::UnsupportedFormat),
        }
    }
}
impl Display for Format {
    fn fmt(&self, f: &mut Formatter<'_>) -> FmtResult {
        f.write_str(self.as_str())
    }
}

/// Per-line metadata pinning a display line back to its source structure.
///
/// `page` is only set for PDF documents (1-based), `spine` only for EPUB
/// documents (0-based). `offset` is the position of the line within its page
/// or spine item (`0` is the banner/heading line), or the plain line number
/// for TXT documents.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LineAnchor {
    pub line: usize,
    pub page: Option<u32>,
    pub spine: Option<u32>,
    pub offset: Option<u32>,
}
impl LineAnchor {
    pub fn text(line: usize) -> Self {
        Self {
            line,
            page: None,
            spine: None,
            offset: u32::try_from(line).ok(),
        }
    }

    pub fn page(line: usize, page: u32, offset: u32) -> Self {
        Self {
            line,
            page: Some(page),
            spine: None,
            offset: Some(offset),
        }
    }

    pub fn spine(line: usize, spine: u32, offset: u32) -> Self {
        Self {
            line,
            page: None,
            spine: Some(spine),
            offset: Some(offset),
        }
    }
}

/// Uniform, line-indexed representation of a loaded book.
///
/// There is exactly one [`LineAnchor`] per display line, and the anchor at
/// index `i` always reports `line == i`. Both vectors are private so that
/// invariant can only be maintained through [`push`](Self::push).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Document {
    pub title: String,
    pub format: Format,
    lines: Vec<String>,
    anchors: Vec<LineAnchor>,
}
impl Document {
    pub fn new(title: impl Into<String>, format: Format) -> Self {
        Self {
            title: title.into(),
            format,
            lines: Vec::new(),
            anchors: Vec::new(),
        }
    }

    /// Build a document from parallel `(text, page, spine, offset)` columns.
    ///
    /// Mostly useful for tests and for callers that already hold a parsed
    /// structure; the `line` field of every anchor is assigned here.
    pub fn from_rows<I, S>(title: impl Into<String>, format: Format, rows: I) -> Self
    where
        I: IntoIterator<Item = (S, Option<u32>, Option<u32>, Option<u32>)>,
        S: Into<String>,
    {
        let mut document = Self::new(title, format);
        for (text, page, spine, offset) in rows {
            let line = document.len();
            document.push(text, LineAnchor { line, page, spine, offset });
        }
        document
    }

    /// Append a display line. The anchor's `line` is overwritten with the
    /// line's actual index.
    pub fn push(&mut self, text: impl Into<String>, mut anchor: LineAnchor) {
        anchor.line = self.lines.len();
        self.lines.push(text.into());
        self.anchors.push(anchor);
    }

    pub fn lines(&self) -> &[String] {
        &self.lines
    }

    pub fn anchors(&self) -> &[LineAnchor] {
        &self.anchors
    }

    pub fn line(&self, index: usize) -> Option<&str> {
        self.lines.get(index).map(String::as_str)
    }

    pub fn anchor(&self, index: usize) -> Option<&LineAnchor> {
        self.anchors.get(index)
    }

    pub fn len(&self) -> usize {
        self.lines.len()
    }

    pub fn is_empty(&self) -> bool {
        self.lines.is_empty()
    }

    /// `true` if at least one line contains something other than whitespace.
    pub fn has_text(&self) -> bool {
        self.lines.iter().any(|line| !line.trim().is_empty())
    }

    /// Clamp an arbitrary line number into `[0, len - 1]` (or `0` when empty).
    pub fn clamp(&self, line: i64) -> usize {
        if self.lines.is_empty() || line <= 0 {
            return 0;
        }
        let last = self.lines.len() - 1;
        usize::try_from(line).map_or(last, |line| line.min(last))
    }
}
