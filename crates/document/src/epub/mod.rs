//! EPUB adapter.
//!
//! The whole archive is read into memory, the OPF package is located through
//! `META-INF/container.xml`, and the spine is walked in reading order. Every
//! HTML spine item contributes a `=== Chapter: <title> ===` heading (offset
//! `0`) followed by one display line per paragraph.
//!
//! Chapter titles are resolved with the following precedence:
//! 1. the NCX table of contents,
//! 2. the EPUB 3 navigation document,
//! 3. the first `h1`..`h6` of the spine item,
//! 4. the spine item's file name.

mod archive;
mod nav;
mod package;
mod text;

use self::archive::Archive;
use self::nav::Titles;
use self::package::Package;
use self::text::Chapter;
use crate::error::{ErrorKind, Result};
use crate::model::{Document, Format, LineAnchor};
use exn::ResultExt;
use std::fs::File;
use std::io::{BufReader, Cursor, Read, Seek};
use std::path::Path;
use tracing::instrument;

/// Load an EPUB from disk.
#[instrument(skip(path), fields(path = %path.display()))]
pub fn load(path: &Path) -> Result<Document> {
    let file = File::open(path).or_raise(|| ErrorKind::Io)?;
    from_reader(crate::title_from_path(path), BufReader::new(file))
}

/// Load an EPUB held entirely in memory.
pub fn from_bytes(fallback_title: impl Into<String>, bytes: &[u8]) -> Result<Document> {
    from_reader(fallback_title, Cursor::new(bytes))
}

/// Load an EPUB from any seekable reader. `fallback_title` is used when the
/// package metadata carries no `dc:title`.
pub fn from_reader(fallback_title: impl Into<String>, reader: impl Read + Seek) -> Result<Document> {
    let archive = Archive::read(reader)?;
    let package = Package::open(&archive)?;
    let ncx = package
        .ncx()
        .and_then(|item| archive.text(&item.path).map(|xml| nav::ncx_titles(&item.path, &xml)))
        .unwrap_or_default();
    let nav = package
        .nav()
        .and_then(|item| archive.text(&item.path).map(|html| nav::nav_titles(&item.path, &html)))
        .unwrap_or_default();

    let title = package.title.clone().unwrap_or_else(|| fallback_title.into());
    let mut document = Document::new(title, Format::Epub);
    let mut chapters = 0usize;
    for (index, id) in package.spine.iter().enumerate() {
        let Some(item) = package.manifest.get(id) else {
            tracing::debug!(idref = %id, "Spine references unknown manifest item");
            continue;
        };
        if !item.is_html() {
            continue;
        }
        let Some(html) = archive.text(&item.path) else {
            tracing::warn!(path = %item.path, "Spine item missing from archive");
            continue;
        };
        let spine = u32::try_from(index).or_raise(|| ErrorKind::EmptySpine)?;
        let chapter = Chapter::parse(&html);
        let heading = chapter_title(&item.path, &chapter, &ncx, &nav);
        document.push(format!("=== Chapter: {heading} ==="), LineAnchor::spine(0, spine, 0));
        for (offset, paragraph) in (1..).zip(chapter.paragraphs()) {
            document.push(paragraph, LineAnchor::spine(0, spine, offset));
        }
        chapters += 1;
    }
    if chapters == 0 {
        exn::bail!(ErrorKind::NoReadableChapters);
    }
    tracing::debug!(chapters, lines = document.len(), "Loaded EPUB document");
    Ok(document)
}

fn chapter_title(path: &str, chapter: &Chapter, ncx: &Titles, nav: &Titles) -> String {
    ncx.get(path)
        .or_else(|| nav.get(path))
        .cloned()
        .or_else(|| chapter.first_heading())
        .unwrap_or_else(|| {
            let name = path.rsplit('/').next().unwrap_or(path);
            name.rsplit_once('.').map_or(name, |(stem, _)| stem).to_string()
        })
}
