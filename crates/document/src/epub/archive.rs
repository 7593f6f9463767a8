//! In-memory view over an EPUB zip container.

use crate::error::{ErrorKind, Result};
use exn::ResultExt;
use percent_encoding::percent_decode_str;
use std::collections::HashMap;
use std::io::{Read, Seek};

/// Every file entry of the archive, keyed by its path inside the zip.
pub(crate) struct Archive {
    entries: HashMap<String, Vec<u8>>,
}
impl Archive {
    pub(crate) fn read(reader: impl Read + Seek) -> Result<Self> {
        let mut zip = zip::ZipArchive::new(reader).or_raise(|| ErrorKind::Archive)?;
        let mut entries = HashMap::with_capacity(zip.len());
        for index in 0..zip.len() {
            let mut entry = zip.by_index(index).or_raise(|| ErrorKind::Archive)?;
            if entry.is_dir() {
                continue;
            }
            let name = entry.name().trim_start_matches('/').to_string();
            let mut data = Vec::with_capacity(usize::try_from(entry.size()).unwrap_or_default());
            entry.read_to_end(&mut data).or_raise(|| ErrorKind::Archive)?;
            entries.insert(name, data);
        }
        tracing::trace!(entries = entries.len(), "Read EPUB archive");
        Ok(Self { entries })
    }

    /// Look up an entry, falling back to a case-insensitive match because
    /// plenty of real-world books disagree with their own manifest on case.
    pub(crate) fn get(&self, path: &str) -> Option<&[u8]> {
        let path = path.trim_start_matches('/');
        self.entries
            .get(path)
            .or_else(|| {
                self.entries
                    .iter()
                    .find(|(name, _)| name.eq_ignore_ascii_case(path))
                    .map(|(_, data)| data)
            })
            .map(Vec::as_slice)
    }

    /// Look up an entry and decode it as (lossy) UTF-8.
    pub(crate) fn text(&self, path: &str) -> Option<String> {
        self.get(path).map(|data| String::from_utf8_lossy(data).into_owned())
    }
}

/// Directory portion of an archive path (without trailing slash).
pub(crate) fn parent(path: &str) -> &str {
    path.rsplit_once('/').map_or("", |(dir, _)| dir)
}

/// Resolve an `href` relative to `base_dir`, dropping any `#fragment`,
/// decoding percent escapes, and normalizing `.`/`..` segments.
pub(crate) fn resolve(base_dir: &str, href: &str) -> String {
    let href = href.split('#').next().unwrap_or_default();
    let href = percent_decode_str(href).decode_utf8_lossy();
    let mut segments: Vec<&str> = Vec::new();
    let joined = if href.starts_with('/') || base_dir.is_empty() {
        href.trim_start_matches('/').to_string()
    } else {
        format!("{base_dir}/{href}")
    };
    for segment in joined.split('/') {
        match segment {
            "" | "." => {},
            ".." => {
                segments.pop();
            },
            other => segments.push(other),
        }
    }
    segments.join("/")
}
