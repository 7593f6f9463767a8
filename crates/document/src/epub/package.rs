//! `META-INF/container.xml` and OPF package parsing.

use super::archive::{Archive, parent, resolve};
use crate::consts;
use crate::error::{ErrorKind, Result};
use exn::OptionExt;
use scraper::Html;
use std::collections::HashMap;

#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) struct ManifestItem {
    /// Archive path, already resolved against the OPF directory.
    pub path: String,
    pub media_type: String,
    pub properties: Vec<String>,
}
impl ManifestItem {
    pub fn is_html(&self) -> bool {
        self.media_type.to_ascii_lowercase().contains("html")
    }

    pub fn is_nav(&self) -> bool {
        self.properties.iter().any(|p| p == "nav")
    }
}

#[derive(Debug)]
pub(crate) struct Package {
    pub title: Option<String>,
    pub manifest: HashMap<String, ManifestItem>,
    /// Manifest ids in reading order.
    pub spine: Vec<String>,
    /// Manifest id named by `<spine toc="...">`, if any.
    pub toc: Option<String>,
}
impl Package {
    /// Locate and parse the package document named by the container.
    pub fn open(archive: &Archive) -> Result<Self> {
        let container = archive.text(consts::CONTAINER_PATH).ok_or_raise(|| ErrorKind::MissingContainer)?;
        let opf_path = rootfile_path(&container).ok_or_raise(|| ErrorKind::MissingRootfile)?;
        let opf = archive.text(&opf_path).ok_or_raise(|| ErrorKind::MissingPackage(opf_path.clone()))?;
        let package = Self::parse(parent(&opf_path), &opf);
        if package.manifest.is_empty() || package.spine.is_empty() {
            exn::bail!(ErrorKind::EmptySpine);
        }
        Ok(package)
    }

    pub fn parse(base_dir: &str, opf: &str) -> Self {
        let document = Html::parse_document(opf);
        let manifest = document
            .select(&consts::MANIFEST_ITEM_SELECTOR)
            .filter_map(|el| {
                let id = el.value().attr("id")?.trim().to_string();
                let href = el.value().attr("href")?;
                let item = ManifestItem {
                    path: resolve(base_dir, href),
                    media_type: el.value().attr("media-type").unwrap_or_default().trim().to_string(),
                    properties: el
                        .value()
                        .attr("properties")
                        .map(|p| p.split_whitespace().map(str::to_string).collect())
                        .unwrap_or_default(),
                };
                Some((id, item))
            })
            .collect();
        let spine = document
            .select(&consts::SPINE_ITEMREF_SELECTOR)
            .filter_map(|el| el.value().attr("idref").map(|id| id.trim().to_string()))
            .collect();
        let toc = document
            .select(&consts::SPINE_SELECTOR)
            .next()
            .and_then(|el| el.value().attr("toc"))
            .map(|id| id.trim().to_string());
        let title = document
            .root_element()
            .descendants()
            .filter_map(scraper::ElementRef::wrap)
            .find(|el| el.value().name() == "dc:title")
            .map(|el| super::text::collapse(&el.text().collect::<String>()))
            .filter(|title| !title.is_empty());
        Self {
            title,
            manifest,
            spine,
            toc,
        }
    }

    /// Manifest entry of the NCX table of contents, if the book has one.
    pub fn ncx(&self) -> Option<&ManifestItem> {
        self.toc
            .as_ref()
            .and_then(|id| self.manifest.get(id))
            .or_else(|| self.manifest.values().find(|item| item.media_type == consts::NCX_MEDIA_TYPE))
    }

    /// Manifest entry of the EPUB 3 navigation document, if the book has one.
    pub fn nav(&self) -> Option<&ManifestItem> {
        self.manifest.values().find(|item| item.is_nav())
    }
}

fn rootfile_path(container: &str) -> Option<String> {
    Html::parse_document(container)
        .select(&consts::ROOTFILE_SELECTOR)
        .filter_map(|el| el.value().attr("full-path"))
        .map(|path| resolve("", path.trim()))
        .find(|path| !path.is_empty())
}
