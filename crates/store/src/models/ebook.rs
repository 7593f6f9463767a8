use crate::error::{Error, ErrorKind};
use crate::models::parse_uuid;
use crate::timestamp::{self, parse_opt};
use exn::ResultExt;
use libra_api::models::Ebook;
use time::UtcDateTime;
use uuid::Uuid;

/// Local projection of a server ebook, plus where its file lives on disk.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CachedEbook {
    pub id: Uuid,
    pub title: String,
    pub author: Option<String>,
    pub description: Option<String>,
    pub format: String,
    pub language_code: Option<String>,
    pub storage_key: String,
    /// Only known for books imported on this machine.
    pub file_path: Option<String>,
    pub file_size_bytes: i64,
    pub checksum_sha256: String,
    pub row_version: i64,
    pub updated_at: Option<UtcDateTime>,
    pub deleted_at: Option<UtcDateTime>,
}
impl CachedEbook {
    pub fn is_deleted(&self) -> bool {
        self.deleted_at.is_some()
    }

    /// Path to open: the local copy if one was recorded, else the storage key.
    pub fn local_path(&self) -> &str {
        self.file_path.as_deref().filter(|path| !path.is_empty()).unwrap_or(&self.storage_key)
    }

    pub fn with_file_path(mut self, path: impl Into<String>) -> Self {
        self.file_path = Some(path.into());
        self
    }
}
impl TryFrom<&Ebook> for CachedEbook {
    type Error = Error;
    fn try_from(ebook: &Ebook) -> Result<Self, Self::Error> {
        Ok(Self {
            id: ebook.id,
            title: ebook.title.clone(),
            author: ebook.author.clone(),
            description: ebook.description.clone(),
            format: ebook.format.clone(),
            language_code: ebook.language_code.clone(),
            storage_key: ebook.storage_key.clone(),
            file_path: None,
            file_size_bytes: ebook.file_size_bytes,
            checksum_sha256: ebook.checksum_sha256.clone(),
            row_version: ebook.row_version,
            updated_at: parse_opt(ebook.updated_at.as_deref()).or_raise(|| ErrorKind::InvalidData("ebook updated_at"))?,
            deleted_at: parse_opt(ebook.deleted_at.as_deref()).or_raise(|| ErrorKind::InvalidData("ebook deleted_at"))?,
        })
    }
}

#[derive(sqlx::FromRow)]
pub(crate) struct EbookRow {
    pub(crate) id: String,
    pub(crate) title: String,
    pub(crate) author: Option<String>,
    pub(crate) description: Option<String>,
    pub(crate) format: String,
    pub(crate) language_code: Option<String>,
    pub(crate) storage_key: String,
    pub(crate) file_path: Option<String>,
    pub(crate) file_size_bytes: i64,
    pub(crate) checksum_sha256: String,
    pub(crate) row_version: i64,
    pub(crate) updated_at: String,
    pub(crate) deleted_at: Option<String>,
}
impl From<&CachedEbook> for EbookRow {
    fn from(ebook: &CachedEbook) -> Self {
        Self {
            id: ebook.id.to_string(),
            title: ebook.title.clone(),
            author: ebook.author.clone(),
            description: ebook.description.clone(),
            format: ebook.format.clone(),
            language_code: ebook.language_code.clone(),
            storage_key: ebook.storage_key.clone(),
            file_path: ebook.file_path.clone(),
            file_size_bytes: ebook.file_size_bytes,
            checksum_sha256: ebook.checksum_sha256.clone(),
            row_version: ebook.row_version,
            updated_at: timestamp::format(ebook.updated_at.unwrap_or_else(timestamp::now)),
            deleted_at: ebook.deleted_at.map(timestamp::format),
        }
    }
}
impl TryFrom<EbookRow> for CachedEbook {
    type Error = Error;
    fn try_from(row: EbookRow) -> Result<Self, Self::Error> {
        Ok(Self {
            id: parse_uuid(&row.id, "ebook id")?,
            title: row.title,
            author: row.author,
            description: row.description,
            format: row.format,
            language_code: row.language_code,
            storage_key: row.storage_key,
            file_path: row.file_path,
            file_size_bytes: row.file_size_bytes,
            checksum_sha256: row.checksum_sha256,
            row_version: row.row_version,
            updated_at: Some(timestamp::parse(&row.updated_at)?),
            deleted_at: parse_opt(row.deleted_at.as_deref())?,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ebook() -> Ebook {
        serde_json::from_value(serde_json::json!({
            "id": "0b6e4c1a-3f0e-4a51-9d4a-8b8f2f6c9e01",
            "title": "The Left Hand of Darkness",
            "author": "Ursula K. Le Guin",
            "format": "epub",
            "storageKey": "/srv/books/lhod.epub",
            "fileSizeBytes": 4096,
            "checksumSha256": "ab12",
            "rowVersion": 3,
            "updatedAt": "2026-02-03T04:05:06Z"
        }))
        .unwrap()
    }

    #[test]
    fn test_from_server_ebook() {
        let cached = CachedEbook::try_from(&ebook()).unwrap();
        assert_eq!(cached.row_version, 3);
        assert!(!cached.is_deleted());
        assert_eq!(cached.local_path(), "/srv/books/lhod.epub");
        let row = EbookRow::from(&cached);
        assert_eq!(row.updated_at, "2026-02-03T04:05:06.000000000Z");
        let back = CachedEbook::try_from(row).unwrap();
        assert_eq!(back, cached);
    }

    #[test]
    fn test_local_path_prefers_file_path() {
        let cached = CachedEbook::try_from(&ebook()).unwrap().with_file_path("/home/me/books/ab12.epub");
        assert_eq!(cached.local_path(), "/home/me/books/ab12.epub");
    }

    #[test]
    fn test_bad_server_timestamp() {
        let mut ebook = ebook();
        ebook.deleted_at = Some("last tuesday".into());
        let err = CachedEbook::try_from(&ebook).unwrap_err();
        assert_eq!(*err, ErrorKind::InvalidData("ebook deleted_at"));
    }
}
