use crate::error::{Error, ErrorKind};
use crate::models::{parse_uuid, parse_uuid_opt};
use crate::timestamp::{self, parse_opt};
use exn::ResultExt;
use libra_api::models::Share;
use time::UtcDateTime;
use uuid::Uuid;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CachedShare {
    pub id: Uuid,
    pub ebook_id: Option<Uuid>,
    pub owner_user_id: Option<Uuid>,
    pub title: String,
    pub author: Option<String>,
    pub description: Option<String>,
    pub status: Option<String>,
    pub row_version: i64,
    pub updated_at: Option<UtcDateTime>,
    pub deleted_at: Option<UtcDateTime>,
}
impl TryFrom<&Share> for CachedShare {
    type Error = Error;
    fn try_from(share: &Share) -> Result<Self, Self::Error> {
        Ok(Self {
            id: share.id,
            ebook_id: share.ebook_id,
            owner_user_id: share.owner_user_id,
            title: share.title.clone(),
            author: share.author.clone(),
            description: share.description.clone(),
            status: share.status.clone(),
            row_version: share.row_version,
            updated_at: parse_opt(share.updated_at.as_deref()).or_raise(|| ErrorKind::InvalidData("share updated_at"))?,
            deleted_at: parse_opt(share.deleted_at.as_deref()).or_raise(|| ErrorKind::InvalidData("share deleted_at"))?,
        })
    }
}

#[derive(sqlx::FromRow)]
pub(crate) struct ShareRow {
    pub(crate) id: String,
    pub(crate) ebook_id: Option<String>,
    pub(crate) owner_user_id: Option<String>,
    pub(crate) title: String,
    pub(crate) author: Option<String>,
    pub(crate) description: Option<String>,
    pub(crate) status: Option<String>,
    pub(crate) row_version: i64,
    pub(crate) updated_at: String,
    pub(crate) deleted_at: Option<String>,
}
impl From<&CachedShare> for ShareRow {
    fn from(share: &CachedShare) -> Self {
        Self {
            id: share.id.to_string(),
            ebook_id: share.ebook_id.map(|id| id.to_string()),
            owner_user_id: share.owner_user_id.map(|id| id.to_string()),
            title: share.title.clone(),
            author: share.author.clone(),
            description: share.description.clone(),
            status: share.status.clone(),
            row_version: share.row_version,
            updated_at: timestamp::format(share.updated_at.unwrap_or_else(timestamp::now)),
            deleted_at: share.deleted_at.map(timestamp::format),
        }
    }
}
impl TryFrom<ShareRow> for CachedShare {
    type Error = Error;
    fn try_from(row: ShareRow) -> Result<Self, Self::Error> {
        Ok(Self {
            id: parse_uuid(&row.id, "share id")?,
            ebook_id: parse_uuid_opt(row.ebook_id.as_deref(), "share ebook id")?,
            owner_user_id: parse_uuid_opt(row.owner_user_id.as_deref(), "share owner id")?,
            title: row.title,
            author: row.author,
            description: row.description,
            status: row.status,
            row_version: row.row_version,
            updated_at: Some(timestamp::parse(&row.updated_at)?),
            deleted_at: parse_opt(row.deleted_at.as_deref())?,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_row_rejects_bad_uuid() {
        let row = ShareRow {
            id: "not-a-uuid".into(),
            ebook_id: None,
            owner_user_id: None,
            title: "Dune".into(),
            author: None,
            description: None,
            status: None,
            row_version: 1,
            updated_at: "2026-01-01T00:00:00.000000000Z".into(),
            deleted_at: None,
        };
        let err = CachedShare::try_from(row).unwrap_err();
        assert_eq!(*err, ErrorKind::InvalidData("share id"));
    }
}
