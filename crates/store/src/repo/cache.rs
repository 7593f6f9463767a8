use super::Repository;
use crate::error::{ErrorKind, Result};
use crate::models::{CachedEbook, CachedShare, EbookRow, ShareRow, parse_uuid};
use crate::timestamp;
use exn::ResultExt;
use sqlx::{Sqlite, Transaction};
use std::collections::HashSet;
use tracing::instrument;
use uuid::Uuid;

impl Repository {
    // =========================================================================
    // Ebooks
    // =========================================================================

    #[instrument(skip_all, fields(ebook_id = %ebook.id))]
    pub async fn upsert_ebook(&self, ebook: &CachedEbook) -> Result<()> {
        let mut tx = self.pool.begin().await.or_raise(|| ErrorKind::Database)?;
        Self::upsert_ebook_tx(&mut tx, ebook).await?;
        tx.commit().await.or_raise(|| ErrorKind::Database)
    }

    async fn upsert_ebook_tx(tx: &mut Transaction<'_, Sqlite>, ebook: &CachedEbook) -> Result<()> {
        let row = EbookRow::from(ebook);
        sqlx::query(include_str!("../../queries/upsert_ebook.sql"))
            .bind(row.id)
            .bind(row.title)
            .bind(row.author)
            .bind(row.description)
            .bind(row.format)
            .bind(row.language_code)
            .bind(row.storage_key)
            .bind(row.file_path)
            .bind(row.file_size_bytes)
            .bind(row.checksum_sha256)
            .bind(row.row_version)
            .bind(row.updated_at)
            .bind(row.deleted_at)
            .execute(&mut **tx)
            .await
            .or_raise(|| ErrorKind::Database)?;
        Ok(())
    }

    pub async fn ebook(&self, id: Uuid) -> Result<Option<CachedEbook>> {
        let row: Option<EbookRow> = sqlx::query_as(include_str!("../../queries/get_ebook.sql"))
            .bind(id.to_string())
            .fetch_optional(&self.pool)
            .await
            .or_raise(|| ErrorKind::Database)?;
        row.map(CachedEbook::try_from).transpose()
    }

    /// Active ebooks whose title or author contains `query`, ignoring case.
    /// An empty query lists every active ebook.
    pub async fn search_ebooks(&self, query: &str) -> Result<Vec<CachedEbook>> {
        let needle = query.trim().to_lowercase();
        let rows: Vec<EbookRow> = sqlx::query_as(include_str!("../../queries/search_ebooks.sql"))
            .bind(needle)
            .fetch_all(&self.pool)
            .await
            .or_raise(|| ErrorKind::Database)?;
        rows.into_iter().map(CachedEbook::try_from).collect()
    }

    pub async fn active_ebooks(&self) -> Result<Vec<CachedEbook>> {
        self.search_ebooks("").await
    }

    pub async fn find_ebooks_by_checksum(&self, checksum: &str) -> Result<Vec<CachedEbook>> {
        let rows: Vec<EbookRow> = sqlx::query_as(include_str!("../../queries/find_ebooks_by_checksum.sql"))
            .bind(checksum)
            .fetch_all(&self.pool)
            .await
            .or_raise(|| ErrorKind::Database)?;
        rows.into_iter().map(CachedEbook::try_from).collect()
    }

    /// Returns `false` if the ebook was unknown or already deleted.
    #[instrument(skip(self))]
    pub async fn mark_ebook_deleted(&self, id: Uuid) -> Result<bool> {
        let result = sqlx::query(include_str!("../../queries/mark_ebook_deleted.sql"))
            .bind(id.to_string())
            .bind(timestamp::format(timestamp::now()))
            .execute(&self.pool)
            .await
            .or_raise(|| ErrorKind::Database)?;
        Ok(result.rows_affected() > 0)
    }

    /// Mirror a server listing into the cache.
    ///
    /// Every listed ebook is upserted. With `complete`, cached ebooks missing
    /// from the listing are marked deleted; a partial listing proves nothing
    /// about the rest. Returns how many were marked deleted.
    #[instrument(skip_all, fields(count = ebooks.len(), complete))]
    pub async fn reconcile_ebooks(&self, ebooks: &[CachedEbook], complete: bool) -> Result<u64> {
        let mut tx = self.pool.begin().await.or_raise(|| ErrorKind::Database)?;
        for ebook in ebooks {
            Self::upsert_ebook_tx(&mut tx, ebook).await?;
        }
        let mut deleted = 0;
        if complete {
            let listed: HashSet<Uuid> = ebooks.iter().map(|ebook| ebook.id).collect();
            let active: Vec<String> = sqlx::query_scalar(include_str!("../../queries/list_active_ebook_ids.sql"))
                .fetch_all(&mut *tx)
                .await
                .or_raise(|| ErrorKind::Database)?;
            let now = timestamp::format(timestamp::now());
            for id in active {
                if listed.contains(&parse_uuid(&id, "ebook id")?) {
                    continue;
                }
                deleted += sqlx::query(include_str!("../../queries/mark_ebook_deleted.sql"))
                    .bind(id)
                    .bind(&now)
                    .execute(&mut *tx)
                    .await
                    .or_raise(|| ErrorKind::Database)?
                    .rows_affected();
            }
        }
        tx.commit().await.or_raise(|| ErrorKind::Database)?;
        Ok(deleted)
    }

    // =========================================================================
    // Shares
    // =========================================================================

    async fn upsert_share_tx(tx: &mut Transaction<'_, Sqlite>, share: &CachedShare) -> Result<()> {
        let row = ShareRow::from(share);
        sqlx::query(include_str!("../../queries/upsert_share.sql"))
            .bind(row.id)
            .bind(row.ebook_id)
            .bind(row.owner_user_id)
            .bind(row.title)
            .bind(row.author)
            .bind(row.description)
            .bind(row.status)
            .bind(row.row_version)
            .bind(row.updated_at)
            .bind(row.deleted_at)
            .execute(&mut **tx)
            .await
            .or_raise(|| ErrorKind::Database)?;
        Ok(())
    }

    pub async fn upsert_share(&self, share: &CachedShare) -> Result<()> {
        let mut tx = self.pool.begin().await.or_raise(|| ErrorKind::Database)?;
        Self::upsert_share_tx(&mut tx, share).await?;
        tx.commit().await.or_raise(|| ErrorKind::Database)
    }

    pub async fn active_shares(&self) -> Result<Vec<CachedShare>> {
        let rows: Vec<ShareRow> = sqlx::query_as(include_str!("../../queries/list_active_shares.sql"))
            .fetch_all(&self.pool)
            .await
            .or_raise(|| ErrorKind::Database)?;
        rows.into_iter().map(CachedShare::try_from).collect()
    }

    #[instrument(skip(self))]
    pub async fn mark_share_deleted(&self, id: Uuid) -> Result<bool> {
        let result = sqlx::query(include_str!("../../queries/mark_share_deleted.sql"))
            .bind(id.to_string())
            .bind(timestamp::format(timestamp::now()))
            .execute(&self.pool)
            .await
            .or_raise(|| ErrorKind::Database)?;
        Ok(result.rows_affected() > 0)
    }

    /// Upsert every listed share, and with `complete` drop the ones not listed.
    #[instrument(skip_all, fields(count = shares.len(), complete))]
    pub async fn reconcile_shares(&self, shares: &[CachedShare], complete: bool) -> Result<u64> {
        let mut tx = self.pool.begin().await.or_raise(|| ErrorKind::Database)?;
        for share in shares {
            Self::upsert_share_tx(&mut tx, share).await?;
        }
        let mut deleted = 0;
        if complete {
            let listed: HashSet<Uuid> = shares.iter().map(|share| share.id).collect();
            let active: Vec<ShareRow> = sqlx::query_as(include_str!("../../queries/list_active_shares.sql"))
                .fetch_all(&mut *tx)
                .await
                .or_raise(|| ErrorKind::Database)?;
            let now = timestamp::format(timestamp::now());
            for row in active {
                if listed.contains(&parse_uuid(&row.id, "share id")?) {
                    continue;
                }
                deleted += sqlx::query(include_str!("../../queries/mark_share_deleted.sql"))
                    .bind(row.id)
                    .bind(&now)
                    .execute(&mut *tx)
                    .await
                    .or_raise(|| ErrorKind::Database)?
                    .rows_affected();
            }
        }
        tx.commit().await.or_raise(|| ErrorKind::Database)?;
        Ok(deleted)
    }
}

#[cfg(test)]
mod tests {
    use crate::models::{CachedEbook, CachedShare};
    use crate::repo::test_repository;
    use rstest::rstest;
    use uuid::Uuid;

    fn ebook(id: u128, title: &str, author: Option<&str>) -> CachedEbook {
        CachedEbook {
            id: Uuid::from_u128(id),
            title: title.into(),
            author: author.map(Into::into),
            description: None,
            format: "epub".into(),
            language_code: None,
            storage_key: format!("/books/{id}.epub"),
            file_path: None,
            file_size_bytes: 100,
            checksum_sha256: format!("{id:064x}"),
            row_version: 1,
            updated_at: None,
            deleted_at: None,
        }
    }

    fn share(id: u128, title: &str) -> CachedShare {
        CachedShare {
            id: Uuid::from_u128(id),
            ebook_id: None,
            owner_user_id: None,
            title: title.into(),
            author: None,
            description: None,
            status: Some("available".into()),
            row_version: 1,
            updated_at: None,
            deleted_at: None,
        }
    }

    #[tokio::test]
    #[rstest]
    #[case("", 3)]
    #[case("DUNE", 2)]
    #[case("herbert", 2)]
    #[case("le guin", 1)]
    #[case("  dune  ", 2)]
    #[case("tolkien", 0)]
    async fn test_search_is_case_insensitive(#[case] query: &str, #[case] expected: usize) {
        let repo = test_repository().await;
        repo.upsert_ebook(&ebook(1, "Dune", Some("Frank Herbert"))).await.unwrap();
        repo.upsert_ebook(&ebook(2, "Dune Messiah", Some("Frank Herbert"))).await.unwrap();
        repo.upsert_ebook(&ebook(3, "The Dispossessed", Some("Ursula K. Le Guin"))).await.unwrap();
        assert_eq!(repo.search_ebooks(query).await.unwrap().len(), expected);
    }

    #[tokio::test]
    async fn test_deleted_ebooks_are_hidden() {
        let repo = test_repository().await;
        repo.upsert_ebook(&ebook(1, "Dune", None)).await.unwrap();
        repo.upsert_ebook(&ebook(2, "Emma", None)).await.unwrap();
        assert!(repo.mark_ebook_deleted(Uuid::from_u128(1)).await.unwrap());
        assert!(!repo.mark_ebook_deleted(Uuid::from_u128(1)).await.unwrap());
        let active = repo.active_ebooks().await.unwrap();
        assert_eq!(active.len(), 1);
        assert_eq!(active[0].title, "Emma");
        // Still retrievable directly.
        assert!(repo.ebook(Uuid::from_u128(1)).await.unwrap().unwrap().is_deleted());
    }

    #[tokio::test]
    async fn test_refresh_keeps_local_file_path() {
        let repo = test_repository().await;
        repo.upsert_ebook(&ebook(1, "Dune", None).with_file_path("/data/books/x.epub")).await.unwrap();
        let mut refreshed = ebook(1, "Dune (Revised)", None);
        refreshed.row_version = 2;
        repo.upsert_ebook(&refreshed).await.unwrap();
        let cached = repo.ebook(Uuid::from_u128(1)).await.unwrap().unwrap();
        assert_eq!(cached.title, "Dune (Revised)");
        assert_eq!(cached.row_version, 2);
        assert_eq!(cached.file_path.as_deref(), Some("/data/books/x.epub"));
    }

    #[tokio::test]
    async fn test_find_by_checksum() {
        let repo = test_repository().await;
        let book = ebook(9, "Emma", None);
        repo.upsert_ebook(&book).await.unwrap();
        let found = repo.find_ebooks_by_checksum(&book.checksum_sha256).await.unwrap();
        assert_eq!(found, vec![repo.ebook(book.id).await.unwrap().unwrap()]);
        assert!(repo.find_ebooks_by_checksum("ffff").await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_reconcile_complete_listing_marks_missing_deleted() {
        let repo = test_repository().await;
        repo.upsert_ebook(&ebook(1, "Dune", None)).await.unwrap();
        repo.upsert_ebook(&ebook(2, "Emma", None)).await.unwrap();

        let partial = repo.reconcile_ebooks(&[ebook(3, "Ulysses", None)], false).await.unwrap();
        assert_eq!(partial, 0);
        assert_eq!(repo.active_ebooks().await.unwrap().len(), 3);

        let deleted = repo.reconcile_ebooks(&[ebook(2, "Emma", None)], true).await.unwrap();
        assert_eq!(deleted, 2);
        let titles: Vec<_> = repo.active_ebooks().await.unwrap().into_iter().map(|e| e.title).collect();
        assert_eq!(titles, ["Emma"]);
    }

    #[tokio::test]
    async fn test_reconcile_shares() {
        let repo = test_repository().await;
        repo.upsert_share(&share(1, "Beta")).await.unwrap();
        repo.upsert_share(&share(2, "alpha")).await.unwrap();
        let titles: Vec<_> = repo.active_shares().await.unwrap().into_iter().map(|s| s.title).collect();
        assert_eq!(titles, ["alpha", "Beta"]);

        let deleted = repo.reconcile_shares(&[share(1, "Beta")], true).await.unwrap();
        assert_eq!(deleted, 1);
        assert_eq!(repo.active_shares().await.unwrap().len(), 1);
        assert!(!repo.mark_share_deleted(Uuid::from_u128(2)).await.unwrap());
    }
}
