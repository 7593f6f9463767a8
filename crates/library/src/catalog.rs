//! Mirroring the server's ebook listing into the local cache.

use crate::Fetched;
use crate::error::{ErrorKind, Result, raise_remote};
use exn::{OptionExt, ResultExt};
use libra_api::Remote;
use libra_store::Repository;
use libra_store::models::CachedEbook;
use tracing::instrument;
use uuid::Uuid;

/// How many ebooks one refresh asks the server for.
pub const REFRESH_LIMIT: u32 = 200;

/// Refresh the ebook cache from the server and return the active ebooks.
///
/// Transient failures fall back to the cache with a warning; an expired
/// session is an error so the caller can send the user back to sign in.
#[instrument(skip_all)]
pub async fn refresh_ebooks(remote: &dyn Remote, repo: &Repository) -> Result<Fetched<Vec<CachedEbook>>> {
    match remote.list_ebooks(REFRESH_LIMIT).await {
        Ok(page) => {
            let ebooks = page
                .items
                .iter()
                .map(CachedEbook::try_from)
                .collect::<std::result::Result<Vec<_>, _>>()
                .or_raise(|| ErrorKind::Store)?;
            let deleted = repo
                .reconcile_ebooks(&ebooks, page.is_complete())
                .await
                .or_raise(|| ErrorKind::Store)?;
            tracing::info!(listed = ebooks.len(), deleted, "ebook cache refreshed");
            Ok(Fetched::fresh(repo.active_ebooks().await.or_raise(|| ErrorKind::Store)?))
        },
        Err(e) if e.is_auth() => Err(raise_remote(e)),
        Err(e) => {
            let message = (*e).to_string();
            tracing::warn!(error = %message, "ebook refresh failed; using cache");
            let cached = repo.active_ebooks().await.or_raise(|| ErrorKind::Store)?;
            Ok(Fetched::cached(cached, message))
        },
    }
}

/// Active cached ebooks whose title or author contains `query`, ignoring case.
pub async fn search(repo: &Repository, query: &str) -> Result<Vec<CachedEbook>> {
    repo.search_ebooks(query).await.or_raise(|| ErrorKind::Store)
}

/// A cached ebook that has not been deleted.
pub async fn active_ebook(repo: &Repository, id: Uuid) -> Result<CachedEbook> {
    repo.ebook(id)
        .await
        .or_raise(|| ErrorKind::Store)?
        .filter(|ebook| !ebook.is_deleted())
        .ok_or_raise(|| ErrorKind::Gone)
}
