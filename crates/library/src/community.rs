//! Community shares: listing, borrowing, reviewing and reporting.
//!
//! Everything except the listing is online-only.

use crate::Fetched;
use crate::catalog::REFRESH_LIMIT;
use crate::error::{ErrorKind, Result, raise_remote};
use exn::ResultExt;
use libra_api::Remote;
use libra_api::models::{Borrow, Report, ReportRequest, Review, ReviewRequest};
use libra_store::Repository;
use libra_store::models::CachedShare;
use tracing::instrument;
use uuid::Uuid;

pub const MIN_RATING: u8 = 1;
pub const MAX_RATING: u8 = 5;

#[instrument(skip_all)]
pub async fn refresh_shares(remote: &dyn Remote, repo: &Repository) -> Result<Fetched<Vec<CachedShare>>> {
    match remote.list_shares(REFRESH_LIMIT).await {
        Ok(page) => {
            let shares = page
                .items
                .iter()
                .map(CachedShare::try_from)
                .collect::<std::result::Result<Vec<_>, _>>()
                .or_raise(|| ErrorKind::Store)?;
            let deleted = repo
                .reconcile_shares(&shares, page.is_complete())
                .await
                .or_raise(|| ErrorKind::Store)?;
            tracing::info!(listed = shares.len(), deleted, "share cache refreshed");
            Ok(Fetched::fresh(repo.active_shares().await.or_raise(|| ErrorKind::Store)?))
        },
        Err(e) if e.is_auth() => Err(raise_remote(e)),
        Err(e) => {
            let message = (*e).to_string();
            tracing::warn!(error = %message, "share refresh failed; using cache");
            let cached = repo.active_shares().await.or_raise(|| ErrorKind::Store)?;
            Ok(Fetched::cached(cached, message))
        },
    }
}

/// Borrow a share. A share the server no longer has is dropped from the cache.
#[instrument(skip(remote, repo))]
pub async fn borrow(remote: &dyn Remote, repo: &Repository, share_id: Uuid) -> Result<Borrow> {
    match remote.borrow_share(share_id).await {
        Ok(borrow) => Ok(borrow),
        Err(e) => {
            if e.is_gone() {
                repo.mark_share_deleted(share_id).await.or_raise(|| ErrorKind::Store)?;
            }
            Err(raise_remote(e))
        },
    }
}

#[instrument(skip(remote, body))]
pub async fn review(remote: &dyn Remote, share_id: Uuid, rating: u8, body: &str) -> Result<Review> {
    if !(MIN_RATING..=MAX_RATING).contains(&rating) {
        exn::bail!(ErrorKind::Validation(format!("rating must be between {MIN_RATING} and {MAX_RATING}")));
    }
    let request = ReviewRequest {
        rating,
        body: body.trim().to_string(),
    };
    remote.review_share(share_id, &request).await.map_err(raise_remote)
}

#[instrument(skip(remote, reason))]
pub async fn report(remote: &dyn Remote, share_id: Uuid, reason: &str) -> Result<Report> {
    let reason = reason.trim();
    if reason.is_empty() {
        exn::bail!(ErrorKind::Validation("a reason is required".to_string()));
    }
    let request = ReportRequest {
        reason: reason.to_string(),
    };
    remote.report_share(share_id, &request).await.map_err(raise_remote)
}
