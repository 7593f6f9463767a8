//! Optimistic writes for preferences and reader state.
//!
//! The local cache is updated first (bumping `row_version`), then the server
//! is asked to apply the same patch. If that fails the patch is queued in the
//! outbox, with the bumped version, for the sync worker to replay.
//!
//! Each write holds the repository's lock for its row from the first read to
//! the last write, so concurrent patches bump `row_version` one at a time.

use crate::Fetched;
use crate::error::{ErrorKind, Result, raise_remote};
use exn::ResultExt;
use libra_api::Remote;
use libra_api::models::{EntityType, Operation, PreferencesPatch, ReaderStatePatch, ThemeOverrides};
use libra_store::Repository;
use libra_store::models::{OutboxEvent, PreferencesCache, ReaderStateCache};
use serde_json::json;
use tracing::instrument;
use uuid::Uuid;

/// Status line shown when a write only reached the outbox.
pub const QUEUED_MESSAGE: &str = "update queued for sync";

#[derive(Debug, Clone, PartialEq)]
pub enum WriteOutcome<T> {
    /// The server accepted the change and its copy is now cached.
    Synced(T),
    /// Cached locally and queued; `reason` is why the server call failed.
    Queued { value: T, event: Box<OutboxEvent>, reason: String },
}
impl<T> WriteOutcome<T> {
    pub fn value(&self) -> &T {
        match self {
            Self::Synced(value) | Self::Queued { value, .. } => value,
        }
    }

    pub fn into_value(self) -> T {
        match self {
            Self::Synced(value) | Self::Queued { value, .. } => value,
        }
    }

    pub fn is_queued(&self) -> bool {
        matches!(self, Self::Queued { .. })
    }
}

/// `#RRGGBB`, either case.
pub fn is_hex_color(value: &str) -> bool {
    value.len() == 7 && value.starts_with('#') && value[1..].chars().all(|c| c.is_ascii_hexdigit())
}

pub fn validate_overrides(overrides: &ThemeOverrides) -> Result<()> {
    for (token, color) in overrides {
        if !is_hex_color(color) {
            exn::bail!(ErrorKind::Validation(format!("{token} must be a #RRGGBB colour, not {color:?}")));
        }
    }
    Ok(())
}

async fn enqueue_patch<P: serde::Serialize>(
    repo: &Repository,
    entity_type: EntityType,
    entity_id: Uuid,
    patch: &P,
    base_version: i64,
) -> Result<OutboxEvent> {
    let payload = serde_json::to_value(patch).or_raise(|| ErrorKind::Store)?;
    let event = OutboxEvent::new(entity_type, entity_id, Operation::Upsert, payload).with_base_version(base_version);
    repo.enqueue(event).await.or_raise(|| ErrorKind::Store)
}

// =============================================================================
// Preferences
// =============================================================================

/// The cached preferences, refreshed from the server when it is reachable.
///
/// A cached copy with a higher `row_version` than the server's holds local
/// changes the outbox has not delivered yet, and wins.
#[instrument(skip(remote, repo))]
pub async fn load_preferences(remote: &dyn Remote, repo: &Repository, user_id: Uuid) -> Result<Fetched<PreferencesCache>> {
    let _guard = repo.lock_preferences().await;
    let cached = repo.preferences(user_id).await.or_raise(|| ErrorKind::Store)?;
    match remote.get_preferences().await {
        Ok(server) => {
            let server = PreferencesCache::try_from(&server).or_raise(|| ErrorKind::Store)?;
            if let Some(cached) = cached.filter(|cached| cached.row_version > server.row_version) {
                return Ok(Fetched::fresh(cached));
            }
            repo.upsert_preferences(&server).await.or_raise(|| ErrorKind::Store)?;
            Ok(Fetched::fresh(server))
        },
        Err(e) if e.is_auth() => Err(raise_remote(e)),
        Err(e) => Ok(Fetched::cached(
            cached.unwrap_or_else(|| PreferencesCache::new(user_id)),
            (*e).to_string(),
        )),
    }
}

/// Apply `patch` locally and then remotely, queueing it if the server call fails.
#[instrument(skip(remote, repo, patch))]
pub async fn patch_preferences(
    remote: &dyn Remote,
    repo: &Repository,
    user_id: Uuid,
    mut patch: PreferencesPatch,
) -> Result<WriteOutcome<PreferencesCache>> {
    if let Some(overrides) = &patch.theme_overrides {
        validate_overrides(overrides)?;
    }
    // Held until the server has answered or the patch is queued.
    let _guard = repo.lock_preferences().await;
    let current = repo
        .preferences(user_id)
        .await
        .or_raise(|| ErrorKind::Store)?
        .unwrap_or_else(|| PreferencesCache::new(user_id));
    patch.row_version = Some(current.row_version + 1);
    let mut next = current.clone();
    next.apply(&patch);
    repo.upsert_preferences(&next).await.or_raise(|| ErrorKind::Store)?;

    match remote.patch_preferences(&patch).await {
        Ok(server) => {
            let server = PreferencesCache::try_from(&server).or_raise(|| ErrorKind::Store)?;
            repo.upsert_preferences(&server).await.or_raise(|| ErrorKind::Store)?;
            Ok(WriteOutcome::Synced(server))
        },
        Err(e) => {
            let reason = (*e).to_string();
            let event = enqueue_patch(repo, EntityType::Preference, user_id, &patch, current.row_version).await?;
            tracing::info!(event_id = %event.id, error = %reason, "preferences patch queued");
            let value = repo.preferences(user_id).await.or_raise(|| ErrorKind::Store)?.unwrap_or(next);
            Ok(WriteOutcome::Queued {
                value,
                event: Box::new(event),
                reason,
            })
        },
    }
}

// =============================================================================
// Reader State
// =============================================================================

#[instrument(skip(remote, repo))]
pub async fn load_reader_state(remote: &dyn Remote, repo: &Repository, user_id: Uuid) -> Result<Fetched<ReaderStateCache>> {
    let _guard = repo.lock_reader_state().await;
    let cached = repo.reader_state(user_id).await.or_raise(|| ErrorKind::Store)?;
    match remote.get_reader_state().await {
        Ok(server) => {
            let server = ReaderStateCache::try_from(&server).or_raise(|| ErrorKind::Store)?;
            if let Some(cached) = cached.filter(|cached| cached.row_version > server.row_version) {
                return Ok(Fetched::fresh(cached));
            }
            repo.upsert_reader_state(&server).await.or_raise(|| ErrorKind::Store)?;
            Ok(Fetched::fresh(server))
        },
        Err(e) if e.is_auth() => Err(raise_remote(e)),
        Err(e) => Ok(Fetched::cached(
            cached.unwrap_or_else(|| ReaderStateCache::new(user_id)),
            (*e).to_string(),
        )),
    }
}

#[instrument(skip(remote, repo, patch))]
pub async fn patch_reader_state(
    remote: &dyn Remote,
    repo: &Repository,
    user_id: Uuid,
    mut patch: ReaderStatePatch,
) -> Result<WriteOutcome<ReaderStateCache>> {
    let _guard = repo.lock_reader_state().await;
    let current = repo
        .reader_state(user_id)
        .await
        .or_raise(|| ErrorKind::Store)?
        .unwrap_or_else(|| ReaderStateCache::new(user_id));
    patch.row_version = Some(current.row_version + 1);
    let mut next = current.clone();
    next.apply(&patch)
        .or_raise(|| ErrorKind::Validation("invalid last opened timestamp".to_string()))?;
    repo.upsert_reader_state(&next).await.or_raise(|| ErrorKind::Store)?;

    match remote.patch_reader_state(&patch).await {
        Ok(server) => {
            let server = ReaderStateCache::try_from(&server).or_raise(|| ErrorKind::Store)?;
            repo.upsert_reader_state(&server).await.or_raise(|| ErrorKind::Store)?;
            Ok(WriteOutcome::Synced(server))
        },
        Err(e) => {
            let reason = (*e).to_string();
            let event = enqueue_patch(repo, EntityType::ReaderState, user_id, &patch, current.row_version).await?;
            tracing::info!(event_id = %event.id, error = %reason, "reader state patch queued");
            Ok(WriteOutcome::Queued {
                value: next,
                event: Box::new(event),
                reason,
            })
        },
    }
}

// =============================================================================
// Outbox-only events
// =============================================================================

/// Queue a reading-progress update. Progress is never sent inline.
#[instrument(skip(repo))]
pub async fn record_progress(repo: &Repository, ebook_id: Uuid, location: &str, percent: f64) -> Result<OutboxEvent> {
    let payload = json!({
        "ebookId": ebook_id,
        "location": location,
        "percent": (percent.clamp(0.0, 100.0) * 10.0).round() / 10.0,
    });
    let event = OutboxEvent::new(EntityType::Progress, ebook_id, Operation::Upsert, payload);
    repo.enqueue(event).await.or_raise(|| ErrorKind::Store)
}

/// Queue a new bookmark at `location`.
#[instrument(skip(repo))]
pub async fn add_bookmark(repo: &Repository, ebook_id: Uuid, location: &str, label: &str) -> Result<OutboxEvent> {
    let bookmark_id = Uuid::new_v4();
    let payload = json!({
        "id": bookmark_id,
        "ebookId": ebook_id,
        "location": location,
        "label": label,
    });
    let event = OutboxEvent::new(EntityType::Bookmark, bookmark_id, Operation::Upsert, payload);
    repo.enqueue(event).await.or_raise(|| ErrorKind::Store)
}

#[cfg(test)]
mod tests {
    use super::*;
    use libra_api::models::{ReadingMode, ThemeMode, ThemeToken};
    use libra_api::{MockRemote, Tokens};
    use libra_store::Database;
    use rstest::rstest;

    const USER: Uuid = Uuid::from_u128(0x6f1c_1c52_8d3c_4a3e_9c55_2f7d_1d2b_1a10);

    async fn setup() -> (Repository, MockRemote) {
        let db = Database::connect_in_memory().await.unwrap();
        (Repository::from(&db), MockRemote::default().with_tokens(Tokens::new("a", "r")))
    }

    #[rstest]
    #[case("#FF8800", true)]
    #[case("#ff8800", true)]
    #[case("FF8800", false)]
    #[case("#FF880", false)]
    #[case("#GG8800", false)]
    #[case("#FF8800AA", false)]
    fn test_is_hex_color(#[case] input: &str, #[case] expected: bool) {
        assert_eq!(is_hex_color(input), expected);
    }

    #[tokio::test]
    async fn test_patch_offline_is_cached_and_queued() {
        let (repo, remote) = setup().await;
        let mut prefs = PreferencesCache::new(USER);
        prefs.theme_mode = ThemeMode::Dark;
        repo.upsert_preferences(&prefs).await.unwrap();
        remote.fail_transient("patch preferences");

        let patch = PreferencesPatch {
            theme_mode: Some(ThemeMode::Sepia),
            ..Default::default()
        };
        let outcome = patch_preferences(&remote, &repo, USER, patch).await.unwrap();
        assert!(outcome.is_queued());
        assert_eq!(outcome.value().theme_mode, ThemeMode::Sepia);
        assert_eq!(outcome.value().row_version, 2);

        let cached = repo.preferences(USER).await.unwrap().unwrap();
        assert_eq!(cached.theme_mode, ThemeMode::Sepia);
        assert_eq!(cached.row_version, 2);

        let pending = repo.list_pending(0).await.unwrap();
        assert_eq!(pending.len(), 1);
        assert_eq!(pending[0].entity_type, EntityType::Preference);
        assert_eq!(pending[0].operation, Operation::Upsert);
        assert_eq!(pending[0].payload["themeMode"], "sepia");
        assert_eq!(pending[0].payload["rowVersion"], 2);
        assert_eq!(pending[0].base_version, Some(1));
    }

    #[tokio::test]
    async fn test_patch_online_takes_server_copy() {
        let (repo, remote) = setup().await;
        let patch = PreferencesPatch {
            reading_mode: Some(ReadingMode::Zen),
            ..Default::default()
        };
        let outcome = patch_preferences(&remote, &repo, USER, patch).await.unwrap();
        assert!(!outcome.is_queued());
        assert_eq!(remote.preference_patches()[0].row_version, Some(2));
        let cached = repo.preferences(USER).await.unwrap().unwrap();
        assert_eq!(cached.reading_mode, ReadingMode::Zen);
        assert_eq!(cached.row_version, 2);
        assert_eq!(repo.pending_count().await.unwrap(), 0);
    }

    #[tokio::test]
    async fn test_every_patch_bumps_version_once() {
        let (repo, remote) = setup().await;
        remote.fail_transient("patch preferences");
        for expected in 2..5 {
            let patch = PreferencesPatch {
                zen_restore_on_open: Some(expected % 2 == 0),
                ..Default::default()
            };
            let outcome = patch_preferences(&remote, &repo, USER, patch).await.unwrap();
            assert_eq!(outcome.value().row_version, expected);
        }
        assert_eq!(repo.pending_count().await.unwrap(), 3);
    }

    #[tokio::test]
    async fn test_concurrent_preference_patches_are_serialized() {
        let (repo, remote) = setup().await;
        let mut prefs = PreferencesCache::new(USER);
        prefs.theme_mode = ThemeMode::Dark;
        repo.upsert_preferences(&prefs).await.unwrap();
        remote.fail_transient("patch preferences");

        let theme = PreferencesPatch {
            theme_mode: Some(ThemeMode::Sepia),
            ..Default::default()
        };
        let mode = PreferencesPatch {
            reading_mode: Some(ReadingMode::Zen),
            ..Default::default()
        };
        let (a, b) = tokio::join!(
            patch_preferences(&remote, &repo, USER, theme),
            patch_preferences(&remote, &repo, USER, mode),
        );
        let mut versions = [a.unwrap().value().row_version, b.unwrap().value().row_version];
        versions.sort_unstable();
        assert_eq!(versions, [2, 3]);

        let cached = repo.preferences(USER).await.unwrap().unwrap();
        assert_eq!(cached.row_version, 3);
        assert_eq!(cached.theme_mode, ThemeMode::Sepia);
        assert_eq!(cached.reading_mode, ReadingMode::Zen);

        let mut bases: Vec<_> = repo.list_pending(0).await.unwrap().iter().map(|e| e.base_version).collect();
        bases.sort_unstable();
        assert_eq!(bases, [Some(1), Some(2)]);
    }

    #[tokio::test]
    async fn test_concurrent_reader_state_patches_are_serialized() {
        let (repo, remote) = setup().await;
        remote.fail_transient("patch reader state");
        let book = Uuid::from_u128(9);
        let location = ReaderStatePatch {
            current_ebook_id: Some(book),
            current_location: Some("fmt=txt;line=4".into()),
            ..Default::default()
        };
        let mode = ReaderStatePatch {
            reading_mode: Some(ReadingMode::Zen),
            ..Default::default()
        };
        let (a, b) = tokio::join!(
            patch_reader_state(&remote, &repo, USER, location),
            patch_reader_state(&remote, &repo, USER, mode),
        );
        a.unwrap();
        b.unwrap();

        let cached = repo.reader_state(USER).await.unwrap().unwrap();
        assert_eq!(cached.row_version, 3);
        assert_eq!(cached.reading_mode, ReadingMode::Zen);
        assert_eq!(cached.location_for(book), Some("fmt=txt;line=4"));
        assert_eq!(repo.pending_count().await.unwrap(), 2);
    }

    #[tokio::test]
    async fn test_bad_override_is_rejected_before_anything_happens() {
        let (repo, remote) = setup().await;
        let patch = PreferencesPatch {
            theme_overrides: Some(ThemeOverrides::from([(ThemeToken::Accent, "orange".to_string())])),
            ..Default::default()
        };
        let err = patch_preferences(&remote, &repo, USER, patch).await.unwrap_err();
        assert!(matches!(&*err, ErrorKind::Validation(m) if m.contains("accent")));
        assert!(repo.preferences(USER).await.unwrap().is_none());
        assert!(remote.calls().is_empty());
        assert_eq!(repo.pending_count().await.unwrap(), 0);
    }

    #[tokio::test]
    async fn test_load_prefers_newer_local_copy() {
        let (repo, remote) = setup().await;
        let mut local = PreferencesCache::new(USER);
        local.row_version = 7;
        local.theme_mode = ThemeMode::Light;
        repo.upsert_preferences(&local).await.unwrap();
        let fetched = load_preferences(&remote, &repo, USER).await.unwrap();
        assert_eq!(fetched.value.theme_mode, ThemeMode::Light);
        assert!(!fetched.is_stale());
    }

    #[tokio::test]
    async fn test_load_falls_back_when_offline() {
        let (repo, remote) = setup().await;
        remote.fail_transient("get reader state");
        let fetched = load_reader_state(&remote, &repo, USER).await.unwrap();
        assert!(fetched.is_stale());
        assert_eq!(fetched.value.user_id, USER);

        remote.fail("get preferences", libra_api::error::ErrorKind::status("get preferences", 401, ""));
        let err = load_preferences(&remote, &repo, USER).await.unwrap_err();
        assert_eq!(*err, ErrorKind::Unauthorized);
    }

    #[tokio::test]
    async fn test_reader_state_patch_queues_offline() {
        let (repo, remote) = setup().await;
        remote.fail_transient("patch reader state");
        let book = Uuid::from_u128(9);
        let patch = ReaderStatePatch {
            current_ebook_id: Some(book),
            current_location: Some("fmt=txt;line=12".into()),
            ..Default::default()
        };
        let outcome = patch_reader_state(&remote, &repo, USER, patch).await.unwrap();
        assert!(outcome.is_queued());
        let cached = repo.reader_state(USER).await.unwrap().unwrap();
        assert_eq!(cached.location_for(book), Some("fmt=txt;line=12"));
        let pending = repo.list_pending(0).await.unwrap();
        assert_eq!(pending[0].entity_type, EntityType::ReaderState);
        assert_eq!(pending[0].payload["currentLocation"], "fmt=txt;line=12");
    }

    #[tokio::test]
    async fn test_progress_and_bookmark_go_to_outbox() {
        let (repo, _) = setup().await;
        let book = Uuid::from_u128(9);
        let progress = record_progress(&repo, book, "fmt=txt;line=3", 42.345).await.unwrap();
        assert_eq!(progress.entity_type, EntityType::Progress);
        assert_eq!(progress.payload["percent"], 42.3);
        let bookmark = add_bookmark(&repo, book, "fmt=txt;line=3", "here").await.unwrap();
        assert_eq!(bookmark.entity_type, EntityType::Bookmark);
        assert_eq!(bookmark.payload["ebookId"], book.to_string());
        assert_eq!(repo.pending_count().await.unwrap(), 2);
    }
}
