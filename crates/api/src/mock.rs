//! In-memory remote for testing.

use crate::error::{ErrorKind, Result};
use crate::models::{
    Borrow, CreateEbook, DevicePoll, DeviceStart, Ebook, LoginRequest, Page, Preferences, PreferencesPatch,
    ReaderState, ReaderStatePatch, RegisterRequest, Report, ReportRequest, Review, ReviewRequest, Share, SyncEvent,
    SyncEventAck, User,
};
use crate::remote::{Remote, Tokens};
use async_trait::async_trait;
use std::collections::{HashMap, VecDeque};
use std::sync::{Mutex, MutexGuard, PoisonError};
use uuid::Uuid;

pub const MOCK_ACCESS_TOKEN: &str = "mock-access";
pub const MOCK_REFRESH_TOKEN: &str = "mock-refresh";

#[derive(Default)]
struct State {
    tokens: Tokens,
    user: Option<User>,
    ebooks: Vec<Ebook>,
    shares: Vec<Share>,
    preferences: Option<Preferences>,
    reader_state: Option<ReaderState>,
    device_polls: VecDeque<DevicePoll>,
    failures: HashMap<&'static str, ErrorKind>,
    calls: Vec<&'static str>,
    created: Vec<CreateEbook>,
    preference_patches: Vec<PreferencesPatch>,
    reader_state_patches: Vec<ReaderStatePatch>,
    sync_events: Vec<SyncEvent>,
}

/// In-memory [`Remote`] for testing.
///
/// Every call is recorded under the same operation name the real client uses
/// in its errors (`"login"`, `"list ebooks"`, `"store sync event"`, ...), and
/// any operation can be scripted to fail with [`fail`](Self::fail).
///
/// # Examples
///
/// ```
/// use libra_api::{MockRemote, Remote};
///
/// # #[tokio::main(flavor = "current_thread")]
/// # async fn main() {
/// let remote = MockRemote::default();
/// remote.fail_transient("list ebooks");
/// assert!(remote.list_ebooks(10).await.is_err());
/// assert_eq!(remote.calls(), ["list ebooks"]);
/// # }
/// ```
#[derive(Default)]
pub struct MockRemote {
    state: Mutex<State>,
}

impl MockRemote {
    fn state(&self) -> MutexGuard<'_, State> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Record the call and return the scripted failure, if there is one.
    fn call(&self, operation: &'static str) -> Result<MutexGuard<'_, State>> {
        let mut state = self.state();
        state.calls.push(operation);
        if let Some(kind) = state.failures.get(operation) {
            return Err(exn::Exn::from(kind.clone()));
        }
        Ok(state)
    }

    fn signed_in(state: &State) -> Result<()> {
        if state.tokens.access.is_none() {
            return Err(exn::Exn::from(ErrorKind::MissingToken("access")));
        }
        Ok(())
    }

    fn current_user(state: &mut State) -> User {
        state
            .user
            .get_or_insert_with(|| User {
                id: Uuid::from_u128(0x6f1c_1c52_8d3c_4a3e_9c55_2f7d_1d2b_1a10),
                email: "reader@example.test".to_string(),
                username: "reader".to_string(),
                display_name: None,
                created_at: None,
            })
            .clone()
    }

    fn sign_in(state: &mut State) -> User {
        state.tokens = Tokens::new(MOCK_ACCESS_TOKEN, MOCK_REFRESH_TOKEN);
        Self::current_user(state)
    }

    // ====================================================================
    // Scripting
    // ====================================================================

    pub fn with_user(self, user: User) -> Self {
        self.state().user = Some(user);
        self
    }

    pub fn with_tokens(self, tokens: Tokens) -> Self {
        self.state().tokens = tokens;
        self
    }

    pub fn with_ebooks(self, ebooks: impl IntoIterator<Item = Ebook>) -> Self {
        self.state().ebooks.extend(ebooks);
        self
    }

    pub fn with_shares(self, shares: impl IntoIterator<Item = Share>) -> Self {
        self.state().shares.extend(shares);
        self
    }

    pub fn with_preferences(self, preferences: Preferences) -> Self {
        self.state().preferences = Some(preferences);
        self
    }

    pub fn with_reader_state(self, reader_state: ReaderState) -> Self {
        self.state().reader_state = Some(reader_state);
        self
    }

    /// Queue responses for successive `device_poll` calls. Once drained,
    /// polls report `pending`.
    pub fn with_device_polls(self, polls: impl IntoIterator<Item = DevicePoll>) -> Self {
        self.state().device_polls.extend(polls);
        self
    }

    /// Make every call to `operation` fail with `kind` until [`recover`](Self::recover).
    pub fn fail(&self, operation: &'static str, kind: ErrorKind) {
        self.state().failures.insert(operation, kind);
    }

    /// Make `operation` fail as if the server were down (HTTP 503).
    pub fn fail_transient(&self, operation: &'static str) {
        self.fail(operation, ErrorKind::status(operation, 503, "service unavailable"));
    }

    pub fn recover(&self, operation: &'static str) {
        self.state().failures.remove(operation);
    }

    // ====================================================================
    // Inspection
    // ====================================================================

    pub fn calls(&self) -> Vec<&'static str> {
        self.state().calls.clone()
    }

    pub fn created_ebooks(&self) -> Vec<CreateEbook> {
        self.state().created.clone()
    }

    pub fn preference_patches(&self) -> Vec<PreferencesPatch> {
        self.state().preference_patches.clone()
    }

    pub fn reader_state_patches(&self) -> Vec<ReaderStatePatch> {
        self.state().reader_state_patches.clone()
    }

    pub fn sync_events(&self) -> Vec<SyncEvent> {
        self.state().sync_events.clone()
    }
}

#[async_trait]
impl Remote for MockRemote {
    fn tokens(&self) -> Tokens {
        self.state().tokens.clone()
    }

    fn set_tokens(&self, tokens: Tokens) {
        self.state().tokens = tokens;
    }

    fn clear_tokens(&self) {
        self.state().tokens = Tokens::default();
    }

    async fn register(&self, request: &RegisterRequest) -> Result<User> {
        let mut state = self.call("register")?;
        let mut user = Self::sign_in(&mut state);
        user.email.clone_from(&request.email);
        user.username.clone_from(&request.username);
        state.user = Some(user.clone());
        Ok(user)
    }

    async fn login(&self, _request: &LoginRequest) -> Result<User> {
        let mut state = self.call("login")?;
        Ok(Self::sign_in(&mut state))
    }

    async fn refresh(&self) -> Result<User> {
        let mut state = self.call("refresh")?;
        if state.tokens.refresh.is_none() {
            return Err(exn::Exn::from(ErrorKind::MissingToken("refresh")));
        }
        Ok(Self::sign_in(&mut state))
    }

    async fn logout(&self) -> Result<()> {
        let mut state = self.call("logout")?;
        state.tokens = Tokens::default();
        Ok(())
    }

    async fn me(&self) -> Result<User> {
        let mut state = self.call("me")?;
        Self::signed_in(&state)?;
        Ok(Self::current_user(&mut state))
    }

    async fn device_start(&self) -> Result<DeviceStart> {
        self.call("device start")?;
        Ok(DeviceStart {
            device_code: "mock-device-code".to_string(),
            auth_url: "https://accounts.example.test/device".to_string(),
            expires_at: "2099-01-01T00:00:00Z".to_string(),
            interval_seconds: 1,
        })
    }

    async fn device_poll(&self, _device_code: &str) -> Result<DevicePoll> {
        let mut state = self.call("device poll")?;
        let poll = state.device_polls.pop_front().unwrap_or(DevicePoll {
            status: crate::models::DeviceStatus::Pending,
            result: None,
        });
        if let Some(result) = &poll.result {
            state.tokens = Tokens::new(&result.token.token, &result.refresh_token.token);
        }
        Ok(poll)
    }

    async fn list_ebooks(&self, limit: u32) -> Result<Page<Ebook>> {
        let state = self.call("list ebooks")?;
        Self::signed_in(&state)?;
        let limit = usize::try_from(limit).unwrap_or(usize::MAX);
        let mut page = Page::from(state.ebooks.iter().take(limit).cloned().collect::<Vec<_>>());
        page.total = u64::try_from(state.ebooks.len()).ok();
        Ok(page)
    }

    async fn create_ebook(&self, request: &CreateEbook) -> Result<Ebook> {
        let mut state = self.call("create ebook")?;
        Self::signed_in(&state)?;
        let ebook = Ebook {
            id: Uuid::new_v4(),
            title: request.title.clone(),
            author: None,
            description: request.description.clone(),
            format: request.format.clone(),
            language_code: request.language_code.clone(),
            storage_key: request.storage_key.clone(),
            file_size_bytes: request.file_size_bytes,
            checksum_sha256: request.checksum_sha256.clone(),
            row_version: 1,
            imported_at: request.imported_at.clone(),
            created_at: None,
            updated_at: None,
            deleted_at: None,
        };
        state.created.push(request.clone());
        state.ebooks.push(ebook.clone());
        Ok(ebook)
    }

    async fn list_shares(&self, limit: u32) -> Result<Page<Share>> {
        let state = self.call("list shares")?;
        Self::signed_in(&state)?;
        let limit = usize::try_from(limit).unwrap_or(usize::MAX);
        Ok(Page::from(state.shares.iter().take(limit).cloned().collect::<Vec<_>>()))
    }

    async fn borrow_share(&self, share_id: Uuid) -> Result<Borrow> {
        let state = self.call("borrow")?;
        Self::signed_in(&state)?;
        if !state.shares.iter().any(|share| share.id == share_id) {
            return Err(exn::Exn::from(ErrorKind::status("borrow", 404, "share not found")));
        }
        Ok(Borrow {
            id: Uuid::new_v4(),
            share_id,
            borrower_user_id: state.user.as_ref().map(|user| user.id),
            due_at: None,
        })
    }

    async fn review_share(&self, share_id: Uuid, request: &ReviewRequest) -> Result<Review> {
        let state = self.call("review")?;
        Self::signed_in(&state)?;
        Ok(Review {
            id: Uuid::new_v4(),
            share_id,
            rating: request.rating,
            body: request.body.clone(),
        })
    }

    async fn report_share(&self, share_id: Uuid, request: &ReportRequest) -> Result<Report> {
        let state = self.call("report")?;
        Self::signed_in(&state)?;
        Ok(Report {
            id: Uuid::new_v4(),
            share_id,
            reason: request.reason.clone(),
            status: Some("open".to_string()),
        })
    }

    async fn get_preferences(&self) -> Result<Preferences> {
        let mut state = self.call("get preferences")?;
        Self::signed_in(&state)?;
        let user_id = Self::current_user(&mut state).id;
        Ok(state.preferences.get_or_insert_with(|| default_preferences(user_id)).clone())
    }

    async fn patch_preferences(&self, patch: &PreferencesPatch) -> Result<Preferences> {
        let mut state = self.call("patch preferences")?;
        Self::signed_in(&state)?;
        state.preference_patches.push(patch.clone());
        let user_id = Self::current_user(&mut state).id;
        let prefs = state.preferences.get_or_insert_with(|| default_preferences(user_id));
        if let Some(mode) = patch.reading_mode {
            prefs.reading_mode = mode;
        }
        if let Some(restore) = patch.zen_restore_on_open {
            prefs.zen_restore_on_open = restore;
        }
        if let Some(theme) = patch.theme_mode {
            prefs.theme_mode = theme;
        }
        if let Some(overrides) = &patch.theme_overrides {
            prefs.theme_overrides.clone_from(overrides);
        }
        if let Some(profile) = patch.typography_profile {
            prefs.typography_profile = profile;
        }
        prefs.row_version = patch.row_version.unwrap_or(prefs.row_version + 1);
        Ok(prefs.clone())
    }

    async fn get_reader_state(&self) -> Result<ReaderState> {
        let mut state = self.call("get reader state")?;
        Self::signed_in(&state)?;
        let user_id = Self::current_user(&mut state).id;
        Ok(state.reader_state.get_or_insert_with(|| default_reader_state(user_id)).clone())
    }

    async fn patch_reader_state(&self, patch: &ReaderStatePatch) -> Result<ReaderState> {
        let mut state = self.call("patch reader state")?;
        Self::signed_in(&state)?;
        state.reader_state_patches.push(patch.clone());
        let user_id = Self::current_user(&mut state).id;
        let reader = state.reader_state.get_or_insert_with(|| default_reader_state(user_id));
        if patch.current_ebook_id.is_some() {
            reader.current_ebook_id = patch.current_ebook_id;
        }
        if let Some(location) = &patch.current_location {
            reader.current_location = Some(location.clone());
        }
        if let Some(mode) = patch.reading_mode {
            reader.reading_mode = mode;
        }
        if let Some(opened) = &patch.last_opened_at {
            reader.last_opened_at = Some(opened.clone());
        }
        reader.row_version = patch.row_version.unwrap_or(reader.row_version + 1);
        Ok(reader.clone())
    }

    async fn store_sync_event(&self, event: &SyncEvent) -> Result<SyncEventAck> {
        let mut state = self.call("store sync event")?;
        Self::signed_in(&state)?;
        state.sync_events.push(event.clone());
        Ok(SyncEventAck {
            id: Some(Uuid::new_v4()),
            created_at: Some(event.client_timestamp.clone()),
        })
    }
}

fn default_preferences(user_id: Uuid) -> Preferences {
    Preferences {
        user_id,
        reading_mode: Default::default(),
        zen_restore_on_open: false,
        theme_mode: Default::default(),
        theme_overrides: Default::default(),
        typography_profile: Default::default(),
        row_version: 1,
        updated_at: None,
    }
}

fn default_reader_state(user_id: Uuid) -> ReaderState {
    ReaderState {
        user_id,
        current_ebook_id: None,
        current_location: None,
        reading_mode: Default::default(),
        row_version: 1,
        last_opened_at: None,
        updated_at: None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::ThemeMode;

    #[tokio::test]
    async fn test_login_then_me() {
        let remote = MockRemote::default();
        assert_eq!(*remote.me().await.unwrap_err(), ErrorKind::MissingToken("access"));
        remote
            .login(&LoginRequest {
                identifier: "reader".into(),
                password: "password".into(),
            })
            .await
            .unwrap();
        assert_eq!(remote.tokens(), Tokens::new(MOCK_ACCESS_TOKEN, MOCK_REFRESH_TOKEN));
        assert_eq!(remote.me().await.unwrap().username, "reader");
        assert_eq!(remote.calls(), ["me", "login", "me"]);
    }

    #[tokio::test]
    async fn test_scripted_failure_and_recovery() {
        let remote = MockRemote::default().with_tokens(Tokens::new("a", "r"));
        remote.fail_transient("patch preferences");
        let patch = PreferencesPatch {
            theme_mode: Some(ThemeMode::Sepia),
            ..Default::default()
        };
        let err = remote.patch_preferences(&patch).await.unwrap_err();
        assert!(err.is_transient());
        assert!(remote.preference_patches().is_empty());

        remote.recover("patch preferences");
        let prefs = remote.patch_preferences(&patch).await.unwrap();
        assert_eq!(prefs.theme_mode, ThemeMode::Sepia);
        assert_eq!(prefs.row_version, 2);
        assert_eq!(remote.preference_patches().len(), 1);
    }
}
