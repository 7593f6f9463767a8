//! The seam between the client application and the server.
//!
//! Everything above this crate talks to a [`Remote`], never to
//! [`Client`](crate::Client) directly, so tests can swap in the
//! [`MockRemote`](crate::MockRemote) (feature `mock`).

use crate::error::Result;
use crate::models::{
    Borrow, CreateEbook, DevicePoll, DeviceStart, Ebook, LoginRequest, Page, Preferences, PreferencesPatch,
    ReaderState, ReaderStatePatch, RegisterRequest, Report, ReportRequest, Review, ReviewRequest, Share, SyncEvent,
    SyncEventAck, User,
};
use async_trait::async_trait;
use uuid::Uuid;

/// Session tokens held by a remote.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Tokens {
    pub access: Option<String>,
    pub refresh: Option<String>,
}
impl Tokens {
    pub fn new(access: impl Into<String>, refresh: impl Into<String>) -> Self {
        Self {
            access: Some(access.into()),
            refresh: Some(refresh.into()),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.access.is_none() && self.refresh.is_none()
    }
}

/// Typed access to every server endpoint the client uses.
///
/// Implementations hold the session tokens themselves: successful
/// authentication calls (register, login, refresh, an approved device poll)
/// replace them, logout clears them.
#[async_trait]
pub trait Remote: Send + Sync {
    /// Current tokens (cheap snapshot; never held across a request).
    fn tokens(&self) -> Tokens;
    /// Replace the tokens, e.g. with a session restored from disk.
    fn set_tokens(&self, tokens: Tokens);
    fn clear_tokens(&self);

    // ====================================================================
    // Authentication
    // ====================================================================

    async fn register(&self, request: &RegisterRequest) -> Result<User>;
    async fn login(&self, request: &LoginRequest) -> Result<User>;
    /// Rotate tokens using the refresh cookie.
    async fn refresh(&self) -> Result<User>;
    async fn logout(&self) -> Result<()>;
    async fn me(&self) -> Result<User>;
    async fn device_start(&self) -> Result<DeviceStart>;
    async fn device_poll(&self, device_code: &str) -> Result<DevicePoll>;

    // ====================================================================
    // Library and community
    // ====================================================================

    async fn list_ebooks(&self, limit: u32) -> Result<Page<Ebook>>;
    async fn create_ebook(&self, request: &CreateEbook) -> Result<Ebook>;
    async fn list_shares(&self, limit: u32) -> Result<Page<Share>>;
    async fn borrow_share(&self, share_id: Uuid) -> Result<Borrow>;
    async fn review_share(&self, share_id: Uuid, request: &ReviewRequest) -> Result<Review>;
    async fn report_share(&self, share_id: Uuid, request: &ReportRequest) -> Result<Report>;

    // ====================================================================
    // Reader
    // ====================================================================

    async fn get_preferences(&self) -> Result<Preferences>;
    async fn patch_preferences(&self, patch: &PreferencesPatch) -> Result<Preferences>;
    async fn get_reader_state(&self) -> Result<ReaderState>;
    async fn patch_reader_state(&self, patch: &ReaderStatePatch) -> Result<ReaderState>;

    // ====================================================================
    // Sync
    // ====================================================================

    async fn store_sync_event(&self, event: &SyncEvent) -> Result<SyncEventAck>;
}
