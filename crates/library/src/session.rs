//! Signing in and out, and keeping the session across restarts.
//!
//! Tokens live in the API client while the app runs. [`SessionStore`]
//! mirrors them into the `session` table and `session.json` whenever they
//! change, so the next launch can pick up where this one left off.

use crate::error::{ErrorKind, Result, raise_remote};
use exn::ResultExt;
use libra_api::Remote;
use libra_api::models::{DeviceStart, DeviceStatus, LoginRequest, RegisterRequest, User};
use libra_store::models::SessionState;
use libra_store::{Repository, session_file, timestamp};
use std::path::PathBuf;
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tracing::instrument;
use uuid::Uuid;

pub const MIN_PASSWORD_LEN: usize = 8;
const MIN_POLL_INTERVAL: Duration = Duration::from_secs(1);

#[derive(Debug, Clone)]
pub struct SessionStore {
    repo: Repository,
    file: PathBuf,
}
impl SessionStore {
    pub fn new(repo: Repository, file: impl Into<PathBuf>) -> Self {
        Self { repo, file: file.into() }
    }

    /// Save whatever tokens `remote` holds. Does nothing without both tokens.
    #[instrument(skip(self, remote))]
    pub async fn persist(&self, remote: &dyn Remote, user_id: Option<Uuid>) -> Result<Option<SessionState>> {
        let Some(session) = SessionState::from_tokens(&remote.tokens(), user_id) else {
            tracing::warn!("no complete token pair to persist");
            return Ok(None);
        };
        self.repo.save_session(&session).await.or_raise(|| ErrorKind::Store)?;
        session_file::save(&self.file, &session).await.or_raise(|| ErrorKind::Store)?;
        Ok(Some(session))
    }

    /// The saved session, from the database or failing that from `session.json`.
    pub async fn restore(&self) -> Result<Option<SessionState>> {
        if let Some(session) = self.repo.session().await.or_raise(|| ErrorKind::Store)? {
            return Ok(Some(session));
        }
        match session_file::load(&self.file).await {
            Ok(session) => Ok(session),
            Err(e) => {
                // A corrupt file is as good as no file.
                tracing::warn!(error = ?e, path = %self.file.display(), "ignoring unreadable session file");
                Ok(None)
            },
        }
    }

    pub async fn clear(&self) -> Result<()> {
        self.repo.clear_session().await.or_raise(|| ErrorKind::Store)?;
        session_file::remove(&self.file).await.or_raise(|| ErrorKind::Store)
    }
}

// =============================================================================
// Credentials
// =============================================================================

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Credentials {
    Login {
        identifier: String,
        password: String,
    },
    Register {
        email: String,
        username: String,
        password: String,
    },
}
impl Credentials {
    pub fn validate(&self) -> Result<()> {
        let password = match self {
            Self::Login { identifier, password } => {
                required(identifier, "identifier")?;
                password
            },
            Self::Register {
                email,
                username,
                password,
            } => {
                required(email, "email")?;
                if !email.contains('@') {
                    exn::bail!(ErrorKind::Validation("email must contain @".to_string()));
                }
                required(username, "username")?;
                password
            },
        };
        if password.chars().count() < MIN_PASSWORD_LEN {
            exn::bail!(ErrorKind::Validation(format!(
                "password must be at least {MIN_PASSWORD_LEN} characters"
            )));
        }
        Ok(())
    }
}

fn required(value: &str, field: &str) -> Result<()> {
    if value.trim().is_empty() {
        exn::bail!(ErrorKind::Validation(format!("{field} is required")));
    }
    Ok(())
}

/// Log in or register, then persist the new session.
#[instrument(skip_all)]
pub async fn authenticate(remote: &dyn Remote, store: &SessionStore, credentials: &Credentials) -> Result<User> {
    credentials.validate()?;
    let user = match credentials {
        Credentials::Login { identifier, password } => {
            let request = LoginRequest {
                identifier: identifier.trim().to_string(),
                password: password.clone(),
            };
            remote.login(&request).await
        },
        Credentials::Register {
            email,
            username,
            password,
        } => {
            let request = RegisterRequest {
                email: email.trim().to_string(),
                username: username.trim().to_string(),
                password: password.clone(),
            };
            remote.register(&request).await
        },
    }
    .map_err(raise_remote)?;
    store.persist(remote, Some(user.id)).await?;
    tracing::info!(user_id = %user.id, "signed in");
    Ok(user)
}

/// Sign out. The server call is best-effort; local state is always cleared.
#[instrument(skip_all)]
pub async fn logout(remote: &dyn Remote, store: &SessionStore) -> Result<()> {
    if let Err(e) = remote.logout().await {
        tracing::warn!(error = ?e, "remote logout failed");
    }
    remote.clear_tokens();
    store.clear().await
}

// =============================================================================
// Startup
// =============================================================================

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Bootstrap {
    SignedIn(User),
    /// A saved session exists but the server could not be reached.
    Offline { user_id: Option<Uuid>, reason: String },
    SignedOut,
}

/// Restore the saved session and check it against the server.
///
/// An auth failure from `me` gets one `refresh`; if that fails too the
/// session is cleared.
#[instrument(skip_all)]
pub async fn bootstrap(remote: &dyn Remote, store: &SessionStore) -> Result<Bootstrap> {
    let Some(session) = store.restore().await? else {
        return Ok(Bootstrap::SignedOut);
    };
    remote.set_tokens(session.tokens());
    let failure = match remote.me().await {
        Ok(user) => {
            store.persist(remote, Some(user.id)).await?;
            return Ok(Bootstrap::SignedIn(user));
        },
        Err(e) if e.is_auth() => match remote.refresh().await {
            Ok(user) => {
                store.persist(remote, Some(user.id)).await?;
                tracing::info!(user_id = %user.id, "session refreshed");
                return Ok(Bootstrap::SignedIn(user));
            },
            Err(e) => e,
        },
        Err(e) => e,
    };
    if failure.is_auth() {
        tracing::info!("saved session rejected; signing out");
        remote.clear_tokens();
        store.clear().await?;
        return Ok(Bootstrap::SignedOut);
    }
    let reason = (*failure).to_string();
    tracing::warn!(error = %reason, "starting offline");
    Ok(Bootstrap::Offline {
        user_id: session.user_id,
        reason,
    })
}

// =============================================================================
// Device authorization
// =============================================================================

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DeviceOutcome {
    Approved(User),
    Expired,
    Failed,
    Cancelled,
}

pub async fn start_device(remote: &dyn Remote) -> Result<DeviceStart> {
    remote.device_start().await.map_err(raise_remote)
}

/// Poll until the device authorization settles, `expires_at` passes or
/// `cancel` fires.
#[instrument(skip_all)]
pub async fn poll_device(
    remote: &dyn Remote,
    store: &SessionStore,
    start: &DeviceStart,
    cancel: &CancellationToken,
) -> Result<DeviceOutcome> {
    let interval = Duration::from_secs(start.interval_seconds).max(MIN_POLL_INTERVAL);
    let deadline = timestamp::parse(&start.expires_at).ok();
    loop {
        if deadline.is_some_and(|deadline| timestamp::now() >= deadline) {
            return Ok(DeviceOutcome::Expired);
        }
        let poll = tokio::select! {
            biased;
            _ = cancel.cancelled() => return Ok(DeviceOutcome::Cancelled),
            poll = remote.device_poll(&start.device_code) => poll.map_err(raise_remote)?,
        };
        match poll.status {
            DeviceStatus::Approved => {
                let user = match poll.result.and_then(|result| result.user) {
                    Some(user) => user,
                    None => remote.me().await.map_err(raise_remote)?,
                };
                store.persist(remote, Some(user.id)).await?;
                return Ok(DeviceOutcome::Approved(user));
            },
            DeviceStatus::Expired => return Ok(DeviceOutcome::Expired),
            DeviceStatus::Failed => return Ok(DeviceOutcome::Failed),
            DeviceStatus::Pending => {},
        }
        tokio::select! {
            biased;
            _ = cancel.cancelled() => return Ok(DeviceOutcome::Cancelled),
            _ = tokio::time::sleep(interval) => {},
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use libra_api::models::{DevicePoll, DeviceResult, TokenValue};
    use libra_api::{MOCK_ACCESS_TOKEN, MockRemote, Tokens};
    use libra_store::Database;
    use rstest::rstest;

    struct Fixture {
        _dir: tempfile::TempDir,
        repo: Repository,
        store: SessionStore,
        path: PathBuf,
    }

    async fn fixture() -> Fixture {
        let dir = tempfile::tempdir().unwrap();
        let repo = Repository::from(&Database::connect_in_memory().await.unwrap());
        let path = dir.path().join("session.json");
        let store = SessionStore::new(repo.clone(), &path);
        Fixture {
            _dir: dir,
            repo,
            store,
            path,
        }
    }

    fn login(identifier: &str, password: &str) -> Credentials {
        Credentials::Login {
            identifier: identifier.to_string(),
            password: password.to_string(),
        }
    }

    fn register(email: &str, username: &str, password: &str) -> Credentials {
        Credentials::Register {
            email: email.to_string(),
            username: username.to_string(),
            password: password.to_string(),
        }
    }

    #[rstest]
    #[case(login("reader", "longenough"), None)]
    #[case(login(" ", "longenough"), Some("identifier is required"))]
    #[case(login("reader", "short"), Some("password must be at least 8 characters"))]
    #[case(register("a@b.test", "reader", "longenough"), None)]
    #[case(register("nope", "reader", "longenough"), Some("email must contain @"))]
    #[case(register("a@b.test", "", "longenough"), Some("username is required"))]
    fn test_validate(#[case] credentials: Credentials, #[case] expected: Option<&str>) {
        let result = credentials.validate();
        match expected {
            None => assert!(result.is_ok()),
            Some(message) => assert_eq!((*result.unwrap_err()).to_string(), message),
        }
    }

    #[tokio::test]
    async fn test_login_persists_both_copies() {
        let f = fixture().await;
        let remote = MockRemote::default();
        let user = authenticate(&remote, &f.store, &login("reader", "longenough")).await.unwrap();

        let saved = f.repo.session().await.unwrap().unwrap();
        assert_eq!(saved.access_token, MOCK_ACCESS_TOKEN);
        assert_eq!(saved.user_id, Some(user.id));
        let file = session_file::load(&f.path).await.unwrap().unwrap();
        assert_eq!(file.access_token, MOCK_ACCESS_TOKEN);
    }

    #[tokio::test]
    async fn test_invalid_credentials_never_reach_the_server() {
        let f = fixture().await;
        let remote = MockRemote::default();
        let err = authenticate(&remote, &f.store, &login("reader", "short")).await.unwrap_err();
        assert!(matches!(&*err, ErrorKind::Validation(_)));
        assert!(remote.calls().is_empty());
    }

    #[tokio::test]
    async fn test_logout_clears_even_when_server_fails() {
        let f = fixture().await;
        let remote = MockRemote::default();
        authenticate(&remote, &f.store, &login("reader", "longenough")).await.unwrap();
        remote.fail_transient("logout");

        logout(&remote, &f.store).await.unwrap();
        assert!(remote.tokens().is_empty());
        assert!(f.repo.session().await.unwrap().is_none());
        assert!(!f.path.exists());
    }

    #[tokio::test]
    async fn test_bootstrap_without_session() {
        let f = fixture().await;
        let remote = MockRemote::default();
        assert_eq!(bootstrap(&remote, &f.store).await.unwrap(), Bootstrap::SignedOut);
        assert!(remote.calls().is_empty());
    }

    #[tokio::test]
    async fn test_bootstrap_falls_back_to_session_file() {
        let f = fixture().await;
        session_file::save(&f.path, &SessionState::new("a", "r", None)).await.unwrap();
        let remote = MockRemote::default();
        let outcome = bootstrap(&remote, &f.store).await.unwrap();
        assert!(matches!(outcome, Bootstrap::SignedIn(_)));
        assert_eq!(remote.calls(), ["me"]);
        assert!(f.repo.session().await.unwrap().is_some());
    }

    #[tokio::test]
    async fn test_bootstrap_refreshes_once_on_auth_failure() {
        let f = fixture().await;
        f.repo.save_session(&SessionState::new("a", "r", None)).await.unwrap();
        let remote = MockRemote::default();
        remote.fail("me", libra_api::error::ErrorKind::status("me", 401, "expired"));

        let outcome = bootstrap(&remote, &f.store).await.unwrap();
        assert!(matches!(outcome, Bootstrap::SignedIn(_)));
        assert_eq!(remote.calls(), ["me", "refresh"]);
        assert_eq!(f.repo.session().await.unwrap().unwrap().access_token, MOCK_ACCESS_TOKEN);
    }

    #[tokio::test]
    async fn test_bootstrap_signs_out_when_refresh_is_rejected() {
        let f = fixture().await;
        f.repo.save_session(&SessionState::new("a", "r", None)).await.unwrap();
        let remote = MockRemote::default();
        remote.fail("me", libra_api::error::ErrorKind::status("me", 401, "expired"));
        remote.fail("refresh", libra_api::error::ErrorKind::status("refresh", 401, "expired"));

        assert_eq!(bootstrap(&remote, &f.store).await.unwrap(), Bootstrap::SignedOut);
        assert!(f.repo.session().await.unwrap().is_none());
        assert!(remote.tokens().is_empty());
    }

    #[tokio::test]
    async fn test_bootstrap_offline_keeps_session() {
        let f = fixture().await;
        let user_id = Uuid::from_u128(5);
        f.repo.save_session(&SessionState::new("a", "r", Some(user_id))).await.unwrap();
        let remote = MockRemote::default();
        remote.fail_transient("me");

        let outcome = bootstrap(&remote, &f.store).await.unwrap();
        assert_eq!(
            outcome,
            Bootstrap::Offline {
                user_id: Some(user_id),
                reason: "me failed (503): service unavailable".to_string()
            }
        );
        assert_eq!(remote.tokens(), Tokens::new("a", "r"));
    }

    fn device_start(expires_at: &str) -> DeviceStart {
        DeviceStart {
            device_code: "code".to_string(),
            auth_url: "https://accounts.example.test/device".to_string(),
            expires_at: expires_at.to_string(),
            interval_seconds: 0,
        }
    }

    #[tokio::test]
    async fn test_device_poll_until_approved() {
        let f = fixture().await;
        let pending = DevicePoll {
            status: DeviceStatus::Pending,
            result: None,
        };
        let approved = DevicePoll {
            status: DeviceStatus::Approved,
            result: Some(DeviceResult {
                user: None,
                token: TokenValue {
                    token: "device-access".to_string(),
                    expires_at: None,
                },
                refresh_token: TokenValue {
                    token: "device-refresh".to_string(),
                    expires_at: None,
                },
            }),
        };
        let remote = MockRemote::default().with_device_polls([pending, approved]);

        let outcome = poll_device(&remote, &f.store, &device_start("2099-01-01T00:00:00Z"), &CancellationToken::new())
            .await
            .unwrap();
        assert!(matches!(outcome, DeviceOutcome::Approved(_)));
        assert_eq!(remote.calls(), ["device poll", "device poll", "me"]);
        assert_eq!(f.repo.session().await.unwrap().unwrap().access_token, "device-access");
    }

    #[tokio::test]
    async fn test_device_poll_past_expiry() {
        let f = fixture().await;
        let remote = MockRemote::default();
        let outcome = poll_device(&remote, &f.store, &device_start("2000-01-01T00:00:00Z"), &CancellationToken::new())
            .await
            .unwrap();
        assert_eq!(outcome, DeviceOutcome::Expired);
        assert!(remote.calls().is_empty());
    }

    #[tokio::test]
    async fn test_device_poll_cancelled() {
        let f = fixture().await;
        let remote = MockRemote::default();
        let cancel = CancellationToken::new();
        cancel.cancel();
        let outcome = poll_device(&remote, &f.store, &device_start("2099-01-01T00:00:00Z"), &cancel)
            .await
            .unwrap();
        assert_eq!(outcome, DeviceOutcome::Cancelled);
    }
}
