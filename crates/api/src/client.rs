//! reqwest-backed [`Remote`].

use crate::error::{ErrorKind, Result};
use crate::models::{
    Borrow, CreateEbook, DevicePoll, DeviceStart, DeviceStatus, Ebook, LoginRequest, Page, Preferences,
    PreferencesPatch, ReaderState, ReaderStatePatch, RegisterRequest, Report, ReportRequest, Review, ReviewRequest,
    Share, SyncEvent, SyncEventAck, User,
};
use crate::remote::{Remote, Tokens};
use async_trait::async_trait;
use exn::{OptionExt, ResultExt};
use reqwest::cookie::Jar;
use reqwest::header::COOKIE;
use reqwest::{Method, Response, Url};
use serde::Serialize;
use serde::de::DeserializeOwned;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;
use tracing::instrument;
use uuid::Uuid;

const DEFAULT_ACCESS_COOKIE: &str = "access_token";
const DEFAULT_REFRESH_COOKIE: &str = "refresh_token";

#[derive(Clone, Copy, PartialEq, Eq)]
enum Auth {
    Anonymous,
    Bearer,
    RefreshCookie,
    BearerAndRefreshCookie,
}
impl Auth {
    fn bearer(self) -> bool {
        matches!(self, Self::Bearer | Self::BearerAndRefreshCookie)
    }

    fn refresh_cookie(self) -> bool {
        matches!(self, Self::RefreshCookie | Self::BearerAndRefreshCookie)
    }
}

struct Session {
    tokens: Tokens,
    /// Cookie names as the server last sent them; reused verbatim.
    access_cookie: String,
    refresh_cookie: String,
}

/// Some endpoints wrap the user in `{"user": ...}`, others return it bare.
#[derive(serde::Deserialize)]
#[serde(untagged)]
enum UserEnvelope {
    Wrapped { user: User },
    Bare(User),
}
impl From<UserEnvelope> for User {
    fn from(envelope: UserEnvelope) -> Self {
        match envelope {
            UserEnvelope::Wrapped { user } | UserEnvelope::Bare(user) => user,
        }
    }
}

/// HTTP client for the `/api/v1` REST surface.
///
/// Requests go through a shared cookie jar. Tokens are kept under a lock that
/// is only held while reading or writing them, never across a request.
pub struct Client {
    base_url: Url,
    base: String,
    http: reqwest::Client,
    jar: Arc<Jar>,
    session: Mutex<Session>,
}

impl Client {
    pub fn new(base_url: &str, timeout: Duration) -> Result<Self> {
        let base = base_url.trim().trim_end_matches('/').to_string();
        let parsed =
            Url::parse(&base).or_raise(|| ErrorKind::Validation(format!("invalid API base URL: {base_url}")))?;
        let jar = Arc::new(Jar::default());
        let http = reqwest::Client::builder()
            .cookie_provider(Arc::clone(&jar))
            .timeout(timeout)
            .user_agent(concat!("libra-link/", env!("CARGO_PKG_VERSION")))
            .build()
            .or_raise(|| ErrorKind::Transport("client setup"))?;
        Ok(Self {
            base_url: parsed,
            base,
            http,
            jar,
            session: Mutex::new(Session {
                tokens: Tokens::default(),
                access_cookie: DEFAULT_ACCESS_COOKIE.to_string(),
                refresh_cookie: DEFAULT_REFRESH_COOKIE.to_string(),
            }),
        })
    }

    pub fn base_url(&self) -> &str {
        &self.base
    }

    fn session(&self) -> MutexGuard<'_, Session> {
        self.session.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn seed_cookie(&self, name: &str, value: &str) {
        self.jar.add_cookie_str(&format!("{name}={value}; Path=/"), &self.base_url);
    }

    fn expire_cookie(&self, name: &str) {
        self.jar.add_cookie_str(&format!("{name}=; Path=/; Max-Age=0"), &self.base_url);
    }

    /// Pick up rotated tokens from `Set-Cookie` headers.
    fn capture_cookies(&self, response: &Response) {
        let cookies: Vec<(String, String)> =
            response.cookies().map(|c| (c.name().to_string(), c.value().to_string())).collect();
        if cookies.is_empty() {
            return;
        }
        let mut session = self.session();
        for (name, value) in cookies {
            let lower = name.to_ascii_lowercase();
            let token = (!value.is_empty()).then(|| value.clone());
            if lower.contains("refresh") {
                session.tokens.refresh = token;
                session.refresh_cookie.clone_from(&name);
            } else if lower.contains("access") {
                session.tokens.access = token;
                session.access_cookie.clone_from(&name);
            } else {
                continue;
            }
            tracing::trace!(cookie = %name, "Captured session cookie");
            self.seed_cookie(&name, &value);
        }
    }

    async fn request<B>(
        &self,
        operation: &'static str,
        method: Method,
        path: &str,
        body: Option<&B>,
        auth: Auth,
    ) -> Result<Response>
    where
        B: Serialize + Sync + ?Sized,
    {
        let mut request = self.http.request(method, format!("{}{path}", self.base));
        {
            let session = self.session();
            if auth.bearer() {
                let token = session.tokens.access.as_deref().ok_or_raise(|| ErrorKind::MissingToken("access"))?;
                request = request.bearer_auth(token);
            }
            if auth.refresh_cookie() {
                let token = session.tokens.refresh.as_deref().ok_or_raise(|| ErrorKind::MissingToken("refresh"))?;
                request = request.header(COOKIE, format!("{}={token}", session.refresh_cookie));
            }
        }
        if let Some(body) = body {
            request = request.json(body);
        }
        let response = request.send().await.or_raise(|| ErrorKind::Transport(operation))?;
        self.capture_cookies(&response);
        let status = response.status();
        tracing::debug!(operation, status = status.as_u16(), "API response");
        if status.is_success() {
            return Ok(response);
        }
        let body = response.text().await.unwrap_or_default();
        exn::bail!(ErrorKind::status(operation, status.as_u16(), &body))
    }

    async fn json<B, T>(&self, operation: &'static str, method: Method, path: &str, body: Option<&B>, auth: Auth) -> Result<T>
    where
        B: Serialize + Sync + ?Sized,
        T: DeserializeOwned,
    {
        let response = self.request(operation, method, path, body, auth).await?;
        response.json::<T>().await.or_raise(|| ErrorKind::Decode(operation))
    }

    async fn user(&self, operation: &'static str, path: &str, body: &(impl Serialize + Sync), auth: Auth) -> Result<User> {
        self.json::<_, UserEnvelope>(operation, Method::POST, path, Some(body), auth).await.map(User::from)
    }
}

#[async_trait]
impl Remote for Client {
    fn tokens(&self) -> Tokens {
        self.session().tokens.clone()
    }

    fn set_tokens(&self, tokens: Tokens) {
        let (access_name, refresh_name) = {
            let mut session = self.session();
            session.tokens = tokens.clone();
            (session.access_cookie.clone(), session.refresh_cookie.clone())
        };
        if let Some(access) = &tokens.access {
            self.seed_cookie(&access_name, access);
        }
        if let Some(refresh) = &tokens.refresh {
            self.seed_cookie(&refresh_name, refresh);
        }
    }

    fn clear_tokens(&self) {
        let (access_name, refresh_name) = {
            let mut session = self.session();
            session.tokens = Tokens::default();
            (session.access_cookie.clone(), session.refresh_cookie.clone())
        };
        self.expire_cookie(&access_name);
        self.expire_cookie(&refresh_name);
    }

    // ====================================================================
    // Authentication
    // ====================================================================

    #[instrument(skip_all, fields(username = %request.username))]
    async fn register(&self, request: &RegisterRequest) -> Result<User> {
        self.user("register", "/api/v1/auth/register", request, Auth::Anonymous).await
    }

    #[instrument(skip_all)]
    async fn login(&self, request: &LoginRequest) -> Result<User> {
        self.user("login", "/api/v1/auth/login", request, Auth::Anonymous).await
    }

    #[instrument(skip_all)]
    async fn refresh(&self) -> Result<User> {
        self.user("refresh", "/api/v1/auth/refresh", &serde_json::json!({}), Auth::RefreshCookie).await
    }

    #[instrument(skip_all)]
    async fn logout(&self) -> Result<()> {
        let body = serde_json::json!({});
        let result =
            self.request("logout", Method::POST, "/api/v1/auth/logout", Some(&body), Auth::BearerAndRefreshCookie).await;
        self.clear_tokens();
        result.map(|_| ())
    }

    #[instrument(skip_all)]
    async fn me(&self) -> Result<User> {
        self.json::<(), UserEnvelope>("me", Method::GET, "/api/v1/auth/me", None, Auth::Bearer)
            .await
            .map(User::from)
    }

    #[instrument(skip_all)]
    async fn device_start(&self) -> Result<DeviceStart> {
        let body = serde_json::json!({});
        self.json("device start", Method::POST, "/api/v1/auth/google/device/start", Some(&body), Auth::Anonymous)
            .await
    }

    #[instrument(skip_all)]
    async fn device_poll(&self, device_code: &str) -> Result<DevicePoll> {
        let body = serde_json::json!({ "deviceCode": device_code });
        let poll: DevicePoll = self
            .json("device poll", Method::POST, "/api/v1/auth/google/device/poll", Some(&body), Auth::Anonymous)
            .await?;
        if poll.status == DeviceStatus::Approved
            && let Some(result) = &poll.result
        {
            self.set_tokens(Tokens::new(&result.token.token, &result.refresh_token.token));
        }
        Ok(poll)
    }

    // ====================================================================
    // Library and community
    // ====================================================================

    #[instrument(skip(self))]
    async fn list_ebooks(&self, limit: u32) -> Result<Page<Ebook>> {
        let path = format!("/api/v1/ebooks?limit={limit}");
        self.json::<(), _>("list ebooks", Method::GET, &path, None, Auth::Bearer).await
    }

    #[instrument(skip_all, fields(title = %request.title))]
    async fn create_ebook(&self, request: &CreateEbook) -> Result<Ebook> {
        self.json("create ebook", Method::POST, "/api/v1/ebooks", Some(request), Auth::Bearer).await
    }

    #[instrument(skip(self))]
    async fn list_shares(&self, limit: u32) -> Result<Page<Share>> {
        let path = format!("/api/v1/shares?limit={limit}");
        self.json::<(), _>("list shares", Method::GET, &path, None, Auth::Bearer).await
    }

    #[instrument(skip(self))]
    async fn borrow_share(&self, share_id: Uuid) -> Result<Borrow> {
        let path = format!("/api/v1/shares/{share_id}/borrow");
        let body = serde_json::json!({});
        self.json("borrow", Method::POST, &path, Some(&body), Auth::Bearer).await
    }

    #[instrument(skip(self, request))]
    async fn review_share(&self, share_id: Uuid, request: &ReviewRequest) -> Result<Review> {
        let path = format!("/api/v1/shares/{share_id}/review");
        self.json("review", Method::POST, &path, Some(request), Auth::Bearer).await
    }

    #[instrument(skip(self, request))]
    async fn report_share(&self, share_id: Uuid, request: &ReportRequest) -> Result<Report> {
        let path = format!("/api/v1/shares/{share_id}/report");
        self.json("report", Method::POST, &path, Some(request), Auth::Bearer).await
    }

    // ====================================================================
    // Reader
    // ====================================================================

    #[instrument(skip_all)]
    async fn get_preferences(&self) -> Result<Preferences> {
        self.json::<(), _>("get preferences", Method::GET, "/api/v1/reader/preferences", None, Auth::Bearer).await
    }

    #[instrument(skip_all)]
    async fn patch_preferences(&self, patch: &PreferencesPatch) -> Result<Preferences> {
        self.json("patch preferences", Method::PATCH, "/api/v1/reader/preferences", Some(patch), Auth::Bearer).await
    }

    #[instrument(skip_all)]
    async fn get_reader_state(&self) -> Result<ReaderState> {
        self.json::<(), _>("get reader state", Method::GET, "/api/v1/reader/state", None, Auth::Bearer).await
    }

    #[instrument(skip_all)]
    async fn patch_reader_state(&self, patch: &ReaderStatePatch) -> Result<ReaderState> {
        self.json("patch reader state", Method::PATCH, "/api/v1/reader/state", Some(patch), Auth::Bearer).await
    }

    // ====================================================================
    // Sync
    // ====================================================================

    #[instrument(skip_all, fields(entity_type = %event.entity_type, idempotency_key = %event.idempotency_key))]
    async fn store_sync_event(&self, event: &SyncEvent) -> Result<SyncEventAck> {
        self.json("store sync event", Method::POST, "/api/v1/sync/events", Some(event), Auth::Bearer).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::io::{AsyncReadExt, AsyncWriteExt};
    use tokio::net::TcpListener;
    use tokio::task::JoinHandle;

    const USER: &str = r#"{"id":"6f1c1c52-8d3c-4a3e-9c55-2f7d1d2b1a10","email":"reader@example.test","username":"reader"}"#;

    /// Accept a single connection, answer it with `status`, `headers` and
    /// `body`, and hand back the raw request (lowercased).
    async fn serve_once(status: &'static str, headers: &'static [&'static str], body: &'static str) -> (String, JoinHandle<String>) {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let base = format!("http://{}", listener.local_addr().unwrap());
        let handle = tokio::spawn(async move {
            let (mut socket, _) = listener.accept().await.unwrap();
            let mut raw = Vec::new();
            let mut buf = [0u8; 4096];
            loop {
                let n = socket.read(&mut buf).await.unwrap();
                raw.extend_from_slice(&buf[..n]);
                let text = String::from_utf8_lossy(&raw).to_lowercase();
                if let Some(end) = text.find("\r\n\r\n") {
                    let length = text
                        .lines()
                        .find_map(|l| l.strip_prefix("content-length:"))
                        .and_then(|v| v.trim().parse::<usize>().ok())
                        .unwrap_or(0);
                    if raw.len() >= end + 4 + length {
                        break;
                    }
                }
                if n == 0 {
                    break;
                }
            }
            let mut response = format!("HTTP/1.1 {status}\r\ncontent-type: application/json\r\ncontent-length: {}\r\nconnection: close\r\n", body.len());
            for header in headers {
                response.push_str(header);
                response.push_str("\r\n");
            }
            response.push_str("\r\n");
            response.push_str(body);
            socket.write_all(response.as_bytes()).await.unwrap();
            socket.shutdown().await.ok();
            String::from_utf8_lossy(&raw).to_lowercase()
        });
        (base, handle)
    }

    fn client(base: &str) -> Client {
        Client::new(base, Duration::from_secs(5)).unwrap()
    }

    #[test]
    fn test_invalid_base_url() {
        let err = Client::new("not a url", Duration::from_secs(1)).err().unwrap();
        assert!(matches!(&*err, ErrorKind::Validation(_)));
    }

    #[test]
    fn test_trailing_slash_trimmed() {
        assert_eq!(client("http://localhost:8080/").base_url(), "http://localhost:8080");
    }

    #[tokio::test]
    async fn test_missing_tokens_fail_locally() {
        // Nothing listens on the discard port; a request would fail with
        // Transport rather than MissingToken.
        let client = client("http://127.0.0.1:9");
        assert_eq!(*client.me().await.unwrap_err(), ErrorKind::MissingToken("access"));
        assert_eq!(*client.refresh().await.unwrap_err(), ErrorKind::MissingToken("refresh"));
        client.set_tokens(Tokens {
            access: Some("a".into()),
            refresh: None,
        });
        assert_eq!(*client.logout().await.unwrap_err(), ErrorKind::MissingToken("refresh"));
    }

    #[tokio::test]
    async fn test_login_captures_cookies() {
        let (base, server) = serve_once(
            "200 OK",
            &["set-cookie: libra_access=AAA; Path=/; HttpOnly", "set-cookie: libra_refresh=RRR; Path=/; HttpOnly"],
            USER,
        )
        .await;
        let client = client(&base);
        let user = client
            .login(&LoginRequest {
                identifier: "reader".into(),
                password: "correct horse".into(),
            })
            .await
            .unwrap();
        assert_eq!(user.username, "reader");
        assert_eq!(client.tokens(), Tokens::new("AAA", "RRR"));
        let request = server.await.unwrap();
        assert!(request.starts_with("post /api/v1/auth/login "));
        assert!(request.contains(r#""identifier":"reader""#));
        assert!(!request.contains("authorization:"));
    }

    #[tokio::test]
    async fn test_refresh_sends_captured_cookie_name() {
        let (base, server) = serve_once("200 OK", &["set-cookie: libra_refresh=R1; Path=/"], USER).await;
        let client = client(&base);
        client.session().refresh_cookie = "libra_refresh".into();
        client.set_tokens(Tokens::new("A0", "R0"));
        client.refresh().await.unwrap();
        let request = server.await.unwrap();
        assert!(request.contains("cookie: libra_refresh=r0"), "{request}");
        assert!(!request.contains("authorization:"));
        assert_eq!(client.tokens().refresh.as_deref(), Some("R1"));
        assert_eq!(client.tokens().access.as_deref(), Some("A0"));
    }

    #[tokio::test]
    async fn test_me_sends_bearer_and_unwraps_envelope() {
        let (base, server) = serve_once("200 OK", &[], r#"{"user":{"id":"6f1c1c52-8d3c-4a3e-9c55-2f7d1d2b1a10"}}"#).await;
        let client = client(&base);
        client.set_tokens(Tokens::new("tok", "ref"));
        let user = client.me().await.unwrap();
        assert_eq!(user.id.to_string(), "6f1c1c52-8d3c-4a3e-9c55-2f7d1d2b1a10");
        let request = server.await.unwrap();
        assert!(request.starts_with("get /api/v1/auth/me "));
        assert!(request.contains("authorization: bearer tok"));
    }

    #[tokio::test]
    async fn test_error_status_is_wrapped() {
        let body: &'static str = Box::leak(format!("{{\"error\":\"{}\"}}", "z".repeat(400)).into_boxed_str());
        let (base, _server) = serve_once("503 Service Unavailable", &[], body).await;
        let client = client(&base);
        client.set_tokens(Tokens::new("tok", "ref"));
        let err = client.list_ebooks(200).await.unwrap_err();
        assert!(err.is_transient());
        let ErrorKind::Status { operation, status, body } = &*err else {
            panic!("unexpected error: {err:?}");
        };
        assert_eq!(*operation, "list ebooks");
        assert_eq!(*status, 503);
        assert_eq!(body.chars().count(), 280);
        assert!((*err).to_string().starts_with("list ebooks failed (503): {\"error\":\"zzz"));
    }

    #[tokio::test]
    async fn test_device_poll_approval_sets_tokens() {
        let (base, _server) = serve_once(
            "200 OK",
            &[],
            r#"{"status":"approved","result":{"token":{"token":"dev-access"},"refreshToken":{"token":"dev-refresh"}}}"#,
        )
        .await;
        let client = client(&base);
        let poll = client.device_poll("code").await.unwrap();
        assert_eq!(poll.status, DeviceStatus::Approved);
        assert_eq!(client.tokens(), Tokens::new("dev-access", "dev-refresh"));
    }

    #[tokio::test]
    async fn test_connection_refused_is_transport() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let base = format!("http://{}", listener.local_addr().unwrap());
        drop(listener);
        let err = client(&base).device_start().await.unwrap_err();
        assert_eq!(*err, ErrorKind::Transport("device start"));
        assert!(err.is_transient());
    }
}
