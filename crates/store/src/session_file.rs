//! `session.json`: a copy of the session row that survives a lost database.
//!
//! Holds bearer and refresh tokens, so it is written owner-read/write only.

use crate::error::{ErrorKind, Result};
use crate::models::SessionState;
use crate::timestamp;
use exn::ResultExt;
use serde::{Deserialize, Serialize};
use std::io::ErrorKind as IoErrorKind;
use std::path::Path;
use tokio::fs;
use tokio::io::AsyncWriteExt;
use tracing::instrument;
use uuid::Uuid;

#[derive(Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
struct SessionFile {
    access_token: String,
    refresh_token: String,
    #[serde(default)]
    user_id: Option<Uuid>,
    saved_at: String,
}

/// Write the session atomically (temporary file, then rename).
#[instrument(skip_all, fields(path = %path.as_ref().display()))]
pub async fn save(path: impl AsRef<Path>, session: &SessionState) -> Result<()> {
    let path = path.as_ref();
    let file = SessionFile {
        access_token: session.access_token.clone(),
        refresh_token: session.refresh_token.clone(),
        user_id: session.user_id,
        saved_at: timestamp::format(timestamp::now()),
    };
    let json = serde_json::to_vec_pretty(&file).or_raise(|| ErrorKind::SessionFile)?;
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent).await.or_raise(|| ErrorKind::SessionFile)?;
    }
    let tmp = path.with_extension("json.tmp");
    let mut options = fs::OpenOptions::new();
    options.write(true).create(true).truncate(true);
    #[cfg(unix)]
    options.mode(0o600);
    let mut handle = options.open(&tmp).await.or_raise(|| ErrorKind::SessionFile)?;
    // `mode` only applies on creation; a stale temporary file keeps its bits.
    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt;
        fs::set_permissions(&tmp, std::fs::Permissions::from_mode(0o600))
            .await
            .or_raise(|| ErrorKind::SessionFile)?;
    }
    handle.write_all(&json).await.or_raise(|| ErrorKind::SessionFile)?;
    handle.sync_all().await.or_raise(|| ErrorKind::SessionFile)?;
    drop(handle);
    fs::rename(&tmp, path).await.or_raise(|| ErrorKind::SessionFile)?;
    Ok(())
}

/// `None` when there is no file. A file that cannot be parsed is an error.
#[instrument(skip_all, fields(path = %path.as_ref().display()))]
pub async fn load(path: impl AsRef<Path>) -> Result<Option<SessionState>> {
    let bytes = match fs::read(path.as_ref()).await {
        Ok(bytes) => bytes,
        Err(e) if e.kind() == IoErrorKind::NotFound => return Ok(None),
        Err(e) => return Err(e).or_raise(|| ErrorKind::SessionFile),
    };
    let file: SessionFile = serde_json::from_slice(&bytes).or_raise(|| ErrorKind::SessionFile)?;
    if file.access_token.is_empty() || file.refresh_token.is_empty() {
        return Ok(None);
    }
    Ok(Some(SessionState {
        access_token: file.access_token,
        refresh_token: file.refresh_token,
        user_id: file.user_id,
        updated_at: timestamp::parse(&file.saved_at).ok(),
    }))
}

/// Removing a file that is already gone is not an error.
#[instrument(skip_all, fields(path = %path.as_ref().display()))]
pub async fn remove(path: impl AsRef<Path>) -> Result<()> {
    match fs::remove_file(path.as_ref()).await {
        Ok(()) => Ok(()),
        Err(e) if e.kind() == IoErrorKind::NotFound => Ok(()),
        Err(e) => Err(e).or_raise(|| ErrorKind::SessionFile),
    }
}
