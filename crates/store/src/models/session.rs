use crate::error::{Error, ErrorKind};
use crate::models::parse_uuid_opt;
use crate::timestamp;
use exn::ResultExt;
use libra_api::Tokens;
use time::UtcDateTime;
use uuid::Uuid;

/// The signed-in user's tokens. There is at most one.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SessionState {
    pub access_token: String,
    pub refresh_token: String,
    pub user_id: Option<Uuid>,
    pub updated_at: Option<UtcDateTime>,
}
impl SessionState {
    pub fn new(access_token: impl Into<String>, refresh_token: impl Into<String>, user_id: Option<Uuid>) -> Self {
        Self {
            access_token: access_token.into(),
            refresh_token: refresh_token.into(),
            user_id,
            updated_at: None,
        }
    }

    /// Build from whatever the API client currently holds; `None` without both tokens.
    pub fn from_tokens(tokens: &Tokens, user_id: Option<Uuid>) -> Option<Self> {
        match (&tokens.access, &tokens.refresh) {
            (Some(access), Some(refresh)) if !access.is_empty() && !refresh.is_empty() => {
                Some(Self::new(access.as_str(), refresh.as_str(), user_id))
            },
            _ => None,
        }
    }

    pub fn tokens(&self) -> Tokens {
        Tokens::new(self.access_token.as_str(), self.refresh_token.as_str())
    }
}

#[derive(sqlx::FromRow)]
pub(crate) struct SessionRow {
    pub(crate) access_token: String,
    pub(crate) refresh_token: String,
    pub(crate) user_id: Option<String>,
    pub(crate) updated_at: String,
}
impl From<&SessionState> for SessionRow {
    fn from(session: &SessionState) -> Self {
        Self {
            access_token: session.access_token.clone(),
            refresh_token: session.refresh_token.clone(),
            user_id: session.user_id.map(|id| id.to_string()),
            updated_at: timestamp::format(session.updated_at.unwrap_or_else(timestamp::now)),
        }
    }
}
impl TryFrom<SessionRow> for SessionState {
    type Error = Error;
    fn try_from(row: SessionRow) -> Result<Self, Self::Error> {
        Ok(Self {
            access_token: row.access_token,
            refresh_token: row.refresh_token,
            user_id: parse_uuid_opt(row.user_id.as_deref(), "session user id")?,
            updated_at: Some(timestamp::parse(&row.updated_at).or_raise(|| ErrorKind::InvalidData("session timestamp"))?),
        })
    }
}
