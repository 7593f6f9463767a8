use crate::error::{Error, ErrorKind};
use crate::models::parse_uuid;
use crate::timestamp::{self, parse_opt};
use exn::ResultExt;
use libra_api::models::{Preferences, PreferencesPatch, ReadingMode, ThemeMode, ThemeOverrides, TypographyProfile};
use time::UtcDateTime;
use uuid::Uuid;

/// The user's reader preferences as last written locally or seen from the server.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PreferencesCache {
    pub user_id: Uuid,
    pub reading_mode: ReadingMode,
    pub zen_restore_on_open: bool,
    pub theme_mode: ThemeMode,
    pub theme_overrides: ThemeOverrides,
    pub typography_profile: TypographyProfile,
    pub row_version: i64,
    pub updated_at: Option<UtcDateTime>,
}
impl PreferencesCache {
    /// Defaults for a user we have never seen preferences for.
    pub fn new(user_id: Uuid) -> Self {
        Self {
            user_id,
            reading_mode: ReadingMode::default(),
            zen_restore_on_open: false,
            theme_mode: ThemeMode::default(),
            theme_overrides: ThemeOverrides::new(),
            typography_profile: TypographyProfile::default(),
            row_version: 1,
            updated_at: None,
        }
    }

    /// Apply the fields a patch sets. `row_version` is taken from the patch
    /// when present and otherwise left alone.
    pub fn apply(&mut self, patch: &PreferencesPatch) {
        if let Some(mode) = patch.reading_mode {
            self.reading_mode = mode;
        }
        if let Some(restore) = patch.zen_restore_on_open {
            self.zen_restore_on_open = restore;
        }
        if let Some(mode) = patch.theme_mode {
            self.theme_mode = mode;
        }
        if let Some(overrides) = &patch.theme_overrides {
            self.theme_overrides = overrides.clone();
        }
        if let Some(profile) = patch.typography_profile {
            self.typography_profile = profile;
        }
        if let Some(version) = patch.row_version {
            self.row_version = version;
        }
        self.updated_at = None;
    }
}
impl TryFrom<&Preferences> for PreferencesCache {
    type Error = Error;
    fn try_from(prefs: &Preferences) -> Result<Self, Self::Error> {
        Ok(Self {
            user_id: prefs.user_id,
            reading_mode: prefs.reading_mode,
            zen_restore_on_open: prefs.zen_restore_on_open,
            theme_mode: prefs.theme_mode,
            theme_overrides: prefs.theme_overrides.clone(),
            typography_profile: prefs.typography_profile,
            row_version: prefs.row_version.max(1),
            updated_at: parse_opt(prefs.updated_at.as_deref())
                .or_raise(|| ErrorKind::InvalidData("preferences updated_at"))?,
        })
    }
}

#[derive(sqlx::FromRow)]
pub(crate) struct PreferencesRow {
    pub(crate) user_id: String,
    pub(crate) reading_mode: String,
    pub(crate) zen_restore_on_open: bool,
    pub(crate) theme_mode: String,
    pub(crate) theme_overrides: String,
    pub(crate) typography_profile: String,
    pub(crate) row_version: i64,
    pub(crate) updated_at: String,
}
impl TryFrom<&PreferencesCache> for PreferencesRow {
    type Error = Error;
    fn try_from(prefs: &PreferencesCache) -> Result<Self, Self::Error> {
        Ok(Self {
            user_id: prefs.user_id.to_string(),
            reading_mode: prefs.reading_mode.to_string(),
            zen_restore_on_open: prefs.zen_restore_on_open,
            theme_mode: prefs.theme_mode.to_string(),
            theme_overrides: serde_json::to_string(&prefs.theme_overrides)
                .or_raise(|| ErrorKind::InvalidData("theme overrides"))?,
            typography_profile: prefs.typography_profile.to_string(),
            row_version: prefs.row_version,
            updated_at: timestamp::format(prefs.updated_at.unwrap_or_else(timestamp::now)),
        })
    }
}
impl TryFrom<PreferencesRow> for PreferencesCache {
    type Error = Error;
    fn try_from(row: PreferencesRow) -> Result<Self, Self::Error> {
        Ok(Self {
            user_id: parse_uuid(&row.user_id, "preferences user id")?,
            reading_mode: row.reading_mode.parse::<ReadingMode>().or_raise(|| ErrorKind::InvalidData("reading mode"))?,
            zen_restore_on_open: row.zen_restore_on_open,
            theme_mode: row.theme_mode.parse::<ThemeMode>().or_raise(|| ErrorKind::InvalidData("theme mode"))?,
            theme_overrides: serde_json::from_str(&row.theme_overrides)
                .or_raise(|| ErrorKind::InvalidData("theme overrides"))?,
            typography_profile: row
                .typography_profile
                .parse::<TypographyProfile>()
                .or_raise(|| ErrorKind::InvalidData("typography profile"))?,
            row_version: row.row_version,
            updated_at: Some(timestamp::parse(&row.updated_at)?),
        })
    }
}
