use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use uuid::Uuid;

use super::ebook::first_version;
use super::wire_enum;

wire_enum! {
    ReadingMode {
        Normal => "normal",
        Zen => "zen",
    }
}
impl Default for ReadingMode {
    fn default() -> Self {
        Self::Normal
    }
}

wire_enum! {
    ThemeMode {
        Light => "light",
        Dark => "dark",
        Sepia => "sepia",
        HighContrast => "high_contrast",
    }
}
impl Default for ThemeMode {
    fn default() -> Self {
        Self::Dark
    }
}

wire_enum! {
    /// A colour slot that a theme override can replace.
    ThemeToken {
        Background => "background",
        Text => "text",
        Accent => "accent",
        Progress => "progress",
    }
}

wire_enum! {
    TypographyProfile {
        Compact => "compact",
        Comfortable => "comfortable",
        Large => "large",
    }
}
impl Default for TypographyProfile {
    fn default() -> Self {
        Self::Comfortable
    }
}

/// Per-token `#RRGGBB` colour overrides.
pub type ThemeOverrides = BTreeMap<ThemeToken, String>;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Preferences {
    pub user_id: Uuid,
    #[serde(default)]
    pub reading_mode: ReadingMode,
    #[serde(default)]
    pub zen_restore_on_open: bool,
    #[serde(default)]
    pub theme_mode: ThemeMode,
    #[serde(default)]
    pub theme_overrides: ThemeOverrides,
    #[serde(default)]
    pub typography_profile: TypographyProfile,
    #[serde(default = "first_version")]
    pub row_version: i64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub updated_at: Option<String>,
}

/// Body of `PATCH /reader/preferences`; unset fields are left alone.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PreferencesPatch {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reading_mode: Option<ReadingMode>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub zen_restore_on_open: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub theme_mode: Option<ThemeMode>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub theme_overrides: Option<ThemeOverrides>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub typography_profile: Option<TypographyProfile>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub row_version: Option<i64>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ReaderState {
    pub user_id: Uuid,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub current_ebook_id: Option<Uuid>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub current_location: Option<String>,
    #[serde(default)]
    pub reading_mode: ReadingMode,
    #[serde(default = "first_version")]
    pub row_version: i64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_opened_at: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub updated_at: Option<String>,
}

/// Body of `PATCH /reader/state`; unset fields are left alone.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ReaderStatePatch {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub current_ebook_id: Option<Uuid>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub current_location: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reading_mode: Option<ReadingMode>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_opened_at: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub row_version: Option<i64>,
}
