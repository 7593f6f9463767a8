use crate::error::{Error, ErrorKind};
use crate::timestamp;
use exn::ResultExt;
use std::fmt::{self, Display, Formatter};
use std::str::FromStr;
use time::UtcDateTime;

/// Horizontal padding around centred content.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash)]
pub enum GutterPreset {
    None,
    Narrow,
    #[default]
    Comfortable,
    Wide,
}
impl GutterPreset {
    pub const ALL: &'static [Self] = &[Self::None, Self::Narrow, Self::Comfortable, Self::Wide];

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::None => "none",
            Self::Narrow => "narrow",
            Self::Comfortable => "comfortable",
            Self::Wide => "wide",
        }
    }

    /// Columns of padding on each side.
    pub fn columns(&self) -> u16 {
        match self {
            Self::None => 0,
            Self::Narrow => 2,
            Self::Comfortable => 6,
            Self::Wide => 12,
        }
    }

    pub fn next(&self) -> Self {
        match self {
            Self::None => Self::Narrow,
            Self::Narrow => Self::Comfortable,
            Self::Comfortable => Self::Wide,
            Self::Wide => Self::None,
        }
    }
}
impl FromStr for GutterPreset {
    type Err = Error;
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Ok(match s.trim().to_ascii_lowercase().as_str() {
            "none" => Self::None,
            "narrow" => Self::Narrow,
            "comfortable" => Self::Comfortable,
            "wide" => Self::Wide,
            _ => exn::bail!(ErrorKind::InvalidData("gutter preset")),
        })
    }
}
impl Display for GutterPreset {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Settings that never leave this machine.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct UiSettings {
    pub gutter_preset: GutterPreset,
    pub updated_at: Option<UtcDateTime>,
}

#[derive(sqlx::FromRow)]
pub(crate) struct UiSettingsRow {
    pub(crate) gutter_preset: String,
    pub(crate) updated_at: String,
}
impl From<&UiSettings> for UiSettingsRow {
    fn from(settings: &UiSettings) -> Self {
        Self {
            gutter_preset: settings.gutter_preset.to_string(),
            updated_at: timestamp::format(settings.updated_at.unwrap_or_else(timestamp::now)),
        }
    }
}
impl TryFrom<UiSettingsRow> for UiSettings {
    type Error = Error;
    fn try_from(row: UiSettingsRow) -> Result<Self, Self::Error> {
        Ok(Self {
            gutter_preset: row.gutter_preset.parse::<GutterPreset>()?,
            updated_at: Some(timestamp::parse(&row.updated_at).or_raise(|| ErrorKind::InvalidData("ui settings"))?),
        })
    }
}
