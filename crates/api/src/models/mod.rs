//! Wire models. Field names follow the server's camelCase JSON; timestamps are
//! carried as the RFC3339 strings the server sends.

/// Closed string enums shared by the wire format and the local store.
///
/// Generates `as_str()`, `ALL`, `next()` (cyclic), [`FromStr`](std::str::FromStr)
/// and [`Display`](std::fmt::Display), with serde using the same strings.
macro_rules! wire_enum {
    (
        $(#[$meta:meta])*
        $name:ident { $($(#[$vmeta:meta])* $variant:ident => $value:literal),+ $(,)? }
    ) => {
        $(#[$meta])*
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, ::serde::Serialize, ::serde::Deserialize)]
        pub enum $name {
            $($(#[$vmeta])* #[serde(rename = $value)] $variant),+
        }
        impl $name {
            pub const ALL: &'static [Self] = &[$(Self::$variant),+];

            pub fn as_str(&self) -> &'static str {
                match self {
                    $(Self::$variant => $value),+
                }
            }

            /// The following variant, wrapping around at the end.
            pub fn next(&self) -> Self {
                let index = Self::ALL.iter().position(|v| v == self).unwrap_or_default();
                Self::ALL[(index + 1) % Self::ALL.len()]
            }
        }
        impl ::std::str::FromStr for $name {
            type Err = $crate::error::Error;
            fn from_str(s: &str) -> ::std::result::Result<Self, Self::Err> {
                match s.trim().to_ascii_lowercase().as_str() {
                    $($value => Ok(Self::$variant),)+
                    _ => ::exn::bail!($crate::error::ErrorKind::Validation(format!(
                        concat!("unknown ", stringify!($name), ": {}"),
                        s
                    ))),
                }
            }
        }
        impl ::std::fmt::Display for $name {
            fn fmt(&self, f: &mut ::std::fmt::Formatter<'_>) -> ::std::fmt::Result {
                f.write_str(self.as_str())
            }
        }
    };
}
pub(crate) use wire_enum;

mod auth;
mod ebook;
mod reader;
mod share;
mod sync;

pub use self::auth::{DevicePoll, DeviceResult, DeviceStart, DeviceStatus, LoginRequest, RegisterRequest, TokenValue, User};
pub use self::ebook::{CreateEbook, Ebook, Page};
pub use self::reader::{
    Preferences, PreferencesPatch, ReaderState, ReaderStatePatch, ReadingMode, ThemeMode, ThemeOverrides, ThemeToken,
    TypographyProfile,
};
pub use self::share::{Borrow, Report, ReportRequest, Review, ReviewRequest, Share};
pub use self::sync::{EntityType, Operation, SyncEvent, SyncEventAck};
