//! Colour palettes and layout spacing.

use libra_api::models::{ThemeMode, ThemeOverrides, ThemeToken, TypographyProfile};
use ratatui::style::{Color, Modifier, Style};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Theme {
    pub background: Color,
    pub text: Color,
    pub accent: Color,
    pub progress: Color,
}
impl Theme {
    pub fn palette(mode: ThemeMode) -> Self {
        match mode {
            ThemeMode::Light => Self {
                background: Color::Rgb(0xFA, 0xFA, 0xF7),
                text: Color::Rgb(0x22, 0x22, 0x22),
                accent: Color::Rgb(0x1F, 0x6F, 0xEB),
                progress: Color::Rgb(0x2E, 0x8B, 0x57),
            },
            ThemeMode::Dark => Self {
                background: Color::Rgb(0x16, 0x18, 0x1D),
                text: Color::Rgb(0xD8, 0xDA, 0xDE),
                accent: Color::Rgb(0x7A, 0xA2, 0xF7),
                progress: Color::Rgb(0x9E, 0xCE, 0x6A),
            },
            ThemeMode::Sepia => Self {
                background: Color::Rgb(0xF4, 0xEC, 0xD8),
                text: Color::Rgb(0x5B, 0x46, 0x36),
                accent: Color::Rgb(0xA0, 0x52, 0x2D),
                progress: Color::Rgb(0x8B, 0x73, 0x55),
            },
            ThemeMode::HighContrast => Self {
                background: Color::Black,
                text: Color::White,
                accent: Color::Yellow,
                progress: Color::Cyan,
            },
        }
    }

    /// The palette for `mode` with valid overrides applied; invalid ones are skipped.
    pub fn resolve(mode: ThemeMode, overrides: &ThemeOverrides) -> Self {
        let mut theme = Self::palette(mode);
        for (token, value) in overrides {
            if let Some(color) = parse_hex(value) {
                theme.set(*token, color);
            }
        }
        theme
    }

    pub fn get(&self, token: ThemeToken) -> Color {
        match token {
            ThemeToken::Background => self.background,
            ThemeToken::Text => self.text,
            ThemeToken::Accent => self.accent,
            ThemeToken::Progress => self.progress,
        }
    }

    pub fn set(&mut self, token: ThemeToken, color: Color) {
        match token {
            ThemeToken::Background => self.background = color,
            ThemeToken::Text => self.text = color,
            ThemeToken::Accent => self.accent = color,
            ThemeToken::Progress => self.progress = color,
        }
    }

    pub fn base(&self) -> Style {
        Style::default().fg(self.text).bg(self.background)
    }

    pub fn highlight(&self) -> Style {
        Style::default().fg(self.background).bg(self.accent).add_modifier(Modifier::BOLD)
    }

    pub fn accent(&self) -> Style {
        Style::default().fg(self.accent).bg(self.background)
    }

    pub fn muted(&self) -> Style {
        self.base().add_modifier(Modifier::DIM)
    }
}

/// `#RRGGBB` as an RGB colour.
pub fn parse_hex(value: &str) -> Option<Color> {
    if !libra_library::optimistic::is_hex_color(value) {
        return None;
    }
    let channel = |range| u8::from_str_radix(&value[range], 16).ok();
    Some(Color::Rgb(channel(1..3)?, channel(3..5)?, channel(5..7)?))
}

/// Blank rows above and below the reader text.
pub fn vertical_margin(profile: TypographyProfile) -> u16 {
    match profile {
        TypographyProfile::Compact => 0,
        TypographyProfile::Comfortable => 1,
        TypographyProfile::Large => 2,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    #[rstest]
    #[case("#FF8800", Some(Color::Rgb(0xFF, 0x88, 0x00)))]
    #[case("#0a0b0c", Some(Color::Rgb(0x0A, 0x0B, 0x0C)))]
    #[case("FF8800", None)]
    #[case("#FF88", None)]
    fn test_parse_hex(#[case] input: &str, #[case] expected: Option<Color>) {
        assert_eq!(parse_hex(input), expected);
    }

    #[test]
    fn test_overrides_replace_single_tokens() {
        let overrides = ThemeOverrides::from([
            (ThemeToken::Accent, "#FF0000".to_string()),
            (ThemeToken::Text, "not a colour".to_string()),
        ]);
        let theme = Theme::resolve(ThemeMode::Sepia, &overrides);
        let base = Theme::palette(ThemeMode::Sepia);
        assert_eq!(theme.accent, Color::Rgb(0xFF, 0, 0));
        assert_eq!(theme.text, base.text);
        assert_eq!(theme.background, base.background);
    }

    #[rstest]
    #[case(TypographyProfile::Compact, 0)]
    #[case(TypographyProfile::Comfortable, 1)]
    #[case(TypographyProfile::Large, 2)]
    fn test_vertical_margin(#[case] profile: TypographyProfile, #[case] rows: u16) {
        assert_eq!(vertical_margin(profile), rows);
    }
}
