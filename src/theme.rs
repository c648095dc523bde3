//! UI colors, with optional hex overrides from the `[theme]` config table

use ratatui::style::Color;
use std::collections::BTreeMap;

/// Theme colors for the UI
#[derive(Debug, Clone)]
pub struct Theme {
    pub accent: Color,           // Active borders, selected slot, key hints
    pub accent_bright: Color,    // File names in filled slots
    pub danger: Color,           // Errors, remove actions
    pub success: Color,          // Filled slots, finished preview
    pub warning: Color,          // Status messages, out-of-canvas slots
    pub text: Color,             // Primary text
    pub text_dim: Color,         // Secondary text
    pub bg_selected: Color,      // Selection background
    pub inactive: Color,         // Inactive borders
    pub header: Color,           // Section headers in help
}

impl Default for Theme {
    fn default() -> Self {
        // Catppuccin-inspired colors
        Self {
            accent: Color::Rgb(250, 179, 135),
            accent_bright: Color::Rgb(245, 194, 231),
            danger: Color::Rgb(243, 139, 168),
            success: Color::Rgb(166, 218, 149),
            warning: Color::Rgb(250, 179, 135),
            text: Color::Rgb(205, 214, 244),
            text_dim: Color::Rgb(147, 153, 178),
            bg_selected: Color::Rgb(69, 71, 90),
            inactive: Color::Rgb(88, 91, 112),
            header: Color::Rgb(243, 139, 168),
        }
    }
}

impl Theme {
    /// Defaults with any valid overrides applied; unknown keys and bad colors are logged and skipped
    pub fn load(overrides: &BTreeMap<String, String>) -> Self {
        let mut theme = Self::default();

        for (role, value) in overrides {
            let Some(color) = Self::parse_hex_color(value) else {
                tracing::warn!("Ignoring theme.{}: '{}' is not a hex color", role, value);
                continue;
            };

            let slot = match role.as_str() {
                "accent" => &mut theme.accent,
                "accent_bright" => &mut theme.accent_bright,
                "danger" => &mut theme.danger,
                "success" => &mut theme.success,
                "warning" => &mut theme.warning,
                "text" => &mut theme.text,
                "text_dim" => &mut theme.text_dim,
                "bg_selected" => &mut theme.bg_selected,
                "inactive" => &mut theme.inactive,
                "header" => &mut theme.header,
                _ => {
                    tracing::warn!("Unknown theme color '{}'", role);
                    continue;
                }
            };
            *slot = color;
        }

        theme
    }

    /// Parse a hex color string (#RRGGBB or #RGB)
    fn parse_hex_color(s: &str) -> Option<Color> {
        let s = s.trim().trim_start_matches('#');

        if !s.is_ascii() {
            return None;
        }

        if s.len() == 6 {
            let r = u8::from_str_radix(&s[0..2], 16).ok()?;
            let g = u8::from_str_radix(&s[2..4], 16).ok()?;
            let b = u8::from_str_radix(&s[4..6], 16).ok()?;
            Some(Color::Rgb(r, g, b))
        } else if s.len() == 3 {
            let r = u8::from_str_radix(&s[0..1], 16).ok()? * 17;
            let g = u8::from_str_radix(&s[1..2], 16).ok()? * 17;
            let b = u8::from_str_radix(&s[2..3], 16).ok()? * 17;
            Some(Color::Rgb(r, g, b))
        } else {
            None
        }
    }
}
