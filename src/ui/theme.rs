use crate::domain::Row;
use crate::infra::ColorsConfig;
use ratatui::style::Color;

pub const ACCENT: Color = Color::Rgb(255, 159, 26);
pub const MUTED: Color = Color::Rgb(156, 163, 175);
pub const BORDER: Color = Color::Rgb(55, 65, 81);
pub const SUCCESS: Color = Color::Rgb(134, 239, 172); // running indicator
pub const ERROR: Color = Color::Rgb(248, 113, 113);
pub const SELECTED_FG: Color = Color::Rgb(1, 190, 133);
pub const SELECTED_BG: Color = Color::Rgb(0, 67, 47);

#[derive(Clone, Debug, Eq, PartialEq)]
pub struct TagRule {
    pub needle: String,
    pub color: Color,
}

/// Table colors resolved from the config file.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct Theme {
    pub header: Color,
    pub even: Color,
    pub odd: Color,
    pub tag_rules: Vec<TagRule>,
}

impl Default for Theme {
    fn default() -> Self {
        Self::from_config(&ColorsConfig::default())
    }
}

impl Theme {
    pub fn from_config(colors: &ColorsConfig) -> Self {
        Self {
            header: parse_color(&colors.table.header).unwrap_or(Color::Rgb(238, 238, 238)),
            even: parse_color(&colors.table.even).unwrap_or(Color::Rgb(128, 128, 128)),
            odd: parse_color(&colors.table.odd).unwrap_or(Color::Rgb(238, 238, 238)),
            tag_rules: colors
                .tags
                .iter()
                .filter_map(|rule| {
                    Some(TagRule {
                        needle: format!("{}:{}", rule.tag_name, rule.tag_value),
                        color: parse_color(&rule.color)?,
                    })
                })
                .collect(),
        }
    }

    /// First matching tag rule wins; otherwise rows alternate.
    pub fn row_color(&self, row: &Row, index: usize) -> Color {
        if let Some(rule) = self
            .tag_rules
            .iter()
            .find(|rule| row.tags.contains(rule.needle.as_str()))
        {
            return rule.color;
        }
        if index % 2 == 0 { self.even } else { self.odd }
    }
}

/// `#RRGGBB` or a 256-color index such as `252`.
pub fn parse_color(value: &str) -> Option<Color> {
    let value = value.trim();
    if let Some(hex) = value.strip_prefix('#') {
        if hex.len() != 6 || !hex.is_ascii() {
            return None;
        }
        let channel = |range: std::ops::Range<usize>| u8::from_str_radix(&hex[range], 16).ok();
        return Some(Color::Rgb(channel(0..2)?, channel(2..4)?, channel(4..6)?));
    }
    value.parse::<u8>().ok().map(Color::Indexed)
}
