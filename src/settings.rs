//! Channel display settings

use serde::{Deserialize, Serialize};

/// Palette cycled through for channels without explicit settings (red, green, blue).
pub const DEFAULT_PALETTE: [[f64; 3]; 3] = [[1.0, 0.0, 0.0], [0.0, 1.0, 0.0], [0.0, 0.0, 1.0]];

/// Either a flat RGB color or an indexed color table, components in [0, 1].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum ChannelColor {
    Base([f64; 3]),
    Table(Vec<[f64; 3]>),
}

impl ChannelColor {
    /// Build a color from a flat component list: three values are a base
    /// color, any longer multiple of three is a table.
    pub fn from_components(values: &[f64]) -> Option<Self> {
        match values.len() {
            3 => Some(ChannelColor::Base([values[0], values[1], values[2]])),
            n if n > 3 && n % 3 == 0 => Some(ChannelColor::Table(
                values.chunks_exact(3).map(|c| [c[0], c[1], c[2]]).collect(),
            )),
            _ => None,
        }
    }

    /// Flat component list in r, g, b order.
    pub fn components(&self) -> Vec<f64> {
        match self {
            ChannelColor::Base(rgb) => rgb.to_vec(),
            ChannelColor::Table(table) => table.iter().flatten().copied().collect(),
        }
    }

    pub fn is_table(&self) -> bool {
        matches!(self, ChannelColor::Table(_))
    }
}

/// Display settings of one channel. Every field is independently optional so a
/// partial value can describe an update of a subset of the settings.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct ChannelSettings {
    pub name: Option<String>,
    pub description: Option<String>,
    pub color: Option<ChannelColor>,
    pub alpha: Option<f64>,
    pub range: Option<[f64; 2]>,
    pub gamma: Option<f64>,
}

impl ChannelSettings {
    /// Settings given to channel `index` when none are supplied.
    pub fn defaults(index: usize) -> Self {
        Self {
            name: Some(format!("ch {}", index + 1)),
            description: Some(String::new()),
            color: Some(ChannelColor::Base(
                DEFAULT_PALETTE[index % DEFAULT_PALETTE.len()],
            )),
            alpha: Some(1.0),
            range: Some([0.0, 255.0]),
            gamma: Some(1.0),
        }
    }

    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = Some(name.into());
        self
    }

    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = Some(description.into());
        self
    }

    pub fn with_color(mut self, color: ChannelColor) -> Self {
        self.color = Some(color);
        self
    }

    pub fn with_alpha(mut self, alpha: f64) -> Self {
        self.alpha = Some(alpha);
        self
    }

    pub fn with_range(mut self, min: f64, max: f64) -> Self {
        self.range = Some([min, max]);
        self
    }

    pub fn with_gamma(mut self, gamma: f64) -> Self {
        self.gamma = Some(gamma);
        self
    }

    /// Keep only the fields selected by `fields`.
    pub fn select(&self, fields: SettingsFields) -> Self {
        Self {
            name: self.name.clone().filter(|_| fields.name),
            description: self.description.clone().filter(|_| fields.description),
            color: self.color.clone().filter(|_| fields.color),
            alpha: self.alpha.filter(|_| fields.alpha),
            range: self.range.filter(|_| fields.range),
            gamma: self.gamma.filter(|_| fields.gamma),
        }
    }

    /// Which fields carry a value.
    pub fn present_fields(&self) -> SettingsFields {
        SettingsFields {
            name: self.name.is_some(),
            description: self.description.is_some(),
            color: self.color.is_some(),
            alpha: self.alpha.is_some(),
            range: self.range.is_some(),
            gamma: self.gamma.is_some(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.present_fields() == SettingsFields::NONE
    }
}

/// Mask of the settings fields a write applies.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct SettingsFields {
    pub name: bool,
    pub description: bool,
    pub color: bool,
    pub alpha: bool,
    pub range: bool,
    pub gamma: bool,
}

impl SettingsFields {
    pub const ALL: Self = Self {
        name: true,
        description: true,
        color: true,
        alpha: true,
        range: true,
        gamma: true,
    };

    pub const NONE: Self = Self {
        name: false,
        description: false,
        color: false,
        alpha: false,
        range: false,
        gamma: false,
    };

    pub fn with_name(mut self, on: bool) -> Self {
        self.name = on;
        self
    }

    pub fn with_description(mut self, on: bool) -> Self {
        self.description = on;
        self
    }

    pub fn with_color(mut self, on: bool) -> Self {
        self.color = on;
        self
    }

    pub fn with_alpha(mut self, on: bool) -> Self {
        self.alpha = on;
        self
    }

    pub fn with_range(mut self, on: bool) -> Self {
        self.range = on;
        self
    }

    pub fn with_gamma(mut self, on: bool) -> Self {
        self.gamma = on;
        self
    }
}

impl Default for SettingsFields {
    fn default() -> Self {
        Self::ALL
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_cycle_palette() {
        let first = ChannelSettings::defaults(0);
        let fourth = ChannelSettings::defaults(3);
        assert_eq!(first.name.as_deref(), Some("ch 1"));
        assert_eq!(fourth.name.as_deref(), Some("ch 4"));
        assert_eq!(first.color, fourth.color);
        assert_eq!(
            ChannelSettings::defaults(2).color,
            Some(ChannelColor::Base([0.0, 0.0, 1.0]))
        );
        assert_eq!(first.range, Some([0.0, 255.0]));
    }

    #[test]
    fn test_select_subset() {
        let settings = ChannelSettings::defaults(0);
        let alpha_only = settings.select(SettingsFields::NONE.with_alpha(true));
        assert_eq!(alpha_only.alpha, Some(1.0));
        assert!(alpha_only.name.is_none());
        assert!(alpha_only.color.is_none());
        assert_eq!(
            alpha_only.present_fields(),
            SettingsFields::NONE.with_alpha(true)
        );
    }

    #[test]
    fn test_color_from_components() {
        assert_eq!(
            ChannelColor::from_components(&[1.0, 0.5, 0.0]),
            Some(ChannelColor::Base([1.0, 0.5, 0.0]))
        );
        let table = ChannelColor::from_components(&[0.0, 0.0, 0.0, 1.0, 1.0, 1.0]).unwrap();
        assert!(table.is_table());
        assert_eq!(table.components().len(), 6);
        assert_eq!(ChannelColor::from_components(&[1.0, 0.5]), None);
    }
}
