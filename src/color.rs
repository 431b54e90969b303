//! Color values accepted by the style panel
//!
//! Colors arrive as strings from the UI (`#1e293b`, `#fff`, `white`, ...) and
//! are parsed once into RGBA so the render stages never deal with text.

use std::fmt;
use std::str::FromStr;

use image::Rgba;
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// An sRGB color with straight (non-premultiplied) alpha
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct Color {
    pub r: u8,
    pub g: u8,
    pub b: u8,
    pub a: u8,
}

#[derive(Debug, Error, PartialEq, Eq)]
#[error("invalid color `{0}`")]
pub struct ParseColorError(pub String);

impl Color {
    pub const BLACK: Color = Color::rgb(0, 0, 0);
    pub const WHITE: Color = Color::rgb(255, 255, 255);
    pub const TRANSPARENT: Color = Color { r: 0, g: 0, b: 0, a: 0 };

    pub const fn rgb(r: u8, g: u8, b: u8) -> Self {
        Self { r, g, b, a: 255 }
    }

    pub fn to_rgba(self) -> Rgba<u8> {
        Rgba([self.r, self.g, self.b, self.a])
    }

    pub fn is_opaque(self) -> bool {
        self.a == 255
    }

    /// Perceived brightness in `0.0..=255.0` (Rec.601 weights).
    pub fn luminance(self) -> f32 {
        luminance(self.to_rgba())
    }

    /// Linear interpolation between two colors, `t` clamped to `0..=1`.
    pub fn lerp(a: Color, b: Color, t: f64) -> Color {
        let t = t.clamp(0.0, 1.0);
        let mix = |x: u8, y: u8| (x as f64 + (y as f64 - x as f64) * t).round() as u8;
        Color {
            r: mix(a.r, b.r),
            g: mix(a.g, b.g),
            b: mix(a.b, b.b),
            a: mix(a.a, b.a),
        }
    }
}

/// Rec.601 luma of an RGBA pixel, ignoring alpha.
pub fn luminance(px: Rgba<u8>) -> f32 {
    0.299 * px[0] as f32 + 0.587 * px[1] as f32 + 0.114 * px[2] as f32
}

impl From<Rgba<u8>> for Color {
    fn from(px: Rgba<u8>) -> Self {
        Color { r: px[0], g: px[1], b: px[2], a: px[3] }
    }
}

fn named(name: &str) -> Option<Color> {
    let color = match name {
        "black" => Color::BLACK,
        "white" => Color::WHITE,
        "red" => Color::rgb(255, 0, 0),
        "green" => Color::rgb(0, 128, 0),
        "blue" => Color::rgb(0, 0, 255),
        "gray" | "grey" => Color::rgb(128, 128, 128),
        "yellow" => Color::rgb(255, 255, 0),
        "orange" => Color::rgb(255, 165, 0),
        "purple" => Color::rgb(128, 0, 128),
        "transparent" => Color::TRANSPARENT,
        _ => return None,
    };
    Some(color)
}

impl FromStr for Color {
    type Err = ParseColorError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let trimmed = s.trim();
        let err = || ParseColorError(s.to_string());

        let Some(hex) = trimmed.strip_prefix('#') else {
            return named(&trimmed.to_ascii_lowercase()).ok_or_else(err);
        };
        if !hex.chars().all(|c| c.is_ascii_hexdigit()) {
            return Err(err());
        }

        // Short forms double each nibble: #abc == #aabbcc
        let expanded: String = match hex.len() {
            3 | 4 => hex.chars().flat_map(|c| [c, c]).collect(),
            6 | 8 => hex.to_string(),
            _ => return Err(err()),
        };
        let channel = |i: usize| u8::from_str_radix(&expanded[i..i + 2], 16).map_err(|_| err());

        Ok(Color {
            r: channel(0)?,
            g: channel(2)?,
            b: channel(4)?,
            a: if expanded.len() == 8 { channel(6)? } else { 255 },
        })
    }
}

impl TryFrom<String> for Color {
    type Error = ParseColorError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

impl From<Color> for String {
    fn from(color: Color) -> Self {
        color.to_string()
    }
}

impl fmt::Display for Color {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{:02x}{:02x}{:02x}", self.r, self.g, self.b)?;
        if self.a != 255 {
            write!(f, "{:02x}", self.a)?;
        }
        Ok(())
    }
}
