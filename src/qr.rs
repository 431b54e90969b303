//! The QR code description edited by the user
//!
//! A [`QrSpec`] is an immutable snapshot: every edit in the UI builds a new one
//! and hands it to the renderer. Style defaults are resolved once, when the
//! spec is deserialized or constructed, so the render stages never see a
//! missing field.

use std::fmt;
use std::path::PathBuf;

use serde::{Deserialize, Serialize};

use crate::color::Color;
use crate::error::RenderError;

/// What kind of payload the QR code carries
///
/// Only used to pick a starter payload and for display; the encoder always
/// receives `content` verbatim.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ContentType {
    #[default]
    Url,
    Text,
    Email,
    Phone,
    Wifi,
}

impl ContentType {
    /// Placeholder content shown when the user switches to this type
    pub fn default_content(self) -> &'static str {
        match self {
            ContentType::Url => "https://example.com",
            ContentType::Text => "Hello World",
            ContentType::Email => "hello@example.com",
            ContentType::Phone => "+1234567890",
            ContentType::Wifi => "WIFI:T:WPA;S:NetworkName;P:Password;;",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum WifiAuth {
    #[default]
    #[serde(rename = "WPA")]
    Wpa,
    #[serde(rename = "WEP")]
    Wep,
    #[serde(rename = "nopass")]
    NoPass,
}

impl fmt::Display for WifiAuth {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            WifiAuth::Wpa => "WPA",
            WifiAuth::Wep => "WEP",
            WifiAuth::NoPass => "nopass",
        })
    }
}

/// Network details for the `WIFI:` payload understood by phone cameras
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WifiCredentials {
    #[serde(default)]
    pub auth: WifiAuth,
    pub ssid: String,
    #[serde(default)]
    pub password: String,
    #[serde(default)]
    pub hidden: bool,
}

impl WifiCredentials {
    pub fn to_payload(&self) -> String {
        let mut out = format!("WIFI:T:{};S:{};", self.auth, escape_wifi(&self.ssid));
        if self.auth != WifiAuth::NoPass {
            out.push_str(&format!("P:{};", escape_wifi(&self.password)));
        }
        if self.hidden {
            out.push_str("H:true;");
        }
        out.push(';');
        out
    }
}

fn escape_wifi(value: &str) -> String {
    let mut out = String::with_capacity(value.len());
    for c in value.chars() {
        if matches!(c, '\\' | ';' | ',' | ':' | '"') {
            out.push('\\');
        }
        out.push(c);
    }
    out
}

/// Module silhouette. Never changes which modules are dark.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Shape {
    #[default]
    Square,
    Rounded,
    Dots,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum EcLevel {
    L,
    #[default]
    M,
    Q,
    H,
}

/// Logo edge length as a percentage of the canvas, always within 10..=40
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(from = "u32", into = "u32")]
pub struct LogoSize(u32);

impl LogoSize {
    pub const MIN: u32 = 10;
    pub const MAX: u32 = 40;
    pub const DEFAULT: LogoSize = LogoSize(20);

    /// Out-of-range values are clamped, never rejected.
    pub fn new(percent: u32) -> Self {
        LogoSize(percent.clamp(Self::MIN, Self::MAX))
    }

    pub fn percent(self) -> u32 {
        self.0
    }

    pub fn pixels(self, canvas: u32) -> u32 {
        canvas * self.0 / 100
    }
}

impl Default for LogoSize {
    fn default() -> Self {
        Self::DEFAULT
    }
}

impl From<u32> for LogoSize {
    fn from(percent: u32) -> Self {
        LogoSize::new(percent)
    }
}

impl From<LogoSize> for u32 {
    fn from(size: LogoSize) -> Self {
        size.0
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct GradientPair {
    pub start: Color,
    pub end: Color,
}

impl GradientPair {
    pub const DEFAULT: GradientPair = GradientPair {
        start: Color::rgb(0x8b, 0x5c, 0xf6),
        end: Color::rgb(0x3b, 0x82, 0xf6),
    };

    /// Builds a pair from whatever the UI sent; missing slots take the default.
    pub fn from_slots(colors: &[Color]) -> Self {
        GradientPair {
            start: colors.first().copied().unwrap_or(Self::DEFAULT.start),
            end: colors.get(1).copied().unwrap_or(Self::DEFAULT.end),
        }
    }
}

impl Default for GradientPair {
    fn default() -> Self {
        Self::DEFAULT
    }
}

/// Reference to an uploaded image
///
/// The browser hands over `data:` URLs; server-side callers may also point at
/// a file on disk.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum AssetRef {
    DataUrl(String),
    Path(PathBuf),
}

impl From<String> for AssetRef {
    fn from(value: String) -> Self {
        if value.starts_with("data:") {
            AssetRef::DataUrl(value)
        } else {
            AssetRef::Path(PathBuf::from(value))
        }
    }
}

impl From<AssetRef> for String {
    fn from(asset: AssetRef) -> Self {
        match asset {
            AssetRef::DataUrl(url) => url,
            AssetRef::Path(path) => path.to_string_lossy().into_owned(),
        }
    }
}

impl fmt::Display for AssetRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            // data URLs can be megabytes long
            AssetRef::DataUrl(url) => write!(f, "{}…", url.chars().take(32).collect::<String>()),
            AssetRef::Path(path) => write!(f, "{}", path.display()),
        }
    }
}

/// Fully resolved visual style
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(from = "StyleDraft")]
pub struct QrStyle {
    pub foreground_color: Color,
    pub background_color: Color,
    pub shape: Shape,
    pub error_correction_level: EcLevel,
    pub use_gradient: bool,
    pub gradient_colors: GradientPair,
    pub custom_background: Option<AssetRef>,
    pub logo: Option<AssetRef>,
    pub logo_size: LogoSize,
}

impl QrStyle {
    pub const DEFAULT_FOREGROUND: Color = Color::rgb(0x1e, 0x29, 0x3b);
    pub const DEFAULT_BACKGROUND: Color = Color::WHITE;

    /// Background image and logo, whichever are set
    pub fn assets(&self) -> impl Iterator<Item = &AssetRef> {
        self.custom_background.iter().chain(self.logo.iter())
    }
}

impl Default for QrStyle {
    fn default() -> Self {
        StyleDraft::default().into()
    }
}

/// Style as it arrives from the UI, every field optional
#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct StyleDraft {
    foreground_color: Option<Color>,
    background_color: Option<Color>,
    shape: Option<Shape>,
    error_correction_level: Option<EcLevel>,
    use_gradient: Option<bool>,
    gradient_colors: Option<GradientInput>,
    custom_background: Option<AssetRef>,
    logo: Option<AssetRef>,
    logo_size: Option<u32>,
}

/// Accepts both the UI's `[start, end]` array and the serialized object form.
#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum GradientInput {
    Slots(Vec<Color>),
    Pair(GradientPair),
}

impl From<StyleDraft> for QrStyle {
    fn from(draft: StyleDraft) -> Self {
        let gradient_colors = match draft.gradient_colors {
            Some(GradientInput::Slots(colors)) => GradientPair::from_slots(&colors),
            Some(GradientInput::Pair(pair)) => pair,
            None => GradientPair::DEFAULT,
        };

        QrStyle {
            foreground_color: draft.foreground_color.unwrap_or(Self::DEFAULT_FOREGROUND),
            background_color: draft.background_color.unwrap_or(Self::DEFAULT_BACKGROUND),
            shape: draft.shape.unwrap_or_default(),
            error_correction_level: draft.error_correction_level.unwrap_or_default(),
            use_gradient: draft.use_gradient.unwrap_or(false),
            gradient_colors,
            custom_background: draft.custom_background,
            logo: draft.logo,
            logo_size: draft.logo_size.map(LogoSize::new).unwrap_or_default(),
        }
    }
}

/// Complete description of one QR code to render
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct QrSpec {
    #[serde(default)]
    pub content_type: ContentType,
    pub content: String,
    #[serde(default)]
    pub style: QrStyle,
}

impl QrSpec {
    pub fn new(content_type: ContentType, content: impl Into<String>) -> Self {
        Self {
            content_type,
            content: content.into(),
            style: QrStyle::default(),
        }
    }

    pub fn with_style(mut self, style: QrStyle) -> Self {
        self.style = style;
        self
    }

    /// A renderable spec has non-blank content; nothing else is checked.
    pub fn validate(&self) -> Result<(), RenderError> {
        if self.content.trim().is_empty() {
            return Err(RenderError::InvalidInput("content must not be empty".into()));
        }
        Ok(())
    }
}

impl Default for QrSpec {
    fn default() -> Self {
        QrSpec::new(ContentType::Url, ContentType::Url.default_content())
    }
}
