//! Typed section settings.
//!
//! Section settings travel as JSON objects, but each known section kind has a
//! strongly typed contract. [`SectionSettings::parse`] checks a payload against
//! that contract and fills in defaults; unknown kinds pass through untouched as
//! [`SectionSettings::Custom`].

mod presets;

pub use presets::*;

use serde::{de::DeserializeOwned, Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::errors::AppError;

/// The closed set of section kinds with a typed settings contract.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum SectionKind {
    Header,
    Hero,
    RichText,
    FeaturedCollection,
    Footer,
    Custom(String),
}

impl SectionKind {
    pub fn from_type(section_type: &str) -> Self {
        match section_type {
            "header" => SectionKind::Header,
            "hero" => SectionKind::Hero,
            "rich-text" => SectionKind::RichText,
            "featured-collection" => SectionKind::FeaturedCollection,
            "footer" => SectionKind::Footer,
            other => SectionKind::Custom(other.to_string()),
        }
    }

    pub fn as_str(&self) -> &str {
        match self {
            SectionKind::Header => "header",
            SectionKind::Hero => "hero",
            SectionKind::RichText => "rich-text",
            SectionKind::FeaturedCollection => "featured-collection",
            SectionKind::Footer => "footer",
            SectionKind::Custom(name) => name,
        }
    }
}

// ---------------------------------------------------------------------------
// Header
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct HeaderSettings {
    pub content: HeaderContent,
    pub behavior: HeaderBehavior,
    pub style: HeaderStyle,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct HeaderContent {
    pub logo_text: Option<String>,
    pub logo_image: Option<String>,
    pub menu: Vec<MenuLink>,
    pub show_search: bool,
    pub show_cart: bool,
    pub show_account: bool,
    pub announcement: Option<String>,
}

impl Default for HeaderContent {
    fn default() -> Self {
        Self {
            logo_text: None,
            logo_image: None,
            menu: Vec::new(),
            show_search: true,
            show_cart: true,
            show_account: true,
            announcement: None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MenuLink {
    pub label: String,
    pub url: String,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct HeaderBehavior {
    pub sticky: bool,
    pub transparent_on_top: bool,
    pub hide_on_scroll: bool,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum HeaderLayout {
    #[default]
    LogoLeft,
    LogoCenter,
    Minimal,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct HeaderStyle {
    pub layout: HeaderLayout,
    pub background_color: String,
    pub text_color: String,
    pub height: u32,
    pub border_bottom: bool,
}

impl Default for HeaderStyle {
    fn default() -> Self {
        Self {
            layout: HeaderLayout::LogoLeft,
            background_color: "#ffffff".to_string(),
            text_color: "#111111".to_string(),
            height: 72,
            border_bottom: true,
        }
    }
}

// ---------------------------------------------------------------------------
// Hero
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct HeroSettings {
    pub content: HeroContent,
    pub behavior: HeroBehavior,
    pub style: HeroStyle,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct HeroContent {
    pub heading: String,
    pub subheading: Option<String>,
    pub button_label: Option<String>,
    pub button_url: Option<String>,
    pub image: Option<String>,
}

impl Default for HeroContent {
    fn default() -> Self {
        Self {
            heading: "Welcome to our store".to_string(),
            subheading: None,
            button_label: Some("Shop now".to_string()),
            button_url: Some("/collections/all".to_string()),
            image: None,
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct HeroBehavior {
    pub parallax: bool,
    pub autoplay_video: bool,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum HeroLayout {
    #[default]
    Centered,
    Split,
    Fullscreen,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct HeroStyle {
    pub layout: HeroLayout,
    pub min_height: u32,
    pub overlay_opacity: f32,
    pub text_color: String,
    pub text_align: TextAlign,
}

impl Default for HeroStyle {
    fn default() -> Self {
        Self {
            layout: HeroLayout::Centered,
            min_height: 480,
            overlay_opacity: 0.3,
            text_color: "#ffffff".to_string(),
            text_align: TextAlign::Center,
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TextAlign {
    Left,
    #[default]
    Center,
    Right,
}

// ---------------------------------------------------------------------------
// Smaller kinds
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct RichTextSettings {
    pub heading: Option<String>,
    pub body: String,
    pub text_align: TextAlign,
    pub narrow: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct FeaturedCollectionSettings {
    pub heading: String,
    pub collection: Option<String>,
    pub products_to_show: u32,
    pub columns: u32,
    pub show_view_all: bool,
}

impl Default for FeaturedCollectionSettings {
    fn default() -> Self {
        Self {
            heading: "Featured collection".to_string(),
            collection: None,
            products_to_show: 8,
            columns: 4,
            show_view_all: true,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct FooterSettings {
    pub copyright: Option<String>,
    pub links: Vec<MenuLink>,
    pub show_newsletter: bool,
    pub show_payment_icons: bool,
}

impl Default for FooterSettings {
    fn default() -> Self {
        Self {
            copyright: None,
            links: Vec::new(),
            show_newsletter: true,
            show_payment_icons: true,
        }
    }
}

// ---------------------------------------------------------------------------
// SectionSettings
// ---------------------------------------------------------------------------

/// Settings tagged by their section kind.
#[derive(Debug, Clone, PartialEq)]
pub enum SectionSettings {
    Header(HeaderSettings),
    Hero(HeroSettings),
    RichText(RichTextSettings),
    FeaturedCollection(FeaturedCollectionSettings),
    Footer(FooterSettings),
    /// Unknown kinds keep their settings as-is.
    Custom(Map<String, Value>),
}

impl SectionSettings {
    /// Parse `value` against the contract of `section_type`.
    ///
    /// Missing fields take their defaults; a field of the wrong shape is a
    /// validation failure. Keys outside the typed contract are dropped for known
    /// kinds.
    pub fn parse(section_type: &str, value: &Value) -> Result<Self, AppError> {
        let value = match value {
            Value::Null => Value::Object(Map::new()),
            Value::Object(_) => value.clone(),
            _ => {
                return Err(AppError::Validation(format!(
                    "Settings for section type '{}' must be an object",
                    section_type
                )))
            }
        };

        let settings = match SectionKind::from_type(section_type) {
            SectionKind::Header => SectionSettings::Header(typed(section_type, value)?),
            SectionKind::Hero => SectionSettings::Hero(typed(section_type, value)?),
            SectionKind::RichText => SectionSettings::RichText(typed(section_type, value)?),
            SectionKind::FeaturedCollection => {
                SectionSettings::FeaturedCollection(typed(section_type, value)?)
            }
            SectionKind::Footer => SectionSettings::Footer(typed(section_type, value)?),
            SectionKind::Custom(_) => match value {
                Value::Object(map) => SectionSettings::Custom(map),
                _ => SectionSettings::Custom(Map::new()),
            },
        };
        Ok(settings)
    }

    pub fn kind(&self) -> Option<SectionKind> {
        match self {
            SectionSettings::Header(_) => Some(SectionKind::Header),
            SectionSettings::Hero(_) => Some(SectionKind::Hero),
            SectionSettings::RichText(_) => Some(SectionKind::RichText),
            SectionSettings::FeaturedCollection(_) => Some(SectionKind::FeaturedCollection),
            SectionSettings::Footer(_) => Some(SectionKind::Footer),
            SectionSettings::Custom(_) => None,
        }
    }

    pub fn to_value(&self) -> Value {
        let value = match self {
            SectionSettings::Header(s) => serde_json::to_value(s),
            SectionSettings::Hero(s) => serde_json::to_value(s),
            SectionSettings::RichText(s) => serde_json::to_value(s),
            SectionSettings::FeaturedCollection(s) => serde_json::to_value(s),
            SectionSettings::Footer(s) => serde_json::to_value(s),
            SectionSettings::Custom(map) => Ok(Value::Object(map.clone())),
        };
        // Serializing plain structs into a Value cannot fail.
        value.unwrap_or_else(|_| Value::Object(Map::new()))
    }
}

fn typed<T: DeserializeOwned>(section_type: &str, value: Value) -> Result<T, AppError> {
    serde_json::from_value(value).map_err(|e| {
        AppError::Validation(format!(
            "Invalid settings for section type '{}': {}",
            section_type, e
        ))
    })
}

/// Normalize `value` through the typed contract and back to JSON.
pub fn normalize_settings(section_type: &str, value: &Value) -> Result<Value, AppError> {
    Ok(SectionSettings::parse(section_type, value)?.to_value())
}

/// Deep-merge `overlay` onto `base`. Objects merge key by key, anything else in
/// `overlay` replaces the base value. An explicit `null` clears the key.
pub fn merge_settings(base: &Value, overlay: &Value) -> Value {
    match (base, overlay) {
        (Value::Object(base_map), Value::Object(overlay_map)) => {
            let mut merged = base_map.clone();
            for (key, value) in overlay_map {
                let next = match merged.get(key) {
                    Some(existing) => merge_settings(existing, value),
                    None => value.clone(),
                };
                merged.insert(key.clone(), next);
            }
            Value::Object(merged)
        }
        _ => overlay.clone(),
    }
}
