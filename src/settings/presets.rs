//! Named presets that seed a section's content, behavior and style.

use serde::Serialize;
use serde_json::{json, Value};

use super::SectionKind;

/// A named starting point for a section's settings.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SectionPreset {
    pub name: &'static str,
    pub label: &'static str,
    pub description: &'static str,
    pub settings: Value,
}

/// Presets available for a section kind, in display order.
pub fn presets_for(kind: &SectionKind) -> Vec<SectionPreset> {
    match kind {
        SectionKind::Header => header_presets(),
        SectionKind::Hero => hero_presets(),
        _ => Vec::new(),
    }
}

/// Settings of the preset `name` for `section_type`, if it exists.
pub fn preset_settings(section_type: &str, name: &str) -> Option<Value> {
    presets_for(&SectionKind::from_type(section_type))
        .into_iter()
        .find(|p| p.name == name)
        .map(|p| p.settings)
}

fn header_presets() -> Vec<SectionPreset> {
    vec![
        SectionPreset {
            name: "classic",
            label: "Classic",
            description: "Logo on the left, menu inline, sticky on scroll",
            settings: json!({
                "content": { "showSearch": true, "showCart": true, "showAccount": true },
                "behavior": { "sticky": true, "transparentOnTop": false, "hideOnScroll": false },
                "style": { "layout": "logo-left", "height": 72, "borderBottom": true }
            }),
        },
        SectionPreset {
            name: "centered",
            label: "Centered",
            description: "Centered logo with the menu below",
            settings: json!({
                "content": { "showSearch": true, "showCart": true, "showAccount": false },
                "behavior": { "sticky": false, "transparentOnTop": false, "hideOnScroll": false },
                "style": { "layout": "logo-center", "height": 96, "borderBottom": true }
            }),
        },
        SectionPreset {
            name: "transparent",
            label: "Transparent",
            description: "Overlays the first section until the page scrolls",
            settings: json!({
                "behavior": { "sticky": true, "transparentOnTop": true, "hideOnScroll": true },
                "style": {
                    "layout": "logo-left",
                    "backgroundColor": "transparent",
                    "textColor": "#ffffff",
                    "borderBottom": false
                }
            }),
        },
        SectionPreset {
            name: "minimal",
            label: "Minimal",
            description: "Logo and cart only",
            settings: json!({
                "content": { "showSearch": false, "showCart": true, "showAccount": false },
                "style": { "layout": "minimal", "height": 56, "borderBottom": false }
            }),
        },
    ]
}

fn hero_presets() -> Vec<SectionPreset> {
    vec![
        SectionPreset {
            name: "centered",
            label: "Centered",
            description: "Centered heading over a background image",
            settings: json!({
                "style": { "layout": "centered", "minHeight": 480, "textAlign": "center" }
            }),
        },
        SectionPreset {
            name: "split",
            label: "Split",
            description: "Text on one side, image on the other",
            settings: json!({
                "behavior": { "parallax": false },
                "style": {
                    "layout": "split",
                    "minHeight": 420,
                    "overlayOpacity": 0.0,
                    "textColor": "#111111",
                    "textAlign": "left"
                }
            }),
        },
        SectionPreset {
            name: "fullscreen",
            label: "Fullscreen",
            description: "Full viewport image with parallax scrolling",
            settings: json!({
                "behavior": { "parallax": true },
                "style": { "layout": "fullscreen", "minHeight": 800, "overlayOpacity": 0.45 }
            }),
        },
    ]
}
