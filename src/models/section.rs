//! Section instance model and the canonical resolved shape handed to callers.

use serde::{Deserialize, Serialize};
use serde_json::Value;

use super::BlockNode;

/// A persisted, positioned occurrence of a section type within a template.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SectionInstance {
    pub id: String,
    pub template_id: String,
    pub section_type: String,
    pub position: i64,
    pub enabled: bool,
    pub settings: Value,
    /// Top-level block rows, ordered by position.
    pub blocks: Vec<BlockNode>,
    pub created_at: String,
    pub updated_at: String,
}

/// A section as every caller sees it, regardless of whether it came from
/// persisted rows or the theme baseline.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ResolvedSection {
    pub id: String,
    #[serde(rename = "type")]
    pub section_type: String,
    pub title: String,
    #[serde(default = "empty_object")]
    pub settings: Value,
    #[serde(default = "default_enabled")]
    pub enabled: bool,
    pub position: i64,
    #[serde(default)]
    pub blocks: Vec<BlockNode>,
}

fn empty_object() -> Value {
    Value::Object(Default::default())
}

fn default_enabled() -> bool {
    true
}

impl ResolvedSection {
    /// Build the canonical shape, defaulting settings to `{}`.
    pub fn normalize(
        id: impl Into<String>,
        section_type: &str,
        settings: Option<Value>,
        enabled: Option<bool>,
        position: i64,
        blocks: Vec<BlockNode>,
    ) -> Self {
        let settings = match settings {
            Some(value @ Value::Object(_)) => value,
            _ => empty_object(),
        };
        Self {
            id: id.into(),
            section_type: section_type.to_string(),
            title: title_from_slug(section_type),
            settings,
            enabled: enabled.unwrap_or(true),
            position,
            blocks,
        }
    }
}

impl From<&SectionInstance> for ResolvedSection {
    fn from(section: &SectionInstance) -> Self {
        ResolvedSection::normalize(
            section.id.clone(),
            &section.section_type,
            Some(section.settings.clone()),
            Some(section.enabled),
            section.position,
            section.blocks.clone(),
        )
    }
}

/// `"featured-collection"` → `"Featured Collection"`.
pub fn title_from_slug(slug: &str) -> String {
    slug.split(['-', '_'])
        .filter(|word| !word.is_empty())
        .map(|word| {
            let mut chars = word.chars();
            match chars.next() {
                Some(first) => first.to_uppercase().chain(chars).collect::<String>(),
                None => String::new(),
            }
        })
        .collect::<Vec<_>>()
        .join(" ")
}

/// Request body for adding a section to a template.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AddSectionRequest {
    pub section_type: String,
    #[serde(default)]
    pub settings: Option<Value>,
    /// Insert at this index instead of appending.
    #[serde(default)]
    pub position: Option<i64>,
    /// Name of a preset seeding the settings before `settings` is applied.
    #[serde(default)]
    pub preset: Option<String>,
    #[serde(default)]
    pub enabled: Option<bool>,
    #[serde(default)]
    pub blocks: Option<Vec<BlockNode>>,
}

impl AddSectionRequest {
    pub fn of_type(section_type: &str) -> Self {
        Self {
            section_type: section_type.to_string(),
            settings: None,
            position: None,
            preset: None,
            enabled: None,
            blocks: None,
        }
    }
}

/// Request body for updating a section. Settings are merged into the existing ones.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UpdateSectionRequest {
    #[serde(default)]
    pub settings: Option<Value>,
    #[serde(default)]
    pub enabled: Option<bool>,
}

/// Request body for reordering the sections of a template.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ReorderSectionsRequest {
    pub section_ids: Vec<String>,
}
