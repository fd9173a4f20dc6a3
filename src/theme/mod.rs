//! Static theme catalog.
//!
//! Themes are shared, read-only catalogs of section types and default templates.
//! The built-in themes are compiled into the binary; more can be loaded from a
//! directory of JSON files at startup.

use std::collections::{BTreeMap, HashMap};
use std::path::Path;

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::errors::AppError;
use crate::models::{BlockNode, ResolvedSection};
use crate::settings::{merge_settings, normalize_settings};

const BUILTIN_THEMES: &[&str] = &[
    include_str!("../../themes/aurora.json"),
    include_str!("../../themes/minimal.json"),
];

/// Definition of one section type offered by a theme.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SectionSchema {
    pub name: String,
    #[serde(default)]
    pub category: Option<String>,
    #[serde(default = "empty_object")]
    pub default_settings: Value,
    /// Required sections cannot be removed from a template.
    #[serde(default)]
    pub required: bool,
    /// Singleton sections may appear at most once per template.
    #[serde(default)]
    pub singleton: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_blocks: Option<usize>,
    /// Allowed top-level block types; empty means any.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub block_types: Vec<String>,
}

/// One section in a theme's default template.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TemplateSectionDef {
    #[serde(rename = "type")]
    pub section_type: String,
    #[serde(default)]
    pub settings: Option<Value>,
    #[serde(default)]
    pub enabled: Option<bool>,
    #[serde(default)]
    pub blocks: Vec<BlockNode>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TemplateDefinition {
    #[serde(default)]
    pub sections: Vec<TemplateSectionDef>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ThemeDefinition {
    pub id: String,
    pub name: String,
    pub version: String,
    #[serde(default = "empty_object")]
    pub settings: Value,
    pub sections: BTreeMap<String, SectionSchema>,
    #[serde(default)]
    pub templates: BTreeMap<String, TemplateDefinition>,
}

/// Summary row for theme listings.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ThemeSummary {
    pub id: String,
    pub name: String,
    pub version: String,
    pub template_types: Vec<String>,
}

fn empty_object() -> Value {
    Value::Object(Default::default())
}

impl ThemeDefinition {
    pub fn section_schema(&self, section_type: &str) -> Result<&SectionSchema, AppError> {
        self.sections.get(section_type).ok_or_else(|| {
            AppError::Validation(format!(
                "Theme {} has no section type '{}'",
                self.id, section_type
            ))
        })
    }

    /// Settings for a new section: schema defaults with `overlay` merged on top,
    /// normalized through the typed settings contract.
    pub fn section_settings(&self, section_type: &str, overlay: &Value) -> Result<Value, AppError> {
        let schema = self.section_schema(section_type)?;
        let merged = merge_settings(&schema.default_settings, overlay);
        normalize_settings(section_type, &merged)
    }

    /// Compile the default template for `template_type` into render-ready
    /// sections with deterministic ids.
    pub fn compile_template(&self, template_type: &str) -> Result<Vec<ResolvedSection>, AppError> {
        let template = self.templates.get(template_type).ok_or_else(|| {
            AppError::NotFound(format!(
                "Theme {} has no template '{}'",
                self.id, template_type
            ))
        })?;

        template
            .sections
            .iter()
            .enumerate()
            .map(|(index, def)| {
                let overlay = def.settings.clone().unwrap_or_else(empty_object);
                let settings = self.section_settings(&def.section_type, &overlay)?;
                let blocks = def
                    .blocks
                    .iter()
                    .enumerate()
                    .map(|(i, block)| BlockNode {
                        position: i as i64,
                        ..block.clone()
                    })
                    .collect();
                Ok(ResolvedSection::normalize(
                    format!("{}-{}-{}", template_type, def.section_type, index),
                    &def.section_type,
                    Some(settings),
                    def.enabled,
                    index as i64,
                    blocks,
                ))
            })
            .collect()
    }

    pub fn summary(&self) -> ThemeSummary {
        ThemeSummary {
            id: self.id.clone(),
            name: self.name.clone(),
            version: self.version.clone(),
            template_types: self.templates.keys().cloned().collect(),
        }
    }
}

/// Read-only set of themes keyed by id.
#[derive(Debug, Default)]
pub struct ThemeCatalog {
    themes: HashMap<String, ThemeDefinition>,
}

impl ThemeCatalog {
    /// Catalog holding the built-in themes.
    pub fn builtin() -> Result<Self, AppError> {
        let mut catalog = Self::default();
        for raw in BUILTIN_THEMES {
            catalog.insert(serde_json::from_str(raw)?);
        }
        Ok(catalog)
    }

    /// Add every `*.json` theme found in `dir`. Later definitions replace
    /// earlier ones with the same id.
    pub fn load_dir(&mut self, dir: &Path) -> Result<usize, AppError> {
        let entries = std::fs::read_dir(dir).map_err(|e| {
            AppError::Internal(format!("Cannot read themes dir {}: {}", dir.display(), e))
        })?;

        let mut loaded = 0;
        for entry in entries.flatten() {
            let path = entry.path();
            if path.extension().and_then(|e| e.to_str()) != Some("json") {
                continue;
            }
            let raw = std::fs::read_to_string(&path).map_err(|e| {
                AppError::Internal(format!("Cannot read theme {}: {}", path.display(), e))
            })?;
            let theme: ThemeDefinition = serde_json::from_str(&raw)?;
            tracing::info!("Loaded theme {} v{} from {:?}", theme.id, theme.version, path);
            self.insert(theme);
            loaded += 1;
        }
        Ok(loaded)
    }

    pub fn insert(&mut self, theme: ThemeDefinition) {
        self.themes.insert(theme.id.clone(), theme);
    }

    pub fn get(&self, theme_id: &str) -> Result<&ThemeDefinition, AppError> {
        self.themes
            .get(theme_id)
            .ok_or_else(|| AppError::not_found("Theme", theme_id))
    }

    pub fn list(&self) -> Vec<ThemeSummary> {
        let mut summaries: Vec<_> = self.themes.values().map(|t| t.summary()).collect();
        summaries.sort_by(|a, b| a.id.cmp(&b.id));
        summaries
    }
}
