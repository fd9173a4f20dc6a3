//! Customization records: the append-only log of tenant edits against the theme.

use serde::{Deserialize, Serialize};
use serde_json::Value;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CustomizationOp {
    Add,
    Update,
    Remove,
}

impl CustomizationOp {
    pub fn as_str(&self) -> &'static str {
        match self {
            CustomizationOp::Add => "add",
            CustomizationOp::Update => "update",
            CustomizationOp::Remove => "remove",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "add" => Some(CustomizationOp::Add),
            "update" => Some(CustomizationOp::Update),
            "remove" => Some(CustomizationOp::Remove),
            _ => None,
        }
    }
}

/// One recorded edit.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CustomizationRecord {
    pub id: i64,
    pub store_id: String,
    pub template_id: String,
    pub op: CustomizationOp,
    pub section_id: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub block_id: Option<String>,
    pub payload: Value,
    pub created_at: String,
}

/// An edit about to be recorded.
#[derive(Debug, Clone)]
pub struct NewCustomization {
    pub op: CustomizationOp,
    pub section_id: String,
    pub block_id: Option<String>,
    pub payload: Value,
}

impl NewCustomization {
    pub fn section(op: CustomizationOp, section_id: &str, payload: Value) -> Self {
        Self {
            op,
            section_id: section_id.to_string(),
            block_id: None,
            payload,
        }
    }

    pub fn block(op: CustomizationOp, section_id: &str, block_id: &str, payload: Value) -> Self {
        Self {
            op,
            section_id: section_id.to_string(),
            block_id: Some(block_id.to_string()),
            payload,
        }
    }
}
