//! Block model: a content unit inside a section.
//!
//! Top-level blocks are stored as rows; blocks nested in a container live in the
//! container's `settings.blocks` and only exist as JSON.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// Block type whose `settings.blocks` holds nested children.
pub const CONTAINER_TYPE: &str = "container";

/// A block node, either a leaf or a container.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BlockNode {
    pub id: String,
    #[serde(rename = "type")]
    pub kind: String,
    #[serde(default)]
    pub position: i64,
    #[serde(default)]
    pub settings: BlockSettings,
}

/// Settings of a block. Nested children are kept apart from the free-form values
/// so tree walks don't have to re-parse JSON.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct BlockSettings {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub blocks: Option<Vec<BlockNode>>,
    #[serde(flatten)]
    pub values: Map<String, Value>,
}

impl BlockNode {
    pub fn new(id: impl Into<String>, kind: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            kind: kind.into(),
            position: 0,
            settings: BlockSettings::default(),
        }
    }

    /// Builder used mostly by tests and theme fixtures.
    pub fn with_value(mut self, key: &str, value: Value) -> Self {
        self.settings.values.insert(key.to_string(), value);
        self
    }

    /// Turn the node into a container holding `children`.
    pub fn with_children(mut self, children: Vec<BlockNode>) -> Self {
        self.kind = CONTAINER_TYPE.to_string();
        self.settings.blocks = Some(children);
        self
    }

    /// A container is identified structurally: `type == "container"` plus a
    /// `settings.blocks` list.
    pub fn is_container(&self) -> bool {
        self.kind == CONTAINER_TYPE && self.settings.blocks.is_some()
    }

    /// Nested children; empty for leaves.
    pub fn children(&self) -> &[BlockNode] {
        match &self.settings.blocks {
            Some(blocks) if self.kind == CONTAINER_TYPE => blocks,
            _ => &[],
        }
    }

    pub(crate) fn children_mut(&mut self) -> Option<&mut Vec<BlockNode>> {
        if self.kind == CONTAINER_TYPE {
            self.settings.blocks.as_mut()
        } else {
            None
        }
    }
}

/// Shallow patch applied by `update_block_in_tree`. Present fields replace the
/// node's fields wholesale.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct BlockPatch {
    #[serde(default, rename = "type")]
    pub kind: Option<String>,
    #[serde(default)]
    pub position: Option<i64>,
    #[serde(default)]
    pub settings: Option<BlockSettings>,
}

impl BlockPatch {
    pub fn settings(settings: BlockSettings) -> Self {
        Self {
            settings: Some(settings),
            ..Default::default()
        }
    }

    pub fn apply(&self, node: &BlockNode) -> BlockNode {
        BlockNode {
            id: node.id.clone(),
            kind: self.kind.clone().unwrap_or_else(|| node.kind.clone()),
            position: self.position.unwrap_or(node.position),
            settings: self
                .settings
                .clone()
                .unwrap_or_else(|| node.settings.clone()),
        }
    }
}

/// Where to insert a block relative to a target.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Placement {
    Before,
    #[default]
    After,
    Inside,
}

/// Request body for adding a block to a section.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AddBlockRequest {
    pub block: BlockNode,
    #[serde(default)]
    pub target_id: Option<String>,
    #[serde(default)]
    pub placement: Placement,
}

/// Request body for reordering the top-level blocks of a section.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ReorderBlocksRequest {
    pub block_ids: Vec<String>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_container_round_trips_nested_blocks() {
        let raw = json!({
            "id": "c1",
            "type": "container",
            "settings": {
                "gap": 12,
                "blocks": [{ "id": "t1", "type": "text", "settings": { "text": "hi" } }]
            }
        });

        let node: BlockNode = serde_json::from_value(raw).unwrap();
        assert!(node.is_container());
        assert_eq!(node.children().len(), 1);
        assert_eq!(node.settings.values["gap"], 12);

        let back = serde_json::to_value(&node).unwrap();
        assert_eq!(back["settings"]["blocks"][0]["id"], "t1");
        assert_eq!(back["settings"]["gap"], 12);
    }

    #[test]
    fn test_container_without_children_is_leaf() {
        let node = BlockNode::new("c1", CONTAINER_TYPE);
        assert!(!node.is_container());
        assert!(node.children().is_empty());
    }

    #[test]
    fn test_non_container_ignores_blocks_field() {
        let mut node = BlockNode::new("b1", "text");
        node.settings.blocks = Some(vec![BlockNode::new("x", "text")]);
        assert!(!node.is_container());
        assert!(node.children().is_empty());
    }

    #[test]
    fn test_placement_defaults_to_after() {
        let req: AddBlockRequest =
            serde_json::from_value(json!({ "block": { "id": "a", "type": "text" } })).unwrap();
        assert_eq!(req.placement, Placement::After);
        assert!(req.target_id.is_none());
    }
}
