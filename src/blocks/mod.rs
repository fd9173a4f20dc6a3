//! Pure block tree operations.
//!
//! Every function takes a tree by reference and returns a new tree. Unknown ids
//! are never an error: update and delete leave the tree as it was, lookups
//! return `None`.

use uuid::Uuid;

use crate::errors::AppError;
use crate::models::{BlockNode, BlockPatch, Placement};

/// Replace the node with `id` (at any depth) by `patch` applied to it.
pub fn update_block_in_tree(tree: &[BlockNode], id: &str, patch: &BlockPatch) -> Vec<BlockNode> {
    tree.iter()
        .map(|node| {
            if node.id == id {
                return patch.apply(node);
            }
            map_children(node, |children| update_block_in_tree(children, id, patch))
        })
        .collect()
}

/// Insert `new_node` into the tree.
///
/// Without a target the node is appended at the root. `Inside` appends to the
/// target container's nested list (a non-container target leaves the tree
/// unchanged). `Before`/`After` splice next to the target at whatever level it
/// lives. A target that isn't found anywhere leaves the tree unchanged.
pub fn add_block_to_tree(
    tree: &[BlockNode],
    new_node: BlockNode,
    target_id: Option<&str>,
    placement: Placement,
) -> Vec<BlockNode> {
    let Some(target_id) = target_id else {
        let mut out = tree.to_vec();
        out.push(new_node);
        return out;
    };

    let mut out = tree.to_vec();
    insert_at(&mut out, &new_node, target_id, placement);
    out
}

fn insert_at(
    siblings: &mut Vec<BlockNode>,
    new_node: &BlockNode,
    target_id: &str,
    placement: Placement,
) -> bool {
    if let Some(index) = siblings.iter().position(|n| n.id == target_id) {
        match placement {
            Placement::Before => siblings.insert(index, new_node.clone()),
            Placement::After => siblings.insert(index + 1, new_node.clone()),
            Placement::Inside => match siblings[index].children_mut() {
                Some(children) => children.push(new_node.clone()),
                None => return false,
            },
        }
        return true;
    }

    siblings.iter_mut().any(|node| match node.children_mut() {
        Some(children) => insert_at(children, new_node, target_id, placement),
        None => false,
    })
}

/// Remove the node with `id` wherever it occurs.
pub fn delete_block_from_tree(tree: &[BlockNode], id: &str) -> Vec<BlockNode> {
    tree.iter()
        .filter(|node| node.id != id)
        .map(|node| map_children(node, |children| delete_block_from_tree(children, id)))
        .collect()
}

/// Rebuild the top level in the order of `ordered_ids`, assigning each node its
/// new index as `position`. Nodes missing from `ordered_ids` keep their relative
/// order and are appended after the ordered ones.
pub fn reorder_blocks_in_tree(tree: &[BlockNode], ordered_ids: &[String]) -> Vec<BlockNode> {
    let mut out: Vec<BlockNode> = Vec::with_capacity(tree.len());

    for id in ordered_ids {
        if out.iter().any(|n| &n.id == id) {
            continue;
        }
        if let Some(node) = tree.iter().find(|n| &n.id == id) {
            out.push(node.clone());
        }
    }

    for node in tree {
        if !ordered_ids.contains(&node.id) {
            out.push(node.clone());
        }
    }

    for (index, node) in out.iter_mut().enumerate() {
        node.position = index as i64;
    }
    out
}

/// Depth-first search for the first node with `id`.
pub fn find_block_in_tree<'a>(tree: &'a [BlockNode], id: &str) -> Option<&'a BlockNode> {
    for node in tree {
        if node.id == id {
            return Some(node);
        }
        if let Some(found) = find_block_in_tree(node.children(), id) {
            return Some(found);
        }
    }
    None
}

/// Nearest container enclosing the node with `id`; `None` when the node sits at
/// the root or does not exist.
pub fn get_parent_block<'a>(tree: &'a [BlockNode], id: &str) -> Option<&'a BlockNode> {
    for node in tree {
        let children = node.children();
        if children.iter().any(|child| child.id == id) {
            return Some(node);
        }
        if let Some(parent) = get_parent_block(children, id) {
            return Some(parent);
        }
    }
    None
}

/// Deep clone with a fresh id on the node and every descendant.
pub fn duplicate_block(node: &BlockNode) -> BlockNode {
    let mut copy = node.clone();
    copy.id = Uuid::new_v4().to_string();
    if let Some(children) = copy.children_mut() {
        *children = children.iter().map(duplicate_block).collect();
    }
    copy
}

/// Check that the node and, for containers, every nested child carries a
/// non-empty id and type.
pub fn validate_block(node: &BlockNode) -> Result<(), AppError> {
    if node.id.trim().is_empty() {
        return Err(AppError::Validation("Block id is required".to_string()));
    }
    if node.kind.trim().is_empty() {
        return Err(AppError::Validation(format!(
            "Block {} is missing a type",
            node.id
        )));
    }
    node.children().iter().try_for_each(validate_block)
}

/// Number of nodes including nested ones.
pub fn count_blocks(tree: &[BlockNode]) -> usize {
    tree.iter()
        .map(|node| 1 + count_blocks(node.children()))
        .sum()
}

/// All nodes, depth-first with parents before their children.
pub fn flatten_blocks(tree: &[BlockNode]) -> Vec<&BlockNode> {
    let mut out = Vec::with_capacity(tree.len());
    for node in tree {
        out.push(node);
        out.extend(flatten_blocks(node.children()));
    }
    out
}

fn map_children(node: &BlockNode, f: impl FnOnce(&[BlockNode]) -> Vec<BlockNode>) -> BlockNode {
    let mut copy = node.clone();
    if let Some(children) = copy.children_mut() {
        *children = f(children);
    }
    copy
}
