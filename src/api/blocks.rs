//! Block editing endpoints. Blocks are addressed within their section; nested
//! blocks are reachable by id as well.

use axum::{
    extract::{Path, State},
    Json,
};
use serde_json::json;

use super::{after_mutation, success, ApiResult};
use crate::bus::MessageType;
use crate::models::{AddBlockRequest, BlockPatch, ReorderBlocksRequest, ResolvedSection};
use crate::AppState;

/// POST …/sections/{section_id}/blocks - Add a block.
pub async fn add_block(
    State(state): State<AppState>,
    Path((subdomain, template_type, section_id)): Path<(String, String, String)>,
    Json(request): Json<AddBlockRequest>,
) -> ApiResult<ResolvedSection> {
    let store = state.loader.store(&subdomain).await?;
    let section = state
        .loader
        .add_block(&store, &template_type, &section_id, &request)
        .await?;

    after_mutation(
        &state,
        &store,
        MessageType::BlockAdd,
        json!({
            "sectionId": section_id,
            "block": request.block,
            "targetId": request.target_id,
            "placement": request.placement,
        }),
    )
    .await?;
    success(section)
}

/// PUT …/sections/{section_id}/blocks/{block_id} - Patch a block.
pub async fn update_block(
    State(state): State<AppState>,
    Path((subdomain, template_type, section_id, block_id)): Path<(String, String, String, String)>,
    Json(patch): Json<BlockPatch>,
) -> ApiResult<ResolvedSection> {
    let store = state.loader.store(&subdomain).await?;
    let section = state
        .loader
        .update_block(&store, &template_type, &section_id, &block_id, &patch)
        .await?;

    after_mutation(
        &state,
        &store,
        MessageType::BlockUpdate,
        json!({ "sectionId": section_id, "blockId": block_id, "blocks": section.blocks }),
    )
    .await?;
    success(section)
}

/// DELETE …/sections/{section_id}/blocks/{block_id} - Delete a block.
pub async fn delete_block(
    State(state): State<AppState>,
    Path((subdomain, template_type, section_id, block_id)): Path<(String, String, String, String)>,
) -> ApiResult<ResolvedSection> {
    let store = state.loader.store(&subdomain).await?;
    let section = state
        .loader
        .delete_block(&store, &template_type, &section_id, &block_id)
        .await?;

    after_mutation(
        &state,
        &store,
        MessageType::BlockDelete,
        json!({ "sectionId": section_id, "blockId": block_id }),
    )
    .await?;
    success(section)
}

/// PUT …/sections/{section_id}/blocks/order - Reorder top-level blocks.
pub async fn reorder_blocks(
    State(state): State<AppState>,
    Path((subdomain, template_type, section_id)): Path<(String, String, String)>,
    Json(request): Json<ReorderBlocksRequest>,
) -> ApiResult<ResolvedSection> {
    let store = state.loader.store(&subdomain).await?;
    let section = state
        .loader
        .reorder_blocks(&store, &template_type, &section_id, &request.block_ids)
        .await?;

    let order: Vec<&str> = section.blocks.iter().map(|b| b.id.as_str()).collect();
    after_mutation(
        &state,
        &store,
        MessageType::BlockReorder,
        json!({ "sectionId": section_id, "blockIds": order }),
    )
    .await?;
    success(section)
}

/// POST …/sections/{section_id}/blocks/{block_id}/duplicate - Duplicate a block
/// next to the original.
pub async fn duplicate_block(
    State(state): State<AppState>,
    Path((subdomain, template_type, section_id, block_id)): Path<(String, String, String, String)>,
) -> ApiResult<ResolvedSection> {
    let store = state.loader.store(&subdomain).await?;
    let duplicated = state
        .loader
        .duplicate_block(&store, &template_type, &section_id, &block_id)
        .await?;

    if let Some(copy) = &duplicated.copy {
        after_mutation(
            &state,
            &store,
            MessageType::BlockAdd,
            json!({
                "sectionId": section_id,
                "block": copy,
                "targetId": block_id,
                "placement": "after",
            }),
        )
        .await?;
    }
    success(duplicated.section)
}
