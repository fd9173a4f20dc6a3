//! Section editing endpoints.

use axum::{
    extract::{Path, State},
    Json,
};
use serde_json::json;

use super::{after_mutation, success, ApiResult};
use crate::bus::MessageType;
use crate::errors::AppError;
use crate::models::{
    AddSectionRequest, ReorderSectionsRequest, ResolvedSection, UpdateSectionRequest,
};
use crate::AppState;

/// POST /api/stores/{subdomain}/templates/{template_type}/sections - Add a section.
pub async fn add_section(
    State(state): State<AppState>,
    Path((subdomain, template_type)): Path<(String, String)>,
    Json(request): Json<AddSectionRequest>,
) -> ApiResult<ResolvedSection> {
    if request.section_type.trim().is_empty() {
        return Err(AppError::Validation("Section type is required".to_string()));
    }

    let store = state.loader.store(&subdomain).await?;
    let section = state
        .loader
        .add_section(&store, &template_type, &request)
        .await?;

    after_mutation(
        &state,
        &store,
        MessageType::SectionAdd,
        json!({ "templateType": template_type, "section": section }),
    )
    .await?;
    success(section)
}

/// PUT /api/stores/{subdomain}/templates/{template_type}/sections/{section_id}
pub async fn update_section(
    State(state): State<AppState>,
    Path((subdomain, template_type, section_id)): Path<(String, String, String)>,
    Json(request): Json<UpdateSectionRequest>,
) -> ApiResult<ResolvedSection> {
    let store = state.loader.store(&subdomain).await?;
    let section = state
        .loader
        .update_section(&store, &template_type, &section_id, &request)
        .await?;

    after_mutation(
        &state,
        &store,
        MessageType::SectionUpdate,
        json!({ "templateType": template_type, "section": section }),
    )
    .await?;
    success(section)
}

/// DELETE /api/stores/{subdomain}/templates/{template_type}/sections/{section_id}
pub async fn delete_section(
    State(state): State<AppState>,
    Path((subdomain, template_type, section_id)): Path<(String, String, String)>,
) -> ApiResult<()> {
    let store = state.loader.store(&subdomain).await?;
    state
        .loader
        .remove_section(&store, &template_type, &section_id)
        .await?;

    after_mutation(
        &state,
        &store,
        MessageType::SectionDelete,
        json!({ "templateType": template_type, "sectionId": section_id }),
    )
    .await?;
    success(())
}

/// PUT /api/stores/{subdomain}/templates/{template_type}/sections/order
pub async fn reorder_sections(
    State(state): State<AppState>,
    Path((subdomain, template_type)): Path<(String, String)>,
    Json(request): Json<ReorderSectionsRequest>,
) -> ApiResult<Vec<ResolvedSection>> {
    let store = state.loader.store(&subdomain).await?;
    let sections = state
        .loader
        .reorder_sections(&store, &template_type, &request.section_ids)
        .await?;

    let order: Vec<&str> = sections.iter().map(|s| s.id.as_str()).collect();
    after_mutation(
        &state,
        &store,
        MessageType::SectionReorder,
        json!({ "templateType": template_type, "sectionIds": order }),
    )
    .await?;
    success(sections)
}
