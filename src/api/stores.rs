//! Store provisioning and template resolution endpoints.

use axum::{
    extract::{Path, State},
    Json,
};

use super::{success, ApiResult};
use crate::errors::AppError;
use crate::models::{
    is_valid_subdomain, CreateStoreRequest, CustomizationRecord, ResolvedSection, Store,
};
use crate::AppState;

/// POST /api/stores - Provision a store on a theme.
pub async fn create_store(
    State(state): State<AppState>,
    Json(request): Json<CreateStoreRequest>,
) -> ApiResult<Store> {
    if !is_valid_subdomain(&request.subdomain) {
        return Err(AppError::Validation(format!(
            "Invalid subdomain '{}'",
            request.subdomain
        )));
    }
    if request.name.trim().is_empty() {
        return Err(AppError::Validation("Store name is required".to_string()));
    }
    // Unknown themes are rejected up front rather than at first resolve.
    state.themes.get(&request.theme_id)?;

    let store = state.repo.create_store(&request).await?;
    tracing::info!("Provisioned store {} on theme {}", store.subdomain, store.theme_id);
    success(store)
}

/// GET /api/stores/{subdomain} - Get a store.
pub async fn get_store(
    State(state): State<AppState>,
    Path(subdomain): Path<String>,
) -> ApiResult<Store> {
    success(state.loader.store(&subdomain).await?)
}

/// GET /api/stores/{subdomain}/templates/{template_type} - Effective sections
/// of the draft.
pub async fn resolve_template(
    State(state): State<AppState>,
    Path((subdomain, template_type)): Path<(String, String)>,
) -> ApiResult<Vec<ResolvedSection>> {
    let store = state.loader.store(&subdomain).await?;
    success(state.loader.resolve(&store, &template_type).await?)
}

/// GET /api/stores/{subdomain}/customizations - The store's edit log.
pub async fn list_customizations(
    State(state): State<AppState>,
    Path(subdomain): Path<String>,
) -> ApiResult<Vec<CustomizationRecord>> {
    let store = state.loader.store(&subdomain).await?;
    success(state.repo.list_customizations(&store.id).await?)
}
