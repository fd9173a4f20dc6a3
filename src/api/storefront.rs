//! Storefront read path.

use axum::extract::{Path, State};

use super::{success, ApiResult};
use crate::models::ResolvedSection;
use crate::AppState;

/// GET /api/storefront/{subdomain}/{template_type} - Sections served to
/// visitors: the published version, enabled sections only.
pub async fn storefront_sections(
    State(state): State<AppState>,
    Path((subdomain, template_type)): Path<(String, String)>,
) -> ApiResult<Vec<ResolvedSection>> {
    let store = state.loader.store(&subdomain).await?;
    success(state.loader.resolve_published(&store, &template_type).await?)
}
