//! Draft/publish endpoints.

use axum::extract::{Path, State};

use super::{success, ApiResult};
use crate::models::PublishState;
use crate::publish::PublishOutcome;
use crate::AppState;

/// GET /api/stores/{subdomain}/publish - Current draft/publish state.
pub async fn get_publish_state(
    State(state): State<AppState>,
    Path(subdomain): Path<String>,
) -> ApiResult<PublishState> {
    let store = state.loader.store(&subdomain).await?;
    success(state.publisher.state(&store.id).await?)
}

/// POST /api/stores/{subdomain}/draft - Save the draft.
pub async fn save_draft(
    State(state): State<AppState>,
    Path(subdomain): Path<String>,
) -> ApiResult<PublishState> {
    let store = state.loader.store(&subdomain).await?;
    success(state.publisher.save_draft(&store.id).await?)
}

/// POST /api/stores/{subdomain}/publish - Publish, saving pending changes first.
pub async fn publish(
    State(state): State<AppState>,
    Path(subdomain): Path<String>,
) -> ApiResult<PublishOutcome> {
    let store = state.loader.store(&subdomain).await?;
    success(state.publisher.publish(&store.id).await?)
}
