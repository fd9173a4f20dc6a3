//! REST API module.
//!
//! Handlers for the editor (themes, stores, sections, blocks, draft/publish),
//! the storefront read path, and the preview socket.

mod blocks;
mod preview;
mod publish;
mod sections;
mod stores;
mod storefront;
mod themes;

pub use blocks::*;
pub use preview::*;
pub use publish::*;
pub use sections::*;
pub use stores::*;
pub use storefront::*;
pub use themes::*;

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde::Serialize;
use serde_json::Value;

use crate::bus::MessageType;
use crate::errors::AppError;
use crate::models::Store;
use crate::AppState;

/// Success response envelope.
#[derive(Debug, Serialize)]
pub struct ApiResponse<T: Serialize> {
    pub success: bool,
    pub data: T,
}

impl<T: Serialize> ApiResponse<T> {
    pub fn new(data: T) -> Self {
        Self {
            success: true,
            data,
        }
    }
}

impl<T: Serialize> IntoResponse for ApiResponse<T> {
    fn into_response(self) -> Response {
        (StatusCode::OK, Json(self)).into_response()
    }
}

/// Response type that can be either success or error.
pub type ApiResult<T> = Result<ApiResponse<T>, AppError>;

/// Create a successful API response.
pub fn success<T: Serialize>(data: T) -> ApiResult<T> {
    Ok(ApiResponse::new(data))
}

/// Bookkeeping after an editor mutation: mark the draft dirty and mirror the
/// change to the store's preview, if one is open.
async fn after_mutation(
    state: &AppState,
    store: &Store,
    message_type: MessageType,
    payload: Value,
) -> Result<(), AppError> {
    state.publisher.mark_changed(&store.id).await?;

    if let Some(bus) = state.buses.get(&store.id) {
        let outcome = bus.send(message_type, payload, None);
        tracing::debug!("Preview {:?} for {}: {:?}", message_type, store.subdomain, outcome);
    }
    Ok(())
}
