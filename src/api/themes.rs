//! Theme catalog endpoints.

use axum::extract::{Path, State};

use super::{success, ApiResult};
use crate::settings::{presets_for, SectionKind, SectionPreset};
use crate::theme::{ThemeDefinition, ThemeSummary};
use crate::AppState;

/// GET /api/themes - List available themes.
pub async fn list_themes(State(state): State<AppState>) -> ApiResult<Vec<ThemeSummary>> {
    success(state.themes.list())
}

/// GET /api/themes/{theme_id} - Full theme definition.
pub async fn get_theme(
    State(state): State<AppState>,
    Path(theme_id): Path<String>,
) -> ApiResult<ThemeDefinition> {
    success(state.themes.get(&theme_id)?.clone())
}

/// GET /api/themes/{theme_id}/sections/{section_type}/presets - Named presets.
pub async fn list_presets(
    State(state): State<AppState>,
    Path((theme_id, section_type)): Path<(String, String)>,
) -> ApiResult<Vec<SectionPreset>> {
    state.themes.get(&theme_id)?.section_schema(&section_type)?;
    success(presets_for(&SectionKind::from_type(&section_type)))
}
