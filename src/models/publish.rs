//! Draft/publish state of a store.

use serde::{Deserialize, Serialize};

/// Per-store editing state.
///
/// `has_changes` is derived: it is true while the store has recorded more
/// changes than the last successful save captured.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PublishState {
    pub has_changes: bool,
    pub is_draft: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub last_saved_at: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub published_at: Option<String>,
    #[serde(skip)]
    pub change_seq: i64,
    #[serde(skip)]
    pub saved_seq: i64,
}

impl PublishState {
    pub fn from_counters(
        change_seq: i64,
        saved_seq: i64,
        is_draft: bool,
        last_saved_at: Option<String>,
        published_at: Option<String>,
    ) -> Self {
        Self {
            has_changes: change_seq > saved_seq,
            is_draft,
            last_saved_at,
            published_at,
            change_seq,
            saved_seq,
        }
    }

    /// Where the state machine sits right now.
    pub fn phase(&self) -> PublishPhase {
        match (self.has_changes, self.is_draft) {
            (true, _) => PublishPhase::DraftDirty,
            (false, true) => PublishPhase::DraftSaved,
            (false, false) => PublishPhase::Published,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum PublishPhase {
    Published,
    DraftDirty,
    DraftSaved,
}
