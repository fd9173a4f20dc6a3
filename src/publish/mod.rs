//! Draft/publish state machine.
//!
//! ```text
//! Published(clean) --mutation--> Draft(dirty) --save--> Draft(clean) --publish--> Published(clean)
//! ```
//!
//! Publishing from a dirty draft saves first, exactly once. Save and publish for
//! the same store never interleave.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use serde::Serialize;

use crate::errors::AppError;
use crate::models::PublishState;

/// Persistence behind the state machine.
#[async_trait]
pub trait DraftStore: Send + Sync {
    async fn load_state(&self, store_id: &str) -> Result<PublishState, AppError>;

    /// Note that the draft diverged from the last save.
    async fn record_change(&self, store_id: &str) -> Result<(), AppError>;

    /// Persist the current draft. Returns the save timestamp.
    async fn write_draft(&self, store_id: &str) -> Result<String, AppError>;

    /// Make the saved draft the live version. Returns the publish timestamp.
    async fn promote_draft(&self, store_id: &str) -> Result<String, AppError>;
}

/// Result of a publish call.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PublishOutcome {
    /// Whether unsaved changes had to be saved first.
    pub saved_first: bool,
    pub published_at: String,
    pub state: PublishState,
}

pub struct DraftPublisher {
    store: Arc<dyn DraftStore>,
    locks: Mutex<HashMap<String, Arc<tokio::sync::Mutex<()>>>>,
}

impl DraftPublisher {
    pub fn new(store: Arc<dyn DraftStore>) -> Self {
        Self {
            store,
            locks: Mutex::new(HashMap::new()),
        }
    }

    fn lock_for(&self, store_id: &str) -> Arc<tokio::sync::Mutex<()>> {
        let mut locks = self.locks.lock().unwrap_or_else(|p| p.into_inner());
        Arc::clone(locks.entry(store_id.to_string()).or_default())
    }

    /// Forget the store's lock once nobody else holds or awaits it.
    fn release_lock(&self, store_id: &str, lock: Arc<tokio::sync::Mutex<()>>) {
        let mut locks = self.locks.lock().unwrap_or_else(|p| p.into_inner());
        drop(lock);
        if locks.get(store_id).is_some_and(|l| Arc::strong_count(l) == 1) {
            locks.remove(store_id);
        }
    }

    #[cfg(test)]
    fn held_locks(&self) -> usize {
        self.locks.lock().unwrap_or_else(|p| p.into_inner()).len()
    }

    pub async fn state(&self, store_id: &str) -> Result<PublishState, AppError> {
        self.store.load_state(store_id).await
    }

    /// Flag the store's draft as dirty after an editor mutation.
    pub async fn mark_changed(&self, store_id: &str) -> Result<(), AppError> {
        self.store.record_change(store_id).await
    }

    /// Persist the draft. The dirty flag only clears once the write succeeded.
    pub async fn save_draft(&self, store_id: &str) -> Result<PublishState, AppError> {
        let lock = self.lock_for(store_id);
        let result = {
            let _guard = lock.lock().await;
            self.save_locked(store_id).await
        };
        self.release_lock(store_id, lock);
        result
    }

    async fn save_locked(&self, store_id: &str) -> Result<PublishState, AppError> {
        self.store.write_draft(store_id).await?;
        tracing::info!("Draft saved for store {}", store_id);
        self.store.load_state(store_id).await
    }

    /// Publish the draft, saving it first when it has unsaved changes or was
    /// never saved at all.
    pub async fn publish(&self, store_id: &str) -> Result<PublishOutcome, AppError> {
        let lock = self.lock_for(store_id);
        let result = {
            let _guard = lock.lock().await;
            self.publish_locked(store_id).await
        };
        self.release_lock(store_id, lock);
        result
    }

    async fn publish_locked(&self, store_id: &str) -> Result<PublishOutcome, AppError> {
        let before = self.store.load_state(store_id).await?;
        let saved_first = before.has_changes || before.last_saved_at.is_none();
        if saved_first {
            self.store.write_draft(store_id).await?;
        }

        let published_at = self.store.promote_draft(store_id).await?;
        tracing::info!(
            "Published store {} (saved first: {})",
            store_id,
            saved_first
        );

        Ok(PublishOutcome {
            saved_first,
            published_at,
            state: self.store.load_state(store_id).await?,
        })
    }
}
