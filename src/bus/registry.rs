//! One message bus per store.

use std::collections::HashMap;
use std::sync::{Arc, RwLock};
use std::time::Duration;

use super::{MessageBus, MessageSource, MessageType, PreviewTarget};

/// Buses keyed by store id. A bus exists only while a preview of the store is
/// connected, so stores nobody is previewing never accumulate queues.
pub struct BusRegistry {
    origin: String,
    ready_timeout: Duration,
    buses: RwLock<HashMap<String, Arc<MessageBus>>>,
}

impl BusRegistry {
    pub fn new(origin: impl Into<String>, ready_timeout: Duration) -> Self {
        Self {
            origin: origin.into(),
            ready_timeout,
            buses: RwLock::new(HashMap::new()),
        }
    }

    /// Mount `target` on the store's bus, creating the bus if needed. Paired
    /// with [`BusRegistry::release`]; both run under the registry lock so a
    /// disconnect never tears down a bus another preview is mounting on.
    pub fn attach(&self, store_id: &str, target: Arc<dyn PreviewTarget>) -> (Arc<MessageBus>, u64) {
        let mut buses = self.buses.write().unwrap_or_else(|p| p.into_inner());
        let bus = Arc::clone(
            buses
                .entry(store_id.to_string())
                .or_insert_with(|| self.create(store_id)),
        );
        let token = bus.mount(target);
        (bus, token)
    }

    fn create(&self, store_id: &str) -> Arc<MessageBus> {
        let bus = MessageBus::new(&self.origin, MessageSource::Editor, self.ready_timeout);
        bus.init();
        for message_type in [MessageType::SectionSelected, MessageType::BlockSelected] {
            let store = store_id.to_string();
            // Registered for the bus's lifetime; the subscription handle is not needed.
            let _ = bus.on(message_type, move |envelope| {
                tracing::debug!(
                    "Preview of store {} reported {:?}: {}",
                    store,
                    envelope.message_type,
                    envelope.payload
                );
            });
        }
        tracing::debug!("Created preview bus for store {}", store_id);
        bus
    }

    pub fn get(&self, store_id: &str) -> Option<Arc<MessageBus>> {
        self.buses
            .read()
            .unwrap_or_else(|p| p.into_inner())
            .get(store_id)
            .cloned()
    }

    /// Unmount the preview registered under `token`. When no other preview
    /// took its place, the bus is torn down and forgotten so later edits are not
    /// queued for nobody.
    pub fn release(&self, store_id: &str, token: u64) {
        let mut buses = self.buses.write().unwrap_or_else(|p| p.into_inner());
        let Some(bus) = buses.get(store_id) else {
            return;
        };
        bus.unmount(token);
        if bus.has_target() {
            return;
        }
        if let Some(bus) = buses.remove(store_id) {
            bus.teardown();
            tracing::debug!("Released preview bus for store {}", store_id);
        }
    }
}
