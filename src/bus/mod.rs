//! Typed message bus between the editor and a sandboxed preview surface.
//!
//! The bus is an explicitly constructed instance with a small lifecycle:
//!
//! ```text
//! Uninitialized --init--> Listening --PREVIEW_READY--> Ready
//!       ^                     |  ^                        |
//!       +------teardown-------+  +--------unmount---------+
//! ```
//!
//! While listening but not ready, outgoing messages are queued in send order and
//! flushed to the mounted preview target as soon as it signals readiness.

mod message;
mod registry;

pub use message::*;
pub use registry::*;

use std::collections::{HashMap, VecDeque};
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::{Arc, Mutex, MutexGuard, Weak};
use std::time::Duration;

use serde::Serialize;
use serde_json::Value;
use tokio::sync::{mpsc, watch};

use crate::errors::AppError;

/// Something that can deliver frames to the preview surface.
///
/// `post` runs while the bus holds its delivery lock and must not call back
/// into the bus.
pub trait PreviewTarget: Send + Sync {
    fn post(&self, frame: &BusFrame) -> Result<(), AppError>;
}

/// Target backed by an unbounded channel; the receiving half is drained by
/// whatever owns the transport (e.g. a WebSocket writer task).
pub struct ChannelTarget {
    sender: mpsc::UnboundedSender<BusFrame>,
}

impl ChannelTarget {
    pub fn new(sender: mpsc::UnboundedSender<BusFrame>) -> Self {
        Self { sender }
    }
}

impl PreviewTarget for ChannelTarget {
    fn post(&self, frame: &BusFrame) -> Result<(), AppError> {
        self.sender
            .send(frame.clone())
            .map_err(|_| AppError::Internal("Preview channel closed".to_string()))
    }
}

pub type Handler = Arc<dyn Fn(&Envelope) + Send + Sync>;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BusPhase {
    Uninitialized,
    Listening,
    Ready,
}

/// What happened to an outgoing message.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum SendOutcome {
    Sent,
    Queued,
    Dropped,
}

/// What happened to an incoming frame.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InboundOutcome {
    Dispatched(MessageType),
    /// Origin did not match the host page.
    Rejected,
    /// Bus not listening, or the frame is not bus traffic.
    Ignored,
}

struct HandlerEntry {
    id: u64,
    once: bool,
    handler: Handler,
}

struct BusInner {
    phase: BusPhase,
    queue: VecDeque<Envelope>,
    handlers: HashMap<MessageType, Vec<HandlerEntry>>,
    next_id: u64,
    target: Option<(u64, Arc<dyn PreviewTarget>)>,
}

pub struct MessageBus {
    origin: String,
    source: MessageSource,
    ready_timeout: Duration,
    inner: Mutex<BusInner>,
    /// Held across every delivery so a flush and a direct send never interleave.
    /// Always taken before `inner`.
    delivery: Mutex<()>,
    ready: watch::Sender<bool>,
}

/// Handle returned by [`MessageBus::on`]; dropping it keeps the handler.
pub struct Subscription {
    bus: Weak<MessageBus>,
    message_type: MessageType,
    id: u64,
}

impl Subscription {
    pub fn unsubscribe(self) {
        if let Some(bus) = self.bus.upgrade() {
            bus.remove_handler(self.message_type, self.id);
        }
    }
}

impl MessageBus {
    /// Create a bus that accepts inbound frames only from `origin`.
    pub fn new(origin: impl Into<String>, source: MessageSource, ready_timeout: Duration) -> Arc<Self> {
        let (ready, _) = watch::channel(false);
        Arc::new(Self {
            origin: origin.into(),
            source,
            ready_timeout,
            inner: Mutex::new(BusInner {
                phase: BusPhase::Uninitialized,
                queue: VecDeque::new(),
                handlers: HashMap::new(),
                next_id: 0,
                target: None,
            }),
            delivery: Mutex::new(()),
            ready,
        })
    }

    fn delivery_lock(&self) -> MutexGuard<'_, ()> {
        self.delivery.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    fn lock(&self) -> MutexGuard<'_, BusInner> {
        // Handlers never run under the lock, so poisoning only follows a bug in
        // the bus itself; keep going with the inner state.
        self.inner.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// Start listening for inbound frames. Returns `false` if already listening.
    pub fn init(&self) -> bool {
        let mut inner = self.lock();
        if inner.phase != BusPhase::Uninitialized {
            return false;
        }
        inner.phase = BusPhase::Listening;
        tracing::debug!("Message bus listening for origin {}", self.origin);
        true
    }

    /// Clear handlers, queued messages and the mounted target, and stop listening.
    pub fn teardown(&self) {
        let mut inner = self.lock();
        inner.phase = BusPhase::Uninitialized;
        inner.queue.clear();
        inner.handlers.clear();
        inner.target = None;
        drop(inner);
        self.ready.send_replace(false);
        tracing::debug!("Message bus torn down");
    }

    pub fn phase(&self) -> BusPhase {
        self.lock().phase
    }

    pub fn is_ready(&self) -> bool {
        self.lock().phase == BusPhase::Ready
    }

    pub fn has_target(&self) -> bool {
        self.lock().target.is_some()
    }

    pub fn queued(&self) -> usize {
        self.lock().queue.len()
    }

    /// Make `target` the default destination for outgoing messages. The returned
    /// token is needed to unmount it again.
    pub fn mount(&self, target: Arc<dyn PreviewTarget>) -> u64 {
        let mut inner = self.lock();
        inner.next_id += 1;
        let token = inner.next_id;
        inner.target = Some((token, target));
        token
    }

    /// Drop the target mounted under `token`, if it is still the current one.
    /// Readiness resets, so later sends queue until the next ready signal.
    pub fn unmount(&self, token: u64) {
        let mut inner = self.lock();
        if !matches!(&inner.target, Some((current, _)) if *current == token) {
            return;
        }
        inner.target = None;
        if inner.phase == BusPhase::Ready {
            inner.phase = BusPhase::Listening;
        }
        drop(inner);
        self.ready.send_replace(false);
    }

    /// Send a message to `target`, or to the mounted preview when `None`.
    ///
    /// Until the preview is ready the message is queued, except `PREVIEW_READY`
    /// itself which always goes out immediately. A bus that is not listening
    /// drops everything.
    pub fn send(
        &self,
        message_type: MessageType,
        payload: Value,
        target: Option<Arc<dyn PreviewTarget>>,
    ) -> SendOutcome {
        let envelope = Envelope::new(message_type, payload, self.source);

        let _delivering = self.delivery_lock();
        let mut inner = self.lock();
        if inner.phase == BusPhase::Uninitialized {
            tracing::debug!("Message bus not listening; dropping {:?}", message_type);
            return SendOutcome::Dropped;
        }
        if inner.phase != BusPhase::Ready && message_type != MessageType::PreviewReady {
            inner.queue.push_back(envelope);
            return SendOutcome::Queued;
        }
        let target = target.or_else(|| inner.target.as_ref().map(|(_, t)| Arc::clone(t)));
        drop(inner);

        deliver(target.as_deref(), envelope)
    }

    /// Feed a raw inbound frame into the bus.
    pub fn receive(&self, origin: &str, raw: &str) -> InboundOutcome {
        if origin != self.origin {
            tracing::warn!("Rejected bus message from origin {:?}", origin);
            return InboundOutcome::Rejected;
        }
        if self.phase() == BusPhase::Uninitialized {
            return InboundOutcome::Ignored;
        }

        let envelope = match BusFrame::decode(raw) {
            Ok(Some(frame)) => frame.message,
            Ok(None) => return InboundOutcome::Ignored,
            Err(e) => {
                tracing::warn!("Malformed bus message: {}", e);
                return InboundOutcome::Ignored;
            }
        };

        if envelope.message_type == MessageType::PreviewReady {
            self.mark_ready();
        }
        self.dispatch(&envelope);
        InboundOutcome::Dispatched(envelope.message_type)
    }

    fn mark_ready(&self) {
        let delivering = self.delivery_lock();
        let mut inner = self.lock();
        inner.phase = BusPhase::Ready;
        let pending: Vec<Envelope> = inner.queue.drain(..).collect();
        let target = inner.target.as_ref().map(|(_, t)| Arc::clone(t));
        drop(inner);

        if !pending.is_empty() {
            tracing::debug!("Preview ready, flushing {} queued messages", pending.len());
        }
        for envelope in pending {
            deliver(target.as_deref(), envelope);
        }
        drop(delivering);
        self.ready.send_replace(true);
    }

    fn dispatch(&self, envelope: &Envelope) {
        let handlers: Vec<Handler> = {
            let mut inner = self.lock();
            let Some(entries) = inner.handlers.get_mut(&envelope.message_type) else {
                return;
            };
            let handlers = entries.iter().map(|e| Arc::clone(&e.handler)).collect();
            entries.retain(|e| !e.once);
            handlers
        };

        for handler in handlers {
            if catch_unwind(AssertUnwindSafe(|| handler(envelope))).is_err() {
                tracing::error!(
                    "Bus handler for {:?} panicked; continuing with remaining handlers",
                    envelope.message_type
                );
            }
        }
    }

    /// Register `handler` for every message of `message_type`.
    pub fn on<F>(self: &Arc<Self>, message_type: MessageType, handler: F) -> Subscription
    where
        F: Fn(&Envelope) + Send + Sync + 'static,
    {
        self.add_handler(message_type, Arc::new(handler), false)
    }

    /// Register `handler` for the next message of `message_type` only.
    pub fn once<F>(self: &Arc<Self>, message_type: MessageType, handler: F) -> Subscription
    where
        F: Fn(&Envelope) + Send + Sync + 'static,
    {
        self.add_handler(message_type, Arc::new(handler), true)
    }

    /// Remove every handler of `message_type`.
    pub fn off(&self, message_type: MessageType) {
        self.lock().handlers.remove(&message_type);
    }

    fn add_handler(self: &Arc<Self>, message_type: MessageType, handler: Handler, once: bool) -> Subscription {
        let mut inner = self.lock();
        inner.next_id += 1;
        let id = inner.next_id;
        inner
            .handlers
            .entry(message_type)
            .or_default()
            .push(HandlerEntry { id, once, handler });
        Subscription {
            bus: Arc::downgrade(self),
            message_type,
            id,
        }
    }

    fn remove_handler(&self, message_type: MessageType, id: u64) {
        let mut inner = self.lock();
        if let Some(entries) = inner.handlers.get_mut(&message_type) {
            entries.retain(|e| e.id != id);
        }
    }

    /// Resolve once the preview is ready, or after the configured timeout.
    /// Returns whether readiness was observed; a timeout is not an error.
    pub async fn wait_for_ready(&self) -> bool {
        let mut rx = self.ready.subscribe();
        if *rx.borrow_and_update() {
            return true;
        }
        let observed = tokio::time::timeout(self.ready_timeout, rx.wait_for(|ready| *ready))
            .await
            .map(|result| result.is_ok())
            .unwrap_or(false);
        if !observed {
            tracing::warn!(
                "Preview did not signal readiness within {:?}",
                self.ready_timeout
            );
        }
        observed
    }
}

fn deliver(target: Option<&dyn PreviewTarget>, envelope: Envelope) -> SendOutcome {
    let message_type = envelope.message_type;
    let Some(target) = target else {
        tracing::warn!("No preview target mounted; dropping {:?}", message_type);
        return SendOutcome::Dropped;
    };
    match target.post(&BusFrame::wrap(envelope)) {
        Ok(()) => SendOutcome::Sent,
        Err(e) => {
            tracing::warn!("Failed to deliver {:?}: {}", message_type, e);
            SendOutcome::Dropped
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use std::sync::atomic::{AtomicUsize, Ordering};

    const ORIGIN: &str = "https://studio.example.com";

    fn bus() -> Arc<MessageBus> {
        let bus = MessageBus::new(ORIGIN, MessageSource::Editor, Duration::from_millis(200));
        bus.init();
        bus
    }

    fn mounted(bus: &MessageBus) -> (u64, mpsc::UnboundedReceiver<BusFrame>) {
        let (tx, rx) = mpsc::unbounded_channel();
        let token = bus.mount(Arc::new(ChannelTarget::new(tx)));
        (token, rx)
    }

    fn inbound(message_type: &str) -> String {
        json!({
            "themeStudio": { "type": message_type, "payload": {}, "timestamp": 0, "source": "preview" }
        })
        .to_string()
    }

    fn drain(rx: &mut mpsc::UnboundedReceiver<BusFrame>) -> Vec<BusFrame> {
        let mut out = Vec::new();
        while let Ok(frame) = rx.try_recv() {
            out.push(frame);
        }
        out
    }

    #[test]
    fn test_init_is_idempotent() {
        let bus = MessageBus::new(ORIGIN, MessageSource::Editor, Duration::from_secs(1));
        assert_eq!(bus.phase(), BusPhase::Uninitialized);
        assert!(bus.init());
        assert!(!bus.init());
        assert_eq!(bus.phase(), BusPhase::Listening);
    }

    #[test]
    fn test_queued_messages_flush_in_order_exactly_once() {
        let bus = bus();
        let (_, mut rx) = mounted(&bus);

        for i in 0..5 {
            assert_eq!(
                bus.send(MessageType::SectionUpdate, json!({ "i": i }), None),
                SendOutcome::Queued
            );
        }
        assert_eq!(bus.queued(), 5);
        assert!(drain(&mut rx).is_empty());

        bus.receive(ORIGIN, &inbound("PREVIEW_READY"));

        let delivered: Vec<i64> = drain(&mut rx)
            .iter()
            .map(|f| f.message.payload["i"].as_i64().unwrap())
            .collect();
        assert_eq!(delivered, vec![0, 1, 2, 3, 4]);
        assert_eq!(bus.queued(), 0);

        // A second ready signal must not replay anything.
        bus.receive(ORIGIN, &inbound("PREVIEW_READY"));
        assert!(drain(&mut rx).is_empty());
    }

    /// Records payload names in arrival order; slow on the first queued one.
    struct SlowTarget {
        seen: Mutex<Vec<String>>,
    }

    impl PreviewTarget for SlowTarget {
        fn post(&self, frame: &BusFrame) -> Result<(), AppError> {
            let name = frame.message.payload["n"].as_str().unwrap_or_default().to_string();
            if name == "q0" {
                std::thread::sleep(Duration::from_millis(100));
            }
            self.seen.lock().unwrap().push(name);
            Ok(())
        }
    }

    #[test]
    fn test_send_during_flush_waits_for_queue() {
        let bus = bus();
        let target = Arc::new(SlowTarget {
            seen: Mutex::new(Vec::new()),
        });
        bus.mount(target.clone());

        bus.send(MessageType::SectionUpdate, json!({ "n": "q0" }), None);
        bus.send(MessageType::SectionUpdate, json!({ "n": "q1" }), None);

        let late = {
            let bus = Arc::clone(&bus);
            std::thread::spawn(move || {
                std::thread::sleep(Duration::from_millis(40));
                bus.send(MessageType::SectionUpdate, json!({ "n": "late" }), None)
            })
        };
        bus.receive(ORIGIN, &inbound("PREVIEW_READY"));

        assert_eq!(late.join().unwrap(), SendOutcome::Sent);
        assert_eq!(*target.seen.lock().unwrap(), vec!["q0", "q1", "late"]);
    }

    #[test]
    fn test_send_after_ready_is_immediate() {
        let bus = bus();
        let (_, mut rx) = mounted(&bus);
        bus.receive(ORIGIN, &inbound("PREVIEW_READY"));

        assert_eq!(
            bus.send(MessageType::ScrollToSection, json!({ "sectionId": "s1" }), None),
            SendOutcome::Sent
        );
        let frames = drain(&mut rx);
        assert_eq!(frames.len(), 1);
        assert_eq!(frames[0].message.message_type, MessageType::ScrollToSection);
        assert_eq!(frames[0].message.source, MessageSource::Editor);
    }

    #[test]
    fn test_preview_ready_bypasses_queue() {
        let bus = bus();
        let (_, mut rx) = mounted(&bus);
        assert_eq!(
            bus.send(MessageType::PreviewReady, Value::Null, None),
            SendOutcome::Sent
        );
        assert_eq!(drain(&mut rx).len(), 1);
        assert_eq!(bus.queued(), 0);
    }

    #[test]
    fn test_missing_target_drops() {
        let bus = bus();
        bus.receive(ORIGIN, &inbound("PREVIEW_READY"));
        assert_eq!(
            bus.send(MessageType::SectionAdd, json!({}), None),
            SendOutcome::Dropped
        );
    }

    #[test]
    fn test_explicit_target_wins() {
        let bus = bus();
        let (_, mut mounted_rx) = mounted(&bus);
        bus.receive(ORIGIN, &inbound("PREVIEW_READY"));

        let (tx, mut explicit_rx) = mpsc::unbounded_channel();
        let explicit: Arc<dyn PreviewTarget> = Arc::new(ChannelTarget::new(tx));
        bus.send(MessageType::BlockSelected, json!({}), Some(explicit));

        assert_eq!(drain(&mut explicit_rx).len(), 1);
        assert!(drain(&mut mounted_rx).is_empty());
    }

    #[test]
    fn test_foreign_origin_rejected() {
        let bus = bus();
        let hits = Arc::new(AtomicUsize::new(0));
        let counter = Arc::clone(&hits);
        let _sub = bus.on(MessageType::PreviewReady, move |_| {
            counter.fetch_add(1, Ordering::SeqCst);
        });

        assert_eq!(
            bus.receive("https://evil.example.com", &inbound("PREVIEW_READY")),
            InboundOutcome::Rejected
        );
        assert!(!bus.is_ready());
        assert_eq!(hits.load(Ordering::SeqCst), 0);
    }

    #[test]
    fn test_unmarked_and_uninitialized_traffic_ignored() {
        let bus = bus();
        assert_eq!(
            bus.receive(ORIGIN, r#"{"type":"PREVIEW_READY"}"#),
            InboundOutcome::Ignored
        );

        let idle = MessageBus::new(ORIGIN, MessageSource::Editor, Duration::from_secs(1));
        assert_eq!(
            idle.receive(ORIGIN, &inbound("PREVIEW_READY")),
            InboundOutcome::Ignored
        );
        assert!(!idle.is_ready());
    }

    #[test]
    fn test_on_and_unsubscribe() {
        let bus = bus();
        let hits = Arc::new(AtomicUsize::new(0));
        let counter = Arc::clone(&hits);
        let sub = bus.on(MessageType::SectionSelected, move |_| {
            counter.fetch_add(1, Ordering::SeqCst);
        });

        bus.receive(ORIGIN, &inbound("SECTION_SELECTED"));
        bus.receive(ORIGIN, &inbound("SECTION_SELECTED"));
        sub.unsubscribe();
        bus.receive(ORIGIN, &inbound("SECTION_SELECTED"));

        assert_eq!(hits.load(Ordering::SeqCst), 2);
    }

    #[test]
    fn test_once_delivers_exactly_once() {
        let bus = bus();
        let hits = Arc::new(AtomicUsize::new(0));
        let counter = Arc::clone(&hits);
        let _sub = bus.once(MessageType::ScrollPosition, move |_| {
            counter.fetch_add(1, Ordering::SeqCst);
        });

        for _ in 0..3 {
            bus.receive(ORIGIN, &inbound("SCROLL_POSITION"));
        }
        assert_eq!(hits.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_off_removes_all_handlers_of_type() {
        let bus = bus();
        let hits = Arc::new(AtomicUsize::new(0));
        for _ in 0..2 {
            let counter = Arc::clone(&hits);
            let _ = bus.on(MessageType::BlockSelected, move |_| {
                counter.fetch_add(1, Ordering::SeqCst);
            });
        }
        bus.off(MessageType::BlockSelected);
        bus.receive(ORIGIN, &inbound("BLOCK_SELECTED"));
        assert_eq!(hits.load(Ordering::SeqCst), 0);
    }

    #[test]
    fn test_panicking_handler_is_isolated() {
        let bus = bus();
        let hits = Arc::new(AtomicUsize::new(0));

        let _bad = bus.on(MessageType::SectionSelected, |_| panic!("handler failure"));
        let counter = Arc::clone(&hits);
        let _good = bus.on(MessageType::SectionSelected, move |_| {
            counter.fetch_add(1, Ordering::SeqCst);
        });

        assert_eq!(
            bus.receive(ORIGIN, &inbound("SECTION_SELECTED")),
            InboundOutcome::Dispatched(MessageType::SectionSelected)
        );
        assert_eq!(hits.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_teardown_clears_everything() {
        let bus = bus();
        let (_, _rx) = mounted(&bus);
        let _sub = bus.on(MessageType::SectionSelected, |_| {});
        bus.send(MessageType::SectionUpdate, json!({}), None);

        bus.teardown();
        assert_eq!(bus.phase(), BusPhase::Uninitialized);
        assert_eq!(bus.queued(), 0);
        assert_eq!(
            bus.send(MessageType::SectionUpdate, json!({}), None),
            SendOutcome::Dropped
        );
        assert_eq!(bus.queued(), 0);
        assert_eq!(
            bus.receive(ORIGIN, &inbound("SECTION_SELECTED")),
            InboundOutcome::Ignored
        );
    }

    #[test]
    fn test_unmount_resets_readiness() {
        let bus = bus();
        let (token, _rx) = mounted(&bus);
        bus.receive(ORIGIN, &inbound("PREVIEW_READY"));
        assert!(bus.is_ready());

        bus.unmount(token + 100);
        assert!(bus.is_ready());

        bus.unmount(token);
        assert!(!bus.is_ready());
        assert_eq!(
            bus.send(MessageType::SectionUpdate, json!({}), None),
            SendOutcome::Queued
        );
    }

    #[tokio::test]
    async fn test_wait_for_ready_resolves_on_signal() {
        let bus = bus();
        let waiter = {
            let bus = Arc::clone(&bus);
            tokio::spawn(async move { bus.wait_for_ready().await })
        };
        tokio::time::sleep(Duration::from_millis(20)).await;
        bus.receive(ORIGIN, &inbound("PREVIEW_READY"));

        assert!(waiter.await.unwrap());
        assert!(bus.wait_for_ready().await);
    }

    #[tokio::test]
    async fn test_wait_for_ready_times_out_without_error() {
        let bus = bus();
        let started = std::time::Instant::now();
        assert!(!bus.wait_for_ready().await);
        assert!(started.elapsed() >= Duration::from_millis(200));
    }
}
