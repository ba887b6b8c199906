//! Event dispatch to subscribers.
//!
//! Each [`EventKind`] has its own handler registry and its own broadcast
//! channel, so telemetry and video dispatch never contend with each other.
//! Handlers run inline on the receive loop that produced the event and should
//! return quickly; anything slow belongs behind a stream subscription.

use futures::{Stream, StreamExt};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, PoisonError, RwLock};
use tokio::sync::broadcast;
use tokio_stream::wrappers::BroadcastStream;
use tokio_stream::wrappers::errors::BroadcastStreamRecvError;
use tracing::{debug, trace, warn};

use crate::stream::ThrottleExt;
use crate::types::{EventKind, LinkEvent, TelemetryFrame, UpdateRate, VideoFrame};

/// Shared event handler.
pub type EventHandler = Arc<dyn Fn(&LinkEvent) + Send + Sync + 'static>;

/// Handle returned by [`EventBus::subscribe`], used to unsubscribe.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct SubscriptionId(u64);

/// Broadcast capacity per event kind before slow stream subscribers lag.
pub const DEFAULT_STREAM_CAPACITY: usize = 64;

#[derive(Default)]
struct Registry {
    handlers: RwLock<Vec<(SubscriptionId, EventHandler)>>,
}

impl Registry {
    fn insert(&self, id: SubscriptionId, handler: EventHandler) {
        self.handlers.write().unwrap_or_else(PoisonError::into_inner).push((id, handler));
    }

    fn remove(&self, id: SubscriptionId) -> bool {
        let mut handlers = self.handlers.write().unwrap_or_else(PoisonError::into_inner);
        let before = handlers.len();
        handlers.retain(|(existing, _)| *existing != id);
        handlers.len() != before
    }

    fn clear(&self) -> usize {
        let mut handlers = self.handlers.write().unwrap_or_else(PoisonError::into_inner);
        let removed = handlers.len();
        handlers.clear();
        removed
    }

    fn len(&self) -> usize {
        self.handlers.read().unwrap_or_else(PoisonError::into_inner).len()
    }

    /// Handlers are cloned out so none run under the lock and a handler may
    /// itself subscribe or unsubscribe.
    fn snapshot(&self) -> Vec<EventHandler> {
        self.handlers
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .iter()
            .map(|(_, handler)| Arc::clone(handler))
            .collect()
    }
}

/// Per-kind handler registries plus broadcast streams.
pub struct EventBus {
    next_id: AtomicU64,
    telemetry: Registry,
    video: Registry,
    telemetry_tx: broadcast::Sender<Arc<TelemetryFrame>>,
    video_tx: broadcast::Sender<Arc<VideoFrame>>,
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new(DEFAULT_STREAM_CAPACITY)
    }
}

impl EventBus {
    pub fn new(stream_capacity: usize) -> Self {
        let capacity = stream_capacity.max(1);
        let (telemetry_tx, _) = broadcast::channel(capacity);
        let (video_tx, _) = broadcast::channel(capacity);
        Self {
            next_id: AtomicU64::new(1),
            telemetry: Registry::default(),
            video: Registry::default(),
            telemetry_tx,
            video_tx,
        }
    }

    fn registry(&self, kind: EventKind) -> &Registry {
        match kind {
            EventKind::Telemetry => &self.telemetry,
            EventKind::Video => &self.video,
        }
    }

    /// Register a handler for one event kind.
    pub fn subscribe<F>(&self, kind: EventKind, handler: F) -> SubscriptionId
    where
        F: Fn(&LinkEvent) + Send + Sync + 'static,
    {
        let id = SubscriptionId(self.next_id.fetch_add(1, Ordering::Relaxed));
        self.registry(kind).insert(id, Arc::new(handler));
        debug!(%kind, ?id, "Handler subscribed");
        id
    }

    /// Remove a handler. Returns `false` if it was not registered for `kind`.
    pub fn unsubscribe(&self, kind: EventKind, id: SubscriptionId) -> bool {
        let removed = self.registry(kind).remove(id);
        debug!(%kind, ?id, removed, "Handler unsubscribed");
        removed
    }

    /// Remove every handler of every kind, returning how many were removed.
    pub fn clear(&self) -> usize {
        EventKind::ALL.iter().map(|kind| self.registry(*kind).clear()).sum()
    }

    pub fn handler_count(&self, kind: EventKind) -> usize {
        self.registry(kind).len()
    }

    /// Deliver an event to the handlers and stream subscribers of its kind.
    pub fn publish(&self, event: LinkEvent) {
        let kind = event.kind();
        for handler in self.registry(kind).snapshot() {
            handler(&event);
        }

        // No stream subscribers is the common case, not an error
        let receivers = match event {
            LinkEvent::Telemetry(frame) => self.telemetry_tx.send(frame).unwrap_or(0),
            LinkEvent::Video(frame) => self.video_tx.send(frame).unwrap_or(0),
        };
        trace!(%kind, receivers, "Event published");
    }

    /// Telemetry frames as a stream, optionally rate limited.
    ///
    /// Throttled streams emit the first frame immediately and then at most one
    /// frame per interval, always the most recent. Frames a slow consumer
    /// misses are skipped rather than buffered without bound.
    pub fn telemetry_stream(
        &self,
        rate: UpdateRate,
    ) -> impl Stream<Item = Arc<TelemetryFrame>> + Send + 'static {
        let frames = skip_lagged(EventKind::Telemetry, self.telemetry_tx.subscribe());
        match rate.interval() {
            None => frames.boxed(),
            Some(interval) => frames.throttle(interval).boxed(),
        }
    }

    /// Reassembled video frames as a stream. Never throttled: dropping frames
    /// of an H.264 stream corrupts every frame that references them.
    pub fn video_stream(&self) -> impl Stream<Item = Arc<VideoFrame>> + Send + 'static {
        skip_lagged(EventKind::Video, self.video_tx.subscribe())
    }
}

fn skip_lagged<T>(
    kind: EventKind,
    rx: broadcast::Receiver<T>,
) -> impl Stream<Item = T> + Send + 'static
where
    T: Clone + Send + 'static,
{
    BroadcastStream::new(rx).filter_map(move |item| async move {
        match item {
            Ok(value) => Some(value),
            Err(BroadcastStreamRecvError::Lagged(skipped)) => {
                warn!(%kind, skipped, "Stream subscriber lagged, events skipped");
                None
            }
        }
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;
    use std::time::Duration;
    use tokio::time::timeout;

    fn telemetry(text: &str) -> LinkEvent {
        LinkEvent::Telemetry(Arc::new(TelemetryFrame::decode(text.as_bytes())))
    }

    fn video(bytes: &[u8]) -> LinkEvent {
        LinkEvent::Video(Arc::new(VideoFrame::new(bytes.to_vec(), 0)))
    }

    #[test]
    fn dispatches_by_kind() {
        let bus = EventBus::default();
        let seen = Arc::new(Mutex::new(Vec::new()));

        let sink = Arc::clone(&seen);
        bus.subscribe(EventKind::Telemetry, move |event| {
            sink.lock().unwrap().push(event.as_telemetry().unwrap().battery());
        });

        bus.publish(telemetry("bat:80;"));
        bus.publish(video(&[0, 0, 0, 1]));
        bus.publish(telemetry("bat:79;"));

        assert_eq!(*seen.lock().unwrap(), vec![Some(80.0), Some(79.0)]);
    }

    #[test]
    fn unsubscribe_is_per_kind() {
        let bus = EventBus::default();
        let id = bus.subscribe(EventKind::Video, |_| {});

        assert!(!bus.unsubscribe(EventKind::Telemetry, id));
        assert_eq!(bus.handler_count(EventKind::Video), 1);
        assert!(bus.unsubscribe(EventKind::Video, id));
        assert!(!bus.unsubscribe(EventKind::Video, id));
        assert_eq!(bus.handler_count(EventKind::Video), 0);
    }

    #[test]
    fn clear_removes_everything() {
        let bus = EventBus::default();
        bus.subscribe(EventKind::Video, |_| {});
        bus.subscribe(EventKind::Telemetry, |_| {});
        bus.subscribe(EventKind::Telemetry, |_| {});

        assert_eq!(bus.clear(), 3);
        assert_eq!(bus.clear(), 0);
    }

    #[test]
    fn handler_may_unsubscribe_itself() {
        let bus = Arc::new(EventBus::default());
        let calls = Arc::new(AtomicU64::new(0));
        let id_slot = Arc::new(Mutex::new(None));

        let (bus_ref, calls_ref, slot_ref) =
            (Arc::clone(&bus), Arc::clone(&calls), Arc::clone(&id_slot));
        let id = bus.subscribe(EventKind::Telemetry, move |_| {
            calls_ref.fetch_add(1, Ordering::SeqCst);
            if let Some(id) = *slot_ref.lock().unwrap() {
                bus_ref.unsubscribe(EventKind::Telemetry, id);
            }
        });
        *id_slot.lock().unwrap() = Some(id);

        bus.publish(telemetry("h:1;"));
        bus.publish(telemetry("h:2;"));
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn streams_receive_published_frames() {
        let bus = EventBus::default();
        let mut frames = Box::pin(bus.telemetry_stream(UpdateRate::Native));
        let mut videos = Box::pin(bus.video_stream());

        bus.publish(telemetry("tof:10;"));
        bus.publish(video(&[1, 2, 3]));

        let frame = timeout(Duration::from_secs(1), frames.next()).await.unwrap().unwrap();
        assert_eq!(frame.tof(), Some(10.0));
        let clip = timeout(Duration::from_secs(1), videos.next()).await.unwrap().unwrap();
        assert_eq!(clip.as_bytes(), &[1, 2, 3]);
    }

    #[tokio::test]
    async fn lagging_stream_skips_instead_of_ending() {
        let bus = EventBus::new(2);
        let mut frames = Box::pin(bus.telemetry_stream(UpdateRate::Native));

        for n in 0..5 {
            bus.publish(telemetry(&format!("h:{n};")));
        }

        let frame = timeout(Duration::from_secs(1), frames.next()).await.unwrap().unwrap();
        assert_eq!(frame.height(), Some(3.0));
    }
}
