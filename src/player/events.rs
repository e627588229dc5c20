//! Event plumbing between engine threads and the consumer thread
//!
//! [`EngineEventQueue`] is the sink engines notify. It only records events;
//! the controller drains it once per tick. [`EventDispatcher`] fans player
//! notifications out to subscribers on the consumer thread.

use super::PlayerEvent;
use crate::engine::{EngineEvent, EngineNotify};
use log::trace;
use parking_lot::{Mutex, RwLock};
use std::collections::VecDeque;
use std::mem;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Weak};

/// One engine notification as it was raised
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct QueuedEvent {
    pub event: EngineEvent,
    pub param1: usize,
    pub param2: u32,
}

/// FIFO mailbox filled from engine threads
#[derive(Debug, Default)]
pub struct EngineEventQueue {
    events: Mutex<VecDeque<QueuedEvent>>,
}

impl EngineEventQueue {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&self, event: QueuedEvent) {
        self.events.lock().push_back(event);
    }

    /// Take every queued event, oldest first
    pub fn drain(&self) -> VecDeque<QueuedEvent> {
        mem::take(&mut *self.events.lock())
    }

    pub fn len(&self) -> usize {
        self.events.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.events.lock().is_empty()
    }
}

impl EngineNotify for EngineEventQueue {
    fn event_notify(&self, event: EngineEvent, param1: usize, param2: u32) {
        trace!("Queued {} ({}, {})", event, param1, param2);
        self.push(QueuedEvent {
            event,
            param1,
            param2,
        });
    }
}

type Callback = Arc<dyn Fn(PlayerEvent) + Send + Sync>;
type Subscribers = RwLock<Vec<(u64, Callback)>>;

/// Subscriber list for player notifications
#[derive(Default)]
pub struct EventDispatcher {
    subscribers: Arc<Subscribers>,
    next_id: AtomicU64,
}

impl EventDispatcher {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn subscribe<F>(&self, callback: F) -> EventSubscription
    where
        F: Fn(PlayerEvent) + Send + Sync + 'static,
    {
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        self.subscribers.write().push((id, Arc::new(callback)));

        EventSubscription {
            id,
            subscribers: Arc::downgrade(&self.subscribers),
        }
    }

    /// Call every subscriber with `event`
    ///
    /// The list is snapshotted first, so callbacks may subscribe or drop
    /// subscriptions while being called.
    pub fn dispatch(&self, event: PlayerEvent) {
        let callbacks: Vec<Callback> = self
            .subscribers
            .read()
            .iter()
            .map(|(_, callback)| Arc::clone(callback))
            .collect();
        for callback in callbacks {
            callback(event);
        }
    }

    pub fn subscriber_count(&self) -> usize {
        self.subscribers.read().len()
    }
}

/// Keeps a callback subscribed; dropping it unsubscribes
#[must_use = "dropping the subscription unsubscribes immediately"]
pub struct EventSubscription {
    id: u64,
    subscribers: Weak<Subscribers>,
}

impl Drop for EventSubscription {
    fn drop(&mut self) {
        if let Some(subscribers) = self.subscribers.upgrade() {
            subscribers.write().retain(|(id, _)| *id != self.id);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::thread;

    #[test]
    fn test_queue_preserves_emission_order() {
        let queue = Arc::new(EngineEventQueue::new());
        let producer = Arc::clone(&queue);
        thread::spawn(move || {
            producer.event_notify(EngineEvent::DurationChange, 0, 0);
            producer.event_notify(EngineEvent::LoadedMetadata, 0, 0);
            producer.event_notify(EngineEvent::Error, 3, 7);
        })
        .join()
        .unwrap();

        assert_eq!(queue.len(), 3);
        let drained: Vec<_> = queue.drain().into_iter().collect();
        assert_eq!(
            drained.iter().map(|e| e.event).collect::<Vec<_>>(),
            vec![EngineEvent::DurationChange, EngineEvent::LoadedMetadata, EngineEvent::Error]
        );
        assert_eq!((drained[2].param1, drained[2].param2), (3, 7));
        assert!(queue.is_empty());
    }

    #[test]
    fn test_dropped_subscription_stops_delivery() {
        let dispatcher = EventDispatcher::new();
        let seen = Arc::new(Mutex::new(Vec::new()));

        let sink = Arc::clone(&seen);
        let first = dispatcher.subscribe(move |e| sink.lock().push(("first", e)));
        let sink = Arc::clone(&seen);
        let _second = dispatcher.subscribe(move |e| sink.lock().push(("second", e)));

        dispatcher.dispatch(PlayerEvent::Play);
        drop(first);
        dispatcher.dispatch(PlayerEvent::Pause);

        assert_eq!(
            *seen.lock(),
            vec![
                ("first", PlayerEvent::Play),
                ("second", PlayerEvent::Play),
                ("second", PlayerEvent::Pause),
            ]
        );
        assert_eq!(dispatcher.subscriber_count(), 1);
    }

    #[test]
    fn test_subscription_outliving_dispatcher() {
        let dispatcher = EventDispatcher::new();
        let subscription = dispatcher.subscribe(|_| {});
        drop(dispatcher);
        drop(subscription);
    }
}
