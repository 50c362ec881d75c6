//! Bounded log of processing events with synchronous subscribers.
//!
//! The log keeps the most recent events up to its capacity and drops the
//! oldest beyond it. Subscribers run on the emitting task, in subscription
//! order. A subscriber that returns an error or panics is logged and skipped;
//! the emitter never sees the failure.

use std::collections::VecDeque;
use std::panic::{AssertUnwindSafe, catch_unwind};
use std::sync::{Arc, Mutex, PoisonError, RwLock};

use tracing::{info, warn};

use pagegraph_shared::{PageId, ProcessingEvent, Result};

/// Observer of processing events.
pub trait EventSubscriber: Send + Sync {
    fn handle(&self, event: &ProcessingEvent) -> Result<()>;
}

impl<F> EventSubscriber for F
where
    F: Fn(&ProcessingEvent) -> Result<()> + Send + Sync,
{
    fn handle(&self, event: &ProcessingEvent) -> Result<()> {
        self(event)
    }
}

/// Default number of events kept by [`EventSystem::new`].
pub const DEFAULT_EVENT_LOG_CAPACITY: usize = 10_000;

/// In-memory event log plus subscriber fan-out.
pub struct EventSystem {
    log: Mutex<VecDeque<ProcessingEvent>>,
    capacity: usize,
    subscribers: RwLock<Vec<Arc<dyn EventSubscriber>>>,
    logging_enabled: bool,
}

impl Default for EventSystem {
    fn default() -> Self {
        Self::with_capacity(false, DEFAULT_EVENT_LOG_CAPACITY)
    }
}

impl std::fmt::Debug for EventSystem {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EventSystem")
            .field("events", &self.len())
            .field("capacity", &self.capacity)
            .field("subscribers", &self.subscriber_count())
            .field("logging_enabled", &self.logging_enabled)
            .finish()
    }
}

impl EventSystem {
    /// `logging_enabled` mirrors every event into the `tracing` log.
    pub fn new(logging_enabled: bool) -> Self {
        Self::with_capacity(logging_enabled, DEFAULT_EVENT_LOG_CAPACITY)
    }

    /// Keep at most `capacity` events. Zero records nothing; subscribers
    /// still see every event.
    pub fn with_capacity(logging_enabled: bool, capacity: usize) -> Self {
        Self {
            log: Mutex::new(VecDeque::new()),
            capacity,
            subscribers: RwLock::new(Vec::new()),
            logging_enabled,
        }
    }

    /// Register a subscriber. It sees only events emitted after this call.
    pub fn subscribe(&self, subscriber: impl EventSubscriber + 'static) {
        self.subscribers
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .push(Arc::new(subscriber));
    }

    /// Append `event` and deliver it to every subscriber.
    pub fn emit(&self, event: ProcessingEvent) {
        if self.logging_enabled {
            log_event(&event);
        }

        // Deliver against a copy of the list so subscribers may subscribe.
        let subscribers: Vec<Arc<dyn EventSubscriber>> = self
            .subscribers
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone();

        for (index, subscriber) in subscribers.iter().enumerate() {
            match catch_unwind(AssertUnwindSafe(|| subscriber.handle(&event))) {
                Ok(Ok(())) => {}
                Ok(Err(e)) => {
                    warn!(subscriber = index, stage = %event.stage, error = %e, "event subscriber failed");
                }
                Err(_) => {
                    warn!(subscriber = index, stage = %event.stage, "event subscriber panicked");
                }
            }
        }

        if self.capacity == 0 {
            return;
        }
        let mut log = self.log.lock().unwrap_or_else(PoisonError::into_inner);
        while log.len() >= self.capacity {
            log.pop_front();
        }
        log.push_back(event);
    }

    /// Recorded events, oldest first.
    pub fn events(&self) -> Vec<ProcessingEvent> {
        self.log
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .iter()
            .cloned()
            .collect()
    }

    /// Take the recorded events, oldest first, leaving the log empty.
    pub fn drain(&self) -> Vec<ProcessingEvent> {
        self.log
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .drain(..)
            .collect()
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Events for one page, oldest first.
    pub fn events_for(&self, page_id: PageId) -> Vec<ProcessingEvent> {
        self.log
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .iter()
            .filter(|e| e.page_id == page_id)
            .cloned()
            .collect()
    }

    /// Drop the recorded log. Subscribers stay registered.
    pub fn clear(&self) {
        self.log.lock().unwrap_or_else(PoisonError::into_inner).clear();
    }

    pub fn len(&self) -> usize {
        self.log.lock().unwrap_or_else(PoisonError::into_inner).len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn subscriber_count(&self) -> usize {
        self.subscribers
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }
}

fn log_event(event: &ProcessingEvent) {
    let component = event
        .component
        .as_ref()
        .map(ToString::to_string)
        .unwrap_or_default();
    if event.is_error() {
        warn!(
            page_id = %event.page_id,
            url = %event.url,
            stage = %event.stage,
            component,
            message = %event.message,
            "pipeline event"
        );
    } else {
        info!(
            page_id = %event.page_id,
            url = %event.url,
            stage = %event.stage,
            component,
            message = %event.message,
            "pipeline event"
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pagegraph_shared::{EventStatus, Page, PipelineError, Stage};

    fn event(page: &Page, stage: Stage, msg: &str) -> ProcessingEvent {
        ProcessingEvent::new(page, stage, EventStatus::Ok, msg)
    }

    #[test]
    fn delivers_in_emission_order() {
        let events = EventSystem::new(false);
        let seen = Arc::new(Mutex::new(Vec::new()));
        let sink = Arc::clone(&seen);
        events.subscribe(move |e: &ProcessingEvent| -> Result<()> {
            sink.lock().unwrap().push(e.message.clone());
            Ok(())
        });

        let page = Page::new("https://example.com/", "").unwrap();
        for msg in ["one", "two", "three"] {
            events.emit(event(&page, Stage::Initialize, msg));
        }
        assert_eq!(*seen.lock().unwrap(), vec!["one", "two", "three"]);
        assert_eq!(events.len(), 3);
    }

    #[test]
    fn failing_subscribers_are_contained() {
        let events = EventSystem::new(true);
        let count = Arc::new(Mutex::new(0));
        events.subscribe(|_: &ProcessingEvent| -> Result<()> {
            Err(PipelineError::processing("observer down"))
        });
        events.subscribe(|_: &ProcessingEvent| -> Result<()> { panic!("observer bug") });
        let counter = Arc::clone(&count);
        events.subscribe(move |_: &ProcessingEvent| -> Result<()> {
            *counter.lock().unwrap() += 1;
            Ok(())
        });

        let page = Page::new("https://example.com/", "").unwrap();
        events.emit(event(&page, Stage::Metadata, "still delivered"));

        assert_eq!(*count.lock().unwrap(), 1);
        assert_eq!(events.events()[0].message, "still delivered");
    }

    #[test]
    fn filters_by_page_and_clears() {
        let events = EventSystem::new(false);
        let a = Page::new("https://example.com/a", "").unwrap();
        let b = Page::new("https://example.com/b", "").unwrap();
        events.emit(event(&a, Stage::Initialize, "a1"));
        events.emit(event(&b, Stage::Initialize, "b1"));
        events.emit(event(&a, Stage::Metadata, "a2"));

        let for_a: Vec<_> = events.events_for(a.id).into_iter().map(|e| e.message).collect();
        assert_eq!(for_a, vec!["a1", "a2"]);

        events.clear();
        assert!(events.is_empty());
        assert!(events.events_for(b.id).is_empty());
    }

    #[test]
    fn log_keeps_only_the_newest_events() {
        let events = EventSystem::with_capacity(false, 2);
        let delivered = Arc::new(Mutex::new(0));
        let counter = Arc::clone(&delivered);
        events.subscribe(move |_: &ProcessingEvent| -> Result<()> {
            *counter.lock().unwrap() += 1;
            Ok(())
        });

        let page = Page::new("https://example.com/", "").unwrap();
        for msg in ["one", "two", "three"] {
            events.emit(event(&page, Stage::Initialize, msg));
        }

        assert_eq!(*delivered.lock().unwrap(), 3);
        let kept: Vec<_> = events.drain().into_iter().map(|e| e.message).collect();
        assert_eq!(kept, vec!["two", "three"]);
        assert!(events.is_empty());
    }

    #[test]
    fn zero_capacity_records_nothing() {
        let events = EventSystem::with_capacity(false, 0);
        let page = Page::new("https://example.com/", "").unwrap();
        events.emit(event(&page, Stage::Initialize, "gone"));
        assert!(events.is_empty());
        assert_eq!(events.capacity(), 0);
    }

    #[test]
    fn late_subscriber_sees_only_new_events() {
        let events = EventSystem::new(false);
        let page = Page::new("https://example.com/", "").unwrap();
        events.emit(event(&page, Stage::Initialize, "before"));

        let seen = Arc::new(Mutex::new(Vec::new()));
        let sink = Arc::clone(&seen);
        events.subscribe(move |e: &ProcessingEvent| -> Result<()> {
            sink.lock().unwrap().push(e.message.clone());
            Ok(())
        });
        events.emit(event(&page, Stage::Metadata, "after"));

        assert_eq!(*seen.lock().unwrap(), vec!["after"]);
        assert_eq!(events.subscriber_count(), 1);
    }
}
