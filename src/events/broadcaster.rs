//! Best-effort fan-out of events to subscribers.
//!
//! Every subscriber owns a bounded mailbox. Publishing uses `try_send`, so a
//! slow subscriber loses events (counted per subscriber) instead of stalling
//! the scheduler. Dropped events are not replayed.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex};

use tokio::sync::mpsc::{self, error::TrySendError};
use tracing::{debug, trace};

use crate::core::task::TaskId;
use crate::events::{Event, EventKind, EventSink, SessionSource, GLOBAL};
use crate::util::lock;

pub const DEFAULT_MAILBOX_CAPACITY: usize = 100;

/// What a subscriber listens to.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum Topic {
    Task(TaskId),
    /// Every task plus session-wide events.
    All,
}

impl Topic {
    /// Parse a topic name; `*` means every task.
    pub fn parse(name: &str) -> Self {
        if name == GLOBAL {
            Topic::All
        } else {
            Topic::Task(TaskId::from(name))
        }
    }

    fn matches(&self, event: &Event) -> bool {
        match self {
            Topic::All => true,
            Topic::Task(id) => event.task_id.as_ref() == Some(id),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct SubscriberId(pub u64);

impl std::fmt::Display for SubscriberId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "sub-{}", self.0)
    }
}

/// Receiving end of a subscription.
pub struct Subscription {
    id: SubscriberId,
    rx: mpsc::Receiver<Event>,
    dropped: Arc<AtomicU64>,
}

impl Subscription {
    pub fn id(&self) -> SubscriberId {
        self.id
    }

    pub async fn recv(&mut self) -> Option<Event> {
        self.rx.recv().await
    }

    pub fn try_recv(&mut self) -> Option<Event> {
        self.rx.try_recv().ok()
    }

    /// Drain every event currently in the mailbox.
    pub fn drain(&mut self) -> Vec<Event> {
        let mut events = Vec::new();
        while let Ok(event) = self.rx.try_recv() {
            events.push(event);
        }
        events
    }

    /// Events discarded because the mailbox was full.
    pub fn dropped(&self) -> u64 {
        self.dropped.load(Ordering::Relaxed)
    }
}

struct Subscriber {
    topic: Topic,
    tx: mpsc::Sender<Event>,
    dropped: Arc<AtomicU64>,
}

pub struct EventBroadcaster {
    capacity: usize,
    subscribers: Mutex<HashMap<SubscriberId, Subscriber>>,
    next_id: AtomicU64,
    session: Option<Arc<dyn SessionSource>>,
    closed: AtomicBool,
}

impl Default for EventBroadcaster {
    fn default() -> Self {
        Self::new(DEFAULT_MAILBOX_CAPACITY)
    }
}

impl EventBroadcaster {
    pub fn new(capacity: usize) -> Self {
        Self {
            capacity: capacity.max(1),
            subscribers: Mutex::new(HashMap::new()),
            next_id: AtomicU64::new(1),
            session: None,
            closed: AtomicBool::new(false),
        }
    }

    /// Source of the summary sent to each wildcard subscriber on subscribe.
    /// Without one, subscribers get an empty summary.
    pub fn with_session(mut self, session: Arc<dyn SessionSource>) -> Self {
        self.session = Some(session);
        self
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    pub fn subscribe(&self, topic: Topic) -> Subscription {
        let id = SubscriberId(self.next_id.fetch_add(1, Ordering::Relaxed));
        let (tx, rx) = mpsc::channel(self.capacity);
        let dropped = Arc::new(AtomicU64::new(0));

        if self.closed.load(Ordering::SeqCst) {
            // The sender drops here, so the subscription reads as closed.
            return Subscription { id, rx, dropped };
        }

        if topic == Topic::All {
            let summary = self
                .session
                .as_ref()
                .map(|session| session.summary())
                .unwrap_or_default();
            let _ = tx.try_send(Event::global(EventKind::SessionUpdate(summary)));
        }

        debug!(subscriber = %id, topic = ?topic, "subscribed");
        lock(&self.subscribers).insert(
            id,
            Subscriber {
                topic,
                tx,
                dropped: dropped.clone(),
            },
        );
        Subscription { id, rx, dropped }
    }

    pub fn unsubscribe(&self, id: SubscriberId) -> bool {
        lock(&self.subscribers).remove(&id).is_some()
    }

    pub fn subscriber_count(&self) -> usize {
        lock(&self.subscribers).len()
    }

    /// Stop delivering. Existing mailboxes close once drained.
    pub fn close(&self) {
        self.closed.store(true, Ordering::SeqCst);
        lock(&self.subscribers).clear();
    }

    fn deliver(&self, event: Event) {
        if self.closed.load(Ordering::SeqCst) {
            return;
        }
        let mut subscribers = lock(&self.subscribers);
        let mut gone = Vec::new();
        for (id, sub) in subscribers.iter() {
            if !sub.topic.matches(&event) {
                continue;
            }
            match sub.tx.try_send(event.clone()) {
                Ok(()) => {}
                Err(TrySendError::Full(_)) => {
                    sub.dropped.fetch_add(1, Ordering::Relaxed);
                    trace!(subscriber = %id, "mailbox full, event dropped");
                }
                Err(TrySendError::Closed(_)) => gone.push(*id),
            }
        }
        for id in gone {
            subscribers.remove(&id);
            debug!(subscriber = %id, "pruned closed subscriber");
        }
    }
}

impl EventSink for EventBroadcaster {
    fn publish(&self, event: Event) {
        self.deliver(event);
    }
}
