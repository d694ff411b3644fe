//! In-process publish/subscribe feed carrying session state transitions to presentation
//! consumers (scoring, move history, audio cues).
//!
//! Publishing is synchronous: subscribers run on the publisher's task, in subscription
//! order. A subscriber that returns an error or panics is logged and skipped; the rest of
//! the subscribers still see the event.

use serde::Serialize;
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, RwLock};
use std::time::{SystemTime, UNIX_EPOCH};

use crate::enums::{Color, PieceKind};
use crate::errors::{MatchId, SubscriberError};
use crate::geometry::Cell;
use crate::pieces::PieceId;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum EventKind {
    MatchStart,
    MoveCommitted,
    PieceCaptured,
    PawnPromoted,
    KingCaptured,
    MatchEnd,
    MatchClosed,
}

pub const ALL_EVENT_KINDS: [EventKind; 7] = [
    EventKind::MatchStart,
    EventKind::MoveCommitted,
    EventKind::PieceCaptured,
    EventKind::PawnPromoted,
    EventKind::KingCaptured,
    EventKind::MatchEnd,
    EventKind::MatchClosed,
];

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum GameEvent {
    MatchStart,
    MoveCommitted {
        piece: PieceId,
        color: Color,
        from: Cell,
        to: Cell,
    },
    PieceCaptured {
        captured: PieceId,
        captured_kind: PieceKind,
        capturing: PieceId,
        at: Cell,
    },
    PawnPromoted {
        pawn: PieceId,
        queen: PieceId,
        at: Cell,
    },
    KingCaptured {
        king: PieceId,
        by: Color,
    },
    MatchEnd {
        winner: Color,
    },
    /// Session torn down; per-match observers drop their state.
    MatchClosed,
}

impl GameEvent {
    pub fn kind(&self) -> EventKind {
        match self {
            GameEvent::MatchStart => EventKind::MatchStart,
            GameEvent::MoveCommitted { .. } => EventKind::MoveCommitted,
            GameEvent::PieceCaptured { .. } => EventKind::PieceCaptured,
            GameEvent::PawnPromoted { .. } => EventKind::PawnPromoted,
            GameEvent::KingCaptured { .. } => EventKind::KingCaptured,
            GameEvent::MatchEnd { .. } => EventKind::MatchEnd,
            GameEvent::MatchClosed => EventKind::MatchClosed,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Event {
    pub match_id: MatchId,
    pub timestamp_ms: u64,
    #[serde(flatten)]
    pub payload: GameEvent,
}

impl Event {
    pub fn new(match_id: impl Into<MatchId>, payload: GameEvent) -> Self {
        Self {
            match_id: match_id.into(),
            timestamp_ms: now_ms(),
            payload,
        }
    }

    pub fn kind(&self) -> EventKind {
        self.payload.kind()
    }
}

fn now_ms() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_millis() as u64)
        .unwrap_or(0)
}

pub trait Subscriber: Send + Sync {
    fn name(&self) -> &str;

    fn on_event(&self, event: &Event) -> Result<(), SubscriberError>;
}

/// Adapter so plain closures can subscribe.
pub struct FnSubscriber<F> {
    name: String,
    handler: F,
}

impl<F> FnSubscriber<F>
where
    F: Fn(&Event) -> Result<(), SubscriberError> + Send + Sync,
{
    pub fn new(name: impl Into<String>, handler: F) -> Self {
        Self {
            name: name.into(),
            handler,
        }
    }
}

impl<F> Subscriber for FnSubscriber<F>
where
    F: Fn(&Event) -> Result<(), SubscriberError> + Send + Sync,
{
    fn name(&self) -> &str {
        &self.name
    }

    fn on_event(&self, event: &Event) -> Result<(), SubscriberError> {
        (self.handler)(event)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SubscriptionId(u64);

struct Registration {
    id: SubscriptionId,
    kinds: Vec<EventKind>,
    subscriber: Arc<dyn Subscriber>,
}

#[derive(Default)]
pub struct EventFeed {
    registrations: RwLock<Vec<Registration>>,
    next_id: AtomicU64,
}

impl EventFeed {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn subscribe(&self, kinds: &[EventKind], subscriber: Arc<dyn Subscriber>) -> SubscriptionId {
        let id = SubscriptionId(self.next_id.fetch_add(1, Ordering::Relaxed));
        log::debug!(
            "📮 Subscriber {} registered for {:?} ({:?})",
            subscriber.name(),
            kinds,
            id
        );
        let mut registrations = self
            .registrations
            .write()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        registrations.push(Registration {
            id,
            kinds: kinds.to_vec(),
            subscriber,
        });
        id
    }

    pub fn subscribe_fn<F>(&self, kinds: &[EventKind], name: &str, handler: F) -> SubscriptionId
    where
        F: Fn(&Event) -> Result<(), SubscriberError> + Send + Sync + 'static,
    {
        self.subscribe(kinds, Arc::new(FnSubscriber::new(name, handler)))
    }

    pub fn unsubscribe(&self, id: SubscriptionId) -> bool {
        let mut registrations = self
            .registrations
            .write()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        let before = registrations.len();
        registrations.retain(|registration| registration.id != id);
        registrations.len() != before
    }

    pub fn subscriber_count(&self) -> usize {
        self.registrations
            .read()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .len()
    }

    /// Delivers `event` to every subscriber of its kind. Returns how many handled it cleanly.
    pub fn publish(&self, event: &Event) -> usize {
        let kind = event.kind();
        // Snapshot first so subscribers may (un)subscribe from inside a handler.
        let targets: Vec<Arc<dyn Subscriber>> = self
            .registrations
            .read()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .iter()
            .filter(|registration| registration.kinds.contains(&kind))
            .map(|registration| registration.subscriber.clone())
            .collect();

        let mut delivered = 0;
        for subscriber in targets {
            match catch_unwind(AssertUnwindSafe(|| subscriber.on_event(event))) {
                Ok(Ok(())) => delivered += 1,
                Ok(Err(e)) => {
                    log::error!(
                        "❌ Subscriber {} rejected {:?} for match {}: {}",
                        subscriber.name(),
                        kind,
                        event.match_id,
                        e
                    );
                }
                Err(_) => {
                    log::error!(
                        "💥 Subscriber {} panicked on {:?} for match {}",
                        subscriber.name(),
                        kind,
                        event.match_id
                    );
                }
            }
        }
        delivered
    }

    pub fn emit(&self, match_id: &str, payload: GameEvent) -> usize {
        self.publish(&Event::new(match_id, payload))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;

    fn recorder(feed: &EventFeed, kinds: &[EventKind], name: &'static str, log: Arc<Mutex<Vec<String>>>) {
        feed.subscribe_fn(kinds, name, move |event| {
            log.lock().unwrap().push(format!("{}:{:?}", name, event.kind()));
            Ok(())
        });
    }

    #[test]
    fn test_subscribers_run_in_subscription_order() {
        let feed = EventFeed::new();
        let log = Arc::new(Mutex::new(Vec::new()));
        recorder(&feed, &[EventKind::MatchStart], "first", log.clone());
        recorder(&feed, &ALL_EVENT_KINDS, "second", log.clone());
        recorder(&feed, &[EventKind::MatchEnd], "third", log.clone());

        assert_eq!(feed.emit("m1", GameEvent::MatchStart), 2);
        assert_eq!(
            feed.emit("m1", GameEvent::MatchEnd { winner: Color::Black }),
            2
        );
        assert_eq!(
            *log.lock().unwrap(),
            vec![
                "first:MatchStart",
                "second:MatchStart",
                "second:MatchEnd",
                "third:MatchEnd"
            ]
        );
    }

    #[test]
    fn test_failing_subscribers_are_isolated() {
        let feed = EventFeed::new();
        let log = Arc::new(Mutex::new(Vec::new()));
        feed.subscribe_fn(&[EventKind::MatchStart], "broken", |_| {
            Err(SubscriberError::failed("broken", "boom"))
        });
        feed.subscribe_fn(&[EventKind::MatchStart], "panicky", |_| {
            panic!("subscriber blew up");
        });
        recorder(&feed, &[EventKind::MatchStart], "healthy", log.clone());

        assert_eq!(feed.emit("m1", GameEvent::MatchStart), 1);
        assert_eq!(*log.lock().unwrap(), vec!["healthy:MatchStart"]);
    }

    #[test]
    fn test_unsubscribe() {
        let feed = EventFeed::new();
        let id = feed.subscribe_fn(&ALL_EVENT_KINDS, "temp", |_| Ok(()));
        assert_eq!(feed.subscriber_count(), 1);
        assert!(feed.unsubscribe(id));
        assert!(!feed.unsubscribe(id));
        assert_eq!(feed.emit("m1", GameEvent::MatchClosed), 0);
    }

    #[test]
    fn test_event_serialization() {
        let event = Event {
            match_id: "m1".to_string(),
            timestamp_ms: 42,
            payload: GameEvent::PawnPromoted {
                pawn: PieceId::from("PW4"),
                queen: PieceId::from("QW1"),
                at: Cell::new(4, 0),
            },
        };
        let value = serde_json::to_value(&event).unwrap();
        assert_eq!(value["kind"], "pawn_promoted");
        assert_eq!(value["queen"], "QW1");
        assert_eq!(value["at"], serde_json::json!([4, 0]));
        assert_eq!(value["timestamp_ms"], 42);
    }
}
