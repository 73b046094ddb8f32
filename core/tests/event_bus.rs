//! Event bus tests.
//!
//! Tests cover: ordering, dedup, mutation of the subscriber table from inside
//! a dispatch, re-entrant publish, concurrent use, the recording decorator.

use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::{Arc, Mutex};
use std::thread;
use tactics_core::{
    event::{EventKind, GameEvent},
    event_bus::{EventBus, Handler, RecordingEventBus, SubscriptionId, SyncEventBus},
};

fn end_round() -> GameEvent {
    GameEvent::EndRound { round: 1 }
}

fn counting(counter: &Arc<AtomicU32>) -> Handler {
    let counter = Arc::clone(counter);
    Arc::new(move |_event: &GameEvent| {
        counter.fetch_add(1, Ordering::Relaxed);
    })
}

#[test]
fn handlers_run_once_in_registration_order() {
    let bus = SyncEventBus::new();
    let order = Arc::new(Mutex::new(Vec::new()));

    for tag in ["a", "b", "c"] {
        let order = Arc::clone(&order);
        bus.subscribe(EventKind::EndRound, Arc::new(move |_: &GameEvent| {
            order.lock().unwrap().push(tag);
        }));
    }

    bus.publish(&end_round());
    assert_eq!(*order.lock().unwrap(), vec!["a", "b", "c"]);
}

#[test]
fn events_only_reach_their_own_kind() {
    let bus = SyncEventBus::new();
    let rounds = Arc::new(AtomicU32::new(0));
    let turns = Arc::new(AtomicU32::new(0));
    bus.subscribe(EventKind::EndRound, counting(&rounds));
    bus.subscribe(EventKind::EndTurn, counting(&turns));

    bus.publish(&GameEvent::EndTurn { player: "p1".into(), round: 1 });
    bus.publish(&GameEvent::EndTurn { player: "p2".into(), round: 1 });
    bus.publish(&end_round());

    assert_eq!(turns.load(Ordering::Relaxed), 2);
    assert_eq!(rounds.load(Ordering::Relaxed), 1);
}

#[test]
fn same_handler_subscribed_twice_runs_once() {
    let bus = SyncEventBus::new();
    let counter = Arc::new(AtomicU32::new(0));
    let handler = counting(&counter);

    let first = bus.subscribe(EventKind::EndRound, Arc::clone(&handler));
    let second = bus.subscribe(EventKind::EndRound, handler);
    assert_eq!(first, second);
    assert_eq!(bus.subscriber_count(EventKind::EndRound), 1);

    bus.publish(&end_round());
    assert_eq!(counter.load(Ordering::Relaxed), 1);
}

#[test]
fn unsubscribe_reports_whether_anything_was_removed() {
    let bus = SyncEventBus::new();
    let counter = Arc::new(AtomicU32::new(0));
    let id = bus.subscribe(EventKind::EndRound, counting(&counter));

    assert!(!bus.unsubscribe(EventKind::EndTurn, id), "wrong kind");
    assert!(bus.unsubscribe(EventKind::EndRound, id));
    assert!(!bus.unsubscribe(EventKind::EndRound, id), "already gone");

    bus.publish(&end_round());
    assert_eq!(counter.load(Ordering::Relaxed), 0);
}

/// A handler that unsubscribes itself mid-dispatch does not disturb the
/// other handlers of the same publish.
#[test]
fn self_unsubscribe_during_dispatch_keeps_the_pass_intact() {
    let bus = Arc::new(SyncEventBus::new());
    let before = Arc::new(AtomicU32::new(0));
    let after = Arc::new(AtomicU32::new(0));
    let quitter_calls = Arc::new(AtomicU32::new(0));
    let quitter_id: Arc<Mutex<Option<SubscriptionId>>> = Arc::new(Mutex::new(None));

    bus.subscribe(EventKind::EndRound, counting(&before));
    {
        let bus_ref = Arc::clone(&bus);
        let id_slot = Arc::clone(&quitter_id);
        let calls = Arc::clone(&quitter_calls);
        let id = bus.subscribe(EventKind::EndRound, Arc::new(move |_: &GameEvent| {
            calls.fetch_add(1, Ordering::Relaxed);
            if let Some(id) = *id_slot.lock().unwrap() {
                bus_ref.unsubscribe(EventKind::EndRound, id);
            }
        }));
        *quitter_id.lock().unwrap() = Some(id);
    }
    bus.subscribe(EventKind::EndRound, counting(&after));

    bus.publish(&end_round());
    assert_eq!(before.load(Ordering::Relaxed), 1);
    assert_eq!(quitter_calls.load(Ordering::Relaxed), 1);
    assert_eq!(after.load(Ordering::Relaxed), 1, "handler after the quitter must not be skipped");

    bus.publish(&end_round());
    assert_eq!(quitter_calls.load(Ordering::Relaxed), 1, "quitter must stay unsubscribed");
    assert_eq!(before.load(Ordering::Relaxed), 2);
    assert_eq!(after.load(Ordering::Relaxed), 2);
}

/// Table changes made during a dispatch apply from the next publish on.
#[test]
fn dispatch_uses_a_snapshot_of_subscribers() {
    let bus = Arc::new(SyncEventBus::new());
    let victim = Arc::new(AtomicU32::new(0));
    let late = Arc::new(AtomicU32::new(0));
    let victim_id = Arc::new(Mutex::new(None));

    {
        let bus_ref = Arc::clone(&bus);
        let victim_id = Arc::clone(&victim_id);
        let late_handler = counting(&late);
        bus.subscribe(EventKind::EndRound, Arc::new(move |_: &GameEvent| {
            if let Some(id) = victim_id.lock().unwrap().take() {
                bus_ref.unsubscribe(EventKind::EndRound, id);
            }
            bus_ref.subscribe(EventKind::EndRound, Arc::clone(&late_handler));
        }));
    }
    *victim_id.lock().unwrap() = Some(bus.subscribe(EventKind::EndRound, counting(&victim)));

    bus.publish(&end_round());
    assert_eq!(victim.load(Ordering::Relaxed), 1, "removed mid-dispatch, still in this pass");
    assert_eq!(late.load(Ordering::Relaxed), 0, "added mid-dispatch, not in this pass");

    bus.publish(&end_round());
    assert_eq!(victim.load(Ordering::Relaxed), 1);
    assert_eq!(late.load(Ordering::Relaxed), 1);
}

#[test]
fn handlers_may_publish_reentrantly() {
    let bus = Arc::new(SyncEventBus::new());
    let rounds_seen = Arc::new(AtomicU32::new(0));
    {
        let bus_ref = Arc::clone(&bus);
        bus.subscribe(EventKind::EndTurn, Arc::new(move |_: &GameEvent| {
            bus_ref.publish(&GameEvent::EndRound { round: 7 });
        }));
    }
    bus.subscribe(EventKind::EndRound, counting(&rounds_seen));

    bus.publish(&GameEvent::EndTurn { player: "p1".into(), round: 7 });
    assert_eq!(rounds_seen.load(Ordering::Relaxed), 1);
}

#[test]
fn concurrent_subscribe_and_publish() {
    let bus = Arc::new(SyncEventBus::new());
    let hits = Arc::new(AtomicU32::new(0));

    let subscribers: Vec<_> = (0..4)
        .map(|_| {
            let bus = Arc::clone(&bus);
            let hits = Arc::clone(&hits);
            thread::spawn(move || {
                for _ in 0..100 {
                    let id = bus.subscribe(EventKind::EndRound, counting(&hits));
                    bus.unsubscribe(EventKind::EndRound, id);
                }
            })
        })
        .collect();
    let publisher = {
        let bus = Arc::clone(&bus);
        thread::spawn(move || {
            for _ in 0..200 {
                bus.publish(&end_round());
            }
        })
    };

    for handle in subscribers {
        handle.join().expect("subscriber thread");
    }
    publisher.join().expect("publisher thread");
    assert_eq!(bus.subscriber_count(EventKind::EndRound), 0);
}

#[test]
fn recording_bus_logs_and_forwards() {
    let bus = RecordingEventBus::new();
    let counter = Arc::new(AtomicU32::new(0));
    bus.subscribe(EventKind::EndRound, counting(&counter));

    bus.publish(&GameEvent::EndTurn { player: "p1".into(), round: 1 });
    bus.publish(&end_round());

    assert_eq!(counter.load(Ordering::Relaxed), 1);
    assert_eq!(bus.count(EventKind::EndTurn), 1);
    assert_eq!(bus.count(EventKind::EndRound), 1);
    assert_eq!(bus.events().len(), 2);

    let drained = bus.drain();
    assert_eq!(drained[1], end_round());
    assert!(bus.events().is_empty());
}

#[test]
fn events_serialize_with_a_type_tag() {
    let json = serde_json::to_string(&GameEvent::EndTurn { player: "p1".into(), round: 3 }).unwrap();
    assert_eq!(json, r#"{"type":"end_turn","player":"p1","round":3}"#);
}
