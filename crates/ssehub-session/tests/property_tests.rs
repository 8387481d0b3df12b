//! Property-based tests for session delivery and key allocation.

use std::collections::HashSet;
use std::sync::Arc;

use proptest::prelude::*;

use ssehub_core::{ClientInfo, Event, SessionKey, StreamSettings};
use ssehub_session::SessionRegistry;

fn runtime() -> tokio::runtime::Runtime {
    tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()
        .unwrap()
}

fn requested_key() -> impl Strategy<Value = Option<String>> {
    prop::option::of(prop::sample::select(vec!["a", "b", "c"]).prop_map(String::from))
}

proptest! {
    #[test]
    fn frames_arrive_in_send_order(bodies in prop::collection::vec("[a-z0-9 ]{0,12}", 0..40)) {
        let delivered = runtime().block_on(async {
            let registry = SessionRegistry::with_settings(StreamSettings {
                queue_capacity: 64,
                ..StreamSettings::default()
            });
            let (session, mut events) = registry.open(None, ClientInfo::default());
            for body in &bodies {
                session.send(Event::new("n", body.clone())).await.unwrap();
            }
            let mut delivered = Vec::new();
            while let Ok(event) = events.try_recv() {
                delivered.push(event.data);
            }
            delivered
        });
        prop_assert_eq!(delivered, bodies);
    }

    #[test]
    fn live_keys_never_collide(requests in prop::collection::vec(requested_key(), 1..20)) {
        let registry = SessionRegistry::new();
        let mut held = HashSet::new();
        let mut receivers = Vec::new();

        for requested in &requests {
            let (session, events) =
                registry.open(requested.as_deref().map(SessionKey::from), ClientInfo::default());
            if let Some(requested) = requested {
                let was_free = !held.contains(&SessionKey::from(requested.as_str()));
                prop_assert_eq!(session.key().as_str() == requested, was_free);
            }
            prop_assert!(held.insert(session.key().clone()));
            receivers.push(events);
        }
        prop_assert_eq!(registry.len(), requests.len());
    }
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(16))]

    #[test]
    fn stuck_session_is_dropped_others_unaffected(healthy in 1usize..6) {
        let (delivered, remaining, received) = runtime().block_on(async {
            let registry = Arc::new(SessionRegistry::with_settings(StreamSettings {
                queue_capacity: 1,
                delivery_timeout_ms: 20,
                ..StreamSettings::default()
            }));
            let (stuck, _stuck_events) = registry.open(Some(SessionKey::from("stuck")), ClientInfo::default());
            stuck.send(Event::new("fill", "x")).await.unwrap();

            let mut receivers = Vec::new();
            for _ in 0..healthy {
                receivers.push(registry.open(None, ClientInfo::default()).1);
            }

            let delivered = registry.broadcast(Event::new("tick", "1")).await;
            let received = receivers
                .iter_mut()
                .map(|events| matches!(events.try_recv(), Ok(event) if event.data == "1"))
                .filter(|ok| *ok)
                .count();
            (delivered, registry.len(), received)
        });

        prop_assert_eq!(delivered, healthy);
        prop_assert_eq!(remaining, healthy);
        prop_assert_eq!(received, healthy);
    }
}
