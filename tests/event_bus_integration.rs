// SPDX-License-Identifier: MPL-2.0
// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Integration tests for the event bus on virtual time.

use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use espnet::event::{BusConfig, EventBus, EventCallback, SubscriptionInfo};
use espnet::{Error, ErrorCategory};
use parking_lot::Mutex;
use tokio::time::sleep;

/// Returns a callback counting its invocations.
fn counting() -> (Arc<AtomicUsize>, EventCallback) {
    let hits = Arc::new(AtomicUsize::new(0));
    let sink = Arc::clone(&hits);
    let cb = EventCallback::new(move |_| {
        sink.fetch_add(1, Ordering::SeqCst);
    });
    (hits, cb)
}

/// Lets pending default-delay deliveries run.
async fn settle() {
    sleep(Duration::from_millis(20)).await;
}

// ============================================================================
// Subscription Table
// ============================================================================

mod subscription_table {
    use super::*;

    #[tokio::test(start_paused = true)]
    async fn attach_list_detach_trigger_scenario() {
        let bus = EventBus::new();
        let (a_hits, a) = counting();

        let payloads = Arc::new(Mutex::new(Vec::new()));
        let sink = Arc::clone(&payloads);
        let b = EventCallback::new(move |event| {
            sink.lock().push(event.payload_as::<u32>().copied());
        });

        bus.attach(10, &a, 1).unwrap();
        bus.attach(10, &b, 1).unwrap();
        bus.attach(10, &b, 1).unwrap();
        assert_eq!(bus.subscriptions().len(), 2);

        bus.detach(10, &a);
        assert_eq!(
            bus.subscriptions(),
            [SubscriptionInfo {
                code: 10,
                group: 1,
                throttle_us: 0,
                last_fire_us: None,
            }]
        );

        bus.trigger(10, Some(Arc::new(99_u32)));
        settle().await;

        assert_eq!(*payloads.lock(), [Some(99)]);
        assert_eq!(a_hits.load(Ordering::SeqCst), 0);
    }

    #[test]
    fn group_conflict_is_argument_error() {
        let bus = EventBus::new();
        let (_, cb) = counting();

        bus.attach(10, &cb, 1).unwrap();
        let err = bus.attach(10, &cb, 2).unwrap_err();

        assert_eq!(err.category(), ErrorCategory::Argument);
        assert_eq!(bus.len(), 1);
    }

    #[test]
    fn group_teardown_is_exact() {
        let bus = EventBus::new();
        let callbacks: Vec<_> = (0..4).map(|_| counting().1).collect();

        bus.attach(10, &callbacks[0], 7).unwrap();
        bus.attach(10, &callbacks[1], 8).unwrap();
        bus.attach(11, &callbacks[2], 7).unwrap();
        bus.attach(12, &callbacks[3], 0).unwrap();

        bus.remove_group(7);

        assert!(!bus.is_attached(10, &callbacks[0]));
        assert!(bus.is_attached(10, &callbacks[1]));
        assert!(!bus.is_attached(11, &callbacks[2]));
        assert!(bus.is_attached(12, &callbacks[3]));
    }

    #[test]
    fn wifi_attach_is_atomic() {
        let bus = EventBus::with_config(BusConfig::new().with_max_subscriptions(3));
        let (_, cb) = counting();

        assert_eq!(bus.attach_wifi_events(&cb, 1), Err(Error::OutOfMemory));
        assert!(bus.is_empty());
    }
}

// ============================================================================
// Delivery
// ============================================================================

mod delivery {
    use super::*;

    #[tokio::test(start_paused = true)]
    async fn detach_during_dispatch_skips_only_detached() {
        let bus = EventBus::new();
        let (b_hits, b) = counting();
        let (c_hits, c) = counting();

        let inner = bus.clone();
        let victim = b.clone();
        let a = EventCallback::new(move |_| {
            inner.detach(10, &victim);
        });

        bus.attach(10, &a, 0).unwrap();
        bus.attach(10, &b, 0).unwrap();
        bus.attach(10, &c, 0).unwrap();

        bus.trigger(10, None);
        settle().await;

        assert_eq!(b_hits.load(Ordering::SeqCst), 0);
        assert_eq!(c_hits.load(Ordering::SeqCst), 1);
        assert_eq!(bus.len(), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn group_removal_from_handler() {
        let bus = EventBus::new();
        let (other_hits, other) = counting();

        let inner = bus.clone();
        let owner = EventCallback::new(move |_| {
            inner.remove_group(5);
        });

        bus.attach(10, &owner, 5).unwrap();
        bus.attach(10, &other, 5).unwrap();

        bus.trigger(10, None);
        settle().await;

        assert!(bus.is_empty());
        assert_eq!(other_hits.load(Ordering::SeqCst), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn throttle_window_not_pushed_by_suppressed_triggers() {
        let bus = EventBus::new();
        let (hits, cb) = counting();
        bus.attach_throttled(10, &cb, 0, 100_000).unwrap();

        // A trigger every 30ms for 300ms: a window that moved on every
        // suppressed trigger would never reopen.
        for _ in 0..10 {
            bus.trigger(10, None);
            sleep(Duration::from_millis(30)).await;
        }
        settle().await;

        let hits = hits.load(Ordering::SeqCst);
        assert!((3..=4).contains(&hits), "got {hits} deliveries");
    }

    #[tokio::test(start_paused = true)]
    async fn delayed_trigger_waits() {
        let bus = EventBus::new();
        let (hits, cb) = counting();
        bus.attach(2000, &cb, 200).unwrap();

        bus.trigger_delayed(2000, Duration::from_secs(2), None);
        sleep(Duration::from_millis(1990)).await;
        assert_eq!(hits.load(Ordering::SeqCst), 0);

        sleep(Duration::from_millis(20)).await;
        assert_eq!(hits.load(Ordering::SeqCst), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn remove_callback_cancels_pending_deliveries() {
        let bus = EventBus::new();
        let (hits, cb) = counting();
        bus.attach(10, &cb, 0).unwrap();
        bus.attach(11, &cb, 0).unwrap();

        bus.trigger(10, None);
        bus.trigger(11, None);
        bus.remove_callback(&cb);
        settle().await;

        assert_eq!(hits.load(Ordering::SeqCst), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn dropped_bus_drops_pending_deliveries() {
        let (hits, cb) = counting();
        {
            let bus = EventBus::new();
            bus.attach(10, &cb, 0).unwrap();
            bus.trigger(10, None);
        }
        settle().await;
        assert_eq!(hits.load(Ordering::SeqCst), 0);
    }
}
