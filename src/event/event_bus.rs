// SPDX-License-Identifier: MPL-2.0
// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Subscription table and delayed dispatch.

use std::sync::{Arc, Weak};
use std::time::Duration;

use parking_lot::Mutex;
use tokio::time::Instant;

use super::subscription::Subscription;
use super::{
    BusConfig, Event, EventCallback, EventCode, Group, Payload, SubscriptionInfo,
    WIFI_STATION_EVENTS, WifiEvent, WifiEventHandler,
};
use crate::error::{Error, Result};
use crate::list::{SlotKey, SlotList};
use crate::timer::DelayTimer;

type Table = Mutex<SlotList<Subscription>>;

/// Publish/subscribe dispatcher with throttled, delayed delivery.
///
/// The bus owns every subscription. Subscriptions are keyed by
/// `(event code, callback identity)` and fire in attach order.
///
/// Cloning an `EventBus` yields another handle to the same table.
///
/// # Delivery
///
/// [`trigger_delayed`](Self::trigger_delayed) snapshots the subscriptions of
/// the event and schedules one timer. When it fires, each subscription is
/// looked up again: one detached in the meantime is skipped, and a throttled
/// one only runs if its interval has elapsed since its last delivery.
/// Callbacks run without the table lock held, so they may attach, detach or
/// remove whole groups.
///
/// # Examples
///
/// ```
/// use std::sync::Arc;
/// use std::sync::atomic::{AtomicUsize, Ordering};
/// use espnet::event::{EventBus, EventCallback};
///
/// # #[tokio::main(flavor = "current_thread", start_paused = true)]
/// # async fn main() -> espnet::Result<()> {
/// let bus = EventBus::new();
/// let hits = Arc::new(AtomicUsize::new(0));
/// let counter = Arc::clone(&hits);
/// let cb = EventCallback::new(move |_| {
///     counter.fetch_add(1, Ordering::SeqCst);
/// });
///
/// bus.attach(1500, &cb, 0)?;
/// bus.trigger(1500, None);
///
/// tokio::time::sleep(std::time::Duration::from_millis(20)).await;
/// assert_eq!(hits.load(Ordering::SeqCst), 1);
/// # Ok(())
/// # }
/// ```
#[derive(Clone)]
pub struct EventBus {
    table: Arc<Table>,
    config: BusConfig,
    epoch: Instant,
}

impl EventBus {
    /// Creates a bus with the default configuration.
    #[must_use]
    pub fn new() -> Self {
        Self::with_config(BusConfig::default())
    }

    /// Creates a bus with the given configuration.
    #[must_use]
    pub fn with_config(config: BusConfig) -> Self {
        Self {
            table: Arc::new(Mutex::new(SlotList::new())),
            config,
            epoch: Instant::now(),
        }
    }

    /// Returns the bus configuration.
    #[must_use]
    pub fn config(&self) -> &BusConfig {
        &self.config
    }

    /// Attaches `callback` to `code` under `group`.
    ///
    /// Attaching an existing `(code, callback)` pair again under the same
    /// group is a no-op.
    ///
    /// # Errors
    ///
    /// Returns [`Error::GroupConflict`] if the pair is attached under
    /// another group, or [`Error::OutOfMemory`] if the record cannot be
    /// allocated.
    pub fn attach(&self, code: EventCode, callback: &EventCallback, group: Group) -> Result<()> {
        self.attach_throttled(code, callback, group, 0)
    }

    /// Attaches `callback` to `code`, delivering at most once every
    /// `throttle_us` microseconds.
    ///
    /// An existing pair keeps its original throttle.
    ///
    /// # Errors
    ///
    /// Same as [`attach`](Self::attach).
    pub fn attach_throttled(
        &self,
        code: EventCode,
        callback: &EventCallback,
        group: Group,
        throttle_us: u32,
    ) -> Result<()> {
        self.insert(code, callback, group, throttle_us).map(|_| ())
    }

    /// Inserts a subscription, returning its key if a new record was
    /// created.
    fn insert(
        &self,
        code: EventCode,
        callback: &EventCallback,
        group: Group,
        throttle_us: u32,
    ) -> Result<Option<SlotKey>> {
        let mut table = self.table.lock();

        if let Some(key) = table.find(|sub| sub.matches(code, callback))
            && let Some(existing) = table.get(key)
        {
            if existing.group != group {
                tracing::debug!(code, group, existing = existing.group, "Attach rejected");
                return Err(Error::GroupConflict {
                    code,
                    group,
                    existing: existing.group,
                });
            }
            return Ok(None);
        }

        if let Some(max) = self.config.max_subscriptions
            && table.len() >= max
        {
            tracing::warn!(code, group, max, "Subscription limit reached");
            return Err(Error::OutOfMemory);
        }

        let key = table.push_back(Subscription::new(code, callback.clone(), group, throttle_us))?;
        tracing::debug!(code, group, throttle_us, key = %key, "Event attached");
        Ok(Some(key))
    }

    /// Detaches `callback` from `code`.
    ///
    /// Detaching a pair that is not attached is not an error; this always
    /// returns true.
    pub fn detach(&self, code: EventCode, callback: &EventCallback) -> bool {
        let mut table = self.table.lock();
        if let Some(key) = table.find(|sub| sub.matches(code, callback)) {
            table.unlink(key);
            tracing::debug!(code, "Event detached");
        }
        true
    }

    /// Detaches `callback` from every event. Always returns true.
    pub fn remove_callback(&self, callback: &EventCallback) -> bool {
        let removed = self
            .table
            .lock()
            .remove_where(|sub| sub.callback == *callback);
        tracing::debug!(removed = removed.len(), "Callback removed");
        true
    }

    /// Detaches every subscription of `group`. Always returns true.
    pub fn remove_group(&self, group: Group) -> bool {
        let removed = self.table.lock().remove_where(|sub| sub.group == group);
        tracing::debug!(group, removed = removed.len(), "Group removed");
        true
    }

    /// Triggers `code` after the configured trigger delay.
    pub fn trigger(&self, code: EventCode, payload: Option<Payload>) {
        self.trigger_delayed(code, self.config.trigger_delay, payload);
    }

    /// Triggers `code` after `delay`.
    ///
    /// Every subscription attached to `code` at call time is considered.
    /// Scheduling failures (no runtime) are logged and the trigger is
    /// dropped.
    pub fn trigger_delayed(&self, code: EventCode, delay: Duration, payload: Option<Payload>) {
        let keys: Vec<SlotKey> = {
            let table = self.table.lock();
            table
                .iter()
                .filter(|(_, sub)| sub.code == code)
                .map(|(key, _)| key)
                .collect()
        };

        if keys.is_empty() {
            tracing::trace!(code, "Trigger without subscribers");
            return;
        }

        tracing::trace!(code, subscribers = keys.len(), ?delay, "Trigger scheduled");

        let table = Arc::downgrade(&self.table);
        let epoch = self.epoch;
        let event = Event::new(code, payload);
        if let Err(error) = DelayTimer::start(delay, move || deliver(&table, epoch, &keys, &event))
        {
            tracing::warn!(code, %error, "Error scheduling trigger");
        }
    }

    /// Attaches `callback` to every station Wi-Fi event under `group`.
    ///
    /// Either all events end up attached or, on failure, none of the
    /// subscriptions created by this call survive.
    ///
    /// # Errors
    ///
    /// Returns the first attach error.
    pub fn attach_wifi_events(&self, callback: &EventCallback, group: Group) -> Result<()> {
        let mut created = Vec::with_capacity(WIFI_STATION_EVENTS.len());

        for code in WIFI_STATION_EVENTS {
            match self.insert(code, callback, group, 0) {
                Ok(Some(key)) => created.push(key),
                Ok(None) => {}
                Err(error) => {
                    let mut table = self.table.lock();
                    for key in created {
                        table.unlink(key);
                    }
                    tracing::warn!(code, group, %error, "Wifi event attach rolled back");
                    return Err(error);
                }
            }
        }
        Ok(())
    }

    /// Forwards a hardware Wi-Fi event to the bus.
    ///
    /// The event itself is the payload delivered to subscribers.
    pub fn handle_wifi_event(&self, event: WifiEvent) {
        event.log();
        let code = event.code();
        self.trigger(code, Some(Arc::new(event)));
    }

    /// Returns a handler suitable for
    /// [`WifiPlatform::set_event_handler`](crate::wifi::WifiPlatform::set_event_handler).
    #[must_use]
    pub fn wifi_event_handler(&self) -> WifiEventHandler {
        let bus = self.clone();
        Arc::new(move |event| bus.handle_wifi_event(event))
    }

    /// Returns the number of live subscriptions.
    #[must_use]
    pub fn len(&self) -> usize {
        self.table.lock().len()
    }

    /// Returns true if nothing is attached.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.table.lock().is_empty()
    }

    /// Returns true if `callback` is attached to `code`.
    #[must_use]
    pub fn is_attached(&self, code: EventCode, callback: &EventCallback) -> bool {
        self.table
            .lock()
            .find(|sub| sub.matches(code, callback))
            .is_some()
    }

    /// Returns a snapshot of the subscription table in dispatch order.
    #[must_use]
    pub fn subscriptions(&self) -> Vec<SubscriptionInfo> {
        self.table.lock().iter().map(|(_, sub)| sub.info()).collect()
    }

    /// Writes the subscription table to the log.
    pub fn log_subscriptions(&self) {
        let subscriptions = self.subscriptions();
        tracing::info!(count = subscriptions.len(), "Event subscriptions");
        for sub in subscriptions {
            tracing::info!(
                code = sub.code,
                group = sub.group,
                throttle_us = sub.throttle_us,
                last_fire_us = ?sub.last_fire_us,
                "Subscription"
            );
        }
    }
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for EventBus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EventBus")
            .field("subscriptions", &self.len())
            .field("config", &self.config)
            .finish_non_exhaustive()
    }
}

/// Microseconds since `epoch`, wrapping like a hardware tick counter.
#[allow(clippy::cast_possible_truncation)]
fn now_us(epoch: Instant) -> u32 {
    epoch.elapsed().as_micros() as u32
}

/// Timer body: re-validates each subscription and runs the admitted ones.
fn deliver(table: &Weak<Table>, epoch: Instant, keys: &[SlotKey], event: &Event) {
    let Some(table) = table.upgrade() else {
        tracing::trace!(code = event.code(), "Bus dropped before delivery");
        return;
    };

    for &key in keys {
        let now = now_us(epoch);
        let callback = {
            let mut table = table.lock();
            let Some(sub) = table.get_mut(key) else {
                tracing::trace!(code = event.code(), key = %key, "Subscription gone, delivery dropped");
                continue;
            };
            if !sub.admits(now) {
                tracing::trace!(code = event.code(), key = %key, "Delivery throttled");
                continue;
            }
            sub.last_fire_us = Some(now);
            sub.callback.clone()
        };
        callback.call(event);
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicUsize, Ordering};

    use super::*;

    fn counter() -> (Arc<AtomicUsize>, EventCallback) {
        let hits = Arc::new(AtomicUsize::new(0));
        let sink = Arc::clone(&hits);
        let cb = EventCallback::new(move |_| {
            sink.fetch_add(1, Ordering::SeqCst);
        });
        (hits, cb)
    }

    async fn settle() {
        tokio::time::sleep(Duration::from_millis(20)).await;
    }

    #[test]
    fn attach_is_idempotent_per_group() {
        let bus = EventBus::new();
        let (_, cb) = counter();

        bus.attach(10, &cb, 1).unwrap();
        bus.attach(10, &cb, 1).unwrap();
        assert_eq!(bus.len(), 1);

        let err = bus.attach(10, &cb, 2).unwrap_err();
        assert_eq!(
            err,
            Error::GroupConflict {
                code: 10,
                group: 2,
                existing: 1
            }
        );
        assert_eq!(bus.len(), 1);
    }

    #[test]
    fn reattach_keeps_original_throttle() {
        let bus = EventBus::new();
        let (_, cb) = counter();

        bus.attach_throttled(10, &cb, 1, 500).unwrap();
        bus.attach_throttled(10, &cb, 1, 9_000).unwrap();
        assert_eq!(bus.subscriptions()[0].throttle_us, 500);
    }

    #[test]
    fn detach_missing_is_success() {
        let bus = EventBus::new();
        let (_, cb) = counter();
        assert!(bus.detach(10, &cb));
        assert!(bus.is_empty());
    }

    #[test]
    fn remove_group_leaves_other_groups() {
        let bus = EventBus::new();
        let (_, a) = counter();
        let (_, b) = counter();

        bus.attach(10, &a, 1).unwrap();
        bus.attach(10, &b, 2).unwrap();
        bus.attach(11, &a, 1).unwrap();

        assert!(bus.remove_group(1));
        let left = bus.subscriptions();
        assert_eq!(left.len(), 1);
        assert_eq!((left[0].code, left[0].group), (10, 2));
        assert!(bus.is_attached(10, &b));
    }

    #[test]
    fn remove_callback_detaches_every_event() {
        let bus = EventBus::new();
        let (_, a) = counter();
        let (_, b) = counter();

        bus.attach(10, &a, 0).unwrap();
        bus.attach(11, &a, 0).unwrap();
        bus.attach(11, &b, 0).unwrap();

        bus.remove_callback(&a);
        assert_eq!(bus.len(), 1);
        assert!(bus.is_attached(11, &b));
    }

    #[test]
    fn limit_maps_to_out_of_memory() {
        let bus = EventBus::with_config(BusConfig::new().with_max_subscriptions(1));
        let (_, a) = counter();
        let (_, b) = counter();

        bus.attach(10, &a, 0).unwrap();
        assert_eq!(bus.attach(10, &b, 0), Err(Error::OutOfMemory));
        // An existing pair is still accepted at the limit.
        assert!(bus.attach(10, &a, 0).is_ok());
    }

    #[test]
    fn wifi_attach_rolls_back_on_failure() {
        let bus = EventBus::with_config(BusConfig::new().with_max_subscriptions(4));
        let (_, cb) = counter();

        assert_eq!(bus.attach_wifi_events(&cb, 1), Err(Error::OutOfMemory));
        assert!(bus.is_empty());
    }

    #[test]
    fn wifi_attach_rollback_keeps_prior_subscriptions() {
        let bus = EventBus::with_config(BusConfig::new().with_max_subscriptions(5));
        let (_, cb) = counter();

        bus.attach(WIFI_STATION_EVENTS[0], &cb, 1).unwrap();
        assert_eq!(bus.attach_wifi_events(&cb, 1), Err(Error::OutOfMemory));
        assert_eq!(bus.len(), 1);
        assert!(bus.is_attached(WIFI_STATION_EVENTS[0], &cb));
    }

    #[test]
    fn wifi_attach_covers_station_events() {
        let bus = EventBus::new();
        let (_, cb) = counter();

        bus.attach_wifi_events(&cb, 1).unwrap();
        let codes: Vec<_> = bus.subscriptions().iter().map(|s| s.code).collect();
        assert_eq!(codes, WIFI_STATION_EVENTS);
    }

    #[tokio::test(start_paused = true)]
    async fn trigger_is_delivered_later() {
        let bus = EventBus::new();
        let (hits, cb) = counter();
        bus.attach(10, &cb, 0).unwrap();

        bus.trigger(10, None);
        assert_eq!(hits.load(Ordering::SeqCst), 0);

        settle().await;
        assert_eq!(hits.load(Ordering::SeqCst), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn detach_before_fire_drops_delivery() {
        let bus = EventBus::new();
        let (hits, cb) = counter();
        bus.attach(10, &cb, 0).unwrap();

        bus.trigger_delayed(10, Duration::from_millis(50), None);
        bus.detach(10, &cb);

        tokio::time::sleep(Duration::from_millis(100)).await;
        assert_eq!(hits.load(Ordering::SeqCst), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn reattach_before_fire_drops_delivery() {
        let bus = EventBus::new();
        let (hits, cb) = counter();
        bus.attach(10, &cb, 0).unwrap();

        bus.trigger_delayed(10, Duration::from_millis(50), None);
        bus.detach(10, &cb);
        bus.attach(10, &cb, 0).unwrap();

        tokio::time::sleep(Duration::from_millis(100)).await;
        assert_eq!(hits.load(Ordering::SeqCst), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn throttle_suppresses_burst() {
        let bus = EventBus::new();
        let (hits, cb) = counter();
        bus.attach_throttled(10, &cb, 0, 1_000_000).unwrap();

        for _ in 0..5 {
            bus.trigger(10, None);
        }
        settle().await;
        assert_eq!(hits.load(Ordering::SeqCst), 1);
        let first = bus.subscriptions()[0].last_fire_us;

        tokio::time::sleep(Duration::from_millis(500)).await;
        bus.trigger(10, None);
        settle().await;
        assert_eq!(hits.load(Ordering::SeqCst), 1);
        assert_eq!(bus.subscriptions()[0].last_fire_us, first);

        tokio::time::sleep(Duration::from_millis(600)).await;
        bus.trigger(10, None);
        settle().await;
        assert_eq!(hits.load(Ordering::SeqCst), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn delivery_follows_attach_order() {
        let bus = EventBus::new();
        let order = Arc::new(Mutex::new(Vec::new()));

        let callbacks: Vec<_> = (0..3)
            .map(|i| {
                let order = Arc::clone(&order);
                EventCallback::new(move |_| order.lock().push(i))
            })
            .collect();
        for cb in &callbacks {
            bus.attach(10, cb, 0).unwrap();
        }

        bus.trigger(10, None);
        settle().await;
        assert_eq!(*order.lock(), [0, 1, 2]);
    }

    #[tokio::test(start_paused = true)]
    async fn payload_reaches_subscribers() {
        let bus = EventBus::new();
        let seen = Arc::new(Mutex::new(None));
        let sink = Arc::clone(&seen);
        let cb = EventCallback::new(move |event| {
            *sink.lock() = event.payload_as::<&str>().copied();
        });
        bus.attach(10, &cb, 0).unwrap();

        bus.trigger(10, Some(Arc::new("hello")));
        settle().await;
        assert_eq!(*seen.lock(), Some("hello"));
    }

    #[tokio::test(start_paused = true)]
    async fn wifi_event_is_payload() {
        let bus = EventBus::new();
        let seen = Arc::new(Mutex::new(None));
        let sink = Arc::clone(&seen);
        let cb = EventCallback::new(move |event| {
            *sink.lock() = event.payload_as::<WifiEvent>().cloned();
        });
        bus.attach(super::super::codes::DHCP_TIMEOUT, &cb, 0).unwrap();

        let handler = bus.wifi_event_handler();
        handler(WifiEvent::DhcpTimeout);
        settle().await;
        assert_eq!(*seen.lock(), Some(WifiEvent::DhcpTimeout));
    }

    #[test]
    fn trigger_outside_runtime_is_dropped() {
        let bus = EventBus::new();
        let (hits, cb) = counter();
        bus.attach(10, &cb, 0).unwrap();

        bus.trigger(10, None);
        assert_eq!(hits.load(Ordering::SeqCst), 0);
    }
}
