// SPDX-License-Identifier: MPL-2.0
// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Subscription records owned by the event bus.

use super::{EventCallback, EventCode, Group};

/// A live subscription.
#[derive(Debug)]
pub(crate) struct Subscription {
    pub code: EventCode,
    pub callback: EventCallback,
    pub group: Group,
    /// Minimum spacing between deliveries (0 = unthrottled).
    pub throttle_us: u32,
    /// Bus clock reading of the last delivery that actually ran.
    pub last_fire_us: Option<u32>,
}

impl Subscription {
    pub fn new(code: EventCode, callback: EventCallback, group: Group, throttle_us: u32) -> Self {
        Self {
            code,
            callback,
            group,
            throttle_us,
            last_fire_us: None,
        }
    }

    pub fn matches(&self, code: EventCode, callback: &EventCallback) -> bool {
        self.code == code && self.callback == *callback
    }

    /// Returns true if a delivery at `now_us` is allowed by the throttle.
    ///
    /// Suppressed deliveries must not touch `last_fire_us`.
    pub fn admits(&self, now_us: u32) -> bool {
        if self.throttle_us == 0 {
            return true;
        }
        self.last_fire_us
            .is_none_or(|last| now_us.wrapping_sub(last) >= self.throttle_us)
    }

    pub fn info(&self) -> SubscriptionInfo {
        SubscriptionInfo {
            code: self.code,
            group: self.group,
            throttle_us: self.throttle_us,
            last_fire_us: self.last_fire_us,
        }
    }
}

/// Snapshot of a subscription, as listed by
/// [`EventBus::subscriptions`](super::EventBus::subscriptions).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SubscriptionInfo {
    /// The event code.
    pub code: EventCode,
    /// The owning group.
    pub group: Group,
    /// Throttle interval in microseconds (0 = unthrottled).
    pub throttle_us: u32,
    /// Bus clock reading of the last delivery, if any.
    pub last_fire_us: Option<u32>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn unthrottled_always_admits() {
        let mut sub = Subscription::new(1, EventCallback::new(|_| {}), 0, 0);
        assert!(sub.admits(0));
        sub.last_fire_us = Some(100);
        assert!(sub.admits(100));
    }

    #[test]
    fn throttled_waits_for_interval() {
        let mut sub = Subscription::new(1, EventCallback::new(|_| {}), 0, 1_000);
        assert!(sub.admits(5), "first delivery is never throttled");

        sub.last_fire_us = Some(5);
        assert!(!sub.admits(500));
        assert!(!sub.admits(1_004));
        assert!(sub.admits(1_005));
    }

    #[test]
    fn throttle_survives_clock_wrap() {
        let mut sub = Subscription::new(1, EventCallback::new(|_| {}), 0, 1_000);
        sub.last_fire_us = Some(u32::MAX - 100);
        assert!(!sub.admits(50));
        assert!(sub.admits(900));
    }
}
