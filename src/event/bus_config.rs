// SPDX-License-Identifier: MPL-2.0
// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Event bus configuration.

use std::time::Duration;

/// Delay used by [`EventBus::trigger`](super::EventBus::trigger).
pub const DEFAULT_TRIGGER_DELAY: Duration = Duration::from_millis(10);

/// Configuration for an [`EventBus`](super::EventBus).
///
/// # Examples
///
/// ```
/// use std::time::Duration;
/// use espnet::event::BusConfig;
///
/// let config = BusConfig::new()
///     .with_trigger_delay(Duration::from_millis(5))
///     .with_max_subscriptions(32);
/// assert_eq!(config.max_subscriptions, Some(32));
/// ```
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BusConfig {
    /// Delay applied by `trigger`.
    pub trigger_delay: Duration,
    /// Upper bound on live subscriptions (None = bounded only by memory).
    pub max_subscriptions: Option<usize>,
}

impl BusConfig {
    /// Creates the default configuration.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets the delay applied by `trigger`.
    #[must_use]
    pub fn with_trigger_delay(mut self, delay: Duration) -> Self {
        self.trigger_delay = delay;
        self
    }

    /// Caps the number of live subscriptions.
    #[must_use]
    pub fn with_max_subscriptions(mut self, max: usize) -> Self {
        self.max_subscriptions = Some(max);
        self
    }
}

impl Default for BusConfig {
    fn default() -> Self {
        Self {
            trigger_delay: DEFAULT_TRIGGER_DELAY,
            max_subscriptions: None,
        }
    }
}
