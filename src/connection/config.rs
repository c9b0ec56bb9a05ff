// SPDX-License-Identifier: MPL-2.0
// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Per-connection settings and callback slots.

use std::fmt;
use std::sync::Arc;

use super::ConnectionId;
use crate::error::Error;

/// TCP keep-alive timing.
///
/// The all-zero value means "use [`KeepAlive::DEFAULT`]". With the default,
/// a dead peer is detected within about 23 seconds.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct KeepAlive {
    /// Seconds of idle time before the first probe.
    pub idle: u16,
    /// Seconds between probes.
    pub interval: u16,
    /// Unanswered probes before the connection is dropped.
    pub count: u16,
}

impl KeepAlive {
    /// Library default: first probe after 3s, then up to 4 probes 5s apart.
    pub const DEFAULT: Self = Self {
        idle: 3,
        interval: 5,
        count: 4,
    };

    /// Creates a keep-alive setting.
    #[must_use]
    pub const fn new(idle: u16, interval: u16, count: u16) -> Self {
        Self {
            idle,
            interval,
            count,
        }
    }

    /// Returns true if all three values are set.
    #[must_use]
    pub fn is_custom(&self) -> bool {
        self.idle != 0 && self.interval != 0 && self.count != 0
    }

    /// Returns the setting to apply: `self` if custom, else the default.
    #[must_use]
    pub fn effective(&self) -> Self {
        if self.is_custom() { *self } else { Self::DEFAULT }
    }
}

pub(crate) type ConnCallback = Arc<dyn Fn(ConnectionId) + Send + Sync>;
pub(crate) type ReceiveCallback = Arc<dyn Fn(ConnectionId, &[u8]) + Send + Sync>;
pub(crate) type ErrorCallback = Arc<dyn Fn(ConnectionId, Error) + Send + Sync>;

/// The five connection-level callback slots.
///
/// Every slot is independent and optional.
///
/// # Examples
///
/// ```
/// use espnet::connection::ConnectionCallbacks;
///
/// let callbacks = ConnectionCallbacks::new()
///     .on_ready(|id| println!("{id} ready"))
///     .on_received(|id, data| println!("{id} got {} bytes", data.len()))
///     .on_error(|id, err| eprintln!("{id}: {err}"));
/// assert!(callbacks.has_ready());
/// ```
#[derive(Clone, Default)]
pub struct ConnectionCallbacks {
    pub(crate) ready: Option<ConnCallback>,
    pub(crate) disconnected: Option<ConnCallback>,
    pub(crate) sent: Option<ConnCallback>,
    pub(crate) received: Option<ReceiveCallback>,
    pub(crate) error: Option<ErrorCallback>,
}

impl ConnectionCallbacks {
    /// Creates an empty set of callbacks.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Called once the connection is established and configured.
    #[must_use]
    pub fn on_ready<F>(mut self, callback: F) -> Self
    where
        F: Fn(ConnectionId) + Send + Sync + 'static,
    {
        self.ready = Some(Arc::new(callback));
        self
    }

    /// Called when the connection closes.
    #[must_use]
    pub fn on_disconnected<F>(mut self, callback: F) -> Self
    where
        F: Fn(ConnectionId) + Send + Sync + 'static,
    {
        self.disconnected = Some(Arc::new(callback));
        self
    }

    /// Called when a send completes.
    #[must_use]
    pub fn on_sent<F>(mut self, callback: F) -> Self
    where
        F: Fn(ConnectionId) + Send + Sync + 'static,
    {
        self.sent = Some(Arc::new(callback));
        self
    }

    /// Called with received data.
    #[must_use]
    pub fn on_received<F>(mut self, callback: F) -> Self
    where
        F: Fn(ConnectionId, &[u8]) + Send + Sync + 'static,
    {
        self.received = Some(Arc::new(callback));
        self
    }

    /// Called with connection errors.
    #[must_use]
    pub fn on_error<F>(mut self, callback: F) -> Self
    where
        F: Fn(ConnectionId, Error) + Send + Sync + 'static,
    {
        self.error = Some(Arc::new(callback));
        self
    }

    /// Returns true if a ready callback is set.
    #[must_use]
    pub fn has_ready(&self) -> bool {
        self.ready.is_some()
    }
}

impl fmt::Debug for ConnectionCallbacks {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ConnectionCallbacks")
            .field("ready", &self.ready.is_some())
            .field("disconnected", &self.disconnected.is_some())
            .field("sent", &self.sent.is_some())
            .field("received", &self.received.is_some())
            .field("error", &self.error.is_some())
            .finish()
    }
}
