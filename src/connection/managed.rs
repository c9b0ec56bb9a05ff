// SPDX-License-Identifier: MPL-2.0
// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Managed connection record and its state.

use std::fmt;

use super::{ConnectionCallbacks, KeepAlive, TransportHandle, TransportStatus};

/// State of a managed connection.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionState {
    /// Configured, never connected.
    Idle,
    /// Connect issued, waiting for the transport.
    Connecting,
    /// Connected.
    Connected,
    /// A send is in flight.
    Sending,
    /// Data is being received.
    Receiving,
    /// Graceful close requested.
    Closing,
    /// Closed; may be connected again.
    Closed,
    /// Torn down by abort. Terminal.
    Aborted,
}

impl ConnectionState {
    /// Returns true if `connect` is allowed from this state.
    #[must_use]
    pub fn can_connect(self) -> bool {
        matches!(self, Self::Idle | Self::Closed)
    }

    /// Returns true for Closed and Aborted.
    #[must_use]
    pub fn is_terminal(self) -> bool {
        matches!(self, Self::Closed | Self::Aborted)
    }
}

impl From<TransportStatus> for ConnectionState {
    fn from(status: TransportStatus) -> Self {
        match status {
            TransportStatus::Idle => Self::Idle,
            TransportStatus::Waiting => Self::Connecting,
            TransportStatus::Connected => Self::Connected,
            TransportStatus::Writing => Self::Sending,
            TransportStatus::Reading => Self::Receiving,
            TransportStatus::Closed => Self::Closed,
        }
    }
}

impl fmt::Display for ConnectionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Idle => "idle",
            Self::Connecting => "connecting",
            Self::Connected => "connected",
            Self::Sending => "sending",
            Self::Receiving => "receiving",
            Self::Closing => "closing",
            Self::Closed => "closed",
            Self::Aborted => "aborted",
        };
        f.write_str(name)
    }
}

/// A TCP client connection.
///
/// Built by the caller, given a target with
/// [`ConnectionRegistry::configure`](super::ConnectionRegistry::configure)
/// and then handed over with
/// [`ConnectionRegistry::register`](super::ConnectionRegistry::register).
/// The registry gives the record back from `abort` and `release`.
///
/// # Examples
///
/// ```
/// use espnet::connection::{Connection, ConnectionCallbacks, KeepAlive};
///
/// let conn = Connection::new()
///     .with_keepalive(KeepAlive::new(10, 5, 3))
///     .with_reconnect(5)
///     .with_callbacks(ConnectionCallbacks::new().on_ready(|id| println!("{id} up")));
/// assert!(conn.handle().is_none());
/// ```
#[derive(Debug, Default)]
pub struct Connection {
    pub(crate) host: String,
    pub(crate) port: u16,
    pub(crate) ssl: bool,
    pub(crate) handle: Option<TransportHandle>,
    pub(crate) keepalive: KeepAlive,
    pub(crate) reconnect_max: u8,
    pub(crate) reconnect_count: u8,
    pub(crate) callbacks: ConnectionCallbacks,
    pub(crate) state: Option<ConnectionState>,
    pub(crate) closing: bool,
    pub(crate) was_connected: bool,
}

impl Connection {
    /// Creates an unconfigured connection.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets custom keep-alive timing.
    #[must_use]
    pub fn with_keepalive(mut self, keepalive: KeepAlive) -> Self {
        self.keepalive = keepalive;
        self
    }

    /// Limits automatic bulk reconnects after a drop (0 = unlimited) and
    /// resets the counter.
    #[must_use]
    pub fn with_reconnect(mut self, max: u8) -> Self {
        self.reconnect_max = max;
        self.reconnect_count = 0;
        self
    }

    /// Sets the callback slots.
    #[must_use]
    pub fn with_callbacks(mut self, callbacks: ConnectionCallbacks) -> Self {
        self.callbacks = callbacks;
        self
    }

    /// Replaces the callback slots.
    pub fn set_callbacks(&mut self, callbacks: ConnectionCallbacks) {
        self.callbacks = callbacks;
    }

    /// Returns the target host.
    #[must_use]
    pub fn host(&self) -> &str {
        &self.host
    }

    /// Returns the target port.
    #[must_use]
    pub fn port(&self) -> u16 {
        self.port
    }

    /// Returns the ssl marker.
    #[must_use]
    pub fn ssl(&self) -> bool {
        self.ssl
    }

    /// Returns the transport handle, if one is held.
    #[must_use]
    pub fn handle(&self) -> Option<TransportHandle> {
        self.handle
    }

    /// Returns the keep-alive setting.
    #[must_use]
    pub fn keepalive(&self) -> KeepAlive {
        self.keepalive
    }

    /// Returns the reconnect ceiling.
    #[must_use]
    pub fn reconnect_max(&self) -> u8 {
        self.reconnect_max
    }

    /// Returns the number of reconnects since the last successful connect.
    #[must_use]
    pub fn reconnect_count(&self) -> u8 {
        self.reconnect_count
    }

    /// Returns the final state recorded when the registry gave the record
    /// back (Closed or Aborted), or `None` while unmanaged.
    #[must_use]
    pub fn state(&self) -> Option<ConnectionState> {
        self.state
    }

    pub(crate) fn reconnect_exhausted(&self) -> bool {
        self.reconnect_max != 0 && self.reconnect_count >= self.reconnect_max
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn connectable_states() {
        assert!(ConnectionState::Idle.can_connect());
        assert!(ConnectionState::Closed.can_connect());
        assert!(!ConnectionState::Connecting.can_connect());
        assert!(!ConnectionState::Aborted.can_connect());
    }

    #[test]
    fn status_mapping() {
        assert_eq!(
            ConnectionState::from(TransportStatus::Waiting),
            ConnectionState::Connecting
        );
        assert_eq!(
            ConnectionState::from(TransportStatus::Writing),
            ConnectionState::Sending
        );
    }

    #[test]
    fn reconnect_ceiling() {
        let mut conn = Connection::new().with_reconnect(2);
        assert!(!conn.reconnect_exhausted());
        conn.reconnect_count = 2;
        assert!(conn.reconnect_exhausted());

        let unlimited = Connection::new();
        assert!(!unlimited.reconnect_exhausted());
    }
}
