// SPDX-License-Identifier: MPL-2.0
// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Platform TCP transport abstraction.

use std::fmt;

use super::KeepAlive;
use crate::error::Result;

/// Opaque platform TCP session handle.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct TransportHandle(u32);

impl TransportHandle {
    /// Wraps a raw platform handle.
    #[must_use]
    pub const fn new(raw: u32) -> Self {
        Self(raw)
    }

    /// Returns the raw platform handle.
    #[must_use]
    pub const fn raw(self) -> u32 {
        self.0
    }
}

impl fmt::Display for TransportHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "tcp#{}", self.0)
    }
}

/// Completion reported by the transport for a handle.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Completion {
    /// The connection was established.
    Connected,
    /// Data arrived.
    Received(Vec<u8>),
    /// A previous send finished.
    Sent,
    /// The peer or the local side closed the connection.
    Disconnected,
    /// The connection failed with a raw transport code.
    Error(i16),
}

impl Completion {
    /// Returns the completion kind.
    #[must_use]
    pub fn kind(&self) -> CompletionKind {
        match self {
            Self::Connected => CompletionKind::Connect,
            Self::Received(_) => CompletionKind::Receive,
            Self::Sent => CompletionKind::Sent,
            Self::Disconnected => CompletionKind::Disconnect,
            Self::Error(_) => CompletionKind::Error,
        }
    }
}

/// Completion slots a transport delivers for a handle.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum CompletionKind {
    /// Connection established.
    Connect,
    /// Data received.
    Receive,
    /// Send finished.
    Sent,
    /// Connection closed.
    Disconnect,
    /// Connection failed (the platform's "reconnect" callback).
    Error,
}

impl CompletionKind {
    /// All completion kinds.
    pub const ALL: [Self; 5] = [
        Self::Connect,
        Self::Receive,
        Self::Sent,
        Self::Disconnect,
        Self::Error,
    ];
}

/// Session status as reported by the transport.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransportStatus {
    /// Allocated, no connection attempted.
    Idle,
    /// Connection attempt in progress.
    Waiting,
    /// Connected and idle.
    Connected,
    /// A send is in flight.
    Writing,
    /// Data is being received.
    Reading,
    /// Closed.
    Closed,
}

/// Platform TCP primitives.
///
/// Operations are synchronous and never block: results of connect, send and
/// disconnect arrive later as [`Completion`]s, which the platform glue
/// feeds to [`ConnectionRegistry::dispatch`](super::ConnectionRegistry::dispatch)
/// for every enabled [`CompletionKind`].
///
/// Errors carrying a transport code should be [`Error::Network`](crate::Error::Network).
pub trait Transport: Send + Sync {
    /// Allocates a session for `host:port`.
    ///
    /// # Errors
    ///
    /// Returns [`Error::OutOfMemory`](crate::Error::OutOfMemory) if the
    /// session cannot be allocated.
    fn open(&self, host: &str, port: u16, ssl: bool) -> Result<TransportHandle>;

    /// Starts connecting.
    ///
    /// # Errors
    ///
    /// Returns the transport error if the request cannot be issued.
    fn connect(&self, handle: TransportHandle) -> Result<()>;

    /// Queues `data` for sending.
    ///
    /// # Errors
    ///
    /// Returns the transport error if the data cannot be queued.
    fn send(&self, handle: TransportHandle, data: &[u8]) -> Result<()>;

    /// Starts a graceful close.
    ///
    /// # Errors
    ///
    /// Returns the transport error if the request cannot be issued.
    fn disconnect(&self, handle: TransportHandle) -> Result<()>;

    /// Tears the session down immediately. Never fails.
    fn abort(&self, handle: TransportHandle);

    /// Frees the session. The handle must not be used afterwards.
    fn release(&self, handle: TransportHandle);

    /// Enables address reuse on a connected session.
    ///
    /// # Errors
    ///
    /// Returns the transport error if the option cannot be set.
    fn set_reuse_addr(&self, handle: TransportHandle) -> Result<()>;

    /// Enables TCP keep-alive with the given timing.
    ///
    /// # Errors
    ///
    /// Returns the transport error if an option cannot be set.
    fn set_keepalive(&self, handle: TransportHandle, keepalive: KeepAlive) -> Result<()>;

    /// Enables or disables delivery of one completion kind.
    fn set_completion(&self, handle: TransportHandle, kind: CompletionKind, enabled: bool);

    /// Returns the session status, or `None` for an unknown handle.
    fn status(&self, handle: TransportHandle) -> Option<TransportStatus>;
}
