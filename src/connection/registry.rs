// SPDX-License-Identifier: MPL-2.0
// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Connection registry and transport completion routing.
//!
//! The [`ConnectionRegistry`] owns every registered [`Connection`] and maps
//! transport handles back to them. Transport completions are routed through
//! [`ConnectionRegistry::dispatch`]:
//!
//! ```text
//! Transport completion (handle, Completion::Connected)
//!                     ↓
//!         ConnectionRegistry.dispatch()
//!                     ↓
//!       Lookup handle in registered connections
//!            ↓ miss               ↓ hit
//!      logged, dropped     state update, options
//!                                 ↓
//!                      connection callback invoked
//! ```
//!
//! A miss is the expected outcome for completions that race with
//! [`abort`](ConnectionRegistry::abort) or
//! [`release`](ConnectionRegistry::release): once a connection has left the
//! registry nothing can reach it through a stale handle.

use std::fmt;
use std::sync::Arc;

use parking_lot::Mutex;

use super::config::ErrorCallback;
use super::{
    Completion, CompletionKind, Connection, ConnectionCallbacks, ConnectionState, Transport,
    TransportHandle,
};
use crate::error::{Error, Result};
use crate::list::{SlotKey, SlotList};

/// Identifier of a registered connection.
///
/// Identifiers are not reused until a slot's generation counter wraps: once
/// a connection leaves the registry, its id stops resolving.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ConnectionId(SlotKey);

impl fmt::Display for ConnectionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "conn#{}", self.0)
    }
}

/// Registry of managed TCP connections.
///
/// Cloning yields another handle to the same registry.
///
/// # Examples
///
/// ```
/// use std::sync::Arc;
/// use espnet::connection::{Completion, Connection, ConnectionRegistry, ConnectionState};
/// use espnet::sim::SimTransport;
///
/// # fn main() -> espnet::Result<()> {
/// let transport = Arc::new(SimTransport::new());
/// let registry = ConnectionRegistry::new(Arc::clone(&transport));
///
/// let mut conn = Connection::new();
/// registry.configure(&mut conn, "192.168.1.20", 1883, false)?;
/// let handle = conn.handle().unwrap();
/// let id = registry.register(conn)?;
///
/// registry.connect(id)?;
/// transport.complete(&registry, handle, Completion::Connected);
/// assert_eq!(registry.state(id), Some(ConnectionState::Connected));
/// # Ok(())
/// # }
/// ```
pub struct ConnectionRegistry<T: Transport> {
    connections: Arc<Mutex<SlotList<Connection>>>,
    transport: Arc<T>,
}

impl<T: Transport> ConnectionRegistry<T> {
    /// Creates an empty registry over `transport`.
    #[must_use]
    pub fn new(transport: Arc<T>) -> Self {
        Self {
            connections: Arc::new(Mutex::new(SlotList::new())),
            transport,
        }
    }

    /// Returns the transport.
    #[must_use]
    pub fn transport(&self) -> &Arc<T> {
        &self.transport
    }

    /// Sets the target of `conn` and allocates its transport handle.
    ///
    /// A handle already held by `conn` is released first. The connect and
    /// error completions are enabled on the new handle.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidArgument`] for an empty host, or the
    /// transport's allocation error.
    pub fn configure(
        &self,
        conn: &mut Connection,
        host: impl Into<String>,
        port: u16,
        ssl: bool,
    ) -> Result<()> {
        let host = host.into();
        if host.is_empty() {
            return Err(Error::InvalidArgument("host must not be empty".into()));
        }

        if let Some(old) = conn.handle.take() {
            self.transport.release(old);
        }

        let handle = self.open(&host, port, ssl)?;
        tracing::debug!(host = %host, port, ssl, handle = %handle, "Connection configured");

        conn.host = host;
        conn.port = port;
        conn.ssl = ssl;
        conn.handle = Some(handle);
        conn.state = None;
        Ok(())
    }

    fn open(&self, host: &str, port: u16, ssl: bool) -> Result<TransportHandle> {
        let handle = self.transport.open(host, port, ssl)?;
        self.transport
            .set_completion(handle, CompletionKind::Connect, true);
        self.transport
            .set_completion(handle, CompletionKind::Error, true);
        Ok(handle)
    }

    /// Takes ownership of a configured connection.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidState`] if `conn` was never configured, or
    /// [`Error::DuplicateRegistration`] if its handle is already registered.
    pub fn register(&self, conn: Connection) -> Result<ConnectionId> {
        let Some(handle) = conn.handle else {
            return Err(Error::invalid_state("register", "unconfigured"));
        };

        let mut connections = self.connections.lock();
        if connections.find(|c| c.handle == Some(handle)).is_some() {
            tracing::debug!(handle = %handle, "Duplicate registration rejected");
            return Err(Error::DuplicateRegistration);
        }

        let id = ConnectionId(connections.push_back(conn)?);
        tracing::debug!(conn = %id, handle = %handle, "Connection registered");
        Ok(id)
    }

    /// Replaces the callbacks of a registered connection.
    ///
    /// # Errors
    ///
    /// Returns [`Error::NotRegistered`] for an unknown id.
    pub fn set_callbacks(&self, id: ConnectionId, callbacks: ConnectionCallbacks) -> Result<()> {
        let mut connections = self.connections.lock();
        let conn = connections.get_mut(id.0).ok_or(Error::NotRegistered)?;
        conn.callbacks = callbacks;
        Ok(())
    }

    /// Issues a connect request.
    ///
    /// Allowed from Idle and Closed only. A connection whose handle was
    /// released after a disconnect gets a fresh handle first.
    ///
    /// If the transport rejects the request, the connection is removed from
    /// the registry, its handle is released and its error callback runs with
    /// the transport error before the error is returned.
    ///
    /// # Errors
    ///
    /// Returns [`Error::NotRegistered`], [`Error::InvalidState`], or the
    /// transport error.
    pub fn connect(&self, id: ConnectionId) -> Result<()> {
        let (handle, error_cb) = {
            let mut connections = self.connections.lock();
            let conn = connections.get_mut(id.0).ok_or(Error::NotRegistered)?;

            let state = self.state_of(conn);
            if !state.can_connect() {
                return Err(Error::invalid_state("connect", state));
            }

            let handle = match conn.handle {
                Some(handle) => handle,
                None => {
                    let handle = self.open(&conn.host, conn.port, conn.ssl)?;
                    tracing::debug!(conn = %id, handle = %handle, "Transport handle reopened");
                    conn.handle = Some(handle);
                    handle
                }
            };

            if conn.was_connected {
                conn.reconnect_count = conn.reconnect_count.saturating_add(1);
            }
            (handle, conn.callbacks.error.clone())
        };

        match self.transport.connect(handle) {
            Ok(()) => {
                tracing::debug!(conn = %id, handle = %handle, "Connect issued");
                Ok(())
            }
            Err(error) => {
                let removed = self.connections.lock().unlink(id.0);
                if removed.is_some() {
                    self.release_handle(handle);
                }
                report(id, error_cb, error.clone());
                Err(error)
            }
        }
    }

    /// Queues `data` on a connection.
    ///
    /// The state is left to the transport's completions. On failure the
    /// error callback runs before the error is returned.
    ///
    /// # Errors
    ///
    /// Returns [`Error::NotRegistered`], [`Error::InvalidState`] when the
    /// connection holds no handle, or the transport error.
    pub fn send(&self, id: ConnectionId, data: &[u8]) -> Result<()> {
        let (handle, error_cb) = self.handle_and_error_cb(id, "send")?;
        self.transport.send(handle, data).inspect_err(|error| {
            report(id, error_cb, error.clone());
        })?;
        tracing::trace!(conn = %id, len = data.len(), "Data queued");
        Ok(())
    }

    /// Requests a graceful close.
    ///
    /// The connection stays registered; it reads as Closing until the
    /// transport reports the disconnect.
    ///
    /// # Errors
    ///
    /// Returns [`Error::NotRegistered`], [`Error::InvalidState`] when the
    /// connection holds no handle, or the transport error.
    pub fn disconnect(&self, id: ConnectionId) -> Result<()> {
        let (handle, error_cb) = self.handle_and_error_cb(id, "disconnect")?;
        self.transport.disconnect(handle).inspect_err(|error| {
            report(id, error_cb, error.clone());
        })?;

        if let Some(conn) = self.connections.lock().get_mut(id.0) {
            conn.closing = true;
        }
        tracing::debug!(conn = %id, "Disconnect issued");
        Ok(())
    }

    fn handle_and_error_cb(
        &self,
        id: ConnectionId,
        operation: &'static str,
    ) -> Result<(TransportHandle, Option<ErrorCallback>)> {
        let connections = self.connections.lock();
        let conn = connections.get(id.0).ok_or(Error::NotRegistered)?;
        let handle = conn
            .handle
            .ok_or_else(|| Error::invalid_state(operation, ConnectionState::Closed))?;
        Ok((handle, conn.callbacks.error.clone()))
    }

    /// Tears a connection down and gives its record back.
    ///
    /// Error and disconnect completions are disabled before the transport
    /// abort, so no callback can fire for the connection afterwards.
    /// Returns `None` for an unknown id.
    pub fn abort(&self, id: ConnectionId) -> Option<Connection> {
        let mut conn = self.connections.lock().unlink(id.0)?;

        if let Some(handle) = conn.handle.take() {
            self.abort_handle(handle);
        }

        conn.closing = false;
        conn.state = Some(ConnectionState::Aborted);
        tracing::debug!(conn = %id, "Connection aborted");
        Some(conn)
    }

    /// Aborts the transport session of a connection but keeps it registered.
    ///
    /// The old handle is torn down like in [`abort`](Self::abort), so its
    /// late completions miss. The connection reads Closed and opens a fresh
    /// handle on its next `connect`. Returns false for an unknown id.
    pub fn suspend(&self, id: ConnectionId) -> bool {
        let Some(handle) = self.with_conn(id, |conn| {
            conn.closing = false;
            conn.handle.take()
        }) else {
            return false;
        };

        if let Some(handle) = handle {
            self.abort_handle(handle);
        }
        tracing::debug!(conn = %id, "Connection suspended");
        true
    }

    fn abort_handle(&self, handle: TransportHandle) {
        self.transport
            .set_completion(handle, CompletionKind::Error, false);
        self.transport
            .set_completion(handle, CompletionKind::Disconnect, false);
        self.transport.abort(handle);
        self.release_handle(handle);
    }

    /// Removes a connection and gives its record back.
    ///
    /// A connection that is not Closed is aborted instead. Returns `None`
    /// for an unknown id.
    pub fn release(&self, id: ConnectionId) -> Option<Connection> {
        if self.state(id)? != ConnectionState::Closed {
            return self.abort(id);
        }

        let mut conn = self.connections.lock().unlink(id.0)?;
        if let Some(handle) = conn.handle.take() {
            self.release_handle(handle);
        }
        conn.state = Some(ConnectionState::Closed);
        tracing::debug!(conn = %id, "Connection released");
        Some(conn)
    }

    fn release_handle(&self, handle: TransportHandle) {
        for kind in CompletionKind::ALL {
            self.transport.set_completion(handle, kind, false);
        }
        self.transport.release(handle);
        tracing::trace!(handle = %handle, "Transport handle released");
    }

    /// Routes a transport completion to its connection.
    ///
    /// Returns `false` if no registered connection holds `handle`; the
    /// completion is dropped.
    pub fn dispatch(&self, handle: TransportHandle, completion: Completion) -> bool {
        let Some(id) = self.id_of(handle) else {
            tracing::debug!(handle = %handle, kind = ?completion.kind(), "Completion for unknown handle dropped");
            return false;
        };

        tracing::trace!(conn = %id, handle = %handle, kind = ?completion.kind(), "Completion");

        match completion {
            Completion::Connected => self.on_connected(id, handle),
            Completion::Received(data) => {
                if let Some(cb) = self.callback(id, |c| c.received.clone()) {
                    cb(id, &data);
                }
            }
            Completion::Sent => {
                if let Some(cb) = self.callback(id, |c| c.sent.clone()) {
                    cb(id);
                }
            }
            Completion::Disconnected => self.on_disconnected(id, handle),
            Completion::Error(code) => self.on_error(id, handle, code),
        }
        true
    }

    fn on_connected(&self, id: ConnectionId, handle: TransportHandle) {
        let Some((keepalive, error_cb)) = self.with_conn(id, |conn| {
            (conn.keepalive.effective(), conn.callbacks.error.clone())
        }) else {
            return;
        };

        if let Err(error) = self.transport.set_reuse_addr(handle) {
            report(id, error_cb, error);
            return;
        }
        if let Err(error) = self.transport.set_keepalive(handle, keepalive) {
            tracing::warn!(conn = %id, %error, "Keep-alive not applied");
        }

        for kind in [
            CompletionKind::Disconnect,
            CompletionKind::Receive,
            CompletionKind::Sent,
        ] {
            self.transport.set_completion(handle, kind, true);
        }

        let ready = self.with_conn(id, |conn| {
            conn.was_connected = true;
            conn.reconnect_count = 0;
            conn.callbacks.ready.clone()
        });
        tracing::debug!(conn = %id, keepalive = ?keepalive, "Connection ready");
        if let Some(cb) = ready.flatten() {
            cb(id);
        }
    }

    fn on_disconnected(&self, id: ConnectionId, handle: TransportHandle) {
        let disconnected = self.with_conn(id, |conn| {
            conn.closing = false;
            conn.callbacks.disconnected.clone()
        });
        tracing::debug!(conn = %id, "Connection closed");
        if let Some(cb) = disconnected.flatten() {
            cb(id);
        }

        self.release_if_held(id, handle);
    }

    /// The session ended abnormally: a failed connect, a reset peer or a
    /// failed graceful close. The connection reads Closed afterwards.
    fn on_error(&self, id: ConnectionId, handle: TransportHandle, code: i16) {
        let error_cb = self
            .with_conn(id, |conn| {
                conn.closing = false;
                conn.callbacks.error.clone()
            })
            .flatten();
        report(id, error_cb, Error::Network(code));
        self.release_if_held(id, handle);
    }

    fn release_if_held(&self, id: ConnectionId, handle: TransportHandle) {
        // A callback may have aborted, released or reconnected the
        // connection itself.
        let held = self.with_conn(id, |conn| {
            if conn.handle == Some(handle) {
                conn.handle = None;
                true
            } else {
                false
            }
        });
        if held == Some(true) {
            self.release_handle(handle);
        }
    }

    fn with_conn<R>(&self, id: ConnectionId, f: impl FnOnce(&mut Connection) -> R) -> Option<R> {
        self.connections.lock().get_mut(id.0).map(f)
    }

    fn callback<C>(
        &self,
        id: ConnectionId,
        slot: impl FnOnce(&ConnectionCallbacks) -> Option<C>,
    ) -> Option<C> {
        self.connections
            .lock()
            .get(id.0)
            .and_then(|conn| slot(&conn.callbacks))
    }

    /// Connects every registered Idle or Closed connection.
    ///
    /// Connections that used up their reconnect ceiling are skipped.
    /// Failures are reported through each connection's error callback.
    /// Returns the number of connect requests issued.
    pub fn connect_all(&self) -> usize {
        let mut issued = 0;
        for id in self.ids() {
            let eligible = self.with_conn(id, |conn| {
                (self.state_of(conn).can_connect(), conn.reconnect_exhausted())
            });
            match eligible {
                Some((true, false)) => {
                    if self.connect(id).is_ok() {
                        issued += 1;
                    }
                }
                Some((true, true)) => {
                    tracing::warn!(conn = %id, "Reconnect limit reached, skipping");
                }
                _ => {}
            }
        }
        tracing::debug!(issued, "Bulk connect");
        issued
    }

    /// Aborts every registered connection and returns their records.
    pub fn abort_all(&self) -> Vec<Connection> {
        let aborted: Vec<Connection> = self
            .ids()
            .into_iter()
            .filter_map(|id| self.abort(id))
            .collect();
        if !aborted.is_empty() {
            tracing::debug!(count = aborted.len(), "Bulk abort");
        }
        aborted
    }

    /// Suspends every registered connection and returns how many there were.
    pub fn suspend_all(&self) -> usize {
        let suspended = self
            .ids()
            .into_iter()
            .filter(|&id| self.suspend(id))
            .count();
        if suspended > 0 {
            tracing::debug!(count = suspended, "Bulk suspend");
        }
        suspended
    }

    /// Returns the state of a registered connection.
    #[must_use]
    pub fn state(&self, id: ConnectionId) -> Option<ConnectionState> {
        let connections = self.connections.lock();
        connections.get(id.0).map(|conn| self.state_of(conn))
    }

    fn state_of(&self, conn: &Connection) -> ConnectionState {
        if conn.closing {
            return ConnectionState::Closing;
        }
        conn.handle
            .and_then(|handle| self.transport.status(handle))
            .map_or(ConnectionState::Closed, ConnectionState::from)
    }

    /// Returns the id of the connection holding `handle`.
    #[must_use]
    pub fn id_of(&self, handle: TransportHandle) -> Option<ConnectionId> {
        self.connections
            .lock()
            .find(|conn| conn.handle == Some(handle))
            .map(ConnectionId)
    }

    /// Returns true if a registered connection holds `handle`.
    #[must_use]
    pub fn contains_handle(&self, handle: TransportHandle) -> bool {
        self.id_of(handle).is_some()
    }

    /// Returns true if `id` is registered.
    #[must_use]
    pub fn contains(&self, id: ConnectionId) -> bool {
        self.connections.lock().contains(id.0)
    }

    /// Returns the transport handle of a registered connection.
    #[must_use]
    pub fn handle(&self, id: ConnectionId) -> Option<TransportHandle> {
        self.connections.lock().get(id.0).and_then(|c| c.handle)
    }

    /// Returns the number of registered connections.
    #[must_use]
    pub fn len(&self) -> usize {
        self.connections.lock().len()
    }

    /// Returns true if nothing is registered.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.connections.lock().is_empty()
    }

    /// Returns the registered ids in registration order.
    #[must_use]
    pub fn ids(&self) -> Vec<ConnectionId> {
        self.connections
            .lock()
            .keys()
            .into_iter()
            .map(ConnectionId)
            .collect()
    }
}

fn report(id: ConnectionId, callback: Option<ErrorCallback>, error: Error) {
    tracing::error!(conn = %id, %error, "Connection error");
    if let Some(cb) = callback {
        cb(id, error);
    }
}

impl<T: Transport> Clone for ConnectionRegistry<T> {
    fn clone(&self) -> Self {
        Self {
            connections: Arc::clone(&self.connections),
            transport: Arc::clone(&self.transport),
        }
    }
}

impl<T: Transport> fmt::Debug for ConnectionRegistry<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ConnectionRegistry")
            .field("connections", &self.len())
            .finish_non_exhaustive()
    }
}
