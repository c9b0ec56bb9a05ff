// SPDX-License-Identifier: MPL-2.0
// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! In-memory TCP transport.

use std::collections::{HashMap, HashSet};

use parking_lot::Mutex;

use crate::connection::{
    Completion, CompletionKind, ConnectionRegistry, KeepAlive, Transport, TransportHandle,
    TransportStatus,
};
use crate::error::{Error, Result};

/// Transport code for an unroutable destination.
pub const ERR_ROUTE: i16 = -4;

/// Transport code for an argument error (unknown or released handle).
pub const ERR_ARG: i16 = -12;

#[derive(Debug)]
struct Session {
    host: String,
    port: u16,
    ssl: bool,
    status: TransportStatus,
    enabled: HashSet<CompletionKind>,
    reuse_addr: bool,
    keepalive: Option<KeepAlive>,
    sent: Vec<Vec<u8>>,
    aborted: bool,
    releases: usize,
}

#[derive(Debug, Default)]
struct State {
    next_handle: u32,
    sessions: HashMap<TransportHandle, Session>,
    unreachable: HashSet<String>,
    fail_open: bool,
    connect_error: Option<i16>,
    send_error: Option<i16>,
    disconnect_error: Option<i16>,
    reuse_addr_error: Option<i16>,
}

/// Scriptable [`Transport`] for tests and host-side runs.
///
/// Sessions are never forgotten, so tests can inspect a handle after it
/// was released. Completions are injected with [`complete`](Self::complete),
/// which only forwards kinds the registry enabled.
///
/// # Examples
///
/// ```
/// use std::sync::Arc;
/// use espnet::connection::{Connection, ConnectionRegistry};
/// use espnet::sim::SimTransport;
///
/// let transport = Arc::new(SimTransport::new());
/// transport.refuse_host("10.9.9.9");
///
/// let registry = ConnectionRegistry::new(Arc::clone(&transport));
/// let mut conn = Connection::new();
/// registry.configure(&mut conn, "10.9.9.9", 80, false).unwrap();
/// let id = registry.register(conn).unwrap();
///
/// assert!(registry.connect(id).is_err());
/// assert!(registry.is_empty());
/// ```
#[derive(Debug, Default)]
pub struct SimTransport {
    state: Mutex<State>,
}

impl SimTransport {
    /// Creates a transport with no sessions.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Makes `open` fail with [`Error::OutOfMemory`].
    pub fn fail_open(&self, fail: bool) {
        self.state.lock().fail_open = fail;
    }

    /// Makes every `connect` fail with the given code.
    pub fn fail_connect(&self, code: Option<i16>) {
        self.state.lock().connect_error = code;
    }

    /// Makes every `send` fail with the given code.
    pub fn fail_send(&self, code: Option<i16>) {
        self.state.lock().send_error = code;
    }

    /// Makes every `disconnect` fail with the given code.
    pub fn fail_disconnect(&self, code: Option<i16>) {
        self.state.lock().disconnect_error = code;
    }

    /// Makes `set_reuse_addr` fail with the given code.
    pub fn fail_reuse_addr(&self, code: Option<i16>) {
        self.state.lock().reuse_addr_error = code;
    }

    /// Makes `connect` to `host` fail with [`ERR_ROUTE`].
    pub fn refuse_host(&self, host: impl Into<String>) {
        self.state.lock().unreachable.insert(host.into());
    }

    /// Delivers a completion for `handle` to `registry`.
    ///
    /// The session status follows the completion first. Returns true if the
    /// completion kind was enabled and the registry found the connection.
    pub fn complete(
        &self,
        registry: &ConnectionRegistry<Self>,
        handle: TransportHandle,
        completion: Completion,
    ) -> bool {
        let enabled = {
            let mut state = self.state.lock();
            let Some(session) = state.sessions.get_mut(&handle) else {
                return false;
            };
            if session.releases == 0 {
                session.status = match completion {
                    Completion::Connected | Completion::Sent | Completion::Received(_) => {
                        TransportStatus::Connected
                    }
                    Completion::Disconnected | Completion::Error(_) => TransportStatus::Closed,
                };
            }
            session.releases == 0 && session.enabled.contains(&completion.kind())
        };

        if !enabled {
            tracing::trace!(handle = %handle, kind = ?completion.kind(), "Completion not enabled");
            return false;
        }
        registry.dispatch(handle, completion)
    }

    /// Returns true if `kind` is enabled for `handle`.
    #[must_use]
    pub fn is_enabled(&self, handle: TransportHandle, kind: CompletionKind) -> bool {
        self.inspect(handle, |s| s.enabled.contains(&kind))
            .unwrap_or(false)
    }

    /// Returns true once `handle` was released.
    #[must_use]
    pub fn is_released(&self, handle: TransportHandle) -> bool {
        self.release_count(handle) > 0
    }

    /// Returns how many times `handle` was released.
    #[must_use]
    pub fn release_count(&self, handle: TransportHandle) -> usize {
        self.inspect(handle, |s| s.releases).unwrap_or(0)
    }

    /// Returns true if `handle` was aborted.
    #[must_use]
    pub fn is_aborted(&self, handle: TransportHandle) -> bool {
        self.inspect(handle, |s| s.aborted).unwrap_or(false)
    }

    /// Returns true if address reuse was enabled on `handle`.
    #[must_use]
    pub fn reuse_addr(&self, handle: TransportHandle) -> bool {
        self.inspect(handle, |s| s.reuse_addr).unwrap_or(false)
    }

    /// Returns the keep-alive applied to `handle`.
    #[must_use]
    pub fn keepalive(&self, handle: TransportHandle) -> Option<KeepAlive> {
        self.inspect(handle, |s| s.keepalive).flatten()
    }

    /// Returns the payloads sent on `handle`.
    #[must_use]
    pub fn sent(&self, handle: TransportHandle) -> Vec<Vec<u8>> {
        self.inspect(handle, |s| s.sent.clone()).unwrap_or_default()
    }

    /// Returns the `(host, port, ssl)` target of `handle`.
    #[must_use]
    pub fn target(&self, handle: TransportHandle) -> Option<(String, u16, bool)> {
        self.inspect(handle, |s| (s.host.clone(), s.port, s.ssl))
    }

    /// Returns the number of sessions ever opened.
    #[must_use]
    pub fn open_count(&self) -> usize {
        self.state.lock().sessions.len()
    }

    fn inspect<R>(&self, handle: TransportHandle, f: impl FnOnce(&Session) -> R) -> Option<R> {
        self.state.lock().sessions.get(&handle).map(f)
    }

    fn with_live<R>(
        &self,
        handle: TransportHandle,
        f: impl FnOnce(&mut Session) -> Result<R>,
    ) -> Result<R> {
        let mut state = self.state.lock();
        match state.sessions.get_mut(&handle) {
            Some(session) if session.releases == 0 => f(session),
            _ => Err(Error::Network(ERR_ARG)),
        }
    }
}

impl Transport for SimTransport {
    fn open(&self, host: &str, port: u16, ssl: bool) -> Result<TransportHandle> {
        let mut state = self.state.lock();
        if state.fail_open {
            return Err(Error::OutOfMemory);
        }
        state.next_handle += 1;
        let handle = TransportHandle::new(state.next_handle);
        state.sessions.insert(
            handle,
            Session {
                host: host.to_owned(),
                port,
                ssl,
                status: TransportStatus::Idle,
                enabled: HashSet::new(),
                reuse_addr: false,
                keepalive: None,
                sent: Vec::new(),
                aborted: false,
                releases: 0,
            },
        );
        Ok(handle)
    }

    fn connect(&self, handle: TransportHandle) -> Result<()> {
        let (connect_error, unreachable) = {
            let state = self.state.lock();
            let unreachable = state
                .sessions
                .get(&handle)
                .is_some_and(|s| state.unreachable.contains(&s.host));
            (state.connect_error, unreachable)
        };
        self.with_live(handle, |session| {
            if let Some(code) = connect_error {
                return Err(Error::Network(code));
            }
            if unreachable {
                return Err(Error::Network(ERR_ROUTE));
            }
            session.status = TransportStatus::Waiting;
            Ok(())
        })
    }

    fn send(&self, handle: TransportHandle, data: &[u8]) -> Result<()> {
        let send_error = self.state.lock().send_error;
        self.with_live(handle, |session| {
            if let Some(code) = send_error {
                return Err(Error::Network(code));
            }
            session.sent.push(data.to_vec());
            session.status = TransportStatus::Writing;
            Ok(())
        })
    }

    fn disconnect(&self, handle: TransportHandle) -> Result<()> {
        let disconnect_error = self.state.lock().disconnect_error;
        self.with_live(handle, |_| match disconnect_error {
            Some(code) => Err(Error::Network(code)),
            None => Ok(()),
        })
    }

    fn abort(&self, handle: TransportHandle) {
        if let Some(session) = self.state.lock().sessions.get_mut(&handle) {
            session.aborted = true;
            session.status = TransportStatus::Closed;
        }
    }

    fn release(&self, handle: TransportHandle) {
        if let Some(session) = self.state.lock().sessions.get_mut(&handle) {
            session.releases += 1;
            session.enabled.clear();
        }
    }

    fn set_reuse_addr(&self, handle: TransportHandle) -> Result<()> {
        let reuse_addr_error = self.state.lock().reuse_addr_error;
        self.with_live(handle, |session| {
            if let Some(code) = reuse_addr_error {
                return Err(Error::Network(code));
            }
            session.reuse_addr = true;
            Ok(())
        })
    }

    fn set_keepalive(&self, handle: TransportHandle, keepalive: KeepAlive) -> Result<()> {
        self.with_live(handle, |session| {
            session.keepalive = Some(keepalive);
            Ok(())
        })
    }

    fn set_completion(&self, handle: TransportHandle, kind: CompletionKind, enabled: bool) {
        if let Some(session) = self.state.lock().sessions.get_mut(&handle) {
            if enabled {
                session.enabled.insert(kind);
            } else {
                session.enabled.remove(&kind);
            }
        }
    }

    fn status(&self, handle: TransportHandle) -> Option<TransportStatus> {
        self.state
            .lock()
            .sessions
            .get(&handle)
            .filter(|s| s.releases == 0)
            .map(|s| s.status)
    }
}
