// SPDX-License-Identifier: MPL-2.0
// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Managed TCP client connections.
//!
//! A [`Connection`] is built by the caller, pointed at a host with
//! [`ConnectionRegistry::configure`] and handed to the registry with
//! [`ConnectionRegistry::register`]. From then on the registry owns it:
//! transport completions are routed to it by handle, and it only comes back
//! out through [`ConnectionRegistry::abort`] or
//! [`ConnectionRegistry::release`].
//!
//! The platform TCP stack is abstracted by the [`Transport`] trait.

mod config;
mod managed;
mod registry;
mod transport;

pub use config::{ConnectionCallbacks, KeepAlive};
pub use managed::{Connection, ConnectionState};
pub use registry::{ConnectionId, ConnectionRegistry};
pub use transport::{Completion, CompletionKind, Transport, TransportHandle, TransportStatus};
