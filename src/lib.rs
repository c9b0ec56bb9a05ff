// SPDX-License-Identifier: MPL-2.0
// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! `espnet` - event bus and Wi-Fi/TCP connection supervisor for Wi-Fi
//! microcontrollers.
//!
//! The library decouples hardware and network events from application logic
//! and keeps a set of TCP client connections in step with the station's
//! Wi-Fi association.
//!
//! # Components
//!
//! - **[`EventBus`]**: publish/subscribe dispatcher with throttled, delayed
//!   delivery and group-scoped teardown. Hardware Wi-Fi events are fanned out
//!   through it.
//! - **[`ConnectionRegistry`]**: owns the managed TCP connections, routes
//!   transport completions to them by handle and drives their state.
//! - **[`WifiSupervisor`]**: configures the station, counts disassociations
//!   against a reconnect ceiling, and bulk-connects or aborts the managed
//!   connections as the association comes and goes.
//!
//! The radio and TCP stack are abstracted by the [`WifiPlatform`] and
//! [`Transport`] traits. The [`sim`] module provides in-memory
//! implementations of both.
//!
//! # Quick Start
//!
//! ```
//! use std::sync::Arc;
//! use espnet::{
//!     Connection, ConnectionCallbacks, ConnectionRegistry, EventBus, WifiConfig, WifiSupervisor,
//! };
//! use espnet::sim::{SimTransport, SimWifi};
//!
//! # #[tokio::main(flavor = "current_thread")]
//! # async fn main() -> espnet::Result<()> {
//! let radio = Arc::new(SimWifi::new());
//! let registry = ConnectionRegistry::new(Arc::new(SimTransport::new()));
//! let supervisor = WifiSupervisor::new(EventBus::new(), registry.clone(), radio);
//!
//! supervisor.start(&WifiConfig::new("home", "secret").with_reconnect_max(3), |status| {
//!     if let Err(e) = status {
//!         eprintln!("wifi: {e}");
//!     }
//! })?;
//!
//! // Connected as soon as the station obtains an IP.
//! let mut conn = Connection::new().with_callbacks(
//!     ConnectionCallbacks::new()
//!         .on_ready(|id| println!("{id} ready"))
//!         .on_received(|id, data| println!("{id}: {} bytes", data.len())),
//! );
//! registry.configure(&mut conn, "192.168.1.20", 1883, false)?;
//! supervisor.manage(conn)?;
//! # Ok(())
//! # }
//! ```
//!
//! # Logging
//!
//! Diagnostics are emitted through [`tracing`]. The library installs no
//! subscriber.

pub mod connection;
pub mod error;
pub mod event;
pub mod list;
pub mod sim;
pub mod timer;
pub mod wifi;

pub use connection::{
    Completion, Connection, ConnectionCallbacks, ConnectionId, ConnectionRegistry,
    ConnectionState, KeepAlive, Transport, TransportHandle,
};
pub use error::{Error, ErrorCategory, PlatformError, Result};
pub use event::{BusConfig, Event, EventBus, EventCallback, EventCode, Group, WifiEvent};
pub use wifi::{StaticIp, WifiConfig, WifiPlatform, WifiStatus, WifiSupervisor};
