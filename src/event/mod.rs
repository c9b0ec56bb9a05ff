// SPDX-License-Identifier: MPL-2.0
// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Publish/subscribe event bus.
//!
//! The [`EventBus`] decouples hardware and network events from application
//! logic. Subscribers attach an [`EventCallback`] to a numeric event code,
//! optionally under a [`Group`] so an owner can tear down everything it
//! attached in one call, and optionally throttled so the callback fires at
//! most once per interval.
//!
//! Triggers are never delivered synchronously: every trigger is scheduled
//! on a one-shot timer and each subscription is re-validated when the timer
//! fires, so detaching before delivery is observable and safe.
//!
//! # Examples
//!
//! ```
//! use espnet::event::{EventBus, EventCallback};
//!
//! # #[tokio::main(flavor = "current_thread")]
//! # async fn main() -> espnet::Result<()> {
//! const BATTERY_LOW: u16 = 2000;
//! const APP_GROUP: u8 = 200;
//!
//! let bus = EventBus::new();
//! let on_low = EventCallback::new(|event| {
//!     let level = event.payload_as::<u32>().copied().unwrap_or_default();
//!     println!("battery low: {level}%");
//! });
//!
//! bus.attach(BATTERY_LOW, &on_low, APP_GROUP)?;
//! bus.trigger(BATTERY_LOW, Some(std::sync::Arc::new(7_u32)));
//!
//! // Later, drop every subscription the application created.
//! bus.remove_group(APP_GROUP);
//! # Ok(())
//! # }
//! ```

mod bus_config;
mod callback;
mod event_bus;
mod subscription;
mod wifi_event;

pub use bus_config::BusConfig;
pub use callback::{Event, EventCallback, Payload};
pub use event_bus::EventBus;
pub use subscription::SubscriptionInfo;
pub use wifi_event::{WIFI_STATION_EVENTS, WifiEvent, WifiEventHandler, codes};

/// Numeric identifier of a bus event.
///
/// Codes `0..=1023` are reserved for built-in (Wi-Fi) events.
pub type EventCode = u16;

/// Tag used to detach every subscription of one logical owner at once.
///
/// `0` means ungrouped; `1..=128` are reserved for library-internal owners.
pub type Group = u8;

/// Highest event code reserved for built-in events.
pub const RESERVED_EVENT_MAX: EventCode = 1023;

/// Subscriptions created without an owner.
pub const UNGROUPED: Group = 0;

/// Highest group reserved for library-internal owners.
pub const RESERVED_GROUP_MAX: Group = 128;
