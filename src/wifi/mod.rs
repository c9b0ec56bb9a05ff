// SPDX-License-Identifier: MPL-2.0
// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Wi-Fi station supervision.
//!
//! The [`WifiSupervisor`] configures the radio through a [`WifiPlatform`],
//! follows the association through the event bus and keeps the managed
//! connections in step with it.

mod config;
mod platform;
mod supervisor;

pub use config::{PASSWORD_MAX_LEN, SSID_MAX_LEN, StaticIp, WifiConfig};
pub use platform::{OpMode, PlatformResult, StationStatus, WifiPlatform};
pub use supervisor::{FatalCallback, WIFI_GROUP, WifiStatus, WifiSupervisor};
