// SPDX-License-Identifier: MPL-2.0
// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Radio platform abstraction.

use std::fmt;

use super::StaticIp;
use crate::error::PlatformError;
use crate::event::WifiEventHandler;

/// Result of a platform call.
pub type PlatformResult = std::result::Result<(), PlatformError>;

/// Station association status.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StationStatus {
    /// Not associated and not trying.
    Idle,
    /// Association in progress.
    Connecting,
    /// The password was rejected.
    WrongPassword,
    /// The access point was not found.
    NoApFound,
    /// Association failed.
    ConnectFail,
    /// Associated with an IP address.
    GotIp,
    /// The radio reports no station status (station mode off).
    Unknown,
}

impl StationStatus {
    /// Returns true if a supervisor may start from this status.
    #[must_use]
    pub fn is_idle(self) -> bool {
        matches!(self, Self::Idle | Self::Unknown)
    }
}

impl fmt::Display for StationStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Idle => "idle",
            Self::Connecting => "connecting",
            Self::WrongPassword => "wrong password",
            Self::NoApFound => "no ap found",
            Self::ConnectFail => "connect fail",
            Self::GotIp => "got ip",
            Self::Unknown => "unknown",
        };
        f.write_str(name)
    }
}

/// Radio operating mode.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OpMode {
    /// Radio off.
    Null,
    /// Station only.
    Station,
    /// Soft access point only.
    SoftAp,
    /// Station and soft access point.
    StationSoftAp,
}

/// Radio and IP configuration primitives.
///
/// Calls are synchronous. Association progress is reported through the
/// handler installed with [`set_event_handler`](Self::set_event_handler).
pub trait WifiPlatform: Send + Sync {
    /// Returns the station association status.
    fn station_status(&self) -> StationStatus;

    /// Sets the operating mode for the current session.
    fn set_opmode(&self, mode: OpMode) -> PlatformResult;

    /// Starts the DHCP client.
    fn dhcp_start(&self) -> PlatformResult;

    /// Stops the DHCP client.
    fn dhcp_stop(&self) -> PlatformResult;

    /// Applies a static station address.
    fn set_ip_info(&self, ip: &StaticIp) -> PlatformResult;

    /// Sets the station credentials for the current session.
    fn set_station_config(&self, ssid: &str, password: &str) -> PlatformResult;

    /// Enables or disables automatic re-association.
    fn set_reconnect_policy(&self, enabled: bool) -> PlatformResult;

    /// Starts associating.
    fn station_connect(&self) -> PlatformResult;

    /// Drops the association.
    fn station_disconnect(&self) -> PlatformResult;

    /// Bounds the number of DHCP attempts.
    fn dhcp_set_max_tries(&self, tries: u8) -> PlatformResult;

    /// Installs the hardware event handler, replacing any previous one.
    fn set_event_handler(&self, handler: WifiEventHandler);
}
