// SPDX-License-Identifier: MPL-2.0
// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Hardware Wi-Fi events and their bus codes.

use std::fmt;
use std::net::Ipv4Addr;
use std::sync::Arc;

use super::EventCode;

/// Bus codes of the built-in Wi-Fi events.
///
/// The numbering follows the radio SDK's event identifiers.
pub mod codes {
    use super::EventCode;

    /// The station associated with an access point.
    pub const STATION_CONNECTED: EventCode = 0;
    /// The station lost (or failed) its association.
    pub const STATION_DISCONNECTED: EventCode = 1;
    /// The access point changed its authentication mode.
    pub const AUTH_MODE_CHANGED: EventCode = 2;
    /// The station obtained an IP address.
    pub const GOT_IP: EventCode = 3;
    /// DHCP gave up without obtaining an address.
    pub const DHCP_TIMEOUT: EventCode = 4;
    /// A station joined the soft-AP.
    pub const SOFTAP_STATION_CONNECTED: EventCode = 5;
    /// A station left the soft-AP.
    pub const SOFTAP_STATION_DISCONNECTED: EventCode = 6;
    /// The soft-AP received a probe request.
    pub const PROBE_REQUEST_RECEIVED: EventCode = 7;
    /// The radio operating mode changed.
    pub const OPMODE_CHANGED: EventCode = 8;
}

/// Station events subscribed by
/// [`EventBus::attach_wifi_events`](super::EventBus::attach_wifi_events).
pub const WIFI_STATION_EVENTS: [EventCode; 6] = [
    codes::STATION_CONNECTED,
    codes::STATION_DISCONNECTED,
    codes::AUTH_MODE_CHANGED,
    codes::GOT_IP,
    codes::DHCP_TIMEOUT,
    codes::OPMODE_CHANGED,
];

/// Handler installed into the radio platform to receive hardware events.
pub type WifiEventHandler = Arc<dyn Fn(WifiEvent) + Send + Sync>;

/// A hardware Wi-Fi event with its payload.
///
/// The bus delivers this value as the trigger payload, so subscribers
/// read it with `event.payload_as::<WifiEvent>()`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum WifiEvent {
    /// Associated with an access point.
    StationConnected {
        /// Network name.
        ssid: String,
        /// Access point MAC.
        bssid: [u8; 6],
        /// Radio channel.
        channel: u8,
    },
    /// Association lost or failed.
    StationDisconnected {
        /// Network name.
        ssid: String,
        /// Access point MAC.
        bssid: [u8; 6],
        /// Hardware disconnect reason.
        reason: u8,
    },
    /// The access point changed its authentication mode.
    AuthModeChanged {
        /// Previous mode.
        old_mode: u8,
        /// New mode.
        new_mode: u8,
    },
    /// An IP address was obtained.
    GotIp {
        /// Station address.
        ip: Ipv4Addr,
        /// Network mask.
        netmask: Ipv4Addr,
        /// Default gateway.
        gateway: Ipv4Addr,
    },
    /// DHCP timed out.
    DhcpTimeout,
    /// A station joined the soft-AP.
    SoftApStationConnected {
        /// Station MAC.
        mac: [u8; 6],
        /// Association id.
        aid: u8,
    },
    /// A station left the soft-AP.
    SoftApStationDisconnected {
        /// Station MAC.
        mac: [u8; 6],
        /// Association id.
        aid: u8,
    },
    /// The soft-AP saw a probe request.
    ProbeRequestReceived {
        /// Sender MAC.
        mac: [u8; 6],
        /// Signal strength.
        rssi: i32,
    },
    /// The radio operating mode changed.
    OpModeChanged {
        /// Previous mode.
        old_mode: u8,
        /// New mode.
        new_mode: u8,
    },
}

impl WifiEvent {
    /// Returns the bus code of this event.
    #[must_use]
    pub fn code(&self) -> EventCode {
        match self {
            Self::StationConnected { .. } => codes::STATION_CONNECTED,
            Self::StationDisconnected { .. } => codes::STATION_DISCONNECTED,
            Self::AuthModeChanged { .. } => codes::AUTH_MODE_CHANGED,
            Self::GotIp { .. } => codes::GOT_IP,
            Self::DhcpTimeout => codes::DHCP_TIMEOUT,
            Self::SoftApStationConnected { .. } => codes::SOFTAP_STATION_CONNECTED,
            Self::SoftApStationDisconnected { .. } => codes::SOFTAP_STATION_DISCONNECTED,
            Self::ProbeRequestReceived { .. } => codes::PROBE_REQUEST_RECEIVED,
            Self::OpModeChanged { .. } => codes::OPMODE_CHANGED,
        }
    }

    /// Returns a short name for logs.
    #[must_use]
    pub fn name(&self) -> &'static str {
        match self {
            Self::StationConnected { .. } => "station connected",
            Self::StationDisconnected { .. } => "station disconnected",
            Self::AuthModeChanged { .. } => "auth mode changed",
            Self::GotIp { .. } => "got ip",
            Self::DhcpTimeout => "dhcp timeout",
            Self::SoftApStationConnected { .. } => "softap station connected",
            Self::SoftApStationDisconnected { .. } => "softap station disconnected",
            Self::ProbeRequestReceived { .. } => "probe request received",
            Self::OpModeChanged { .. } => "opmode changed",
        }
    }

    pub(crate) fn log(&self) {
        match self {
            Self::StationConnected {
                ssid,
                bssid,
                channel,
            } => tracing::debug!(ssid = %ssid, bssid = %Mac(bssid), channel, "Wifi station connected"),
            Self::StationDisconnected {
                ssid,
                bssid,
                reason,
            } => tracing::debug!(ssid = %ssid, bssid = %Mac(bssid), reason, "Wifi station disconnected"),
            Self::AuthModeChanged { old_mode, new_mode }
            | Self::OpModeChanged { old_mode, new_mode } => {
                tracing::debug!(old_mode, new_mode, event = self.name(), "Wifi mode changed");
            }
            Self::GotIp {
                ip,
                netmask,
                gateway,
            } => tracing::debug!(ip = %ip, netmask = %netmask, gateway = %gateway, "Wifi got IP"),
            Self::DhcpTimeout => tracing::debug!("Wifi DHCP timeout"),
            Self::SoftApStationConnected { mac, aid }
            | Self::SoftApStationDisconnected { mac, aid } => {
                tracing::debug!(mac = %Mac(mac), aid, event = self.name(), "SoftAP station");
            }
            Self::ProbeRequestReceived { mac, rssi } => {
                tracing::trace!(mac = %Mac(mac), rssi, "Probe request");
            }
        }
    }
}

/// Colon-separated MAC formatter.
pub(crate) struct Mac<'a>(pub &'a [u8; 6]);

impl fmt::Display for Mac<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let [a, b, c, d, e, g] = self.0;
        write!(f, "{a:02x}:{b:02x}:{c:02x}:{d:02x}:{e:02x}:{g:02x}")
    }
}
