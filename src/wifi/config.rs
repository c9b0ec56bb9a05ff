// SPDX-License-Identifier: MPL-2.0
// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Station configuration.

use std::net::Ipv4Addr;

/// Maximum SSID length accepted by the radio, in bytes.
pub const SSID_MAX_LEN: usize = 32;

/// Maximum password length accepted by the radio, in bytes.
pub const PASSWORD_MAX_LEN: usize = 64;

/// Static station address.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct StaticIp {
    /// Station address.
    pub ip: Ipv4Addr,
    /// Network mask.
    pub netmask: Ipv4Addr,
    /// Default gateway.
    pub gateway: Ipv4Addr,
}

impl StaticIp {
    /// Creates a static address triple.
    #[must_use]
    pub const fn new(ip: Ipv4Addr, netmask: Ipv4Addr, gateway: Ipv4Addr) -> Self {
        Self {
            ip,
            netmask,
            gateway,
        }
    }

    /// Returns true if no field is unspecified (`0.0.0.0`).
    #[must_use]
    pub fn is_complete(&self) -> bool {
        !(self.ip.is_unspecified() || self.netmask.is_unspecified() || self.gateway.is_unspecified())
    }
}

/// Station configuration for [`WifiSupervisor::start`](super::WifiSupervisor::start).
///
/// # Examples
///
/// ```
/// use std::net::Ipv4Addr;
/// use espnet::wifi::{StaticIp, WifiConfig};
///
/// let config = WifiConfig::new("home", "secret")
///     .with_reconnect_max(5)
///     .with_static_ip(StaticIp::new(
///         Ipv4Addr::new(192, 168, 1, 50),
///         Ipv4Addr::new(255, 255, 255, 0),
///         Ipv4Addr::new(192, 168, 1, 1),
///     ));
/// assert_eq!(config.reconnect_max, 5);
/// assert!(!config.uses_dhcp());
/// ```
#[derive(Debug, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[cfg_attr(feature = "serde", serde(default))]
pub struct WifiConfig {
    /// Network name.
    pub ssid: String,
    /// Network password.
    pub password: String,
    /// Consecutive disassociations tolerated before giving up (0 means 1).
    pub reconnect_max: u8,
    /// Whether the radio re-associates on its own below the ceiling.
    pub platform_reconnect: bool,
    /// Static address; DHCP is used when unset or incomplete.
    pub static_ip: Option<StaticIp>,
    /// DHCP attempts allowed per association.
    pub dhcp_max_tries: u8,
}

impl WifiConfig {
    /// Creates a configuration using DHCP.
    #[must_use]
    pub fn new(ssid: impl Into<String>, password: impl Into<String>) -> Self {
        Self {
            ssid: ssid.into(),
            password: password.into(),
            ..Self::default()
        }
    }

    /// Sets the reconnect ceiling.
    #[must_use]
    pub fn with_reconnect_max(mut self, max: u8) -> Self {
        self.reconnect_max = max;
        self
    }

    /// Enables or disables the radio's own re-association.
    #[must_use]
    pub fn with_platform_reconnect(mut self, enabled: bool) -> Self {
        self.platform_reconnect = enabled;
        self
    }

    /// Uses a static address instead of DHCP.
    #[must_use]
    pub fn with_static_ip(mut self, static_ip: StaticIp) -> Self {
        self.static_ip = Some(static_ip);
        self
    }

    /// Sets the DHCP attempt bound.
    #[must_use]
    pub fn with_dhcp_max_tries(mut self, tries: u8) -> Self {
        self.dhcp_max_tries = tries;
        self
    }

    /// Returns the effective reconnect ceiling (at least 1).
    #[must_use]
    pub fn effective_reconnect_max(&self) -> u8 {
        self.reconnect_max.max(1)
    }

    /// Returns the static address if one is fully specified.
    #[must_use]
    pub fn effective_static_ip(&self) -> Option<StaticIp> {
        self.static_ip.filter(StaticIp::is_complete)
    }

    /// Returns true if the station obtains its address by DHCP.
    #[must_use]
    pub fn uses_dhcp(&self) -> bool {
        self.effective_static_ip().is_none()
    }

    /// Returns the SSID truncated to what the radio accepts.
    #[must_use]
    pub fn radio_ssid(&self) -> &str {
        truncate(&self.ssid, SSID_MAX_LEN)
    }

    /// Returns the password truncated to what the radio accepts.
    #[must_use]
    pub fn radio_password(&self) -> &str {
        truncate(&self.password, PASSWORD_MAX_LEN)
    }

    /// Parses a configuration from JSON.
    ///
    /// Missing fields take their defaults.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidArgument`](crate::Error::InvalidArgument) if
    /// the JSON is malformed.
    #[cfg(feature = "serde")]
    pub fn from_json(json: &str) -> crate::Result<Self> {
        serde_json::from_str(json)
            .map_err(|e| crate::Error::InvalidArgument(format!("wifi config: {e}")))
    }
}

impl Default for WifiConfig {
    fn default() -> Self {
        Self {
            ssid: String::new(),
            password: String::new(),
            reconnect_max: 1,
            platform_reconnect: true,
            static_ip: None,
            dhcp_max_tries: 3,
        }
    }
}

/// Truncates to at most `max` bytes on a char boundary.
fn truncate(s: &str, max: usize) -> &str {
    if s.len() <= max {
        return s;
    }
    let mut end = max;
    while !s.is_char_boundary(end) {
        end -= 1;
    }
    &s[..end]
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn zero_ceiling_means_one() {
        let config = WifiConfig::new("a", "b").with_reconnect_max(0);
        assert_eq!(config.effective_reconnect_max(), 1);
    }

    #[test]
    fn incomplete_static_ip_falls_back_to_dhcp() {
        let partial = StaticIp::new(
            Ipv4Addr::new(10, 0, 0, 5),
            Ipv4Addr::UNSPECIFIED,
            Ipv4Addr::new(10, 0, 0, 1),
        );
        let config = WifiConfig::new("a", "b").with_static_ip(partial);
        assert!(config.uses_dhcp());
    }

    #[test]
    fn credentials_truncated_for_radio() {
        let config = WifiConfig::new("s".repeat(40), "p".repeat(70));
        assert_eq!(config.radio_ssid().len(), SSID_MAX_LEN);
        assert_eq!(config.radio_password().len(), PASSWORD_MAX_LEN);
    }

    #[test]
    fn truncation_respects_char_boundaries() {
        let ssid = format!("{}é", "a".repeat(31));
        let config = WifiConfig::new(ssid, "");
        assert_eq!(config.radio_ssid(), "a".repeat(31));
    }

    #[cfg(feature = "serde")]
    #[test]
    fn from_json_fills_defaults() {
        let config = WifiConfig::from_json(
            r#"{"ssid":"lab","password":"pw","static_ip":{"ip":"10.0.0.9","netmask":"255.0.0.0","gateway":"10.0.0.1"}}"#,
        )
        .unwrap();
        assert_eq!(config.ssid, "lab");
        assert_eq!(config.reconnect_max, 1);
        assert_eq!(config.dhcp_max_tries, 3);
        assert!(config.platform_reconnect);
        assert_eq!(
            config.effective_static_ip().map(|s| s.ip),
            Some(Ipv4Addr::new(10, 0, 0, 9))
        );
    }

    #[cfg(feature = "serde")]
    #[test]
    fn from_json_rejects_garbage() {
        let err = WifiConfig::from_json("{not json").unwrap_err();
        assert!(matches!(err, crate::Error::InvalidArgument(_)));
    }
}
