// SPDX-License-Identifier: MPL-2.0
// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! In-memory radio platform.

use std::collections::HashSet;

use parking_lot::Mutex;

use crate::error::PlatformError;
use crate::event::{WifiEvent, WifiEventHandler};
use crate::wifi::{OpMode, PlatformResult, StaticIp, StationStatus, WifiPlatform};

struct State {
    status: StationStatus,
    opmode: OpMode,
    dhcp_running: bool,
    ip_info: Option<StaticIp>,
    station_config: Option<(String, String)>,
    reconnect_policy: Option<bool>,
    dhcp_max_tries: Option<u8>,
    connect_calls: usize,
    disconnect_calls: usize,
    handler: Option<WifiEventHandler>,
    failing: HashSet<&'static str>,
}

/// Scriptable [`WifiPlatform`] for tests and host-side runs.
///
/// Any platform call can be made to fail by name with
/// [`fail`](Self::fail); hardware events are injected with
/// [`emit`](Self::emit).
///
/// # Examples
///
/// ```
/// use espnet::sim::SimWifi;
/// use espnet::wifi::{OpMode, WifiPlatform};
///
/// let radio = SimWifi::new();
/// radio.fail("set_opmode");
/// assert!(radio.set_opmode(OpMode::Station).is_err());
///
/// radio.recover("set_opmode");
/// assert!(radio.set_opmode(OpMode::Station).is_ok());
/// assert_eq!(radio.opmode(), OpMode::Station);
/// ```
pub struct SimWifi {
    state: Mutex<State>,
}

impl SimWifi {
    /// Creates an idle radio in Null mode.
    #[must_use]
    pub fn new() -> Self {
        Self {
            state: Mutex::new(State {
                status: StationStatus::Idle,
                opmode: OpMode::Null,
                dhcp_running: false,
                ip_info: None,
                station_config: None,
                reconnect_policy: None,
                dhcp_max_tries: None,
                connect_calls: 0,
                disconnect_calls: 0,
                handler: None,
                failing: HashSet::new(),
            }),
        }
    }

    /// Makes the named platform call fail.
    pub fn fail(&self, operation: &'static str) {
        self.state.lock().failing.insert(operation);
    }

    /// Makes the named platform call succeed again.
    pub fn recover(&self, operation: &'static str) {
        self.state.lock().failing.remove(operation);
    }

    /// Overrides the station status.
    pub fn set_status(&self, status: StationStatus) {
        self.state.lock().status = status;
    }

    /// Delivers a hardware event to the installed handler.
    ///
    /// The station status follows the event. Returns false if no handler
    /// is installed.
    pub fn emit(&self, event: WifiEvent) -> bool {
        let handler = {
            let mut state = self.state.lock();
            match event {
                WifiEvent::StationConnected { .. } => state.status = StationStatus::Connecting,
                WifiEvent::GotIp { .. } => state.status = StationStatus::GotIp,
                WifiEvent::StationDisconnected { .. } => {
                    state.status = if state.reconnect_policy == Some(true) {
                        StationStatus::Connecting
                    } else {
                        StationStatus::ConnectFail
                    };
                }
                _ => {}
            }
            state.handler.clone()
        };

        match handler {
            Some(handler) => {
                handler(event);
                true
            }
            None => false,
        }
    }

    /// Returns the operating mode.
    #[must_use]
    pub fn opmode(&self) -> OpMode {
        self.state.lock().opmode
    }

    /// Returns true while the DHCP client runs.
    #[must_use]
    pub fn dhcp_running(&self) -> bool {
        self.state.lock().dhcp_running
    }

    /// Returns the static address applied, if any.
    #[must_use]
    pub fn ip_info(&self) -> Option<StaticIp> {
        self.state.lock().ip_info
    }

    /// Returns the `(ssid, password)` applied, if any.
    #[must_use]
    pub fn station_config(&self) -> Option<(String, String)> {
        self.state.lock().station_config.clone()
    }

    /// Returns the last reconnect policy applied.
    #[must_use]
    pub fn reconnect_policy(&self) -> Option<bool> {
        self.state.lock().reconnect_policy
    }

    /// Returns the last DHCP attempt bound applied.
    #[must_use]
    pub fn dhcp_max_tries(&self) -> Option<u8> {
        self.state.lock().dhcp_max_tries
    }

    /// Returns how many times association was requested.
    #[must_use]
    pub fn connect_calls(&self) -> usize {
        self.state.lock().connect_calls
    }

    /// Returns how many times disassociation was requested.
    #[must_use]
    pub fn disconnect_calls(&self) -> usize {
        self.state.lock().disconnect_calls
    }

    /// Returns true if an event handler is installed.
    #[must_use]
    pub fn has_handler(&self) -> bool {
        self.state.lock().handler.is_some()
    }

    fn call(&self, operation: &'static str, apply: impl FnOnce(&mut State)) -> PlatformResult {
        let mut state = self.state.lock();
        if state.failing.contains(operation) {
            return Err(PlatformError::new(operation));
        }
        apply(&mut state);
        Ok(())
    }
}

impl Default for SimWifi {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for SimWifi {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let state = self.state.lock();
        f.debug_struct("SimWifi")
            .field("status", &state.status)
            .field("opmode", &state.opmode)
            .finish_non_exhaustive()
    }
}

impl WifiPlatform for SimWifi {
    fn station_status(&self) -> StationStatus {
        self.state.lock().status
    }

    fn set_opmode(&self, mode: OpMode) -> PlatformResult {
        self.call("set_opmode", |s| s.opmode = mode)
    }

    fn dhcp_start(&self) -> PlatformResult {
        self.call("dhcp_start", |s| s.dhcp_running = true)
    }

    fn dhcp_stop(&self) -> PlatformResult {
        self.call("dhcp_stop", |s| s.dhcp_running = false)
    }

    fn set_ip_info(&self, ip: &StaticIp) -> PlatformResult {
        self.call("set_ip_info", |s| s.ip_info = Some(*ip))
    }

    fn set_station_config(&self, ssid: &str, password: &str) -> PlatformResult {
        self.call("set_station_config", |s| {
            s.station_config = Some((ssid.to_owned(), password.to_owned()));
        })
    }

    fn set_reconnect_policy(&self, enabled: bool) -> PlatformResult {
        self.call("set_reconnect_policy", |s| s.reconnect_policy = Some(enabled))
    }

    fn station_connect(&self) -> PlatformResult {
        self.call("station_connect", |s| {
            s.connect_calls += 1;
            s.status = StationStatus::Connecting;
        })
    }

    fn station_disconnect(&self) -> PlatformResult {
        self.call("station_disconnect", |s| {
            s.disconnect_calls += 1;
            s.status = StationStatus::Idle;
        })
    }

    fn dhcp_set_max_tries(&self, tries: u8) -> PlatformResult {
        self.call("dhcp_set_max_tries", |s| s.dhcp_max_tries = Some(tries))
    }

    fn set_event_handler(&self, handler: WifiEventHandler) {
        self.state.lock().handler = Some(handler);
    }
}
