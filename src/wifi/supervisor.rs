// SPDX-License-Identifier: MPL-2.0
// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Station association lifecycle.

use std::fmt;
use std::sync::{Arc, Weak};

use parking_lot::Mutex;

use super::{OpMode, StaticIp, StationStatus, WifiConfig, WifiPlatform};
use crate::connection::{Connection, ConnectionId, ConnectionRegistry, Transport};
use crate::error::{Error, PlatformError, Result};
use crate::event::{Event, EventBus, EventCallback, Group, WifiEvent};

/// Bus group owning the supervisor's Wi-Fi subscriptions.
pub const WIFI_GROUP: Group = 1;

/// Fatal/status callback: `Ok(())` once the station has an IP, `Err` for
/// association loss and unrecoverable failures.
pub type FatalCallback = Arc<dyn Fn(Result<()>) + Send + Sync>;

/// Snapshot of the supervisor counters.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct WifiStatus {
    /// Consecutive disassociations since the last IP.
    pub reconnect_count: u8,
    /// Disassociations tolerated before giving up.
    pub reconnect_max: u8,
    /// True while an association that obtained an IP is in effect.
    pub ever_connected: bool,
    /// True once a fatal failure was reported for the current loss.
    pub fatal_reported: bool,
    /// True if the station uses DHCP.
    pub uses_dhcp: bool,
}

struct WifiState {
    reconnect_max: u8,
    reconnect_count: u8,
    static_ip: Option<StaticIp>,
    dhcp_max_tries: u8,
    ever_connected: bool,
    fatal_reported: bool,
    fatal: FatalCallback,
}

impl WifiState {
    fn status(&self) -> WifiStatus {
        WifiStatus {
            reconnect_count: self.reconnect_count,
            reconnect_max: self.reconnect_max,
            ever_connected: self.ever_connected,
            fatal_reported: self.fatal_reported,
            uses_dhcp: self.static_ip.is_none(),
        }
    }
}

struct Shared<P, T: Transport> {
    bus: EventBus,
    registry: ConnectionRegistry<T>,
    platform: Arc<P>,
    state: Mutex<Option<WifiState>>,
}

/// Supervises the station association and the managed connections.
///
/// The supervisor listens to the bus Wi-Fi events under [`WIFI_GROUP`]:
///
/// - on *got IP* it resets the reconnect counter, connects every registered
///   connection and reports `Ok(())` through the fatal callback;
/// - on *disassociation* it aborts the transport session of every managed
///   connection and counts the loss. The connections stay registered and
///   are connected again on the next *got IP*. Reaching the reconnect ceiling is reported once as
///   [`Error::WifiAssociationFailed`]; losing an association that had an IP
///   is reported as [`Error::WifiDisconnected`].
///
/// # Examples
///
/// ```
/// use std::sync::Arc;
/// use espnet::event::EventBus;
/// use espnet::connection::ConnectionRegistry;
/// use espnet::sim::{SimTransport, SimWifi};
/// use espnet::wifi::{WifiConfig, WifiSupervisor};
///
/// # fn main() -> espnet::Result<()> {
/// let radio = Arc::new(SimWifi::new());
/// let registry = ConnectionRegistry::new(Arc::new(SimTransport::new()));
/// let supervisor = WifiSupervisor::new(EventBus::new(), registry, Arc::clone(&radio));
///
/// supervisor.start(&WifiConfig::new("home", "secret").with_reconnect_max(3), |status| {
///     match status {
///         Ok(()) => println!("online"),
///         Err(e) => eprintln!("wifi: {e}"),
///     }
/// })?;
/// assert_eq!(radio.connect_calls(), 1);
///
/// supervisor.stop()?;
/// # Ok(())
/// # }
/// ```
pub struct WifiSupervisor<P: WifiPlatform + 'static, T: Transport + 'static> {
    shared: Arc<Shared<P, T>>,
}

impl<P: WifiPlatform + 'static, T: Transport + 'static> WifiSupervisor<P, T> {
    /// Creates a stopped supervisor.
    #[must_use]
    pub fn new(bus: EventBus, registry: ConnectionRegistry<T>, platform: Arc<P>) -> Self {
        Self {
            shared: Arc::new(Shared {
                bus,
                registry,
                platform,
                state: Mutex::new(None),
            }),
        }
    }

    /// Returns the event bus.
    #[must_use]
    pub fn bus(&self) -> &EventBus {
        &self.shared.bus
    }

    /// Returns the connection registry.
    #[must_use]
    pub fn registry(&self) -> &ConnectionRegistry<T> {
        &self.shared.registry
    }

    /// Returns the radio platform.
    #[must_use]
    pub fn platform(&self) -> &Arc<P> {
        &self.shared.platform
    }

    /// Returns true between a successful `start` and `stop`.
    #[must_use]
    pub fn is_started(&self) -> bool {
        self.shared.state.lock().is_some()
    }

    /// Configures the station and starts associating.
    ///
    /// `fatal` receives every status report (see [`FatalCallback`]).
    ///
    /// # Errors
    ///
    /// - [`Error::AlreadyStarted`] if the supervisor runs.
    /// - [`Error::InvalidState`] if the station is not idle.
    /// - [`Error::Platform`] if a platform call fails; the Wi-Fi event
    ///   group is detached again when association cannot be requested.
    /// - the bus error if the event handler cannot be attached.
    pub fn start<F>(&self, config: &WifiConfig, fatal: F) -> Result<()>
    where
        F: Fn(Result<()>) + Send + Sync + 'static,
    {
        if self.is_started() {
            return Err(Error::AlreadyStarted);
        }

        let platform = &self.shared.platform;
        let status = platform.station_status();
        if !status.is_idle() {
            return Err(Error::invalid_state("start wifi", status));
        }

        platform.set_opmode(OpMode::Station)?;

        let static_ip = config.effective_static_ip();
        match &static_ip {
            None => {
                platform.dhcp_start()?;
                tracing::debug!("DHCP started");
            }
            Some(ip) => {
                platform.dhcp_stop()?;
                platform.set_ip_info(ip)?;
                tracing::debug!(ip = %ip.ip, netmask = %ip.netmask, gateway = %ip.gateway, "Using static IP");
            }
        }

        platform.set_station_config(config.radio_ssid(), config.radio_password())?;
        platform.set_reconnect_policy(config.platform_reconnect)?;

        let bus = &self.shared.bus;
        platform.set_event_handler(bus.wifi_event_handler());
        bus.attach_wifi_events(&self.handler(), WIFI_GROUP)?;

        *self.shared.state.lock() = Some(WifiState {
            reconnect_max: config.effective_reconnect_max(),
            reconnect_count: 0,
            static_ip,
            dhcp_max_tries: config.dhcp_max_tries,
            ever_connected: false,
            fatal_reported: false,
            fatal: Arc::new(fatal),
        });

        if let Err(error) = platform.station_connect() {
            bus.remove_group(WIFI_GROUP);
            *self.shared.state.lock() = None;
            tracing::error!(%error, "Wifi connect failed");
            return Err(error.into());
        }

        tracing::info!(ssid = %config.radio_ssid(), reconnect_max = config.effective_reconnect_max(), "Wifi supervisor started");
        Ok(())
    }

    fn handler(&self) -> EventCallback {
        let shared: Weak<Shared<P, T>> = Arc::downgrade(&self.shared);
        EventCallback::new(move |event| {
            if let Some(shared) = shared.upgrade() {
                shared.on_event(event);
            }
        })
    }

    /// Stops supervising.
    ///
    /// Detaches the Wi-Fi event group, aborts every managed connection,
    /// disassociates and turns the radio off. The aborted connection records
    /// are handed back. Platform failures are logged; this always succeeds,
    /// whatever the prior state.
    ///
    /// # Errors
    ///
    /// Never fails; the `Result` matches the other lifecycle calls.
    pub fn stop(&self) -> Result<Vec<Connection>> {
        let shared = &self.shared;
        let was_started = shared.state.lock().take().is_some();

        shared.bus.remove_group(WIFI_GROUP);
        let aborted = shared.registry.abort_all();

        if let Err(error) = shared.platform.station_disconnect() {
            tracing::warn!(%error, "Station disconnect failed during stop");
        }
        if let Err(error) = shared.platform.set_opmode(OpMode::Null) {
            tracing::warn!(%error, "Radio off failed during stop");
        }

        tracing::info!(was_started, connections = aborted.len(), "Wifi supervisor stopped");
        Ok(aborted)
    }

    /// Registers a connection with the supervisor.
    ///
    /// The connection is connected right away when the station has an IP,
    /// otherwise on the next *got IP* event.
    ///
    /// # Errors
    ///
    /// Returns the registration error, or the connect error (the connection
    /// is then no longer registered).
    pub fn manage(&self, conn: Connection) -> Result<ConnectionId> {
        let registry = &self.shared.registry;
        let id = registry.register(conn)?;

        if self.shared.platform.station_status() == StationStatus::GotIp {
            registry.connect(id)?;
        } else {
            tracing::debug!(conn = %id, "Connection scheduled");
        }
        Ok(id)
    }

    /// Returns the supervisor counters.
    ///
    /// # Errors
    ///
    /// Returns [`Error::NotStarted`] if the supervisor is not running.
    pub fn status(&self) -> Result<WifiStatus> {
        self.shared
            .state
            .lock()
            .as_ref()
            .map(WifiState::status)
            .ok_or(Error::NotStarted)
    }
}

impl<P: WifiPlatform, T: Transport> Shared<P, T> {
    fn on_event(&self, event: &Event) {
        let Some(wifi) = event.payload_as::<WifiEvent>() else {
            tracing::trace!(code = event.code(), "Wifi event without payload");
            return;
        };

        match wifi {
            WifiEvent::StationConnected { .. } => self.on_associated(),
            WifiEvent::StationDisconnected { reason, .. } => self.on_disassociated(*reason),
            WifiEvent::GotIp { .. } => self.on_got_ip(),
            other => tracing::debug!(event = other.name(), "Wifi event"),
        }
    }

    fn on_associated(&self) {
        let tries = {
            let state = self.state.lock();
            let Some(state) = state.as_ref() else { return };
            state.static_ip.is_none().then_some(state.dhcp_max_tries)
        };

        if let Some(tries) = tries
            && let Err(error) = self.platform.dhcp_set_max_tries(tries)
        {
            tracing::error!(%error, "DHCP max tries not set");
            self.fatal(error);
        }
    }

    /// Detaches the group, turns the radio off and reports `error`.
    fn fatal(&self, error: PlatformError) {
        self.bus.remove_group(WIFI_GROUP);
        if let Err(off_error) = self.platform.set_opmode(OpMode::Null) {
            tracing::warn!(error = %off_error, "Radio off failed");
        }

        let fatal = {
            let mut state = self.state.lock();
            state.as_mut().map(|state| {
                state.fatal_reported = true;
                Arc::clone(&state.fatal)
            })
        };
        if let Some(fatal) = fatal {
            fatal(Err(error.into()));
        }
    }

    fn on_disassociated(&self, reason: u8) {
        let (report, exhausted, fatal) = {
            let mut state = self.state.lock();
            let Some(state) = state.as_mut() else { return };

            state.reconnect_count = state.reconnect_count.saturating_add(1);
            tracing::debug!(
                reason,
                count = state.reconnect_count,
                max = state.reconnect_max,
                "Station disconnected"
            );

            let exhausted = state.reconnect_count >= state.reconnect_max;
            let report = if exhausted {
                if state.fatal_reported {
                    None
                } else {
                    state.fatal_reported = true;
                    state.ever_connected = false;
                    Some(Error::WifiAssociationFailed {
                        reason,
                        attempts: state.reconnect_count,
                    })
                }
            } else if state.ever_connected {
                state.ever_connected = false;
                Some(Error::WifiDisconnected { reason })
            } else {
                None
            };
            (report, exhausted, Arc::clone(&state.fatal))
        };

        self.registry.suspend_all();

        if exhausted
            && report.is_some()
            && let Err(error) = self.platform.set_reconnect_policy(false)
        {
            tracing::warn!(%error, "Reconnect policy not disabled");
        }

        if let Some(error) = report {
            tracing::error!(%error, "Wifi failure reported");
            fatal(Err(error));
        }
    }

    fn on_got_ip(&self) {
        let fatal = {
            let mut state = self.state.lock();
            let Some(state) = state.as_mut() else { return };
            state.reconnect_count = 0;
            state.ever_connected = true;
            state.fatal_reported = false;
            Arc::clone(&state.fatal)
        };

        let issued = self.registry.connect_all();
        tracing::info!(connections = issued, "Station online");
        fatal(Ok(()));
    }
}

impl<P: WifiPlatform + 'static, T: Transport + 'static> Clone for WifiSupervisor<P, T> {
    fn clone(&self) -> Self {
        Self {
            shared: Arc::clone(&self.shared),
        }
    }
}

impl<P: WifiPlatform + 'static, T: Transport + 'static> fmt::Debug for WifiSupervisor<P, T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("WifiSupervisor")
            .field("started", &self.is_started())
            .field("registry", &self.shared.registry)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use std::net::Ipv4Addr;
    use std::time::Duration;

    use super::*;
    use crate::error::ErrorCategory;
    use crate::sim::{SimTransport, SimWifi};

    type Reports = Arc<Mutex<Vec<Result<()>>>>;

    fn setup() -> (Arc<SimWifi>, WifiSupervisor<SimWifi, SimTransport>) {
        let radio = Arc::new(SimWifi::new());
        let registry = ConnectionRegistry::new(Arc::new(SimTransport::new()));
        let supervisor = WifiSupervisor::new(EventBus::new(), registry, Arc::clone(&radio));
        (radio, supervisor)
    }

    fn start(
        supervisor: &WifiSupervisor<SimWifi, SimTransport>,
        config: &WifiConfig,
    ) -> Reports {
        let reports: Reports = Arc::default();
        let sink = Arc::clone(&reports);
        supervisor
            .start(config, move |status| sink.lock().push(status))
            .unwrap();
        reports
    }

    fn disconnected(reason: u8) -> WifiEvent {
        WifiEvent::StationDisconnected {
            ssid: "home".into(),
            bssid: [0; 6],
            reason,
        }
    }

    fn got_ip() -> WifiEvent {
        WifiEvent::GotIp {
            ip: Ipv4Addr::new(192, 168, 1, 10),
            netmask: Ipv4Addr::new(255, 255, 255, 0),
            gateway: Ipv4Addr::new(192, 168, 1, 1),
        }
    }

    async fn settle() {
        tokio::time::sleep(Duration::from_millis(20)).await;
    }

    #[tokio::test(start_paused = true)]
    async fn start_configures_radio() {
        let (radio, supervisor) = setup();
        start(&supervisor, &WifiConfig::new("home", "secret"));

        assert_eq!(radio.opmode(), OpMode::Station);
        assert!(radio.dhcp_running());
        assert_eq!(
            radio.station_config(),
            Some(("home".to_string(), "secret".to_string()))
        );
        assert_eq!(radio.reconnect_policy(), Some(true));
        assert!(radio.has_handler());
        assert_eq!(radio.connect_calls(), 1);
        assert_eq!(supervisor.bus().len(), 6);
        assert!(supervisor.bus().subscriptions().iter().all(|s| s.group == WIFI_GROUP));
    }

    #[tokio::test(start_paused = true)]
    async fn start_with_static_ip() {
        let (radio, supervisor) = setup();
        let ip = StaticIp::new(
            Ipv4Addr::new(10, 0, 0, 5),
            Ipv4Addr::new(255, 255, 255, 0),
            Ipv4Addr::new(10, 0, 0, 1),
        );
        start(&supervisor, &WifiConfig::new("lab", "pw").with_static_ip(ip));

        assert!(!radio.dhcp_running());
        assert_eq!(radio.ip_info(), Some(ip));
        assert!(!supervisor.status().unwrap().uses_dhcp);
    }

    #[tokio::test(start_paused = true)]
    async fn second_start_rejected() {
        let (_, supervisor) = setup();
        start(&supervisor, &WifiConfig::new("home", "secret"));

        let err = supervisor
            .start(&WifiConfig::new("home", "secret"), |_| {})
            .unwrap_err();
        assert_eq!(err, Error::AlreadyStarted);
        assert_eq!(err.category(), ErrorCategory::Admission);
    }

    #[tokio::test(start_paused = true)]
    async fn start_requires_idle_station() {
        let (radio, supervisor) = setup();
        radio.set_status(StationStatus::GotIp);

        let err = supervisor
            .start(&WifiConfig::new("home", "secret"), |_| {})
            .unwrap_err();
        assert!(matches!(err, Error::InvalidState { .. }));
        assert!(!supervisor.is_started());
    }

    #[tokio::test(start_paused = true)]
    async fn platform_failure_aborts_start() {
        let (radio, supervisor) = setup();
        radio.fail("dhcp_start");

        let err = supervisor
            .start(&WifiConfig::new("home", "secret"), |_| {})
            .unwrap_err();
        assert_eq!(err, Error::Platform(PlatformError::new("dhcp_start")));
        assert!(supervisor.bus().is_empty());
        assert!(!supervisor.is_started());
    }

    #[tokio::test(start_paused = true)]
    async fn failed_connect_leaves_no_subscriptions() {
        let (radio, supervisor) = setup();
        radio.fail("station_connect");

        let err = supervisor
            .start(&WifiConfig::new("home", "secret"), |_| {})
            .unwrap_err();
        assert_eq!(err.category(), ErrorCategory::Platform);
        assert!(supervisor.bus().is_empty());
        assert_eq!(supervisor.status(), Err(Error::NotStarted));

        radio.recover("station_connect");
        start(&supervisor, &WifiConfig::new("home", "secret"));
        assert!(supervisor.is_started());
    }

    #[tokio::test(start_paused = true)]
    async fn associated_bounds_dhcp() {
        let (radio, supervisor) = setup();
        start(
            &supervisor,
            &WifiConfig::new("home", "secret").with_dhcp_max_tries(5),
        );

        radio.emit(WifiEvent::StationConnected {
            ssid: "home".into(),
            bssid: [1, 2, 3, 4, 5, 6],
            channel: 6,
        });
        settle().await;
        assert_eq!(radio.dhcp_max_tries(), Some(5));
    }

    #[tokio::test(start_paused = true)]
    async fn dhcp_bound_failure_is_fatal() {
        let (radio, supervisor) = setup();
        let reports = start(&supervisor, &WifiConfig::new("home", "secret"));
        radio.fail("dhcp_set_max_tries");

        radio.emit(WifiEvent::StationConnected {
            ssid: "home".into(),
            bssid: [0; 6],
            channel: 1,
        });
        settle().await;

        assert_eq!(
            *reports.lock(),
            [Err(Error::Platform(PlatformError::new("dhcp_set_max_tries")))]
        );
        assert!(supervisor.bus().is_empty());
        assert_eq!(radio.opmode(), OpMode::Null);
    }

    #[tokio::test(start_paused = true)]
    async fn reconnect_ceiling_reported_once() {
        let (radio, supervisor) = setup();
        let reports = start(
            &supervisor,
            &WifiConfig::new("home", "secret").with_reconnect_max(3),
        );

        for i in 1..=3 {
            radio.emit(disconnected(201));
            settle().await;
            if i < 3 {
                assert!(reports.lock().is_empty(), "reported after {i} losses");
            }
        }
        {
            let reports = reports.lock();
            assert_eq!(reports.len(), 1);
            let err = reports[0].clone().unwrap_err();
            assert_eq!(err.category(), ErrorCategory::Wifi);
            assert_eq!(
                err,
                Error::WifiAssociationFailed {
                    reason: 201,
                    attempts: 3
                }
            );
        }
        assert_eq!(radio.reconnect_policy(), Some(false));

        radio.emit(disconnected(201));
        settle().await;
        assert_eq!(reports.lock().len(), 1);
        assert!(supervisor.status().unwrap().fatal_reported);
    }

    #[tokio::test(start_paused = true)]
    async fn got_ip_connects_and_reports_ok() {
        let (radio, supervisor) = setup();
        let reports = start(&supervisor, &WifiConfig::new("home", "secret"));

        let mut conn = Connection::new();
        supervisor
            .registry()
            .configure(&mut conn, "10.0.0.2", 1883, false)
            .unwrap();
        let id = supervisor.manage(conn).unwrap();
        assert_eq!(
            supervisor.registry().state(id),
            Some(crate::connection::ConnectionState::Idle)
        );

        radio.emit(got_ip());
        settle().await;

        assert_eq!(*reports.lock(), [Ok(())]);
        assert_eq!(
            supervisor.registry().state(id),
            Some(crate::connection::ConnectionState::Connecting)
        );
        let status = supervisor.status().unwrap();
        assert!(status.ever_connected);
        assert_eq!(status.reconnect_count, 0);
    }

    #[tokio::test(start_paused = true)]
    async fn loss_after_ip_suspends_and_reports_once() {
        let (radio, supervisor) = setup();
        let reports = start(
            &supervisor,
            &WifiConfig::new("home", "secret").with_reconnect_max(5),
        );
        radio.emit(got_ip());
        settle().await;

        let mut conn = Connection::new();
        supervisor
            .registry()
            .configure(&mut conn, "10.0.0.2", 1883, false)
            .unwrap();
        supervisor.manage(conn).unwrap();
        assert_eq!(supervisor.registry().len(), 1);

        radio.emit(disconnected(8));
        settle().await;
        radio.emit(disconnected(8));
        settle().await;

        assert_eq!(supervisor.registry().len(), 1);
        let id = supervisor.registry().ids()[0];
        assert_eq!(
            supervisor.registry().state(id),
            Some(crate::connection::ConnectionState::Closed)
        );
        assert_eq!(
            *reports.lock(),
            [Ok(()), Err(Error::WifiDisconnected { reason: 8 })]
        );
    }

    #[tokio::test(start_paused = true)]
    async fn stop_tears_everything_down() {
        let (radio, supervisor) = setup();
        start(&supervisor, &WifiConfig::new("home", "secret"));
        radio.fail("station_disconnect");

        let mut conn = Connection::new();
        supervisor
            .registry()
            .configure(&mut conn, "10.0.0.2", 1883, false)
            .unwrap();
        supervisor.manage(conn).unwrap();

        let records = supervisor.stop().unwrap();
        assert_eq!(records.len(), 1);
        assert_eq!(
            records[0].state(),
            Some(crate::connection::ConnectionState::Aborted)
        );
        assert!(supervisor.bus().is_empty());
        assert!(supervisor.registry().is_empty());
        assert_eq!(radio.opmode(), OpMode::Null);
        assert!(!supervisor.is_started());

        // Safe to call again.
        assert!(supervisor.stop().is_ok());
    }

    #[tokio::test(start_paused = true)]
    async fn events_after_stop_are_ignored() {
        let (radio, supervisor) = setup();
        let reports = start(&supervisor, &WifiConfig::new("home", "secret"));
        supervisor.stop().unwrap();

        radio.emit(got_ip());
        settle().await;
        assert!(reports.lock().is_empty());
    }
}
