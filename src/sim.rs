//! In-memory platform for tests and demos.
//!
//! [`SimulatedRadio`] implements the radio-stack traits and records every call
//! made through them. [`SimulatedActuator`] stands in for the lock hardware.

use parking_lot::{Mutex, RwLock};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tracing::debug;
use uuid::Uuid;

use crate::ble::advertising::{AdvertiseData, AdvertiseSettings};
use crate::ble::characteristics::{GattResponse, ServiceDescriptor};
use crate::ble::connection::{ConnectionState, PeerId};
use crate::ble::platform::{Advertiser, GattServer, RadioAdapter};
use crate::error::{ActuatorError, GattError, PlatformError};
use crate::lock::{ActuatorPort, LockState};
use crate::observer::PeripheralObserver;

/// In-memory lock. Starts locked.
#[derive(Debug, Default)]
pub struct SimulatedActuator {
    state: RwLock<LockState>,
    history: Mutex<Vec<LockState>>,
    failing: AtomicBool,
}

impl SimulatedActuator {
    /// Create a locked actuator.
    pub fn new() -> Self {
        Self::default()
    }

    /// Current state, bypassing failure injection.
    pub fn state(&self) -> LockState {
        *self.state.read()
    }

    /// Every state successfully written, in order.
    pub fn history(&self) -> Vec<LockState> {
        self.history.lock().clone()
    }

    /// Make every subsequent read and write fail.
    pub fn set_failing(&self, failing: bool) {
        self.failing.store(failing, Ordering::SeqCst);
    }

    fn check(&self) -> Result<(), ActuatorError> {
        if self.failing.load(Ordering::SeqCst) {
            Err(ActuatorError::new("simulated output line failure"))
        } else {
            Ok(())
        }
    }
}

impl ActuatorPort for SimulatedActuator {
    fn read(&self) -> Result<LockState, ActuatorError> {
        self.check()?;
        Ok(*self.state.read())
    }

    fn write(&self, state: LockState) -> Result<(), ActuatorError> {
        self.check()?;
        *self.state.write() = state;
        self.history.lock().push(state);
        debug!("Simulated lock now {}", state);
        Ok(())
    }
}

/// Every platform call made through a [`SimulatedRadio`].
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RadioLog {
    /// Adapter names set.
    pub names: Vec<String>,
    /// Number of GATT servers opened.
    pub servers_opened: usize,
    /// Number of GATT servers closed.
    pub servers_closed: usize,
    /// Services registered.
    pub services: Vec<ServiceDescriptor>,
    /// Responses sent: peer, request id, response.
    pub responses: Vec<(PeerId, i32, GattResponse)>,
    /// Notifications sent: peer, characteristic, value.
    pub notifications: Vec<(PeerId, Uuid, Vec<u8>)>,
    /// Peers whose connection was cancelled.
    pub cancelled: Vec<PeerId>,
    /// Number of advertise requests accepted.
    pub advertise_starts: usize,
    /// Number of advertise stop requests.
    pub advertise_stops: usize,
    /// Settings and payload of the last accepted advertise request.
    pub last_advertisement: Option<(AdvertiseSettings, AdvertiseData)>,
}

impl RadioLog {
    /// Values notified to `peer`, in order.
    pub fn notifications_to(&self, peer: &PeerId) -> Vec<Vec<u8>> {
        self.notifications
            .iter()
            .filter(|(to, _, _)| to == peer)
            .map(|(_, _, value)| value.clone())
            .collect()
    }
}

#[derive(Debug, Default)]
struct Behaviour {
    refuse_gatt_server: bool,
    refuse_service: bool,
    withhold_advertiser: bool,
    reject_advertise_start: bool,
    failing_peers: Vec<PeerId>,
}

#[derive(Debug, Default)]
struct SimState {
    log: RadioLog,
    behaviour: Behaviour,
}

/// Recording radio adapter.
#[derive(Debug, Clone, Default)]
pub struct SimulatedRadio {
    state: Arc<Mutex<SimState>>,
}

impl SimulatedRadio {
    /// Create a radio that accepts every request.
    pub fn new() -> Self {
        Self::default()
    }

    /// Copy of the call log.
    pub fn log(&self) -> RadioLog {
        self.state.lock().log.clone()
    }

    /// Make `open_gatt_server` fail.
    pub fn refuse_gatt_server(&self, refuse: bool) {
        self.state.lock().behaviour.refuse_gatt_server = refuse;
    }

    /// Make `add_service` fail.
    pub fn refuse_service(&self, refuse: bool) {
        self.state.lock().behaviour.refuse_service = refuse;
    }

    /// Make `advertiser` return `None`.
    pub fn withhold_advertiser(&self, withhold: bool) {
        self.state.lock().behaviour.withhold_advertiser = withhold;
    }

    /// Make `start_advertising` fail.
    pub fn reject_advertise_start(&self, reject: bool) {
        self.state.lock().behaviour.reject_advertise_start = reject;
    }

    /// Make notifications to `peer` fail.
    pub fn fail_notifications_to(&self, peer: PeerId) {
        self.state.lock().behaviour.failing_peers.push(peer);
    }
}

impl RadioAdapter for SimulatedRadio {
    fn set_name(&self, name: &str) -> Result<(), PlatformError> {
        self.state.lock().log.names.push(name.to_string());
        Ok(())
    }

    fn open_gatt_server(&self) -> Result<Arc<dyn GattServer>, PlatformError> {
        let mut state = self.state.lock();
        if state.behaviour.refuse_gatt_server {
            return Err(PlatformError::new(-1, "GATT server unavailable"));
        }
        state.log.servers_opened += 1;
        Ok(Arc::new(SimulatedGattServer {
            state: self.state.clone(),
        }))
    }

    fn advertiser(&self) -> Option<Arc<dyn Advertiser>> {
        if self.state.lock().behaviour.withhold_advertiser {
            return None;
        }
        Some(Arc::new(SimulatedAdvertiser {
            state: self.state.clone(),
        }))
    }
}

struct SimulatedGattServer {
    state: Arc<Mutex<SimState>>,
}

impl GattServer for SimulatedGattServer {
    fn add_service(&self, service: &ServiceDescriptor) -> Result<(), PlatformError> {
        let mut state = self.state.lock();
        if state.behaviour.refuse_service {
            return Err(PlatformError::new(133, "service table full"));
        }
        state.log.services.push(service.clone());
        Ok(())
    }

    fn send_response(
        &self,
        peer: &PeerId,
        request_id: i32,
        response: &GattResponse,
    ) -> Result<(), PlatformError> {
        self.state
            .lock()
            .log
            .responses
            .push((peer.clone(), request_id, response.clone()));
        Ok(())
    }

    fn notify_characteristic_changed(
        &self,
        peer: &PeerId,
        characteristic: Uuid,
        value: &[u8],
    ) -> Result<(), PlatformError> {
        let mut state = self.state.lock();
        if state.behaviour.failing_peers.contains(peer) {
            return Err(PlatformError::new(257, "notification not delivered"));
        }
        state
            .log
            .notifications
            .push((peer.clone(), characteristic, value.to_vec()));
        Ok(())
    }

    fn cancel_connection(&self, peer: &PeerId) {
        self.state.lock().log.cancelled.push(peer.clone());
    }

    fn close(&self) {
        self.state.lock().log.servers_closed += 1;
    }
}

struct SimulatedAdvertiser {
    state: Arc<Mutex<SimState>>,
}

impl Advertiser for SimulatedAdvertiser {
    fn start_advertising(
        &self,
        settings: &AdvertiseSettings,
        data: &AdvertiseData,
    ) -> Result<(), PlatformError> {
        let mut state = self.state.lock();
        if state.behaviour.reject_advertise_start {
            return Err(PlatformError::new(4, "advertising not supported"));
        }
        state.log.advertise_starts += 1;
        state.log.last_advertisement = Some((settings.clone(), data.clone()));
        Ok(())
    }

    fn stop_advertising(&self) {
        self.state.lock().log.advertise_stops += 1;
    }
}

/// Observer that keeps every event it receives.
#[derive(Debug, Default)]
pub struct RecordingObserver {
    advertise_changes: Mutex<Vec<bool>>,
    connection_changes: Mutex<Vec<(PeerId, ConnectionState)>>,
    actuator_failures: Mutex<Vec<GattError>>,
    notification_failures: Mutex<Vec<PeerId>>,
}

impl RecordingObserver {
    /// Advertising status changes, in order.
    pub fn advertise_changes(&self) -> Vec<bool> {
        self.advertise_changes.lock().clone()
    }

    /// Connection state changes, in order.
    pub fn connection_changes(&self) -> Vec<(PeerId, ConnectionState)> {
        self.connection_changes.lock().clone()
    }

    /// Actuator failures, in order.
    pub fn actuator_failures(&self) -> Vec<GattError> {
        self.actuator_failures.lock().clone()
    }

    /// Peers that missed a notification, in order.
    pub fn notification_failures(&self) -> Vec<PeerId> {
        self.notification_failures.lock().clone()
    }
}

impl PeripheralObserver for RecordingObserver {
    fn on_advertise_changed(&self, is_advertising: bool) {
        self.advertise_changes.lock().push(is_advertising);
    }

    fn on_connection_state_change(&self, peer: &PeerId, state: ConnectionState) {
        self.connection_changes.lock().push((peer.clone(), state));
    }

    fn on_actuator_failure(&self, error: &GattError) {
        self.actuator_failures.lock().push(error.clone());
    }

    fn on_notification_failed(&self, peer: &PeerId, _error: &PlatformError) {
        self.notification_failures.lock().push(peer.clone());
    }
}
