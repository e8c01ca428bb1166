//! Smart lock peripheral.
//!
//! [`PeripheralService`] is the composition root: the application starts and
//! stops it, and the platform binding routes every radio-stack callback into
//! it. It owns the advertising controller, the connection registry and the
//! request dispatcher for the lifetime of one GATT server.

use parking_lot::RwLock;
use std::sync::Arc;
use tracing::{debug, error, info, warn};
use uuid::Uuid;

use crate::ble::advertising::{AdvertisingController, AdvertisingState};
use crate::ble::characteristics::{GattRequestDispatcher, GattResponse, ServiceDescriptor};
use crate::ble::connection::{ConnectionRegistry, ConnectionState, PeerId};
use crate::ble::notifications::NotificationFanout;
use crate::ble::platform::{AdapterState, AdapterStateSource, GattServer, RadioAdapter};
use crate::config::PeripheralConfig;
use crate::error::{AdvertiseError, Error, GattError, InitError, PlatformError, Result};
use crate::lock::{ActuatorPort, LockState};
use crate::observer::PeripheralObserver;

/// Everything that exists only while a GATT server is open.
struct ActiveServer {
    server: Arc<dyn GattServer>,
    dispatcher: GattRequestDispatcher,
    advertising: AdvertisingController,
}

/// BLE peripheral exposing the lock service.
pub struct PeripheralService {
    adapter: Arc<dyn RadioAdapter>,
    actuator: Arc<dyn ActuatorPort>,
    observer: Arc<dyn PeripheralObserver>,
    config: PeripheralConfig,
    registry: Arc<ConnectionRegistry>,
    active: RwLock<Option<Arc<ActiveServer>>>,
}

impl PeripheralService {
    /// Create a peripheral with the default configuration.
    pub fn new(
        adapter: Arc<dyn RadioAdapter>,
        actuator: Arc<dyn ActuatorPort>,
        observer: Arc<dyn PeripheralObserver>,
    ) -> Self {
        Self {
            adapter,
            actuator,
            observer,
            config: PeripheralConfig::default(),
            registry: Arc::new(ConnectionRegistry::new()),
            active: RwLock::new(None),
        }
    }

    /// Set the configuration used when the adapter powers on.
    pub fn with_config(mut self, config: PeripheralConfig) -> Self {
        self.config = config;
        self
    }

    /// The configuration used when the adapter powers on.
    pub fn config(&self) -> &PeripheralConfig {
        &self.config
    }

    /// Build the service, open the GATT server and register the service.
    ///
    /// Calling this again while initialized does nothing.
    pub fn initialize(&self, config: &PeripheralConfig) -> std::result::Result<(), InitError> {
        let mut active = self.active.write();
        if active.is_some() {
            debug!("Peripheral already initialized");
            return Ok(());
        }

        info!("Initializing lock peripheral {:?}", config.device_name);

        if let Err(e) = self.adapter.set_name(&config.device_name) {
            warn!("Failed to set adapter name: {}", e);
        }

        let service = Arc::new(ServiceDescriptor::lock_service());

        let server = self.adapter.open_gatt_server().map_err(|e| {
            error!("Failed to open GATT server: {}", e);
            InitError::ServerUnavailable(e)
        })?;

        if let Err(e) = server.add_service(&service) {
            error!("Failed to register lock service: {}", e);
            server.close();
            return Err(InitError::ServiceRejected(e));
        }

        let fanout = NotificationFanout::new(
            self.registry.clone(),
            server.clone(),
            self.observer.clone(),
            service.status.uuid,
        );
        let dispatcher = GattRequestDispatcher::new(
            service,
            self.actuator.clone(),
            fanout,
            self.observer.clone(),
        );
        let advertising = AdvertisingController::new(
            self.adapter.clone(),
            config.device_name.clone(),
            self.observer.clone(),
            config.advertise_start_timeout,
        );

        *active = Some(Arc::new(ActiveServer {
            server,
            dispatcher,
            advertising,
        }));

        info!("Lock peripheral initialized");
        Ok(())
    }

    /// Check if the GATT server is open.
    pub fn is_initialized(&self) -> bool {
        self.active.read().is_some()
    }

    /// Start advertising.
    ///
    /// # Errors
    ///
    /// [`Error::NotInitialized`] before [`initialize`](Self::initialize),
    /// [`AdvertiseError::AlreadyAdvertising`] while a start is pending or
    /// advertising is active.
    pub fn start_advertising(&self) -> Result<()> {
        let active = self.active().ok_or(Error::NotInitialized)?;
        self.start_on(&active)
    }

    /// Start advertising on `active`, undoing the start if a teardown
    /// replaced it in the meantime.
    fn start_on(&self, active: &Arc<ActiveServer>) -> Result<()> {
        active.advertising.start()?;

        let still_active = self
            .active
            .read()
            .as_ref()
            .is_some_and(|current| Arc::ptr_eq(current, active));
        if !still_active {
            warn!("Peripheral torn down while advertising started, stopping");
            active.advertising.stop();
            return Err(Error::NotInitialized);
        }

        Ok(())
    }

    /// Stop advertising. No-op if not advertising.
    pub fn stop_advertising(&self) {
        if let Some(active) = self.active() {
            active.advertising.stop();
        }
    }

    /// Platform callback: outcome of the last advertise request.
    pub fn on_advertise_start_result(&self, result: std::result::Result<(), PlatformError>) {
        match self.active() {
            Some(active) => active.advertising.on_start_result(result),
            None => debug!("Advertise result after teardown ignored"),
        }
    }

    /// Current advertising state. `Idle` when not initialized.
    pub fn advertising_state(&self) -> AdvertisingState {
        self.active()
            .map(|active| active.advertising.state())
            .unwrap_or_default()
    }

    /// The connection registry.
    pub fn registry(&self) -> &ConnectionRegistry {
        &self.registry
    }

    /// Currently connected peers, in connection order.
    pub fn connected_peers(&self) -> Vec<PeerId> {
        self.registry.snapshot()
    }

    /// Platform callback: a peer changed connection state.
    pub fn on_connection_state_change(&self, peer: PeerId, state: ConnectionState) {
        match state {
            ConnectionState::Connected => {
                if self.registry.on_connect(peer.clone()) {
                    info!("A new BLE device connected: {}", peer);
                }
            }
            ConnectionState::Disconnected => {
                if self.registry.on_disconnect(&peer) {
                    info!("BLE device disconnected: {}", peer);
                }
            }
            ConnectionState::Connecting | ConnectionState::Disconnecting => {
                debug!("Peer {} is {}", peer, state);
            }
        }

        self.observer.on_connection_state_change(&peer, state);
    }

    /// Platform callback: a peer reads a characteristic.
    pub fn on_characteristic_read_request(
        &self,
        peer: PeerId,
        request_id: i32,
        offset: usize,
        characteristic: Uuid,
    ) {
        let Some(active) = self.active() else {
            warn!("Read request from {} before initialization dropped", peer);
            return;
        };

        let response = active.dispatcher.handle_read(&peer, characteristic, offset);
        Self::respond(active.server.as_ref(), &peer, request_id, &response);
    }

    /// Platform callback: a peer writes a characteristic.
    pub fn on_characteristic_write_request(
        &self,
        peer: PeerId,
        request_id: i32,
        characteristic: Uuid,
        prepared: bool,
        response_needed: bool,
        value: &[u8],
    ) {
        let Some(active) = self.active() else {
            warn!("Write request from {} before initialization dropped", peer);
            return;
        };

        if let Some(response) =
            active
                .dispatcher
                .handle_write(&peer, characteristic, value, prepared, response_needed)
        {
            Self::respond(active.server.as_ref(), &peer, request_id, &response);
        }
    }

    /// Platform callback: a peer executes or cancels queued writes.
    ///
    /// Queued writes are never accepted, so this always answers
    /// `RequestNotSupported`.
    pub fn on_execute_write(&self, peer: PeerId, request_id: i32, execute: bool) {
        let Some(active) = self.active() else {
            return;
        };

        debug!("Execute write (execute={}) from {} rejected", execute, peer);
        let response = GattResponse::Error(GattError::RequestNotSupported);
        Self::respond(active.server.as_ref(), &peer, request_id, &response);
    }

    /// Stop advertising, disconnect every peer and release the GATT server.
    ///
    /// Disconnect requests are fired without waiting for acknowledgments.
    /// Calling this again, or before initialization, does nothing.
    pub fn teardown(&self) {
        let Some(active) = self.active.write().take() else {
            debug!("Peripheral not initialized, nothing to tear down");
            return;
        };

        info!("Tearing down lock peripheral");
        active.advertising.stop();

        for peer in self.registry.drain() {
            debug!("Disconnecting {}", peer);
            active.server.cancel_connection(&peer);
        }

        active.server.close();
    }

    /// Tear down and leave the lock engaged.
    pub fn shutdown(&self) -> Result<()> {
        self.teardown();
        info!("Locking before shutdown");
        self.actuator.write(LockState::Locked)?;
        Ok(())
    }

    /// React to an adapter power transition.
    ///
    /// `On` initializes the peripheral and starts advertising; `TurningOff` and
    /// `Off` tear it down.
    pub fn on_adapter_state_changed(&self, state: AdapterState) -> Result<()> {
        info!("Bluetooth adapter is {}", state);
        match state {
            AdapterState::On => {
                self.initialize(&self.config)?;
                match self.start_advertising() {
                    Err(Error::Advertise(AdvertiseError::AlreadyAdvertising)) => {
                        debug!("Advertising already running");
                        Ok(())
                    }
                    other => other,
                }
            }
            AdapterState::TurningOff | AdapterState::Off => {
                self.teardown();
                Ok(())
            }
            AdapterState::TurningOn => Ok(()),
        }
    }

    /// Follow adapter transitions from `source` until it closes, then tear down.
    pub async fn run<S>(&self, mut source: S)
    where
        S: AdapterStateSource,
    {
        while let Some(state) = source.next_state().await {
            if let Err(e) = self.on_adapter_state_changed(state) {
                error!("Failed to handle adapter state {}: {}", state, e);
            }
        }

        debug!("Adapter state source closed");
        self.teardown();
    }

    fn active(&self) -> Option<Arc<ActiveServer>> {
        self.active.read().clone()
    }

    fn respond(server: &dyn GattServer, peer: &PeerId, request_id: i32, response: &GattResponse) {
        if let Err(e) = server.send_response(peer, request_id, response) {
            warn!("Failed to send response to {}: {}", peer, e);
        }
    }
}

impl Drop for PeripheralService {
    fn drop(&mut self) {
        self.teardown();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sim::{RecordingObserver, SimulatedActuator, SimulatedRadio};
    use pretty_assertions::assert_eq;

    struct Fixture {
        radio: Arc<SimulatedRadio>,
        actuator: Arc<SimulatedActuator>,
        observer: Arc<RecordingObserver>,
        service: PeripheralService,
    }

    fn fixture() -> Fixture {
        let radio = Arc::new(SimulatedRadio::new());
        let actuator = Arc::new(SimulatedActuator::new());
        let observer = Arc::new(RecordingObserver::default());
        let service = PeripheralService::new(radio.clone(), actuator.clone(), observer.clone())
            .with_config(PeripheralConfig::default().with_advertise_start_timeout(None));
        Fixture {
            radio,
            actuator,
            observer,
            service,
        }
    }

    #[test]
    fn test_initialize_registers_service() {
        let f = fixture();
        f.service.initialize(f.service.config()).unwrap();

        let log = f.radio.log();
        assert_eq!(log.names, vec!["NXP_SLK".to_string()]);
        assert_eq!(log.servers_opened, 1);
        assert_eq!(log.services, vec![ServiceDescriptor::lock_service()]);
        assert!(f.service.is_initialized());

        f.service.initialize(f.service.config()).unwrap();
        assert_eq!(f.radio.log().servers_opened, 1);
    }

    #[test]
    fn test_initialize_without_server() {
        let f = fixture();
        f.radio.refuse_gatt_server(true);

        assert!(matches!(
            f.service.initialize(f.service.config()),
            Err(InitError::ServerUnavailable(_))
        ));
        assert!(!f.service.is_initialized());
    }

    #[test]
    fn test_initialize_service_rejected_closes_server() {
        let f = fixture();
        f.radio.refuse_service(true);

        assert!(matches!(
            f.service.initialize(f.service.config()),
            Err(InitError::ServiceRejected(_))
        ));
        assert_eq!(f.radio.log().servers_closed, 1);
    }

    #[test]
    fn test_start_advertising_requires_initialization() {
        let f = fixture();
        assert!(matches!(
            f.service.start_advertising(),
            Err(Error::NotInitialized)
        ));
        assert_eq!(f.service.advertising_state(), AdvertisingState::Idle);
    }

    #[test]
    fn test_start_after_concurrent_teardown_is_undone() {
        let f = fixture();
        f.service.initialize(f.service.config()).unwrap();
        let active = f.service.active().unwrap();

        f.service.teardown();
        assert!(matches!(
            f.service.start_on(&active),
            Err(Error::NotInitialized)
        ));

        let log = f.radio.log();
        assert_eq!(log.advertise_starts, 1);
        assert_eq!(log.advertise_stops, 1);
        assert_eq!(active.advertising.state(), AdvertisingState::Idle);
        assert!(f.observer.advertise_changes().is_empty());
    }

    #[test]
    fn test_advertising_payload() {
        let f = fixture();
        f.service
            .initialize(&PeripheralConfig::default().with_device_name("BACK_DOOR"))
            .unwrap();
        f.service.start_advertising().unwrap();

        let (settings, data) = f.radio.log().last_advertisement.unwrap();
        assert!(settings.connectable);
        assert_eq!(data.local_name, "BACK_DOOR");
        assert_eq!(f.radio.log().names, vec!["BACK_DOOR".to_string()]);
    }

    #[test]
    fn test_connection_events_update_registry() {
        let f = fixture();
        let peer = PeerId::from("A");

        f.service
            .on_connection_state_change(peer.clone(), ConnectionState::Connecting);
        assert!(f.service.connected_peers().is_empty());

        f.service
            .on_connection_state_change(peer.clone(), ConnectionState::Connected);
        f.service
            .on_connection_state_change(peer.clone(), ConnectionState::Connected);
        assert_eq!(f.service.connected_peers(), vec![peer.clone()]);

        f.service
            .on_connection_state_change(peer.clone(), ConnectionState::Disconnected);
        assert!(f.service.connected_peers().is_empty());
        assert_eq!(f.observer.connection_changes().len(), 4);
    }

    #[test]
    fn test_requests_are_answered() {
        let f = fixture();
        f.service.initialize(f.service.config()).unwrap();
        let peer = PeerId::from("A");

        f.service.on_characteristic_read_request(
            peer.clone(),
            1,
            0,
            crate::ble::uuids::LOCK_STATUS_CHARACTERISTIC_UUID,
        );
        f.service
            .on_characteristic_read_request(peer.clone(), 2, 0, Uuid::nil());
        f.service.on_characteristic_write_request(
            peer.clone(),
            3,
            crate::ble::uuids::LOCK_CONTROL_CHARACTERISTIC_UUID,
            false,
            false,
            &[1],
        );
        f.service.on_execute_write(peer.clone(), 4, true);

        let responses: Vec<_> = f
            .radio
            .log()
            .responses
            .into_iter()
            .map(|(_, id, response)| (id, response.status()))
            .collect();
        assert_eq!(responses, vec![(1, 0x00), (2, 0x0A), (4, 0x06)]);
        assert_eq!(f.actuator.state(), LockState::Unlocked);
    }

    #[test]
    fn test_requests_before_initialize_are_dropped() {
        let f = fixture();
        f.service.on_characteristic_write_request(
            PeerId::from("A"),
            1,
            crate::ble::uuids::LOCK_CONTROL_CHARACTERISTIC_UUID,
            false,
            true,
            &[1],
        );

        assert!(f.radio.log().responses.is_empty());
        assert_eq!(f.actuator.state(), LockState::Locked);
    }

    #[test]
    fn test_teardown_disconnects_peers() {
        let f = fixture();
        f.service.initialize(f.service.config()).unwrap();
        f.service.start_advertising().unwrap();
        f.service.on_advertise_start_result(Ok(()));
        f.service
            .on_connection_state_change(PeerId::from("A"), ConnectionState::Connected);
        f.service
            .on_connection_state_change(PeerId::from("B"), ConnectionState::Connected);

        f.service.teardown();

        let log = f.radio.log();
        assert_eq!(log.advertise_stops, 1);
        assert_eq!(log.cancelled, vec![PeerId::from("A"), PeerId::from("B")]);
        assert_eq!(log.servers_closed, 1);
        assert!(f.service.connected_peers().is_empty());
        assert!(!f.service.is_initialized());

        f.service.teardown();
        assert_eq!(f.radio.log().servers_closed, 1);
    }

    #[test]
    fn test_shutdown_locks() {
        let f = fixture();
        f.service.initialize(f.service.config()).unwrap();
        f.actuator.write(LockState::Unlocked).unwrap();

        f.service.shutdown().unwrap();
        assert_eq!(f.actuator.state(), LockState::Locked);
    }

    #[test]
    fn test_adapter_lifecycle() {
        let f = fixture();

        f.service
            .on_adapter_state_changed(AdapterState::TurningOn)
            .unwrap();
        assert!(!f.service.is_initialized());

        f.service.on_adapter_state_changed(AdapterState::On).unwrap();
        assert_eq!(f.service.advertising_state(), AdvertisingState::Starting);

        f.service.on_adapter_state_changed(AdapterState::On).unwrap();
        assert_eq!(f.radio.log().advertise_starts, 1);

        f.service
            .on_adapter_state_changed(AdapterState::TurningOff)
            .unwrap();
        assert!(!f.service.is_initialized());
    }

    #[tokio::test]
    async fn test_run_follows_adapter_source() {
        let f = fixture();
        let (tx, rx) = tokio::sync::mpsc::channel(4);
        tx.send(AdapterState::On).await.unwrap();
        drop(tx);

        f.service.run(rx).await;

        let log = f.radio.log();
        assert_eq!(log.advertise_starts, 1);
        assert_eq!(log.servers_closed, 1);
        assert!(!f.service.is_initialized());
    }
}
