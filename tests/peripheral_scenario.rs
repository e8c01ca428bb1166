//! End-to-end behaviour of the lock peripheral against the simulated radio.

use pretty_assertions::assert_eq;
use smart_locker_ble::sim::{RecordingObserver, SimulatedActuator, SimulatedRadio};
use smart_locker_ble::{
    AdvertiseError, AdvertisingState, ChannelObserver, ConnectionState, Error, LockState,
    PeerId, PeripheralConfig, PeripheralEvent, PeripheralService,
    LOCK_CONTROL_CHARACTERISTIC_UUID, LOCK_STATUS_CHARACTERISTIC_UUID,
};
use std::sync::Arc;
use std::time::Duration;
use tokio_test::{assert_err, assert_ok};

struct Harness {
    radio: Arc<SimulatedRadio>,
    actuator: Arc<SimulatedActuator>,
    observer: Arc<RecordingObserver>,
    service: Arc<PeripheralService>,
}

impl Harness {
    fn new() -> Self {
        let radio = Arc::new(SimulatedRadio::new());
        let actuator = Arc::new(SimulatedActuator::new());
        let observer = Arc::new(RecordingObserver::default());
        let service = Arc::new(PeripheralService::new(
            radio.clone(),
            actuator.clone(),
            observer.clone(),
        ));
        Self {
            radio,
            actuator,
            observer,
            service,
        }
    }

    fn config() -> PeripheralConfig {
        PeripheralConfig::default().with_advertise_start_timeout(None)
    }

    fn connect(&self, peer: &PeerId) {
        self.service
            .on_connection_state_change(peer.clone(), ConnectionState::Connected);
    }

    fn disconnect(&self, peer: &PeerId) {
        self.service
            .on_connection_state_change(peer.clone(), ConnectionState::Disconnected);
    }

    fn write_control(&self, peer: &PeerId, value: &[u8]) {
        self.service.on_characteristic_write_request(
            peer.clone(),
            0,
            LOCK_CONTROL_CHARACTERISTIC_UUID,
            false,
            false,
            value,
        );
    }

    fn read_status(&self, peer: &PeerId, request_id: i32) -> Vec<u8> {
        self.service.on_characteristic_read_request(
            peer.clone(),
            request_id,
            0,
            LOCK_STATUS_CHARACTERISTIC_UUID,
        );
        self.radio
            .log()
            .responses
            .into_iter()
            .rev()
            .find(|(_, id, _)| *id == request_id)
            .map(|(_, _, response)| response.value().to_vec())
            .unwrap_or_default()
    }
}

#[test]
fn lock_unlock_session() {
    let h = Harness::new();
    let peer_a = PeerId::from("A");

    h.service.initialize(&Harness::config()).unwrap();
    h.service.start_advertising().unwrap();
    h.service.on_advertise_start_result(Ok(()));
    assert_eq!(h.observer.advertise_changes(), vec![true]);
    assert_eq!(h.service.advertising_state(), AdvertisingState::Advertising);

    h.connect(&peer_a);
    assert_eq!(h.service.connected_peers(), vec![peer_a.clone()]);

    h.write_control(&peer_a, &[0x01]);
    assert_eq!(h.actuator.state(), LockState::Unlocked);
    assert_eq!(h.read_status(&peer_a, 7), vec![0x01]);
    assert_eq!(h.radio.log().notifications_to(&peer_a), vec![vec![0x01]]);

    h.disconnect(&peer_a);
    assert!(h.service.connected_peers().is_empty());

    h.service.teardown();
    let log = h.radio.log();
    assert_eq!(log.advertise_stops, 1);
    assert!(log.cancelled.is_empty());
    assert_eq!(log.servers_closed, 1);
}

#[test]
fn three_writes_notify_every_peer_in_order() {
    let h = Harness::new();
    let peers = [PeerId::from("A"), PeerId::from("B")];
    h.service.initialize(&Harness::config()).unwrap();
    for peer in &peers {
        h.connect(peer);
    }

    h.write_control(&peers[0], &[0]);
    h.write_control(&peers[1], &[1]);
    h.write_control(&peers[0], &[0]);

    assert_eq!(h.actuator.state(), LockState::Locked);
    assert_eq!(
        h.actuator.history(),
        vec![LockState::Locked, LockState::Unlocked, LockState::Locked]
    );
    let log = h.radio.log();
    for peer in &peers {
        assert_eq!(log.notifications_to(peer), vec![vec![0], vec![1], vec![0]]);
    }
}

#[test]
fn repeated_writes_read_back_the_same_byte() {
    let h = Harness::new();
    let peer = PeerId::from("A");
    h.service.initialize(&Harness::config()).unwrap();

    for value in [0x00u8, 0x01, 0x02, 0x80, 0xFF] {
        let expected = LockState::from_byte(value).to_byte();
        h.write_control(&peer, &[value]);
        assert_eq!(h.read_status(&peer, 1), vec![expected]);
        h.write_control(&peer, &[value]);
        assert_eq!(h.read_status(&peer, 2), vec![expected]);
    }
}

#[test]
fn invalid_requests_get_negative_responses() {
    let h = Harness::new();
    let peer = PeerId::from("A");
    h.service.initialize(&Harness::config()).unwrap();

    h.service
        .on_characteristic_read_request(peer.clone(), 1, 0, uuid::Uuid::nil());
    h.service.on_characteristic_write_request(
        peer.clone(),
        2,
        LOCK_CONTROL_CHARACTERISTIC_UUID,
        true,
        true,
        &[1],
    );
    h.service.on_characteristic_write_request(
        peer.clone(),
        3,
        LOCK_CONTROL_CHARACTERISTIC_UUID,
        false,
        false,
        &[1, 0],
    );
    h.service.on_characteristic_read_request(
        peer.clone(),
        4,
        1,
        LOCK_STATUS_CHARACTERISTIC_UUID,
    );

    let statuses: Vec<(i32, u8)> = h
        .radio
        .log()
        .responses
        .into_iter()
        .map(|(_, id, response)| (id, response.status()))
        .collect();
    assert_eq!(statuses, vec![(1, 0x0A), (2, 0x06), (3, 0x0D), (4, 0x07)]);
    assert_eq!(h.actuator.state(), LockState::Locked);
    assert!(h.radio.log().notifications.is_empty());
}

#[test]
fn second_start_is_rejected_and_state_kept() {
    let h = Harness::new();
    h.service.initialize(&Harness::config()).unwrap();

    assert_ok!(h.service.start_advertising());
    let err = assert_err!(h.service.start_advertising());
    assert!(matches!(
        err,
        Error::Advertise(AdvertiseError::AlreadyAdvertising)
    ));
    assert_eq!(h.service.advertising_state(), AdvertisingState::Starting);

    h.service.on_advertise_start_result(Ok(()));
    assert_err!(h.service.start_advertising());
    assert_eq!(h.service.advertising_state(), AdvertisingState::Advertising);

    h.service.stop_advertising();
    assert_ok!(h.service.start_advertising());
}

#[test]
fn actuator_failure_is_reported_and_nothing_is_notified() {
    let h = Harness::new();
    let peer = PeerId::from("A");
    h.service.initialize(&Harness::config()).unwrap();
    h.connect(&peer);
    h.actuator.set_failing(true);

    h.write_control(&peer, &[1]);

    let log = h.radio.log();
    assert_eq!(log.responses.len(), 1);
    assert_eq!(log.responses[0].2.status(), 0x0E);
    assert!(log.notifications.is_empty());
    assert_eq!(h.observer.actuator_failures().len(), 1);
    assert_eq!(h.actuator.state(), LockState::Locked);
}

#[test]
fn connection_churn_during_fanout_keeps_registry_consistent() {
    let h = Harness::new();
    h.service.initialize(&Harness::config()).unwrap();
    let writer = PeerId::from("writer");
    h.connect(&writer);

    let churn = {
        let service = h.service.clone();
        std::thread::spawn(move || {
            for round in 0..200 {
                let peer = PeerId::new(format!("peer-{}", round % 5));
                service.on_connection_state_change(peer.clone(), ConnectionState::Connected);
                service.on_connection_state_change(peer.clone(), ConnectionState::Connected);
                if round % 2 == 0 {
                    service.on_connection_state_change(peer, ConnectionState::Disconnected);
                }
            }
        })
    };

    for round in 0..200u32 {
        h.write_control(&writer, &[(round % 2) as u8]);
    }
    churn.join().unwrap();

    let mut peers = h.service.connected_peers();
    let count = peers.len();
    peers.sort();
    peers.dedup();
    assert_eq!(peers.len(), count);
    assert_eq!(h.radio.log().notifications_to(&writer).len(), 200);
}

#[test]
fn teardown_disconnects_remaining_peers_once() {
    let h = Harness::new();
    h.service.initialize(&Harness::config()).unwrap();
    h.connect(&PeerId::from("A"));
    h.connect(&PeerId::from("B"));

    h.service.teardown();
    h.service.teardown();

    let log = h.radio.log();
    assert_eq!(log.cancelled, vec![PeerId::from("A"), PeerId::from("B")]);
    assert_eq!(log.servers_closed, 1);

    // Late disconnect events after teardown are harmless.
    h.disconnect(&PeerId::from("A"));
    assert!(h.service.connected_peers().is_empty());
}

#[tokio::test]
async fn channel_observer_sees_session_events() {
    let radio = Arc::new(SimulatedRadio::new());
    let actuator = Arc::new(SimulatedActuator::new());
    let observer = Arc::new(ChannelObserver::new(16));
    let mut events = observer.subscribe();
    let service = PeripheralService::new(radio.clone(), actuator, observer.clone());

    service.initialize(&Harness::config()).unwrap();
    service.start_advertising().unwrap();
    service.on_advertise_start_result(Ok(()));
    service.on_connection_state_change(PeerId::from("A"), ConnectionState::Connected);

    assert_eq!(
        events.recv().await.unwrap(),
        PeripheralEvent::AdvertiseChanged(true)
    );
    assert_eq!(
        events.recv().await.unwrap(),
        PeripheralEvent::ConnectionChanged {
            peer: PeerId::from("A"),
            state: ConnectionState::Connected,
        }
    );
}

#[tokio::test]
async fn pending_start_times_out() {
    let radio = Arc::new(SimulatedRadio::new());
    let observer = Arc::new(RecordingObserver::default());
    let service = PeripheralService::new(
        radio.clone(),
        Arc::new(SimulatedActuator::new()),
        observer.clone(),
    );

    service
        .initialize(
            &PeripheralConfig::default()
                .with_advertise_start_timeout(Some(Duration::from_millis(20))),
        )
        .unwrap();
    service.start_advertising().unwrap();
    tokio::time::sleep(Duration::from_millis(150)).await;

    assert_eq!(service.advertising_state(), AdvertisingState::FailedToStart);
    assert_eq!(observer.advertise_changes(), vec![false]);
    assert_ok!(service.start_advertising());
}
