//! Simulated smart lock session
//!
//! Drives the lock peripheral through a full adapter lifecycle against the
//! in-memory radio:
//! - Adapter powers on, service registers and advertising starts
//! - Two phones connect and toggle the lock
//! - One phone disconnects, the adapter powers off
//!
//! Run with: cargo run --example smart_locker

use smart_locker_ble::sim::{SimulatedActuator, SimulatedRadio};
use smart_locker_ble::{
    AdapterState, ChannelObserver, ConnectionState, PeerId, PeripheralConfig, PeripheralService,
    Result, LOCK_CONTROL_CHARACTERISTIC_UUID, LOCK_STATUS_CHARACTERISTIC_UUID,
};
use std::sync::Arc;
use std::time::Duration;

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize logging
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive("smart_locker_ble=debug".parse().unwrap()),
        )
        .init();

    println!("Smart Lock Peripheral (simulated radio)");
    println!("=======================================\n");

    let radio = Arc::new(SimulatedRadio::new());
    let actuator = Arc::new(SimulatedActuator::new());
    let config = PeripheralConfig::default();
    let observer = Arc::new(ChannelObserver::from_config(&config));

    let _handle = observer.on_event(|event| {
        println!("  event: {:?}", event);
    });

    let service = Arc::new(
        PeripheralService::new(radio.clone(), actuator.clone(), observer.clone())
            .with_config(config),
    );

    let (adapter_tx, adapter_rx) = tokio::sync::mpsc::channel(8);
    let runner = {
        let service = service.clone();
        tokio::spawn(async move { service.run(adapter_rx).await })
    };

    adapter_tx.send(AdapterState::TurningOn).await.ok();
    adapter_tx.send(AdapterState::On).await.ok();
    tokio::time::sleep(Duration::from_millis(50)).await;

    // The platform confirms the advertise request.
    service.on_advertise_start_result(Ok(()));
    println!("Advertising: {}\n", service.advertising_state());

    let phone = PeerId::from("5C:F3:70:00:00:01");
    let tablet = PeerId::from("5C:F3:70:00:00:02");
    service.on_connection_state_change(phone.clone(), ConnectionState::Connected);
    service.on_connection_state_change(tablet.clone(), ConnectionState::Connected);

    for (request_id, value) in [(1, 0x01u8), (2, 0x00), (3, 0x01)] {
        service.on_characteristic_write_request(
            phone.clone(),
            request_id,
            LOCK_CONTROL_CHARACTERISTIC_UUID,
            false,
            false,
            &[value],
        );
        println!("Phone wrote {:#04x}, lock is {}", value, actuator.state());
    }

    service.on_characteristic_read_request(tablet.clone(), 4, 0, LOCK_STATUS_CHARACTERISTIC_UUID);
    service.on_connection_state_change(tablet.clone(), ConnectionState::Disconnected);

    adapter_tx.send(AdapterState::TurningOff).await.ok();
    drop(adapter_tx);
    runner.await.ok();

    service.shutdown()?;
    tokio::time::sleep(Duration::from_millis(50)).await;

    let log = radio.log();
    println!("\n=== Radio Summary ===");
    println!("Notifications to phone:  {:?}", log.notifications_to(&phone));
    println!("Notifications to tablet: {:?}", log.notifications_to(&tablet));
    println!("Responses sent: {}", log.responses.len());
    println!("Cancelled connections: {:?}", log.cancelled);
    println!("Final lock state: {}", actuator.state());

    Ok(())
}
