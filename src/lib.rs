// Allow unusual byte groupings for UUIDs which have standard format
#![allow(clippy::unusual_byte_groupings)]

//! # smart-locker-ble
//!
//! The Bluetooth Low Energy peripheral core of a two-state smart lock.
//!
//! The lock is exposed to nearby centrals through a single GATT service with
//! two one-byte characteristics:
//!
//! - **Control** (`bc846c61-…`, write without response): `0` locks, any other
//!   value unlocks.
//! - **Status** (`bc846c62-…`, read + notify): the current lock state. Every
//!   accepted control write is notified to all connected centrals.
//!
//! The crate does not talk to a Bluetooth controller directly. A platform
//! binding implements [`RadioAdapter`], [`GattServer`] and [`Advertiser`],
//! and routes the stack's callbacks into [`PeripheralService`]. The lock
//! hardware sits behind [`ActuatorPort`].
//!
//! ## Quick Start
//!
//! ```rust
//! use std::sync::Arc;
//! use smart_locker_ble::sim::{SimulatedActuator, SimulatedRadio};
//! use smart_locker_ble::{
//!     ConnectionState, NoopObserver, PeerId, PeripheralConfig, PeripheralService,
//!     LOCK_CONTROL_CHARACTERISTIC_UUID,
//! };
//!
//! # fn main() -> smart_locker_ble::Result<()> {
//! let radio = Arc::new(SimulatedRadio::new());
//! let actuator = Arc::new(SimulatedActuator::new());
//! let service = PeripheralService::new(radio.clone(), actuator.clone(), Arc::new(NoopObserver));
//!
//! service.initialize(&PeripheralConfig::default())?;
//! service.start_advertising()?;
//! service.on_advertise_start_result(Ok(()));
//!
//! let phone = PeerId::from("5C:F3:70:00:00:01");
//! service.on_connection_state_change(phone.clone(), ConnectionState::Connected);
//! service.on_characteristic_write_request(
//!     phone,
//!     1,
//!     LOCK_CONTROL_CHARACTERISTIC_UUID,
//!     false,
//!     false,
//!     &[1],
//! );
//!
//! assert!(!actuator.state().is_locked());
//! service.shutdown()?;
//! # Ok(())
//! # }
//! ```
//!
//! ## Feature Flags
//!
//! - `serde`: Enable serialization/deserialization for data types

// Public modules
pub mod ble;
pub mod config;
pub mod error;
pub mod lock;
pub mod observer;
pub mod peripheral;
pub mod sim;

// Re-exports for convenience
pub use config::PeripheralConfig;
pub use error::{ActuatorError, AdvertiseError, Error, GattError, InitError, PlatformError, Result};
pub use lock::{ActuatorPort, LockState};
pub use observer::{CallbackHandle, ChannelObserver, NoopObserver, PeripheralEvent, PeripheralObserver};
pub use peripheral::PeripheralService;

// Re-export commonly used types from submodules
pub use ble::{
    AdapterState, AdapterStateSource, AdvertiseData, AdvertiseSettings, Advertiser,
    AdvertisingState, ConnectionRegistry, ConnectionState, FanoutReport, GattResponse, GattServer,
    PeerId, RadioAdapter, ServiceDescriptor, LOCK_CONTROL_CHARACTERISTIC_UUID,
    LOCK_STATUS_CHARACTERISTIC_UUID, SMART_LOCK_SERVICE_UUID,
};
