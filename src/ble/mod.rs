//! BLE peripheral module.
//!
//! This module provides the GATT-level building blocks of the lock
//! peripheral: the service layout, advertising, connection tracking,
//! request dispatch and notification fan-out.

pub mod advertising;
pub mod characteristics;
pub mod connection;
pub mod notifications;
pub mod platform;
pub mod uuids;

pub use advertising::{AdvertiseData, AdvertiseSettings, AdvertisingController, AdvertisingState};
pub use characteristics::{GattRequestDispatcher, GattResponse, ServiceDescriptor};
pub use connection::{ConnectionRegistry, ConnectionState, PeerId};
pub use notifications::{FanoutReport, NotificationFanout};
pub use platform::{AdapterState, AdapterStateSource, Advertiser, GattServer, RadioAdapter};
pub use uuids::*;
