//! Radio-stack seam.
//!
//! The peripheral core does not talk to a Bluetooth controller directly. A
//! platform binding implements these traits and routes the stack's callbacks
//! into [`PeripheralService`](crate::PeripheralService).

use async_trait::async_trait;
use std::sync::Arc;
use tokio::sync::mpsc;
use uuid::Uuid;

use crate::ble::advertising::{AdvertiseData, AdvertiseSettings};
use crate::ble::characteristics::{GattResponse, ServiceDescriptor};
use crate::ble::connection::PeerId;
use crate::error::PlatformError;

/// Host radio adapter.
pub trait RadioAdapter: Send + Sync {
    /// Set the local name used in advertising.
    fn set_name(&self, name: &str) -> Result<(), PlatformError>;

    /// Open the GATT server. Fails if the stack cannot provide one.
    fn open_gatt_server(&self) -> Result<Arc<dyn GattServer>, PlatformError>;

    /// The LE advertiser, if the adapter currently provides one.
    fn advertiser(&self) -> Option<Arc<dyn Advertiser>>;
}

/// An open GATT server.
pub trait GattServer: Send + Sync {
    /// Register a primary service.
    fn add_service(&self, service: &ServiceDescriptor) -> Result<(), PlatformError>;

    /// Answer a read or write request.
    fn send_response(
        &self,
        peer: &PeerId,
        request_id: i32,
        response: &GattResponse,
    ) -> Result<(), PlatformError>;

    /// Push a characteristic value notification to one peer.
    ///
    /// Called while the connection registry is locked. Implementations must
    /// not deliver connection events synchronously from inside this call.
    fn notify_characteristic_changed(
        &self,
        peer: &PeerId,
        characteristic: Uuid,
        value: &[u8],
    ) -> Result<(), PlatformError>;

    /// Request a disconnect. Does not wait for the acknowledgment.
    fn cancel_connection(&self, peer: &PeerId);

    /// Release the server.
    fn close(&self);
}

/// LE advertiser.
///
/// The outcome of `start_advertising` arrives later through
/// [`PeripheralService::on_advertise_start_result`](crate::PeripheralService::on_advertise_start_result).
/// An `Err` here means the request was refused outright.
pub trait Advertiser: Send + Sync {
    /// Issue an advertise request.
    fn start_advertising(
        &self,
        settings: &AdvertiseSettings,
        data: &AdvertiseData,
    ) -> Result<(), PlatformError>;

    /// Stop advertising.
    fn stop_advertising(&self);
}

/// Power state of the host adapter.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum AdapterState {
    /// Adapter is off.
    Off,
    /// Adapter is powering up.
    TurningOn,
    /// Adapter is on and usable.
    On,
    /// Adapter is powering down.
    TurningOff,
}

impl AdapterState {
    /// Create from the stack's adapter state code.
    pub fn from_raw(value: i32) -> Option<Self> {
        match value {
            10 => Some(Self::Off),
            11 => Some(Self::TurningOn),
            12 => Some(Self::On),
            13 => Some(Self::TurningOff),
            _ => None,
        }
    }
}

impl std::fmt::Display for AdapterState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Off => write!(f, "Off"),
            Self::TurningOn => write!(f, "TurningOn"),
            Self::On => write!(f, "On"),
            Self::TurningOff => write!(f, "TurningOff"),
        }
    }
}

/// Source of adapter power transitions.
#[async_trait]
pub trait AdapterStateSource: Send {
    /// Wait for the next transition. `None` when the source is closed.
    async fn next_state(&mut self) -> Option<AdapterState>;
}

#[async_trait]
impl AdapterStateSource for mpsc::Receiver<AdapterState> {
    async fn next_state(&mut self) -> Option<AdapterState> {
        self.recv().await
    }
}

#[async_trait]
impl AdapterStateSource for mpsc::UnboundedReceiver<AdapterState> {
    async fn next_state(&mut self) -> Option<AdapterState> {
        self.recv().await
    }
}
