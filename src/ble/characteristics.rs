//! GATT service layout and characteristic request dispatch.
//!
//! The lock service has two one-byte characteristics: a write-only control
//! characteristic that drives the actuator, and a readable, notifying status
//! characteristic that mirrors the lock state.

use bytes::Bytes;
use std::sync::Arc;
use tracing::{debug, error, info, warn};
use uuid::Uuid;

use crate::ble::connection::PeerId;
use crate::ble::notifications::{FanoutReport, NotificationFanout};
use crate::ble::uuids::*;
use crate::error::{att, ActuatorError, GattError};
use crate::lock::{ActuatorPort, LockState};
use crate::observer::PeripheralObserver;

/// Length of every characteristic value in the lock service.
pub const LOCK_VALUE_LEN: usize = 1;

/// Characteristic property bits.
pub mod properties {
    /// Value may be read.
    pub const READ: u8 = 0x02;
    /// Value may be written without response.
    pub const WRITE_WITHOUT_RESPONSE: u8 = 0x04;
    /// Value may be written with response.
    pub const WRITE: u8 = 0x08;
    /// Value changes are notified.
    pub const NOTIFY: u8 = 0x10;
}

/// Characteristic permission bits.
pub mod permissions {
    /// Readable.
    pub const READ: u16 = 0x01;
    /// Writable.
    pub const WRITE: u16 = 0x10;
}

/// A characteristic exposed by the service.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CharacteristicDescriptor {
    /// Characteristic UUID.
    pub uuid: Uuid,
    /// Property bits, see [`properties`].
    pub properties: u8,
    /// Permission bits, see [`permissions`].
    pub permissions: u16,
    /// Value registered with the server.
    pub initial_value: Bytes,
}

impl CharacteristicDescriptor {
    /// Check if reads are allowed.
    pub fn is_readable(&self) -> bool {
        self.properties & properties::READ != 0 && self.permissions & permissions::READ != 0
    }

    /// Check if writes are allowed.
    pub fn is_writable(&self) -> bool {
        self.properties & (properties::WRITE | properties::WRITE_WITHOUT_RESPONSE) != 0
            && self.permissions & permissions::WRITE != 0
    }

    /// Check if value changes are notified.
    pub fn is_notifying(&self) -> bool {
        self.properties & properties::NOTIFY != 0
    }
}

/// Immutable layout of the lock service.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ServiceDescriptor {
    /// Service UUID.
    pub uuid: Uuid,
    /// Primary service.
    pub primary: bool,
    /// Control characteristic (write without response).
    pub control: CharacteristicDescriptor,
    /// Status characteristic (read, notify).
    pub status: CharacteristicDescriptor,
}

impl ServiceDescriptor {
    /// Build the lock service layout.
    pub fn lock_service() -> Self {
        let locked = Bytes::from_static(&[0]);
        Self {
            uuid: SMART_LOCK_SERVICE_UUID,
            primary: true,
            control: CharacteristicDescriptor {
                uuid: LOCK_CONTROL_CHARACTERISTIC_UUID,
                properties: properties::WRITE_WITHOUT_RESPONSE,
                permissions: permissions::WRITE,
                initial_value: locked.clone(),
            },
            status: CharacteristicDescriptor {
                uuid: LOCK_STATUS_CHARACTERISTIC_UUID,
                properties: properties::READ | properties::NOTIFY,
                permissions: permissions::READ,
                initial_value: locked,
            },
        }
    }

    /// Characteristics in registration order.
    pub fn characteristics(&self) -> [&CharacteristicDescriptor; 2] {
        [&self.control, &self.status]
    }

    /// Look up a characteristic by UUID.
    pub fn characteristic(&self, uuid: &Uuid) -> Option<&CharacteristicDescriptor> {
        self.characteristics()
            .into_iter()
            .find(|characteristic| characteristic.uuid == *uuid)
    }
}

/// Response to a characteristic request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum GattResponse {
    /// The request succeeded, with the value to return (empty for writes).
    Success(Bytes),
    /// The request failed.
    Error(GattError),
}

impl GattResponse {
    /// ATT status code for this response.
    pub fn status(&self) -> u8 {
        match self {
            Self::Success(_) => att::SUCCESS,
            Self::Error(e) => e.att_status(),
        }
    }

    /// Value carried by the response.
    pub fn value(&self) -> &[u8] {
        match self {
            Self::Success(value) => value.as_ref(),
            Self::Error(_) => &[],
        }
    }

    /// Check if the request succeeded.
    pub fn is_success(&self) -> bool {
        matches!(self, Self::Success(_))
    }
}

impl From<GattError> for GattResponse {
    fn from(error: GattError) -> Self {
        Self::Error(error)
    }
}

/// Answers characteristic reads and writes for the lock service.
pub struct GattRequestDispatcher {
    service: Arc<ServiceDescriptor>,
    actuator: Arc<dyn ActuatorPort>,
    fanout: NotificationFanout,
    observer: Arc<dyn PeripheralObserver>,
}

impl GattRequestDispatcher {
    /// Create a dispatcher.
    pub fn new(
        service: Arc<ServiceDescriptor>,
        actuator: Arc<dyn ActuatorPort>,
        fanout: NotificationFanout,
        observer: Arc<dyn PeripheralObserver>,
    ) -> Self {
        Self {
            service,
            actuator,
            fanout,
            observer,
        }
    }

    /// The service layout this dispatcher serves.
    pub fn service(&self) -> &ServiceDescriptor {
        &self.service
    }

    /// Answer a read request.
    pub fn handle_read(&self, peer: &PeerId, characteristic_id: Uuid, offset: usize) -> GattResponse {
        debug!("Read request from {} for {}", peer, characteristic_id);

        match self.read_value(characteristic_id, offset) {
            Ok(value) => GattResponse::Success(value),
            Err(e) => {
                warn!("Read from {} rejected: {}", peer, e);
                GattResponse::Error(e)
            }
        }
    }

    /// Answer a write request.
    ///
    /// Returns `None` for a successful write that needs no response. Errors are
    /// always returned.
    pub fn handle_write(
        &self,
        peer: &PeerId,
        characteristic_id: Uuid,
        value: &[u8],
        prepared: bool,
        response_needed: bool,
    ) -> Option<GattResponse> {
        debug!(
            "Write request from {} for {}: {:02X?}",
            peer, characteristic_id, value
        );

        match self.write_value(characteristic_id, value, prepared) {
            Ok(state) => {
                info!("Lock {} by {}", state, peer);
                response_needed.then(|| GattResponse::Success(Bytes::new()))
            }
            Err(e) => {
                warn!("Write from {} rejected: {}", peer, e);
                Some(GattResponse::Error(e))
            }
        }
    }

    fn read_value(&self, characteristic_id: Uuid, offset: usize) -> Result<Bytes, GattError> {
        let characteristic = self
            .service
            .characteristic(&characteristic_id)
            .ok_or(GattError::AttributeNotFound)?;

        if !characteristic.is_readable() {
            return Err(GattError::ReadNotPermitted);
        }

        if offset != 0 {
            return Err(GattError::InvalidOffset { offset });
        }

        let state = self.actuator.read().map_err(|e| self.actuator_failure(e))?;
        Ok(Bytes::copy_from_slice(&[state.to_byte()]))
    }

    fn write_value(
        &self,
        characteristic_id: Uuid,
        value: &[u8],
        prepared: bool,
    ) -> Result<LockState, GattError> {
        let characteristic = self
            .service
            .characteristic(&characteristic_id)
            .ok_or(GattError::AttributeNotFound)?;

        if prepared {
            return Err(GattError::RequestNotSupported);
        }

        if !characteristic.is_writable() {
            return Err(GattError::WriteNotPermitted);
        }

        if value.len() != LOCK_VALUE_LEN {
            return Err(GattError::InvalidAttributeLength {
                expected: LOCK_VALUE_LEN,
                actual: value.len(),
            });
        }

        let state = LockState::from_byte(value[0]);
        self.actuator
            .write(state)
            .map_err(|e| self.actuator_failure(e))?;

        let report = self.fanout.notify_all(state.to_byte());
        self.log_fanout(&report);

        Ok(state)
    }

    fn actuator_failure(&self, e: ActuatorError) -> GattError {
        error!("Actuator failure: {}", e);
        let error = GattError::ActuatorIoFailure(e);
        self.observer.on_actuator_failure(&error);
        error
    }

    fn log_fanout(&self, report: &FanoutReport) {
        if !report.is_complete() {
            warn!(
                "Status notification reached {} peer(s), {} failed, {} disconnected",
                report.delivered.len(),
                report.failed.len(),
                report.skipped.len()
            );
        }
    }
}
