//! Error types for the smart-locker-ble crate.
//!
//! Errors are grouped by the layer that produces them. GATT-layer errors never
//! leave the dispatcher as failures; they are turned into negative protocol
//! responses (see [`GattError::att_status`]).

use thiserror::Error;

/// ATT protocol status codes used in responses.
pub mod att {
    /// The request completed successfully.
    pub const SUCCESS: u8 = 0x00;
    /// The attribute cannot be read.
    pub const READ_NOT_PERMITTED: u8 = 0x02;
    /// The attribute cannot be written.
    pub const WRITE_NOT_PERMITTED: u8 = 0x03;
    /// The attribute server does not support the request.
    pub const REQUEST_NOT_SUPPORTED: u8 = 0x06;
    /// The offset specified was past the end of the attribute.
    pub const INVALID_OFFSET: u8 = 0x07;
    /// No attribute found with the given identifier.
    pub const ATTRIBUTE_NOT_FOUND: u8 = 0x0A;
    /// The attribute value length is invalid for the operation.
    pub const INVALID_ATTRIBUTE_VALUE_LENGTH: u8 = 0x0D;
    /// The request encountered an unlikely error and could not be completed.
    pub const UNLIKELY_ERROR: u8 = 0x0E;
}

/// The actuator port failed to read or drive the lock.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("Actuator I/O error: {0}")]
pub struct ActuatorError(pub String);

impl ActuatorError {
    /// Create a new actuator error with the given description.
    pub fn new(reason: impl Into<String>) -> Self {
        Self(reason.into())
    }
}

/// A call into the radio stack failed.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("Platform call failed (status {status}): {reason}")]
pub struct PlatformError {
    /// Platform-specific status code.
    pub status: i32,
    /// Human-readable reason.
    pub reason: String,
}

impl PlatformError {
    /// Create a new platform error.
    pub fn new(status: i32, reason: impl Into<String>) -> Self {
        Self {
            status,
            reason: reason.into(),
        }
    }
}

/// Errors from the advertising state machine.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum AdvertiseError {
    /// Start was requested while a start is pending or advertising is active.
    #[error("Advertising already started")]
    AlreadyAdvertising,

    /// The platform refused to advertise.
    #[error("Advertising rejected by platform: {reason}")]
    PlatformRejected {
        /// Why the platform refused.
        reason: String,
    },
}

/// Errors raised while answering a characteristic request.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum GattError {
    /// The request targeted a characteristic this service does not expose.
    #[error("Attribute not found")]
    AttributeNotFound,

    /// The written value has the wrong length.
    #[error("Invalid attribute length: expected {expected}, got {actual}")]
    InvalidAttributeLength {
        /// Length the characteristic accepts.
        expected: usize,
        /// Length that was written.
        actual: usize,
    },

    /// The read offset lies past the single-byte payload.
    #[error("Invalid offset: {offset}")]
    InvalidOffset {
        /// The requested offset.
        offset: usize,
    },

    /// The characteristic exists but does not allow reads.
    #[error("Read not permitted")]
    ReadNotPermitted,

    /// The characteristic exists but does not allow writes.
    #[error("Write not permitted")]
    WriteNotPermitted,

    /// Prepared (queued) writes and other unsupported requests.
    #[error("Request not supported")]
    RequestNotSupported,

    /// The actuator failed while serving the request.
    #[error("Actuator failure: {0}")]
    ActuatorIoFailure(#[from] ActuatorError),
}

impl GattError {
    /// The ATT status code carried by the negative response for this error.
    pub fn att_status(&self) -> u8 {
        match self {
            Self::AttributeNotFound => att::ATTRIBUTE_NOT_FOUND,
            Self::InvalidAttributeLength { .. } => att::INVALID_ATTRIBUTE_VALUE_LENGTH,
            Self::InvalidOffset { .. } => att::INVALID_OFFSET,
            Self::ReadNotPermitted => att::READ_NOT_PERMITTED,
            Self::WriteNotPermitted => att::WRITE_NOT_PERMITTED,
            Self::RequestNotSupported => att::REQUEST_NOT_SUPPORTED,
            Self::ActuatorIoFailure(_) => att::UNLIKELY_ERROR,
        }
    }
}

/// Errors from peripheral initialization.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum InitError {
    /// The GATT server could not be opened.
    #[error("GATT server unavailable: {0}")]
    ServerUnavailable(PlatformError),

    /// The GATT server refused to register the lock service.
    #[error("Service registration rejected: {0}")]
    ServiceRejected(PlatformError),
}

/// The main error type for this crate.
#[derive(Error, Debug)]
pub enum Error {
    /// Advertising error.
    #[error(transparent)]
    Advertise(#[from] AdvertiseError),

    /// GATT request error.
    #[error(transparent)]
    Gatt(#[from] GattError),

    /// Initialization error.
    #[error(transparent)]
    Init(#[from] InitError),

    /// Actuator error.
    #[error(transparent)]
    Actuator(#[from] ActuatorError),

    /// Radio-stack error.
    #[error(transparent)]
    Platform(#[from] PlatformError),

    /// Operation requires an initialized peripheral.
    #[error("Peripheral not initialized")]
    NotInitialized,
}

/// A specialized Result type for this crate.
pub type Result<T> = std::result::Result<T, Error>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_att_status_codes() {
        assert_eq!(GattError::AttributeNotFound.att_status(), 0x0A);
        assert_eq!(
            GattError::InvalidAttributeLength {
                expected: 1,
                actual: 2
            }
            .att_status(),
            0x0D
        );
        assert_eq!(GattError::InvalidOffset { offset: 1 }.att_status(), 0x07);
        assert_eq!(GattError::RequestNotSupported.att_status(), 0x06);
        assert_eq!(GattError::ReadNotPermitted.att_status(), 0x02);
        assert_eq!(GattError::WriteNotPermitted.att_status(), 0x03);
        assert_eq!(
            GattError::ActuatorIoFailure(ActuatorError::new("gpio")).att_status(),
            0x0E
        );
    }

    #[test]
    fn test_error_display() {
        let err = GattError::InvalidAttributeLength {
            expected: 1,
            actual: 2,
        };
        assert_eq!(
            err.to_string(),
            "Invalid attribute length: expected 1, got 2"
        );

        let err: Error = InitError::ServerUnavailable(PlatformError::new(-1, "no manager")).into();
        assert_eq!(
            err.to_string(),
            "GATT server unavailable: Platform call failed (status -1): no manager"
        );
    }
}
