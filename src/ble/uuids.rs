//! BLE Service and Characteristic UUIDs.
//!
//! Contains all UUID constants exposed by the smart lock service.

use uuid::Uuid;

/// Smart lock primary service UUID.
pub const SMART_LOCK_SERVICE_UUID: Uuid = Uuid::from_u128(0xbc84_6c60_701c_11e6_8a96_00059a3c7a00);
/// Lock control characteristic UUID (Write Without Response).
pub const LOCK_CONTROL_CHARACTERISTIC_UUID: Uuid =
    Uuid::from_u128(0xbc84_6c61_701c_11e6_8a96_00059a3c7a00);
/// Lock status characteristic UUID (Read, Notify).
pub const LOCK_STATUS_CHARACTERISTIC_UUID: Uuid =
    Uuid::from_u128(0xbc84_6c62_701c_11e6_8a96_00059a3c7a00);

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_uuid_format() {
        assert_eq!(
            SMART_LOCK_SERVICE_UUID.to_string(),
            "bc846c60-701c-11e6-8a96-00059a3c7a00"
        );
        assert_eq!(
            LOCK_CONTROL_CHARACTERISTIC_UUID.to_string(),
            "bc846c61-701c-11e6-8a96-00059a3c7a00"
        );
        assert_eq!(
            LOCK_STATUS_CHARACTERISTIC_UUID.to_string(),
            "bc846c62-701c-11e6-8a96-00059a3c7a00"
        );
    }
}
