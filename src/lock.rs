//! Lock state and the actuator port.
//!
//! The lock is a two-state actuator. Its state travels over the air as a
//! single byte: `0` means locked, any other value means unlocked.

use crate::error::ActuatorError;

/// State of the lock actuator.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum LockState {
    /// The bolt is engaged.
    #[default]
    Locked,
    /// The bolt is released.
    Unlocked,
}

impl LockState {
    /// Decode a wire byte. Any nonzero value normalizes to [`LockState::Unlocked`].
    pub fn from_byte(value: u8) -> Self {
        if value == 0 {
            Self::Locked
        } else {
            Self::Unlocked
        }
    }

    /// Canonical wire encoding.
    pub fn to_byte(self) -> u8 {
        match self {
            Self::Locked => 0,
            Self::Unlocked => 1,
        }
    }

    /// Check if locked.
    pub fn is_locked(&self) -> bool {
        matches!(self, Self::Locked)
    }
}

impl From<u8> for LockState {
    fn from(value: u8) -> Self {
        Self::from_byte(value)
    }
}

impl From<LockState> for u8 {
    fn from(state: LockState) -> Self {
        state.to_byte()
    }
}

impl std::fmt::Display for LockState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Locked => write!(f, "Locked"),
            Self::Unlocked => write!(f, "Unlocked"),
        }
    }
}

/// Synchronous access to the physical lock.
///
/// Implementations wrap the digital output lines driving the bolt. Both calls
/// run on the radio stack's callback path, so they must return promptly and
/// report failure instead of blocking. A failed `write` must leave the lock in
/// its previous state.
#[cfg_attr(test, mockall::automock)]
pub trait ActuatorPort: Send + Sync {
    /// Current state of the lock.
    fn read(&self) -> Result<LockState, ActuatorError>;

    /// Drive the lock into `state`.
    fn write(&self, state: LockState) -> Result<(), ActuatorError>;
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn test_lock_state_encoding() {
        assert_eq!(LockState::Locked.to_byte(), 0);
        assert_eq!(LockState::Unlocked.to_byte(), 1);
        assert_eq!(LockState::from_byte(0), LockState::Locked);
        assert_eq!(LockState::from_byte(1), LockState::Unlocked);
        assert_eq!(LockState::from_byte(0xFF), LockState::Unlocked);
    }

    #[test]
    fn test_lock_state_default_is_locked() {
        assert_eq!(LockState::default(), LockState::Locked);
        assert!(LockState::default().is_locked());
    }

    #[test]
    fn test_lock_state_display() {
        assert_eq!(format!("{}", LockState::Locked), "Locked");
        assert_eq!(format!("{}", LockState::Unlocked), "Unlocked");
    }

    proptest! {
        #[test]
        fn decode_is_locked_iff_zero(value in any::<u8>()) {
            prop_assert_eq!(LockState::from_byte(value).is_locked(), value == 0);
        }

        #[test]
        fn reencoding_is_normalized(value in any::<u8>()) {
            let encoded = LockState::from_byte(value).to_byte();
            prop_assert!(encoded == 0 || encoded == 1);
            prop_assert_eq!(LockState::from_byte(encoded).to_byte(), encoded);
        }
    }
}
