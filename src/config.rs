//! Peripheral configuration.

use std::time::Duration;

/// Default advertised device name.
pub const DEFAULT_DEVICE_NAME: &str = "NXP_SLK";

/// Default bound on how long an advertising start may stay pending.
pub const DEFAULT_ADVERTISE_START_TIMEOUT: Duration = Duration::from_secs(10);

/// Default capacity of the observer event channel.
pub const DEFAULT_EVENT_CAPACITY: usize = 32;

/// Parameters passed to [`PeripheralService::initialize`](crate::PeripheralService::initialize).
///
/// Advertising radio settings are fixed by the service and are not part of
/// this configuration.
#[derive(Debug, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct PeripheralConfig {
    /// Local name set on the adapter and carried in the advertising payload.
    pub device_name: String,

    /// How long a start request may stay pending before it is treated as failed.
    ///
    /// `None` leaves a start that never completes pending indefinitely.
    pub advertise_start_timeout: Option<Duration>,

    /// Capacity of the broadcast channel used by
    /// [`ChannelObserver`](crate::observer::ChannelObserver).
    pub event_capacity: usize,
}

impl PeripheralConfig {
    /// Create a configuration with the default values.
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the advertised device name.
    pub fn with_device_name(mut self, name: impl Into<String>) -> Self {
        self.device_name = name.into();
        self
    }

    /// Set (or disable with `None`) the advertising start timeout.
    pub fn with_advertise_start_timeout(mut self, timeout: Option<Duration>) -> Self {
        self.advertise_start_timeout = timeout;
        self
    }

    /// Set the observer event channel capacity.
    pub fn with_event_capacity(mut self, capacity: usize) -> Self {
        self.event_capacity = capacity.max(1);
        self
    }
}

impl Default for PeripheralConfig {
    fn default() -> Self {
        Self {
            device_name: DEFAULT_DEVICE_NAME.to_string(),
            advertise_start_timeout: Some(DEFAULT_ADVERTISE_START_TIMEOUT),
            event_capacity: DEFAULT_EVENT_CAPACITY,
        }
    }
}
