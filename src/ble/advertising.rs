//! Advertising state machine.
//!
//! Owns the advertise start/stop lifecycle and the fixed advertising policy of
//! the lock service. Start is asynchronous: the platform reports the outcome
//! later through [`AdvertisingController::on_start_result`]. Stop is applied to
//! the state machine immediately.

use parking_lot::Mutex;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::ble::platform::{Advertiser, RadioAdapter};
use crate::ble::uuids::SMART_LOCK_SERVICE_UUID;
use crate::error::{AdvertiseError, PlatformError};
use crate::observer::PeripheralObserver;

/// Advertising lifecycle state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum AdvertisingState {
    /// Not advertising.
    #[default]
    Idle,
    /// Start requested, outcome pending.
    Starting,
    /// Advertising.
    Advertising,
    /// The last start attempt failed or timed out.
    FailedToStart,
}

impl AdvertisingState {
    /// Check if a new start may be issued from this state.
    pub fn can_start(&self) -> bool {
        matches!(self, Self::Idle | Self::FailedToStart)
    }
}

impl std::fmt::Display for AdvertisingState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Idle => write!(f, "Idle"),
            Self::Starting => write!(f, "Starting"),
            Self::Advertising => write!(f, "Advertising"),
            Self::FailedToStart => write!(f, "FailedToStart"),
        }
    }
}

/// Advertising interval policy.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum AdvertiseMode {
    /// Longest interval, lowest power.
    LowPower,
    /// Balance between latency and power.
    Balanced,
    /// Shortest interval.
    LowLatency,
}

/// Advertising transmit power.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum TxPowerLevel {
    /// Ultra low power.
    UltraLow,
    /// Low power.
    Low,
    /// Medium power.
    Medium,
    /// High power.
    High,
}

/// Radio settings for advertising.
#[derive(Debug, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct AdvertiseSettings {
    /// Interval policy.
    pub mode: AdvertiseMode,
    /// Transmit power.
    pub tx_power: TxPowerLevel,
    /// Whether centrals may connect.
    pub connectable: bool,
}

impl AdvertiseSettings {
    /// The lock service's advertising settings: low latency, high power, connectable.
    pub fn lock_service() -> Self {
        Self {
            mode: AdvertiseMode::LowLatency,
            tx_power: TxPowerLevel::High,
            connectable: true,
        }
    }
}

/// Advertising payload.
#[derive(Debug, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct AdvertiseData {
    /// Local name the adapter advertises.
    pub local_name: String,
    /// Whether the local name is carried in the payload.
    pub include_device_name: bool,
    /// Whether the TX power level field is carried in the payload.
    pub include_tx_power_level: bool,
    /// Service UUIDs carried in the payload.
    pub service_uuids: Vec<Uuid>,
}

impl AdvertiseData {
    /// The lock service's payload: device name and service UUID, no TX power field.
    pub fn lock_service(local_name: impl Into<String>) -> Self {
        Self {
            local_name: local_name.into(),
            include_device_name: true,
            include_tx_power_level: false,
            service_uuids: vec![SMART_LOCK_SERVICE_UUID],
        }
    }
}

struct ControllerState {
    state: AdvertisingState,
    /// Incremented on every start so a late timeout cannot fail a newer attempt.
    attempt: u64,
    advertiser: Option<Arc<dyn Advertiser>>,
}

/// Drives the advertising state machine.
pub struct AdvertisingController {
    adapter: Arc<dyn RadioAdapter>,
    settings: AdvertiseSettings,
    data: AdvertiseData,
    inner: Arc<Mutex<ControllerState>>,
    observer: Arc<dyn PeripheralObserver>,
    start_timeout: Option<Duration>,
}

impl AdvertisingController {
    /// Create a controller advertising `local_name` through `adapter`.
    pub fn new(
        adapter: Arc<dyn RadioAdapter>,
        local_name: impl Into<String>,
        observer: Arc<dyn PeripheralObserver>,
        start_timeout: Option<Duration>,
    ) -> Self {
        Self {
            adapter,
            settings: AdvertiseSettings::lock_service(),
            data: AdvertiseData::lock_service(local_name),
            inner: Arc::new(Mutex::new(ControllerState {
                state: AdvertisingState::Idle,
                attempt: 0,
                advertiser: None,
            })),
            observer,
            start_timeout,
        }
    }

    /// Current state.
    pub fn state(&self) -> AdvertisingState {
        self.inner.lock().state
    }

    /// Check if advertising is active.
    pub fn is_advertising(&self) -> bool {
        self.state() == AdvertisingState::Advertising
    }

    /// The advertising settings in use.
    pub fn settings(&self) -> &AdvertiseSettings {
        &self.settings
    }

    /// The advertising payload in use.
    pub fn data(&self) -> &AdvertiseData {
        &self.data
    }

    /// Issue an advertise request.
    ///
    /// Fails with [`AdvertiseError::AlreadyAdvertising`] while a start is pending
    /// or advertising is active, leaving the state untouched. If the platform
    /// refuses the request outright the controller moves to
    /// [`AdvertisingState::FailedToStart`], the observer is told, and
    /// [`AdvertiseError::PlatformRejected`] is returned.
    pub fn start(&self) -> Result<(), AdvertiseError> {
        let (advertiser, attempt) = {
            let mut inner = self.inner.lock();
            if !inner.state.can_start() {
                debug!("Advertising start ignored in state {}", inner.state);
                return Err(AdvertiseError::AlreadyAdvertising);
            }

            let Some(advertiser) = self.adapter.advertiser() else {
                warn!("Failed to get LE advertiser");
                inner.state = AdvertisingState::FailedToStart;
                drop(inner);
                self.observer.on_advertise_changed(false);
                return Err(AdvertiseError::PlatformRejected {
                    reason: "no LE advertiser available".to_string(),
                });
            };

            inner.state = AdvertisingState::Starting;
            inner.attempt += 1;
            inner.advertiser = Some(advertiser.clone());
            (advertiser, inner.attempt)
        };

        info!("Starting advertising as {:?}", self.data.local_name);

        // The platform may report the outcome from inside this call, so the
        // state lock must not be held here.
        if let Err(e) = advertiser.start_advertising(&self.settings, &self.data) {
            warn!("Advertise request rejected: {}", e);
            let failed = {
                let mut inner = self.inner.lock();
                if inner.state == AdvertisingState::Starting && inner.attempt == attempt {
                    inner.state = AdvertisingState::FailedToStart;
                    inner.advertiser = None;
                    true
                } else {
                    false
                }
            };
            if failed {
                self.observer.on_advertise_changed(false);
            }
            return Err(AdvertiseError::PlatformRejected { reason: e.reason });
        }

        self.arm_start_timeout(attempt);
        Ok(())
    }

    /// Apply the platform's asynchronous start outcome.
    ///
    /// Outcomes arriving when no start is pending (after a stop or a timeout)
    /// are ignored.
    pub fn on_start_result(&self, result: std::result::Result<(), PlatformError>) {
        let is_advertising = {
            let mut inner = self.inner.lock();
            if inner.state != AdvertisingState::Starting {
                debug!("Ignoring advertise result in state {}", inner.state);
                return;
            }

            match &result {
                Ok(()) => {
                    info!("Advertising started");
                    inner.state = AdvertisingState::Advertising;
                }
                Err(e) => {
                    warn!("Advertising failed to start: {}", e);
                    inner.state = AdvertisingState::FailedToStart;
                    inner.advertiser = None;
                }
            }
            result.is_ok()
        };

        self.observer.on_advertise_changed(is_advertising);
    }

    /// Stop advertising. No-op when idle.
    pub fn stop(&self) {
        let (advertiser, was_advertising) = {
            let mut inner = self.inner.lock();
            if inner.state == AdvertisingState::Idle {
                return;
            }

            let was_advertising = inner.state == AdvertisingState::Advertising;
            inner.state = AdvertisingState::Idle;
            (inner.advertiser.take(), was_advertising)
        };

        info!("Stopping advertising");
        if let Some(advertiser) = advertiser {
            advertiser.stop_advertising();
        }

        if was_advertising {
            self.observer.on_advertise_changed(false);
        }
    }

    fn arm_start_timeout(&self, attempt: u64) {
        let Some(timeout) = self.start_timeout else {
            return;
        };

        let runtime = match tokio::runtime::Handle::try_current() {
            Ok(runtime) => runtime,
            Err(_) => {
                warn!("No tokio runtime, advertising start timeout disabled");
                return;
            }
        };

        let inner = self.inner.clone();
        let observer = self.observer.clone();
        runtime.spawn(async move {
            tokio::time::sleep(timeout).await;
            Self::expire_start(&inner, observer.as_ref(), attempt, timeout);
        });
    }

    fn expire_start(
        inner: &Mutex<ControllerState>,
        observer: &dyn PeripheralObserver,
        attempt: u64,
        timeout: Duration,
    ) {
        let advertiser = {
            let mut inner = inner.lock();
            if inner.state != AdvertisingState::Starting || inner.attempt != attempt {
                return;
            }
            inner.state = AdvertisingState::FailedToStart;
            inner.advertiser.take()
        };

        warn!("Advertising start timed out after {:?}", timeout);
        if let Some(advertiser) = advertiser {
            advertiser.stop_advertising();
        }
        observer.on_advertise_changed(false);
    }
}
