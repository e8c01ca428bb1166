//! Observer interface.
//!
//! Observers receive informational events from the peripheral. They have no
//! control over the core.

use std::sync::atomic::{AtomicU64, Ordering};
use tokio::sync::broadcast;
use tracing::debug;

use crate::ble::connection::{ConnectionState, PeerId};
use crate::config::PeripheralConfig;
use crate::error::{GattError, PlatformError};

/// Receives peripheral events. Every method defaults to doing nothing.
pub trait PeripheralObserver: Send + Sync {
    /// Advertising became active (`true`) or stopped/failed (`false`).
    fn on_advertise_changed(&self, _is_advertising: bool) {}

    /// A peer changed connection state.
    fn on_connection_state_change(&self, _peer: &PeerId, _state: ConnectionState) {}

    /// The actuator failed while serving a request.
    fn on_actuator_failure(&self, _error: &GattError) {}

    /// A status notification could not be delivered to a peer.
    fn on_notification_failed(&self, _peer: &PeerId, _error: &PlatformError) {}
}

/// Observer that ignores every event.
#[derive(Debug, Default, Clone, Copy)]
pub struct NoopObserver;

impl PeripheralObserver for NoopObserver {}

/// Event published by [`ChannelObserver`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PeripheralEvent {
    /// Advertising status changed.
    AdvertiseChanged(bool),
    /// A peer changed connection state.
    ConnectionChanged {
        /// The peer.
        peer: PeerId,
        /// Its new state.
        state: ConnectionState,
    },
    /// The actuator failed.
    ActuatorFailure(GattError),
    /// A notification could not be delivered.
    NotificationFailed {
        /// The peer that missed the notification.
        peer: PeerId,
        /// The platform error.
        error: PlatformError,
    },
}

/// Callback handle for unregistering callbacks.
pub struct CallbackHandle {
    id: u64,
    unregister_fn: Option<Box<dyn FnOnce() + Send + Sync>>,
}

impl CallbackHandle {
    pub(crate) fn new(id: u64, unregister_fn: impl FnOnce() + Send + Sync + 'static) -> Self {
        Self {
            id,
            unregister_fn: Some(Box::new(unregister_fn)),
        }
    }

    /// Unregister this callback.
    pub fn unregister(mut self) {
        if let Some(f) = self.unregister_fn.take() {
            f();
        }
    }

    /// Get the callback ID.
    pub fn id(&self) -> u64 {
        self.id
    }
}

impl Drop for CallbackHandle {
    fn drop(&mut self) {
        if let Some(f) = self.unregister_fn.take() {
            f();
        }
    }
}

/// Observer that republishes events on a broadcast channel.
pub struct ChannelObserver {
    event_tx: broadcast::Sender<PeripheralEvent>,
    callback_counter: AtomicU64,
}

impl ChannelObserver {
    /// Create an observer whose channel buffers up to `capacity` events per subscriber.
    pub fn new(capacity: usize) -> Self {
        let (event_tx, _) = broadcast::channel(capacity.max(1));
        Self {
            event_tx,
            callback_counter: AtomicU64::new(0),
        }
    }

    /// Create an observer sized by [`PeripheralConfig::event_capacity`].
    pub fn from_config(config: &PeripheralConfig) -> Self {
        Self::new(config.event_capacity)
    }

    /// Subscribe to peripheral events.
    pub fn subscribe(&self) -> broadcast::Receiver<PeripheralEvent> {
        self.event_tx.subscribe()
    }

    /// Register a callback for every event. Must be called inside a tokio runtime.
    pub fn on_event<F>(&self, callback: F) -> CallbackHandle
    where
        F: Fn(PeripheralEvent) + Send + Sync + 'static,
    {
        let callback_id = self.callback_counter.fetch_add(1, Ordering::SeqCst);
        let mut rx = self.event_tx.subscribe();

        let handle = tokio::spawn(async move {
            loop {
                match rx.recv().await {
                    Ok(event) => callback(event),
                    Err(broadcast::error::RecvError::Lagged(skipped)) => {
                        debug!("Event callback lagged, skipped {} events", skipped);
                    }
                    Err(broadcast::error::RecvError::Closed) => break,
                }
            }
        });

        CallbackHandle::new(callback_id, move || {
            handle.abort();
        })
    }

    fn publish(&self, event: PeripheralEvent) {
        // No subscribers is fine.
        let _ = self.event_tx.send(event);
    }
}

impl PeripheralObserver for ChannelObserver {
    fn on_advertise_changed(&self, is_advertising: bool) {
        self.publish(PeripheralEvent::AdvertiseChanged(is_advertising));
    }

    fn on_connection_state_change(&self, peer: &PeerId, state: ConnectionState) {
        self.publish(PeripheralEvent::ConnectionChanged {
            peer: peer.clone(),
            state,
        });
    }

    fn on_actuator_failure(&self, error: &GattError) {
        self.publish(PeripheralEvent::ActuatorFailure(error.clone()));
    }

    fn on_notification_failed(&self, peer: &PeerId, error: &PlatformError) {
        self.publish(PeripheralEvent::NotificationFailed {
            peer: peer.clone(),
            error: error.clone(),
        });
    }
}
