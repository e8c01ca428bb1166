//! Status notification fan-out.

use std::sync::Arc;
use tracing::{debug, trace, warn};
use uuid::Uuid;

use crate::ble::connection::{ConnectionRegistry, PeerId};
use crate::ble::platform::GattServer;
use crate::observer::PeripheralObserver;

/// Outcome of one fan-out.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct FanoutReport {
    /// Peers the notification was handed to.
    pub delivered: Vec<PeerId>,
    /// Peers the platform refused to notify.
    pub failed: Vec<PeerId>,
    /// Peers that disconnected between the snapshot and the send.
    pub skipped: Vec<PeerId>,
}

impl FanoutReport {
    /// Check if every peer in the snapshot was notified.
    pub fn is_complete(&self) -> bool {
        self.failed.is_empty() && self.skipped.is_empty()
    }
}

/// Pushes status changes to every connected peer.
///
/// Delivery is best effort: a failure for one peer is reported and the
/// remaining peers are still notified.
pub struct NotificationFanout {
    registry: Arc<ConnectionRegistry>,
    server: Arc<dyn GattServer>,
    observer: Arc<dyn PeripheralObserver>,
    characteristic: Uuid,
}

impl NotificationFanout {
    /// Create a fan-out notifying `characteristic` through `server`.
    pub fn new(
        registry: Arc<ConnectionRegistry>,
        server: Arc<dyn GattServer>,
        observer: Arc<dyn PeripheralObserver>,
        characteristic: Uuid,
    ) -> Self {
        Self {
            registry,
            server,
            observer,
            characteristic,
        }
    }

    /// Notify every peer in the current registry snapshot with `status_byte`.
    ///
    /// Each send happens only while the peer is still registered, so a peer
    /// whose disconnect has been observed is never notified. Peers connecting
    /// after the snapshot are not notified.
    pub fn notify_all(&self, status_byte: u8) -> FanoutReport {
        self.deliver(self.registry.snapshot(), status_byte)
    }

    /// Notify each peer of `peers` that is still registered at send time.
    pub(crate) fn deliver(&self, peers: Vec<PeerId>, status_byte: u8) -> FanoutReport {
        let mut report = FanoutReport::default();
        let value = [status_byte];

        debug!(
            "Notifying {} peer(s) of status {:#04x}",
            peers.len(),
            status_byte
        );

        for peer in peers {
            let sent = self.registry.with_connected(&peer, || {
                self.server
                    .notify_characteristic_changed(&peer, self.characteristic, &value)
            });

            match sent {
                Some(Ok(())) => {
                    trace!("Sent notification to {}", peer);
                    report.delivered.push(peer);
                }
                Some(Err(e)) => {
                    warn!("Failed to notify {}: {}", peer, e);
                    self.observer.on_notification_failed(&peer, &e);
                    report.failed.push(peer);
                }
                None => {
                    debug!("Peer {} disconnected before notification", peer);
                    report.skipped.push(peer);
                }
            }
        }

        report
    }
}
