use dashmap::DashMap;
use tokio::sync::broadcast;

use crate::model::{BlockEvent, VehicleId};

const CHANNEL_CAPACITY: usize = 256;

/// Per-vehicle broadcast of block changes, for live calendar views.
pub struct NotifyHub {
    channels: DashMap<VehicleId, broadcast::Sender<BlockEvent>>,
}

impl Default for NotifyHub {
    fn default() -> Self {
        Self::new()
    }
}

impl NotifyHub {
    pub fn new() -> Self {
        Self {
            channels: DashMap::new(),
        }
    }

    /// Subscribe to changes on one vehicle. Creates the channel if needed.
    pub fn subscribe(&self, vehicle_id: VehicleId) -> broadcast::Receiver<BlockEvent> {
        self.channels
            .entry(vehicle_id)
            .or_insert_with(|| broadcast::channel(CHANNEL_CAPACITY).0)
            .subscribe()
    }

    /// No-op if nobody is listening. Channels whose receivers are all gone are dropped.
    pub fn send(&self, event: &BlockEvent) {
        let vehicle_id = event.vehicle_id();
        let orphaned = match self.channels.get(&vehicle_id) {
            Some(sender) => sender.send(event.clone()).is_err(),
            None => false,
        };
        if orphaned {
            self.channels
                .remove_if(&vehicle_id, |_, sender| sender.receiver_count() == 0);
        }
    }

    pub fn channel_count(&self) -> usize {
        self.channels.len()
    }
}
