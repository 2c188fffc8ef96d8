//! # Flow Event Bus
//!
//! Notifications emitted by the engine for hosts that mirror cell state
//! (terrain sync, visuals, save dirtiness).
//!
//! ```text
//! ┌─────────────┐      ┌─────────────┐      ┌─────────────┐
//! │   Engine    │─────>│   Event     │─────>│    Host     │
//! │  (step)     │      │   Channel   │      │ (sync/draw) │
//! └─────────────┘      └─────────────┘      └─────────────┘
//! ```
//!
//! Uses bounded crossbeam channels. A full channel drops the event: the
//! simulation step never blocks on a slow consumer.

use crossbeam_channel::{bounded, Receiver, Sender, TrySendError};

use crate::math::{CellKey, LayerId};

/// Events that flow from the engine to its host.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum FlowEvent {
    /// Volume arrived at an empty position and a cell now exists there.
    CellCreated {
        /// The new cell.
        key: CellKey,
        /// Its initial volume.
        volume: u8,
    },

    /// A cell drained to zero and no longer exists.
    CellDestroyed {
        /// The removed cell.
        key: CellKey,
    },

    /// A live cell changed volume.
    VolumeChanged {
        /// The cell.
        key: CellKey,
        /// Volume before the change.
        old: u8,
        /// Volume after the change.
        new: u8,
    },

    /// A cell stopped being processed after repeated no-op attempts.
    CellStabilized {
        /// The cell.
        key: CellKey,
    },

    /// The active set exceeded the per-step budget for many steps in a row.
    Saturated {
        /// Layer with the largest backlog.
        layer: LayerId,
        /// Active cells across all layers.
        active: usize,
        /// Per-step cell budget.
        budget: usize,
        /// Consecutive saturated steps so far.
        consecutive_steps: u32,
    },
}

/// Event bus for engine → host communication.
pub struct EventBus {
    sender: Sender<FlowEvent>,
    receiver: Receiver<FlowEvent>,
}

impl EventBus {
    /// Creates a new event bus.
    ///
    /// # Arguments
    ///
    /// * `capacity` - Maximum events in flight before new ones are dropped.
    #[must_use]
    pub fn new(capacity: usize) -> Self {
        let (sender, receiver) = bounded(capacity);
        Self { sender, receiver }
    }

    /// Creates a sender handle.
    #[must_use]
    pub fn sender(&self) -> EventSender {
        EventSender {
            sender: self.sender.clone(),
        }
    }

    /// Creates a receiver handle.
    #[must_use]
    pub fn receiver(&self) -> EventReceiver {
        EventReceiver {
            receiver: self.receiver.clone(),
        }
    }

    /// Creates a new pair of sender and receiver.
    #[must_use]
    pub fn create_pair(capacity: usize) -> (EventSender, EventReceiver) {
        let bus = Self::new(capacity);
        (bus.sender(), bus.receiver())
    }
}

/// Handle for sending events.
#[derive(Clone)]
pub struct EventSender {
    sender: Sender<FlowEvent>,
}

impl EventSender {
    /// Sends an event without blocking.
    ///
    /// Returns `false` if the event was dropped (channel full or receiver gone).
    #[inline]
    pub fn send(&self, event: FlowEvent) -> bool {
        match self.sender.try_send(event) {
            Ok(()) => true,
            Err(TrySendError::Full(_) | TrySendError::Disconnected(_)) => false,
        }
    }
}

/// Handle for receiving events.
#[derive(Clone)]
pub struct EventReceiver {
    receiver: Receiver<FlowEvent>,
}

impl EventReceiver {
    /// Receives all pending events (non-blocking).
    #[inline]
    #[must_use]
    pub fn drain(&self) -> Vec<FlowEvent> {
        let mut events = Vec::with_capacity(self.receiver.len());
        while let Ok(event) = self.receiver.try_recv() {
            events.push(event);
        }
        events
    }

    /// Receives one event (non-blocking).
    #[inline]
    #[must_use]
    pub fn try_recv(&self) -> Option<FlowEvent> {
        self.receiver.try_recv().ok()
    }

    /// Returns the number of pending events.
    #[inline]
    #[must_use]
    pub fn pending_count(&self) -> usize {
        self.receiver.len()
    }

    /// Checks if there are pending events.
    #[inline]
    #[must_use]
    pub fn has_events(&self) -> bool {
        !self.receiver.is_empty()
    }
}
