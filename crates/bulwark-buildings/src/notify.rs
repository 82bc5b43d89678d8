//! Outbound building notifications.
//!
//! Every notification is fire-and-forget: the subsystem hands an
//! [`Envelope`] to a [`NotificationSink`] and never waits for delivery.
//! [`Outbox`] is the queueing sink the server drains once per tick, encoding
//! each envelope with [`postcard`] behind a protocol version byte.

use bulwark_sim::{BuildingId, UnitId};
use bulwark_voxel::{BlockPos, Rotation};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::ledger::Resources;

/// Wire-protocol version prepended to every encoded envelope.
pub const PROTOCOL_VERSION: u8 = 1;

// ---------------------------------------------------------------------------
// Messages
// ---------------------------------------------------------------------------

/// Who an envelope is addressed to.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum Recipient {
    /// Every connected player.
    All,
    /// A single player.
    Player(String),
}

/// Building state change sent to observers.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Notification {
    /// A new building was accepted and registered.
    BuildingPlaced {
        /// Registry handle.
        id: BuildingId,
        /// Template name.
        name: String,
        /// Origin cell.
        origin: BlockPos,
        /// Orientation.
        rotation: Rotation,
        /// Owning player.
        owner: String,
        /// Workers assigned at placement.
        builders: Vec<UnitId>,
    },
    /// An existing building replayed to a late joiner.
    BuildingReplayed {
        /// Registry handle.
        id: BuildingId,
        /// Template name.
        name: String,
        /// Origin cell.
        origin: BlockPos,
        /// Orientation.
        rotation: Rotation,
        /// Owning player.
        owner: String,
    },
    /// Periodic construction progress.
    BuildingSynced {
        /// Registry handle.
        id: BuildingId,
        /// Origin cell.
        origin: BlockPos,
        /// Structural cells currently standing.
        blocks_placed: u32,
    },
    /// A placement was refused because the owner is short of resources.
    InsufficientResources {
        /// Requesting player.
        owner: String,
        /// Whether the food cost was covered.
        food: bool,
        /// Whether the wood cost was covered.
        wood: bool,
        /// Whether the ore cost was covered.
        ore: bool,
    },
    /// The owner cancelled a building.
    BuildingCancelled {
        /// Registry handle.
        id: BuildingId,
        /// Origin cell.
        origin: BlockPos,
        /// Resources credited back.
        refund: Resources,
    },
    /// A building left the registry after its destroy condition held.
    BuildingDestroyed {
        /// Registry handle.
        id: BuildingId,
        /// Origin cell.
        origin: BlockPos,
    },
}

/// An addressed notification.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Envelope {
    /// Destination.
    pub recipient: Recipient,
    /// Payload.
    pub notification: Notification,
}

// ---------------------------------------------------------------------------
// Sinks
// ---------------------------------------------------------------------------

/// Destination for outbound notifications.
pub trait NotificationSink {
    /// Queues one envelope.
    fn send(&mut self, envelope: Envelope);

    /// Addresses a notification to everybody.
    fn broadcast(&mut self, notification: Notification) {
        self.send(Envelope {
            recipient: Recipient::All,
            notification,
        });
    }

    /// Addresses a notification to one player.
    fn send_to(&mut self, player: &str, notification: Notification) {
        self.send(Envelope {
            recipient: Recipient::Player(player.to_string()),
            notification,
        });
    }
}

/// Errors from envelope encoding.
#[derive(Debug, Error)]
pub enum WireError {
    /// Postcard failed to encode or decode.
    #[error("postcard error: {0}")]
    Postcard(#[from] postcard::Error),
    /// The input was empty.
    #[error("empty message")]
    Empty,
    /// The leading byte named a protocol this build does not speak.
    #[error("protocol version mismatch: expected {expected}, got {got}")]
    VersionMismatch {
        /// Version this build speaks.
        expected: u8,
        /// Version found in the message.
        got: u8,
    },
}

/// Encodes an envelope as `[PROTOCOL_VERSION, postcard bytes...]`.
pub fn encode_envelope(envelope: &Envelope) -> Result<Vec<u8>, WireError> {
    let payload = postcard::to_allocvec(envelope)?;
    let mut out = Vec::with_capacity(payload.len() + 1);
    out.push(PROTOCOL_VERSION);
    out.extend_from_slice(&payload);
    Ok(out)
}

/// Decodes bytes produced by [`encode_envelope`].
pub fn decode_envelope(bytes: &[u8]) -> Result<Envelope, WireError> {
    let (&version, payload) = bytes.split_first().ok_or(WireError::Empty)?;
    if version != PROTOCOL_VERSION {
        return Err(WireError::VersionMismatch {
            expected: PROTOCOL_VERSION,
            got: version,
        });
    }
    Ok(postcard::from_bytes(payload)?)
}

/// Queueing sink drained by the server loop.
#[derive(Debug, Default)]
pub struct Outbox {
    pending: Vec<Envelope>,
}

impl Outbox {
    /// Creates an empty outbox.
    pub fn new() -> Self {
        Self::default()
    }

    /// Envelopes queued since the last drain.
    pub fn pending(&self) -> &[Envelope] {
        &self.pending
    }

    /// Number of queued envelopes.
    pub fn len(&self) -> usize {
        self.pending.len()
    }

    /// Returns `true` if nothing is queued.
    pub fn is_empty(&self) -> bool {
        self.pending.is_empty()
    }

    /// Takes every queued envelope.
    pub fn drain(&mut self) -> Vec<Envelope> {
        std::mem::take(&mut self.pending)
    }

    /// Takes and encodes every queued envelope, paired with its recipient.
    pub fn drain_encoded(&mut self) -> Result<Vec<(Recipient, Vec<u8>)>, WireError> {
        self.drain()
            .into_iter()
            .map(|env| {
                let bytes = encode_envelope(&env)?;
                Ok((env.recipient, bytes))
            })
            .collect()
    }
}

impl NotificationSink for Outbox {
    fn send(&mut self, envelope: Envelope) {
        self.pending.push(envelope);
    }
}
