//! Transport collaborator seam. The core does no I/O: a transport feeds
//! inbound events (keyed by public key) and carries outbound commands.

use std::cell::RefCell;
use std::net::SocketAddr;
use std::rc::Rc;

use serde::{Deserialize, Serialize};

use crate::address::{Address, PublicKey};
use crate::wire::{self, FrameDecodeError, FrameEncodeError};

/// Known entry point handed to the transport at bootstrap.
#[derive(Debug, Clone, Copy, Eq, PartialEq, Serialize, Deserialize)]
pub struct BootstrapNode {
    pub addr: SocketAddr,
    pub public_key: PublicKey,
}

/// Inbound event produced by the transport. Keyed by public key; the
/// session resolves keys to friend handles.
#[derive(Debug, Clone, Eq, PartialEq, Serialize, Deserialize)]
pub enum TransportEvent {
    /// Friend request from a key without a live friend record.
    FriendRequest {
        public_key: PublicKey,
        message: Vec<u8>,
    },
    /// Chat message from a friend.
    Message {
        public_key: PublicKey,
        message: Vec<u8>,
    },
    /// Emote/action from a friend.
    Action {
        public_key: PublicKey,
        action: Vec<u8>,
    },
    /// Friend changed display name.
    NameChange {
        public_key: PublicKey,
        name: Vec<u8>,
    },
    /// Friend changed status message.
    StatusMessageChange {
        public_key: PublicKey,
        status_message: Vec<u8>,
    },
    /// Friend changed availability. Raw wire value; the session maps
    /// unrecognized values to `UserStatus::Invalid`.
    UserStatusChange { public_key: PublicKey, status: u8 },
    /// Friend acknowledged a previously sent message.
    ReadReceipt {
        public_key: PublicKey,
        message_id: u32,
    },
    /// Friend reachability changed. `true` means reachable.
    ConnectionStatus { public_key: PublicKey, online: bool },
}

/// Outbound command the session hands to the transport.
#[derive(Debug, Clone, Eq, PartialEq, Serialize, Deserialize)]
pub enum OutboundCommand {
    /// Deliver a friend request to the given address.
    FriendRequest { address: Address, message: Vec<u8> },
    /// Deliver a chat message; the id comes back in a read receipt.
    Message {
        public_key: PublicKey,
        message_id: u32,
        message: Vec<u8>,
    },
    /// Deliver an emote/action.
    Action {
        public_key: PublicKey,
        action: Vec<u8>,
    },
    /// Announce our new display name to friends.
    NameUpdate { name: Vec<u8> },
    /// Announce our new status message to friends.
    StatusMessageUpdate { status_message: Vec<u8> },
    /// Announce our new availability to friends.
    UserStatusUpdate { status: u8 },
}

/// Bootstrap failure. Surfaced to the host; the core never retries.
#[derive(Debug, Clone, Eq, PartialEq, thiserror::Error)]
pub enum TransportError {
    #[error("invalid bootstrap node: {0}")]
    InvalidNode(String),
    #[error("node unreachable: {0}")]
    Unreachable(String),
}

/// What the core requires from its transport. Calls are expected to be
/// non-blocking or bounded; `poll` returns whatever arrived since the
/// last call, in arrival order.
pub trait Transport {
    fn bootstrap(&mut self, node: &BootstrapNode) -> Result<(), TransportError>;
    fn poll(&mut self) -> Vec<TransportEvent>;
    fn send(&mut self, command: OutboundCommand);
    fn is_connected(&self) -> bool;
}

/// In-memory loopback transport. Buffers inbound events as length-prefixed
/// frames the way a socket transport would, and records outbound commands.
/// Clones share the same buffers, so a test can keep a handle after moving
/// the transport into a session.
#[derive(Clone, Default)]
pub struct MemoryTransport {
    inner: Rc<RefCell<Inner>>,
}

#[derive(Default)]
struct Inner {
    inbound: Vec<u8>,
    sent: Vec<OutboundCommand>,
    bootstrapped: Vec<BootstrapNode>,
    connected: bool,
}

impl MemoryTransport {
    pub fn new() -> Self {
        Self::default()
    }

    /// Queue an inbound event for the next `poll`.
    pub fn push_event(&self, event: &TransportEvent) -> Result<(), FrameEncodeError> {
        let frame = wire::encode_frame(event)?;
        self.inner.borrow_mut().inbound.extend_from_slice(&frame);
        Ok(())
    }

    /// Commands sent so far, draining the record.
    pub fn take_sent(&self) -> Vec<OutboundCommand> {
        std::mem::take(&mut self.inner.borrow_mut().sent)
    }

    /// Nodes handed to `bootstrap` so far.
    pub fn bootstrapped(&self) -> Vec<BootstrapNode> {
        self.inner.borrow().bootstrapped.clone()
    }

    pub fn set_connected(&self, connected: bool) {
        self.inner.borrow_mut().connected = connected;
    }
}

impl Transport for MemoryTransport {
    fn bootstrap(&mut self, node: &BootstrapNode) -> Result<(), TransportError> {
        let mut inner = self.inner.borrow_mut();
        inner.bootstrapped.push(*node);
        inner.connected = true;
        Ok(())
    }

    fn poll(&mut self) -> Vec<TransportEvent> {
        let mut inner = self.inner.borrow_mut();
        let mut events = Vec::new();
        let mut off = 0;
        loop {
            match wire::decode_frame::<TransportEvent>(&inner.inbound[off..]) {
                Ok((event, n)) => {
                    events.push(event);
                    off += n;
                }
                Err(FrameDecodeError::NeedMore) => break,
                Err(err) => {
                    // Corrupt buffer: drop the remainder rather than loop.
                    log::warn!("dropping corrupt inbound buffer: {err}");
                    off = inner.inbound.len();
                    break;
                }
            }
        }
        inner.inbound.drain(..off);
        events
    }

    fn send(&mut self, command: OutboundCommand) {
        self.inner.borrow_mut().sent.push(command);
    }

    fn is_connected(&self) -> bool {
        self.inner.borrow().connected
    }
}
