//! Quill messaging core: addresses, friend lifecycle, event dispatch.
//! Host-driven: no I/O; a transport collaborator feeds inbound events and
//! carries outbound commands, and the host pumps `tick()`.

pub mod address;
pub mod core;
pub mod event;
pub mod friend;
pub mod identity;
pub mod transport;
pub mod wire;

pub use crate::address::{
    Address, AddressParseError, PublicKey, ADDRESS_HEX_LEN, ADDRESS_SIZE, CHECKSUM_SIZE,
    NOSPAM_SIZE, PUBLIC_KEY_SIZE,
};
pub use crate::core::{QuillCore, SendError};
pub use crate::event::EventDispatcher;
pub use crate::friend::{
    AddFriendError, Friend, FriendId, FriendNotFound, FriendRegistry, TooLong, UserStatus,
    MAX_FRIEND_REQUEST_LENGTH, MAX_MESSAGE_LENGTH, MAX_NAME_LENGTH, MAX_STATUS_MESSAGE_LENGTH,
};
pub use crate::identity::Identity;
pub use crate::transport::{
    BootstrapNode, MemoryTransport, OutboundCommand, Transport, TransportError, TransportEvent,
};
pub use crate::wire::{decode_frame, encode_frame, FrameDecodeError, FrameEncodeError};
