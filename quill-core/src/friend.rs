//! Friend registry: handle allocation, identity resolution, per-friend
//! state, and the session's own profile.

use std::collections::HashMap;

use serde::{Deserialize, Serialize};

use crate::address::{Address, PublicKey};

/// Longest display name, in bytes.
pub const MAX_NAME_LENGTH: usize = 128;
/// Longest status message, in bytes.
pub const MAX_STATUS_MESSAGE_LENGTH: usize = 128;
/// Longest chat message or action payload, in bytes.
pub const MAX_MESSAGE_LENGTH: usize = 1368;
/// Longest friend-request message, in bytes.
pub const MAX_FRIEND_REQUEST_LENGTH: usize = 1016;

/// Session-local friend handle. Lowest free slot, reused only after the
/// prior holder is deleted. Never valid across sessions.
#[derive(Debug, Clone, Copy, Eq, PartialEq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct FriendId(pub u32);

impl std::fmt::Display for FriendId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Availability a peer advertises. `Invalid` covers wire values this
/// version does not recognize; they are surfaced, never dropped.
#[derive(Debug, Clone, Copy, Default, Eq, PartialEq, Hash, Serialize, Deserialize)]
pub enum UserStatus {
    #[default]
    None,
    Away,
    Busy,
    Invalid,
}

impl UserStatus {
    pub fn from_wire(value: u8) -> Self {
        match value {
            0 => UserStatus::None,
            1 => UserStatus::Away,
            2 => UserStatus::Busy,
            _ => UserStatus::Invalid,
        }
    }

    pub fn to_wire(self) -> u8 {
        match self {
            UserStatus::None => 0,
            UserStatus::Away => 1,
            UserStatus::Busy => 2,
            UserStatus::Invalid => 3,
        }
    }
}

/// Per-friend state. The registry is the single writer; hosts observe
/// through accessors or event callbacks.
#[derive(Debug, Clone)]
pub struct Friend {
    public_key: PublicKey,
    name: Vec<u8>,
    status_message: Vec<u8>,
    online: bool,
    user_status: UserStatus,
}

impl Friend {
    fn new(public_key: PublicKey) -> Self {
        Self {
            public_key,
            name: Vec::new(),
            status_message: Vec::new(),
            online: false,
            user_status: UserStatus::None,
        }
    }

    pub fn public_key(&self) -> &PublicKey {
        &self.public_key
    }

    pub fn name(&self) -> &[u8] {
        &self.name
    }

    pub fn status_message(&self) -> &[u8] {
        &self.status_message
    }

    pub fn online(&self) -> bool {
        self.online
    }

    pub fn user_status(&self) -> UserStatus {
        self.user_status
    }
}

#[derive(Debug, Clone, Copy, Eq, PartialEq, thiserror::Error)]
pub enum AddFriendError {
    #[error("address checksum mismatch")]
    AddressMalformed,
    #[error("cannot add own key as a friend")]
    OwnKey,
    #[error("a friend with this key already exists")]
    AlreadyFriends,
    #[error("request message exceeds the friend-request bound")]
    MessageTooLong,
    #[error("request message is empty")]
    EmptyMessage,
}

#[derive(Debug, Clone, Copy, Eq, PartialEq, thiserror::Error)]
#[error("no friend with handle {0}")]
pub struct FriendNotFound(pub FriendId);

#[derive(Debug, Clone, Copy, Eq, PartialEq, thiserror::Error)]
#[error("value of {len} bytes exceeds the {max}-byte bound")]
pub struct TooLong {
    pub len: usize,
    pub max: usize,
}

/// Owns all friend records and the session's own profile. Handles index
/// into a slot vector; deleting a friend frees its slot for reuse.
pub struct FriendRegistry {
    slots: Vec<Option<Friend>>,
    by_key: HashMap<PublicKey, FriendId>,
    own_name: Vec<u8>,
    own_status_message: Vec<u8>,
    own_user_status: UserStatus,
}

impl FriendRegistry {
    pub fn new() -> Self {
        Self {
            slots: Vec::new(),
            by_key: HashMap::new(),
            own_name: Vec::new(),
            own_status_message: Vec::new(),
            own_user_status: UserStatus::None,
        }
    }

    /// Add a friend from a full address, validating the request payload
    /// and checksum. The caller sends the request to the transport.
    pub fn add_with_request(
        &mut self,
        address: &Address,
        message: &[u8],
    ) -> Result<FriendId, AddFriendError> {
        if !address.checksum_valid() {
            return Err(AddFriendError::AddressMalformed);
        }
        if message.is_empty() {
            return Err(AddFriendError::EmptyMessage);
        }
        if message.len() > MAX_FRIEND_REQUEST_LENGTH {
            return Err(AddFriendError::MessageTooLong);
        }
        self.insert(address.public_key())
    }

    /// Add a friend from a bare public key, without a request message.
    /// Used for accepted requests and restored relationships.
    pub fn add_no_request(&mut self, public_key: PublicKey) -> Result<FriendId, AddFriendError> {
        self.insert(public_key)
    }

    fn insert(&mut self, public_key: PublicKey) -> Result<FriendId, AddFriendError> {
        if self.by_key.contains_key(&public_key) {
            return Err(AddFriendError::AlreadyFriends);
        }
        let slot = self.slots.iter().position(Option::is_none);
        let id = match slot {
            Some(i) => {
                self.slots[i] = Some(Friend::new(public_key));
                FriendId(i as u32)
            }
            None => {
                self.slots.push(Some(Friend::new(public_key)));
                FriendId((self.slots.len() - 1) as u32)
            }
        };
        self.by_key.insert(public_key, id);
        Ok(id)
    }

    /// Remove a friend. The handle is invalid immediately afterwards.
    pub fn remove(&mut self, id: FriendId) -> Result<(), FriendNotFound> {
        let friend = self
            .slots
            .get_mut(id.0 as usize)
            .and_then(Option::take)
            .ok_or(FriendNotFound(id))?;
        self.by_key.remove(friend.public_key());
        Ok(())
    }

    /// Handle for a public key, if that key has a live record.
    pub fn resolve(&self, public_key: &PublicKey) -> Option<FriendId> {
        self.by_key.get(public_key).copied()
    }

    pub fn get(&self, id: FriendId) -> Result<&Friend, FriendNotFound> {
        self.slots
            .get(id.0 as usize)
            .and_then(Option::as_ref)
            .ok_or(FriendNotFound(id))
    }

    fn get_mut(&mut self, id: FriendId) -> Result<&mut Friend, FriendNotFound> {
        self.slots
            .get_mut(id.0 as usize)
            .and_then(Option::as_mut)
            .ok_or(FriendNotFound(id))
    }

    /// Number of live friends.
    pub fn len(&self) -> usize {
        self.by_key.len()
    }

    pub fn is_empty(&self) -> bool {
        self.by_key.is_empty()
    }

    /// Live handles in ascending order.
    pub fn ids(&self) -> impl Iterator<Item = FriendId> + '_ {
        self.slots
            .iter()
            .enumerate()
            .filter(|(_, s)| s.is_some())
            .map(|(i, _)| FriendId(i as u32))
    }

    // Transport-driven mutations. Inbound names and status messages are
    // clamped to their bounds rather than rejected.

    pub fn set_friend_name(&mut self, id: FriendId, name: &[u8]) -> Result<(), FriendNotFound> {
        let friend = self.get_mut(id)?;
        friend.name = clamped(name, MAX_NAME_LENGTH).to_vec();
        Ok(())
    }

    pub fn set_friend_status_message(
        &mut self,
        id: FriendId,
        status_message: &[u8],
    ) -> Result<(), FriendNotFound> {
        let friend = self.get_mut(id)?;
        friend.status_message = clamped(status_message, MAX_STATUS_MESSAGE_LENGTH).to_vec();
        Ok(())
    }

    pub fn set_friend_user_status(
        &mut self,
        id: FriendId,
        status: UserStatus,
    ) -> Result<(), FriendNotFound> {
        self.get_mut(id)?.user_status = status;
        Ok(())
    }

    pub fn set_friend_online(&mut self, id: FriendId, online: bool) -> Result<(), FriendNotFound> {
        self.get_mut(id)?.online = online;
        Ok(())
    }

    // Own profile. Host-set values are rejected over the bound, not clamped.

    pub fn set_own_name(&mut self, name: &[u8]) -> Result<(), TooLong> {
        if name.len() > MAX_NAME_LENGTH {
            return Err(TooLong {
                len: name.len(),
                max: MAX_NAME_LENGTH,
            });
        }
        self.own_name = name.to_vec();
        Ok(())
    }

    pub fn own_name(&self) -> &[u8] {
        &self.own_name
    }

    pub fn set_own_status_message(&mut self, status_message: &[u8]) -> Result<(), TooLong> {
        if status_message.len() > MAX_STATUS_MESSAGE_LENGTH {
            return Err(TooLong {
                len: status_message.len(),
                max: MAX_STATUS_MESSAGE_LENGTH,
            });
        }
        self.own_status_message = status_message.to_vec();
        Ok(())
    }

    pub fn own_status_message(&self) -> &[u8] {
        &self.own_status_message
    }

    pub fn set_own_user_status(&mut self, status: UserStatus) {
        self.own_user_status = status;
    }

    pub fn own_user_status(&self) -> UserStatus {
        self.own_user_status
    }
}

impl Default for FriendRegistry {
    fn default() -> Self {
        Self::new()
    }
}

fn clamped(bytes: &[u8], max: usize) -> &[u8] {
    &bytes[..bytes.len().min(max)]
}
