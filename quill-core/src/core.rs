//! Host-driven session: owns the identity, friend registry, event slots,
//! and the transport seam. The host calls operations and pumps `tick()`;
//! handlers run synchronously inside the tick that observed the event.

use crate::address::{Address, PublicKey};
use crate::event::EventDispatcher;
use crate::friend::{
    AddFriendError, FriendId, FriendNotFound, FriendRegistry, TooLong, UserStatus,
    MAX_MESSAGE_LENGTH, MAX_NAME_LENGTH, MAX_STATUS_MESSAGE_LENGTH,
};
use crate::identity::Identity;
use crate::transport::{BootstrapNode, OutboundCommand, Transport, TransportError, TransportEvent};

#[derive(Debug, Clone, Copy, Eq, PartialEq, thiserror::Error)]
pub enum SendError {
    #[error(transparent)]
    NotFound(#[from] FriendNotFound),
    #[error("message exceeds the message bound")]
    MessageTooLong,
    #[error("message is empty")]
    EmptyMessage,
}

/// The aggregate root. One registry, one set of event slots, one identity,
/// one transport. Exactly one logical owner may drive it; `&mut self` on
/// every mutating operation enforces the serialization the core assumes.
/// Dropping the session drops all friend records and handler slots.
pub struct QuillCore {
    identity: Identity,
    friends: FriendRegistry,
    events: EventDispatcher,
    transport: Box<dyn Transport>,
    next_message_id: u32,
    in_tick: bool,
}

impl QuillCore {
    pub fn new(transport: impl Transport + 'static) -> Self {
        Self::with_identity(Identity::generate(), transport)
    }

    pub fn with_identity(identity: Identity, transport: impl Transport + 'static) -> Self {
        log::debug!("session created ({})", identity.fingerprint());
        Self {
            identity,
            friends: FriendRegistry::new(),
            events: EventDispatcher::new(),
            transport: Box::new(transport),
            next_message_id: 1,
            in_tick: false,
        }
    }

    pub fn identity(&self) -> &Identity {
        &self.identity
    }

    /// Our published address: public key + nospam + checksum.
    pub fn address(&self) -> Address {
        self.identity.address()
    }

    pub fn public_key(&self) -> &PublicKey {
        self.identity.public_key()
    }

    pub fn set_nospam(&mut self, nospam: [u8; crate::address::NOSPAM_SIZE]) {
        self.identity.set_nospam(nospam);
    }

    /// Hand a known entry node to the transport. Failures are surfaced for
    /// the host's retry policy; the core never retries on its own.
    pub fn bootstrap(&mut self, node: &BootstrapNode) -> Result<(), TransportError> {
        self.transport.bootstrap(node)
    }

    pub fn is_connected(&self) -> bool {
        self.transport.is_connected()
    }

    /// One step of network processing: drain the transport and deliver
    /// events. Handlers run inside this call, in transport order, so two
    /// events for the same friend in one tick arrive FIFO. Handlers may
    /// call any session operation except `tick` itself.
    pub fn tick(&mut self) {
        assert!(!self.in_tick, "tick() called reentrantly from a handler");
        self.in_tick = true;
        let events = self.transport.poll();
        for event in events {
            self.apply_event(event);
        }
        self.in_tick = false;
    }

    fn apply_event(&mut self, event: TransportEvent) {
        match event {
            TransportEvent::FriendRequest {
                public_key,
                message,
            } => {
                if self.friends.resolve(&public_key).is_some() {
                    log::debug!("friend request from existing friend {public_key}, dropped");
                    return;
                }
                self.dispatch_friend_request(&public_key, &message);
            }
            TransportEvent::Message {
                public_key,
                message,
            } => {
                if let Some(id) = self.resolve_or_drop(&public_key) {
                    self.dispatch_friend_message(id, &message);
                }
            }
            TransportEvent::Action { public_key, action } => {
                if let Some(id) = self.resolve_or_drop(&public_key) {
                    self.dispatch_action(id, &action);
                }
            }
            TransportEvent::NameChange { public_key, name } => {
                if let Some(id) = self.resolve_or_drop(&public_key) {
                    let name = &name[..name.len().min(MAX_NAME_LENGTH)];
                    let _ = self.friends.set_friend_name(id, name);
                    self.dispatch_name_change(id, name);
                }
            }
            TransportEvent::StatusMessageChange {
                public_key,
                status_message,
            } => {
                if let Some(id) = self.resolve_or_drop(&public_key) {
                    let status =
                        &status_message[..status_message.len().min(MAX_STATUS_MESSAGE_LENGTH)];
                    let _ = self.friends.set_friend_status_message(id, status);
                    self.dispatch_status_message(id, status);
                }
            }
            TransportEvent::UserStatusChange { public_key, status } => {
                if let Some(id) = self.resolve_or_drop(&public_key) {
                    let status = UserStatus::from_wire(status);
                    let _ = self.friends.set_friend_user_status(id, status);
                    self.dispatch_user_status(id, status);
                }
            }
            TransportEvent::ReadReceipt {
                public_key,
                message_id,
            } => {
                if let Some(id) = self.resolve_or_drop(&public_key) {
                    self.dispatch_read_receipt(id, message_id);
                }
            }
            TransportEvent::ConnectionStatus { public_key, online } => {
                if let Some(id) = self.resolve_or_drop(&public_key) {
                    let _ = self.friends.set_friend_online(id, online);
                    self.dispatch_connection_status(id, online);
                }
            }
        }
    }

    fn resolve_or_drop(&self, public_key: &PublicKey) -> Option<FriendId> {
        let id = self.friends.resolve(public_key);
        if id.is_none() {
            log::debug!("dropping event for unknown key {public_key}");
        }
        id
    }

    // Dispatch helpers: take the slot so the handler can borrow the whole
    // session, then restore it unless the handler registered a replacement.

    fn dispatch_friend_request(&mut self, public_key: &PublicKey, message: &[u8]) {
        if let Some(mut handler) = self.events.friend_request.take() {
            handler(self, public_key, message);
            if self.events.friend_request.is_none() {
                self.events.friend_request = Some(handler);
            }
        }
    }

    fn dispatch_friend_message(&mut self, id: FriendId, message: &[u8]) {
        if let Some(mut handler) = self.events.friend_message.take() {
            handler(self, id, message);
            if self.events.friend_message.is_none() {
                self.events.friend_message = Some(handler);
            }
        }
    }

    fn dispatch_action(&mut self, id: FriendId, action: &[u8]) {
        if let Some(mut handler) = self.events.action.take() {
            handler(self, id, action);
            if self.events.action.is_none() {
                self.events.action = Some(handler);
            }
        }
    }

    fn dispatch_name_change(&mut self, id: FriendId, name: &[u8]) {
        if let Some(mut handler) = self.events.name_change.take() {
            handler(self, id, name);
            if self.events.name_change.is_none() {
                self.events.name_change = Some(handler);
            }
        }
    }

    fn dispatch_status_message(&mut self, id: FriendId, status_message: &[u8]) {
        if let Some(mut handler) = self.events.status_message.take() {
            handler(self, id, status_message);
            if self.events.status_message.is_none() {
                self.events.status_message = Some(handler);
            }
        }
    }

    fn dispatch_user_status(&mut self, id: FriendId, status: UserStatus) {
        if let Some(mut handler) = self.events.user_status.take() {
            handler(self, id, status);
            if self.events.user_status.is_none() {
                self.events.user_status = Some(handler);
            }
        }
    }

    fn dispatch_read_receipt(&mut self, id: FriendId, message_id: u32) {
        if let Some(mut handler) = self.events.read_receipt.take() {
            handler(self, id, message_id);
            if self.events.read_receipt.is_none() {
                self.events.read_receipt = Some(handler);
            }
        }
    }

    fn dispatch_connection_status(&mut self, id: FriendId, online: bool) {
        if let Some(mut handler) = self.events.connection_status.take() {
            handler(self, id, online);
            if self.events.connection_status.is_none() {
                self.events.connection_status = Some(handler);
            }
        }
    }

    // Handler registration, one slot per event kind.

    pub fn on_friend_request<F>(&mut self, handler: F)
    where
        F: FnMut(&mut QuillCore, &PublicKey, &[u8]) + 'static,
    {
        self.events.set_friend_request(Box::new(handler));
    }

    pub fn on_friend_message<F>(&mut self, handler: F)
    where
        F: FnMut(&mut QuillCore, FriendId, &[u8]) + 'static,
    {
        self.events.set_friend_message(Box::new(handler));
    }

    pub fn on_action<F>(&mut self, handler: F)
    where
        F: FnMut(&mut QuillCore, FriendId, &[u8]) + 'static,
    {
        self.events.set_action(Box::new(handler));
    }

    pub fn on_name_change<F>(&mut self, handler: F)
    where
        F: FnMut(&mut QuillCore, FriendId, &[u8]) + 'static,
    {
        self.events.set_name_change(Box::new(handler));
    }

    pub fn on_status_message<F>(&mut self, handler: F)
    where
        F: FnMut(&mut QuillCore, FriendId, &[u8]) + 'static,
    {
        self.events.set_status_message(Box::new(handler));
    }

    pub fn on_user_status<F>(&mut self, handler: F)
    where
        F: FnMut(&mut QuillCore, FriendId, UserStatus) + 'static,
    {
        self.events.set_user_status(Box::new(handler));
    }

    pub fn on_read_receipt<F>(&mut self, handler: F)
    where
        F: FnMut(&mut QuillCore, FriendId, u32) + 'static,
    {
        self.events.set_read_receipt(Box::new(handler));
    }

    pub fn on_connection_status<F>(&mut self, handler: F)
    where
        F: FnMut(&mut QuillCore, FriendId, bool) + 'static,
    {
        self.events.set_connection_status(Box::new(handler));
    }

    // Friend operations.

    /// Add a friend by full address, sending a request message.
    pub fn add_friend(
        &mut self,
        address: &Address,
        message: &[u8],
    ) -> Result<FriendId, AddFriendError> {
        if address.public_key() == *self.identity.public_key() {
            return Err(AddFriendError::OwnKey);
        }
        let id = self.friends.add_with_request(address, message)?;
        self.transport.send(OutboundCommand::FriendRequest {
            address: *address,
            message: message.to_vec(),
        });
        log::debug!("friend {id} added with request");
        Ok(id)
    }

    /// Add a friend by bare public key, without sending a request. Used to
    /// accept an inbound request or restore a persisted relationship.
    pub fn add_friend_norequest(
        &mut self,
        public_key: PublicKey,
    ) -> Result<FriendId, AddFriendError> {
        if public_key == *self.identity.public_key() {
            return Err(AddFriendError::OwnKey);
        }
        let id = self.friends.add_no_request(public_key)?;
        log::debug!("friend {id} added without request");
        Ok(id)
    }

    /// Delete a friend. The handle is invalid as soon as this returns;
    /// events already queued for it are dropped, not misdelivered.
    pub fn delete_friend(&mut self, id: FriendId) -> Result<(), FriendNotFound> {
        self.friends.remove(id)?;
        log::debug!("friend {id} deleted");
        Ok(())
    }

    /// Handle for a public key, if that key has a live friend record.
    pub fn friend_id(&self, public_key: &PublicKey) -> Option<FriendId> {
        self.friends.resolve(public_key)
    }

    pub fn friend_public_key(&self, id: FriendId) -> Result<PublicKey, FriendNotFound> {
        self.friends.get(id).map(|f| *f.public_key())
    }

    pub fn friend_name(&self, id: FriendId) -> Result<&[u8], FriendNotFound> {
        self.friends.get(id).map(|f| f.name())
    }

    pub fn friend_status_message(&self, id: FriendId) -> Result<&[u8], FriendNotFound> {
        self.friends.get(id).map(|f| f.status_message())
    }

    pub fn friend_user_status(&self, id: FriendId) -> Result<UserStatus, FriendNotFound> {
        self.friends.get(id).map(|f| f.user_status())
    }

    pub fn friend_online(&self, id: FriendId) -> Result<bool, FriendNotFound> {
        self.friends.get(id).map(|f| f.online())
    }

    pub fn friend_count(&self) -> usize {
        self.friends.len()
    }

    /// Read-only view of the registry.
    pub fn friends(&self) -> &FriendRegistry {
        &self.friends
    }

    // Messaging.

    /// Send a chat message. Returns the message id the peer will echo in
    /// its read receipt. Ids start at 1 and increase per session.
    pub fn send_message(&mut self, id: FriendId, message: &[u8]) -> Result<u32, SendError> {
        let public_key = *self.friends.get(id)?.public_key();
        validate_message(message)?;
        let message_id = self.next_message_id;
        self.next_message_id = self.next_message_id.wrapping_add(1);
        self.transport.send(OutboundCommand::Message {
            public_key,
            message_id,
            message: message.to_vec(),
        });
        Ok(message_id)
    }

    /// Send a chat message reusing a caller-chosen id, e.g. when resending
    /// an unacknowledged message. Does not advance the id counter.
    pub fn send_message_with_id(
        &mut self,
        id: FriendId,
        message_id: u32,
        message: &[u8],
    ) -> Result<u32, SendError> {
        let public_key = *self.friends.get(id)?.public_key();
        validate_message(message)?;
        self.transport.send(OutboundCommand::Message {
            public_key,
            message_id,
            message: message.to_vec(),
        });
        Ok(message_id)
    }

    /// Send an emote/action. Actions carry no id and get no receipt.
    pub fn send_action(&mut self, id: FriendId, action: &[u8]) -> Result<(), SendError> {
        let public_key = *self.friends.get(id)?.public_key();
        validate_message(action)?;
        self.transport.send(OutboundCommand::Action {
            public_key,
            action: action.to_vec(),
        });
        Ok(())
    }

    // Own profile. Setters announce the change to friends via the transport.

    pub fn set_name(&mut self, name: &[u8]) -> Result<(), TooLong> {
        self.friends.set_own_name(name)?;
        self.transport.send(OutboundCommand::NameUpdate {
            name: name.to_vec(),
        });
        Ok(())
    }

    pub fn name(&self) -> &[u8] {
        self.friends.own_name()
    }

    pub fn set_status_message(&mut self, status_message: &[u8]) -> Result<(), TooLong> {
        self.friends.set_own_status_message(status_message)?;
        self.transport.send(OutboundCommand::StatusMessageUpdate {
            status_message: status_message.to_vec(),
        });
        Ok(())
    }

    pub fn status_message(&self) -> &[u8] {
        self.friends.own_status_message()
    }

    pub fn set_user_status(&mut self, status: UserStatus) {
        self.friends.set_own_user_status(status);
        self.transport.send(OutboundCommand::UserStatusUpdate {
            status: status.to_wire(),
        });
    }

    pub fn user_status(&self) -> UserStatus {
        self.friends.own_user_status()
    }
}

fn validate_message(message: &[u8]) -> Result<(), SendError> {
    if message.is_empty() {
        return Err(SendError::EmptyMessage);
    }
    if message.len() > MAX_MESSAGE_LENGTH {
        return Err(SendError::MessageTooLong);
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::friend::MAX_FRIEND_REQUEST_LENGTH;
    use crate::transport::MemoryTransport;
    use std::cell::{Cell, RefCell};
    use std::rc::Rc;

    fn session() -> (QuillCore, MemoryTransport) {
        let transport = MemoryTransport::new();
        let core = QuillCore::new(transport.clone());
        (core, transport)
    }

    fn peer() -> Identity {
        Identity::generate()
    }

    #[test]
    fn address_roundtrips_through_codec() {
        let (core, _) = session();
        let addr = core.address();
        assert!(addr.checksum_valid());
        assert_eq!(Address::decode(&addr.encode()).unwrap(), addr);
    }

    #[test]
    fn add_friend_sends_request_and_resolves() {
        let (mut core, transport) = session();
        let friend = peer();
        let id = core.add_friend(&friend.address(), b"hi, it's me").unwrap();
        assert_eq!(id, FriendId(0));
        assert_eq!(core.friend_id(friend.public_key()), Some(id));
        assert_eq!(core.friend_public_key(id).unwrap(), *friend.public_key());

        let sent = transport.take_sent();
        assert_eq!(
            sent,
            vec![OutboundCommand::FriendRequest {
                address: friend.address(),
                message: b"hi, it's me".to_vec(),
            }]
        );
    }

    #[test]
    fn add_friend_rejects_duplicates_and_own_key() {
        let (mut core, _) = session();
        let friend = peer();
        core.add_friend(&friend.address(), b"hello").unwrap();
        assert_eq!(
            core.add_friend(&friend.address(), b"hello again"),
            Err(AddFriendError::AlreadyFriends)
        );
        assert_eq!(core.friend_count(), 1);

        assert_eq!(
            core.add_friend(&core.address(), b"me"),
            Err(AddFriendError::OwnKey)
        );
        assert_eq!(
            core.add_friend_norequest(*core.public_key()),
            Err(AddFriendError::OwnKey)
        );
    }

    #[test]
    fn add_friend_validates_request_payload() {
        let (mut core, transport) = session();
        assert_eq!(
            core.add_friend(&peer().address(), b""),
            Err(AddFriendError::EmptyMessage)
        );
        let long = vec![b'x'; MAX_FRIEND_REQUEST_LENGTH + 1];
        assert_eq!(
            core.add_friend(&peer().address(), &long),
            Err(AddFriendError::MessageTooLong)
        );
        assert!(transport.take_sent().is_empty());
    }

    #[test]
    fn add_friend_norequest_sends_nothing() {
        let (mut core, transport) = session();
        core.add_friend_norequest(*peer().public_key()).unwrap();
        assert!(transport.take_sent().is_empty());
    }

    #[test]
    fn deleted_handle_invalid_and_reused() {
        let (mut core, _) = session();
        let a = core.add_friend_norequest(*peer().public_key()).unwrap();
        let b = core.add_friend_norequest(*peer().public_key()).unwrap();
        core.delete_friend(a).unwrap();
        assert_eq!(core.delete_friend(a), Err(FriendNotFound(a)));
        assert!(core.friend_name(a).is_err());
        assert!(core.send_message(a, b"gone").is_err());

        let c = core.add_friend_norequest(*peer().public_key()).unwrap();
        assert_eq!(c, a);
        assert_ne!(c, b);
    }

    #[test]
    fn send_message_allocates_increasing_ids() {
        let (mut core, transport) = session();
        let friend = peer();
        let id = core.add_friend_norequest(*friend.public_key()).unwrap();

        assert_eq!(core.send_message(id, b"one").unwrap(), 1);
        assert_eq!(core.send_message_with_id(id, 77, b"retry").unwrap(), 77);
        assert_eq!(core.send_message(id, b"two").unwrap(), 2);

        let sent = transport.take_sent();
        assert_eq!(sent.len(), 3);
        assert_eq!(
            sent[0],
            OutboundCommand::Message {
                public_key: *friend.public_key(),
                message_id: 1,
                message: b"one".to_vec(),
            }
        );
    }

    #[test]
    fn send_message_validates_payload() {
        let (mut core, _) = session();
        let id = core.add_friend_norequest(*peer().public_key()).unwrap();
        assert_eq!(core.send_message(id, b""), Err(SendError::EmptyMessage));
        let long = vec![b'm'; MAX_MESSAGE_LENGTH + 1];
        assert_eq!(core.send_message(id, &long), Err(SendError::MessageTooLong));
    }

    #[test]
    fn set_name_announces_and_enforces_bound() {
        let (mut core, transport) = session();
        core.set_name(b"quill").unwrap();
        assert_eq!(core.name(), b"quill");
        assert_eq!(
            transport.take_sent(),
            vec![OutboundCommand::NameUpdate {
                name: b"quill".to_vec(),
            }]
        );

        let long = vec![b'q'; MAX_NAME_LENGTH + 1];
        assert!(core.set_name(&long).is_err());
        assert_eq!(core.name(), b"quill");
        assert!(transport.take_sent().is_empty());
    }

    #[test]
    fn set_user_status_announces_wire_value() {
        let (mut core, transport) = session();
        core.set_user_status(UserStatus::Busy);
        assert_eq!(core.user_status(), UserStatus::Busy);
        assert_eq!(
            transport.take_sent(),
            vec![OutboundCommand::UserStatusUpdate { status: 2 }]
        );
    }

    #[test]
    fn bootstrap_hands_node_to_transport() {
        let (mut core, transport) = session();
        assert!(!core.is_connected());
        let node = BootstrapNode {
            addr: "203.0.113.5:33445".parse().unwrap(),
            public_key: *peer().public_key(),
        };
        core.bootstrap(&node).unwrap();
        assert!(core.is_connected());
        assert_eq!(transport.bootstrapped(), vec![node]);
    }

    #[test]
    fn connection_then_name_change_scenario() {
        let (mut core, transport) = session();
        let friend = peer();
        let id = core.add_friend_norequest(*friend.public_key()).unwrap();
        assert_eq!(id, FriendId(0));

        let seen = Rc::new(Cell::new(None));
        let seen_in = seen.clone();
        core.on_connection_status(move |_, id, online| seen_in.set(Some((id, online))));

        transport
            .push_event(&TransportEvent::ConnectionStatus {
                public_key: *friend.public_key(),
                online: true,
            })
            .unwrap();
        core.tick();

        assert_eq!(seen.get(), Some((FriendId(0), true)));
        assert!(core.friend_online(id).unwrap());
        assert!(core.friend_name(id).unwrap().is_empty());

        transport
            .push_event(&TransportEvent::NameChange {
                public_key: *friend.public_key(),
                name: b"ferris".to_vec(),
            })
            .unwrap();
        core.tick();
        assert_eq!(core.friend_name(id).unwrap(), b"ferris");
    }

    #[test]
    fn messages_for_one_friend_arrive_fifo() {
        let (mut core, transport) = session();
        let friend = peer();
        core.add_friend_norequest(*friend.public_key()).unwrap();

        let log = Rc::new(RefCell::new(Vec::new()));
        let log_in = log.clone();
        core.on_friend_message(move |_, _, message| log_in.borrow_mut().push(message.to_vec()));

        for payload in [b"M1".as_slice(), b"M2".as_slice()] {
            transport
                .push_event(&TransportEvent::Message {
                    public_key: *friend.public_key(),
                    message: payload.to_vec(),
                })
                .unwrap();
        }
        core.tick();
        assert_eq!(*log.borrow(), vec![b"M1".to_vec(), b"M2".to_vec()]);
    }

    #[test]
    fn replaced_handler_fires_exactly_once() {
        let (mut core, transport) = session();
        let friend = peer();
        core.add_friend_norequest(*friend.public_key()).unwrap();

        let first = Rc::new(Cell::new(0u32));
        let second = Rc::new(Cell::new(0u32));
        let first_in = first.clone();
        core.on_friend_message(move |_, _, _| first_in.set(first_in.get() + 1));
        let second_in = second.clone();
        core.on_friend_message(move |_, _, _| second_in.set(second_in.get() + 1));

        transport
            .push_event(&TransportEvent::Message {
                public_key: *friend.public_key(),
                message: b"hello".to_vec(),
            })
            .unwrap();
        core.tick();
        assert_eq!(first.get(), 0);
        assert_eq!(second.get(), 1);
    }

    #[test]
    fn dispatch_without_handler_still_applies_state() {
        let (mut core, transport) = session();
        let friend = peer();
        let id = core.add_friend_norequest(*friend.public_key()).unwrap();
        transport
            .push_event(&TransportEvent::NameChange {
                public_key: *friend.public_key(),
                name: b"quiet".to_vec(),
            })
            .unwrap();
        core.tick();
        assert_eq!(core.friend_name(id).unwrap(), b"quiet");
    }

    #[test]
    fn handler_may_delete_friend_and_later_events_drop() {
        let (mut core, transport) = session();
        let friend = peer();
        core.add_friend_norequest(*friend.public_key()).unwrap();

        let calls = Rc::new(Cell::new(0u32));
        let calls_in = calls.clone();
        core.on_friend_message(move |core, id, _| {
            calls_in.set(calls_in.get() + 1);
            core.delete_friend(id).unwrap();
        });

        for payload in [b"M1".as_slice(), b"M2".as_slice()] {
            transport
                .push_event(&TransportEvent::Message {
                    public_key: *friend.public_key(),
                    message: payload.to_vec(),
                })
                .unwrap();
        }
        core.tick();
        assert_eq!(calls.get(), 1);
        assert_eq!(core.friend_count(), 0);
    }

    #[test]
    fn unknown_key_events_are_dropped() {
        let (mut core, transport) = session();
        let calls = Rc::new(Cell::new(0u32));
        let calls_in = calls.clone();
        core.on_friend_message(move |_, _, _| calls_in.set(calls_in.get() + 1));

        transport
            .push_event(&TransportEvent::Message {
                public_key: *peer().public_key(),
                message: b"stranger".to_vec(),
            })
            .unwrap();
        core.tick();
        assert_eq!(calls.get(), 0);
    }

    #[test]
    fn friend_request_from_existing_friend_dropped() {
        let (mut core, transport) = session();
        let friend = peer();
        core.add_friend_norequest(*friend.public_key()).unwrap();

        let calls = Rc::new(Cell::new(0u32));
        let calls_in = calls.clone();
        core.on_friend_request(move |_, _, _| calls_in.set(calls_in.get() + 1));

        transport
            .push_event(&TransportEvent::FriendRequest {
                public_key: *friend.public_key(),
                message: b"again?".to_vec(),
            })
            .unwrap();
        core.tick();
        assert_eq!(calls.get(), 0);
    }

    #[test]
    fn friend_request_handler_can_accept_inline() {
        let (mut core, transport) = session();
        let friend = peer();

        core.on_friend_request(move |core, public_key, message| {
            assert_eq!(message, b"let me in");
            core.add_friend_norequest(*public_key).unwrap();
        });

        transport
            .push_event(&TransportEvent::FriendRequest {
                public_key: *friend.public_key(),
                message: b"let me in".to_vec(),
            })
            .unwrap();
        core.tick();
        assert_eq!(core.friend_id(friend.public_key()), Some(FriendId(0)));
    }

    #[test]
    fn unrecognized_user_status_maps_to_invalid() {
        let (mut core, transport) = session();
        let friend = peer();
        let id = core.add_friend_norequest(*friend.public_key()).unwrap();

        let seen = Rc::new(Cell::new(None));
        let seen_in = seen.clone();
        core.on_user_status(move |_, _, status| seen_in.set(Some(status)));

        transport
            .push_event(&TransportEvent::UserStatusChange {
                public_key: *friend.public_key(),
                status: 9,
            })
            .unwrap();
        core.tick();
        assert_eq!(seen.get(), Some(UserStatus::Invalid));
        assert_eq!(core.friend_user_status(id).unwrap(), UserStatus::Invalid);
    }

    #[test]
    fn read_receipt_echoes_sent_id() {
        let (mut core, transport) = session();
        let friend = peer();
        let id = core.add_friend_norequest(*friend.public_key()).unwrap();
        let message_id = core.send_message(id, b"ping").unwrap();

        let seen = Rc::new(Cell::new(None));
        let seen_in = seen.clone();
        core.on_read_receipt(move |_, id, receipt| seen_in.set(Some((id, receipt))));

        transport
            .push_event(&TransportEvent::ReadReceipt {
                public_key: *friend.public_key(),
                message_id,
            })
            .unwrap();
        core.tick();
        assert_eq!(seen.get(), Some((id, message_id)));
    }

    #[test]
    fn action_and_status_message_events_dispatch() {
        let (mut core, transport) = session();
        let friend = peer();
        let id = core.add_friend_norequest(*friend.public_key()).unwrap();

        let actions = Rc::new(RefCell::new(Vec::new()));
        let actions_in = actions.clone();
        core.on_action(move |_, _, action| actions_in.borrow_mut().push(action.to_vec()));

        transport
            .push_event(&TransportEvent::Action {
                public_key: *friend.public_key(),
                action: b"waves".to_vec(),
            })
            .unwrap();
        transport
            .push_event(&TransportEvent::StatusMessageChange {
                public_key: *friend.public_key(),
                status_message: b"gone fishing".to_vec(),
            })
            .unwrap();
        core.tick();

        assert_eq!(*actions.borrow(), vec![b"waves".to_vec()]);
        assert_eq!(core.friend_status_message(id).unwrap(), b"gone fishing");
    }

    #[test]
    #[should_panic(expected = "reentrantly")]
    fn reentrant_tick_panics() {
        let (mut core, transport) = session();
        let friend = peer();
        core.add_friend_norequest(*friend.public_key()).unwrap();
        core.on_friend_message(|core, _, _| core.tick());

        transport
            .push_event(&TransportEvent::Message {
                public_key: *friend.public_key(),
                message: b"boom".to_vec(),
            })
            .unwrap();
        core.tick();
    }
}
