//! Per-event-kind handler slots. Each kind holds at most one handler;
//! registering a new one drops the previous. Dispatch with an empty slot
//! is a silent no-op. All slots are dropped with the owning session.

use crate::address::PublicKey;
use crate::core::QuillCore;
use crate::friend::{FriendId, UserStatus};

/// Inbound friend request: requester key and request message.
pub type FriendRequestHandler = Box<dyn FnMut(&mut QuillCore, &PublicKey, &[u8])>;
/// Inbound chat message.
pub type FriendMessageHandler = Box<dyn FnMut(&mut QuillCore, FriendId, &[u8])>;
/// Inbound emote/action.
pub type ActionHandler = Box<dyn FnMut(&mut QuillCore, FriendId, &[u8])>;
/// Friend changed display name.
pub type NameChangeHandler = Box<dyn FnMut(&mut QuillCore, FriendId, &[u8])>;
/// Friend changed status message.
pub type StatusMessageHandler = Box<dyn FnMut(&mut QuillCore, FriendId, &[u8])>;
/// Friend changed availability.
pub type UserStatusHandler = Box<dyn FnMut(&mut QuillCore, FriendId, UserStatus)>;
/// Friend acknowledged a sent message by id.
pub type ReadReceiptHandler = Box<dyn FnMut(&mut QuillCore, FriendId, u32)>;
/// Friend reachability changed; `true` means reachable.
pub type ConnectionStatusHandler = Box<dyn FnMut(&mut QuillCore, FriendId, bool)>;

#[derive(Default)]
pub struct EventDispatcher {
    pub(crate) friend_request: Option<FriendRequestHandler>,
    pub(crate) friend_message: Option<FriendMessageHandler>,
    pub(crate) action: Option<ActionHandler>,
    pub(crate) name_change: Option<NameChangeHandler>,
    pub(crate) status_message: Option<StatusMessageHandler>,
    pub(crate) user_status: Option<UserStatusHandler>,
    pub(crate) read_receipt: Option<ReadReceiptHandler>,
    pub(crate) connection_status: Option<ConnectionStatusHandler>,
}

impl EventDispatcher {
    pub fn new() -> Self {
        Self::default()
    }

    // Registration replaces the slot; the assignment drops the old box.

    pub fn set_friend_request(&mut self, handler: FriendRequestHandler) {
        self.friend_request = Some(handler);
    }

    pub fn set_friend_message(&mut self, handler: FriendMessageHandler) {
        self.friend_message = Some(handler);
    }

    pub fn set_action(&mut self, handler: ActionHandler) {
        self.action = Some(handler);
    }

    pub fn set_name_change(&mut self, handler: NameChangeHandler) {
        self.name_change = Some(handler);
    }

    pub fn set_status_message(&mut self, handler: StatusMessageHandler) {
        self.status_message = Some(handler);
    }

    pub fn set_user_status(&mut self, handler: UserStatusHandler) {
        self.user_status = Some(handler);
    }

    pub fn set_read_receipt(&mut self, handler: ReadReceiptHandler) {
        self.read_receipt = Some(handler);
    }

    pub fn set_connection_status(&mut self, handler: ConnectionStatusHandler) {
        self.connection_status = Some(handler);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::cell::Cell;
    use std::rc::Rc;

    // Sets a flag when the captured value is dropped.
    struct DropFlag(Rc<Cell<bool>>);

    impl Drop for DropFlag {
        fn drop(&mut self) {
            self.0.set(true);
        }
    }

    #[test]
    fn registration_replaces_and_drops_prior_handler() {
        let dropped = Rc::new(Cell::new(false));
        let flag = DropFlag(dropped.clone());

        let mut events = EventDispatcher::new();
        events.set_friend_message(Box::new(move |_, _, _| {
            let _ = &flag;
        }));
        assert!(!dropped.get());

        events.set_friend_message(Box::new(|_, _, _| {}));
        assert!(dropped.get());
    }

    #[test]
    fn teardown_drops_all_slots() {
        let dropped = Rc::new(Cell::new(false));
        let flag = DropFlag(dropped.clone());

        let mut events = EventDispatcher::new();
        events.set_connection_status(Box::new(move |_, _, _| {
            let _ = &flag;
        }));
        drop(events);
        assert!(dropped.get());
    }
}
