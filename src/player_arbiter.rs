//! Session-wide single-active-player arbiter.
//!
//! Exactly one attached instance may occupy the active slot. Input dispatch and
//! UI projection for an instance are only permitted while it holds the slot.

use std::cell::{Cell, RefCell};
use std::collections::HashSet;
use std::fmt;

use log::{debug, warn};
use tokio::sync::broadcast::Sender;
use uuid::Uuid;

use crate::protocol::{ArbiterMessage, Message};

/// Identity of one attached player instance.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct PlayerId(Uuid);

impl PlayerId {
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for PlayerId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for PlayerId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        // Short form keeps log lines readable.
        let full = self.0.simple().to_string();
        f.write_str(&full[..8])
    }
}

/// Tracks the active slot and the set of recognized instances.
pub struct PlayerArbiter {
    bus_sender: Sender<Message>,
    active: Cell<Option<PlayerId>>,
    registered: RefCell<HashSet<PlayerId>>,
}

impl PlayerArbiter {
    pub fn new(bus_sender: Sender<Message>) -> Self {
        Self {
            bus_sender,
            active: Cell::new(None),
            registered: RefCell::new(HashSet::new()),
        }
    }

    pub fn register(&self, id: PlayerId) {
        self.registered.borrow_mut().insert(id);
    }

    /// Forgets `id`, releasing the active slot if it holds it.
    pub fn unregister(&self, id: PlayerId) {
        self.release_active_player(id);
        self.registered.borrow_mut().remove(&id);
    }

    pub fn is_registered(&self, id: PlayerId) -> bool {
        self.registered.borrow().contains(&id)
    }

    /// Moves `id` into the active slot. Unknown ids are rejected without mutation.
    pub fn set_active_player(&self, id: PlayerId) -> bool {
        if !self.is_registered(id) {
            warn!("PlayerArbiter: rejected unknown player {}", id);
            return false;
        }
        if self.active.get() == Some(id) {
            return true;
        }
        self.active.set(Some(id));
        debug!("PlayerArbiter: active player is now {}", id);
        self.emit(ArbiterMessage::ActivePlayerChanged(id));
        true
    }

    pub fn get_active_player(&self) -> Option<PlayerId> {
        self.active.get()
    }

    pub fn is_active(&self, id: PlayerId) -> bool {
        self.active.get() == Some(id)
    }

    pub fn clear_active_player(&self) {
        self.active.set(None);
        debug!("PlayerArbiter: active slot cleared");
        self.emit(ArbiterMessage::ActivePlayerCleared);
    }

    /// Clears the slot only when `id` occupies it.
    pub fn release_active_player(&self, id: PlayerId) -> bool {
        if !self.is_active(id) {
            return false;
        }
        self.clear_active_player();
        true
    }

    fn emit(&self, message: ArbiterMessage) {
        let _ = self.bus_sender.send(Message::Arbiter(message));
    }
}

#[cfg(test)]
mod tests {
    use super::{PlayerArbiter, PlayerId};
    use crate::protocol::{ArbiterMessage, Message};
    use tokio::sync::broadcast;

    fn arbiter_with_bus() -> (PlayerArbiter, broadcast::Receiver<Message>) {
        let (sender, receiver) = broadcast::channel(16);
        (PlayerArbiter::new(sender), receiver)
    }

    fn drain(receiver: &mut broadcast::Receiver<Message>) -> Vec<Message> {
        let mut messages = Vec::new();
        while let Ok(message) = receiver.try_recv() {
            messages.push(message);
        }
        messages
    }

    #[test]
    fn test_unknown_player_is_rejected_without_mutation() {
        let (arbiter, mut receiver) = arbiter_with_bus();
        assert!(!arbiter.set_active_player(PlayerId::new()));
        assert_eq!(arbiter.get_active_player(), None);
        assert!(drain(&mut receiver).is_empty());
    }

    #[test]
    fn test_switching_players_emits_single_change_with_new_payload() {
        let (arbiter, mut receiver) = arbiter_with_bus();
        let a = PlayerId::new();
        let b = PlayerId::new();
        arbiter.register(a);
        arbiter.register(b);
        arbiter.set_active_player(a);
        drain(&mut receiver);

        assert!(arbiter.set_active_player(b));
        assert_eq!(arbiter.get_active_player(), Some(b));
        assert!(!arbiter.is_active(a));
        assert_eq!(
            drain(&mut receiver),
            vec![Message::Arbiter(ArbiterMessage::ActivePlayerChanged(b))]
        );
    }

    #[test]
    fn test_reactivating_occupant_does_not_reemit() {
        let (arbiter, mut receiver) = arbiter_with_bus();
        let a = PlayerId::new();
        arbiter.register(a);
        arbiter.set_active_player(a);
        arbiter.set_active_player(a);
        assert_eq!(drain(&mut receiver).len(), 1);
    }

    #[test]
    fn test_release_only_clears_for_occupant() {
        let (arbiter, mut receiver) = arbiter_with_bus();
        let a = PlayerId::new();
        let b = PlayerId::new();
        arbiter.register(a);
        arbiter.register(b);
        arbiter.set_active_player(b);
        drain(&mut receiver);

        assert!(!arbiter.release_active_player(a));
        assert_eq!(arbiter.get_active_player(), Some(b));
        assert!(arbiter.release_active_player(b));
        assert_eq!(arbiter.get_active_player(), None);
        assert_eq!(
            drain(&mut receiver),
            vec![Message::Arbiter(ArbiterMessage::ActivePlayerCleared)]
        );
    }

    #[test]
    fn test_unregister_releases_slot_and_forgets_player() {
        let (arbiter, _receiver) = arbiter_with_bus();
        let a = PlayerId::new();
        arbiter.register(a);
        arbiter.set_active_player(a);
        arbiter.unregister(a);
        assert_eq!(arbiter.get_active_player(), None);
        assert!(!arbiter.set_active_player(a));
    }

    #[test]
    fn test_clear_without_subscribers_does_not_fail() {
        let (sender, receiver) = broadcast::channel(4);
        drop(receiver);
        let arbiter = PlayerArbiter::new(sender);
        arbiter.clear_active_player();
        assert_eq!(arbiter.get_active_player(), None);
    }
}
