use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::{Arc, PoisonError, RwLock};

use crate::ws::protocol::{MessageType, WsMessage};

/// Handler invoked with the payload of a validated inbound message.
///
/// The message type is implied by the slot the callback was bound to; the
/// handler pattern-matches the payload variant it cares about.
pub type Callback = Arc<dyn Fn(&WsMessage) -> anyhow::Result<()> + Send + Sync>;

/// Per-message-type callback sets.
///
/// Every [`MessageType`] has a slot from construction on, so dispatching a
/// valid type never hits a missing entry. Callbacks are compared by `Arc`
/// identity: binding the same callback twice keeps a single registration.
pub struct CallbackTable {
    slots: [RwLock<Vec<Callback>>; MessageType::COUNT],
}

impl CallbackTable {
    pub fn new() -> Self {
        Self {
            slots: std::array::from_fn(|_| RwLock::new(Vec::new())),
        }
    }

    /// Register `callback` for `kind`. Returns false if it was already bound.
    pub fn bind(&self, kind: MessageType, callback: Callback) -> bool {
        let mut slot = self.slots[kind.index()]
            .write()
            .unwrap_or_else(PoisonError::into_inner);
        if slot.iter().any(|existing| Arc::ptr_eq(existing, &callback)) {
            return false;
        }
        slot.push(callback);
        true
    }

    /// Remove a previously bound callback. Returns false if it was not bound.
    pub fn unbind(&self, kind: MessageType, callback: &Callback) -> bool {
        let mut slot = self.slots[kind.index()]
            .write()
            .unwrap_or_else(PoisonError::into_inner);
        match slot.iter().position(|existing| Arc::ptr_eq(existing, callback)) {
            Some(pos) => {
                slot.remove(pos);
                true
            }
            None => false,
        }
    }

    pub fn handler_count(&self, kind: MessageType) -> usize {
        self.slots[kind.index()]
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }

    /// Invoke every callback bound to the message's type, in registration order.
    ///
    /// A callback that returns an error or panics is logged and the remaining
    /// callbacks still run. Returns the number of callbacks invoked.
    pub fn dispatch(&self, message: &WsMessage) -> usize {
        let kind = message.kind();
        // Snapshot so callbacks can bind/unbind without deadlocking the slot.
        let callbacks: Vec<Callback> = self.slots[kind.index()]
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone();

        for callback in &callbacks {
            match catch_unwind(AssertUnwindSafe(|| callback(message))) {
                Ok(Ok(())) => {}
                Ok(Err(e)) => {
                    tracing::warn!(message_type = %kind, error = %e, "Message callback failed");
                }
                Err(_) => {
                    tracing::error!(message_type = %kind, "Message callback panicked");
                }
            }
        }

        callbacks.len()
    }
}

impl Default for CallbackTable {
    fn default() -> Self {
        Self::new()
    }
}
