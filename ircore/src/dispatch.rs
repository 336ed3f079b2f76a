//! Event Dispatch, §4.G. Grounded on `original_source/src/goat.c`'s
//! `goat_install_callback`/`goat_uninstall_callback`/`goat_dispatch_events`.
use std::collections::HashMap;
use std::sync::Arc;

use crate::command::CommandId;
use crate::error::ErrorKind;
use crate::message::Message;

/// A closed enumeration of event kinds: GENERIC, plus one kind per recognized
/// `CommandId`. `None` in the callback table's key stands for GENERIC.
pub type EventKind = Option<CommandId>;

pub const GENERIC: EventKind = None;

pub type Callback = Arc<dyn Fn(&Message) + Send + Sync>;

/// Write-locked by the pool on install/uninstall; read under the pool's lock
/// on every dispatch.
#[derive(Default)]
pub struct CallbackTable {
    slots: HashMap<EventKind, Callback>,
}

impl CallbackTable {
    pub fn new() -> Self {
        CallbackTable::default()
    }

    pub fn install(&mut self, event: EventKind, callback: Callback) {
        self.slots.insert(event, callback);
    }

    /// Removes the callback for `event` only if `callback` is the one currently
    /// installed there (`Arc` pointer identity). Mismatch, including "nothing
    /// installed", reports `Canceled`, per spec.md §4.F.
    pub fn uninstall(&mut self, event: EventKind, callback: &Callback) -> Result<(), ErrorKind> {
        match self.slots.get(&event) {
            Some(installed) if Arc::ptr_eq(installed, callback) => {
                self.slots.remove(&event);
                Ok(())
            }
            _ => Err(ErrorKind::Canceled),
        }
    }

    /// Chooses the callback slot for `message`'s `CommandId` if one is
    /// registered, else GENERIC, else returns `None` (message is dropped).
    pub fn dispatch(&self, message: &Message) {
        let slot = self
            .slots
            .get(&message.command_id())
            .or_else(|| self.slots.get(&GENERIC));
        if let Some(callback) = slot {
            callback(message);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::message::MessageBuilder;
    use std::sync::atomic::{AtomicUsize, Ordering};

    #[test]
    fn dispatch_prefers_specific_slot_over_generic() {
        let mut table = CallbackTable::new();
        let specific_hits = Arc::new(AtomicUsize::new(0));
        let generic_hits = Arc::new(AtomicUsize::new(0));
        {
            let hits = specific_hits.clone();
            table.install(Some(CommandId::Ping), Arc::new(move |_| {
                hits.fetch_add(1, Ordering::SeqCst);
            }));
        }
        {
            let hits = generic_hits.clone();
            table.install(GENERIC, Arc::new(move |_| {
                hits.fetch_add(1, Ordering::SeqCst);
            }));
        }
        let ping = MessageBuilder::new("PING").build().unwrap();
        table.dispatch(&ping);
        assert_eq!(specific_hits.load(Ordering::SeqCst), 1);
        assert_eq!(generic_hits.load(Ordering::SeqCst), 0);
    }

    #[test]
    fn dispatch_falls_back_to_generic_when_no_specific_slot() {
        let mut table = CallbackTable::new();
        let generic_hits = Arc::new(AtomicUsize::new(0));
        {
            let hits = generic_hits.clone();
            table.install(GENERIC, Arc::new(move |_| {
                hits.fetch_add(1, Ordering::SeqCst);
            }));
        }
        let ping = MessageBuilder::new("PING").build().unwrap();
        table.dispatch(&ping);
        assert_eq!(generic_hits.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn dispatch_drops_message_when_no_slot_registered() {
        let table = CallbackTable::new();
        let ping = MessageBuilder::new("PING").build().unwrap();
        table.dispatch(&ping); // must not panic
    }

    #[test]
    fn uninstall_requires_matching_callback() {
        let mut table = CallbackTable::new();
        let installed: Callback = Arc::new(|_| {});
        let other: Callback = Arc::new(|_| {});
        table.install(GENERIC, installed.clone());
        assert_eq!(table.uninstall(GENERIC, &other), Err(ErrorKind::Canceled));
        assert!(table.uninstall(GENERIC, &installed).is_ok());
    }

    #[test]
    fn uninstall_on_empty_slot_is_canceled() {
        let mut table = CallbackTable::new();
        let callback: Callback = Arc::new(|_| {});
        assert_eq!(table.uninstall(GENERIC, &callback), Err(ErrorKind::Canceled));
    }
}
