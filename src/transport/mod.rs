//! Transport layering: one `IceTransport` per negotiated 5-tuple, one
//! `CryptoTransport` on top of it, and the listener registry fanning
//! decrypted media out to receivers and senders.

use std::cell::RefCell;
use std::rc::{Rc, Weak};

pub mod crypto_transport;
pub mod ice_transport;
pub mod listener;

/// DTLS role of a crypto transport. Only the server role is implemented;
/// constructing a client-role transport fails with `ErrNotImplemented`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CryptoRole {
    Server,
    Client,
}

/// Lifecycle of a crypto transport. The SRTP context is populated exactly at
/// the `Starting -> Ready` transition; before that every encrypt/decrypt
/// fails with `ErrNoCryptoContext`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CryptoTransportState {
    Idle,
    Starting,
    Ready,
    Closed,
}

/// Implemented by anything that can occupy an [`ObserverSlot`]; `on_release`
/// fires when the subscriber is replaced or the slot cleared.
pub trait SlotObserver {
    fn on_release(&self) {}
}

/// Single-owner callback slot.
///
/// At most one subscriber is registered at a time; installing a new one first
/// takes the previous subscriber out and invokes its release notifier, so a
/// replaced owner never keeps a dangling registration. The slot holds only a
/// weak reference; ownership stays with the subscriber.
pub(crate) struct ObserverSlot<T: SlotObserver + ?Sized> {
    observer: RefCell<Option<Weak<T>>>,
}

impl<T: SlotObserver + ?Sized> ObserverSlot<T> {
    pub(crate) fn new() -> Self {
        ObserverSlot {
            observer: RefCell::new(None),
        }
    }

    pub(crate) fn replace(&self, observer: Option<Weak<T>>) {
        // The previous subscriber is released outside the borrow so its
        // notifier may re-enter the slot. A registration the notifier
        // installed reentrantly loses to the in-flight replace and gets its
        // own release notification instead of a silent overwrite.
        let prev = self.observer.borrow_mut().take();
        if let Some(prev) = prev.and_then(|w| w.upgrade()) {
            prev.on_release();
            let reentrant = self.observer.borrow_mut().take();
            if let Some(reentrant) = reentrant.and_then(|w| w.upgrade()) {
                reentrant.on_release();
            }
        }
        *self.observer.borrow_mut() = observer;
    }

    pub(crate) fn clear(&self) {
        self.replace(None);
    }

    pub(crate) fn get(&self) -> Option<Rc<T>> {
        self.observer.borrow().as_ref().and_then(Weak::upgrade)
    }
}
