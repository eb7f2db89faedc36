//! Fan-out registry between a crypto transport and its receivers/senders.

use std::cell::{Cell, RefCell};
use std::rc::{Rc, Weak};

use bytes::BytesMut;

/// Callbacks a crypto transport delivers to each registered subscriber.
/// Media callbacks carry the decrypted payload; lifecycle callbacks carry
/// nothing.
pub trait TransportObserver {
    fn on_transport_ready(&self) {}
    fn on_transport_close(&self) {}
    fn on_rtp(&self, _packet: &BytesMut) {}
    fn on_rtcp(&self, _packet: &BytesMut) {}
}

/// Subscriber registry with set semantics keyed on subscriber identity.
///
/// Registration holds weak references, so a dropped subscriber is pruned on
/// the next notification pass rather than kept alive by the transport.
/// Notification iterates a snapshot taken up front, which keeps re-entrant
/// add/remove calls from inside a callback well-defined: they affect later
/// notifications, not the one in flight.
pub(crate) struct RtpListener {
    subscribers: RefCell<Vec<(usize, Weak<dyn TransportObserver>)>>,
    closed: Cell<bool>,
}

fn subscriber_key(observer: &Weak<dyn TransportObserver>) -> usize {
    observer.as_ptr() as *const () as usize
}

impl RtpListener {
    pub(crate) fn new() -> Self {
        RtpListener {
            subscribers: RefCell::new(Vec::new()),
            closed: Cell::new(false),
        }
    }

    /// Adds a subscriber; re-adding the same subscriber is a no-op.
    pub(crate) fn add(&self, observer: Weak<dyn TransportObserver>) {
        if self.closed.get() {
            return;
        }
        let key = subscriber_key(&observer);
        let mut subscribers = self.subscribers.borrow_mut();
        if subscribers.iter().any(|(k, _)| *k == key) {
            return;
        }
        subscribers.push((key, observer));
    }

    /// Removes a subscriber; removing one that was never added is a no-op.
    pub(crate) fn remove(&self, observer: &Weak<dyn TransportObserver>) {
        let key = subscriber_key(observer);
        self.subscribers.borrow_mut().retain(|(k, _)| *k != key);
    }

    fn snapshot(&self) -> Vec<Rc<dyn TransportObserver>> {
        let mut subscribers = self.subscribers.borrow_mut();
        subscribers.retain(|(_, w)| w.strong_count() > 0);
        subscribers.iter().filter_map(|(_, w)| w.upgrade()).collect()
    }

    pub(crate) fn notify_ready(&self) {
        if self.closed.get() {
            return;
        }
        for observer in self.snapshot() {
            observer.on_transport_ready();
        }
    }

    pub(crate) fn notify_close(&self) {
        if self.closed.get() {
            return;
        }
        for observer in self.snapshot() {
            observer.on_transport_close();
        }
    }

    pub(crate) fn handle_rtp(&self, packet: &BytesMut) {
        if self.closed.get() {
            return;
        }
        for observer in self.snapshot() {
            observer.on_rtp(packet);
        }
    }

    pub(crate) fn handle_rtcp(&self, packet: &BytesMut) {
        if self.closed.get() {
            return;
        }
        for observer in self.snapshot() {
            observer.on_rtcp(packet);
        }
    }

    /// Stops all further notifications and drops the registrations.
    pub(crate) fn close(&self) {
        self.closed.set(true);
        self.subscribers.borrow_mut().clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct RecordingObserver {
        rtp_packets: Cell<usize>,
        ready: Cell<usize>,
    }

    impl RecordingObserver {
        fn new() -> Rc<Self> {
            Rc::new(RecordingObserver {
                rtp_packets: Cell::new(0),
                ready: Cell::new(0),
            })
        }
    }

    impl TransportObserver for RecordingObserver {
        fn on_transport_ready(&self) {
            self.ready.set(self.ready.get() + 1);
        }

        fn on_rtp(&self, _packet: &BytesMut) {
            self.rtp_packets.set(self.rtp_packets.get() + 1);
        }
    }

    fn as_observer(observer: &Rc<RecordingObserver>) -> Weak<dyn TransportObserver> {
        Rc::downgrade(observer) as Weak<dyn TransportObserver>
    }

    #[test]
    fn duplicate_add_delivers_once() {
        let listener = RtpListener::new();
        let observer = RecordingObserver::new();
        listener.add(as_observer(&observer));
        listener.add(as_observer(&observer));

        listener.handle_rtp(&BytesMut::from(&[0u8; 12][..]));
        assert_eq!(observer.rtp_packets.get(), 1);
    }

    #[test]
    fn remove_unknown_subscriber_is_noop() {
        let listener = RtpListener::new();
        let registered = RecordingObserver::new();
        let stranger = RecordingObserver::new();
        listener.add(as_observer(&registered));
        listener.remove(&as_observer(&stranger));

        listener.notify_ready();
        assert_eq!(registered.ready.get(), 1);
    }

    #[test]
    fn dropped_subscriber_is_pruned() {
        let listener = RtpListener::new();
        let observer = RecordingObserver::new();
        listener.add(as_observer(&observer));
        drop(observer);

        listener.notify_ready();
        assert!(listener.subscribers.borrow().is_empty());
    }

    #[test]
    fn closed_listener_stops_notifying() {
        let listener = RtpListener::new();
        let observer = RecordingObserver::new();
        listener.add(as_observer(&observer));
        listener.close();

        listener.notify_ready();
        listener.handle_rtp(&BytesMut::from(&[0u8; 12][..]));
        assert_eq!(observer.ready.get(), 0);
        assert_eq!(observer.rtp_packets.get(), 0);
    }
}
