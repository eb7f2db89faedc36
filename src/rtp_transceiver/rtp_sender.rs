//! Outbound media endpoint.
//!
//! An `RtpSender` hands caller media to the right crypto transport and
//! reports transport lifecycle changes back. It never sees inbound media.

use std::cell::{Cell, RefCell};
use std::rc::{Rc, Weak};

use crate::demuxer::{classify, PacketKind};
use crate::error::{Error, Result};
use crate::event_loop::EventLoop;
use crate::rng::SessionRng;
use crate::rtp_transceiver::rtp_receiver::start_shared;
use crate::rtp_transceiver::GENERATED_ID_LEN;
use crate::transport::crypto_transport::CryptoTransport;
use crate::transport::listener::TransportObserver;

/// Lifecycle callbacks a sender is constructed with.
pub struct RtpSenderCallbacks {
    pub ready: Box<dyn FnMut()>,
    pub close: Box<dyn FnMut()>,
}

struct RtpSenderInner {
    id: String,
    callbacks: RefCell<RtpSenderCallbacks>,
    rtp: CryptoTransport,
    rtcp: CryptoTransport,
    event_loop: RefCell<Option<EventLoop>>,
    closed: Cell<bool>,
}

pub struct RtpSender {
    inner: Rc<RtpSenderInner>,
}

impl RtpSender {
    /// Creates a sender over `rtp`, and `rtcp` when the transports are not
    /// muxed. A missing or empty `id` gets a generated one.
    pub fn new(
        id: Option<&str>,
        rng: &SessionRng,
        callbacks: RtpSenderCallbacks,
        rtp: CryptoTransport,
        rtcp: Option<CryptoTransport>,
    ) -> RtpSender {
        let id = match id {
            Some(id) if !id.is_empty() => id.to_string(),
            _ => rng.fill_base64(GENERATED_ID_LEN),
        };
        let rtcp = rtcp.unwrap_or_else(|| rtp.clone());

        let inner = Rc::new(RtpSenderInner {
            id,
            callbacks: RefCell::new(callbacks),
            rtp,
            rtcp,
            event_loop: RefCell::new(None),
            closed: Cell::new(false),
        });

        let observer = Rc::downgrade(&inner) as Weak<dyn TransportObserver>;
        inner.rtp.add_observer(observer.clone());
        if !inner.rtp.ptr_eq(&inner.rtcp) {
            inner.rtcp.add_observer(observer);
        }
        RtpSender { inner }
    }

    pub fn id(&self) -> &str {
        &self.inner.id
    }

    /// Encrypts and writes one media packet, routed by its header: RTP goes
    /// to the RTP transport, RTCP to the RTCP transport, anything else is
    /// `ErrInvalidMedia`.
    pub fn send(&self, packet: &[u8]) -> Result<()> {
        if self.inner.closed.get() {
            return Err(Error::ErrWrongState);
        }
        match classify(packet) {
            PacketKind::Rtp => self.inner.rtp.send(packet),
            PacketKind::Rtcp => self.inner.rtcp.send(packet),
            PacketKind::Dtls | PacketKind::Unknown => Err(Error::ErrInvalidMedia),
        }
    }

    /// Starts the underlying transports. A transport already started by
    /// another endpoint on the same media line is left alone.
    pub fn start(&self, event_loop: &EventLoop) -> Result<()> {
        let inner = &self.inner;
        if inner.closed.get() || inner.event_loop.borrow().is_some() {
            return Err(Error::ErrWrongState);
        }
        *inner.event_loop.borrow_mut() = Some(event_loop.clone());

        start_shared(&inner.rtp, event_loop)?;
        if !inner.rtp.ptr_eq(&inner.rtcp) {
            start_shared(&inner.rtcp, event_loop)?;
        }
        Ok(())
    }

    /// Unsubscribes from the transports; idempotent.
    pub fn close(&self) -> Result<()> {
        let inner = &self.inner;
        if inner.closed.replace(true) {
            return Ok(());
        }
        let observer = Rc::downgrade(inner) as Weak<dyn TransportObserver>;
        inner.rtp.remove_observer(&observer);
        if !inner.rtp.ptr_eq(&inner.rtcp) {
            inner.rtcp.remove_observer(&observer);
        }
        Ok(())
    }
}

impl TransportObserver for RtpSenderInner {
    fn on_transport_ready(&self) {
        (self.callbacks.borrow_mut().ready)();
    }

    fn on_transport_close(&self) {
        (self.callbacks.borrow_mut().close)();
    }
}
