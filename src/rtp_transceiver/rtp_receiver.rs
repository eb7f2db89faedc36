//! Inbound media endpoint.
//!
//! An `RtpReceiver` subscribes to a crypto transport pair and hands decrypted
//! RTP and RTCP, plus transport lifecycle changes, to caller-supplied
//! callbacks. With rtcp-mux (the default) both directions ride the same
//! transport and the receiver takes care to register with it only once.

use std::cell::{Cell, RefCell};
use std::rc::{Rc, Weak};

use bytes::BytesMut;
use log::debug;

use crate::error::{Error, Result};
use crate::event_loop::EventLoop;
use crate::rng::SessionRng;
use crate::rtp_transceiver::GENERATED_ID_LEN;
use crate::transport::crypto_transport::CryptoTransport;
use crate::transport::listener::TransportObserver;

/// Callback bundle a receiver is constructed with. Every slot must be
/// provided; passing an empty closure opts out of an event.
pub struct RtpReceiverCallbacks {
    pub ready: Box<dyn FnMut()>,
    pub close: Box<dyn FnMut()>,
    pub rtp: Box<dyn FnMut(&BytesMut)>,
    pub rtcp: Box<dyn FnMut(&BytesMut)>,
}

struct RtpReceiverInner {
    id: String,
    callbacks: RefCell<RtpReceiverCallbacks>,
    rtp: CryptoTransport,
    rtcp: CryptoTransport,
    event_loop: RefCell<Option<EventLoop>>,
    closed: Cell<bool>,
}

pub struct RtpReceiver {
    inner: Rc<RtpReceiverInner>,
}

impl RtpReceiver {
    /// Creates a receiver over `rtp`, and `rtcp` when the transports are not
    /// muxed. A missing or empty `id` gets a generated one.
    pub fn new(
        id: Option<&str>,
        rng: &SessionRng,
        callbacks: RtpReceiverCallbacks,
        rtp: CryptoTransport,
        rtcp: Option<CryptoTransport>,
    ) -> RtpReceiver {
        let id = match id {
            Some(id) if !id.is_empty() => id.to_string(),
            _ => rng.fill_base64(GENERATED_ID_LEN),
        };
        let rtcp = rtcp.unwrap_or_else(|| rtp.clone());

        let inner = Rc::new(RtpReceiverInner {
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
        RtpReceiver { inner }
    }

    pub fn id(&self) -> &str {
        &self.inner.id
    }

    pub fn rtp_transport(&self) -> CryptoTransport {
        self.inner.rtp.clone()
    }

    pub fn rtcp_transport(&self) -> CryptoTransport {
        self.inner.rtcp.clone()
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

    /// Unsubscribes from the transports; idempotent. The transports
    /// themselves stay up for other endpoints.
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

/// Starts a possibly shared transport, treating "already started" as fine.
pub(crate) fn start_shared(transport: &CryptoTransport, event_loop: &EventLoop) -> Result<()> {
    match transport.start(event_loop) {
        Ok(()) => Ok(()),
        Err(Error::ErrWrongState) => {
            debug!("transport already started, reusing");
            Ok(())
        }
        Err(e) => Err(e),
    }
}

impl TransportObserver for RtpReceiverInner {
    fn on_transport_ready(&self) {
        (self.callbacks.borrow_mut().ready)();
    }

    fn on_transport_close(&self) {
        (self.callbacks.borrow_mut().close)();
    }

    fn on_rtp(&self, packet: &BytesMut) {
        (self.callbacks.borrow_mut().rtp)(packet);
    }

    fn on_rtcp(&self, packet: &BytesMut) {
        (self.callbacks.borrow_mut().rtcp)(packet);
    }
}
