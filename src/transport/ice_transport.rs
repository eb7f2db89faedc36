//! ICE transport: owns the single datagram endpoint of the negotiated
//! 5-tuple and pushes every inbound datagram, unclassified, to whoever sits
//! on top of it.
//!
//! Candidate gathering and connectivity checks are done elsewhere; by the
//! time an endpoint is attached here the pair is already nominated.

use std::cell::{Cell, RefCell};
use std::rc::{Rc, Weak};
use std::time::Instant;

use bytes::BytesMut;
use log::{debug, trace, warn};

use crate::error::{Error, Result};
use crate::event_loop::{DatagramEndpoint, EventLoop, LoopDriven};
use crate::rng::SessionRng;
use crate::transport::{ObserverSlot, SlotObserver};

/// Local ICE credential pair advertised during negotiation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IceCredentials {
    pub ufrag: String,
    pub pwd: String,
}

const LEN_UFRAG: usize = 16;
const LEN_PWD: usize = 32;

impl IceCredentials {
    /// Generates a fresh credential pair with RFC 5245 minimum entropy.
    pub fn generate(rng: &SessionRng) -> Self {
        IceCredentials {
            ufrag: rng.fill_base64(LEN_UFRAG),
            pwd: rng.fill_base64(LEN_PWD),
        }
    }
}

/// Upstream consumer of the ICE transport; a single slot, replaced wholesale.
pub trait IceObserver: SlotObserver {
    fn on_ready(&self) {}
    fn on_close(&self) {}
    fn on_packet(&self, _datagram: BytesMut) {}
}

pub(crate) struct IceTransportInner {
    credentials: IceCredentials,
    remote_credentials: RefCell<Option<IceCredentials>>,
    endpoint: RefCell<Option<Box<dyn DatagramEndpoint>>>,
    observer: ObserverSlot<dyn IceObserver>,
    event_loop: RefCell<Option<EventLoop>>,
    closed: Cell<bool>,
}

/// Cheap cloneable handle; the crypto transport keeps one as its owned
/// lower layer.
#[derive(Clone)]
pub struct IceTransport {
    inner: Rc<IceTransportInner>,
}

impl IceTransport {
    pub fn new(rng: &SessionRng) -> Self {
        IceTransport {
            inner: Rc::new(IceTransportInner {
                credentials: IceCredentials::generate(rng),
                remote_credentials: RefCell::new(None),
                endpoint: RefCell::new(None),
                observer: ObserverSlot::new(),
                event_loop: RefCell::new(None),
                closed: Cell::new(false),
            }),
        }
    }

    pub fn credentials(&self) -> IceCredentials {
        self.inner.credentials.clone()
    }

    pub fn set_remote_credentials(&self, credentials: IceCredentials) {
        *self.inner.remote_credentials.borrow_mut() = Some(credentials);
    }

    pub fn remote_credentials(&self) -> Option<IceCredentials> {
        self.inner.remote_credentials.borrow().clone()
    }

    /// Attaches the nominated endpoint. Replacing the endpoint of a live
    /// transport is allowed; the previous one is closed first.
    pub fn set_endpoint(&self, endpoint: Box<dyn DatagramEndpoint>) -> Result<()> {
        if self.inner.closed.get() {
            return Err(Error::ErrIceTransportClosed);
        }
        if let Some(mut prev) = self.inner.endpoint.borrow_mut().replace(endpoint) {
            prev.close()?;
        }
        Ok(())
    }

    /// Sets the single upstream observer, releasing any previous one.
    pub fn set_observer(&self, observer: Option<Weak<dyn IceObserver>>) {
        self.inner.observer.replace(observer);
    }

    /// Registers with the loop and starts draining the endpoint.
    pub fn start(&self, event_loop: &EventLoop) -> Result<()> {
        if self.inner.closed.get() {
            return Err(Error::ErrIceTransportClosed);
        }
        if self.inner.event_loop.borrow().is_some() {
            return Err(Error::ErrWrongState);
        }
        *self.inner.event_loop.borrow_mut() = Some(event_loop.clone());
        event_loop.register(Rc::downgrade(&self.inner) as Weak<dyn LoopDriven>);
        debug!("ice transport started");
        Ok(())
    }

    pub fn is_closed(&self) -> bool {
        self.inner.closed.get()
    }

    /// Writes one datagram to the peer.
    pub fn send(&self, datagram: &[u8]) -> Result<()> {
        if self.inner.closed.get() {
            return Err(Error::ErrIceTransportClosed);
        }
        let mut endpoint = self.inner.endpoint.borrow_mut();
        match endpoint.as_mut() {
            Some(endpoint) => endpoint.send(datagram),
            None => Err(Error::ErrWrongState),
        }
    }

    /// Dispatches one inbound datagram to the observer. Exposed so a caller
    /// owning its own socket machinery can inject datagrams directly.
    pub fn handle_datagram(&self, datagram: BytesMut) {
        if self.inner.closed.get() {
            return;
        }
        trace!("ice transport rx {} bytes", datagram.len());
        if let Some(observer) = self.inner.observer.get() {
            observer.on_packet(datagram);
        }
    }

    /// Signals pair nomination to the observer.
    pub fn notify_ready(&self) {
        if self.inner.closed.get() {
            return;
        }
        if let Some(observer) = self.inner.observer.get() {
            observer.on_ready();
        }
    }

    /// Closes the endpoint and notifies the observer exactly once; further
    /// calls are no-ops.
    pub fn close(&self) -> Result<()> {
        if self.inner.closed.replace(true) {
            return Ok(());
        }
        debug!("ice transport closing");
        if let Some(mut endpoint) = self.inner.endpoint.borrow_mut().take() {
            endpoint.close()?;
        }
        if let Some(observer) = self.inner.observer.get() {
            observer.on_close();
        }
        self.inner.observer.clear();
        Ok(())
    }
}

impl LoopDriven for IceTransportInner {
    fn poll_endpoint(&self) -> Result<usize> {
        let mut dispatched = 0;
        loop {
            if self.closed.get() {
                return Ok(dispatched);
            }
            // The endpoint borrow is dropped before dispatch so the observer
            // chain may send on this same transport. Receive errors (ICMP
            // port-unreachable surfaces as ECONNREFUSED on UDP) end this
            // transport's drain only; they must not abort the whole pass.
            let datagram = {
                let mut endpoint = self.endpoint.borrow_mut();
                match endpoint.as_mut() {
                    Some(endpoint) => match endpoint.try_recv() {
                        Ok(datagram) => datagram,
                        Err(e) => {
                            warn!("endpoint receive failed: {e}");
                            return Ok(dispatched);
                        }
                    },
                    None => None,
                }
            };
            let Some(datagram) = datagram else {
                return Ok(dispatched);
            };
            dispatched += 1;
            trace!("ice transport rx {} bytes", datagram.len());
            if let Some(observer) = self.observer.get() {
                observer.on_packet(datagram);
            }
        }
    }

    fn handle_timeout(&self, _now: Instant) -> Result<()> {
        Ok(())
    }

    fn is_closed(&self) -> bool {
        self.closed.get()
    }
}
