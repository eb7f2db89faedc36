//! Single-threaded cooperative event loop.
//!
//! Transports register themselves when started; `poll` drains pending inbound
//! datagrams from every registered endpoint and dispatches them synchronously,
//! one at a time, on the caller's thread. There is no internal locking: one
//! dispatched datagram runs its whole demux/decrypt/publish chain to
//! completion before the next is looked at.

use crate::error::{Error, Result};
use bytes::BytesMut;
use std::cell::RefCell;
use std::io;
use std::net::{SocketAddr, UdpSocket};
use std::rc::{Rc, Weak};
use std::time::Instant;

/// Default receive buffer, matching the usual Ethernet-bounded MTU headroom.
const RECEIVE_MTU: usize = 2000;

/// One datagram endpoint of the negotiated 5-tuple.
///
/// `try_recv` must never block; endpoints return `Ok(None)` when no datagram
/// is pending.
pub trait DatagramEndpoint {
    fn send(&mut self, datagram: &[u8]) -> Result<()>;
    fn try_recv(&mut self) -> Result<Option<BytesMut>>;
    fn close(&mut self) -> Result<()> {
        Ok(())
    }
}

/// Non-blocking UDP endpoint bound to the negotiated remote address.
pub struct UdpEndpoint {
    socket: UdpSocket,
    remote: SocketAddr,
}

impl UdpEndpoint {
    pub fn new(socket: UdpSocket, remote: SocketAddr) -> Result<Self> {
        socket.set_nonblocking(true)?;
        Ok(UdpEndpoint { socket, remote })
    }

    pub fn local_addr(&self) -> Result<SocketAddr> {
        Ok(self.socket.local_addr()?)
    }
}

impl DatagramEndpoint for UdpEndpoint {
    fn send(&mut self, datagram: &[u8]) -> Result<()> {
        self.socket.send_to(datagram, self.remote)?;
        Ok(())
    }

    fn try_recv(&mut self) -> Result<Option<BytesMut>> {
        let mut buf = [0u8; RECEIVE_MTU];
        match self.socket.recv_from(&mut buf) {
            Ok((n, _)) => Ok(Some(BytesMut::from(&buf[..n]))),
            Err(e) if e.kind() == io::ErrorKind::WouldBlock => Ok(None),
            Err(e) => Err(Error::from(e)),
        }
    }
}

/// Implemented by transport internals the loop drives between waits.
pub(crate) trait LoopDriven {
    /// Drains pending inbound datagrams; returns how many were dispatched.
    fn poll_endpoint(&self) -> Result<usize> {
        Ok(0)
    }

    fn handle_timeout(&self, _now: Instant) -> Result<()> {
        Ok(())
    }

    fn poll_timeout(&self) -> Option<Instant> {
        None
    }

    fn is_closed(&self) -> bool;
}

#[derive(Default)]
struct EventLoopInner {
    driven: RefCell<Vec<Weak<dyn LoopDriven>>>,
}

/// Cheap handle to the shared loop state; components keep a clone as their
/// back-reference once started.
#[derive(Clone, Default)]
pub struct EventLoop {
    inner: Rc<EventLoopInner>,
}

impl EventLoop {
    pub fn new() -> Self {
        EventLoop::default()
    }

    pub(crate) fn register(&self, driven: Weak<dyn LoopDriven>) {
        self.inner.driven.borrow_mut().push(driven);
    }

    /// One dispatch pass: drains every registered transport's endpoint.
    /// Dispatch may re-enter the loop (a decrypted packet can trigger sends),
    /// so iteration works on a snapshot of the registration list.
    pub fn poll(&self) -> Result<usize> {
        let snapshot: Vec<Rc<dyn LoopDriven>> = {
            let mut driven = self.inner.driven.borrow_mut();
            driven.retain(|w| w.upgrade().is_some_and(|d| !d.is_closed()));
            driven.iter().filter_map(Weak::upgrade).collect()
        };

        let mut dispatched = 0;
        for d in snapshot {
            dispatched += d.poll_endpoint()?;
        }
        Ok(dispatched)
    }

    /// Runs dispatch passes until no transport had a pending datagram.
    pub fn poll_until_idle(&self) -> Result<()> {
        while self.poll()? > 0 {}
        Ok(())
    }

    /// Forwards an externally driven timer tick to every registered transport.
    pub fn handle_timeout(&self, now: Instant) -> Result<()> {
        let snapshot: Vec<Rc<dyn LoopDriven>> = {
            let driven = self.inner.driven.borrow();
            driven.iter().filter_map(Weak::upgrade).collect()
        };
        for d in snapshot {
            d.handle_timeout(now)?;
        }
        Ok(())
    }

    /// Earliest deadline any registered transport wants a timer tick at.
    pub fn poll_timeout(&self) -> Option<Instant> {
        let driven = self.inner.driven.borrow();
        driven
            .iter()
            .filter_map(Weak::upgrade)
            .filter_map(|d| d.poll_timeout())
            .min()
    }
}
