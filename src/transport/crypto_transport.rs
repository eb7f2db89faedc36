//! DTLS-SRTP crypto transport.
//!
//! Sits on one [`IceTransport`] and multiplexes its 5-tuple three ways:
//! DTLS handshake records are fed to the handshake engine, SRTP and SRTCP
//! are decrypted and fanned out to registered observers, anything else is
//! dropped. On handshake completion it exports the RFC 5764 keying material,
//! installs the SRTP contexts and reports itself ready.

use std::cell::{Cell, RefCell};
use std::rc::{Rc, Weak};
use std::time::Instant;

use bytes::BytesMut;
use log::{debug, trace, warn};

use crate::crypto::{
    split_keying_material, Certificate, CryptoEngines, DtlsEndpoint, DtlsEvent, PrivateKey,
    SrtpContext, SrtpFilter, SRTP_EXPORT_LABEL,
};
use crate::demuxer::{classify, PacketKind};
use crate::error::{Error, Result};
use crate::event_loop::{EventLoop, LoopDriven};
use crate::rng::SessionRng;
use crate::transport::ice_transport::{IceObserver, IceTransport};
use crate::transport::listener::{RtpListener, TransportObserver};
use crate::transport::{CryptoRole, CryptoTransportState, SlotObserver};

pub(crate) struct CryptoTransportInner {
    state: Cell<CryptoTransportState>,
    role: CryptoRole,
    ice: IceTransport,
    dtls: RefCell<Box<dyn DtlsEndpoint>>,
    srtp: RefCell<Box<dyn SrtpContext>>,
    rng: Rc<SessionRng>,
    listener: RtpListener,
    event_loop: RefCell<Option<EventLoop>>,
}

/// Cheap cloneable handle; receivers and senders keep one per direction.
#[derive(Clone)]
pub struct CryptoTransport {
    inner: Rc<CryptoTransportInner>,
}

impl CryptoTransport {
    /// Builds a server-role transport over `ice` with the given certificate
    /// and engine pair.
    ///
    /// The SRTP context must still be empty; keys are only ever installed
    /// from the handshake. The client role is not implemented.
    pub fn new(
        ice: IceTransport,
        rng: Rc<SessionRng>,
        role: CryptoRole,
        certificate: &Certificate,
        private_key: &PrivateKey,
        mut engines: CryptoEngines,
    ) -> Result<Self> {
        if role == CryptoRole::Client {
            return Err(Error::ErrNotImplemented);
        }
        if engines.srtp.has_crypto_context() {
            return Err(Error::ErrInvalidParam);
        }
        engines.dtls.set_certificate(certificate, private_key)?;

        let inner = Rc::new(CryptoTransportInner {
            state: Cell::new(CryptoTransportState::Idle),
            role,
            ice: ice.clone(),
            dtls: RefCell::new(engines.dtls),
            srtp: RefCell::new(engines.srtp),
            rng,
            listener: RtpListener::new(),
            event_loop: RefCell::new(None),
        });
        ice.set_observer(Some(Rc::downgrade(&inner) as Weak<dyn IceObserver>));
        Ok(CryptoTransport { inner })
    }

    pub fn state(&self) -> CryptoTransportState {
        self.inner.state.get()
    }

    pub fn role(&self) -> CryptoRole {
        self.inner.role
    }

    pub fn ice_transport(&self) -> IceTransport {
        self.inner.ice.clone()
    }

    /// Starts the handshake engine and the underlying ICE transport.
    ///
    /// A handshake engine that refuses to start does not roll the ICE layer
    /// back: the transport still comes up, stays short of `Ready`, and the
    /// failure is reported as `ErrWrongState`.
    pub fn start(&self, event_loop: &EventLoop) -> Result<()> {
        let inner = &self.inner;
        if inner.state.get() == CryptoTransportState::Closed {
            return Err(Error::ErrWrongState);
        }
        if inner.event_loop.borrow().is_some() {
            return Err(Error::ErrWrongState);
        }
        *inner.event_loop.borrow_mut() = Some(event_loop.clone());

        let mut ret = Ok(());
        if let Err(e) = inner.dtls.borrow_mut().start(&inner.rng) {
            warn!("dtls engine failed to start: {e}");
            ret = Err(Error::ErrWrongState);
        }
        inner.flush_dtls_transmits();

        inner.ice.start(event_loop)?;
        event_loop.register(Rc::downgrade(inner) as Weak<dyn LoopDriven>);

        if ret.is_ok() {
            inner.state.set(CryptoTransportState::Starting);
            debug!("crypto transport starting");
        }
        ret
    }

    /// Encrypts one outbound media packet and writes it to the peer.
    ///
    /// The packet must parse as RTP or RTCP; before the handshake installed
    /// a crypto context this fails with `ErrNoCryptoContext`.
    pub fn send(&self, packet: &[u8]) -> Result<()> {
        let inner = &self.inner;
        if inner.state.get() == CryptoTransportState::Closed {
            return Err(Error::ErrWrongState);
        }
        let ciphertext = match classify(packet) {
            PacketKind::Rtp => inner.srtp.borrow_mut().encrypt_rtp(packet),
            PacketKind::Rtcp => inner.srtp.borrow_mut().encrypt_rtcp(packet),
            PacketKind::Dtls | PacketKind::Unknown => return Err(Error::ErrInvalidMedia),
        }
        .map_err(|e| match e {
            Error::ErrNoCryptoContext => Error::ErrNoCryptoContext,
            other => {
                warn!("media encrypt failed: {other}");
                Error::ErrEncryptFailed
            }
        })?;
        inner.ice.send(&ciphertext)
    }

    /// Forwards an externally driven timer tick to the handshake engine.
    pub fn handle_timeout(&self, now: Instant) -> Result<()> {
        self.inner.handle_timeout(now)
    }

    /// Next instant the handshake engine wants a timer tick at.
    pub fn poll_timeout(&self) -> Option<Instant> {
        self.inner.dtls.borrow().poll_timeout()
    }

    /// Subscribes an observer for decrypted media and lifecycle events.
    /// Subscribing the same observer twice is a no-op.
    pub fn add_observer(&self, observer: Weak<dyn TransportObserver>) {
        self.inner.listener.add(observer);
    }

    pub fn remove_observer(&self, observer: &Weak<dyn TransportObserver>) {
        self.inner.listener.remove(observer);
    }

    /// Closes the owned ICE transport; the close notification comes back
    /// through the observer chain and finishes this transport.
    pub fn close(&self) -> Result<()> {
        self.inner.ice.close()
    }

    pub(crate) fn ptr_eq(&self, other: &CryptoTransport) -> bool {
        Rc::ptr_eq(&self.inner, &other.inner)
    }
}

impl CryptoTransportInner {
    /// Drains every record the handshake engine has queued onto the wire.
    fn flush_dtls_transmits(&self) {
        loop {
            let transmit = self.dtls.borrow_mut().poll_transmit();
            let Some(transmit) = transmit else {
                return;
            };
            if let Err(e) = self.ice.send(&transmit) {
                warn!("dtls transmit dropped: {e}");
                return;
            }
        }
    }

    fn handle_timeout(&self, now: Instant) -> Result<()> {
        self.dtls.borrow_mut().handle_timeout(now)?;
        self.flush_dtls_transmits();
        Ok(())
    }

    /// Demuxes one inbound datagram. Decrypt failures and unknown packet
    /// types are dropped here, never surfaced; a bad packet must not take
    /// the transport down.
    fn handle_packet(&self, datagram: BytesMut) {
        match classify(&datagram) {
            PacketKind::Rtp => {
                let plaintext = self.srtp.borrow_mut().decrypt_rtp(&datagram);
                match plaintext {
                    Ok(plaintext) => self.listener.handle_rtp(&plaintext),
                    Err(e) => warn!("dropping rtp packet: {e}"),
                }
            }
            PacketKind::Rtcp => {
                let plaintext = self.srtp.borrow_mut().decrypt_rtcp(&datagram);
                match plaintext {
                    Ok(plaintext) => self.listener.handle_rtcp(&plaintext),
                    Err(e) => warn!("dropping rtcp packet: {e}"),
                }
            }
            PacketKind::Dtls => {
                let events = self.dtls.borrow_mut().incoming_data(datagram);
                self.flush_dtls_transmits();
                let events = match events {
                    Ok(events) => events,
                    Err(e) => {
                        warn!("dropping dtls record: {e}");
                        return;
                    }
                };
                for event in events {
                    match event {
                        DtlsEvent::HandshakeComplete => self.handshake_done(),
                        DtlsEvent::ApplicationData(data) => {
                            trace!("ignoring {} bytes of dtls application data", data.len());
                        }
                    }
                }
            }
            PacketKind::Unknown => {
                warn!("dropping unclassifiable datagram ({} bytes)", datagram.len());
            }
        }
    }

    /// Exports the keying material and installs the SRTP contexts.
    ///
    /// Server role: the peer wrote with the client key, so it keys our
    /// inbound direction; we write with the server key.
    fn handshake_done(&self) {
        let (profile, material) = {
            let dtls = self.dtls.borrow();
            let Some(profile) = dtls.srtp_protection_profile() else {
                warn!("handshake completed without an srtp protection profile");
                return;
            };
            let material = match dtls.export_keying_material(
                SRTP_EXPORT_LABEL,
                &[],
                profile.keying_material_len(),
            ) {
                Ok(material) => material,
                Err(e) => {
                    warn!("keying material export failed: {e}");
                    return;
                }
            };
            (profile, material)
        };

        let keys = match split_keying_material(profile, &material) {
            Ok(keys) => keys,
            Err(e) => {
                warn!("keying material split failed: {e}");
                return;
            }
        };

        {
            let mut srtp = self.srtp.borrow_mut();
            if let Err(e) =
                srtp.add_crypto_context(SrtpFilter::Inbound, profile, &keys.client_write_key)
            {
                warn!("inbound srtp context rejected: {e}");
                return;
            }
            if let Err(e) =
                srtp.add_crypto_context(SrtpFilter::Outbound, profile, &keys.server_write_key)
            {
                warn!("outbound srtp context rejected: {e}");
                return;
            }
        }

        self.state.set(CryptoTransportState::Ready);
        debug!("dtls-srtp handshake complete, transport ready");
        self.listener.notify_ready();
    }
}

impl SlotObserver for CryptoTransportInner {}

impl IceObserver for CryptoTransportInner {
    fn on_ready(&self) {
        // Pair nomination hook; nothing to do until trickle restarts land.
        trace!("ice transport ready");
    }

    fn on_close(&self) {
        if self.state.get() == CryptoTransportState::Closed {
            return;
        }
        self.state.set(CryptoTransportState::Closed);
        debug!("crypto transport closed");
        self.listener.notify_close();
        self.listener.close();
    }

    fn on_packet(&self, datagram: BytesMut) {
        self.handle_packet(datagram);
    }
}

impl LoopDriven for CryptoTransportInner {
    fn handle_timeout(&self, now: Instant) -> Result<()> {
        CryptoTransportInner::handle_timeout(self, now)
    }

    fn poll_timeout(&self) -> Option<Instant> {
        self.dtls.borrow().poll_timeout()
    }

    fn is_closed(&self) -> bool {
        self.state.get() == CryptoTransportState::Closed
    }
}
