//! Session: the top-level owner of one media session's transports and
//! endpoints, and the factory the pieces are built through so they share one
//! RNG and one event loop.

use std::cell::{Cell, RefCell};
use std::rc::Rc;

use log::debug;

use crate::crypto::{Certificate, CryptoEngines, PrivateKey};
use crate::error::{Error, Result};
use crate::event_loop::EventLoop;
use crate::rng::SessionRng;
use crate::rtp_transceiver::RtpTransceiver;
use crate::transport::crypto_transport::CryptoTransport;
use crate::transport::ice_transport::{IceCredentials, IceTransport};
use crate::transport::CryptoRole;

const GENERATED_SESSION_ID_LEN: usize = 24;

pub struct Session {
    id: String,
    rng: Rc<SessionRng>,
    event_loop: EventLoop,
    transceivers: RefCell<Vec<RtpTransceiver>>,
    crypto_transports: RefCell<Vec<CryptoTransport>>,
    started: Cell<bool>,
    closed: Cell<bool>,
}

impl Session {
    pub fn new(id: Option<&str>) -> Session {
        Session::with_rng(id, Rc::new(SessionRng::new()))
    }

    /// Like [`Session::new`] with a caller-supplied RNG, for deterministic
    /// credential and identifier generation.
    pub fn with_rng(id: Option<&str>, rng: Rc<SessionRng>) -> Session {
        let id = match id {
            Some(id) if !id.is_empty() => id.to_string(),
            _ => rng.fill_base64(GENERATED_SESSION_ID_LEN),
        };
        Session {
            id,
            rng,
            event_loop: EventLoop::new(),
            transceivers: RefCell::new(Vec::new()),
            crypto_transports: RefCell::new(Vec::new()),
            started: Cell::new(false),
            closed: Cell::new(false),
        }
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn rng(&self) -> Rc<SessionRng> {
        self.rng.clone()
    }

    /// The loop the caller drives; transports register here when started.
    pub fn event_loop(&self) -> EventLoop {
        self.event_loop.clone()
    }

    /// Fresh local ICE credentials for negotiation.
    pub fn generate_credentials(&self) -> IceCredentials {
        IceCredentials::generate(&self.rng)
    }

    pub fn create_ice_transport(&self) -> IceTransport {
        IceTransport::new(&self.rng)
    }

    /// Builds a crypto transport over `ice` and keeps it for session-wide
    /// teardown.
    pub fn create_crypto_transport(
        &self,
        ice: IceTransport,
        role: CryptoRole,
        certificate: &Certificate,
        private_key: &PrivateKey,
        engines: CryptoEngines,
    ) -> Result<CryptoTransport> {
        if self.closed.get() {
            return Err(Error::ErrWrongState);
        }
        let transport = CryptoTransport::new(
            ice,
            self.rng.clone(),
            role,
            certificate,
            private_key,
            engines,
        )?;
        self.crypto_transports.borrow_mut().push(transport.clone());
        Ok(transport)
    }

    pub fn add_transceiver(&self, transceiver: RtpTransceiver) -> Result<()> {
        if self.closed.get() {
            return Err(Error::ErrWrongState);
        }
        self.transceivers.borrow_mut().push(transceiver);
        Ok(())
    }

    /// Starts every transceiver on the session loop.
    pub fn start(&self) -> Result<()> {
        if self.closed.get() || self.started.replace(true) {
            return Err(Error::ErrWrongState);
        }
        debug!("session {} starting", self.id);
        for transceiver in self.transceivers.borrow().iter() {
            transceiver.start(&self.event_loop)?;
        }
        Ok(())
    }

    /// Tears the session down: endpoints first, then every crypto transport.
    /// Transports shared across endpoints close once; repeat calls are no-ops.
    pub fn close(&self) -> Result<()> {
        if self.closed.replace(true) {
            return Ok(());
        }
        debug!("session {} closing", self.id);
        for transceiver in self.transceivers.borrow().iter() {
            transceiver.close()?;
        }
        for transport in self.crypto_transports.borrow().iter() {
            transport.close()?;
        }
        Ok(())
    }
}
