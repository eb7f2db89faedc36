//! # rtc-transport - DTLS-SRTP Media Transport
//!
//! Secure real-time media transport: one UDP 5-tuple multiplexed between the
//! DTLS handshake and SRTP/SRTCP media, with decrypted packets fanned out to
//! registered receivers through callbacks.
//!
//! The crate orchestrates; it does not implement the ciphers. The DTLS
//! handshake engine and the SRTP crypto context are injected behind the
//! [`crypto::DtlsEndpoint`] and [`crypto::SrtpContext`] traits, and the wire
//! is injected behind [`event_loop::DatagramEndpoint`]. Everything runs
//! single-threaded on a caller-driven [`event_loop::EventLoop`].
//!
//! ## Quick Start
//!
//! ```no_run
//! use rtc_transport::crypto::{Certificate, CryptoEngines, PrivateKey};
//! use rtc_transport::session::Session;
//! use rtc_transport::transport::CryptoRole;
//! use rtc_transport::rtp_transceiver::{RtpReceiver, RtpReceiverCallbacks};
//!
//! # fn engines() -> CryptoEngines { unimplemented!() }
//! # fn example() -> Result<(), rtc_transport::Error> {
//! let session = Session::new(None);
//!
//! // 1. One ICE transport per negotiated 5-tuple, one crypto transport on top
//! let ice = session.create_ice_transport();
//! let certificate = Certificate::from_der(&b"..."[..]);
//! let private_key = PrivateKey::from_der(&b"..."[..]);
//! let transport = session.create_crypto_transport(
//!     ice,
//!     CryptoRole::Server,
//!     &certificate,
//!     &private_key,
//!     engines(),
//! )?;
//!
//! // 2. A receiver subscribing to decrypted media
//! let receiver = RtpReceiver::new(
//!     None,
//!     &session.rng(),
//!     RtpReceiverCallbacks {
//!         ready: Box::new(|| println!("handshake done")),
//!         close: Box::new(|| {}),
//!         rtp: Box::new(|packet| println!("rtp: {} bytes", packet.len())),
//!         rtcp: Box::new(|_| {}),
//!     },
//!     transport,
//!     None, // rtcp-mux
//! );
//! receiver.start(&session.event_loop())?;
//!
//! // 3. Drive the loop from your scheduler
//! session.event_loop().poll_until_idle()?;
//! # Ok(())
//! # }
//! ```

pub mod crypto;
pub mod demuxer;
pub mod error;
pub mod event_loop;
pub mod rng;
pub mod rtp_transceiver;
pub mod session;
pub mod transport;

pub use error::{Error, Result};
