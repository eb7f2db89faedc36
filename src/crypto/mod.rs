//! Narrow interfaces to the opaque DTLS handshake engine and SRTP crypto
//! context, plus the DTLS-SRTP keying-material layout shared by both.
//!
//! The handshake state machine and the SRTP cipher/replay-window live behind
//! these traits; this crate only orchestrates them.

use crate::error::{Error, Result};
use crate::rng::SessionRng;
use bytes::{Bytes, BytesMut};
use std::time::Instant;

/// Keying-material export label fixed by RFC 5764 section 4.2.
pub const SRTP_EXPORT_LABEL: &str = "EXTRACTOR-dtls_srtp";

/// DER-encoded X.509 certificate.
#[derive(Debug, Clone)]
pub struct Certificate {
    pub der: Bytes,
}

impl Certificate {
    pub fn from_der(der: impl Into<Bytes>) -> Self {
        Certificate { der: der.into() }
    }
}

/// DER-encoded private key matching a [`Certificate`].
#[derive(Clone)]
pub struct PrivateKey {
    pub der: Bytes,
}

impl PrivateKey {
    pub fn from_der(der: impl Into<Bytes>) -> Self {
        PrivateKey { der: der.into() }
    }
}

/// Negotiated DTLS-SRTP protection profile.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SrtpProtectionProfile {
    Aes128CmHmacSha1_80,
    AeadAes128Gcm,
}

impl SrtpProtectionProfile {
    /// Cipher key length in bytes.
    pub fn key_len(&self) -> usize {
        match self {
            SrtpProtectionProfile::Aes128CmHmacSha1_80 => 16,
            SrtpProtectionProfile::AeadAes128Gcm => 16,
        }
    }

    /// Session salt length in bytes.
    pub fn salt_len(&self) -> usize {
        match self {
            SrtpProtectionProfile::Aes128CmHmacSha1_80 => 14,
            SrtpProtectionProfile::AeadAes128Gcm => 12,
        }
    }

    /// Total exported keying material: client and server halves of key+salt.
    pub fn keying_material_len(&self) -> usize {
        2 * (self.key_len() + self.salt_len())
    }
}

/// Events surfaced by the DTLS engine when it consumes a datagram.
pub enum DtlsEvent {
    /// The handshake finished; keying material may now be exported.
    HandshakeComplete,
    /// Decrypted application data carried inside DTLS records.
    ApplicationData(BytesMut),
}

/// Server-side DTLS handshake engine consumed as an opaque collaborator.
///
/// Record parsing, flights, retransmission and the cipher suites are the
/// engine's business; the crypto transport only feeds it raw datagrams and
/// drains the records it wants on the wire.
pub trait DtlsEndpoint {
    fn set_certificate(&mut self, cert: &Certificate, key: &PrivateKey) -> Result<()>;

    /// Binds the engine to the running transport; called once from
    /// `CryptoTransport::start`.
    fn start(&mut self, rng: &SessionRng) -> Result<()>;

    /// Feeds one raw datagram already classified as DTLS.
    fn incoming_data(&mut self, datagram: BytesMut) -> Result<Vec<DtlsEvent>>;

    /// Next record the engine wants sent to the peer, if any.
    fn poll_transmit(&mut self) -> Option<BytesMut>;

    /// Profile negotiated via the use_srtp extension; `None` until the
    /// handshake completed or when the peer offered nothing we support.
    fn srtp_protection_profile(&self) -> Option<SrtpProtectionProfile>;

    fn export_keying_material(
        &self,
        label: &str,
        context: &[u8],
        len: usize,
    ) -> Result<Vec<u8>>;

    /// Retransmission timer hooks; there is no internal handshake timeout,
    /// the caller drives these.
    fn handle_timeout(&mut self, _now: Instant) -> Result<()> {
        Ok(())
    }

    fn poll_timeout(&self) -> Option<Instant> {
        None
    }

    fn close(&mut self) -> Result<()> {
        Ok(())
    }
}

/// Direction filter for installed crypto contexts.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SrtpFilter {
    Any,
    Inbound,
    Outbound,
}

/// SRTP/SRTCP crypto context consumed as an opaque collaborator.
///
/// Constructed empty; until a context is installed every encrypt/decrypt
/// fails with [`Error::ErrNoCryptoContext`]. Replayed sequence numbers fail
/// with [`Error::ErrDuplicated`].
pub trait SrtpContext {
    /// Installs key material (cipher key followed by session salt) for the
    /// given direction filter.
    fn add_crypto_context(
        &mut self,
        filter: SrtpFilter,
        profile: SrtpProtectionProfile,
        key: &[u8],
    ) -> Result<()>;

    fn has_crypto_context(&self) -> bool;

    fn encrypt_rtp(&mut self, plaintext: &[u8]) -> Result<BytesMut>;
    fn encrypt_rtcp(&mut self, plaintext: &[u8]) -> Result<BytesMut>;
    fn decrypt_rtp(&mut self, ciphertext: &[u8]) -> Result<BytesMut>;
    fn decrypt_rtcp(&mut self, ciphertext: &[u8]) -> Result<BytesMut>;
}

/// Engine pair injected into a `CryptoTransport` at construction.
pub struct CryptoEngines {
    pub dtls: Box<dyn DtlsEndpoint>,
    pub srtp: Box<dyn SrtpContext>,
}

/// Client and server write keys recovered from exported keying material,
/// each laid out as cipher key followed by session salt.
pub(crate) struct SrtpKeyingMaterial {
    pub(crate) client_write_key: Vec<u8>,
    pub(crate) server_write_key: Vec<u8>,
}

/// Splits RFC 5764 keying material: client write key, server write key,
/// client write salt, server write salt, in that byte order.
pub(crate) fn split_keying_material(
    profile: SrtpProtectionProfile,
    material: &[u8],
) -> Result<SrtpKeyingMaterial> {
    let key_len = profile.key_len();
    let salt_len = profile.salt_len();
    if material.len() < profile.keying_material_len() {
        return Err(Error::ErrShortSrtpMasterKey);
    }

    let mut offset = 0;
    let mut client_write_key = Vec::with_capacity(key_len + salt_len);
    let mut server_write_key = Vec::with_capacity(key_len + salt_len);

    client_write_key.extend_from_slice(&material[offset..offset + key_len]);
    offset += key_len;
    server_write_key.extend_from_slice(&material[offset..offset + key_len]);
    offset += key_len;
    client_write_key.extend_from_slice(&material[offset..offset + salt_len]);
    offset += salt_len;
    server_write_key.extend_from_slice(&material[offset..offset + salt_len]);

    Ok(SrtpKeyingMaterial {
        client_write_key,
        server_write_key,
    })
}
