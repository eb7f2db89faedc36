//! Shared test harness: an in-memory datagram pipe plus scripted DTLS and
//! SRTP engines with observable state.

#![allow(dead_code)]

use std::cell::RefCell;
use std::collections::{HashSet, VecDeque};
use std::rc::Rc;
use std::time::Instant;

use bytes::BytesMut;

use rtc_transport::crypto::{
    Certificate, CryptoEngines, DtlsEndpoint, DtlsEvent, PrivateKey, SrtpContext, SrtpFilter,
    SrtpProtectionProfile,
};
use rtc_transport::error::{Error, Result};
use rtc_transport::event_loop::DatagramEndpoint;
use rtc_transport::rng::SessionRng;

pub fn init_log() {
    let _ = env_logger::builder().is_test(true).try_init();
}

pub fn generate_identity() -> (Certificate, PrivateKey) {
    let identity = rcgen::generate_simple_self_signed(vec!["localhost".to_string()]).unwrap();
    let cert = Certificate::from_der(identity.cert.der().to_vec());
    let key = PrivateKey::from_der(identity.key_pair.serialize_der());
    (cert, key)
}

// ---------------------------------------------------------------- wire pipe

/// One end of an in-memory datagram pair held by the test.
pub struct PeerEnd {
    to_transport: Rc<RefCell<VecDeque<BytesMut>>>,
    from_transport: Rc<RefCell<VecDeque<BytesMut>>>,
}

impl PeerEnd {
    pub fn send(&self, datagram: &[u8]) {
        self.to_transport
            .borrow_mut()
            .push_back(BytesMut::from(datagram));
    }

    pub fn recv(&self) -> Option<BytesMut> {
        self.from_transport.borrow_mut().pop_front()
    }

    pub fn drain(&self) -> Vec<BytesMut> {
        let mut out = Vec::new();
        while let Some(datagram) = self.recv() {
            out.push(datagram);
        }
        out
    }
}

struct MemoryEndpoint {
    rx: Rc<RefCell<VecDeque<BytesMut>>>,
    tx: Rc<RefCell<VecDeque<BytesMut>>>,
}

impl DatagramEndpoint for MemoryEndpoint {
    fn send(&mut self, datagram: &[u8]) -> Result<()> {
        self.tx.borrow_mut().push_back(BytesMut::from(datagram));
        Ok(())
    }

    fn try_recv(&mut self) -> Result<Option<BytesMut>> {
        Ok(self.rx.borrow_mut().pop_front())
    }
}

/// Builds a transport-side endpoint and the matching test-side peer end.
pub fn memory_pipe() -> (Box<dyn DatagramEndpoint>, PeerEnd) {
    let to_transport = Rc::new(RefCell::new(VecDeque::new()));
    let from_transport = Rc::new(RefCell::new(VecDeque::new()));
    let endpoint = MemoryEndpoint {
        rx: to_transport.clone(),
        tx: from_transport.clone(),
    };
    (
        Box::new(endpoint),
        PeerEnd {
            to_transport,
            from_transport,
        },
    )
}

// -------------------------------------------------------------- dtls engine

/// Frames a body as a minimal DTLS 1.2 record so the classifier accepts it.
pub fn dtls_datagram(body: &[u8]) -> Vec<u8> {
    let mut out = vec![0u8; 13];
    out[0] = 22; // handshake content type
    out[1] = 254;
    out[2] = 253;
    out.extend_from_slice(body);
    out
}

#[derive(Default)]
pub struct MockDtlsState {
    pub started: bool,
    pub completed: bool,
    pub fail_start: bool,
    pub no_profile: bool,
    pub fail_export: bool,
    pub received: Vec<BytesMut>,
    pub timeouts_handled: usize,
    pub retransmit_on_timeout: Option<Vec<u8>>,
    pub timeout_at: Option<Instant>,
    transmits: VecDeque<BytesMut>,
}

/// Scripted server handshake: the first inbound record draws a flight, the
/// second completes the handshake.
pub struct MockDtlsEndpoint {
    state: Rc<RefCell<MockDtlsState>>,
}

impl MockDtlsEndpoint {
    pub fn new() -> (Self, Rc<RefCell<MockDtlsState>>) {
        let state = Rc::new(RefCell::new(MockDtlsState::default()));
        (
            MockDtlsEndpoint {
                state: state.clone(),
            },
            state,
        )
    }
}

/// Deterministic keying material; offset keeps the first key byte nonzero.
pub fn mock_keying_material(len: usize) -> Vec<u8> {
    (0..len).map(|i| (i as u8).wrapping_add(7)).collect()
}

impl DtlsEndpoint for MockDtlsEndpoint {
    fn set_certificate(&mut self, _cert: &Certificate, _key: &PrivateKey) -> Result<()> {
        Ok(())
    }

    fn start(&mut self, _rng: &SessionRng) -> Result<()> {
        let mut state = self.state.borrow_mut();
        if state.fail_start {
            return Err(Error::Other("engine refused to start".to_string()));
        }
        state.started = true;
        Ok(())
    }

    fn incoming_data(&mut self, datagram: BytesMut) -> Result<Vec<DtlsEvent>> {
        let mut state = self.state.borrow_mut();
        if state.completed {
            return Ok(vec![DtlsEvent::ApplicationData(datagram)]);
        }
        state.received.push(datagram);
        if state.received.len() == 1 {
            let flight = dtls_datagram(b"server-flight");
            state.transmits.push_back(BytesMut::from(&flight[..]));
            Ok(Vec::new())
        } else {
            state.completed = true;
            let ack = dtls_datagram(b"finished-ack");
            state.transmits.push_back(BytesMut::from(&ack[..]));
            Ok(vec![DtlsEvent::HandshakeComplete])
        }
    }

    fn poll_transmit(&mut self) -> Option<BytesMut> {
        self.state.borrow_mut().transmits.pop_front()
    }

    fn srtp_protection_profile(&self) -> Option<SrtpProtectionProfile> {
        let state = self.state.borrow();
        if state.completed && !state.no_profile {
            Some(SrtpProtectionProfile::Aes128CmHmacSha1_80)
        } else {
            None
        }
    }

    fn export_keying_material(&self, _label: &str, _context: &[u8], len: usize) -> Result<Vec<u8>> {
        if self.state.borrow().fail_export {
            return Err(Error::ErrDtlsKeyExtractionFailed);
        }
        Ok(mock_keying_material(len))
    }

    fn handle_timeout(&mut self, _now: Instant) -> Result<()> {
        let mut state = self.state.borrow_mut();
        state.timeouts_handled += 1;
        if let Some(record) = state.retransmit_on_timeout.take() {
            state.transmits.push_back(BytesMut::from(&record[..]));
        }
        Ok(())
    }

    fn poll_timeout(&self) -> Option<Instant> {
        self.state.borrow().timeout_at
    }
}

/// Client and server write keys the mock export splits into, matching the
/// RFC 5764 layout for the mock's profile.
pub fn expected_keys() -> (Vec<u8>, Vec<u8>) {
    let profile = SrtpProtectionProfile::Aes128CmHmacSha1_80;
    let material = mock_keying_material(profile.keying_material_len());
    let key_len = profile.key_len();
    let salt_len = profile.salt_len();
    let mut client = material[..key_len].to_vec();
    client.extend_from_slice(&material[2 * key_len..2 * key_len + salt_len]);
    let mut server = material[key_len..2 * key_len].to_vec();
    server.extend_from_slice(&material[2 * key_len + salt_len..]);
    (client, server)
}

// -------------------------------------------------------------- srtp engine

const TAG_LEN: usize = 4;

/// Toy protection: the first two header bytes stay in the clear so ciphertext
/// still classifies, the rest is XORed with the key, and a 4-byte tag derived
/// from the key is appended.
pub fn mock_protect(key: &[u8], packet: &[u8]) -> Vec<u8> {
    let mut out = packet.to_vec();
    for b in &mut out[2..] {
        *b ^= key[0];
    }
    out.extend_from_slice(&[key[1]; TAG_LEN]);
    out
}

fn mock_unprotect(key: &[u8], packet: &[u8]) -> Result<Vec<u8>> {
    if packet.len() < 2 + TAG_LEN {
        return Err(Error::ErrTooShortRtp);
    }
    let (body, tag) = packet.split_at(packet.len() - TAG_LEN);
    if tag != [key[1]; TAG_LEN] {
        return Err(Error::ErrFailedToVerifyAuthTag);
    }
    let mut out = body.to_vec();
    for b in &mut out[2..] {
        *b ^= key[0];
    }
    Ok(out)
}

#[derive(Default)]
pub struct MockSrtpState {
    pub inbound_key: Option<Vec<u8>>,
    pub outbound_key: Option<Vec<u8>>,
    pub installed: Vec<(SrtpFilter, SrtpProtectionProfile, Vec<u8>)>,
    seen_rtp: HashSet<[u8; 2]>,
    seen_rtcp: HashSet<[u8; 2]>,
}

pub struct MockSrtpContext {
    state: Rc<RefCell<MockSrtpState>>,
}

impl MockSrtpContext {
    pub fn new() -> (Self, Rc<RefCell<MockSrtpState>>) {
        let state = Rc::new(RefCell::new(MockSrtpState::default()));
        (
            MockSrtpContext {
                state: state.clone(),
            },
            state,
        )
    }

    /// A context with a key already installed, for constructor validation.
    pub fn pre_keyed() -> Self {
        let (context, state) = MockSrtpContext::new();
        state.borrow_mut().inbound_key = Some(vec![1, 2]);
        context
    }
}

impl SrtpContext for MockSrtpContext {
    fn add_crypto_context(
        &mut self,
        filter: SrtpFilter,
        profile: SrtpProtectionProfile,
        key: &[u8],
    ) -> Result<()> {
        let mut state = self.state.borrow_mut();
        state.installed.push((filter, profile, key.to_vec()));
        match filter {
            SrtpFilter::Inbound => state.inbound_key = Some(key.to_vec()),
            SrtpFilter::Outbound => state.outbound_key = Some(key.to_vec()),
            SrtpFilter::Any => {
                state.inbound_key = Some(key.to_vec());
                state.outbound_key = Some(key.to_vec());
            }
        }
        Ok(())
    }

    fn has_crypto_context(&self) -> bool {
        let state = self.state.borrow();
        state.inbound_key.is_some() || state.outbound_key.is_some()
    }

    fn encrypt_rtp(&mut self, plaintext: &[u8]) -> Result<BytesMut> {
        let state = self.state.borrow();
        let key = state.outbound_key.as_ref().ok_or(Error::ErrNoCryptoContext)?;
        Ok(BytesMut::from(&mock_protect(key, plaintext)[..]))
    }

    fn encrypt_rtcp(&mut self, plaintext: &[u8]) -> Result<BytesMut> {
        self.encrypt_rtp(plaintext)
    }

    fn decrypt_rtp(&mut self, ciphertext: &[u8]) -> Result<BytesMut> {
        let mut state = self.state.borrow_mut();
        let key = state
            .inbound_key
            .clone()
            .ok_or(Error::ErrNoCryptoContext)?;
        let plaintext = mock_unprotect(&key, ciphertext)?;
        let seq = [ciphertext[2], ciphertext[3]];
        if !state.seen_rtp.insert(seq) {
            return Err(Error::ErrDuplicated);
        }
        Ok(BytesMut::from(&plaintext[..]))
    }

    fn decrypt_rtcp(&mut self, ciphertext: &[u8]) -> Result<BytesMut> {
        let mut state = self.state.borrow_mut();
        let key = state
            .inbound_key
            .clone()
            .ok_or(Error::ErrNoCryptoContext)?;
        let plaintext = mock_unprotect(&key, ciphertext)?;
        let seq = [ciphertext[2], ciphertext[3]];
        if !state.seen_rtcp.insert(seq) {
            return Err(Error::ErrDuplicated);
        }
        Ok(BytesMut::from(&plaintext[..]))
    }
}

/// Engine pair plus the handles the test observes them through.
pub fn mock_engines() -> (
    CryptoEngines,
    Rc<RefCell<MockDtlsState>>,
    Rc<RefCell<MockSrtpState>>,
) {
    let (dtls, dtls_state) = MockDtlsEndpoint::new();
    let (srtp, srtp_state) = MockSrtpContext::new();
    (
        CryptoEngines {
            dtls: Box::new(dtls),
            srtp: Box::new(srtp),
        },
        dtls_state,
        srtp_state,
    )
}

// ------------------------------------------------------------ media helpers

pub fn rtp_packet(payload_type: u8, seq: u16) -> Vec<u8> {
    let mut packet = vec![0u8; 24];
    packet[0] = 0x80;
    packet[1] = payload_type;
    packet[2..4].copy_from_slice(&seq.to_be_bytes());
    packet
}

pub fn rtcp_packet(packet_type: u8) -> Vec<u8> {
    let mut packet = vec![0u8; 16];
    packet[0] = 0x80;
    packet[1] = packet_type;
    packet
}
