//! Pure wire-format classification of datagrams sharing one socket.
//!
//! All traffic of a negotiated 5-tuple arrives on a single UDP socket; the
//! first bytes of each datagram decide whether it is SRTP media, SRTCP
//! control, a DTLS record or garbage. STUN connectivity checks are consumed
//! by the ICE layer below and never reach this classifier.

/// match_range accepts packets with the first byte in [lower..upper]
fn match_range(lower: u8, upper: u8, buf: &[u8]) -> bool {
    if buf.is_empty() {
        return false;
    }
    let b = buf[0];
    b >= lower && b <= upper
}

/// MatchFuncs as described in RFC7983
/// <https://tools.ietf.org/html/rfc7983>
///              +----------------+
///              |        [0..3] -+--> forward to STUN
///              |                |
///              |      [16..19] -+--> forward to ZRTP
///              |                |
///  packet -->  |      [20..63] -+--> forward to DTLS
///              |                |
///              |      [64..79] -+--> forward to TURN Channel
///              |                |
///              |    [128..191] -+--> forward to RTP/RTCP
///              +----------------+
/// match_dtls accepts packets with the first byte in [20..63]
pub fn match_dtls(b: &[u8]) -> bool {
    match_range(20, 63, b)
}

/// match_srtp_or_srtcp accepts packets with the first byte in [128..191]
pub fn match_srtp_or_srtcp(b: &[u8]) -> bool {
    match_range(128, 191, b)
}

const RTP_HEADER_LEN: usize = 12;
const RTCP_HEADER_LEN: usize = 4;
const DTLS_RECORD_HEADER_LEN: usize = 13;

fn is_rtcp_packet_type(b: u8) -> bool {
    // RTCP packet types per RFC 5761 section 4
    (192..=223).contains(&b)
}

/// A fixed RTP header is at least 12 bytes of version 2, with a payload type
/// outside the RTCP range.
pub fn is_valid_rtp_header(buf: &[u8]) -> bool {
    buf.len() >= RTP_HEADER_LEN && match_srtp_or_srtcp(buf) && !is_rtcp_packet_type(buf[1])
}

/// An RTCP header is version 2 with a packet type in [192..223].
pub fn is_valid_rtcp_header(buf: &[u8]) -> bool {
    buf.len() >= RTCP_HEADER_LEN && match_srtp_or_srtcp(buf) && is_rtcp_packet_type(buf[1])
}

/// A DTLS record starts with a content type in [20..63] followed by a
/// {254, ..} protocol version (DTLS 1.0 is {254, 255}, DTLS 1.2 {254, 253}).
pub fn is_dtls_record(buf: &[u8]) -> bool {
    buf.len() >= DTLS_RECORD_HEADER_LEN && match_dtls(buf) && buf[1] == 254
}

/// Tagged classification consumed by the crypto transport's demultiplexer.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PacketKind {
    Rtp,
    Rtcp,
    Dtls,
    Unknown,
}

/// Classifies a datagram, in fixed precedence: RTP, then RTCP, then DTLS.
/// A datagram whose first two bits put it in the RTP/RTCP range is media even
/// when its remaining bytes would pass for a DTLS record header.
pub fn classify(buf: &[u8]) -> PacketKind {
    if is_valid_rtp_header(buf) {
        PacketKind::Rtp
    } else if is_valid_rtcp_header(buf) {
        PacketKind::Rtcp
    } else if is_dtls_record(buf) {
        PacketKind::Dtls
    } else {
        PacketKind::Unknown
    }
}
