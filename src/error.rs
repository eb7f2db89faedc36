use std::io;
use thiserror::Error;

pub type Result<T> = std::result::Result<T, Error>;

#[derive(Error, Debug, PartialEq)]
#[non_exhaustive]
pub enum Error {
    #[error("invalid parameter")]
    ErrInvalidParam,
    #[error("operation not valid in current state")]
    ErrWrongState,

    // per-send failures
    #[error("failed to encrypt media packet")]
    ErrEncryptFailed,
    #[error("unable to map media buffer")]
    ErrBufferMap,
    #[error("packet is neither valid RTP nor valid RTCP")]
    ErrInvalidMedia,

    // per-receive failures, always non-fatal to the transport
    #[error("no crypto context installed")]
    ErrNoCryptoContext,
    #[error("duplicated packet")]
    ErrDuplicated,
    #[error("failed to verify auth tag")]
    ErrFailedToVerifyAuthTag,
    #[error("packet is too short to be RTP packet")]
    ErrTooShortRtp,
    #[error("packet is too short to be RTCP packet")]
    ErrTooShortRtcp,

    // DTLS-SRTP keying
    #[error("no such SRTP Profile")]
    ErrNoSuchSrtpProfile,
    #[error("failed extracting keys from DTLS for SRTP")]
    ErrDtlsKeyExtractionFailed,
    #[error("SRTP master key is not long enough")]
    ErrShortSrtpMasterKey,

    // lifecycle
    #[error("feature has not been implemented yet")]
    ErrNotImplemented,
    #[error("ice transport is closed")]
    ErrIceTransportClosed,
    #[error("i/o timeout")]
    ErrTimeout,

    #[error("io error: {0}")]
    Io(String),
    #[error("{0}")]
    Other(String),
}

impl From<io::Error> for Error {
    fn from(e: io::Error) -> Self {
        Error::Io(e.to_string())
    }
}
