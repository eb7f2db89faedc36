//! Media endpoints bound to a crypto transport pair: an [`RtpReceiver`] for
//! the inbound direction and an [`RtpSender`] for the outbound one, plus the
//! transceiver tying one of each together.

pub mod rtp_receiver;
pub mod rtp_sender;

pub use rtp_receiver::{RtpReceiver, RtpReceiverCallbacks};
pub use rtp_sender::{RtpSender, RtpSenderCallbacks};

use crate::error::Result;
use crate::event_loop::EventLoop;

/// Length of generated endpoint identifiers.
pub(crate) const GENERATED_ID_LEN: usize = 24;

/// A receiver/sender pair sharing a media line.
pub struct RtpTransceiver {
    receiver: RtpReceiver,
    sender: RtpSender,
}

impl RtpTransceiver {
    pub fn new(receiver: RtpReceiver, sender: RtpSender) -> Self {
        RtpTransceiver { receiver, sender }
    }

    pub fn receiver(&self) -> &RtpReceiver {
        &self.receiver
    }

    pub fn sender(&self) -> &RtpSender {
        &self.sender
    }

    pub fn start(&self, event_loop: &EventLoop) -> Result<()> {
        self.receiver.start(event_loop)?;
        self.sender.start(event_loop)
    }

    pub fn close(&self) -> Result<()> {
        self.receiver.close()?;
        self.sender.close()
    }
}
