//! Contract between the session and the framed-byte transport below it.

use crate::error::{PppError, Result};

/// A link-layer channel able to carry complete PPP frames.
///
/// The transport is only responsible for moving opaque byte buffers:
/// framing (FCS, header compression) is applied by the session before
/// [`send_frame`](LinkTransport::send_frame) is called, and inbound
/// buffers handed to the session are expected to be de-framed and
/// FCS-intact as received from the wire.
///
/// The AT-command hooks cover transports sitting on top of a modem;
/// they are only exercised while the session is in the Dead phase.
pub trait LinkTransport: Send {
    /// Queue one complete frame for transmission.
    fn send_frame(&mut self, frame: &[u8]) -> Result<()>;

    /// Send a raw AT command to the underlying modem.
    fn send_at_command(&mut self, command: &str) -> Result<()> {
        let _ = command;
        Err(PppError::NotSupported)
    }

    /// Poll for a pending AT command response, if any.
    fn receive_at_command(&mut self) -> Result<Option<String>> {
        Ok(None)
    }

    /// Discard any buffered receive data.
    fn purge_receive_buffer(&mut self) -> Result<()> {
        Ok(())
    }
}
