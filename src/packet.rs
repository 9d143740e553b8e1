//! Control-packet codec shared by LCP, the NCPs and the authentication
//! protocols.
//!
//! Every control packet starts with a four-byte header: `Code(1)
//! Identifier(1) Length(2, big endian, including the header)`. For the
//! configuration codes the body is an ordered sequence of TLV options:
//! `Type(1) Length(1, including these two bytes) Value(Length-2)`.

use crate::error::{PppError, Result};

/// Configure-Request code.
pub const CODE_CONFIGURE_REQ: u8 = 1;
/// Configure-Ack code.
pub const CODE_CONFIGURE_ACK: u8 = 2;
/// Configure-Nak code.
pub const CODE_CONFIGURE_NAK: u8 = 3;
/// Configure-Reject code.
pub const CODE_CONFIGURE_REJ: u8 = 4;
/// Terminate-Request code.
pub const CODE_TERMINATE_REQ: u8 = 5;
/// Terminate-Ack code.
pub const CODE_TERMINATE_ACK: u8 = 6;
/// Code-Reject code.
pub const CODE_CODE_REJ: u8 = 7;
/// Protocol-Reject code (LCP only).
pub const CODE_PROTOCOL_REJ: u8 = 8;
/// Echo-Request code (LCP only).
pub const CODE_ECHO_REQ: u8 = 9;
/// Echo-Reply code (LCP only).
pub const CODE_ECHO_REP: u8 = 10;
/// Discard-Request code (LCP only).
pub const CODE_DISCARD_REQ: u8 = 11;

/// Size of the control-packet header, in bytes.
pub const PACKET_HEADER_SIZE: usize = 4;
/// Size of an option header, in bytes.
pub const OPTION_HEADER_SIZE: usize = 2;
/// Upper bound on the size of a packet we originate.
pub const PPP_MAX_CONF_REQ_SIZE: usize = 128;

/// Borrowed view of a received control packet.
///
/// `payload` excludes the four header bytes; `raw` spans the whole
/// packet as declared by its Length field (used when the packet has to
/// be echoed back inside a Code-Reject).
#[derive(Debug, Clone, Copy)]
pub struct Packet<'a> {
    pub code: u8,
    pub identifier: u8,
    pub payload: &'a [u8],
    pub raw: &'a [u8],
}

/// Parse a control-packet header and validate its Length field against
/// the received data. Trailing padding beyond the declared length is
/// discarded.
pub fn parse_packet(data: &[u8]) -> Result<Packet<'_>> {
    if data.len() < PACKET_HEADER_SIZE {
        return Err(PppError::MalformedPacket);
    }

    let declared = usize::from(u16::from_be_bytes([data[2], data[3]]));
    if declared > data.len() || declared < PACKET_HEADER_SIZE {
        return Err(PppError::MalformedPacket);
    }

    Ok(Packet {
        code: data[0],
        identifier: data[1],
        payload: &data[PACKET_HEADER_SIZE..declared],
        raw: &data[..declared],
    })
}

/// Classification of a single configuration option by a protocol's
/// option codec. The Configure-Request handler folds these over every
/// option of a request to pick the reply code, with the priority
/// Reject > Nak > Ack.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OptionStatus {
    /// Recognized and the value is acceptable.
    Acceptable,
    /// Recognized but the value is not acceptable; a Nak reply carries
    /// the preferred value.
    NotAcceptable,
    /// Not recognized or not open for negotiation; a Reject reply
    /// carries the option verbatim.
    NotRecognizable,
}

/// Borrowed view of one TLV option.
#[derive(Debug, Clone, Copy)]
pub struct RawOption<'a> {
    pub kind: u8,
    /// Option value, excluding the two header bytes.
    pub data: &'a [u8],
}

impl RawOption<'_> {
    /// Length of the option on the wire, including its header.
    pub fn wire_len(&self) -> usize {
        self.data.len() + OPTION_HEADER_SIZE
    }
}

/// Iterator over the options of a configuration packet payload.
///
/// A declared option length smaller than the option header or larger
/// than the remaining payload yields `Err(MalformedPacket)` and ends
/// the iteration; the enclosing request must then be discarded as a
/// whole.
pub struct OptionIter<'a> {
    rest: &'a [u8],
    failed: bool,
}

/// Iterate over the options contained in `payload`.
pub fn options(payload: &[u8]) -> OptionIter<'_> {
    OptionIter {
        rest: payload,
        failed: false,
    }
}

impl<'a> Iterator for OptionIter<'a> {
    type Item = Result<RawOption<'a>>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.failed || self.rest.is_empty() {
            return None;
        }

        if self.rest.len() < OPTION_HEADER_SIZE {
            self.failed = true;
            return Some(Err(PppError::MalformedPacket));
        }

        let kind = self.rest[0];
        let length = usize::from(self.rest[1]);
        if length < OPTION_HEADER_SIZE || length > self.rest.len() {
            self.failed = true;
            return Some(Err(PppError::MalformedPacket));
        }

        let data = &self.rest[OPTION_HEADER_SIZE..length];
        self.rest = &self.rest[length..];
        Some(Ok(RawOption { kind, data }))
    }
}

/// Builder assembling a control packet front to back.
///
/// The Length field is patched in when the packet is finished; the
/// buffer is never rewritten in place after that.
#[derive(Debug)]
pub struct PacketBuilder {
    code: u8,
    buf: Vec<u8>,
}

impl PacketBuilder {
    /// Start a packet with the given code and identifier.
    pub fn new(code: u8, identifier: u8) -> Self {
        let mut buf = Vec::with_capacity(PPP_MAX_CONF_REQ_SIZE);
        buf.push(code);
        buf.push(identifier);
        buf.extend_from_slice(&[0, 0]);
        PacketBuilder { code, buf }
    }

    /// Code this packet is being built with.
    pub fn code(&self) -> u8 {
        self.code
    }

    /// Current packet length, header included.
    pub fn len(&self) -> usize {
        self.buf.len()
    }

    /// Whether any body bytes have been appended yet.
    pub fn is_empty(&self) -> bool {
        self.buf.len() == PACKET_HEADER_SIZE
    }

    /// Append one TLV option.
    pub fn add_option(&mut self, kind: u8, value: &[u8]) {
        debug_assert!(value.len() + OPTION_HEADER_SIZE <= usize::from(u8::MAX));
        self.buf.push(kind);
        self.buf.push((value.len() + OPTION_HEADER_SIZE) as u8);
        self.buf.extend_from_slice(value);
    }

    /// Append raw body bytes (non-TLV packet bodies).
    pub fn append(&mut self, bytes: &[u8]) {
        self.buf.extend_from_slice(bytes);
    }

    /// Append a single body byte.
    pub fn push(&mut self, byte: u8) {
        self.buf.push(byte);
    }

    /// Finish the packet, patching the Length field.
    pub fn finish(mut self) -> Vec<u8> {
        let length = self.buf.len() as u16;
        self.buf[2..4].copy_from_slice(&length.to_be_bytes());
        self.buf
    }
}
