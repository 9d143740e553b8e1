#![allow(dead_code)]

use std::collections::VecDeque;
use std::sync::{Arc, Mutex};
use std::time::Instant;

use ppp_rust::{frame, packet, LinkTransport, PppConfig, PppSession, Result};

pub type SentFrames = Arc<Mutex<Vec<Vec<u8>>>>;

/// Transport that records every transmitted frame.
pub struct MockTransport {
    pub frames: SentFrames,
    pub at_commands: Arc<Mutex<Vec<String>>>,
    pub at_responses: Arc<Mutex<VecDeque<String>>>,
}

impl MockTransport {
    pub fn new() -> (Self, SentFrames) {
        let frames: SentFrames = Arc::new(Mutex::new(Vec::new()));
        let transport = MockTransport {
            frames: Arc::clone(&frames),
            at_commands: Arc::new(Mutex::new(Vec::new())),
            at_responses: Arc::new(Mutex::new(VecDeque::new())),
        };
        (transport, frames)
    }
}

impl LinkTransport for MockTransport {
    fn send_frame(&mut self, frame: &[u8]) -> Result<()> {
        self.frames.lock().unwrap().push(frame.to_vec());
        Ok(())
    }

    fn send_at_command(&mut self, command: &str) -> Result<()> {
        self.at_commands.lock().unwrap().push(command.to_owned());
        Ok(())
    }

    fn receive_at_command(&mut self) -> Result<Option<String>> {
        Ok(self.at_responses.lock().unwrap().pop_front())
    }
}

/// Session over a recording transport.
pub fn session_with(config: PppConfig) -> (PppSession, SentFrames) {
    let (transport, frames) = MockTransport::new();
    let session = PppSession::new(config, Box::new(transport));
    (session, frames)
}

/// Decode the control packets sent so far for one protocol, as
/// `(code, identifier, payload)` triples.
pub fn control_packets(frames: &SentFrames, protocol: u16) -> Vec<(u8, u8, Vec<u8>)> {
    frames
        .lock()
        .unwrap()
        .iter()
        .filter_map(|raw| {
            let (p, payload) = frame::parse_frame(raw).expect("sent frame must parse");
            if p != protocol {
                return None;
            }
            let pkt = packet::parse_packet(payload).expect("sent packet must parse");
            Some((pkt.code, pkt.identifier, pkt.payload.to_vec()))
        })
        .collect()
}

/// Encode one TLV option.
pub fn opt(kind: u8, data: &[u8]) -> Vec<u8> {
    let mut out = vec![kind, (data.len() + 2) as u8];
    out.extend_from_slice(data);
    out
}

/// Build a complete uncompressed frame carrying one control packet, the
/// way a peer would send it.
pub fn peer_frame(protocol: u16, code: u8, identifier: u8, body: &[u8]) -> Vec<u8> {
    let mut b = packet::PacketBuilder::new(code, identifier);
    b.append(body);
    frame::build_frame(protocol, &b.finish(), false, false)
}

/// Drive a fresh session through a plain LCP + IPCP establishment with
/// no authentication. Returns the time base used.
pub fn establish_no_auth(s: &mut PppSession, frames: &SentFrames) -> Instant {
    let t0 = Instant::now();
    s.start(t0).unwrap();

    // Answer our Configure-Request and send the peer's own.
    let mru = opt(1, &1500u16.to_be_bytes());
    s.process_frame(
        t0,
        &peer_frame(frame::PPP_PROTOCOL_LCP, packet::CODE_CONFIGURE_REQ, 0x42, &mru),
    )
    .unwrap();
    s.process_frame(
        t0,
        &peer_frame(frame::PPP_PROTOCOL_LCP, packet::CODE_CONFIGURE_ACK, 1, &[]),
    )
    .unwrap();

    // LCP is Opened; IPCP negotiation begins. The peer assigns us an
    // address via Nak, then acks the updated request.
    let peer_ip = opt(3, &[10, 0, 0, 1]);
    s.process_frame(
        t0,
        &peer_frame(frame::PPP_PROTOCOL_IPCP, packet::CODE_CONFIGURE_REQ, 0x10, &peer_ip),
    )
    .unwrap();

    let mut nak = opt(3, &[192, 168, 0, 2]);
    nak.extend_from_slice(&opt(129, &[8, 8, 8, 8]));
    nak.extend_from_slice(&opt(131, &[8, 8, 4, 4]));
    s.process_frame(
        t0,
        &peer_frame(frame::PPP_PROTOCOL_IPCP, packet::CODE_CONFIGURE_NAK, 1, &nak),
    )
    .unwrap();
    s.process_frame(
        t0,
        &peer_frame(frame::PPP_PROTOCOL_IPCP, packet::CODE_CONFIGURE_ACK, 2, &[]),
    )
    .unwrap();

    assert!(s.is_established(), "link must be established");
    let _ = frames;
    t0
}
