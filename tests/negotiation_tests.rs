//! Option negotiation, framing and retransmission behavior of the
//! session, observed through a recording transport.

mod common;

use std::net::Ipv4Addr;
use std::time::{Duration, Instant};

use common::{control_packets, establish_no_auth, opt, peer_frame, session_with};
use ppp_rust::frame::{
    self, PPP_PROTOCOL_IPCP, PPP_PROTOCOL_IPV6CP, PPP_PROTOCOL_LCP, PPP_MIN_MRU,
};
use ppp_rust::packet::{
    self, CODE_CONFIGURE_ACK, CODE_CONFIGURE_NAK, CODE_CONFIGURE_REJ, CODE_CONFIGURE_REQ,
    CODE_ECHO_REP, CODE_ECHO_REQ, CODE_PROTOCOL_REJ, CODE_TERMINATE_ACK, CODE_TERMINATE_REQ,
};
use ppp_rust::{PppConfig, PppError, Phase, PppState};

#[test]
fn start_sends_configure_request() {
    let (mut s, frames) = session_with(PppConfig::default());
    s.start(Instant::now()).unwrap();

    assert_eq!(s.phase(), Phase::Establish);
    assert_eq!(s.lcp_state(), PppState::ReqSent);

    let lcp = control_packets(&frames, PPP_PROTOCOL_LCP);
    assert_eq!(lcp.len(), 1);
    let (code, identifier, payload) = &lcp[0];
    assert_eq!(*code, CODE_CONFIGURE_REQ);
    assert_eq!(*identifier, 1);

    // MRU, ACCM, PFC and ACFC are offered; no authentication is
    // demanded without a verify callback.
    let mut expected = opt(1, &1500u16.to_be_bytes());
    expected.extend_from_slice(&opt(2, &0u32.to_be_bytes()));
    expected.extend_from_slice(&opt(7, &[]));
    expected.extend_from_slice(&opt(8, &[]));
    assert_eq!(payload, &expected);
}

#[test]
fn plain_link_reaches_network_phase() {
    let (mut s, frames) = session_with(PppConfig::default());
    establish_no_auth(&mut s, &frames);

    assert_eq!(s.phase(), Phase::Network);
    assert_eq!(s.lcp_state(), PppState::Opened);
    assert_eq!(s.ipcp_state(), PppState::Opened);

    // The addressing assigned through the IPCP Nak is in effect.
    let info = s.session_info().ipv4.expect("ipv4 addressing");
    assert_eq!(info.local_addr, Ipv4Addr::new(192, 168, 0, 2));
    assert_eq!(info.peer_addr, Ipv4Addr::new(10, 0, 0, 1));
    assert_eq!(info.primary_dns, Some(Ipv4Addr::new(8, 8, 8, 8)));
    assert_eq!(info.secondary_dns, Some(Ipv4Addr::new(8, 8, 4, 4)));
    assert_eq!(info.subnet_mask, Ipv4Addr::new(255, 255, 255, 255));

    // Both NCPs sent their requests only after LCP opened.
    assert!(!control_packets(&frames, PPP_PROTOCOL_IPCP).is_empty());
    assert!(!control_packets(&frames, PPP_PROTOCOL_IPV6CP).is_empty());
}

#[test]
fn reject_dominates_nak() {
    let (mut s, frames) = session_with(PppConfig::default());
    let t0 = Instant::now();
    s.start(t0).unwrap();

    // One unrecognized option plus one out-of-range MRU: the whole
    // reply must be a Configure-Reject carrying only the unknown
    // option.
    let mut body = opt(0x55, &[0xAA, 0xBB]);
    body.extend_from_slice(&opt(1, &100u16.to_be_bytes()));
    s.process_frame(
        t0,
        &peer_frame(PPP_PROTOCOL_LCP, CODE_CONFIGURE_REQ, 9, &body),
    )
    .unwrap();

    let lcp = control_packets(&frames, PPP_PROTOCOL_LCP);
    let reply = lcp.last().unwrap();
    assert_eq!(reply.0, CODE_CONFIGURE_REJ);
    assert_eq!(reply.1, 9);
    assert_eq!(reply.2, opt(0x55, &[0xAA, 0xBB]));
    assert_eq!(s.lcp_state(), PppState::ReqSent);
}

#[test]
fn unacceptable_value_is_naked_with_preferred_value() {
    let (mut s, frames) = session_with(PppConfig::default());
    let t0 = Instant::now();
    s.start(t0).unwrap();

    let body = opt(1, &100u16.to_be_bytes());
    s.process_frame(
        t0,
        &peer_frame(PPP_PROTOCOL_LCP, CODE_CONFIGURE_REQ, 3, &body),
    )
    .unwrap();

    let lcp = control_packets(&frames, PPP_PROTOCOL_LCP);
    let reply = lcp.last().unwrap();
    assert_eq!(reply.0, CODE_CONFIGURE_NAK);
    assert_eq!(reply.1, 3);
    assert_eq!(reply.2, opt(1, &1500u16.to_be_bytes()));
}

#[test]
fn mru_at_floor_is_acceptable() {
    let (mut s, frames) = session_with(PppConfig::default());
    let t0 = Instant::now();
    s.start(t0).unwrap();

    let body = opt(1, &PPP_MIN_MRU.to_be_bytes());
    s.process_frame(
        t0,
        &peer_frame(PPP_PROTOCOL_LCP, CODE_CONFIGURE_REQ, 4, &body),
    )
    .unwrap();

    let lcp = control_packets(&frames, PPP_PROTOCOL_LCP);
    let reply = lcp.last().unwrap();
    assert_eq!(reply.0, CODE_CONFIGURE_ACK);
    assert_eq!(reply.2, body);
}

#[test]
fn option_codec_round_trips() {
    // parse(format(value)) == value for every supported option shape.
    let mut b = packet::PacketBuilder::new(CODE_CONFIGURE_REQ, 7);
    b.add_option(1, &PPP_MIN_MRU.to_be_bytes());
    b.add_option(2, &0xA5A5_5A5Au32.to_be_bytes());
    b.add_option(5, &[1, 2, 3, 4]);
    b.add_option(7, &[]);
    let bytes = b.finish();

    let pkt = packet::parse_packet(&bytes).unwrap();
    assert_eq!(pkt.code, CODE_CONFIGURE_REQ);
    assert_eq!(pkt.identifier, 7);

    let options: Vec<_> = packet::options(pkt.payload)
        .collect::<ppp_rust::Result<Vec<_>>>()
        .unwrap();
    assert_eq!(options.len(), 4);
    assert_eq!(options[0].kind, 1);
    assert_eq!(options[0].data, PPP_MIN_MRU.to_be_bytes());
    assert_eq!(options[1].kind, 2);
    assert_eq!(options[1].data, 0xA5A5_5A5Au32.to_be_bytes());
    assert_eq!(options[2].data, [1, 2, 3, 4]);
    assert_eq!(options[3].kind, 7);
    assert!(options[3].data.is_empty());
}

#[test]
fn malformed_option_length_drops_whole_request() {
    let (mut s, frames) = session_with(PppConfig::default());
    let t0 = Instant::now();
    s.start(t0).unwrap();
    let sent_before = frames.lock().unwrap().len();

    // Declared option length runs past the end of the packet.
    let body = [1u8, 30, 0x05, 0xDC];
    let err = s
        .process_frame(
            t0,
            &peer_frame(PPP_PROTOCOL_LCP, CODE_CONFIGURE_REQ, 5, &body),
        )
        .unwrap_err();

    assert_eq!(err, PppError::MalformedPacket);
    assert_eq!(s.lcp_state(), PppState::ReqSent);
    assert_eq!(frames.lock().unwrap().len(), sent_before, "no reply sent");
}

#[test]
fn ack_with_wrong_identifier_is_discarded() {
    let (mut s, _frames) = session_with(PppConfig::default());
    let t0 = Instant::now();
    s.start(t0).unwrap();

    let err = s
        .process_frame(
            t0,
            &peer_frame(PPP_PROTOCOL_LCP, CODE_CONFIGURE_ACK, 99, &[]),
        )
        .unwrap_err();

    assert_eq!(err, PppError::WrongIdentifier);
    assert_eq!(s.lcp_state(), PppState::ReqSent);
}

#[test]
fn configure_request_retransmits_up_to_the_budget() {
    let (mut s, frames) = session_with(PppConfig::default());
    let t0 = Instant::now();
    s.start(t0).unwrap();

    // One transmission happened on start; each elapsed restart period
    // retransmits until the counter runs out, then TO- finalizes the
    // automaton and the session falls back to Dead.
    for k in 1..=10u64 {
        s.tick(t0 + Duration::from_millis(3100 * k)).unwrap();
    }

    let requests = control_packets(&frames, PPP_PROTOCOL_LCP)
        .iter()
        .filter(|(code, _, _)| *code == CODE_CONFIGURE_REQ)
        .count();
    assert_eq!(requests, 10, "restart counter bounds the transmissions");
    assert_eq!(s.phase(), Phase::Dead);
}

#[test]
fn established_link_stops_retransmitting() {
    let (mut s, frames) = session_with(PppConfig::default());
    let t0 = establish_no_auth(&mut s, &frames);

    let lcp_requests = |frames: &common::SentFrames| {
        control_packets(frames, PPP_PROTOCOL_LCP)
            .iter()
            .filter(|(code, _, _)| *code == CODE_CONFIGURE_REQ)
            .count()
    };

    let before = lcp_requests(&frames);
    for k in 1..=5u64 {
        s.tick(t0 + Duration::from_millis(3100 * k)).unwrap();
    }
    assert_eq!(lcp_requests(&frames), before, "no retransmission once Opened");
    assert_eq!(s.lcp_state(), PppState::Opened);
}

#[test]
fn echo_request_is_answered_when_opened() {
    let (mut s, frames) = session_with(PppConfig::default());
    let t0 = establish_no_auth(&mut s, &frames);

    let mut body = vec![0xDE, 0xAD, 0xBE, 0xEF];
    body.extend_from_slice(b"ping");
    s.process_frame(t0, &peer_frame(PPP_PROTOCOL_LCP, CODE_ECHO_REQ, 7, &body))
        .unwrap();

    let lcp = control_packets(&frames, PPP_PROTOCOL_LCP);
    let reply = lcp.last().unwrap();
    assert_eq!(reply.0, CODE_ECHO_REP);
    assert_eq!(reply.1, 7);

    // Our magic number replaces the peer's; the data is echoed.
    let mut expected = vec![0, 0, 0, 0];
    expected.extend_from_slice(b"ping");
    assert_eq!(reply.2, expected);
}

#[test]
fn echo_request_is_ignored_before_opened() {
    let (mut s, frames) = session_with(PppConfig::default());
    let t0 = Instant::now();
    s.start(t0).unwrap();
    let sent_before = frames.lock().unwrap().len();

    let body = [0u8; 4];
    s.process_frame(t0, &peer_frame(PPP_PROTOCOL_LCP, CODE_ECHO_REQ, 7, &body))
        .unwrap();
    assert_eq!(frames.lock().unwrap().len(), sent_before);
}

#[test]
fn close_handshake_reaches_dead_phase() {
    let (mut s, frames) = session_with(PppConfig::default());
    let t0 = establish_no_auth(&mut s, &frames);

    s.close(t0).unwrap();
    assert_eq!(s.phase(), Phase::Terminate);

    let lcp = control_packets(&frames, PPP_PROTOCOL_LCP);
    let (code, identifier, _) = lcp.last().unwrap();
    assert_eq!(*code, CODE_TERMINATE_REQ);

    s.process_frame(
        t0,
        &peer_frame(PPP_PROTOCOL_LCP, CODE_TERMINATE_ACK, *identifier, &[]),
    )
    .unwrap();
    assert_eq!(s.phase(), Phase::Dead);
    assert_eq!(s.lcp_state(), PppState::Initial);
}

#[test]
fn peer_terminate_request_is_acknowledged() {
    let (mut s, frames) = session_with(PppConfig::default());
    let t0 = establish_no_auth(&mut s, &frames);

    s.process_frame(
        t0,
        &peer_frame(PPP_PROTOCOL_LCP, CODE_TERMINATE_REQ, 0x31, &[]),
    )
    .unwrap();

    let lcp = control_packets(&frames, PPP_PROTOCOL_LCP);
    let reply = lcp.last().unwrap();
    assert_eq!(reply.0, CODE_TERMINATE_ACK);
    assert_eq!(reply.1, 0x31, "Terminate-Ack copies the request identifier");
    assert_eq!(s.phase(), Phase::Terminate);
    assert_eq!(s.lcp_state(), PppState::Stopping);
}

#[test]
fn unsupported_protocol_triggers_protocol_reject_once_opened() {
    let (mut s, frames) = session_with(PppConfig::default());
    let t0 = establish_no_auth(&mut s, &frames);

    let raw = frame::build_frame(0x8031, &[0x01, 0x02, 0x03], false, false);
    s.process_frame(t0, &raw).unwrap();

    let lcp = control_packets(&frames, PPP_PROTOCOL_LCP);
    let reply = lcp.last().unwrap();
    assert_eq!(reply.0, CODE_PROTOCOL_REJ);
    assert!(reply.2.starts_with(&[0x80, 0x31]));
    assert!(reply.2.ends_with(&[0x01, 0x02, 0x03]));
}

#[test]
fn unsupported_protocol_is_dropped_before_opened() {
    let (mut s, frames) = session_with(PppConfig::default());
    let t0 = Instant::now();
    s.start(t0).unwrap();
    let sent_before = frames.lock().unwrap().len();

    let raw = frame::build_frame(0x8031, &[0x01], false, false);
    s.process_frame(t0, &raw).unwrap();
    assert_eq!(frames.lock().unwrap().len(), sent_before);
}

#[test]
fn frame_fcs_round_trip_and_corruption() {
    let payload = [0x01, 0x02, 0x03, 0x04];
    let raw = frame::build_frame(PPP_PROTOCOL_LCP, &payload, false, false);

    // Uncompressed framing: address, control, two-byte protocol.
    assert_eq!(&raw[..4], &[0xFF, 0x03, 0xC0, 0x21]);
    let (protocol, body) = frame::parse_frame(&raw).unwrap();
    assert_eq!(protocol, PPP_PROTOCOL_LCP);
    assert_eq!(body, payload);

    let mut corrupted = raw.clone();
    corrupted[5] ^= 0x01;
    assert_eq!(
        frame::parse_frame(&corrupted).unwrap_err(),
        PppError::MalformedPacket
    );
}

#[test]
fn frame_header_compression_forms() {
    // With both compressions granted, an IPv4 payload frame omits the
    // address/control pair and shortens the protocol field.
    let raw = frame::build_frame(frame::PPP_PROTOCOL_IP, &[0x45, 0x00], true, true);
    assert_eq!(raw[0], 0x21);
    let (protocol, body) = frame::parse_frame(&raw).unwrap();
    assert_eq!(protocol, frame::PPP_PROTOCOL_IP);
    assert_eq!(body, [0x45, 0x00]);

    // LCP keeps the address and control fields even under ACFC.
    let raw = frame::build_frame(PPP_PROTOCOL_LCP, &[0x01], true, true);
    assert_eq!(&raw[..2], &[0xFF, 0x03]);

    // A protocol with a non-zero high byte is never compressed.
    let raw = frame::build_frame(PPP_PROTOCOL_IPCP, &[0x01], true, true);
    assert_eq!(&raw[..2], &[0x80, 0x21]);
}

#[test]
fn network_payload_is_delivered_and_sent_only_when_up() {
    let (mut s, frames) = session_with(PppConfig::default());

    // Not established yet: sending is refused.
    assert_eq!(
        s.send_packet(ppp_rust::NetworkProtocol::Ipv4, &[0x45]),
        Err(PppError::NotConnected)
    );

    let t0 = establish_no_auth(&mut s, &frames);

    // Inbound IPv4 payload is handed back to the caller.
    let raw = frame::build_frame(frame::PPP_PROTOCOL_IP, &[0x45, 0x00, 0x00, 0x14], false, false);
    let delivered = s.process_frame(t0, &raw).unwrap().expect("payload");
    assert_eq!(delivered.protocol, ppp_rust::NetworkProtocol::Ipv4);
    assert_eq!(delivered.payload, [0x45, 0x00, 0x00, 0x14]);

    // Outbound IPv4 goes out now.
    s.send_packet(ppp_rust::NetworkProtocol::Ipv4, &[0x45, 0x00]).unwrap();
    let last = frames.lock().unwrap().last().unwrap().clone();
    let (protocol, body) = frame::parse_frame(&last).unwrap();
    assert_eq!(protocol, frame::PPP_PROTOCOL_IP);
    assert_eq!(body, [0x45, 0x00]);

    // IPv6 never came up.
    assert_eq!(
        s.send_packet(ppp_rust::NetworkProtocol::Ipv6, &[0x60]),
        Err(PppError::NotConnected)
    );
}

#[test]
fn rejected_option_is_not_offered_again() {
    let (mut s, frames) = session_with(PppConfig::default());
    let t0 = Instant::now();
    s.start(t0).unwrap();

    // The peer rejects ACCM, PFC and ACFC; the next request must omit
    // them and keep MRU.
    let mut rejected = opt(2, &0u32.to_be_bytes());
    rejected.extend_from_slice(&opt(7, &[]));
    rejected.extend_from_slice(&opt(8, &[]));
    s.process_frame(
        t0,
        &peer_frame(PPP_PROTOCOL_LCP, CODE_CONFIGURE_REJ, 1, &rejected),
    )
    .unwrap();

    let lcp = control_packets(&frames, PPP_PROTOCOL_LCP);
    let (code, identifier, payload) = lcp.last().unwrap();
    assert_eq!(*code, CODE_CONFIGURE_REQ);
    assert_eq!(*identifier, 2);
    assert_eq!(payload, &opt(1, &1500u16.to_be_bytes()));
}

#[test]
fn nak_adjusts_the_requested_mru() {
    let (mut s, frames) = session_with(PppConfig::default());
    let t0 = Instant::now();
    s.start(t0).unwrap();

    s.process_frame(
        t0,
        &peer_frame(
            PPP_PROTOCOL_LCP,
            CODE_CONFIGURE_NAK,
            1,
            &opt(1, &1280u16.to_be_bytes()),
        ),
    )
    .unwrap();

    let lcp = control_packets(&frames, PPP_PROTOCOL_LCP);
    let (code, _, payload) = lcp.last().unwrap();
    assert_eq!(*code, CODE_CONFIGURE_REQ);
    assert!(payload.starts_with(&opt(1, &1280u16.to_be_bytes())));
}

#[test]
fn renegotiation_while_opened_cycles_the_link() {
    let (mut s, frames) = session_with(PppConfig::default());
    let t0 = establish_no_auth(&mut s, &frames);

    // A Configure-Request on an Opened link reopens negotiation: the
    // link goes down, both sides re-exchange requests.
    let body = opt(1, &1500u16.to_be_bytes());
    s.process_frame(
        t0,
        &peer_frame(PPP_PROTOCOL_LCP, CODE_CONFIGURE_REQ, 0x50, &body),
    )
    .unwrap();

    assert_eq!(s.lcp_state(), PppState::AckSent);
    assert!(s.session_info().ipv4.is_none(), "addressing was revoked");

    // Our renegotiation request went out together with the ack.
    let lcp = control_packets(&frames, PPP_PROTOCOL_LCP);
    let (code, identifier, _) = &lcp[lcp.len() - 2];
    let identifier = *identifier;
    assert_eq!(*code, CODE_CONFIGURE_REQ);
    assert_eq!(lcp.last().unwrap().0, CODE_CONFIGURE_ACK);

    // Completing the exchange brings the link back up and restarts the
    // NCPs.
    let ipcp_before = control_packets(&frames, PPP_PROTOCOL_IPCP).len();
    s.process_frame(
        t0,
        &peer_frame(PPP_PROTOCOL_LCP, CODE_CONFIGURE_ACK, identifier, &[]),
    )
    .unwrap();
    assert_eq!(s.lcp_state(), PppState::Opened);
    assert_eq!(s.phase(), Phase::Network);
    assert!(control_packets(&frames, PPP_PROTOCOL_IPCP).len() > ipcp_before);
}

#[test]
fn catastrophic_code_reject_tears_the_link_down() {
    let (mut s, frames) = session_with(PppConfig::default());
    let t0 = establish_no_auth(&mut s, &frames);

    // A Code-Reject of Configure-Request is unrecoverable.
    let rejected = [CODE_CONFIGURE_REQ, 0x01, 0x00, 0x04];
    s.process_frame(
        t0,
        &peer_frame(PPP_PROTOCOL_LCP, packet::CODE_CODE_REJ, 0x44, &rejected),
    )
    .unwrap();

    assert_eq!(s.lcp_state(), PppState::Stopping);
    assert_eq!(s.phase(), Phase::Terminate);
    let lcp = control_packets(&frames, PPP_PROTOCOL_LCP);
    assert_eq!(lcp.last().unwrap().0, CODE_TERMINATE_REQ);
}

#[test]
fn unknown_code_is_answered_with_code_reject() {
    let (mut s, frames) = session_with(PppConfig::default());
    let t0 = Instant::now();
    s.start(t0).unwrap();

    s.process_frame(
        t0,
        &peer_frame(PPP_PROTOCOL_LCP, 0xEE, 0x13, &[0xAA, 0xBB]),
    )
    .unwrap();

    let lcp = control_packets(&frames, PPP_PROTOCOL_LCP);
    let reply = lcp.last().unwrap();
    assert_eq!(reply.0, packet::CODE_CODE_REJ);
    // The rejected packet is echoed in the body.
    assert_eq!(reply.2, [0xEE, 0x13, 0x00, 0x06, 0xAA, 0xBB]);
    assert_eq!(s.lcp_state(), PppState::ReqSent);
}

#[test]
fn at_commands_only_while_dead() {
    let (mut s, _frames) = session_with(PppConfig::default());

    s.send_at_command("ATD*99#").unwrap();
    assert_eq!(s.receive_at_command().unwrap(), None);

    s.start(Instant::now()).unwrap();
    assert_eq!(
        s.send_at_command("AT").unwrap_err(),
        PppError::AlreadyConnected
    );
    assert_eq!(
        s.receive_at_command().unwrap_err(),
        PppError::AlreadyConnected
    );
}
