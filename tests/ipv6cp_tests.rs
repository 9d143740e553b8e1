//! IPV6CP interface-identifier negotiation.

mod common;

use std::net::Ipv6Addr;
use std::time::Instant;

use common::{control_packets, opt, peer_frame, session_with};
use ppp_rust::frame::{PPP_PROTOCOL_IPV6CP, PPP_PROTOCOL_LCP};
use ppp_rust::ipv6cp::link_local_addr;
use ppp_rust::packet::{
    CODE_CONFIGURE_ACK, CODE_CONFIGURE_NAK, CODE_CONFIGURE_REJ, CODE_CONFIGURE_REQ,
};
use ppp_rust::{Phase, PppConfig, PppState};

const PEER_ID: [u8; 8] = [0x02, 0x00, 0x5E, 0xFF, 0xFE, 0x00, 0x53, 0x01];
const ASSIGNED_ID: [u8; 8] = [0x02, 0x00, 0x5E, 0xFF, 0xFE, 0x00, 0x53, 0x02];

/// Bring LCP up so the NCPs start negotiating.
fn open_lcp(s: &mut ppp_rust::PppSession, t0: Instant) {
    let body = opt(1, &1500u16.to_be_bytes());
    s.process_frame(
        t0,
        &peer_frame(PPP_PROTOCOL_LCP, CODE_CONFIGURE_REQ, 0x42, &body),
    )
    .unwrap();
    s.process_frame(
        t0,
        &peer_frame(PPP_PROTOCOL_LCP, CODE_CONFIGURE_ACK, 1, &[]),
    )
    .unwrap();
    assert_eq!(s.phase(), Phase::Network);
}

#[test]
fn link_local_addr_derivation() {
    let addr = link_local_addr(&PEER_ID);
    assert_eq!(
        addr,
        Ipv6Addr::new(0xFE80, 0, 0, 0, 0x0200, 0x5EFF, 0xFE00, 0x5301)
    );
}

#[test]
fn interface_id_is_assigned_through_nak() {
    let (mut s, frames) = session_with(PppConfig::default());
    let t0 = Instant::now();
    s.start(t0).unwrap();
    open_lcp(&mut s, t0);

    // Our first request offers the all-zero identifier, asking for an
    // assignment.
    let sent = control_packets(&frames, PPP_PROTOCOL_IPV6CP);
    assert_eq!(sent.len(), 1);
    assert_eq!(sent[0].0, CODE_CONFIGURE_REQ);
    assert_eq!(sent[0].2, opt(1, &[0; 8]));

    // The peer suggests an identifier; the new request carries it.
    s.process_frame(
        t0,
        &peer_frame(
            PPP_PROTOCOL_IPV6CP,
            CODE_CONFIGURE_NAK,
            1,
            &opt(1, &ASSIGNED_ID),
        ),
    )
    .unwrap();

    let sent = control_packets(&frames, PPP_PROTOCOL_IPV6CP);
    let (code, identifier, payload) = sent.last().unwrap();
    assert_eq!(*code, CODE_CONFIGURE_REQ);
    assert_eq!(*identifier, 2);
    assert_eq!(payload, &opt(1, &ASSIGNED_ID));

    // The peer's own request and the final ack open the automaton.
    s.process_frame(
        t0,
        &peer_frame(
            PPP_PROTOCOL_IPV6CP,
            CODE_CONFIGURE_REQ,
            0x60,
            &opt(1, &PEER_ID),
        ),
    )
    .unwrap();
    s.process_frame(
        t0,
        &peer_frame(PPP_PROTOCOL_IPV6CP, CODE_CONFIGURE_ACK, 2, &[]),
    )
    .unwrap();

    assert_eq!(s.ipv6cp_state(), PppState::Opened);
    let info = s.session_info().ipv6.expect("ipv6 addressing");
    assert_eq!(info.local_addr, link_local_addr(&ASSIGNED_ID));
    assert_eq!(info.peer_addr, link_local_addr(&PEER_ID));
}

#[test]
fn zero_peer_interface_id_is_naked_with_suggestion() {
    let (mut s, frames) = session_with(PppConfig {
        peer_interface_id: PEER_ID,
        ..PppConfig::default()
    });
    let t0 = Instant::now();
    s.start(t0).unwrap();
    open_lcp(&mut s, t0);

    // The peer asks us to assign its identifier.
    s.process_frame(
        t0,
        &peer_frame(
            PPP_PROTOCOL_IPV6CP,
            CODE_CONFIGURE_REQ,
            0x61,
            &opt(1, &[0; 8]),
        ),
    )
    .unwrap();

    let sent = control_packets(&frames, PPP_PROTOCOL_IPV6CP);
    let reply = sent.last().unwrap();
    assert_eq!(reply.0, CODE_CONFIGURE_NAK);
    assert_eq!(reply.1, 0x61);
    assert_eq!(reply.2, opt(1, &PEER_ID));
}

#[test]
fn unknown_ipv6cp_option_is_rejected() {
    let (mut s, frames) = session_with(PppConfig::default());
    let t0 = Instant::now();
    s.start(t0).unwrap();
    open_lcp(&mut s, t0);

    // IPv6-Compression-Protocol is not open for negotiation here.
    let mut body = opt(1, &PEER_ID);
    body.extend_from_slice(&opt(2, &[0x00, 0x4F]));
    s.process_frame(
        t0,
        &peer_frame(PPP_PROTOCOL_IPV6CP, CODE_CONFIGURE_REQ, 0x62, &body),
    )
    .unwrap();

    let sent = control_packets(&frames, PPP_PROTOCOL_IPV6CP);
    let reply = sent.last().unwrap();
    assert_eq!(reply.0, CODE_CONFIGURE_REJ);
    assert_eq!(reply.2, opt(2, &[0x00, 0x4F]));
}

#[test]
fn rejected_interface_id_stops_being_offered() {
    let (mut s, frames) = session_with(PppConfig::default());
    let t0 = Instant::now();
    s.start(t0).unwrap();
    open_lcp(&mut s, t0);

    s.process_frame(
        t0,
        &peer_frame(
            PPP_PROTOCOL_IPV6CP,
            CODE_CONFIGURE_REJ,
            1,
            &opt(1, &[0; 8]),
        ),
    )
    .unwrap();

    let sent = control_packets(&frames, PPP_PROTOCOL_IPV6CP);
    let (code, _, payload) = sent.last().unwrap();
    assert_eq!(*code, CODE_CONFIGURE_REQ);
    assert!(payload.is_empty(), "nothing left to negotiate");
}
