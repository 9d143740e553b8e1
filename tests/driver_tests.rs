//! Driver-level behavior: the serialized execution context, the
//! blocking poll loops and the inbound frame queue.

mod common;

use std::time::Duration;

use common::{opt, peer_frame, MockTransport, SentFrames};
use ppp_rust::frame::{self, PPP_PROTOCOL_IPCP, PPP_PROTOCOL_LCP};
use ppp_rust::packet::{
    self, CODE_CONFIGURE_ACK, CODE_CONFIGURE_NAK, CODE_CONFIGURE_REQ,
};
use ppp_rust::{NetworkProtocol, Phase, PppConfig, PppError, PppLink};

/// Wait until the recorded frames satisfy `pred`, or panic.
async fn wait_for_frames<F>(frames: &SentFrames, pred: F) -> Vec<Vec<u8>>
where
    F: Fn(&[Vec<u8>]) -> bool,
{
    for _ in 0..200 {
        {
            let snapshot = frames.lock().unwrap();
            if pred(&snapshot) {
                return snapshot.clone();
            }
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    panic!("expected frames never showed up");
}

fn last_control(frames: &[Vec<u8>], protocol: u16) -> Option<(u8, u8, Vec<u8>)> {
    frames
        .iter()
        .filter_map(|raw| {
            let (p, payload) = frame::parse_frame(raw).ok()?;
            if p != protocol {
                return None;
            }
            let pkt = packet::parse_packet(payload).ok()?;
            Some((pkt.code, pkt.identifier, pkt.payload.to_vec()))
        })
        .last()
}

#[tokio::test]
async fn connect_times_out_and_resets() {
    let (transport, _frames) = MockTransport::new();
    let link = PppLink::new(PppConfig::default(), Box::new(transport));

    let err = link
        .connect(Some(Duration::from_millis(250)))
        .await
        .unwrap_err();
    assert_eq!(err, PppError::Timeout);
    assert_eq!(link.phase().await, Phase::Dead);
}

#[tokio::test]
async fn connect_completes_against_a_scripted_peer() {
    let (transport, frames) = MockTransport::new();
    let link = PppLink::new(PppConfig::default(), Box::new(transport));
    let sender = link.frame_sender();

    let peer_frames = SentFrames::clone(&frames);
    let peer = tokio::spawn(async move {
        // Answer the LCP Configure-Request.
        let sent = wait_for_frames(&peer_frames, |f| {
            last_control(f, PPP_PROTOCOL_LCP)
                .map(|(code, _, _)| code == CODE_CONFIGURE_REQ)
                .unwrap_or(false)
        })
        .await;
        let (_, lcp_id, _) = last_control(&sent, PPP_PROTOCOL_LCP).unwrap();

        let mru = opt(1, &1500u16.to_be_bytes());
        sender
            .send(peer_frame(PPP_PROTOCOL_LCP, CODE_CONFIGURE_REQ, 0x42, &mru))
            .unwrap();
        sender
            .send(peer_frame(PPP_PROTOCOL_LCP, CODE_CONFIGURE_ACK, lcp_id, &[]))
            .unwrap();

        // Answer IPCP: assign an address via Nak, then ack.
        let sent = wait_for_frames(&peer_frames, |f| {
            last_control(f, PPP_PROTOCOL_IPCP)
                .map(|(code, _, _)| code == CODE_CONFIGURE_REQ)
                .unwrap_or(false)
        })
        .await;
        let (_, ipcp_id, _) = last_control(&sent, PPP_PROTOCOL_IPCP).unwrap();

        sender
            .send(peer_frame(
                PPP_PROTOCOL_IPCP,
                CODE_CONFIGURE_REQ,
                0x10,
                &opt(3, &[10, 0, 0, 1]),
            ))
            .unwrap();
        sender
            .send(peer_frame(
                PPP_PROTOCOL_IPCP,
                CODE_CONFIGURE_NAK,
                ipcp_id,
                &opt(3, &[192, 168, 0, 2]),
            ))
            .unwrap();

        let sent = wait_for_frames(&peer_frames, |f| {
            last_control(f, PPP_PROTOCOL_IPCP)
                .map(|(code, id, _)| code == CODE_CONFIGURE_REQ && id == ipcp_id + 1)
                .unwrap_or(false)
        })
        .await;
        let (_, final_id, _) = last_control(&sent, PPP_PROTOCOL_IPCP).unwrap();
        sender
            .send(peer_frame(
                PPP_PROTOCOL_IPCP,
                CODE_CONFIGURE_ACK,
                final_id,
                &[],
            ))
            .unwrap();
    });

    let info = link.connect(Some(Duration::from_secs(5))).await.unwrap();
    peer.await.unwrap();

    let ipv4 = info.ipv4.expect("ipv4 addressing");
    assert_eq!(ipv4.local_addr.octets(), [192, 168, 0, 2]);
    assert_eq!(link.phase().await, Phase::Network);

    // The established link carries payload in both directions.
    link.send_packet(NetworkProtocol::Ipv4, &[0x45, 0x00])
        .await
        .unwrap();
    link.frame_sender()
        .send(frame::build_frame(
            frame::PPP_PROTOCOL_IP,
            &[0x45, 0x11],
            false,
            false,
        ))
        .unwrap();
    let delivered = link.recv_packet().await.expect("payload delivered");
    assert_eq!(delivered.protocol, NetworkProtocol::Ipv4);
    assert_eq!(delivered.payload, [0x45, 0x11]);
}

#[tokio::test]
async fn at_commands_pass_through_while_dead() {
    let (transport, _frames) = MockTransport::new();
    let at_commands = transport.at_commands.clone();
    transport
        .at_responses
        .lock()
        .unwrap()
        .push_back("OK".to_owned());

    let link = PppLink::new(PppConfig::default(), Box::new(transport));

    link.send_at_command("ATD*99#").await.unwrap();
    assert_eq!(at_commands.lock().unwrap().as_slice(), ["ATD*99#"]);

    let reply = link
        .receive_at_command(Some(Duration::from_millis(500)))
        .await
        .unwrap();
    assert_eq!(reply, "OK");

    // Nothing else queued: the poll loop times out.
    let err = link
        .receive_at_command(Some(Duration::from_millis(120)))
        .await
        .unwrap_err();
    assert_eq!(err, PppError::Timeout);
}
