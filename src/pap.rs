//! PAP (Password Authentication Protocol).
//!
//! PAP keeps two independent sub-states: the local one tracks us
//! authenticating the peer (answering Authenticate-Requests), the peer
//! one tracks the peer authenticating us (sending Authenticate-Requests
//! and waiting for the verdict). Either direction may be inactive when
//! the corresponding side required no authentication.

use std::time::{Duration, Instant};

use crate::config::{CheckInner, PasswordCheck};
use crate::error::{PppError, Result};
use crate::frame::PPP_PROTOCOL_PAP;
use crate::lcp;
use crate::log;
use crate::packet::{self, Packet, PacketBuilder};
use crate::session::PppSession;
use crate::types::{AuthProtocol, Phase};

/// Authenticate-Request code.
pub const PAP_CODE_AUTH_REQ: u8 = 1;
/// Authenticate-Ack code.
pub const PAP_CODE_AUTH_ACK: u8 = 2;
/// Authenticate-Nak code.
pub const PAP_CODE_AUTH_NAK: u8 = 3;

/// Restart timer period for Authenticate-Request retransmission.
pub const PAP_RESTART_TIMER: Duration = Duration::from_secs(3);
/// Maximum number of Authenticate-Request transmissions.
pub const PAP_MAX_REQUESTS: u32 = 5;

/// PAP sub-state, for either direction.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PapState {
    Initial,
    Started,
    ReqSent,
    ReqRcvd,
    AckSent,
    AckRcvd,
    NakSent,
    NakRcvd,
}

/// PAP authentication record.
#[derive(Debug, Clone)]
pub struct PapFsm {
    /// Our authenticator role: validating the peer's credentials.
    pub local_state: PapState,
    /// Our authenticatee role: submitting credentials to the peer.
    pub peer_state: PapState,
    /// Identifier of our outstanding Authenticate-Request.
    pub identifier: u8,
    /// Remaining Authenticate-Request retransmissions.
    pub restart_counter: u32,
    /// Time of the most recent Authenticate-Request transmission.
    pub timestamp: Instant,
}

impl PapFsm {
    pub fn new() -> Self {
        PapFsm {
            local_state: PapState::Initial,
            peer_state: PapState::Initial,
            identifier: 0,
            restart_counter: 0,
            timestamp: Instant::now(),
        }
    }

    /// Force both directions back to their initial state.
    pub fn reset(&mut self) {
        self.local_state = PapState::Initial;
        self.peer_state = PapState::Initial;
        self.identifier = 0;
        self.restart_counter = 0;
    }
}

impl Default for PapFsm {
    fn default() -> Self {
        Self::new()
    }
}

/// Start PAP authentication for whichever directions negotiated it.
pub(crate) fn start_auth(s: &mut PppSession, now: Instant) -> Result<()> {
    tracing::info!("Starting PAP authentication");

    if s.local_config.auth_protocol == Some(AuthProtocol::Pap) {
        // We are the authenticator: wait for the peer's request.
        s.pap.local_state = PapState::Started;
    }

    if s.peer_config.auth_protocol == Some(AuthProtocol::Pap) {
        // The peer is the authenticator: submit our credentials.
        s.pap.restart_counter = PAP_MAX_REQUESTS;
        send_auth_req(s, now)?;
        s.pap.peer_state = PapState::ReqSent;
    }

    Ok(())
}

/// Abort PAP authentication.
pub(crate) fn abort_auth(s: &mut PppSession) {
    tracing::info!("Aborting PAP authentication");
    s.pap.local_state = PapState::Initial;
    s.pap.peer_state = PapState::Initial;
}

/// Drive the Authenticate-Request retransmission timer.
pub(crate) fn tick(s: &mut PppSession, now: Instant) -> Result<()> {
    if s.pap.peer_state == PapState::ReqSent
        && now.duration_since(s.pap.timestamp) >= PAP_RESTART_TIMER
    {
        tracing::info!("PAP Timeout event");

        if s.pap.restart_counter > 0 {
            send_auth_req(s, now)?;
        } else {
            // Retry budget exhausted: authentication failed.
            s.pap.peer_state = PapState::Initial;
            lcp::close(s, now)?;
        }
    }
    Ok(())
}

/// Process an incoming PAP packet.
pub(crate) fn process_packet(s: &mut PppSession, now: Instant, data: &[u8]) -> Result<()> {
    let pkt = packet::parse_packet(data)?;
    log::dump_packet("recv", PPP_PROTOCOL_PAP, pkt.raw);

    // A lost Authenticate-Ack forces the peer to repeat its request
    // after the Authentication phase has completed, so the Network phase
    // is acceptable too. Anything else discards the packet.
    if s.phase != Phase::Authenticate && s.phase != Phase::Network {
        return Ok(());
    }

    match pkt.code {
        PAP_CODE_AUTH_REQ => process_auth_req(s, now, &pkt),
        PAP_CODE_AUTH_ACK => process_auth_ack(s, now, &pkt),
        PAP_CODE_AUTH_NAK => process_auth_nak(s, now, &pkt),
        _ => Ok(()),
    }
}

fn process_auth_req(s: &mut PppSession, now: Instant, pkt: &Packet<'_>) -> Result<()> {
    tracing::info!("PAP Authenticate-Request received");

    if s.local_config.auth_protocol != Some(AuthProtocol::Pap) {
        return Err(PppError::UnexpectedMessage);
    }

    let payload = pkt.payload;
    if payload.is_empty() {
        return Err(PppError::MalformedPacket);
    }

    let peer_id_len = usize::from(payload[0]);
    if payload.len() < 1 + peer_id_len + 1 {
        return Err(PppError::MalformedPacket);
    }

    let peer_id = &payload[1..1 + peer_id_len];
    let passwd_len = usize::from(payload[1 + peer_id_len]);
    let passwd_start = 1 + peer_id_len + 1;
    if payload.len() < passwd_start + passwd_len {
        return Err(PppError::MalformedPacket);
    }
    let password = &payload[passwd_start..passwd_start + passwd_len];

    s.peer_name = String::from_utf8_lossy(peer_id).into_owned();

    // The submitted password is only valid for the duration of this
    // packet; the verification callback is the sole consumer.
    let accepted = match &s.config.auth_verify {
        Some(verify) => {
            let check = PasswordCheck(CheckInner::Pap {
                submitted: password,
            });
            verify(&s.peer_name, &check)
        }
        None => false,
    };

    if accepted {
        send_auth_ack(s, pkt.identifier)?;
        s.pap.local_state = PapState::AckSent;
        s.local_auth_done = true;
        s.maybe_enter_network(now)
    } else {
        send_auth_nak(s, pkt.identifier)?;
        s.pap.local_state = PapState::NakSent;
        // The authenticator must take the link down on rejection.
        lcp::close(s, now)
    }
}

fn process_auth_ack(s: &mut PppSession, now: Instant, pkt: &Packet<'_>) -> Result<()> {
    tracing::info!("PAP Authenticate-Ack received");

    if s.peer_config.auth_protocol != Some(AuthProtocol::Pap) {
        return Err(PppError::UnexpectedMessage);
    }
    if pkt.payload.is_empty() {
        return Err(PppError::MalformedPacket);
    }
    if pkt.identifier != s.pap.identifier {
        return Err(PppError::WrongIdentifier);
    }

    s.pap.peer_state = PapState::AckRcvd;
    s.peer_auth_done = true;
    s.maybe_enter_network(now)
}

fn process_auth_nak(s: &mut PppSession, now: Instant, pkt: &Packet<'_>) -> Result<()> {
    tracing::info!("PAP Authenticate-Nak received");

    if s.peer_config.auth_protocol != Some(AuthProtocol::Pap) {
        return Err(PppError::UnexpectedMessage);
    }
    if pkt.payload.is_empty() {
        return Err(PppError::MalformedPacket);
    }
    if pkt.identifier != s.pap.identifier {
        return Err(PppError::WrongIdentifier);
    }

    s.pap.peer_state = PapState::NakRcvd;
    // Our credentials were refused.
    lcp::close(s, now)
}

fn send_auth_req(s: &mut PppSession, now: Instant) -> Result<()> {
    s.pap.identifier = s.pap.identifier.wrapping_add(1);

    let mut b = PacketBuilder::new(PAP_CODE_AUTH_REQ, s.pap.identifier);
    b.push(s.username.len() as u8);
    b.append(s.username.as_bytes());
    b.push(s.password.len() as u8);
    b.append(s.password.as_bytes());

    s.send_control_packet(PPP_PROTOCOL_PAP, b.finish())?;

    if s.pap.restart_counter > 0 {
        s.pap.restart_counter -= 1;
    }
    s.pap.timestamp = now;
    Ok(())
}

fn send_auth_ack(s: &mut PppSession, identifier: u8) -> Result<()> {
    let mut b = PacketBuilder::new(PAP_CODE_AUTH_ACK, identifier);
    // Empty implementation-dependent message.
    b.push(0);
    s.send_control_packet(PPP_PROTOCOL_PAP, b.finish())
}

fn send_auth_nak(s: &mut PppSession, identifier: u8) -> Result<()> {
    let mut b = PacketBuilder::new(PAP_CODE_AUTH_NAK, identifier);
    b.push(0);
    s.send_control_packet(PPP_PROTOCOL_PAP, b.finish())
}
