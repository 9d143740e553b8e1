//! CHAP (Challenge Handshake Authentication Protocol) with MD5.
//!
//! As authenticator we emit a Challenge carrying random bytes and
//! verify the digest the peer sends back; as authenticatee we answer
//! inbound Challenges with `MD5(identifier ∥ secret ∥ challenge)`. The
//! outstanding challenge and the peer's response digest are copied into
//! buffers owned by the CHAP record, so neither outlives its packet by
//! reference.

use std::time::{Duration, Instant};

use md5::{Digest, Md5};

use crate::config::{CheckInner, PasswordCheck};
use crate::error::{PppError, Result};
use crate::frame::PPP_PROTOCOL_CHAP;
use crate::lcp;
use crate::log;
use crate::packet::{self, Packet, PacketBuilder};
use crate::session::PppSession;
use crate::types::{AuthProtocol, Phase};

/// Challenge code.
pub const CHAP_CODE_CHALLENGE: u8 = 1;
/// Response code.
pub const CHAP_CODE_RESPONSE: u8 = 2;
/// Success code.
pub const CHAP_CODE_SUCCESS: u8 = 3;
/// Failure code.
pub const CHAP_CODE_FAILURE: u8 = 4;

/// Algorithm identifier for CHAP with MD5.
pub const CHAP_ALGO_MD5: u8 = 5;
/// MD5 digest size; also the size of the challenges we generate.
pub const CHAP_MD5_DIGEST_SIZE: usize = 16;

/// Restart timer period for Challenge retransmission.
pub const CHAP_RESTART_TIMER: Duration = Duration::from_secs(3);
/// Maximum number of Challenge transmissions.
pub const CHAP_MAX_CHALLENGES: u32 = 5;

/// CHAP sub-state, for either direction.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChapState {
    Initial,
    Started,
    ChallengeSent,
    ChallengeRcvd,
    ResponseSent,
    ResponseRcvd,
    SuccessSent,
    SuccessRcvd,
    FailureSent,
    FailureRcvd,
}

/// CHAP authentication record.
#[derive(Debug, Clone)]
pub struct ChapFsm {
    /// Our authenticator role: challenging the peer.
    pub local_state: ChapState,
    /// Our authenticatee role: answering the peer's challenges.
    pub peer_state: ChapState,
    /// Identifier of our outstanding Challenge.
    pub local_identifier: u8,
    /// Identifier of the most recent Challenge received from the peer.
    pub peer_identifier: u8,
    /// Remaining Challenge retransmissions.
    pub restart_counter: u32,
    /// Time of the most recent Challenge transmission.
    pub timestamp: Instant,
    /// Challenge value of our outstanding Challenge.
    pub challenge: [u8; CHAP_MD5_DIGEST_SIZE],
    /// Digest submitted in the peer's most recent Response.
    pub response: [u8; CHAP_MD5_DIGEST_SIZE],
}

impl ChapFsm {
    pub fn new() -> Self {
        ChapFsm {
            local_state: ChapState::Initial,
            peer_state: ChapState::Initial,
            local_identifier: 0,
            peer_identifier: 0,
            restart_counter: 0,
            timestamp: Instant::now(),
            challenge: [0; CHAP_MD5_DIGEST_SIZE],
            response: [0; CHAP_MD5_DIGEST_SIZE],
        }
    }

    /// Force both directions back to their initial state.
    pub fn reset(&mut self) {
        self.local_state = ChapState::Initial;
        self.peer_state = ChapState::Initial;
        self.local_identifier = 0;
        self.peer_identifier = 0;
        self.restart_counter = 0;
    }
}

impl Default for ChapFsm {
    fn default() -> Self {
        Self::new()
    }
}

/// The response value is the one-way hash over the identifier, the
/// shared secret and the challenge value, in that order.
pub fn response_digest(
    identifier: u8,
    secret: &[u8],
    challenge: &[u8],
) -> [u8; CHAP_MD5_DIGEST_SIZE] {
    let mut hasher = Md5::new();
    hasher.update([identifier]);
    hasher.update(secret);
    hasher.update(challenge);

    let mut digest = [0u8; CHAP_MD5_DIGEST_SIZE];
    digest.copy_from_slice(&hasher.finalize());
    digest
}

/// Start CHAP authentication for whichever directions negotiated it.
pub(crate) fn start_auth(s: &mut PppSession, now: Instant) -> Result<()> {
    tracing::info!("Starting CHAP authentication");

    if s.local_config.auth_protocol == Some(AuthProtocol::ChapMd5) {
        // We are the authenticator: challenge the peer.
        s.chap.restart_counter = CHAP_MAX_CHALLENGES;
        send_challenge(s, now)?;
        s.chap.local_state = ChapState::ChallengeSent;
    }

    if s.peer_config.auth_protocol == Some(AuthProtocol::ChapMd5) {
        // The peer is the authenticator: wait for its challenge.
        s.chap.peer_state = ChapState::Started;
    }

    Ok(())
}

/// Abort CHAP authentication.
pub(crate) fn abort_auth(s: &mut PppSession) {
    tracing::info!("Aborting CHAP authentication");
    s.chap.local_state = ChapState::Initial;
    s.chap.peer_state = ChapState::Initial;
}

/// Drive the Challenge retransmission timer.
pub(crate) fn tick(s: &mut PppSession, now: Instant) -> Result<()> {
    if s.chap.local_state == ChapState::ChallengeSent
        && now.duration_since(s.chap.timestamp) >= CHAP_RESTART_TIMER
    {
        tracing::info!("CHAP Timeout event");

        if s.chap.restart_counter > 0 {
            send_challenge(s, now)?;
        } else {
            // Retry budget exhausted: authentication failed.
            s.chap.local_state = ChapState::Initial;
            lcp::close(s, now)?;
        }
    }
    Ok(())
}

/// Process an incoming CHAP packet.
pub(crate) fn process_packet(s: &mut PppSession, now: Instant, data: &[u8]) -> Result<()> {
    let pkt = packet::parse_packet(data)?;
    log::dump_packet("recv", PPP_PROTOCOL_CHAP, pkt.raw);

    // CHAP runs at initial link establishment and may be repeated later
    // while the link is up; any other phase discards the packet.
    if s.phase != Phase::Authenticate && s.phase != Phase::Network {
        return Ok(());
    }

    match pkt.code {
        CHAP_CODE_CHALLENGE => process_challenge(s, now, &pkt),
        CHAP_CODE_RESPONSE => process_response(s, now, &pkt),
        CHAP_CODE_SUCCESS => process_success(s, now, &pkt),
        CHAP_CODE_FAILURE => process_failure(s, now, &pkt),
        _ => Ok(()),
    }
}

fn process_challenge(s: &mut PppSession, _now: Instant, pkt: &Packet<'_>) -> Result<()> {
    tracing::info!("CHAP Challenge received");

    if s.peer_config.auth_protocol != Some(AuthProtocol::ChapMd5) {
        return Err(PppError::UnexpectedMessage);
    }

    let payload = pkt.payload;
    if payload.is_empty() {
        return Err(PppError::MalformedPacket);
    }

    let value_size = usize::from(payload[0]);
    if payload.len() < 1 + value_size {
        return Err(PppError::MalformedPacket);
    }
    let challenge = &payload[1..1 + value_size];

    s.chap.peer_identifier = pkt.identifier;

    let digest = response_digest(pkt.identifier, s.password.as_bytes(), challenge);
    send_response(s, &digest)?;

    s.chap.peer_state = ChapState::ResponseSent;
    Ok(())
}

fn process_response(s: &mut PppSession, now: Instant, pkt: &Packet<'_>) -> Result<()> {
    tracing::info!("CHAP Response received");

    if s.local_config.auth_protocol != Some(AuthProtocol::ChapMd5) {
        return Err(PppError::UnexpectedMessage);
    }

    let payload = pkt.payload;
    if payload.is_empty() {
        return Err(PppError::MalformedPacket);
    }

    if pkt.identifier != s.chap.local_identifier {
        return Err(PppError::WrongIdentifier);
    }

    let value_size = usize::from(payload[0]);
    if payload.len() < 1 + value_size {
        return Err(PppError::MalformedPacket);
    }
    // The response value length is fixed by the digest algorithm.
    if value_size != CHAP_MD5_DIGEST_SIZE {
        return Err(PppError::MalformedPacket);
    }

    s.chap.response.copy_from_slice(&payload[1..1 + value_size]);
    s.peer_name = String::from_utf8_lossy(&payload[1 + value_size..]).into_owned();

    let accepted = match &s.config.auth_verify {
        Some(verify) => {
            let check = PasswordCheck(CheckInner::ChapMd5 {
                identifier: s.chap.local_identifier,
                challenge: &s.chap.challenge,
                response: &s.chap.response,
            });
            verify(&s.peer_name, &check)
        }
        None => false,
    };

    if accepted {
        send_success(s)?;
        s.chap.local_state = ChapState::SuccessSent;
        s.local_auth_done = true;
        s.maybe_enter_network(now)
    } else {
        send_failure(s)?;
        s.chap.local_state = ChapState::FailureSent;
        // The authenticator must take the link down on rejection.
        lcp::close(s, now)
    }
}

fn process_success(s: &mut PppSession, now: Instant, pkt: &Packet<'_>) -> Result<()> {
    tracing::info!("CHAP Success received");

    if s.peer_config.auth_protocol != Some(AuthProtocol::ChapMd5) {
        return Err(PppError::UnexpectedMessage);
    }
    if pkt.identifier != s.chap.peer_identifier {
        return Err(PppError::WrongIdentifier);
    }

    s.chap.peer_state = ChapState::SuccessRcvd;
    s.peer_auth_done = true;
    s.maybe_enter_network(now)
}

fn process_failure(s: &mut PppSession, now: Instant, pkt: &Packet<'_>) -> Result<()> {
    tracing::info!("CHAP Failure received");

    if s.peer_config.auth_protocol != Some(AuthProtocol::ChapMd5) {
        return Err(PppError::UnexpectedMessage);
    }
    if pkt.identifier != s.chap.peer_identifier {
        return Err(PppError::WrongIdentifier);
    }

    s.chap.peer_state = ChapState::FailureRcvd;
    // The authenticator refused our response.
    lcp::close(s, now)
}

fn send_challenge(s: &mut PppSession, now: Instant) -> Result<()> {
    s.chap.local_identifier = s.chap.local_identifier.wrapping_add(1);

    let mut challenge = [0u8; CHAP_MD5_DIGEST_SIZE];
    (s.config.random_source)(&mut challenge);
    s.chap.challenge = challenge;

    let mut b = PacketBuilder::new(CHAP_CODE_CHALLENGE, s.chap.local_identifier);
    b.push(CHAP_MD5_DIGEST_SIZE as u8);
    b.append(&challenge);
    // The Name field identifies the system transmitting the packet.
    b.append(s.username.as_bytes());

    s.send_control_packet(PPP_PROTOCOL_CHAP, b.finish())?;

    if s.chap.restart_counter > 0 {
        s.chap.restart_counter -= 1;
    }
    s.chap.timestamp = now;
    Ok(())
}

fn send_response(s: &mut PppSession, digest: &[u8; CHAP_MD5_DIGEST_SIZE]) -> Result<()> {
    let mut b = PacketBuilder::new(CHAP_CODE_RESPONSE, s.chap.peer_identifier);
    b.push(CHAP_MD5_DIGEST_SIZE as u8);
    b.append(digest);
    b.append(s.username.as_bytes());

    s.send_control_packet(PPP_PROTOCOL_CHAP, b.finish())
}

fn send_success(s: &mut PppSession) -> Result<()> {
    let b = PacketBuilder::new(CHAP_CODE_SUCCESS, s.chap.local_identifier);
    s.send_control_packet(PPP_PROTOCOL_CHAP, b.finish())
}

fn send_failure(s: &mut PppSession) -> Result<()> {
    let b = PacketBuilder::new(CHAP_CODE_FAILURE, s.chap.local_identifier);
    s.send_control_packet(PPP_PROTOCOL_CHAP, b.finish())
}
