//! LCP (Link Control Protocol) instance of the negotiation automaton.
//!
//! LCP negotiates the link-level parameters (MRU, async control
//! character map, authentication protocol, header compression) and
//! additionally owns the link-maintenance codes: Echo-Request/Reply,
//! Discard-Request, Code-Reject and Protocol-Reject.

use std::time::Instant;

use crate::chap;
use crate::error::{PppError, Result};
use crate::frame::{
    PPP_DEFAULT_ACCM, PPP_DEFAULT_MAGIC_NUMBER, PPP_DEFAULT_MRU, PPP_MAX_MRU, PPP_MIN_MRU,
    PPP_PROTOCOL_CHAP, PPP_PROTOCOL_IP, PPP_PROTOCOL_IPCP, PPP_PROTOCOL_IPV6,
    PPP_PROTOCOL_IPV6CP, PPP_PROTOCOL_LCP, PPP_PROTOCOL_PAP,
};
use crate::fsm::{self, ControlProtocol, PppFsm, PppState, ReplyCode, PPP_RESTART_TIMER};
use crate::ipcp;
use crate::ipv6cp;
use crate::log;
use crate::packet::{
    self, OptionStatus, Packet, PacketBuilder, RawOption, CODE_CONFIGURE_ACK,
    CODE_CONFIGURE_NAK, CODE_CONFIGURE_REJ, CODE_CONFIGURE_REQ, CODE_CODE_REJ,
    CODE_DISCARD_REQ, CODE_ECHO_REP, CODE_ECHO_REQ, CODE_PROTOCOL_REJ, CODE_TERMINATE_ACK,
    CODE_TERMINATE_REQ, PPP_MAX_CONF_REQ_SIZE,
};
use crate::pap;
use crate::session::PppSession;
use crate::types::{AuthProtocol, Phase};

/// Maximum-Receive-Unit option.
pub const LCP_OPTION_MRU: u8 = 1;
/// Async-Control-Character-Map option.
pub const LCP_OPTION_ACCM: u8 = 2;
/// Authentication-Protocol option.
pub const LCP_OPTION_AUTH_PROTOCOL: u8 = 3;
/// Quality-Protocol option (not negotiated).
pub const LCP_OPTION_QUALITY_PROTOCOL: u8 = 4;
/// Magic-Number option.
pub const LCP_OPTION_MAGIC_NUMBER: u8 = 5;
/// Protocol-Field-Compression option.
pub const LCP_OPTION_PFC: u8 = 7;
/// Address-and-Control-Field-Compression option.
pub const LCP_OPTION_ACFC: u8 = 8;

/// LCP Open event: the link becomes administratively available and the
/// session advances to the Establish phase.
pub(crate) fn open(s: &mut PppSession, now: Instant) -> Result<()> {
    tracing::info!("LCP Open event");
    s.phase = Phase::Establish;

    let mut p = LcpView { s, now };
    fsm::open_event(&mut p)?;
    // The serial link below is always ready once the modem handed the
    // line over, so Up follows Open immediately.
    fsm::up_event(&mut p)
}

/// LCP Close event: the link is no longer available for traffic.
pub(crate) fn close(s: &mut PppSession, now: Instant) -> Result<()> {
    tracing::info!("LCP Close event");
    let mut p = LcpView { s, now };
    fsm::close_event(&mut p)
}

/// Drive the LCP restart timer.
pub(crate) fn tick(s: &mut PppSession, now: Instant) -> Result<()> {
    if s.lcp.restart_timer_running()
        && now.duration_since(s.lcp.timestamp) >= PPP_RESTART_TIMER
    {
        tracing::info!("LCP Timeout event");
        let mut p = LcpView { s, now };
        fsm::timeout_event(&mut p)?;
    }
    Ok(())
}

/// Process an incoming LCP packet.
pub(crate) fn process_packet(s: &mut PppSession, now: Instant, data: &[u8]) -> Result<()> {
    let pkt = packet::parse_packet(data)?;
    log::dump_packet("recv", PPP_PROTOCOL_LCP, pkt.raw);

    match pkt.code {
        CODE_CONFIGURE_REQ => process_configure_req(s, now, &pkt),
        CODE_CONFIGURE_ACK => process_configure_ack(s, now, &pkt),
        CODE_CONFIGURE_NAK => process_configure_nak(s, now, &pkt),
        CODE_CONFIGURE_REJ => process_configure_reject(s, now, &pkt),
        CODE_TERMINATE_REQ => process_terminate_req(s, now, &pkt),
        CODE_TERMINATE_ACK => process_terminate_ack(s, now),
        CODE_CODE_REJ => process_code_rej(s, now, &pkt),
        CODE_PROTOCOL_REJ => process_protocol_rej(s, now, &pkt),
        CODE_ECHO_REQ => process_echo_req(s, now, &pkt),
        CODE_ECHO_REP => process_echo_rep(&pkt),
        // The receiver must silently discard any Discard-Request.
        CODE_DISCARD_REQ => Ok(()),
        _ => process_unknown_code(s, now, &pkt),
    }
}

fn process_configure_req(s: &mut PppSession, now: Instant, request: &Packet<'_>) -> Result<()> {
    tracing::info!("LCP Receive-Configure-Request event");

    let mut not_recognizable = false;
    let mut not_acceptable = false;

    // Dry run over the options: a malformed length aborts the whole
    // request, anything else accumulates into the aggregate verdict.
    for option in packet::options(request.payload) {
        let option = option?;
        match parse_option(s, &option, None)? {
            OptionStatus::Acceptable => {}
            OptionStatus::NotAcceptable => not_acceptable = true,
            OptionStatus::NotRecognizable => not_recognizable = true,
        }
    }

    let reply = if not_recognizable {
        ReplyCode::Reject
    } else if not_acceptable {
        ReplyCode::Nak
    } else {
        ReplyCode::Ack
    };

    let mut p = LcpView { s, now };
    fsm::rcv_configure_req_event(&mut p, request, reply)
}

fn process_configure_ack(s: &mut PppSession, now: Instant, pkt: &Packet<'_>) -> Result<()> {
    tracing::info!("LCP Receive-Configure-Ack event");

    // A reply whose identifier does not match the outstanding request is
    // silently discarded without affecting the automaton.
    if pkt.identifier != s.lcp.identifier {
        return Err(PppError::WrongIdentifier);
    }

    let mut p = LcpView { s, now };
    fsm::rcv_configure_ack_event(&mut p)
}

fn process_configure_nak(s: &mut PppSession, now: Instant, pkt: &Packet<'_>) -> Result<()> {
    tracing::info!("LCP Receive-Configure-Nak event");

    if pkt.identifier != s.lcp.identifier {
        return Err(PppError::WrongIdentifier);
    }

    for option in packet::options(pkt.payload) {
        let option = option?;
        match option.kind {
            LCP_OPTION_MRU => {
                if option.data.len() != 2 {
                    return Err(PppError::MalformedPacket);
                }
                let mru = u16::from_be_bytes([option.data[0], option.data[1]]);
                s.local_config.mru = mru.clamp(PPP_MIN_MRU, PPP_MAX_MRU);
            }
            LCP_OPTION_ACCM => {
                if option.data.len() != 4 {
                    return Err(PppError::MalformedPacket);
                }
                s.local_config.accm = u32::from_be_bytes([
                    option.data[0],
                    option.data[1],
                    option.data[2],
                    option.data[3],
                ]);
            }
            LCP_OPTION_AUTH_PROTOCOL => {
                if option.data.len() < 2 {
                    return Err(PppError::MalformedPacket);
                }
                let protocol = u16::from_be_bytes([option.data[0], option.data[1]]);
                if protocol == PPP_PROTOCOL_PAP {
                    if s.config.allowed_auth.pap {
                        s.local_config.auth_protocol = Some(AuthProtocol::Pap);
                    }
                } else if protocol == PPP_PROTOCOL_CHAP
                    && option.data.len() > 2
                    && option.data[2] == chap::CHAP_ALGO_MD5
                    && s.config.allowed_auth.chap_md5
                {
                    s.local_config.auth_protocol = Some(AuthProtocol::ChapMd5);
                }
            }
            _ => {}
        }
    }

    let mut p = LcpView { s, now };
    fsm::rcv_configure_nak_event(&mut p)
}

fn process_configure_reject(s: &mut PppSession, now: Instant, pkt: &Packet<'_>) -> Result<()> {
    tracing::info!("LCP Receive-Configure-Reject event");

    if pkt.identifier != s.lcp.identifier {
        return Err(PppError::WrongIdentifier);
    }

    for option in packet::options(pkt.payload) {
        let option = option?;
        match option.kind {
            LCP_OPTION_MRU => {
                s.local_config.mru_rejected = true;
                s.local_config.mru = PPP_DEFAULT_MRU;
            }
            LCP_OPTION_ACCM => {
                s.local_config.accm_rejected = true;
                s.local_config.accm = PPP_DEFAULT_ACCM;
            }
            LCP_OPTION_AUTH_PROTOCOL => {
                // The peer refuses to authenticate itself: there is no
                // recovery from this, the connection is torn down.
                let mut p = LcpView { s: &mut *s, now };
                fsm::rcv_code_rej_event(&mut p, false)?;
                return Err(PppError::RequestRejected);
            }
            LCP_OPTION_MAGIC_NUMBER => {
                s.local_config.magic_number_rejected = true;
                s.local_config.magic_number = PPP_DEFAULT_MAGIC_NUMBER;
            }
            LCP_OPTION_PFC => {
                s.local_config.pfc_rejected = true;
                s.local_config.pfc = false;
            }
            LCP_OPTION_ACFC => {
                s.local_config.acfc_rejected = true;
                s.local_config.acfc = false;
            }
            _ => {}
        }
    }

    let mut p = LcpView { s, now };
    fsm::rcv_configure_nak_event(&mut p)
}

fn process_terminate_req(s: &mut PppSession, now: Instant, pkt: &Packet<'_>) -> Result<()> {
    tracing::info!("LCP Receive-Terminate-Request event");
    let mut p = LcpView { s, now };
    fsm::rcv_terminate_req_event(&mut p, pkt)
}

fn process_terminate_ack(s: &mut PppSession, now: Instant) -> Result<()> {
    tracing::info!("LCP Receive-Terminate-Ack event");
    let mut p = LcpView { s, now };
    fsm::rcv_terminate_ack_event(&mut p)
}

fn process_code_rej(s: &mut PppSession, now: Instant, pkt: &Packet<'_>) -> Result<()> {
    tracing::info!("LCP Receive-Code-Reject event");

    // The body of a Code-Reject is the rejected packet.
    if pkt.payload.len() < packet::PACKET_HEADER_SIZE {
        return Err(PppError::MalformedPacket);
    }

    // Rejection of one of the codes this implementation depends on is
    // catastrophic; rejection of an extended code is not.
    let rejected_code = pkt.payload[0];
    let acceptable =
        !(CODE_CONFIGURE_REQ..=CODE_DISCARD_REQ).contains(&rejected_code);

    let mut p = LcpView { s, now };
    fsm::rcv_code_rej_event(&mut p, acceptable)
}

fn process_protocol_rej(s: &mut PppSession, now: Instant, pkt: &Packet<'_>) -> Result<()> {
    tracing::info!("LCP Receive-Protocol-Reject event");

    if pkt.payload.len() < 2 {
        return Err(PppError::MalformedPacket);
    }

    let protocol = u16::from_be_bytes([pkt.payload[0], pkt.payload[1]]);
    match protocol {
        PPP_PROTOCOL_LCP => {
            // A Protocol-Reject of LCP itself is unrecoverable.
            let mut p = LcpView { s, now };
            fsm::rcv_code_rej_event(&mut p, false)
        }
        PPP_PROTOCOL_IP | PPP_PROTOCOL_IPCP => {
            // Stop sending the offending packet type.
            s.ip_rejected = true;
            let mut p = LcpView { s, now };
            fsm::rcv_code_rej_event(&mut p, true)
        }
        PPP_PROTOCOL_IPV6 | PPP_PROTOCOL_IPV6CP => {
            s.ipv6_rejected = true;
            let mut p = LcpView { s, now };
            fsm::rcv_code_rej_event(&mut p, true)
        }
        _ => Ok(()),
    }
}

fn process_echo_req(s: &mut PppSession, now: Instant, pkt: &Packet<'_>) -> Result<()> {
    tracing::info!("LCP Receive-Echo-Request event");

    // The body starts with the sender's magic number.
    if pkt.payload.len() < 4 {
        return Err(PppError::MalformedPacket);
    }

    let mut p = LcpView { s, now };
    fsm::rcv_echo_req_event(&mut p, pkt)
}

fn process_echo_rep(pkt: &Packet<'_>) -> Result<()> {
    tracing::info!("LCP Receive-Echo-Reply event, id {}", pkt.identifier);
    Ok(())
}

fn process_unknown_code(s: &mut PppSession, now: Instant, pkt: &Packet<'_>) -> Result<()> {
    tracing::info!("LCP Receive-Unknown-Code event");
    let mut p = LcpView { s, now };
    fsm::rcv_unknown_code_event(&mut p, pkt)
}

/// An unsupported Protocol field was seen on the link. Once LCP is
/// Opened this must be reported back to the peer with a
/// Protocol-Reject; in any other state the frame is silently dropped.
pub(crate) fn process_unknown_protocol(
    s: &mut PppSession,
    protocol: u16,
    information: &[u8],
) -> Result<()> {
    tracing::info!("LCP Receive-Unknown-Protocol event (0x{:04X})", protocol);

    if s.lcp.state != PppState::Opened {
        return Ok(());
    }

    // The identifier must be changed for each Protocol-Reject sent.
    s.lcp.identifier = s.lcp.identifier.wrapping_add(1);

    let mut b = PacketBuilder::new(CODE_PROTOCOL_REJ, s.lcp.identifier);
    b.append(&protocol.to_be_bytes());
    // The rejected information is truncated to keep the packet within
    // the bound of what we originate.
    let room = PPP_MAX_CONF_REQ_SIZE - b.len();
    b.append(&information[..information.len().min(room)]);

    s.send_control_packet(PPP_PROTOCOL_LCP, b.finish())
}

/// Classify one LCP option and, when `reply` is being built, contribute
/// the option to the reply packet. Peer configuration is only committed
/// while an Ack reply is being assembled.
pub(crate) fn parse_option(
    s: &mut PppSession,
    option: &RawOption<'_>,
    reply: Option<&mut PacketBuilder>,
) -> Result<OptionStatus> {
    match option.kind {
        LCP_OPTION_MRU => parse_mru_option(s, option, reply),
        LCP_OPTION_ACCM => parse_accm_option(s, option, reply),
        LCP_OPTION_AUTH_PROTOCOL => parse_auth_protocol_option(s, option, reply),
        LCP_OPTION_MAGIC_NUMBER => parse_magic_number_option(s, option, reply),
        LCP_OPTION_PFC => parse_pfc_option(s, option, reply),
        LCP_OPTION_ACFC => parse_acfc_option(s, option, reply),
        _ => {
            // A Reject reply carries the unrecognized options verbatim.
            if let Some(out) = reply {
                if out.code() == CODE_CONFIGURE_REJ {
                    out.add_option(option.kind, option.data);
                }
            }
            Ok(OptionStatus::NotRecognizable)
        }
    }
}

fn parse_mru_option(
    s: &mut PppSession,
    option: &RawOption<'_>,
    reply: Option<&mut PacketBuilder>,
) -> Result<OptionStatus> {
    if option.data.len() != 2 {
        return Err(PppError::MalformedPacket);
    }

    let mru = u16::from_be_bytes([option.data[0], option.data[1]]);
    if mru >= PPP_MIN_MRU {
        if let Some(out) = reply {
            if out.code() == CODE_CONFIGURE_ACK {
                s.peer_config.mru = mru;
                out.add_option(LCP_OPTION_MRU, option.data);
            }
        }
        Ok(OptionStatus::Acceptable)
    } else {
        if let Some(out) = reply {
            if out.code() == CODE_CONFIGURE_NAK {
                out.add_option(LCP_OPTION_MRU, &PPP_DEFAULT_MRU.to_be_bytes());
            }
        }
        Ok(OptionStatus::NotAcceptable)
    }
}

fn parse_accm_option(
    s: &mut PppSession,
    option: &RawOption<'_>,
    reply: Option<&mut PacketBuilder>,
) -> Result<OptionStatus> {
    if option.data.len() != 4 {
        return Err(PppError::MalformedPacket);
    }

    if let Some(out) = reply {
        if out.code() == CODE_CONFIGURE_ACK {
            s.peer_config.accm = u32::from_be_bytes([
                option.data[0],
                option.data[1],
                option.data[2],
                option.data[3],
            ]);
            out.add_option(LCP_OPTION_ACCM, option.data);
        }
    }
    Ok(OptionStatus::Acceptable)
}

fn parse_auth_protocol_option(
    s: &mut PppSession,
    option: &RawOption<'_>,
    reply: Option<&mut PacketBuilder>,
) -> Result<OptionStatus> {
    if option.data.len() < 2 {
        return Err(PppError::MalformedPacket);
    }

    let protocol = u16::from_be_bytes([option.data[0], option.data[1]]);

    // The option is exactly 4 bytes for PAP and exactly 5 for CHAP
    // (protocol plus the algorithm identifier); anything else is a
    // malformed request.
    let valid = (protocol == PPP_PROTOCOL_PAP && option.data.len() == 2)
        || (protocol == PPP_PROTOCOL_CHAP && option.data.len() == 3);
    if !valid {
        return Err(PppError::MalformedPacket);
    }

    if protocol == PPP_PROTOCOL_PAP && s.config.allowed_auth.pap {
        if let Some(out) = reply {
            if out.code() == CODE_CONFIGURE_ACK {
                s.peer_config.auth_protocol = Some(AuthProtocol::Pap);
                out.add_option(LCP_OPTION_AUTH_PROTOCOL, option.data);
            }
        }
        Ok(OptionStatus::Acceptable)
    } else if protocol == PPP_PROTOCOL_CHAP
        && option.data[2] == chap::CHAP_ALGO_MD5
        && s.config.allowed_auth.chap_md5
    {
        if let Some(out) = reply {
            if out.code() == CODE_CONFIGURE_ACK {
                s.peer_config.auth_protocol = Some(AuthProtocol::ChapMd5);
                out.add_option(LCP_OPTION_AUTH_PROTOCOL, option.data);
            }
        }
        Ok(OptionStatus::Acceptable)
    } else if s.config.allowed_auth.pap {
        // Nak with the scheme we are willing to use instead.
        if let Some(out) = reply {
            if out.code() == CODE_CONFIGURE_NAK {
                out.add_option(LCP_OPTION_AUTH_PROTOCOL, &PPP_PROTOCOL_PAP.to_be_bytes());
            }
        }
        Ok(OptionStatus::NotAcceptable)
    } else if s.config.allowed_auth.chap_md5 {
        if let Some(out) = reply {
            if out.code() == CODE_CONFIGURE_NAK {
                let p = PPP_PROTOCOL_CHAP.to_be_bytes();
                out.add_option(LCP_OPTION_AUTH_PROTOCOL, &[p[0], p[1], chap::CHAP_ALGO_MD5]);
            }
        }
        Ok(OptionStatus::NotAcceptable)
    } else {
        // Authentication is not open for negotiation at all.
        if let Some(out) = reply {
            if out.code() == CODE_CONFIGURE_REJ {
                out.add_option(LCP_OPTION_AUTH_PROTOCOL, option.data);
            }
        }
        Ok(OptionStatus::NotRecognizable)
    }
}

fn parse_magic_number_option(
    s: &mut PppSession,
    option: &RawOption<'_>,
    reply: Option<&mut PacketBuilder>,
) -> Result<OptionStatus> {
    if option.data.len() != 4 {
        return Err(PppError::MalformedPacket);
    }

    if let Some(out) = reply {
        if out.code() == CODE_CONFIGURE_ACK {
            s.peer_config.magic_number = u32::from_be_bytes([
                option.data[0],
                option.data[1],
                option.data[2],
                option.data[3],
            ]);
            out.add_option(LCP_OPTION_MAGIC_NUMBER, option.data);
        }
    }
    Ok(OptionStatus::Acceptable)
}

fn parse_pfc_option(
    s: &mut PppSession,
    option: &RawOption<'_>,
    reply: Option<&mut PacketBuilder>,
) -> Result<OptionStatus> {
    if !option.data.is_empty() {
        return Err(PppError::MalformedPacket);
    }

    if let Some(out) = reply {
        if out.code() == CODE_CONFIGURE_ACK {
            s.peer_config.pfc = true;
            out.add_option(LCP_OPTION_PFC, &[]);
        }
    }
    Ok(OptionStatus::Acceptable)
}

fn parse_acfc_option(
    s: &mut PppSession,
    option: &RawOption<'_>,
    reply: Option<&mut PacketBuilder>,
) -> Result<OptionStatus> {
    if !option.data.is_empty() {
        return Err(PppError::MalformedPacket);
    }

    if let Some(out) = reply {
        if out.code() == CODE_CONFIGURE_ACK {
            s.peer_config.acfc = true;
            out.add_option(LCP_OPTION_ACFC, &[]);
        }
    }
    Ok(OptionStatus::Acceptable)
}

/// Build and transmit the Ack/Nak/Reject reply to a Configure-Request
/// by re-walking the request options with the reply code in hand.
fn send_configure_reply(s: &mut PppSession, code: u8, request: &Packet<'_>) -> Result<()> {
    let mut reply = PacketBuilder::new(code, request.identifier);
    for option in packet::options(request.payload) {
        let option = option?;
        parse_option(s, &option, Some(&mut reply))?;
    }
    s.send_control_packet(PPP_PROTOCOL_LCP, reply.finish())
}

/// The LCP automaton bound to a session.
pub(crate) struct LcpView<'a> {
    pub s: &'a mut PppSession,
    pub now: Instant,
}

impl ControlProtocol for LcpView<'_> {
    fn name(&self) -> &'static str {
        "LCP"
    }

    fn fsm(&self) -> &PppFsm {
        &self.s.lcp
    }

    fn fsm_mut(&mut self) -> &mut PppFsm {
        &mut self.s.lcp
    }

    fn this_layer_up(&mut self) -> Result<()> {
        tracing::info!("LCP this-layer-up");

        // Each direction is trivially authenticated when no protocol was
        // negotiated for it.
        self.s.local_auth_done = self.s.local_config.auth_protocol.is_none();
        self.s.peer_auth_done = self.s.peer_config.auth_protocol.is_none();

        let local = self.s.local_config.auth_protocol;
        let peer = self.s.peer_config.auth_protocol;

        if local == Some(AuthProtocol::Pap) || peer == Some(AuthProtocol::Pap) {
            self.s.phase = Phase::Authenticate;
            pap::start_auth(self.s, self.now)?;
        }
        if local == Some(AuthProtocol::ChapMd5) || peer == Some(AuthProtocol::ChapMd5) {
            self.s.phase = Phase::Authenticate;
            chap::start_auth(self.s, self.now)?;
        }

        if self.s.local_auth_done && self.s.peer_auth_done {
            self.s.enter_network_phase(self.now)?;
        }
        Ok(())
    }

    fn this_layer_down(&mut self) -> Result<()> {
        tracing::info!("LCP this-layer-down");
        self.s.phase = Phase::Terminate;

        ipcp::close(self.s, self.now)?;
        ipv6cp::close(self.s, self.now)?;
        pap::abort_auth(self.s);
        chap::abort_auth(self.s);
        Ok(())
    }

    fn this_layer_started(&mut self) -> Result<()> {
        tracing::info!("LCP this-layer-started");
        Ok(())
    }

    fn this_layer_finished(&mut self) -> Result<()> {
        tracing::info!("LCP this-layer-finished");

        fsm::close_event(self)?;
        fsm::down_event(self)?;
        self.s.phase = Phase::Dead;
        Ok(())
    }

    fn init_restart_count(&mut self, value: u32) {
        self.s.lcp.restart_counter = value;
    }

    fn zero_restart_count(&mut self) {
        self.s.lcp.restart_counter = 0;
        // The receiver of a Terminate-Request must not disconnect until
        // at least one restart period has passed after its Terminate-Ack.
        self.s.lcp.timestamp = self.now;
    }

    fn send_configure_req(&mut self) -> Result<()> {
        let identifier = self.s.lcp.identifier.wrapping_add(1);
        self.s.lcp.identifier = identifier;

        let mut b = PacketBuilder::new(CODE_CONFIGURE_REQ, identifier);
        let cfg = &self.s.local_config;
        if !cfg.mru_rejected {
            b.add_option(LCP_OPTION_MRU, &cfg.mru.to_be_bytes());
        }
        if !cfg.accm_rejected {
            b.add_option(LCP_OPTION_ACCM, &cfg.accm.to_be_bytes());
        }
        if !cfg.auth_protocol_rejected {
            match cfg.auth_protocol {
                Some(AuthProtocol::Pap) => {
                    b.add_option(LCP_OPTION_AUTH_PROTOCOL, &PPP_PROTOCOL_PAP.to_be_bytes());
                }
                Some(AuthProtocol::ChapMd5) => {
                    let p = PPP_PROTOCOL_CHAP.to_be_bytes();
                    b.add_option(
                        LCP_OPTION_AUTH_PROTOCOL,
                        &[p[0], p[1], chap::CHAP_ALGO_MD5],
                    );
                }
                None => {}
            }
        }
        if !cfg.pfc_rejected && cfg.pfc {
            b.add_option(LCP_OPTION_PFC, &[]);
        }
        if !cfg.acfc_rejected && cfg.acfc {
            b.add_option(LCP_OPTION_ACFC, &[]);
        }

        self.s.send_control_packet(PPP_PROTOCOL_LCP, b.finish())?;

        // The restart counter is decremented on each transmission.
        if self.s.lcp.restart_counter > 0 {
            self.s.lcp.restart_counter -= 1;
        }
        self.s.lcp.timestamp = self.now;
        Ok(())
    }

    fn send_configure_ack(&mut self, request: &Packet<'_>) -> Result<()> {
        send_configure_reply(self.s, CODE_CONFIGURE_ACK, request)
    }

    fn send_configure_nak(&mut self, request: &Packet<'_>) -> Result<()> {
        send_configure_reply(self.s, CODE_CONFIGURE_NAK, request)
    }

    fn send_configure_rej(&mut self, request: &Packet<'_>) -> Result<()> {
        send_configure_reply(self.s, CODE_CONFIGURE_REJ, request)
    }

    fn send_terminate_req(&mut self) -> Result<()> {
        let identifier = self.s.lcp.identifier.wrapping_add(1);
        self.s.lcp.identifier = identifier;

        let b = PacketBuilder::new(CODE_TERMINATE_REQ, identifier);
        self.s.send_control_packet(PPP_PROTOCOL_LCP, b.finish())?;

        if self.s.lcp.restart_counter > 0 {
            self.s.lcp.restart_counter -= 1;
        }
        self.s.lcp.timestamp = self.now;
        Ok(())
    }

    fn send_terminate_ack(&mut self, request: Option<&Packet<'_>>) -> Result<()> {
        // Answering a Terminate-Request copies its identifier; an
        // unsolicited Terminate-Ack takes a fresh one.
        let identifier = match request {
            Some(req) => req.identifier,
            None => {
                self.s.lcp.identifier = self.s.lcp.identifier.wrapping_add(1);
                self.s.lcp.identifier
            }
        };

        let b = PacketBuilder::new(CODE_TERMINATE_ACK, identifier);
        self.s.send_control_packet(PPP_PROTOCOL_LCP, b.finish())
    }

    fn send_code_rej(&mut self, pkt: &Packet<'_>) -> Result<()> {
        self.s.lcp.identifier = self.s.lcp.identifier.wrapping_add(1);

        let mut b = PacketBuilder::new(CODE_CODE_REJ, self.s.lcp.identifier);
        let room = PPP_MAX_CONF_REQ_SIZE - b.len();
        b.append(&pkt.raw[..pkt.raw.len().min(room)]);
        self.s.send_control_packet(PPP_PROTOCOL_LCP, b.finish())
    }

    fn send_echo_rep(&mut self, request: &Packet<'_>) -> Result<()> {
        let mut b = PacketBuilder::new(CODE_ECHO_REP, request.identifier);
        b.append(&self.s.local_config.magic_number.to_be_bytes());
        b.append(&request.payload[4..]);
        self.s.send_control_packet(PPP_PROTOCOL_LCP, b.finish())
    }
}
