//! IPV6CP (IPv6 Control Protocol) instance of the negotiation automaton.
//!
//! IPV6CP negotiates the 64-bit interface identifier of each end of the
//! link; the link-local addresses are derived from the identifiers when
//! the automaton opens.

use std::net::Ipv6Addr;
use std::time::Instant;

use crate::error::{PppError, Result};
use crate::frame::PPP_PROTOCOL_IPV6CP;
use crate::fsm::{self, ControlProtocol, PppFsm, ReplyCode, PPP_RESTART_TIMER};
use crate::log;
use crate::packet::{
    self, OptionStatus, Packet, PacketBuilder, RawOption, CODE_CONFIGURE_ACK,
    CODE_CONFIGURE_NAK, CODE_CONFIGURE_REJ, CODE_CONFIGURE_REQ, CODE_CODE_REJ,
    CODE_TERMINATE_ACK, CODE_TERMINATE_REQ, PPP_MAX_CONF_REQ_SIZE,
};
use crate::session::PppSession;
use crate::types::{InterfaceId, Ipv6Info};

/// Interface-Identifier option.
pub const IPV6CP_OPTION_INTERFACE_ID: u8 = 1;

/// Derive the link-local address for an interface identifier.
pub fn link_local_addr(interface_id: &InterfaceId) -> Ipv6Addr {
    let mut octets = [0u8; 16];
    octets[0] = 0xFE;
    octets[1] = 0x80;
    octets[8..].copy_from_slice(interface_id);
    Ipv6Addr::from(octets)
}

/// IPV6CP Open event.
pub(crate) fn open(s: &mut PppSession, now: Instant) -> Result<()> {
    tracing::info!("IPV6CP Open event");
    let mut p = Ipv6cpView { s, now };
    fsm::open_event(&mut p)?;
    fsm::up_event(&mut p)
}

/// IPV6CP Close event.
pub(crate) fn close(s: &mut PppSession, now: Instant) -> Result<()> {
    tracing::info!("IPV6CP Close event");
    let mut p = Ipv6cpView { s, now };
    fsm::down_event(&mut p)?;
    fsm::close_event(&mut p)
}

/// Drive the IPV6CP restart timer.
pub(crate) fn tick(s: &mut PppSession, now: Instant) -> Result<()> {
    if s.ipv6cp.restart_timer_running()
        && now.duration_since(s.ipv6cp.timestamp) >= PPP_RESTART_TIMER
    {
        tracing::info!("IPV6CP Timeout event");
        let mut p = Ipv6cpView { s, now };
        fsm::timeout_event(&mut p)?;
    }
    Ok(())
}

/// Process an incoming IPV6CP packet.
pub(crate) fn process_packet(s: &mut PppSession, now: Instant, data: &[u8]) -> Result<()> {
    let pkt = packet::parse_packet(data)?;
    log::dump_packet("recv", PPP_PROTOCOL_IPV6CP, pkt.raw);

    match pkt.code {
        CODE_CONFIGURE_REQ => process_configure_req(s, now, &pkt),
        CODE_CONFIGURE_ACK => process_configure_ack(s, now, &pkt),
        CODE_CONFIGURE_NAK => process_configure_nak(s, now, &pkt),
        CODE_CONFIGURE_REJ => process_configure_reject(s, now, &pkt),
        CODE_TERMINATE_REQ => process_terminate_req(s, now, &pkt),
        CODE_TERMINATE_ACK => process_terminate_ack(s, now),
        CODE_CODE_REJ => process_code_rej(s, now, &pkt),
        _ => process_unknown_code(s, now, &pkt),
    }
}

fn process_configure_req(s: &mut PppSession, now: Instant, request: &Packet<'_>) -> Result<()> {
    tracing::info!("IPV6CP Receive-Configure-Request event");

    let mut not_recognizable = false;
    let mut not_acceptable = false;

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

    let mut p = Ipv6cpView { s, now };
    fsm::rcv_configure_req_event(&mut p, request, reply)
}

fn process_configure_ack(s: &mut PppSession, now: Instant, pkt: &Packet<'_>) -> Result<()> {
    tracing::info!("IPV6CP Receive-Configure-Ack event");

    if pkt.identifier != s.ipv6cp.identifier {
        return Err(PppError::WrongIdentifier);
    }

    let mut p = Ipv6cpView { s, now };
    fsm::rcv_configure_ack_event(&mut p)
}

fn process_configure_nak(s: &mut PppSession, now: Instant, pkt: &Packet<'_>) -> Result<()> {
    tracing::info!("IPV6CP Receive-Configure-Nak event");

    if pkt.identifier != s.ipv6cp.identifier {
        return Err(PppError::WrongIdentifier);
    }

    for option in packet::options(pkt.payload) {
        let option = option?;
        if option.kind == IPV6CP_OPTION_INTERFACE_ID {
            s.local_config.interface_id = option_interface_id(&option)?;
        }
    }

    let mut p = Ipv6cpView { s, now };
    fsm::rcv_configure_nak_event(&mut p)
}

fn process_configure_reject(s: &mut PppSession, now: Instant, pkt: &Packet<'_>) -> Result<()> {
    tracing::info!("IPV6CP Receive-Configure-Reject event");

    if pkt.identifier != s.ipv6cp.identifier {
        return Err(PppError::WrongIdentifier);
    }

    for option in packet::options(pkt.payload) {
        let option = option?;
        if option.kind == IPV6CP_OPTION_INTERFACE_ID {
            s.local_config.interface_id_rejected = true;
        }
    }

    let mut p = Ipv6cpView { s, now };
    fsm::rcv_configure_nak_event(&mut p)
}

fn process_terminate_req(s: &mut PppSession, now: Instant, pkt: &Packet<'_>) -> Result<()> {
    tracing::info!("IPV6CP Receive-Terminate-Request event");
    let mut p = Ipv6cpView { s, now };
    fsm::rcv_terminate_req_event(&mut p, pkt)
}

fn process_terminate_ack(s: &mut PppSession, now: Instant) -> Result<()> {
    tracing::info!("IPV6CP Receive-Terminate-Ack event");
    let mut p = Ipv6cpView { s, now };
    fsm::rcv_terminate_ack_event(&mut p)
}

fn process_code_rej(s: &mut PppSession, now: Instant, pkt: &Packet<'_>) -> Result<()> {
    tracing::info!("IPV6CP Receive-Code-Reject event");

    if pkt.payload.len() < packet::PACKET_HEADER_SIZE {
        return Err(PppError::MalformedPacket);
    }

    let rejected_code = pkt.payload[0];
    let acceptable = !(CODE_CONFIGURE_REQ..=CODE_CODE_REJ).contains(&rejected_code);

    let mut p = Ipv6cpView { s, now };
    fsm::rcv_code_rej_event(&mut p, acceptable)
}

fn process_unknown_code(s: &mut PppSession, now: Instant, pkt: &Packet<'_>) -> Result<()> {
    tracing::info!("IPV6CP Receive-Unknown-Code event");
    let mut p = Ipv6cpView { s, now };
    fsm::rcv_unknown_code_event(&mut p, pkt)
}

fn option_interface_id(option: &RawOption<'_>) -> Result<InterfaceId> {
    option
        .data
        .try_into()
        .map_err(|_| PppError::MalformedPacket)
}

/// Classify one IPV6CP option. Only the Interface-Identifier option is
/// open for negotiation.
pub(crate) fn parse_option(
    s: &mut PppSession,
    option: &RawOption<'_>,
    reply: Option<&mut PacketBuilder>,
) -> Result<OptionStatus> {
    match option.kind {
        IPV6CP_OPTION_INTERFACE_ID => parse_interface_id_option(s, option, reply),
        _ => {
            if let Some(out) = reply {
                if out.code() == CODE_CONFIGURE_REJ {
                    out.add_option(option.kind, option.data);
                }
            }
            Ok(OptionStatus::NotRecognizable)
        }
    }
}

fn parse_interface_id_option(
    s: &mut PppSession,
    option: &RawOption<'_>,
    reply: Option<&mut PacketBuilder>,
) -> Result<OptionStatus> {
    let interface_id = option_interface_id(option)?;

    if interface_id != [0; 8] {
        if let Some(out) = reply {
            if out.code() == CODE_CONFIGURE_ACK {
                s.peer_config.interface_id = interface_id;
                out.add_option(IPV6CP_OPTION_INTERFACE_ID, option.data);
            }
        }
        Ok(OptionStatus::Acceptable)
    } else {
        // The peer wants an identifier assigned; suggest the one we know.
        if let Some(out) = reply {
            if out.code() == CODE_CONFIGURE_NAK {
                out.add_option(
                    IPV6CP_OPTION_INTERFACE_ID,
                    &s.peer_config.interface_id,
                );
            }
        }
        Ok(OptionStatus::NotAcceptable)
    }
}

fn send_configure_reply(s: &mut PppSession, code: u8, request: &Packet<'_>) -> Result<()> {
    let mut reply = PacketBuilder::new(code, request.identifier);
    for option in packet::options(request.payload) {
        let option = option?;
        parse_option(s, &option, Some(&mut reply))?;
    }
    s.send_control_packet(PPP_PROTOCOL_IPV6CP, reply.finish())
}

/// The IPV6CP automaton bound to a session.
pub(crate) struct Ipv6cpView<'a> {
    pub s: &'a mut PppSession,
    pub now: Instant,
}

impl ControlProtocol for Ipv6cpView<'_> {
    fn name(&self) -> &'static str {
        "IPV6CP"
    }

    fn fsm(&self) -> &PppFsm {
        &self.s.ipv6cp
    }

    fn fsm_mut(&mut self) -> &mut PppFsm {
        &mut self.s.ipv6cp
    }

    fn this_layer_up(&mut self) -> Result<()> {
        let info = Ipv6Info {
            local_addr: link_local_addr(&self.s.local_config.interface_id),
            peer_addr: link_local_addr(&self.s.peer_config.interface_id),
        };

        tracing::info!(
            "IPV6CP this-layer-up: local {} peer {}",
            info.local_addr,
            info.peer_addr
        );

        self.s.ipv6_info = Some(info);
        Ok(())
    }

    fn this_layer_down(&mut self) -> Result<()> {
        tracing::info!("IPV6CP this-layer-down");
        self.s.ipv6_info = None;
        Ok(())
    }

    fn this_layer_started(&mut self) -> Result<()> {
        tracing::info!("IPV6CP this-layer-started");
        Ok(())
    }

    fn this_layer_finished(&mut self) -> Result<()> {
        tracing::info!("IPV6CP this-layer-finished");
        Ok(())
    }

    fn init_restart_count(&mut self, value: u32) {
        self.s.ipv6cp.restart_counter = value;
    }

    fn zero_restart_count(&mut self) {
        self.s.ipv6cp.restart_counter = 0;
        self.s.ipv6cp.timestamp = self.now;
    }

    fn send_configure_req(&mut self) -> Result<()> {
        let identifier = self.s.ipv6cp.identifier.wrapping_add(1);
        self.s.ipv6cp.identifier = identifier;

        let mut b = PacketBuilder::new(CODE_CONFIGURE_REQ, identifier);
        if !self.s.local_config.interface_id_rejected {
            b.add_option(
                IPV6CP_OPTION_INTERFACE_ID,
                &self.s.local_config.interface_id,
            );
        }

        self.s.send_control_packet(PPP_PROTOCOL_IPV6CP, b.finish())?;

        if self.s.ipv6cp.restart_counter > 0 {
            self.s.ipv6cp.restart_counter -= 1;
        }
        self.s.ipv6cp.timestamp = self.now;
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
        let identifier = self.s.ipv6cp.identifier.wrapping_add(1);
        self.s.ipv6cp.identifier = identifier;

        let b = PacketBuilder::new(CODE_TERMINATE_REQ, identifier);
        self.s.send_control_packet(PPP_PROTOCOL_IPV6CP, b.finish())?;

        if self.s.ipv6cp.restart_counter > 0 {
            self.s.ipv6cp.restart_counter -= 1;
        }
        self.s.ipv6cp.timestamp = self.now;
        Ok(())
    }

    fn send_terminate_ack(&mut self, request: Option<&Packet<'_>>) -> Result<()> {
        let identifier = match request {
            Some(req) => req.identifier,
            None => {
                self.s.ipv6cp.identifier = self.s.ipv6cp.identifier.wrapping_add(1);
                self.s.ipv6cp.identifier
            }
        };

        let b = PacketBuilder::new(CODE_TERMINATE_ACK, identifier);
        self.s.send_control_packet(PPP_PROTOCOL_IPV6CP, b.finish())
    }

    fn send_code_rej(&mut self, pkt: &Packet<'_>) -> Result<()> {
        self.s.ipv6cp.identifier = self.s.ipv6cp.identifier.wrapping_add(1);

        let mut b = PacketBuilder::new(CODE_CODE_REJ, self.s.ipv6cp.identifier);
        let room = PPP_MAX_CONF_REQ_SIZE - b.len();
        b.append(&pkt.raw[..pkt.raw.len().min(room)]);
        self.s.send_control_packet(PPP_PROTOCOL_IPV6CP, b.finish())
    }
}
