//! IPCP (IP Control Protocol) instance of the negotiation automaton.
//!
//! IPCP assigns the IPv4 address of each end of the link and, on our
//! side, the DNS servers. The negotiated addressing is applied to the
//! session when the automaton reaches the Opened state and revoked when
//! it leaves it.

use std::net::Ipv4Addr;
use std::time::Instant;

use crate::error::{PppError, Result};
use crate::frame::PPP_PROTOCOL_IPCP;
use crate::fsm::{self, ControlProtocol, PppFsm, ReplyCode, PPP_RESTART_TIMER};
use crate::log;
use crate::packet::{
    self, OptionStatus, Packet, PacketBuilder, RawOption, CODE_CONFIGURE_ACK,
    CODE_CONFIGURE_NAK, CODE_CONFIGURE_REJ, CODE_CONFIGURE_REQ, CODE_CODE_REJ,
    CODE_TERMINATE_ACK, CODE_TERMINATE_REQ, PPP_MAX_CONF_REQ_SIZE,
};
use crate::session::PppSession;
use crate::types::Ipv4Info;

/// IP-Address option.
pub const IPCP_OPTION_IP_ADDRESS: u8 = 3;
/// Primary-DNS-Server-Address option.
pub const IPCP_OPTION_PRIMARY_DNS: u8 = 129;
/// Secondary-DNS-Server-Address option.
pub const IPCP_OPTION_SECONDARY_DNS: u8 = 131;

/// Host route to the remote end of the link.
pub const IPCP_DEFAULT_SUBNET_MASK: Ipv4Addr = Ipv4Addr::new(255, 255, 255, 255);

/// IPCP Open event.
pub(crate) fn open(s: &mut PppSession, now: Instant) -> Result<()> {
    tracing::info!("IPCP Open event");
    let mut p = IpcpView { s, now };
    fsm::open_event(&mut p)?;
    fsm::up_event(&mut p)
}

/// IPCP Close event.
pub(crate) fn close(s: &mut PppSession, now: Instant) -> Result<()> {
    tracing::info!("IPCP Close event");
    let mut p = IpcpView { s, now };
    fsm::down_event(&mut p)?;
    fsm::close_event(&mut p)
}

/// Drive the IPCP restart timer.
pub(crate) fn tick(s: &mut PppSession, now: Instant) -> Result<()> {
    if s.ipcp.restart_timer_running()
        && now.duration_since(s.ipcp.timestamp) >= PPP_RESTART_TIMER
    {
        tracing::info!("IPCP Timeout event");
        let mut p = IpcpView { s, now };
        fsm::timeout_event(&mut p)?;
    }
    Ok(())
}

/// Process an incoming IPCP packet.
pub(crate) fn process_packet(s: &mut PppSession, now: Instant, data: &[u8]) -> Result<()> {
    let pkt = packet::parse_packet(data)?;
    log::dump_packet("recv", PPP_PROTOCOL_IPCP, pkt.raw);

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
    tracing::info!("IPCP Receive-Configure-Request event");

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

    let mut p = IpcpView { s, now };
    fsm::rcv_configure_req_event(&mut p, request, reply)
}

fn process_configure_ack(s: &mut PppSession, now: Instant, pkt: &Packet<'_>) -> Result<()> {
    tracing::info!("IPCP Receive-Configure-Ack event");

    if pkt.identifier != s.ipcp.identifier {
        return Err(PppError::WrongIdentifier);
    }

    let mut p = IpcpView { s, now };
    fsm::rcv_configure_ack_event(&mut p)
}

fn process_configure_nak(s: &mut PppSession, now: Instant, pkt: &Packet<'_>) -> Result<()> {
    tracing::info!("IPCP Receive-Configure-Nak event");

    if pkt.identifier != s.ipcp.identifier {
        return Err(PppError::WrongIdentifier);
    }

    // The peer suggests the values we should be requesting; adopt them.
    for option in packet::options(pkt.payload) {
        let option = option?;
        match option.kind {
            IPCP_OPTION_IP_ADDRESS => {
                s.local_config.ip_addr = option_addr(&option)?;
            }
            IPCP_OPTION_PRIMARY_DNS => {
                s.local_config.primary_dns = option_addr(&option)?;
            }
            IPCP_OPTION_SECONDARY_DNS => {
                s.local_config.secondary_dns = option_addr(&option)?;
            }
            _ => {}
        }
    }

    let mut p = IpcpView { s, now };
    fsm::rcv_configure_nak_event(&mut p)
}

fn process_configure_reject(s: &mut PppSession, now: Instant, pkt: &Packet<'_>) -> Result<()> {
    tracing::info!("IPCP Receive-Configure-Reject event");

    if pkt.identifier != s.ipcp.identifier {
        return Err(PppError::WrongIdentifier);
    }

    for option in packet::options(pkt.payload) {
        let option = option?;
        match option.kind {
            IPCP_OPTION_IP_ADDRESS => s.local_config.ip_addr_rejected = true,
            IPCP_OPTION_PRIMARY_DNS => s.local_config.primary_dns_rejected = true,
            IPCP_OPTION_SECONDARY_DNS => s.local_config.secondary_dns_rejected = true,
            _ => {}
        }
    }

    let mut p = IpcpView { s, now };
    fsm::rcv_configure_nak_event(&mut p)
}

fn process_terminate_req(s: &mut PppSession, now: Instant, pkt: &Packet<'_>) -> Result<()> {
    tracing::info!("IPCP Receive-Terminate-Request event");
    let mut p = IpcpView { s, now };
    fsm::rcv_terminate_req_event(&mut p, pkt)
}

fn process_terminate_ack(s: &mut PppSession, now: Instant) -> Result<()> {
    tracing::info!("IPCP Receive-Terminate-Ack event");
    let mut p = IpcpView { s, now };
    fsm::rcv_terminate_ack_event(&mut p)
}

fn process_code_rej(s: &mut PppSession, now: Instant, pkt: &Packet<'_>) -> Result<()> {
    tracing::info!("IPCP Receive-Code-Reject event");

    if pkt.payload.len() < packet::PACKET_HEADER_SIZE {
        return Err(PppError::MalformedPacket);
    }

    let rejected_code = pkt.payload[0];
    let acceptable = !(CODE_CONFIGURE_REQ..=CODE_CODE_REJ).contains(&rejected_code);

    let mut p = IpcpView { s, now };
    fsm::rcv_code_rej_event(&mut p, acceptable)
}

fn process_unknown_code(s: &mut PppSession, now: Instant, pkt: &Packet<'_>) -> Result<()> {
    tracing::info!("IPCP Receive-Unknown-Code event");
    let mut p = IpcpView { s, now };
    fsm::rcv_unknown_code_event(&mut p, pkt)
}

fn option_addr(option: &RawOption<'_>) -> Result<Ipv4Addr> {
    let bytes: [u8; 4] = option
        .data
        .try_into()
        .map_err(|_| PppError::MalformedPacket)?;
    Ok(Ipv4Addr::from(bytes))
}

/// Classify one IPCP option. Only the IP-Address option is open for
/// negotiation in a peer request; everything else (including the DNS
/// options, which the peer has no business asking us for) is rejected.
pub(crate) fn parse_option(
    s: &mut PppSession,
    option: &RawOption<'_>,
    reply: Option<&mut PacketBuilder>,
) -> Result<OptionStatus> {
    match option.kind {
        IPCP_OPTION_IP_ADDRESS => parse_ip_address_option(s, option, reply),
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

fn parse_ip_address_option(
    s: &mut PppSession,
    option: &RawOption<'_>,
    reply: Option<&mut PacketBuilder>,
) -> Result<OptionStatus> {
    let addr = option_addr(option)?;

    if addr != Ipv4Addr::UNSPECIFIED {
        if let Some(out) = reply {
            if out.code() == CODE_CONFIGURE_ACK {
                s.peer_config.ip_addr = addr;
                out.add_option(IPCP_OPTION_IP_ADDRESS, option.data);
            }
        }
        Ok(OptionStatus::Acceptable)
    } else {
        // The peer wants an address assigned; suggest the one we know.
        if let Some(out) = reply {
            if out.code() == CODE_CONFIGURE_NAK {
                out.add_option(
                    IPCP_OPTION_IP_ADDRESS,
                    &s.peer_config.ip_addr.octets(),
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
    s.send_control_packet(PPP_PROTOCOL_IPCP, reply.finish())
}

/// The IPCP automaton bound to a session.
pub(crate) struct IpcpView<'a> {
    pub s: &'a mut PppSession,
    pub now: Instant,
}

impl ControlProtocol for IpcpView<'_> {
    fn name(&self) -> &'static str {
        "IPCP"
    }

    fn fsm(&self) -> &PppFsm {
        &self.s.ipcp
    }

    fn fsm_mut(&mut self) -> &mut PppFsm {
        &mut self.s.ipcp
    }

    fn this_layer_up(&mut self) -> Result<()> {
        let local = &self.s.local_config;
        let info = Ipv4Info {
            local_addr: local.ip_addr,
            peer_addr: self.s.peer_config.ip_addr,
            subnet_mask: IPCP_DEFAULT_SUBNET_MASK,
            primary_dns: some_addr(local.primary_dns),
            secondary_dns: some_addr(local.secondary_dns),
        };

        tracing::info!(
            "IPCP this-layer-up: local {} peer {} dns {:?}/{:?}",
            info.local_addr,
            info.peer_addr,
            info.primary_dns,
            info.secondary_dns
        );

        self.s.ipv4_info = Some(info);
        Ok(())
    }

    fn this_layer_down(&mut self) -> Result<()> {
        tracing::info!("IPCP this-layer-down");
        self.s.ipv4_info = None;
        Ok(())
    }

    fn this_layer_started(&mut self) -> Result<()> {
        tracing::info!("IPCP this-layer-started");
        Ok(())
    }

    fn this_layer_finished(&mut self) -> Result<()> {
        tracing::info!("IPCP this-layer-finished");
        Ok(())
    }

    fn init_restart_count(&mut self, value: u32) {
        self.s.ipcp.restart_counter = value;
    }

    fn zero_restart_count(&mut self) {
        self.s.ipcp.restart_counter = 0;
        self.s.ipcp.timestamp = self.now;
    }

    fn send_configure_req(&mut self) -> Result<()> {
        let identifier = self.s.ipcp.identifier.wrapping_add(1);
        self.s.ipcp.identifier = identifier;

        let mut b = PacketBuilder::new(CODE_CONFIGURE_REQ, identifier);
        let cfg = &self.s.local_config;
        if !cfg.ip_addr_rejected {
            b.add_option(IPCP_OPTION_IP_ADDRESS, &cfg.ip_addr.octets());
        }
        if !cfg.primary_dns_rejected {
            b.add_option(IPCP_OPTION_PRIMARY_DNS, &cfg.primary_dns.octets());
        }
        if !cfg.secondary_dns_rejected {
            b.add_option(IPCP_OPTION_SECONDARY_DNS, &cfg.secondary_dns.octets());
        }

        self.s.send_control_packet(PPP_PROTOCOL_IPCP, b.finish())?;

        if self.s.ipcp.restart_counter > 0 {
            self.s.ipcp.restart_counter -= 1;
        }
        self.s.ipcp.timestamp = self.now;
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
        let identifier = self.s.ipcp.identifier.wrapping_add(1);
        self.s.ipcp.identifier = identifier;

        let b = PacketBuilder::new(CODE_TERMINATE_REQ, identifier);
        self.s.send_control_packet(PPP_PROTOCOL_IPCP, b.finish())?;

        if self.s.ipcp.restart_counter > 0 {
            self.s.ipcp.restart_counter -= 1;
        }
        self.s.ipcp.timestamp = self.now;
        Ok(())
    }

    fn send_terminate_ack(&mut self, request: Option<&Packet<'_>>) -> Result<()> {
        let identifier = match request {
            Some(req) => req.identifier,
            None => {
                self.s.ipcp.identifier = self.s.ipcp.identifier.wrapping_add(1);
                self.s.ipcp.identifier
            }
        };

        let b = PacketBuilder::new(CODE_TERMINATE_ACK, identifier);
        self.s.send_control_packet(PPP_PROTOCOL_IPCP, b.finish())
    }

    fn send_code_rej(&mut self, pkt: &Packet<'_>) -> Result<()> {
        self.s.ipcp.identifier = self.s.ipcp.identifier.wrapping_add(1);

        let mut b = PacketBuilder::new(CODE_CODE_REJ, self.s.ipcp.identifier);
        let room = PPP_MAX_CONF_REQ_SIZE - b.len();
        b.append(&pkt.raw[..pkt.raw.len().min(room)]);
        self.s.send_control_packet(PPP_PROTOCOL_IPCP, b.finish())
    }
}

fn some_addr(addr: Ipv4Addr) -> Option<Ipv4Addr> {
    if addr == Ipv4Addr::UNSPECIFIED {
        None
    } else {
        Some(addr)
    }
}
