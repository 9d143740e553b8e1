//! Session orchestrator.
//!
//! A [`PppSession`] owns every automaton and authentication record of
//! one link, the negotiated configuration pair and the transport
//! handle. It is driven from exactly one execution context at a time:
//! inbound frames go through [`process_frame`](PppSession::process_frame),
//! time goes through [`tick`](PppSession::tick), and the public
//! operations reset or close the machines synchronously. Nothing in
//! here spawns or blocks.

use std::time::Instant;

use crate::chap::{self, ChapFsm};
use crate::config::PppConfig;
use crate::error::{PppError, Result};
use crate::frame::{
    self, PPP_PROTOCOL_CHAP, PPP_PROTOCOL_IP, PPP_PROTOCOL_IPCP, PPP_PROTOCOL_IPV6,
    PPP_PROTOCOL_IPV6CP, PPP_PROTOCOL_LCP, PPP_PROTOCOL_PAP,
};
use crate::fsm::{PppFsm, PppState};
use crate::ipcp;
use crate::ipv6cp;
use crate::lcp;
use crate::log;
use crate::pap::{self, PapFsm};
use crate::transport::LinkTransport;
use crate::types::{
    AuthProtocol, Ipv4Info, Ipv6Info, LocalConfig, NetworkPacket, NetworkProtocol,
    PeerConfig, Phase, SessionInfo,
};

/// State of one PPP link.
pub struct PppSession {
    pub(crate) config: PppConfig,
    pub(crate) transport: Box<dyn LinkTransport>,

    pub(crate) phase: Phase,
    pub(crate) lcp: PppFsm,
    pub(crate) ipcp: PppFsm,
    pub(crate) ipv6cp: PppFsm,
    pub(crate) pap: PapFsm,
    pub(crate) chap: ChapFsm,

    pub(crate) local_config: LocalConfig,
    pub(crate) peer_config: PeerConfig,

    pub(crate) username: String,
    pub(crate) password: String,
    pub(crate) peer_name: String,

    pub(crate) local_auth_done: bool,
    pub(crate) peer_auth_done: bool,

    /// The peer protocol-rejected IPv4; stop sending it.
    pub(crate) ip_rejected: bool,
    /// The peer protocol-rejected IPv6; stop sending it.
    pub(crate) ipv6_rejected: bool,

    pub(crate) ipv4_info: Option<Ipv4Info>,
    pub(crate) ipv6_info: Option<Ipv6Info>,
}

impl PppSession {
    /// Create a session over `transport`.
    pub fn new(config: PppConfig, transport: Box<dyn LinkTransport>) -> Self {
        PppSession {
            config,
            transport,
            phase: Phase::Dead,
            lcp: PppFsm::new(),
            ipcp: PppFsm::new(),
            ipv6cp: PppFsm::new(),
            pap: PapFsm::new(),
            chap: ChapFsm::new(),
            local_config: LocalConfig::default(),
            peer_config: PeerConfig::default(),
            username: String::new(),
            password: String::new(),
            peer_name: String::new(),
            local_auth_done: false,
            peer_auth_done: false,
            ip_rejected: false,
            ipv6_rejected: false,
            ipv4_info: None,
            ipv6_info: None,
        }
    }

    /// Set the credentials used when the peer authenticates us, and the
    /// secret checked when we authenticate the peer over CHAP.
    pub fn set_auth_info(&mut self, username: &str, password: &str) {
        self.username = username.to_owned();
        self.password = password.to_owned();
    }

    /// Begin establishing the link: reset every machine, seed the
    /// negotiation state from the configuration and fire the LCP Open
    /// event. The caller polls [`is_established`](Self::is_established)
    /// afterwards.
    pub fn start(&mut self, now: Instant) -> Result<()> {
        if self.phase != Phase::Dead {
            return Err(PppError::AlreadyConnected);
        }

        self.lcp.reset();
        self.ipcp.reset();
        self.ipv6cp.reset();
        self.pap.reset();
        self.chap.reset();

        self.local_auth_done = false;
        self.peer_auth_done = false;
        self.ip_rejected = false;
        self.ipv6_rejected = false;
        self.ipv4_info = None;
        self.ipv6_info = None;
        self.peer_name.clear();

        self.local_config = LocalConfig {
            mru: self.config.mru,
            accm: self.config.accm,
            ip_addr: self.config.local_addr,
            interface_id: self.config.interface_id,
            ..LocalConfig::default()
        };

        // Authenticating the peer requires a verification callback; the
        // strongest allowed scheme wins.
        if self.config.auth_verify.is_some() {
            if self.config.allowed_auth.pap {
                self.local_config.auth_protocol = Some(AuthProtocol::Pap);
            }
            if self.config.allowed_auth.chap_md5 {
                self.local_config.auth_protocol = Some(AuthProtocol::ChapMd5);
            }
        }

        // Statically configured DNS servers are not negotiated.
        if let Some(addr) = self.config.primary_dns {
            self.local_config.primary_dns = addr;
            self.local_config.primary_dns_rejected = true;
        }
        if let Some(addr) = self.config.secondary_dns {
            self.local_config.secondary_dns = addr;
            self.local_config.secondary_dns_rejected = true;
        }

        self.peer_config = PeerConfig {
            ip_addr: self.config.peer_addr,
            interface_id: self.config.peer_interface_id,
            ..PeerConfig::default()
        };

        lcp::open(self, now)
    }

    /// Begin closing the link. The caller polls [`phase`](Self::phase)
    /// for the Dead phase afterwards.
    pub fn close(&mut self, now: Instant) -> Result<()> {
        lcp::close(self, now)
    }

    /// Abandon any handshake in flight and force every machine back to
    /// its initial state. Used when a blocking operation times out.
    pub fn force_reset(&mut self) {
        tracing::warn!("forcing PPP session reset");
        self.phase = Phase::Dead;
        self.lcp.reset();
        self.ipcp.reset();
        self.ipv6cp.reset();
        self.pap.reset();
        self.chap.reset();
        self.ipv4_info = None;
        self.ipv6_info = None;
    }

    /// Periodic timer handler: check every machine's restart timer
    /// against `now` and fire the timeout events that are due.
    pub fn tick(&mut self, now: Instant) -> Result<()> {
        lcp::tick(self, now)?;
        ipcp::tick(self, now)?;
        ipv6cp::tick(self, now)?;
        pap::tick(self, now)?;
        chap::tick(self, now)
    }

    /// Process one de-framed inbound frame.
    ///
    /// The frame is FCS-checked, its header decompressed and the
    /// payload dispatched on the Protocol field. Network-layer payloads
    /// are handed back to the caller; control packets advance the
    /// machines. A malformed or stale packet yields an error and no
    /// state change.
    pub fn process_frame(
        &mut self,
        now: Instant,
        data: &[u8],
    ) -> Result<Option<NetworkPacket>> {
        let (protocol, payload) = frame::parse_frame(data)?;
        tracing::trace!(
            "frame received: {} ({} bytes)",
            log::protocol_name(protocol),
            data.len()
        );

        match protocol {
            PPP_PROTOCOL_LCP => {
                lcp::process_packet(self, now, payload)?;
                Ok(None)
            }
            PPP_PROTOCOL_IPCP => {
                ipcp::process_packet(self, now, payload)?;
                Ok(None)
            }
            PPP_PROTOCOL_IPV6CP => {
                ipv6cp::process_packet(self, now, payload)?;
                Ok(None)
            }
            PPP_PROTOCOL_PAP => {
                pap::process_packet(self, now, payload)?;
                Ok(None)
            }
            PPP_PROTOCOL_CHAP => {
                chap::process_packet(self, now, payload)?;
                Ok(None)
            }
            PPP_PROTOCOL_IP => Ok(Some(NetworkPacket {
                protocol: NetworkProtocol::Ipv4,
                payload: payload.to_vec(),
            })),
            PPP_PROTOCOL_IPV6 => Ok(Some(NetworkPacket {
                protocol: NetworkProtocol::Ipv6,
                payload: payload.to_vec(),
            })),
            _ => {
                // The peer is attempting to use a protocol we do not
                // support.
                lcp::process_unknown_protocol(self, protocol, payload)?;
                Ok(None)
            }
        }
    }

    /// Send a network-layer packet over the established link.
    pub fn send_packet(&mut self, protocol: NetworkProtocol, payload: &[u8]) -> Result<()> {
        if self.phase != Phase::Network {
            return Err(PppError::NotConnected);
        }

        let ncp_open = match protocol {
            NetworkProtocol::Ipv4 => !self.ip_rejected && self.ipcp.state == PppState::Opened,
            NetworkProtocol::Ipv6 => {
                !self.ipv6_rejected && self.ipv6cp.state == PppState::Opened
            }
        };
        if !ncp_open {
            return Err(PppError::NotConnected);
        }

        let frame = frame::build_frame(
            protocol.protocol_number(),
            payload,
            self.peer_config.pfc,
            self.peer_config.acfc,
        );
        self.transport.send_frame(&frame)
    }

    /// Frame and transmit a control packet.
    pub(crate) fn send_control_packet(&mut self, protocol: u16, packet: Vec<u8>) -> Result<()> {
        log::dump_packet("send", protocol, &packet);

        let frame = frame::build_frame(
            protocol,
            &packet,
            self.peer_config.pfc,
            self.peer_config.acfc,
        );
        self.transport.send_frame(&frame)
    }

    /// Advance to the Network phase and open the NCPs.
    pub(crate) fn enter_network_phase(&mut self, now: Instant) -> Result<()> {
        tracing::info!("entering Network phase");
        self.phase = Phase::Network;
        ipcp::open(self, now)?;
        ipv6cp::open(self, now)
    }

    /// Advance to the Network phase once both authentication directions
    /// have completed. Called from the authentication protocols, whose
    /// acknowledgements may arrive again after the phase has already
    /// advanced.
    pub(crate) fn maybe_enter_network(&mut self, now: Instant) -> Result<()> {
        if self.local_auth_done && self.peer_auth_done && self.phase == Phase::Authenticate {
            self.enter_network_phase(now)?;
        }
        Ok(())
    }

    /// Send a raw AT command to the modem below the link. Only legal
    /// while the session is Dead.
    pub fn send_at_command(&mut self, command: &str) -> Result<()> {
        if self.phase != Phase::Dead {
            return Err(PppError::AlreadyConnected);
        }
        self.transport.purge_receive_buffer()?;
        self.transport.send_at_command(command)
    }

    /// Poll for an AT command response. Only legal while the session is
    /// Dead.
    pub fn receive_at_command(&mut self) -> Result<Option<String>> {
        if self.phase != Phase::Dead {
            return Err(PppError::AlreadyConnected);
        }
        self.transport.receive_at_command()
    }

    /// Current session phase.
    pub fn phase(&self) -> Phase {
        self.phase
    }

    /// Whether the link is up with at least one network protocol
    /// established.
    pub fn is_established(&self) -> bool {
        self.phase == Phase::Network
            && (self.ipcp.state == PppState::Opened || self.ipv6cp.state == PppState::Opened)
    }

    /// Addressing negotiated for the current session.
    pub fn session_info(&self) -> SessionInfo {
        SessionInfo {
            ipv4: self.ipv4_info,
            ipv6: self.ipv6_info,
        }
    }

    /// Name the peer identified itself with during authentication.
    pub fn peer_name(&self) -> &str {
        &self.peer_name
    }

    /// LCP automaton state, for diagnostics.
    pub fn lcp_state(&self) -> PppState {
        self.lcp.state
    }

    /// IPCP automaton state, for diagnostics.
    pub fn ipcp_state(&self) -> PppState {
        self.ipcp.state
    }

    /// IPV6CP automaton state, for diagnostics.
    pub fn ipv6cp_state(&self) -> PppState {
        self.ipv6cp.state
    }
}
