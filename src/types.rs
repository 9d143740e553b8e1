//! Shared session types: phases, negotiated configuration, session info.

use std::net::{Ipv4Addr, Ipv6Addr};

/// 64-bit IPv6 interface identifier negotiated by IPV6CP.
pub type InterfaceId = [u8; 8];

/// Session-wide macro-state, layered above the per-protocol automata.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Phase {
    /// No link. AT commands may be exchanged with the underlying modem.
    Dead,
    /// LCP is negotiating link parameters.
    Establish,
    /// PAP or CHAP is running; network protocols are held back.
    Authenticate,
    /// NCPs are negotiating or established; the link carries traffic.
    Network,
    /// LCP is closing the link.
    Terminate,
}

/// Authentication protocol selected during LCP negotiation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AuthProtocol {
    /// Password Authentication Protocol.
    Pap,
    /// Challenge Handshake Authentication Protocol with the MD5 digest.
    ChapMd5,
}

impl AuthProtocol {
    /// Wire value of the Authentication-Protocol option for this scheme.
    pub fn protocol_number(self) -> u16 {
        match self {
            AuthProtocol::Pap => crate::frame::PPP_PROTOCOL_PAP,
            AuthProtocol::ChapMd5 => crate::frame::PPP_PROTOCOL_CHAP,
        }
    }
}

/// Options we offer in Configure-Request packets, with a rejected flag
/// per option. Once the peer has rejected an option it is never offered
/// again for the lifetime of the connection attempt.
#[derive(Debug, Clone)]
pub struct LocalConfig {
    pub mru: u16,
    pub mru_rejected: bool,
    pub accm: u32,
    pub accm_rejected: bool,
    /// Authentication we require from the peer (we are the authenticator).
    pub auth_protocol: Option<AuthProtocol>,
    pub auth_protocol_rejected: bool,
    pub magic_number: u32,
    pub magic_number_rejected: bool,
    pub pfc: bool,
    pub pfc_rejected: bool,
    pub acfc: bool,
    pub acfc_rejected: bool,
    pub ip_addr: Ipv4Addr,
    pub ip_addr_rejected: bool,
    pub primary_dns: Ipv4Addr,
    pub primary_dns_rejected: bool,
    pub secondary_dns: Ipv4Addr,
    pub secondary_dns_rejected: bool,
    pub interface_id: InterfaceId,
    pub interface_id_rejected: bool,
}

impl Default for LocalConfig {
    fn default() -> Self {
        LocalConfig {
            mru: crate::frame::PPP_DEFAULT_MRU,
            mru_rejected: false,
            accm: crate::frame::PPP_DEFAULT_ACCM,
            accm_rejected: false,
            auth_protocol: None,
            auth_protocol_rejected: false,
            magic_number: crate::frame::PPP_DEFAULT_MAGIC_NUMBER,
            magic_number_rejected: false,
            pfc: true,
            pfc_rejected: false,
            acfc: true,
            acfc_rejected: false,
            ip_addr: Ipv4Addr::UNSPECIFIED,
            ip_addr_rejected: false,
            primary_dns: Ipv4Addr::UNSPECIFIED,
            primary_dns_rejected: false,
            secondary_dns: Ipv4Addr::UNSPECIFIED,
            secondary_dns_rejected: false,
            interface_id: [0; 8],
            interface_id_rejected: false,
        }
    }
}

/// Options the peer negotiated with us, applied to outbound traffic.
#[derive(Debug, Clone)]
pub struct PeerConfig {
    pub mru: u16,
    pub accm: u32,
    /// Authentication the peer requires from us (the peer is the
    /// authenticator).
    pub auth_protocol: Option<AuthProtocol>,
    pub magic_number: u32,
    /// Protocol field compression accepted by the peer.
    pub pfc: bool,
    /// Address/Control field compression accepted by the peer.
    pub acfc: bool,
    pub ip_addr: Ipv4Addr,
    pub interface_id: InterfaceId,
}

impl Default for PeerConfig {
    fn default() -> Self {
        PeerConfig {
            mru: crate::frame::PPP_DEFAULT_MRU,
            accm: crate::frame::PPP_DEFAULT_ACCM,
            auth_protocol: None,
            magic_number: crate::frame::PPP_DEFAULT_MAGIC_NUMBER,
            pfc: false,
            acfc: false,
            ip_addr: Ipv4Addr::UNSPECIFIED,
            interface_id: [0; 8],
        }
    }
}

/// IPv4 addressing established by IPCP.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Ipv4Info {
    pub local_addr: Ipv4Addr,
    pub peer_addr: Ipv4Addr,
    pub subnet_mask: Ipv4Addr,
    pub primary_dns: Option<Ipv4Addr>,
    pub secondary_dns: Option<Ipv4Addr>,
}

/// IPv6 link-local addressing established by IPV6CP.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Ipv6Info {
    pub local_addr: Ipv6Addr,
    pub peer_addr: Ipv6Addr,
}

/// Addressing negotiated for the current session.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SessionInfo {
    pub ipv4: Option<Ipv4Info>,
    pub ipv6: Option<Ipv6Info>,
}

/// Network-layer protocol carried over the established link.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NetworkProtocol {
    Ipv4,
    Ipv6,
}

impl NetworkProtocol {
    /// PPP protocol field value for this payload type.
    pub fn protocol_number(self) -> u16 {
        match self {
            NetworkProtocol::Ipv4 => crate::frame::PPP_PROTOCOL_IP,
            NetworkProtocol::Ipv6 => crate::frame::PPP_PROTOCOL_IPV6,
        }
    }
}

/// A network-layer packet extracted from an inbound PPP frame.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NetworkPacket {
    pub protocol: NetworkProtocol,
    pub payload: Vec<u8>,
}
