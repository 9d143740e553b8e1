//! Diagnostic traces for packets and options.
//!
//! Everything here goes through `tracing` at debug level and is safe to
//! call on malformed input: a packet that cannot be decoded is dumped
//! as raw hex instead.

use crate::frame::{
    PPP_PROTOCOL_CHAP, PPP_PROTOCOL_IP, PPP_PROTOCOL_IPCP, PPP_PROTOCOL_IPV6,
    PPP_PROTOCOL_IPV6CP, PPP_PROTOCOL_LCP, PPP_PROTOCOL_PAP,
};
use crate::packet::{self, Packet};

/// LCP and NCP code names, indexed by code.
const CONTROL_CODE_LABELS: [&str; 12] = [
    "",
    "Configure-Request",
    "Configure-Ack",
    "Configure-Nak",
    "Configure-Reject",
    "Terminate-Request",
    "Terminate-Ack",
    "Code-Reject",
    "Protocol-Reject",
    "Echo-Request",
    "Echo-Reply",
    "Discard-Request",
];

/// PAP code names, indexed by code.
const PAP_CODE_LABELS: [&str; 4] = [
    "",
    "Authenticate-Request",
    "Authenticate-Ack",
    "Authenticate-Nak",
];

/// CHAP code names, indexed by code.
const CHAP_CODE_LABELS: [&str; 5] = ["", "Challenge", "Response", "Success", "Failure"];

/// LCP option names, indexed by type.
const LCP_OPTION_LABELS: [&str; 9] = [
    "",
    "Maximum-Receive-Unit",
    "Async-Control-Character-Map",
    "Authentication-Protocol",
    "Quality-Protocol",
    "Magic-Number",
    "",
    "Protocol-Field-Compression",
    "Address-and-Control-Field-Compression",
];

/// Human-readable name of a PPP protocol field value.
pub fn protocol_name(protocol: u16) -> &'static str {
    match protocol {
        PPP_PROTOCOL_LCP => "LCP",
        PPP_PROTOCOL_PAP => "PAP",
        PPP_PROTOCOL_CHAP => "CHAP",
        PPP_PROTOCOL_IPCP => "IPCP",
        PPP_PROTOCOL_IPV6CP => "IPV6CP",
        PPP_PROTOCOL_IP => "IPv4",
        PPP_PROTOCOL_IPV6 => "IPv6",
        _ => "unknown",
    }
}

/// Human-readable name of a control-packet code.
pub fn code_name(protocol: u16, code: u8) -> &'static str {
    let labels: &[&'static str] = match protocol {
        PPP_PROTOCOL_PAP => &PAP_CODE_LABELS,
        PPP_PROTOCOL_CHAP => &CHAP_CODE_LABELS,
        _ => &CONTROL_CODE_LABELS,
    };

    match labels.get(usize::from(code)) {
        Some(label) if !label.is_empty() => label,
        _ => "unknown",
    }
}

/// Human-readable name of a configuration option.
pub fn option_name(protocol: u16, kind: u8) -> &'static str {
    match protocol {
        PPP_PROTOCOL_LCP => match LCP_OPTION_LABELS.get(usize::from(kind)) {
            Some(label) if !label.is_empty() => label,
            _ => "unknown",
        },
        PPP_PROTOCOL_IPCP => match kind {
            1 => "IP-Addresses",
            2 => "IP-Compression-Protocol",
            3 => "IP-Address",
            129 => "Primary-DNS-Server-Address",
            130 => "Primary-NBNS-Server-Address",
            131 => "Secondary-DNS-Server-Address",
            132 => "Secondary-NBNS-Server-Address",
            _ => "unknown",
        },
        PPP_PROTOCOL_IPV6CP => match kind {
            1 => "Interface-Identifier",
            2 => "IPv6-Compression-Protocol",
            _ => "unknown",
        },
        _ => "unknown",
    }
}

/// Trace a control packet, decoding as much of it as possible.
pub fn dump_packet(direction: &str, protocol: u16, data: &[u8]) {
    if !tracing::enabled!(tracing::Level::DEBUG) {
        return;
    }

    let pkt = match packet::parse_packet(data) {
        Ok(pkt) => pkt,
        Err(_) => {
            tracing::debug!(
                "{} {} undecodable packet: {}",
                direction,
                protocol_name(protocol),
                hex::encode(data)
            );
            return;
        }
    };

    tracing::debug!(
        "{} {} {} #{} ({} bytes)",
        direction,
        protocol_name(protocol),
        code_name(protocol, pkt.code),
        pkt.identifier,
        pkt.raw.len()
    );

    match protocol {
        PPP_PROTOCOL_LCP | PPP_PROTOCOL_IPCP | PPP_PROTOCOL_IPV6CP => {
            dump_control_body(protocol, &pkt);
        }
        PPP_PROTOCOL_PAP | PPP_PROTOCOL_CHAP => {
            tracing::debug!("  body = {}", hex::encode(pkt.payload));
        }
        _ => {}
    }
}

/// Trace the body of an LCP or NCP packet: option lists for the
/// configuration codes, decoded fields for the link-maintenance codes.
fn dump_control_body(protocol: u16, pkt: &Packet<'_>) {
    match pkt.code {
        packet::CODE_CONFIGURE_REQ
        | packet::CODE_CONFIGURE_ACK
        | packet::CODE_CONFIGURE_NAK
        | packet::CODE_CONFIGURE_REJ => {
            for option in packet::options(pkt.payload) {
                match option {
                    Ok(option) => tracing::debug!(
                        "  {} ({}) = {}",
                        option_name(protocol, option.kind),
                        option.kind,
                        hex::encode(option.data)
                    ),
                    Err(_) => {
                        tracing::debug!("  malformed option list");
                        break;
                    }
                }
            }
        }
        packet::CODE_PROTOCOL_REJ if pkt.payload.len() >= 2 => {
            let rejected = u16::from_be_bytes([pkt.payload[0], pkt.payload[1]]);
            tracing::debug!("  rejected protocol = 0x{:04X}", rejected);
        }
        packet::CODE_CODE_REJ if !pkt.payload.is_empty() => {
            tracing::debug!(
                "  rejected code = {}",
                code_name(protocol, pkt.payload[0])
            );
        }
        packet::CODE_ECHO_REQ | packet::CODE_ECHO_REP if pkt.payload.len() >= 4 => {
            let magic = u32::from_be_bytes([
                pkt.payload[0],
                pkt.payload[1],
                pkt.payload[2],
                pkt.payload[3],
            ]);
            tracing::debug!("  magic number = 0x{:08X}", magic);
        }
        _ => {
            if !pkt.payload.is_empty() {
                tracing::debug!("  body = {}", hex::encode(pkt.payload));
            }
        }
    }
}
