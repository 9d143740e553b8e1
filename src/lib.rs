//! PPP link negotiation stack.
//!
//! The crate implements the PPP negotiation suite over a framed byte
//! transport: the RFC-1661 option-negotiation automaton, its LCP, IPCP
//! and IPV6CP instances, the PAP and CHAP authentication protocols and
//! the session orchestrator tying them together. HDLC byte stuffing,
//! the modem and the IP layers above are external collaborators.

pub mod chap;
pub mod config;
pub mod driver;
pub mod error;
pub mod frame;
pub mod fsm;
pub mod ipcp;
pub mod ipv6cp;
pub mod lcp;
pub mod log;
pub mod packet;
pub mod pap;
pub mod session;
pub mod transport;
pub mod types;

pub use config::{AuthProtocols, AuthVerify, PasswordCheck, PppConfig, RandomSource};
pub use driver::{PppLink, PPP_POLLING_INTERVAL, PPP_TICK_INTERVAL};
pub use error::{PppError, Result};
pub use fsm::{PppState, ReplyCode};
pub use session::PppSession;
pub use transport::LinkTransport;
pub use types::{
    AuthProtocol, InterfaceId, Ipv4Info, Ipv6Info, NetworkPacket, NetworkProtocol, Phase,
    SessionInfo,
};
