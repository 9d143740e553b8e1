//! Session configuration surface.

use std::fmt;
use std::net::Ipv4Addr;
use std::sync::Arc;

use rand::RngCore;

use crate::chap::{self, CHAP_MD5_DIGEST_SIZE};
use crate::types::InterfaceId;

/// Source of random bytes used for CHAP challenges.
pub type RandomSource = Arc<dyn Fn(&mut [u8]) + Send + Sync>;

/// Credential verification callback.
///
/// Invoked while we are the authenticator, with the name the peer
/// submitted and a [`PasswordCheck`] handle bound to the credentials of
/// the packet being verified. The callback looks up the password it
/// expects for that name and returns the result of
/// [`PasswordCheck::matches`].
pub type AuthVerify = Arc<dyn Fn(&str, &PasswordCheck<'_>) -> bool + Send + Sync>;

/// Authentication protocols we are willing to negotiate.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AuthProtocols {
    pub pap: bool,
    pub chap_md5: bool,
}

impl Default for AuthProtocols {
    fn default() -> Self {
        AuthProtocols {
            pap: true,
            chap_md5: true,
        }
    }
}

/// PPP session settings.
///
/// The addressing fields seed the Configure-Request options; leaving
/// them unspecified asks the peer to assign values. A DNS server set
/// here explicitly is treated as static configuration and excluded from
/// negotiation.
#[derive(Clone)]
pub struct PppConfig {
    /// Maximum receive unit offered to the peer.
    pub mru: u16,
    /// Async control character map offered to the peer.
    pub accm: u32,
    /// Authentication protocols allowed on this link, for both
    /// directions.
    pub allowed_auth: AuthProtocols,
    /// Local IPv4 address, or unspecified to request one.
    pub local_addr: Ipv4Addr,
    /// Expected peer IPv4 address (suggested when the peer requests an
    /// address without naming one).
    pub peer_addr: Ipv4Addr,
    /// Static primary DNS server; `None` negotiates one.
    pub primary_dns: Option<Ipv4Addr>,
    /// Static secondary DNS server; `None` negotiates one.
    pub secondary_dns: Option<Ipv4Addr>,
    /// Local IPv6 interface identifier, or all-zero to request one.
    pub interface_id: InterfaceId,
    /// Expected peer IPv6 interface identifier.
    pub peer_interface_id: InterfaceId,
    /// Random bytes for CHAP challenges.
    pub random_source: RandomSource,
    /// Credential verification; `None` means the peer is not
    /// authenticated by us.
    pub auth_verify: Option<AuthVerify>,
}

impl Default for PppConfig {
    fn default() -> Self {
        PppConfig {
            mru: crate::frame::PPP_DEFAULT_MRU,
            accm: crate::frame::PPP_DEFAULT_ACCM,
            allowed_auth: AuthProtocols::default(),
            local_addr: Ipv4Addr::UNSPECIFIED,
            peer_addr: Ipv4Addr::UNSPECIFIED,
            primary_dns: None,
            secondary_dns: None,
            interface_id: [0; 8],
            peer_interface_id: [0; 8],
            random_source: Arc::new(|buf| rand::thread_rng().fill_bytes(buf)),
            auth_verify: None,
        }
    }
}

impl fmt::Debug for PppConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PppConfig")
            .field("mru", &self.mru)
            .field("accm", &self.accm)
            .field("allowed_auth", &self.allowed_auth)
            .field("local_addr", &self.local_addr)
            .field("peer_addr", &self.peer_addr)
            .field("primary_dns", &self.primary_dns)
            .field("secondary_dns", &self.secondary_dns)
            .field("interface_id", &self.interface_id)
            .field("peer_interface_id", &self.peer_interface_id)
            .field("auth_verify", &self.auth_verify.is_some())
            .finish()
    }
}

/// Credentials submitted by the peer, scoped to the packet that carried
/// them. The handle is only valid for the duration of the verification
/// callback; nothing is retained once the callback returns.
pub struct PasswordCheck<'a>(pub(crate) CheckInner<'a>);

pub(crate) enum CheckInner<'a> {
    /// PAP carries the password in the clear.
    Pap { submitted: &'a [u8] },
    /// CHAP carries a digest over the shared secret.
    ChapMd5 {
        identifier: u8,
        challenge: &'a [u8; CHAP_MD5_DIGEST_SIZE],
        response: &'a [u8; CHAP_MD5_DIGEST_SIZE],
    },
}

impl PasswordCheck<'_> {
    /// Check the submitted credentials against `password`.
    ///
    /// For PAP this is a byte comparison with the transmitted password;
    /// for CHAP the expected digest is recomputed over the identifier,
    /// the password and the outstanding challenge and compared with the
    /// digest the peer submitted.
    pub fn matches(&self, password: &str) -> bool {
        match &self.0 {
            CheckInner::Pap { submitted } => *submitted == password.as_bytes(),
            CheckInner::ChapMd5 {
                identifier,
                challenge,
                response,
            } => {
                let expected =
                    chap::response_digest(*identifier, password.as_bytes(), &challenge[..]);
                expected == **response
            }
        }
    }
}
