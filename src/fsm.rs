//! Generic option-negotiation automaton shared by LCP, IPCP and IPV6CP.
//!
//! The ten-state machine follows RFC 1661 section 4. Protocol instances
//! plug into it through the [`ControlProtocol`] trait, which carries the
//! side-effecting actions the transition table may invoke; the event
//! functions themselves never touch anything but the [`PppFsm`] record
//! and those actions. An event that is undefined for the current state
//! leaves the state unchanged and fires no action.

use std::time::{Duration, Instant};

use crate::error::Result;
use crate::packet::Packet;

/// Maximum number of Configure-Request transmissions.
pub const PPP_MAX_CONFIGURE: u32 = 10;
/// Maximum number of Terminate-Request transmissions.
pub const PPP_MAX_TERMINATE: u32 = 2;
/// Restart timer period for Configure-Request and Terminate-Request.
pub const PPP_RESTART_TIMER: Duration = Duration::from_secs(3);

/// Automaton state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum PppState {
    Initial,
    Starting,
    Closed,
    Stopped,
    Closing,
    Stopping,
    ReqSent,
    AckRcvd,
    AckSent,
    Opened,
}

/// Aggregate verdict over the options of a received Configure-Request,
/// naming the reply the automaton must transmit. Reject dominates Nak,
/// Nak dominates Ack.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReplyCode {
    Ack,
    Nak,
    Reject,
}

/// Per-instance automaton record.
///
/// The restart counter is only ever written by the
/// Initialize-Restart-Count and Zero-Restart-Count actions and
/// decremented by the request-sending actions; the state only changes
/// through the event functions in this module.
#[derive(Debug, Clone)]
pub struct PppFsm {
    pub state: PppState,
    /// Identifier of the most recently sent request, used to match
    /// replies.
    pub identifier: u8,
    /// Remaining retransmission budget for the pending request.
    pub restart_counter: u32,
    /// Time of the most recent request transmission.
    pub timestamp: Instant,
}

impl PppFsm {
    pub fn new() -> Self {
        PppFsm {
            state: PppState::Initial,
            identifier: 0,
            restart_counter: 0,
            timestamp: Instant::now(),
        }
    }

    /// Force the automaton back to its initial state.
    pub fn reset(&mut self) {
        self.state = PppState::Initial;
        self.identifier = 0;
        self.restart_counter = 0;
    }

    /// Whether the restart timer is armed in the current state.
    pub fn restart_timer_running(&self) -> bool {
        self.state >= PppState::Closing && self.state <= PppState::AckSent
    }
}

impl Default for PppFsm {
    fn default() -> Self {
        Self::new()
    }
}

/// Capability table a protocol instance supplies to the automaton.
///
/// The send actions transmit on behalf of the instance and maintain its
/// identifier, restart counter and timestamp; the layer notifications
/// propagate negotiation results to the rest of the session. None of
/// these are ever invoked directly by packet handlers, only through the
/// event functions below.
pub trait ControlProtocol {
    /// Protocol name, for traces.
    fn name(&self) -> &'static str;
    fn fsm(&self) -> &PppFsm;
    fn fsm_mut(&mut self) -> &mut PppFsm;

    fn this_layer_up(&mut self) -> Result<()>;
    fn this_layer_down(&mut self) -> Result<()>;
    fn this_layer_started(&mut self) -> Result<()>;
    fn this_layer_finished(&mut self) -> Result<()>;
    fn init_restart_count(&mut self, value: u32);
    fn zero_restart_count(&mut self);
    fn send_configure_req(&mut self) -> Result<()>;
    fn send_configure_ack(&mut self, request: &Packet<'_>) -> Result<()>;
    fn send_configure_nak(&mut self, request: &Packet<'_>) -> Result<()>;
    fn send_configure_rej(&mut self, request: &Packet<'_>) -> Result<()>;
    fn send_terminate_req(&mut self) -> Result<()>;
    fn send_terminate_ack(&mut self, request: Option<&Packet<'_>>) -> Result<()>;
    fn send_code_rej(&mut self, packet: &Packet<'_>) -> Result<()>;
    fn send_echo_rep(&mut self, request: &Packet<'_>) -> Result<()> {
        let _ = request;
        Ok(())
    }
}

fn change_state<P: ControlProtocol + ?Sized>(p: &mut P, new_state: PppState) {
    tracing::info!("{} FSM: {:?} -> {:?}", p.name(), p.fsm().state, new_state);
    p.fsm_mut().state = new_state;
}

/// Up event: the lower layer is ready to carry packets.
pub fn up_event<P: ControlProtocol + ?Sized>(p: &mut P) -> Result<()> {
    use PppState::*;
    match p.fsm().state {
        Initial => {
            change_state(p, Closed);
        }
        Starting => {
            p.init_restart_count(PPP_MAX_CONFIGURE);
            p.send_configure_req()?;
            change_state(p, ReqSent);
        }
        Closed | Stopped | Closing | Stopping | ReqSent | AckRcvd | AckSent | Opened => {}
    }
    Ok(())
}

/// Down event: the lower layer is no longer ready to carry packets.
pub fn down_event<P: ControlProtocol + ?Sized>(p: &mut P) -> Result<()> {
    use PppState::*;
    match p.fsm().state {
        Closed => {
            change_state(p, Initial);
        }
        Stopped => {
            change_state(p, Starting);
            p.this_layer_started()?;
        }
        Closing => {
            change_state(p, Initial);
        }
        Stopping | ReqSent | AckRcvd | AckSent => {
            change_state(p, Starting);
        }
        Opened => {
            change_state(p, Starting);
            p.this_layer_down()?;
        }
        Initial | Starting => {}
    }
    Ok(())
}

/// Open event: the link is administratively available for traffic.
pub fn open_event<P: ControlProtocol + ?Sized>(p: &mut P) -> Result<()> {
    use PppState::*;
    match p.fsm().state {
        Initial => {
            change_state(p, Starting);
            p.this_layer_started()?;
        }
        Closed => {
            p.init_restart_count(PPP_MAX_CONFIGURE);
            p.send_configure_req()?;
            change_state(p, ReqSent);
        }
        Closing => {
            change_state(p, Stopping);
        }
        Starting | Stopped | Stopping | ReqSent | AckRcvd | AckSent | Opened => {}
    }
    Ok(())
}

/// Close event: the link is no longer available for traffic.
pub fn close_event<P: ControlProtocol + ?Sized>(p: &mut P) -> Result<()> {
    use PppState::*;
    match p.fsm().state {
        Starting => {
            change_state(p, Initial);
            p.this_layer_finished()?;
        }
        Stopped => {
            change_state(p, Closed);
        }
        Stopping => {
            change_state(p, Closing);
        }
        ReqSent | AckRcvd | AckSent => {
            p.init_restart_count(PPP_MAX_TERMINATE);
            p.send_terminate_req()?;
            change_state(p, Closing);
        }
        Opened => {
            p.init_restart_count(PPP_MAX_TERMINATE);
            p.send_terminate_req()?;
            change_state(p, Closing);
            p.this_layer_down()?;
        }
        Initial | Closed | Closing => {}
    }
    Ok(())
}

/// Timeout event. The restart counter selects the TO+ branch
/// (retransmit) or the TO- branch (give up and finalize).
pub fn timeout_event<P: ControlProtocol + ?Sized>(p: &mut P) -> Result<()> {
    use PppState::*;
    if p.fsm().restart_counter > 0 {
        match p.fsm().state {
            Closing | Stopping => {
                p.send_terminate_req()?;
            }
            ReqSent | AckRcvd => {
                p.send_configure_req()?;
                change_state(p, ReqSent);
            }
            AckSent => {
                p.send_configure_req()?;
            }
            Initial | Starting | Closed | Stopped | Opened => {}
        }
    } else {
        match p.fsm().state {
            Closing => {
                change_state(p, Closed);
                p.this_layer_finished()?;
            }
            Stopping | ReqSent | AckRcvd | AckSent => {
                change_state(p, Stopped);
                p.this_layer_finished()?;
            }
            Initial | Starting | Closed | Stopped | Opened => {}
        }
    }
    Ok(())
}

/// Receive-Configure-Request event. `reply` is the aggregate verdict
/// computed by the option codec over every option in the request.
pub fn rcv_configure_req_event<P: ControlProtocol + ?Sized>(
    p: &mut P,
    request: &Packet<'_>,
    reply: ReplyCode,
) -> Result<()> {
    use PppState::*;
    match reply {
        ReplyCode::Ack => match p.fsm().state {
            Closed => {
                p.send_terminate_ack(None)?;
            }
            Stopped => {
                p.init_restart_count(PPP_MAX_CONFIGURE);
                p.send_configure_req()?;
                p.send_configure_ack(request)?;
                change_state(p, AckSent);
            }
            Closing | Stopping => {}
            ReqSent => {
                p.send_configure_ack(request)?;
                change_state(p, AckSent);
            }
            AckRcvd => {
                p.send_configure_ack(request)?;
                change_state(p, Opened);
                p.this_layer_up()?;
            }
            AckSent => {
                p.send_configure_ack(request)?;
            }
            Opened => {
                p.send_configure_req()?;
                p.send_configure_ack(request)?;
                change_state(p, AckSent);
                p.this_layer_down()?;
            }
            Initial | Starting => {}
        },
        ReplyCode::Nak => match p.fsm().state {
            Closed => {
                p.send_terminate_ack(None)?;
            }
            Stopped => {
                p.init_restart_count(PPP_MAX_CONFIGURE);
                p.send_configure_req()?;
                p.send_configure_nak(request)?;
                change_state(p, ReqSent);
            }
            Closing | Stopping => {}
            ReqSent | AckRcvd => {
                p.send_configure_nak(request)?;
            }
            AckSent => {
                p.send_configure_nak(request)?;
                change_state(p, ReqSent);
            }
            Opened => {
                p.send_configure_req()?;
                p.send_configure_nak(request)?;
                change_state(p, ReqSent);
                p.this_layer_down()?;
            }
            Initial | Starting => {}
        },
        ReplyCode::Reject => match p.fsm().state {
            Closed => {
                p.send_terminate_ack(None)?;
            }
            Stopped => {
                p.init_restart_count(PPP_MAX_CONFIGURE);
                p.send_configure_req()?;
                p.send_configure_rej(request)?;
                change_state(p, ReqSent);
            }
            Closing | Stopping => {}
            ReqSent | AckRcvd => {
                p.send_configure_rej(request)?;
            }
            AckSent => {
                p.send_configure_rej(request)?;
                change_state(p, ReqSent);
            }
            Opened => {
                p.send_configure_req()?;
                p.send_configure_rej(request)?;
                change_state(p, ReqSent);
                p.this_layer_down()?;
            }
            Initial | Starting => {}
        },
    }
    Ok(())
}

/// Receive-Configure-Ack event. The caller has already verified the
/// identifier against the outstanding request.
pub fn rcv_configure_ack_event<P: ControlProtocol + ?Sized>(p: &mut P) -> Result<()> {
    use PppState::*;
    match p.fsm().state {
        Closed | Stopped => {
            p.send_terminate_ack(None)?;
        }
        Closing | Stopping => {}
        ReqSent => {
            p.init_restart_count(PPP_MAX_CONFIGURE);
            change_state(p, AckRcvd);
        }
        AckRcvd => {
            p.send_configure_req()?;
            change_state(p, ReqSent);
        }
        AckSent => {
            p.init_restart_count(PPP_MAX_CONFIGURE);
            change_state(p, Opened);
            p.this_layer_up()?;
        }
        Opened => {
            p.send_configure_req()?;
            change_state(p, ReqSent);
            p.this_layer_down()?;
        }
        Initial | Starting => {}
    }
    Ok(())
}

/// Receive-Configure-Nak event, shared by Configure-Nak and
/// Configure-Reject after the option codec has adjusted the local
/// configuration. The caller has already verified the identifier.
pub fn rcv_configure_nak_event<P: ControlProtocol + ?Sized>(p: &mut P) -> Result<()> {
    use PppState::*;
    match p.fsm().state {
        Closed | Stopped => {
            p.send_terminate_ack(None)?;
        }
        Closing | Stopping => {}
        ReqSent => {
            p.init_restart_count(PPP_MAX_CONFIGURE);
            p.send_configure_req()?;
        }
        AckRcvd => {
            p.send_configure_req()?;
            change_state(p, ReqSent);
        }
        AckSent => {
            p.init_restart_count(PPP_MAX_CONFIGURE);
            p.send_configure_req()?;
        }
        Opened => {
            p.send_configure_req()?;
            change_state(p, ReqSent);
            p.this_layer_down()?;
        }
        Initial | Starting => {}
    }
    Ok(())
}

/// Receive-Terminate-Request event.
pub fn rcv_terminate_req_event<P: ControlProtocol + ?Sized>(
    p: &mut P,
    request: &Packet<'_>,
) -> Result<()> {
    use PppState::*;
    match p.fsm().state {
        Closed | Stopped | Closing | Stopping => {
            p.send_terminate_ack(Some(request))?;
        }
        ReqSent | AckRcvd | AckSent => {
            p.send_terminate_ack(Some(request))?;
            change_state(p, ReqSent);
        }
        Opened => {
            p.zero_restart_count();
            p.send_terminate_ack(Some(request))?;
            change_state(p, Stopping);
            p.this_layer_down()?;
        }
        Initial | Starting => {}
    }
    Ok(())
}

/// Receive-Terminate-Ack event.
pub fn rcv_terminate_ack_event<P: ControlProtocol + ?Sized>(p: &mut P) -> Result<()> {
    use PppState::*;
    match p.fsm().state {
        Closed | Stopped => {}
        Closing => {
            change_state(p, Closed);
            p.this_layer_finished()?;
        }
        Stopping => {
            change_state(p, Stopped);
            p.this_layer_finished()?;
        }
        ReqSent | AckRcvd => {
            change_state(p, ReqSent);
        }
        AckSent => {}
        Opened => {
            p.send_configure_req()?;
            change_state(p, ReqSent);
            p.this_layer_down()?;
        }
        Initial | Starting => {}
    }
    Ok(())
}

/// Receive-Unknown-Code event: an un-interpretable packet is answered
/// with a Code-Reject.
pub fn rcv_unknown_code_event<P: ControlProtocol + ?Sized>(
    p: &mut P,
    packet: &Packet<'_>,
) -> Result<()> {
    use PppState::*;
    match p.fsm().state {
        Closed | Stopped | Closing | Stopping | ReqSent | AckRcvd | AckSent | Opened => {
            p.send_code_rej(packet)?;
        }
        Initial | Starting => {}
    }
    Ok(())
}

/// Receive-Code-Reject or Receive-Protocol-Reject event.
///
/// `acceptable` selects RXJ+ (the rejected value is within the scope of
/// normal operation, e.g. a Protocol-Reject of an NCP) or RXJ- (the
/// rejected value is catastrophic, e.g. a Protocol-Reject of LCP, and
/// terminates the connection).
pub fn rcv_code_rej_event<P: ControlProtocol + ?Sized>(
    p: &mut P,
    acceptable: bool,
) -> Result<()> {
    use PppState::*;
    if acceptable {
        match p.fsm().state {
            Closed | Stopped | Closing | Stopping | ReqSent => {}
            AckRcvd => {
                change_state(p, ReqSent);
            }
            AckSent | Opened => {}
            Initial | Starting => {}
        }
    } else {
        match p.fsm().state {
            Closed | Stopped => {
                p.this_layer_finished()?;
            }
            Closing => {
                change_state(p, Closed);
                p.this_layer_finished()?;
            }
            Stopping | ReqSent | AckRcvd | AckSent => {
                change_state(p, Stopped);
                p.this_layer_finished()?;
            }
            Opened => {
                p.init_restart_count(PPP_MAX_TERMINATE);
                p.send_terminate_req()?;
                change_state(p, Stopping);
                p.this_layer_down()?;
            }
            Initial | Starting => {}
        }
    }
    Ok(())
}

/// Receive-Echo-Request event. Only an automaton in the Opened state
/// acknowledges the request with an Echo-Reply.
pub fn rcv_echo_req_event<P: ControlProtocol + ?Sized>(
    p: &mut P,
    request: &Packet<'_>,
) -> Result<()> {
    use PppState::*;
    match p.fsm().state {
        Closed | Stopped | Closing | Stopping | ReqSent | AckRcvd | AckSent => {}
        Opened => {
            p.send_echo_rep(request)?;
        }
        Initial | Starting => {}
    }
    Ok(())
}
