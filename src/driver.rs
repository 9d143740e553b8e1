//! Asynchronous driver for a PPP session.
//!
//! All automaton and phase transitions happen inside one serialized
//! context: the session lives behind an async mutex, a periodic task
//! drives the timers and a queue-draining task feeds inbound frames to
//! the machines. The reception path never touches the session
//! directly; it only pushes raw frames into the queue through the
//! sender returned by [`PppLink::frame_sender`]. Blocking operations
//! are poll loops with a fixed interval, bounded by a caller-supplied
//! timeout (or waiting forever), and force-reset the session when the
//! deadline passes.

use std::sync::Arc;
use std::time::{Duration, Instant};

use tokio::sync::{mpsc, Mutex};
use tokio::task::JoinHandle;

use crate::config::PppConfig;
use crate::error::{PppError, Result};
use crate::session::PppSession;
use crate::transport::LinkTransport;
use crate::types::{NetworkPacket, NetworkProtocol, Phase, SessionInfo};

/// Fixed sleep interval of the blocking-operation poll loops.
pub const PPP_POLLING_INTERVAL: Duration = Duration::from_millis(50);
/// Period of the timer task driving the restart timers.
pub const PPP_TICK_INTERVAL: Duration = Duration::from_millis(100);

/// Handle to a running PPP link.
pub struct PppLink {
    session: Arc<Mutex<PppSession>>,
    frame_tx: mpsc::UnboundedSender<Vec<u8>>,
    packet_rx: Mutex<mpsc::UnboundedReceiver<NetworkPacket>>,
    tick_task: JoinHandle<()>,
    rx_task: JoinHandle<()>,
}

impl PppLink {
    /// Create a link over `transport` and start its driver tasks.
    pub fn new(config: PppConfig, transport: Box<dyn LinkTransport>) -> Self {
        let session = Arc::new(Mutex::new(PppSession::new(config, transport)));
        let (frame_tx, mut frame_rx) = mpsc::unbounded_channel::<Vec<u8>>();
        let (packet_tx, packet_rx) = mpsc::unbounded_channel::<NetworkPacket>();

        let tick_session = Arc::clone(&session);
        let tick_task = tokio::spawn(async move {
            let mut interval = tokio::time::interval(PPP_TICK_INTERVAL);
            loop {
                interval.tick().await;
                let mut s = tick_session.lock().await;
                if let Err(e) = s.tick(Instant::now()) {
                    tracing::warn!("tick error: {}", e);
                }
            }
        });

        let rx_session = Arc::clone(&session);
        let rx_task = tokio::spawn(async move {
            while let Some(frame) = frame_rx.recv().await {
                let mut s = rx_session.lock().await;
                match s.process_frame(Instant::now(), &frame) {
                    Ok(Some(packet)) => {
                        if packet_tx.send(packet).is_err() {
                            break;
                        }
                    }
                    Ok(None) => {}
                    // Dropped packets are part of normal operation.
                    Err(e) => tracing::debug!("frame dropped: {}", e),
                }
            }
        });

        PppLink {
            session,
            frame_tx,
            packet_rx: Mutex::new(packet_rx),
            tick_task,
            rx_task,
        }
    }

    /// Sender the reception path uses to queue de-framed inbound
    /// frames. Safe to call from interrupt-adjacent glue: it only
    /// appends to the queue.
    pub fn frame_sender(&self) -> mpsc::UnboundedSender<Vec<u8>> {
        self.frame_tx.clone()
    }

    /// Set the credentials used during authentication.
    pub async fn set_auth_info(&self, username: &str, password: &str) {
        self.session.lock().await.set_auth_info(username, password);
    }

    /// Establish the link.
    ///
    /// Starts LCP negotiation and waits for a network protocol to come
    /// up, polling with a fixed interval. `timeout` of `None` waits
    /// forever; when a deadline passes the whole session is
    /// force-reset rather than closed gracefully.
    pub async fn connect(&self, timeout: Option<Duration>) -> Result<SessionInfo> {
        self.session.lock().await.start(Instant::now())?;

        let started = Instant::now();
        loop {
            {
                let s = self.session.lock().await;
                if s.is_established() {
                    return Ok(s.session_info());
                }
                if s.phase() == Phase::Dead {
                    return Err(PppError::ConnectionFailed);
                }
            }

            if let Some(limit) = timeout {
                if started.elapsed() >= limit {
                    self.session.lock().await.force_reset();
                    return Err(PppError::Timeout);
                }
            }

            tokio::time::sleep(PPP_POLLING_INTERVAL).await;
        }
    }

    /// Close the link and wait for the Dead phase.
    pub async fn close(&self, timeout: Option<Duration>) -> Result<()> {
        self.session.lock().await.close(Instant::now())?;

        let started = Instant::now();
        loop {
            if self.session.lock().await.phase() == Phase::Dead {
                return Ok(());
            }

            if let Some(limit) = timeout {
                if started.elapsed() >= limit {
                    self.session.lock().await.force_reset();
                    return Err(PppError::Timeout);
                }
            }

            tokio::time::sleep(PPP_POLLING_INTERVAL).await;
        }
    }

    /// Send a network-layer packet over the established link.
    pub async fn send_packet(&self, protocol: NetworkProtocol, payload: &[u8]) -> Result<()> {
        self.session.lock().await.send_packet(protocol, payload)
    }

    /// Receive the next inbound network-layer packet.
    pub async fn recv_packet(&self) -> Option<NetworkPacket> {
        self.packet_rx.lock().await.recv().await
    }

    /// Send an AT command to the modem. Only legal before `connect`.
    pub async fn send_at_command(&self, command: &str) -> Result<()> {
        self.session.lock().await.send_at_command(command)
    }

    /// Wait for an AT command response, polling with a fixed interval.
    pub async fn receive_at_command(&self, timeout: Option<Duration>) -> Result<String> {
        let started = Instant::now();
        loop {
            if let Some(line) = self.session.lock().await.receive_at_command()? {
                return Ok(line);
            }

            if let Some(limit) = timeout {
                if started.elapsed() >= limit {
                    return Err(PppError::Timeout);
                }
            }

            tokio::time::sleep(PPP_POLLING_INTERVAL).await;
        }
    }

    /// Current session phase.
    pub async fn phase(&self) -> Phase {
        self.session.lock().await.phase()
    }

    /// Addressing negotiated for the current session.
    pub async fn session_info(&self) -> SessionInfo {
        self.session.lock().await.session_info()
    }
}

impl Drop for PppLink {
    fn drop(&mut self) {
        self.tick_task.abort();
        self.rx_task.abort();
    }
}
