//! Concurrent full-duplex tunnel relay.
//!
//! The engine runs two tasks for its whole lifetime:
//!
//! - **uplink** reads one block from the TUN interface, fragments it into
//!   data frames, appends an end-of-transmission control frame, and sends
//!   every frame in order to the peer;
//! - **downlink** receives datagrams, learns the peer from the first sender
//!   if none is established, accumulates decoded data frames, and writes the
//!   reassembled block to the TUN interface when the end-of-transmission
//!   marker arrives.
//!
//! The protocol carries no sequence numbers: reassembly trusts that frames
//! of one block arrive in send order with no loss. A real UDP path can
//! reorder or drop datagrams; a reordered or lost fragment corrupts the one
//! block it belongs to.
//!
//! An I/O failure is fatal to the loop it occurs in, and to that loop only;
//! the other loop keeps running until the stop signal fires. A datagram that
//! fails to decode is logged and discarded without ending the downlink.

use std::io;
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::watch;
use tokio::time;
use tracing::{debug, error, info, warn};

use crate::frag::{FragError, Fragmenter};
use crate::proto::{ControlKind, Frame, FrameKind, ProtoError, WireFormat};
use crate::transport::TunnelSocket;
use crate::tun::TunInterface;

/// Receive buffer for one datagram, comfortably above any frame size.
const RECV_BUF_SIZE: usize = 2048;

/// Relay errors fatal to one loop.
#[derive(Debug, thiserror::Error)]
pub enum EngineError {
    #[error("transport failure: {0}")]
    Io(#[from] io::Error),

    #[error(transparent)]
    Proto(#[from] ProtoError),
}

/// Full-duplex relay between a TUN interface and a tunnel socket.
pub struct TunnelEngine<I: TunInterface> {
    iface: Arc<I>,
    socket: Arc<TunnelSocket>,
    format: Arc<dyn WireFormat>,
    fragmenter: Arc<Fragmenter>,
    peer_retry: Duration,
}

impl<I: TunInterface> TunnelEngine<I> {
    /// Build an engine over already-open handles.
    ///
    /// `part_size` bounds fragment payloads; `0` means the format maximum.
    /// `peer_retry` is how long the uplink waits between peer checks while
    /// no peer is established.
    pub fn new(
        iface: I,
        socket: TunnelSocket,
        format: Arc<dyn WireFormat>,
        part_size: usize,
        peer_retry: Duration,
    ) -> Result<Self, FragError> {
        let mut fragmenter = Fragmenter::new(Arc::clone(&format));
        fragmenter.set_part_size(part_size)?;

        Ok(Self {
            iface: Arc::new(iface),
            socket: Arc::new(socket),
            format,
            fragmenter: Arc::new(fragmenter),
            peer_retry,
        })
    }

    /// Run both relay loops until `stop` signals shutdown, then join them.
    pub async fn run(&self, stop: watch::Receiver<bool>) {
        info!(
            iface = self.iface.name(),
            part_size = self.fragmenter.effective_part_size(),
            "tunnel engine starting"
        );

        let uplink = tokio::spawn(uplink_loop(
            Arc::clone(&self.iface),
            Arc::clone(&self.socket),
            Arc::clone(&self.format),
            Arc::clone(&self.fragmenter),
            self.peer_retry,
            stop.clone(),
        ));
        let downlink = tokio::spawn(downlink_loop(
            Arc::clone(&self.iface),
            Arc::clone(&self.socket),
            Arc::clone(&self.format),
            Arc::clone(&self.fragmenter),
            stop,
        ));

        let _ = uplink.await;
        let _ = downlink.await;
        info!("tunnel engine stopped");
    }
}

fn end_of_transmission(format: &dyn WireFormat) -> Result<Frame, ProtoError> {
    let mut frame = format.new_frame(FrameKind::Control);
    frame.set_control(ControlKind::EndOfTransmission)?;
    Ok(frame)
}

async fn uplink_loop<I: TunInterface>(
    iface: Arc<I>,
    socket: Arc<TunnelSocket>,
    format: Arc<dyn WireFormat>,
    fragmenter: Arc<Fragmenter>,
    peer_retry: Duration,
    mut stop: watch::Receiver<bool>,
) {
    let mut buf = vec![0u8; iface.mtu().max(RECV_BUF_SIZE)];

    loop {
        if *stop.borrow() {
            info!("uplink stopping");
            return;
        }

        // Nothing to send to until a peer exists; in server mode the
        // downlink learns it from the first received datagram.
        let Some(peer) = socket.peer() else {
            tokio::select! {
                _ = time::sleep(peer_retry) => {}
                res = stop.changed() => {
                    if res.is_err() {
                        info!("stop channel closed, uplink stopping");
                        return;
                    }
                }
            }
            continue;
        };

        let n = tokio::select! {
            res = iface.recv(&mut buf) => match res {
                Ok(n) => n,
                Err(e) => {
                    error!("uplink failed reading interface: {e}");
                    return;
                }
            },
            res = stop.changed() => {
                if res.is_err() {
                    info!("stop channel closed, uplink stopping");
                    return;
                }
                continue;
            }
        };
        if n == 0 {
            continue;
        }

        if let Err(e) = send_block(&buf[..n], peer, &socket, &*format, &fragmenter).await {
            error!("uplink failed sending frames: {e}");
            return;
        }
    }
}

/// Fragment one block, delimit it with end-of-transmission, and send every
/// frame in generation order.
async fn send_block(
    block: &[u8],
    peer: std::net::SocketAddr,
    socket: &TunnelSocket,
    format: &dyn WireFormat,
    fragmenter: &Fragmenter,
) -> Result<(), EngineError> {
    let mut frames = fragmenter.encapsulate(block);
    frames.push(end_of_transmission(format)?);

    debug!(len = block.len(), frames = frames.len(), "sending block");
    for frame in &frames {
        socket.send_to(&format.encode(frame), peer).await?;
    }
    Ok(())
}

async fn downlink_loop<I: TunInterface>(
    iface: Arc<I>,
    socket: Arc<TunnelSocket>,
    format: Arc<dyn WireFormat>,
    fragmenter: Arc<Fragmenter>,
    mut stop: watch::Receiver<bool>,
) {
    let mut buf = vec![0u8; RECV_BUF_SIZE];
    // Data frames accumulated since the last end-of-transmission. Unbounded:
    // the protocol has no admission control.
    let mut reassembly: Vec<Frame> = Vec::new();

    loop {
        if *stop.borrow() {
            info!("downlink stopping");
            return;
        }

        let (n, from) = tokio::select! {
            res = socket.recv_from(&mut buf) => match res {
                Ok(v) => v,
                Err(e) => {
                    error!("downlink failed receiving datagram: {e}");
                    return;
                }
            },
            res = stop.changed() => {
                if res.is_err() {
                    info!("stop channel closed, downlink stopping");
                    return;
                }
                continue;
            }
        };

        match socket.peer() {
            None => {
                if socket.learn_peer(from) {
                    info!(peer = %from, "learned tunnel peer");
                }
            }
            Some(peer) if peer != from => {
                debug!(%from, "dropping datagram from unknown sender");
                continue;
            }
            Some(_) => {}
        }

        let frame = match format.decode(&buf[..n]) {
            Ok(frame) => frame,
            Err(e) => {
                warn!(len = n, %from, "discarding bad datagram: {e}");
                continue;
            }
        };

        match frame.kind() {
            FrameKind::Data => reassembly.push(frame),
            FrameKind::Control => {
                if frame.control() != ControlKind::EndOfTransmission {
                    debug!(control = %frame.control(), "ignoring control frame");
                    continue;
                }

                let block = fragmenter.decapsulate(&reassembly);
                reassembly.clear();
                if block.is_empty() {
                    continue;
                }

                debug!(len = block.len(), "writing reassembled block");
                if let Err(e) = iface.send(&block).await {
                    error!("downlink failed writing interface: {e}");
                    return;
                }
            }
        }
    }
}
