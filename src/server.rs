//! UDP listener: receives datagrams in arrival order, dispatches each one,
//! sends direct replies, and spawns one relay task per forwarded query.

use std::io;
use std::net::SocketAddr;
use std::rc::Rc;
use std::sync::Arc;
use std::time::Duration;

use tokio::net::UdpSocket;
use tracing::{debug, info, warn};

use crate::forward;
use crate::resolver::{QueryAction, Resolver};
use crate::stats::Stats;

/// Maximum size of a DNS packet (with some headroom).
pub const MAX_PACKET_SIZE: usize = 4096;

/// How often the activity snapshot is logged.
const STATS_INTERVAL: Duration = Duration::from_secs(60);

/// The UDP server.
///
/// One listening socket serves all inbound queries and all outbound direct
/// responses; forwarded queries each get their own ephemeral socket inside
/// their relay task.
pub struct Server {
    socket: Arc<UdpSocket>,
}

impl Server {
    /// Bind the listening socket.
    pub async fn bind(addr: SocketAddr) -> io::Result<Self> {
        let socket = Arc::new(UdpSocket::bind(addr).await?);

        Ok(Self { socket })
    }

    /// The bound address, useful when listening on an ephemeral port.
    pub fn local_addr(&self) -> io::Result<SocketAddr> {
        self.socket.local_addr()
    }

    /// Start the receive loop and the stats snapshot task.
    ///
    /// Tasks go on the current thread's LocalSet; forwarded queries each
    /// get an independent task so a slow upstream never blocks the
    /// listener.
    pub fn start(
        self,
        upstream: SocketAddr,
        resolver: Rc<Resolver>,
        recv_timeout: Option<Duration>,
    ) {
        let stats = Rc::new(Stats::new());

        let snapshot_stats = stats.clone();
        tokio::task::spawn_local(async move {
            let mut interval = tokio::time::interval(STATS_INTERVAL);
            interval.tick().await; // skip the immediate first tick
            loop {
                interval.tick().await;
                let s = snapshot_stats.snapshot_and_reset();
                info!(
                    received = s.received,
                    resolved = s.resolved,
                    not_implemented = s.not_implemented,
                    forwarded = s.forwarded,
                    dropped = s.dropped,
                    failed = s.failed,
                    "activity"
                );
            }
        });

        tokio::task::spawn_local(run(self.socket, upstream, resolver, recv_timeout, stats));
    }
}

/// Main receive loop.
///
/// A failure while handling one datagram never takes the loop down: send
/// errors are logged and the next datagram is processed.
async fn run(
    socket: Arc<UdpSocket>,
    upstream: SocketAddr,
    resolver: Rc<Resolver>,
    recv_timeout: Option<Duration>,
    stats: Rc<Stats>,
) {
    let mut buf = [0u8; MAX_PACKET_SIZE];

    loop {
        let (len, src) = match socket.recv_from(&mut buf).await {
            Ok(r) => r,
            Err(e) => {
                warn!(error = %e, "listener recv error");
                continue;
            }
        };

        stats.record_received();
        debug!(client = %src, len, "datagram received");
        let datagram = &buf[..len];

        match resolver.process_query(datagram) {
            QueryAction::Respond { response, outcome } => {
                stats.record_outcome(outcome);
                if let Err(e) = socket.send_to(&response, src).await {
                    warn!(error = %e, client = %src, "failed to send response");
                }
            }
            QueryAction::Forward { header, question } => {
                tokio::task::spawn_local(forward::relay(
                    socket.clone(),
                    upstream,
                    datagram.to_vec(),
                    src,
                    header,
                    question,
                    recv_timeout,
                    stats.clone(),
                ));
            }
            QueryAction::Drop => {
                stats.record_dropped();
            }
        }
    }
}
