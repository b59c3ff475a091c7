//! Upstream relay for queries the table cannot answer.
//!
//! Each relay owns one ephemeral UDP socket: bind, send the original query
//! bytes verbatim, wait for a single reply, pipe it back through the
//! listening socket, done. A socket error turns into a SERVER_FAILURE
//! response to the requester. Without a configured timeout a silent
//! upstream leaves the relay task pending forever.

use std::io;
use std::net::SocketAddr;
use std::rc::Rc;
use std::sync::Arc;
use std::time::Duration;

use tokio::net::UdpSocket;
use tracing::{debug, warn};

use crate::dns::{Header, Question, Response};
use crate::server::MAX_PACKET_SIZE;
use crate::stats::Stats;

/// Relay one query upstream and send the reply, or a synthesized failure,
/// back to `client` via the shared listening socket.
pub async fn relay(
    server: Arc<UdpSocket>,
    upstream: SocketAddr,
    query: Vec<u8>,
    client: SocketAddr,
    header: Header,
    question: Question,
    recv_timeout: Option<Duration>,
    stats: Rc<Stats>,
) {
    match relay_once(&server, upstream, &query, client, recv_timeout).await {
        Ok(len) => {
            stats.record_forwarded();
            debug!(id = header.id, name = %question.name, len, "relayed upstream reply");
        }
        Err(e) => {
            stats.record_failed();
            warn!(id = header.id, name = %question.name, error = %e, "upstream relay failed");

            let failure = Response::server_failure(&header, question).to_bytes();
            if let Err(e) = server.send_to(&failure, client).await {
                warn!(error = %e, client = %client, "failed to send SERVER_FAILURE");
            }
        }
    }
}

/// The relay itself: one send, at most one receive, byte-for-byte in both
/// directions. The ephemeral socket is connected to the upstream, so ICMP
/// errors surface as recv errors and stray datagrams are filtered out.
async fn relay_once(
    server: &UdpSocket,
    upstream: SocketAddr,
    query: &[u8],
    client: SocketAddr,
    recv_timeout: Option<Duration>,
) -> io::Result<usize> {
    let socket = UdpSocket::bind("0.0.0.0:0").await?;
    socket.connect(upstream).await?;
    socket.send(query).await?;

    let mut buf = [0u8; MAX_PACKET_SIZE];
    let len = match recv_timeout {
        Some(limit) => tokio::time::timeout(limit, socket.recv(&mut buf))
            .await
            .map_err(|_| io::Error::new(io::ErrorKind::TimedOut, "upstream did not answer"))??,
        None => socket.recv(&mut buf).await?,
    };

    server.send_to(&buf[..len], client).await?;
    Ok(len)
}
