#![warn(missing_docs)]
//! Outbound connections to other ring members.
//!
//! Every exchange is one command line out and, unless the command is
//! fire-and-forget, one reply line back. A [`Conn`] can be held open and
//! reused for a run of requests against the same peer; the one-shot
//! helpers open, exchange, and drop. Connects and replies are bounded by
//! [`CONNECT_TIMEOUT`] and [`REPLY_TIMEOUT`] so a silent peer costs a
//! deadline, never a hang.

use tokio::io::AsyncBufReadExt;
use tokio::io::AsyncWriteExt;
use tokio::io::BufReader;
use tokio::net::tcp::OwnedReadHalf;
use tokio::net::tcp::OwnedWriteHalf;
use tokio::net::TcpStream;
use tokio::time::timeout;

use crate::consts::CONNECT_TIMEOUT;
use crate::consts::M;
use crate::consts::REPLY_TIMEOUT;
use crate::dht::chord::NodeRing;
use crate::dht::finger::Finger;
use crate::dht::id::RingId;
use crate::error::Error;
use crate::error::Result;
use crate::message;

/// A line-oriented connection to one peer.
pub struct Conn {
    peer: String,
    reader: BufReader<OwnedReadHalf>,
    writer: OwnedWriteHalf,
}

impl Conn {
    /// Connect to `address:port` within the connect deadline.
    pub async fn open(address: &str, port: u16) -> Result<Self> {
        let peer = format!("{address}:{port}");
        let stream = timeout(CONNECT_TIMEOUT, TcpStream::connect((address, port)))
            .await
            .map_err(|_| Error::ConnectTimeout(peer.clone()))?
            .map_err(|source| Error::PeerUnreachable {
                peer: peer.clone(),
                source,
            })?;
        let (reader, writer) = stream.into_split();
        Ok(Self {
            peer,
            reader: BufReader::new(reader),
            writer,
        })
    }

    /// Connect to the endpoint a finger points at.
    pub async fn open_to(finger: &Finger) -> Result<Self> {
        Self::open(&finger.address, finger.port).await
    }

    /// Send one line, without waiting for anything back.
    pub async fn send(&mut self, line: &str) -> Result<()> {
        let io = async {
            self.writer.write_all(line.as_bytes()).await?;
            self.writer.write_all(b"\n").await?;
            self.writer.flush().await
        };
        io.await.map_err(|source| Error::PeerUnreachable {
            peer: self.peer.clone(),
            source,
        })
    }

    /// Send one line and wait for the single reply line.
    pub async fn call(&mut self, line: &str) -> Result<String> {
        self.send(line).await?;
        self.recv().await
    }

    /// Resolve the owner of `target` through this peer.
    pub async fn find_node(&mut self, target: RingId) -> Result<Finger> {
        let reply = self.call(&message::find_node(target)).await?;
        message::parse_node_found(&reply)
    }

    async fn recv(&mut self) -> Result<String> {
        let mut line = String::new();
        let read = timeout(REPLY_TIMEOUT, self.reader.read_line(&mut line))
            .await
            .map_err(|_| Error::ReplyTimeout(self.peer.clone()))?
            .map_err(|source| Error::PeerUnreachable {
                peer: self.peer.clone(),
                source,
            })?;
        if read == 0 {
            return Err(Error::ConnectionClosed(self.peer.clone()));
        }
        Ok(line.trim_end_matches(['\r', '\n']).to_string())
    }
}

/// One-shot request: connect, send, read the reply, drop the connection.
pub async fn call_once(to: &Finger, line: &str) -> Result<String> {
    let mut conn = Conn::open_to(to).await?;
    conn.call(line).await
}

/// One-shot fire-and-forget: connect, send, drop the connection.
pub async fn send_once(to: &Finger, line: &str) -> Result<()> {
    let mut conn = Conn::open_to(to).await?;
    conn.send(line).await
}

/// Resolve the owner of `target` through `via`.
pub async fn find_node(via: &Finger, target: RingId) -> Result<Finger> {
    let mut conn = Conn::open_to(via).await?;
    conn.find_node(target).await
}

/// Probe a peer. `Ok(true)` only for a well-formed pong.
pub async fn ping(to: &Finger, from: RingId) -> Result<bool> {
    let reply = call_once(to, &message::ping_query(from)).await?;
    Ok(reply == message::PING_RESPONSE)
}

/// Ask `via` for its current predecessor.
pub async fn request_predecessor(via: &Finger, from: RingId) -> Result<Finger> {
    let reply = call_once(via, &message::request_predecessor(from)).await?;
    message::parse_endpoint(&reply)
}

/// Ask `via` for its two successor ids.
pub async fn get_successors(via: &Finger, from: RingId) -> Result<(RingId, RingId)> {
    let reply = call_once(via, &message::get_successors(from)).await?;
    message::parse_successors(&reply)
}

/// Ask `via` who leads the ring.
pub async fn find_leader(via: &Finger, from: RingId) -> Result<Finger> {
    let reply = call_once(via, &message::find_leader(from)).await?;
    message::parse_leader(&reply)
}

/// Re-resolve every finger slot through `via`, all over one connection.
///
/// Slot `i` is pointed at the owner of `own + 2^i`. A slot whose lookup
/// could not be relayed is left as it was; a connection-level failure
/// aborts the sweep and surfaces to the caller.
pub async fn refresh_fingers(ring: &NodeRing, via: &Finger) -> Result<()> {
    let mut conn = Conn::open_to(via).await?;
    let own = ring.id();
    for slot in 0..M {
        let target = own + (1u64 << slot);
        match conn.find_node(target).await {
            Ok(finger) => ring.set_finger(slot, finger)?,
            Err(Error::LookupFailed) => {
                tracing::debug!("finger {} unresolved via {}", slot, via);
            }
            Err(e) => return Err(e),
        }
    }
    Ok(())
}
