#![warn(missing_docs)]
//! Server side of one accepted connection.
//!
//! A session reads command lines until the peer hangs up, answers the
//! commands that expect a reply, and applies the fire-and-forget ones
//! silently. A malformed line closes the session; everything after it on
//! that connection would be unframed.
//!
//! Lookups and stores that belong to another member are relayed: the raw
//! line is forwarded verbatim to the next hop and that hop's reply is
//! passed back verbatim, so the eventual owner's reply reaches the
//! original asker unchanged. A relay that cannot reach its next hop
//! answers with the `Not found.` sentinel instead of tearing the session
//! down.

use std::net::SocketAddr;

use tokio::io::AsyncBufReadExt;
use tokio::io::AsyncWriteExt;
use tokio::io::BufReader;
use tokio::net::TcpStream;

use crate::dht::chord::NodeRing;
use crate::dht::chord::RouteDecision;
use crate::dht::election;
use crate::dht::finger::Finger;
use crate::dht::id::RingId;
use crate::error::Result;
use crate::message;
use crate::message::Request;
use crate::net::client;

/// Serve one accepted connection until EOF or a protocol violation.
pub async fn serve(ring: NodeRing, stream: TcpStream, peer: SocketAddr) {
    let (read_half, mut writer) = stream.into_split();
    let mut lines = BufReader::new(read_half).lines();
    loop {
        let line = match lines.next_line().await {
            Ok(Some(line)) => line,
            Ok(None) => break,
            Err(e) => {
                tracing::debug!("session with {} ended: {}", peer, e);
                break;
            }
        };
        let request = match Request::parse(&line) {
            Ok(request) => request,
            Err(e) => {
                tracing::warn!("closing session with {}: {}", peer, e);
                break;
            }
        };
        let reply = match handle(&ring, request, &line).await {
            Ok(reply) => reply,
            Err(e) => {
                tracing::warn!("closing session with {}: {}", peer, e);
                break;
            }
        };
        if let Some(reply) = reply {
            let io = async {
                writer.write_all(reply.as_bytes()).await?;
                writer.write_all(b"\n").await?;
                writer.flush().await
            };
            if let Err(e) = io.await {
                tracing::debug!("reply to {} failed: {}", peer, e);
                break;
            }
        }
    }
}

/// Apply one request. `Some` replies go back on the wire, `None` marks the
/// fire-and-forget commands. Errors here are state-lock failures, not
/// remote ones; remote trouble turns into sentinel replies instead.
async fn handle(ring: &NodeRing, request: Request, raw: &str) -> Result<Option<String>> {
    match request {
        Request::FindNode { target } => Ok(Some(find_node(ring, target, raw).await?)),
        Request::FindValue { key } => Ok(Some(find_value(ring, &key, raw).await?)),
        Request::PutValue { key, value } => Ok(Some(put_value(ring, key, value, raw).await?)),
        Request::NewPredecessor { address, port } => {
            let announced = Finger::new(address, port);
            tracing::debug!("recording new predecessor {}", announced);
            ring.set_predecessor(announced)?;
            Ok(None)
        }
        Request::RequestPredecessor => {
            let predecessor = ring.predecessor1()?;
            Ok(Some(message::endpoint_reply(&predecessor)))
        }
        Request::PingQuery => Ok(Some(message::PING_RESPONSE.to_string())),
        Request::RequestKeyValues { joining } => {
            let ceded = ring.cede_entries(joining)?;
            if !ceded.is_empty() {
                tracing::info!("ceding {} entries to {}", ceded.len(), joining);
            }
            Ok(Some(message::encode_batch(&ceded)))
        }
        Request::PutReplica { key, value } => {
            ring.put(key, value)?;
            Ok(None)
        }
        Request::GetSuccessors => {
            let (first, second) = ring.successors()?;
            Ok(Some(message::successors_reply(first.id, second.id)))
        }
        Request::FindLeader => {
            let leader = ring.leader()?;
            Ok(Some(message::leader_reply(&leader)))
        }
        Request::ElectLeader { candidate } => {
            election::handle_elect_leader(ring, candidate).await?;
            Ok(None)
        }
        Request::LeaderElected { leader } => {
            election::handle_leader_elected(ring, leader).await?;
            Ok(None)
        }
    }
}

async fn find_node(ring: &NodeRing, target: RingId, raw: &str) -> Result<String> {
    match ring.route(target, true)? {
        RouteDecision::Local => Ok(message::node_found(ring.own())),
        RouteDecision::Successor(successor) => Ok(message::node_found(&successor)),
        RouteDecision::Forward(next) => Ok(relay(&next, raw).await),
    }
}

async fn find_value(ring: &NodeRing, key: &str, raw: &str) -> Result<String> {
    match ring.route(RingId::of(key), false)? {
        RouteDecision::Local => match ring.get(key)? {
            Some(value) => Ok(message::value_found(ring.id(), ring.own().port, &value)),
            None => Ok(message::KEY_NOT_FOUND.to_string()),
        },
        RouteDecision::Successor(next) | RouteDecision::Forward(next) => {
            Ok(relay(&next, raw).await)
        }
    }
}

async fn put_value(ring: &NodeRing, key: String, value: String, raw: &str) -> Result<String> {
    let hashed = RingId::of(&key);
    match ring.route(hashed, false)? {
        RouteDecision::Local => {
            ring.put(key, value)?;
            Ok(message::value_stored(hashed, ring.id(), ring.own().port))
        }
        RouteDecision::Successor(next) | RouteDecision::Forward(next) => {
            Ok(relay(&next, raw).await)
        }
    }
}

/// Forward the raw line one hop and hand back whatever comes back. The
/// sentinel goes out when the hop is unreachable, so the asker learns the
/// lookup died without the session dying with it.
async fn relay(next: &Finger, raw: &str) -> String {
    match client::call_once(next, raw).await {
        Ok(reply) => reply,
        Err(e) => {
            tracing::warn!("relay to {} failed: {}", next, e);
            message::NOT_FOUND.to_string()
        }
    }
}
