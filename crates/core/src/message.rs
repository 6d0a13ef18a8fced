#![warn(missing_docs)]
//! Wire vocabulary of the ring protocol.
//!
//! Members exchange one newline-terminated line per request, shaped
//! `COMMAND:CONTENT` and split at the first colon, so values are free to
//! contain colons of their own. Some commands answer with a single reply
//! line, the rest are fire-and-forget. This module owns both directions:
//! parsing incoming command lines into [`Request`] and building the lines
//! and replies a member sends.

use crate::dht::finger::Finger;
use crate::dht::id::RingId;
use crate::error::Error;
use crate::error::Result;

/// Resolve the member responsible for an id.
pub const FIND_NODE: &str = "FIND_NODE";
/// Look a key up, routed to its owner.
pub const FIND_VALUE: &str = "FIND_VALUE";
/// Store a key, routed to its owner.
pub const PUT_VALUE: &str = "PUT_VALUE";
/// Announce the sender as the receiver's new predecessor.
pub const NEW_PREDECESSOR: &str = "NEW_PREDECESSOR";
/// Ask for the receiver's current predecessor endpoint.
pub const REQUEST_PREDECESSOR: &str = "REQUEST_PREDECESSOR";
/// Liveness probe.
pub const PING_QUERY: &str = "PING_QUERY";
/// Ask the receiver to hand over the entries a joining member now owns.
pub const REQUEST_KEY_VALUES: &str = "REQUEST_KEY_VALUES";
/// Store a replica without any routing.
pub const PUT_REPLICA: &str = "PUT_REPLICA";
/// Ask for the receiver's two successor ids.
pub const GET_SUCCESSORS: &str = "GET_SUCCESSORS";
/// Ask who leads the ring.
pub const FIND_LEADER: &str = "FIND_LEADER";
/// Carry a leader candidacy one hop clockwise.
pub const ELECT_LEADER: &str = "ELECT_LEADER";
/// Carry a leader announcement one hop clockwise.
pub const LEADER_ELECTED: &str = "LEADER_ELECTED";

/// Reply prefix naming the member responsible for an id.
pub const NODE_FOUND: &str = "NODE_FOUND";
/// Reply to a liveness probe.
pub const PING_RESPONSE: &str = "PING_RESPONSE";
/// Reply when a routed lookup reached the owner but the key is absent.
pub const KEY_NOT_FOUND: &str = "Key NOT FOUND.";
/// Reply when a request could not be relayed any further.
pub const NOT_FOUND: &str = "Not found.";

/// Separator between entries of a key-value batch.
const PAIR_SEPARATOR: &str = "::";

/// A parsed command line, as seen by the receiving member.
///
/// Commands whose content only identifies the sender are parsed to unit
/// variants; the receiver never acts on who asked.
#[derive(Clone, Debug, PartialEq)]
pub enum Request {
    /// `FIND_NODE:<id>`
    FindNode {
        /// Id whose owner is wanted.
        target: RingId,
    },
    /// `FIND_VALUE:<key>`
    FindValue {
        /// Plain-text key to look up.
        key: String,
    },
    /// `PUT_VALUE:<key>:<value>`
    PutValue {
        /// Plain-text key to store under.
        key: String,
        /// Value, colons and all.
        value: String,
    },
    /// `NEW_PREDECESSOR:<address>:<port>`
    NewPredecessor {
        /// Announced predecessor address.
        address: String,
        /// Announced predecessor port.
        port: u16,
    },
    /// `REQUEST_PREDECESSOR:<sender>`
    RequestPredecessor,
    /// `PING_QUERY:<sender>`
    PingQuery,
    /// `REQUEST_KEY_VALUES:<joining-id>`
    RequestKeyValues {
        /// Id of the member asking for its share of the keys.
        joining: RingId,
    },
    /// `PUT_REPLICA:<address>:<port>:<key>:<value>`
    ///
    /// The leading endpoint names the intended holder; the receiver
    /// stores unconditionally and does not check it.
    PutReplica {
        /// Plain-text key to store under.
        key: String,
        /// Value, colons and all.
        value: String,
    },
    /// `GET_SUCCESSORS:<sender>`
    GetSuccessors,
    /// `FIND_LEADER:<sender>`
    FindLeader,
    /// `ELECT_LEADER:<candidate-id>`
    ElectLeader {
        /// Highest candidacy seen so far on this path.
        candidate: RingId,
    },
    /// `LEADER_ELECTED:<id>:<address>:<port>`
    LeaderElected {
        /// The announced winner.
        leader: Finger,
    },
}

impl Request {
    /// Parse one command line. The line is split at its first colon; a
    /// line without one is a bare command with empty content.
    pub fn parse(line: &str) -> Result<Self> {
        let (command, content) = match line.split_once(':') {
            Some((command, content)) => (command, content),
            None => (line, ""),
        };
        let malformed = || Error::MalformedCommand(line.to_string());
        match command {
            FIND_NODE => Ok(Self::FindNode {
                target: content.parse()?,
            }),
            FIND_VALUE => Ok(Self::FindValue {
                key: content.to_string(),
            }),
            PUT_VALUE => {
                let (key, value) = content.split_once(':').ok_or_else(malformed)?;
                Ok(Self::PutValue {
                    key: key.to_string(),
                    value: value.to_string(),
                })
            }
            NEW_PREDECESSOR => {
                let (address, port) = content.split_once(':').ok_or_else(malformed)?;
                Ok(Self::NewPredecessor {
                    address: address.to_string(),
                    port: port.parse().map_err(|_| malformed())?,
                })
            }
            REQUEST_PREDECESSOR => Ok(Self::RequestPredecessor),
            PING_QUERY => Ok(Self::PingQuery),
            REQUEST_KEY_VALUES => Ok(Self::RequestKeyValues {
                joining: content.parse()?,
            }),
            PUT_REPLICA => {
                let mut parts = content.splitn(4, ':');
                let _address = parts.next().ok_or_else(malformed)?;
                let port = parts.next().ok_or_else(malformed)?;
                let key = parts.next().ok_or_else(malformed)?;
                let value = parts.next().ok_or_else(malformed)?;
                port.parse::<u16>().map_err(|_| malformed())?;
                Ok(Self::PutReplica {
                    key: key.to_string(),
                    value: value.to_string(),
                })
            }
            GET_SUCCESSORS => Ok(Self::GetSuccessors),
            FIND_LEADER => Ok(Self::FindLeader),
            ELECT_LEADER => Ok(Self::ElectLeader {
                candidate: content.parse()?,
            }),
            LEADER_ELECTED => {
                let leader = parse_leader(content)?;
                Ok(Self::LeaderElected { leader })
            }
            _ => Err(malformed()),
        }
    }
}

/// `FIND_NODE` line for `target`.
pub fn find_node(target: RingId) -> String {
    format!("{FIND_NODE}:{target}")
}

/// `FIND_VALUE` line for `key`.
pub fn find_value(key: &str) -> String {
    format!("{FIND_VALUE}:{key}")
}

/// `PUT_VALUE` line for `key` and `value`.
pub fn put_value(key: &str, value: &str) -> String {
    format!("{PUT_VALUE}:{key}:{value}")
}

/// `NEW_PREDECESSOR` line announcing `own`.
pub fn new_predecessor(own: &Finger) -> String {
    format!("{NEW_PREDECESSOR}:{}:{}", own.address, own.port)
}

/// `REQUEST_PREDECESSOR` line naming the asking member.
pub fn request_predecessor(from: RingId) -> String {
    format!("{REQUEST_PREDECESSOR}:{from}")
}

/// `PING_QUERY` line naming the probing member.
pub fn ping_query(from: RingId) -> String {
    format!("{PING_QUERY}:{from}")
}

/// `REQUEST_KEY_VALUES` line for a member that now owns part of the
/// receiver's arc.
pub fn request_key_values(joining: RingId) -> String {
    format!("{REQUEST_KEY_VALUES}:{joining}")
}

/// `PUT_REPLICA` line pushing `key`/`value` at the holder `to`.
pub fn put_replica(to: &Finger, key: &str, value: &str) -> String {
    format!("{PUT_REPLICA}:{}:{}:{key}:{value}", to.address, to.port)
}

/// `GET_SUCCESSORS` line naming the asking member.
pub fn get_successors(from: RingId) -> String {
    format!("{GET_SUCCESSORS}:{from}")
}

/// `FIND_LEADER` line naming the asking member.
pub fn find_leader(from: RingId) -> String {
    format!("{FIND_LEADER}:{from}")
}

/// `ELECT_LEADER` line carrying `candidate`.
pub fn elect_leader(candidate: RingId) -> String {
    format!("{ELECT_LEADER}:{candidate}")
}

/// `LEADER_ELECTED` line announcing `leader`.
pub fn leader_elected(leader: &Finger) -> String {
    format!(
        "{LEADER_ELECTED}:{}:{}:{}",
        leader.id, leader.address, leader.port
    )
}

/// `NODE_FOUND` reply naming `finger`.
pub fn node_found(finger: &Finger) -> String {
    format!("{NODE_FOUND}:{}:{}", finger.address, finger.port)
}

/// Reply of an owner that found `value` for a looked-up key.
pub fn value_found(own: RingId, port: u16, value: &str) -> String {
    format!("VALUE_FOUND:Request acknowledged on node {own}:{port}:{value}")
}

/// Reply of an owner that stored a key hashing to `hashed`.
pub fn value_stored(hashed: RingId, own: RingId, port: u16) -> String {
    format!("VALUE_STORED for {hashed} on node {own}:{port}")
}

/// Bare `address:port` reply, as `REQUEST_PREDECESSOR` answers with.
pub fn endpoint_reply(finger: &Finger) -> String {
    finger.endpoint()
}

/// `GET_SUCCESSORS` reply carrying both successor ids.
pub fn successors_reply(first: RingId, second: RingId) -> String {
    format!("{first}:{second}")
}

/// `FIND_LEADER` reply carrying the leader's id and endpoint.
pub fn leader_reply(leader: &Finger) -> String {
    format!("{}:{}:{}", leader.id, leader.address, leader.port)
}

/// Parse a `NODE_FOUND` reply. The relay-failure sentinel maps to
/// [`Error::LookupFailed`] so callers can skip the slot and move on.
pub fn parse_node_found(line: &str) -> Result<Finger> {
    if line == NOT_FOUND {
        return Err(Error::LookupFailed);
    }
    let endpoint = line
        .strip_prefix(NODE_FOUND)
        .and_then(|rest| rest.strip_prefix(':'))
        .ok_or_else(|| Error::MalformedReply(line.to_string()))?;
    parse_endpoint(endpoint)
}

/// Parse a bare `address:port` into a pointer, rehashing the id.
pub fn parse_endpoint(line: &str) -> Result<Finger> {
    let (address, port) = line
        .split_once(':')
        .ok_or_else(|| Error::MalformedReply(line.to_string()))?;
    let port = port
        .parse()
        .map_err(|_| Error::MalformedReply(line.to_string()))?;
    Ok(Finger::new(address, port))
}

/// Parse a `GET_SUCCESSORS` reply into the two ids.
pub fn parse_successors(line: &str) -> Result<(RingId, RingId)> {
    let (first, second) = line
        .split_once(':')
        .ok_or_else(|| Error::MalformedReply(line.to_string()))?;
    Ok((first.parse()?, second.parse()?))
}

/// Parse an `<id>:<address>:<port>` leader triple. The id on the wire is
/// validated but the pointer is rebuilt from the endpoint, which is the
/// authoritative source of a member's id.
pub fn parse_leader(line: &str) -> Result<Finger> {
    let mut parts = line.splitn(3, ':');
    let id = parts
        .next()
        .ok_or_else(|| Error::MalformedReply(line.to_string()))?;
    id.parse::<RingId>()?;
    let endpoint = parts
        .next()
        .zip(parts.next())
        .map(|(address, port)| format!("{address}:{port}"))
        .ok_or_else(|| Error::MalformedReply(line.to_string()))?;
    parse_endpoint(&endpoint)
}

/// Encode a key-value batch: entries joined with `::`, each entry
/// `key:value`. No entries encode to an empty line.
pub fn encode_batch(pairs: &[(String, String)]) -> String {
    pairs
        .iter()
        .map(|(key, value)| format!("{key}:{value}"))
        .collect::<Vec<_>>()
        .join(PAIR_SEPARATOR)
}

/// Decode a key-value batch. Entries without a colon are dropped with a
/// warning rather than failing the whole handover.
pub fn parse_batch(line: &str) -> Vec<(String, String)> {
    if line.trim().is_empty() {
        return Vec::new();
    }
    let mut pairs = Vec::new();
    for entry in line.split(PAIR_SEPARATOR) {
        match entry.split_once(':') {
            Some((key, value)) => pairs.push((key.to_string(), value.to_string())),
            None => tracing::warn!("dropping malformed batch entry {:?}", entry),
        }
    }
    pairs
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dht::tests::peer;

    #[test]
    fn test_parse_find_node() {
        assert_eq!(
            Request::parse("FIND_NODE:12345").unwrap(),
            Request::FindNode {
                target: RingId::from(12345u64)
            }
        );
        assert!(Request::parse("FIND_NODE:twelve").is_err());
        assert!(Request::parse("FIND_NODE").is_err());
    }

    #[test]
    fn test_parse_find_value_keeps_key_verbatim() {
        assert_eq!(
            Request::parse("FIND_VALUE:some key").unwrap(),
            Request::FindValue {
                key: "some key".to_string()
            }
        );
    }

    #[test]
    fn test_parse_put_value_splits_once() {
        assert_eq!(
            Request::parse("PUT_VALUE:k:v:with:colons").unwrap(),
            Request::PutValue {
                key: "k".to_string(),
                value: "v:with:colons".to_string()
            }
        );
        assert!(Request::parse("PUT_VALUE:only-a-key").is_err());
    }

    #[test]
    fn test_parse_new_predecessor() {
        assert_eq!(
            Request::parse("NEW_PREDECESSOR:127.0.0.1:9000").unwrap(),
            Request::NewPredecessor {
                address: "127.0.0.1".to_string(),
                port: 9000
            }
        );
        assert!(Request::parse("NEW_PREDECESSOR:127.0.0.1:no-port").is_err());
    }

    #[test]
    fn test_parse_sender_only_commands_ignore_content() {
        assert_eq!(
            Request::parse("REQUEST_PREDECESSOR:42").unwrap(),
            Request::RequestPredecessor
        );
        assert_eq!(Request::parse("PING_QUERY:42").unwrap(), Request::PingQuery);
        assert_eq!(Request::parse("PING_QUERY").unwrap(), Request::PingQuery);
        assert_eq!(
            Request::parse("GET_SUCCESSORS:42").unwrap(),
            Request::GetSuccessors
        );
        assert_eq!(Request::parse("FIND_LEADER:42").unwrap(), Request::FindLeader);
    }

    #[test]
    fn test_parse_put_replica() {
        assert_eq!(
            Request::parse("PUT_REPLICA:127.0.0.1:9002:k:v:with:colons").unwrap(),
            Request::PutReplica {
                key: "k".to_string(),
                value: "v:with:colons".to_string()
            }
        );
        assert!(Request::parse("PUT_REPLICA:127.0.0.1:9002:key-only").is_err());
        assert!(Request::parse("PUT_REPLICA:127.0.0.1:bad-port:k:v").is_err());
    }

    #[test]
    fn test_parse_election_commands() {
        assert_eq!(
            Request::parse("ELECT_LEADER:7").unwrap(),
            Request::ElectLeader {
                candidate: RingId::from(7u64)
            }
        );
        let parsed = Request::parse("LEADER_ELECTED:405900688:127.0.0.1:9000").unwrap();
        assert_eq!(
            parsed,
            Request::LeaderElected {
                leader: Finger::new("127.0.0.1", 9000)
            }
        );
        assert!(Request::parse("LEADER_ELECTED:garbage:127.0.0.1:9000").is_err());
    }

    #[test]
    fn test_parse_rejects_unknown_commands() {
        assert!(Request::parse("SHUTDOWN:now").is_err());
        assert!(Request::parse("").is_err());
    }

    #[test]
    fn test_command_encoders_pin_the_wire_format() {
        let to = peer(20);
        assert_eq!(find_node(RingId::from(5u64)), "FIND_NODE:5");
        assert_eq!(put_value("k", "v"), "PUT_VALUE:k:v");
        assert_eq!(new_predecessor(&to), "NEW_PREDECESSOR:10.0.0.1:9000");
        assert_eq!(put_replica(&to, "k", "v"), "PUT_REPLICA:10.0.0.1:9000:k:v");
        assert_eq!(elect_leader(RingId::from(9u64)), "ELECT_LEADER:9");
        assert_eq!(leader_elected(&to), "LEADER_ELECTED:20:10.0.0.1:9000");
    }

    #[test]
    fn test_reply_builders_pin_the_wire_format() {
        assert_eq!(node_found(&peer(20)), "NODE_FOUND:10.0.0.1:9000");
        assert_eq!(
            value_found(RingId::from(3u64), 9000, "v"),
            "VALUE_FOUND:Request acknowledged on node 3:9000:v"
        );
        assert_eq!(
            value_stored(RingId::from(7u64), RingId::from(3u64), 9000),
            "VALUE_STORED for 7 on node 3:9000"
        );
        assert_eq!(
            successors_reply(RingId::from(1u64), RingId::from(2u64)),
            "1:2"
        );
        assert_eq!(leader_reply(&peer(20)), "20:10.0.0.1:9000");
    }

    #[test]
    fn test_parse_node_found() {
        let finger = parse_node_found("NODE_FOUND:127.0.0.1:9001").unwrap();
        assert_eq!(finger, Finger::new("127.0.0.1", 9001));
        assert!(matches!(
            parse_node_found("Not found."),
            Err(Error::LookupFailed)
        ));
        assert!(parse_node_found("NODE_FOUND:127.0.0.1").is_err());
        assert!(parse_node_found("nonsense").is_err());
    }

    #[test]
    fn test_parse_leader_rehashes_the_endpoint() {
        let leader = parse_leader("405900688:127.0.0.1:9000").unwrap();
        assert_eq!(leader.id.value(), 405900688);
        assert!(parse_leader("405900688:127.0.0.1").is_err());
    }

    #[test]
    fn test_parse_successors() {
        assert_eq!(
            parse_successors("11:22").unwrap(),
            (RingId::from(11u64), RingId::from(22u64))
        );
        assert!(parse_successors("11").is_err());
    }

    #[test]
    fn test_batch_roundtrip() {
        let pairs = vec![
            ("a".to_string(), "1".to_string()),
            ("b".to_string(), "2:3".to_string()),
        ];
        let line = encode_batch(&pairs);
        assert_eq!(line, "a:1::b:2:3");
        assert_eq!(parse_batch(&line), pairs);
    }

    #[test]
    fn test_batch_empty_line() {
        assert_eq!(encode_batch(&[]), "");
        assert!(parse_batch("").is_empty());
        assert!(parse_batch("   ").is_empty());
    }

    #[test]
    fn test_batch_skips_malformed_entries() {
        assert_eq!(
            parse_batch("a:1::broken::b:2"),
            vec![
                ("a".to_string(), "1".to_string()),
                ("b".to_string(), "2".to_string())
            ]
        );
    }
}
