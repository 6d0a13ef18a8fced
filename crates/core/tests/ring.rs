//! End-to-end scenarios over real loopback sockets: rings form, requests
//! route, keys migrate and replicate, failures heal, leaders converge.

use std::collections::HashSet;
use std::sync::Mutex;
use std::sync::OnceLock;
use std::time::Duration;
use std::time::Instant;

use ringlet_core::dht::Finger;
use ringlet_core::dht::RingId;
use ringlet_core::dht::Role;
use ringlet_core::net::client;
use ringlet_core::node::Node;
use ringlet_core::node::NodeHandle;
use ringlet_core::node::Timing;

fn fast_timing() -> Timing {
    Timing {
        stabilize_delay: Duration::from_millis(150),
        stabilize_interval: Duration::from_millis(200),
        heartbeat_delay: Duration::from_millis(300),
        heartbeat_interval: Duration::from_millis(200),
    }
}

/// Ports already handed to a test node in this process. The OS will not
/// reissue a bound ephemeral port while it is held, but nothing stops it
/// once released, so tests keep their own ledger.
fn claim(port: u16) -> bool {
    static CLAIMED: OnceLock<Mutex<HashSet<u16>>> = OnceLock::new();
    CLAIMED
        .get_or_init(|| Mutex::new(HashSet::new()))
        .lock()
        .unwrap()
        .insert(port)
}

fn free_port() -> u16 {
    loop {
        let probe = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
        let port = probe.local_addr().unwrap().port();
        drop(probe);
        if claim(port) {
            return port;
        }
    }
}

/// A free port whose endpoint hashes strictly between `low` and `high`.
fn port_with_id_between(low: RingId, high: RingId) -> u16 {
    for port in 20000u16..60000 {
        let id = RingId::of(&format!("127.0.0.1:{port}"));
        if id == high || !id.in_open_closed(low, high) {
            continue;
        }
        if std::net::TcpListener::bind(("127.0.0.1", port)).is_ok() && claim(port) {
            return port;
        }
    }
    panic!("no loopback port hashes between {low} and {high}");
}

async fn start_seed() -> NodeHandle {
    let port = free_port();
    Node::seed("127.0.0.1", port)
        .with_timing(fast_timing())
        .spawn()
        .await
        .expect("seed failed to bind")
}

async fn start_join(bootstrap: &NodeHandle) -> NodeHandle {
    start_join_at(free_port(), bootstrap).await
}

async fn start_join_at(port: u16, bootstrap: &NodeHandle) -> NodeHandle {
    Node::join("127.0.0.1", port, "127.0.0.1", bootstrap.ring().own().port)
        .await
        .expect("join failed")
        .with_timing(fast_timing())
        .spawn()
        .await
        .expect("joiner failed to bind")
}

async fn wait_until(deadline: Duration, mut condition: impl FnMut() -> bool) -> bool {
    let started = Instant::now();
    while started.elapsed() < deadline {
        if condition() {
            return true;
        }
        tokio::time::sleep(Duration::from_millis(50)).await;
    }
    condition()
}

/// Every member's successor pair and predecessor match the clockwise
/// id order of `handles`.
fn ring_in_id_order(handles: &[&NodeHandle]) -> bool {
    let mut ids: Vec<u64> = handles.iter().map(|h| h.ring().id().value()).collect();
    ids.sort_unstable();
    let n = ids.len();
    handles.iter().all(|handle| {
        let info = handle.ring().snapshot().expect("snapshot");
        let index = ids.iter().position(|id| *id == info.id).expect("member");
        info.successor1.id == ids[(index + 1) % n]
            && info.successor2.id == ids[(index + 2) % n]
            && info.predecessor1.id == ids[(index + n - 1) % n]
    })
}

fn handle_with<'a>(handles: &[&'a NodeHandle], id: u64) -> &'a NodeHandle {
    handles
        .iter()
        .copied()
        .find(|h| h.ring().id().value() == id)
        .expect("no member with that id")
}

/// Index into ascending `ids` of the member owning `hashed`.
fn owner_position(ids: &[u64], hashed: RingId) -> usize {
    ids.iter()
        .position(|&id| hashed.value() <= id)
        .unwrap_or(0)
}

async fn raw(port: u16, line: &str) -> String {
    client::call_once(&Finger::new("127.0.0.1", port), line)
        .await
        .expect("request failed")
}

#[tokio::test]
async fn two_members_link_into_a_ring() {
    let a = start_seed().await;
    let b = start_join(&a).await;
    let linked = wait_until(Duration::from_secs(10), || ring_in_id_order(&[&a, &b])).await;
    assert!(
        linked,
        "ring never linked: a={:?} b={:?}",
        a.ring().snapshot().unwrap(),
        b.ring().snapshot().unwrap()
    );
    a.abort();
    b.abort();
}

#[tokio::test]
async fn put_and_get_route_to_the_owner() {
    let a = start_seed().await;
    let b = start_join(&a).await;
    assert!(wait_until(Duration::from_secs(10), || ring_in_id_order(&[&a, &b])).await);

    let (a_id, b_id) = (a.ring().id(), b.ring().id());
    let b_port = b.ring().own().port;
    let a_port = a.ring().own().port;
    // a key that hashes into b's arc, addressed to a, must relay to b
    let key = (0..10_000)
        .map(|i| format!("k{i}"))
        .find(|k| RingId::of(k).in_open_closed(a_id, b_id))
        .expect("some key must land in b's arc");
    let hashed = RingId::of(&key);

    let stored = raw(a_port, &format!("PUT_VALUE:{key}:bar")).await;
    assert_eq!(stored, format!("VALUE_STORED for {hashed} on node {b_id}:{b_port}"));
    // storing twice is a plain overwrite, acknowledged the same way
    let again = raw(a_port, &format!("PUT_VALUE:{key}:bar")).await;
    assert_eq!(again, stored);
    assert_eq!(b.ring().get(&key).unwrap(), Some("bar".to_string()));

    let found = raw(a_port, &format!("FIND_VALUE:{key}")).await;
    assert_eq!(
        found,
        format!("VALUE_FOUND:Request acknowledged on node {b_id}:{b_port}:bar")
    );
    assert_eq!(raw(a_port, "FIND_VALUE:zzz-missing").await, "Key NOT FOUND.");

    a.abort();
    b.abort();
}

#[tokio::test]
async fn join_hands_over_the_closer_keys() {
    let a = start_seed().await;
    let a_port = a.ring().own().port;
    let keys: Vec<String> = (0..30).map(|i| format!("m{i}")).collect();
    for key in &keys {
        raw(a_port, &format!("PUT_VALUE:{key}:v")).await;
    }

    // join without spawning, so the handover is the only movement
    let b = Node::join("127.0.0.1", free_port(), "127.0.0.1", a_port)
        .await
        .expect("join failed");
    let (a_id, b_id) = (a.ring().id(), b.ring().id());
    let mut moved = 0;
    for key in &keys {
        let hashed = RingId::of(key);
        let closer_to_b = (b_id - hashed).value() < (a_id - hashed).value();
        assert_eq!(
            b.ring().get(key).unwrap().is_some(),
            closer_to_b,
            "key {key} on the wrong side"
        );
        assert_eq!(a.ring().get(key).unwrap().is_some(), !closer_to_b);
        moved += usize::from(closer_to_b);
    }
    assert_eq!(
        a.ring().snapshot().unwrap().stored_keys + moved,
        keys.len(),
        "handover must move keys, not copy them"
    );

    a.abort();
}

#[tokio::test]
async fn successor_failure_promotes_the_backup() {
    let a = start_seed().await;
    let b = start_join(&a).await;
    assert!(wait_until(Duration::from_secs(10), || ring_in_id_order(&[&a, &b])).await);
    let c = start_join(&a).await;
    assert!(
        wait_until(Duration::from_secs(15), || ring_in_id_order(&[&a, &b, &c])).await,
        "three-member ring never settled"
    );

    let c_id = c.ring().id();
    let upstream = if a.ring().snapshot().unwrap().successor1.id == c_id.value() {
        &a
    } else {
        &b
    };
    let survivor_id = upstream.ring().snapshot().unwrap().successor2.id;
    c.abort();

    let healed = wait_until(Duration::from_secs(20), || {
        upstream.ring().snapshot().unwrap().successor1.id == survivor_id
            && !a.ring().finger_references(c_id).unwrap()
            && !b.ring().finger_references(c_id).unwrap()
    })
    .await;
    assert!(
        healed,
        "dead member still referenced: a={:?} b={:?}",
        a.ring().snapshot().unwrap(),
        b.ring().snapshot().unwrap()
    );
    assert!(
        wait_until(Duration::from_secs(10), || ring_in_id_order(&[&a, &b])).await,
        "surviving pair never relinked"
    );

    a.abort();
    b.abort();
}

#[tokio::test]
async fn stale_replica_is_dropped_when_the_successor_set_shifts() {
    let a = start_seed().await;
    let b = start_join(&a).await;
    assert!(wait_until(Duration::from_secs(10), || ring_in_id_order(&[&a, &b])).await);
    let c = start_join(&a).await;
    assert!(wait_until(Duration::from_secs(15), || ring_in_id_order(&[&a, &b, &c])).await);

    let handles = [&a, &b, &c];
    let mut ids: Vec<u64> = handles.iter().map(|h| h.ring().id().value()).collect();
    ids.sort_unstable();

    let key = "replica-probe";
    let position = owner_position(&ids, RingId::of(key));
    let owner = handle_with(&handles, ids[position]);
    let first = handle_with(&handles, ids[(position + 1) % 3]);
    let second = handle_with(&handles, ids[(position + 2) % 3]);

    let reply = raw(a.ring().own().port, &format!("PUT_VALUE:{key}:77")).await;
    assert!(
        reply.ends_with(&format!(
            "on node {}:{}",
            owner.ring().id(),
            owner.ring().own().port
        )),
        "stored on the wrong member: {reply}"
    );
    let replicated = wait_until(Duration::from_secs(10), || {
        first.ring().get(key).unwrap().is_some() && second.ring().get(key).unwrap().is_some()
    })
    .await;
    assert!(replicated, "replicas never reached both successors");

    // wedge a new member between the owner and its first successor: the
    // owner's successor pair becomes (joiner, first) and the copy on
    // `second` is now one member too far
    let port = port_with_id_between(owner.ring().id(), first.ring().id());
    let d = start_join_at(port, &a).await;
    let reconciled = wait_until(Duration::from_secs(20), || {
        owner.ring().get(key).unwrap().is_some()
            && d.ring().get(key).unwrap().is_some()
            && first.ring().get(key).unwrap().is_some()
            && second.ring().get(key).unwrap().is_none()
    })
    .await;
    assert!(
        reconciled,
        "replica set never shifted: d={:?} second={:?}",
        d.ring().snapshot().unwrap(),
        second.ring().snapshot().unwrap()
    );

    a.abort();
    b.abort();
    c.abort();
    d.abort();
}

#[tokio::test]
async fn leadership_converges_to_the_highest_id() {
    let a = start_seed().await;
    let b = start_join(&a).await;
    assert!(wait_until(Duration::from_secs(10), || ring_in_id_order(&[&a, &b])).await);
    let c = start_join(&a).await;
    assert!(wait_until(Duration::from_secs(15), || ring_in_id_order(&[&a, &b, &c])).await);

    let handles = [&a, &b, &c];
    let top = handles
        .iter()
        .map(|h| h.ring().id().value())
        .max()
        .unwrap();
    let agreed = wait_until(Duration::from_secs(20), || {
        handles.iter().all(|handle| {
            let info = handle.ring().snapshot().unwrap();
            let expected = if info.id == top {
                Role::Leader
            } else {
                Role::Follower
            };
            info.leader.id == top && info.role == expected
        })
    })
    .await;
    assert!(
        agreed,
        "no agreement on the leader: {:?}",
        handles
            .iter()
            .map(|h| h.ring().snapshot().unwrap())
            .collect::<Vec<_>>()
    );

    a.abort();
    b.abort();
    c.abort();
}
