//! Chord algorithm implement.
#![warn(missing_docs)]
use std::collections::HashMap;
use std::sync::Arc;
use std::sync::Mutex;
use std::sync::MutexGuard;

use crate::consts::M;
use crate::dht::election::Role;
use crate::dht::finger::Finger;
use crate::dht::finger::FingerTable;
use crate::dht::id::RingId;
use crate::error::Error;
use crate::error::Result;
use crate::inspect::compress_runs;
use crate::inspect::NodeInfo;
use crate::inspect::PeerInfo;

/// Everything a member knows about the ring, guarded by one lock.
///
/// The successor and predecessor pointers are doubled for fault tolerance:
/// the second entry of each pair is the fallback adopted when a heartbeat
/// declares the first one dead. A member alone on its ring points every
/// pointer at itself.
struct NodeState {
    finger: FingerTable,
    successor1: Finger,
    successor2: Finger,
    predecessor1: Finger,
    predecessor2: Finger,
    leader: Finger,
    role: Role,
    store: HashMap<String, String>,
}

/// `NodeRing` is a member's view of the ring plus its slice of the key
/// space. All members form a clockwise ring in the order of [`RingId`].
///
/// The handle is cheap to clone and shared between the listener sessions
/// and the maintenance tasks. Every operation takes the state lock for the
/// duration of the call and never across I/O, so lock poisoning is the only
/// failure these methods report.
#[derive(Clone)]
pub struct NodeRing {
    own: Finger,
    state: Arc<Mutex<NodeState>>,
}

/// How a request for some id should be satisfied.
#[derive(Clone, Debug, PartialEq)]
pub enum RouteDecision {
    /// This member owns the id; answer locally.
    Local,
    /// The immediate successor owns the id.
    Successor(Finger),
    /// Forward the request to the finger most closely following the id.
    Forward(Finger),
}

impl NodeRing {
    /// A member seeding a fresh ring: every pointer and every finger slot
    /// refers back to itself, and it is the leader of its one-member ring.
    pub fn new_seed(own: Finger) -> Self {
        let state = NodeState {
            finger: FingerTable::seeded(&own, M),
            successor1: own.clone(),
            successor2: own.clone(),
            predecessor1: own.clone(),
            predecessor2: own.clone(),
            leader: own.clone(),
            role: Role::Leader,
            store: HashMap::new(),
        };
        Self {
            own,
            state: Arc::new(Mutex::new(state)),
        }
    }

    /// A member about to join an existing ring: the finger table starts
    /// unresolved and every pointer refers back to itself until the join
    /// queries fill them in.
    pub fn new(own: Finger) -> Self {
        let state = NodeState {
            finger: FingerTable::new(own.id, M),
            successor1: own.clone(),
            successor2: own.clone(),
            predecessor1: own.clone(),
            predecessor2: own.clone(),
            leader: own.clone(),
            role: Role::Follower,
            store: HashMap::new(),
        };
        Self {
            own,
            state: Arc::new(Mutex::new(state)),
        }
    }

    fn lock(&self) -> Result<MutexGuard<'_, NodeState>> {
        self.state.lock().map_err(|_| Error::StatePoisoned)
    }

    /// The member's own pointer.
    pub fn own(&self) -> &Finger {
        &self.own
    }

    /// The member's own ring id.
    pub fn id(&self) -> RingId {
        self.own.id
    }

    /// Whether `id` falls in this member's arc `(predecessor1, self]`.
    pub fn is_owner(&self, id: RingId) -> Result<bool> {
        let state = self.lock()?;
        Ok(id.in_open_closed(state.predecessor1.id, self.own.id))
    }

    /// Decide how a request for `id` should be satisfied.
    ///
    /// With `successor_shortcut` the arc `(self, successor1]` is answered
    /// with the successor directly instead of forwarding, which saves the
    /// final hop of a node lookup. When the finger table offers nothing
    /// better than this member itself the request is answered locally;
    /// stabilization will have corrected the table by the time it matters.
    pub fn route(&self, id: RingId, successor_shortcut: bool) -> Result<RouteDecision> {
        let state = self.lock()?;
        if id.in_open_closed(state.predecessor1.id, self.own.id) {
            return Ok(RouteDecision::Local);
        }
        if successor_shortcut && id.in_open_closed(self.own.id, state.successor1.id) {
            return Ok(RouteDecision::Successor(state.successor1.clone()));
        }
        match state.finger.closest_following(id) {
            Some(next) if next.id != self.own.id => Ok(RouteDecision::Forward(next)),
            _ => Ok(RouteDecision::Local),
        }
    }

    /// The next member on the ring.
    pub fn successor1(&self) -> Result<Finger> {
        Ok(self.lock()?.successor1.clone())
    }

    /// The backup successor, adopted when the first one dies.
    pub fn successor2(&self) -> Result<Finger> {
        Ok(self.lock()?.successor2.clone())
    }

    /// Both successors, read under one lock.
    pub fn successors(&self) -> Result<(Finger, Finger)> {
        let state = self.lock()?;
        Ok((state.successor1.clone(), state.successor2.clone()))
    }

    /// The previous member on the ring.
    pub fn predecessor1(&self) -> Result<Finger> {
        Ok(self.lock()?.predecessor1.clone())
    }

    /// The backup predecessor, adopted when the first one dies.
    pub fn predecessor2(&self) -> Result<Finger> {
        Ok(self.lock()?.predecessor2.clone())
    }

    /// The member this node believes leads the ring.
    pub fn leader(&self) -> Result<Finger> {
        Ok(self.lock()?.leader.clone())
    }

    /// This member's role in the current election term.
    pub fn role(&self) -> Result<Role> {
        Ok(self.lock()?.role)
    }

    /// Finger at `index`, if resolved.
    pub fn finger(&self, index: usize) -> Result<Option<Finger>> {
        Ok(self.lock()?.finger.get(index).cloned())
    }

    /// Store `finger` at `index`. Slot 0 is the immediate successor, so
    /// writing it also moves the successor pointer.
    pub fn set_finger(&self, index: usize, finger: Finger) -> Result<()> {
        let mut state = self.lock()?;
        if index == 0 {
            state.successor1 = finger.clone();
        }
        state.finger.set(index, finger);
        Ok(())
    }

    /// Install both successor pointers, as a join does once its first two
    /// finger slots are resolved.
    pub fn set_successors(&self, first: Finger, second: Finger) -> Result<()> {
        let mut state = self.lock()?;
        state.successor1 = first;
        state.successor2 = second;
        Ok(())
    }

    /// Replace the backup successor.
    pub fn set_successor2(&self, finger: Finger) -> Result<()> {
        self.lock()?.successor2 = finger;
        Ok(())
    }

    /// Adopt `finger` as the new immediate successor after a member slid in
    /// between this one and the old successor. The old slot 0 entry is kept
    /// as slot 1 so the displaced member stays routable.
    pub fn adopt_successor(&self, finger: Finger) -> Result<()> {
        let mut state = self.lock()?;
        if let Some(old) = state.finger.get(0).cloned() {
            state.finger.set(1, old);
        }
        state.finger.set(0, finger.clone());
        state.successor1 = finger;
        Ok(())
    }

    /// Drop the dead immediate successor and promote the backup, keeping
    /// finger slot 0 in step. Returns the promoted pointer.
    pub fn promote_backup_successor(&self) -> Result<Finger> {
        let mut state = self.lock()?;
        let backup = state.successor2.clone();
        state.successor1 = backup.clone();
        state.finger.set(0, backup.clone());
        Ok(backup)
    }

    /// Record a new immediate predecessor, keeping the old one as backup.
    pub fn set_predecessor(&self, finger: Finger) -> Result<()> {
        let mut state = self.lock()?;
        let old = state.predecessor1.clone();
        state.predecessor2 = old;
        state.predecessor1 = finger;
        Ok(())
    }

    /// Drop the dead immediate predecessor and fall back to the backup.
    pub fn demote_predecessor(&self) -> Result<Finger> {
        let mut state = self.lock()?;
        let backup = state.predecessor2.clone();
        state.predecessor1 = backup.clone();
        Ok(backup)
    }

    /// Record the ring leader. A member recording itself becomes the
    /// leader; recording anyone else makes it a follower.
    pub fn set_leader(&self, finger: Finger) -> Result<()> {
        let mut state = self.lock()?;
        state.role = if finger.id == self.own.id {
            Role::Leader
        } else {
            Role::Follower
        };
        state.leader = finger;
        Ok(())
    }

    /// Set the election role without touching the recorded leader.
    pub fn set_role(&self, role: Role) -> Result<()> {
        self.lock()?.role = role;
        Ok(())
    }

    /// Insert or overwrite a key in the local store.
    pub fn put(&self, key: String, value: String) -> Result<()> {
        self.lock()?.store.insert(key, value);
        Ok(())
    }

    /// Look a key up in the local store.
    pub fn get(&self, key: &str) -> Result<Option<String>> {
        Ok(self.lock()?.store.get(key).cloned())
    }

    /// Remove a key from the local store.
    pub fn remove(&self, key: &str) -> Result<()> {
        self.lock()?.store.remove(key);
        Ok(())
    }

    /// A copy of every locally held entry.
    pub fn entries(&self) -> Result<Vec<(String, String)>> {
        let state = self.lock()?;
        Ok(state
            .store
            .iter()
            .map(|(k, v)| (k.clone(), v.clone()))
            .collect())
    }

    /// Hand over the entries that hash closer to a joining member than to
    /// this one, removing them locally.
    ///
    /// Closeness is the clockwise distance from the key's hash to the
    /// member, so a key hashing exactly onto the joiner moves, and a key
    /// hashing exactly onto this member stays, whatever the two ids'
    /// relative order. That keeps the handover correct even when the
    /// joiner's announcement races the next stabilization pass.
    pub fn cede_entries(&self, joining: RingId) -> Result<Vec<(String, String)>> {
        let own = self.own.id;
        let mut state = self.lock()?;
        let moving: Vec<String> = state
            .store
            .keys()
            .filter(|key| {
                let hashed = RingId::of(key);
                (joining - hashed).value() < (own - hashed).value()
            })
            .cloned()
            .collect();
        let mut ceded = Vec::with_capacity(moving.len());
        for key in moving {
            if let Some(value) = state.store.remove(&key) {
                ceded.push((key, value));
            }
        }
        Ok(ceded)
    }

    /// A serializable snapshot of this member's view of the ring.
    pub fn snapshot(&self) -> Result<NodeInfo> {
        let state = self.lock()?;
        Ok(NodeInfo {
            id: self.own.id.value(),
            id_hex: self.own.id.to_hex(),
            endpoint: self.own.endpoint(),
            role: state.role,
            leader: PeerInfo::from(&state.leader),
            successor1: PeerInfo::from(&state.successor1),
            successor2: PeerInfo::from(&state.successor2),
            predecessor1: PeerInfo::from(&state.predecessor1),
            predecessor2: PeerInfo::from(&state.predecessor2),
            fingers: compress_runs(
                state
                    .finger
                    .list()
                    .iter()
                    .map(|slot| slot.as_ref().map(|f| f.id.value())),
            ),
            stored_keys: state.store.len(),
        })
    }

    /// Whether any finger slot points at `id`.
    pub fn finger_references(&self, id: RingId) -> Result<bool> {
        Ok(self.lock()?.finger.references(id))
    }
}
