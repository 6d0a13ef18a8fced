//! Stabilization run daemons to maintain the ring.
//!
//! One pass walks the member through four repairs: refresh the backup
//! successor, detect a member that slid in between this one and its
//! successor, re-resolve every finger slot, and reconcile replicas. A pass
//! that cannot reach the successor at all falls back to rebuilding the
//! ring through the backup successor, retrying until something answers.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use futures::future::FutureExt;
use futures::pin_mut;
use futures::select;
use futures_timer::Delay;

use crate::consts::STABILIZE_RETRY_DELAY;
use crate::dht::chord::NodeRing;
use crate::dht::election;
use crate::dht::finger::Finger;
use crate::dht::id::RingId;
use crate::dht::types::Periodic;
use crate::error::Result;
use crate::message;
use crate::net::client;

/// The stabilization runner.
pub struct Stabilization {
    ring: NodeRing,
    delay: Duration,
    interval: Duration,
}

impl Stabilization {
    /// Create a new stabilization runner with its schedule.
    pub fn new(ring: NodeRing, delay: Duration, interval: Duration) -> Self {
        Self {
            ring,
            delay,
            interval,
        }
    }

    /// Run stabilization once.
    pub async fn stabilize(&self) -> Result<()> {
        self.log_topology();
        let successor = self.ring.successor1()?;
        let predecessor = self.ring.predecessor1()?;
        let own = self.ring.id();
        if successor.id != own {
            tracing::debug!("STABILIZATION successor_path start");
            if let Err(e) = self.stabilize_with_successor().await {
                tracing::error!("[stabilize] Failed via successor {}: {}", successor, e);
                self.recover_via_backup().await;
            }
            tracing::debug!("STABILIZATION successor_path end");
        } else if predecessor.id != own {
            // joined but not yet linked forward; keep the table fresh
            // through the predecessor until a successor shows up
            tracing::debug!("STABILIZATION predecessor_path start");
            if let Err(e) = self.stabilize_with_predecessor(&predecessor).await {
                tracing::error!("[stabilize] Failed via predecessor {}: {}", predecessor, e);
            }
            tracing::debug!("STABILIZATION predecessor_path end");
        } else {
            // alone on the ring; nothing to repair and nowhere to replicate
            return Ok(());
        }
        tracing::debug!("STABILIZATION manage_replicas start");
        if let Err(e) = self.manage_replicas().await {
            tracing::error!("[stabilize] Failed on replica pass: {}", e);
        }
        tracing::debug!("STABILIZATION manage_replicas end");
        Ok(())
    }

    async fn stabilize_with_successor(&self) -> Result<()> {
        self.update_successors().await?;
        let successor = self.ring.successor1()?;
        let between = client::request_predecessor(&successor, self.ring.id()).await?;
        if between.id != self.ring.id() {
            // the successor answers to someone else, either a fresh joiner
            // in between or a successor that has not recorded us yet
            tracing::info!("adopting {} as immediate successor", between);
            self.ring.adopt_successor(between.clone())?;
            self.update_successors().await?;
            self.maybe_start_election(&between).await?;
            client::send_once(&between, &message::new_predecessor(self.ring.own())).await?;
            client::refresh_fingers(&self.ring, &between).await?;
        } else {
            client::refresh_fingers(&self.ring, &successor).await?;
        }
        // the sweep may have moved finger slot 0; line the backup up again
        self.update_successors().await?;
        Ok(())
    }

    async fn stabilize_with_predecessor(&self, predecessor: &Finger) -> Result<()> {
        client::refresh_fingers(&self.ring, predecessor).await?;
        self.update_successors().await?;
        let successor = self.ring.successor1()?;
        self.maybe_start_election(&successor).await?;
        Ok(())
    }

    /// Point the backup successor at whoever follows the immediate
    /// successor, asking the successor itself.
    async fn update_successors(&self) -> Result<()> {
        let successor = self.ring.successor1()?;
        if successor.id == self.ring.id() {
            return Ok(());
        }
        let next = client::find_node(&successor, successor.id + 1u64).await?;
        self.ring.set_successor2(next)?;
        Ok(())
    }

    /// A successor outranking the recorded leader means the leader cannot
    /// have heard of it; open an election towards that successor.
    async fn maybe_start_election(&self, new_successor: &Finger) -> Result<()> {
        let leader = self.ring.leader()?;
        if new_successor.id > leader.id {
            tracing::info!(
                "successor {} outranks recorded leader {}",
                new_successor,
                leader
            );
            election::initiate(&self.ring, new_successor).await?;
        }
        Ok(())
    }

    /// Rebuild the ring through the backup successor, retrying until an
    /// attempt completes. Each attempt re-reads the backup pointer, since
    /// the heartbeat may have moved it in the meantime.
    async fn recover_via_backup(&self) {
        loop {
            let backup = match self.ring.successor2() {
                Ok(backup) => backup,
                Err(e) => {
                    tracing::error!("[stabilize] state unavailable during recovery: {}", e);
                    return;
                }
            };
            tracing::info!("rebuilding the ring through backup successor {}", backup);
            match self.rebuild_via(&backup).await {
                Ok(()) => return,
                Err(e) => {
                    tracing::warn!("[stabilize] recovery via {} failed: {}", backup, e);
                    Delay::new(STABILIZE_RETRY_DELAY).await;
                }
            }
        }
    }

    async fn rebuild_via(&self, backup: &Finger) -> Result<()> {
        client::refresh_fingers(&self.ring, backup).await?;
        self.update_successors().await?;
        let successor = self.ring.successor1()?;
        self.maybe_start_election(&successor).await?;
        Ok(())
    }

    /// Reconcile the local store with the replication rule: entries this
    /// member owns are pushed to both successors, entries it merely holds
    /// are dropped once the owner's successor set no longer includes it.
    async fn manage_replicas(&self) -> Result<()> {
        let entries = self.ring.entries()?;
        if entries.is_empty() {
            return Ok(());
        }
        let own = self.ring.id();
        let (first, second) = self.ring.successors()?;
        let mut holders = vec![&first];
        if second.id != first.id {
            holders.push(&second);
        }
        for (key, value) in entries {
            let hashed = RingId::of(&key);
            if self.ring.is_owner(hashed)? {
                for &holder in &holders {
                    if holder.id == own {
                        continue;
                    }
                    let line = message::put_replica(holder, &key, &value);
                    if let Err(e) = client::send_once(holder, &line).await {
                        tracing::warn!("replica push of {:?} to {} failed: {}", key, holder, e);
                    }
                }
            } else {
                match self.replica_still_wanted(hashed, own, &first).await {
                    Ok(true) => {}
                    Ok(false) => {
                        tracing::info!("dropping replica {:?}, owner moved on", key);
                        self.ring.remove(&key)?;
                    }
                    Err(e) => tracing::debug!("replica check for {:?} failed: {}", key, e),
                }
            }
        }
        Ok(())
    }

    /// A held entry stays wanted while this member is the owner's first or
    /// second successor. Resolution goes through the live successor, so a
    /// stale answer only postpones the cleanup to a later pass.
    async fn replica_still_wanted(&self, hashed: RingId, own: RingId, via: &Finger) -> Result<bool> {
        let owner = client::find_node(via, hashed).await?;
        if owner.id == own {
            return Ok(true);
        }
        let (first, second) = client::get_successors(&owner, own).await?;
        Ok(first == own || second == own)
    }

    fn log_topology(&self) {
        match self.ring.snapshot() {
            Ok(info) => match serde_json::to_string(&info) {
                Ok(json) => tracing::debug!("TOPOLOGY {}", json),
                Err(e) => tracing::error!("could not encode the topology snapshot: {}", e),
            },
            Err(e) => tracing::error!("could not read the topology snapshot: {}", e),
        }
    }
}

#[async_trait]
impl Periodic for Stabilization {
    async fn wait(self: Arc<Self>) {
        Delay::new(self.delay).await;
        loop {
            let timeout = Delay::new(self.interval).fuse();
            pin_mut!(timeout);
            select! {
                _ = timeout => self
                    .stabilize()
                    .await
                    .unwrap_or_else(|e| tracing::error!("failed to stabilize {:?}", e)),
            }
        }
    }
}
