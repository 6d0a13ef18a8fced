#![warn(missing_docs)]
//! Assembling a runnable ring member.
//!
//! A [`Node`] is built in one of two modes. Seeding starts a fresh
//! one-member ring. Joining bootstraps off any existing member: discover
//! the leader and requery through it, resolve every finger slot, announce
//! to the new successor, and pull the keys this member now owns, all
//! before the listener starts. [`Node::spawn`] then binds the listener and
//! starts the stabilization and heartbeat daemons.

use std::sync::Arc;
use std::time::Duration;

use tokio::task::JoinHandle;

use crate::consts::HEARTBEAT_DELAY;
use crate::consts::HEARTBEAT_INTERVAL;
use crate::consts::STABILIZE_DELAY;
use crate::consts::STABILIZE_INTERVAL;
use crate::dht::chord::NodeRing;
use crate::dht::finger::Finger;
use crate::dht::heartbeat::Heartbeat;
use crate::dht::stabilization::Stabilization;
use crate::dht::types::Periodic;
use crate::error::Result;
use crate::message;
use crate::net::client;
use crate::net::listener::Listener;

/// Schedules of the two maintenance daemons. Tests shrink these to keep
/// rings converging in milliseconds.
#[derive(Clone, Copy, Debug)]
pub struct Timing {
    /// Grace period before the first stabilization pass.
    pub stabilize_delay: Duration,
    /// Interval between stabilization passes.
    pub stabilize_interval: Duration,
    /// Grace period before the first heartbeat pass.
    pub heartbeat_delay: Duration,
    /// Interval between heartbeat passes.
    pub heartbeat_interval: Duration,
}

impl Default for Timing {
    fn default() -> Self {
        Self {
            stabilize_delay: STABILIZE_DELAY,
            stabilize_interval: STABILIZE_INTERVAL,
            heartbeat_delay: HEARTBEAT_DELAY,
            heartbeat_interval: HEARTBEAT_INTERVAL,
        }
    }
}

/// A configured member that has not started serving yet.
pub struct Node {
    ring: NodeRing,
    timing: Timing,
}

/// A serving member: the shared ring handle plus its three tasks.
pub struct NodeHandle {
    ring: NodeRing,
    listener: JoinHandle<()>,
    stabilizer: JoinHandle<()>,
    heartbeat: JoinHandle<()>,
}

impl Node {
    /// Seed a fresh ring with this member as its only one and its leader.
    pub fn seed(address: impl Into<String>, port: u16) -> Self {
        let own = Finger::new(address, port);
        tracing::info!("seeding a new ring at {}", own);
        Self {
            ring: NodeRing::new_seed(own),
            timing: Timing::default(),
        }
    }

    /// Join the ring that `bootstrap_address:bootstrap_port` belongs to.
    ///
    /// Bootstrap trouble is logged and the member comes up with whatever
    /// it managed to learn; the first stabilization passes repair the
    /// rest.
    pub async fn join(
        address: impl Into<String>,
        port: u16,
        bootstrap_address: impl Into<String>,
        bootstrap_port: u16,
    ) -> Result<Self> {
        let own = Finger::new(address, port);
        let bootstrap = Finger::new(bootstrap_address, bootstrap_port);
        tracing::info!("{} joining the ring via {}", own, bootstrap);
        let node = Self {
            ring: NodeRing::new(own),
            timing: Timing::default(),
        };
        node.bootstrap(bootstrap).await?;
        Ok(node)
    }

    /// Replace the default daemon schedules.
    pub fn with_timing(mut self, timing: Timing) -> Self {
        self.timing = timing;
        self
    }

    /// The shared ring handle.
    pub fn ring(&self) -> &NodeRing {
        &self.ring
    }

    async fn bootstrap(&self, bootstrap: Finger) -> Result<()> {
        let own = self.ring.own().clone();

        // ask who leads the ring, and prefer joining through the leader
        let via = match client::find_leader(&bootstrap, own.id).await {
            Ok(leader) => {
                tracing::info!("ring leader is {}", leader);
                self.ring.set_leader(leader.clone())?;
                leader
            }
            Err(e) => {
                tracing::warn!("leader discovery via {} failed: {}", bootstrap, e);
                bootstrap
            }
        };

        if let Err(e) = client::refresh_fingers(&self.ring, &via).await {
            tracing::warn!(
                "finger queries via {} failed: {}, joining with a partial table",
                via,
                e
            );
        }

        let successor1 = self.ring.finger(0)?.unwrap_or_else(|| own.clone());
        let successor2 = self
            .ring
            .finger(1)?
            .unwrap_or_else(|| successor1.clone());
        self.ring
            .set_successors(successor1.clone(), successor2)?;

        if successor1.id == own.id {
            return Ok(());
        }
        if let Err(e) = client::send_once(&successor1, &message::new_predecessor(&own)).await {
            tracing::warn!("could not announce to successor {}: {}", successor1, e);
        }
        match client::call_once(&successor1, &message::request_key_values(own.id)).await {
            Ok(batch) => {
                let entries = message::parse_batch(&batch);
                if !entries.is_empty() {
                    tracing::info!("received {} entries from {}", entries.len(), successor1);
                }
                for (key, value) in entries {
                    self.ring.put(key, value)?;
                }
            }
            Err(e) => tracing::warn!("key handover from {} failed: {}", successor1, e),
        }
        Ok(())
    }

    /// Bind the listener and start serving. Only the bind can fail; the
    /// daemons run until aborted.
    pub async fn spawn(self) -> Result<NodeHandle> {
        let listener = Listener::bind(self.ring.own()).await?;
        let ring = self.ring;
        tracing::info!("listening on {} with id {}", ring.own().endpoint(), ring.id());

        let listener_task = tokio::spawn(listener.run(ring.clone()));
        let stabilizer = Arc::new(Stabilization::new(
            ring.clone(),
            self.timing.stabilize_delay,
            self.timing.stabilize_interval,
        ));
        let stabilizer_task = tokio::spawn(stabilizer.wait());
        let heartbeat = Arc::new(Heartbeat::new(
            ring.clone(),
            self.timing.heartbeat_delay,
            self.timing.heartbeat_interval,
        ));
        let heartbeat_task = tokio::spawn(heartbeat.wait());

        Ok(NodeHandle {
            ring,
            listener: listener_task,
            stabilizer: stabilizer_task,
            heartbeat: heartbeat_task,
        })
    }
}

impl NodeHandle {
    /// The shared ring handle.
    pub fn ring(&self) -> &NodeRing {
        &self.ring
    }

    /// Stop serving: the listener socket closes and the daemons halt.
    /// Sessions already in flight finish on their own.
    pub fn abort(&self) {
        self.listener.abort();
        self.stabilizer.abort();
        self.heartbeat.abort();
    }

    /// Park on the member's tasks; they only finish if aborted.
    pub async fn run(self) {
        let _ = futures::join!(self.listener, self.stabilizer, self.heartbeat);
    }
}
