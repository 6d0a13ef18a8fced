//! Heartbeat daemon probing the two ring neighbours.
//!
//! Each pass pings the immediate successor and predecessor. A neighbour
//! that cannot be reached, answers the wrong thing, or takes too long is
//! demoted on the spot: the backup pointer takes its place and the next
//! stabilization pass rebuilds everything else. When the dead successor
//! was also the ring leader, an election opens towards the backup before
//! the pointer moves.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use futures::future::FutureExt;
use futures::pin_mut;
use futures::select;
use futures_timer::Delay;

use crate::dht::chord::NodeRing;
use crate::dht::election;
use crate::dht::finger::Finger;
use crate::dht::types::Periodic;
use crate::error::Result;
use crate::net::client;

/// The heartbeat runner.
pub struct Heartbeat {
    ring: NodeRing,
    delay: Duration,
    interval: Duration,
}

impl Heartbeat {
    /// Create a new heartbeat runner with its schedule.
    pub fn new(ring: NodeRing, delay: Duration, interval: Duration) -> Self {
        Self {
            ring,
            delay,
            interval,
        }
    }

    /// Run one heartbeat pass.
    pub async fn beat(&self) -> Result<()> {
        self.check_successor().await?;
        self.check_predecessor().await?;
        Ok(())
    }

    async fn check_successor(&self) -> Result<()> {
        let successor = self.ring.successor1()?;
        if successor.id == self.ring.id() {
            return Ok(());
        }
        if self.alive(&successor).await {
            return Ok(());
        }
        tracing::warn!("successor {} failed its heartbeat", successor);
        let leader = self.ring.leader()?;
        let backup = self.ring.successor2()?;
        if successor.id == leader.id {
            tracing::info!("dead successor led the ring, opening an election");
            election::initiate(&self.ring, &backup).await?;
        }
        let promoted = self.ring.promote_backup_successor()?;
        tracing::info!("promoted backup successor {}", promoted);
        Ok(())
    }

    async fn check_predecessor(&self) -> Result<()> {
        let predecessor = self.ring.predecessor1()?;
        if predecessor.id == self.ring.id() {
            return Ok(());
        }
        if self.alive(&predecessor).await {
            return Ok(());
        }
        tracing::warn!("predecessor {} failed its heartbeat", predecessor);
        let fallback = self.ring.demote_predecessor()?;
        tracing::info!("fell back to predecessor {}", fallback);
        Ok(())
    }

    async fn alive(&self, peer: &Finger) -> bool {
        match client::ping(peer, self.ring.id()).await {
            Ok(pong) => pong,
            Err(e) => {
                tracing::debug!("ping to {} failed: {}", peer, e);
                false
            }
        }
    }
}

#[async_trait]
impl Periodic for Heartbeat {
    async fn wait(self: Arc<Self>) {
        Delay::new(self.delay).await;
        loop {
            let timeout = Delay::new(self.interval).fuse();
            pin_mut!(timeout);
            select! {
                _ = timeout => self
                    .beat()
                    .await
                    .unwrap_or_else(|e| tracing::error!("failed to heartbeat {:?}", e)),
            }
        }
    }
}
