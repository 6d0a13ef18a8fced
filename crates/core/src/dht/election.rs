//! Ring leader election.
//!
//! Elections run in the Chang-Roberts style: candidacies travel clockwise
//! from successor to successor, each member forwards the highest id it has
//! seen (substituting its own when that is higher), and the member that
//! receives its own id back has won. The winner then circulates a
//! `LEADER_ELECTED` announcement once around the ring.
//!
//! The transition functions here only mutate the ring state and report what
//! should be sent next; the async wrappers push those messages to the
//! successor, fire-and-forget.

use serde::Deserialize;
use serde::Serialize;

use crate::dht::chord::NodeRing;
use crate::dht::finger::Finger;
use crate::dht::id::RingId;
use crate::error::Result;
use crate::message;
use crate::net::client;

/// A member's part in the current election term.
#[derive(Copy, Clone, Debug, Eq, PartialEq, Serialize, Deserialize)]
pub enum Role {
    /// Not campaigning; follows whatever leader is announced.
    Follower,
    /// Has put its own id on the ring and is waiting for it to return.
    Candidate,
    /// Won the last completed election.
    Leader,
}

/// What an election transition wants sent to the successor.
#[derive(Clone, Debug, PartialEq)]
pub(crate) enum Outcome {
    /// Pass this line along the ring.
    Forward(String),
    /// The election settled here; nothing further to send.
    Settled,
}

/// Apply an incoming candidacy and decide what travels on.
pub(crate) fn on_elect_leader(ring: &NodeRing, candidate: RingId) -> Result<Outcome> {
    let own = ring.id();
    if candidate == own {
        // our candidacy made it all the way around: we win
        ring.set_leader(ring.own().clone())?;
        tracing::info!("won the leader election, announcing");
        Ok(Outcome::Forward(message::leader_elected(ring.own())))
    } else if candidate > own {
        ring.set_role(Role::Follower)?;
        Ok(Outcome::Forward(message::elect_leader(candidate)))
    } else {
        ring.set_role(Role::Candidate)?;
        Ok(Outcome::Forward(message::elect_leader(own)))
    }
}

/// Apply a leader announcement and decide what travels on.
pub(crate) fn on_leader_elected(ring: &NodeRing, leader: Finger) -> Result<Outcome> {
    if leader.id == ring.id() {
        // our own announcement came back around; the ring has heard it
        return Ok(Outcome::Settled);
    }
    tracing::info!("recording ring leader {}", leader);
    ring.set_leader(leader.clone())?;
    Ok(Outcome::Forward(message::leader_elected(&leader)))
}

async fn dispatch(ring: &NodeRing, outcome: Outcome) -> Result<()> {
    if let Outcome::Forward(line) = outcome {
        let successor = ring.successor1()?;
        if successor.id == ring.id() {
            // nobody else to carry the message
            return Ok(());
        }
        if let Err(e) = client::send_once(&successor, &line).await {
            tracing::warn!("election message to {} dropped: {}", successor, e);
        }
    }
    Ok(())
}

/// Handle an incoming `ELECT_LEADER` candidacy.
pub async fn handle_elect_leader(ring: &NodeRing, candidate: RingId) -> Result<()> {
    let outcome = on_elect_leader(ring, candidate)?;
    dispatch(ring, outcome).await
}

/// Handle an incoming `LEADER_ELECTED` announcement.
pub async fn handle_leader_elected(ring: &NodeRing, leader: Finger) -> Result<()> {
    let outcome = on_leader_elected(ring, leader)?;
    dispatch(ring, outcome).await
}

/// Open an election term by nominating this member towards `toward`.
///
/// When there is nobody to send to, the member is alone and simply claims
/// the leadership.
pub async fn initiate(ring: &NodeRing, toward: &Finger) -> Result<()> {
    if toward.id == ring.id() {
        ring.set_leader(ring.own().clone())?;
        return Ok(());
    }
    ring.set_role(Role::Candidate)?;
    tracing::info!("starting a leader election via {}", toward);
    if let Err(e) = client::send_once(toward, &message::elect_leader(ring.id())).await {
        tracing::warn!("could not open the election via {}: {}", toward, e);
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dht::tests::peer;

    fn member(own: u64) -> NodeRing {
        let ring = NodeRing::new_seed(peer(own));
        ring.adopt_successor(peer(own + 100)).unwrap();
        ring
    }

    #[test]
    fn test_higher_candidacy_is_forwarded_unchanged() {
        let ring = member(100);
        let outcome = on_elect_leader(&ring, RingId::from(500u64)).unwrap();
        assert_eq!(
            outcome,
            Outcome::Forward(message::elect_leader(RingId::from(500u64)))
        );
        assert_eq!(ring.role().unwrap(), Role::Follower);
    }

    #[test]
    fn test_lower_candidacy_is_replaced_with_own() {
        let ring = member(100);
        let outcome = on_elect_leader(&ring, RingId::from(50u64)).unwrap();
        assert_eq!(
            outcome,
            Outcome::Forward(message::elect_leader(RingId::from(100u64)))
        );
        assert_eq!(ring.role().unwrap(), Role::Candidate);
    }

    #[test]
    fn test_own_candidacy_returning_wins() {
        let ring = member(100);
        let outcome = on_elect_leader(&ring, RingId::from(100u64)).unwrap();
        assert_eq!(
            outcome,
            Outcome::Forward(message::leader_elected(ring.own()))
        );
        assert_eq!(ring.role().unwrap(), Role::Leader);
        assert_eq!(ring.leader().unwrap(), *ring.own());
    }

    #[test]
    fn test_announcement_is_recorded_and_forwarded() {
        let ring = member(100);
        let leader = peer(300);
        let outcome = on_leader_elected(&ring, leader.clone()).unwrap();
        assert_eq!(outcome, Outcome::Forward(message::leader_elected(&leader)));
        assert_eq!(ring.leader().unwrap(), leader);
        assert_eq!(ring.role().unwrap(), Role::Follower);
    }

    #[test]
    fn test_own_announcement_settles() {
        let ring = member(100);
        ring.set_leader(ring.own().clone()).unwrap();
        let outcome = on_leader_elected(&ring, ring.own().clone()).unwrap();
        assert_eq!(outcome, Outcome::Settled);
        assert_eq!(ring.role().unwrap(), Role::Leader);
    }
}
