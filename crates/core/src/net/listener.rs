#![warn(missing_docs)]
//! Accept loop of a ring member.

use std::time::Duration;

use tokio::net::TcpListener;

use crate::dht::chord::NodeRing;
use crate::dht::finger::Finger;
use crate::error::Error;
use crate::error::Result;
use crate::net::session;

/// A bound listening socket, not yet accepting.
pub struct Listener {
    inner: TcpListener,
}

impl Listener {
    /// Bind the endpoint `own` advertises. Failing to bind is fatal for a
    /// member, so this surfaces the error instead of retrying.
    pub async fn bind(own: &Finger) -> Result<Self> {
        let inner = TcpListener::bind((own.address.as_str(), own.port))
            .await
            .map_err(|source| Error::Bind {
                addr: own.endpoint(),
                source,
            })?;
        Ok(Self { inner })
    }

    /// Accept forever, one session task per connection.
    pub async fn run(self, ring: NodeRing) {
        loop {
            match self.inner.accept().await {
                Ok((stream, peer)) => {
                    tracing::trace!("accepted {}", peer);
                    tokio::spawn(session::serve(ring.clone(), stream, peer));
                }
                Err(e) => {
                    tracing::warn!("accept failed: {}", e);
                    tokio::time::sleep(Duration::from_millis(50)).await;
                }
            }
        }
    }
}
