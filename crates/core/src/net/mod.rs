//! TCP roles of a ring member.
//!
//! [`listener`] accepts inbound connections and hands each one to a
//! [`session`] task; [`client`] is the outbound side, one line out and at
//! most one line back per request.

pub mod client;
pub mod listener;
pub mod session;

pub use client::Conn;
pub use listener::Listener;
