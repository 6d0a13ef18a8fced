//! Ringlet is a distributed hash table in the Chord family.
//!
//! Every member owns an identifier on a fixed-size ring and is responsible
//! for the keys that hash into the arc between its predecessor and itself.
//! Members keep a finger table of long-range pointers for logarithmic
//! routing, repair the ring with a periodic [stabilization](dht::Stabilization)
//! pass, detect dead neighbours with a [heartbeat](dht::Heartbeat), keep
//! each key on the owner plus its two successors, and maintain a ring-wide
//! leader through a highest-identifier [election](dht::election).
//!
//! Members talk over plain TCP, one newline-terminated `COMMAND:CONTENT`
//! line per request. The vocabulary lives in [`message`], the server side in
//! [`net::listener`] and [`net::session`], and the client side in
//! [`net::client`]. [`node::Node`] assembles all of it into a runnable
//! member.

pub mod consts;
pub mod dht;
pub mod error;
pub mod inspect;
pub mod message;
pub mod net;
pub mod node;

pub use error::Error;
pub use error::Result;
