//! Connection lifecycle: the duplex session and its peer managers
//!
//! A [`Session`] owns one live stream and its paired inbound/outbound threads.
//! [`LinkClient`] (operator role) and [`LinkServer`] (robot role) own the
//! connect/accept lifecycle and build a fresh session per connection.

pub mod client;
pub mod dispatcher;
pub mod duplex;
pub mod send_queue;
pub mod server;

pub use client::{ClientEvents, LinkClient};
pub use dispatcher::Dispatcher;
pub use duplex::{Session, SessionConfig};
pub use send_queue::SendQueue;
pub use server::{LinkServer, ServerEvents};
