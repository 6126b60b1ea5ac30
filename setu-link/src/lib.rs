//! SetuLink - remote-operation link between an operator console and the rover
//!
//! This library provides the wire protocol and delivery engine shared by both
//! ends of the link: a length-prefixed binary framing over one persistent TCP
//! stream, a dual-priority send queue (lossless commands, lossy video), a
//! duplex session running paired inbound/outbound threads, and the client and
//! server peer managers that own connection lifecycle and reconnection.
//!
//! The protocol is symmetric: the operator console uses [`LinkClient`] and the
//! robot uses [`LinkServer`], but framing, sessions and queues are identical
//! in both directions.

pub mod config;
pub mod error;
pub mod protocol;
pub mod session;
pub mod settings;

// Re-export commonly used types
pub use config::LinkConfig;
pub use error::{Error, Result};
pub use protocol::messages::Message;
pub use session::{Dispatcher, LinkClient, LinkServer, SendQueue, Session};
pub use settings::{Settings, SharedSettings};
