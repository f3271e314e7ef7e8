//! Network module - TLS channel to a cast receiver
//!
//! Provides:
//! - The transport adapter owning the secure session
//! - The connection object composing transport, codec, and command builders

mod connection;
mod transport;

pub use connection::*;
pub use transport::*;
