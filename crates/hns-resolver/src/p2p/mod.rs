//! Framed P2P connection and message set.

pub mod client;
pub mod connection;
pub mod messages;

pub use client::NetSource;
pub use connection::{Connection, ConnectionError, Frame};
pub use messages::Command;
