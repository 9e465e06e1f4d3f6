//! Line-oriented TCP protocol and per-connection handling

pub mod handler;
pub mod protocol;

pub use handler::{handle_connection, serve};
