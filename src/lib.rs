//! Rock paper scissors match server and client
//!
//! Players connect over TCP and speak a newline-delimited text protocol:
//! a display name first, then one move per round. The server pairs waiting
//! players in arrival order and runs one time-boxed round per pair.

pub mod app;
pub mod client;
pub mod config;
pub mod game;
pub mod http;
pub mod matchmaking;
pub mod net;
pub mod util;
