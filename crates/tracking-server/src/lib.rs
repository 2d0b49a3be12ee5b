//! tracking-server
//!
//! Reference multi-client TCP relay for the driver tracking channel.
//! Drivers report locations; watchers subscribe and query.

pub mod config;
pub mod hub;
pub mod server;
pub mod types;

mod client;

pub use hub::{Fleet, Route, Routed};
