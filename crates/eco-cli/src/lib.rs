//! eco-cli: Client library and command line for the eco daemon
//!
//! [`EcoClient`] speaks the daemon's TLS control protocol. The `ecoctl`
//! binary wraps it for shell use.

pub mod client;
pub mod output;

pub use client::{App, EcoClient};
