//! eco-core: Core state, storage and configuration for the eco daemon
//!
//! This crate provides the configuration, the durable key/value store,
//! the credential cache, TLS material and listener address handling
//! shared by the daemon and its clients.

pub mod config;
pub mod credentials;
pub mod error;
pub mod netaddr;
pub mod store;
pub mod tls;

pub use error::EcoError;
pub use netaddr::NetAddr;
pub use store::Store;
