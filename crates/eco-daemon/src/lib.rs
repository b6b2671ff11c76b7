//! eco-daemon: Local orchestration daemon for the Decred service fleet
//!
//! The daemon installs verified release bundles, supervises the node,
//! wallet, GUI wallet and exchange client processes, tracks their sync
//! progress, and exposes all of it to local clients over a TLS socket.

pub mod error;
pub mod feed;
pub mod installer;
pub mod orchestrator;
pub mod platform;
pub mod rpc;
pub mod server;
pub mod supervisor;

pub use error::{DaemonError, Result};
pub use feed::{Feed, ProgressReporter};
pub use orchestrator::{Collaborators, Eco};
pub use server::ControlServer;
