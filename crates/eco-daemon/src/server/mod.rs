//! Control-plane server

mod handler;
mod listener;

pub use handler::{serve, INIT_SERVICE};
pub use listener::ControlServer;
