//! eco-protocol: Wire protocol for the eco control plane
//!
//! This crate defines the framing, routes and payload types exchanged
//! between the eco daemon and its local clients over the TLS socket.

pub mod codec;
pub mod error;
pub mod frame;
pub mod message;
pub mod state;

pub use codec::{PacketCodec, RequestCodec};
pub use error::ProtocolError;
pub use frame::{RequestFrame, LENGTH_PREFIX_SIZE, MAX_FRAME_SIZE, MAX_ROUTE_LEN};
pub use message::{
    decode, encode, CtlRequest, CtlResponse, ErrorReply, FeedEvent, FeedMessage, FeedMessageType,
    InitRequest, Route, StateRequest, StateResponse,
};
pub use state::{
    EcoState, MetaState, NodeState, Progress, ServiceId, ServiceStatus, SyncMode, UserSettings,
};
