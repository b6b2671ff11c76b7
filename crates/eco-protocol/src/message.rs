//! Routes and payload types for the eco control plane
//!
//! A connection carries exactly one request. The client sends a
//! [`RequestFrame`](crate::frame::RequestFrame) naming a [`Route`]; the
//! daemon answers with one or more packets whose meaning is fixed by that
//! route:
//!
//! 1. `service_status`: one [`StateResponse`]
//! 2. `init`: a stream of [`Progress`] packets ending with a terminal report
//! 3. `sync`: an endless stream of [`FeedMessage`] packets
//! 4. `start_decrediton` / `start_dexc`: one empty packet or an [`ErrorReply`]
//! 5. `dcrctl`: one [`CtlResponse`]
//!
//! Payloads are bincode-encoded serde types.

use std::fmt;
use std::str::FromStr;

use bytes::Bytes;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};

use crate::error::ProtocolError;
use crate::state::{Progress, ServiceStatus};

/// Named operations served by the daemon
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Route {
    ServiceStatus,
    Init,
    Sync,
    StartDecrediton,
    StartDex,
    Ctl,
}

impl Route {
    /// Wire name of the route
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::ServiceStatus => "service_status",
            Self::Init => "init",
            Self::Sync => "sync",
            Self::StartDecrediton => "start_decrediton",
            Self::StartDex => "start_dexc",
            Self::Ctl => "dcrctl",
        }
    }
}

impl fmt::Display for Route {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Route {
    type Err = ProtocolError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "service_status" => Ok(Self::ServiceStatus),
            "init" => Ok(Self::Init),
            "sync" => Ok(Self::Sync),
            "start_decrediton" => Ok(Self::StartDecrediton),
            "start_dexc" => Ok(Self::StartDex),
            "dcrctl" => Ok(Self::Ctl),
            other => Err(ProtocolError::UnknownRoute(other.to_string())),
        }
    }
}

/// `service_status` request: which state to return
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StateRequest {
    /// `eco` for the aggregate state, or a service id
    pub service: String,
}

/// `service_status` response
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct StateResponse {
    /// Encoded state, empty for an unknown service
    pub state: Vec<u8>,
}

/// `init` request
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct InitRequest {
    /// Raw [`SyncMode`](crate::state::SyncMode) value, validated by the daemon
    pub sync_mode: u8,
    pub passphrase: Vec<u8>,
}

/// Error body for routes that answer with success or a message
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ErrorReply {
    pub message: String,
}

/// `dcrctl` request: a command line to forward
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CtlRequest {
    pub cmd: String,
}

/// `dcrctl` response
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CtlResponse {
    /// Non-empty when the command failed
    pub err: String,
    /// Combined command output
    pub body: String,
}

/// Feed message type tag
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[repr(u8)]
pub enum FeedMessageType {
    Invalid = 0,
    SyncStatusUpdate = 1,
    ServiceStatus = 2,
}

/// Envelope for everything pushed on the `sync` route
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FeedMessage {
    pub kind: FeedMessageType,
    /// Encoded [`Progress`] or [`ServiceStatus`], per `kind`
    pub contents: Vec<u8>,
}

/// A decoded feed message
#[derive(Debug, Clone, PartialEq)]
pub enum FeedEvent {
    Sync(Progress),
    Status(ServiceStatus),
}

impl FeedMessage {
    /// Wrap a sync progress update
    pub fn sync_update(progress: &Progress) -> Result<Self, ProtocolError> {
        Ok(Self {
            kind: FeedMessageType::SyncStatusUpdate,
            contents: bincode::serialize(progress)?,
        })
    }

    /// Wrap a service status change
    pub fn service_status(status: &ServiceStatus) -> Result<Self, ProtocolError> {
        Ok(Self {
            kind: FeedMessageType::ServiceStatus,
            contents: bincode::serialize(status)?,
        })
    }

    /// Decode the nested payload according to the type tag
    ///
    /// Returns None for [`FeedMessageType::Invalid`].
    pub fn event(&self) -> Result<Option<FeedEvent>, ProtocolError> {
        Ok(match self.kind {
            FeedMessageType::SyncStatusUpdate => {
                Some(FeedEvent::Sync(bincode::deserialize(&self.contents)?))
            }
            FeedMessageType::ServiceStatus => {
                Some(FeedEvent::Status(bincode::deserialize(&self.contents)?))
            }
            FeedMessageType::Invalid => None,
        })
    }
}

/// Encode a payload
pub fn encode<T: Serialize>(value: &T) -> Result<Bytes, ProtocolError> {
    Ok(Bytes::from(bincode::serialize(value)?))
}

/// Decode a payload
pub fn decode<T: DeserializeOwned>(bytes: &[u8]) -> Result<T, ProtocolError> {
    Ok(bincode::deserialize(bytes)?)
}
