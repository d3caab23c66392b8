//! Event types delivered from an endpoint to its owning session
//!
//! Endpoints never talk to the signalling plane directly; they emit these
//! events on an unbounded channel injected at construction and the session
//! layer decides how to deliver them to the remote peer.

use serde::{Deserialize, Serialize};

use crate::engine::IceCandidate;

/// An error event raised by a media node.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MediaError {
    /// Engine-specific error code
    pub error_code: i32,
    /// Human-readable description
    pub description: String,
}

/// Events an endpoint forwards to the session that owns it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum EndpointEvent {
    /// A locally gathered candidate that must be signalled to the remote peer
    LocalCandidate {
        /// Participant that owns the endpoint
        participant: String,
        /// Name of the endpoint the candidate was gathered on
        endpoint: String,
        /// The gathered candidate
        candidate: IceCandidate,
    },

    /// An error raised by one of the endpoint's media nodes
    MediaError {
        /// Participant that owns the endpoint
        participant: String,
        /// Name of the endpoint the failing node belongs to
        endpoint: String,
        /// The error event
        error: MediaError,
    },
}

/// Sender half used by endpoints to emit [`EndpointEvent`]s.
pub type EventSender = tokio::sync::mpsc::UnboundedSender<EndpointEvent>;
