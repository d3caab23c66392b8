//! Media engine abstraction layer
//!
//! This module defines the trait an engine implementation must satisfy. The
//! endpoint crates know nothing about the concrete engine (a media server
//! client, an in-process pipeline, a test double); they only create nodes,
//! connect them and exchange SDP/ICE through this seam.
//!
//! # Example
//!
//! ```ignore
//! use roomcast_core::{MediaEngine, NodeHandle, Result};
//! use async_trait::async_trait;
//!
//! struct MyEngine {
//!     client: MediaServerClient,
//! }
//!
//! #[async_trait]
//! impl MediaEngine for MyEngine {
//!     async fn create_endpoint(&self) -> Result<NodeHandle> {
//!         self.client.build_webrtc_endpoint().await
//!     }
//!     // ...
//! }
//! ```

use std::fmt;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::events::MediaError;
use crate::Result;

/// Opaque handle to a node created by the media engine.
///
/// Handles are issued by the engine and only ever compared or passed back to
/// it; the endpoint layer attaches no meaning to the raw value.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct NodeHandle(u64);

impl NodeHandle {
    /// Wrap a raw engine-issued node id.
    pub fn new(raw: u64) -> Self {
        Self(raw)
    }

    /// The raw engine-issued id.
    pub fn raw(self) -> u64 {
        self.0
    }
}

impl fmt::Display for NodeHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "node#{}", self.0)
    }
}

/// Token returned when an error listener is registered on a node; consumed
/// when the listener is unregistered.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SubscriptionId(u64);

impl SubscriptionId {
    /// Wrap a raw engine-issued subscription id.
    pub fn new(raw: u64) -> Self {
        Self(raw)
    }
}

/// A trickle ICE candidate exchanged during transport negotiation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct IceCandidate {
    /// The candidate-attribute line
    pub candidate: String,
    /// Media stream identification tag
    pub sdp_mid: Option<String>,
    /// Index of the media description the candidate belongs to
    pub sdp_mline_index: Option<u16>,
}

/// Callback invoked for every candidate a node gathers locally.
///
/// Bodies must be forward-only (hand the candidate off to a channel); they
/// may run on engine-internal threads.
pub type CandidateCallback = Box<dyn Fn(IceCandidate) + Send + Sync>;

/// Callback invoked for every error event a node raises. Same forward-only
/// rule as [`CandidateCallback`].
pub type ErrorCallback = Box<dyn Fn(MediaError) + Send + Sync>;

/// Engine-agnostic media control interface
///
/// All engine implementations must implement this trait to host roomcast
/// endpoints.
///
/// # Thread Safety
///
/// Implementations must be Send + Sync; endpoints call into the engine from
/// whichever task currently holds their instance lock.
#[async_trait]
pub trait MediaEngine: Send + Sync {
    /// Create the transport node of a WebRTC endpoint.
    async fn create_endpoint(&self) -> Result<NodeHandle>;

    /// Create a passthrough node usable as a fan-out point.
    async fn create_passthrough(&self) -> Result<NodeHandle>;

    /// Process an SDP offer on a transport node, returning the SDP answer.
    ///
    /// # Errors
    ///
    /// * `Error::Engine` - the engine rejected the offer
    async fn process_offer(&self, node: NodeHandle, offer: &str) -> Result<String>;

    /// Start asynchronous candidate gathering on a transport node.
    async fn gather_candidates(&self, node: NodeHandle) -> Result<()>;

    /// Forward one remote candidate to a transport node.
    async fn add_remote_candidate(&self, node: NodeHandle, candidate: IceCandidate) -> Result<()>;

    /// Connect `src`'s media output to `dst`. Connections are additive and
    /// safe to issue repeatedly for the same pair.
    async fn connect(&self, src: NodeHandle, dst: NodeHandle) -> Result<()>;

    /// Irreversibly destroy a node. The handle is invalid afterwards.
    async fn release(&self, node: NodeHandle) -> Result<()>;

    /// Register `callback` for error events raised by `node`.
    async fn subscribe_errors(
        &self,
        node: NodeHandle,
        callback: ErrorCallback,
    ) -> Result<SubscriptionId>;

    /// Drop the error listener identified by `subscription`.
    async fn unsubscribe_errors(
        &self,
        node: NodeHandle,
        subscription: SubscriptionId,
    ) -> Result<()>;

    /// Register `callback` for candidates gathered locally by `node`.
    async fn on_local_candidate(
        &self,
        node: NodeHandle,
        callback: CandidateCallback,
    ) -> Result<()>;
}
