//! Core abstractions for the roomcast publisher SDK
//!
//! This crate carries everything the endpoint crates share: the
//! [`MediaEngine`] trait hiding the concrete media server, the error types
//! and the events an endpoint emits toward its owning session. Transport
//! crates depend on roomcast-core and implement or consume these seams; the
//! core knows nothing about any specific engine.

pub mod engine;
pub mod error;
pub mod events;

pub use engine::{
    CandidateCallback, ErrorCallback, IceCandidate, MediaEngine, NodeHandle, SubscriptionId,
};
pub use error::{Error, Result};
pub use events::{EndpointEvent, EventSender, MediaError};
