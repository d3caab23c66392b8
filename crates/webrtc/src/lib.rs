//! Publisher-side WebRTC endpoint management for roomcast
//!
//! This crate implements the media-facing half of a publishing session on
//! top of an abstract [`roomcast_core::MediaEngine`]:
//!
//! - an endpoint adapter that creates the engine-side transport node lazily
//!   and buffers trickled remote candidates until it exists;
//! - a publisher endpoint that owns an ordered chain of shaper elements
//!   between the transport node and a fan-out point, with runtime insertion
//!   and removal that keeps the stream path wired.
//!
//! All state of one endpoint sits behind a single async mutex, so publish,
//! candidate delivery and chain mutations are mutually exclusive per
//! endpoint instance.

pub mod endpoint;

pub use endpoint::publisher::{MediaShaping, PublisherEndpoint, Shaper};
