//! WebRTC endpoint adapter with trickle-ICE buffering
//!
//! [`TrickleEndpoint`] wraps the engine-side transport node of one WebRTC
//! endpoint. Remote candidates can arrive over signalling before the node
//! exists; they are buffered and flushed into the node, in arrival order,
//! the moment it is created. The adapter also owns the node's error-listener
//! subscription and the pass-throughs for offer processing and candidate
//! gathering.
//!
//! The adapter carries no lock of its own: [`publisher::PublisherEndpoint`]
//! embeds it behind the per-endpoint mutex, which is what makes candidate
//! buffering, node creation and chain mutations mutually exclusive.

pub mod publisher;

use std::collections::VecDeque;
use std::sync::Arc;

use roomcast_core::{
    EndpointEvent, Error, EventSender, IceCandidate, MediaEngine, NodeHandle, Result,
    SubscriptionId,
};
use tracing::{debug, warn};

/// Transport-node state of one endpoint: lazy creation, candidate buffering
/// and error-listener bookkeeping.
pub(crate) struct TrickleEndpoint {
    engine: Arc<dyn MediaEngine>,
    events: EventSender,
    participant: String,
    name: String,
    node: Option<NodeHandle>,
    node_subscription: Option<SubscriptionId>,
    pending: VecDeque<IceCandidate>,
}

impl TrickleEndpoint {
    pub(crate) fn new(
        engine: Arc<dyn MediaEngine>,
        events: EventSender,
        participant: String,
        name: String,
    ) -> Self {
        Self {
            engine,
            events,
            participant,
            name,
            node: None,
            node_subscription: None,
            pending: VecDeque::new(),
        }
    }

    pub(crate) fn engine(&self) -> &Arc<dyn MediaEngine> {
        &self.engine
    }

    pub(crate) fn name(&self) -> &str {
        &self.name
    }

    pub(crate) fn node(&self) -> Option<NodeHandle> {
        self.node
    }

    /// Creates the transport node and its error subscription if absent.
    ///
    /// Returns the handle that existed before the call, `None` when this
    /// call performed the creation. Buffered candidates are flushed
    /// separately, after the caller finished initializing any companion
    /// nodes (see [`flush_candidates`](Self::flush_candidates)).
    pub(crate) async fn create_node(&mut self) -> Result<Option<NodeHandle>> {
        if let Some(existing) = self.node {
            return Ok(Some(existing));
        }
        let node = self.engine.create_endpoint().await?;
        let subscription = self.subscribe_node_errors(node).await?;
        self.node = Some(node);
        self.node_subscription = Some(subscription);
        debug!(
            "Created transport node {} for endpoint {} of {}",
            node, self.name, self.participant
        );
        Ok(None)
    }

    /// Flushes buffered remote candidates into the node, in arrival order.
    /// Delivery failures surface immediately; the failed candidate is not
    /// retried.
    pub(crate) async fn flush_candidates(&mut self) -> Result<()> {
        let node = self.require_node()?;
        let buffered = self.pending.len();
        while let Some(candidate) = self.pending.pop_front() {
            self.engine.add_remote_candidate(node, candidate).await?;
        }
        if buffered > 0 {
            debug!(
                "Flushed {} buffered candidate(s) into {} on endpoint {}",
                buffered, node, self.name
            );
        }
        Ok(())
    }

    /// Forwards a remote candidate to the node, or buffers it while the node
    /// does not exist yet.
    pub(crate) async fn add_candidate(&mut self, candidate: IceCandidate) -> Result<()> {
        match self.node {
            Some(node) => self.engine.add_remote_candidate(node, candidate).await,
            None => {
                debug!(
                    "Buffering remote candidate for endpoint {} (no transport node yet)",
                    self.name
                );
                self.pending.push_back(candidate);
                Ok(())
            }
        }
    }

    pub(crate) async fn process_offer(&self, offer: &str) -> Result<String> {
        let node = self.require_node()?;
        self.engine.process_offer(node, offer).await
    }

    pub(crate) async fn gather_candidates(&self) -> Result<()> {
        let node = self.require_node()?;
        self.engine.gather_candidates(node).await
    }

    /// Installs the listener that forwards every locally gathered candidate
    /// to the owning session.
    pub(crate) async fn register_candidate_forwarding(&self) -> Result<()> {
        let node = self.require_node()?;
        let events = self.events.clone();
        let participant = self.participant.clone();
        let endpoint = self.name.clone();
        self.engine
            .on_local_candidate(
                node,
                Box::new(move |candidate| {
                    let _ = events.send(EndpointEvent::LocalCandidate {
                        participant: participant.clone(),
                        endpoint: endpoint.clone(),
                        candidate,
                    });
                }),
            )
            .await
    }

    /// Registers the error listener that forwards error events from `node`
    /// to the owning session. Used for the transport node, the fan-out node
    /// and every shaper.
    pub(crate) async fn subscribe_node_errors(&self, node: NodeHandle) -> Result<SubscriptionId> {
        let events = self.events.clone();
        let participant = self.participant.clone();
        let endpoint = self.name.clone();
        self.engine
            .subscribe_errors(
                node,
                Box::new(move |error| {
                    let _ = events.send(EndpointEvent::MediaError {
                        participant: participant.clone(),
                        endpoint: endpoint.clone(),
                        error,
                    });
                }),
            )
            .await
    }

    /// Drops the transport node's error subscription. A no-op when the node
    /// was never created or the subscription is already gone.
    pub(crate) async fn unregister_error_listener(&mut self) {
        let (Some(node), Some(subscription)) = (self.node, self.node_subscription.take()) else {
            return;
        };
        if let Err(err) = self.engine.unsubscribe_errors(node, subscription).await {
            warn!(
                "Failed to unsubscribe error listener on {} of endpoint {}: {}",
                node, self.name, err
            );
        }
    }

    pub(crate) fn require_node(&self) -> Result<NodeHandle> {
        self.node.ok_or_else(|| {
            Error::InvalidState(format!("endpoint {} has no transport node", self.name))
        })
    }
}
