//! Publisher endpoint with a runtime-mutable shaper chain
//!
//! A publisher's media flows from its transport node through an ordered
//! chain of shaper elements into a fan-out node, from which any number of
//! downstream consumers (the publisher's own loopback included) are fed.
//!
//! The chain is mutable at runtime: [`MediaShaping::apply`] inserts a shaper
//! at the position nearest the transport node, [`MediaShaping::revert`]
//! removes one and rejoins its neighbours. Wiring of the full path happens
//! once, on the first connect, and is never undone; later mutations only
//! add the edges around the affected element. Re-connecting does not pause
//! the stream, so a mutation can briefly leave both the old and the new
//! path carrying signal.
//!
//! Every operation takes the endpoint's single mutex for its full duration,
//! engine calls included, so concurrent publishes, candidate deliveries and
//! chain mutations serialize per endpoint.

use std::collections::{HashMap, VecDeque};
use std::sync::Arc;

use async_trait::async_trait;
use roomcast_core::{
    Error, EventSender, IceCandidate, MediaEngine, NodeHandle, Result, SubscriptionId,
};
use tokio::sync::Mutex;
use tracing::{debug, info, warn};

use super::TrickleEndpoint;

/// A processing element to insert into a publisher's media path, identified
/// by a caller-supplied unique id.
#[derive(Debug, Clone)]
pub struct Shaper {
    id: String,
    node: NodeHandle,
}

impl Shaper {
    pub fn new(id: impl Into<String>, node: NodeHandle) -> Self {
        Self {
            id: id.into(),
            node,
        }
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn node(&self) -> NodeHandle {
        self.node
    }
}

/// Runtime insertion and removal of shapers on a media path.
#[async_trait]
pub trait MediaShaping {
    /// Inserts `shaper` nearest the media source. Returns the shaper's id.
    ///
    /// # Errors
    ///
    /// * `Error::AlreadyExists` - a chain element with the same id exists
    async fn apply(&self, shaper: Shaper) -> Result<String>;

    /// Removes the shaper with the given id, releasing its node and
    /// rejoining its neighbours.
    ///
    /// # Errors
    ///
    /// * `Error::NotFound` - no chain element with that id
    async fn revert(&self, shaper_id: &str) -> Result<()>;
}

/// Shaper chain bookkeeping. `order` keeps chain positions (front = nearest
/// the transport node, i.e. the most recently applied element); `elements`
/// gives O(1) id lookup.
#[derive(Default)]
struct ChainState {
    fanout: Option<NodeHandle>,
    fanout_subscription: Option<SubscriptionId>,
    elements: HashMap<String, NodeHandle>,
    order: VecDeque<String>,
    subscriptions: HashMap<String, SubscriptionId>,
    /// One-way latch, flipped by the first chain wiring.
    connected: bool,
}

impl ChainState {
    fn element(&self, id: &str) -> Result<NodeHandle> {
        self.elements
            .get(id)
            .copied()
            .ok_or_else(|| Error::InvalidState(format!("no media element with id {id}")))
    }

    fn require_fanout(&self, endpoint: &str) -> Result<NodeHandle> {
        self.fanout
            .ok_or_else(|| Error::InvalidState(format!("endpoint {endpoint} has no fan-out node")))
    }

    /// Id of the element immediately closer to the fan-out node, if any.
    fn next_of(&self, id: &str) -> Option<&str> {
        let idx = self.order.iter().position(|e| e == id)?;
        self.order.get(idx + 1).map(String::as_str)
    }

    /// Id of the element immediately closer to the transport node, if any.
    fn previous_of(&self, id: &str) -> Option<&str> {
        let idx = self.order.iter().position(|e| e == id)?;
        idx.checked_sub(1)
            .and_then(|i| self.order.get(i))
            .map(String::as_str)
    }

    fn remove(&mut self, id: &str) {
        self.order.retain(|e| e != id);
        self.elements.remove(id);
        self.subscriptions.remove(id);
    }
}

struct Inner {
    base: TrickleEndpoint,
    chain: ChainState,
}

/// Publisher endpoint: the transport node plus the shaper chain feeding its
/// fan-out point.
pub struct PublisherEndpoint {
    participant: String,
    name: String,
    inner: Mutex<Inner>,
}

impl PublisherEndpoint {
    /// Creates an endpoint for `participant`. No engine-side node exists
    /// until [`create_endpoint`](Self::create_endpoint) runs; candidates
    /// arriving before that are buffered.
    pub fn new(
        participant: impl Into<String>,
        name: impl Into<String>,
        engine: Arc<dyn MediaEngine>,
        events: EventSender,
    ) -> Self {
        let participant = participant.into();
        let name = name.into();
        let base = TrickleEndpoint::new(engine, events, participant.clone(), name.clone());
        Self {
            participant,
            name,
            inner: Mutex::new(Inner {
                base,
                chain: ChainState::default(),
            }),
        }
    }

    /// Participant that owns this endpoint.
    pub fn participant(&self) -> &str {
        &self.participant
    }

    /// Name of this endpoint (as indicated by the publishing client).
    pub fn name(&self) -> &str {
        &self.name
    }

    /// The engine-side transport node, once created.
    pub async fn node(&self) -> Option<NodeHandle> {
        self.inner.lock().await.base.node()
    }

    /// Lazily creates the transport node and the fan-out node, registers
    /// their error listeners and flushes buffered remote candidates into the
    /// new node in arrival order.
    ///
    /// Returns the transport node that existed before the call; `None` means
    /// this call performed the creation. Concurrent callers serialize on the
    /// endpoint mutex, so exactly one of them creates.
    pub async fn create_endpoint(&self) -> Result<Option<NodeHandle>> {
        let mut inner = self.inner.lock().await;
        let Inner { base, chain } = &mut *inner;
        if let Some(existing) = base.create_node().await? {
            return Ok(Some(existing));
        }
        let engine = Arc::clone(base.engine());
        let fanout = engine.create_passthrough().await?;
        chain.fanout_subscription = Some(base.subscribe_node_errors(fanout).await?);
        chain.fanout = Some(fanout);
        base.flush_candidates().await?;
        info!(
            "Publisher endpoint {} of {} initialized",
            self.name, self.participant
        );
        Ok(None)
    }

    /// Adds a remote candidate, buffering it while the transport node does
    /// not exist yet.
    pub async fn add_ice_candidate(&self, candidate: IceCandidate) -> Result<()> {
        let mut inner = self.inner.lock().await;
        inner.base.add_candidate(candidate).await
    }

    /// Performs the publish handshake: installs candidate forwarding, wires
    /// the chain (first time) with the fan-out looped back onto the
    /// transport node, processes the offer and starts candidate gathering.
    pub async fn publish(&self, offer: &str) -> Result<String> {
        let mut inner = self.inner.lock().await;
        let Inner { base, chain } = &mut *inner;
        base.register_candidate_forwarding().await?;
        let loopback = base.require_node()?;
        Self::connect_sink(base, chain, loopback).await?;
        let answer = base.process_offer(offer).await?;
        base.gather_candidates().await?;
        info!(
            "Publisher endpoint {} of {} published",
            self.name, self.participant
        );
        Ok(answer)
    }

    /// Connects the publisher's fan-out node to `sink`, wiring the chain
    /// between the transport node and the fan-out first if that never
    /// happened. Wiring runs at most once; later calls only add the new
    /// outbound edge.
    pub async fn connect(&self, sink: NodeHandle) -> Result<()> {
        let mut inner = self.inner.lock().await;
        let Inner { base, chain } = &mut *inner;
        Self::connect_sink(base, chain, sink).await
    }

    /// All media nodes created for this publisher except the transport node
    /// itself; includes the fan-out node once the endpoint is initialized.
    pub async fn media_elements(&self) -> Vec<NodeHandle> {
        let inner = self.inner.lock().await;
        let chain = &inner.chain;
        let mut nodes: Vec<NodeHandle> = chain
            .order
            .iter()
            .filter_map(|id| chain.elements.get(id).copied())
            .collect();
        nodes.extend(chain.fanout);
        nodes
    }

    /// Drops every error subscription this endpoint registered: the
    /// transport node's, the fan-out node's and each shaper's. Safe to call
    /// repeatedly; failures are logged and do not stop the remaining
    /// unregistrations.
    pub async fn unregister_error_listeners(&self) {
        let mut inner = self.inner.lock().await;
        let Inner { base, chain } = &mut *inner;
        base.unregister_error_listener().await;
        let engine = Arc::clone(base.engine());
        if let (Some(fanout), Some(subscription)) = (chain.fanout, chain.fanout_subscription.take())
        {
            if let Err(err) = engine.unsubscribe_errors(fanout, subscription).await {
                warn!(
                    "Failed to unsubscribe fan-out error listener on endpoint {}: {}",
                    base.name(),
                    err
                );
            }
        }
        let ids: Vec<String> = chain.subscriptions.keys().cloned().collect();
        for id in ids {
            let Some(subscription) = chain.subscriptions.remove(&id) else {
                continue;
            };
            let Ok(node) = chain.element(&id) else {
                continue;
            };
            if let Err(err) = engine.unsubscribe_errors(node, subscription).await {
                warn!(
                    "Failed to unsubscribe error listener for shaper {} on endpoint {}: {}",
                    id,
                    base.name(),
                    err
                );
            }
        }
    }

    async fn connect_sink(
        base: &TrickleEndpoint,
        chain: &mut ChainState,
        sink: NodeHandle,
    ) -> Result<()> {
        if !chain.connected {
            Self::wire_chain(base, chain).await?;
        }
        let fanout = chain.require_fanout(base.name())?;
        base.engine().connect(fanout, sink).await
    }

    /// One-time wiring of the full path: the transport node through every
    /// registered shaper, most recently applied first, into the fan-out
    /// node.
    async fn wire_chain(base: &TrickleEndpoint, chain: &mut ChainState) -> Result<()> {
        let node = base.require_node()?;
        let fanout = chain.require_fanout(base.name())?;
        let engine = Arc::clone(base.engine());
        let mut cursor = node;
        for id in &chain.order {
            let element = chain.element(id)?;
            engine.connect(cursor, element).await?;
            cursor = element;
        }
        engine.connect(cursor, fanout).await?;
        chain.connected = true;
        debug!(
            "Wired {} shaper(s) between {} and {} on endpoint {}",
            chain.order.len(),
            node,
            fanout,
            base.name()
        );
        Ok(())
    }
}

#[async_trait]
impl MediaShaping for PublisherEndpoint {
    async fn apply(&self, shaper: Shaper) -> Result<String> {
        let mut inner = self.inner.lock().await;
        let Inner { base, chain } = &mut *inner;
        if chain.elements.contains_key(shaper.id()) {
            return Err(Error::AlreadyExists(format!(
                "endpoint {} already has a media element with id {}",
                base.name(),
                shaper.id()
            )));
        }
        let Shaper { id, node } = shaper;
        if chain.connected {
            let engine = Arc::clone(base.engine());
            let upstream = match chain.order.front() {
                Some(head) => chain.element(head)?,
                None => base.require_node()?,
            };
            let fanout = chain.require_fanout(base.name())?;
            engine.connect(upstream, node).await?;
            engine.connect(node, fanout).await?;
        }
        let subscription = base.subscribe_node_errors(node).await?;
        chain.order.push_front(id.clone());
        chain.elements.insert(id.clone(), node);
        chain.subscriptions.insert(id.clone(), subscription);
        info!("Applied shaper {} ({}) on endpoint {}", id, node, base.name());
        Ok(id)
    }

    async fn revert(&self, shaper_id: &str) -> Result<()> {
        let mut inner = self.inner.lock().await;
        let Inner { base, chain } = &mut *inner;
        let Some(node) = chain.elements.get(shaper_id).copied() else {
            return Err(Error::NotFound(format!(
                "endpoint {} has no media element with id {}",
                base.name(),
                shaper_id
            )));
        };
        let engine = Arc::clone(base.engine());
        if let Some(subscription) = chain.subscriptions.remove(shaper_id) {
            if let Err(err) = engine.unsubscribe_errors(node, subscription).await {
                warn!(
                    "Failed to unsubscribe error listener for shaper {} on endpoint {}: {}",
                    shaper_id,
                    base.name(),
                    err
                );
            }
        }
        // Rejoin edge resolved before the element leaves the order list.
        let rejoin = if chain.connected {
            let next = match chain.next_of(shaper_id) {
                Some(next_id) => chain.element(next_id)?,
                None => chain.require_fanout(base.name())?,
            };
            let prev = match chain.previous_of(shaper_id) {
                Some(prev_id) => chain.element(prev_id)?,
                None => base.require_node()?,
            };
            Some((next, prev))
        } else {
            None
        };
        // Bookkeeping goes first: even a failed release must never leave the
        // handle reachable from a future rewiring.
        chain.remove(shaper_id);
        engine.release(node).await?;
        if let Some((next, prev)) = rejoin {
            engine.connect(next, prev).await?;
        }
        info!(
            "Reverted shaper {} ({}) on endpoint {}",
            shaper_id,
            node,
            base.name()
        );
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn chain_with(ids: &[&str]) -> ChainState {
        let mut chain = ChainState::default();
        for (i, id) in ids.iter().enumerate() {
            chain.order.push_back(id.to_string());
            chain
                .elements
                .insert(id.to_string(), NodeHandle::new(100 + i as u64));
        }
        chain
    }

    #[test]
    fn neighbours_of_middle_element() {
        let chain = chain_with(&["c", "b", "a"]);
        assert_eq!(chain.next_of("b"), Some("a"));
        assert_eq!(chain.previous_of("b"), Some("c"));
    }

    #[test]
    fn head_has_no_previous_and_tail_no_next() {
        let chain = chain_with(&["c", "b", "a"]);
        assert_eq!(chain.previous_of("c"), None);
        assert_eq!(chain.next_of("a"), None);
    }

    #[test]
    fn neighbours_of_unknown_id_are_none() {
        let chain = chain_with(&["c"]);
        assert_eq!(chain.next_of("x"), None);
        assert_eq!(chain.previous_of("x"), None);
    }

    #[test]
    fn remove_keeps_the_rest_in_order() {
        let mut chain = chain_with(&["c", "b", "a"]);
        chain.remove("b");
        let order: Vec<&str> = chain.order.iter().map(String::as_str).collect();
        assert_eq!(order, ["c", "a"]);
        assert!(chain.elements.get("b").is_none());
        assert_eq!(chain.next_of("c"), Some("a"));
    }
}
