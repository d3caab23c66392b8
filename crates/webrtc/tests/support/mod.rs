//! Test doubles for the media engine seam.

use std::collections::{HashMap, HashSet};

use async_trait::async_trait;
use parking_lot::Mutex;
use roomcast_core::{
    CandidateCallback, Error, ErrorCallback, IceCandidate, MediaEngine, MediaError, NodeHandle,
    Result, SubscriptionId,
};

/// In-memory engine that records every operation it is asked to perform.
#[derive(Default)]
pub struct MockEngine {
    state: Mutex<MockState>,
}

#[derive(Default)]
struct MockState {
    next_node: u64,
    next_subscription: u64,
    endpoints: Vec<NodeHandle>,
    passthroughs: Vec<NodeHandle>,
    connects: Vec<(NodeHandle, NodeHandle)>,
    released: HashSet<NodeHandle>,
    candidates: HashMap<NodeHandle, Vec<IceCandidate>>,
    offers: Vec<(NodeHandle, String)>,
    gathering: HashSet<NodeHandle>,
    error_listeners: HashMap<SubscriptionId, (NodeHandle, ErrorCallback)>,
    candidate_listeners: HashMap<NodeHandle, Vec<CandidateCallback>>,
    unsubscribes: Vec<SubscriptionId>,
}

impl MockEngine {
    pub fn new() -> Self {
        Self::default()
    }

    fn issue_node(state: &mut MockState) -> NodeHandle {
        state.next_node += 1;
        NodeHandle::new(state.next_node)
    }

    /// Creates a standalone processing node, the way a session layer builds
    /// filter elements before applying them to a publisher.
    pub fn create_element(&self) -> NodeHandle {
        Self::issue_node(&mut self.state.lock())
    }

    pub fn endpoints(&self) -> Vec<NodeHandle> {
        self.state.lock().endpoints.clone()
    }

    pub fn passthroughs(&self) -> Vec<NodeHandle> {
        self.state.lock().passthroughs.clone()
    }

    pub fn connects(&self) -> Vec<(NodeHandle, NodeHandle)> {
        self.state.lock().connects.clone()
    }

    pub fn candidates_for(&self, node: NodeHandle) -> Vec<IceCandidate> {
        self.state
            .lock()
            .candidates
            .get(&node)
            .cloned()
            .unwrap_or_default()
    }

    pub fn offers(&self) -> Vec<(NodeHandle, String)> {
        self.state.lock().offers.clone()
    }

    pub fn is_released(&self, node: NodeHandle) -> bool {
        self.state.lock().released.contains(&node)
    }

    pub fn is_gathering(&self, node: NodeHandle) -> bool {
        self.state.lock().gathering.contains(&node)
    }

    pub fn subscriptions_created(&self) -> usize {
        self.state.lock().next_subscription as usize
    }

    pub fn unsubscribe_count(&self) -> usize {
        self.state.lock().unsubscribes.len()
    }

    /// Fires an error event on `node`, as the engine would from one of its
    /// internal threads.
    pub fn raise_error(&self, node: NodeHandle, error: MediaError) {
        let state = self.state.lock();
        for (listener_node, callback) in state.error_listeners.values() {
            if *listener_node == node {
                callback(error.clone());
            }
        }
    }

    /// Fires a locally gathered candidate on `node`.
    pub fn emit_local_candidate(&self, node: NodeHandle, candidate: IceCandidate) {
        let state = self.state.lock();
        if let Some(callbacks) = state.candidate_listeners.get(&node) {
            for callback in callbacks {
                callback(candidate.clone());
            }
        }
    }
}

#[async_trait]
impl MediaEngine for MockEngine {
    async fn create_endpoint(&self) -> Result<NodeHandle> {
        let mut state = self.state.lock();
        let node = Self::issue_node(&mut state);
        state.endpoints.push(node);
        Ok(node)
    }

    async fn create_passthrough(&self) -> Result<NodeHandle> {
        let mut state = self.state.lock();
        let node = Self::issue_node(&mut state);
        state.passthroughs.push(node);
        Ok(node)
    }

    async fn process_offer(&self, node: NodeHandle, offer: &str) -> Result<String> {
        let mut state = self.state.lock();
        state.offers.push((node, offer.to_string()));
        Ok(format!("answer:{offer}"))
    }

    async fn gather_candidates(&self, node: NodeHandle) -> Result<()> {
        self.state.lock().gathering.insert(node);
        Ok(())
    }

    async fn add_remote_candidate(&self, node: NodeHandle, candidate: IceCandidate) -> Result<()> {
        self.state
            .lock()
            .candidates
            .entry(node)
            .or_default()
            .push(candidate);
        Ok(())
    }

    async fn connect(&self, src: NodeHandle, dst: NodeHandle) -> Result<()> {
        let mut state = self.state.lock();
        if state.released.contains(&src) || state.released.contains(&dst) {
            return Err(Error::Engine(format!(
                "connect {src} -> {dst} touches a released node"
            )));
        }
        state.connects.push((src, dst));
        Ok(())
    }

    async fn release(&self, node: NodeHandle) -> Result<()> {
        self.state.lock().released.insert(node);
        Ok(())
    }

    async fn subscribe_errors(
        &self,
        node: NodeHandle,
        callback: ErrorCallback,
    ) -> Result<SubscriptionId> {
        let mut state = self.state.lock();
        state.next_subscription += 1;
        let id = SubscriptionId::new(state.next_subscription);
        state.error_listeners.insert(id, (node, callback));
        Ok(id)
    }

    async fn unsubscribe_errors(
        &self,
        node: NodeHandle,
        subscription: SubscriptionId,
    ) -> Result<()> {
        let mut state = self.state.lock();
        state.unsubscribes.push(subscription);
        match state.error_listeners.remove(&subscription) {
            Some(_) => Ok(()),
            None => Err(Error::Engine(format!("unknown subscription on {node}"))),
        }
    }

    async fn on_local_candidate(
        &self,
        node: NodeHandle,
        callback: CandidateCallback,
    ) -> Result<()> {
        self.state
            .lock()
            .candidate_listeners
            .entry(node)
            .or_default()
            .push(callback);
        Ok(())
    }
}
