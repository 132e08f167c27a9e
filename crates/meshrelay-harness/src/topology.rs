//! In-memory multi-node mesh topology simulator.
//!
//! Wires a fixed graph of [`MeshEngine`] instances together directly: a
//! node's [`MeshAction::Broadcast`] output is handed straight to its
//! neighbors' `receive`, translating this node's outgoing peer-slot index
//! into whatever slot index the *neighbor* uses for this node, exactly as
//! the real peer table in `meshrelay-node` would if every socket write
//! landed instantly and in order. No bytes cross an actual socket; this
//! exists to exercise TTL, dedup, and relay/source-exclusion across real
//! multi-hop topologies (the scenarios in spec.md's end-to-end section)
//! without the cost or nondeterminism of real networking.

use std::collections::VecDeque;

use meshrelay_core::{MeshAction, MeshConfig, MeshEngine, MeshStats};
use meshrelay_crypto::{NONCE_LEN, derive_mesh_key};

use crate::SimEnv;

/// A message delivered to the local user on some node.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeliveredMessage {
    /// Index of the node that delivered this message.
    pub node: usize,
    /// That node's display name.
    pub name: String,
    /// Decrypted message bytes.
    pub plaintext: Vec<u8>,
    /// Hops the packet took before reaching this node.
    pub hops: u8,
}

/// A fixed graph of mesh nodes, each running its own [`MeshEngine`].
pub struct SimMesh {
    env: SimEnv,
    names: Vec<String>,
    engines: Vec<MeshEngine>,
    /// `adjacency[node][slot]` is the neighbor node index occupying that
    /// node's peer-slot `slot`. Slot indices are positions in this vec, so
    /// they line up with the `except`/`source` indices `MeshEngine` uses.
    adjacency: Vec<Vec<usize>>,
}

impl SimMesh {
    /// Build a mesh of `names.len()` nodes connected by `edges`
    /// (undirected, `(a, b)` connects node `a` to node `b`), all sharing one
    /// mesh key and `config`.
    #[must_use]
    pub fn new(env: SimEnv, names: &[&str], edges: &[(usize, usize)], config: MeshConfig) -> Self {
        let key = derive_mesh_key("meshrelay-harness/sim-mesh/v1");
        let engines = names.iter().map(|_| MeshEngine::new(key.clone(), config)).collect();
        let mut adjacency = vec![Vec::new(); names.len()];
        for &(a, b) in edges {
            adjacency[a].push(b);
            adjacency[b].push(a);
        }
        Self { env, names: names.iter().map(|&s| s.to_string()).collect(), engines, adjacency }
    }

    fn slot_of(&self, node: usize, neighbor: usize) -> usize {
        // INVARIANT: `edges` only ever connects nodes that appear in `names`,
        // so every neighbor recorded in `adjacency` has a reciprocal entry.
        #[allow(clippy::expect_used)]
        self.adjacency[node].iter().position(|&n| n == neighbor).expect("edges must be symmetric")
    }

    /// Originate `message` from `origin` and drive it through the mesh
    /// until every triggered relay has settled. Returns every local
    /// delivery that resulted, across every node.
    ///
    /// # Panics
    ///
    /// Panics if `message` does not fit the engine's payload budget; tests
    /// are expected to size their fixtures within [`meshrelay_core::mesh::MAX_MESSAGE_LEN`].
    pub fn send(&mut self, origin: usize, message: &[u8]) -> Vec<DeliveredMessage> {
        let mut nonce = [0u8; NONCE_LEN];
        self.env.random_bytes(&mut nonce);
        let mut random_id = [0u8; 8];
        self.env.random_bytes(&mut random_id);

        let now = self.env.wall_clock_secs();
        // INVARIANT: callers size fixtures within MAX_MESSAGE_LEN.
        #[allow(clippy::expect_used)]
        let actions = self.engines[origin].send(message, now, nonce, random_id).expect("message fits payload budget");

        self.drive(origin, actions)
    }

    /// Run [`SimEnv::advance`] then [`meshrelay_core::MeshEngine::prune_seen`] on
    /// every node, as the real event loop's periodic maintenance tick does.
    pub fn advance_and_prune(&mut self, secs: u64) {
        self.env.advance(secs);
        let now = self.env.wall_clock_secs();
        for engine in &mut self.engines {
            engine.prune_seen(now);
        }
    }

    /// Current counters for `node`.
    #[must_use]
    pub fn stats(&self, node: usize) -> MeshStats {
        self.engines[node].stats()
    }

    fn drive(&mut self, from: usize, actions: Vec<MeshAction>) -> Vec<DeliveredMessage> {
        let mut delivered = Vec::new();
        let mut queue = VecDeque::new();
        self.fan_out(from, actions, &mut queue, &mut delivered);

        while let Some((target, wire, source_slot)) = queue.pop_front() {
            let now = self.env.wall_clock_secs();
            let actions = self.engines[target].receive(&wire, source_slot, now);
            self.fan_out(target, actions, &mut queue, &mut delivered);
        }

        delivered
    }

    fn fan_out(
        &self,
        node: usize,
        actions: Vec<MeshAction>,
        queue: &mut VecDeque<(usize, Vec<u8>, usize)>,
        delivered: &mut Vec<DeliveredMessage>,
    ) {
        for action in actions {
            match action {
                MeshAction::Broadcast { wire, except } => {
                    for (slot, &neighbor) in self.adjacency[node].iter().enumerate() {
                        if Some(slot) == except {
                            continue;
                        }
                        let source_slot_at_neighbor = self.slot_of(neighbor, node);
                        queue.push_back((neighbor, wire.clone(), source_slot_at_neighbor));
                    }
                },
                MeshAction::Deliver { plaintext, hops } => {
                    delivered.push(DeliveredMessage { node, name: self.names[node].clone(), plaintext, hops });
                },
                MeshAction::Log { .. } => {},
            }
        }
    }
}
