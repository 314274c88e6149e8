//! Deterministic simulation runner.
//!
//! Every replica is a [`DynBftState`] with its own mempool. Messages are
//! delivered through [`SimulatedNetwork`], timers are queue entries, and
//! payload requests are answered inline from the node's mempool.

use crate::event_queue::EventKey;
use crate::network::{NetworkConfig, SimulatedNetwork};
use crate::NodeIndex;
use canopy_bft::{BftConfig, DynBftState};
use canopy_core::{Action, Event, Mempool, QueueMempool, StateMachine, TimerId};
use canopy_messages::ConsensusMessage;
use canopy_types::{
    Block, KeyError, KeyPair, KeyType, StaticTopology, ValidatorId, ValidatorInfo, ValidatorSet,
};
use rand::SeedableRng;
use rand_chacha::ChaCha8Rng;
use std::collections::{BTreeMap, BTreeSet, HashMap};
use std::time::Duration;
use tracing::{debug, error, info, trace, warn};

/// Errors from building or checking a simulation.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum SimulationError {
    /// A validator key could not be derived.
    #[error("key derivation failed: {0}")]
    Key(#[from] KeyError),

    /// One config per node is required.
    #[error("expected {expected} node configs, got {actual}")]
    ConfigCount {
        /// Nodes in the network.
        expected: usize,
        /// Configs supplied.
        actual: usize,
    },

    /// Two replicas committed different blocks at the same position.
    #[error("nodes {a} and {b} diverge at committed position {position}")]
    Divergence {
        /// First node.
        a: NodeIndex,
        /// Second node.
        b: NodeIndex,
        /// Index into the committed sequence.
        position: usize,
    },
}

/// Deterministic simulation runner.
///
/// Processes events in deterministic order and executes actions.
/// Given the same seed, produces identical results every run.
pub struct SimulationRunner {
    /// All nodes in the simulation, indexed by NodeIndex.
    nodes: Vec<DynBftState>,

    /// Per-node payload source.
    mempools: Vec<QueueMempool>,

    /// Blocks each node committed, in commit order.
    committed: Vec<Vec<Block>>,

    /// Number of blocks each node discarded as forked.
    forked: Vec<u64>,

    /// Nodes that stopped processing events.
    crashed: BTreeSet<NodeIndex>,

    /// Global event queue, ordered deterministically.
    event_queue: BTreeMap<EventKey, Event>,

    /// Sequence counter for deterministic ordering.
    sequence: u64,

    /// Current simulation time.
    now: Duration,

    /// Network simulator.
    network: SimulatedNetwork,

    /// RNG for network conditions (seeded for determinism).
    rng: ChaCha8Rng,

    /// Timer registry for cancellation support.
    /// Maps (node, timer_id) -> event_key for removal.
    timers: HashMap<(NodeIndex, TimerId), EventKey>,

    /// Statistics.
    stats: SimulationStats,
}

/// Statistics collected during simulation.
#[derive(Debug, Default, Clone)]
pub struct SimulationStats {
    /// Total events processed.
    pub events_processed: u64,
    /// Events processed by priority class.
    pub events_by_priority: [u64; 3],
    /// Events discarded because their node had crashed.
    pub events_dropped_crashed: u64,
    /// Total actions generated.
    pub actions_generated: u64,
    /// Messages sent (successfully scheduled for delivery).
    pub messages_sent: u64,
    /// Messages dropped due to network partition.
    pub messages_dropped_partition: u64,
    /// Messages dropped due to packet loss.
    pub messages_dropped_loss: u64,
    /// Timers set.
    pub timers_set: u64,
    /// Timers cancelled.
    pub timers_cancelled: u64,
}

impl SimulationStats {
    /// Total messages dropped (partition + packet loss).
    pub fn messages_dropped(&self) -> u64 {
        self.messages_dropped_partition + self.messages_dropped_loss
    }

    /// Message delivery rate (sent / (sent + dropped)).
    pub fn delivery_rate(&self) -> f64 {
        let total = self.messages_sent + self.messages_dropped();
        if total == 0 {
            1.0
        } else {
            self.messages_sent as f64 / total as f64
        }
    }
}

/// The validator a node runs.
pub fn validator_id(node: NodeIndex) -> ValidatorId {
    ValidatorId(node as u64 + 1)
}

impl SimulationRunner {
    /// Create a runner where every node uses `bft_config`.
    pub fn new(
        network_config: NetworkConfig,
        bft_config: BftConfig,
        seed: u64,
    ) -> Result<Self, SimulationError> {
        let configs = vec![bft_config; network_config.num_nodes as usize];
        Self::with_node_configs(network_config, configs, seed)
    }

    /// Create a runner with one config per node, e.g. to make one node
    /// Byzantine.
    pub fn with_node_configs(
        network_config: NetworkConfig,
        configs: Vec<BftConfig>,
        seed: u64,
    ) -> Result<Self, SimulationError> {
        let num_nodes = network_config.num_nodes as usize;
        if configs.len() != num_nodes {
            return Err(SimulationError::ConfigCount {
                expected: num_nodes,
                actual: configs.len(),
            });
        }

        // Deterministic keys per node
        let keys = (0..num_nodes as u64)
            .map(|i| {
                let mut seed_bytes = [0u8; 32];
                let key_seed = seed.wrapping_add(i).wrapping_mul(0x517cc1b727220a95);
                seed_bytes[..8].copy_from_slice(&key_seed.to_le_bytes());
                seed_bytes[8..16].copy_from_slice(&i.to_le_bytes());
                KeyPair::from_seed(KeyType::Ed25519, &seed_bytes)
            })
            .collect::<Result<Vec<_>, _>>()?;

        let validator_set = ValidatorSet::new(
            keys.iter()
                .enumerate()
                .map(|(i, key)| ValidatorInfo::new(validator_id(i as NodeIndex), key.public_key()))
                .collect(),
        );

        let nodes: Vec<DynBftState> = keys
            .into_iter()
            .zip(configs)
            .enumerate()
            .map(|(i, (key, config))| {
                let topology =
                    StaticTopology::new(validator_id(i as NodeIndex), validator_set.clone())
                        .into_arc();
                DynBftState::from_config(key, topology, config)
            })
            .collect();

        info!(
            num_nodes,
            seed,
            latency_ms = network_config.latency.as_millis() as u64,
            "Created simulation runner"
        );

        Ok(Self {
            mempools: (0..num_nodes).map(|_| QueueMempool::new()).collect(),
            committed: vec![Vec::new(); num_nodes],
            forked: vec![0; num_nodes],
            crashed: BTreeSet::new(),
            nodes,
            event_queue: BTreeMap::new(),
            sequence: 0,
            now: Duration::ZERO,
            network: SimulatedNetwork::new(network_config),
            rng: ChaCha8Rng::seed_from_u64(seed),
            timers: HashMap::new(),
            stats: SimulationStats::default(),
        })
    }

    // ═══════════════════════════════════════════════════════════════════════
    // Accessors
    // ═══════════════════════════════════════════════════════════════════════

    /// Get simulation statistics.
    pub fn stats(&self) -> &SimulationStats {
        &self.stats
    }

    /// Get current simulation time.
    pub fn now(&self) -> Duration {
        self.now
    }

    /// Number of nodes.
    pub fn node_count(&self) -> usize {
        self.nodes.len()
    }

    /// Get a reference to a node by index.
    pub fn node(&self, index: NodeIndex) -> Option<&DynBftState> {
        self.nodes.get(index as usize)
    }

    /// Get a mutable reference to the network for partition/loss configuration.
    pub fn network_mut(&mut self) -> &mut SimulatedNetwork {
        &mut self.network
    }

    /// Blocks a node committed, in order.
    pub fn committed_blocks(&self, node: NodeIndex) -> &[Block] {
        self.committed
            .get(node as usize)
            .map(Vec::as_slice)
            .unwrap_or_default()
    }

    /// Blocks a node discarded as forked.
    pub fn forked_count(&self, node: NodeIndex) -> u64 {
        self.forked.get(node as usize).copied().unwrap_or(0)
    }

    /// Has this node crashed?
    pub fn is_crashed(&self, node: NodeIndex) -> bool {
        self.crashed.contains(&node)
    }

    // ═══════════════════════════════════════════════════════════════════════
    // Control
    // ═══════════════════════════════════════════════════════════════════════

    /// Queue a transaction in a node's mempool.
    pub fn submit_transaction(&mut self, node: NodeIndex, transaction: Vec<u8>) {
        if let Some(mempool) = self.mempools.get_mut(node as usize) {
            mempool.submit(transaction);
        }
    }

    /// Deliver `Start` to every node now.
    pub fn start(&mut self) {
        for node in 0..self.nodes.len() as NodeIndex {
            self.schedule_event(node, self.now, Event::Start);
        }
    }

    /// Stop a node: it processes no further events and its timers are dropped.
    pub fn crash_node(&mut self, node: NodeIndex) {
        if !self.crashed.insert(node) {
            return;
        }
        let keys: Vec<_> = self
            .timers
            .iter()
            .filter(|((owner, _), _)| *owner == node)
            .map(|(id, key)| (*id, *key))
            .collect();
        for (id, key) in keys {
            self.timers.remove(&id);
            self.event_queue.remove(&key);
        }
        warn!(node, "Node crashed");
    }

    /// Run simulation until no more events or time limit reached.
    pub fn run_until(&mut self, end_time: Duration) {
        trace!(
            end_time_secs = end_time.as_secs_f64(),
            "Running simulation step"
        );

        while let Some((&next, _)) = self.event_queue.first_key_value() {
            if next.time > end_time {
                debug!(
                    remaining_events = self.event_queue.len(),
                    "Time limit reached"
                );
                break;
            }
            let Some((key, event)) = self.event_queue.pop_first() else {
                break;
            };
            self.now = key.time;
            let node_index = key.node_index;

            if self.crashed.contains(&node_index) {
                self.stats.events_dropped_crashed += 1;
                continue;
            }
            if let Event::ViewTimer { view } = &event {
                self.timers.remove(&(node_index, TimerId::View(*view)));
            }

            trace!(time = ?self.now, node = node_index, event = event.type_name(), "Processing event");
            self.stats.events_processed += 1;
            self.stats.events_by_priority[event.priority() as usize] += 1;

            let node = &mut self.nodes[node_index as usize];
            node.set_time(self.now);
            let actions = match node.handle(event) {
                Ok(actions) => actions,
                Err(e) => {
                    error!(node = node_index, error = %e, "Fatal error, stopping node");
                    self.crash_node(node_index);
                    continue;
                }
            };

            self.stats.actions_generated += actions.len() as u64;
            for action in actions {
                self.process_action(node_index, action);
            }
        }

        self.now = self.now.max(end_time);
        trace!(
            events_processed = self.stats.events_processed,
            actions_generated = self.stats.actions_generated,
            "Simulation step complete"
        );
    }

    /// Check that the committed sequences of `nodes` are prefixes of one
    /// another.
    pub fn check_agreement(&self, nodes: &[NodeIndex]) -> Result<(), SimulationError> {
        for (i, &a) in nodes.iter().enumerate() {
            for &b in &nodes[i + 1..] {
                let left = self.committed_blocks(a);
                let right = self.committed_blocks(b);
                if let Some(position) = left
                    .iter()
                    .zip(right)
                    .position(|(x, y)| x.id != y.id)
                {
                    return Err(SimulationError::Divergence { a, b, position });
                }
            }
        }
        Ok(())
    }

    /// Check agreement across every node.
    pub fn check_all_agree(&self) -> Result<(), SimulationError> {
        let all: Vec<NodeIndex> = (0..self.nodes.len() as NodeIndex).collect();
        self.check_agreement(&all)
    }

    // ═══════════════════════════════════════════════════════════════════════
    // Action Processing
    // ═══════════════════════════════════════════════════════════════════════

    fn process_action(&mut self, from: NodeIndex, action: Action) {
        match action {
            Action::SendTo { to, message } => match self.node_for(to) {
                Some(to) => self.try_deliver_message(from, to, message),
                None => warn!(node = from, to = ?to, "Send to unknown validator"),
            },

            Action::Broadcast { message } => {
                for to in self.network.all_nodes() {
                    if to != from {
                        self.try_deliver_message(from, to, message.clone());
                    }
                }
            }

            Action::Multicast { to, message } => {
                for validator in to {
                    if let Some(to) = self.node_for(validator) {
                        if to != from {
                            self.try_deliver_message(from, to, message.clone());
                        }
                    }
                }
            }

            Action::SetTimer { id, duration } => {
                if let Some(old) = self.timers.remove(&(from, id)) {
                    self.event_queue.remove(&old);
                }
                let key = self.schedule_event(from, self.now + duration, id.into_event());
                self.timers.insert((from, id), key);
                self.stats.timers_set += 1;
            }

            Action::CancelTimer { id } => {
                if let Some(key) = self.timers.remove(&(from, id)) {
                    self.event_queue.remove(&key);
                    self.stats.timers_cancelled += 1;
                }
            }

            Action::RequestPayload { view } => {
                let max = self.nodes[from as usize].config().max_payload;
                let payload = self.mempools[from as usize].get_payload(max);
                self.schedule_event(from, self.now, Event::PayloadReady { view, payload });
            }

            Action::EmitCommittedBlock { block } => {
                trace!(node = from, view = block.view.0, block = ?block.id, "Block committed");
                self.committed[from as usize].push(block);
            }

            Action::EmitForkedBlock { block } => {
                debug!(node = from, view = block.view.0, block = ?block.id, "Block forked");
                self.forked[from as usize] += 1;
            }
        }
    }

    fn node_for(&self, validator: ValidatorId) -> Option<NodeIndex> {
        let index = validator.0.checked_sub(1)?;
        (index < self.nodes.len() as u64).then_some(index as NodeIndex)
    }

    /// Schedule an event.
    fn schedule_event(&mut self, node: NodeIndex, time: Duration, event: Event) -> EventKey {
        self.sequence += 1;
        let key = EventKey::new(time, &event, node, self.sequence);
        self.event_queue.insert(key, event);
        key
    }

    /// Try to deliver a message, accounting for partitions and packet loss.
    /// Updates stats based on delivery outcome.
    fn try_deliver_message(&mut self, from: NodeIndex, to: NodeIndex, message: ConsensusMessage) {
        // Partition check does not consume RNG
        if self.network.is_partitioned(from, to) {
            self.stats.messages_dropped_partition += 1;
            trace!(from, to, "Message dropped due to partition");
            return;
        }

        if self.network.should_drop_packet(&mut self.rng) {
            self.stats.messages_dropped_loss += 1;
            trace!(from, to, "Message dropped due to packet loss");
            return;
        }

        let latency = self.network.sample_latency(&mut self.rng);
        self.schedule_event(to, self.now + latency, Event::from(message));
        self.stats.messages_sent += 1;
    }
}
