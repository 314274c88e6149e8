//! Production runner with async I/O.
//!
//! Wraps the deterministic state machine with real tokio I/O:
//!
//! - Consensus messages through bounded per-replica channels
//! - View timers as tokio tasks on a dedicated channel
//! - Transactions into a per-replica mempool
//!
//! # Architecture
//!
//! A single task owns each replica's state machine and receives events via
//! mpsc channels. Nothing else touches replica state.
//!
//! ```text
//! ┌──────────────────────────────────────────────────────────────┐
//! │                      ProductionRunner                        │
//! │                                                              │
//! │   timer_rx ──┐                                               │
//! │   event_rx ──┼─► select! (biased) ─► BftState::handle()      │
//! │   tx_rx ─────┘                              │                │
//! │                                             ▼                │
//! │                                        Vec<Action>           │
//! │               ┌──────────────┬──────────────┼────────────┐   │
//! │               ▼              ▼              ▼            ▼   │
//! │          ChannelTransport TimerManager   Mempool   commit sink│
//! └──────────────────────────────────────────────────────────────┘
//! ```

pub mod cluster;
pub mod config;
pub mod network;
mod runner;
pub mod telemetry;
mod timers;

pub use cluster::{ClusterError, ClusterReport, LocalCluster, ReplicaOutcome};
pub use config::{ClusterConfig, ConfigError, NodeConfig, RunnerConfig, TelemetrySettings};
pub use runner::{
    ProductionRunner, ProductionRunnerBuilder, RunnerError, RunnerReport, ShutdownHandle,
};
pub use telemetry::{init_telemetry, TelemetryError};
pub use timers::TimerManager;
