//! A committee of production runners inside one process.
//!
//! Every replica gets its own task, inbox and mempool. Replicas only talk
//! through the [`ChannelNetwork`], so the cluster exercises the same runner
//! and codec a networked deployment would.

use crate::config::NodeConfig;
use crate::network::ChannelNetwork;
use crate::runner::{ProductionRunner, RunnerError, RunnerReport, ShutdownHandle};
use canopy_bft::BftConfig;
use canopy_types::{
    Block, KeyError, KeyPair, KeyType, StaticTopology, ValidatorId, ValidatorInfo, ValidatorSet,
};
use thiserror::Error;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{info, warn};

/// Errors from launching or stopping a cluster.
#[derive(Debug, Error)]
pub enum ClusterError {
    #[error("key derivation failed: {0}")]
    Key(#[from] KeyError),

    #[error("runner for {validator} failed: {source}")]
    Runner {
        validator: ValidatorId,
        #[source]
        source: RunnerError,
    },

    #[error("runner task for {0} panicked")]
    TaskFailed(ValidatorId),

    #[error("unknown validator {0}")]
    UnknownValidator(ValidatorId),

    #[error("{a} and {b} committed different blocks at position {position}")]
    Divergence {
        a: ValidatorId,
        b: ValidatorId,
        position: usize,
    },
}

struct ClusterNode {
    validator: ValidatorId,
    shutdown: ShutdownHandle,
    transactions: mpsc::Sender<Vec<u8>>,
    commits: mpsc::UnboundedReceiver<Block>,
    task: JoinHandle<Result<RunnerReport, RunnerError>>,
}

/// Running replicas. Dropping the cluster signals every replica to stop.
pub struct LocalCluster {
    nodes: Vec<ClusterNode>,
}

/// Derive validator `index`'s signing key from the cluster seed.
pub fn derive_key(seed: u64, index: u64) -> Result<KeyPair, KeyError> {
    let mut seed_bytes = [0u8; 32];
    let key_seed = seed.wrapping_add(index).wrapping_mul(0x517cc1b727220a95);
    seed_bytes[..8].copy_from_slice(&key_seed.to_le_bytes());
    seed_bytes[8..16].copy_from_slice(&index.to_le_bytes());
    KeyPair::from_seed(KeyType::Ed25519, &seed_bytes)
}

impl LocalCluster {
    /// Spawn `config.cluster.size` replicas on the current runtime.
    pub fn launch(config: &NodeConfig) -> Result<Self, ClusterError> {
        Self::launch_with(config, |_, _| {})
    }

    /// Like [`LocalCluster::launch`], letting `customize` adjust each
    /// replica's consensus config (for example to mark one Byzantine).
    pub fn launch_with(
        config: &NodeConfig,
        mut customize: impl FnMut(ValidatorId, &mut BftConfig),
    ) -> Result<Self, ClusterError> {
        let size = config.cluster.size as u64;
        let keys = (0..size)
            .map(|i| derive_key(config.cluster.seed, i))
            .collect::<Result<Vec<_>, _>>()?;

        let validator_set = ValidatorSet::new(
            keys.iter()
                .enumerate()
                .map(|(i, key)| ValidatorInfo::new(ValidatorId(i as u64 + 1), key.public_key()))
                .collect(),
        );
        let ids = validator_set.ids();
        let mut network = ChannelNetwork::new(&ids, config.runner.channel_capacity);

        let mut nodes = Vec::with_capacity(keys.len());
        for (validator, key) in ids.iter().copied().zip(keys) {
            let (transport, inbox) = network
                .take_endpoint(validator)
                .ok_or(ClusterError::UnknownValidator(validator))?;
            let (commit_tx, commits) = mpsc::unbounded_channel();
            let mut consensus = config.consensus.clone();
            customize(validator, &mut consensus);

            let mut runner = ProductionRunner::builder()
                .topology(StaticTopology::new(validator, validator_set.clone()).into_arc())
                .signing_key(key)
                .bft_config(consensus)
                .transport(transport, inbox)
                .channel_capacity(config.runner.channel_capacity)
                .commit_sink(commit_tx)
                .build()
                .map_err(|source| ClusterError::Runner { validator, source })?;

            let shutdown = runner
                .shutdown_handle()
                .ok_or(ClusterError::UnknownValidator(validator))?;
            let transactions = runner.transaction_sender();
            let task = tokio::spawn(runner.run());

            nodes.push(ClusterNode {
                validator,
                shutdown,
                transactions,
                commits,
                task,
            });
        }

        info!(
            size,
            variant = ?config.consensus.variant,
            "Local cluster launched"
        );
        Ok(Self { nodes })
    }

    /// Validators in the cluster, in id order.
    pub fn validators(&self) -> Vec<ValidatorId> {
        self.nodes.iter().map(|node| node.validator).collect()
    }

    /// Submit a transaction to one replica's mempool.
    pub async fn submit(
        &self,
        validator: ValidatorId,
        transaction: Vec<u8>,
    ) -> Result<(), ClusterError> {
        let node = self
            .nodes
            .iter()
            .find(|node| node.validator == validator)
            .ok_or(ClusterError::UnknownValidator(validator))?;
        node.transactions
            .send(transaction)
            .await
            .map_err(|_| ClusterError::Runner {
                validator,
                source: RunnerError::ChannelClosed,
            })
    }

    /// Submit a transaction to every replica, so whichever leads next has it.
    pub async fn submit_to_all(&self, transaction: Vec<u8>) -> Result<(), ClusterError> {
        for node in &self.nodes {
            self.submit(node.validator, transaction.clone()).await?;
        }
        Ok(())
    }

    /// Stop every replica and collect what each committed.
    pub async fn shutdown(self) -> Result<ClusterReport, ClusterError> {
        let mut replicas = Vec::with_capacity(self.nodes.len());
        for node in self.nodes {
            node.shutdown.shutdown();
            let report = match node.task.await {
                Ok(Ok(report)) => report,
                Ok(Err(source)) => {
                    return Err(ClusterError::Runner {
                        validator: node.validator,
                        source,
                    })
                }
                Err(_) => return Err(ClusterError::TaskFailed(node.validator)),
            };

            let mut commits = node.commits;
            let mut committed = Vec::new();
            while let Ok(block) = commits.try_recv() {
                committed.push(block);
            }
            replicas.push(ReplicaOutcome { report, committed });
        }
        Ok(ClusterReport { replicas })
    }
}

/// One replica's final report and commit log.
#[derive(Debug, Clone)]
pub struct ReplicaOutcome {
    pub report: RunnerReport,
    pub committed: Vec<Block>,
}

/// Outcome of a cluster run.
#[derive(Debug, Clone)]
pub struct ClusterReport {
    pub replicas: Vec<ReplicaOutcome>,
}

impl ClusterReport {
    /// Check every pair of commit logs agrees on their common prefix.
    ///
    /// Replicas stop at slightly different moments, so logs may differ in
    /// length but never in content.
    pub fn check_agreement(&self) -> Result<(), ClusterError> {
        let all: Vec<ValidatorId> = self.replicas.iter().map(|r| r.report.validator).collect();
        self.check_agreement_among(&all)
    }

    /// Check agreement among the given validators only.
    pub fn check_agreement_among(&self, validators: &[ValidatorId]) -> Result<(), ClusterError> {
        let replicas: Vec<&ReplicaOutcome> = self
            .replicas
            .iter()
            .filter(|r| validators.contains(&r.report.validator))
            .collect();
        for (i, left) in replicas.iter().enumerate() {
            for right in &replicas[i + 1..] {
                if let Some(position) = left
                    .committed
                    .iter()
                    .zip(&right.committed)
                    .position(|(x, y)| x.id != y.id)
                {
                    warn!(position, "Commit logs diverge");
                    return Err(ClusterError::Divergence {
                        a: left.report.validator,
                        b: right.report.validator,
                        position,
                    });
                }
            }
        }
        Ok(())
    }

    /// Length of the shortest commit log.
    pub fn min_committed(&self) -> usize {
        self.replicas
            .iter()
            .map(|replica| replica.committed.len())
            .min()
            .unwrap_or(0)
    }

    /// Transactions in the longest commit log.
    pub fn committed_transactions(&self) -> usize {
        self.replicas
            .iter()
            .map(|replica| {
                replica
                    .committed
                    .iter()
                    .map(|block| block.payload.len())
                    .sum::<usize>()
            })
            .max()
            .unwrap_or(0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_key_derivation_is_stable_and_distinct() {
        let a = derive_key(7, 0).unwrap();
        let b = derive_key(7, 0).unwrap();
        let c = derive_key(7, 1).unwrap();
        assert_eq!(a.public_key(), b.public_key());
        assert_ne!(a.public_key(), c.public_key());
    }
}
