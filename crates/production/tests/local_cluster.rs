//! End-to-end runs of the production runner over the in-process transport.

use canopy_bft::{ForkChoice, ProtocolVariant};
use canopy_production::{LocalCluster, NodeConfig};
use canopy_types::{ElectionKind, ValidatorId};
use std::time::Duration;

fn cluster_config(variant: ProtocolVariant) -> NodeConfig {
    let mut config = NodeConfig::default();
    config.cluster.size = 4;
    config.cluster.seed = 11;
    config.consensus.variant = variant;
    config.consensus.election = ElectionKind::RoundRobin;
    config.consensus.view_timeout_ms = 500;
    config
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_two_chain_cluster_commits_submitted_transactions() {
    let cluster = LocalCluster::launch(&cluster_config(ProtocolVariant::TwoChain)).unwrap();
    assert_eq!(cluster.validators(), (1..=4).map(ValidatorId).collect::<Vec<_>>());

    for i in 0..20u32 {
        cluster
            .submit_to_all(format!("tx-{i}").into_bytes())
            .await
            .unwrap();
    }
    tokio::time::sleep(Duration::from_secs(2)).await;

    let report = cluster.shutdown().await.unwrap();
    report.check_agreement().unwrap();
    assert!(report.min_committed() >= 3, "too few commits: {}", report.min_committed());
    assert!(report.committed_transactions() > 0);
    for replica in &report.replicas {
        assert_eq!(replica.report.forked_blocks, 0);
        let views: Vec<_> = replica.committed.iter().map(|b| b.view).collect();
        assert!(views.windows(2).all(|w| w[0] < w[1]));
    }
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_streamlet_cluster_agrees() {
    let cluster = LocalCluster::launch(&cluster_config(ProtocolVariant::Streamlet)).unwrap();
    tokio::time::sleep(Duration::from_secs(2)).await;

    let report = cluster.shutdown().await.unwrap();
    report.check_agreement().unwrap();
    assert!(report.min_committed() >= 1);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_byzantine_forking_replica_cannot_split_honest_replicas() {
    let mut config = cluster_config(ProtocolVariant::TwoChain);
    config.consensus.fork_choice = ForkChoice::Forking;

    let cluster = LocalCluster::launch_with(&config, |validator, consensus| {
        consensus.byzantine = validator == ValidatorId(1);
    })
    .unwrap();
    tokio::time::sleep(Duration::from_secs(3)).await;

    let report = cluster.shutdown().await.unwrap();
    let honest: Vec<ValidatorId> = (2..=4).map(ValidatorId).collect();
    report.check_agreement_among(&honest).unwrap();
    assert!(report.replicas[1..].iter().all(|r| !r.committed.is_empty()));
}

#[tokio::test]
async fn test_submit_to_unknown_validator_fails() {
    let cluster = LocalCluster::launch(&cluster_config(ProtocolVariant::TwoChain)).unwrap();
    assert!(cluster.submit(ValidatorId(9), b"tx".to_vec()).await.is_err());
    cluster.shutdown().await.unwrap();
}
