//! Multi-replica runs of every protocol variant.

use canopy_bft::{BftConfig, ForkChoice, ProtocolVariant};
use canopy_simulation::{NetworkConfig, NodeIndex, SimulationRunner};
use canopy_types::ElectionKind;
use std::time::Duration;
use tracing_test::traced_test;

const ALL_VARIANTS: [ProtocolVariant; 5] = [
    ProtocolVariant::HotStuff,
    ProtocolVariant::TwoChain,
    ProtocolVariant::Fast,
    ProtocolVariant::Lbft,
    ProtocolVariant::Streamlet,
];

fn config(variant: ProtocolVariant) -> BftConfig {
    BftConfig::default()
        .with_variant(variant)
        .with_election(ElectionKind::RoundRobin)
        .with_view_timeout(Duration::from_millis(500))
}

fn run(runner: &mut SimulationRunner, secs: u64) {
    for node in 0..runner.node_count() as NodeIndex {
        for i in 0..20 {
            runner.submit_transaction(node, format!("tx-{node}-{i}").into_bytes());
        }
    }
    runner.start();
    runner.run_until(Duration::from_secs(secs));
}

#[traced_test]
#[test]
fn test_every_variant_commits_identical_prefix() {
    for variant in ALL_VARIANTS {
        let mut runner =
            SimulationRunner::new(NetworkConfig::default(), config(variant), 11).unwrap();
        run(&mut runner, 10);

        for node in 0..4 {
            assert!(
                runner.committed_blocks(node).len() >= 5,
                "{variant:?}: node {node} committed {} blocks",
                runner.committed_blocks(node).len()
            );
        }
        assert_eq!(runner.check_all_agree(), Ok(()), "{variant:?}");
    }
}

#[traced_test]
#[test]
fn test_committed_blocks_form_a_chain() {
    for variant in ALL_VARIANTS {
        let mut runner =
            SimulationRunner::new(NetworkConfig::default(), config(variant), 12).unwrap();
        run(&mut runner, 5);

        let committed = runner.committed_blocks(0);
        assert!(!committed.is_empty(), "{variant:?}");
        for pair in committed.windows(2) {
            assert_eq!(pair[1].prev_id, pair[0].id, "{variant:?}");
            assert!(pair[1].view > pair[0].view, "{variant:?}");
        }
        assert_eq!(
            runner.node(0).unwrap().highest_committed_view(),
            committed.last().unwrap().view
        );
    }
}

#[traced_test]
#[test]
fn test_crashed_leader_recovered_by_timeout_certificates() {
    let mut runner = SimulationRunner::new(
        NetworkConfig::default(),
        config(ProtocolVariant::TwoChain),
        21,
    )
    .unwrap();
    // Validator 1 leads every fourth view.
    runner.crash_node(0);
    run(&mut runner, 30);

    let live = [1, 2, 3];
    for node in live {
        let state = runner.node(node).unwrap();
        assert!(state.stats().view_timeouts > 0);
        assert!(state.high_tc().is_some());
        assert!(
            runner.committed_blocks(node).len() >= 5,
            "node {node} committed {}",
            runner.committed_blocks(node).len()
        );
    }
    assert!(runner.committed_blocks(0).is_empty());
    assert_eq!(runner.check_agreement(&live), Ok(()));
}

#[traced_test]
#[test]
fn test_silent_replica_does_not_stall_broadcast_variant() {
    let mut runner = SimulationRunner::new(
        NetworkConfig::default(),
        config(ProtocolVariant::Lbft),
        23,
    )
    .unwrap();
    // Validator 4 drops everything it would send or receive.
    runner.network_mut().isolate_node(3);
    run(&mut runner, 30);

    let live = [0, 1, 2];
    for node in live {
        assert!(
            runner.committed_blocks(node).len() >= 3,
            "node {node} committed {}",
            runner.committed_blocks(node).len()
        );
    }
    assert!(runner.committed_blocks(3).is_empty());
    assert_eq!(runner.check_agreement(&live), Ok(()));
}

#[traced_test]
#[test]
fn test_byzantine_forking_leader_cannot_break_agreement() {
    let honest = config(ProtocolVariant::TwoChain);
    let byzantine = honest
        .clone()
        .with_fork_choice(ForkChoice::Forking)
        .with_byzantine(true);
    let mut runner = SimulationRunner::with_node_configs(
        NetworkConfig::default(),
        vec![byzantine, honest.clone(), honest.clone(), honest],
        31,
    )
    .unwrap();
    run(&mut runner, 20);

    let honest_nodes = [1, 2, 3];
    assert_eq!(runner.check_agreement(&honest_nodes), Ok(()));
    for node in honest_nodes {
        assert!(runner.committed_blocks(node).len() >= 5);
        assert!(
            runner.forked_count(node) > 0,
            "node {node} saw no forked blocks"
        );
    }
}

#[traced_test]
#[test]
fn test_same_seed_same_history() {
    let network = NetworkConfig {
        jitter_fraction: 0.5,
        ..Default::default()
    };
    let history = |seed: u64| {
        let mut runner =
            SimulationRunner::new(network.clone(), config(ProtocolVariant::TwoChain), seed)
                .unwrap();
        run(&mut runner, 5);
        let ids: Vec<_> = runner.committed_blocks(0).iter().map(|b| b.id).collect();
        (ids, runner.stats().events_processed)
    };

    let first = history(7);
    assert!(!first.0.is_empty());
    assert_eq!(first, history(7));
}
