//! Deployment executor tests against a scripted remote host

use nodeops::deploy::executor::Deployer;
use nodeops::deploy::fsm::DeploymentState;
use nodeops::models::deployment::{Phase, PhaseStatus};
use nodeops::models::outcome::Outcome;
use nodeops::models::plan::DeploymentPlan;
use nodeops::models::target::{NodeTarget, Role};
use nodeops::storage::runs::RunStore;
use nodeops::storage::settings::{SeedSettings, SshSettings};
use tokio::sync::watch;

use crate::support::{sample, FakeBuilder, Harness, Reply, SEED_ID};

fn sync_node() -> NodeTarget {
    NodeTarget::new("node2.example.com", "root", Role::Sync)
}

#[tokio::test]
async fn test_full_deployment_is_verified() {
    let harness = Harness::new();
    let target = sync_node();
    harness.probe.push_heights(&target.host, &[100, 115]);

    let log = harness
        .deployer()
        .deploy(&target, &harness.plan(DeploymentPlan::full_phases()))
        .await;

    assert_eq!(log.final_state, DeploymentState::Verified);
    assert_eq!(log.entries.len(), 9);
    assert!(log.succeeded());
    assert_eq!(log.outcome(), Outcome::Success);
    assert!(log.finished_at.is_some());

    let uploads = harness.channel.uploads();
    assert_eq!(uploads.len(), 2);
    assert!(uploads.iter().any(|(_, _, remote)| remote == "/tmp/nodeops/pokerchaind"));
    assert!(uploads.iter().any(|(_, _, remote)| remote == "/tmp/nodeops/genesis.json"));
    assert_eq!(harness.builder.builds(), 1);

    assert_eq!(harness.channel.count("systemctl enable --now"), 1);
    assert_eq!(harness.channel.count("persistent_peers = \""), 1);
}

#[tokio::test]
async fn test_genesis_mismatch_halts_before_start() {
    let harness = Harness::new();
    harness.channel.on(
        "sha256sum",
        Reply::Stdout(format!("{}  genesis.json\n", "0".repeat(64))),
    );
    let target = sync_node();

    let log = harness
        .deployer()
        .deploy(&target, &harness.plan(DeploymentPlan::full_phases()))
        .await;

    match &log.final_state {
        DeploymentState::Failed { phase, reason } => {
            assert_eq!(*phase, Phase::InitializeConfig);
            assert!(reason.contains("Configuration mismatch"));
        }
        other => panic!("unexpected state: {:?}", other),
    }
    assert_eq!(log.entries.last().unwrap().phase, Phase::InitializeConfig);
    assert!(log.entry(Phase::ConfigurePeers).is_none());
    assert!(log.entry(Phase::StartService).is_none());
    assert_eq!(harness.channel.count("systemctl enable"), 0);
    assert_eq!(harness.probe.calls(), 0);
    assert!(log.rollback_hint().unwrap().contains("restore"));
    assert_eq!(log.outcome(), Outcome::HardFailure);
}

#[tokio::test]
async fn test_each_run_creates_one_backup() {
    let harness = Harness::new();
    let target = sync_node();
    let plan = harness.plan(vec![
        Phase::PreflightCheck,
        Phase::StopService,
        Phase::BackupData,
    ]);
    let deployer = harness.deployer();

    let first = deployer.deploy(&target, &plan).await;
    assert_eq!(harness.channel.count("cp -a"), 1);
    let second = deployer.deploy(&target, &plan).await;
    assert_eq!(harness.channel.count("cp -a"), 2);

    let first_detail = &first.entry(Phase::BackupData).unwrap().detail;
    let second_detail = &second.entry(Phase::BackupData).unwrap().detail;
    assert_ne!(first_detail, second_detail);
    assert_eq!(first.final_state, DeploymentState::BackedUp);
    assert!(first.succeeded());
}

#[tokio::test]
async fn test_missing_data_dir_skips_backup() {
    let harness = Harness::new();
    harness.channel.on("test -d", Reply::Exit(1, String::new()));

    let log = harness
        .deployer()
        .deploy(&sync_node(), &harness.plan(vec![Phase::StopService, Phase::BackupData]))
        .await;

    let entry = log.entry(Phase::BackupData).unwrap();
    assert_eq!(entry.status, PhaseStatus::Skipped);
    assert_eq!(harness.channel.count("cp -a"), 0);
    assert_eq!(log.final_state, DeploymentState::BackedUp);
}

#[tokio::test]
async fn test_stop_tolerates_unloaded_unit() {
    let harness = Harness::new();
    harness.channel.on(
        "systemctl stop",
        Reply::Exit(5, "Failed to stop pokerchaind.service: Unit pokerchaind.service not loaded.".to_string()),
    );

    let log = harness
        .deployer()
        .deploy(&sync_node(), &harness.plan(vec![Phase::StopService]))
        .await;

    let entry = log.entry(Phase::StopService).unwrap();
    assert_eq!(entry.status, PhaseStatus::Success);
    assert_eq!(entry.detail, "already stopped");
}

#[tokio::test]
async fn test_stop_failure_halts() {
    let harness = Harness::new();
    harness
        .channel
        .on("systemctl stop", Reply::Exit(1, "Access denied".to_string()));

    let log = harness
        .deployer()
        .deploy(
            &sync_node(),
            &harness.plan(vec![Phase::StopService, Phase::StartService]),
        )
        .await;

    assert!(matches!(
        log.final_state,
        DeploymentState::Failed { phase: Phase::StopService, .. }
    ));
    assert_eq!(harness.channel.count("systemctl enable"), 0);
}

#[tokio::test]
async fn test_unreachable_host_fails_preflight() {
    let harness = Harness::new();
    let target = sync_node();
    harness.channel.set_unreachable(&target.host);

    let log = harness
        .deployer()
        .deploy(&target, &harness.plan(DeploymentPlan::full_phases()))
        .await;

    assert!(matches!(
        log.final_state,
        DeploymentState::Failed { phase: Phase::PreflightCheck, .. }
    ));
    let detail = &log.entry(Phase::PreflightCheck).unwrap().detail;
    assert!(detail.contains("Unreachable target"));
    assert_eq!(harness.channel.commands_for(&target.host), vec!["true"]);
    assert!(harness.channel.uploads().is_empty());
}

#[tokio::test]
async fn test_architecture_mismatch_fails_preflight() {
    let harness = Harness::new();
    harness
        .channel
        .on("uname -sm", Reply::Stdout("Linux aarch64\n".to_string()));

    let log = harness
        .deployer()
        .deploy(&sync_node(), &harness.plan(DeploymentPlan::full_phases()))
        .await;

    assert!(matches!(
        log.final_state,
        DeploymentState::Failed { phase: Phase::PreflightCheck, .. }
    ));
    assert!(log.entry(Phase::PreflightCheck).unwrap().detail.contains("arm64"));
}

#[tokio::test]
async fn test_cancel_before_first_phase() {
    let harness = Harness::new();
    let (tx, rx) = watch::channel(false);
    tx.send(true).unwrap();

    let log = harness
        .deployer()
        .with_cancel(rx)
        .deploy(&sync_node(), &harness.plan(DeploymentPlan::full_phases()))
        .await;

    assert_eq!(log.final_state, DeploymentState::Cancelled { before: Phase::Build });
    assert!(log.entries.is_empty());
    assert!(harness.channel.commands().is_empty());
    assert_eq!(log.outcome(), Outcome::SoftFailure);
}

#[tokio::test]
async fn test_unresolved_seed_awaits_operator() {
    let harness = Harness::new();
    let seed = SeedSettings {
        node_id: None,
        ..harness.seed()
    };
    let plan = harness.plan_with(vec![Phase::StopService, Phase::ConfigurePeers], seed);

    let log = harness.deployer().deploy(&sync_node(), &plan).await;

    match &log.final_state {
        DeploymentState::AwaitingOperatorInput { phase, reason } => {
            assert_eq!(*phase, Phase::ConfigurePeers);
            assert!(reason.contains("--seed-id"));
        }
        other => panic!("unexpected state: {:?}", other),
    }
    assert_eq!(harness.probe.calls(), 2);
}

#[tokio::test]
async fn test_seed_id_resolved_from_status() {
    let harness = Harness::new();
    harness.probe.push("seed.example.com", Err(nodeops::health::ProbeError::Unreachable("refused".to_string())));
    harness.probe.push("seed.example.com", Ok(sample(40)));
    let seed = SeedSettings {
        node_id: None,
        ..harness.seed()
    };
    let plan = harness.plan_with(vec![Phase::ConfigurePeers], seed);

    let log = harness.deployer().deploy(&sync_node(), &plan).await;

    assert_eq!(log.final_state, DeploymentState::PeersConfigured);
    assert!(log
        .entry(Phase::ConfigurePeers)
        .unwrap()
        .detail
        .contains(&format!("{}@seed.example.com:26656", SEED_ID)));
}

#[tokio::test]
async fn test_peers_are_merged_without_duplicates() {
    let harness = Harness::new();
    let other = "89abcdef0123456789abcdef0123456789abcdef@node3:26656";
    harness.channel.on(
        "grep -E '^persistent_peers",
        Reply::Stdout(format!("persistent_peers = \"{}\"\n", other)),
    );

    let log = harness
        .deployer()
        .deploy(&sync_node(), &harness.plan(vec![Phase::ConfigurePeers]))
        .await;

    let detail = &log.entry(Phase::ConfigurePeers).unwrap().detail;
    assert_eq!(
        detail,
        &format!("persistent_peers = {},{}@seed.example.com:26656", other, SEED_ID)
    );
}

#[tokio::test]
async fn test_configured_peer_is_left_alone() {
    let harness = Harness::new();
    harness.channel.on(
        "grep -E '^persistent_peers",
        Reply::Stdout(format!(
            "persistent_peers = \"{}@seed.example.com:26656\"\n",
            SEED_ID
        )),
    );

    harness
        .deployer()
        .deploy(&sync_node(), &harness.plan(vec![Phase::ConfigurePeers]))
        .await;

    assert_eq!(harness.channel.count("sed -i"), 0);
}

#[tokio::test]
async fn test_master_skips_peers() {
    let harness = Harness::new();
    let master = NodeTarget::new("seed.example.com", "root", Role::Master);

    let log = harness
        .deployer()
        .deploy(&master, &harness.plan(vec![Phase::ConfigurePeers]))
        .await;

    assert_eq!(log.entry(Phase::ConfigurePeers).unwrap().status, PhaseStatus::Skipped);
    assert!(harness.channel.commands().is_empty());
}

#[tokio::test]
async fn test_stalled_node_fails_verification() {
    let harness = Harness::new();
    let target = sync_node();
    harness.probe.push_heights(&target.host, &[50, 50]);

    let log = harness
        .deployer()
        .deploy(&target, &harness.plan(vec![Phase::StartService, Phase::VerifyHealth]))
        .await;

    assert!(matches!(
        log.final_state,
        DeploymentState::Failed { phase: Phase::VerifyHealth, .. }
    ));
    assert!(!log.succeeded());
}

#[tokio::test]
async fn test_wrong_chain_fails_verification() {
    let harness = Harness::new();
    let target = sync_node();
    let mut first = sample(10);
    first.chain_id = "testnet".to_string();
    let mut second = sample(20);
    second.chain_id = "testnet".to_string();
    harness.probe.push(&target.host, Ok(first));
    harness.probe.push(&target.host, Ok(second));

    let log = harness
        .deployer()
        .deploy(&target, &harness.plan(vec![Phase::VerifyHealth]))
        .await;

    match &log.final_state {
        DeploymentState::Failed { phase, reason } => {
            assert_eq!(*phase, Phase::VerifyHealth);
            assert!(reason.contains("testnet"));
        }
        other => panic!("unexpected state: {:?}", other),
    }
}

#[tokio::test]
async fn test_without_verification_success_is_started() {
    let harness = Harness::new();

    let log = harness
        .deployer()
        .deploy(&sync_node(), &harness.plan(vec![Phase::StopService, Phase::StartService]))
        .await;

    assert_eq!(log.final_state, DeploymentState::Started);
    assert!(!log.verification_required);
    assert!(log.succeeded());
}

#[tokio::test]
async fn test_run_log_is_persisted() {
    let harness = Harness::new();
    let store = RunStore::new(harness.dir.join("runs"));

    let log = harness
        .deployer()
        .with_run_store(store.clone())
        .deploy(&sync_node(), &harness.plan(vec![Phase::StopService, Phase::StartService]))
        .await;

    let stored = store.load(&log.run_id).await.unwrap();
    assert_eq!(stored.entries.len(), 2);
    assert_eq!(stored.final_state, DeploymentState::Started);
    assert!(stored.finished_at.is_some());
}

#[tokio::test]
async fn test_deploy_many_builds_once() {
    let harness = Harness::new();
    let targets = vec![
        NodeTarget::new("node2.example.com", "root", Role::Sync),
        NodeTarget::new("node3.example.com", "root", Role::Validator),
    ];
    let plan = harness.plan(vec![
        Phase::Build,
        Phase::PreflightCheck,
        Phase::StopService,
        Phase::UploadArtifacts,
    ]);

    let logs = harness.deployer().deploy_many(&targets, &plan).await;

    assert_eq!(logs.len(), 2);
    assert!(logs.iter().all(|log| log.final_state == DeploymentState::Uploaded));
    assert_ne!(logs[0].run_id, logs[1].run_id);
    assert_eq!(harness.builder.builds(), 1);
    assert_eq!(harness.channel.uploads().len(), 4);
}

#[tokio::test]
async fn test_upload_without_artifact_fails_preflight() {
    let harness = Harness::new();
    let plan = harness.plan(vec![
        Phase::PreflightCheck,
        Phase::StopService,
        Phase::UploadArtifacts,
    ]);

    let log = harness.deployer().deploy(&sync_node(), &plan).await;

    match &log.final_state {
        DeploymentState::Failed { phase, reason } => {
            assert_eq!(*phase, Phase::PreflightCheck);
            assert!(reason.contains("Missing local configuration"));
        }
        other => panic!("unexpected state: {:?}", other),
    }
    assert!(harness.channel.commands().is_empty());
}

#[tokio::test]
async fn test_same_host_nodes_deploy_to_separate_homes() {
    let harness = Harness::new();
    let master = NodeTarget::new("127.0.0.1", "root", Role::Master);
    let mut sync = NodeTarget::new("127.0.0.1", "root", Role::Sync);
    sync.p2p_port = 26666;
    sync.rpc_port = 26667;
    sync.api_port = 1327;
    let plan = harness.plan(vec![
        Phase::Build,
        Phase::PreflightCheck,
        Phase::StopService,
        Phase::BackupData,
        Phase::UploadArtifacts,
        Phase::InitializeConfig,
    ]);

    let logs = harness.deployer().deploy_many(&[master, sync], &plan).await;

    assert!(logs.iter().all(|log| log.final_state == DeploymentState::Initialized));

    let inits: Vec<String> = harness
        .channel
        .commands()
        .into_iter()
        .filter(|c| c.contains("--overwrite"))
        .collect();
    assert_eq!(inits.len(), 2);
    assert!(inits
        .iter()
        .any(|c| c.contains("init 'node-127-0-0-1' ") && c.contains("--home \"$HOME/.pokerchain\" ")));
    assert!(inits.iter().any(|c| {
        c.contains("init 'node-127-0-0-1-26667' ") && c.contains("--home \"$HOME/.pokerchain-26667\" ")
    }));

    let remotes: Vec<String> = harness
        .channel
        .uploads()
        .into_iter()
        .map(|(_, _, remote)| remote)
        .collect();
    assert!(remotes.contains(&"/tmp/nodeops/genesis.json".to_string()));
    assert!(remotes.contains(&"/tmp/nodeops/26667/genesis.json".to_string()));

    assert_eq!(harness.channel.count("systemctl stop 'pokerchaind'"), 1);
    assert_eq!(harness.channel.count("systemctl stop 'pokerchaind-26667'"), 1);
    assert_eq!(harness.channel.count("cp -a \"$HOME/.pokerchain\" "), 1);
    assert_eq!(harness.channel.count("cp -a \"$HOME/.pokerchain-26667\" "), 1);
    assert_eq!(harness.channel.count("/etc/systemd/system/pokerchaind.service"), 1);
    assert_eq!(harness.channel.count("/etc/systemd/system/pokerchaind-26667.service"), 1);
    assert!(harness.channel.count("$HOME/.pokerchain-26667/config/config.toml") >= 1);
}

#[tokio::test]
async fn test_failed_build_is_shared_by_every_target() {
    let harness = Harness::new();
    let builder = FakeBuilder::failing();
    let deployer = Deployer::new(
        harness.channel.clone(),
        harness.probe.clone(),
        builder.clone(),
        &SshSettings::default(),
        harness.dir.join("build"),
    );
    let targets = vec![
        NodeTarget::new("node2.example.com", "root", Role::Sync),
        NodeTarget::new("node3.example.com", "root", Role::Validator),
        NodeTarget::new("node4.example.com", "root", Role::Sync),
    ];

    let logs = deployer
        .deploy_many(&targets, &harness.plan(DeploymentPlan::full_phases()))
        .await;

    assert_eq!(builder.builds(), 1);
    assert_eq!(logs.len(), 3);
    for log in &logs {
        match &log.final_state {
            DeploymentState::Failed { phase, reason } => {
                assert_eq!(*phase, Phase::Build);
                assert!(reason.contains("undefined: keeper.NewMsgServer"));
                assert!(!reason.contains("Build failed: Build failed"));
            }
            other => panic!("unexpected state: {:?}", other),
        }
        assert_eq!(log.entries.len(), 1);
    }
    assert!(harness.channel.commands().is_empty());
}

#[tokio::test]
async fn test_redeploy_keeps_single_seed_entry() {
    let harness = Harness::new();
    let target = sync_node();
    harness.probe.push_heights(&target.host, &[100, 115, 130, 145]);
    let plan = harness.plan(DeploymentPlan::full_phases());
    let deployer = harness.deployer();
    let entry = format!("{}@seed.example.com:26656", SEED_ID);

    let first = deployer.deploy(&target, &plan).await;

    assert_eq!(first.final_state, DeploymentState::Verified);
    assert_eq!(harness.channel.count("cp -a"), 1);
    assert_eq!(
        first.entry(Phase::ConfigurePeers).unwrap().detail,
        format!("persistent_peers = {}", entry)
    );

    // config.toml now holds the entry written by the first run
    harness.channel.on(
        "grep -E '^persistent_peers",
        Reply::Stdout(format!("persistent_peers = \"{}\"\n", entry)),
    );

    let second = deployer.deploy(&target, &plan).await;

    assert_eq!(second.final_state, DeploymentState::Verified);
    assert_ne!(first.run_id, second.run_id);
    assert_eq!(harness.channel.count("cp -a"), 2);
    assert_eq!(
        second.entry(Phase::ConfigurePeers).unwrap().detail,
        format!("{} already configured", entry)
    );
    assert_eq!(harness.channel.count("persistent_peers = \""), 1);
    assert_eq!(harness.builder.builds(), 1);
}
