//! CometBFT RPC probe tests against a local fake node

use std::time::Duration;

use axum::http::StatusCode;
use axum::routing::get;
use axum::{Json, Router};
use serde_json::{json, Value};
use tokio::net::TcpListener;
use tokio_test::{assert_err, assert_ok};

use nodeops::health::{CometRpcProbe, ProbeError, StatusProbe};
use nodeops::models::target::{NodeTarget, Role};

use crate::support::SEED_ID;

fn status_body(height: &str) -> Value {
    json!({
        "jsonrpc": "2.0",
        "id": -1,
        "result": {
            "node_info": {
                "id": SEED_ID,
                "network": "pokerchain",
                "moniker": "node1",
                "version": "0.38.12"
            },
            "sync_info": {
                "latest_block_hash": "A1B2",
                "latest_block_height": height,
                "latest_block_time": "2026-10-18T09:30:00.123456789Z",
                "catching_up": false
            },
            "validator_info": {
                "address": "C0FFEE",
                "voting_power": "1000"
            }
        }
    })
}

fn net_info_body() -> Value {
    json!({ "jsonrpc": "2.0", "id": -1, "result": { "listening": true, "n_peers": "3", "peers": [] } })
}

fn validators_body() -> Value {
    json!({
        "jsonrpc": "2.0",
        "id": -1,
        "result": {
            "block_height": "1204",
            "validators": [
                { "address": "C0FFEE", "voting_power": "1000", "proposer_priority": "-250" },
                { "address": "BEEF01", "voting_power": "500", "proposer_priority": "250" }
            ],
            "count": "2",
            "total": "2"
        }
    })
}

fn node_router(height: &'static str) -> Router {
    Router::new()
        .route("/status", get(move || async move { Json(status_body(height)) }))
        .route("/net_info", get(|| async { Json(net_info_body()) }))
        .route("/validators", get(|| async { Json(validators_body()) }))
}

/// Serve `router` on an ephemeral port and return a target pointing at it
async fn serve(router: Router, role: Role) -> NodeTarget {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let port = listener.local_addr().unwrap().port();
    tokio::spawn(async move {
        axum::serve(listener, router).await.unwrap();
    });

    let mut target = NodeTarget::new("127.0.0.1", "root", role);
    target.rpc_port = port;
    target
}

fn probe() -> CometRpcProbe {
    CometRpcProbe::new(Duration::from_secs(2)).unwrap()
}

#[tokio::test]
async fn test_sample_from_status_and_net_info() {
    let target = serve(node_router("1204"), Role::Sync).await;

    let sample = assert_ok!(probe().sample(&target).await);

    assert_eq!(sample.node_id, SEED_ID);
    assert_eq!(sample.chain_id, "pokerchain");
    assert_eq!(sample.moniker, "node1");
    assert_eq!(sample.block_height, 1204);
    assert_eq!(sample.peer_count, 3);
    assert!(!sample.catching_up);
    assert!(sample.latest_block_time.is_some());
    assert_eq!(sample.voting_power, None);
}

#[tokio::test]
async fn test_validator_reports_voting_power() {
    let target = serve(node_router("1204"), Role::Validator).await;

    let sample = assert_ok!(probe().sample(&target).await);

    assert_eq!(sample.voting_power, Some(1000));
}

#[tokio::test]
async fn test_validator_set() {
    let target = serve(node_router("1204"), Role::Master).await;

    let validators = assert_ok!(probe().validators(&target).await);

    assert_eq!(validators.len(), 2);
    assert_eq!(validators[0].address, "C0FFEE");
    assert_eq!(validators[0].voting_power, 1000);
    assert_eq!(validators[0].proposer_priority, -250);
    assert_eq!(validators[1].proposer_priority, 250);
}

#[tokio::test]
async fn test_non_numeric_height_is_malformed() {
    let target = serve(node_router("twelve"), Role::Sync).await;

    let err = assert_err!(probe().sample(&target).await);

    match err {
        ProbeError::MalformedResponse(msg) => assert!(msg.contains("latest_block_height")),
        other => panic!("unexpected error: {:?}", other),
    }
}

#[tokio::test]
async fn test_server_error_is_malformed() {
    let router = Router::new().route(
        "/status",
        get(|| async { (StatusCode::INTERNAL_SERVER_ERROR, "panic in handler") }),
    );
    let target = serve(router, Role::Sync).await;

    let err = assert_err!(probe().sample(&target).await);

    match err {
        ProbeError::MalformedResponse(msg) => assert!(msg.contains("500")),
        other => panic!("unexpected error: {:?}", other),
    }
}

#[tokio::test]
async fn test_closed_port_is_unreachable() {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let port = listener.local_addr().unwrap().port();
    drop(listener);

    let mut target = NodeTarget::new("127.0.0.1", "root", Role::Sync);
    target.rpc_port = port;

    let err = assert_err!(probe().sample(&target).await);

    assert!(matches!(err, ProbeError::Unreachable(_)));
}
