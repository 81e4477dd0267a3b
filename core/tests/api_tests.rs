// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0
//! RPC-surface tests: drive the axum router directly and assert that every
//! outcome crosses the boundary as a structured JSON-RPC result or error.

use async_trait::async_trait;
use serde_json::{json, Value};
use std::sync::Arc;
use tower::util::ServiceExt;

use axum::body::Body;
use axum::http::{Request, StatusCode};

use agentevolution_core::application::discovery::DiscoveryService;
use agentevolution_core::application::gauntlet::Gauntlet;
use agentevolution_core::application::publishing::PublishingService;
use agentevolution_core::application::telemetry::TelemetryService;
use agentevolution_core::application::ToolLockTable;
use agentevolution_core::domain::config::DiscoveryConfig;
use agentevolution_core::domain::fitness::FitnessParams;
use agentevolution_core::domain::sandbox::{SandboxError, SandboxExecutor, SandboxLimits};
use agentevolution_core::domain::screener::StaticScreener;
use agentevolution_core::domain::verdict::ExecutionReport;
use agentevolution_core::infrastructure::{
    BagOfWordsEmbedder, EmbeddingIndex, InMemoryToolRepository,
};
use agentevolution_core::presentation;

struct PassingSandbox;

#[async_trait]
impl SandboxExecutor for PassingSandbox {
    async fn execute(
        &self,
        _code: &str,
        _test_case: &str,
        _limits: SandboxLimits,
    ) -> Result<ExecutionReport, SandboxError> {
        Ok(ExecutionReport {
            exit_code: 0,
            stdout: String::new(),
            stderr: String::new(),
            wall_ms: 25,
            cpu_ms: 20,
            peak_mem_kb: 1024,
            timed_out: false,
            oom: false,
        })
    }
}

fn app() -> axum::Router {
    let repo = Arc::new(InMemoryToolRepository::new());
    let index = Arc::new(EmbeddingIndex::new(Arc::new(BagOfWordsEmbedder)));
    let locks = Arc::new(ToolLockTable::new());
    let gauntlet = Gauntlet::new(
        StaticScreener::default(),
        Arc::new(PassingSandbox),
        SandboxLimits::default(),
    );
    let publishing = Arc::new(PublishingService::new(
        gauntlet,
        repo.clone(),
        index.clone(),
        FitnessParams::default(),
        locks.clone(),
    ));
    let telemetry = Arc::new(TelemetryService::new(
        repo.clone(),
        index.clone(),
        FitnessParams::default(),
        locks,
    ));
    let discovery = Arc::new(DiscoveryService::new(repo, index, DiscoveryConfig::default()));
    presentation::app(publishing, telemetry, discovery)
}

async fn rpc(app: &axum::Router, method: &str, params: Value) -> Value {
    let body = json!({ "jsonrpc": "2.0", "id": 1, "method": method, "params": params });
    let response = app
        .clone()
        .oneshot(
            Request::builder()
                .method("POST")
                .uri("/rpc")
                .header("content-type", "application/json")
                .body(Body::from(body.to_string()))
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let bytes = axum::body::to_bytes(response.into_body(), usize::MAX).await.unwrap();
    serde_json::from_slice(&bytes).unwrap()
}

fn submit_params(name: &str, code: &str) -> Value {
    json!({
        "name": name,
        "description": "test tool",
        "intent": "add two integers",
        "code": code,
        "test_case": "assert add(2, 3) == 5",
        "tags": ["math"],
        "author_agent_id": "agent-rpc",
    })
}

#[tokio::test]
async fn submit_then_get_round_trips() {
    let app = app();

    let response = rpc(&app, "submit_tool", submit_params("adder", "def add(a, b):\n    return a + b")).await;
    let result = &response["result"];
    assert!(result["verdict"]["approved"].as_bool().unwrap());
    assert_eq!(result["trust_level"], "verified");
    let id = result["id"].as_str().unwrap().to_string();
    assert_eq!(result["content_hash"].as_str().unwrap().len(), 64);

    let fetched = rpc(&app, "get_tool", json!({ "id": id })).await;
    assert_eq!(fetched["result"]["name"], "adder");
    assert_eq!(fetched["result"]["delisted"], false);

    let provenance = rpc(&app, "get_provenance", json!({ "id": id })).await;
    let chain = provenance["result"]["chain"].as_array().unwrap();
    assert_eq!(chain.len(), 1);
    assert_eq!(chain[0]["version"], 1);
    assert_eq!(chain[0]["security_scan"], true);
}

#[tokio::test]
async fn duplicate_surfaces_as_structured_error() {
    let app = app();
    let first = rpc(&app, "submit_tool", submit_params("adder", "def add(a, b):\n    return a + b")).await;
    let first_id = first["result"]["id"].as_str().unwrap().to_string();

    let again = rpc(&app, "submit_tool", submit_params("adder2", "def add(a, b):\n    return a + b")).await;
    assert_eq!(again["error"]["reason"], "duplicate");
    assert_eq!(again["error"]["data"]["existing_id"], first_id.as_str());
}

#[tokio::test]
async fn static_rejection_carries_reasons() {
    let app = app();
    let response = rpc(&app, "submit_tool", submit_params("evil", "import socket")).await;
    assert_eq!(response["error"]["reason"], "rejected_static");
    assert!(response["error"]["data"]["reasons"][0]
        .as_str()
        .unwrap()
        .contains("socket"));
}

#[tokio::test]
async fn discover_and_report_usage_flow() {
    let app = app();
    let submitted = rpc(&app, "submit_tool", submit_params("adder", "def add(a, b):\n    return a + b")).await;
    let id = submitted["result"]["id"].as_str().unwrap().to_string();

    let discovered = rpc(&app, "discover_tool", json!({ "intent": "add integers" })).await;
    let results = discovered["result"]["results"].as_array().unwrap();
    assert_eq!(results.len(), 1);
    assert_eq!(results[0]["id"], id.as_str());
    assert!(results[0]["similarity"].as_f64().unwrap() > 0.0);

    let reported = rpc(
        &app,
        "report_usage",
        json!({
            "tool_id": id,
            "agent_id": "agent-user",
            "success": true,
            "execution_time_ms": 30,
            "tokens_used": 200,
        }),
    )
    .await;
    assert_eq!(reported["result"]["delisted"], false);
    assert!(reported["result"]["fitness"].as_f64().unwrap() > 0.0);

    let listed = rpc(&app, "list_tools", json!({})).await;
    assert_eq!(listed["result"]["count"], 1);
    assert_eq!(listed["result"]["tools"][0]["total_uses"], 1);
}

#[tokio::test]
async fn malformed_requests_become_input_errors() {
    let app = app();

    let missing_field = rpc(&app, "submit_tool", json!({ "name": "incomplete" })).await;
    assert_eq!(missing_field["error"]["reason"], "invalid_input");

    let bad_id = rpc(&app, "get_tool", json!({ "id": "not-a-uuid" })).await;
    assert_eq!(bad_id["error"]["reason"], "invalid_input");

    let unknown_tool = rpc(
        &app,
        "get_tool",
        json!({ "id": "00000000-0000-4000-8000-000000000000" }),
    )
    .await;
    assert_eq!(unknown_tool["error"]["reason"], "not_found");

    let unknown_method = rpc(&app, "evolve_universe", json!({})).await;
    assert_eq!(unknown_method["error"]["reason"], "method_not_found");
}

#[tokio::test]
async fn health_endpoint_reports_ok() {
    let app = app();
    let response = app
        .clone()
        .oneshot(Request::builder().uri("/healthz").body(Body::empty()).unwrap())
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let bytes = axum::body::to_bytes(response.into_body(), usize::MAX).await.unwrap();
    let body: Value = serde_json::from_slice(&bytes).unwrap();
    assert_eq!(body["status"], "ok");
}
