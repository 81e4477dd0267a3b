// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0
//! # RPC Surface
//!
//! JSON-RPC-style request/response over HTTP: a single `POST /rpc`
//! dispatcher for the seven registry endpoints, plus `GET /healthz`.
//!
//! Every failure leaves this layer converted: input errors and policy
//! rejections carry a structured `reason`, and unexpected faults become an
//! opaque `internal_error` with a correlation id that links back to the
//! full tracing record. A persistence fault additionally flips the service
//! into a degraded state, visible on the health endpoint.

use axum::{
    extract::State,
    routing::{get, post},
    Json, Router,
};
use chrono::{DateTime, Utc};
use serde::Deserialize;
use serde_json::{json, Value};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tower_http::trace::TraceLayer;
use uuid::Uuid;

use crate::application::discovery::{DiscoverOptions, DiscoveryError, DiscoveryService};
use crate::application::publishing::{PublishError, PublishingService, ToolSubmission};
use crate::application::telemetry::{TelemetryError, TelemetryService, UsageIngest};
use crate::domain::repository::{RepositoryError, ToolListFilter};
use crate::domain::tool::{Tool, ToolId, TrustLevel};

pub struct AppState {
    pub publishing: Arc<PublishingService>,
    pub telemetry: Arc<TelemetryService>,
    pub discovery: Arc<DiscoveryService>,
    degraded: AtomicBool,
}

impl AppState {
    pub fn degraded(&self) -> bool {
        self.degraded.load(Ordering::Relaxed)
    }

    fn note_repository_failure(&self, err: &RepositoryError) {
        if matches!(err, RepositoryError::Database(_)) {
            self.degraded.store(true, Ordering::Relaxed);
        }
    }
}

pub fn app(
    publishing: Arc<PublishingService>,
    telemetry: Arc<TelemetryService>,
    discovery: Arc<DiscoveryService>,
) -> Router {
    let state = Arc::new(AppState {
        publishing,
        telemetry,
        discovery,
        degraded: AtomicBool::new(false),
    });

    Router::new()
        .route("/rpc", post(rpc))
        .route("/healthz", get(healthz))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

async fn healthz(State(state): State<Arc<AppState>>) -> Json<Value> {
    let status = if state.degraded() { "degraded" } else { "ok" };
    Json(json!({ "status": status }))
}

#[derive(Deserialize)]
struct RpcRequest {
    #[serde(default)]
    id: Value,
    method: String,
    #[serde(default)]
    params: Value,
}

/// A structured RPC failure: machine-readable `reason`, human-readable
/// `message`, optional details.
struct RpcFailure {
    code: i64,
    reason: &'static str,
    message: String,
    data: Value,
}

impl RpcFailure {
    fn new(code: i64, reason: &'static str, message: impl Into<String>) -> Self {
        Self { code, reason, message: message.into(), data: Value::Null }
    }

    fn with_data(mut self, data: Value) -> Self {
        self.data = data;
        self
    }

    fn invalid_input(message: impl Into<String>) -> Self {
        Self::new(-32602, "invalid_input", message)
    }

    fn internal(correlation_id: Uuid) -> Self {
        Self::new(-32000, "internal_error", "internal error")
            .with_data(json!({ "correlation_id": correlation_id.to_string() }))
    }
}

async fn rpc(State(state): State<Arc<AppState>>, body: String) -> Json<Value> {
    let request: RpcRequest = match serde_json::from_str(&body) {
        Ok(request) => request,
        Err(e) => {
            return error_response(
                Value::Null,
                RpcFailure::new(-32700, "parse_error", e.to_string()),
            )
        }
    };

    let id = request.id.clone();
    match dispatch(&state, &request.method, request.params).await {
        Ok(result) => Json(json!({ "jsonrpc": "2.0", "id": id, "result": result })),
        Err(failure) => error_response(id, failure),
    }
}

fn error_response(id: Value, failure: RpcFailure) -> Json<Value> {
    let mut error = json!({
        "code": failure.code,
        "reason": failure.reason,
        "message": failure.message,
    });
    if !failure.data.is_null() {
        error["data"] = failure.data;
    }
    Json(json!({ "jsonrpc": "2.0", "id": id, "error": error }))
}

async fn dispatch(state: &AppState, method: &str, params: Value) -> Result<Value, RpcFailure> {
    match method {
        "submit_tool" => submit_tool(state, params).await,
        "fork_tool" => fork_tool(state, params).await,
        "discover_tool" => discover_tool(state, params).await,
        "get_tool" => get_tool(state, params).await,
        "get_provenance" => get_provenance(state, params).await,
        "list_tools" => list_tools(state, params).await,
        "report_usage" => report_usage(state, params).await,
        other => Err(RpcFailure::new(
            -32601,
            "method_not_found",
            format!("unknown method '{other}'"),
        )),
    }
}

fn parse_params<T: serde::de::DeserializeOwned>(params: Value) -> Result<T, RpcFailure> {
    serde_json::from_value(params).map_err(|e| RpcFailure::invalid_input(e.to_string()))
}

fn parse_tool_id(raw: &str) -> Result<ToolId, RpcFailure> {
    ToolId::from_string(raw).map_err(|_| RpcFailure::invalid_input(format!("malformed tool id '{raw}'")))
}

// ============================================================================
// submit_tool / fork_tool
// ============================================================================

#[derive(Deserialize)]
struct SubmitParams {
    name: String,
    #[serde(default)]
    description: String,
    intent: String,
    code: String,
    test_case: String,
    #[serde(default)]
    tags: Vec<String>,
    #[serde(default)]
    input_schema: Option<Value>,
    author_agent_id: String,
}

impl From<SubmitParams> for ToolSubmission {
    fn from(p: SubmitParams) -> Self {
        ToolSubmission {
            name: p.name,
            description: p.description,
            intent: p.intent,
            code: p.code,
            test_case: p.test_case,
            tags: p.tags,
            input_schema: p.input_schema,
            author_agent_id: p.author_agent_id,
        }
    }
}

#[derive(Deserialize)]
struct ForkParams {
    parent_id: String,
    #[serde(flatten)]
    submission: SubmitParams,
}

fn publish_result(outcome: crate::application::publishing::PublishOutcome) -> Value {
    json!({
        "id": outcome.tool.id.to_string(),
        "content_hash": outcome.tool.content_hash,
        "fitness": outcome.tool.fitness_score,
        "trust_level": outcome.tool.trust_level,
        "version": outcome.tool.version,
        "verdict": outcome.verdict,
    })
}

async fn submit_tool(state: &AppState, params: Value) -> Result<Value, RpcFailure> {
    let params: SubmitParams = parse_params(params)?;
    let outcome = state
        .publishing
        .submit(params.into())
        .await
        .map_err(|e| publish_failure(state, e))?;
    Ok(publish_result(outcome))
}

async fn fork_tool(state: &AppState, params: Value) -> Result<Value, RpcFailure> {
    let params: ForkParams = parse_params(params)?;
    let parent_id = parse_tool_id(&params.parent_id)?;
    let outcome = state
        .publishing
        .fork(parent_id, params.submission.into())
        .await
        .map_err(|e| publish_failure(state, e))?;
    Ok(publish_result(outcome))
}

fn publish_failure(state: &AppState, err: PublishError) -> RpcFailure {
    match err {
        PublishError::InvalidInput(message) => RpcFailure::invalid_input(message),
        PublishError::Duplicate { existing_id } => {
            RpcFailure::new(-32001, "duplicate", "artifact already registered")
                .with_data(json!({ "existing_id": existing_id.to_string() }))
        }
        PublishError::RejectedStatic { scan } => {
            RpcFailure::new(-32002, "rejected_static", "static screening rejected the submission")
                .with_data(json!({ "reasons": scan.reasons }))
        }
        PublishError::RejectedRuntime { verdict } => {
            RpcFailure::new(-32003, "rejected_runtime", "declared test failed in the sandbox")
                .with_data(json!({ "verdict": verdict }))
        }
        PublishError::Overloaded => {
            RpcFailure::new(-32004, "overloaded", "sandbox pool is at capacity; retry later")
        }
        PublishError::ParentNotFound(id) => {
            RpcFailure::new(-32005, "parent_not_found", format!("parent tool {id} not found"))
        }
        PublishError::ParentDelisted(id) => {
            RpcFailure::new(-32006, "parent_delisted", format!("parent tool {id} is delisted"))
        }
        PublishError::Repository(repo_err) => repository_failure(state, repo_err),
        PublishError::Sandbox(sandbox_err) => {
            let correlation_id = Uuid::new_v4();
            tracing::error!(%correlation_id, error = %sandbox_err, "sandbox infrastructure fault");
            RpcFailure::internal(correlation_id)
        }
    }
}

fn repository_failure(state: &AppState, err: RepositoryError) -> RpcFailure {
    state.note_repository_failure(&err);
    let correlation_id = Uuid::new_v4();
    tracing::error!(%correlation_id, error = %err, "repository fault");
    RpcFailure::internal(correlation_id)
}

// ============================================================================
// discover_tool
// ============================================================================

#[derive(Deserialize)]
struct DiscoverParams {
    intent: String,
    #[serde(default)]
    k: Option<usize>,
    #[serde(default)]
    min_fitness: Option<f64>,
    #[serde(default)]
    min_trust: Option<TrustLevel>,
    #[serde(default)]
    include_delisted: bool,
    #[serde(default)]
    tags: Option<Vec<String>>,
}

async fn discover_tool(state: &AppState, params: Value) -> Result<Value, RpcFailure> {
    let params: DiscoverParams = parse_params(params)?;
    let opts = DiscoverOptions {
        k: params.k,
        min_fitness: params.min_fitness.unwrap_or(0.0),
        min_trust: params.min_trust.unwrap_or(TrustLevel::Verified),
        include_delisted: params.include_delisted,
        tags: params.tags,
    };
    let results = state
        .discovery
        .discover(&params.intent, opts)
        .await
        .map_err(|e| discovery_failure(state, e))?;

    let results: Vec<Value> = results
        .iter()
        .map(|found| {
            json!({
                "id": found.tool.id.to_string(),
                "name": found.tool.name,
                "description": found.tool.description,
                "fitness": found.tool.fitness_score,
                "trust_level": found.tool.trust_level,
                "similarity": found.similarity,
            })
        })
        .collect();
    Ok(json!({ "results": results }))
}

fn discovery_failure(state: &AppState, err: DiscoveryError) -> RpcFailure {
    match err {
        DiscoveryError::InvalidInput(message) => RpcFailure::invalid_input(message),
        DiscoveryError::NotFound(id) => {
            RpcFailure::new(-32007, "not_found", format!("tool {id} not found"))
        }
        DiscoveryError::Repository(repo_err) => repository_failure(state, repo_err),
    }
}

// ============================================================================
// get_tool / get_provenance / list_tools
// ============================================================================

#[derive(Deserialize)]
struct GetParams {
    id: String,
}

async fn get_tool(state: &AppState, params: Value) -> Result<Value, RpcFailure> {
    let params: GetParams = parse_params(params)?;
    let id = parse_tool_id(&params.id)?;
    let tool = state
        .discovery
        .get(id)
        .await
        .map_err(|e| discovery_failure(state, e))?;
    serde_json::to_value(&tool).map_err(|e| {
        let correlation_id = Uuid::new_v4();
        tracing::error!(%correlation_id, error = %e, "tool serialization fault");
        RpcFailure::internal(correlation_id)
    })
}

async fn get_provenance(state: &AppState, params: Value) -> Result<Value, RpcFailure> {
    let params: GetParams = parse_params(params)?;
    let id = parse_tool_id(&params.id)?;
    let chain = state
        .discovery
        .provenance(id)
        .await
        .map_err(|e| discovery_failure(state, e))?;
    let chain: Vec<Value> = chain
        .iter()
        .map(|tool| {
            json!({
                "id": tool.id.to_string(),
                "content_hash": tool.content_hash,
                "version": tool.version,
                "signature": tool.signature,
                "exec_ms": tool.exec_ms,
                "security_scan": tool.security_scan_passed,
            })
        })
        .collect();
    Ok(json!({ "chain": chain }))
}

#[derive(Deserialize, Default)]
struct ListFilterParams {
    #[serde(default)]
    delisted: Option<bool>,
    #[serde(default)]
    min_fitness: Option<f64>,
    #[serde(default, alias = "trust_level")]
    min_trust: Option<TrustLevel>,
    #[serde(default)]
    author: Option<String>,
    #[serde(default)]
    tag: Option<String>,
    #[serde(default)]
    limit: Option<u32>,
    #[serde(default)]
    offset: Option<u32>,
}

#[derive(Deserialize, Default)]
struct ListParams {
    #[serde(default)]
    filter: ListFilterParams,
}

fn tool_summary(tool: &Tool) -> Value {
    json!({
        "id": tool.id.to_string(),
        "name": tool.name,
        "description": tool.description,
        "version": tool.version,
        "fitness": tool.fitness_score,
        "trust_level": tool.trust_level,
        "tags": tool.tags,
        "author_agent_id": tool.author_agent_id,
        "total_uses": tool.telemetry.total_uses,
        "delisted": tool.delisted,
        "created_at": tool.created_at,
    })
}

async fn list_tools(state: &AppState, params: Value) -> Result<Value, RpcFailure> {
    let params: ListParams = if params.is_null() {
        ListParams::default()
    } else {
        parse_params(params)?
    };
    let filter = ToolListFilter {
        delisted: params.filter.delisted,
        min_fitness: params.filter.min_fitness,
        min_trust_level: params.filter.min_trust,
        author: params.filter.author,
        tag: params.filter.tag,
        limit: params.filter.limit,
        offset: params.filter.offset,
    };
    let tools = state
        .discovery
        .list(&filter)
        .await
        .map_err(|e| discovery_failure(state, e))?;
    Ok(json!({
        "tools": tools.iter().map(tool_summary).collect::<Vec<_>>(),
        "count": tools.len(),
        "limit": filter.effective_limit(),
        "offset": filter.effective_offset(),
    }))
}

// ============================================================================
// report_usage
// ============================================================================

#[derive(Deserialize)]
struct ReportUsageParams {
    tool_id: String,
    agent_id: String,
    success: bool,
    execution_time_ms: u64,
    #[serde(default)]
    tokens_used: Option<u64>,
    #[serde(default)]
    timestamp: Option<DateTime<Utc>>,
}

async fn report_usage(state: &AppState, params: Value) -> Result<Value, RpcFailure> {
    let params: ReportUsageParams = parse_params(params)?;
    let tool_id = parse_tool_id(&params.tool_id)?;
    let ingest = UsageIngest {
        tool_id,
        agent_id: params.agent_id,
        success: params.success,
        execution_time_ms: params.execution_time_ms,
        tokens_used: params.tokens_used,
        timestamp: params.timestamp,
    };
    let result = state
        .telemetry
        .report_usage(ingest)
        .await
        .map_err(|e| telemetry_failure(state, e))?;
    Ok(json!({
        "fitness": result.fitness,
        "delisted": result.delisted,
        "trust_level": result.trust_level,
        "duplicate": result.duplicate,
    }))
}

fn telemetry_failure(state: &AppState, err: TelemetryError) -> RpcFailure {
    match err {
        TelemetryError::InvalidInput(message) => RpcFailure::invalid_input(message),
        TelemetryError::NotFound(id) => {
            RpcFailure::new(-32007, "not_found", format!("tool {id} not found"))
        }
        TelemetryError::Repository(repo_err) => repository_failure(state, repo_err),
    }
}
