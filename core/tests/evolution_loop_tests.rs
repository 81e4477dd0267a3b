// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0
//! End-to-end tests of the publish → verify → rank → evolve loop, wired
//! against the in-memory repository and a scripted sandbox so the suite
//! needs no interpreter on the host.

use async_trait::async_trait;
use chrono::{DateTime, Duration, Utc};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use agentevolution_core::application::discovery::{DiscoverOptions, DiscoveryService};
use agentevolution_core::application::gauntlet::Gauntlet;
use agentevolution_core::application::publishing::{
    PublishError, PublishingService, ToolSubmission,
};
use agentevolution_core::application::telemetry::{TelemetryService, UsageIngest};
use agentevolution_core::application::ToolLockTable;
use agentevolution_core::domain::config::DiscoveryConfig;
use agentevolution_core::domain::fitness::FitnessParams;
use agentevolution_core::domain::repository::ToolListFilter;
use agentevolution_core::domain::sandbox::{SandboxError, SandboxExecutor, SandboxLimits};
use agentevolution_core::domain::screener::StaticScreener;
use agentevolution_core::domain::tool::{content_hash, ToolId, TrustLevel};
use agentevolution_core::domain::verdict::ExecutionReport;
use agentevolution_core::infrastructure::{
    BagOfWordsEmbedder, EmbeddingIndex, InMemoryToolRepository,
};

/// Scripted sandbox: an infinite-loop marker in the code times out, all
/// other submissions pass quickly.
struct ScriptedSandbox {
    invocations: AtomicUsize,
}

#[async_trait]
impl SandboxExecutor for ScriptedSandbox {
    async fn execute(
        &self,
        code: &str,
        _test_case: &str,
        limits: SandboxLimits,
    ) -> Result<ExecutionReport, SandboxError> {
        self.invocations.fetch_add(1, Ordering::SeqCst);
        if code.contains("while True") {
            return Ok(ExecutionReport {
                exit_code: 137,
                stdout: String::new(),
                stderr: String::new(),
                wall_ms: limits.wall_clock_secs * 1000,
                cpu_ms: limits.wall_clock_secs * 1000,
                peak_mem_kb: 1024,
                timed_out: true,
                oom: false,
            });
        }
        Ok(ExecutionReport {
            exit_code: 0,
            stdout: String::new(),
            stderr: String::new(),
            wall_ms: 40,
            cpu_ms: 30,
            peak_mem_kb: 2048,
            timed_out: false,
            oom: false,
        })
    }
}

struct Harness {
    publishing: PublishingService,
    telemetry: TelemetryService,
    discovery: DiscoveryService,
    sandbox: Arc<ScriptedSandbox>,
}

fn harness() -> Harness {
    let repo = Arc::new(InMemoryToolRepository::new());
    let index = Arc::new(EmbeddingIndex::new(Arc::new(BagOfWordsEmbedder)));
    let sandbox = Arc::new(ScriptedSandbox { invocations: AtomicUsize::new(0) });
    let locks = Arc::new(ToolLockTable::new());
    let gauntlet = Gauntlet::new(
        StaticScreener::default(),
        sandbox.clone(),
        SandboxLimits::default(),
    );
    Harness {
        publishing: PublishingService::new(
            gauntlet,
            repo.clone(),
            index.clone(),
            FitnessParams::default(),
            locks.clone(),
        ),
        telemetry: TelemetryService::new(
            repo.clone(),
            index.clone(),
            FitnessParams::default(),
            locks,
        ),
        discovery: DiscoveryService::new(repo, index, DiscoveryConfig::default()),
        sandbox,
    }
}

fn submission(name: &str, intent: &str, code: &str, test_case: &str) -> ToolSubmission {
    ToolSubmission {
        name: name.to_string(),
        description: format!("{name} description"),
        intent: intent.to_string(),
        code: code.to_string(),
        test_case: test_case.to_string(),
        tags: vec!["utility".to_string()],
        input_schema: None,
        author_agent_id: "agent-author".to_string(),
    }
}

fn adder() -> ToolSubmission {
    submission(
        "adder",
        "add two integers together",
        "def add(a, b):\n    return a + b",
        "assert add(2, 3) == 5",
    )
}

fn ts(offset_secs: i64) -> DateTime<Utc> {
    DateTime::parse_from_rfc3339("2026-07-01T00:00:00Z")
        .unwrap()
        .with_timezone(&Utc)
        + Duration::seconds(offset_secs)
}

fn usage(tool_id: ToolId, agent: &str, success: bool, offset_secs: i64) -> UsageIngest {
    UsageIngest {
        tool_id,
        agent_id: agent.to_string(),
        success,
        execution_time_ms: 50,
        tokens_used: None,
        timestamp: Some(ts(offset_secs)),
    }
}

#[tokio::test]
async fn submit_verifies_and_seeds_fitness() {
    let h = harness();
    let outcome = h.publishing.submit(adder()).await.unwrap();

    assert!(outcome.verdict.approved);
    assert!(outcome.verdict.test_passed);
    assert_eq!(outcome.tool.trust_level, TrustLevel::Verified);
    assert_eq!(
        outcome.tool.content_hash,
        content_hash("def add(a, b):\n    return a + b", "assert add(2, 3) == 5")
    );
    // Neutral tokens, fast run, zero adoption, full freshness.
    assert!(
        outcome.tool.fitness_score > 0.3 && outcome.tool.fitness_score < 0.6,
        "seed fitness {}",
        outcome.tool.fitness_score
    );
}

#[tokio::test]
async fn duplicate_submission_points_at_the_original() {
    let h = harness();
    let first = h.publishing.submit(adder()).await.unwrap();

    let mut again = adder();
    again.name = "adder-clone".to_string();
    let err = h.publishing.submit(again).await.unwrap_err();
    match err {
        PublishError::Duplicate { existing_id } => assert_eq!(existing_id, first.tool.id),
        other => panic!("expected Duplicate, got {other:?}"),
    }

    let listed = h.discovery.list(&ToolListFilter::default()).await.unwrap();
    assert_eq!(listed.len(), 1);
}

#[tokio::test]
async fn runaway_test_case_is_rejected_and_not_persisted() {
    let h = harness();
    let err = h
        .publishing
        .submit(submission(
            "spinner",
            "spin forever",
            "def spin():\n    while True:\n        pass",
            "spin()",
        ))
        .await
        .unwrap_err();

    match err {
        PublishError::RejectedRuntime { verdict } => {
            assert!(verdict.timed_out);
            assert!(!verdict.approved);
        }
        other => panic!("expected RejectedRuntime, got {other:?}"),
    }
    assert!(h.discovery.list(&ToolListFilter::default()).await.unwrap().is_empty());
}

#[tokio::test]
async fn forbidden_import_is_rejected_before_the_sandbox() {
    let h = harness();
    let err = h
        .publishing
        .submit(submission(
            "exfiltrator",
            "fetch remote data",
            "import socket\n",
            "assert True",
        ))
        .await
        .unwrap_err();

    assert!(matches!(err, PublishError::RejectedStatic { .. }));
    assert_eq!(h.sandbox.invocations.load(Ordering::SeqCst), 0);
    assert!(h.discovery.list(&ToolListFilter::default()).await.unwrap().is_empty());
}

#[tokio::test]
async fn healthy_usage_escalates_trust_and_fitness() {
    let h = harness();
    let tool = h.publishing.submit(adder()).await.unwrap().tool;

    let agents = ["agent-a", "agent-b", "agent-c"];
    let mut last = None;
    for i in 0..20 {
        let agent = agents[i % agents.len()];
        last = Some(
            h.telemetry
                .report_usage(usage(tool.id, agent, true, i as i64))
                .await
                .unwrap(),
        );
    }
    let last = last.unwrap();

    assert_eq!(last.trust_level, TrustLevel::BattleTested);
    assert!(last.fitness > 0.7, "fitness {}", last.fitness);
    assert!(!last.delisted);

    let loaded = h.discovery.get(tool.id).await.unwrap();
    assert_eq!(loaded.trust_level, TrustLevel::BattleTested);
    assert_eq!(loaded.telemetry.total_uses, 20);
    assert_eq!(loaded.telemetry.unique_agents, 3);
}

#[tokio::test]
async fn failing_tool_is_delisted_and_hidden_from_discovery() {
    let h = harness();
    let tool = h.publishing.submit(adder()).await.unwrap().tool;
    assert!(!h
        .discovery
        .discover("add integers", DiscoverOptions::default())
        .await
        .unwrap()
        .is_empty());

    let mut delisted_at = None;
    for i in 0..10 {
        let result = h
            .telemetry
            .report_usage(usage(tool.id, "agent-x", false, i))
            .await
            .unwrap();
        if result.delisted && delisted_at.is_none() {
            delisted_at = Some(i + 1);
        }
    }
    // Delisted once the observation minimum is met, not before.
    assert_eq!(delisted_at, Some(5));

    let results = h
        .discovery
        .discover("add integers", DiscoverOptions::default())
        .await
        .unwrap();
    assert!(results.is_empty());

    // Still queryable by id, terminally delisted.
    let loaded = h.discovery.get(tool.id).await.unwrap();
    assert!(loaded.delisted);
    assert_eq!(loaded.telemetry.total_uses, 5);
}

#[tokio::test]
async fn fork_carries_lineage_and_version() {
    let h = harness();
    let root = h.publishing.submit(adder()).await.unwrap().tool;

    let fork = h
        .publishing
        .fork(
            root.id,
            submission(
                "adder",
                "add two integers together, faster",
                "def add(a, b):\n    return a + b  # v2",
                "assert add(2, 3) == 5",
            ),
        )
        .await
        .unwrap()
        .tool;

    assert_eq!(fork.parent_tool_id, Some(root.id));
    assert_eq!(fork.version, 2);

    let chain = h.discovery.provenance(fork.id).await.unwrap();
    assert_eq!(chain.len(), 2);
    assert_eq!(chain[0].id, root.id);
    assert_eq!(chain[1].id, fork.id);

    // A grandchild extends the same lineage root.
    let grandchild = h
        .publishing
        .fork(
            fork.id,
            submission(
                "adder",
                "add two integers with docs",
                "def add(a, b):\n    \"\"\"Add.\"\"\"\n    return a + b",
                "assert add(2, 3) == 5",
            ),
        )
        .await
        .unwrap()
        .tool;
    assert_eq!(grandchild.version, 3);
    let chain = h.discovery.provenance(grandchild.id).await.unwrap();
    assert_eq!(chain.len(), 3);
    assert_eq!(chain[0].id, root.id);

    // The original stays active throughout.
    assert!(!h.discovery.get(root.id).await.unwrap().delisted);
}

#[tokio::test]
async fn fork_rejects_missing_or_delisted_parent() {
    let h = harness();
    let missing = h.publishing.fork(ToolId::new(), adder()).await.unwrap_err();
    assert!(matches!(missing, PublishError::ParentNotFound(_)));

    let tool = h.publishing.submit(adder()).await.unwrap().tool;
    for i in 0..5 {
        h.telemetry
            .report_usage(usage(tool.id, "agent-x", false, i))
            .await
            .unwrap();
    }
    let err = h
        .publishing
        .fork(
            tool.id,
            submission("adder", "retry", "def add(a, b):\n    return b + a", "assert add(1, 1) == 2"),
        )
        .await
        .unwrap_err();
    assert!(matches!(err, PublishError::ParentDelisted(_)));
}

#[tokio::test]
async fn duplicate_usage_report_is_a_no_op() {
    let h = harness();
    let tool = h.publishing.submit(adder()).await.unwrap().tool;

    let first = h
        .telemetry
        .report_usage(usage(tool.id, "agent-a", true, 1))
        .await
        .unwrap();
    let replay = h
        .telemetry
        .report_usage(usage(tool.id, "agent-a", true, 1))
        .await
        .unwrap();

    assert!(!first.duplicate);
    assert!(replay.duplicate);
    let loaded = h.discovery.get(tool.id).await.unwrap();
    assert_eq!(loaded.telemetry.total_uses, 1);
}

#[tokio::test]
async fn discovery_ranks_by_intent_and_respects_filters() {
    let h = harness();
    let adder_tool = h.publishing.submit(adder()).await.unwrap().tool;
    h.publishing
        .submit(submission(
            "greeter",
            "format friendly greeting messages",
            "def greet(name):\n    return 'hello ' + name",
            "assert greet('x') == 'hello x'",
        ))
        .await
        .unwrap();

    // Insert-then-discover with the same intent finds the inserted tool.
    let results = h
        .discovery
        .discover("add two integers", DiscoverOptions::default())
        .await
        .unwrap();
    assert!(!results.is_empty());
    assert_eq!(results[0].tool.id, adder_tool.id);
    assert!(results[0].similarity > 0.0);

    // A fitness floor above the seed score filters everything out; nothing
    // unrelated is substituted.
    let strict = h
        .discovery
        .discover(
            "add two integers",
            DiscoverOptions { min_fitness: 0.99, ..Default::default() },
        )
        .await
        .unwrap();
    assert!(strict.is_empty());

    // Tag filtering is conjunctive.
    let tagged = h
        .discovery
        .discover(
            "add two integers",
            DiscoverOptions { tags: Some(vec!["utility".to_string()]), ..Default::default() },
        )
        .await
        .unwrap();
    assert!(!tagged.is_empty());
    let wrong_tag = h
        .discovery
        .discover(
            "add two integers",
            DiscoverOptions { tags: Some(vec!["networking".to_string()]), ..Default::default() },
        )
        .await
        .unwrap();
    assert!(wrong_tag.is_empty());
}

#[tokio::test]
async fn unrelated_intent_returns_empty() {
    let h = harness();
    h.publishing.submit(adder()).await.unwrap();
    let results = h
        .discovery
        .discover("zebra xylophone quantum", DiscoverOptions::default())
        .await
        .unwrap();
    assert!(results.is_empty());
}
