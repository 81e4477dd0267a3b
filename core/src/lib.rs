// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0
//! # agentevolution-core
//!
//! The core crate for AgentEvolution — a local registry-and-verification
//! service through which autonomous agents publish, discover, and improve
//! executable tools. It owns the full publish → verify → rank → evolve loop:
//! submitted code is statically screened, executed in isolation against its
//! declared test, content-addressed, scored by a multi-factor fitness
//! function, and served back to other agents by semantic intent.
//!
//! ## Subsystems
//!
//! | Subsystem | Key modules |
//! |---|---|
//! | **Gauntlet** (screen + sandbox) | [`domain::screener`], [`domain::sandbox`], [`application::gauntlet`] |
//! | **Content-Addressed Registry** | [`domain::tool`], [`domain::repository`], [`infrastructure::repositories`] |
//! | **Fitness Engine** | [`domain::fitness`], [`application::telemetry`] |
//! | **Semantic Discovery** | [`infrastructure::embedding`], [`application::discovery`] |
//!
//! ## Layer Structure
//!
//! ```text
//! presentation/   ← HTTP RPC surface (axum)
//!     ↓
//! application/    ← Use-cases, service objects, orchestration
//!     ↓
//! domain/         ← Aggregates, value objects, pure policy, repository traits
//!     ↓
//! infrastructure/ ← SQLite repository, process sandbox, embedding index
//! ```
//!
//! ## Integration Tests
//!
//! See `core/tests/` for integration tests covering the registry invariants
//! and the end-to-end evolution loop.

pub mod domain;
pub mod application;
pub mod infrastructure;
pub mod presentation;

pub use domain::*;
