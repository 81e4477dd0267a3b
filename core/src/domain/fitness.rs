// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0
//! Fitness Engine — pure scoring over usage telemetry.
//!
//! Fitness is a weighted sum in `[0, 1]` over five signals: success rate,
//! token efficiency, speed, adoption, and freshness. It is a pure function
//! of `(telemetry, params, now)` — the engine holds no state, so the same
//! inputs at a fixed clock always produce the same score. Scores drive
//! discovery ranking, the delisting policy, and trust escalation.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::domain::tool::{Tool, TrustLevel};

/// Weights and budgets of the fitness function. All defaults are part of
/// the service contract; operators may tune them in configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct FitnessParams {
    pub weight_success: f64,
    pub weight_tokens: f64,
    pub weight_speed: f64,
    pub weight_adoption: f64,
    pub weight_freshness: f64,
    /// Token budget against which mean `tokens_used` is normalized.
    pub tokens_budget: f64,
    /// Execution-time budget in milliseconds.
    pub speed_budget_ms: f64,
    /// Distinct-agent count at which adoption saturates.
    pub adoption_cap: u64,
    /// Freshness half-life in days.
    pub half_life_days: f64,
    /// Minimum usage reports before the delisting policy applies.
    pub min_observations: u64,
    /// Success-rate floor below which a tool is delisted.
    pub success_rate_floor: f64,
    /// Fitness floor; sustained breaches across `min_observations`
    /// consecutive reports delist the tool.
    pub fitness_floor: f64,
}

impl Default for FitnessParams {
    fn default() -> Self {
        Self {
            weight_success: 0.35,
            weight_tokens: 0.25,
            weight_speed: 0.20,
            weight_adoption: 0.10,
            weight_freshness: 0.10,
            tokens_budget: 1000.0,
            speed_budget_ms: 5000.0,
            adoption_cap: 32,
            half_life_days: 30.0,
            min_observations: 5,
            success_rate_floor: 0.1,
            fitness_floor: 0.05,
        }
    }
}

/// The telemetry snapshot the fitness function consumes.
#[derive(Debug, Clone)]
pub struct FitnessInputs {
    pub total_uses: u64,
    pub successful_uses: u64,
    pub unique_agents: u64,
    pub avg_execution_time_ms: f64,
    pub avg_tokens_used: Option<f64>,
    pub created_at: DateTime<Utc>,
}

fn clamp01(v: f64) -> f64 {
    v.clamp(0.0, 1.0)
}

pub fn success_rate(inputs: &FitnessInputs) -> f64 {
    inputs.successful_uses as f64 / (inputs.total_uses.max(1)) as f64
}

/// `clamp(1 − tokens_per_use / budget, 0, 1)`; neutral 0.5 when no token
/// data has been reported.
fn token_efficiency(inputs: &FitnessInputs, params: &FitnessParams) -> f64 {
    match inputs.avg_tokens_used {
        Some(tokens_per_use) => clamp01(1.0 - tokens_per_use / params.tokens_budget),
        None => 0.5,
    }
}

fn speed(inputs: &FitnessInputs, params: &FitnessParams) -> f64 {
    clamp01(1.0 - inputs.avg_execution_time_ms / params.speed_budget_ms)
}

/// Diminishing returns on distinct adopters: `log2(n+1) / log2(cap+1)`.
fn adoption(inputs: &FitnessInputs, params: &FitnessParams) -> f64 {
    let cap = (params.adoption_cap as f64 + 1.0).log2();
    ((inputs.unique_agents as f64 + 1.0).log2() / cap).min(1.0)
}

fn freshness(inputs: &FitnessInputs, params: &FitnessParams, now: DateTime<Utc>) -> f64 {
    let age_days = (now - inputs.created_at).num_seconds().max(0) as f64 / 86_400.0;
    (-age_days / params.half_life_days).exp()
}

/// The fitness score in `[0, 1]`. Deterministic given telemetry and `now`.
pub fn compute_fitness(inputs: &FitnessInputs, params: &FitnessParams, now: DateTime<Utc>) -> f64 {
    let score = params.weight_success * success_rate(inputs)
        + params.weight_tokens * token_efficiency(inputs, params)
        + params.weight_speed * speed(inputs, params)
        + params.weight_adoption * adoption(inputs, params)
        + params.weight_freshness * freshness(inputs, params, now);
    clamp01(score)
}

/// Why a tool was removed from discovery. Terminal either way.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum DelistReason {
    SuccessRateBelowFloor,
    SustainedLowFitness,
}

impl DelistReason {
    pub fn as_str(&self) -> &'static str {
        match self {
            DelistReason::SuccessRateBelowFloor => "success_rate_below_floor",
            DelistReason::SustainedLowFitness => "sustained_low_fitness",
        }
    }
}

/// Delisting decision after a usage report has been applied.
/// `low_fitness_streak` counts consecutive reports with fitness below the
/// floor, including the current one.
pub fn should_delist(
    inputs: &FitnessInputs,
    low_fitness_streak: u64,
    params: &FitnessParams,
) -> Option<DelistReason> {
    if inputs.total_uses < params.min_observations {
        return None;
    }
    if success_rate(inputs) < params.success_rate_floor {
        return Some(DelistReason::SuccessRateBelowFloor);
    }
    if low_fitness_streak >= params.min_observations {
        return Some(DelistReason::SustainedLowFitness);
    }
    None
}

/// One-way escalation from Verified to BattleTested. There is no demotion
/// path.
pub fn should_escalate_trust(tool: &Tool) -> bool {
    tool.trust_level == TrustLevel::Verified
        && tool.telemetry.total_uses >= 20
        && tool.success_rate() >= 0.9
        && tool.telemetry.unique_agents >= 3
}
