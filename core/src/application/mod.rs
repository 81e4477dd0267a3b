// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0

pub mod discovery;
pub mod gauntlet;
pub mod publishing;
pub mod telemetry;

use dashmap::DashMap;
use std::sync::Arc;
use tokio::sync::Mutex;
use uuid::Uuid;

use crate::domain::tool::ToolId;

/// Per-tool mutual exclusion for registry mutations. Reads proceed
/// concurrently; writers against the same tool id are serialized in the
/// order they arrive.
#[derive(Default)]
pub struct ToolLockTable {
    locks: DashMap<Uuid, Arc<Mutex<()>>>,
}

impl ToolLockTable {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn handle(&self, id: ToolId) -> Arc<Mutex<()>> {
        self.locks
            .entry(id.0)
            .or_insert_with(|| Arc::new(Mutex::new(())))
            .clone()
    }
}
