// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0

pub mod db;
pub mod embedding;
pub mod repositories;
pub mod sandbox;

pub use db::Database;
pub use embedding::{BagOfWordsEmbedder, EmbeddingIndex, IntentEmbedder};
pub use repositories::{InMemoryToolRepository, SqliteToolRepository};
pub use sandbox::ProcessSandbox;
