// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0

pub mod config;
pub mod fitness;
pub mod repository;
pub mod sandbox;
pub mod screener;
pub mod tool;
pub mod verdict;

pub use config::*;
pub use fitness::*;
pub use repository::*;
pub use sandbox::*;
pub use screener::*;
pub use tool::*;
pub use verdict::*;
