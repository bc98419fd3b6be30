// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0

pub mod fanout;
pub mod formatter;
pub mod jury;
pub mod lifecycle;
pub mod memory_service;
pub mod moderation;
pub mod reflection;

pub use jury::{JuryError, JuryRequest, JuryService};
pub use memory_service::MemoryService;
