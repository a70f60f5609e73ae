// Copyright (c) 2024-2026 Martin Schröder <info@swedishembedded.com>
//
// SPDX-License-Identifier: Apache-2.0
mod loader;
mod persistent;
mod rules;
mod schema;

pub use loader::load;
pub use persistent::{config_dir, PersistentStore};
pub use rules::RuleFile;
pub use schema::*;
