// SPDX-FileCopyrightText: 2025-2026 Zexin Yuan <aim@yzx9.xyz>
//
// SPDX-License-Identifier: Apache-2.0

//! pimdav - keep a local calendar cache in step with a `CalDAV` collection.

mod account;
mod cli;
mod cmd_free_busy;
mod cmd_object;
mod cmd_sync;
mod config;
mod state;

pub use crate::cli::{Cli, Commands, run};
pub use crate::config::{Config, parse_config};
