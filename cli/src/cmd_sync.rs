// SPDX-FileCopyrightText: 2025-2026 Zexin Yuan <aim@yzx9.xyz>
//
// SPDX-License-Identifier: Apache-2.0

use std::error::Error;

use clap::{ArgMatches, Command, arg};
use colored::Colorize;
use pimdav_caldav::CalendarBackend;

use crate::account::Account;

/// Discovers what the server supports for the configured collection.
#[derive(Debug, Clone, Copy)]
pub struct CmdProbe;

impl CmdProbe {
    pub const NAME: &str = "probe";

    pub fn command() -> Command {
        Command::new(Self::NAME).about("Discover the capabilities of the configured collection")
    }

    pub fn from(_matches: &ArgMatches) -> Self {
        Self
    }

    pub async fn run(self, account: &mut Account) -> Result<(), Box<dyn Error>> {
        tracing::debug!(?self, "probing server...");
        account.backend.invalidate_probe().await;
        let outcome = account.backend.connect(&account.cancel).await?;
        let caps = outcome.capabilities;
        println!("{} {}", "writable:".bold(), caps.writable);
        println!("{} {}", "scheduling:".bold(), caps.scheduling.scheduling);
        println!(
            "{} {}",
            "auto-scheduling:".bold(),
            caps.scheduling.auto_scheduling
        );
        println!("{} {:?}", "quirks:".bold(), caps.quirks);
        Ok(())
    }
}

/// Brings the local cache up to date with the collection.
#[derive(Debug, Clone, Copy)]
pub struct CmdSync {
    pub full: bool,
}

impl CmdSync {
    pub const NAME: &str = "sync";

    pub fn command() -> Command {
        Command::new(Self::NAME)
            .about("Refresh the local cache from the server")
            .arg(arg!(--full "Ignore the stored change tag and list the whole collection"))
    }

    pub fn from(matches: &ArgMatches) -> Self {
        Self {
            full: matches.get_flag("full"),
        }
    }

    pub async fn run(self, account: &mut Account) -> Result<(), Box<dyn Error>> {
        tracing::debug!(?self, "synchronizing...");
        let summary = account.sync(self.full).await?;
        if account.cancel.is_cancelled() {
            println!("{}", "Interrupted, partial changes kept".yellow());
        }
        println!(
            "{} created, {} modified, {} removed, {} cached",
            summary.created,
            summary.modified,
            summary.removed,
            account.cache.len()
        );
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_sync() {
        let cmd = Command::new("test").subcommand(CmdSync::command());
        let matches = cmd.try_get_matches_from(["test", "sync", "--full"]).unwrap();
        let sub_matches = matches.subcommand_matches(CmdSync::NAME).unwrap();
        assert!(CmdSync::from(sub_matches).full);

        let cmd = Command::new("test").subcommand(CmdSync::command());
        let matches = cmd.try_get_matches_from(["test", "sync"]).unwrap();
        let sub_matches = matches.subcommand_matches(CmdSync::NAME).unwrap();
        assert!(!CmdSync::from(sub_matches).full);
    }
}
