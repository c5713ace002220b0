// SPDX-FileCopyrightText: 2025-2026 Zexin Yuan <aim@yzx9.xyz>
//
// SPDX-License-Identifier: Apache-2.0

use std::error::Error;

use clap::{ArgMatches, Command, arg, value_parser};
use jiff::{SignedDuration, Timestamp};
use pimdav_caldav::CalendarBackend;

use crate::account::Account;

/// Looks up when other users are busy.
#[derive(Debug, Clone)]
pub struct CmdFreeBusy {
    pub users: Vec<String>,
    pub start: Option<Timestamp>,
    pub hours: i64,
}

impl CmdFreeBusy {
    pub const NAME: &str = "free-busy";

    pub fn command() -> Command {
        Command::new(Self::NAME)
            .alias("fb")
            .about("Query free/busy data of other users")
            .arg(arg!(<USER> ... "E-mail addresses of the users").required(true))
            .arg(
                arg!(--start <TIME> "Start of the range, e.g. 2025-06-02T08:00:00Z; defaults to now")
                    .value_parser(value_parser!(Timestamp)),
            )
            .arg(
                arg!(--hours <HOURS> "Length of the range")
                    .value_parser(value_parser!(i64).range(1..))
                    .default_value("24"),
            )
    }

    pub fn from(matches: &ArgMatches) -> Self {
        Self {
            users: matches
                .get_many::<String>("USER")
                .map(|users| users.cloned().collect())
                .unwrap_or_default(),
            start: matches.get_one::<Timestamp>("start").copied(),
            hours: matches.get_one::<i64>("hours").copied().unwrap_or(24),
        }
    }

    pub async fn run(self, account: &mut Account) -> Result<(), Box<dyn Error>> {
        tracing::debug!(?self, "querying free/busy...");
        let start = self.start.unwrap_or_else(Timestamp::now);
        let end = start.checked_add(SignedDuration::from_hours(self.hours))?;
        let answers = account
            .backend
            .get_free_busy(&self.users, start, end, &account.cancel)
            .await?;
        if answers.is_empty() {
            println!("No free/busy data found");
        }
        for answer in answers {
            print!("{answer}");
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_free_busy() {
        let cmd = Command::new("test").subcommand(CmdFreeBusy::command());
        let matches = cmd
            .try_get_matches_from([
                "test",
                "free-busy",
                "bob@example.org",
                "eve@example.org",
                "--start",
                "2025-06-02T08:00:00Z",
                "--hours",
                "8",
            ])
            .unwrap();
        let sub_matches = matches.subcommand_matches(CmdFreeBusy::NAME).unwrap();
        let parsed = CmdFreeBusy::from(sub_matches);
        assert_eq!(parsed.users, vec!["bob@example.org", "eve@example.org"]);
        assert_eq!(
            parsed.start,
            Some("2025-06-02T08:00:00Z".parse::<Timestamp>().unwrap())
        );
        assert_eq!(parsed.hours, 8);
    }

    #[test]
    fn test_free_busy_needs_a_user() {
        let cmd = Command::new("test").subcommand(CmdFreeBusy::command());
        assert!(cmd.try_get_matches_from(["test", "free-busy"]).is_err());
    }
}
