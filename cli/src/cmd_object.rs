// SPDX-FileCopyrightText: 2025-2026 Zexin Yuan <aim@yzx9.xyz>
//
// SPDX-License-Identifier: Apache-2.0

use std::{error::Error, path::PathBuf};

use clap::{Arg, ArgAction, ArgMatches, Command, ValueHint, arg, value_parser};
use colored::Colorize;
use pimdav_caldav::{
    CalendarBackend, ConflictResolution, ObjectReference, RemoveRequest, SaveOutcome, SaveRequest,
    ical,
};

use crate::account::Account;

const CONFLICT_POLICIES: [&str; 5] = ["fail", "use-newer", "keep-server", "keep-local", "write-copy"];

fn conflict_arg() -> Arg {
    arg!(--conflict <POLICY> "What to do when the server copy changed meanwhile")
        .value_parser(CONFLICT_POLICIES)
        .default_value("fail")
}

fn silent_arg() -> Arg {
    arg!(--silent "Do not let the server send scheduling messages").action(ArgAction::SetTrue)
}

fn parse_conflict(matches: &ArgMatches) -> ConflictResolution {
    match matches.get_one::<String>("conflict").map(String::as_str) {
        Some("use-newer") => ConflictResolution::UseNewer,
        Some("keep-server") => ConflictResolution::KeepServer,
        Some("keep-local") => ConflictResolution::KeepLocal,
        Some("write-copy") => ConflictResolution::WriteCopy,
        _ => ConflictResolution::Fail,
    }
}

/// Prints one object as stored on the server.
#[derive(Debug, Clone)]
pub struct CmdGet {
    pub uid: String,
}

impl CmdGet {
    pub const NAME: &str = "get";

    pub fn command() -> Command {
        Command::new(Self::NAME)
            .about("Print one object from the server")
            .arg(arg!(<UID> "UID of the object"))
    }

    pub fn from(matches: &ArgMatches) -> Self {
        let Some(uid) = matches.get_one::<String>("UID") else {
            unreachable!()
        };
        Self { uid: uid.clone() }
    }

    pub async fn run(self, account: &mut Account) -> Result<(), Box<dyn Error>> {
        tracing::debug!(?self, "loading object...");
        let hint = account.cached(&self.uid).and_then(|c| c.locator);
        let token = account.last_token();
        let loaded = account
            .backend
            .load_component(&self.uid, hint.as_ref(), token.as_ref(), &account.cancel)
            .await?;

        account.remember(&ObjectReference {
            uid: loaded.uid.clone(),
            revision: loaded.revision.clone(),
            locator: Some(loaded.locator.clone()),
            object: Some(loaded.object.clone()),
        });
        print!("{}", loaded.object);
        Ok(())
    }
}

/// Uploads an iCalendar file.
#[derive(Debug, Clone)]
pub struct CmdPut {
    pub file: PathBuf,
    pub update: bool,
    pub conflict: ConflictResolution,
    pub silent: bool,
}

impl CmdPut {
    pub const NAME: &str = "put";

    pub fn command() -> Command {
        Command::new(Self::NAME)
            .about("Store an iCalendar file on the server")
            .arg(
                arg!(<FILE> "iCalendar file holding one object and its overrides")
                    .value_parser(value_parser!(PathBuf))
                    .value_hint(ValueHint::FilePath),
            )
            .arg(arg!(-u --update "Replace the cached object instead of creating a new one"))
            .arg(conflict_arg())
            .arg(silent_arg())
    }

    pub fn from(matches: &ArgMatches) -> Self {
        let Some(file) = matches.get_one::<PathBuf>("FILE") else {
            unreachable!()
        };
        Self {
            file: file.clone(),
            update: matches.get_flag("update"),
            conflict: parse_conflict(matches),
            silent: matches.get_flag("silent"),
        }
    }

    pub async fn run(self, account: &mut Account) -> Result<(), Box<dyn Error>> {
        tracing::debug!(?self, "storing object...");
        let text = tokio::fs::read_to_string(&self.file)
            .await
            .map_err(|e| format!("Failed to read {}: {}", self.file.display(), e))?;
        let uid = ical::merge_instances(std::slice::from_ref(&text))
            .ok()
            .and_then(|comp| ical::object_uid(&comp))
            .ok_or("The file holds no object with a UID")?;

        let cached = if self.update {
            let cached = account
                .cached(&uid)
                .ok_or_else(|| format!("{uid} is not cached, run `sync` first"))?;
            Some(cached)
        } else {
            None
        };

        let request = SaveRequest {
            instances: vec![text],
            locator: cached.as_ref().and_then(|c| c.locator.clone()),
            overwrite_existing: self.update,
            prior_revision: cached.as_ref().and_then(|c| c.current_revision()),
            conflict_resolution: self.conflict,
            silent: self.silent,
        };
        match account
            .backend
            .save_component(request, &account.cancel)
            .await?
        {
            SaveOutcome::Stored(stored) => {
                match stored.object {
                    Some(object) => account.remember(&ObjectReference {
                        uid: stored.uid.clone(),
                        revision: stored.revision.clone().unwrap_or_else(|| "".into()),
                        locator: Some(stored.locator.clone()),
                        object: Some(object),
                    }),
                    None => {
                        let loaded = account
                            .backend
                            .load_component(&stored.uid, Some(&stored.locator), None, &account.cancel)
                            .await?;
                        account.remember(&ObjectReference {
                            uid: loaded.uid,
                            revision: loaded.revision,
                            locator: Some(loaded.locator),
                            object: Some(loaded.object),
                        });
                    }
                }
                println!("{} {} at {}", "Stored".green(), stored.uid, stored.locator);
            }
            SaveOutcome::KeptServerVersion => {
                println!("{} the server copy of {uid} was kept", "Conflict:".yellow());
            }
        }
        Ok(())
    }
}

/// Removes one object from the server.
#[derive(Debug, Clone)]
pub struct CmdDelete {
    pub uid: String,
    pub conflict: ConflictResolution,
    pub silent: bool,
}

impl CmdDelete {
    pub const NAME: &str = "delete";

    pub fn command() -> Command {
        Command::new(Self::NAME)
            .alias("rm")
            .about("Remove one object from the server")
            .arg(arg!(<UID> "UID of the object"))
            .arg(conflict_arg())
            .arg(silent_arg())
    }

    pub fn from(matches: &ArgMatches) -> Self {
        let Some(uid) = matches.get_one::<String>("UID") else {
            unreachable!()
        };
        Self {
            uid: uid.clone(),
            conflict: parse_conflict(matches),
            silent: matches.get_flag("silent"),
        }
    }

    pub async fn run(self, account: &mut Account) -> Result<(), Box<dyn Error>> {
        tracing::debug!(?self, "removing object...");
        let cached = account.cached(&self.uid);
        let request = RemoveRequest {
            uid: self.uid.clone(),
            locator: cached.as_ref().and_then(|c| c.locator.clone()),
            prior_revision: cached.as_ref().and_then(|c| c.current_revision()),
            conflict_resolution: self.conflict,
            silent: self.silent,
        };
        account
            .backend
            .remove_component(request, &account.cancel)
            .await?;
        account.cache.remove_uid(&self.uid);
        println!("{} {}", "Removed".green(), self.uid);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sub_matches(cmd: Command, args: &[&str]) -> ArgMatches {
        let name = cmd.get_name().to_string();
        let matches = Command::new("test")
            .subcommand(cmd)
            .try_get_matches_from(args)
            .unwrap();
        matches.subcommand_matches(&name).unwrap().clone()
    }

    #[test]
    fn test_parse_put() {
        let matches = sub_matches(
            CmdPut::command(),
            &["test", "put", "a.ics", "-u", "--conflict", "keep-server", "--silent"],
        );
        let cmd = CmdPut::from(&matches);
        assert_eq!(cmd.file, PathBuf::from("a.ics"));
        assert!(cmd.update);
        assert!(cmd.silent);
        assert_eq!(cmd.conflict, ConflictResolution::KeepServer);
    }

    #[test]
    fn test_parse_put_defaults() {
        let matches = sub_matches(CmdPut::command(), &["test", "put", "a.ics"]);
        let cmd = CmdPut::from(&matches);
        assert!(!cmd.update);
        assert!(!cmd.silent);
        assert_eq!(cmd.conflict, ConflictResolution::Fail);
    }

    #[test]
    fn test_parse_delete() {
        let matches = sub_matches(
            CmdDelete::command(),
            &["test", "delete", "uid-1", "--conflict", "keep-local"],
        );
        let cmd = CmdDelete::from(&matches);
        assert_eq!(cmd.uid, "uid-1");
        assert_eq!(cmd.conflict, ConflictResolution::KeepLocal);
    }

    #[test]
    fn test_reject_unknown_policy() {
        let result = Command::new("test")
            .subcommand(CmdDelete::command())
            .try_get_matches_from(["test", "delete", "uid-1", "--conflict", "merge"]);
        assert!(result.is_err());
    }

    #[test]
    fn test_parse_get() {
        let matches = sub_matches(CmdGet::command(), &["test", "get", "uid-1"]);
        assert_eq!(CmdGet::from(&matches).uid, "uid-1");
    }
}
