// SPDX-FileCopyrightText: 2025-2026 Zexin Yuan <aim@yzx9.xyz>
//
// SPDX-License-Identifier: Apache-2.0

use std::{error::Error, ffi::OsString, path::PathBuf};

use clap::{ArgMatches, Command, ValueHint, arg, builder::styling, crate_version, value_parser};
use colored::Colorize;
use futures::{FutureExt, future::BoxFuture};
use tracing_subscriber::EnvFilter;

use crate::account::Account;
use crate::cmd_free_busy::CmdFreeBusy;
use crate::cmd_object::{CmdDelete, CmdGet, CmdPut};
use crate::cmd_sync::{CmdProbe, CmdSync};
use crate::config::{APP_NAME, parse_config};

/// Run the pimdav command-line interface.
pub async fn run() -> Result<(), Box<dyn Error>> {
    match Cli::parse() {
        Ok(cli) => {
            init_tracing(cli.verbose);
            if let Err(e) = cli.run().await {
                println!("{} {}", "Error:".red(), e);
            }
        }
        Err(e) => println!("{} {}", "Error:".red(), e),
    }
    Ok(())
}

fn init_tracing(verbose: bool) {
    let default = if verbose { "pimdav_caldav=debug,pimdav_cli=debug" } else { "warn" };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default));
    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .try_init();
}

/// Command-line interface
#[derive(Debug)]
pub struct Cli {
    /// Path to the configuration file
    pub config: Option<PathBuf>,

    /// Log protocol steps
    pub verbose: bool,

    /// The command to execute
    pub command: Commands,
}

impl Cli {
    /// Create the command-line interface
    pub fn command() -> Command {
        const STYLES: styling::Styles = styling::Styles::styled()
            .header(styling::AnsiColor::Green.on_default().bold())
            .usage(styling::AnsiColor::Green.on_default().bold())
            .literal(styling::AnsiColor::Blue.on_default().bold())
            .placeholder(styling::AnsiColor::Cyan.on_default());

        Command::new(APP_NAME)
            .about("Keep a local calendar cache in step with a CalDAV collection.")
            .author("Zexin Yuan <aim@yzx9.xyz>")
            .version(crate_version!())
            .styles(STYLES)
            .subcommand_required(false) // default to sync
            .arg_required_else_help(false)
            .arg(
                arg!(-c --config [CONFIG] "Path to the configuration file")
                    .long_help(
                        "\
Path to the configuration file. Defaults to $PIMDAV_CONFIG, then $XDG_CONFIG_HOME/pimdav/config.toml \
on Linux and MacOS, %APPDATA%/pimdav/config.toml on Windows.",
                    )
                    .value_parser(value_parser!(PathBuf))
                    .value_hint(ValueHint::FilePath),
            )
            .arg(arg!(-v --verbose "Log protocol steps to stderr").global(true))
            .subcommand(CmdProbe::command())
            .subcommand(CmdSync::command())
            .subcommand(CmdGet::command())
            .subcommand(CmdPut::command())
            .subcommand(CmdDelete::command())
            .subcommand(CmdFreeBusy::command())
    }

    /// Parse the command-line arguments
    pub fn parse() -> Result<Self, Box<dyn Error>> {
        let commands = Self::command();
        let matches = commands.get_matches();
        Self::from(&matches)
    }

    /// Parse the specified arguments
    pub fn try_parse_from<I, T>(args: I) -> Result<Self, Box<dyn Error>>
    where
        I: IntoIterator<Item = T>,
        T: Into<OsString> + Clone,
    {
        let commands = Self::command();
        let matches = commands.try_get_matches_from(args)?;
        Self::from(&matches)
    }

    /// Create a CLI instance from the `ArgMatches`
    pub fn from(matches: &ArgMatches) -> Result<Self, Box<dyn Error>> {
        use Commands::{Delete, FreeBusy, Get, Probe, Put, Sync};
        let command = match matches.subcommand() {
            Some((CmdProbe::NAME, matches)) => Probe(CmdProbe::from(matches)),
            Some((CmdSync::NAME, matches)) => Sync(CmdSync::from(matches)),
            Some((CmdGet::NAME, matches)) => Get(CmdGet::from(matches)),
            Some((CmdPut::NAME, matches)) => Put(CmdPut::from(matches)),
            Some((CmdDelete::NAME, matches)) => Delete(CmdDelete::from(matches)),
            Some((CmdFreeBusy::NAME, matches)) => FreeBusy(CmdFreeBusy::from(matches)),
            None => Sync(CmdSync { full: false }),
            Some((name, _)) => return Err(format!("Unknown command: {name}").into()),
        };

        Ok(Cli {
            config: matches.get_one("config").cloned(),
            verbose: matches.get_flag("verbose"),
            command,
        })
    }

    /// Run the command
    pub async fn run(self) -> Result<(), Box<dyn Error>> {
        self.command.run(self.config).await
    }
}

/// The commands available in the CLI
#[derive(Debug, Clone)]
pub enum Commands {
    /// Discover server capabilities
    Probe(CmdProbe),

    /// Refresh the local cache
    Sync(CmdSync),

    /// Print one object
    Get(CmdGet),

    /// Store one object
    Put(CmdPut),

    /// Remove one object
    Delete(CmdDelete),

    /// Query free/busy data
    FreeBusy(CmdFreeBusy),
}

impl Commands {
    /// Run the command with the given configuration
    #[rustfmt::skip]
    pub async fn run(self, config: Option<PathBuf>) -> Result<(), Box<dyn Error>> {
        use Commands::*;
        match self {
            Probe(a)    => Self::run_with(config, |x| a.run(x).boxed()).await,
            Sync(a)     => Self::run_with(config, |x| a.run(x).boxed()).await,
            Get(a)      => Self::run_with(config, |x| a.run(x).boxed()).await,
            Put(a)      => Self::run_with(config, |x| a.run(x).boxed()).await,
            Delete(a)   => Self::run_with(config, |x| a.run(x).boxed()).await,
            FreeBusy(a) => Self::run_with(config, |x| a.run(x).boxed()).await,
        }
    }

    async fn run_with<F>(config: Option<PathBuf>, f: F) -> Result<(), Box<dyn Error>>
    where
        F: for<'a> FnOnce(&'a mut Account) -> BoxFuture<'a, Result<(), Box<dyn Error>>>,
    {
        tracing::debug!("parsing configuration...");
        let config = parse_config(config).await?;
        let mut account = Account::open(config).await?;

        let result = f(&mut account).await;

        // Keep whatever was learned even when the command failed.
        account.close().await?;
        result
    }
}
