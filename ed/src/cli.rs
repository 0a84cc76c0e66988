//! CLI command definitions and subcommands

use std::path::PathBuf;

use clap::{Parser, Subcommand};

/// eventd - event broker daemon
#[derive(Parser)]
#[command(
    name = "eventd",
    about = "Event broker daemon with capture cache and live counters",
    version = crate::VERSION,
)]
pub struct Cli {
    /// Path to config file
    #[arg(short, long, global = true, help = "Path to config file")]
    pub config: Option<PathBuf>,

    /// Log level (TRACE, DEBUG, INFO, WARN, ERROR)
    #[arg(
        short = 'l',
        long = "log-level",
        global = true,
        help = "Log level (TRACE, DEBUG, INFO, WARN, ERROR)"
    )]
    pub log_level: Option<String>,

    /// Subcommand to execute
    #[command(subcommand)]
    pub command: Command,
}

/// CLI subcommands
#[derive(Debug, Subcommand)]
pub enum Command {
    /// Run the daemon in the foreground until EXIT or SIGINT/SIGTERM
    Run,

    /// Print the effective configuration as YAML
    Config,

    /// Send control commands to a running daemon
    Ctl {
        #[command(subcommand)]
        command: CtlCommand,
    },

    /// Publish one event
    Publish {
        /// Subject to publish under
        subject: String,

        /// Event payload (usually `{"source:tag":{...}}`)
        payload: String,
    },

    /// Print events as they are relayed
    Tail {
        /// Only subjects starting with this prefix
        #[arg(default_value = "")]
        prefix: String,

        /// Stop after this many events
        #[arg(short = 'n', long)]
        count: Option<usize>,
    },
}

/// Control channel subcommands
#[derive(Debug, Subcommand)]
pub enum CtlCommand {
    /// Round-trip a payload through the daemon
    Echo {
        text: String,
    },

    /// Show options, or set the heartbeat interval
    Options {
        /// Heartbeat interval in seconds (-1 disables)
        #[arg(long, allow_hyphen_values = true)]
        heartbeat: Option<i64>,
    },

    /// Capture cache commands
    Cache {
        #[command(subcommand)]
        command: CacheCommand,
    },

    /// Stop the daemon
    Exit,
}

/// Capture cache subcommands
#[derive(Debug, Subcommand)]
pub enum CacheCommand {
    /// Start a new capture session
    Init,

    /// Begin capturing
    Start {
        /// File of serialized events, one per line, to seed the cache with
        #[arg(long)]
        seed: Option<PathBuf>,
    },

    /// Stop capturing
    Stop,

    /// Read the stopped cache
    Read {
        /// Keep reading pages until the cache is drained
        #[arg(short, long)]
        all: bool,
    },
}

/// Get the daemon log file path
pub fn get_log_path() -> PathBuf {
    dirs::data_local_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join("eventd")
        .join("logs")
        .join("eventd.log")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cli_parse_run() {
        let cli = Cli::parse_from(["eventd", "run"]);
        assert!(matches!(cli.command, Command::Run));
    }

    #[test]
    fn test_cli_parse_global_options() {
        let cli = Cli::parse_from(["eventd", "config", "--config", "/tmp/e.yml", "-l", "debug"]);
        assert_eq!(cli.config, Some(PathBuf::from("/tmp/e.yml")));
        assert_eq!(cli.log_level.as_deref(), Some("debug"));
    }

    #[test]
    fn test_cli_parse_ctl_cache() {
        let cli = Cli::parse_from(["eventd", "ctl", "cache", "start", "--seed", "seed.txt"]);
        let Command::Ctl {
            command: CtlCommand::Cache {
                command: CacheCommand::Start { seed },
            },
        } = cli.command
        else {
            panic!("expected ctl cache start");
        };
        assert_eq!(seed, Some(PathBuf::from("seed.txt")));

        let cli = Cli::parse_from(["eventd", "ctl", "cache", "read", "--all"]);
        assert!(matches!(
            cli.command,
            Command::Ctl {
                command: CtlCommand::Cache {
                    command: CacheCommand::Read { all: true }
                }
            }
        ));
    }

    #[test]
    fn test_cli_parse_negative_heartbeat() {
        let cli = Cli::parse_from(["eventd", "ctl", "options", "--heartbeat", "-1"]);
        assert!(matches!(
            cli.command,
            Command::Ctl {
                command: CtlCommand::Options { heartbeat: Some(-1) }
            }
        ));
    }

    #[test]
    fn test_cli_parse_tail_defaults() {
        let cli = Cli::parse_from(["eventd", "tail"]);
        assert!(matches!(cli.command, Command::Tail { ref prefix, count: None } if prefix.is_empty()));
    }

    #[test]
    fn test_cli_requires_command() {
        assert!(Cli::try_parse_from(["eventd"]).is_err());
    }
}
