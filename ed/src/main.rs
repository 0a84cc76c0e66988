//! eventd - event broker daemon
//!
//! CLI entry point for running the daemon and talking to it.

use std::fs;
use std::time::Duration;

use clap::Parser;
use colored::Colorize;
use eyre::{Context, Result};
use tokio::signal::unix::{SignalKind, signal};
use tracing::{debug, info, warn};

use eventd::cli::{CacheCommand, Cli, Command, CtlCommand, get_log_path};
use eventd::client::{Publisher, Subscriber};
use eventd::config::Config;
use eventd::ipc::ControlClient;
use eventd::orchestrator::Orchestrator;
use eventd::transport::TransportError;

fn parse_level(level_str: Option<&str>) -> tracing::Level {
    match level_str.map(|s| s.to_uppercase()) {
        Some(s) => match s.as_str() {
            "TRACE" => tracing::Level::TRACE,
            "DEBUG" => tracing::Level::DEBUG,
            "INFO" => tracing::Level::INFO,
            "WARN" | "WARNING" => tracing::Level::WARN,
            "ERROR" => tracing::Level::ERROR,
            _ => {
                eprintln!("Warning: Unknown log-level '{}', defaulting to INFO", s);
                tracing::Level::INFO
            }
        },
        None => tracing::Level::INFO,
    }
}

/// Daemon logs go to a file, client commands log to stderr
fn setup_logging(cli_log_level: Option<&str>, config_log_level: Option<&str>, to_file: bool) -> Result<()> {
    // Priority: CLI --log-level > config file > INFO
    let level = parse_level(cli_log_level.or(config_log_level));
    let filter = tracing_subscriber::EnvFilter::from_default_env().add_directive(level.into());

    if to_file {
        let log_path = get_log_path();
        if let Some(log_dir) = log_path.parent() {
            fs::create_dir_all(log_dir).context("Failed to create log directory")?;
        }
        let log_file = fs::File::create(&log_path).context("Failed to create log file")?;

        tracing_subscriber::fmt()
            .with_writer(log_file)
            .with_ansi(false)
            .with_env_filter(filter)
            .init();
    } else {
        tracing_subscriber::fmt()
            .with_writer(std::io::stderr)
            .with_env_filter(filter)
            .init();
    }

    info!("Logging initialized (level: {:?})", level);
    Ok(())
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    // Log level from the config file before the full load, so loading is logged
    let config_log_level = Config::load_log_level(cli.config.as_ref());
    let to_file = matches!(cli.command, Command::Run);
    setup_logging(cli.log_level.as_deref(), config_log_level.as_deref(), to_file)
        .context("Failed to setup logging")?;

    let config = Config::load(cli.config.as_ref()).context("Failed to load configuration")?;

    debug!(command = ?cli.command, "main: dispatching command");
    match cli.command {
        Command::Run => cmd_run(config).await,
        Command::Config => cmd_config(&config),
        Command::Ctl { command } => cmd_ctl(&config, command).await,
        Command::Publish { subject, payload } => cmd_publish(&config, &subject, &payload).await,
        Command::Tail { prefix, count } => cmd_tail(&config, &prefix, count).await,
    }
}

/// Run the daemon until EXIT or a signal
async fn cmd_run(config: Config) -> Result<()> {
    info!("Daemon starting...");
    let orchestrator = Orchestrator::start(config).await?;
    let (shutdown_tx, shutdown_rx) = tokio::sync::mpsc::channel::<()>(1);
    let mut handle = tokio::spawn(orchestrator.run(shutdown_rx));
    info!("Daemon running");

    let mut sigint = signal(SignalKind::interrupt())?;
    let mut sigterm = signal(SignalKind::terminate())?;

    tokio::select! {
        result = &mut handle => {
            info!("Daemon exited");
            return result.context("Orchestrator task failed")?;
        }
        _ = sigint.recv() => warn!("SIGINT received"),
        _ = sigterm.recv() => warn!("SIGTERM received"),
    }

    let _ = shutdown_tx.send(()).await;
    handle.await.context("Orchestrator task failed")??;
    info!("Daemon stopped");
    Ok(())
}

fn cmd_config(config: &Config) -> Result<()> {
    let yaml = serde_yaml::to_string(config).context("Failed to serialize configuration")?;
    print!("{}", yaml);
    Ok(())
}

async fn cmd_ctl(config: &Config, command: CtlCommand) -> Result<()> {
    let client = ControlClient::new(config.transport.control.clone());

    match command {
        CtlCommand::Echo { text } => {
            println!("{}", client.echo(&text).await?);
        }
        CtlCommand::Options { heartbeat } => {
            let options = match heartbeat {
                Some(secs) => client.set_heartbeat_interval(secs).await?,
                None => client.get_options().await?,
            };
            for (name, value) in options {
                println!("{} = {}", name.yellow(), value);
            }
        }
        CtlCommand::Cache { command } => cmd_cache(&client, command).await?,
        CtlCommand::Exit => {
            client.exit().await?;
            println!("{} daemon exiting", "✓".green());
        }
    }
    Ok(())
}

async fn cmd_cache(client: &ControlClient, command: CacheCommand) -> Result<()> {
    match command {
        CacheCommand::Init => {
            client.cache_init().await?;
            println!("{} capture initialized", "✓".green());
        }
        CacheCommand::Start { seed } => {
            let events: Vec<String> = match seed {
                Some(path) => fs::read_to_string(&path)
                    .context(format!("Failed to read seed file {}", path.display()))?
                    .lines()
                    .map(str::trim)
                    .filter(|line| !line.is_empty())
                    .map(String::from)
                    .collect(),
                None => Vec::new(),
            };
            let seeded = events.len();
            client.cache_start(events).await?;
            println!("{} capture started ({} seed events)", "✓".green(), seeded);
        }
        CacheCommand::Stop => {
            let (events, lost) = client.cache_stop().await?;
            let lost = if lost > 0 {
                lost.to_string().red().to_string()
            } else {
                lost.to_string()
            };
            println!("{} capture stopped: {} events buffered, {} lost", "✓".green(), events, lost);
        }
        CacheCommand::Read { all } => {
            let events = if all {
                client.cache_read_all().await?
            } else {
                client.cache_read().await?
            };
            for event in events {
                println!("{}", event);
            }
        }
    }
    Ok(())
}

async fn cmd_publish(config: &Config, subject: &str, payload: &str) -> Result<()> {
    let mut publisher = Publisher::connect(&config.transport.ingress).await?;
    let sequence = publisher.publish(subject, payload).await?;
    publisher.close().await;
    println!("{} published {} #{}", "✓".green(), subject.cyan(), sequence);
    Ok(())
}

async fn cmd_tail(config: &Config, prefix: &str, count: Option<usize>) -> Result<()> {
    let mut subscriber = Subscriber::connect(&config.transport.egress).await?;
    subscriber.subscribe(prefix).await?;

    let mut seen = 0;
    while count.is_none_or(|n| seen < n) {
        match subscriber.recv(Duration::from_secs(1)).await {
            Ok(received) => {
                if received.missed > 0 {
                    println!("{} {} events missed", "!".yellow(), received.missed);
                }
                println!("{} {}", received.subject.cyan(), received.serialized);
                seen += 1;
            }
            Err(TransportError::Timeout) => continue,
            Err(TransportError::Closed) => {
                println!("{} proxy closed the connection", "✗".red());
                break;
            }
            Err(e) => return Err(e.into()),
        }
    }

    subscriber.close().await;
    Ok(())
}
