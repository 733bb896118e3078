//! swarmd — the swarm daemon.
//!
//! Assembles the configured handlers on a hub and delivers messages to
//! them:
//! - Config (`swarm.toml`)
//! - Handler registry (built-ins)
//! - Hub + one serving task per handler
//!
//! # Usage
//!
//! ```text
//! swarmd init --path swarm.toml
//! swarmd send --config swarm.toml auth user=alice
//! ```

use std::path::{Path, PathBuf};

use anyhow::Context;
use clap::{Parser, Subcommand};
use swarm_beam::{Message, Verb};
use swarm_core::{HandlerRegistry, Swarm, SwarmConfig};
use tracing::{info, warn};

#[derive(Parser)]
#[command(name = "swarmd", about = "Swarm daemon", version)]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Deliver one message to the configured handlers and print the replies.
    Send {
        /// Path to swarm.toml.
        #[arg(short, long, default_value = "swarm.toml")]
        config: PathBuf,

        /// Message verb (e.g. auth, log, ls).
        verb: String,

        /// Message arguments, conventionally key=value.
        args: Vec<String>,
    },
    /// Write a scaffolded swarm.toml.
    Init {
        #[arg(short, long, default_value = "swarm.toml")]
        path: PathBuf,

        /// Swarm name.
        #[arg(long, default_value = "dev")]
        name: String,

        /// Overwrite an existing file.
        #[arg(long)]
        force: bool,
    },
    /// List the handlers this build knows about.
    Handlers,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Logs go to stderr; stdout carries replies.
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info,swarmd=debug,swarm=debug")),
        )
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();

    match cli.command {
        Command::Send { config, verb, args } => {
            let replies = run_send(&config, &verb, args).await?;
            for reply in &replies {
                println!("{reply}");
            }
            if replies.iter().any(|r| r.verb == Verb::Error) {
                anyhow::bail!("request '{verb}' was refused");
            }
            Ok(())
        }
        Command::Init { path, name, force } => run_init(&path, &name, force),
        Command::Handlers => {
            for name in HandlerRegistry::with_builtins().names() {
                println!("{name}");
            }
            Ok(())
        }
    }
}

async fn run_send(config_path: &Path, verb: &str, args: Vec<String>) -> anyhow::Result<Vec<Message>> {
    let config = SwarmConfig::from_file(config_path)
        .with_context(|| format!("loading {}", config_path.display()))?;
    let registry = HandlerRegistry::with_builtins();
    let swarm = Swarm::from_config(&config, &registry).await?;

    let msg = Message::new(verb).with_args(args);
    info!(swarm = swarm.name(), %msg, "delivering message");
    let replies = swarm.call(msg).await;

    // Shut down even when the call failed, so relays are drained.
    swarm.shutdown().await?;
    let replies = replies?;
    if replies.is_empty() {
        warn!(%verb, "no handler replied");
    }
    Ok(replies)
}

fn run_init(path: &Path, name: &str, force: bool) -> anyhow::Result<()> {
    if path.exists() && !force {
        anyhow::bail!("{} already exists (use --force to overwrite)", path.display());
    }
    let config = SwarmConfig::scaffold(name);
    std::fs::write(path, config.to_toml_string()?)
        .with_context(|| format!("writing {}", path.display()))?;
    info!(path = %path.display(), "config scaffolded");
    Ok(())
}
