//! Ravel command-line client.
//!
//! Sends one command to a cluster through the slot-aware router and
//! prints the reply.
//!
//! ```bash
//! ravel --seed 10.0.0.1:7000 --seed 10.0.0.2:7000 SET user:1 alice
//! ravel --seed 10.0.0.1 GET user:1
//! ```
//!
//! A seed given without a port uses 6379. Exit status is non-zero if the
//! command fails.

#![forbid(unsafe_code)]
#![warn(missing_docs)]

use std::fmt::Write as _;
use std::process::ExitCode;
use std::time::Duration;

use clap::Parser;
use ravel_core::limits::{
    CONNECTIONS_MAX_DEFAULT, REDIRECTS_MAX_DEFAULT, RETRY_BACKOFF_MS_DEFAULT,
};
use ravel_core::{Command, NodeAddr, Value};
use ravel_routing::ClusterConfig;
use ravel_runtime::ConnectionConfig;
use tracing::{error, info, Level};
use tracing_subscriber::FmtSubscriber;

/// Send one command to a cluster.
#[derive(Parser, Debug)]
#[command(name = "ravel")]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Seed node as `host:port` or `host`. Can be specified multiple times.
    #[arg(long = "seed", required = true)]
    seeds: Vec<NodeAddr>,

    /// Maximum number of pooled connections.
    #[arg(long, default_value_t = CONNECTIONS_MAX_DEFAULT)]
    max_connections: usize,

    /// Redirections and retries allowed per command.
    #[arg(long, default_value_t = REDIRECTS_MAX_DEFAULT)]
    max_redirects: u32,

    /// Pause before retrying once half the budget is spent (milliseconds).
    #[arg(long, default_value_t = RETRY_BACKOFF_MS_DEFAULT)]
    retry_backoff_ms: u64,

    /// Connect timeout per node (milliseconds).
    #[arg(long, default_value_t = 5_000)]
    connect_timeout_ms: u64,

    /// Reply timeout per request (milliseconds).
    #[arg(long, default_value_t = 30_000)]
    io_timeout_ms: u64,

    /// Log level (trace, debug, info, warn, error).
    #[arg(long, default_value = "warn")]
    log_level: Level,

    /// The command and its arguments.
    #[arg(required = true, trailing_var_arg = true, allow_hyphen_values = true)]
    command: Vec<String>,
}

impl Args {
    fn cluster_config(&self) -> ClusterConfig {
        ClusterConfig::new(self.seeds.clone())
            .with_max_connections(self.max_connections)
            .with_max_redirects(self.max_redirects)
            .with_retry_backoff(Duration::from_millis(self.retry_backoff_ms))
    }

    fn connection_config(&self) -> ConnectionConfig {
        ConnectionConfig::default()
            .with_connect_timeout(Duration::from_millis(self.connect_timeout_ms))
            .with_io_timeout(Duration::from_millis(self.io_timeout_ms))
    }

    fn command(&self) -> Option<Command> {
        let (name, args) = self.command.split_first()?;
        Some(Command::with_args(name.as_str(), args))
    }
}

#[tokio::main]
async fn main() -> ExitCode {
    let args = Args::parse();

    // Logs go to stderr; stdout carries the reply.
    let subscriber = FmtSubscriber::builder()
        .with_max_level(args.log_level)
        .with_target(true)
        .with_writer(std::io::stderr)
        .finish();
    if let Err(e) = tracing::subscriber::set_global_default(subscriber) {
        eprintln!("failed to install logger: {e}");
        return ExitCode::FAILURE;
    }

    let Some(command) = args.command() else {
        error!("no command given");
        return ExitCode::FAILURE;
    };

    info!(
        seeds = ?args.seeds,
        max_connections = args.max_connections,
        max_redirects = args.max_redirects,
        command = command.name(),
        "connecting to cluster"
    );

    let client = match ravel_runtime::connect_with(args.cluster_config(), args.connection_config())
        .await
    {
        Ok(client) => client,
        Err(e) => {
            error!(error = %e, "invalid configuration");
            return ExitCode::FAILURE;
        }
    };

    let result = client.execute(&command).await;
    client.close().await;

    match result {
        Ok(value) => {
            println!("{}", format_reply(&value));
            ExitCode::SUCCESS
        }
        Err(e) => {
            eprintln!("(error) {e}");
            ExitCode::FAILURE
        }
    }
}

/// Renders a reply the way interactive clients usually do.
fn format_reply(value: &Value) -> String {
    let mut out = String::new();
    write_reply(&mut out, value, 0);
    out
}

fn write_reply(out: &mut String, value: &Value, indent: usize) {
    match value {
        Value::Nil => out.push_str("(nil)"),
        Value::Int(n) => {
            let _ = write!(out, "(integer) {n}");
        }
        Value::Simple(s) => out.push_str(s),
        Value::Bulk(bytes) => {
            let _ = write!(out, "{:?}", String::from_utf8_lossy(bytes));
        }
        Value::Array(items) if items.is_empty() => out.push_str("(empty array)"),
        Value::Array(items) => {
            let width = items.len().to_string().len();
            for (i, item) in items.iter().enumerate() {
                if i > 0 {
                    out.push('\n');
                    out.push_str(&" ".repeat(indent));
                }
                let _ = write!(out, "{:>width$}) ", i + 1);
                write_reply(out, item, indent + width + 2);
            }
        }
    }
}
