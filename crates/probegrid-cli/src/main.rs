use clap::{Parser, Subcommand};

mod commands;
mod render;
mod settings;

use commands::{health::HealthArgs, targets::TargetsArgs};

#[derive(Parser)]
#[command(
    name = "probegrid",
    about = "probegrid — health sweeps across every member of a StatefulSet",
    version,
    propagate_version = true,
)]
struct Cli {
    /// Log at debug level (RUST_LOG overrides)
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Emit logs as JSON lines on stderr
    #[arg(long, global = true)]
    log_json: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Probe the health endpoint of every member of a group.
    ///
    /// Each member is reached through its own short-lived port-forward.
    /// The command succeeds whenever the sweep completes, whatever the
    /// members report.
    Health(HealthArgs),
    /// List the members a group resolves to.
    Targets(TargetsArgs),
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let default_level = if cli.verbose { "probegrid=debug" } else { "probegrid=info" };
    let filter = tracing_subscriber::EnvFilter::from_default_env()
        .add_directive(default_level.parse()?);
    if cli.log_json {
        tracing_subscriber::fmt()
            .json()
            .with_env_filter(filter)
            .with_writer(std::io::stderr)
            .init();
    } else {
        tracing_subscriber::fmt()
            .with_env_filter(filter)
            .with_writer(std::io::stderr)
            .init();
    }

    match cli.command {
        Commands::Health(args) => commands::health::run(args).await,
        Commands::Targets(args) => commands::targets::run(args).await,
    }
}
