//! agentgate CLI: the main entry point.
//!
//! Commands:
//! - `serve`   Start the streaming & approval gateway
//! - `ask`     Run one synchronous turn and print the result
//! - `config`  Show, locate or initialize the configuration

use clap::{Parser, Subcommand};

mod commands;

#[derive(Parser)]
#[command(
    name = "agentgate",
    about = "agentgate: agent session streaming & approval gateway",
    version,
    author
)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Enable verbose logging
    #[arg(short, long, global = true)]
    verbose: bool,
}

#[derive(Subcommand)]
enum Commands {
    /// Start the HTTP gateway server
    Serve {
        /// Override the port
        #[arg(short, long)]
        port: Option<u16>,

        /// Override the backend kind ("simulated" or "live")
        #[arg(short, long)]
        backend: Option<String>,
    },

    /// Send one message and print the response and artifacts
    Ask {
        /// The message to send
        message: String,

        /// Continue an existing session
        #[arg(short, long)]
        session: Option<String>,

        /// Request extended reasoning
        #[arg(long)]
        thinking: bool,
    },

    /// Print the effective configuration as TOML
    Config {
        /// Write a starter config file
        #[arg(long)]
        init: bool,

        /// Print the config file path only
        #[arg(long)]
        path: bool,
    },
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();

    // Initialize tracing
    let filter = if cli.verbose { "debug" } else { "info" };
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(filter)),
        )
        .with_target(false)
        .init();

    match cli.command {
        Commands::Serve { port, backend } => commands::serve::run(port, backend).await?,
        Commands::Ask {
            message,
            session,
            thinking,
        } => commands::ask::run(message, session, thinking).await?,
        Commands::Config { init, path } => {
            if init {
                commands::config_cmd::init()?
            } else if path {
                commands::config_cmd::path()
            } else {
                commands::config_cmd::show()?
            }
        }
    }

    Ok(())
}
