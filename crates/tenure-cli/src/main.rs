mod cmd_config;
mod cmd_login;
mod cmd_notice;
mod cmd_status;
mod setup;

use std::path::PathBuf;

use clap::{Parser, Subcommand};

#[derive(Parser)]
#[command(name = "tenure", version, about = "One active session per account")]
struct Cli {
    /// Shared store directory (defaults to <store root>/shared)
    #[arg(long, global = true)]
    store: Option<PathBuf>,
    #[command(subcommand)]
    cmd: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Sign in and hold the account's session until Ctrl-C or displacement
    Login {
        /// Account name
        account: String,
        /// Refuse to sign in while another client holds a live session
        #[arg(long)]
        no_takeover: bool,
    },
    /// Show the account's current session claim
    Status {
        /// Account name
        account: String,
        /// Output the raw claim as JSON
        #[arg(long)]
        json: bool,
    },
    /// Show the pending session notice (and discard it)
    Notice {
        /// Leave the notice in place
        #[arg(long)]
        keep: bool,
    },
    /// Print this client's persistent id
    ClientId,
    /// Config operations (set, get, list)
    Config {
        #[command(subcommand)]
        cmd: cmd_config::ConfigCmd,
    },
}

fn main() -> anyhow::Result<()> {
    init_tracing();
    let cli = Cli::parse();
    let store = cli.store.as_deref();

    match cli.cmd {
        Command::Login {
            account,
            no_takeover,
        } => cmd_login::execute(&account, store, no_takeover),
        Command::Status { account, json } => cmd_status::execute(&account, store, json),
        Command::Notice { keep } => cmd_notice::execute(keep),
        Command::ClientId => {
            let local = setup::open_local();
            println!(
                "{}",
                tenure_session::context::load_or_create_client_id(&local)
            );
            Ok(())
        }
        Command::Config { cmd } => cmd_config::run(cmd),
    }
}

/// Log to stderr; filter from `TENURE_LOG` (default `info`).
fn init_tracing() {
    let filter = tracing_subscriber::EnvFilter::try_from_env("TENURE_LOG")
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info"));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(false)
        .init();
}
