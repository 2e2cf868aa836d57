//! Command-line parsing and command routing.

use crate::commands::{self, ScopeArgs};
use crate::logging;
use clap::{Args, CommandFactory, Parser, Subcommand};
use clap_complete::{generate, Shell};
use std::io;
use std::path::PathBuf;
use std::process;

/// A terminal audio storage oscilloscope
#[derive(Parser)]
#[command(name = "scopeline")]
#[command(version)]
#[command(about = "Terminal audio storage oscilloscope")]
#[command(long_about = "Terminal audio storage oscilloscope.\n\nCaptures audio continuously or only when a chunk crosses the trigger level,\nkeeps every retained sample, and lets you pan and zoom through the record.\n\nDEFAULT COMMAND:\n    If no command is specified, 'scope' is used by default.\n\nEXAMPLES:\n    # Capture from the configured device\n    $ scopeline\n\n    # Try it without hardware\n    $ scopeline --synthetic\n\n    # Inspect a saved capture\n    $ scopeline scope --open ~/.local/share/scopeline/scope-20260101-120000.wav\n\n    # Toggle acquisition from another process\n    $ pkill -USR1 scopeline")]
#[command(
    after_help = "KEYS:\n    Space start/stop   m mode   l level   o over-count   c clear   s save\n    Left/Right pan   Home/End jump   +/- zoom   {/} amplitude   [/] time width   q quit\n\nCONFIGURATION:\n    Config file:        ~/.config/scopeline/scopeline.toml\n    Logs:               ~/.local/state/scopeline/scopeline.log.*"
)]
struct Cli {
    #[command(flatten)]
    scope: ScopeOptionsArgs,

    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Args, Clone, Default)]
struct ScopeOptionsArgs {
    /// Load a saved buffer (.wav or raw 16-bit) instead of starting capture
    #[arg(long, value_name = "FILE")]
    open: Option<PathBuf>,

    /// Use the built-in signal generator instead of an audio device
    #[arg(long)]
    synthetic: bool,

    /// Input device name or index (overrides audio.device)
    #[arg(short, long, value_name = "DEVICE")]
    device: Option<String>,

    /// Requested sample rate in Hz (overrides audio.sample_rate)
    #[arg(short, long, value_name = "HZ")]
    rate: Option<u32>,
}

impl From<ScopeOptionsArgs> for ScopeArgs {
    fn from(args: ScopeOptionsArgs) -> Self {
        ScopeArgs {
            open: args.open,
            synthetic: args.synthetic,
            device: args.device,
            rate: args.rate,
        }
    }
}

#[derive(Subcommand)]
enum Commands {
    /// Run the oscilloscope (default)
    #[command(visible_alias = "s")]
    Scope(ScopeOptionsArgs),

    /// Open the configuration file in your preferred editor
    #[command(visible_alias = "c")]
    Config,

    /// List available audio input devices
    ///
    /// Shows device IDs and names accepted by --device and audio.device.
    #[command(name = "list-devices")]
    ListDevices,

    /// Show the last 50 lines of the most recent log file
    Logs,

    /// Generate shell completion script
    ///
    /// Examples:
    ///   scopeline completions bash > scopeline.bash
    ///   scopeline completions zsh > _scopeline
    Completions {
        #[arg(value_enum)]
        shell: Shell,
    },
}

/// Parses arguments and runs the selected command.
///
/// # Errors
/// - If logging initialization fails
/// - If the command fails
pub async fn run() -> Result<(), anyhow::Error> {
    let cli = Cli::parse();

    // Commands that print to stdout run without logging
    match &cli.command {
        Some(Commands::Completions { shell }) => {
            generate(*shell, &mut Cli::command(), "scopeline", &mut io::stdout());
            return Ok(());
        }
        Some(Commands::ListDevices) => return exit_on_error(commands::handle_list_devices()),
        Some(Commands::Logs) => return exit_on_error(commands::handle_logs()),
        _ => {}
    }

    logging::init_logging()?;

    match cli.command {
        None => commands::handle_scope(cli.scope.into()).await?,
        Some(Commands::Scope(args)) => commands::handle_scope(args.into()).await?,
        Some(Commands::Config) => commands::handle_config()?,
        Some(Commands::Completions { .. }) | Some(Commands::ListDevices) | Some(Commands::Logs) => {
            unreachable!("These commands are handled earlier")
        }
    }

    Ok(())
}

fn exit_on_error(result: anyhow::Result<()>) -> anyhow::Result<()> {
    if let Err(e) = result {
        eprintln!("Error: {e:#}");
        process::exit(1);
    }
    Ok(())
}
