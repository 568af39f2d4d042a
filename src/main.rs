mod cli;
mod disk;
mod execution;
mod paths;
mod settings;
mod ui;

use clap::Parser;
use std::path::PathBuf;

use crate::cli::{Commands, GlobalArgs};
use crate::ui::prelude::*;

/// Disk partitioning and filesystem configuration for live installers
#[derive(Parser, Debug)]
#[command(name = "diskwright", author, version, about, long_about = None)]
struct Cli {
    /// Settings file (defaults to /etc/diskwright/settings.toml when present)
    #[arg(long, global = true)]
    settings: Option<PathBuf>,

    /// Print mutating commands instead of running them
    #[arg(long, global = true)]
    dry_run: bool,

    /// Emit one JSON object per event
    #[arg(long, global = true)]
    json: bool,

    /// Disable coloured output
    #[arg(long, global = true)]
    no_color: bool,

    /// Activate debug mode
    #[arg(short, long, global = true)]
    debug: bool,

    #[command(subcommand)]
    command: Commands,
}

#[tokio::main]
async fn main() {
    let cli = Cli::parse();

    let format = if cli.json {
        OutputFormat::Json
    } else {
        OutputFormat::Text
    };
    let color = !cli.no_color && !cli.json;
    colored::control::set_override(color);
    ui::init(format, color);
    ui::set_debug_mode(cli.debug);

    let args = GlobalArgs {
        settings: cli.settings,
        dry_run: cli.dry_run,
    };
    if let Err(err) = cli::handle_command(cli.command, &args).await {
        emit(Level::Error, "cli.error", &format!("Error: {err:#}"), None);
        std::process::exit(1);
    }
}
