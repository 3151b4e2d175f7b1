//! n6pack CLI entry point.

use std::path::PathBuf;

use clap::{Parser, Subcommand};
use n6pack::PackConfig;
use tracing_subscriber::EnvFilter;

mod cli;

/// n6pack - STM32N6 model package and OTA image tool
#[derive(Parser, Debug)]
#[command(name = "n6pack")]
#[command(about = "Build, validate and extract STM32N6 model packages and OTA images")]
#[command(
    long_about = "n6pack builds the binary containers consumed by STM32N6 firmware.\n\n\
Model packages bundle a relocatable network with its JSON configuration. \
OTA images prefix a firmware binary with a 1024-byte update header.\n\n\
Quick start:\n  \
n6pack model create --model network_rel.bin --config model.json --output model.bin\n  \
n6pack ota pack app.bin -o app_ota.bin -n app -d \"main app\" -t app -v 1.0.0.1\n  \
n6pack ota verify app_ota.bin"
)]
#[command(version)]
struct Cli {
    /// TOML file with tool defaults
    #[arg(long = "config", value_name = "PATH")]
    config: Option<PathBuf>,

    /// Enable debug logging
    #[arg(short, long)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Create, extract and validate model packages
    #[command(subcommand)]
    Model(cli::model::ModelCmd),

    /// Pack, verify and clean OTA images
    #[command(subcommand)]
    Ota(cli::ota::OtaCmd),

    /// Generate version.h from version.mk and git metadata
    VersionHeader(cli::version::VersionHeaderCmd),
}

fn main() {
    let cli = Cli::parse();

    init_logging(cli.verbose);

    tracing::debug!(version = n6pack::VERSION, "starting n6pack");

    let result = PackConfig::load_optional(cli.config.as_deref()).and_then(|config| {
        match cli.command {
            Commands::Model(cmd) => cmd.run(&config),
            Commands::Ota(cmd) => cmd.run(&config),
            Commands::VersionHeader(cmd) => cmd.run(&config),
        }
    });

    if let Err(e) = result {
        tracing::error!(error = %e, "command failed");
        eprintln!("Error: {}", e);
        std::process::exit(1);
    }
}

/// Initialize the tracing subscriber.
fn init_logging(verbose: bool) {
    let default = if verbose {
        "n6pack=debug,n6pack_format=debug"
    } else {
        "n6pack=warn"
    };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default));

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();
}
