use std::path::PathBuf;

use clap::{ArgAction, Parser};

use espat_cli::{CliConfig, CliResult, Command, ResetArg};

#[derive(Parser)]
#[command(
    name = "espat",
    about = "Drive an ESP AT WiFi chip through a serial-over-TCP bridge",
    version
)]
struct Cli {
    /// Path to a YAML configuration file
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Bridge address (overrides the config file)
    #[arg(long)]
    address: Option<String>,

    /// Bridge port (overrides the config file)
    #[arg(long)]
    port: Option<u16>,

    /// Reset the chip before configuring it
    #[arg(long, value_enum, default_value_t = ResetArg::Keep)]
    reset: ResetArg,

    /// More logging (-v debug, -vv trace); RUST_LOG takes precedence
    #[arg(short, long, action = ArgAction::Count)]
    verbose: u8,

    #[command(subcommand)]
    command: Command,
}

fn run(cli: Cli) -> CliResult<()> {
    let mut config = match &cli.config {
        Some(path) => CliConfig::load(path)?,
        None => CliConfig::default(),
    };
    if let Some(address) = cli.address {
        config.bridge.address = address;
    }
    if let Some(port) = cli.port {
        config.bridge.port = port;
    }

    espat_cli::install_metrics(config.metrics_listen)?;

    let mut driver = espat_cli::connect(&config, cli.reset)?;
    let stdout = std::io::stdout();
    espat_cli::execute(&mut driver, &cli.command, &mut stdout.lock())
}

fn main() {
    let cli = Cli::parse();
    espat_cli::logging::init(cli.verbose);

    if let Err(e) = run(cli) {
        tracing::error!("{e}");
        eprintln!("espat: {e}");
        std::process::exit(1);
    }
}
