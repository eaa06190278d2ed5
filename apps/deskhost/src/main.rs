mod registered_modules;
mod shell;

use anyhow::Result;
use clap::{Parser, Subcommand};
use deskkit::{
    AppConfig, AppInfo, CliOverrides, ExportModule, Orchestrator, PluginDiscovery, init_logging,
};
use std::{path::PathBuf, process::ExitCode};

/// DeskHost - desktop shell with an embedded, hot-swappable API endpoint
#[derive(Parser)]
#[command(name = "deskhost")]
#[command(about = "DeskHost - desktop shell with an embedded, hot-swappable API endpoint")]
#[command(version)]
struct Cli {
    /// Path to configuration file
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Port for the embedded endpoint (overrides config)
    #[arg(short, long)]
    port: Option<u16>,

    /// Development mode: use the fixed development port unless a port is given
    #[arg(long)]
    dev: bool,

    /// Print effective configuration (JSON) and exit
    #[arg(long)]
    print_config: bool,

    /// Log verbosity level (-v info, -vv debug, -vvv trace)
    #[arg(short, long, action = clap::ArgAction::Count)]
    verbose: u8,

    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Subcommand)]
enum Commands {
    /// Run the desktop shell
    Run,
    /// Validate configuration, list active modules and exit
    Check,
}

fn main() -> ExitCode {
    let cli = Cli::parse();
    match launch(cli) {
        Ok(code) => code,
        Err(e) => {
            eprintln!("deskhost: {e:#}");
            ExitCode::FAILURE
        }
    }
}

fn launch(cli: Cli) -> Result<ExitCode> {
    // Layered config:
    // 1) defaults -> 2) YAML (if provided) -> 3) env (DESKHOST__*) -> 4) CLI overrides
    let mut config = AppConfig::load(cli.config.as_deref())?;
    config.apply_cli_overrides(&CliOverrides {
        port: cli.port,
        dev: cli.dev,
        verbose: cli.verbose,
    });

    if cli.print_config {
        println!("Effective configuration:\n{}", config.to_json_pretty()?);
        return Ok(ExitCode::SUCCESS);
    }

    let info = AppInfo::from_config(&config);
    match cli.command.unwrap_or(Commands::Run) {
        Commands::Run => {
            let _logging = init_logging(&config.logging, &info)?;
            Ok(Orchestrator::builder(config, info).build().run())
        }
        Commands::Check => check_config(&config, &info),
    }
}

fn check_config(config: &AppConfig, info: &AppInfo) -> Result<ExitCode> {
    let discovery = PluginDiscovery::from_config(info, &config.plugins);
    let modules = discovery.select(&ExportModule::linked())?;

    println!("Configuration is valid");
    println!("{}", config.to_json_pretty()?);
    println!("Plugin directory: {}", discovery.base_dir().display());
    for module in modules {
        println!("Module: {} ({:?})", module.name, module.kind);
    }
    Ok(ExitCode::SUCCESS)
}
