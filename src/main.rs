use std::path::PathBuf;
use std::process::ExitCode;

use anyhow::Context;
use clap::{Parser, Subcommand};

use fresh_container::commands::check::{self, CheckArgs};
use fresh_container::commands::server::{self, ServerArgs};
use fresh_container::config::Config;
use fresh_container::logging::{self, LogFormat, LogOptions};

#[derive(Parser)]
#[command(name = "fresh-container")]
#[command(version, about = "Find container images that can be upgraded within a semver constraint")]
struct Cli {
    /// JSON configuration file with registry settings
    #[arg(long, global = true, env = "FRESH_CONTAINER_CONFIG_FILE")]
    config: Option<PathBuf>,

    #[arg(long, global = true, env = "FRESH_CONTAINER_DEBUG")]
    debug: bool,

    #[arg(long, global = true, value_enum, default_value_t = LogFormat::Text)]
    log_format: LogFormat,

    /// Write logs to this file instead of stderr
    #[arg(long, global = true, value_name = "PATH")]
    log_file: Option<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Check whether an image tag is stale
    Check(CheckArgs),
    /// Serve evaluations over HTTP
    Server(ServerArgs),
}

fn main() -> ExitCode {
    let cli = match Cli::try_parse() {
        Ok(cli) => cli,
        Err(e) => {
            let _ = e.print();
            return if e.use_stderr() {
                ExitCode::FAILURE
            } else {
                ExitCode::SUCCESS
            };
        }
    };

    match run(cli) {
        Ok(code) => code,
        Err(e) => {
            eprintln!("Error: {:#}", e);
            ExitCode::FAILURE
        }
    }
}

fn run(cli: Cli) -> anyhow::Result<ExitCode> {
    let _guard = logging::init(&LogOptions {
        debug: cli.debug,
        format: cli.log_format,
        file: cli.log_file.clone(),
    })?;

    let config = cli
        .config
        .as_deref()
        .map(|path| {
            Config::from_file(path)
                .with_context(|| format!("cannot load configuration from {:?}", path))
        })
        .transpose()?;

    let runtime = tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()?;

    match &cli.command {
        Command::Check(args) => runtime.block_on(check::run(args, config)),
        Command::Server(args) => {
            runtime.block_on(server::run(args, config.unwrap_or_default()))
        }
    }
}
