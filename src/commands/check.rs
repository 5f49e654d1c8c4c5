//! `fresh-container check`

use std::io::Write;
use std::process::ExitCode;
use std::time::Duration;

use anyhow::Context;
use clap::{Args, ValueEnum};
use tracing::{debug, warn};

use crate::client::RemoteClient;
use crate::config::Config;
use crate::local::evaluate_locally;
use crate::version::evaluation::{CheckRequest, Evaluation};
use crate::version::registries::DockerRegistry;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, ValueEnum)]
pub enum OutputFormat {
    #[default]
    Text,
    Json,
}

#[derive(Debug, Clone, Args)]
pub struct CheckArgs {
    /// Semver constraint the image must satisfy, e.g. ">= 1.5.0 < 2.0.0"
    #[arg(short, long, env = "FRESH_CONTAINER_CHECK_CONSTRAINT")]
    pub constraint: String,

    /// Delegate the evaluation to a fresh-container server
    #[arg(short, long, env = "FRESH_CONTAINER_CHECK_SERVER")]
    pub server: Option<String>,

    #[arg(
        short,
        long,
        value_enum,
        default_value_t = OutputFormat::Text,
        env = "FRESH_CONTAINER_CHECK_OUTPUT"
    )]
    pub output: OutputFormat,

    /// Literal prefix in front of the version inside tags, e.g. "alpine-"
    #[arg(
        long = "tagPrefix",
        visible_alias = "tag-prefix",
        default_value = "",
        env = "FRESH_CONTAINER_TAG_PREFIX"
    )]
    pub tag_prefix: String,

    /// Give up waiting for a remote evaluation after this many seconds
    #[arg(long, value_name = "SECS")]
    pub timeout: Option<u64>,

    /// Image reference, e.g. influxdb:1.5.0
    pub image: String,
}

pub async fn run(args: &CheckArgs, config: Option<Config>) -> anyhow::Result<ExitCode> {
    let request = CheckRequest::new(&args.image, &args.constraint, &args.tag_prefix);

    let evaluation = match &args.server {
        Some(server) => {
            if config.is_some() {
                warn!("`config` flag is ignored when the `server` is used at the same time");
            }
            remote_evaluation(server, &request, args).await?
        }
        None => {
            let registry = DockerRegistry::new(config.unwrap_or_default())?;
            evaluate_locally(&registry, &request).await?
        }
    };
    debug!(?evaluation, "Evaluation done");

    match args.output {
        OutputFormat::Text => {
            if evaluation.stale {
                eprintln!("{}", stale_message(&evaluation));
                Ok(ExitCode::FAILURE)
            } else {
                println!("{}", fresh_message(&evaluation));
                Ok(ExitCode::SUCCESS)
            }
        }
        OutputFormat::Json => {
            println!("{}", serde_json::to_string_pretty(&evaluation)?);
            Ok(ExitCode::SUCCESS)
        }
    }
}

async fn remote_evaluation(
    server: &str,
    request: &CheckRequest,
    args: &CheckArgs,
) -> anyhow::Result<Evaluation> {
    let client = RemoteClient::new(server)?;
    let show_progress = args.output == OutputFormat::Text;

    let mut polls = 0usize;
    let on_pending = || {
        if show_progress {
            if polls == 0 {
                eprint!("Waiting for remote evaluation from {}: ", server);
            }
            eprint!(".");
            let _ = std::io::stderr().flush();
        }
        polls += 1;
    };

    let evaluation = match args.timeout {
        Some(secs) => tokio::time::timeout(
            Duration::from_secs(secs),
            client.evaluate(request, on_pending),
        )
        .await
        .with_context(|| format!("no answer from {} within {} seconds", server, secs))?,
        None => client.evaluate(request, on_pending).await,
    };

    if show_progress && polls > 0 {
        eprintln!();
    }

    Ok(evaluation?)
}

pub fn fresh_message(evaluation: &Evaluation) -> String {
    format!(
        "{} is already the latest version available that satisfies the {} constraint and the tag prefix {}",
        evaluation.image, evaluation.constraint, evaluation.tag_prefix
    )
}

pub fn stale_message(evaluation: &Evaluation) -> String {
    format!(
        "The '{}' container image can be upgraded from the '{}' tag to the '{}' one and still satisfy the '{}' constraint.",
        evaluation.image, evaluation.current_version, evaluation.next_version, evaluation.constraint
    )
}
