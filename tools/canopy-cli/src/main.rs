use std::{
    path::{Path, PathBuf},
    process::ExitCode,
    sync::Arc,
};

use anyhow::{Context, Result};
use canopy_capability::{CapabilityService, SystemClock};
use clap::{Parser, Subcommand};
use tokio::io::{AsyncBufReadExt, AsyncReadExt, AsyncWriteExt, BufReader};
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

mod config;
mod dispatch;

use config::ConfigArgs;
use dispatch::{handle, handle_line, Reply, Request};

/// Issue, verify and export policy-gated call capabilities.
///
/// Logs go to stderr; stdout carries only JSON responses.
#[derive(Parser, Debug)]
#[command(name = "canopy", author, version, about)]
struct Cli {
    #[command(flatten)]
    config: ConfigArgs,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Print issuer address and policy engine status.
    Health,

    /// Evaluate policy for `{txIntent}` and issue a capability addressed to the target.
    Evaluate(InputArgs),

    /// Issue a capability for `{txIntent, verifier, expiry?, nonce?}`.
    Issue(InputArgs),

    /// Verify `{txIntent, verifier, capabilitySig, expiry, nonce}`.
    Verify(InputArgs),

    /// Export `{txIntent, expiry?, nonce?}` as a signed EAS attestation.
    Attest(InputArgs),

    /// Answer line-delimited JSON requests (`{"op": ..., ...}`) from stdin until EOF.
    Serve,
}

#[derive(clap::Args, Debug)]
struct InputArgs {
    /// JSON request file, or `-` for stdin.
    #[arg(long, short, default_value = "-")]
    input: PathBuf,
}

fn init_tracing() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(false)
        .try_init();
}

#[tokio::main]
async fn main() -> Result<ExitCode> {
    dotenv::dotenv().ok();
    let cli = Cli::parse();
    init_tracing();

    let signer = cli.config.signer()?;
    let policy = Arc::new(cli.config.policy_engine());
    let service = CapabilityService::new(
        cli.config.service_config(),
        signer,
        policy.clone(),
        Arc::new(SystemClock),
    );

    if !matches!(cli.command, Command::Serve) {
        policy.init().await;
    }
    let reply = match &cli.command {
        Command::Serve => {
            // Requests are answered while the backend loads; until then the engine reports warming.
            let policy = policy.clone();
            tokio::spawn(async move { policy.init().await });
            serve(&service).await?;
            return Ok(ExitCode::SUCCESS);
        }
        Command::Health => handle(&service, &Request::Health),
        Command::Evaluate(args) => {
            let input = read_input(&args.input).await?;
            parse_then(&service, &input, Request::EvaluatePolicy)
        }
        Command::Issue(args) => {
            let input = read_input(&args.input).await?;
            parse_then(&service, &input, Request::IssueCapability)
        }
        Command::Verify(args) => {
            let input = read_input(&args.input).await?;
            parse_then(&service, &input, Request::VerifyCapability)
        }
        Command::Attest(args) => {
            let input = read_input(&args.input).await?;
            parse_then(&service, &input, Request::ExportAttestation)
        }
    };

    let rendered = serde_json::to_string_pretty(&reply.body).context("failed to render response")?;
    println!("{rendered}");
    Ok(if reply.is_error {
        ExitCode::FAILURE
    } else {
        ExitCode::SUCCESS
    })
}

fn parse_then<T: serde::de::DeserializeOwned>(
    service: &CapabilityService,
    input: &str,
    wrap: impl FnOnce(T) -> Request,
) -> Reply {
    match serde_json::from_str::<T>(input) {
        Ok(request) => handle(service, &wrap(request)),
        Err(err) => Reply::malformed(&err),
    }
}

async fn read_input(path: &Path) -> Result<String> {
    if path.as_os_str() == "-" {
        let mut buf = String::new();
        tokio::io::stdin()
            .read_to_string(&mut buf)
            .await
            .context("failed to read request from stdin")?;
        Ok(buf)
    } else {
        tokio::fs::read_to_string(path)
            .await
            .with_context(|| format!("failed to read request from {}", path.display()))
    }
}

async fn serve(service: &CapabilityService) -> Result<()> {
    info!("serving line-delimited JSON requests on stdin");
    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    let mut stdout = tokio::io::stdout();

    while let Some(line) = lines.next_line().await.context("failed to read stdin")? {
        let line = line.trim();
        if line.is_empty() {
            continue;
        }
        let reply = handle_line(service, line);
        if reply.is_error {
            warn!(response = %reply.body, "request failed");
        }
        let mut out = serde_json::to_vec(&reply.body).context("failed to render response")?;
        out.push(b'\n');
        stdout.write_all(&out).await.context("failed to write stdout")?;
        stdout.flush().await.context("failed to flush stdout")?;
    }

    info!("stdin closed, shutting down");
    Ok(())
}
