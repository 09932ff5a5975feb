use std::process::ExitCode;

use anyhow::Context;
use campaign_http::{CallDescriptor, Config, Method, RequestExecutor};
use clap::Parser;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

/// Run one API call through the retrying executor and print the JSON result.
///
/// Configuration comes from the environment: API_KEY (required),
/// API_BASE_URL, RETRY_MAX_ATTEMPTS, RETRY_INITIAL_DELAY_MS,
/// RETRY_MAX_DELAY_MS, RETRY_BACKOFF_FACTOR, REQUEST_TIMEOUT_MS.
#[derive(Debug, Parser)]
#[command(name = "campaign-call", version)]
struct Args {
    /// HTTP method: GET, POST, PATCH or DELETE.
    method: Method,
    /// Endpoint path, e.g. /subscribers.
    endpoint: String,
    /// JSON payload; query parameters for GET, request body otherwise.
    #[arg(long)]
    payload: Option<String>,
}

#[tokio::main]
async fn main() -> ExitCode {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "campaign_http=info".into()),
        )
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();

    let args = Args::parse();

    let config = match Config::from_env() {
        Ok(config) => config,
        Err(err) => {
            eprintln!("configuration error: {err}");
            return ExitCode::from(2);
        }
    };

    let descriptor = match build_descriptor(&args) {
        Ok(descriptor) => descriptor,
        Err(err) => {
            eprintln!("invalid call: {err:#}");
            return ExitCode::from(2);
        }
    };

    let executor = RequestExecutor::new(&config);
    let cancel = campaign_http::CancellationToken::new();
    let on_ctrl_c = cancel.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            on_ctrl_c.cancel();
        }
    });

    match executor.execute_with_cancel(&descriptor, &cancel).await {
        Ok(body) => match serde_json::to_string_pretty(&body) {
            Ok(text) => {
                println!("{text}");
                ExitCode::SUCCESS
            }
            Err(err) => {
                eprintln!("could not render response: {err}");
                ExitCode::FAILURE
            }
        },
        Err(err) => {
            tracing::debug!(attempts = err.attempts(), cause = ?err.cause(), "call failed");
            eprintln!("{err}");
            ExitCode::FAILURE
        }
    }
}

fn build_descriptor(args: &Args) -> anyhow::Result<CallDescriptor> {
    let payload: Option<serde_json::Value> = args
        .payload
        .as_deref()
        .map(serde_json::from_str)
        .transpose()
        .context("--payload is not valid JSON")?;
    Ok(CallDescriptor::new(
        args.method,
        args.endpoint.clone(),
        payload,
    )?)
}
