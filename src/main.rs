use std::io::Read;
use std::process::ExitCode;
use std::sync::Arc;

use tokio_util::sync::CancellationToken;
use tracing::{error, info};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use codemod::{CodemodJob, Config, Coordinator, Error, GitResolver, HttpRewriteEngine};

#[tokio::main]
async fn main() -> ExitCode {
    // Load environment variables from .env file
    dotenvy::dotenv().ok();

    // Logs go to stderr; stdout carries the results
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "codemod=info".into()),
        )
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();

    match run().await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            error!(error = %e, "codemod failed");
            eprintln!("codemod: {e}");
            ExitCode::FAILURE
        }
    }
}

async fn run() -> Result<(), Error> {
    let config = Config::from_env()?;
    let job = CodemodJob::from_json(&read_job()?)?;

    let resolver = Arc::new(GitResolver::new(config.repos_dir.clone()));
    let engine = Arc::new(HttpRewriteEngine::new(
        &config.replacer_url,
        config.request_timeout,
    )?);

    info!(
        replacer = %engine.base_url(),
        repos = job.repos.len(),
        "Starting codemod"
    );

    let coordinator = Coordinator::new(resolver, engine, config.coordinator.clone());
    if coordinator.config().max_concurrent_shards > 0 {
        info!(
            max_concurrent_shards = coordinator.config().max_concurrent_shards,
            "Bounding shard fan-out"
        );
    }

    // Ctrl-C cancels every in-flight shard
    let cancel = CancellationToken::new();
    let on_signal = cancel.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            on_signal.cancel();
        }
    });

    let output = coordinator
        .transform_with_cancel(
            &job.request,
            &job.repos,
            job.deadline(config.default_timeout),
            &cancel,
        )
        .await?;

    println!("{}", serde_json::to_string_pretty(&output)?);
    Ok(())
}

/// Read the job from the file named on the command line, or from stdin.
fn read_job() -> Result<String, Error> {
    match std::env::args().nth(1) {
        Some(path) if path != "-" => Ok(std::fs::read_to_string(path)?),
        _ => {
            let mut text = String::new();
            std::io::stdin().read_to_string(&mut text)?;
            Ok(text)
        }
    }
}
