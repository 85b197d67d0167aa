use anyhow::{anyhow, Context};
use clap::{CommandFactory, Parser};
use lighthouse_batch::{
    install_prometheus_recorder, load_config, setup_logging, write_metrics_file, Cli, CliRunner,
};
use tokio::signal;
use tracing::{error, info, warn};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = Cli::parse();

    setup_logging(args.verbose).map_err(|e| anyhow!(e))?;

    info!("Starting lighthouse-batch v{}", env!("CARGO_PKG_VERSION"));

    let urls = match args.target_urls() {
        Ok(urls) => urls,
        Err(e) => {
            eprintln!("{e}\n");
            Cli::command().print_help()?;
            std::process::exit(2);
        }
    };

    let config = load_config(&args).await.context("Invalid configuration")?;

    let metrics_handle = match &config.metrics_file {
        Some(_) => Some(install_prometheus_recorder()?),
        None => None,
    };

    let cli_runner = CliRunner::new(config.clone());

    let report = tokio::select! {
        result = cli_runner.run(&urls) => Some(result?),
        _ = shutdown_signal() => {
            warn!("Batch interrupted, no results were written");
            None
        }
    };

    if let (Some(handle), Some(path)) = (&metrics_handle, &config.metrics_file) {
        if let Err(e) = write_metrics_file(handle, path).await {
            error!("Failed to write metrics: {}", e);
        }
    }

    match report {
        Some(report) => {
            info!(
                "lighthouse-batch finished: {} audited, {} failed",
                report.records.len(),
                report.failed_urls.len()
            );
            Ok(())
        }
        None => std::process::exit(130),
    }
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            error!("Failed to install Ctrl-C handler: {}", e);
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut sigterm) => {
                sigterm.recv().await;
            }
            Err(e) => {
                error!("Failed to install SIGTERM handler: {}", e);
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => info!("Received SIGINT"),
        _ = terminate => info!("Received SIGTERM"),
    }
}
