use anyhow::{Context, Result};
use clap::Parser;
use std::path::Path;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

use mstfinder::browser::{AutoContinueGate, BrowserSession, OperatorGate, StdinGate};
use mstfinder::cli::Cli;
use mstfinder::config::{AppConfig, ConfigError, CONFIG_PATH};
use mstfinder::engine::ResolutionEngine;
use mstfinder::link::LinkSynthesizer;
use mstfinder::name_api::NameApiChain;
use mstfinder::pipeline::{list_pending_files, synthesize_links_only, BatchRunner};
use mstfinder::registry::{MasothueClient, TvplClient};
use mstfinder::backoff::BackoffPolicy;

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new(cli.log_directive())),
        )
        .init();

    if cli.init {
        let path = AppConfig::create_default_config()?;
        println!("Created default configuration at {}", path.display());
        return Ok(());
    }

    let mut config = load_config(&cli)?;
    if let Some(dir) = &cli.pending_dir {
        config.io.pending_dir = dir.clone();
    }
    if let Some(dir) = &cli.output_dir {
        config.io.output_dir = dir.clone();
    }
    ensure_directories(&config)?;

    if cli.dry_run {
        return dry_run(&config);
    }

    let interrupted = Arc::new(AtomicBool::new(false));
    {
        let flag = interrupted.clone();
        ctrlc::set_handler(move || {
            eprintln!("\nInterrupt received; finishing the current row, outputs will be written.");
            flag.store(true, Ordering::SeqCst);
        })
        .context("Failed to register interrupt handler")?;
    }

    let gate: Arc<dyn OperatorGate> = if cli.auto_continue {
        warn!("--auto-continue: operator pauses disabled, challenges will fail their tier");
        Arc::new(AutoContinueGate)
    } else {
        Arc::new(StdinGate)
    };

    // One interactive session, exclusively owned; failure here is fatal.
    let session = BrowserSession::launch(&config.browser, gate)
        .context("Unable to acquire the browser capability")?;
    if config.browser.warmup {
        session.warmup(&config.registry.primary.home_url)?;
    }

    let table_wait = Duration::from_secs(config.browser.table_wait_timeout_secs);
    let primary = MasothueClient::new(&session, &config.registry.primary, table_wait)?;
    let secondary = TvplClient::new(&session, &config.registry.secondary, table_wait)?;
    let names = NameApiChain::new(
        &config.http,
        config.name_api.sources.clone(),
        BackoffPolicy::from_config(&config.backoff),
    )
    .context("Failed to build the name-lookup API client")?;
    let links = LinkSynthesizer::new(&config.registry.primary.link_base)
        .context("invalid registry.primary.link_base")?;

    let engine = ResolutionEngine::new(&primary, &secondary, &names, &links);
    let runner = BatchRunner::new(&config, &engine, &links, interrupted.clone());

    let reports = runner.run().await?;
    for report in &reports {
        println!(
            "{}: {} rows, {} resolved, {} failed -> {}",
            report.input.display(),
            report.total_rows,
            report.resolved,
            report.failed,
            report.full_output.display()
        );
    }
    if interrupted.load(Ordering::SeqCst) {
        println!("Interrupted; inputs left pending will be reprocessed on the next run.");
    }

    Ok(())
}

fn load_config(cli: &Cli) -> Result<AppConfig> {
    if let Some(path) = &cli.config {
        return AppConfig::load_from_path(Path::new(path))
            .with_context(|| format!("failed to load config from {path}"));
    }

    match AppConfig::load() {
        Ok(config) => Ok(config),
        Err(ConfigError::FileNotFound(_)) => {
            match AppConfig::prompt_create_config()? {
                Some(path) => {
                    info!("created default configuration at {}", path.display());
                    AppConfig::load().context("failed to load freshly created config")
                }
                None => anyhow::bail!(
                    "no configuration found; run `mstfinder --init` to create {}",
                    CONFIG_PATH
                ),
            }
        }
        Err(e) => Err(e.into()),
    }
}

fn ensure_directories(config: &AppConfig) -> Result<()> {
    for dir in [
        &config.io.pending_dir,
        &config.io.done_dir,
        &config.io.output_dir,
    ] {
        std::fs::create_dir_all(dir)
            .with_context(|| format!("Failed to create directory {dir}"))?;
    }
    Ok(())
}

fn dry_run(config: &AppConfig) -> Result<()> {
    let files = list_pending_files(Path::new(&config.io.pending_dir))?;
    if files.is_empty() {
        println!("No pending .csv files in {}", config.io.pending_dir);
        return Ok(());
    }
    for file in files {
        let links = synthesize_links_only(config, &file)?;
        println!("{} -> {}", file.display(), links.display());
    }
    Ok(())
}
