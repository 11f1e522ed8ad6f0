use std::sync::Arc;

use anyhow::Context;
use colored::Colorize;
use tokio::task::JoinHandle;
use tracing::{info, warn};
use twinsync_reconcile::{
    EntityCheck, MismatchRecord, ReconciliationEngine, ReconciliationReport, SourcePages,
};
use twinsync_retry::{
    retry_queue, InMemoryDeadLetters, MappingRetryHandler, RetryWorker, ShutdownHandle,
};
use twinsync_server::{AppState, TwinsyncServer};
use twinsync_store::{MappingStore, ResilientSource, ResilientTarget, SourceClient, TargetClient};
use twinsync_sync::{EventProcessor, SyncCoordinator};
use twinsync_types::EntityType;

use crate::cli::*;
use crate::config::AppConfig;
use crate::snapshot;

pub async fn run_command(cli: Cli) -> anyhow::Result<()> {
    let config = AppConfig::load_or_default(cli.config.as_deref())?;
    match cli.command {
        Command::Serve(args) => cmd_serve(config, args).await,
        Command::Reconcile(args) => cmd_reconcile(config, args, cli.format).await,
        Command::CheckConfig => cmd_check_config(&config, cli.format),
    }
}

/// Everything `serve` wires together.
struct Services {
    state: AppState,
    dead_letters: Arc<InMemoryDeadLetters>,
    retry_worker: JoinHandle<usize>,
    retry_shutdown: ShutdownHandle,
}

fn build_services(config: &AppConfig, args: &ServeArgs) -> anyhow::Result<Services> {
    let source = snapshot::load_system_or_empty(args.source.as_deref())?;
    let target = snapshot::load_system_or_empty(args.target.as_deref())?;
    let source: Arc<dyn SourceClient> =
        Arc::new(ResilientSource::new(source, config.transport.clone()));
    let target: Arc<dyn TargetClient> =
        Arc::new(ResilientTarget::new(target, config.transport.clone()));
    let mappings: Arc<dyn MappingStore> =
        Arc::new(snapshot::load_mappings_or_empty(args.mappings.as_deref())?);

    let (queue, receiver) = retry_queue(config.retry.queue_capacity);
    let dead_letters = Arc::new(InMemoryDeadLetters::new());
    let retry_handler = Arc::new(MappingRetryHandler::new(
        mappings.clone(),
        Arc::new(queue.clone()),
        dead_letters.clone(),
        config.retry.clone(),
    ));
    let (worker, retry_shutdown) = RetryWorker::new(retry_handler, receiver);

    let coordinator = Arc::new(SyncCoordinator::new(
        source.clone(),
        target.clone(),
        mappings.clone(),
        Arc::new(queue),
        dead_letters.clone(),
        config.handlers(),
        config.sync.clone(),
    ));
    let processor = EventProcessor::new(coordinator, dead_letters.clone());
    let engine = ReconciliationEngine::new(config.reconcile.clone())?;
    let state = AppState::new(processor, engine, source, target, mappings, config.differs()?);

    Ok(Services {
        state,
        dead_letters,
        retry_worker: worker.spawn(),
        retry_shutdown,
    })
}

async fn cmd_serve(config: AppConfig, args: ServeArgs) -> anyhow::Result<()> {
    let services = build_services(&config, &args)?;
    let mut server_config = config.server.clone();
    if let Some(bind) = args.bind {
        server_config.bind_addr = bind;
    }

    println!(
        "{} twinsync on {} ({} entity types)",
        "▶".green().bold(),
        server_config.bind_addr.to_string().bold(),
        config.entity_types().len()
    );
    TwinsyncServer::new(server_config, services.state)
        .serve(async {
            if let Err(e) = tokio::signal::ctrl_c().await {
                warn!(error = %e, "could not listen for ctrl-c");
                std::future::pending::<()>().await;
            }
        })
        .await?;

    services.retry_shutdown.shutdown();
    let retried = services.retry_worker.await.context("retry worker panicked")?;
    info!(
        retried,
        dead_letters = services.dead_letters.len(),
        "retry worker stopped"
    );
    println!("{} Stopped.", "✓".green());
    Ok(())
}

async fn reconcile(config: &AppConfig, args: &ReconcileArgs) -> anyhow::Result<ReconciliationReport> {
    let entity_type = EntityType::parse(args.entity.as_str())?;
    let differ = config.differ_for(entity_type.as_str())?;
    let source: Arc<dyn SourceClient> = Arc::new(snapshot::load_system(&args.source)?);
    let target: Arc<dyn TargetClient> = Arc::new(snapshot::load_system(&args.target)?);
    let mappings: Arc<dyn MappingStore> = Arc::new(snapshot::load_mappings(&args.mappings)?);

    let mut reconcile_config = config.reconcile.clone();
    if let Some(page_size) = args.page_size {
        reconcile_config.page_size = page_size;
    }
    let engine = ReconciliationEngine::new(reconcile_config)?;

    let mut pages = SourcePages::new(entity_type.clone(), source.clone());
    if engine.config().totals_check {
        pages = pages.with_totals(target.clone());
    }
    let check = Arc::new(EntityCheck::new(
        entity_type.clone(),
        source,
        target,
        mappings,
        differ,
    ));
    Ok(engine.sweep(entity_type.as_str(), &pages, check).await?)
}

async fn cmd_reconcile(
    config: AppConfig,
    args: ReconcileArgs,
    format: OutputFormat,
) -> anyhow::Result<()> {
    let report = reconcile(&config, &args).await?;
    match format {
        OutputFormat::Json => println!("{}", serde_json::to_string_pretty(&report)?),
        OutputFormat::Text => print_report(&report),
    }
    if args.fail_on_mismatch && report.mismatch_count() > 0 {
        anyhow::bail!("{} mismatches found", report.mismatch_count());
    }
    Ok(())
}

fn print_report(report: &ReconciliationReport) {
    let summary = report.summary();
    let status = if summary.success {
        "✓".green().bold()
    } else {
        "!".yellow().bold()
    };
    println!("{} Reconciliation of {}", status, report.name.bold());
    println!(
        "  Checked: {} items in {} pages",
        summary.items_checked.to_string().bold(),
        summary.pages_checked
    );
    if report.page_errors > 0 || report.check_errors > 0 {
        println!(
            "  Errors: {} pages, {} items",
            report.page_errors.to_string().yellow(),
            report.check_errors.to_string().yellow()
        );
    }
    if summary.mismatch_count == 0 {
        println!("  {}", "No mismatches.".green());
        return;
    }
    println!("  Mismatches: {}", summary.mismatch_count.to_string().red().bold());
    for mismatch in &report.mismatches {
        match mismatch {
            MismatchRecord::Entity {
                source_id,
                target_id,
                differences,
            } => {
                let target = target_id.as_deref().unwrap_or("unmapped");
                println!("  {} {} → {}", "✗".red(), source_id.yellow(), target.cyan());
                for difference in differences {
                    let at = match &difference.id {
                        Some(id) => format!("{} [{}]", difference.property, id),
                        None => difference.property.clone(),
                    };
                    println!(
                        "      {}: {} ≠ {}",
                        at,
                        difference.source.to_string().green(),
                        difference.target.to_string().red()
                    );
                }
            }
            MismatchRecord::Count {
                key,
                source_count,
                target_count,
            } => {
                println!(
                    "  {} {} totals: source {}, target {}",
                    "✗".red(),
                    key.yellow(),
                    source_count,
                    target_count
                );
            }
        }
    }
}

fn cmd_check_config(config: &AppConfig, format: OutputFormat) -> anyhow::Result<()> {
    if format == OutputFormat::Json {
        println!("{}", serde_json::to_string_pretty(config)?);
        return Ok(());
    }
    println!("{} Configuration is valid", "✓".green().bold());
    println!("  Bind: {}", config.server.bind_addr.to_string().bold());
    println!(
        "  Sync: {} workers, {} retries, mappings typed {}",
        config.sync.workers,
        config.sync.operation_retries,
        config.sync.create_mapping_type.to_string().cyan()
    );
    println!(
        "  Mapping retry: {} attempts, queue of {}",
        config.retry.max_attempts, config.retry.queue_capacity
    );
    println!(
        "  Reconcile: pages of {}, {} workers, abort after {} page errors",
        config.reconcile.page_size, config.reconcile.workers, config.reconcile.max_page_errors
    );
    for name in config.entity_types() {
        let translated = if config.entities.contains_key(&name) {
            "translated".cyan()
        } else {
            "identity".dimmed()
        };
        let schema = if config.schemas.contains_key(&name) {
            "schema".green()
        } else {
            "no schema".yellow()
        };
        println!("  Entity {}: {}, {}", name.bold(), translated, schema);
    }
    Ok(())
}
