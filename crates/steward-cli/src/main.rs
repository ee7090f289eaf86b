mod commands;
mod interrupt;
mod logging;
mod progress;

use anyhow::{anyhow, Context, Result};
use chrono::Utc;
use clap::{CommandFactory, Parser};
use colored::*;
use commands::{Cli, Commands};
use dotenv::dotenv;
use progress::CliReporter;
use steward_core::analysis::features::Dimension;
use steward_core::analysis::ProposedAction;
use steward_core::execution::{render_json, render_shell, RollbackManager};
use steward_core::{AppConfig, Database, FeedbackStore, HumanDecision, OrganizeEngine, RunReport};
use tracing::{error, info, warn};

fn main() {
    dotenv().ok();

    let _guard = logging::init_logger();

    let args = Cli::parse();

    let config = match steward_core::config::load_configuration() {
        Ok(config) => config,
        Err(err) => {
            error!("Error loading configuration: {}", err);
            std::process::exit(1);
        }
    };

    if let Err(err) = run(args, config) {
        error!("Error: {:#}", err);
        std::process::exit(1);
    }
}

fn run(args: Cli, config: AppConfig) -> Result<()> {
    let Some(command) = args.command else {
        Cli::command().print_long_help()?;
        return Ok(());
    };

    match command {
        Commands::Plan => {
            let (engine, db) = open(config)?;
            interrupt::cancel_on_interrupt(engine.cancel_token())?;
            let source = engine.walk_source()?;
            let report = engine.plan(&db, &source, &CliReporter::new())?;
            print_report(&report, args.json)
        }
        Commands::Organize => {
            let (engine, db) = open(config)?;
            interrupt::cancel_on_interrupt(engine.cancel_token())?;
            let source = engine.walk_source()?;
            let report = engine.organize(&db, &source, &CliReporter::new())?;
            print_report(&report, args.json)
        }
        Commands::Resume { run_id } => {
            let (engine, db) = open(config)?;
            interrupt::cancel_on_interrupt(engine.cancel_token())?;
            let source = engine.walk_source()?;
            let report = engine.resume(&db, run_id, &source, &CliReporter::new())?;
            print_report(&report, args.json)
        }
        Commands::Rollback {
            run_id,
            script,
            apply,
        } => {
            let db = open_database(&config)?;
            let run_id = resolve_run(&db, run_id)?;
            let manager = RollbackManager::new(&db);
            let derivation = manager.derive(run_id)?;
            for gap in &derivation.gaps {
                warn!("{}: {}", gap.path, gap.message);
            }

            if apply {
                let report = manager.apply(&derivation.plan)?;
                if args.json {
                    println!("{}", serde_json::to_string_pretty(&report)?);
                } else {
                    info!(
                        "Rollback of run {}: {} restored, {} already in place, {} failed",
                        run_id,
                        format!("{}", report.restored).green(),
                        format!("{}", report.already_restored).cyan(),
                        format!("{}", report.failures.len()).red(),
                    );
                    for failure in &report.failures {
                        println!("  {} {}: {}", "✗".red(), failure.path, failure.message);
                    }
                }
                if !report.is_complete() {
                    return Err(anyhow!("rollback of run {} left {} files in place", run_id, report.failures.len()));
                }
            } else if script {
                print!("{}", render_shell(&derivation.plan));
            } else {
                println!("{}", render_json(&derivation.plan)?);
            }
            Ok(())
        }
        Commands::Proposals { run_id } => {
            let db = open_database(&config)?;
            let run_id = resolve_run(&db, run_id)?;
            let pending = db.get_pending_proposals(run_id)?;
            if args.json {
                let rows: Vec<_> = pending
                    .iter()
                    .map(|p| {
                        serde_json::json!({
                            "id": p.id,
                            "path": p.path,
                            "destination": p.destination_path,
                            "confidence": p.confidence,
                            "risk": p.risk,
                        })
                    })
                    .collect();
                println!("{}", serde_json::to_string_pretty(&rows)?);
            } else if pending.is_empty() {
                info!("No pending proposals for run {}", run_id);
            } else {
                for p in &pending {
                    println!(
                        "{:>6}  {:.3}  {:<8}  {} -> {}",
                        p.id.to_string().cyan(),
                        p.confidence,
                        p.risk,
                        p.path,
                        p.destination_path.dimmed()
                    );
                }
            }
            Ok(())
        }
        Commands::Feedback {
            proposal_id,
            accept,
            reject: _,
        } => {
            config.validate()?;
            let db = open_database(&config)?;
            let decision = if accept {
                HumanDecision::Accept
            } else {
                HumanDecision::Reject
            };
            let (mut store, issues) =
                FeedbackStore::open(&db, config.learning, config.initial_weights())?;
            for issue in &issues {
                warn!("{}", issue.message);
            }
            let record = store.decide_proposal(proposal_id, decision, Utc::now())?;
            store.commit()?;

            if args.json {
                println!("{}", serde_json::to_string_pretty(&record)?);
            } else if record.applied {
                info!(
                    "Recorded {} for {}; weights updated",
                    decision.to_string().green(),
                    record.path
                );
            } else {
                info!(
                    "Recorded {} for {}; weights unchanged (rate limit or discarded update)",
                    decision.to_string().yellow(),
                    record.path
                );
            }
            Ok(())
        }
        Commands::Duplicates => {
            let engine = OrganizeEngine::new(config)?;
            interrupt::cancel_on_interrupt(engine.cancel_token())?;
            let source = engine.walk_source()?;
            let report = engine.find_duplicates(&source, &CliReporter::new());
            if args.json {
                println!("{}", serde_json::to_string_pretty(&report)?);
                return Ok(());
            }

            if report.cancelled {
                warn!("Duplicate scan cancelled; results are incomplete");
            }
            info!(
                "{} files scanned, {} duplicate groups, {} bytes wasted",
                report.files_scanned,
                format!("{}", report.groups.len()).red(),
                format!("{}", report.wasted_bytes).red(),
            );
            for group in &report.groups {
                println!(
                    "{} {} bytes x {}",
                    group.content_hash.dimmed(),
                    group.file_size,
                    group.members.len()
                );
                for member in &group.members {
                    if *member == group.keeper {
                        println!("  {} {}", "keep".green(), member);
                    } else {
                        println!("  {} {}", "dup ".yellow(), member);
                    }
                }
            }
            for issue in &report.errors {
                println!("  {} [{}] {}: {}", "!".red(), issue.kind, issue.path, issue.message);
            }
            Ok(())
        }
        Commands::History { run, limit, offset } => {
            let db = open_database(&config)?;
            if let Some(run_id) = run {
                let run = db
                    .get_run(run_id)?
                    .ok_or_else(|| anyhow!("run {} not found", run_id))?;
                let entries = db.get_operations_for_run(run_id)?;
                if args.json {
                    println!("{}", serde_json::to_string_pretty(&entries)?);
                    return Ok(());
                }
                info!(
                    "Run {} {} started {}",
                    run.id.to_string().cyan(),
                    run.status,
                    run.started_at
                );
                for entry in &entries {
                    let marker = if entry.outcome.is_success() {
                        "✓".green()
                    } else {
                        "✗".red()
                    };
                    println!(
                        "{:>5} {} {:<10} {} -> {} {}",
                        entry.sequence,
                        marker,
                        entry.kind.as_str(),
                        entry.source_path,
                        entry.destination_path.dimmed(),
                        entry.outcome
                    );
                }
                return Ok(());
            }

            let stats = db.get_history_statistics()?;
            let runs = db.get_run_summaries(limit, offset)?;
            if args.json {
                let body = serde_json::json!({ "statistics": stats, "runs": runs });
                println!("{}", serde_json::to_string_pretty(&body)?);
                return Ok(());
            }

            info!(
                "{} runs ({} dry), {} moved, {} failed, {} rolled back",
                stats.total_runs,
                stats.dry_runs,
                format!("{}", stats.moved).green(),
                format!("{}", stats.failed).red(),
                format!("{}", stats.compensated).cyan(),
            );
            for (status, count) in &stats.runs_by_status {
                println!("  {:<22} {}", status, count);
            }
            for run in &runs {
                println!(
                    "{:>6}  {}  {:<22} {:>5} moved {:>5} failed {:>5} rolled back{}",
                    run.id.to_string().cyan(),
                    run.started_at,
                    run.status,
                    run.moved,
                    run.failed,
                    run.compensated,
                    if run.dry_run { " (dry run)" } else { "" }
                );
            }
            Ok(())
        }
        Commands::Weights => {
            let db = open_database(&config)?;
            let (weights, issues) =
                steward_core::feedback::load_weights(&db, config.initial_weights())?;
            for issue in &issues {
                warn!("{}", issue.message);
            }
            if args.json {
                println!("{}", serde_json::to_string_pretty(&weights)?);
            } else {
                for dimension in Dimension::ALL {
                    println!("{:<22} {:.4}", dimension.name(), weights.get(dimension));
                }
            }
            Ok(())
        }
        Commands::PrintConfig => {
            println!("Configuration: {:?}", config);
            Ok(())
        }
    }
}

fn open(config: AppConfig) -> Result<(OrganizeEngine, Database)> {
    let db = open_database(&config)?;
    let engine = OrganizeEngine::new(config)?;
    Ok((engine, db))
}

fn open_database(config: &AppConfig) -> Result<Database> {
    Database::open(&config.database_path)
        .with_context(|| format!("opening database {}", config.database_path))
}

fn resolve_run(db: &Database, run_id: Option<i64>) -> Result<i64> {
    match run_id {
        Some(id) => Ok(id),
        None => db
            .get_latest_run_id()?
            .ok_or_else(|| anyhow!("no runs recorded yet")),
    }
}

fn print_report(report: &RunReport, json: bool) -> Result<()> {
    if json {
        println!("{}", report.to_json()?);
        return Ok(());
    }

    println!();
    info!(
        "Run {} {}{}",
        report.run_id.to_string().cyan(),
        report.status,
        if report.dry_run { " (dry run)" } else { "" }
    );
    info!(
        "{} auto, {} review, {} proposed, {} skipped",
        format!("{}", report.count(ProposedAction::AutoExecute)).green(),
        format!("{}", report.count(ProposedAction::ReviewExecute)).green(),
        format!("{}", report.count(ProposedAction::ProposeConfirm)).yellow(),
        format!("{}", report.count(ProposedAction::Skip)).dimmed(),
    );
    info!(
        "{} duplicate groups, {} bytes wasted",
        format!("{}", report.duplicate_groups.len()).red(),
        format!("{}", report.wasted_bytes).red(),
    );

    for proposal in report
        .proposals
        .iter()
        .filter(|p| p.action == ProposedAction::ProposeConfirm)
    {
        println!(
            "  {} #{} {} -> {} ({:.3}, {})",
            "?".yellow(),
            proposal.proposal_id.map(|id| id.to_string()).unwrap_or_default(),
            proposal.path,
            proposal.destination,
            proposal.confidence,
            proposal.risk.as_str()
        );
    }
    for issue in &report.errors {
        println!("  {} [{}] {}: {}", "!".red(), issue.kind, issue.path, issue.message);
    }
    Ok(())
}
