use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::{bail, Context, Result};
use bakery_config::{load_config, BakeryConfig};
use bakery_core::{SaleDate, SaleDocument, Salesman, SalesmanId};
use bakery_ledger::{
    CascadeRequest, ChainAuditor, DailySalesStore, DailySummaryReader, DueRecalculator,
    RecalcQueue, SaleEntry, SalesSubmission, SalesSubmissionService, SalesmanDirectory,
    SqliteDailySalesStore,
};
use clap::{ArgAction, Args, Parser, Subcommand};
use serde::de::DeserializeOwned;
use tracing::{info, warn};

use crate::report;
use crate::telemetry::init_tracing;

#[derive(Parser)]
#[command(author, version, about = "Bakery back-office ledger")]
pub struct Cli {
    /// Directory holding `default.toml` and per-environment overrides
    #[arg(long, global = true, default_value = "config")]
    config: PathBuf,
    /// Configuration environment to layer on top of the defaults
    #[arg(long, global = true, default_value = "default")]
    env: String,
    /// Increase logging verbosity (-v debug, -vv trace)
    #[arg(short, long, action = ArgAction::Count, global = true)]
    verbose: u8,
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Manage the salesman directory
    #[command(subcommand)]
    Salesman(SalesmanCommand),
    /// Replace a day's sales and cascade the dues forward
    Submit(SubmitArgs),
    /// Re-run the due cascade for one salesman after a date
    Recalc(RecalcArgs),
    /// Show every salesman's balances for a day
    Summary(SummaryArgs),
    /// Check stored due chains for drift
    Audit(AuditArgs),
    /// Load legacy sale documents
    Import(ImportArgs),
}

#[derive(Subcommand)]
pub enum SalesmanCommand {
    /// Create or update a salesman
    Add {
        id: String,
        name: String,
        #[arg(long)]
        inactive: bool,
    },
    /// List every salesman
    List,
}

#[derive(Args)]
pub struct SubmitArgs {
    #[arg(long)]
    date: String,
    /// JSON array of `{salesmanId, categories, deposit}` entries
    #[arg(long)]
    file: PathBuf,
}

#[derive(Args)]
pub struct RecalcArgs {
    #[arg(long)]
    salesman: String,
    #[arg(long)]
    date: String,
}

#[derive(Args)]
pub struct SummaryArgs {
    #[arg(long)]
    date: String,
    #[arg(long)]
    json: bool,
}

#[derive(Args)]
pub struct AuditArgs {
    /// Audit only this salesman
    #[arg(long)]
    salesman: Option<String>,
    /// Re-run the cascade from each broken chain's repair anchor
    #[arg(long)]
    repair: bool,
}

#[derive(Args)]
pub struct ImportArgs {
    /// JSON array of legacy sale documents
    #[arg(long)]
    file: PathBuf,
}

pub async fn run() -> Result<()> {
    let cli = Cli::parse();
    let config = load_config(Some(cli.config.as_path()), Some(cli.env.as_str()))?;
    let _guard = init_tracing(&config.logging, cli.verbose)?;
    info!(env = %cli.env, database = %config.database.path.display(), "bakery starting");

    let store = Arc::new(
        SqliteDailySalesStore::new(&config.database.path).with_context(|| {
            format!(
                "failed to open database {}",
                config.database.path.display()
            )
        })?,
    );

    match cli.command {
        Commands::Salesman(command) => run_salesman(store.as_ref(), command),
        Commands::Submit(args) => run_submit(&config, store, args).await,
        Commands::Recalc(args) => run_recalc(&config, store, args).await,
        Commands::Summary(args) => run_summary(store.as_ref(), args),
        Commands::Audit(args) => run_audit(store, args),
        Commands::Import(args) => run_import(store.as_ref(), args),
    }
}

fn run_salesman(directory: &dyn SalesmanDirectory, command: SalesmanCommand) -> Result<()> {
    match command {
        SalesmanCommand::Add { id, name, inactive } => {
            let Some(id) = SalesmanId::parse(&id) else {
                bail!("salesman id must not be blank");
            };
            let salesman = Salesman {
                id,
                name,
                active: !inactive,
            };
            directory.upsert_salesman(&salesman)?;
            println!("saved salesman {}", salesman.id);
        }
        SalesmanCommand::List => {
            for salesman in directory.list_salesmen()? {
                let state = if salesman.active { "active" } else { "inactive" };
                println!("{}\t{}\t{}", salesman.id, salesman.name, state);
            }
        }
    }
    Ok(())
}

async fn run_submit(
    config: &BakeryConfig,
    store: Arc<SqliteDailySalesStore>,
    args: SubmitArgs,
) -> Result<()> {
    let date = parse_date(&args.date)?;
    let entries: Vec<SaleEntry> = read_json(&args.file)?;
    let (queue, worker) = RecalcQueue::spawn(
        DueRecalculator::new(store.clone()),
        config.recalc.queue_capacity,
    );
    let service = SalesSubmissionService::new(store, queue);

    let receipt = service
        .submit(SalesSubmission { date, entries })
        .await
        .with_context(|| format!("failed to submit sales for {date}"))?;
    println!(
        "replaced {}: removed {} records, wrote {}",
        receipt.date,
        receipt.removed,
        receipt.records.len()
    );
    for ticket in receipt.tickets {
        let request = ticket.request().clone();
        match ticket.wait().await {
            Ok(outcome) => println!("{}", report::cascade_line(&outcome)),
            Err(err) => println!("{}", report::cascade_failure_line(&request, &err)),
        }
    }
    for (salesman, err) in &receipt.unqueued {
        println!("cascade {salesman}@{date} NOT QUEUED: {err}");
    }

    drop(service);
    if let Err(err) = worker.await {
        warn!(error = %err, "recalculation worker ended abnormally");
    }
    Ok(())
}

async fn run_recalc(
    config: &BakeryConfig,
    store: Arc<SqliteDailySalesStore>,
    args: RecalcArgs,
) -> Result<()> {
    let request = CascadeRequest::parse(&args.salesman, &args.date)?;
    let (queue, worker) =
        RecalcQueue::spawn(DueRecalculator::new(store), config.recalc.queue_capacity);
    let ticket = queue.enqueue(request.clone()).await?;
    drop(queue);

    let result = ticket.wait().await;
    if let Err(err) = worker.await {
        warn!(error = %err, "recalculation worker ended abnormally");
    }
    match result {
        Ok(outcome) => {
            println!("{}", report::cascade_line(&outcome));
            Ok(())
        }
        Err(err) => {
            println!("{}", report::cascade_failure_line(&request, &err));
            Err(err).with_context(|| format!("cascade {request} failed"))
        }
    }
}

fn run_summary<S>(store: &S, args: SummaryArgs) -> Result<()>
where
    S: DailySalesStore + SalesmanDirectory,
{
    let date = parse_date(&args.date)?;
    let days = DailySummaryReader::new(store, store)
        .read(date)
        .with_context(|| format!("failed to read summary for {date}"))?;
    if args.json {
        println!("{}", serde_json::to_string_pretty(&days)?);
    } else {
        print!("{}", report::summary_table(&days));
    }
    Ok(())
}

fn run_audit(store: Arc<SqliteDailySalesStore>, args: AuditArgs) -> Result<()> {
    let auditor = ChainAuditor::new(store.clone());
    let reports = match args.salesman.as_deref() {
        Some(raw) => {
            let Some(salesman) = SalesmanId::parse(raw) else {
                bail!("salesman id must not be blank");
            };
            vec![auditor.audit(&salesman)?]
        }
        None => auditor.audit_all()?,
    };
    if reports.is_empty() {
        println!("no records to audit");
        return Ok(());
    }

    let recalculator = DueRecalculator::new(store);
    for chain in &reports {
        print!("{}", report::chain_report(chain));
        if !args.repair || chain.is_clean() {
            continue;
        }
        match auditor.repair(chain, &recalculator) {
            Ok(Some(outcome)) => println!("  {}", report::cascade_line(&outcome)),
            Ok(None) => println!("  no repair anchor available"),
            Err(err) => bail!("repair of {} failed: {err}", chain.salesman),
        }
    }
    Ok(())
}

fn run_import(store: &SqliteDailySalesStore, args: ImportArgs) -> Result<()> {
    let documents: Vec<SaleDocument> = read_json(&args.file)?;
    let imported = store
        .import_documents(&documents)
        .with_context(|| format!("failed to import {}", args.file.display()))?;
    println!("imported {imported} documents");
    Ok(())
}

fn parse_date(raw: &str) -> Result<SaleDate> {
    SaleDate::parse(raw).with_context(|| format!("invalid --date '{raw}'"))
}

fn read_json<T: DeserializeOwned>(path: &Path) -> Result<T> {
    let raw = fs::read_to_string(path)
        .with_context(|| format!("failed to read {}", path.display()))?;
    serde_json::from_str(&raw).with_context(|| format!("failed to parse {}", path.display()))
}
