use crate::{
    client::{
        cancellation::{cancellation_grouping, CancelOperation, CancellationAction, CancellationRow},
        documents::{document_grouping, OrderRow, ShippingDocumentAction},
        flash_sale::{flash_sale_grouping, pending, FlashSaleToggleAction, ModelRow},
        http::DashboardApi,
        RemoteActionClient,
    },
    config::Config,
    duplicate::{duplicate_grouping, fetch_source, DuplicateAction, FlashSaleSource, TimeslotRow},
    executor::ExecutorOptions,
    grouping::{describe, GroupingStrategy},
    pipeline::{self, RunRequest},
    util::ensure_dir,
    work::WorkItem,
};
use anyhow::{anyhow, bail, Context, Result};
use clap::{Parser, Subcommand, ValueEnum};
use serde::de::DeserializeOwned;
use std::path::{Path, PathBuf};
use tracing::warn;
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter, Layer};

#[derive(Parser, Debug)]
#[command(name = "seller-bulk")]
#[command(about = "Sequential bulk operations for marketplace seller dashboards")]
pub struct Args {
    #[command(subcommand)]
    pub cmd: Command,

    /// Path to config TOML. If omitted, uses ./seller-bulk.toml if present.
    #[arg(long)]
    pub config: Option<PathBuf>,

    /// Override log level (trace/debug/info/warn/error).
    #[arg(long)]
    pub log_level: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum ActionKind {
    Documents,
    FlashSale,
    Cancellations,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Check that the dashboard API answers.
    Doctor {},
    /// Show how a work list would be grouped into calls, without calling.
    Plan {
        #[arg(long, value_enum)]
        action: ActionKind,
        #[arg(long)]
        input: PathBuf,
    },
    /// Download shipping labels for a list of orders.
    PrintDocuments {
        #[arg(long)]
        input: PathBuf,
        /// Only retry the orders that failed in this earlier report.
        #[arg(long)]
        retry_from: Option<PathBuf>,
        #[arg(long)]
        out_dir: Option<PathBuf>,
    },
    /// Activate (default) or deactivate flash-sale models.
    ToggleFlashSale {
        #[arg(long)]
        input: PathBuf,
        #[arg(long)]
        deactivate: bool,
        #[arg(long)]
        retry_from: Option<PathBuf>,
        #[arg(long)]
        out_dir: Option<PathBuf>,
    },
    /// Accept or reject buyer cancellation requests.
    Cancellations {
        #[arg(long)]
        input: PathBuf,
        #[arg(long, value_enum)]
        operation: CancelOperation,
        #[arg(long)]
        retry_from: Option<PathBuf>,
        #[arg(long)]
        out_dir: Option<PathBuf>,
    },
    /// Copy a flash sale into other time slots.
    DuplicateFlashSale {
        #[arg(long)]
        shop_id: u64,
        #[arg(long)]
        flash_sale_id: u64,
        #[arg(long, value_delimiter = ',', required = true)]
        timeslots: Vec<u64>,
        /// Items/models JSON of the source flash sale; fetched when omitted.
        #[arg(long)]
        source: Option<PathBuf>,
        #[arg(long)]
        retry_from: Option<PathBuf>,
        #[arg(long)]
        out_dir: Option<PathBuf>,
    },
}

pub async fn dispatch(args: Args) -> Result<()> {
    let cfg_path = resolve_config_path(args.config.as_deref())?;
    let cfg = Config::load(&cfg_path)?;

    match &args.cmd {
        Command::Doctor {} => {
            let _guard = init_logging(&args, &cfg, resolve_log_path(&cfg, None).as_deref())?;
            doctor(&cfg).await
        }
        Command::Plan { action, input } => {
            let _guard = init_logging(&args, &cfg, resolve_log_path(&cfg, None).as_deref())?;
            plan(*action, input)
        }
        Command::PrintDocuments {
            input,
            retry_from,
            out_dir,
        } => {
            let (rows, raw) = load_rows::<OrderRow>(input)?;
            let items = rows.into_iter().map(OrderRow::into_work_item).collect();
            let api = DashboardApi::new(&cfg)?;
            let action = ShippingDocumentAction::new(api, cfg.documents.document_type.clone());
            let run = RunRequest {
                cfg: &cfg,
                raw_input: &raw,
                retry_from: retry_from.as_deref(),
                out_override: out_dir.as_deref(),
            };
            run_batch(&args, run, action, document_grouping(), items, &cfg.executor_options()).await
        }
        Command::ToggleFlashSale {
            input,
            deactivate,
            retry_from,
            out_dir,
        } => {
            let activate = !deactivate;
            let (rows, raw) = load_rows::<ModelRow>(input)?;
            let before = rows.len();
            let rows = pending(rows, activate);
            if rows.len() < before {
                eprintln!("skipping {} models already in target state", before - rows.len());
            }
            let items = rows.into_iter().map(ModelRow::into_work_item).collect();
            let api = DashboardApi::new(&cfg)?;
            let action = FlashSaleToggleAction::new(api, activate);
            let run = RunRequest {
                cfg: &cfg,
                raw_input: &raw,
                retry_from: retry_from.as_deref(),
                out_override: out_dir.as_deref(),
            };
            run_batch(&args, run, action, flash_sale_grouping(), items, &cfg.executor_options()).await
        }
        Command::Cancellations {
            input,
            operation,
            retry_from,
            out_dir,
        } => {
            let (rows, raw) = load_rows::<CancellationRow>(input)?;
            let items = rows.into_iter().map(CancellationRow::into_work_item).collect();
            let api = DashboardApi::new(&cfg)?;
            let action = CancellationAction::new(api, *operation);
            let run = RunRequest {
                cfg: &cfg,
                raw_input: &raw,
                retry_from: retry_from.as_deref(),
                out_override: out_dir.as_deref(),
            };
            run_batch(&args, run, action, cancellation_grouping(), items, &cfg.executor_options()).await
        }
        Command::DuplicateFlashSale {
            shop_id,
            flash_sale_id,
            timeslots,
            source,
            retry_from,
            out_dir,
        } => {
            let api = DashboardApi::new(&cfg)?;
            let source = match source {
                Some(path) => load_json::<FlashSaleSource>(path)?.0,
                None => fetch_source(&api, *shop_id, *flash_sale_id)
                    .await
                    .with_context(|| format!("loading flash sale #{flash_sale_id}"))?,
            };

            let (tx, mut rx) = tokio::sync::mpsc::unbounded_channel();
            let action = DuplicateAction::new(api, &source).with_events(tx);
            if action.registrations().is_empty() {
                bail!("flash sale #{flash_sale_id} has no models with campaign stock");
            }

            let printer = tokio::spawn(async move {
                while let Some(ev) = rx.recv().await {
                    if let Ok(line) = serde_json::to_string(&ev) {
                        println!("{line}");
                    }
                }
            });

            let items: Vec<_> = timeslots
                .iter()
                .map(|&timeslot_id| {
                    TimeslotRow {
                        shop_id: *shop_id,
                        timeslot_id,
                    }
                    .into_work_item()
                })
                .collect();
            let raw = serde_json::to_vec(&serde_json::json!({
                "shop_id": shop_id,
                "flash_sale_id": flash_sale_id,
                "timeslots": timeslots,
            }))?;
            let run = RunRequest {
                cfg: &cfg,
                raw_input: &raw,
                retry_from: retry_from.as_deref(),
                out_override: out_dir.as_deref(),
            };
            let result =
                run_batch(&args, run, action, duplicate_grouping(), items, &cfg.duplicate_options()).await;
            // The action (and its sender) is gone by now, so the printer drains and ends.
            printer.await.ok();
            result
        }
    }
}

fn resolve_config_path(user: Option<&Path>) -> Result<PathBuf> {
    if let Some(p) = user {
        return Ok(p.to_path_buf());
    }
    let default = PathBuf::from("seller-bulk.toml");
    if default.exists() {
        Ok(default)
    } else {
        Ok(PathBuf::from("seller-bulk.example.toml"))
    }
}

fn init_logging(args: &Args, cfg: &Config, file_path: Option<&Path>) -> Result<Option<WorkerGuard>> {
    let level = args
        .log_level
        .as_deref()
        .unwrap_or(cfg.logging.level.as_str());

    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level));

    let stderr_layer = if cfg.logging.json {
        tracing_subscriber::fmt::layer()
            .json()
            .with_writer(std::io::stderr)
            .with_target(true)
            .boxed()
    } else {
        tracing_subscriber::fmt::layer()
            .with_writer(std::io::stderr)
            .with_target(true)
            .boxed()
    };

    let (file_layer, guard) = if let Some(path) = file_path {
        let parent = path.parent().unwrap_or_else(|| Path::new("."));
        ensure_dir(parent)?;
        let file = std::fs::File::create(path)
            .with_context(|| format!("create log file: {}", path.display()))?;
        let (non_blocking, guard) = tracing_appender::non_blocking(file);
        let layer = tracing_subscriber::fmt::layer()
            .with_writer(non_blocking)
            .with_ansi(false)
            .with_target(true)
            .boxed();
        (Some(layer), Some(guard))
    } else {
        (None, None)
    };

    tracing_subscriber::registry()
        .with(filter)
        .with(stderr_layer)
        .with(file_layer)
        .try_init()
        .map_err(|e| anyhow!("failed to init logging: {e}"))?;

    Ok(guard)
}

async fn doctor(cfg: &Config) -> Result<()> {
    let api = DashboardApi::new(cfg)?;
    let health = api
        .health()
        .await
        .with_context(|| format!("dashboard at {} is not healthy", api.base_url()))?;
    println!(
        "{}",
        serde_json::to_string_pretty(&serde_json::json!({
            "base_url": api.base_url(),
            "health": health,
        }))?
    );
    Ok(())
}

fn plan(action: ActionKind, input: &Path) -> Result<()> {
    let summary = match action {
        ActionKind::Documents => {
            let (rows, _) = load_rows::<OrderRow>(input)?;
            let items = rows.into_iter().map(OrderRow::into_work_item).collect();
            describe(&document_grouping().plan(items))
        }
        ActionKind::FlashSale => {
            let (rows, _) = load_rows::<ModelRow>(input)?;
            let items = rows.into_iter().map(ModelRow::into_work_item).collect();
            describe(&flash_sale_grouping().plan(items))
        }
        ActionKind::Cancellations => {
            let (rows, _) = load_rows::<CancellationRow>(input)?;
            let items = rows.into_iter().map(CancellationRow::into_work_item).collect();
            describe(&cancellation_grouping().plan(items))
        }
    };
    println!("{}", serde_json::to_string_pretty(&summary)?);
    Ok(())
}

fn load_json<T: DeserializeOwned>(path: &Path) -> Result<(T, Vec<u8>)> {
    let raw = std::fs::read(path).with_context(|| format!("reading input: {}", path.display()))?;
    let value = serde_json::from_slice(&raw)
        .with_context(|| format!("parsing input JSON: {}", path.display()))?;
    Ok((value, raw))
}

fn load_rows<T: DeserializeOwned>(path: &Path) -> Result<(Vec<T>, Vec<u8>)> {
    load_json::<Vec<T>>(path)
}

async fn run_batch<C>(
    args: &Args,
    req: RunRequest<'_>,
    client: C,
    grouping: GroupingStrategy,
    items: Vec<WorkItem<C::Payload>>,
    opts: &ExecutorOptions,
) -> Result<()>
where
    C: RemoteActionClient,
    C::Payload: Clone,
{
    let cfg = req.cfg;
    let run = pipeline::prepare(&req, &client, items)?;

    let log_path = resolve_log_path(cfg, Some(&run.run_dir));
    let _guard = init_logging(args, cfg, log_path.as_deref())?;

    let summary = pipeline::execute(&req, run, client, grouping, opts).await?;
    let report = &summary.report;

    if cfg.global.print_table {
        eprint!("{}", report.render_table());
    }
    if cfg.global.print_summary {
        println!(
            "{}",
            serde_json::to_string_pretty(&serde_json::json!({
                "run_id": summary.run_id,
                "run_dir": summary.run_dir,
                "total_success": report.total_success,
                "total_failed": report.total_failed,
                "documents": summary.documents,
                "status": if report.has_failures() { "partial" } else { "ok" },
            }))?
        );
    }
    if report.has_failures() {
        warn!(
            "{} items failed; retry with --retry-from {}",
            report.total_failed,
            summary.run_dir.join(&cfg.output.report_filename).display()
        );
    }

    Ok(())
}

fn resolve_log_path(cfg: &Config, run_dir: Option<&Path>) -> Option<PathBuf> {
    if !cfg.logging.write_to_file {
        return None;
    }

    if !cfg.logging.file_path.is_empty() {
        return Some(PathBuf::from(&cfg.logging.file_path));
    }

    if let Some(run_dir) = run_dir {
        return Some(run_dir.join("logs").join("seller-bulk.log"));
    }

    Some(PathBuf::from(&cfg.output.out_dir).join("seller-bulk.log"))
}
