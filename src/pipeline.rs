//! One batch run on disk: retry selection, run id, run directory and the
//! files a finished run leaves behind.

use crate::{
    client::RemoteActionClient,
    config::Config,
    executor::{BatchExecutor, ExecutorOptions, RecordedUpdates},
    grouping::GroupingStrategy,
    pdf,
    report::{BatchOutcome, BatchReport, CallArtifact},
    util::{ensure_dir, now_rfc3339, sha256_hex, slug},
    work::WorkItem,
};
use anyhow::{anyhow, bail, Context, Result};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::{info, warn};

pub struct RunRequest<'a> {
    pub cfg: &'a Config,
    /// Input bytes as read from disk; part of the run id.
    pub raw_input: &'a [u8],
    pub retry_from: Option<&'a Path>,
    pub out_override: Option<&'a Path>,
}

pub struct PreparedRun<P> {
    pub run_id: String,
    pub run_dir: PathBuf,
    pub items: Vec<WorkItem<P>>,
}

#[derive(Debug)]
pub struct RunSummary {
    pub run_id: String,
    pub run_dir: PathBuf,
    pub report: BatchReport,
    pub documents: Vec<PathBuf>,
}

/// Narrow `items` to a previous run's failures when retrying, derive the run
/// id and create the run directory.
pub fn prepare<C>(
    req: &RunRequest<'_>,
    client: &C,
    items: Vec<WorkItem<C::Payload>>,
) -> Result<PreparedRun<C::Payload>>
where
    C: RemoteActionClient,
    C::Payload: Clone,
{
    let cfg = req.cfg;
    let action = client.name();

    let items = match req.retry_from {
        Some(path) => {
            let previous = BatchReport::load(path)?;
            if previous.action != action {
                bail!(
                    "report {} belongs to {}, not {}",
                    path.display(),
                    previous.action,
                    action
                );
            }
            client.resume(&previous.failures);
            previous.retry_items(&items)
        }
        None => items,
    };

    let cfg_hash = sha256_hex(cfg.normalized_for_hash().as_bytes());
    let input_hash = sha256_hex(req.raw_input);
    let ids = items.iter().map(|it| it.id()).collect::<Vec<_>>().join(",");
    let run_id = sha256_hex(format!("{action}:{cfg_hash}:{input_hash}:{ids}").as_bytes());

    let out_root = req
        .out_override
        .map(PathBuf::from)
        .unwrap_or_else(|| PathBuf::from(&cfg.output.out_dir));
    let run_dir = out_root.join(&run_id);

    if run_dir.exists() && !cfg.global.rerun_existing {
        return Err(anyhow!(
            "run_dir already exists and rerun_existing=false: {}",
            run_dir.display()
        ));
    }

    ensure_dir(&run_dir)?;
    ensure_dir(&run_dir.join("logs"))?;

    if cfg.debug.dump_effective_config {
        let raw = toml::to_string(cfg).unwrap_or_default();
        std::fs::write(run_dir.join("effective-config.toml"), raw)?;
    }

    Ok(PreparedRun {
        run_id,
        run_dir,
        items,
    })
}

/// Run the executor over a prepared run and write its outputs.
pub async fn execute<C>(
    req: &RunRequest<'_>,
    run: PreparedRun<C::Payload>,
    client: C,
    grouping: GroupingStrategy,
    opts: &ExecutorOptions,
) -> Result<RunSummary>
where
    C: RemoteActionClient,
{
    let cfg = req.cfg;
    let action = client.name().to_string();
    info!("run_id={} action={} out={}", run.run_id, action, run.run_dir.display());

    let updates = Arc::new(RecordedUpdates::new());
    let executor = BatchExecutor::new(client, grouping)
        .with_options(opts.clone())
        .with_updates(updates.clone());

    let started = now_rfc3339();
    let outcome = executor
        .run(run.items)
        .await
        .with_context(|| format!("{action} did not start"))?;
    drop(executor);

    let documents = write_outputs(cfg, &run.run_dir, &outcome, &updates)?;

    if cfg.output.write_index_json {
        let names: Vec<_> = documents
            .iter()
            .filter_map(|p| p.file_name())
            .map(|n| n.to_string_lossy().into_owned())
            .collect();
        let index = serde_json::json!({
            "run_id": run.run_id,
            "action": action,
            "started": started,
            "finished": now_rfc3339(),
            "report": cfg.output.report_filename,
            "updates": "updates.json",
            "documents_dir": cfg.output.documents_dir,
            "documents": names,
            "retry_of": req.retry_from,
        });
        std::fs::write(
            run.run_dir.join("index.json"),
            serde_json::to_string_pretty(&index)?,
        )?;
    }

    Ok(RunSummary {
        run_id: run.run_id,
        run_dir: run.run_dir,
        report: outcome.report,
        documents,
    })
}

fn write_outputs(
    cfg: &Config,
    run_dir: &Path,
    outcome: &BatchOutcome,
    updates: &RecordedUpdates,
) -> Result<Vec<PathBuf>> {
    if cfg.output.write_report_json {
        std::fs::write(
            run_dir.join(&cfg.output.report_filename),
            serde_json::to_string_pretty(&outcome.report)?,
        )?;
    }

    std::fs::write(
        run_dir.join("updates.json"),
        serde_json::to_string_pretty(&updates.snapshot())?,
    )?;

    if !cfg.output.write_documents || outcome.artifacts.is_empty() {
        return Ok(Vec::new());
    }
    let docs_dir = run_dir.join(&cfg.output.documents_dir);
    ensure_dir(&docs_dir)?;
    let written = write_documents(&docs_dir, &outcome.artifacts)?;
    info!("wrote {} documents to {}", written.len(), docs_dir.display());
    Ok(written)
}

/// One `NNN-<group>.pdf` per group, its calls' PDFs merged in processing
/// order. When a group cannot be merged its parts are written one by one.
fn write_documents(docs_dir: &Path, artifacts: &[CallArtifact]) -> Result<Vec<PathBuf>> {
    let mut written = Vec::new();

    for (i, batch) in artifacts
        .chunk_by(|a, b| a.group_label == b.group_label)
        .enumerate()
    {
        let stem = format!("{:03}-{}", i + 1, slug(&batch[0].group_label));

        let parts: Vec<&[u8]> = batch
            .iter()
            .filter(|a| is_pdf(a))
            .map(|a| a.artifact.bytes.as_slice())
            .collect();
        let merged = if parts.len() == batch.len() {
            pdf::merge(&parts)
                .map_err(|err| {
                    warn!(
                        "could not merge {} documents of {}: {:#}",
                        parts.len(),
                        batch[0].group_label,
                        err
                    )
                })
                .ok()
        } else {
            None
        };

        match merged {
            Some(bytes) => {
                let path = docs_dir.join(format!("{stem}.pdf"));
                std::fs::write(&path, bytes)
                    .with_context(|| format!("writing document {}", path.display()))?;
                written.push(path);
            }
            None => {
                for (k, a) in batch.iter().enumerate() {
                    let ext = if is_pdf(a) { "pdf" } else { "bin" };
                    let path = docs_dir.join(format!("{stem}-{}.{ext}", k + 1));
                    std::fs::write(&path, &a.artifact.bytes)
                        .with_context(|| format!("writing document {}", path.display()))?;
                    written.push(path);
                }
            }
        }
    }
    Ok(written)
}

fn is_pdf(a: &CallArtifact) -> bool {
    a.artifact.content_type.contains("pdf")
}
