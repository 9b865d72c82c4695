//! Batch orchestrator.
//!
//! Walks the pending input directory in sorted order, drives the resolution
//! engine one row at a time, paces itself between rows to stay under the
//! registries' radar, and checkpoints accumulated output every N rows so a
//! crash loses at most one checkpoint interval of work. Relocating the
//! input file into the done directory is strictly the last step; a crash
//! before it leaves the batch pending and the rerun overwrites in place.

use anyhow::{Context, Result};
use chrono::Utc;
use indicatif::{ProgressBar, ProgressStyle};
use rand::Rng;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tracing::{info, warn};

use crate::config::AppConfig;
use crate::engine::ResolutionEngine;
use crate::link::LinkSynthesizer;
use crate::name_api::NameLookup;
use crate::normalize::{expand_abbreviations, normalize_mst};
use crate::record::{join_trail, CandidateRow, ResolutionOutcome};
use crate::registry::RegistryClient;
use crate::sheet::Sheet;
use crate::slug::slugify;

pub const COL_MST_NORM: &str = "mst_norm";
pub const COL_NAME_EXPANDED: &str = "customer_name_expanded";
pub const COL_SLUG: &str = "customer_slug";
pub const COL_API_NAME: &str = "api_name";
pub const COL_API_SOURCE: &str = "api_source";
pub const COL_API_ERROR: &str = "api_error";
pub const COL_STATUS: &str = "crawl_status";
pub const COL_SOURCE: &str = "crawl_source";
pub const COL_ERROR: &str = "crawl_error";

/// Summary of one processed input file.
#[derive(Debug, Clone)]
pub struct BatchReport {
    pub input: PathBuf,
    pub total_rows: usize,
    pub resolved: usize,
    pub failed: usize,
    pub interrupted: bool,
    pub started_at: String,
    pub completed_at: String,
    pub full_output: PathBuf,
    pub failed_output: PathBuf,
    pub links_output: PathBuf,
}

pub struct BatchRunner<'a, P, S, N> {
    config: &'a AppConfig,
    engine: &'a ResolutionEngine<'a, P, S, N>,
    links: &'a LinkSynthesizer,
    interrupted: Arc<AtomicBool>,
}

impl<'a, P, S, N> BatchRunner<'a, P, S, N>
where
    P: RegistryClient,
    S: RegistryClient,
    N: NameLookup,
{
    pub fn new(
        config: &'a AppConfig,
        engine: &'a ResolutionEngine<'a, P, S, N>,
        links: &'a LinkSynthesizer,
        interrupted: Arc<AtomicBool>,
    ) -> Self {
        Self {
            config,
            engine,
            links,
            interrupted,
        }
    }

    /// Process every pending input file in sorted (deterministic) order.
    pub async fn run(&self) -> Result<Vec<BatchReport>> {
        let files = list_pending_files(Path::new(&self.config.io.pending_dir))?;
        if files.is_empty() {
            info!("no pending .csv files in {}", self.config.io.pending_dir);
            return Ok(Vec::new());
        }

        let mut reports = Vec::new();
        for file in files {
            if self.interrupted.load(Ordering::SeqCst) {
                break;
            }
            reports.push(self.process_file(&file).await?);
        }
        Ok(reports)
    }

    /// Resolve one input file end to end.
    pub async fn process_file(&self, input: &Path) -> Result<BatchReport> {
        let started_at = Utc::now().format("%Y-%m-%d %H:%M:%S UTC").to_string();
        info!("processing {}", input.display());

        let mut sheet = Sheet::read_csv(input)?;
        sheet
            .require_columns(&self.config.input.required())
            .with_context(|| format!("cannot load {}", input.display()))?;

        prepare_derived_columns(&mut sheet, self.config, self.links);

        let outputs = OutputPaths::for_input(input, Path::new(&self.config.io.output_dir));
        let total = sheet.len();
        let mut resolved = 0usize;
        let mut failed = 0usize;

        let progress = ProgressBar::new(total as u64);
        progress.set_style(
            ProgressStyle::with_template("[{elapsed_precise}] {bar:40.cyan/blue} {pos}/{len} {msg}")
                .expect("static progress template"),
        );

        let link_col = self.link_column();
        let api_link_col = self.api_link_column();
        let pacing = &self.config.pacing;

        for idx in 0..total {
            if self.interrupted.load(Ordering::SeqCst) {
                warn!("interrupt requested, stopping after {} of {} rows", idx, total);
                break;
            }

            let row = candidate_row(&sheet, idx, self.config, &link_col);
            progress.set_message(format!("MST={}", row.identifier));

            let resolution = self.engine.resolve(&row).await;

            sheet.set(idx, COL_API_NAME, resolution.api.name);
            sheet.set(idx, COL_API_SOURCE, resolution.api.source);
            sheet.set(idx, &api_link_col, resolution.api.link);
            sheet.set(idx, COL_API_ERROR, resolution.api.error);

            match resolution.outcome {
                ResolutionOutcome::Success {
                    record,
                    status,
                    source,
                    ..
                } => {
                    sheet.set(idx, COL_STATUS, status);
                    sheet.set(idx, COL_SOURCE, source);
                    sheet.set(idx, COL_ERROR, "");
                    for (key, value) in record.iter() {
                        sheet.set(idx, key, value);
                    }
                    resolved += 1;
                }
                ResolutionOutcome::Failure { trail } => {
                    sheet.set(idx, COL_STATUS, "error");
                    sheet.set(idx, COL_SOURCE, "failed_all");
                    sheet.set(idx, COL_ERROR, join_trail(&trail));
                    failed += 1;
                }
            }
            progress.inc(1);

            let done = idx + 1;
            if done % pacing.checkpoint_every == 0 {
                self.write_checkpoint(&sheet, &outputs)
                    .context("Failed to persist checkpoint")?;
            }

            if done < total {
                sleep_uniform(pacing.row_sleep_min_secs, pacing.row_sleep_max_secs).await;
                if pacing.long_break_every > 0 && done % pacing.long_break_every == 0 {
                    info!("processed {done} rows, taking a long break");
                    sleep_uniform(pacing.long_break_min_secs, pacing.long_break_max_secs).await;
                }
            }
        }
        progress.finish_and_clear();

        let interrupted = self.interrupted.load(Ordering::SeqCst);

        // Final outputs: the full merge, the failed-only subset for triage,
        // and the compact link projection.
        sheet
            .write_csv(&outputs.full)
            .context("Failed to write full output")?;
        let failed_rows = sheet.filter_rows(|i| !sheet.get(i, COL_STATUS).starts_with("ok_"));
        failed_rows
            .write_csv(&outputs.failed)
            .context("Failed to write failed-only output")?;
        self.write_links(&sheet, &outputs.links)?;

        // Consuming the input is strictly the last step; an interrupted run
        // leaves the batch pending so the rerun reprocesses from the top.
        if !interrupted {
            let done_path = relocate_to_done(input, Path::new(&self.config.io.done_dir))?;
            info!("moved {} -> {}", input.display(), done_path.display());
        }

        let report = BatchReport {
            input: input.to_path_buf(),
            total_rows: total,
            resolved,
            failed,
            interrupted,
            started_at,
            completed_at: Utc::now().format("%Y-%m-%d %H:%M:%S UTC").to_string(),
            full_output: outputs.full,
            failed_output: outputs.failed,
            links_output: outputs.links,
        };
        info!(
            "{}: {} rows, {} resolved, {} failed{}",
            report.input.display(),
            report.total_rows,
            report.resolved,
            report.failed,
            if report.interrupted { " (interrupted)" } else { "" }
        );
        Ok(report)
    }

    fn write_checkpoint(&self, sheet: &Sheet, outputs: &OutputPaths) -> Result<()> {
        sheet.write_csv(&outputs.full)?;
        self.write_links(sheet, &outputs.links)
    }

    fn write_links(&self, sheet: &Sheet, path: &Path) -> Result<()> {
        sheet
            .project(&self.links_columns())
            .write_csv(path)
            .context("Failed to write links output")
    }

    fn link_column(&self) -> String {
        format!("link_{}", self.config.registry.primary.id)
    }

    fn api_link_column(&self) -> String {
        format!("link_{}_api", self.config.registry.primary.id)
    }

    fn links_columns(&self) -> Vec<String> {
        let input = &self.config.input;
        vec![
            input.col_seq.clone(),
            input.col_customer_id.clone(),
            input.col_customer_name.clone(),
            input.col_tax_code.clone(),
            COL_MST_NORM.to_string(),
            COL_NAME_EXPANDED.to_string(),
            COL_SLUG.to_string(),
            self.link_column(),
            COL_API_NAME.to_string(),
            COL_API_SOURCE.to_string(),
            self.api_link_column(),
            COL_API_ERROR.to_string(),
            COL_STATUS.to_string(),
            COL_SOURCE.to_string(),
            COL_ERROR.to_string(),
        ]
    }
}

/// Derived columns computed before the first network call, for every row:
/// the canonical identifier, the abbreviation-expanded name, its slug, and
/// the synthesized candidate link.
pub fn prepare_derived_columns(sheet: &mut Sheet, config: &AppConfig, links: &LinkSynthesizer) {
    let link_col = format!("link_{}", config.registry.primary.id);
    for idx in 0..sheet.len() {
        let raw_mst = sheet.get(idx, &config.input.col_tax_code).to_string();
        let raw_name = sheet.get(idx, &config.input.col_customer_name).to_string();

        let mst = normalize_mst(&raw_mst);
        let expanded = expand_abbreviations(&raw_name, &config.abbreviations);
        let slug = slugify(&expanded);
        let link = links.synthesize(&mst, &expanded).unwrap_or_default();

        sheet.set(idx, COL_MST_NORM, mst);
        sheet.set(idx, COL_NAME_EXPANDED, expanded);
        sheet.set(idx, COL_SLUG, slug);
        sheet.set(idx, &link_col, link);
    }
}

fn candidate_row(sheet: &Sheet, idx: usize, config: &AppConfig, link_col: &str) -> CandidateRow {
    let link = sheet.get(idx, link_col);
    CandidateRow {
        seq: sheet.get(idx, &config.input.col_seq).to_string(),
        customer_id: sheet.get(idx, &config.input.col_customer_id).to_string(),
        display_name: sheet.get(idx, &config.input.col_customer_name).to_string(),
        raw_identifier: sheet.get(idx, &config.input.col_tax_code).to_string(),
        identifier: sheet.get(idx, COL_MST_NORM).to_string(),
        link: if link.is_empty() {
            None
        } else {
            Some(link.to_string())
        },
    }
}

/// Sorted list of pending `.csv` inputs; sorting keeps batch order
/// deterministic across runs.
pub fn list_pending_files(pending_dir: &Path) -> Result<Vec<PathBuf>> {
    if !pending_dir.exists() {
        return Ok(Vec::new());
    }
    let mut files: Vec<PathBuf> = std::fs::read_dir(pending_dir)
        .with_context(|| format!("Failed to read {}", pending_dir.display()))?
        .filter_map(|entry| entry.ok())
        .map(|entry| entry.path())
        .filter(|path| {
            path.extension()
                .and_then(|e| e.to_str())
                .map(|e| e.eq_ignore_ascii_case("csv"))
                .unwrap_or(false)
        })
        .collect();
    files.sort();
    Ok(files)
}

/// Move a consumed input into the done directory. Falls back to
/// copy-and-remove when the rename crosses filesystems.
fn relocate_to_done(input: &Path, done_dir: &Path) -> Result<PathBuf> {
    std::fs::create_dir_all(done_dir)
        .with_context(|| format!("Failed to create {}", done_dir.display()))?;
    let file_name = input
        .file_name()
        .with_context(|| format!("input path has no file name: {}", input.display()))?;
    let target = done_dir.join(file_name);

    if std::fs::rename(input, &target).is_err() {
        std::fs::copy(input, &target)
            .with_context(|| format!("Failed to copy {} to done dir", input.display()))?;
        std::fs::remove_file(input)
            .with_context(|| format!("Failed to remove {}", input.display()))?;
    }
    Ok(target)
}

struct OutputPaths {
    full: PathBuf,
    failed: PathBuf,
    links: PathBuf,
}

impl OutputPaths {
    fn for_input(input: &Path, output_dir: &Path) -> Self {
        let stem = input
            .file_stem()
            .and_then(|s| s.to_str())
            .unwrap_or("batch");
        Self {
            full: output_dir.join(format!("{stem}__FULL.csv")),
            failed: output_dir.join(format!("{stem}__FAILED.csv")),
            links: output_dir.join(format!("{stem}__LINKS.csv")),
        }
    }
}

async fn sleep_uniform(min_secs: f64, max_secs: f64) {
    if max_secs <= 0.0 {
        return;
    }
    let secs = {
        let mut rng = rand::thread_rng();
        if min_secs >= max_secs {
            max_secs
        } else {
            rng.gen_range(min_secs..=max_secs)
        }
    };
    tokio::time::sleep(Duration::from_secs_f64(secs)).await;
}

/// Dry-run mode: compute the derived columns and write only the links
/// projection, touching no network and consuming no input.
pub fn synthesize_links_only(config: &AppConfig, input: &Path) -> Result<PathBuf> {
    let links = LinkSynthesizer::new(&config.registry.primary.link_base)
        .context("invalid registry.primary.link_base")?;

    let mut sheet = Sheet::read_csv(input)?;
    sheet
        .require_columns(&config.input.required())
        .with_context(|| format!("cannot load {}", input.display()))?;
    prepare_derived_columns(&mut sheet, config, &links);

    let outputs = OutputPaths::for_input(input, Path::new(&config.io.output_dir));
    let input_cols = &config.input;
    let link_col = format!("link_{}", config.registry.primary.id);
    sheet
        .project(&[
            input_cols.col_seq.clone(),
            input_cols.col_customer_id.clone(),
            input_cols.col_customer_name.clone(),
            input_cols.col_tax_code.clone(),
            COL_MST_NORM.to_string(),
            COL_NAME_EXPANDED.to_string(),
            COL_SLUG.to_string(),
            link_col,
        ])
        .write_csv(&outputs.links)?;
    Ok(outputs.links)
}
