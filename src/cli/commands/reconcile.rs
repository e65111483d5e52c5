//! Reconciliation command.

use std::path::PathBuf;
use std::sync::Arc;

use clap::Args;
use console::style;
use indicatif::{ProgressBar, ProgressStyle};
use tokio::sync::{mpsc, watch, Mutex};

use crate::cli::helpers::{parse_list, truncate};
use crate::config::Settings;
use crate::reconcile::{BatchRunner, ReconcileEvent, RunOptions, Selection};
use crate::storage::FileSystemContentProbe;

#[derive(Args, Debug, Clone, Default)]
pub struct ReconcileArgs {
    /// Stop after this many resources
    #[arg(short = 'n', long)]
    pub max_resources: Option<usize>,

    /// Lowest resource id to audit
    #[arg(long)]
    pub min_resource_id: Option<i64>,

    /// Highest resource id to audit
    #[arg(long)]
    pub max_resource_id: Option<i64>,

    /// Audit only these isbns (comma separated; overrides the id window)
    #[arg(long, value_name = "ISBN,...")]
    pub isbns: Option<String>,

    /// Empty the doc-id table and reload it from the index before auditing
    #[arg(long)]
    pub truncate_and_reload_table: bool,

    /// Write the index listing as JSON lines before auditing
    #[arg(long)]
    pub generate_index_list_file: bool,

    /// Destination of the index listing (default: <data_dir>/index_list.jsonl)
    #[arg(long, value_name = "PATH", requires = "generate_index_list_file")]
    pub index_list_path: Option<PathBuf>,

    /// Queue resources with missing or stale rendered output for transformation
    #[arg(long)]
    pub add_bad_resources_to_transform_queue: bool,

    /// Remove resources that should not be indexed from the search index
    #[arg(long)]
    pub remove_bad_resources_from_index: bool,

    /// Delete doc-id rows of resources that should not be indexed
    #[arg(long)]
    pub remove_bad_database_doc_ids: bool,

    /// Rebuild doc-id rows from the index where they disagree
    #[arg(long)]
    pub fix_doc_ids_in_db: bool,

    /// Process resources from the lowest id up
    #[arg(long)]
    pub ascending: bool,

    /// Write the per-resource detail report to this file
    #[arg(long, value_name = "PATH")]
    pub report: Option<PathBuf>,

    /// Print the summary as JSON
    #[arg(long)]
    pub json: bool,
}

impl ReconcileArgs {
    pub fn selection(&self) -> Selection {
        match self.isbns.as_deref().map(parse_list) {
            Some(isbns) if !isbns.is_empty() => Selection::Isbns(isbns),
            _ => Selection::Range {
                min_id: self.min_resource_id,
                max_id: self.max_resource_id,
                max_resources: self.max_resources,
            },
        }
    }

    pub fn run_options(&self, settings: &Settings) -> RunOptions {
        let index_list = self.generate_index_list_file.then(|| {
            self.index_list_path
                .clone()
                .unwrap_or_else(|| settings.index_list_path())
        });
        RunOptions {
            fix_doc_ids_in_db: self.fix_doc_ids_in_db,
            remove_bad_resources_from_index: self.remove_bad_resources_from_index,
            remove_bad_database_doc_ids: self.remove_bad_database_doc_ids,
            add_bad_resources_to_transform_queue: self.add_bad_resources_to_transform_queue,
            truncate_and_reload_table: self.truncate_and_reload_table,
            generate_index_list_file: index_list,
        }
    }
}

/// Audit the selected resources and apply the requested repairs.
pub async fn cmd_reconcile(settings: &Settings, args: ReconcileArgs) -> anyhow::Result<()> {
    if !settings.database_exists() {
        anyhow::bail!(
            "No database at {}. Run 'docsync init' first.",
            settings.database_path().display()
        );
    }

    let ctx = settings.create_db_context()?;
    let index = settings.open_index()?;
    let mut runner_config = settings.runner_config();
    if args.ascending {
        runner_config.descending = false;
    }

    let runner = BatchRunner::new(
        Arc::new(ctx.resources()),
        Arc::new(ctx.doc_ids()),
        Arc::new(ctx.transform_queue()),
        Arc::new(index),
        FileSystemContentProbe::new(settings.content_layout()),
        runner_config,
    );

    let selection = args.selection();
    let options = args.run_options(settings);
    if options.is_dry_run() && !args.json {
        println!(
            "{} Report only: no repair flags given, nothing will be changed",
            style("→").cyan()
        );
    }

    // Ctrl-C stops the run after the resource in flight
    let (cancel_tx, cancel_rx) = watch::channel(false);
    let signal_handler = tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            eprintln!("{} Stopping after the current resource...", style("!").yellow());
            let _ = cancel_tx.send(true);
        }
    });

    let (event_tx, mut event_rx) = mpsc::channel::<ReconcileEvent>(100);
    let pb = Arc::new(Mutex::new(None::<ProgressBar>));
    let pb_clone = pb.clone();
    let quiet = args.json;

    let event_handler = tokio::spawn(async move {
        while let Some(event) = event_rx.recv().await {
            if quiet {
                continue;
            }
            match event {
                ReconcileEvent::Started {
                    max_resources,
                    index_documents,
                } => {
                    let progress = match max_resources {
                        Some(n) => ProgressBar::new(n as u64),
                        None => ProgressBar::new_spinner(),
                    };
                    progress.set_style(
                        ProgressStyle::default_bar()
                            .template("{spinner:.green} [{bar:30.cyan/blue}] {pos}/{len} {wide_msg}")
                            .unwrap_or_else(|_| ProgressStyle::default_bar())
                            .progress_chars("█▓░"),
                    );
                    progress.set_message(format!("{} documents in index", index_documents));
                    *pb_clone.lock().await = Some(progress);
                }
                ReconcileEvent::ResourceStarted { isbn, .. } => {
                    if let Some(ref progress) = *pb_clone.lock().await {
                        progress.set_message(truncate(&isbn, 40));
                    }
                }
                ReconcileEvent::ResourceCompleted {
                    resource_id,
                    finding,
                } => {
                    if let Some(ref progress) = *pb_clone.lock().await {
                        if let Some(finding) = finding {
                            progress.println(format!(
                                "{} {} {}",
                                style("!").yellow(),
                                resource_id,
                                finding
                            ));
                        }
                        progress.inc(1);
                    }
                }
                ReconcileEvent::ResourceFailed { resource_id, error } => {
                    if let Some(ref progress) = *pb_clone.lock().await {
                        progress.println(format!(
                            "{} {} {}",
                            style("✗").red(),
                            resource_id,
                            error
                        ));
                        progress.inc(1);
                    }
                }
                ReconcileEvent::Complete { .. } => {
                    if let Some(progress) = pb_clone.lock().await.take() {
                        progress.finish_and_clear();
                    }
                }
            }
        }
    });

    let result = runner.run(&selection, &options, event_tx, cancel_rx).await;
    let _ = event_handler.await;
    signal_handler.abort();
    if let Some(progress) = pb.lock().await.take() {
        progress.finish_and_clear();
    }

    let summary = result?;

    if let Some(ref path) = args.report {
        std::fs::write(path, summary.detail_report())?;
        if !args.json {
            println!(
                "{} Detail report written to {}",
                style("✓").green(),
                path.display()
            );
        }
    }

    if args.json {
        println!("{}", serde_json::to_string_pretty(&summary)?);
    } else {
        println!("{}", style("Reconciliation summary").bold());
        print!("{}", summary.render());
        if summary.inconsistent() == 0 && summary.failures.is_empty() {
            println!("{} All audited resources are consistent", style("✓").green());
        }
    }

    Ok(())
}
