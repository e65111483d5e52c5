//! CLI commands implementation.
//!
//! This module contains the CLI parser and dispatches to command-specific modules.

mod db;
mod init;
mod queue;
mod reconcile;

use std::path::PathBuf;

use clap::{Parser, Subcommand};

use crate::config::{load_settings_with_options, LoadOptions};

use reconcile::ReconcileArgs;

#[derive(Parser)]
#[command(name = "docsync")]
#[command(about = "Reconcile rendered content, doc-id table and search index")]
#[command(version)]
pub struct Cli {
    /// Target data directory (overrides config file)
    #[arg(long, short = 't', global = true)]
    target: Option<PathBuf>,

    /// Config file path (overrides auto-discovery)
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    /// Enable verbose logging
    #[arg(short, long, global = true)]
    pub verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

/// Check if verbose mode is enabled (for early logging setup).
pub fn is_verbose() -> bool {
    std::env::args().any(|arg| arg == "-v" || arg == "--verbose")
}

#[derive(Subcommand)]
enum Commands {
    /// Initialize the data directory, database and search index
    Init,

    /// Audit resources against the content store, doc-id table and index
    Reconcile(ReconcileArgs),

    /// Database management
    Db {
        #[command(subcommand)]
        command: DbCommands,
    },

    /// Inspect the transform queue
    Queue {
        #[command(subcommand)]
        command: QueueCommands,
    },
}

#[derive(Subcommand)]
enum DbCommands {
    /// Apply pending schema migrations
    Migrate,
    /// Show tables and doc-id coverage
    Status,
}

#[derive(Subcommand)]
enum QueueCommands {
    /// List queued entries
    List {
        /// Queue status to list
        #[arg(long, default_value = crate::reconcile::QUEUE_STATUS_PENDING)]
        status: String,
        /// Maximum entries to show
        #[arg(short, long, default_value = "50")]
        limit: usize,
    },
}

/// Run the CLI.
pub async fn run() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let options = LoadOptions {
        config_path: cli.config,
        target: cli.target,
    };
    let (settings, _config) = load_settings_with_options(options).await?;

    match cli.command {
        Commands::Init => init::cmd_init(&settings).await,
        Commands::Reconcile(args) => reconcile::cmd_reconcile(&settings, args).await,
        Commands::Db { command } => match command {
            DbCommands::Migrate => db::cmd_migrate(&settings).await,
            DbCommands::Status => db::cmd_status(&settings).await,
        },
        Commands::Queue { command } => match command {
            QueueCommands::List { status, limit } => {
                queue::cmd_queue_list(&settings, &status, limit).await
            }
        },
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn test_cli_definition_is_valid() {
        Cli::command().debug_assert();
    }

    #[test]
    fn test_reconcile_flags_parse() {
        let cli = Cli::try_parse_from([
            "docsync",
            "--target",
            "/srv/docsync",
            "reconcile",
            "--max-resources",
            "10",
            "--fix-doc-ids-in-db",
            "--remove-bad-resources-from-index",
            "--generate-index-list-file",
        ])
        .unwrap();
        assert_eq!(cli.target, Some(PathBuf::from("/srv/docsync")));
        let Commands::Reconcile(args) = cli.command else {
            panic!("expected reconcile");
        };
        assert_eq!(args.max_resources, Some(10));
        let settings = crate::config::Settings::with_data_dir(PathBuf::from("/srv/docsync"));
        let options = args.run_options(&settings);
        assert!(options.fix_doc_ids_in_db);
        assert!(options.remove_bad_resources_from_index);
        assert!(!options.remove_bad_database_doc_ids);
        assert_eq!(
            options.generate_index_list_file,
            Some(PathBuf::from("/srv/docsync/index_list.jsonl"))
        );
    }

    #[test]
    fn test_index_list_path_requires_flag() {
        assert!(Cli::try_parse_from([
            "docsync",
            "reconcile",
            "--index-list-path",
            "/tmp/list.jsonl",
        ])
        .is_err());
    }
}
