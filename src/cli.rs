//! CLI commands implementation.

use std::path::PathBuf;
use std::sync::Arc;

use clap::{Parser, Subcommand};
use console::style;
use tokio::sync::mpsc;

use crate::config::Settings;
use crate::pipeline::{LoggingReviewQueue, ReviewAnnotation};
use crate::server::{self, AppState};
use crate::services::ProcessingEvent;
use crate::storage;
use crate::storage::ObjectStore;

#[derive(Parser)]
#[command(name = "chartflow")]
#[command(about = "Medical document processing orchestrator")]
#[command(version)]
pub struct Cli {
    /// Data directory
    #[arg(long, global = true, env = "CHARTFLOW_DATA_DIR")]
    data_dir: Option<PathBuf>,

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
    /// Initialize the data directory, database, and config file
    Init,

    /// Start the API server
    Serve {
        /// Host to bind (overrides config)
        #[arg(long)]
        host: Option<String>,
        /// Port to bind (overrides config)
        #[arg(long)]
        port: Option<u16>,
    },

    /// Register and store a document from a local file
    Upload {
        /// Path to the document content
        file: PathBuf,
    },

    /// Process queued documents through extraction and routing
    Process {
        /// Limit number of documents (0 = all)
        #[arg(long, default_value_t = 0)]
        limit: usize,
        /// Parallel workers (overrides config)
        #[arg(long)]
        workers: Option<usize>,
    },

    /// Manage review tasks
    Review {
        #[command(subcommand)]
        command: ReviewCommands,
    },

    /// Show document counts per lifecycle state
    Status,
}

#[derive(Subcommand)]
enum ReviewCommands {
    /// List pending review tasks
    List,

    /// Complete a review task from an annotations JSON file
    Complete {
        /// Review task id
        task_id: String,
        /// Path to a JSON array of annotations
        annotations: PathBuf,
    },
}

/// Parse arguments and run the selected command.
pub async fn run() -> anyhow::Result<()> {
    let cli = Cli::parse();

    if matches!(&cli.command, Commands::Init) {
        let settings = Settings::init(cli.data_dir.clone())?;
        println!(
            "{} initialized data directory at {}",
            style("✓").green(),
            settings.data_dir.display()
        );
        // open the repositories once so the schema exists
        let _ = AppState::new(&settings, Arc::new(LoggingReviewQueue))?;
        return Ok(());
    }

    let settings = Settings::load(cli.data_dir.clone())?;
    std::fs::create_dir_all(settings.objects_dir())?;
    let state = AppState::new(&settings, Arc::new(LoggingReviewQueue))?;

    match cli.command {
        Commands::Init => unreachable!("handled above"),

        Commands::Serve { host, port } => {
            let mut settings = settings;
            if let Some(host) = host {
                settings.host = host;
            }
            if let Some(port) = port {
                settings.port = port;
            }
            server::serve(&settings, state).await
        }

        Commands::Upload { file } => {
            let content = std::fs::read(&file)?;
            let doc = state.processing.create_document()?;
            let key = storage::content_key(&content, &storage::extension_for(&file));
            state.store.put_object(&key, &content).await?;
            state.processing.attach_source(&doc.id, &key).await?;
            println!(
                "{} uploaded {} as document {}",
                style("✓").green(),
                file.display(),
                doc.id
            );
            Ok(())
        }

        Commands::Process { limit, workers } => {
            let workers = workers.unwrap_or(settings.workers);
            let (event_tx, event_rx) = mpsc::channel(64);

            let printer = tokio::spawn(print_events(event_rx));
            let result = state
                .processing
                .process_pending(limit, workers, event_tx)
                .await?;
            let _ = printer.await;

            println!(
                "{} completed, {} awaiting review, {} failed",
                style(result.completed).green(),
                style(result.awaiting_review).yellow(),
                style(result.failed).red()
            );
            Ok(())
        }

        Commands::Review { command } => match command {
            ReviewCommands::List => {
                let tasks = state.dispatcher.list_pending()?;
                if tasks.is_empty() {
                    println!("no pending review tasks");
                }
                for task in tasks {
                    println!(
                        "{}  document {}  {} entities  submitted {}",
                        task.task_id,
                        task.document_id,
                        task.entities_under_review.len(),
                        task.submitted_at.format("%Y-%m-%d %H:%M")
                    );
                }
                Ok(())
            }
            ReviewCommands::Complete { task_id, annotations } => {
                let raw = std::fs::read_to_string(&annotations)?;
                let annotations: Vec<ReviewAnnotation> = serde_json::from_str(&raw)?;
                let status = state.processing.complete_review(&task_id, annotations).await?;
                println!(
                    "{} review {} completed; document now {}",
                    style("✓").green(),
                    task_id,
                    status.as_str()
                );
                Ok(())
            }
        },

        Commands::Status => {
            let counts = state.repo.count_by_status()?;
            if counts.is_empty() {
                println!("no documents");
            }
            for (status, count) in counts {
                println!("{:>16}  {}", status.as_str(), count);
            }
            Ok(())
        }
    }
}

async fn print_events(mut rx: mpsc::Receiver<ProcessingEvent>) {
    while let Some(event) = rx.recv().await {
        match event {
            ProcessingEvent::Started { total_documents } => {
                println!("processing {total_documents} documents");
            }
            ProcessingEvent::DocumentStarted { document_id } => {
                println!("  {} {}", style("→").cyan(), document_id);
            }
            ProcessingEvent::DocumentCompleted { document_id, entities } => {
                println!(
                    "  {} {} ({} entities)",
                    style("✓").green(),
                    document_id,
                    entities
                );
            }
            ProcessingEvent::DocumentAwaitingReview { document_id, task_id } => {
                println!(
                    "  {} {} awaiting review (task {})",
                    style("…").yellow(),
                    document_id,
                    task_id
                );
            }
            ProcessingEvent::DocumentFailed { document_id, reason } => {
                println!("  {} {} failed: {}", style("✗").red(), document_id, reason);
            }
            ProcessingEvent::Complete { .. } => {}
        }
    }
}
