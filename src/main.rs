//! # repo-rag CLI
//!
//! Index a GitHub repository into per-file summaries and embeddings, then ask
//! questions about it.
//!
//! ## Usage
//!
//! ```bash
//! repo-rag --config ./config/repo-rag.toml <command>
//! ```
//!
//! ## Commands
//!
//! | Command | Description |
//! |---------|-------------|
//! | `repo-rag init` | Create the SQLite database and run schema migrations |
//! | `repo-rag project add <name> <repo>` | Register a repository |
//! | `repo-rag project list` | List projects with record counts |
//! | `repo-rag project remove <project>` | Delete a project and everything scoped to it |
//! | `repo-rag index <project>` | Load, filter, summarize, and embed the repository |
//! | `repo-rag ask <project> "<question>"` | Answer a question from the indexed files |
//! | `repo-rag questions list\|delete\|clear` | Manage question history |
//! | `repo-rag clear <project>` | Drop every retrieval record of a project |
//! | `repo-rag commits poll\|list <project>` | Summarize and show recent commits |
//! | `repo-rag serve` | Start the JSON HTTP API |
//!
//! ## Examples
//!
//! ```bash
//! repo-rag init
//! repo-rag project add widgets acme/widgets --branch main
//! repo-rag index widgets --skip-existing
//! repo-rag ask widgets "Where is the retry logic?" --top-k 3
//! repo-rag commits poll widgets
//! ```
//!
//! Logging is controlled by `RUST_LOG` (default `info`).

use clap::{Parser, Subcommand};
use std::path::PathBuf;
use tracing_subscriber::EnvFilter;

use repo_rag::{commands, config, loader::LoaderKind, server};

/// repo-rag: ask questions about a GitHub repository.
///
/// All commands accept a `--config` flag pointing to a TOML configuration
/// file. See `config/repo-rag.example.toml` for a full example.
#[derive(Parser)]
#[command(
    name = "repo-rag",
    about = "Index a GitHub repository and answer questions about it",
    version,
    long_about = "repo-rag loads a repository's text files, summarizes and embeds each one, \
    stores them in SQLite, and answers questions by retrieving the most similar files and \
    handing them to a language model. It also summarizes recent commits."
)]
struct Cli {
    /// Path to configuration file (TOML).
    #[arg(long, global = true, default_value = "./config/repo-rag.toml")]
    config: PathBuf,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Initialize the database schema.
    ///
    /// Idempotent: running it again leaves existing data in place.
    Init,

    /// Manage registered repositories.
    Project {
        #[command(subcommand)]
        action: ProjectAction,
    },

    /// Load and index a project's repository.
    ///
    /// Every kept file gets a summary and an embedding. One failing file
    /// never stops the others; failures are listed at the end.
    Index {
        /// Project id or name.
        project: String,

        /// Skip files whose stored record is embedded and unchanged.
        #[arg(long)]
        skip_existing: bool,

        /// How to fetch the repository.
        #[arg(long, value_enum, default_value_t = LoaderKind::Github)]
        loader: LoaderKind,
    },

    /// Ask a question about a project.
    Ask {
        /// Project id or name.
        project: String,

        /// The question.
        question: String,

        /// Number of files to retrieve (defaults to `[retrieval].default_top_k`).
        #[arg(long)]
        top_k: Option<usize>,
    },

    /// Manage saved questions.
    Questions {
        #[command(subcommand)]
        action: QuestionsAction,
    },

    /// Delete every retrieval record of a project.
    ///
    /// Questions and commits are kept.
    Clear {
        /// Project id or name.
        project: String,
    },

    /// Fetch and summarize recent commits.
    Commits {
        #[command(subcommand)]
        action: CommitsAction,
    },

    /// Start the JSON HTTP API on `[server].bind`.
    Serve,
}

#[derive(Subcommand)]
enum ProjectAction {
    /// Register a repository.
    Add {
        /// Unique project name.
        name: String,
        /// `owner/repo`, an https URL, or an ssh URL.
        repo: String,
        /// Branch to index (defaults to the repository's default branch).
        #[arg(long)]
        branch: Option<String>,
    },
    /// List projects.
    List,
    /// Delete a project with its records, questions, and commits.
    Remove {
        /// Project id or name.
        project: String,
    },
}

#[derive(Subcommand)]
enum QuestionsAction {
    /// List saved questions, newest first.
    List {
        /// Project id or name.
        project: String,
    },
    /// Delete one question by id.
    Delete {
        id: String,
    },
    /// Delete every question of a project.
    Clear {
        /// Project id or name.
        project: String,
    },
}

#[derive(Subcommand)]
enum CommitsAction {
    /// Fetch recent commits and summarize the new ones.
    Poll {
        /// Project id or name.
        project: String,
    },
    /// Show stored commits, newest first.
    List {
        /// Project id or name.
        project: String,
        /// Maximum number of commits to show.
        #[arg(long)]
        limit: Option<usize>,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    let cfg = config::load_config(&cli.config)?;

    match cli.command {
        Commands::Init => {
            commands::run_init(&cfg).await?;
        }
        Commands::Project { action } => match action {
            ProjectAction::Add { name, repo, branch } => {
                commands::run_project_add(&cfg, &name, &repo, branch.as_deref()).await?;
            }
            ProjectAction::List => {
                commands::run_project_list(&cfg).await?;
            }
            ProjectAction::Remove { project } => {
                commands::run_project_remove(&cfg, &project).await?;
            }
        },
        Commands::Index {
            project,
            skip_existing,
            loader,
        } => {
            commands::run_index(&cfg, &project, skip_existing, loader).await?;
        }
        Commands::Ask {
            project,
            question,
            top_k,
        } => {
            commands::run_ask(&cfg, &project, &question, top_k).await?;
        }
        Commands::Questions { action } => match action {
            QuestionsAction::List { project } => {
                commands::run_questions_list(&cfg, &project).await?;
            }
            QuestionsAction::Delete { id } => {
                commands::run_questions_delete(&cfg, &id).await?;
            }
            QuestionsAction::Clear { project } => {
                commands::run_questions_clear(&cfg, &project).await?;
            }
        },
        Commands::Clear { project } => {
            commands::run_clear(&cfg, &project).await?;
        }
        Commands::Commits { action } => match action {
            CommitsAction::Poll { project } => {
                commands::run_commits_poll(&cfg, &project).await?;
            }
            CommitsAction::List { project, limit } => {
                commands::run_commits_list(&cfg, &project, limit).await?;
            }
        },
        Commands::Serve => {
            server::run_server(&cfg).await?;
        }
    }

    Ok(())
}
