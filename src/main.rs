use anyhow::Result;
use clap::{Parser, Subcommand};
use coursebot::commands::{
    ask_question, ingest_documents, run_chat, search_documents, show_status, summarize_file,
};
use coursebot::config::{run_interactive_config, show_config};
use coursebot::summarize::SummaryFormat;
use std::path::PathBuf;

#[derive(Parser)]
#[command(name = "coursebot")]
#[command(about = "Chat with, search and summarize a folder of course documents")]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Configure the model provider, index storage and chat settings
    Config {
        /// Show current configuration
        #[arg(long)]
        show: bool,
    },
    /// Extract, embed and index every document in a directory
    Ingest {
        /// Document directory; defaults to the configured one
        dir: Option<PathBuf>,
        /// Drop all indexed documents before ingesting
        #[arg(long)]
        rebuild: bool,
    },
    /// List the documents most relevant to a query
    Search {
        query: String,
        /// Number of documents to return
        #[arg(short, long)]
        k: Option<usize>,
    },
    /// Answer one question from the documents
    Ask {
        question: String,
        /// Document directory to ingest first
        #[arg(long)]
        dir: Option<PathBuf>,
        /// Use the advanced chat model
        #[arg(long)]
        advanced: bool,
    },
    /// Start an interactive conversation
    Chat {
        /// Document directory to ingest first
        #[arg(long)]
        dir: Option<PathBuf>,
        /// Talk to the model directly without looking up documents
        #[arg(long)]
        no_retrieval: bool,
        /// Use the advanced chat model
        #[arg(long)]
        advanced: bool,
    },
    /// Summarize a PDF, text or markdown file
    Summarize {
        file: PathBuf,
        #[arg(long, value_enum, default_value_t = SummaryFormat::Words)]
        format: SummaryFormat,
        /// Use the advanced chat model
        #[arg(long)]
        advanced: bool,
    },
    /// Show configuration, index and provider status
    Status,
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();

    match cli.command {
        Commands::Config { show } => {
            if show {
                show_config()?;
            } else {
                run_interactive_config()?;
            }
        }
        Commands::Ingest { dir, rebuild } => {
            ingest_documents(dir, rebuild).await?;
        }
        Commands::Search { query, k } => {
            search_documents(&query, k).await?;
        }
        Commands::Ask {
            question,
            dir,
            advanced,
        } => {
            ask_question(&question, dir, advanced).await?;
        }
        Commands::Chat {
            dir,
            no_retrieval,
            advanced,
        } => {
            run_chat(dir, no_retrieval, advanced).await?;
        }
        Commands::Summarize {
            file,
            format,
            advanced,
        } => {
            summarize_file(&file, format, advanced)?;
        }
        Commands::Status => {
            show_status().await?;
        }
    }

    Ok(())
}
