use anyhow::{Context, Result, bail};
use console::style;
use std::io::{self, BufRead, Write};
use std::path::{Path, PathBuf};
use tracing::{info, warn};

use crate::config::{Config, ProviderKind, StorageMode};
use crate::extract::extract_text;
use crate::index::VectorIndex;
use crate::ingest::{IngestReport, Ingestor};
use crate::providers::{OllamaClient, Providers};
use crate::responder::{PlainChat, Responder};
use crate::session::Session;
use crate::summarize::{SummaryFormat, summarize};

fn load_providers(config: &Config) -> Result<Providers> {
    Providers::from_config(&config.provider).context("Failed to set up model providers")
}

fn source_dir(config: &Config, dir: Option<PathBuf>) -> Option<PathBuf> {
    dir.or_else(|| config.ingest.source_dir.clone())
}

/// Open the configured index and bring it up to date with the document directory
async fn prepare_index(
    config: &Config,
    providers: &Providers,
    dir: Option<PathBuf>,
) -> Result<VectorIndex> {
    let mut index = VectorIndex::open(config)
        .await
        .context("Failed to open the document index")?;

    match source_dir(config, dir) {
        Some(dir) => {
            let report = Ingestor::from_config(providers.embedder(), &config.ingest)
                .ingest_dir(&mut index, &dir)
                .await?;
            print_report(&report);
        }
        None if index.is_empty() => bail!(
            "No document directory configured. Pass --dir or set one with 'coursebot config'."
        ),
        None => info!("Using {} previously indexed documents", index.len()),
    }

    Ok(index)
}

fn print_report(report: &IngestReport) {
    eprintln!(
        "{} {} documents indexed ({} new or changed, {} unchanged)",
        style("✓").green(),
        report.total_indexed(),
        report.indexed.len(),
        report.unchanged.len()
    );
    for failure in &report.failures {
        eprintln!(
            "{} {}: {}",
            style("✗").red(),
            failure.filename,
            failure.error
        );
    }
}

/// Write fragments to stdout as they arrive and return the full text
fn print_stream<I>(fragments: I) -> Result<String>
where
    I: Iterator<Item = crate::Result<String>>,
{
    let mut stdout = io::stdout().lock();
    let mut text = String::new();

    for fragment in fragments {
        let fragment = fragment?;
        stdout.write_all(fragment.as_bytes())?;
        stdout.flush()?;
        text.push_str(&fragment);
    }
    writeln!(stdout)?;

    Ok(text)
}

/// Ingest the document directory into the configured index
#[inline]
pub async fn ingest_documents(dir: Option<PathBuf>, rebuild: bool) -> Result<()> {
    let config = Config::load()?;
    let providers = load_providers(&config)?;

    let Some(dir) = source_dir(&config, dir) else {
        bail!("No document directory given. Pass one or set it with 'coursebot config'.");
    };

    let mut index = VectorIndex::open(&config)
        .await
        .context("Failed to open the document index")?;
    if !index.is_durable() {
        warn!("Index storage is ephemeral; the result is discarded on exit");
    }
    if rebuild {
        info!("Rebuilding index from {}", dir.display());
        index.clear().await?;
    }

    let report = Ingestor::from_config(providers.embedder(), &config.ingest)
        .ingest_dir(&mut index, &dir)
        .await?;
    print_report(&report);

    Ok(())
}

/// Show the documents closest to `query`
#[inline]
pub async fn search_documents(query: &str, top_k: Option<usize>) -> Result<()> {
    let config = Config::load()?;
    let providers = load_providers(&config)?;
    let index = prepare_index(&config, &providers, None).await?;

    let responder = Responder::from_config(&providers, &index, &config)
        .with_top_k(top_k.unwrap_or(config.index.top_k));
    let context = responder.retrieve(query)?;

    if context.hits.is_empty() {
        println!("No matching documents.");
        return Ok(());
    }

    println!("Top {} relevant documents:", context.hits.len());
    for (rank, hit) in context.hits.iter().enumerate() {
        println!(
            "{}. {} {}",
            rank + 1,
            style(&hit.entry.id).bold(),
            style(format!("(distance {:.4})", hit.distance)).dim()
        );
    }

    Ok(())
}

/// Answer a single question from the documents
#[inline]
pub async fn ask_question(question: &str, dir: Option<PathBuf>, advanced: bool) -> Result<()> {
    let config = Config::load()?;
    let providers = load_providers(&config)?;
    let index = prepare_index(&config, &providers, dir).await?;

    let responder = Responder::from_config(&providers, &index, &config)
        .with_model(config.provider.chat_model_for(advanced));
    let mut session = Session::new(config.chat.history_window);
    let answer = responder.respond(&mut session, question)?;

    eprintln!(
        "{} {}",
        style("Sources:").dim(),
        itertools::join(answer.context.sources(), ", ")
    );
    print_stream(answer.stream)?;

    Ok(())
}

/// Interactive conversation, grounded in the documents unless `no_retrieval` is set
#[inline]
pub async fn run_chat(dir: Option<PathBuf>, no_retrieval: bool, advanced: bool) -> Result<()> {
    let config = Config::load()?;
    let providers = load_providers(&config)?;
    let model = config.provider.chat_model_for(advanced);
    let mut session = Session::new(config.chat.history_window);

    let index = if no_retrieval {
        None
    } else {
        Some(prepare_index(&config, &providers, dir).await?)
    };
    let responder = index
        .as_ref()
        .map(|index| Responder::from_config(&providers, index, &config).with_model(model));
    let plain = PlainChat::new(providers.chat(), model)
        .with_system_prompt(config.chat.system_prompt.clone());

    println!("{}", style("How can I help you?").green());
    eprintln!("{}", style(format!("Chatting with {}", model)).dim());
    eprintln!(
        "{}",
        style("Type /clear to forget the conversation, /exit to quit.").dim()
    );

    let stdin = io::stdin();
    let mut line = String::new();
    loop {
        eprint!("{} ", style("you>").cyan().bold());
        io::stderr().flush()?;

        line.clear();
        if stdin.lock().read_line(&mut line)? == 0 {
            break;
        }
        let input = line.trim();

        match input {
            "" => continue,
            "/exit" | "/quit" => break,
            "/clear" => {
                session.clear();
                eprintln!("{}", style("History cleared.").dim());
                continue;
            }
            _ => {}
        }

        let result = match &responder {
            Some(responder) => responder
                .respond(&mut session, input)
                .map_err(anyhow::Error::from)
                .and_then(|answer| {
                    eprintln!(
                        "{} {}",
                        style("Sources:").dim(),
                        itertools::join(answer.context.sources(), ", ")
                    );
                    print_stream(answer.stream)
                }),
            None => plain
                .respond(&mut session, input)
                .map_err(anyhow::Error::from)
                .and_then(print_stream),
        };

        if let Err(e) = result {
            eprintln!("{} {:#}", style("Error:").red().bold(), e);
        }
    }

    Ok(())
}

/// Stream a summary of one document
#[inline]
pub fn summarize_file(path: &Path, format: SummaryFormat, advanced: bool) -> Result<()> {
    let config = Config::load()?;
    let providers = load_providers(&config)?;

    let bytes =
        std::fs::read(path).with_context(|| format!("Failed to read {}", path.display()))?;
    let filename = path
        .file_name()
        .map(|name| name.to_string_lossy().into_owned())
        .unwrap_or_default();
    let document = extract_text(&filename, &bytes)?;

    let model = config.provider.chat_model_for(advanced);
    eprintln!(
        "{}",
        style(format!("Summarizing {} in {} with {}", filename, format, model)).dim()
    );
    print_stream(summarize(providers.chat(), model, &document.text, format)?)?;

    Ok(())
}

/// Show configuration, index and provider status
#[inline]
pub async fn show_status() -> Result<()> {
    let config = Config::load()?;

    println!("{}", style("coursebot status").bold());
    println!("Config file: {}", config.config_file_path().display());
    println!(
        "Provider: {} at {}",
        config.provider.kind, config.provider.base_url
    );
    println!(
        "Models: embedding {}, chat {}, advanced {}",
        config.provider.embedding_model,
        config.provider.chat_model,
        config.provider.advanced_chat_model
    );
    match &config.ingest.source_dir {
        Some(dir) => println!("Documents: {}", dir.display()),
        None => println!("Documents: not configured"),
    }

    if config.index.storage == StorageMode::Durable {
        let index = VectorIndex::open(&config)
            .await
            .context("Failed to open the document index")?;
        println!(
            "Index: durable at {} ({} documents, {} metric)",
            config.index_database_path().display(),
            index.len(),
            index.metric()
        );
        if let Some(dimension) = index.dimension() {
            println!("  Dimensions: {}", dimension);
        }
        for entry in index.entries() {
            println!(
                "  {} (indexed {})",
                entry.id,
                entry.indexed_at.format("%Y-%m-%d %H:%M:%S")
            );
        }
    } else {
        println!(
            "Index: ephemeral ({} metric), rebuilt on every run",
            config.index.metric
        );
    }

    match config.provider.kind {
        ProviderKind::Ollama => {
            let client = OllamaClient::new(&config.provider)?;
            match client.health_check() {
                Ok(()) => println!("Provider health: {}", style("ok").green()),
                Err(e) => println!("Provider health: {} {:#}", style("unavailable").red(), e),
            }
        }
        ProviderKind::OpenAi => {
            if config.provider.api_key().is_some() {
                println!("API key: {} is set", config.provider.api_key_env);
            } else {
                println!(
                    "API key: {} {} is not set",
                    style("missing").red(),
                    config.provider.api_key_env
                );
            }
        }
    }

    Ok(())
}
