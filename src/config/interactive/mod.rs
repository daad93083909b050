
use anyhow::{Context, Result};
use console::style;
use dialoguer::{Confirm, Input, Select};
use std::path::PathBuf;

use super::{Config, ConfigError, ProviderConfig, ProviderKind, StorageMode};

#[inline]
pub fn run_interactive_config() -> Result<()> {
    eprintln!("{}", style("🔧 Coursebot Configuration Setup").bold().cyan());
    eprintln!();

    let mut config = load_existing_config()?;

    eprintln!("{}", style("Provider Configuration").bold().yellow());
    eprintln!("Choose the service used for embeddings and chat completions.");
    eprintln!();

    configure_provider(&mut config.provider)?;

    eprintln!();
    eprintln!("{}", style("Documents & Index").bold().yellow());
    configure_index(&mut config)?;

    eprintln!();
    eprintln!("{}", style("Testing configuration...").yellow());

    match test_provider_connection(&config.provider)? {
        ConnectionStatus::Reachable => {
            eprintln!("{}", style("✓ Provider connection successful!").green());
        }
        ConnectionStatus::Unauthorized(code) => {
            eprintln!(
                "{}",
                style(format!(
                    "⚠ Warning: The provider rejected the API key (HTTP {})",
                    code
                ))
                .yellow()
            );
            eprintln!(
                "Check that {} holds a valid key before ingesting.",
                config.provider.api_key_env
            );
        }
        ConnectionStatus::Unreachable => {
            eprintln!(
                "{}",
                style("⚠ Warning: Could not reach the provider").yellow()
            );
            eprintln!("You can continue, but the provider must be reachable before ingesting.");
        }
    }

    eprintln!();
    if Confirm::new()
        .with_prompt("Save configuration?")
        .default(true)
        .interact()?
    {
        config.save().context("Failed to save configuration")?;
        eprintln!("{}", style("✓ Configuration saved successfully!").green());
        eprintln!(
            "Configuration saved to: {}",
            style(config.config_file_path().display()).cyan()
        );
    } else {
        eprintln!("Configuration not saved.");
    }

    Ok(())
}

#[inline]
pub fn show_config() -> Result<()> {
    let config = Config::load().context("Failed to load configuration")?;

    eprintln!("{}", style("📋 Current Configuration").bold().cyan());
    eprintln!();

    eprintln!("{}", style("Provider Settings:").bold().yellow());
    eprintln!("  Kind: {}", style(config.provider.kind).cyan());
    eprintln!("  Base URL: {}", style(&config.provider.base_url).cyan());
    eprintln!(
        "  Embedding Model: {}",
        style(&config.provider.embedding_model).cyan()
    );
    eprintln!("  Chat Model: {}", style(&config.provider.chat_model).cyan());
    eprintln!(
        "  Advanced Chat Model: {}",
        style(&config.provider.advanced_chat_model).cyan()
    );
    if config.provider.kind == ProviderKind::OpenAi {
        let key_state = if config.provider.api_key().is_some() {
            style("set").green()
        } else {
            style("not set").red()
        };
        eprintln!(
            "  API Key (${}): {}",
            config.provider.api_key_env, key_state
        );
    }

    eprintln!();
    eprintln!("{}", style("Index Settings:").bold().yellow());
    eprintln!("  Storage: {:?}", config.index.storage);
    if config.index.storage == StorageMode::Durable {
        eprintln!(
            "  Database: {}",
            style(config.index_database_path().display()).cyan()
        );
    }
    eprintln!("  Metric: {}", style(config.index.metric).cyan());
    eprintln!("  Top K: {}", style(config.index.top_k).cyan());

    eprintln!();
    eprintln!("{}", style("Ingestion & Chat:").bold().yellow());
    match &config.ingest.source_dir {
        Some(dir) => eprintln!("  Source Directory: {}", style(dir.display()).cyan()),
        None => eprintln!("  Source Directory: {}", style("not set").dim()),
    }
    eprintln!(
        "  Extensions: {}",
        style(config.ingest.extensions.join(", ")).cyan()
    );
    eprintln!(
        "  History Window: {} turns",
        style(config.chat.history_window).cyan()
    );

    eprintln!();
    eprintln!(
        "Config file: {}",
        style(config.config_file_path().display()).dim()
    );

    Ok(())
}

fn load_existing_config() -> Result<Config> {
    Config::load().map_or_else(
        |_| {
            eprintln!(
                "{}",
                style("No existing configuration found. Using defaults.").yellow()
            );
            let base_dir = Config::config_dir().context("Failed to determine config directory")?;
            Ok(Config {
                base_dir,
                ..Config::default()
            })
        },
        |config| {
            eprintln!("{}", style("Found existing configuration.").green());
            Ok(config)
        },
    )
}

fn configure_provider(provider: &mut ProviderConfig) -> Result<()> {
    let kinds = &[ProviderKind::OpenAi, ProviderKind::Ollama];
    let default_index = kinds.iter().position(|&k| k == provider.kind).unwrap_or(0);

    let kind_index = Select::new()
        .with_prompt("Provider")
        .default(default_index)
        .items(&["OpenAI-compatible API", "Ollama"])
        .interact()?;
    provider.switch_kind(kinds[kind_index]);

    let base_url: String = Input::new()
        .with_prompt("Base URL")
        .default(provider.base_url.to_string())
        .validate_with(|input: &String| -> Result<(), ConfigError> {
            provider.clone().set_base_url(input)
        })
        .interact_text()?;

    let embedding_model: String = Input::new()
        .with_prompt("Embedding model")
        .default(provider.embedding_model.clone())
        .validate_with(non_empty)
        .interact_text()?;

    let chat_model: String = Input::new()
        .with_prompt("Chat model")
        .default(provider.chat_model.clone())
        .validate_with(non_empty)
        .interact_text()?;

    let advanced_chat_model: String = Input::new()
        .with_prompt("Advanced chat model")
        .default(provider.advanced_chat_model.clone())
        .validate_with(non_empty)
        .interact_text()?;

    if provider.kind == ProviderKind::OpenAi {
        let api_key_env: String = Input::new()
            .with_prompt("Environment variable holding the API key")
            .default(provider.api_key_env.clone())
            .validate_with(non_empty)
            .interact_text()?;
        provider.api_key_env = api_key_env;
    }

    provider.set_base_url(&base_url)?;
    provider.set_embedding_model(embedding_model)?;
    provider.set_chat_model(chat_model)?;
    provider.set_advanced_chat_model(advanced_chat_model)?;

    Ok(())
}

fn configure_index(config: &mut Config) -> Result<()> {
    let modes = &[StorageMode::Ephemeral, StorageMode::Durable];
    let default_index = modes
        .iter()
        .position(|&m| m == config.index.storage)
        .unwrap_or(0);

    let mode_index = Select::new()
        .with_prompt("Index storage")
        .default(default_index)
        .items(&[
            "Ephemeral (re-ingest on every start)",
            "Durable (reuse the index between runs)",
        ])
        .interact()?;
    config.index.storage = modes[mode_index];

    let source_dir: String = Input::new()
        .with_prompt("Document directory (leave empty to pass it on the command line)")
        .default(
            config
                .ingest
                .source_dir
                .as_ref()
                .map(|dir| dir.display().to_string())
                .unwrap_or_default(),
        )
        .allow_empty(true)
        .interact_text()?;
    config.ingest.source_dir = if source_dir.trim().is_empty() {
        None
    } else {
        Some(PathBuf::from(source_dir.trim()))
    };

    let top_k: usize = Input::new()
        .with_prompt("Documents retrieved per question")
        .default(config.index.top_k)
        .validate_with(|input: &usize| -> Result<(), &str> {
            if (1..=100).contains(input) {
                Ok(())
            } else {
                Err("Must be between 1 and 100")
            }
        })
        .interact_text()?;
    config.index.top_k = top_k;

    let history_window: usize = Input::new()
        .with_prompt("Conversation turns kept in history")
        .default(config.chat.history_window)
        .validate_with(|input: &usize| -> Result<(), &str> {
            if (1..=100).contains(input) {
                Ok(())
            } else {
                Err("Must be between 1 and 100")
            }
        })
        .interact_text()?;
    config.chat.history_window = history_window;

    Ok(())
}

fn non_empty(input: &String) -> Result<(), &'static str> {
    if input.trim().is_empty() {
        Err("Value cannot be empty")
    } else {
        Ok(())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum ConnectionStatus {
    Reachable,
    Unauthorized(u16),
    Unreachable,
}

fn test_provider_connection(provider: &ProviderConfig) -> Result<ConnectionStatus> {
    let path = match provider.kind {
        ProviderKind::OpenAi => "models",
        ProviderKind::Ollama => "api/version",
    };
    let url = crate::providers::endpoint(&provider.base_url, path)?;

    let agent: ureq::Agent = ureq::Agent::config_builder()
        .timeout_global(Some(std::time::Duration::from_secs(5)))
        .build()
        .into();

    let mut request = agent.get(url.as_str());
    if let Some(key) = provider.api_key() {
        request = request.header("Authorization", format!("Bearer {}", key));
    }

    Ok(match request.call() {
        Ok(_) => ConnectionStatus::Reachable,
        Err(ureq::Error::StatusCode(code @ (401 | 403))) => ConnectionStatus::Unauthorized(code),
        // Any other client error still proves the server answered
        Err(ureq::Error::StatusCode(code)) if (400..500).contains(&code) => {
            ConnectionStatus::Reachable
        }
        Err(_) => ConnectionStatus::Unreachable,
    })
}
