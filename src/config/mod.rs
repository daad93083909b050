// Configuration management module
// TOML settings for providers, index storage, ingestion and chat

pub mod interactive;
pub mod settings;


pub use interactive::{run_interactive_config, show_config};
pub use settings::{
    ChatConfig, Config, ConfigError, DEFAULT_HISTORY_WINDOW, DEFAULT_TOP_K, IndexConfig,
    IngestConfig, ProviderConfig, ProviderKind, StorageMode,
};
