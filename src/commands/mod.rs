mod config_cmd;
mod orders;
mod products;
mod stats;

use bistro_core::SyncError;
use clap::ValueEnum;

pub use config_cmd::ConfigCommand;
pub use orders::OrdersCommand;
pub use products::ProductsCommand;
pub use stats::StatsCommand;

#[derive(Clone, ValueEnum, Default)]
pub enum OutputFormat {
    #[default]
    Text,
    Json,
}

/// Failures reported by commands
#[derive(Debug)]
pub enum CommandError {
    /// A required config value is missing
    NotConfigured(&'static str),
    /// The sync layer refused or failed the operation
    Sync(SyncError),
}

impl std::fmt::Display for CommandError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            CommandError::NotConfigured(key) => {
                write!(
                    f,
                    "Missing configuration: {}. Run 'bistro config init' to create a config file.",
                    key
                )
            }
            CommandError::Sync(e) if e.requires_sign_in() => {
                write!(
                    f,
                    "{}. Provide a fresh access token via BISTRO_ACCESS_TOKEN or the config file.",
                    e
                )
            }
            CommandError::Sync(e) => write!(f, "{}", e),
        }
    }
}

impl std::error::Error for CommandError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            CommandError::NotConfigured(_) => None,
            CommandError::Sync(e) => Some(e),
        }
    }
}

impl From<SyncError> for CommandError {
    fn from(e: SyncError) -> Self {
        CommandError::Sync(e)
    }
}

/// Shortens `text` to `width` characters, ending in "..." when cut.
pub(crate) fn truncate(text: &str, width: usize) -> String {
    if text.chars().count() > width {
        let kept: String = text.chars().take(width.saturating_sub(3)).collect();
        format!("{}...", kept)
    } else {
        text.to_string()
    }
}
