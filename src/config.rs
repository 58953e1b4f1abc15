use bistro_core::table::DEFAULT_BASE_URL;
use bistro_core::{MissingRowPolicy, SheetLayout};
use serde::{Deserialize, Serialize, Serializer};
use std::path::PathBuf;
use std::time::Duration;

/// Source of a configuration value
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ConfigSource {
    Default,
    File,
    Environment,
}

impl std::fmt::Display for ConfigSource {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ConfigSource::Default => write!(f, "default"),
            ConfigSource::File => write!(f, "file"),
            ConfigSource::Environment => write!(f, "environment"),
        }
    }
}

/// A configuration value with its source
#[derive(Debug, Clone, Serialize)]
pub struct ConfigValue<T> {
    pub value: T,
    pub source: ConfigSource,
}

impl<T> ConfigValue<T> {
    pub fn new(value: T, source: ConfigSource) -> Self {
        Self { value, source }
    }
}

/// Sheet names and write policy
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SheetsConfig {
    /// Sheet holding the product catalog
    pub products: String,
    /// Sheet holding incoming orders
    pub orders: String,
    /// What an update does when the record's row is gone
    pub missing_row: MissingRowPolicy,
}

impl Default for SheetsConfig {
    fn default() -> Self {
        let layout = SheetLayout::default();
        Self {
            products: layout.products,
            orders: layout.orders,
            missing_row: MissingRowPolicy::default(),
        }
    }
}

/// Application configuration with source tracking
#[derive(Debug, Clone, Serialize)]
pub struct Config {
    /// Spreadsheet holding the Products and Orders sheets
    pub spreadsheet_id: ConfigValue<Option<String>>,
    /// Bearer token for the Sheets API
    #[serde(serialize_with = "redact_token")]
    pub access_token: ConfigValue<Option<String>>,
    /// Sheets API endpoint
    pub api_base_url: ConfigValue<String>,
    /// Seconds between order refreshes in `orders watch`
    pub refresh_interval_secs: ConfigValue<u64>,
    /// Symbol printed before amounts
    pub currency: ConfigValue<String>,
    /// Config file path used (if any)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub config_file: Option<PathBuf>,
    pub sheets: SheetsConfig,
}

/// Internal struct for deserializing config file
#[derive(Debug, Deserialize, Default)]
#[serde(default)]
struct ConfigFile {
    spreadsheet_id: Option<String>,
    access_token: Option<String>,
    api_base_url: Option<String>,
    refresh_interval_secs: Option<u64>,
    currency: Option<String>,
    sheets: Option<SheetsConfig>,
}

fn redact_token<S: Serializer>(
    token: &ConfigValue<Option<String>>,
    serializer: S,
) -> Result<S::Ok, S::Error> {
    ConfigValue::new(token.value.as_ref().map(|_| "****"), token.source.clone())
        .serialize(serializer)
}

impl Config {
    /// Load configuration with priority: env vars > config file > defaults
    pub fn load(config_path: Option<PathBuf>) -> Result<Self, ConfigError> {
        Self::load_with_env(config_path, |key| std::env::var(key).ok())
    }

    fn load_with_env(
        config_path: Option<PathBuf>,
        env: impl Fn(&str) -> Option<String>,
    ) -> Result<Self, ConfigError> {
        // Start with defaults
        let mut spreadsheet_id = ConfigValue::new(None, ConfigSource::Default);
        let mut access_token = ConfigValue::new(None, ConfigSource::Default);
        let mut api_base_url =
            ConfigValue::new(DEFAULT_BASE_URL.to_string(), ConfigSource::Default);
        let mut refresh_interval_secs = ConfigValue::new(30, ConfigSource::Default);
        let mut currency = ConfigValue::new("$".to_string(), ConfigSource::Default);
        let mut config_file = None;
        let mut sheets = SheetsConfig::default();

        // Try to load from config file
        let path = config_path.unwrap_or_else(Self::default_config_path);
        if path.exists() {
            let contents = std::fs::read_to_string(&path)
                .map_err(|e| ConfigError::ReadError(path.clone(), e))?;
            let file_config: ConfigFile = serde_yaml::from_str(&contents)
                .map_err(|e| ConfigError::ParseError(path.clone(), e))?;

            config_file = Some(path.clone());

            if let Some(id) = file_config.spreadsheet_id {
                spreadsheet_id = ConfigValue::new(Some(id), ConfigSource::File);
            }
            if let Some(token) = file_config.access_token {
                access_token = ConfigValue::new(Some(token), ConfigSource::File);
            }
            if let Some(url) = file_config.api_base_url {
                api_base_url = ConfigValue::new(url, ConfigSource::File);
            }
            if let Some(secs) = file_config.refresh_interval_secs {
                refresh_interval_secs = ConfigValue::new(secs, ConfigSource::File);
            }
            if let Some(symbol) = file_config.currency {
                currency = ConfigValue::new(symbol, ConfigSource::File);
            }
            if let Some(sheets_config) = file_config.sheets {
                sheets = sheets_config;
            }
        }

        // Apply environment variable overrides
        if let Some(id) = env("BISTRO_SPREADSHEET_ID") {
            spreadsheet_id = ConfigValue::new(Some(id), ConfigSource::Environment);
        }
        if let Some(token) = env("BISTRO_ACCESS_TOKEN") {
            access_token = ConfigValue::new(Some(token), ConfigSource::Environment);
        }
        if let Some(url) = env("BISTRO_API_BASE_URL") {
            api_base_url = ConfigValue::new(url, ConfigSource::Environment);
        }
        if let Some(secs) = env("BISTRO_REFRESH_INTERVAL_SECS") {
            let parsed = secs
                .trim()
                .parse()
                .map_err(|_| ConfigError::InvalidValue("BISTRO_REFRESH_INTERVAL_SECS", secs))?;
            refresh_interval_secs = ConfigValue::new(parsed, ConfigSource::Environment);
        }

        if refresh_interval_secs.value == 0 {
            return Err(ConfigError::InvalidValue(
                "refresh_interval_secs",
                "0".to_string(),
            ));
        }

        Ok(Self {
            spreadsheet_id,
            access_token,
            api_base_url,
            refresh_interval_secs,
            currency,
            config_file,
            sheets,
        })
    }

    pub fn refresh_interval(&self) -> Duration {
        Duration::from_secs(self.refresh_interval_secs.value)
    }

    pub fn layout(&self) -> SheetLayout {
        SheetLayout {
            products: self.sheets.products.clone(),
            orders: self.sheets.orders.clone(),
        }
    }

    /// Formats an amount with the configured currency symbol.
    pub fn money(&self, amount: rust_decimal::Decimal) -> String {
        format!("{}{:.2}", self.currency.value, amount)
    }

    /// Default config directory (platform-specific):
    /// - Linux: ~/.config/bistro/
    /// - macOS: ~/Library/Application Support/bistro/
    /// - Windows: %APPDATA%/bistro/
    pub fn default_config_dir() -> PathBuf {
        dirs::config_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join("bistro")
    }

    /// Default config file path (platform-specific config dir + config.yaml)
    pub fn default_config_path() -> PathBuf {
        Self::default_config_dir().join("config.yaml")
    }
}

#[derive(Debug)]
pub enum ConfigError {
    ReadError(PathBuf, std::io::Error),
    ParseError(PathBuf, serde_yaml::Error),
    InvalidValue(&'static str, String),
}

impl std::fmt::Display for ConfigError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ConfigError::ReadError(path, e) => {
                write!(f, "Failed to read config file '{}': {}", path.display(), e)
            }
            ConfigError::ParseError(path, e) => {
                write!(f, "Failed to parse config file '{}': {}", path.display(), e)
            }
            ConfigError::InvalidValue(key, value) => {
                write!(f, "Invalid value '{}' for {}", value, key)
            }
        }
    }
}

impl std::error::Error for ConfigError {}
