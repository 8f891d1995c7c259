use std::collections::BTreeMap;
use std::env;
use std::fs;
use std::path::{Path, PathBuf};

use rust_decimal::Decimal;
use secrecy::{ExposeSecret, SecretString};
use serde::{Deserialize, Serialize};
use thiserror::Error;

#[derive(Clone, Debug)]
pub struct AppConfig {
    pub database: DatabaseConfig,
    pub llm: LlmConfig,
    pub registry: ServiceLayerConfig,
    pub catalog: CatalogConfig,
    pub resolution: ResolutionConfig,
    pub pricing: PricingConfig,
    pub logging: LoggingConfig,
}

#[derive(Clone, Debug)]
pub struct DatabaseConfig {
    pub url: String,
    pub max_connections: u32,
    pub timeout_secs: u64,
}

#[derive(Clone, Debug)]
pub struct LlmConfig {
    pub provider: LlmProvider,
    pub api_key: Option<SecretString>,
    pub base_url: Option<String>,
    pub model: String,
    pub timeout_secs: u64,
    pub max_retries: u32,
}

/// Connection settings for one Service Layer endpoint (customer registry or catalog).
#[derive(Clone, Debug)]
pub struct ServiceLayerConfig {
    pub base_url: String,
    pub company_db: String,
    pub username: String,
    pub password: SecretString,
    pub timeout_secs: u64,
    /// Seconds subtracted from the server-reported session lifetime.
    pub session_margin_secs: u64,
}

#[derive(Clone, Debug)]
pub struct CatalogConfig {
    pub service: ServiceLayerConfig,
    pub sales_price_list: u32,
    pub purchase_price_list: u32,
}

#[derive(Clone, Debug)]
pub struct ResolutionConfig {
    pub acceptance_threshold: u8,
    pub min_margin: u8,
    pub max_candidates: usize,
    pub search_limit: usize,
    pub extra_denylist: Vec<String>,
    pub extra_placeholders: Vec<String>,
}

#[derive(Clone, Debug)]
pub struct PricingConfig {
    pub catalog_margin_pct: Decimal,
    pub supplier_margin_pct: Decimal,
    pub tier_margins: BTreeMap<String, Decimal>,
    pub stale_after_days: u32,
}

#[derive(Clone, Debug)]
pub struct LoggingConfig {
    pub level: String,
    pub format: LogFormat,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LlmProvider {
    OpenAi,
    Anthropic,
    Ollama,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LogFormat {
    Compact,
    Pretty,
    Json,
}

#[derive(Clone, Debug, Default)]
pub struct ConfigOverrides {
    pub database_url: Option<String>,
    pub log_level: Option<String>,
    pub llm_provider: Option<LlmProvider>,
    pub llm_model: Option<String>,
    pub registry_base_url: Option<String>,
    pub catalog_base_url: Option<String>,
}

#[derive(Clone, Debug, Default)]
pub struct LoadOptions {
    pub config_path: Option<PathBuf>,
    pub require_file: bool,
    pub overrides: ConfigOverrides,
}

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("could not read config file `{path}`: {source}")]
    ReadFile { path: PathBuf, source: std::io::Error },
    #[error("could not parse config file `{path}`: {source}")]
    ParseFile { path: PathBuf, source: toml::de::Error },
    #[error("required config file was not found: `{0}`")]
    MissingConfigFile(PathBuf),
    #[error("environment variable interpolation failed for `{var}`")]
    MissingEnvInterpolation { var: String },
    #[error("unterminated environment interpolation expression")]
    UnterminatedInterpolation,
    #[error("invalid environment override for `{key}`: `{value}`")]
    InvalidEnvOverride { key: String, value: String },
    #[error("configuration validation failed: {0}")]
    Validation(String),
}

impl Default for ServiceLayerConfig {
    fn default() -> Self {
        Self {
            base_url: String::new(),
            company_db: String::new(),
            username: String::new(),
            password: String::new().into(),
            timeout_secs: 20,
            session_margin_secs: 60,
        }
    }
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            database: DatabaseConfig {
                url: "sqlite://mailquote.db".to_string(),
                max_connections: 5,
                timeout_secs: 30,
            },
            llm: LlmConfig {
                provider: LlmProvider::Ollama,
                api_key: None,
                base_url: Some("http://localhost:11434".to_string()),
                model: "llama3.1".to_string(),
                timeout_secs: 60,
                max_retries: 1,
            },
            registry: ServiceLayerConfig::default(),
            catalog: CatalogConfig {
                service: ServiceLayerConfig::default(),
                sales_price_list: 1,
                purchase_price_list: 2,
            },
            resolution: ResolutionConfig {
                acceptance_threshold: 80,
                min_margin: 10,
                max_candidates: 5,
                search_limit: 10,
                extra_denylist: Vec::new(),
                extra_placeholders: Vec::new(),
            },
            pricing: PricingConfig {
                catalog_margin_pct: Decimal::ZERO,
                supplier_margin_pct: Decimal::from(30),
                tier_margins: BTreeMap::new(),
                stale_after_days: 365,
            },
            logging: LoggingConfig { level: "info".to_string(), format: LogFormat::Compact },
        }
    }
}

fn secret_value(value: String) -> SecretString {
    value.into()
}

impl std::str::FromStr for LlmProvider {
    type Err = ConfigError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.trim().to_ascii_lowercase().as_str() {
            "openai" => Ok(Self::OpenAi),
            "anthropic" => Ok(Self::Anthropic),
            "ollama" => Ok(Self::Ollama),
            other => Err(ConfigError::Validation(format!(
                "unsupported llm provider `{other}` (expected openai|anthropic|ollama)"
            ))),
        }
    }
}

impl std::str::FromStr for LogFormat {
    type Err = ConfigError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.trim().to_ascii_lowercase().as_str() {
            "compact" => Ok(Self::Compact),
            "pretty" => Ok(Self::Pretty),
            "json" => Ok(Self::Json),
            other => Err(ConfigError::Validation(format!(
                "unsupported log format `{other}` (expected compact|pretty|json)"
            ))),
        }
    }
}

impl AppConfig {
    pub fn load(options: LoadOptions) -> Result<Self, ConfigError> {
        let mut config = Self::default();
        let maybe_path = resolve_config_path(options.config_path.as_deref());

        if let Some(path) = maybe_path {
            let patch = read_patch(&path)?;
            config.apply_patch(patch)?;
        } else if options.require_file {
            let expected =
                options.config_path.unwrap_or_else(|| PathBuf::from("mailquote.toml"));
            return Err(ConfigError::MissingConfigFile(expected));
        }

        config.apply_env_overrides()?;
        config.apply_overrides(options.overrides);
        config.validate()?;

        Ok(config)
    }

    fn apply_patch(&mut self, patch: ConfigPatch) -> Result<(), ConfigError> {
        if let Some(database) = patch.database {
            if let Some(url) = database.url {
                self.database.url = url;
            }
            if let Some(max_connections) = database.max_connections {
                self.database.max_connections = max_connections;
            }
            if let Some(timeout_secs) = database.timeout_secs {
                self.database.timeout_secs = timeout_secs;
            }
        }

        if let Some(llm) = patch.llm {
            if let Some(provider) = llm.provider {
                self.llm.provider = provider;
            }
            if let Some(llm_api_key_value) = llm.api_key {
                self.llm.api_key = Some(secret_value(llm_api_key_value));
            }
            if let Some(base_url) = llm.base_url {
                self.llm.base_url = Some(base_url);
            }
            if let Some(model) = llm.model {
                self.llm.model = model;
            }
            if let Some(timeout_secs) = llm.timeout_secs {
                self.llm.timeout_secs = timeout_secs;
            }
            if let Some(max_retries) = llm.max_retries {
                self.llm.max_retries = max_retries;
            }
        }

        if let Some(registry) = patch.registry {
            registry.apply_to(&mut self.registry);
        }

        if let Some(catalog) = patch.catalog {
            if let Some(sales_price_list) = catalog.sales_price_list {
                self.catalog.sales_price_list = sales_price_list;
            }
            if let Some(purchase_price_list) = catalog.purchase_price_list {
                self.catalog.purchase_price_list = purchase_price_list;
            }
            catalog.service.apply_to(&mut self.catalog.service);
        }

        if let Some(resolution) = patch.resolution {
            if let Some(acceptance_threshold) = resolution.acceptance_threshold {
                self.resolution.acceptance_threshold = acceptance_threshold;
            }
            if let Some(min_margin) = resolution.min_margin {
                self.resolution.min_margin = min_margin;
            }
            if let Some(max_candidates) = resolution.max_candidates {
                self.resolution.max_candidates = max_candidates;
            }
            if let Some(search_limit) = resolution.search_limit {
                self.resolution.search_limit = search_limit;
            }
            if let Some(extra_denylist) = resolution.extra_denylist {
                self.resolution.extra_denylist = extra_denylist;
            }
            if let Some(extra_placeholders) = resolution.extra_placeholders {
                self.resolution.extra_placeholders = extra_placeholders;
            }
        }

        if let Some(pricing) = patch.pricing {
            if let Some(value) = pricing.catalog_margin_pct {
                self.pricing.catalog_margin_pct = percent("pricing.catalog_margin_pct", value)?;
            }
            if let Some(value) = pricing.supplier_margin_pct {
                self.pricing.supplier_margin_pct = percent("pricing.supplier_margin_pct", value)?;
            }
            if let Some(tier_margins) = pricing.tier_margins {
                let mut converted = BTreeMap::new();
                for (tier, value) in tier_margins {
                    let margin = percent(&format!("pricing.tier_margins.{tier}"), value)?;
                    converted.insert(tier, margin);
                }
                self.pricing.tier_margins = converted;
            }
            if let Some(stale_after_days) = pricing.stale_after_days {
                self.pricing.stale_after_days = stale_after_days;
            }
        }

        if let Some(logging) = patch.logging {
            if let Some(level) = logging.level {
                self.logging.level = level;
            }
            if let Some(format) = logging.format {
                self.logging.format = format;
            }
        }

        Ok(())
    }

    fn apply_env_overrides(&mut self) -> Result<(), ConfigError> {
        if let Some(value) = read_env("MAILQUOTE_DATABASE_URL") {
            self.database.url = value;
        }
        if let Some(value) = read_env("MAILQUOTE_DATABASE_MAX_CONNECTIONS") {
            self.database.max_connections =
                parse_u32("MAILQUOTE_DATABASE_MAX_CONNECTIONS", &value)?;
        }
        if let Some(value) = read_env("MAILQUOTE_DATABASE_TIMEOUT_SECS") {
            self.database.timeout_secs = parse_u64("MAILQUOTE_DATABASE_TIMEOUT_SECS", &value)?;
        }

        if let Some(value) = read_env("MAILQUOTE_LLM_PROVIDER") {
            self.llm.provider = value.parse()?;
        }
        if let Some(value) = read_env("MAILQUOTE_LLM_API_KEY") {
            self.llm.api_key = Some(secret_value(value));
        }
        if let Some(value) = read_env("MAILQUOTE_LLM_BASE_URL") {
            self.llm.base_url = Some(value);
        }
        if let Some(value) = read_env("MAILQUOTE_LLM_MODEL") {
            self.llm.model = value;
        }
        if let Some(value) = read_env("MAILQUOTE_LLM_TIMEOUT_SECS") {
            self.llm.timeout_secs = parse_u64("MAILQUOTE_LLM_TIMEOUT_SECS", &value)?;
        }
        if let Some(value) = read_env("MAILQUOTE_LLM_MAX_RETRIES") {
            self.llm.max_retries = parse_u32("MAILQUOTE_LLM_MAX_RETRIES", &value)?;
        }

        apply_service_env("MAILQUOTE_REGISTRY", &mut self.registry)?;
        apply_service_env("MAILQUOTE_CATALOG", &mut self.catalog.service)?;
        if let Some(value) = read_env("MAILQUOTE_CATALOG_SALES_PRICE_LIST") {
            self.catalog.sales_price_list =
                parse_u32("MAILQUOTE_CATALOG_SALES_PRICE_LIST", &value)?;
        }
        if let Some(value) = read_env("MAILQUOTE_CATALOG_PURCHASE_PRICE_LIST") {
            self.catalog.purchase_price_list =
                parse_u32("MAILQUOTE_CATALOG_PURCHASE_PRICE_LIST", &value)?;
        }

        if let Some(value) = read_env("MAILQUOTE_RESOLUTION_ACCEPTANCE_THRESHOLD") {
            self.resolution.acceptance_threshold =
                parse_u8("MAILQUOTE_RESOLUTION_ACCEPTANCE_THRESHOLD", &value)?;
        }
        if let Some(value) = read_env("MAILQUOTE_RESOLUTION_MIN_MARGIN") {
            self.resolution.min_margin = parse_u8("MAILQUOTE_RESOLUTION_MIN_MARGIN", &value)?;
        }

        if let Some(value) = read_env("MAILQUOTE_PRICING_SUPPLIER_MARGIN_PCT") {
            self.pricing.supplier_margin_pct =
                parse_decimal("MAILQUOTE_PRICING_SUPPLIER_MARGIN_PCT", &value)?;
        }
        if let Some(value) = read_env("MAILQUOTE_PRICING_CATALOG_MARGIN_PCT") {
            self.pricing.catalog_margin_pct =
                parse_decimal("MAILQUOTE_PRICING_CATALOG_MARGIN_PCT", &value)?;
        }
        if let Some(value) = read_env("MAILQUOTE_PRICING_STALE_AFTER_DAYS") {
            self.pricing.stale_after_days =
                parse_u32("MAILQUOTE_PRICING_STALE_AFTER_DAYS", &value)?;
        }

        let log_level =
            read_env("MAILQUOTE_LOGGING_LEVEL").or_else(|| read_env("MAILQUOTE_LOG_LEVEL"));
        if let Some(value) = log_level {
            self.logging.level = value;
        }
        let log_format =
            read_env("MAILQUOTE_LOGGING_FORMAT").or_else(|| read_env("MAILQUOTE_LOG_FORMAT"));
        if let Some(value) = log_format {
            self.logging.format = value.parse()?;
        }

        Ok(())
    }

    fn apply_overrides(&mut self, overrides: ConfigOverrides) {
        if let Some(database_url) = overrides.database_url {
            self.database.url = database_url;
        }
        if let Some(log_level) = overrides.log_level {
            self.logging.level = log_level;
        }
        if let Some(llm_provider) = overrides.llm_provider {
            self.llm.provider = llm_provider;
        }
        if let Some(llm_model) = overrides.llm_model {
            self.llm.model = llm_model;
        }
        if let Some(registry_base_url) = overrides.registry_base_url {
            self.registry.base_url = registry_base_url;
        }
        if let Some(catalog_base_url) = overrides.catalog_base_url {
            self.catalog.service.base_url = catalog_base_url;
        }
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        validate_database(&self.database)?;
        validate_llm(&self.llm)?;
        validate_service_layer("registry", &self.registry)?;
        validate_service_layer("catalog", &self.catalog.service)?;
        validate_resolution(&self.resolution)?;
        validate_pricing(&self.pricing)?;
        validate_logging(&self.logging)?;
        Ok(())
    }
}

fn resolve_config_path(explicit_path: Option<&Path>) -> Option<PathBuf> {
    if let Some(path) = explicit_path {
        return path.exists().then_some(path.to_path_buf());
    }

    [PathBuf::from("mailquote.toml"), PathBuf::from("config/mailquote.toml")]
        .into_iter()
        .find(|path| path.exists())
}

fn read_patch(path: &Path) -> Result<ConfigPatch, ConfigError> {
    let raw = fs::read_to_string(path)
        .map_err(|source| ConfigError::ReadFile { path: path.to_path_buf(), source })?;

    let interpolated = interpolate_env_vars(&raw)?;
    toml::from_str::<ConfigPatch>(&interpolated)
        .map_err(|source| ConfigError::ParseFile { path: path.to_path_buf(), source })
}

fn interpolate_env_vars(input: &str) -> Result<String, ConfigError> {
    let mut output = String::with_capacity(input.len());
    let mut chars = input.chars().peekable();

    while let Some(ch) = chars.next() {
        if ch == '$' && matches!(chars.peek(), Some('{')) {
            chars.next();
            let mut key = String::new();

            loop {
                match chars.next() {
                    Some('}') => break,
                    Some(next) => key.push(next),
                    None => return Err(ConfigError::UnterminatedInterpolation),
                }
            }

            let value = env::var(&key)
                .map_err(|_| ConfigError::MissingEnvInterpolation { var: key.clone() })?;
            output.push_str(&value);
            continue;
        }

        output.push(ch);
    }

    Ok(output)
}

fn apply_service_env(prefix: &str, service: &mut ServiceLayerConfig) -> Result<(), ConfigError> {
    if let Some(value) = read_env(&format!("{prefix}_BASE_URL")) {
        service.base_url = value;
    }
    if let Some(value) = read_env(&format!("{prefix}_COMPANY_DB")) {
        service.company_db = value;
    }
    if let Some(value) = read_env(&format!("{prefix}_USERNAME")) {
        service.username = value;
    }
    if let Some(value) = read_env(&format!("{prefix}_PASSWORD")) {
        service.password = secret_value(value);
    }
    let key = format!("{prefix}_TIMEOUT_SECS");
    if let Some(value) = read_env(&key) {
        service.timeout_secs = parse_u64(&key, &value)?;
    }
    let key = format!("{prefix}_SESSION_MARGIN_SECS");
    if let Some(value) = read_env(&key) {
        service.session_margin_secs = parse_u64(&key, &value)?;
    }
    Ok(())
}

fn validate_database(database: &DatabaseConfig) -> Result<(), ConfigError> {
    let url = database.url.trim();
    let sqlite_url =
        url.starts_with("sqlite://") || url.starts_with("sqlite::") || url == ":memory:";
    if !sqlite_url {
        return Err(ConfigError::Validation(
            "database.url must be a sqlite URL (`sqlite://...`, `sqlite::...`, or `:memory:`)"
                .to_string(),
        ));
    }

    if database.max_connections == 0 {
        return Err(ConfigError::Validation(
            "database.max_connections must be greater than zero".to_string(),
        ));
    }

    if database.timeout_secs == 0 || database.timeout_secs > 300 {
        return Err(ConfigError::Validation(
            "database.timeout_secs must be in range 1..=300".to_string(),
        ));
    }

    Ok(())
}

fn validate_llm(llm: &LlmConfig) -> Result<(), ConfigError> {
    if llm.timeout_secs == 0 || llm.timeout_secs > 300 {
        return Err(ConfigError::Validation(
            "llm.timeout_secs must be in range 1..=300".to_string(),
        ));
    }

    match llm.provider {
        LlmProvider::OpenAi | LlmProvider::Anthropic => {
            let missing = llm
                .api_key
                .as_ref()
                .map(|value| value.expose_secret().trim().is_empty())
                .unwrap_or(true);
            if missing {
                return Err(ConfigError::Validation(
                    "llm.api_key is required for openai/anthropic providers".to_string(),
                ));
            }
        }
        LlmProvider::Ollama => {
            let missing =
                llm.base_url.as_ref().map(|value| value.trim().is_empty()).unwrap_or(true);
            if missing {
                return Err(ConfigError::Validation(
                    "llm.base_url is required for ollama provider".to_string(),
                ));
            }
        }
    }

    Ok(())
}

fn validate_service_layer(section: &str, service: &ServiceLayerConfig) -> Result<(), ConfigError> {
    let base_url = service.base_url.trim();
    if base_url.is_empty() {
        return Err(ConfigError::Validation(format!(
            "{section}.base_url is required (Service Layer root, e.g. `https://sap:50000/b1s/v1`)"
        )));
    }
    if !base_url.starts_with("http://") && !base_url.starts_with("https://") {
        return Err(ConfigError::Validation(format!(
            "{section}.base_url must start with http:// or https://"
        )));
    }
    if service.username.trim().is_empty() {
        return Err(ConfigError::Validation(format!("{section}.username is required")));
    }
    if service.timeout_secs == 0 || service.timeout_secs > 300 {
        return Err(ConfigError::Validation(format!(
            "{section}.timeout_secs must be in range 1..=300"
        )));
    }
    Ok(())
}

fn validate_resolution(resolution: &ResolutionConfig) -> Result<(), ConfigError> {
    if resolution.acceptance_threshold > 100 || resolution.min_margin > 100 {
        return Err(ConfigError::Validation(
            "resolution.acceptance_threshold and resolution.min_margin must be in range 0..=100"
                .to_string(),
        ));
    }
    if resolution.max_candidates == 0 || resolution.search_limit == 0 {
        return Err(ConfigError::Validation(
            "resolution.max_candidates and resolution.search_limit must be greater than zero"
                .to_string(),
        ));
    }
    Ok(())
}

fn validate_pricing(pricing: &PricingConfig) -> Result<(), ConfigError> {
    let floor = Decimal::from(-100);
    let margins = [pricing.catalog_margin_pct, pricing.supplier_margin_pct]
        .into_iter()
        .chain(pricing.tier_margins.values().copied());
    for margin in margins {
        if margin <= floor {
            return Err(ConfigError::Validation(
                "pricing margins must be greater than -100 percent".to_string(),
            ));
        }
    }
    if pricing.stale_after_days == 0 {
        return Err(ConfigError::Validation(
            "pricing.stale_after_days must be greater than zero".to_string(),
        ));
    }
    Ok(())
}

fn validate_logging(logging: &LoggingConfig) -> Result<(), ConfigError> {
    let level = logging.level.trim().to_ascii_lowercase();
    match level.as_str() {
        "trace" | "debug" | "info" | "warn" | "error" => Ok(()),
        _ => Err(ConfigError::Validation(
            "logging.level must be one of trace|debug|info|warn|error".to_string(),
        )),
    }
}

fn read_env(key: &str) -> Option<String> {
    env::var(key).ok().filter(|value| !value.trim().is_empty())
}

fn invalid_override(key: &str, value: &str) -> ConfigError {
    ConfigError::InvalidEnvOverride { key: key.to_string(), value: value.to_string() }
}

fn parse_u8(key: &str, value: &str) -> Result<u8, ConfigError> {
    value.parse::<u8>().map_err(|_| invalid_override(key, value))
}

fn parse_u32(key: &str, value: &str) -> Result<u32, ConfigError> {
    value.parse::<u32>().map_err(|_| invalid_override(key, value))
}

fn parse_u64(key: &str, value: &str) -> Result<u64, ConfigError> {
    value.parse::<u64>().map_err(|_| invalid_override(key, value))
}

fn parse_decimal(key: &str, value: &str) -> Result<Decimal, ConfigError> {
    value.trim().parse::<Decimal>().map_err(|_| invalid_override(key, value))
}

fn percent(key: &str, value: f64) -> Result<Decimal, ConfigError> {
    Decimal::try_from(value)
        .map(|decimal| decimal.normalize())
        .map_err(|_| ConfigError::Validation(format!("{key} must be a finite percentage")))
}

#[derive(Debug, Default, Deserialize)]
struct ConfigPatch {
    database: Option<DatabasePatch>,
    llm: Option<LlmPatch>,
    registry: Option<ServiceLayerPatch>,
    catalog: Option<CatalogPatch>,
    resolution: Option<ResolutionPatch>,
    pricing: Option<PricingPatch>,
    logging: Option<LoggingPatch>,
}

#[derive(Debug, Default, Deserialize)]
struct DatabasePatch {
    url: Option<String>,
    max_connections: Option<u32>,
    timeout_secs: Option<u64>,
}

#[derive(Debug, Default, Deserialize)]
struct LlmPatch {
    provider: Option<LlmProvider>,
    api_key: Option<String>,
    base_url: Option<String>,
    model: Option<String>,
    timeout_secs: Option<u64>,
    max_retries: Option<u32>,
}

#[derive(Debug, Default, Deserialize)]
struct ServiceLayerPatch {
    base_url: Option<String>,
    company_db: Option<String>,
    username: Option<String>,
    password: Option<String>,
    timeout_secs: Option<u64>,
    session_margin_secs: Option<u64>,
}

impl ServiceLayerPatch {
    fn apply_to(self, service: &mut ServiceLayerConfig) {
        if let Some(base_url) = self.base_url {
            service.base_url = base_url;
        }
        if let Some(company_db) = self.company_db {
            service.company_db = company_db;
        }
        if let Some(username) = self.username {
            service.username = username;
        }
        if let Some(password) = self.password {
            service.password = secret_value(password);
        }
        if let Some(timeout_secs) = self.timeout_secs {
            service.timeout_secs = timeout_secs;
        }
        if let Some(session_margin_secs) = self.session_margin_secs {
            service.session_margin_secs = session_margin_secs;
        }
    }
}

#[derive(Debug, Default, Deserialize)]
struct CatalogPatch {
    #[serde(flatten)]
    service: ServiceLayerPatch,
    sales_price_list: Option<u32>,
    purchase_price_list: Option<u32>,
}

#[derive(Debug, Default, Deserialize)]
struct ResolutionPatch {
    acceptance_threshold: Option<u8>,
    min_margin: Option<u8>,
    max_candidates: Option<usize>,
    search_limit: Option<usize>,
    extra_denylist: Option<Vec<String>>,
    extra_placeholders: Option<Vec<String>>,
}

#[derive(Debug, Default, Deserialize)]
struct PricingPatch {
    catalog_margin_pct: Option<f64>,
    supplier_margin_pct: Option<f64>,
    tier_margins: Option<BTreeMap<String, f64>>,
    stale_after_days: Option<u32>,
}

#[derive(Debug, Default, Deserialize)]
struct LoggingPatch {
    level: Option<String>,
    format: Option<LogFormat>,
}
