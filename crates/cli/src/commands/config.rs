use std::env;
use std::fs;
use std::path::{Path, PathBuf};

use mailquote_core::config::{AppConfig, LoadOptions, ServiceLayerConfig};
use secrecy::ExposeSecret;
use toml::Value;

struct Field {
    key: String,
    value: String,
    env_key: Option<String>,
}

impl Field {
    fn new(key: &str, value: impl ToString, env_key: Option<&str>) -> Self {
        Self { key: key.to_string(), value: value.to_string(), env_key: env_key.map(str::to_string) }
    }
}

pub fn run() -> String {
    let config = match AppConfig::load(LoadOptions::default()) {
        Ok(config) => config,
        Err(error) => return format!("config validation failed: {error}"),
    };

    let config_file_path = detect_config_path();
    let config_file_doc = load_config_file_doc(config_file_path.as_deref());

    let mut lines = vec!["effective config (source precedence: env > file > default):".to_string()];
    for field in effective_fields(&config) {
        let source = field_source(
            &field.key,
            field.env_key.as_deref(),
            config_file_doc.as_ref(),
            config_file_path.as_deref(),
        );
        lines.push(render_line(&field.key, &field.value, source));
    }
    lines.join("\n")
}

fn effective_fields(config: &AppConfig) -> Vec<Field> {
    let mut fields = vec![
        Field::new("database.url", &config.database.url, Some("MAILQUOTE_DATABASE_URL")),
        Field::new(
            "database.max_connections",
            config.database.max_connections,
            Some("MAILQUOTE_DATABASE_MAX_CONNECTIONS"),
        ),
        Field::new(
            "database.timeout_secs",
            config.database.timeout_secs,
            Some("MAILQUOTE_DATABASE_TIMEOUT_SECS"),
        ),
        Field::new(
            "llm.provider",
            format!("{:?}", config.llm.provider),
            Some("MAILQUOTE_LLM_PROVIDER"),
        ),
        Field::new("llm.model", &config.llm.model, Some("MAILQUOTE_LLM_MODEL")),
        Field::new(
            "llm.base_url",
            config.llm.base_url.as_deref().unwrap_or("<unset>"),
            Some("MAILQUOTE_LLM_BASE_URL"),
        ),
        Field::new(
            "llm.api_key",
            if config.llm.api_key.is_some() { "<redacted>" } else { "<unset>" },
            Some("MAILQUOTE_LLM_API_KEY"),
        ),
        Field::new("llm.timeout_secs", config.llm.timeout_secs, Some("MAILQUOTE_LLM_TIMEOUT_SECS")),
        Field::new("llm.max_retries", config.llm.max_retries, Some("MAILQUOTE_LLM_MAX_RETRIES")),
    ];

    service_fields(&mut fields, "registry", "MAILQUOTE_REGISTRY", &config.registry);
    service_fields(&mut fields, "catalog", "MAILQUOTE_CATALOG", &config.catalog.service);
    fields.extend([
        Field::new(
            "catalog.sales_price_list",
            config.catalog.sales_price_list,
            Some("MAILQUOTE_CATALOG_SALES_PRICE_LIST"),
        ),
        Field::new(
            "catalog.purchase_price_list",
            config.catalog.purchase_price_list,
            Some("MAILQUOTE_CATALOG_PURCHASE_PRICE_LIST"),
        ),
        Field::new(
            "resolution.acceptance_threshold",
            config.resolution.acceptance_threshold,
            Some("MAILQUOTE_RESOLUTION_ACCEPTANCE_THRESHOLD"),
        ),
        Field::new(
            "resolution.min_margin",
            config.resolution.min_margin,
            Some("MAILQUOTE_RESOLUTION_MIN_MARGIN"),
        ),
        Field::new("resolution.max_candidates", config.resolution.max_candidates, None),
        Field::new("resolution.search_limit", config.resolution.search_limit, None),
        Field::new(
            "pricing.catalog_margin_pct",
            config.pricing.catalog_margin_pct,
            Some("MAILQUOTE_PRICING_CATALOG_MARGIN_PCT"),
        ),
        Field::new(
            "pricing.supplier_margin_pct",
            config.pricing.supplier_margin_pct,
            Some("MAILQUOTE_PRICING_SUPPLIER_MARGIN_PCT"),
        ),
        Field::new(
            "pricing.tier_margins",
            format!("{} tier(s)", config.pricing.tier_margins.len()),
            None,
        ),
        Field::new(
            "pricing.stale_after_days",
            config.pricing.stale_after_days,
            Some("MAILQUOTE_PRICING_STALE_AFTER_DAYS"),
        ),
        Field::new("logging.level", &config.logging.level, Some("MAILQUOTE_LOGGING_LEVEL")),
        Field::new(
            "logging.format",
            format!("{:?}", config.logging.format),
            Some("MAILQUOTE_LOGGING_FORMAT"),
        ),
    ]);
    fields
}

fn service_fields(
    fields: &mut Vec<Field>,
    section: &str,
    env_prefix: &str,
    service: &ServiceLayerConfig,
) {
    let values = [
        ("base_url", service.base_url.clone()),
        ("company_db", service.company_db.clone()),
        ("username", service.username.clone()),
        ("password", redact_secret(service.password.expose_secret())),
        ("timeout_secs", service.timeout_secs.to_string()),
        ("session_margin_secs", service.session_margin_secs.to_string()),
    ];
    for (name, value) in values {
        let env_key = format!("{env_prefix}_{}", name.to_ascii_uppercase());
        fields.push(Field {
            key: format!("{section}.{name}"),
            value,
            env_key: Some(env_key),
        });
    }
}

fn detect_config_path() -> Option<PathBuf> {
    let root = PathBuf::from("mailquote.toml");
    if root.exists() {
        return Some(root);
    }

    let nested = PathBuf::from("config/mailquote.toml");
    if nested.exists() {
        return Some(nested);
    }

    None
}

fn load_config_file_doc(path: Option<&Path>) -> Option<Value> {
    let path = path?;
    let raw = fs::read_to_string(path).ok()?;
    raw.parse::<Value>().ok()
}

fn field_source(
    key_path: &str,
    env_key: Option<&str>,
    config_file_doc: Option<&Value>,
    config_file_path: Option<&Path>,
) -> String {
    if let Some(env_key) = env_key {
        if env::var_os(env_key).is_some() {
            return format!("env ({env_key})");
        }
    }

    if let Some(doc) = config_file_doc {
        if contains_path(doc, key_path) {
            let file_path = config_file_path
                .map(|path| path.display().to_string())
                .unwrap_or_else(|| "config file".to_string());
            return format!("file ({file_path})");
        }
    }

    "default".to_string()
}

fn contains_path(root: &Value, key_path: &str) -> bool {
    let mut current = root;
    for key in key_path.split('.') {
        let Some(next) = current.get(key) else {
            return false;
        };
        current = next;
    }
    true
}

fn render_line(key: &str, value: &str, source: String) -> String {
    format!("- {key} = {value} (source: {source})")
}

fn redact_secret(secret: &str) -> String {
    if secret.trim().is_empty() {
        "<empty>".to_string()
    } else {
        "<redacted>".to_string()
    }
}
