use std::env;
use std::fs;
use std::path::Path;
use std::sync::{Mutex, OnceLock};

use chrono::Utc;
use mailquote_cli::commands::{analyze, correct, doctor, history, ingest, migrate, show};
use mailquote_core::ports::AnalysisStore;
use mailquote_core::{
    ActionType, AnalysisResult, DeliveryHints, ExtractedRequest, ItemCode, LineItem,
    LinePricing, LineResult, ProductCandidate, SourceId,
};
use mailquote_db::{connect, migrations, SqlAnalysisRepository};
use rust_decimal::Decimal;
use serde_json::Value;
use tempfile::TempDir;

const UNREACHABLE: &str = "http://127.0.0.1:9";

#[test]
fn migrate_returns_success_with_valid_env() {
    let vars = valid_env("sqlite::memory:");
    with_env(&borrowed(&vars), || {
        let result = migrate::run();
        assert_eq!(result.exit_code, 0, "expected successful migrate run");

        let payload = parse_payload(&result.output);
        assert_eq!(payload["command"], "migrate");
        assert_eq!(payload["status"], "ok");
    });
}

#[test]
fn migrate_returns_config_failure_without_erp_settings() {
    with_env(&[("MAILQUOTE_DATABASE_URL", "sqlite::memory:")], || {
        let result = migrate::run();
        assert_eq!(result.exit_code, 2, "expected config validation failure code");

        let payload = parse_payload(&result.output);
        assert_eq!(payload["status"], "error");
        assert_eq!(payload["error_class"], "config_validation");
    });
}

#[test]
fn ingested_document_is_not_analyzed_until_requested() {
    let dir = TempDir::new().expect("temp dir");
    let vars = valid_env(&database_url(dir.path()));
    let body = write_file(dir.path(), "mail.txt", "Bonjour,\nmerci de chiffrer la piece jointe.\n");
    let attachment = write_file(dir.path(), "table.txt", "A00002 x 500\n");

    with_env(&borrowed(&vars), || {
        let stored = ingest::run("mail-42", Some(&body), Some(&attachment));
        assert_eq!(stored.exit_code, 0, "ingest failed: {}", stored.output);
        let payload = parse_payload(&stored.output);
        assert_eq!(payload["data"]["source_id"], "mail-42");
        assert_eq!(payload["data"]["has_attachment"], true);

        let shown = show::run("mail-42", false);
        assert_eq!(shown.exit_code, 6);
        let payload = parse_payload(&shown.output);
        assert_eq!(payload["error_class"], "bad_request");
        assert_eq!(payload["data"]["retryable"], false);
    });
}

#[test]
fn ingest_rejects_missing_body_file() {
    let dir = TempDir::new().expect("temp dir");
    let missing = dir.path().join("absent.txt");

    let result = ingest::run("mail-1", Some(&missing), None);
    assert_eq!(result.exit_code, 6);

    let payload = parse_payload(&result.output);
    assert_eq!(payload["error_class"], "invalid_input");
    assert!(payload["message"].as_str().unwrap_or_default().contains("absent.txt"));
}

#[test]
fn analyze_surfaces_retryable_extraction_failure() {
    let dir = TempDir::new().expect("temp dir");
    let vars = valid_env(&database_url(dir.path()));
    let body = write_file(dir.path(), "mail.txt", "devis 500 A00002 pour Edge Communications");

    with_env(&borrowed(&vars), || {
        assert_eq!(ingest::run("mail-7", Some(&body), None).exit_code, 0);

        let result = analyze::run("mail-7", false);
        assert_eq!(result.exit_code, 7, "expected service failure: {}", result.output);

        let payload = parse_payload(&result.output);
        assert_eq!(payload["command"], "analyze");
        assert_eq!(payload["error_class"], "service_unavailable");
        assert_eq!(payload["data"]["step"], "extraction");
        assert_eq!(payload["data"]["retryable"], true);
    });
}

#[test]
fn corrections_change_the_effective_view_only() {
    let dir = TempDir::new().expect("temp dir");
    let url = database_url(dir.path());
    seed_analysis(&url, "mail-9");
    let vars = valid_env(&url);

    with_env(&borrowed(&vars), || {
        let corrected = correct::run(
            "mail-9",
            "line:0",
            &["quantity=250".to_string(), "unit_price=95.50".to_string()],
            "alice",
        );
        assert_eq!(corrected.exit_code, 0, "correct failed: {}", corrected.output);
        let payload = parse_payload(&corrected.output);
        assert_eq!(payload["data"]["lines"][0]["line"]["quantity"], "250");

        let raw = parse_payload(&show::run("mail-9", true).output);
        assert_eq!(raw["data"]["lines"][0]["line"]["quantity"], "500");

        let effective = parse_payload(&show::run("mail-9", false).output);
        assert_eq!(effective["data"]["lines"][0]["line"]["quantity"], "250");

        let trail = history::run("mail-9", Some(0));
        assert_eq!(trail.exit_code, 0);
        let payload = parse_payload(&trail.output);
        let entries = payload["data"].as_array().cloned().unwrap_or_default();
        assert_eq!(entries.len(), 1);
        assert_eq!(entries[0]["unit_price"], "95.50");
        assert_eq!(entries[0]["author"], "alice");
    });
}

#[test]
fn correct_rejects_unknown_fields_and_targets() {
    let dir = TempDir::new().expect("temp dir");
    let url = database_url(dir.path());
    seed_analysis(&url, "mail-9");
    let vars = valid_env(&url);

    with_env(&borrowed(&vars), || {
        let bad_target = correct::run("mail-9", "header", &["x=1".to_string()], "alice");
        assert_eq!(bad_target.exit_code, 6);
        assert_eq!(parse_payload(&bad_target.output)["error_class"], "invalid_input");

        let bad_field = correct::run("mail-9", "line:0", &["colour=red".to_string()], "alice");
        assert_eq!(bad_field.exit_code, 6);
        let payload = parse_payload(&bad_field.output);
        assert_eq!(payload["error_class"], "bad_request");
        assert!(payload["message"].as_str().unwrap_or_default().contains("colour"));
    });
}

#[test]
fn doctor_skips_backend_checks_when_config_is_invalid() {
    with_env(&[], || {
        let result = doctor::run(true);
        assert_eq!(result.exit_code, 1);

        let report = parse_payload(&result.output);
        assert_eq!(report["overall_status"], "fail");
        let checks = report["checks"].as_array().cloned().unwrap_or_default();
        assert_eq!(checks.len(), 5);
        assert_eq!(checks[0]["name"], "config_validation");
        assert!(checks[1..].iter().all(|check| check["status"] == "skipped"));
    });
}

fn seed_analysis(url: &str, source_id: &str) {
    let runtime = tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()
        .expect("runtime");
    runtime.block_on(async {
        let pool = connect(url).await.expect("connect");
        migrations::run_pending(&pool).await.expect("migrate");
        SqlAnalysisRepository::new(pool.clone())
            .store(&quote_analysis(source_id))
            .await
            .expect("store analysis");
        pool.close().await;
    });
}

fn quote_analysis(source_id: &str) -> AnalysisResult {
    let line = LineItem {
        reference_guess: Some("A00002".to_string()),
        description_guess: None,
        quantity: Decimal::from(500),
        unit: None,
        search_required: false,
    };
    let candidate = ProductCandidate {
        item_code: Some(ItemCode("A00002".to_string())),
        item_name: "Cable RJ45 Cat6".to_string(),
        quantity: Decimal::from(500),
        score: 100,
        match_reason: "exact item code".to_string(),
        not_found_in_sap: false,
    };
    AnalysisResult {
        source_id: SourceId(source_id.to_string()),
        classification: ActionType::Quote,
        confidence: 90,
        requires_user_choice: false,
        reasoning: vec!["classified as QUOTE".to_string()],
        request: ExtractedRequest {
            raw_text: "devis 500 A00002".to_string(),
            detected_action_type: ActionType::Quote,
            customer_name_guess: None,
            customer_email_guess: None,
            line_items: vec![line.clone()],
            delivery: DeliveryHints::default(),
            confidence: 90,
        },
        customer: None,
        lines: vec![LineResult {
            line_index: 0,
            line,
            candidates: vec![candidate.clone()],
            selected: Some(candidate),
            requires_user_choice: false,
            reason: "exact item code".to_string(),
            pricing: LinePricing::Unpriced {
                reason: "no price basis".to_string(),
                retryable: false,
            },
            priced_item: None,
            priced_customer: None,
            corrected_fields: Vec::new(),
        }],
        dropped_lines: Vec::new(),
        delivery: DeliveryHints::default(),
        analyzed_at: Utc::now(),
        priced_at: None,
    }
}

fn valid_env(database_url: &str) -> Vec<(&'static str, String)> {
    vec![
        ("MAILQUOTE_DATABASE_URL", database_url.to_string()),
        ("MAILQUOTE_LLM_PROVIDER", "ollama".to_string()),
        ("MAILQUOTE_LLM_BASE_URL", UNREACHABLE.to_string()),
        ("MAILQUOTE_LLM_MAX_RETRIES", "0".to_string()),
        ("MAILQUOTE_REGISTRY_BASE_URL", UNREACHABLE.to_string()),
        ("MAILQUOTE_REGISTRY_USERNAME", "manager".to_string()),
        ("MAILQUOTE_CATALOG_BASE_URL", UNREACHABLE.to_string()),
        ("MAILQUOTE_CATALOG_USERNAME", "manager".to_string()),
    ]
}

fn borrowed<'a>(vars: &'a [(&'static str, String)]) -> Vec<(&'static str, &'a str)> {
    vars.iter().map(|(key, value)| (*key, value.as_str())).collect()
}

fn database_url(dir: &Path) -> String {
    format!("sqlite://{}", dir.join("mailquote.db").display())
}

fn write_file(dir: &Path, name: &str, contents: &str) -> std::path::PathBuf {
    let path = dir.join(name);
    fs::write(&path, contents).expect("write fixture file");
    path
}

fn parse_payload(output: &str) -> Value {
    serde_json::from_str(output).expect("command output should be valid JSON")
}

fn with_env(vars: &[(&str, &str)], test_fn: impl FnOnce()) {
    static ENV_LOCK: OnceLock<Mutex<()>> = OnceLock::new();
    let _guard =
        ENV_LOCK.get_or_init(|| Mutex::new(())).lock().expect("env mutex should not be poisoned");

    let keys = [
        "MAILQUOTE_DATABASE_URL",
        "MAILQUOTE_DATABASE_MAX_CONNECTIONS",
        "MAILQUOTE_DATABASE_TIMEOUT_SECS",
        "MAILQUOTE_LLM_PROVIDER",
        "MAILQUOTE_LLM_API_KEY",
        "MAILQUOTE_LLM_BASE_URL",
        "MAILQUOTE_LLM_MODEL",
        "MAILQUOTE_LLM_TIMEOUT_SECS",
        "MAILQUOTE_LLM_MAX_RETRIES",
        "MAILQUOTE_REGISTRY_BASE_URL",
        "MAILQUOTE_REGISTRY_COMPANY_DB",
        "MAILQUOTE_REGISTRY_USERNAME",
        "MAILQUOTE_REGISTRY_PASSWORD",
        "MAILQUOTE_CATALOG_BASE_URL",
        "MAILQUOTE_CATALOG_COMPANY_DB",
        "MAILQUOTE_CATALOG_USERNAME",
        "MAILQUOTE_CATALOG_PASSWORD",
        "MAILQUOTE_LOGGING_LEVEL",
        "MAILQUOTE_LOGGING_FORMAT",
        "MAILQUOTE_LOG_LEVEL",
        "MAILQUOTE_LOG_FORMAT",
    ];

    let previous_values: Vec<(&str, Option<String>)> =
        keys.iter().map(|key| (*key, env::var(key).ok())).collect();

    for key in &keys {
        env::remove_var(key);
    }
    for (key, value) in vars {
        env::set_var(key, value);
    }

    test_fn();

    for (key, value) in previous_values {
        if let Some(value) = value {
            env::set_var(key, value);
        } else {
            env::remove_var(key);
        }
    }
}
