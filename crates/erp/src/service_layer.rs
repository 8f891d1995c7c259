use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, NaiveDate, Utc};
use mailquote_core::config::ServiceLayerConfig;
use mailquote_core::ports::ExternalError;
use reqwest::header::COOKIE;
use reqwest::{Client, Response, StatusCode};
use secrecy::{ExposeSecret, SecretString};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::session::{Authenticator, SessionError, SessionGrant, SessionManager};

/// Lifetime assumed when the login response omits `SessionTimeout`.
const DEFAULT_SESSION_MINUTES: u64 = 30;

/// OData collection envelope.
#[derive(Debug, Deserialize)]
pub struct ODataList<T> {
    #[serde(default = "Vec::new")]
    pub value: Vec<T>,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum StatusClass {
    Success,
    Rejected,
    NotFound,
    Unavailable,
    Protocol,
}

pub fn classify_status(status: StatusCode) -> StatusClass {
    match status {
        StatusCode::UNAUTHORIZED => StatusClass::Rejected,
        StatusCode::NOT_FOUND => StatusClass::NotFound,
        StatusCode::TOO_MANY_REQUESTS | StatusCode::REQUEST_TIMEOUT => StatusClass::Unavailable,
        status if status.is_success() => StatusClass::Success,
        status if status.is_server_error() => StatusClass::Unavailable,
        _ => StatusClass::Protocol,
    }
}

/// Quotes a string as an OData literal, doubling embedded single quotes.
pub fn odata_literal(value: &str) -> String {
    format!("'{}'", value.replace('\'', "''"))
}

/// Path to one entity by key, e.g. `Items('A00002')`, with the key percent-encoded.
pub fn entity_path(entity_set: &str, key: &str) -> String {
    format!("{entity_set}({})", urlencoding::encode(&odata_literal(key)))
}

/// Parses the date forms the Service Layer emits (`2024-03-05` or RFC 3339).
pub fn parse_service_date(raw: &str) -> Option<DateTime<Utc>> {
    let raw = raw.trim();
    if let Ok(parsed) = DateTime::parse_from_rfc3339(raw) {
        return Some(parsed.with_timezone(&Utc));
    }
    let date = raw.get(..10)?;
    NaiveDate::parse_from_str(date, "%Y-%m-%d")
        .ok()
        .and_then(|date| date.and_hms_opt(0, 0, 0))
        .map(|naive| naive.and_utc())
}

#[derive(Serialize)]
struct LoginRequest<'a> {
    #[serde(rename = "CompanyDB")]
    company_db: &'a str,
    #[serde(rename = "UserName")]
    user_name: &'a str,
    #[serde(rename = "Password")]
    password: &'a str,
}

#[derive(Deserialize)]
struct LoginResponse {
    #[serde(rename = "SessionId")]
    session_id: String,
    #[serde(rename = "SessionTimeout", default)]
    session_timeout: Option<u64>,
}

struct ServiceLayerLogin {
    system: String,
    http: Client,
    login_url: String,
    company_db: String,
    username: String,
    password: SecretString,
    timeout_secs: u64,
}

#[async_trait]
impl Authenticator for ServiceLayerLogin {
    async fn login(&self) -> Result<SessionGrant, SessionError> {
        let body = LoginRequest {
            company_db: &self.company_db,
            user_name: &self.username,
            password: self.password.expose_secret(),
        };
        let response = self
            .http
            .post(&self.login_url)
            .json(&body)
            .send()
            .await
            .map_err(|error| transport_error(&self.system, self.timeout_secs, error))?;

        let status = response.status();
        match classify_status(status) {
            StatusClass::Success => {}
            StatusClass::Rejected => {
                return Err(SessionError::Rejected(format!("login returned {status}")))
            }
            StatusClass::Unavailable | StatusClass::NotFound => {
                return Err(SessionError::External(ExternalError::Unavailable {
                    system: self.system.clone(),
                    message: format!("login returned {status}"),
                }))
            }
            StatusClass::Protocol => {
                return Err(SessionError::Rejected(format!("login refused with {status}")))
            }
        }

        let login: LoginResponse = response.json().await.map_err(|error| {
            SessionError::External(ExternalError::Protocol {
                system: self.system.clone(),
                message: format!("failed to decode login response: {error}"),
            })
        })?;
        if login.session_id.trim().is_empty() {
            return Err(SessionError::External(ExternalError::Protocol {
                system: self.system.clone(),
                message: "login returned an empty session id".to_string(),
            }));
        }

        let minutes = login.session_timeout.unwrap_or(DEFAULT_SESSION_MINUTES);
        Ok(SessionGrant {
            session_id: login.session_id.into(),
            lifetime: Duration::from_secs(minutes.saturating_mul(60)),
        })
    }
}

/// HTTP transport for one Service Layer endpoint with its own session.
pub struct ServiceLayerClient {
    system: String,
    base_url: String,
    http: Client,
    timeout_secs: u64,
    sessions: SessionManager,
}

impl ServiceLayerClient {
    pub fn new(system: impl Into<String>, config: &ServiceLayerConfig) -> Result<Self, ExternalError> {
        let system = system.into();
        let http = Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()
            .map_err(|error| ExternalError::Unavailable {
                system: system.clone(),
                message: format!("failed to build http client: {error}"),
            })?;
        let base_url = config.base_url.trim_end_matches('/').to_string();

        let login = ServiceLayerLogin {
            system: system.clone(),
            http: http.clone(),
            login_url: format!("{base_url}/Login"),
            company_db: config.company_db.clone(),
            username: config.username.clone(),
            password: config.password.clone(),
            timeout_secs: config.timeout_secs,
        };
        let sessions = SessionManager::new(
            system.clone(),
            Arc::new(login),
            Duration::from_secs(config.session_margin_secs),
        );

        Ok(Self { system, base_url, http, timeout_secs: config.timeout_secs, sessions })
    }

    pub fn system(&self) -> &str {
        &self.system
    }

    /// Opens a session without querying anything.
    pub async fn ping(&self) -> Result<(), ExternalError> {
        self.sessions.session().await.map(|_| ())
    }

    /// `GET {base}/{path}` with the session cookie; `None` on 404.
    pub async fn get<T: DeserializeOwned>(
        &self,
        path: &str,
        query: &[(&str, String)],
    ) -> Result<Option<T>, ExternalError> {
        let url = format!("{}/{}", self.base_url, path.trim_start_matches('/'));
        let system = self.system.as_str();
        let timeout_secs = self.timeout_secs;

        debug!(event_name = "erp.query", system, path, "querying service layer");
        self.sessions
            .call(|session| {
                let request = self
                    .http
                    .get(&url)
                    .query(query)
                    .header(COOKIE, format!("B1SESSION={}", session.id()));
                async move {
                    let response = request
                        .send()
                        .await
                        .map_err(|error| transport_error(system, timeout_secs, error))?;
                    decode(system, response).await
                }
            })
            .await
    }

    /// Like [`get`](Self::get) for collections; 404 reads as empty.
    pub async fn list<T: DeserializeOwned>(
        &self,
        path: &str,
        query: &[(&str, String)],
    ) -> Result<Vec<T>, ExternalError> {
        Ok(self.get::<ODataList<T>>(path, query).await?.map(|list| list.value).unwrap_or_default())
    }
}

async fn decode<T: DeserializeOwned>(
    system: &str,
    response: Response,
) -> Result<Option<T>, SessionError> {
    let status = response.status();
    match classify_status(status) {
        StatusClass::Success => response.json::<T>().await.map(Some).map_err(|error| {
            SessionError::External(ExternalError::Protocol {
                system: system.to_string(),
                message: format!("failed to decode response: {error}"),
            })
        }),
        StatusClass::NotFound => Ok(None),
        StatusClass::Rejected => Err(SessionError::Rejected(format!("{system} returned {status}"))),
        StatusClass::Unavailable => Err(SessionError::External(ExternalError::Unavailable {
            system: system.to_string(),
            message: format!("returned {status}"),
        })),
        StatusClass::Protocol => Err(SessionError::External(ExternalError::Protocol {
            system: system.to_string(),
            message: format!("returned {status}"),
        })),
    }
}

fn transport_error(system: &str, timeout_secs: u64, error: reqwest::Error) -> SessionError {
    let error = if error.is_timeout() {
        ExternalError::Timeout { system: system.to_string(), timeout_secs }
    } else {
        ExternalError::Unavailable { system: system.to_string(), message: error.to_string() }
    };
    SessionError::External(error)
}

#[cfg(test)]
mod tests {
    use chrono::{Datelike, Timelike};
    use reqwest::StatusCode;

    use super::{
        classify_status, entity_path, odata_literal, parse_service_date, ODataList, StatusClass,
    };

    #[test]
    fn entity_keys_cannot_escape_the_path() {
        assert_eq!(entity_path("Items", "A00002"), "Items(%27A00002%27)");
        assert_eq!(entity_path("Items", "A/1#2?x=1"), "Items(%27A%2F1%232%3Fx%3D1%27)");
        assert_eq!(entity_path("BusinessPartners", "O'Neil"), "BusinessPartners(%27O%27%27Neil%27)");
    }

    #[test]
    fn odata_literals_double_single_quotes() {
        assert_eq!(odata_literal("C20000"), "'C20000'");
        assert_eq!(odata_literal("O'Neil & Co"), "'O''Neil & Co'");
    }

    #[test]
    fn statuses_map_to_session_outcomes() {
        assert_eq!(classify_status(StatusCode::OK), StatusClass::Success);
        assert_eq!(classify_status(StatusCode::UNAUTHORIZED), StatusClass::Rejected);
        assert_eq!(classify_status(StatusCode::NOT_FOUND), StatusClass::NotFound);
        assert_eq!(classify_status(StatusCode::BAD_GATEWAY), StatusClass::Unavailable);
        assert_eq!(classify_status(StatusCode::TOO_MANY_REQUESTS), StatusClass::Unavailable);
        assert_eq!(classify_status(StatusCode::BAD_REQUEST), StatusClass::Protocol);
    }

    #[test]
    fn service_dates_accept_plain_and_rfc3339_forms() {
        let plain = parse_service_date("2024-03-05");
        assert_eq!(plain.map(|date| (date.year(), date.month(), date.day())), Some((2024, 3, 5)));

        let full = parse_service_date("2024-03-05T10:30:00Z");
        assert_eq!(full.map(|date| date.hour()), Some(10));

        let local = parse_service_date("2024-03-05T00:00:00");
        assert_eq!(local.map(|date| date.day()), Some(5));

        assert!(parse_service_date("yesterday").is_none());
    }

    #[test]
    fn odata_envelope_tolerates_missing_value() {
        let parsed: Result<ODataList<serde_json::Value>, _> =
            serde_json::from_str(r#"{"odata.metadata": "x"}"#);
        assert_eq!(parsed.map(|list| list.value.len()).ok(), Some(0));
    }
}
