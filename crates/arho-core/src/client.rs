//! Client for the national planning-data API.
//!
//! Two surfaces are involved: the public API (plan validation, keyed with
//! a subscription header) and the X-Road service (plan matters, permanent
//! identifiers, file uploads, authenticated with a bearer token fetched
//! per run). Every remote call resolves to an [`ApiResponse`] so a batch
//! over many plans can keep going when one of them fails.

use chrono::{DateTime, Utc};
use reqwest::StatusCode;
use reqwest::header::{ACCEPT, ACCEPT_LANGUAGE, ETAG, HeaderMap, HeaderValue, LAST_MODIFIED};
use serde_json::{Value as JsonValue, json};
use thiserror::Error;
use uuid::Uuid;

use crate::wire::{WirePlan, WirePlanMatter};

const USER_AGENT: &str = "ARHO - Open source Ryhti compatible database";
const PUBLIC_API_KEY_HEADER: &str = "Ocp-Apim-Subscription-Key";
const XROAD_CLIENT_HEADER: &str = "X-Road-Client";
/// Fixed X-Road path of the service provider.
const XROAD_SERVICE_PATH: &str = "GOV/0996189-5/Ryhti-Syke-service/planService/api/";

pub const DEFAULT_PUBLIC_BASE_URL: &str = "https://api.ymparisto.fi/ryhti/plan-public/api/";
pub const DEFAULT_XROAD_PORT: u16 = 8080;

/// Connection settings for both API surfaces.
#[derive(Debug, Clone)]
pub struct ApiSettings {
    pub public_base_url: String,
    pub public_api_key: String,
    /// X-Road security server address, with or without a scheme.
    pub xroad_server_address: String,
    pub xroad_port: u16,
    pub xroad_instance: String,
    pub xroad_member_class: String,
    pub xroad_member_code: String,
    pub xroad_subsystem: String,
    /// API client id issued by the service operator.
    pub xroad_client_id: String,
    pub xroad_client_secret: String,
}

/// Errors from talking to the national API.
#[derive(Debug, Error)]
pub enum ClientError {
    #[error(transparent)]
    Http(#[from] reqwest::Error),
    #[error("authentication failed with status {status}: {body}")]
    Authentication { status: u16, body: String },
    #[error("plan type {0:?} maps to no plan matter endpoint")]
    UnknownPlanTypeCategory(String),
    #[error("document has no source URL")]
    MissingDocumentUrl,
}

/// Outcome of one remote operation on one plan.
#[derive(Debug, Clone, PartialEq)]
pub struct ApiResponse {
    /// HTTP status, when a response was received at all.
    pub status: Option<u16>,
    pub detail: Option<String>,
    pub errors: Option<JsonValue>,
    pub warnings: Option<JsonValue>,
}

impl ApiResponse {
    pub fn ok(status: u16, detail: impl Into<String>) -> Self {
        Self {
            status: Some(status),
            detail: Some(detail.into()),
            errors: None,
            warnings: None,
        }
    }

    /// Whether the operation went through.
    pub fn is_success(&self) -> bool {
        self.status
            .is_some_and(|s| StatusCode::from_u16(s).is_ok_and(|s| s.is_success()))
            && self.errors.is_none()
    }
}

impl From<ClientError> for ApiResponse {
    fn from(error: ClientError) -> Self {
        Self {
            status: None,
            detail: Some(error.to_string()),
            errors: None,
            warnings: None,
        }
    }
}

/// Outcome of a document file upload.
#[derive(Debug, Clone, PartialEq)]
pub enum UploadOutcome {
    /// The stored copy is already current; nothing was sent.
    Unchanged { etag: Option<String> },
    Uploaded {
        file_key: Uuid,
        etag: Option<String>,
    },
    Failed(ApiResponse),
}

/// The plan matter endpoint segment for a plan type code value. The first
/// digit of the value picks the plan category.
pub fn plan_matter_path(plan_type_value: &str) -> Result<&'static str, ClientError> {
    match plan_type_value.chars().next() {
        Some('1') => Ok("RegionalPlanMatter/"),
        Some('2') => Ok("LocalMasterPlanMatter/"),
        Some('3') => Ok("LocalDetailedPlanMatter/"),
        _ => Err(ClientError::UnknownPlanTypeCategory(
            plan_type_value.to_owned(),
        )),
    }
}

/// Base URL of the X-Road service through the configured security server.
fn xroad_base_url(settings: &ApiSettings) -> String {
    let address = &settings.xroad_server_address;
    let address = if address.starts_with("http://") || address.starts_with("https://") {
        address.clone()
    } else {
        format!("http://{address}")
    };
    format!(
        "{address}:{port}/r1/{instance}/{XROAD_SERVICE_PATH}",
        port = settings.xroad_port,
        instance = settings.xroad_instance,
    )
}

pub struct ApiClient {
    http: reqwest::Client,
    settings: ApiSettings,
    public_base: String,
    xroad_base: String,
    xroad_client: String,
    token: Option<String>,
}

impl ApiClient {
    pub fn new(settings: ApiSettings) -> Result<Self, ClientError> {
        let mut headers = HeaderMap::new();
        headers.insert(
            reqwest::header::USER_AGENT,
            HeaderValue::from_static(USER_AGENT),
        );
        headers.insert(ACCEPT, HeaderValue::from_static("application/json"));
        headers.insert(ACCEPT_LANGUAGE, HeaderValue::from_static("fi-FI"));
        let http = reqwest::Client::builder().default_headers(headers).build()?;

        let mut public_base = settings.public_base_url.clone();
        if !public_base.ends_with('/') {
            public_base.push('/');
        }
        let xroad_base = xroad_base_url(&settings);
        let xroad_client = format!(
            "{}/{}/{}/{}",
            settings.xroad_instance,
            settings.xroad_member_class,
            settings.xroad_member_code,
            settings.xroad_subsystem,
        );
        Ok(Self {
            http,
            settings,
            public_base,
            xroad_base,
            xroad_client,
            token: None,
        })
    }

    fn xroad_request(&self, request: reqwest::RequestBuilder) -> reqwest::RequestBuilder {
        let request = request.header(XROAD_CLIENT_HEADER, &self.xroad_client);
        match &self.token {
            Some(token) => request.bearer_auth(token),
            None => request,
        }
    }

    /// Fetch a bearer token for the X-Road surface. Must run before any
    /// plan matter or file operation.
    pub async fn authenticate(&mut self) -> Result<(), ClientError> {
        let url = format!("{}Authenticate", self.xroad_base);
        let response = self
            .xroad_request(self.http.post(&url))
            .query(&[("clientId", &self.settings.xroad_client_id)])
            // The token endpoint takes the secret as a bare JSON string.
            .json(&self.settings.xroad_client_secret)
            .send()
            .await?;
        let status = response.status();
        if !status.is_success() {
            return Err(ClientError::Authentication {
                status: status.as_u16(),
                body: response.text().await.unwrap_or_default(),
            });
        }
        let token: String = response.json().await?;
        self.token = Some(token);
        tracing::debug!("authenticated against the X-Road service");
        Ok(())
    }

    // -----------------------------------------------------------------------
    // Public API
    // -----------------------------------------------------------------------

    /// Validate a plan document against the public API.
    pub async fn validate_plan(
        &self,
        wire: &WirePlan,
        plan_type_value: &str,
        area_identifier: &str,
    ) -> Result<ApiResponse, ClientError> {
        let url = format!("{}Plan/validate", self.public_base);
        let response = self
            .http
            .post(&url)
            .header(PUBLIC_API_KEY_HEADER, &self.settings.public_api_key)
            .query(&[
                ("planType", plan_type_value),
                ("administrativeAreaIdentifiers", area_identifier),
            ])
            .json(wire)
            .send()
            .await?;
        let status = response.status();
        if status.is_success() {
            return Ok(ApiResponse::ok(status.as_u16(), "plan is valid"));
        }
        let errors = response.json().await.ok();
        Ok(ApiResponse {
            status: Some(status.as_u16()),
            detail: Some("plan failed validation".to_owned()),
            errors,
            warnings: None,
        })
    }

    // -----------------------------------------------------------------------
    // X-Road: plan matters
    // -----------------------------------------------------------------------

    /// Ask the registry to issue a permanent plan identifier.
    pub async fn get_permanent_plan_identifier(
        &self,
        plan_type_value: &str,
        area_identifier: &str,
        project_name: Option<&str>,
    ) -> Result<ApiResponse, ClientError> {
        let url = format!(
            "{}{}permanentPlanIdentifier",
            self.xroad_base,
            plan_matter_path(plan_type_value)?
        );
        let response = self
            .xroad_request(self.http.post(&url))
            .json(&json!({
                "administrativeAreaIdentifier": area_identifier,
                "projectName": project_name,
            }))
            .send()
            .await?;
        let status = response.status();
        match status.as_u16() {
            200 | 201 => {
                let identifier: String = response.json().await?;
                Ok(ApiResponse::ok(status.as_u16(), identifier))
            }
            401 => Ok(ApiResponse {
                status: Some(401),
                detail: Some(format!(
                    "no authority to create plans in area {area_identifier}"
                )),
                errors: response.json().await.ok(),
                warnings: None,
            }),
            _ => Ok(ApiResponse {
                status: Some(status.as_u16()),
                detail: Some("permanent plan identifier was not issued".to_owned()),
                errors: response.json().await.ok(),
                warnings: None,
            }),
        }
    }

    /// Validate a plan matter against the X-Road surface.
    pub async fn validate_plan_matter(
        &self,
        matter: &WirePlanMatter,
        permanent_identifier: &str,
        plan_type_value: &str,
    ) -> Result<ApiResponse, ClientError> {
        let url = format!(
            "{}{}{}/validate",
            self.xroad_base,
            plan_matter_path(plan_type_value)?,
            permanent_identifier,
        );
        let response = self
            .xroad_request(self.http.post(&url))
            .json(matter)
            .send()
            .await?;
        let status = response.status();
        if status.is_success() {
            return Ok(ApiResponse {
                status: Some(status.as_u16()),
                detail: Some("plan matter is valid".to_owned()),
                errors: None,
                warnings: response.json().await.ok(),
            });
        }
        Ok(ApiResponse {
            status: Some(status.as_u16()),
            detail: Some("plan matter failed validation".to_owned()),
            errors: response.json().await.ok(),
            warnings: None,
        })
    }

    /// Create or update a plan matter.
    ///
    /// A matter absent from the registry is created whole. For an existing
    /// matter the phase matching the current lifecycle status is updated
    /// in place, or a new phase is appended when the status moved on.
    pub async fn post_plan_matter(
        &self,
        matter: &WirePlanMatter,
        permanent_identifier: &str,
        plan_type_value: &str,
    ) -> Result<ApiResponse, ClientError> {
        let endpoint = format!(
            "{}{}{}",
            self.xroad_base,
            plan_matter_path(plan_type_value)?,
            permanent_identifier,
        );
        let existing = self.xroad_request(self.http.get(&endpoint)).send().await?;

        match existing.status() {
            StatusCode::NOT_FOUND => {
                let response = self
                    .xroad_request(self.http.post(&endpoint))
                    .json(matter)
                    .send()
                    .await?;
                let status = response.status();
                if status == StatusCode::CREATED {
                    return Ok(ApiResponse {
                        status: Some(status.as_u16()),
                        detail: Some("plan matter created".to_owned()),
                        errors: None,
                        warnings: response.json().await.ok(),
                    });
                }
                Ok(ApiResponse {
                    status: Some(status.as_u16()),
                    detail: Some("plan matter creation failed".to_owned()),
                    errors: response.json().await.ok(),
                    warnings: None,
                })
            }
            StatusCode::OK => {
                let body: JsonValue = existing.json().await?;
                let phase = &matter.plan_matter_phases[0];
                let existing_key = body
                    .get("planMatterPhases")
                    .and_then(JsonValue::as_array)
                    .into_iter()
                    .flatten()
                    .find(|p| {
                        p.get("lifeCycleStatus").and_then(JsonValue::as_str)
                            == Some(phase.life_cycle_status.as_str())
                    })
                    .and_then(|p| p.get("planMatterPhaseKey"))
                    .and_then(JsonValue::as_str)
                    .map(ToOwned::to_owned);

                let (request, action) = match &existing_key {
                    Some(key) => (
                        self.http.put(format!("{endpoint}/phase/{key}")),
                        "plan matter phase updated",
                    ),
                    None => (
                        self.http.post(format!(
                            "{endpoint}/phase/{}",
                            phase.plan_matter_phase_key
                        )),
                        "plan matter phase created",
                    ),
                };
                let response = self.xroad_request(request).json(phase).send().await?;
                let status = response.status();
                if status == StatusCode::OK || status == StatusCode::CREATED {
                    return Ok(ApiResponse {
                        status: Some(status.as_u16()),
                        detail: Some(action.to_owned()),
                        errors: None,
                        warnings: response.json().await.ok(),
                    });
                }
                Ok(ApiResponse {
                    status: Some(status.as_u16()),
                    detail: Some("plan matter phase update failed".to_owned()),
                    errors: response.json().await.ok(),
                    warnings: None,
                })
            }
            other => Ok(ApiResponse {
                status: Some(other.as_u16()),
                detail: Some("plan matter lookup failed".to_owned()),
                errors: existing.json().await.ok(),
                warnings: None,
            }),
        }
    }

    // -----------------------------------------------------------------------
    // X-Road: files
    // -----------------------------------------------------------------------

    /// Upload a document's source file to the national file store.
    ///
    /// The source is checked with a HEAD request first; a matching ETag or
    /// an unmodified source since the last export skips the transfer.
    pub async fn upload_document(
        &self,
        source_url: Option<&str>,
        stored_etag: Option<&str>,
        exported_at: Option<DateTime<Utc>>,
        area_query: (&str, &str),
    ) -> Result<UploadOutcome, ClientError> {
        let source_url = source_url.ok_or(ClientError::MissingDocumentUrl)?;

        let head = self.http.head(source_url).send().await?;
        let source_etag = header_string(head.headers(), ETAG);
        if let Some(etag) = &source_etag {
            if stored_etag == Some(etag.as_str()) {
                return Ok(UploadOutcome::Unchanged { etag: source_etag });
            }
        }
        if let Some(exported) = exported_at {
            if let Some(modified) = header_string(head.headers(), LAST_MODIFIED)
                .and_then(|v| DateTime::parse_from_rfc2822(&v).ok())
            {
                if exported > modified {
                    return Ok(UploadOutcome::Unchanged { etag: source_etag });
                }
            }
        }

        let source = self.http.get(source_url).send().await?;
        let file_name = source_url
            .rsplit('/')
            .next()
            .unwrap_or("document")
            .to_owned();
        let bytes = source.bytes().await?;
        let part = reqwest::multipart::Part::bytes(bytes.to_vec()).file_name(file_name);
        let form = reqwest::multipart::Form::new().part("file", part);

        let url = format!("{}File", self.xroad_base);
        let response = self
            .xroad_request(self.http.post(&url))
            .query(&[area_query])
            .multipart(form)
            .send()
            .await?;
        let status = response.status();
        if status == StatusCode::CREATED {
            let file_key: Uuid = response.json().await?;
            return Ok(UploadOutcome::Uploaded {
                file_key,
                etag: source_etag,
            });
        }
        Ok(UploadOutcome::Failed(ApiResponse {
            status: Some(status.as_u16()),
            detail: Some("file upload failed".to_owned()),
            errors: response.json().await.ok(),
            warnings: None,
        }))
    }
}

fn header_string(headers: &HeaderMap, name: reqwest::header::HeaderName) -> Option<String> {
    headers
        .get(name)
        .and_then(|v| v.to_str().ok())
        .map(ToOwned::to_owned)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn settings() -> ApiSettings {
        ApiSettings {
            public_base_url: DEFAULT_PUBLIC_BASE_URL.to_owned(),
            public_api_key: "key".to_owned(),
            xroad_server_address: "ss1.example.fi".to_owned(),
            xroad_port: DEFAULT_XROAD_PORT,
            xroad_instance: "FI-TEST".to_owned(),
            xroad_member_class: "MUN".to_owned(),
            xroad_member_code: "0000000-0".to_owned(),
            xroad_subsystem: "arho".to_owned(),
            xroad_client_id: "client".to_owned(),
            xroad_client_secret: "secret".to_owned(),
        }
    }

    #[test]
    fn matter_path_follows_plan_category() {
        assert_eq!(plan_matter_path("11").unwrap(), "RegionalPlanMatter/");
        assert_eq!(plan_matter_path("21").unwrap(), "LocalMasterPlanMatter/");
        assert_eq!(plan_matter_path("31").unwrap(), "LocalDetailedPlanMatter/");
        assert!(matches!(
            plan_matter_path("9"),
            Err(ClientError::UnknownPlanTypeCategory(_))
        ));
    }

    #[test]
    fn xroad_base_gets_scheme_port_and_instance() {
        assert_eq!(
            xroad_base_url(&settings()),
            "http://ss1.example.fi:8080/r1/FI-TEST/GOV/0996189-5/Ryhti-Syke-service/planService/api/"
        );
        let mut with_scheme = settings();
        with_scheme.xroad_server_address = "https://ss1.example.fi".to_owned();
        assert!(xroad_base_url(&with_scheme).starts_with("https://ss1.example.fi:8080/r1/"));
    }

    #[test]
    fn client_header_joins_member_parts() {
        let client = ApiClient::new(settings()).unwrap();
        assert_eq!(client.xroad_client, "FI-TEST/MUN/0000000-0/arho");
        assert!(client.public_base.ends_with('/'));
    }

    #[test]
    fn success_requires_clean_error_slot() {
        let ok = ApiResponse::ok(200, "fine");
        assert!(ok.is_success());
        let failed = ApiResponse {
            status: Some(400),
            detail: None,
            errors: None,
            warnings: None,
        };
        assert!(!failed.is_success());
        let with_errors = ApiResponse {
            status: Some(200),
            detail: None,
            errors: Some(json!({"field": "bad"})),
            warnings: None,
        };
        assert!(!with_errors.is_success());
    }
}
