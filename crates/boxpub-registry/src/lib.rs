//! Box registry API client for boxpub.
//!
//! This crate wraps the handful of Vagrant Cloud style endpoints needed to
//! publish a box: create box, create version, create provider, look up the
//! upload target, upload the artifact, and release the version.
//!
//! Every "create" style call treats HTTP 422 as "already exists" so a publish
//! can be re-run against a registry that is already partially advanced.
//!
//! # Example
//!
//! ```no_run
//! use boxpub_registry::{NewBox, RegistryClient, DEFAULT_API_BASE};
//!
//! let client = RegistryClient::new(DEFAULT_API_BASE, "my-token").unwrap();
//!
//! let new_box = NewBox {
//!     owner: "broadinstitute",
//!     name: "ubuntu-test",
//!     is_private: false,
//!     short_description: None,
//! };
//! let outcome = client.create_box(&new_box).unwrap();
//! println!("create box: {outcome:?}");
//! ```

use std::fmt;
use std::fs::File;
use std::path::{Path, PathBuf};
use std::time::Duration;

use reqwest::Url;
use reqwest::blocking::{Body, Client, RequestBuilder, Response};
use reqwest::header::CONTENT_TYPE;
use serde::{Deserialize, Serialize};

/// Default API endpoint for Vagrant Cloud
pub const DEFAULT_API_BASE: &str = "https://app.vagrantup.com/api/v1";

/// Default user agent for API requests
pub const USER_AGENT: &str = concat!("boxpub/", env!("CARGO_PKG_VERSION"));

/// Field of the upload lookup response that carries the upload URL
pub const UPLOAD_PATH_FIELD: &str = "upload_path";

/// HTTP status the registry answers with when the entity already exists
pub const ALREADY_EXISTS_STATUS: u16 = 422;

const MAX_ERROR_BODY_CHARS: usize = 512;

/// Result of a registry call that passed the status policy.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ApiOutcome {
    /// 2xx: the registry applied the request
    Applied,
    /// 422: the entity was already there
    AlreadyExists,
}

/// Map an HTTP status onto the publish status policy.
///
/// `None` means the status is a failure the caller must surface.
pub fn classify_status(status: u16) -> Option<ApiOutcome> {
    match status {
        200..=299 => Some(ApiOutcome::Applied),
        ALREADY_EXISTS_STATUS => Some(ApiOutcome::AlreadyExists),
        _ => None,
    }
}

/// Errors raised by [`RegistryClient`].
#[derive(Debug, thiserror::Error)]
pub enum RegistryError {
    #[error("failed to build HTTP client")]
    Client(#[source] reqwest::Error),

    #[error("invalid registry API base {api_base:?}: {reason}")]
    ApiBase { api_base: String, reason: String },

    #[error("{operation} request failed")]
    Transport {
        operation: &'static str,
        #[source]
        source: reqwest::Error,
    },

    #[error("{operation} returned HTTP {status}: {body}")]
    Status {
        operation: &'static str,
        status: u16,
        body: String,
    },

    #[error("{operation} returned unexpected data: {reason}")]
    DataShape {
        operation: &'static str,
        reason: String,
    },

    #[error("failed to read artifact {}", path.display())]
    Artifact {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

impl RegistryError {
    /// HTTP status for [`RegistryError::Status`] errors.
    pub fn status(&self) -> Option<u16> {
        match self {
            RegistryError::Status { status, .. } => Some(*status),
            _ => None,
        }
    }

    pub fn is_data_shape(&self) -> bool {
        matches!(self, RegistryError::DataShape { .. })
    }
}

/// Single-use URL issued by the registry for depositing the box file.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct UploadTarget(String);

impl UploadTarget {
    pub fn new(url: impl Into<String>) -> Self {
        Self(url.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for UploadTarget {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Parse the body of the upload lookup response.
pub fn parse_upload_target(body: &str) -> Result<UploadTarget, RegistryError> {
    const OPERATION: &str = "upload target lookup";

    let value: serde_json::Value =
        serde_json::from_str(body).map_err(|err| RegistryError::DataShape {
            operation: OPERATION,
            reason: format!("response body is not JSON: {err}"),
        })?;

    match value.get(UPLOAD_PATH_FIELD) {
        Some(serde_json::Value::String(url)) if !url.trim().is_empty() => {
            Ok(UploadTarget::new(url.trim()))
        }
        Some(_) => Err(RegistryError::DataShape {
            operation: OPERATION,
            reason: format!("{UPLOAD_PATH_FIELD} is not a non-empty string"),
        }),
        None => Err(RegistryError::DataShape {
            operation: OPERATION,
            reason: format!("{UPLOAD_PATH_FIELD} does not exist in returned data"),
        }),
    }
}

/// Box metadata sent when creating a box.
#[derive(Debug, Clone, Copy)]
pub struct NewBox<'a> {
    pub owner: &'a str,
    pub name: &'a str,
    pub is_private: bool,
    pub short_description: Option<&'a str>,
}

#[derive(Serialize)]
struct CreateBoxRequest<'a> {
    #[serde(rename = "box")]
    box_data: BoxFields<'a>,
}

#[derive(Serialize)]
struct BoxFields<'a> {
    username: &'a str,
    name: &'a str,
    is_private: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    short_description: Option<&'a str>,
}

#[derive(Serialize)]
struct CreateVersionRequest<'a> {
    version: VersionFields<'a>,
}

#[derive(Serialize)]
struct VersionFields<'a> {
    version: &'a str,
    #[serde(skip_serializing_if = "Option::is_none")]
    description: Option<&'a str>,
}

#[derive(Serialize)]
struct CreateProviderRequest<'a> {
    provider: ProviderFields<'a>,
}

#[derive(Serialize)]
struct ProviderFields<'a> {
    name: &'a str,
}

#[derive(Debug, Deserialize)]
struct AuthenticateResponse {
    user: Option<AuthenticatedUser>,
}

#[derive(Debug, Deserialize)]
struct AuthenticatedUser {
    username: Option<String>,
}

/// Registry API client.
///
/// The bearer token is attached to every registry call, but never to the
/// upload itself: upload targets are pre-signed and may live on another host.
#[derive(Clone)]
pub struct RegistryClient {
    api_base: String,
    base: Url,
    token: String,
    http: Client,
}

impl fmt::Debug for RegistryClient {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RegistryClient")
            .field("api_base", &self.api_base)
            .field("token", &"<redacted>")
            .finish()
    }
}

impl RegistryClient {
    /// Create a client without a request timeout.
    pub fn new(api_base: &str, token: &str) -> Result<Self, RegistryError> {
        Self::with_timeout(api_base, token, None)
    }

    /// Create a client; `None` disables the overall request timeout.
    pub fn with_timeout(
        api_base: &str,
        token: &str,
        timeout: Option<Duration>,
    ) -> Result<Self, RegistryError> {
        let api_base = api_base.trim_end_matches('/');
        let base = Url::parse(api_base).map_err(|err| RegistryError::ApiBase {
            api_base: api_base.to_string(),
            reason: err.to_string(),
        })?;
        if base.cannot_be_a_base() {
            return Err(RegistryError::ApiBase {
                api_base: api_base.to_string(),
                reason: "URL cannot carry a path".to_string(),
            });
        }

        let http = Client::builder()
            .user_agent(USER_AGENT)
            .timeout(timeout)
            .build()
            .map_err(RegistryError::Client)?;

        Ok(Self {
            api_base: api_base.to_string(),
            base,
            token: token.to_string(),
            http,
        })
    }

    /// Get the base URL
    pub fn api_base(&self) -> &str {
        &self.api_base
    }

    /// Append path segments to the API base. Each segment is percent-encoded,
    /// so `?`, `#` and `/` inside a box name or version stay in the path.
    fn url(&self, segments: &[&str]) -> Url {
        let mut url = self.base.clone();
        if let Ok(mut path) = url.path_segments_mut() {
            path.pop_if_empty().extend(segments);
        }
        url
    }

    fn authorized(&self, request: RequestBuilder) -> RequestBuilder {
        request.bearer_auth(&self.token)
    }

    fn send(
        &self,
        operation: &'static str,
        request: RequestBuilder,
    ) -> Result<(ApiOutcome, Response), RegistryError> {
        let response = request
            .send()
            .map_err(|source| RegistryError::Transport { operation, source })?;

        let status = response.status().as_u16();
        match classify_status(status) {
            Some(outcome) => Ok((outcome, response)),
            None => Err(RegistryError::Status {
                operation,
                status,
                body: error_body(response),
            }),
        }
    }

    /// Validate the token. Returns the username when the registry reports one.
    pub fn authenticate(&self) -> Result<Option<String>, RegistryError> {
        const OPERATION: &str = "authenticate";

        let response = self
            .authorized(self.http.get(self.url(&["authenticate"])))
            .send()
            .map_err(|source| RegistryError::Transport {
                operation: OPERATION,
                source,
            })?;

        let status = response.status();
        if !status.is_success() {
            return Err(RegistryError::Status {
                operation: OPERATION,
                status: status.as_u16(),
                body: error_body(response),
            });
        }

        let body = response.text().unwrap_or_default();
        Ok(serde_json::from_str::<AuthenticateResponse>(&body)
            .ok()
            .and_then(|parsed| parsed.user)
            .and_then(|user| user.username))
    }

    /// POST `boxes`
    pub fn create_box(&self, new_box: &NewBox<'_>) -> Result<ApiOutcome, RegistryError> {
        let payload = CreateBoxRequest {
            box_data: BoxFields {
                username: new_box.owner,
                name: new_box.name,
                is_private: new_box.is_private,
                short_description: new_box.short_description,
            },
        };
        let request = self.authorized(self.http.post(self.url(&["boxes"])).json(&payload));
        self.send("create box", request).map(|(outcome, _)| outcome)
    }

    /// POST `box/{owner}/{name}/versions`
    pub fn create_version(
        &self,
        owner: &str,
        name: &str,
        version: &str,
        description: Option<&str>,
    ) -> Result<ApiOutcome, RegistryError> {
        let payload = CreateVersionRequest {
            version: VersionFields {
                version,
                description,
            },
        };
        let url = self.url(&["box", owner, name, "versions"]);
        let request = self.authorized(self.http.post(url).json(&payload));
        self.send("create version", request)
            .map(|(outcome, _)| outcome)
    }

    /// POST `box/{owner}/{name}/version/{version}/providers`
    pub fn create_provider(
        &self,
        owner: &str,
        name: &str,
        version: &str,
        provider: &str,
    ) -> Result<ApiOutcome, RegistryError> {
        let payload = CreateProviderRequest {
            provider: ProviderFields { name: provider },
        };
        let url = self.url(&["box", owner, name, "version", version, "providers"]);
        let request = self.authorized(self.http.post(url).json(&payload));
        self.send("create provider", request)
            .map(|(outcome, _)| outcome)
    }

    /// GET `box/{owner}/{name}/version/{version}/provider/{provider}/upload`
    pub fn upload_target(
        &self,
        owner: &str,
        name: &str,
        version: &str,
        provider: &str,
    ) -> Result<UploadTarget, RegistryError> {
        const OPERATION: &str = "upload target lookup";

        let url = self.url(&[
            "box", owner, name, "version", version, "provider", provider, "upload",
        ]);
        let request = self.authorized(self.http.get(url));
        let (_, response) = self.send(OPERATION, request)?;

        let body = response
            .text()
            .map_err(|source| RegistryError::Transport {
                operation: OPERATION,
                source,
            })?;
        parse_upload_target(&body)
    }

    /// PUT the artifact bytes to the upload target.
    ///
    /// The file handle lives only as long as the request. Returns the number
    /// of bytes sent.
    pub fn upload_artifact(
        &self,
        target: &UploadTarget,
        artifact: &Path,
    ) -> Result<u64, RegistryError> {
        let file = File::open(artifact).map_err(|source| RegistryError::Artifact {
            path: artifact.to_path_buf(),
            source,
        })?;
        let len = file
            .metadata()
            .map_err(|source| RegistryError::Artifact {
                path: artifact.to_path_buf(),
                source,
            })?
            .len();

        let request = self
            .http
            .put(target.as_str())
            .header(CONTENT_TYPE, "application/octet-stream")
            .body(Body::sized(file, len));
        self.send("artifact upload", request)?;

        Ok(len)
    }

    /// PUT `box/{owner}/{name}/version/{version}/release`
    pub fn release_version(
        &self,
        owner: &str,
        name: &str,
        version: &str,
    ) -> Result<ApiOutcome, RegistryError> {
        let url = self.url(&["box", owner, name, "version", version, "release"]);
        let request = self.authorized(self.http.put(url));
        self.send("release version", request)
            .map(|(outcome, _)| outcome)
    }
}

fn error_body(response: Response) -> String {
    let body = response.text().unwrap_or_default();
    let body = body.trim();
    if body.chars().count() > MAX_ERROR_BODY_CHARS {
        let truncated: String = body.chars().take(MAX_ERROR_BODY_CHARS).collect();
        format!("{truncated}...")
    } else {
        body.to_string()
    }
}
