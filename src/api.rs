// API client module: the narrow capability the rest of the crate needs from
// a Databricks workspace (who-am-i, list a directory, upload a file) and a
// small blocking HTTP implementation of it over the REST API.
//
// The resolver and workflows only ever see `WorkspaceClient` and
// `Connector`, so tests swap in fakes without any network.

use crate::auth::{CredentialContext, Secret};
use reqwest::blocking::{Client, RequestBuilder, Response};
use reqwest::header::CONTENT_TYPE;
use reqwest::{StatusCode, Url};
use serde::Deserialize;
use std::sync::OnceLock;
use thiserror::Error;

const ME_ENDPOINT: &str = "api/2.0/preview/scim/v2/Me";
const DIRECTORIES_ENDPOINT: &str = "api/2.0/fs/directories";
const FILES_ENDPOINT: &str = "api/2.0/fs/files";
const TOKEN_ENDPOINT: &str = "oidc/v1/token";

/// Faults raised by a workspace client.
#[derive(Debug, Error)]
pub enum ApiError {
    #[error("invalid workspace host `{0}`")]
    InvalidHost(String),

    #[error("failed to build HTTP client: {0}")]
    Client(#[source] reqwest::Error),

    #[error("{operation} request failed: {source}")]
    Transport {
        operation: &'static str,
        #[source]
        source: reqwest::Error,
    },

    #[error("{operation} failed with status {status}: {message}")]
    Status {
        operation: &'static str,
        status: StatusCode,
        message: String,
    },

    #[error("failed to decode {operation} response: {source}")]
    Decode {
        operation: &'static str,
        #[source]
        source: reqwest::Error,
    },
}

/// Result of the who-am-i probe.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
pub struct Identity {
    #[serde(rename = "userName", default)]
    pub user_name: Option<String>,
    #[serde(rename = "displayName", default)]
    pub display_name: Option<String>,
    #[serde(default)]
    pub id: Option<String>,
}

impl Identity {
    pub fn named(user_name: &str) -> Self {
        Identity {
            user_name: Some(user_name.to_string()),
            ..Identity::default()
        }
    }

    /// Best human-readable name for log lines and the UI.
    pub fn name(&self) -> &str {
        self.user_name
            .as_deref()
            .or(self.display_name.as_deref())
            .or(self.id.as_deref())
            .unwrap_or("<unknown>")
    }
}

/// One raw entry from a directory listing, as the service returns it.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
pub struct DirectoryEntry {
    pub path: String,
    #[serde(default)]
    pub is_directory: Option<bool>,
    #[serde(default)]
    pub file_size: Option<u64>,
    #[serde(default)]
    pub last_modified: Option<i64>,
    #[serde(default)]
    pub name: Option<String>,
}

#[derive(Debug, Deserialize)]
struct DirectoryPage {
    #[serde(default)]
    contents: Vec<DirectoryEntry>,
    #[serde(default)]
    next_page_token: Option<String>,
}

#[derive(Debug, Deserialize)]
struct TokenResponse {
    access_token: String,
}

#[derive(Debug, Deserialize)]
struct ErrorBody {
    #[serde(default)]
    error_code: Option<String>,
    #[serde(default)]
    message: Option<String>,
}

/// Remote capability used by the workflows.
#[cfg_attr(test, mockall::automock)]
pub trait WorkspaceClient {
    /// Identity the client is authenticated as.
    fn current_user(&self) -> Result<Identity, ApiError>;

    /// Entries directly under `path`, in service order, all pages.
    fn list_directory(&self, path: &str) -> Result<Vec<DirectoryEntry>, ApiError>;

    /// Store `contents` at `path`.
    fn upload(&self, path: &str, contents: &[u8], overwrite: bool) -> Result<(), ApiError>;
}

/// Builds a client for a resolved credential.
pub trait Connector {
    fn connect(&self, credential: &CredentialContext) -> Result<Box<dyn WorkspaceClient>, ApiError>;
}

/// Connector producing `HttpWorkspaceClient`s.
#[derive(Debug, Clone, Default)]
pub struct HttpConnector;

impl Connector for HttpConnector {
    fn connect(&self, credential: &CredentialContext) -> Result<Box<dyn WorkspaceClient>, ApiError> {
        Ok(Box::new(HttpWorkspaceClient::new(credential)?))
    }
}

enum Authorizer {
    Bearer(Secret),
    /// OAuth machine-to-machine; the access token is fetched on first use
    /// and lives as long as the client.
    ClientCredentials {
        client_id: String,
        client_secret: Secret,
        access_token: OnceLock<Secret>,
    },
}

/// Blocking client for the workspace REST API.
pub struct HttpWorkspaceClient {
    client: Client,
    base_url: Url,
    auth: Authorizer,
}

impl HttpWorkspaceClient {
    pub fn new(credential: &CredentialContext) -> Result<Self, ApiError> {
        let base_url = normalize_host(credential.host())?;
        let client = Client::builder()
            .user_agent(concat!("volume-uploader/", env!("CARGO_PKG_VERSION")))
            .build()
            .map_err(ApiError::Client)?;
        let auth = match credential {
            CredentialContext::UserDelegatedToken { token, .. }
            | CredentialContext::StaticHostToken { token, .. } => Authorizer::Bearer(token.clone()),
            CredentialContext::ServicePrincipalCredential {
                client_id,
                client_secret,
                ..
            } => Authorizer::ClientCredentials {
                client_id: client_id.clone(),
                client_secret: client_secret.clone(),
                access_token: OnceLock::new(),
            },
        };
        Ok(HttpWorkspaceClient {
            client,
            base_url,
            auth,
        })
    }

    fn url(&self, endpoint: &str, remote_path: &str) -> Url {
        endpoint_url(&self.base_url, endpoint, remote_path)
    }

    fn bearer(&self) -> Result<&Secret, ApiError> {
        match &self.auth {
            Authorizer::Bearer(token) => Ok(token),
            Authorizer::ClientCredentials {
                client_id,
                client_secret,
                access_token,
            } => {
                if let Some(token) = access_token.get() {
                    return Ok(token);
                }
                let fetched = self.exchange_client_credentials(client_id, client_secret)?;
                Ok(access_token.get_or_init(|| fetched))
            }
        }
    }

    fn exchange_client_credentials(
        &self,
        client_id: &str,
        client_secret: &Secret,
    ) -> Result<Secret, ApiError> {
        let operation = "token exchange";
        let res = self
            .client
            .post(self.url(TOKEN_ENDPOINT, ""))
            .basic_auth(client_id, Some(client_secret.expose()))
            .form(&[("grant_type", "client_credentials"), ("scope", "all-apis")])
            .send()
            .map_err(|source| ApiError::Transport { operation, source })?;
        let body: TokenResponse = check(operation, res)?
            .json()
            .map_err(|source| ApiError::Decode { operation, source })?;
        Ok(Secret::new(body.access_token))
    }

    fn authorized(&self, req: RequestBuilder) -> Result<RequestBuilder, ApiError> {
        Ok(req.bearer_auth(self.bearer()?.expose()))
    }
}

impl WorkspaceClient for HttpWorkspaceClient {
    fn current_user(&self) -> Result<Identity, ApiError> {
        let operation = "who-am-i";
        let res = self
            .authorized(self.client.get(self.url(ME_ENDPOINT, "")))?
            .send()
            .map_err(|source| ApiError::Transport { operation, source })?;
        check(operation, res)?
            .json()
            .map_err(|source| ApiError::Decode { operation, source })
    }

    fn list_directory(&self, path: &str) -> Result<Vec<DirectoryEntry>, ApiError> {
        let operation = "list directory";
        let url = self.url(DIRECTORIES_ENDPOINT, path);
        let mut entries = Vec::new();
        let mut page_token: Option<String> = None;
        loop {
            let mut req = self.client.get(url.clone());
            if let Some(token) = &page_token {
                req = req.query(&[("page_token", token)]);
            }
            let res = self
                .authorized(req)?
                .send()
                .map_err(|source| ApiError::Transport { operation, source })?;
            let page: DirectoryPage = check(operation, res)?
                .json()
                .map_err(|source| ApiError::Decode { operation, source })?;
            entries.extend(page.contents);
            match page.next_page_token.filter(|t| !t.is_empty()) {
                Some(next) => page_token = Some(next),
                None => break,
            }
        }
        Ok(entries)
    }

    fn upload(&self, path: &str, contents: &[u8], overwrite: bool) -> Result<(), ApiError> {
        let operation = "upload";
        let req = self
            .client
            .put(self.url(FILES_ENDPOINT, path))
            .query(&[("overwrite", overwrite)])
            .header(CONTENT_TYPE, "application/octet-stream")
            .body(contents.to_vec());
        let res = self
            .authorized(req)?
            .send()
            .map_err(|source| ApiError::Transport { operation, source })?;
        check(operation, res)?;
        Ok(())
    }
}

/// Turn a non-2xx response into `ApiError::Status`, folding in the
/// service's `{error_code, message}` body when there is one.
fn check(operation: &'static str, res: Response) -> Result<Response, ApiError> {
    let status = res.status();
    if status.is_success() {
        return Ok(res);
    }
    let txt = res.text().unwrap_or_default();
    Err(ApiError::Status {
        operation,
        status,
        message: error_message(&txt),
    })
}

fn error_message(body: &str) -> String {
    match serde_json::from_str::<ErrorBody>(body) {
        Ok(ErrorBody {
            error_code: Some(code),
            message: Some(msg),
        }) => format!("{code}: {msg}"),
        Ok(ErrorBody {
            message: Some(msg), ..
        }) => msg,
        _ if body.trim().is_empty() => "<empty body>".to_string(),
        _ => body.trim().to_string(),
    }
}

/// Accept `host`, `host/`, `https://host` and friends.
pub fn normalize_host(host: &str) -> Result<Url, ApiError> {
    let trimmed = host.trim().trim_end_matches('/');
    if trimmed.is_empty() {
        return Err(ApiError::InvalidHost(host.to_string()));
    }
    let with_scheme = if trimmed.contains("://") {
        trimmed.to_string()
    } else {
        format!("https://{trimmed}")
    };
    let url = Url::parse(&with_scheme).map_err(|_| ApiError::InvalidHost(host.to_string()))?;
    if url.cannot_be_a_base() || url.host_str().is_none() {
        return Err(ApiError::InvalidHost(host.to_string()));
    }
    Ok(url)
}

/// `{base}/{endpoint}{remote_path}` with every segment percent-encoded.
pub fn endpoint_url(base: &Url, endpoint: &str, remote_path: &str) -> Url {
    let mut url = base.clone();
    if let Ok(mut segments) = url.path_segments_mut() {
        segments
            .pop_if_empty()
            .extend(endpoint.split('/').filter(|s| !s.is_empty()))
            .extend(remote_path.split('/').filter(|s| !s.is_empty()));
    }
    url
}
