//! Shared fakes for unit tests.

use crate::api::{ApiError, Connector, DirectoryEntry, Identity, WorkspaceClient};
use crate::auth::CredentialContext;
use crate::config::AppEnvironment;
use log::{Level, LevelFilter, Log, Metadata, Record};
use reqwest::StatusCode;
use std::collections::HashMap;
use std::sync::{Arc, Mutex};

/// `log::Log` sink that keeps every record as `"LEVEL target message"`.
pub struct CapturingLog {
    max_level: LevelFilter,
    lines: Mutex<Vec<String>>,
}

impl CapturingLog {
    pub fn new() -> Arc<Self> {
        Self::with_max_level(Level::Trace)
    }

    pub fn with_max_level(level: Level) -> Arc<Self> {
        Arc::new(CapturingLog {
            max_level: level.to_level_filter(),
            lines: Mutex::new(Vec::new()),
        })
    }

    pub fn lines(&self) -> Vec<String> {
        self.lines.lock().unwrap().clone()
    }

    pub fn contains(&self, needle: &str) -> bool {
        self.lines().iter().any(|l| l.contains(needle))
    }
}

impl Log for CapturingLog {
    fn enabled(&self, metadata: &Metadata<'_>) -> bool {
        metadata.level() <= self.max_level
    }

    fn log(&self, record: &Record<'_>) {
        self.lines.lock().unwrap().push(format!(
            "{} {} {}",
            record.level(),
            record.target(),
            record.args()
        ));
    }

    fn flush(&self) {}
}

pub fn env_of(pairs: &[(&str, &str)]) -> AppEnvironment {
    let map: HashMap<String, String> = pairs
        .iter()
        .map(|(k, v)| (k.to_string(), v.to_string()))
        .collect();
    AppEnvironment::from_lookup(|k| map.get(k).cloned())
}

pub fn unauthorized(operation: &'static str) -> ApiError {
    ApiError::Status {
        operation,
        status: StatusCode::UNAUTHORIZED,
        message: "invalid access token".to_string(),
    }
}

#[derive(Default)]
struct ConnectorState {
    tokens: HashMap<String, String>,
    clients: HashMap<(String, String), String>,
    refuse: bool,
    seen: Vec<CredentialContext>,
}

/// Connector that recognises a fixed set of credentials and remembers every
/// credential it was asked to connect with.
#[derive(Clone, Default)]
pub struct FakeConnector {
    state: Arc<Mutex<ConnectorState>>,
}

impl FakeConnector {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn accept_token(self, token: &str, user: &str) -> Self {
        self.state
            .lock()
            .unwrap()
            .tokens
            .insert(token.to_string(), user.to_string());
        self
    }

    pub fn accept_client(self, client_id: &str, secret: &str, user: &str) -> Self {
        self.state
            .lock()
            .unwrap()
            .clients
            .insert((client_id.to_string(), secret.to_string()), user.to_string());
        self
    }

    pub fn refuse_connections(self) -> Self {
        self.state.lock().unwrap().refuse = true;
        self
    }

    pub fn credentials(&self) -> Vec<CredentialContext> {
        self.state.lock().unwrap().seen.clone()
    }
}

impl Connector for FakeConnector {
    fn connect(&self, credential: &CredentialContext) -> Result<Box<dyn WorkspaceClient>, ApiError> {
        let mut state = self.state.lock().unwrap();
        state.seen.push(credential.clone());
        if state.refuse {
            return Err(ApiError::InvalidHost(credential.host().to_string()));
        }
        let user = match credential {
            CredentialContext::UserDelegatedToken { token, .. }
            | CredentialContext::StaticHostToken { token, .. } => {
                state.tokens.get(token.expose()).cloned()
            }
            CredentialContext::ServicePrincipalCredential {
                client_id,
                client_secret,
                ..
            } => state
                .clients
                .get(&(client_id.clone(), client_secret.expose().to_string()))
                .cloned(),
        };
        Ok(Box::new(ProbeOnlyClient { user }))
    }
}

/// Client whose probe succeeds only for recognised credentials.
struct ProbeOnlyClient {
    user: Option<String>,
}

impl WorkspaceClient for ProbeOnlyClient {
    fn current_user(&self) -> Result<Identity, ApiError> {
        self.user
            .as_deref()
            .map(Identity::named)
            .ok_or_else(|| unauthorized("who-am-i"))
    }

    fn list_directory(&self, _path: &str) -> Result<Vec<DirectoryEntry>, ApiError> {
        Ok(Vec::new())
    }

    fn upload(&self, _path: &str, _contents: &[u8], _overwrite: bool) -> Result<(), ApiError> {
        Ok(())
    }
}
