// Credential resolution.
//
// `ClientFactory::resolve_client` decides which identity a request acts as
// and hands back a probed, ready-to-use `WorkspaceHandle`:
//
//   hosted app: forwarded user token (on-behalf-of-user), then the app's
//               service principal
//   local:      host + personal access token supplied by the user
//
// Credentials are built per call and dropped with the handle. Secret values
// are wrapped in `Secret` so formatting them never prints the value.

use crate::api::{Connector, Identity, WorkspaceClient};
use crate::config::{forwarded_token, AppEnvironment, ExecutionMode};
use crate::logging::Logger;
use reqwest::header::HeaderMap;
use std::fmt;
use thiserror::Error;

/// A credential value that refuses to be printed.
#[derive(Clone, PartialEq, Eq)]
pub struct Secret(String);

impl Secret {
    pub fn new(value: impl Into<String>) -> Self {
        Secret(value.into())
    }

    /// The raw value. Only for putting on the wire.
    pub fn expose(&self) -> &str {
        &self.0
    }
}

impl fmt::Debug for Secret {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("Secret(***)")
    }
}

impl fmt::Display for Secret {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("***")
    }
}

/// How a client authenticates against the workspace.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CredentialContext {
    /// Token forwarded by the app proxy on behalf of the signed-in user.
    UserDelegatedToken { host: String, token: Secret },
    /// The app's own service principal (OAuth client credentials).
    ServicePrincipalCredential {
        host: String,
        client_id: String,
        client_secret: Secret,
    },
    /// Host and personal access token typed in by the user.
    StaticHostToken { host: String, token: Secret },
}

impl CredentialContext {
    pub fn host(&self) -> &str {
        match self {
            CredentialContext::UserDelegatedToken { host, .. }
            | CredentialContext::ServicePrincipalCredential { host, .. }
            | CredentialContext::StaticHostToken { host, .. } => host,
        }
    }

    pub fn kind(&self) -> CredentialKind {
        match self {
            CredentialContext::UserDelegatedToken { .. } => CredentialKind::UserDelegated,
            CredentialContext::ServicePrincipalCredential { .. } => CredentialKind::ServicePrincipal,
            CredentialContext::StaticHostToken { .. } => CredentialKind::StaticToken,
        }
    }
}

/// Which strategy produced a handle. Carries no secret material.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CredentialKind {
    UserDelegated,
    ServicePrincipal,
    StaticToken,
}

impl fmt::Display for CredentialKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            CredentialKind::UserDelegated => "on-behalf-of-user",
            CredentialKind::ServicePrincipal => "app service principal",
            CredentialKind::StaticToken => "personal access token",
        };
        f.write_str(label)
    }
}

/// Terminal resolution failures.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum AuthError {
    #[error("App authentication configuration is incomplete. Please contact the administrator.")]
    IncompleteServiceConfig,

    #[error("App authentication failed: {0}")]
    ServiceAuthFailed(String),

    #[error("Databricks host and token are required when running locally")]
    MissingLocalCredentials,

    #[error("Authentication failed with provided credentials: {0}")]
    LocalAuthFailed(String),

    #[error("Error creating workspace client: {0}")]
    ClientConstructionFailed(String),
}

/// An authenticated client plus who it is authenticated as.
pub struct WorkspaceHandle {
    client: Box<dyn WorkspaceClient>,
    identity: Identity,
    kind: CredentialKind,
}

impl WorkspaceHandle {
    pub fn new(client: Box<dyn WorkspaceClient>, identity: Identity, kind: CredentialKind) -> Self {
        WorkspaceHandle {
            client,
            identity,
            kind,
        }
    }

    pub fn client(&self) -> &dyn WorkspaceClient {
        self.client.as_ref()
    }

    pub fn identity(&self) -> &Identity {
        &self.identity
    }

    pub fn kind(&self) -> CredentialKind {
        self.kind
    }
}

impl fmt::Debug for WorkspaceHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("WorkspaceHandle")
            .field("identity", &self.identity.name())
            .field("kind", &self.kind)
            .finish_non_exhaustive()
    }
}

/// Resolves credentials and builds probed handles.
pub struct ClientFactory<C> {
    connector: C,
    logger: Logger,
}

impl<C: Connector> ClientFactory<C> {
    pub fn new(connector: C, logger: &Logger) -> Self {
        ClientFactory {
            connector,
            logger: logger.scoped("volume_uploader::auth"),
        }
    }

    pub fn resolve_client(
        &self,
        mode: ExecutionMode,
        headers: &HeaderMap,
        env: &AppEnvironment,
    ) -> Result<WorkspaceHandle, AuthError> {
        self.logger.debug(format_args!("Initializing workspace client ({mode:?} mode)"));
        match mode {
            ExecutionMode::HostedApp => self.resolve_hosted(headers, env),
            ExecutionMode::Local => self.resolve_local(env),
        }
    }

    fn resolve_hosted(
        &self,
        headers: &HeaderMap,
        env: &AppEnvironment,
    ) -> Result<WorkspaceHandle, AuthError> {
        if let Some(token) = forwarded_token(headers) {
            self.logger.info(format_args!(
                "Creating workspace client with user access token (on-behalf-of-user)"
            ));
            match self.connect_and_probe(&user_credential(token, env)) {
                Ok(handle) => {
                    self.logger.info(format_args!(
                        "Successfully authenticated as {} using on-behalf-of-user",
                        handle.identity().name()
                    ));
                    return Ok(handle);
                }
                Err(reason) => {
                    self.logger.error(format_args!(
                        "On-behalf-of-user authentication failed: {reason}"
                    ));
                    self.logger.info(format_args!("Falling back to app authentication"));
                }
            }
        }

        self.logger.info(format_args!("Creating workspace client with app authentication"));
        let (Some(host), Some(client_id), Some(client_secret)) =
            (&env.host, &env.client_id, &env.client_secret)
        else {
            self.logger.error(format_args!(
                "Missing app authentication environment variables"
            ));
            return Err(AuthError::IncompleteServiceConfig);
        };
        let credential = CredentialContext::ServicePrincipalCredential {
            host: host.clone(),
            client_id: client_id.clone(),
            client_secret: Secret::new(client_secret.as_str()),
        };
        let client = self.connect(&credential)?;
        match client.current_user() {
            Ok(identity) => {
                self.logger.info(format_args!(
                    "Successfully authenticated as app service principal: {}",
                    identity.name()
                ));
                Ok(WorkspaceHandle::new(client, identity, credential.kind()))
            }
            Err(e) => {
                self.logger.error(format_args!("App authentication failed: {e}"));
                Err(AuthError::ServiceAuthFailed(e.to_string()))
            }
        }
    }

    fn resolve_local(&self, env: &AppEnvironment) -> Result<WorkspaceHandle, AuthError> {
        let host = env.host.as_deref().map(str::trim).unwrap_or_default();
        let token = env.token.as_deref().map(str::trim).unwrap_or_default();
        if host.is_empty() || token.is_empty() {
            self.logger.error(format_args!(
                "Databricks host and token are required when running locally"
            ));
            return Err(AuthError::MissingLocalCredentials);
        }

        self.logger.info(format_args!("Creating workspace client with provided host: {host}"));
        let credential = CredentialContext::StaticHostToken {
            host: host.to_string(),
            token: Secret::new(token),
        };
        let client = self.connect(&credential)?;
        match client.current_user() {
            Ok(identity) => {
                self.logger.info(format_args!(
                    "Successfully authenticated as {}",
                    identity.name()
                ));
                Ok(WorkspaceHandle::new(client, identity, credential.kind()))
            }
            Err(e) => {
                self.logger.error(format_args!(
                    "Authentication failed with provided credentials: {e}"
                ));
                Err(AuthError::LocalAuthFailed(e.to_string()))
            }
        }
    }

    fn connect(&self, credential: &CredentialContext) -> Result<Box<dyn WorkspaceClient>, AuthError> {
        self.connector.connect(credential).map_err(|e| {
            self.logger.error(format_args!("Error creating workspace client: {e}"));
            AuthError::ClientConstructionFailed(e.to_string())
        })
    }

    /// Check the forwarded user token on its own, without falling back.
    /// `None` when no token was forwarded.
    pub fn verify_forwarded_user(
        &self,
        headers: &HeaderMap,
        env: &AppEnvironment,
    ) -> Option<Result<Identity, String>> {
        let token = forwarded_token(headers)?;
        let verified = self
            .connect_and_probe(&user_credential(token, env))
            .map(|handle| handle.identity().clone());
        if let Err(reason) = &verified {
            self.logger.warn(format_args!("Could not verify user identity: {reason}"));
        }
        Some(verified)
    }

    /// Used on the on-behalf-of-user path, where both failures fall through.
    fn connect_and_probe(&self, credential: &CredentialContext) -> Result<WorkspaceHandle, String> {
        let client = self.connector.connect(credential).map_err(|e| e.to_string())?;
        let identity = client.current_user().map_err(|e| e.to_string())?;
        Ok(WorkspaceHandle::new(client, identity, credential.kind()))
    }
}

/// Only the forwarded token and the host: nothing else from the environment
/// may leak into this credential.
fn user_credential(token: &str, env: &AppEnvironment) -> CredentialContext {
    CredentialContext::UserDelegatedToken {
        host: env.host.clone().unwrap_or_default(),
        token: Secret::new(token),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{CLIENT_ID_VAR, CLIENT_SECRET_VAR, FORWARDED_TOKEN_HEADER, HOST_VAR, TOKEN_VAR};
    use crate::test_support::{env_of, CapturingLog, FakeConnector};
    use reqwest::header::HeaderValue;

    const HOST: &str = "https://example.cloud.databricks.com";
    const USER_TOKEN: &str = "user-obo-token-123";
    const SP_SECRET: &str = "sp-secret-456";
    const PAT: &str = "dapi-local-789";

    fn forwarded(token: &str) -> HeaderMap {
        let mut headers = HeaderMap::new();
        headers.insert(FORWARDED_TOKEN_HEADER, HeaderValue::from_str(token).unwrap());
        headers
    }

    fn full_app_env() -> AppEnvironment {
        env_of(&[
            ("DATABRICKS_APP_NAME", "uploader"),
            (HOST_VAR, HOST),
            (CLIENT_ID_VAR, "sp-client-id"),
            (CLIENT_SECRET_VAR, SP_SECRET),
        ])
    }

    fn assert_no_secrets(sink: &CapturingLog) {
        for line in sink.lines() {
            for secret in [USER_TOKEN, SP_SECRET, PAT] {
                assert!(!line.contains(secret), "secret leaked into log: {line}");
            }
        }
    }

    #[test]
    fn forwarded_token_authenticates_as_user_only() {
        let sink = CapturingLog::new();
        let connector = FakeConnector::new().accept_token(USER_TOKEN, "alice@example.com");
        let factory = ClientFactory::new(connector.clone(), &Logger::with_sink(sink.clone()));

        let handle = factory
            .resolve_client(ExecutionMode::HostedApp, &forwarded(USER_TOKEN), &full_app_env())
            .unwrap();

        assert_eq!(handle.identity().name(), "alice@example.com");
        assert_eq!(handle.kind(), CredentialKind::UserDelegated);
        let seen = connector.credentials();
        assert_eq!(seen.len(), 1);
        assert_eq!(
            seen[0],
            CredentialContext::UserDelegatedToken {
                host: HOST.to_string(),
                token: Secret::new(USER_TOKEN),
            }
        );
        assert!(sink.contains("Successfully authenticated as alice@example.com using on-behalf-of-user"));
        assert_no_secrets(&sink);
    }

    #[test]
    fn rejected_user_token_falls_back_to_service_principal() {
        let sink = CapturingLog::new();
        let connector = FakeConnector::new().accept_client("sp-client-id", SP_SECRET, "uploader-sp");
        let factory = ClientFactory::new(connector.clone(), &Logger::with_sink(sink.clone()));

        let handle = factory
            .resolve_client(ExecutionMode::HostedApp, &forwarded(USER_TOKEN), &full_app_env())
            .unwrap();

        assert_eq!(handle.kind(), CredentialKind::ServicePrincipal);
        assert_eq!(handle.identity().name(), "uploader-sp");
        assert_eq!(connector.credentials().len(), 2);
        assert!(sink.contains("On-behalf-of-user authentication failed"));
        assert!(sink.contains("Falling back to app authentication"));
        assert_no_secrets(&sink);
    }

    #[test]
    fn absent_user_token_uses_service_principal() {
        let connector = FakeConnector::new().accept_client("sp-client-id", SP_SECRET, "uploader-sp");
        let factory = ClientFactory::new(connector.clone(), &Logger::with_sink(CapturingLog::new()));

        let handle = factory
            .resolve_client(ExecutionMode::HostedApp, &HeaderMap::new(), &full_app_env())
            .unwrap();

        assert_eq!(handle.kind(), CredentialKind::ServicePrincipal);
        assert_eq!(connector.credentials().len(), 1);
    }

    #[test]
    fn incomplete_app_config_is_terminal() {
        let sink = CapturingLog::new();
        let connector = FakeConnector::new();
        let factory = ClientFactory::new(connector.clone(), &Logger::with_sink(sink.clone()));
        let env = env_of(&[("DATABRICKS_APP_NAME", "uploader"), (HOST_VAR, HOST), (CLIENT_ID_VAR, "id")]);

        let err = factory
            .resolve_client(ExecutionMode::HostedApp, &HeaderMap::new(), &env)
            .unwrap_err();

        assert_eq!(err, AuthError::IncompleteServiceConfig);
        assert!(connector.credentials().is_empty());
        assert!(sink.contains("Missing app authentication environment variables"));
    }

    #[test]
    fn failing_service_probe_is_terminal() {
        let sink = CapturingLog::new();
        let factory = ClientFactory::new(FakeConnector::new(), &Logger::with_sink(sink.clone()));

        let err = factory
            .resolve_client(ExecutionMode::HostedApp, &HeaderMap::new(), &full_app_env())
            .unwrap_err();

        assert!(matches!(err, AuthError::ServiceAuthFailed(_)));
        assert_no_secrets(&sink);
    }

    #[test]
    fn local_mode_requires_host_and_token() {
        let connector = FakeConnector::new();
        let factory = ClientFactory::new(connector.clone(), &Logger::with_sink(CapturingLog::new()));

        for env in [
            env_of(&[(HOST_VAR, HOST)]),
            env_of(&[(TOKEN_VAR, PAT)]),
            env_of(&[]),
        ] {
            let err = factory
                .resolve_client(ExecutionMode::Local, &HeaderMap::new(), &env)
                .unwrap_err();
            assert_eq!(err, AuthError::MissingLocalCredentials);
        }
        assert!(connector.credentials().is_empty());
    }

    #[test]
    fn local_mode_ignores_forwarded_headers() {
        let connector = FakeConnector::new()
            .accept_token(PAT, "dev@example.com")
            .accept_token(USER_TOKEN, "alice@example.com");
        let factory = ClientFactory::new(connector.clone(), &Logger::with_sink(CapturingLog::new()));
        let env = env_of(&[(HOST_VAR, HOST), (TOKEN_VAR, PAT)]);

        let handle = factory
            .resolve_client(ExecutionMode::Local, &forwarded(USER_TOKEN), &env)
            .unwrap();

        assert_eq!(handle.kind(), CredentialKind::StaticToken);
        assert_eq!(handle.identity().name(), "dev@example.com");
    }

    #[test]
    fn local_probe_failure_is_reported() {
        let sink = CapturingLog::new();
        let factory = ClientFactory::new(FakeConnector::new(), &Logger::with_sink(sink.clone()));
        let env = env_of(&[(HOST_VAR, HOST), (TOKEN_VAR, PAT)]);

        let err = factory
            .resolve_client(ExecutionMode::Local, &HeaderMap::new(), &env)
            .unwrap_err();

        assert!(matches!(err, AuthError::LocalAuthFailed(_)));
        assert!(sink.contains("Authentication failed with provided credentials"));
        assert_no_secrets(&sink);
    }

    #[test]
    fn construction_failure_is_converted() {
        let connector = FakeConnector::new().refuse_connections();
        let factory = ClientFactory::new(connector, &Logger::with_sink(CapturingLog::new()));
        let env = env_of(&[(HOST_VAR, HOST), (TOKEN_VAR, PAT)]);

        let err = factory
            .resolve_client(ExecutionMode::Local, &HeaderMap::new(), &env)
            .unwrap_err();

        assert!(matches!(err, AuthError::ClientConstructionFailed(_)));
    }

    #[test]
    fn service_principal_construction_failure_is_converted() {
        let sink = CapturingLog::new();
        let connector = FakeConnector::new().refuse_connections();
        let factory = ClientFactory::new(connector.clone(), &Logger::with_sink(sink.clone()));

        let err = factory
            .resolve_client(ExecutionMode::HostedApp, &HeaderMap::new(), &full_app_env())
            .unwrap_err();

        assert!(matches!(err, AuthError::ClientConstructionFailed(_)));
        assert_eq!(connector.credentials()[0].kind(), CredentialKind::ServicePrincipal);
        assert!(sink.contains("Error creating workspace client"));
        assert_no_secrets(&sink);
    }

    #[test]
    fn verifying_forwarded_user_never_falls_back() {
        let sink = CapturingLog::new();
        let connector = FakeConnector::new()
            .accept_token(USER_TOKEN, "alice@example.com")
            .accept_client("sp-client-id", SP_SECRET, "uploader-sp");
        let factory = ClientFactory::new(connector.clone(), &Logger::with_sink(sink.clone()));

        let verified = factory.verify_forwarded_user(&forwarded(USER_TOKEN), &full_app_env());
        assert_eq!(verified, Some(Ok(Identity::named("alice@example.com"))));

        let rejected = factory.verify_forwarded_user(&forwarded("stale-token"), &full_app_env());
        assert!(matches!(rejected, Some(Err(_))));
        assert!(sink.contains("Could not verify user identity"));

        assert_eq!(
            factory.verify_forwarded_user(&HeaderMap::new(), &full_app_env()),
            None
        );
        assert!(connector
            .credentials()
            .iter()
            .all(|c| c.kind() == CredentialKind::UserDelegated));
        assert_no_secrets(&sink);
    }

    #[test]
    fn secrets_do_not_format() {
        let credential = CredentialContext::ServicePrincipalCredential {
            host: HOST.to_string(),
            client_id: "id".to_string(),
            client_secret: Secret::new(SP_SECRET),
        };
        let rendered = format!("{credential:?} {}", Secret::new(PAT));
        assert!(!rendered.contains(SP_SECRET));
        assert!(!rendered.contains(PAT));
        assert!(rendered.contains(HOST));
    }
}
