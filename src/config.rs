// Environment-provided configuration.
//
// Everything the resolver needs from the process environment is read once
// into `AppEnvironment`. Reading goes through a lookup closure so tests can
// feed a plain map instead of mutating the real environment.

use crate::logging::Logger;
use reqwest::header::{HeaderMap, HeaderName, HeaderValue};
use std::collections::BTreeMap;
use std::ffi::OsString;

pub const APP_NAME_VAR: &str = "DATABRICKS_APP_NAME";
pub const HOST_VAR: &str = "DATABRICKS_HOST";
pub const CLIENT_ID_VAR: &str = "DATABRICKS_CLIENT_ID";
pub const CLIENT_SECRET_VAR: &str = "DATABRICKS_CLIENT_SECRET";
pub const TOKEN_VAR: &str = "DATABRICKS_TOKEN";

/// Header the app proxy uses to forward the end user's access token.
pub const FORWARDED_TOKEN_HEADER: &str = "x-forwarded-access-token";

/// Name fragments that mark a variable or header as sensitive.
const SENSITIVE_MARKERS: [&str; 4] = ["token", "secret", "password", "auth"];

/// Where the app is running, which decides the credential strategy.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExecutionMode {
    /// Deployed as a hosted Databricks App.
    HostedApp,
    /// Running on a developer machine.
    Local,
}

impl ExecutionMode {
    pub fn detect(env: &AppEnvironment) -> Self {
        if env.app_name.is_some() {
            ExecutionMode::HostedApp
        } else {
            ExecutionMode::Local
        }
    }
}

/// Snapshot of the variables the app cares about.
#[derive(Clone, Default, PartialEq, Eq)]
pub struct AppEnvironment {
    pub app_name: Option<String>,
    pub host: Option<String>,
    pub client_id: Option<String>,
    pub client_secret: Option<String>,
    pub token: Option<String>,
    pub default_catalog: Option<String>,
    pub default_schema: Option<String>,
    pub default_volume: Option<String>,
    /// Every `DATABRICKS_*` variable, kept for the diagnostics summary.
    databricks_vars: BTreeMap<String, String>,
}

impl AppEnvironment {
    /// Read the real process environment.
    pub fn from_env() -> Self {
        let databricks_vars = utf8_vars(std::env::vars_os())
            .filter(|(k, _)| k.contains("DATABRICKS"))
            .collect();
        let mut env = Self::from_lookup(|key| std::env::var(key).ok());
        env.databricks_vars = databricks_vars;
        env
    }

    /// Build from any key lookup. Empty values are treated as unset.
    pub fn from_lookup<F>(lookup: F) -> Self
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());
        let databricks_vars = [APP_NAME_VAR, HOST_VAR, CLIENT_ID_VAR, CLIENT_SECRET_VAR, TOKEN_VAR]
            .iter()
            .filter_map(|k| get(*k).map(|v| (k.to_string(), v)))
            .collect();
        AppEnvironment {
            app_name: get(APP_NAME_VAR),
            host: get(HOST_VAR),
            client_id: get(CLIENT_ID_VAR),
            client_secret: get(CLIENT_SECRET_VAR),
            token: get(TOKEN_VAR),
            default_catalog: get("UPLOADER_CATALOG"),
            default_schema: get("UPLOADER_SCHEMA"),
            default_volume: get("UPLOADER_VOLUME"),
            databricks_vars,
        }
    }

    /// `DATABRICKS_*` variables with sensitive ones left out entirely.
    pub fn redacted_summary(&self) -> BTreeMap<String, String> {
        self.databricks_vars
            .iter()
            .filter(|(k, _)| !is_sensitive(k))
            .map(|(k, v)| (k.clone(), v.clone()))
            .collect()
    }

    /// Lines shown by the "debug information" screen. Presence only for
    /// anything credential-like.
    pub fn debug_lines(&self, headers: &HeaderMap) -> Vec<String> {
        let yes_no = |b: bool| if b { "Yes" } else { "No" };
        vec![
            format!(
                "App Name: {}",
                self.app_name.as_deref().unwrap_or("Not running as app")
            ),
            format!("Host: {}", self.host.as_deref().unwrap_or("Not set")),
            format!(
                "Has User Token: {} (when running as app)",
                yes_no(forwarded_token(headers).is_some())
            ),
            format!("Has Client ID: {}", yes_no(self.client_id.is_some())),
        ]
    }
}

// Hand-written so a stray `{:?}` can never print a credential.
impl std::fmt::Debug for AppEnvironment {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AppEnvironment")
            .field("app_name", &self.app_name)
            .field("host", &self.host)
            .field("client_id", &self.client_id)
            .field("client_secret", &self.client_secret.as_ref().map(|_| "***"))
            .field("token", &self.token.as_ref().map(|_| "***"))
            .finish_non_exhaustive()
    }
}

pub fn is_sensitive(name: &str) -> bool {
    let lower = name.to_ascii_lowercase();
    SENSITIVE_MARKERS.iter().any(|m| lower.contains(m))
}

/// Rebuild inbound request headers from CGI-style `HTTP_*` variables, as
/// exported by the app launcher (`HTTP_X_FORWARDED_ACCESS_TOKEN` becomes
/// `x-forwarded-access-token`). Unparseable names or values are skipped.
pub fn headers_from_vars<I>(vars: I) -> HeaderMap
where
    I: IntoIterator<Item = (String, String)>,
{
    let mut headers = HeaderMap::new();
    for (key, value) in vars {
        let Some(raw) = key.strip_prefix("HTTP_") else {
            continue;
        };
        let name = raw.to_ascii_lowercase().replace('_', "-");
        if let (Ok(name), Ok(value)) = (
            HeaderName::from_bytes(name.as_bytes()),
            HeaderValue::from_str(&value),
        ) {
            headers.insert(name, value);
        }
    }
    headers
}

pub fn headers_from_env() -> HeaderMap {
    headers_from_vars(utf8_vars(std::env::vars_os()))
}

/// Drops pairs whose key or value is not valid Unicode.
fn utf8_vars<I>(vars: I) -> impl Iterator<Item = (String, String)>
where
    I: IntoIterator<Item = (OsString, OsString)>,
{
    vars.into_iter()
        .filter_map(|(k, v)| Some((k.into_string().ok()?, v.into_string().ok()?)))
}

/// The forwarded user token, if present and non-empty.
pub fn forwarded_token(headers: &HeaderMap) -> Option<&str> {
    headers
        .get(FORWARDED_TOKEN_HEADER)
        .and_then(|v| v.to_str().ok())
        .map(str::trim)
        .filter(|v| !v.is_empty())
}

/// Header names that are safe to log.
pub fn safe_header_names(headers: &HeaderMap) -> Vec<String> {
    let mut names: Vec<String> = headers
        .keys()
        .map(|k| k.as_str().to_string())
        .filter(|k| !is_sensitive(k))
        .collect();
    names.sort();
    names.dedup();
    names
}

/// Startup diagnostics: environment and header names, credentials left out.
pub fn log_startup(logger: &Logger, env: &AppEnvironment, headers: &HeaderMap) {
    logger.info(format_args!("Application starting"));
    logger.debug(format_args!(
        "Environment variables: {}",
        serde_json::to_string(&env.redacted_summary()).unwrap_or_default()
    ));
    if !headers.is_empty() {
        logger.debug(format_args!(
            "Available HTTP headers: {}",
            serde_json::to_string(&safe_header_names(headers)).unwrap_or_default()
        ));
    }
}
