//! Loading credentials from JSON key files and application default locations.

use std::env;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use serde::Deserialize;

use super::{Credentials, CredentialsError, ServiceAccountCredentials, ServiceAccountKey};
use crate::constants::CREDENTIALS_ENV;
use crate::observability::{log_debug, log_info};

const SERVICE_ACCOUNT_TYPE: &str = "service_account";
const WELL_KNOWN_FILE: &str = "application_default_credentials.json";

#[derive(Deserialize)]
struct CredentialsFileType {
    #[serde(rename = "type")]
    kind: Option<String>,
}

/// Loads credentials from a JSON key file.
///
/// Only `service_account` keys are supported. `scopes` are applied to the loaded
/// credentials, and `quota_project_id`, when given, overrides the project in the file.
///
/// # Errors
///
/// Returns a [`CredentialsError`] if the file cannot be read or parsed, or if it holds a
/// credential type other than `service_account`.
pub fn load_credentials_from_file<I>(
    path: impl AsRef<Path>,
    scopes: I,
    quota_project_id: Option<&str>,
) -> Result<Arc<dyn Credentials>, CredentialsError>
where
    I: IntoIterator,
    I::Item: Into<String>,
{
    let path = path.as_ref();
    let contents = fs::read_to_string(path).map_err(|source| CredentialsError::Io {
        path: path.to_path_buf(),
        source,
    })?;

    log_debug!("loading credentials from {}", path.display());
    credentials_from_json(&contents, scopes, quota_project_id)
}

/// Resolves application default credentials.
///
/// Looks at `GOOGLE_APPLICATION_CREDENTIALS` first and then at the gcloud well-known file
/// (`$HOME/.config/gcloud/application_default_credentials.json`, or
/// `%APPDATA%\gcloud\application_default_credentials.json` on Windows).
///
/// # Errors
///
/// Returns [`CredentialsError::DefaultCredentialsNotFound`] if no location yields a file,
/// or any error from [`load_credentials_from_file`].
pub fn default_credentials<I>(
    scopes: I,
    quota_project_id: Option<&str>,
) -> Result<Arc<dyn Credentials>, CredentialsError>
where
    I: IntoIterator,
    I::Item: Into<String>,
{
    let explicit = env::var_os(CREDENTIALS_ENV)
        .filter(|v| !v.is_empty())
        .map(PathBuf::from);
    resolve_default_credentials(explicit, well_known_file(), scopes, quota_project_id)
}

pub(crate) fn resolve_default_credentials<I>(
    explicit: Option<PathBuf>,
    well_known: Option<PathBuf>,
    scopes: I,
    quota_project_id: Option<&str>,
) -> Result<Arc<dyn Credentials>, CredentialsError>
where
    I: IntoIterator,
    I::Item: Into<String>,
{
    // An explicitly configured path must exist; the well-known file is optional.
    if let Some(path) = explicit {
        log_info!("using credentials from {CREDENTIALS_ENV}={}", path.display());
        return load_credentials_from_file(path, scopes, quota_project_id);
    }

    match well_known {
        Some(path) if path.is_file() => {
            log_info!("using gcloud application default credentials at {}", path.display());
            load_credentials_from_file(path, scopes, quota_project_id)
        }
        _ => Err(CredentialsError::DefaultCredentialsNotFound),
    }
}

fn credentials_from_json<I>(
    contents: &str,
    scopes: I,
    quota_project_id: Option<&str>,
) -> Result<Arc<dyn Credentials>, CredentialsError>
where
    I: IntoIterator,
    I::Item: Into<String>,
{
    let kind = serde_json::from_str::<CredentialsFileType>(contents)?
        .kind
        .ok_or(CredentialsError::MissingType)?;

    if kind != SERVICE_ACCOUNT_TYPE {
        return Err(CredentialsError::UnsupportedCredentialType(kind));
    }

    let key = ServiceAccountKey::from_json(contents)?;
    let mut credentials = ServiceAccountCredentials::from_key(&key)?.with_scopes(scopes);
    if let Some(project) = quota_project_id {
        credentials = credentials.with_quota_project(project);
    }
    Ok(Arc::new(credentials))
}

fn well_known_file() -> Option<PathBuf> {
    let config_dir = if cfg!(windows) {
        PathBuf::from(env::var_os("APPDATA")?)
    } else {
        PathBuf::from(env::var_os("HOME")?).join(".config")
    };
    Some(config_dir.join("gcloud").join(WELL_KNOWN_FILE))
}
