//! Call credentials attached to every IAM Credentials RPC.
//!
//! A [`Credentials`] implementation produces the `authorization` metadata value sent with
//! each call. Two implementations ship with the crate:
//!
//! - [`AccessTokenCredentials`]: a bearer token obtained elsewhere.
//! - [`ServiceAccountCredentials`]: a service account key that signs its own short-lived
//!   JWT bearer tokens, so no token endpoint round-trip is needed.
//!
//! Credentials can also be loaded from a JSON key file ([`load_credentials_from_file`])
//! or resolved from the environment ([`default_credentials`]).

mod error;
mod file;
mod service_account;

use std::fmt;

use tonic::metadata::{Ascii, MetadataValue};
use zeroize::Zeroizing;

pub use error::CredentialsError;
pub use file::{default_credentials, load_credentials_from_file};
pub use service_account::{ServiceAccountCredentials, ServiceAccountKey};

/// Source of the `authorization` header for outgoing calls.
///
/// Implementations must be cheap to call repeatedly; the transport asks for a value on
/// every RPC and leaves caching to the implementation.
pub trait Credentials: Send + Sync + fmt::Debug {
    /// Returns the value of the `authorization` header for the next call.
    ///
    /// # Errors
    ///
    /// Returns a [`CredentialsError`] if a token cannot be produced.
    fn authorization(&self) -> Result<MetadataValue<Ascii>, CredentialsError>;

    /// Project billed for quota, sent as `x-goog-user-project`.
    fn quota_project_id(&self) -> Option<&str> {
        None
    }
}

/// Credentials backed by an OAuth 2.0 access token obtained out of band.
///
/// The token is sent as is; it is never refreshed.
#[derive(Clone)]
pub struct AccessTokenCredentials {
    header: MetadataValue<Ascii>,
    quota_project_id: Option<String>,
}

impl AccessTokenCredentials {
    /// Wraps an access token.
    ///
    /// # Errors
    ///
    /// Returns [`CredentialsError::InvalidHeaderValue`] if the token contains characters
    /// that cannot be sent in gRPC metadata.
    pub fn new(token: impl Into<String>) -> Result<Self, CredentialsError> {
        let token = Zeroizing::new(token.into());
        Ok(Self {
            header: bearer_header(&token)?,
            quota_project_id: None,
        })
    }

    /// Sets the project billed for quota.
    #[must_use]
    pub fn with_quota_project(mut self, quota_project_id: impl Into<String>) -> Self {
        self.quota_project_id = Some(quota_project_id.into());
        self
    }
}

impl fmt::Debug for AccessTokenCredentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AccessTokenCredentials")
            .field("token", &"<redacted>")
            .field("quota_project_id", &self.quota_project_id)
            .finish()
    }
}

impl Credentials for AccessTokenCredentials {
    fn authorization(&self) -> Result<MetadataValue<Ascii>, CredentialsError> {
        Ok(self.header.clone())
    }

    fn quota_project_id(&self) -> Option<&str> {
        self.quota_project_id.as_deref()
    }
}

/// Builds a sensitive `Bearer <token>` metadata value.
pub(crate) fn bearer_header(token: &str) -> Result<MetadataValue<Ascii>, CredentialsError> {
    let mut value = MetadataValue::try_from(format!("Bearer {token}"))
        .map_err(|_| CredentialsError::InvalidHeaderValue)?;
    value.set_sensitive(true);
    Ok(value)
}
