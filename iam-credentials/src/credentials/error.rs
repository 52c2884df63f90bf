//! Errors raised while loading or using call credentials.

use std::path::PathBuf;

use thiserror::Error;

/// Errors produced by credential resolution and token minting.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum CredentialsError {
    /// A credentials file could not be read.
    #[error("failed to read credentials file {}: {source}", path.display())]
    Io {
        /// Path of the file.
        path: PathBuf,
        /// Underlying I/O error.
        #[source]
        source: std::io::Error,
    },

    /// A credentials file is not valid JSON or does not match the expected shape.
    #[error("failed to parse credentials: {0}")]
    Json(#[from] serde_json::Error),

    /// The credentials file has no `type` field.
    #[error("credentials file does not specify a credential type")]
    MissingType,

    /// The credentials file describes a credential type this crate cannot use.
    #[error("unsupported credential type: {0}")]
    UnsupportedCredentialType(String),

    /// The private key of a service account could not be loaded.
    #[error("invalid service account private key: {0}")]
    InvalidPrivateKey(#[source] jsonwebtoken::errors::Error),

    /// Signing a self-signed JWT failed.
    #[error("failed to sign service account JWT: {0}")]
    Signing(#[source] jsonwebtoken::errors::Error),

    /// A token contains characters that cannot be carried in gRPC metadata.
    #[error("token is not a valid metadata value")]
    InvalidHeaderValue,

    /// Neither `GOOGLE_APPLICATION_CREDENTIALS` nor the gcloud well-known file is available.
    #[error(
        "could not find default credentials; set GOOGLE_APPLICATION_CREDENTIALS or run \
         `gcloud auth application-default login`"
    )]
    DefaultCredentialsNotFound,
}
