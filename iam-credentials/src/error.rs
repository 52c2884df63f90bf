//! Error types for transport construction and RPC calls.

use thiserror::Error;

use crate::credentials::CredentialsError;
use crate::endpoint::EndpointError;
use crate::transport::mtls::MutualTlsError;

/// Errors produced while building the transport or calling the IAM Credentials API.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum Error {
    /// Both `credentials` and `credentials_file` were given.
    #[error("'credentials_file' and 'credentials' are mutually exclusive")]
    DuplicateCredentialArgs,

    /// The service host or mutual-TLS endpoint is invalid.
    #[error("invalid service endpoint: {0}")]
    Endpoint(#[from] EndpointError),

    /// Call credentials could not be resolved or could not produce a token.
    #[error(transparent)]
    Credentials(#[from] CredentialsError),

    /// The mutual-TLS channel could not be configured.
    #[error("failed to create mutual TLS channel: {0}")]
    MutualTlsChannel(#[from] MutualTlsError),

    /// Error from the gRPC transport while configuring or using the channel.
    #[error(transparent)]
    Transport(#[from] tonic::transport::Error),

    /// gRPC status returned by the IAM Credentials API.
    #[error(transparent)]
    Status(#[from] tonic::Status),
}

impl Error {
    /// Returns the gRPC status code when the error came back from the server.
    pub fn code(&self) -> Option<tonic::Code> {
        match self {
            Self::Status(status) => Some(status.code()),
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::Error;

    #[test]
    fn status_code_is_exposed() {
        let err = Error::from(tonic::Status::permission_denied("iam.serviceAccounts.getAccessToken"));
        assert_eq!(err.code(), Some(tonic::Code::PermissionDenied));
        assert_eq!(Error::DuplicateCredentialArgs.code(), None);
    }

    #[test]
    fn duplicate_credentials_message() {
        assert_eq!(
            Error::DuplicateCredentialArgs.to_string(),
            "'credentials_file' and 'credentials' are mutually exclusive"
        );
    }
}
