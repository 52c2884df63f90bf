//! Transports for the IAM Credentials API.
//!
//! [`IamCredentialsTransport`] is the seam between the [`crate::IamCredentialsClient`] and
//! the wire. [`IamCredentialsGrpcTransport`] implements it over a `tonic` channel.

mod channel;
mod grpc;
mod metadata;
pub mod mtls;
mod stub;

use std::future::Future;

use crate::error::Error;
use crate::pb::google::iam::credentials::v1::{
    GenerateAccessTokenRequest, GenerateAccessTokenResponse, GenerateIdTokenRequest,
    GenerateIdTokenResponse, SignBlobRequest, SignBlobResponse, SignJwtRequest, SignJwtResponse,
};

pub use channel::{create_channel, AuthenticatedChannel, ChannelConfig};
pub use grpc::{IamCredentialsGrpcTransport, IamCredentialsGrpcTransportBuilder};
pub use mtls::{default_client_cert_source, ClientCertSource, ClientCertificate, MutualTlsError};
pub use stub::{ResourceRequest, UnaryStub};

/// The four IAM Credentials RPCs.
pub trait IamCredentialsTransport: Send + Sync {
    /// Generates an OAuth 2.0 access token for a service account.
    fn generate_access_token(
        &self,
        request: GenerateAccessTokenRequest,
    ) -> impl Future<Output = Result<GenerateAccessTokenResponse, Error>> + Send;

    /// Generates an OpenID Connect ID token for a service account.
    fn generate_id_token(
        &self,
        request: GenerateIdTokenRequest,
    ) -> impl Future<Output = Result<GenerateIdTokenResponse, Error>> + Send;

    /// Signs a blob using a service account's system-managed private key.
    fn sign_blob(
        &self,
        request: SignBlobRequest,
    ) -> impl Future<Output = Result<SignBlobResponse, Error>> + Send;

    /// Signs a JWT using a service account's system-managed private key.
    fn sign_jwt(
        &self,
        request: SignJwtRequest,
    ) -> impl Future<Output = Result<SignJwtResponse, Error>> + Send;
}
