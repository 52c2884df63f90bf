#![deny(missing_docs)]
#![warn(missing_debug_implementations)]

//! Async gRPC transport for the Google Cloud
//! [IAM Service Account Credentials API](https://cloud.google.com/iam/docs/reference/credentials/rest).
//!
//! The API creates short-lived credentials for service accounts: OAuth 2.0 access tokens,
//! OpenID Connect ID tokens, and blobs or JWTs signed with the account's system-managed
//! key.
//!
//! [`IamCredentialsGrpcTransport`] owns a lazily created `tonic` channel and one memoized
//! stub per RPC. [`IamCredentialsClient`] is a thin client over any
//! [`IamCredentialsTransport`].
//!
//! ```no_run
//! use iam_credentials::pb::google::iam::credentials::v1::SignBlobRequest;
//! use iam_credentials::{service_account_path, IamCredentialsClient};
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! // Uses GOOGLE_APPLICATION_CREDENTIALS or the gcloud well-known file.
//! let client = IamCredentialsClient::from_env()?;
//!
//! let response = client
//!     .sign_blob(SignBlobRequest {
//!         name: service_account_path("-", "signer@my-project.iam.gserviceaccount.com"),
//!         payload: b"hello".to_vec().into(),
//!         ..Default::default()
//!     })
//!     .await?;
//! println!("signed with key {}", response.key_id);
//! # Ok(())
//! # }
//! ```
//!
//! ## Mutual TLS
//!
//! ```no_run
//! use iam_credentials::constants::DEFAULT_MTLS_HOST;
//! use iam_credentials::IamCredentialsGrpcTransport;
//!
//! # fn example() -> Result<(), iam_credentials::Error> {
//! // Without an explicit `client_cert_source`, the certificate comes from the
//! // `cert_provider_command` in ~/.secureConnect/context_aware_metadata.json.
//! let transport = IamCredentialsGrpcTransport::builder()
//!     .api_mtls_endpoint(DEFAULT_MTLS_HOST)
//!     .credentials_file("/path/to/key.json")
//!     .build()?;
//! # Ok(())
//! # }
//! ```
//!
//! ## Features
//!
//! - **`logging`** (default): emit diagnostics through the `log` crate.
//! - **`tracing`**: emit diagnostics as `tracing` events instead.

pub mod client;
pub mod constants;
pub mod credentials;
pub mod endpoint;
pub mod error;
mod observability;
pub mod pb;
pub mod transport;

// -----------------------
// Re-exports
// -----------------------

pub use crate::{
    client::{parse_service_account_path, service_account_path, IamCredentialsClient},
    credentials::{AccessTokenCredentials, Credentials, CredentialsError, ServiceAccountCredentials},
    endpoint::{EndpointError, Target},
    error::Error,
    transport::{
        create_channel, AuthenticatedChannel, ChannelConfig, ClientCertSource, ClientCertificate,
        IamCredentialsGrpcTransport, IamCredentialsGrpcTransportBuilder, IamCredentialsTransport,
        MutualTlsError,
    },
};
