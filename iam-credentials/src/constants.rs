//! Constants for the IAM Credentials API: default hosts, OAuth scopes and RPC routes.

/// Default host of the IAM Credentials API.
pub const DEFAULT_HOST: &str = "iamcredentials.googleapis.com";

/// Default mutual-TLS host of the IAM Credentials API.
pub const DEFAULT_MTLS_HOST: &str = "iamcredentials.mtls.googleapis.com";

/// Port appended to hosts that do not carry one.
pub const DEFAULT_PORT: u16 = 443;

/// OAuth scopes requested when the caller does not provide any.
pub const AUTH_SCOPES: &[&str] = &["https://www.googleapis.com/auth/cloud-platform"];

/// Fully-qualified name of the gRPC service.
pub const SERVICE_NAME: &str = "google.iam.credentials.v1.IAMCredentials";

/// Route of the `GenerateAccessToken` RPC.
pub const GENERATE_ACCESS_TOKEN_ROUTE: &str =
    "/google.iam.credentials.v1.IAMCredentials/GenerateAccessToken";

/// Route of the `GenerateIdToken` RPC.
pub const GENERATE_ID_TOKEN_ROUTE: &str =
    "/google.iam.credentials.v1.IAMCredentials/GenerateIdToken";

/// Route of the `SignBlob` RPC.
pub const SIGN_BLOB_ROUTE: &str = "/google.iam.credentials.v1.IAMCredentials/SignBlob";

/// Route of the `SignJwt` RPC.
pub const SIGN_JWT_ROUTE: &str = "/google.iam.credentials.v1.IAMCredentials/SignJwt";

/// Name of the environment variable pointing at an application default credentials file.
pub const CREDENTIALS_ENV: &str = "GOOGLE_APPLICATION_CREDENTIALS";
