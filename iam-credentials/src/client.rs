//! High-level client for the IAM Credentials API.
//!
//! [`IamCredentialsClient`] forwards each RPC to an [`IamCredentialsTransport`]. By default
//! that is the [`IamCredentialsGrpcTransport`]; tests and alternative backends can plug in
//! their own transport.

use crate::error::Error;
use crate::pb::google::iam::credentials::v1::{
    GenerateAccessTokenRequest, GenerateAccessTokenResponse, GenerateIdTokenRequest,
    GenerateIdTokenResponse, SignBlobRequest, SignBlobResponse, SignJwtRequest, SignJwtResponse,
};
use crate::transport::{IamCredentialsGrpcTransport, IamCredentialsTransport};

const PROJECTS: &str = "projects";
const SERVICE_ACCOUNTS: &str = "serviceAccounts";

/// Client for the IAM Credentials API.
///
/// Request `name` fields take the form `projects/-/serviceAccounts/{ACCOUNT_EMAIL_OR_UNIQUEID}`;
/// see [`service_account_path`]. The `-` wildcard is required for the project.
#[derive(Debug)]
pub struct IamCredentialsClient<T = IamCredentialsGrpcTransport> {
    transport: T,
}

impl IamCredentialsClient {
    /// Creates a client over a gRPC transport using the default host, scopes and
    /// application default credentials.
    ///
    /// # Errors
    ///
    /// Returns an [`Error`] if application default credentials cannot be found or loaded.
    pub fn from_env() -> Result<Self, Error> {
        Ok(Self::new(IamCredentialsGrpcTransport::builder().build()?))
    }
}

impl<T: IamCredentialsTransport> IamCredentialsClient<T> {
    /// Creates a client over `transport`.
    pub const fn new(transport: T) -> Self {
        Self { transport }
    }

    /// Returns the underlying transport.
    pub const fn transport(&self) -> &T {
        &self.transport
    }

    /// Consumes the client and returns the underlying transport.
    pub fn into_transport(self) -> T {
        self.transport
    }

    /// Generates an OAuth 2.0 access token for a service account.
    ///
    /// # Errors
    ///
    /// Returns an [`Error`] if the call cannot be authenticated or the server rejects it.
    pub async fn generate_access_token(
        &self,
        request: GenerateAccessTokenRequest,
    ) -> Result<GenerateAccessTokenResponse, Error> {
        self.transport.generate_access_token(request).await
    }

    /// Generates an OpenID Connect ID token for a service account.
    ///
    /// # Errors
    ///
    /// Returns an [`Error`] if the call cannot be authenticated or the server rejects it.
    pub async fn generate_id_token(
        &self,
        request: GenerateIdTokenRequest,
    ) -> Result<GenerateIdTokenResponse, Error> {
        self.transport.generate_id_token(request).await
    }

    /// Signs a blob using a service account's system-managed private key.
    ///
    /// # Errors
    ///
    /// Returns an [`Error`] if the call cannot be authenticated or the server rejects it.
    pub async fn sign_blob(&self, request: SignBlobRequest) -> Result<SignBlobResponse, Error> {
        self.transport.sign_blob(request).await
    }

    /// Signs a JWT using a service account's system-managed private key.
    ///
    /// # Errors
    ///
    /// Returns an [`Error`] if the call cannot be authenticated or the server rejects it.
    pub async fn sign_jwt(&self, request: SignJwtRequest) -> Result<SignJwtResponse, Error> {
        self.transport.sign_jwt(request).await
    }
}

/// Returns the resource name `projects/{project}/serviceAccounts/{service_account}`.
pub fn service_account_path(project: &str, service_account: &str) -> String {
    format!("{PROJECTS}/{project}/{SERVICE_ACCOUNTS}/{service_account}")
}

/// Splits a service account resource name into its project and service account segments.
///
/// Returns `None` unless `path` is exactly `projects/{project}/serviceAccounts/{service_account}`
/// with non-empty segments.
pub fn parse_service_account_path(path: &str) -> Option<(&str, &str)> {
    let mut segments = path.split('/');
    match (
        segments.next(),
        segments.next(),
        segments.next(),
        segments.next(),
        segments.next(),
    ) {
        (Some(PROJECTS), Some(project), Some(SERVICE_ACCOUNTS), Some(account), None)
            if !project.is_empty() && !account.is_empty() =>
        {
            Some((project, account))
        }
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Mutex;

    use prost::bytes::Bytes;

    use super::*;

    #[derive(Debug, Default)]
    struct RecordingTransport {
        calls: Mutex<Vec<(&'static str, String)>>,
    }

    impl RecordingTransport {
        fn record(&self, method: &'static str, name: &str) {
            self.calls.lock().unwrap().push((method, name.to_owned()));
        }
    }

    impl IamCredentialsTransport for RecordingTransport {
        async fn generate_access_token(
            &self,
            request: GenerateAccessTokenRequest,
        ) -> Result<GenerateAccessTokenResponse, Error> {
            self.record("GenerateAccessToken", &request.name);
            Ok(GenerateAccessTokenResponse {
                access_token: format!("token-for-{}", request.scope.join(",")),
                expire_time: None,
            })
        }

        async fn generate_id_token(
            &self,
            request: GenerateIdTokenRequest,
        ) -> Result<GenerateIdTokenResponse, Error> {
            self.record("GenerateIdToken", &request.name);
            Ok(GenerateIdTokenResponse {
                token: request.audience,
            })
        }

        async fn sign_blob(&self, request: SignBlobRequest) -> Result<SignBlobResponse, Error> {
            self.record("SignBlob", &request.name);
            Err(tonic::Status::permission_denied("iam.serviceAccounts.signBlob").into())
        }

        async fn sign_jwt(&self, request: SignJwtRequest) -> Result<SignJwtResponse, Error> {
            self.record("SignJwt", &request.name);
            Ok(SignJwtResponse {
                key_id: "kid".into(),
                signed_jwt: request.payload,
            })
        }
    }

    #[tokio::test]
    async fn client_forwards_to_transport() {
        let client = IamCredentialsClient::new(RecordingTransport::default());
        let name = service_account_path("-", "sa@p.iam.gserviceaccount.com");

        let token = client
            .generate_access_token(GenerateAccessTokenRequest {
                name: name.clone(),
                scope: vec!["a".into(), "b".into()],
                ..Default::default()
            })
            .await
            .unwrap();
        assert_eq!(token.access_token, "token-for-a,b");

        let id_token = client
            .generate_id_token(GenerateIdTokenRequest {
                name: name.clone(),
                audience: "https://service.example.com".into(),
                ..Default::default()
            })
            .await
            .unwrap();
        assert_eq!(id_token.token, "https://service.example.com");

        let err = client
            .sign_blob(SignBlobRequest {
                name: name.clone(),
                payload: Bytes::from_static(b"blob"),
                ..Default::default()
            })
            .await
            .unwrap_err();
        assert_eq!(err.code(), Some(tonic::Code::PermissionDenied));

        let jwt = client
            .sign_jwt(SignJwtRequest {
                name: name.clone(),
                payload: "{}".into(),
                ..Default::default()
            })
            .await
            .unwrap();
        assert_eq!(jwt.signed_jwt, "{}");

        let calls = client.into_transport().calls.into_inner().unwrap();
        let methods: Vec<_> = calls.iter().map(|(method, _)| *method).collect();
        assert_eq!(
            methods,
            ["GenerateAccessToken", "GenerateIdToken", "SignBlob", "SignJwt"]
        );
        assert!(calls.iter().all(|(_, n)| *n == name));
    }

    #[test]
    fn service_account_path_formats() {
        assert_eq!(
            service_account_path("-", "sa@p.iam.gserviceaccount.com"),
            "projects/-/serviceAccounts/sa@p.iam.gserviceaccount.com"
        );
    }

    #[test]
    fn service_account_path_parses() {
        assert_eq!(
            parse_service_account_path("projects/-/serviceAccounts/1234567890"),
            Some(("-", "1234567890"))
        );
        assert_eq!(
            parse_service_account_path(&service_account_path("my-project", "sa")),
            Some(("my-project", "sa"))
        );
    }

    #[test]
    fn service_account_path_rejects_malformed() {
        for path in [
            "",
            "projects/-",
            "projects/-/serviceAccounts/",
            "projects//serviceAccounts/sa",
            "projects/-/serviceAccounts/sa/keys",
            "project/-/serviceAccounts/sa",
            "projects/-/accounts/sa",
        ] {
            assert_eq!(parse_service_account_path(path), None, "{path}");
        }
    }
}
