//! gRPC transport for the IAM Credentials API.

use std::fmt;
use std::path::PathBuf;
use std::sync::Arc;

use once_cell::sync::OnceCell;
use tonic::transport::{Channel, Endpoint};

use super::channel::{self, default_scopes, AuthenticatedChannel, ChannelConfig, PreparedChannel};
use super::metadata::CallMetadata;
use super::mtls::{default_client_cert_source, ClientCertSource};
use super::stub::UnaryStub;
use super::IamCredentialsTransport;
use crate::constants::{
    DEFAULT_HOST, GENERATE_ACCESS_TOKEN_ROUTE, GENERATE_ID_TOKEN_ROUTE, SIGN_BLOB_ROUTE,
    SIGN_JWT_ROUTE,
};
use crate::credentials::Credentials;
use crate::endpoint::Target;
use crate::error::Error;
use crate::observability::{log_debug, log_info};
use crate::pb::google::iam::credentials::v1::{
    GenerateAccessTokenRequest, GenerateAccessTokenResponse, GenerateIdTokenRequest,
    GenerateIdTokenResponse, SignBlobRequest, SignBlobResponse, SignJwtRequest, SignJwtResponse,
};

enum ChannelSource {
    Provided(Channel),
    Lazy(Endpoint),
}

#[derive(Default)]
struct Stubs {
    generate_access_token: OnceCell<UnaryStub<GenerateAccessTokenRequest, GenerateAccessTokenResponse>>,
    generate_id_token: OnceCell<UnaryStub<GenerateIdTokenRequest, GenerateIdTokenResponse>>,
    sign_blob: OnceCell<UnaryStub<SignBlobRequest, SignBlobResponse>>,
    sign_jwt: OnceCell<UnaryStub<SignJwtRequest, SignJwtResponse>>,
}

/// gRPC backend transport for the IAM Credentials API.
///
/// A service account is a special type of Google account that belongs to an application
/// or a virtual machine rather than to an end user. This transport issues short-lived
/// credentials for service accounts: OAuth 2.0 access tokens, OpenID Connect ID tokens,
/// and blobs or JWTs signed with the account's system-managed key.
///
/// The channel is created at most once per transport, on first use, and each method's
/// [`UnaryStub`] is created at most once and reused afterwards.
///
/// # Example
///
/// ```no_run
/// use iam_credentials::pb::google::iam::credentials::v1::GenerateAccessTokenRequest;
/// use iam_credentials::IamCredentialsGrpcTransport;
///
/// # async fn example() -> Result<(), Box<dyn std::error::Error>> {
/// let transport = IamCredentialsGrpcTransport::builder()
///     .credentials_file("/path/to/key.json")
///     .build()?;
///
/// let response = transport
///     .generate_access_token_stub()
///     .call(GenerateAccessTokenRequest {
///         name: "projects/-/serviceAccounts/target@my-project.iam.gserviceaccount.com".into(),
///         scope: vec!["https://www.googleapis.com/auth/cloud-platform".into()],
///         ..Default::default()
///     })
///     .await?;
/// println!("token expires at {:?}", response.expire_time);
/// # Ok(())
/// # }
/// ```
pub struct IamCredentialsGrpcTransport {
    target: Target,
    scopes: Vec<String>,
    source: ChannelSource,
    channel: OnceCell<Channel>,
    metadata: CallMetadata,
    stubs: Stubs,
}

impl IamCredentialsGrpcTransport {
    /// Returns a builder with the default host and scopes.
    pub fn builder() -> IamCredentialsGrpcTransportBuilder {
        IamCredentialsGrpcTransportBuilder::default()
    }

    fn from_parts(
        target: Target,
        scopes: Vec<String>,
        source: ChannelSource,
        metadata: CallMetadata,
    ) -> Self {
        Self {
            target,
            scopes,
            source,
            channel: OnceCell::new(),
            metadata,
            stubs: Stubs::default(),
        }
    }

    /// The `host:port` this transport talks to.
    pub fn host(&self) -> &Target {
        &self.target
    }

    /// OAuth scopes applied to file and default credentials.
    pub fn scopes(&self) -> &[String] {
        &self.scopes
    }

    /// Returns the channel, creating it on first access.
    ///
    /// Repeated calls return the same channel.
    ///
    /// # Panics
    ///
    /// The first call panics if it is made outside a Tokio runtime, since creating the
    /// channel spawns its connection task.
    pub fn grpc_channel(&self) -> &Channel {
        self.channel.get_or_init(|| match &self.source {
            ChannelSource::Provided(channel) => channel.clone(),
            ChannelSource::Lazy(endpoint) => {
                log_debug!("creating channel to {}", self.target);
                endpoint.connect_lazy()
            }
        })
    }

    /// Stub for `GenerateAccessToken`: generates an OAuth 2.0 access token for a service
    /// account.
    ///
    /// # Panics
    ///
    /// The first call panics if it is made outside a Tokio runtime and the channel has not
    /// been created yet; see [`grpc_channel`](Self::grpc_channel).
    pub fn generate_access_token_stub(
        &self,
    ) -> &UnaryStub<GenerateAccessTokenRequest, GenerateAccessTokenResponse> {
        self.stubs
            .generate_access_token
            .get_or_init(|| self.new_stub(GENERATE_ACCESS_TOKEN_ROUTE))
    }

    /// Stub for `GenerateIdToken`: generates an OpenID Connect ID token for a service
    /// account.
    ///
    /// # Panics
    ///
    /// The first call panics if it is made outside a Tokio runtime and the channel has not
    /// been created yet; see [`grpc_channel`](Self::grpc_channel).
    pub fn generate_id_token_stub(
        &self,
    ) -> &UnaryStub<GenerateIdTokenRequest, GenerateIdTokenResponse> {
        self.stubs
            .generate_id_token
            .get_or_init(|| self.new_stub(GENERATE_ID_TOKEN_ROUTE))
    }

    /// Stub for `SignBlob`: signs a blob using a service account's system-managed private
    /// key.
    ///
    /// # Panics
    ///
    /// The first call panics if it is made outside a Tokio runtime and the channel has not
    /// been created yet; see [`grpc_channel`](Self::grpc_channel).
    pub fn sign_blob_stub(&self) -> &UnaryStub<SignBlobRequest, SignBlobResponse> {
        self.stubs
            .sign_blob
            .get_or_init(|| self.new_stub(SIGN_BLOB_ROUTE))
    }

    /// Stub for `SignJwt`: signs a JWT using a service account's system-managed private
    /// key.
    ///
    /// # Panics
    ///
    /// The first call panics if it is made outside a Tokio runtime and the channel has not
    /// been created yet; see [`grpc_channel`](Self::grpc_channel).
    pub fn sign_jwt_stub(&self) -> &UnaryStub<SignJwtRequest, SignJwtResponse> {
        self.stubs
            .sign_jwt
            .get_or_init(|| self.new_stub(SIGN_JWT_ROUTE))
    }

    fn new_stub<Req, Resp>(&self, route: &'static str) -> UnaryStub<Req, Resp>
    where
        Req: prost::Message + super::ResourceRequest + Send + Sync + 'static,
        Resp: prost::Message + Default + Send + Sync + 'static,
    {
        UnaryStub::new(route, self.grpc_channel().clone(), self.metadata.clone())
    }
}

impl fmt::Debug for IamCredentialsGrpcTransport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("IamCredentialsGrpcTransport")
            .field("host", &self.target)
            .field("scopes", &self.scopes)
            .field("channel_provided", &matches!(self.source, ChannelSource::Provided(_)))
            .field("channel_created", &self.channel.get().is_some())
            .field("authenticated", &self.metadata.is_authenticated())
            .finish_non_exhaustive()
    }
}

impl IamCredentialsTransport for IamCredentialsGrpcTransport {
    async fn generate_access_token(
        &self,
        request: GenerateAccessTokenRequest,
    ) -> Result<GenerateAccessTokenResponse, Error> {
        self.generate_access_token_stub().call(request).await
    }

    async fn generate_id_token(
        &self,
        request: GenerateIdTokenRequest,
    ) -> Result<GenerateIdTokenResponse, Error> {
        self.generate_id_token_stub().call(request).await
    }

    async fn sign_blob(&self, request: SignBlobRequest) -> Result<SignBlobResponse, Error> {
        self.sign_blob_stub().call(request).await
    }

    async fn sign_jwt(&self, request: SignJwtRequest) -> Result<SignJwtResponse, Error> {
        self.sign_jwt_stub().call(request).await
    }
}

/// Builder for [`IamCredentialsGrpcTransport`].
///
/// The channel is chosen in this order:
///
/// 1. an explicit [`channel`](Self::channel): used as is, with the call credentials it
///    carries; the builder's own credentials are ignored;
/// 2. an [`api_mtls_endpoint`](Self::api_mtls_endpoint): overrides the host and presents
///    the certificate from [`client_cert_source`](Self::client_cert_source) or from the
///    application default client certificate source;
/// 3. otherwise a TLS channel to [`host`](Self::host).
#[derive(Default)]
pub struct IamCredentialsGrpcTransportBuilder {
    host: Option<String>,
    credentials: Option<Arc<dyn Credentials>>,
    credentials_file: Option<PathBuf>,
    scopes: Option<Vec<String>>,
    channel: Option<AuthenticatedChannel>,
    api_mtls_endpoint: Option<String>,
    client_cert_source: Option<ClientCertSource>,
    quota_project_id: Option<String>,
}

impl fmt::Debug for IamCredentialsGrpcTransportBuilder {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("IamCredentialsGrpcTransportBuilder")
            .field("host", &self.host)
            .field("credentials", &self.credentials)
            .field("credentials_file", &self.credentials_file)
            .field("scopes", &self.scopes)
            .field(
                "channel_authenticated",
                &self.channel.as_ref().map(AuthenticatedChannel::is_authenticated),
            )
            .field("api_mtls_endpoint", &self.api_mtls_endpoint)
            .field(
                "client_cert_source",
                &self.client_cert_source.as_ref().map(|_| "<ClientCertSource>"),
            )
            .field("quota_project_id", &self.quota_project_id)
            .finish()
    }
}

impl IamCredentialsGrpcTransportBuilder {
    /// Host to connect to, `host[:port]`. Defaults to `iamcredentials.googleapis.com`.
    #[must_use]
    pub fn host(mut self, host: impl Into<String>) -> Self {
        self.host = Some(host.into());
        self
    }

    /// Call credentials attached to every request. Ignored when a channel is provided.
    ///
    /// The credentials are used as given; configure their scopes beforehand.
    #[must_use]
    pub fn credentials(mut self, credentials: Arc<dyn Credentials>) -> Self {
        self.credentials = Some(credentials);
        self
    }

    /// JSON key file to load call credentials from. Ignored when a channel is provided.
    #[must_use]
    pub fn credentials_file(mut self, path: impl Into<PathBuf>) -> Self {
        self.credentials_file = Some(path.into());
        self
    }

    /// OAuth scopes for file and default credentials.
    #[must_use]
    pub fn scopes<I>(mut self, scopes: I) -> Self
    where
        I: IntoIterator,
        I::Item: Into<String>,
    {
        self.scopes = Some(scopes.into_iter().map(Into::into).collect());
        self
    }

    /// A pre-built channel to send calls through.
    ///
    /// An [`AuthenticatedChannel`], such as one returned by
    /// [`create_channel`](super::create_channel), keeps its call credentials. A bare
    /// [`Channel`] sends no `authorization` header.
    #[must_use]
    pub fn channel(mut self, channel: impl Into<AuthenticatedChannel>) -> Self {
        self.channel = Some(channel.into());
        self
    }

    /// Mutual-TLS endpoint. Overrides [`host`](Self::host); `:443` is appended when it has
    /// no port.
    #[must_use]
    pub fn api_mtls_endpoint(mut self, endpoint: impl Into<String>) -> Self {
        self.api_mtls_endpoint = Some(endpoint.into());
        self
    }

    /// Callback providing the PEM client certificate and key. Only used together with
    /// [`api_mtls_endpoint`](Self::api_mtls_endpoint).
    #[must_use]
    pub fn client_cert_source(mut self, source: ClientCertSource) -> Self {
        self.client_cert_source = Some(source);
        self
    }

    /// Project billed for quota.
    #[must_use]
    pub fn quota_project_id(mut self, project: impl Into<String>) -> Self {
        self.quota_project_id = Some(project.into());
        self
    }

    /// Builds the transport.
    ///
    /// Credentials are resolved and the client certificate source is invoked here; the
    /// channel itself is created on first use.
    ///
    /// # Errors
    ///
    /// Returns [`Error::DuplicateCredentialArgs`] if both credentials and a credentials
    /// file are set, [`Error::MutualTlsChannel`] if the client certificate cannot be
    /// obtained, and any error resolving the host, credentials or TLS configuration.
    pub fn build(self) -> Result<IamCredentialsGrpcTransport, Error> {
        let scopes = self.scopes.unwrap_or_else(default_scopes);

        if let Some(AuthenticatedChannel { channel, metadata }) = self.channel {
            let target = Target::parse(self.host.as_deref().unwrap_or(DEFAULT_HOST))?;
            log_info!(
                "using provided channel for {target} (authenticated: {})",
                metadata.is_authenticated()
            );
            return Ok(IamCredentialsGrpcTransport::from_parts(
                target,
                scopes,
                ChannelSource::Provided(channel),
                metadata,
            ));
        }

        let (host, client_certificate) = match self.api_mtls_endpoint {
            Some(mtls_endpoint) => {
                let source = self.client_cert_source.or_else(default_client_cert_source);
                let certificate = source.map(|source| source()).transpose()?;
                log_info!(
                    "using mutual TLS endpoint {mtls_endpoint} (client certificate: {})",
                    certificate.is_some()
                );
                (Some(mtls_endpoint), certificate)
            }
            None => (self.host, None),
        };

        let PreparedChannel {
            target,
            scopes,
            endpoint,
            metadata,
        } = channel::prepare(ChannelConfig {
            host,
            credentials: self.credentials,
            credentials_file: self.credentials_file,
            scopes: Some(scopes),
            quota_project_id: self.quota_project_id,
            client_certificate,
        })?;

        Ok(IamCredentialsGrpcTransport::from_parts(
            target,
            scopes,
            ChannelSource::Lazy(endpoint),
            metadata,
        ))
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicUsize, Ordering};

    use super::*;
    use crate::credentials::AccessTokenCredentials;
    use crate::transport::{create_channel, ClientCertificate, MutualTlsError};

    const CERT: &str = include_str!("../../tests/testdata/client-cert.pem");
    const KEY: &str = include_str!("../../tests/testdata/client-key.pem");

    fn token() -> Arc<dyn Credentials> {
        Arc::new(AccessTokenCredentials::new("tok").unwrap())
    }

    fn counting_source(calls: Arc<AtomicUsize>) -> ClientCertSource {
        Arc::new(move || {
            calls.fetch_add(1, Ordering::SeqCst);
            Ok(ClientCertificate::new(CERT, KEY))
        })
    }

    #[tokio::test]
    async fn channel_is_created_once() {
        let transport = IamCredentialsGrpcTransport::builder()
            .host("127.0.0.1:1")
            .credentials(token())
            .build()
            .unwrap();

        assert!(transport.channel.get().is_none());
        let first = transport.grpc_channel();
        let second = transport.grpc_channel();
        assert!(std::ptr::eq(first, second));
    }

    #[tokio::test]
    async fn stubs_are_created_once() {
        let transport = IamCredentialsGrpcTransport::builder()
            .host("127.0.0.1:1")
            .credentials(token())
            .build()
            .unwrap();

        assert!(std::ptr::eq(
            transport.generate_access_token_stub(),
            transport.generate_access_token_stub()
        ));
        assert!(std::ptr::eq(
            transport.generate_id_token_stub(),
            transport.generate_id_token_stub()
        ));
        assert!(std::ptr::eq(transport.sign_blob_stub(), transport.sign_blob_stub()));
        assert!(std::ptr::eq(transport.sign_jwt_stub(), transport.sign_jwt_stub()));
    }

    #[tokio::test]
    async fn stubs_are_bound_to_their_routes() {
        let transport = IamCredentialsGrpcTransport::builder()
            .host("127.0.0.1:1")
            .credentials(token())
            .build()
            .unwrap();

        assert_eq!(
            transport.generate_access_token_stub().route(),
            "/google.iam.credentials.v1.IAMCredentials/GenerateAccessToken"
        );
        assert_eq!(
            transport.generate_id_token_stub().route(),
            "/google.iam.credentials.v1.IAMCredentials/GenerateIdToken"
        );
        assert_eq!(
            transport.sign_blob_stub().route(),
            "/google.iam.credentials.v1.IAMCredentials/SignBlob"
        );
        assert_eq!(
            transport.sign_jwt_stub().route(),
            "/google.iam.credentials.v1.IAMCredentials/SignJwt"
        );
    }

    #[tokio::test]
    async fn created_channel_keeps_its_credentials() {
        let authenticated = create_channel(ChannelConfig {
            host: Some("127.0.0.1:1".into()),
            credentials: Some(token()),
            quota_project_id: Some("billing".into()),
            ..ChannelConfig::default()
        })
        .unwrap();
        let transport = IamCredentialsGrpcTransport::builder()
            .channel(authenticated)
            .build()
            .unwrap();

        assert!(transport.metadata.is_authenticated());
        assert!(matches!(transport.source, ChannelSource::Provided(_)));

        let mut request = tonic::Request::new(());
        transport.metadata.apply(&mut request, "").unwrap();
        assert_eq!(request.metadata().get("authorization").unwrap(), "Bearer tok");
        assert_eq!(request.metadata().get("x-goog-user-project").unwrap(), "billing");
    }

    #[tokio::test]
    async fn provided_channel_ignores_credentials() {
        let channel = Endpoint::from_static("http://127.0.0.1:1").connect_lazy();
        let transport = IamCredentialsGrpcTransport::builder()
            .channel(channel)
            .credentials(token())
            .credentials_file("/does/not/exist.json")
            .build()
            .unwrap();

        assert!(!transport.metadata.is_authenticated());
        assert!(matches!(transport.source, ChannelSource::Provided(_)));
        assert_eq!(transport.host().to_string(), "iamcredentials.googleapis.com:443");
    }

    #[test]
    #[should_panic]
    fn stub_outside_runtime_panics() {
        let transport = IamCredentialsGrpcTransport::builder()
            .host("127.0.0.1:1")
            .credentials(token())
            .build()
            .unwrap();
        transport.sign_blob_stub();
    }

    #[test]
    fn duplicate_credentials_are_rejected() {
        let err = IamCredentialsGrpcTransport::builder()
            .credentials(token())
            .credentials_file("/does/not/exist.json")
            .build()
            .unwrap_err();
        assert!(matches!(err, Error::DuplicateCredentialArgs));
    }

    #[test]
    fn defaults() {
        let transport = IamCredentialsGrpcTransport::builder()
            .credentials(token())
            .build()
            .unwrap();
        assert_eq!(transport.host().to_string(), "iamcredentials.googleapis.com:443");
        assert_eq!(
            transport.scopes(),
            ["https://www.googleapis.com/auth/cloud-platform"]
        );
        assert!(transport.metadata.is_authenticated());
    }

    #[test]
    fn host_without_port_gets_443() {
        let transport = IamCredentialsGrpcTransport::builder()
            .host("iamcredentials.example.com")
            .credentials(token())
            .build()
            .unwrap();
        assert_eq!(transport.host().port(), 443);
    }

    #[test]
    fn mtls_endpoint_overrides_host() {
        let calls = Arc::new(AtomicUsize::new(0));
        let transport = IamCredentialsGrpcTransport::builder()
            .host("ignored.example.com")
            .api_mtls_endpoint("iamcredentials.mtls.googleapis.com")
            .client_cert_source(counting_source(calls.clone()))
            .credentials(token())
            .build()
            .unwrap();

        assert_eq!(
            transport.host().to_string(),
            "iamcredentials.mtls.googleapis.com:443"
        );
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn client_cert_source_is_unused_without_mtls_endpoint() {
        let calls = Arc::new(AtomicUsize::new(0));
        IamCredentialsGrpcTransport::builder()
            .client_cert_source(counting_source(calls.clone()))
            .credentials(token())
            .build()
            .unwrap();
        assert_eq!(calls.load(Ordering::SeqCst), 0);
    }

    #[test]
    fn client_cert_source_errors_are_surfaced() {
        let source: ClientCertSource =
            Arc::new(|| Err(MutualTlsError::Source("no certificate available".into())));
        let err = IamCredentialsGrpcTransport::builder()
            .api_mtls_endpoint("iamcredentials.mtls.googleapis.com")
            .client_cert_source(source)
            .credentials(token())
            .build()
            .unwrap_err();
        assert!(matches!(err, Error::MutualTlsChannel(MutualTlsError::Source(_))));
    }

    #[test]
    fn debug_does_not_leak_credentials() {
        let transport = IamCredentialsGrpcTransport::builder()
            .credentials(token())
            .build()
            .unwrap();
        let debug = format!("{transport:?}");
        assert!(debug.contains("channel_created: false"));
        assert!(!debug.contains("tok\""));
    }
}
