//! Channel construction: TLS endpoint setup and call credential resolution.

use std::fmt;
use std::path::PathBuf;
use std::sync::Arc;

use tonic::transport::{Channel, ClientTlsConfig, Endpoint, Identity};

use super::metadata::CallMetadata;
use super::mtls::ClientCertificate;
use crate::constants::{AUTH_SCOPES, DEFAULT_HOST};
use crate::credentials::{default_credentials, load_credentials_from_file, Credentials};
use crate::endpoint::Target;
use crate::error::Error;
use crate::observability::log_debug;

const USER_AGENT: &str = concat!("iam-credentials-rust/", env!("CARGO_PKG_VERSION"));

/// Options for [`create_channel`].
///
/// Call credentials are taken from `credentials`, then `credentials_file`, then application
/// default credentials. `credentials` and `credentials_file` are mutually exclusive.
#[derive(Clone, Default)]
pub struct ChannelConfig {
    /// Service host, `host[:port]`. Defaults to `iamcredentials.googleapis.com`.
    pub host: Option<String>,
    /// Explicit call credentials.
    pub credentials: Option<Arc<dyn Credentials>>,
    /// Path of a JSON key file to load call credentials from.
    pub credentials_file: Option<PathBuf>,
    /// OAuth scopes applied to file and default credentials. Defaults to
    /// [`AUTH_SCOPES`].
    pub scopes: Option<Vec<String>>,
    /// Project billed for quota.
    pub quota_project_id: Option<String>,
    /// Client certificate presented for mutual TLS.
    pub client_certificate: Option<ClientCertificate>,
}

impl fmt::Debug for ChannelConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ChannelConfig")
            .field("host", &self.host)
            .field("credentials", &self.credentials)
            .field("credentials_file", &self.credentials_file)
            .field("scopes", &self.scopes)
            .field("quota_project_id", &self.quota_project_id)
            .field("mutual_tls", &self.client_certificate.is_some())
            .finish()
    }
}

/// A channel together with the call credentials to attach to every request on it.
///
/// Hand it to [`IamCredentialsGrpcTransportBuilder::channel`] to send authenticated calls
/// through it. A bare [`Channel`] converts into an unauthenticated one.
///
/// [`IamCredentialsGrpcTransportBuilder::channel`]: super::IamCredentialsGrpcTransportBuilder::channel
#[derive(Clone, Debug)]
pub struct AuthenticatedChannel {
    /// The gRPC channel.
    pub channel: Channel,
    pub(crate) metadata: CallMetadata,
}

impl AuthenticatedChannel {
    /// Pairs an existing channel with call credentials.
    ///
    /// An explicit `quota_project_id` wins over the one carried by the credentials.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Credentials`] if the quota project cannot be sent as metadata.
    pub fn new(
        channel: Channel,
        credentials: Arc<dyn Credentials>,
        quota_project_id: Option<&str>,
    ) -> Result<Self, Error> {
        Ok(Self {
            channel,
            metadata: CallMetadata::authenticated(credentials, quota_project_id)?,
        })
    }

    /// Whether calls on this channel carry an `authorization` header.
    pub fn is_authenticated(&self) -> bool {
        self.metadata.is_authenticated()
    }
}

impl From<Channel> for AuthenticatedChannel {
    fn from(channel: Channel) -> Self {
        Self {
            channel,
            metadata: CallMetadata::unauthenticated(),
        }
    }
}

/// Creates a channel to the IAM Credentials API.
///
/// The channel connects lazily on first use. Must be called from within a Tokio runtime.
///
/// # Errors
///
/// Returns [`Error::DuplicateCredentialArgs`] if both `credentials` and
/// `credentials_file` are set, or any error resolving the host, the credentials or the
/// TLS configuration.
pub fn create_channel(config: ChannelConfig) -> Result<AuthenticatedChannel, Error> {
    let prepared = prepare(config)?;
    Ok(AuthenticatedChannel {
        channel: prepared.endpoint.connect_lazy(),
        metadata: prepared.metadata,
    })
}

/// A configured endpoint that has not been connected yet.
#[derive(Debug)]
pub(crate) struct PreparedChannel {
    pub(crate) target: Target,
    pub(crate) scopes: Vec<String>,
    pub(crate) endpoint: Endpoint,
    pub(crate) metadata: CallMetadata,
}

pub(crate) fn prepare(config: ChannelConfig) -> Result<PreparedChannel, Error> {
    let target = Target::parse(config.host.as_deref().unwrap_or(DEFAULT_HOST))?;
    let scopes = config.scopes.unwrap_or_else(default_scopes);
    let credentials = resolve_credentials(
        config.credentials,
        config.credentials_file,
        &scopes,
        config.quota_project_id.as_deref(),
    )?;
    let metadata = CallMetadata::authenticated(credentials, config.quota_project_id.as_deref())?;
    let endpoint = tls_endpoint(&target, config.client_certificate.as_ref())?;

    Ok(PreparedChannel {
        target,
        scopes,
        endpoint,
        metadata,
    })
}

pub(crate) fn default_scopes() -> Vec<String> {
    AUTH_SCOPES.iter().map(|s| (*s).to_owned()).collect()
}

pub(crate) fn resolve_credentials(
    credentials: Option<Arc<dyn Credentials>>,
    credentials_file: Option<PathBuf>,
    scopes: &[String],
    quota_project_id: Option<&str>,
) -> Result<Arc<dyn Credentials>, Error> {
    match (credentials, credentials_file) {
        (Some(_), Some(_)) => Err(Error::DuplicateCredentialArgs),
        (Some(credentials), None) => Ok(credentials),
        (None, Some(path)) => Ok(load_credentials_from_file(
            path,
            scopes.iter().cloned(),
            quota_project_id,
        )?),
        (None, None) => Ok(default_credentials(scopes.iter().cloned(), quota_project_id)?),
    }
}

pub(crate) fn tls_endpoint(
    target: &Target,
    client_certificate: Option<&ClientCertificate>,
) -> Result<Endpoint, Error> {
    let mut tls = ClientTlsConfig::new()
        .domain_name(target.server_name())
        .with_webpki_roots();

    if let Some(certificate) = client_certificate {
        certificate.validate()?;
        tls = tls.identity(Identity::from_pem(
            certificate.cert_chain_pem(),
            certificate.private_key_pem(),
        ));
    }

    log_debug!(
        "configured TLS endpoint {} (mutual TLS: {})",
        target,
        client_certificate.is_some()
    );

    Ok(Endpoint::from_shared(target.uri())?
        .user_agent(USER_AGENT)?
        .tls_config(tls)?)
}
