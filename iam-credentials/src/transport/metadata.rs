use std::sync::{Arc, LazyLock};

use tonic::metadata::{Ascii, MetadataValue};
use url::form_urlencoded;

use crate::credentials::{Credentials, CredentialsError};
use crate::error::Error;

const AUTHORIZATION_KEY: &str = "authorization";
const USER_PROJECT_KEY: &str = "x-goog-user-project";
const REQUEST_PARAMS_KEY: &str = "x-goog-request-params";
const API_CLIENT_KEY: &str = "x-goog-api-client";

static API_CLIENT_VALUE: LazyLock<MetadataValue<Ascii>> = LazyLock::new(|| {
    MetadataValue::from_static(concat!("gl-rust gccl/", env!("CARGO_PKG_VERSION")))
});

/// Per-call metadata shared by every stub of a transport.
///
/// Adds `authorization` and `x-goog-user-project` when credentials are configured, the
/// `x-goog-request-params` routing header naming the target resource, and
/// `x-goog-api-client`.
#[derive(Clone, Debug, Default)]
pub(crate) struct CallMetadata {
    credentials: Option<Arc<dyn Credentials>>,
    user_project: Option<MetadataValue<Ascii>>,
}

impl CallMetadata {
    /// Metadata for a caller-supplied channel: no call credentials are attached.
    pub(crate) fn unauthenticated() -> Self {
        Self::default()
    }

    /// An explicit `quota_project_id` wins over the one carried by the credentials.
    pub(crate) fn authenticated(
        credentials: Arc<dyn Credentials>,
        quota_project_id: Option<&str>,
    ) -> Result<Self, Error> {
        let user_project = quota_project_id
            .or_else(|| credentials.quota_project_id())
            .map(|project| {
                MetadataValue::try_from(project).map_err(|_| CredentialsError::InvalidHeaderValue)
            })
            .transpose()?;

        Ok(Self {
            credentials: Some(credentials),
            user_project,
        })
    }

    pub(crate) fn is_authenticated(&self) -> bool {
        self.credentials.is_some()
    }

    pub(crate) fn apply<T>(
        &self,
        request: &mut tonic::Request<T>,
        resource_name: &str,
    ) -> Result<(), Error> {
        let metadata = request.metadata_mut();

        if let Some(credentials) = &self.credentials {
            metadata.insert(AUTHORIZATION_KEY, credentials.authorization()?);
        }
        if let Some(project) = &self.user_project {
            metadata.insert(USER_PROJECT_KEY, project.clone());
        }
        if !resource_name.is_empty() {
            let encoded: String = form_urlencoded::byte_serialize(resource_name.as_bytes()).collect();
            let value = MetadataValue::try_from(format!("name={encoded}"))
                .map_err(|_| CredentialsError::InvalidHeaderValue)?;
            metadata.insert(REQUEST_PARAMS_KEY, value);
        }
        metadata.insert(API_CLIENT_KEY, API_CLIENT_VALUE.clone());

        Ok(())
    }
}
