//! Per-method unary call stubs.

use std::fmt;
use std::marker::PhantomData;

use tonic::client::Grpc;
use tonic::codegen::http::uri::PathAndQuery;
use tonic::transport::Channel;
use tonic::GrpcMethod;
use tonic_prost::ProstCodec;

use super::metadata::CallMetadata;
use crate::constants::SERVICE_NAME;
use crate::error::Error;
use crate::observability::log_debug;
use crate::pb::google::iam::credentials::v1::{
    GenerateAccessTokenRequest, GenerateIdTokenRequest, SignBlobRequest, SignJwtRequest,
};

/// A request addressed to a service account resource.
///
/// The resource name is sent as the `x-goog-request-params` routing header.
pub trait ResourceRequest {
    /// The `projects/-/serviceAccounts/{account}` name the request targets.
    fn resource_name(&self) -> &str;
}

macro_rules! impl_resource_request {
    ($($ty:ty),* $(,)?) => {
        $(
            impl ResourceRequest for $ty {
                fn resource_name(&self) -> &str {
                    &self.name
                }
            }
        )*
    };
}

impl_resource_request!(
    GenerateAccessTokenRequest,
    GenerateIdTokenRequest,
    SignBlobRequest,
    SignJwtRequest,
);

/// A callable bound to one fixed RPC route on a channel.
///
/// Stubs are cheap to call concurrently: each call clones the underlying channel handle.
pub struct UnaryStub<Req, Resp> {
    method: &'static str,
    path: PathAndQuery,
    grpc: Grpc<Channel>,
    metadata: CallMetadata,
    _messages: PhantomData<fn(Req) -> Resp>,
}

impl<Req, Resp> UnaryStub<Req, Resp>
where
    Req: prost::Message + ResourceRequest + Send + Sync + 'static,
    Resp: prost::Message + Default + Send + Sync + 'static,
{
    pub(crate) fn new(route: &'static str, channel: Channel, metadata: CallMetadata) -> Self {
        let method = route.rsplit('/').next().unwrap_or(route);
        log_debug!("creating stub for {route}");

        Self {
            method,
            path: PathAndQuery::from_static(route),
            grpc: Grpc::new(channel),
            metadata,
            _messages: PhantomData,
        }
    }

    /// The fully-qualified route, e.g. `/google.iam.credentials.v1.IAMCredentials/SignBlob`.
    pub fn route(&self) -> &str {
        self.path.as_str()
    }

    /// Sends `request` and waits for the response.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Credentials`] if call credentials cannot produce a token, and
    /// [`Error::Status`] for any status returned by the channel or the server.
    pub async fn call(&self, request: Req) -> Result<Resp, Error> {
        let mut grpc = self.grpc.clone();
        grpc.ready()
            .await
            .map_err(|e| tonic::Status::unknown(format!("service was not ready: {e}")))?;

        let resource_name = request.resource_name().to_owned();
        let mut request = tonic::Request::new(request);
        self.metadata.apply(&mut request, &resource_name)?;
        request
            .extensions_mut()
            .insert(GrpcMethod::new(SERVICE_NAME, self.method));

        let response = grpc
            .unary(request, self.path.clone(), ProstCodec::<Req, Resp>::default())
            .await?;
        Ok(response.into_inner())
    }
}

impl<Req, Resp> fmt::Debug for UnaryStub<Req, Resp> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("UnaryStub")
            .field("route", &self.path.as_str())
            .field("authenticated", &self.metadata.is_authenticated())
            .finish_non_exhaustive()
    }
}
