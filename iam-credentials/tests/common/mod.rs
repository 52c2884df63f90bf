//! In-process IAM Credentials server used by the integration tests.

use std::convert::Infallible;
use std::net::SocketAddr;
use std::sync::{Arc, Mutex};
use std::task::{Context, Poll};

use iam_credentials::constants::{
    GENERATE_ACCESS_TOKEN_ROUTE, GENERATE_ID_TOKEN_ROUTE, SERVICE_NAME, SIGN_BLOB_ROUTE,
    SIGN_JWT_ROUTE,
};
use iam_credentials::pb::google::iam::credentials::v1::{
    GenerateAccessTokenRequest, GenerateAccessTokenResponse, GenerateIdTokenRequest,
    GenerateIdTokenResponse, SignBlobRequest, SignBlobResponse, SignJwtRequest, SignJwtResponse,
};
use tokio_stream::wrappers::TcpListenerStream;
use tonic::body::Body;
use tonic::codegen::{http, BoxFuture, Service};
use tonic::metadata::MetadataMap;
use tonic::server::{Grpc, NamedService, UnaryService};
use tonic::transport::{Channel, Endpoint, Server};
use tonic::{Request, Response, Status};
use tonic_prost::ProstCodec;

pub const KEY_ID: &str = "fake-key-id";

/// Service accounts whose name contains this are refused with `PERMISSION_DENIED`.
pub const DENIED: &str = "denied";

#[derive(Debug, Clone)]
pub struct RecordedCall {
    pub route: &'static str,
    pub metadata: MetadataMap,
}

#[derive(Debug, Clone, Default)]
pub struct FakeIamCredentials {
    calls: Arc<Mutex<Vec<RecordedCall>>>,
}

impl FakeIamCredentials {
    pub fn calls(&self) -> Vec<RecordedCall> {
        self.calls.lock().unwrap().clone()
    }

    /// Serves on an ephemeral localhost port and returns a plaintext channel to it.
    pub async fn serve(&self) -> (SocketAddr, Channel) {
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let service = self.clone();

        tokio::spawn(async move {
            Server::builder()
                .add_service(service)
                .serve_with_incoming(TcpListenerStream::new(listener))
                .await
                .unwrap();
        });

        let channel = Endpoint::from_shared(format!("http://{addr}"))
            .unwrap()
            .connect_lazy();
        (addr, channel)
    }

    fn dispatch<Req, Resp>(
        &self,
        route: &'static str,
        request: http::Request<Body>,
        respond: fn(Req) -> Result<Resp, Status>,
    ) -> BoxFuture<http::Response<Body>, Infallible>
    where
        Req: prost::Message + Default + Send + 'static,
        Resp: prost::Message + Send + 'static,
    {
        let service = Unary {
            calls: self.calls.clone(),
            route,
            respond,
        };
        Box::pin(async move {
            let mut grpc = Grpc::new(ProstCodec::<Resp, Req>::default());
            Ok(grpc.unary(service, request).await)
        })
    }
}

struct Unary<Req, Resp> {
    calls: Arc<Mutex<Vec<RecordedCall>>>,
    route: &'static str,
    respond: fn(Req) -> Result<Resp, Status>,
}

impl<Req, Resp> UnaryService<Req> for Unary<Req, Resp>
where
    Req: Send + 'static,
    Resp: Send + 'static,
{
    type Response = Resp;
    type Future = BoxFuture<Response<Resp>, Status>;

    fn call(&mut self, request: Request<Req>) -> Self::Future {
        self.calls.lock().unwrap().push(RecordedCall {
            route: self.route,
            metadata: request.metadata().clone(),
        });
        let result = (self.respond)(request.into_inner()).map(Response::new);
        Box::pin(async move { result })
    }
}

impl Service<http::Request<Body>> for FakeIamCredentials {
    type Response = http::Response<Body>;
    type Error = Infallible;
    type Future = BoxFuture<Self::Response, Self::Error>;

    fn poll_ready(&mut self, _cx: &mut Context<'_>) -> Poll<Result<(), Self::Error>> {
        Poll::Ready(Ok(()))
    }

    fn call(&mut self, request: http::Request<Body>) -> Self::Future {
        let path = request.uri().path().to_owned();
        match path.as_str() {
            GENERATE_ACCESS_TOKEN_ROUTE => {
                self.dispatch(GENERATE_ACCESS_TOKEN_ROUTE, request, generate_access_token)
            }
            GENERATE_ID_TOKEN_ROUTE => {
                self.dispatch(GENERATE_ID_TOKEN_ROUTE, request, generate_id_token)
            }
            SIGN_BLOB_ROUTE => self.dispatch(SIGN_BLOB_ROUTE, request, sign_blob),
            SIGN_JWT_ROUTE => self.dispatch(SIGN_JWT_ROUTE, request, sign_jwt),
            _ => Box::pin(async { Ok(Status::unimplemented("unknown method").into_http()) }),
        }
    }
}

impl NamedService for FakeIamCredentials {
    const NAME: &'static str = SERVICE_NAME;
}

fn check_access(name: &str) -> Result<(), Status> {
    if name.contains(DENIED) {
        return Err(Status::permission_denied(format!(
            "Permission 'iam.serviceAccounts.getAccessToken' denied on resource {name}"
        )));
    }
    Ok(())
}

fn generate_access_token(
    request: GenerateAccessTokenRequest,
) -> Result<GenerateAccessTokenResponse, Status> {
    check_access(&request.name)?;
    let lifetime = request.lifetime.map_or(3600, |d| d.seconds);
    Ok(GenerateAccessTokenResponse {
        access_token: format!("ya29.{}", request.scope.join("+")),
        expire_time: Some(prost_types::Timestamp {
            seconds: 1_700_000_000 + lifetime,
            nanos: 0,
        }),
    })
}

fn generate_id_token(request: GenerateIdTokenRequest) -> Result<GenerateIdTokenResponse, Status> {
    check_access(&request.name)?;
    Ok(GenerateIdTokenResponse {
        token: format!("{}|email={}", request.audience, request.include_email),
    })
}

fn sign_blob(request: SignBlobRequest) -> Result<SignBlobResponse, Status> {
    check_access(&request.name)?;
    let mut signed = request.payload.to_vec();
    signed.reverse();
    Ok(SignBlobResponse {
        key_id: KEY_ID.into(),
        signed_blob: signed.into(),
    })
}

fn sign_jwt(request: SignJwtRequest) -> Result<SignJwtResponse, Status> {
    check_access(&request.name)?;
    Ok(SignJwtResponse {
        key_id: KEY_ID.into(),
        signed_jwt: format!("header.{}.signature", request.payload),
    })
}
