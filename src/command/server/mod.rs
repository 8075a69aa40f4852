mod router;

use argh::FromArgs;
use http_body_util::BodyExt;
use hyper::body::Incoming;
use hyper::header::CONTENT_TYPE;
use hyper::service::service_fn;
use hyper::{Request, Response, StatusCode};
use hyper_util::rt::{TokioExecutor, TokioIo};
use hyper_util::server::conn::auto;
use serde::Serialize;
use std::convert::Infallible;
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::net::TcpListener;
use tracing::{debug, info, warn};

use crate::command;
use crate::configuration::ServerConfig;
use crate::registry::api::{Body, RequestExt, DOCKER_DISTRIBUTION_API_VERSION};
use crate::registry::{Error, Registry};
use router::Route;

#[derive(FromArgs, PartialEq, Debug)]
#[argh(subcommand, name = "serve", description = "Run the registry server")]
pub struct Options {}

pub struct Command {
    binding_address: SocketAddr,
    registry: Arc<Registry>,
}

impl Command {
    pub fn new(config: &ServerConfig, registry: Registry) -> Self {
        Self {
            binding_address: SocketAddr::new(config.bind_address, config.port),
            registry: Arc::new(registry),
        }
    }

    pub async fn run(&self) -> Result<(), command::Error> {
        info!("Listening on {}", self.binding_address);
        let listener = TcpListener::bind(self.binding_address).await?;

        loop {
            let (tcp, remote_address) = listener.accept().await?;
            debug!("Accepted connection from {remote_address}");

            let stream = TokioIo::new(tcp);
            let registry = self.registry.clone();

            tokio::spawn(async move {
                let service = service_fn(move |request| {
                    let registry = registry.clone();
                    async move { Ok::<_, Infallible>(serve_request(&registry, request).await) }
                });

                if let Err(e) = auto::Builder::new(TokioExecutor::new())
                    .serve_connection(stream, service)
                    .await
                {
                    debug!("Connection terminated: {e}");
                }
            });
        }
    }
}

async fn serve_request(registry: &Registry, request: Request<Incoming>) -> Response<Body> {
    let method = request.method().clone();
    let uri = request.uri().clone();

    let result = dispatch(registry, request).await;

    match result {
        Ok(response) => response,
        Err(error) => {
            warn!("{method} {} failed: {error}", uri.path());
            error_response(&error)
        }
    }
}

async fn dispatch(
    registry: &Registry,
    request: Request<Incoming>,
) -> Result<Response<Body>, Error> {
    let method = request.method().clone();
    let uri = request.uri().clone();

    match router::parse(&method, &uri) {
        Route::ApiVersion => Ok(Response::builder()
            .status(StatusCode::OK)
            .header(DOCKER_DISTRIBUTION_API_VERSION, "registry/2.0")
            .body(Body::empty())?),
        Route::ListCatalog { n, last } => registry.handle_list_catalog(n, last).await,
        Route::ListTags { namespace, n, last } => {
            registry.handle_list_tags(namespace, n, last).await
        }
        Route::GetManifest {
            namespace,
            reference,
        } => registry.handle_get_manifest(namespace, &reference).await,
        Route::HeadManifest {
            namespace,
            reference,
        } => registry.handle_head_manifest(namespace, &reference).await,
        Route::PutManifest {
            namespace,
            reference,
        } => {
            let content_type = request.get_header(CONTENT_TYPE);
            let body = collect_body(request).await?;
            registry
                .handle_put_manifest(namespace, &reference, content_type.as_deref(), &body)
                .await
        }
        Route::DeleteManifest {
            namespace,
            reference,
        } => registry.handle_delete_manifest(namespace, &reference).await,
        Route::GetReferrers {
            namespace,
            digest,
            artifact_type,
        } => {
            registry
                .handle_get_referrers(namespace, &digest, artifact_type.as_deref())
                .await
        }
        Route::OrasReferrers {
            namespace,
            digest,
            query,
        } => registry.handle_oras_referrers(namespace, &digest, &query).await,
        Route::Extension { path } => {
            let routes = registry.extension_routes();
            let Some(route) = routes.iter().find(|route| path.ends_with(&route.path()))
            else {
                return not_found();
            };

            let dispatcher = route.dispatcher.clone();
            let (parts, body) = request.into_parts();
            let body = body
                .collect()
                .await
                .map_err(|e| Error::Internal(format!("failed to read request body: {e}")))?
                .to_bytes();

            dispatcher.dispatch(Request::from_parts(parts, body)).await
        }
        Route::Unknown => not_found(),
    }
}

async fn collect_body(request: Request<Incoming>) -> Result<Vec<u8>, Error> {
    let collected = request
        .into_body()
        .collect()
        .await
        .map_err(|e| Error::Internal(format!("failed to read request body: {e}")))?;
    Ok(collected.to_bytes().to_vec())
}

fn not_found() -> Result<Response<Body>, Error> {
    Ok(Response::builder()
        .status(StatusCode::NOT_FOUND)
        .body(Body::empty())?)
}

#[derive(Serialize)]
struct ErrorEnvelope {
    errors: Vec<ErrorEntry>,
}

#[derive(Serialize)]
struct ErrorEntry {
    code: &'static str,
    message: String,
}

fn error_response(error: &Error) -> Response<Body> {
    let (status, code) = match error {
        Error::BlobUnknown(_) => (StatusCode::NOT_FOUND, "BLOB_UNKNOWN"),
        Error::ManifestUnknown(_) | Error::ManifestUnknownRevision(_) => {
            (StatusCode::NOT_FOUND, "MANIFEST_UNKNOWN")
        }
        Error::Driver(e) if e.is_path_not_found() => (StatusCode::NOT_FOUND, "NAME_UNKNOWN"),
        Error::DigestInvalid => (StatusCode::BAD_REQUEST, "DIGEST_INVALID"),
        Error::NameInvalid(_) => (StatusCode::BAD_REQUEST, "NAME_INVALID"),
        Error::MalformedNextToken(_) => (StatusCode::BAD_REQUEST, "MALFORMED_NEXT_TOKEN"),
        Error::ManifestVerification(_) | Error::ManifestInvalid(_) => {
            (StatusCode::BAD_REQUEST, "MANIFEST_INVALID")
        }
        Error::ManifestFormatUnsupported(_) | Error::Unsupported(_) => {
            (StatusCode::BAD_REQUEST, "UNSUPPORTED")
        }
        Error::Driver(_) | Error::Internal(_) => {
            (StatusCode::INTERNAL_SERVER_ERROR, "UNKNOWN")
        }
    };

    let envelope = ErrorEnvelope {
        errors: vec![ErrorEntry {
            code,
            message: error.to_string(),
        }],
    };
    let body = serde_json::to_vec(&envelope).unwrap_or_default();

    Response::builder()
        .status(status)
        .header(CONTENT_TYPE, "application/json")
        .body(Body::fixed(body))
        .unwrap_or_else(|_| Response::new(Body::empty()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::registry::oci::Digest;

    #[test]
    fn test_error_response_status_codes() {
        let cases = [
            (
                Error::ManifestUnknownRevision(Digest::from_bytes(b"x")),
                StatusCode::NOT_FOUND,
            ),
            (Error::DigestInvalid, StatusCode::BAD_REQUEST),
            (
                Error::MalformedNextToken("bad".to_string()),
                StatusCode::BAD_REQUEST,
            ),
            (
                Error::Internal("boom".to_string()),
                StatusCode::INTERNAL_SERVER_ERROR,
            ),
        ];

        for (error, status) in cases {
            assert_eq!(error_response(&error).status(), status);
        }
    }
}
