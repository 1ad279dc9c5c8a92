//! A small HTTP proxy in front of a `Store`, so that clients without a GitHub token can read and
//! write records. `ProxyStore` is its client.
//!
//! | Method | Path                   | Response                                               |
//! |--------|------------------------|--------------------------------------------------------|
//! | GET    | `/api/users/{user}`    | 200 with the record, or 404                            |
//! | POST   | `/api/update`          | 200 `{"revision": n}`, 400, or 409 when stale          |
//! | OPTIONS| any                    | 204 with CORS headers                                  |

use crate::api::proxy::{ErrorResponse, UpdateRequest, UpdateResponse};
use crate::api::Store;
use crate::error::StaleRecord;
use crate::session::validate_username;
use crate::{utils, Result};
use anyhow::Context;
use http_body_util::{BodyExt, Full, LengthLimitError, Limited};
use hyper::body::{Bytes, Incoming};
use hyper::header::{
    HeaderValue, ACCESS_CONTROL_ALLOW_HEADERS, ACCESS_CONTROL_ALLOW_METHODS,
    ACCESS_CONTROL_ALLOW_ORIGIN, CONTENT_TYPE,
};
use hyper::server::conn::http1;
use hyper::service::service_fn;
use hyper::{Method, Request, Response, StatusCode};
use hyper_util::rt::TokioIo;
use serde::Serialize;
use std::convert::Infallible;
use std::future::Future;
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::net::TcpListener;
use tracing::{debug, error, info, warn};

/// Largest accepted request body.
const MAX_BODY: usize = 4 * 1024 * 1024;

const USERS_PREFIX: &str = "/api/users/";
const UPDATE_PATH: &str = "/api/update";

type Body = Full<Bytes>;

/// A bound proxy server. Call `run` to start serving.
pub struct Server {
    listener: TcpListener,
    store: Arc<dyn Store>,
}

impl Server {
    /// Binds to `addr`. Use port 0 to let the OS pick one, then read it from `local_addr`.
    pub async fn bind(addr: SocketAddr, store: Arc<dyn Store>) -> Result<Self> {
        let listener = TcpListener::bind(addr)
            .await
            .with_context(|| format!("Unable to listen on {addr}"))?;
        Ok(Self { listener, store })
    }

    pub fn local_addr(&self) -> Result<SocketAddr> {
        self.listener
            .local_addr()
            .context("Unable to read the listening address")
    }

    /// Serves connections until `shutdown` completes. Connections already accepted finish on
    /// their own tasks.
    pub async fn run<F>(self, shutdown: F) -> Result<()>
    where
        F: Future<Output = ()>,
    {
        info!(
            "Serving the {} store on http://{}",
            self.store.name(),
            self.local_addr()?
        );
        tokio::pin!(shutdown);
        loop {
            tokio::select! {
                _ = &mut shutdown => {
                    info!("Shutting down the server");
                    return Ok(());
                }
                accepted = self.listener.accept() => {
                    let (stream, peer) = match accepted {
                        Ok(accepted) => accepted,
                        Err(e) => {
                            warn!("Failed to accept a connection: {e}");
                            continue;
                        }
                    };
                    let store = self.store.clone();
                    tokio::spawn(async move {
                        let service = service_fn(move |request| handle(store.clone(), request));
                        if let Err(e) = http1::Builder::new()
                            .serve_connection(TokioIo::new(stream), service)
                            .await
                        {
                            debug!("Connection from {peer} ended with an error: {e}");
                        }
                    });
                }
            }
        }
    }
}

async fn handle(
    store: Arc<dyn Store>,
    request: Request<Incoming>,
) -> std::result::Result<Response<Body>, Infallible> {
    let method = request.method().clone();
    let path = request.uri().path().to_string();
    let response = route(store.as_ref(), request).await;
    debug!("{method} {path} -> {}", response.status());
    Ok(response)
}

async fn route(store: &dyn Store, request: Request<Incoming>) -> Response<Body> {
    let path = request.uri().path().to_string();
    match (request.method(), path.as_str()) {
        (&Method::OPTIONS, _) => empty(StatusCode::NO_CONTENT),
        (&Method::GET, p) if p.starts_with(USERS_PREFIX) => {
            get_user(store, &p[USERS_PREFIX.len()..]).await
        }
        (&Method::POST, UPDATE_PATH) => update(store, request).await,
        (_, UPDATE_PATH) => failure(StatusCode::METHOD_NOT_ALLOWED, "Use POST"),
        (_, p) if p.starts_with(USERS_PREFIX) => failure(StatusCode::METHOD_NOT_ALLOWED, "Use GET"),
        _ => failure(StatusCode::NOT_FOUND, format!("No route for '{path}'")),
    }
}

async fn get_user(store: &dyn Store, encoded: &str) -> Response<Body> {
    if encoded.contains('/') {
        return failure(StatusCode::NOT_FOUND, "Unknown user path");
    }
    let username = match validate_username(&utils::decode_username(encoded)) {
        Ok(username) => username,
        Err(e) => return failure(StatusCode::BAD_REQUEST, format!("{e:#}")),
    };
    match store.fetch(&username).await {
        Ok(Some(record)) => json(StatusCode::OK, &record),
        Ok(None) => failure(
            StatusCode::NOT_FOUND,
            format!("No record for '{username}'"),
        ),
        Err(e) => {
            error!("Unable to read the record for '{username}': {e:#}");
            failure(StatusCode::INTERNAL_SERVER_ERROR, "Unable to read the record")
        }
    }
}

async fn update(store: &dyn Store, request: Request<Incoming>) -> Response<Body> {
    let bytes = match Limited::new(request.into_body(), MAX_BODY).collect().await {
        Ok(collected) => collected.to_bytes(),
        Err(e) if e.downcast_ref::<LengthLimitError>().is_some() => {
            return failure(
                StatusCode::PAYLOAD_TOO_LARGE,
                format!("The body is larger than {MAX_BODY} bytes"),
            )
        }
        Err(e) => return failure(StatusCode::BAD_REQUEST, format!("Unable to read the body: {e}")),
    };
    let body: UpdateRequest = match serde_json::from_slice(&bytes) {
        Ok(body) => body,
        Err(e) => {
            return failure(
                StatusCode::BAD_REQUEST,
                format!("Expected {{\"username\": .., \"data\": {{..}}}}: {e}"),
            )
        }
    };
    let username = match validate_username(&body.username) {
        Ok(username) => username,
        Err(e) => return failure(StatusCode::BAD_REQUEST, format!("{e:#}")),
    };
    match store.save(&username, &body.data).await {
        Ok(stored) => {
            info!("Stored revision {} of '{username}'", stored.revision());
            json(
                StatusCode::OK,
                &UpdateResponse {
                    revision: Some(stored.revision()),
                },
            )
        }
        Err(e) => match e.downcast_ref::<StaleRecord>() {
            Some(stale) => json(
                StatusCode::CONFLICT,
                &ErrorResponse {
                    error: stale.to_string(),
                    expected: Some(stale.expected),
                    found: stale.found,
                },
            ),
            None => {
                error!("Unable to save the record for '{username}': {e:#}");
                failure(StatusCode::INTERNAL_SERVER_ERROR, "Unable to save the record")
            }
        },
    }
}

fn failure(status: StatusCode, message: impl Into<String>) -> Response<Body> {
    json(
        status,
        &ErrorResponse {
            error: message.into(),
            ..ErrorResponse::default()
        },
    )
}

fn json<T: Serialize>(status: StatusCode, body: &T) -> Response<Body> {
    match serde_json::to_vec(body) {
        Ok(bytes) => {
            let mut response = respond(status, Bytes::from(bytes));
            response
                .headers_mut()
                .insert(CONTENT_TYPE, HeaderValue::from_static("application/json"));
            response
        }
        Err(e) => {
            error!("Unable to serialize a response: {e}");
            empty(StatusCode::INTERNAL_SERVER_ERROR)
        }
    }
}

fn empty(status: StatusCode) -> Response<Body> {
    respond(status, Bytes::new())
}

fn respond(status: StatusCode, bytes: Bytes) -> Response<Body> {
    let mut response = Response::new(Full::new(bytes));
    *response.status_mut() = status;
    let headers = response.headers_mut();
    headers.insert(ACCESS_CONTROL_ALLOW_ORIGIN, HeaderValue::from_static("*"));
    headers.insert(
        ACCESS_CONTROL_ALLOW_METHODS,
        HeaderValue::from_static("GET, POST, OPTIONS"),
    );
    headers.insert(
        ACCESS_CONTROL_ALLOW_HEADERS,
        HeaderValue::from_static("Content-Type"),
    );
    response
}
