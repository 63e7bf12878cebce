//! HTTP-01 challenge solver
//!
//! Answers the authority's validation requests on
//! `/.well-known/acme-challenge/<token>` from the token store. Runs
//! unauthenticated over plain HTTP, independent of any issuance in flight.

use std::convert::Infallible;
use std::sync::Arc;
use std::time::Duration;

use bytes::Bytes;
use certkeeper_common::is_valid_token;
use http::header::{HeaderValue, ALLOW, CONTENT_TYPE};
use http::{Method, Request, Response, StatusCode};
use http_body_util::Full;
use hyper::body::Incoming;
use hyper::server::conn::http1;
use hyper::service::service_fn;
use hyper_util::rt::TokioIo;
use tokio::net::TcpListener;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, trace, warn};

use crate::store::TokenStore;

/// HTTP-01 challenge path prefix
pub const ACME_CHALLENGE_PREFIX: &str = "/.well-known/acme-challenge/";

/// Serves stored key authorizations to the authority
///
/// Lookups go straight to the token store, so a token is servable as soon
/// as `put_token` returns and stops being servable once it is deleted.
#[derive(Clone)]
pub struct Http01Solver {
    tokens: Arc<dyn TokenStore>,
}

impl Http01Solver {
    pub fn new(tokens: Arc<dyn TokenStore>) -> Self {
        Self { tokens }
    }

    /// Check if this is an ACME challenge request path
    ///
    /// Returns `Some(token)` if the path matches the challenge prefix,
    /// `None` otherwise.
    pub fn extract_token(path: &str) -> Option<&str> {
        path.strip_prefix(ACME_CHALLENGE_PREFIX)
    }

    /// Map a request to its response.
    ///
    /// Unknown tokens are an expected 404. A failing store yields 503 so
    /// the authority retries instead of seeing a wrong answer.
    pub async fn respond(&self, method: &Method, path: &str) -> Response<Full<Bytes>> {
        let Some(token) = Self::extract_token(path) else {
            trace!(path = %path, "Not a challenge path");
            return plain(StatusCode::NOT_FOUND, Bytes::new());
        };

        if method != Method::GET && method != Method::HEAD {
            let mut response = plain(StatusCode::METHOD_NOT_ALLOWED, Bytes::new());
            response
                .headers_mut()
                .insert(ALLOW, HeaderValue::from_static("GET, HEAD"));
            return response;
        }

        if !is_valid_token(token) {
            debug!(path = %path, "Malformed challenge token");
            return plain(StatusCode::NOT_FOUND, Bytes::new());
        }

        match self.tokens.get_authorization(token).await {
            Ok(Some(authorization)) => {
                trace!(token = %token, "Challenge token found");
                let body = if method == Method::HEAD {
                    Bytes::new()
                } else {
                    Bytes::from(authorization)
                };
                plain(StatusCode::OK, body)
            }
            Ok(None) => {
                debug!(token = %token, "Challenge token not found");
                plain(StatusCode::NOT_FOUND, Bytes::new())
            }
            Err(e) => {
                warn!(token = %token, error = %e, "Token store lookup failed");
                plain(StatusCode::SERVICE_UNAVAILABLE, Bytes::new())
            }
        }
    }

    /// Serve HTTP/1 on `listener` until `shutdown` fires.
    ///
    /// Each connection runs on its own task; connections already accepted
    /// finish on their own after shutdown.
    pub async fn serve(
        self,
        listener: TcpListener,
        shutdown: CancellationToken,
    ) -> std::io::Result<()> {
        let address = listener.local_addr()?;
        info!(address = %address, "HTTP-01 challenge solver listening");

        loop {
            let (stream, remote) = tokio::select! {
                _ = shutdown.cancelled() => {
                    info!(address = %address, "HTTP-01 challenge solver stopped");
                    return Ok(());
                }
                accepted = listener.accept() => match accepted {
                    Ok(connection) => connection,
                    Err(e) => {
                        error!(error = %e, "Failed to accept solver connection");
                        tokio::time::sleep(Duration::from_millis(100)).await;
                        continue;
                    }
                },
            };

            let solver = self.clone();
            tokio::spawn(async move {
                let service = service_fn(move |request: Request<Incoming>| {
                    let solver = solver.clone();
                    let method = request.method().clone();
                    let path = request.uri().path().to_owned();
                    async move { Ok::<_, Infallible>(solver.respond(&method, &path).await) }
                });

                if let Err(e) = http1::Builder::new()
                    .serve_connection(TokioIo::new(stream), service)
                    .await
                {
                    debug!(remote = %remote, error = %e, "Solver connection closed with error");
                }
            });
        }
    }
}

impl std::fmt::Debug for Http01Solver {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Http01Solver").finish_non_exhaustive()
    }
}

fn plain(status: StatusCode, body: Bytes) -> Response<Full<Bytes>> {
    let mut response = Response::new(Full::new(body));
    *response.status_mut() = status;
    response
        .headers_mut()
        .insert(CONTENT_TYPE, HeaderValue::from_static("text/plain"));
    response
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::{MemoryTokenStore, StoreError};
    use async_trait::async_trait;
    use certkeeper_common::{DomainName, DomainSslDetails};
    use chrono::{DateTime, Utc};
    use http_body_util::BodyExt;

    async fn body_of(response: Response<Full<Bytes>>) -> String {
        let bytes = response.into_body().collect().await.unwrap().to_bytes();
        String::from_utf8(bytes.to_vec()).unwrap()
    }

    fn solver() -> (Http01Solver, Arc<MemoryTokenStore>) {
        let tokens = Arc::new(MemoryTokenStore::new());
        (Http01Solver::new(tokens.clone()), tokens)
    }

    #[test]
    fn test_extract_token() {
        assert_eq!(
            Http01Solver::extract_token("/.well-known/acme-challenge/abc123"),
            Some("abc123")
        );

        assert_eq!(
            Http01Solver::extract_token("/.well-known/acme-challenge/"),
            Some("")
        );

        assert_eq!(Http01Solver::extract_token("/other/path"), None);

        assert_eq!(
            Http01Solver::extract_token("/.well-known/acme-challenge"),
            None
        );
    }

    #[tokio::test]
    async fn test_hit_returns_authorization() {
        let (solver, tokens) = solver();
        tokens.put_token("abc123", "abc123.thumb").await.unwrap();

        let response = solver
            .respond(&Method::GET, "/.well-known/acme-challenge/abc123")
            .await;

        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(response.headers()[CONTENT_TYPE], "text/plain");
        assert_eq!(body_of(response).await, "abc123.thumb");
    }

    #[tokio::test]
    async fn test_head_has_no_body() {
        let (solver, tokens) = solver();
        tokens.put_token("abc123", "abc123.thumb").await.unwrap();

        let response = solver
            .respond(&Method::HEAD, "/.well-known/acme-challenge/abc123")
            .await;

        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(body_of(response).await, "");
    }

    #[tokio::test]
    async fn test_miss_and_deleted_are_404() {
        let (solver, tokens) = solver();

        let response = solver
            .respond(&Method::GET, "/.well-known/acme-challenge/never-written")
            .await;
        assert_eq!(response.status(), StatusCode::NOT_FOUND);

        tokens.put_token("gone", "gone.thumb").await.unwrap();
        tokens.delete_token("gone").await.unwrap();
        let response = solver
            .respond(&Method::GET, "/.well-known/acme-challenge/gone")
            .await;
        assert_eq!(response.status(), StatusCode::NOT_FOUND);
        assert_eq!(body_of(response).await, "");
    }

    #[tokio::test]
    async fn test_other_paths_and_methods() {
        let (solver, tokens) = solver();
        tokens.put_token("abc123", "abc123.thumb").await.unwrap();

        let response = solver.respond(&Method::GET, "/index.html").await;
        assert_eq!(response.status(), StatusCode::NOT_FOUND);

        let response = solver
            .respond(&Method::GET, "/.well-known/acme-challenge/../../etc/passwd")
            .await;
        assert_eq!(response.status(), StatusCode::NOT_FOUND);

        let response = solver
            .respond(&Method::POST, "/.well-known/acme-challenge/abc123")
            .await;
        assert_eq!(response.status(), StatusCode::METHOD_NOT_ALLOWED);
        assert_eq!(response.headers()[ALLOW], "GET, HEAD");
    }

    struct BrokenStore;

    #[async_trait]
    impl TokenStore for BrokenStore {
        async fn put_token(&self, _token: &str, _authorization: &str) -> Result<(), StoreError> {
            Err(StoreError::Internal("offline".into()))
        }

        async fn get_authorization(&self, _token: &str) -> Result<Option<String>, StoreError> {
            Err(StoreError::Internal("offline".into()))
        }

        async fn delete_token(&self, _token: &str) -> Result<(), StoreError> {
            Err(StoreError::Internal("offline".into()))
        }

        async fn upsert_domain_record(
            &self,
            _domain: &DomainName,
            _creation_date: DateTime<Utc>,
        ) -> Result<(), StoreError> {
            Err(StoreError::Internal("offline".into()))
        }

        async fn get_domain_record(
            &self,
            _domain: &DomainName,
        ) -> Result<Option<DomainSslDetails>, StoreError> {
            Err(StoreError::Internal("offline".into()))
        }

        async fn purge_tokens_older_than(&self, _age: Duration) -> Result<usize, StoreError> {
            Err(StoreError::Internal("offline".into()))
        }
    }

    #[tokio::test]
    async fn test_store_failure_is_503() {
        let solver = Http01Solver::new(Arc::new(BrokenStore));

        let response = solver
            .respond(&Method::GET, "/.well-known/acme-challenge/abc123")
            .await;
        assert_eq!(response.status(), StatusCode::SERVICE_UNAVAILABLE);
    }

    #[tokio::test]
    async fn test_serve_stops_on_shutdown() {
        let (solver, _tokens) = solver();
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let shutdown = CancellationToken::new();

        let handle = tokio::spawn(solver.serve(listener, shutdown.clone()));
        shutdown.cancel();

        assert!(handle.await.unwrap().is_ok());
    }
}
