//! HTTP transport: a [`Remote`] client and the matching axum handler.
//!
//! Requests and responses carry the sender's identity in two headers:
//! `AuthorID` (the profileID string) and `PubKey` (standard base64 of
//! the raw public key). A request whose key and id do not belong
//! together is rejected with 400; unknown refs answer 404; GET and PUT
//! responses echo the host's own author headers.
//!
//! The body is the on-disk log encoding, unchanged.

use async_trait::async_trait;
use axum::body::Bytes;
use axum::extract::{Query, State};
use axum::http::{HeaderMap, HeaderName, HeaderValue, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::{routing, Router};
use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine as _;
use serde::Deserialize;
use std::sync::Arc;

use quarry_core::crypto::PublicKey;
use quarry_core::dsref::Ref;
use quarry_core::ident::ProfileId;

use crate::error::{LogsyncError, Result};
use crate::logsync::{parse_ref_param, Author, Logsync, Remote};

/// Header carrying the sender's profileID.
pub const AUTHOR_ID_HEADER: &str = "authorid";

/// Header carrying the sender's base64-encoded public key.
pub const PUB_KEY_HEADER: &str = "pubkey";

/// Read an author identity from request or response headers.
pub fn author_from_headers(headers: &HeaderMap) -> Result<Author> {
    let profile_id = headers
        .get(AUTHOR_ID_HEADER)
        .and_then(|v| v.to_str().ok())
        .ok_or_else(|| LogsyncError::BadHeaders("missing AuthorID".into()))?;
    let profile_id = ProfileId::parse(profile_id)
        .map_err(|e| LogsyncError::BadHeaders(format!("AuthorID: {e}")))?;

    let pub_key = headers
        .get(PUB_KEY_HEADER)
        .and_then(|v| v.to_str().ok())
        .ok_or_else(|| LogsyncError::BadHeaders("missing PubKey".into()))?;
    let pub_key = BASE64
        .decode(pub_key)
        .map_err(|e| LogsyncError::BadHeaders(format!("PubKey: {e}")))?;
    let pub_key: [u8; 32] = pub_key
        .try_into()
        .map_err(|_| LogsyncError::BadHeaders("PubKey: wrong key length".into()))?;

    Ok(Author {
        profile_id,
        pub_key: PublicKey::from_bytes(pub_key),
    })
}

fn append_author_headers(headers: &mut HeaderMap, author: &Author) {
    if let Ok(v) = HeaderValue::from_str(author.profile_id.as_str()) {
        headers.insert(HeaderName::from_static(AUTHOR_ID_HEADER), v);
    }
    if let Ok(v) = HeaderValue::from_str(&BASE64.encode(author.pub_key.as_bytes())) {
        headers.insert(HeaderName::from_static(PUB_KEY_HEADER), v);
    }
}

// ─────────────────────────────────────────────────────────────────────
// Client
// ─────────────────────────────────────────────────────────────────────

/// The request side of logsync over HTTP.
pub struct HttpClient {
    url: String,
    client: reqwest::Client,
}

impl HttpClient {
    /// A client for a host's logsync endpoint.
    pub fn new(url: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            client: reqwest::Client::new(),
        }
    }

    fn authed(&self, req: reqwest::RequestBuilder, author: &Author) -> reqwest::RequestBuilder {
        req.header(AUTHOR_ID_HEADER, author.profile_id.to_string())
            .header(PUB_KEY_HEADER, BASE64.encode(author.pub_key.as_bytes()))
    }

    async fn check(res: reqwest::Response) -> Result<reqwest::Response> {
        if res.status().is_success() {
            return Ok(res);
        }
        let status = res.status().as_u16();
        let message = res.text().await.unwrap_or_default();
        Err(LogsyncError::Remote { status, message })
    }
}

#[async_trait]
impl Remote for HttpClient {
    async fn put(&self, author: &Author, body: Vec<u8>) -> Result<Author> {
        let req = self.authed(self.client.put(&self.url), author).body(body);
        let res = req
            .send()
            .await
            .map_err(|e| LogsyncError::Transport(e.to_string()))?;
        let res = Self::check(res).await?;
        author_from_headers(res.headers())
    }

    async fn get(&self, author: &Author, r: &Ref) -> Result<(Author, Vec<u8>)> {
        let req = self
            .authed(self.client.get(&self.url), author)
            .query(&[("ref", r.to_string())]);
        let res = req
            .send()
            .await
            .map_err(|e| LogsyncError::Transport(e.to_string()))?;
        let res = Self::check(res).await?;
        let host = author_from_headers(res.headers())?;
        let body = res
            .bytes()
            .await
            .map_err(|e| LogsyncError::Transport(e.to_string()))?;
        Ok((host, body.to_vec()))
    }

    async fn del(&self, author: &Author, r: &Ref) -> Result<()> {
        let req = self
            .authed(self.client.delete(&self.url), author)
            .query(&[("ref", r.to_string())]);
        let res = req
            .send()
            .await
            .map_err(|e| LogsyncError::Transport(e.to_string()))?;
        Self::check(res).await?;
        Ok(())
    }
}

// ─────────────────────────────────────────────────────────────────────
// Server
// ─────────────────────────────────────────────────────────────────────

#[derive(Debug, Deserialize)]
struct RefQuery {
    #[serde(rename = "ref")]
    reference: Option<String>,
}

/// The host side as an axum router, mountable anywhere.
pub fn router(lsync: Arc<Logsync>) -> Router {
    Router::new()
        .route(
            "/",
            routing::put(put_log).get(get_log).delete(delete_log),
        )
        .with_state(lsync)
}

fn error_response(e: &LogsyncError) -> Response {
    tracing::warn!(error = %e, "rejecting logsync request");
    let status =
        StatusCode::from_u16(e.status_code()).unwrap_or(StatusCode::BAD_REQUEST);
    (status, e.to_string()).into_response()
}

async fn put_log(
    State(lsync): State<Arc<Logsync>>,
    headers: HeaderMap,
    body: Bytes,
) -> Response {
    let sender = match author_from_headers(&headers) {
        Ok(sender) => sender,
        Err(e) => return error_response(&e),
    };
    if let Err(e) = lsync.put(&sender, &body).await {
        return error_response(&e);
    }

    let mut res = StatusCode::OK.into_response();
    append_author_headers(res.headers_mut(), &lsync.author().await);
    res
}

async fn get_log(
    State(lsync): State<Arc<Logsync>>,
    Query(query): Query<RefQuery>,
    headers: HeaderMap,
) -> Response {
    let sender = match author_from_headers(&headers) {
        Ok(sender) => sender,
        Err(e) => return error_response(&e),
    };
    let r = match parse_ref_param(query.reference.as_deref().unwrap_or_default()) {
        Ok(r) => r,
        Err(e) => return error_response(&e),
    };

    match lsync.get(&sender, &r).await {
        Ok(body) => {
            let mut res = (StatusCode::OK, body).into_response();
            append_author_headers(res.headers_mut(), &lsync.author().await);
            res
        }
        Err(e) => error_response(&e),
    }
}

async fn delete_log(
    State(lsync): State<Arc<Logsync>>,
    Query(query): Query<RefQuery>,
    headers: HeaderMap,
) -> Response {
    let sender = match author_from_headers(&headers) {
        Ok(sender) => sender,
        Err(e) => return error_response(&e),
    };
    let r = match parse_ref_param(query.reference.as_deref().unwrap_or_default()) {
        Ok(r) => r,
        Err(e) => return error_response(&e),
    };

    match lsync.del(&sender, &r).await {
        Ok(()) => {
            let mut res = StatusCode::OK.into_response();
            append_author_headers(res.headers_mut(), &lsync.author().await);
            res
        }
        Err(e) => error_response(&e),
    }
}
