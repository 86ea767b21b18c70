// Request executor
//
// Wraps `reqwest::Client` with base-URL handling, authentication, form
// encoding and `{ "data": ... }` envelope unwrapping. Endpoint groups
// (tasks, cluster, nodes) are inherent methods in their own modules.

use std::collections::BTreeMap;
use std::time::Duration;

use reqwest::{Method, StatusCode, header};
use serde::Deserialize;
use serde::de::DeserializeOwned;
use serde_json::Value;
use tracing::{debug, trace};
use url::Url;

use crate::auth::Credential;
use crate::encode::{EncodeProfile, FormBody, encode_str};
use crate::error::Error;
use crate::session::Session;
use crate::transport::TransportConfig;

const API_ROOT: &str = "api2/json/";

/// Error body shape. The server reports per-field problems in `errors`;
/// the human message usually travels in the HTTP reason phrase instead.
#[derive(Deserialize, Default)]
struct ErrorBody {
    message: Option<String>,
    #[serde(default)]
    errors: Option<BTreeMap<String, Value>>,
}

/// Authenticated HTTP client for one cluster endpoint.
pub struct ApiClient {
    http: reqwest::Client,
    base_url: Url,
    session: Session,
    timeout: Duration,
}

impl ApiClient {
    /// Create a client from a `TransportConfig`.
    ///
    /// `base_url` may be the bare host (`https://pve:8006`) or already
    /// include `/api2/json`.
    pub fn new(
        base_url: &str,
        credential: Credential,
        transport: &TransportConfig,
    ) -> Result<Self, Error> {
        let http = transport.build_client()?;
        let mut client = Self::with_client(http, Url::parse(base_url)?, credential);
        client.timeout = transport.timeout;
        Ok(client)
    }

    /// Create a client around a pre-built `reqwest::Client`.
    pub fn with_client(http: reqwest::Client, base_url: Url, credential: Credential) -> Self {
        Self {
            http,
            base_url: api_base(base_url),
            session: Session::new(credential),
            timeout: TransportConfig::default().timeout,
        }
    }

    /// The normalized API root, always ending in `/api2/json/`.
    pub fn base_url(&self) -> &Url {
        &self.base_url
    }

    pub fn session(&self) -> &Session {
        &self.session
    }

    /// Per-request timeout, reported in `Error::Timeout`.
    pub fn request_timeout(&self) -> Duration {
        self.timeout
    }

    pub(crate) fn url(&self, path: &str) -> Result<Url, Error> {
        Ok(self.base_url.join(path.trim_start_matches('/'))?)
    }

    // ── Execution ────────────────────────────────────────────────────

    /// Send an authenticated request and return the unwrapped `data` value.
    ///
    /// GET and DELETE carry `params` in the query string; POST and PUT send
    /// them as a form body.
    pub async fn execute(
        &self,
        method: Method,
        path: &str,
        params: &FormBody,
    ) -> Result<Value, Error> {
        self.send(method, path, params, true).await
    }

    pub(crate) async fn execute_unauthenticated(
        &self,
        method: Method,
        path: &str,
        params: &FormBody,
    ) -> Result<Value, Error> {
        self.send(method, path, params, false).await
    }

    async fn send(
        &self,
        method: Method,
        path: &str,
        params: &FormBody,
        authenticated: bool,
    ) -> Result<Value, Error> {
        let mut url = self.url(path)?;
        debug!("{method} {path}");
        if !params.is_empty() {
            trace!(keys = ?params.keys().collect::<Vec<_>>(), "request parameters");
        }

        let has_body = matches!(method, Method::POST | Method::PUT);
        if !has_body && !params.is_empty() {
            url.set_query(Some(&params.to_urlencoded()));
        }

        let mut builder = self.http.request(method.clone(), url);
        if has_body {
            builder = builder
                .header(header::CONTENT_TYPE, "application/x-www-form-urlencoded")
                .body(params.to_urlencoded());
        }
        if authenticated {
            builder = self.session.attach(builder, &method)?;
        }

        let resp = builder
            .send()
            .await
            .map_err(|e| self.transport_error(e, &method, path))?;
        self.handle_response(resp, authenticated, &method, path)
            .await
    }

    fn transport_error(&self, err: reqwest::Error, method: &Method, path: &str) -> Error {
        if err.is_timeout() {
            Error::Timeout {
                timeout_secs: self.timeout.as_secs(),
                waiting_for: format!("{method} {path}"),
            }
        } else {
            Error::Transport(err)
        }
    }

    async fn handle_response(
        &self,
        resp: reqwest::Response,
        authenticated: bool,
        method: &Method,
        path: &str,
    ) -> Result<Value, Error> {
        let status = resp.status();
        if !status.is_success() {
            return Err(self.parse_error(status, resp, authenticated).await);
        }

        let body = resp
            .text()
            .await
            .map_err(|e| self.transport_error(e, method, path))?;
        if body.trim().is_empty() {
            return Ok(Value::Null);
        }
        let mut envelope: Value = serde_json::from_str(&body).map_err(|e| {
            let preview: String = body.chars().take(200).collect();
            Error::Deserialization {
                message: format!("{e} (body preview: {preview:?})"),
                body: body.clone(),
            }
        })?;
        Ok(envelope
            .get_mut("data")
            .map(Value::take)
            .unwrap_or(Value::Null))
    }

    async fn parse_error(
        &self,
        status: StatusCode,
        resp: reqwest::Response,
        authenticated: bool,
    ) -> Error {
        let reason = resp
            .extensions()
            .get::<hyper::ext::ReasonPhrase>()
            .map(|r| String::from_utf8_lossy(r.as_bytes()).into_owned());
        let raw = resp.text().await.unwrap_or_default();
        let body: ErrorBody = serde_json::from_str(&raw).unwrap_or_default();

        let message = body
            .message
            .map(|m| m.trim().to_owned())
            .filter(|m| !m.is_empty())
            .or(reason)
            .or_else(|| status.canonical_reason().map(str::to_owned))
            .unwrap_or_else(|| format!("HTTP {}", status.as_u16()));

        if status == StatusCode::UNAUTHORIZED || status == StatusCode::FORBIDDEN {
            return if authenticated {
                self.session.rejected(message)
            } else {
                Error::Authentication { message }
            };
        }

        if status.is_server_error() {
            return Error::Server {
                status: status.as_u16(),
                message,
            };
        }

        let errors = body
            .errors
            .unwrap_or_default()
            .into_iter()
            .map(|(field, v)| {
                let text = match v {
                    Value::String(s) => s.trim().to_owned(),
                    other => other.to_string(),
                };
                (field, text)
            })
            .collect();
        Error::Validation {
            status: status.as_u16(),
            message,
            errors,
        }
    }

    /// Deserialize an unwrapped `data` value.
    pub fn decode_data<T: DeserializeOwned>(&self, value: Value) -> Result<T, Error> {
        decode_value(value)
    }

    // ── Typed helpers ────────────────────────────────────────────────

    pub async fn get<T: DeserializeOwned>(&self, path: &str) -> Result<T, Error> {
        self.get_with(path, &FormBody::new()).await
    }

    pub async fn get_with<T: DeserializeOwned>(
        &self,
        path: &str,
        query: &FormBody,
    ) -> Result<T, Error> {
        decode_value(self.execute(Method::GET, path, query).await?)
    }

    pub async fn post<T: DeserializeOwned>(&self, path: &str, body: &FormBody) -> Result<T, Error> {
        decode_value(self.execute(Method::POST, path, body).await?)
    }

    pub async fn put<T: DeserializeOwned>(&self, path: &str, body: &FormBody) -> Result<T, Error> {
        decode_value(self.execute(Method::PUT, path, body).await?)
    }

    pub async fn delete<T: DeserializeOwned>(
        &self,
        path: &str,
        query: &FormBody,
    ) -> Result<T, Error> {
        decode_value(self.execute(Method::DELETE, path, query).await?)
    }
}

/// Encode one path segment (user ids, storage names, UPIDs).
pub fn segment(raw: &str) -> String {
    encode_str(raw, EncodeProfile::Generic)
}

fn decode_value<T: DeserializeOwned>(value: Value) -> Result<T, Error> {
    serde_json::from_value(value.clone()).map_err(|e| Error::Deserialization {
        message: e.to_string(),
        body: value.to_string(),
    })
}

fn api_base(mut url: Url) -> Url {
    let path = url.path().trim_end_matches('/');
    let path = if path.ends_with("/api2/json") {
        format!("{path}/")
    } else {
        format!("{path}/{API_ROOT}")
    };
    url.set_path(&path);
    url.set_query(None);
    url
}
