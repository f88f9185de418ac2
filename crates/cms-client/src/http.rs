//! Signed HTTPS transport for the Cloud Monitor RPC API.
//!
//! Requests are plain GETs carrying every parameter in the query string,
//! signed with HMAC-SHA1 over the canonicalized parameter list.

use std::collections::BTreeMap;
use std::time::Duration;

use base64::Engine;
use base64::engine::general_purpose::STANDARD;
use bytes::Bytes;
use hmac::{Hmac, Mac};
use http_body_util::{BodyExt, Empty};
use hyper_rustls::HttpsConnector;
use hyper_util::client::legacy::Client;
use hyper_util::client::legacy::connect::HttpConnector;
use hyper_util::rt::TokioExecutor;
use percent_encoding::{AsciiSet, NON_ALPHANUMERIC, utf8_percent_encode};
use serde::de::DeserializeOwned;
use sha1::Sha1;
use tracing::debug;

use cms_config::Credential;

use crate::api::{
    CmsApi, DescribeMetricLastRequest, DescribeMetricLastResponse,
    DescribeMetricMetaListRequest, DescribeMetricMetaListResponse, Envelope, ErrorBody,
};
use crate::error::ApiError;

/// API version of the metrics service.
pub const API_VERSION: &str = "2019-01-01";

/// RFC 3986 unreserved characters stay as-is; everything else is escaped.
const UNRESERVED: &AsciiSet = &NON_ALPHANUMERIC
    .remove(b'-')
    .remove(b'_')
    .remove(b'.')
    .remove(b'~');

type HttpsClient = Client<HttpsConnector<HttpConnector>, Empty<Bytes>>;

/// Cloud Monitor client for one account.
#[derive(Clone)]
pub struct HttpCmsClient {
    endpoint: String,
    access_key: String,
    access_key_secret: String,
    http: HttpsClient,
}

impl std::fmt::Debug for HttpCmsClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("HttpCmsClient")
            .field("endpoint", &self.endpoint)
            .field("access_key", &self.access_key)
            .finish_non_exhaustive()
    }
}

impl HttpCmsClient {
    /// Build a client for the credential's regional endpoint.
    pub fn new(credential: &Credential) -> Result<Self, ApiError> {
        let connector = hyper_rustls::HttpsConnectorBuilder::new()
            .with_provider_and_webpki_roots(rustls::crypto::ring::default_provider())
            .map_err(|e| ApiError::Tls(e.to_string()))?
            .https_or_http()
            .enable_http1()
            .build();
        let http = Client::builder(TokioExecutor::new()).build(connector);

        Ok(Self {
            endpoint: regional_endpoint(&credential.region),
            access_key: credential.access_key.clone(),
            access_key_secret: credential.access_key_secret.clone(),
            http,
        })
    }

    /// Point the client at a different endpoint (private link, test server).
    pub fn with_endpoint(mut self, endpoint: &str) -> Self {
        self.endpoint = endpoint.trim_end_matches('/').to_string();
        self
    }

    pub fn endpoint(&self) -> &str {
        &self.endpoint
    }

    /// Issue one signed call and decode its envelope.
    async fn call<T>(
        &self,
        action: &str,
        params: &[(&str, &str)],
        timeout: Duration,
    ) -> Result<T, ApiError>
    where
        T: DeserializeOwned + Envelope + WithRaw,
    {
        let query = signed_query(
            &self.access_key,
            &self.access_key_secret,
            action,
            params,
            &uuid::Uuid::new_v4().to_string(),
            &chrono::Utc::now().format("%Y-%m-%dT%H:%M:%SZ").to_string(),
        )?;
        let uri: http::Uri = format!("{}/?{}", self.endpoint, query)
            .parse()
            .map_err(|e: http::uri::InvalidUri| ApiError::Endpoint(e.to_string()))?;

        let req = http::Request::builder()
            .method("GET")
            .uri(uri)
            .header("user-agent", concat!("cms-exporter/", env!("CARGO_PKG_VERSION")))
            .header("accept", "application/json")
            .body(Empty::<Bytes>::new())
            .map_err(|e| ApiError::Transport(e.to_string()))?;

        let (status, body) = tokio::time::timeout(timeout, async {
            let resp = self
                .http
                .request(req)
                .await
                .map_err(|e| ApiError::Transport(e.to_string()))?;
            let status = resp.status();
            let bytes = resp
                .into_body()
                .collect()
                .await
                .map_err(|e| ApiError::Transport(e.to_string()))?
                .to_bytes();
            Ok::<_, ApiError>((status, String::from_utf8_lossy(&bytes).into_owned()))
        })
        .await
        .map_err(|_| ApiError::Timeout(timeout))??;

        debug!(%action, status = status.as_u16(), bytes = body.len(), "cms response");

        if !status.is_success() {
            return Err(match serde_json::from_str::<ErrorBody>(&body) {
                Ok(err) if !err.code.is_empty() => ApiError::Api {
                    code: err.code,
                    message: err.message,
                    request_id: err.request_id,
                },
                _ => ApiError::Status {
                    status: status.as_u16(),
                    body,
                },
            });
        }

        let mut decoded: T = match serde_json::from_str(&body) {
            Ok(d) => d,
            Err(source) => return Err(ApiError::Malformed { body, source }),
        };
        decoded.check()?;
        decoded.set_raw(body);
        Ok(decoded)
    }
}

impl CmsApi for HttpCmsClient {
    async fn describe_metric_last(
        &self,
        req: &DescribeMetricLastRequest,
    ) -> Result<DescribeMetricLastResponse, ApiError> {
        self.call(
            "DescribeMetricLast",
            &[
                ("Namespace", req.namespace.as_str()),
                ("MetricName", req.metric_name.as_str()),
                ("Period", req.period.as_str()),
            ],
            req.read_timeout,
        )
        .await
    }

    async fn describe_metric_meta_list(
        &self,
        req: &DescribeMetricMetaListRequest,
    ) -> Result<DescribeMetricMetaListResponse, ApiError> {
        let page_size = req.page_size.to_string();
        self.call(
            "DescribeMetricMetaList",
            &[
                ("Namespace", req.namespace.as_str()),
                ("PageSize", page_size.as_str()),
            ],
            req.read_timeout,
        )
        .await
    }
}

/// Responses that keep their undecoded body around.
pub(crate) trait WithRaw {
    fn set_raw(&mut self, raw: String);
}

impl WithRaw for DescribeMetricLastResponse {
    fn set_raw(&mut self, raw: String) {
        self.raw = raw;
    }
}

impl WithRaw for DescribeMetricMetaListResponse {
    fn set_raw(&mut self, raw: String) {
        self.raw = raw;
    }
}

/// `https://metrics.{region}.aliyuncs.com`
pub fn regional_endpoint(region: &str) -> String {
    if region.is_empty() {
        "https://metrics.aliyuncs.com".to_string()
    } else {
        format!("https://metrics.{region}.aliyuncs.com")
    }
}

fn encode(s: &str) -> String {
    utf8_percent_encode(s, UNRESERVED).to_string()
}

/// Full query string, common parameters and signature included.
fn signed_query(
    access_key: &str,
    secret: &str,
    action: &str,
    params: &[(&str, &str)],
    nonce: &str,
    timestamp: &str,
) -> Result<String, ApiError> {
    let mut all: BTreeMap<String, String> = params
        .iter()
        .map(|(k, v)| (k.to_string(), v.to_string()))
        .collect();
    for (k, v) in [
        ("Action", action),
        ("Format", "JSON"),
        ("Version", API_VERSION),
        ("AccessKeyId", access_key),
        ("SignatureMethod", "HMAC-SHA1"),
        ("SignatureVersion", "1.0"),
        ("SignatureNonce", nonce),
        ("Timestamp", timestamp),
    ] {
        all.insert(k.to_string(), v.to_string());
    }

    let signature = sign(secret, &all)?;
    let mut query = canonical_query(&all);
    query.push_str("&Signature=");
    query.push_str(&encode(&signature));
    Ok(query)
}

fn canonical_query(params: &BTreeMap<String, String>) -> String {
    params
        .iter()
        .map(|(k, v)| format!("{}={}", encode(k), encode(v)))
        .collect::<Vec<_>>()
        .join("&")
}

fn string_to_sign(params: &BTreeMap<String, String>) -> String {
    format!("GET&{}&{}", encode("/"), encode(&canonical_query(params)))
}

/// base64(HMAC-SHA1(secret + "&", string_to_sign))
fn sign(secret: &str, params: &BTreeMap<String, String>) -> Result<String, ApiError> {
    let mut mac = Hmac::<Sha1>::new_from_slice(format!("{secret}&").as_bytes())
        .map_err(|e| ApiError::Signing(e.to_string()))?;
    mac.update(string_to_sign(params).as_bytes());
    Ok(STANDARD.encode(mac.finalize().into_bytes()))
}
