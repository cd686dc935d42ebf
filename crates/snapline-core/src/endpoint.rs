//! Upstream endpoint identifiers and the fetch contract.
//!
//! | Type | Description |
//! |------|-------------|
//! | [`EndpointKey`] | Breaker/retry partition key |
//! | [`Provider`] | Which upstream serves the endpoint |
//! | [`UpstreamSource`] | `(EndpointKey, fetch) -> raw JSON` contract |
//! | [`HttpEndpoint`] | URL-template implementation over [`HttpClient`] |

use std::fmt::{Display, Formatter};
use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::domain::{DataKind, Period};
use crate::error::{FetchError, KeyError};
use crate::http_client::{HttpAuth, HttpClient, HttpErrorKind, HttpRequest, HttpResponse};

const MAX_ENDPOINT_KEY_LEN: usize = 48;

/// Placeholders an endpoint URL template may contain.
pub const URL_PLACEHOLDERS: [&str; 2] = ["{season}", "{week}"];

/// Identifier of one logical upstream operation, fixed at startup.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct EndpointKey(String);

impl EndpointKey {
    pub fn parse(input: &str) -> Result<Self, KeyError> {
        let normalized = input.trim().to_ascii_lowercase();
        if normalized.is_empty() {
            return Err(KeyError::EmptyEndpointKey);
        }

        let len = normalized.chars().count();
        if len > MAX_ENDPOINT_KEY_LEN {
            return Err(KeyError::EndpointKeyTooLong {
                len,
                max: MAX_ENDPOINT_KEY_LEN,
            });
        }

        for (index, ch) in normalized.chars().enumerate() {
            let valid = ch.is_ascii_alphanumeric() || matches!(ch, '-' | '_' | '.');
            if !valid {
                return Err(KeyError::EndpointKeyInvalidChar { ch, index });
            }
        }

        Ok(Self(normalized))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl Display for EndpointKey {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl TryFrom<String> for EndpointKey {
    type Error = KeyError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::parse(&value)
    }
}

impl TryFrom<&str> for EndpointKey {
    type Error = KeyError;

    fn try_from(value: &str) -> Result<Self, Self::Error> {
        Self::parse(value)
    }
}

impl From<EndpointKey> for String {
    fn from(value: EndpointKey) -> Self {
        value.0
    }
}

/// Upstream provider families.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Provider {
    /// League/roster provider.
    League,
    /// Stats/schedule/news provider.
    Stats,
}

impl Provider {
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::League => "league",
            Self::Stats => "stats",
        }
    }
}

impl Display for Provider {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

pub type UpstreamFuture<'a> = Pin<Box<dyn Future<Output = Result<Value, FetchError>> + Send + 'a>>;

/// One fetchable upstream operation.
///
/// `fetch` must be idempotent: the retry executor may call it several times
/// for one logical request.
pub trait UpstreamSource: Send + Sync {
    fn key(&self) -> &EndpointKey;

    fn kind(&self) -> DataKind;

    fn fetch<'a>(&'a self, period: Period) -> UpstreamFuture<'a>;
}

/// Endpoint described by a URL template with `{season}` and `{week}`.
#[derive(Clone)]
pub struct HttpEndpoint {
    key: EndpointKey,
    kind: DataKind,
    provider: Provider,
    url_template: String,
    auth: HttpAuth,
    timeout_ms: u64,
    client: Arc<dyn HttpClient>,
}

impl HttpEndpoint {
    pub fn new(
        key: EndpointKey,
        kind: DataKind,
        provider: Provider,
        url_template: impl Into<String>,
        client: Arc<dyn HttpClient>,
    ) -> Self {
        Self {
            key,
            kind,
            provider,
            url_template: url_template.into(),
            auth: HttpAuth::None,
            timeout_ms: 8_000,
            client,
        }
    }

    pub fn with_auth(mut self, auth: HttpAuth) -> Self {
        self.auth = auth;
        self
    }

    pub fn with_timeout_ms(mut self, timeout_ms: u64) -> Self {
        self.timeout_ms = timeout_ms;
        self
    }

    pub const fn provider(&self) -> Provider {
        self.provider
    }

    pub fn url_template(&self) -> &str {
        &self.url_template
    }

    pub fn render_url(&self, period: Period) -> String {
        self.url_template
            .replace("{season}", &period.season().to_string())
            .replace("{week}", &period.week().to_string())
    }
}

impl UpstreamSource for HttpEndpoint {
    fn key(&self) -> &EndpointKey {
        &self.key
    }

    fn kind(&self) -> DataKind {
        self.kind
    }

    fn fetch<'a>(&'a self, period: Period) -> UpstreamFuture<'a> {
        Box::pin(async move {
            let request = HttpRequest::get(self.render_url(period))
                .with_header("accept", "application/json")
                .with_auth(&self.auth)
                .with_timeout_ms(self.timeout_ms);
            get_json(self.client.as_ref(), &self.key, request).await
        })
    }
}

/// Execute one GET and classify the outcome into the fetch error taxonomy.
pub(crate) async fn get_json(
    client: &dyn HttpClient,
    key: &EndpointKey,
    request: HttpRequest,
) -> Result<Value, FetchError> {
    let response = client.execute(request).await.map_err(|error| {
        let label = match error.kind() {
            HttpErrorKind::Timeout => "timeout",
            HttpErrorKind::Connect => "connect",
            HttpErrorKind::Other => "transport",
        };
        FetchError::transient(format!("{key} {label} error: {}", error.message()))
    })?;

    decode_response(key, response)
}

fn decode_response(key: &EndpointKey, response: HttpResponse) -> Result<Value, FetchError> {
    if !response.is_success() {
        return Err(FetchError::from_status(
            response.status,
            format!("{key} upstream returned status {}", response.status),
        ));
    }

    serde_json::from_str(&response.body)
        .map_err(|e| FetchError::decode(format!("{key} returned a body that is not JSON: {e}")))
}
