//! WHIP signaling over HTTP
//!
//! A WHIP session is started with one `POST` carrying the SDP offer; the
//! response body is the SDP answer. Redirects are followed here rather than
//! by the HTTP client, because generic redirect handling drops the
//! `Authorization` header when the host changes.
//!
//! Every 3xx with a `Location`, `303 See Other` included, is answered by
//! posting the same offer to the new URL. A `GET` carries no offer and so
//! cannot produce an answer, which is why the usual 303 downgrade is not
//! applied.

use std::fmt;
use std::time::Duration;

use async_trait::async_trait;
use reqwest::header::{AUTHORIZATION, CONTENT_TYPE, LOCATION};
use reqwest::redirect::Policy;
use tracing::{debug, info, warn};
use url::Url;

use crate::error::{Result, WhipError};

/// Content type of SDP offers and answers
pub const SDP_CONTENT_TYPE: &str = "application/sdp";

/// Redirect hops followed before giving up
pub const MAX_REDIRECTS: usize = 10;

/// Bearer token for the ingestion endpoint. Never printed.
#[derive(Clone, PartialEq, Eq)]
pub struct BearerToken(String);

impl BearerToken {
    /// Wrap a raw token
    pub fn new(token: impl Into<String>) -> Self {
        Self(token.into())
    }

    /// Raw token value
    pub fn expose(&self) -> &str {
        &self.0
    }

    /// Whether the token is empty or whitespace only
    pub fn is_blank(&self) -> bool {
        self.0.trim().is_empty()
    }

    fn header_value(&self) -> String {
        format!("Bearer {}", self.0)
    }
}

impl fmt::Debug for BearerToken {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("BearerToken(<redacted>)")
    }
}

/// The single offer/answer exchange with the ingestion endpoint
#[async_trait]
pub trait Signaling: Send + Sync {
    /// Endpoint the offer is sent to
    fn endpoint(&self) -> &Url;

    /// Send the offer and return the raw answer body
    async fn exchange(&self, offer_sdp: &str) -> Result<String>;
}

/// WHIP signaling client backed by `reqwest`
#[derive(Debug, Clone)]
pub struct WhipSignaling {
    client: reqwest::Client,
    endpoint: Url,
    token: BearerToken,
}

impl WhipSignaling {
    /// Create a client for `endpoint`. `timeout` bounds each HTTP request.
    pub fn new(endpoint: &str, token: BearerToken, timeout: Option<Duration>) -> Result<Self> {
        let endpoint = Url::parse(endpoint)?;

        let mut builder = reqwest::Client::builder()
            .redirect(Policy::none())
            .user_agent(concat!("whip-publisher/", env!("CARGO_PKG_VERSION")));
        if let Some(timeout) = timeout {
            builder = builder.timeout(timeout);
        }

        Ok(Self {
            client: builder.build()?,
            endpoint,
            token,
        })
    }

    async fn post(&self, url: &Url, offer_sdp: &str) -> Result<reqwest::Response> {
        let response = self
            .client
            .post(url.clone())
            .header(AUTHORIZATION, self.token.header_value())
            .header(CONTENT_TYPE, SDP_CONTENT_TYPE)
            .body(offer_sdp.to_owned())
            .send()
            .await?;
        Ok(response)
    }
}

#[async_trait]
impl Signaling for WhipSignaling {
    fn endpoint(&self) -> &Url {
        &self.endpoint
    }

    async fn exchange(&self, offer_sdp: &str) -> Result<String> {
        let mut url = self.endpoint.clone();

        for _ in 0..=MAX_REDIRECTS {
            debug!("POST offer to {}", url);
            let response = self.post(&url, offer_sdp).await?;
            let status = response.status();

            if status.is_redirection() {
                let location = response
                    .headers()
                    .get(LOCATION)
                    .and_then(|value| value.to_str().ok())
                    .ok_or_else(|| {
                        WhipError::signaling(format!("{} redirect without a Location header", status))
                    })?;
                let next = url.join(location)?;
                info!("Endpoint redirected ({}) to {}", status, next);
                url = next;
                continue;
            }

            if !status.is_success() {
                warn!("Endpoint answered with status {}, applying body as answer", status);
            }

            let body = response.text().await?;
            debug!("Response body: {}", body);
            return Ok(body);
        }

        Err(WhipError::TooManyRedirects {
            limit: MAX_REDIRECTS,
        })
    }
}
