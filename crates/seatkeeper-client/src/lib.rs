//! JSON/HTTP client for the seat booking backend.
//!
//! [`HttpUpstream`] implements [`Upstream`] for one authenticated account.
//! Every failure is returned as a raw [`UpstreamError`]; classification
//! happens in the core.

mod error;

pub use error::ClientError;

use futures::future::BoxFuture;
use futures::FutureExt;
use reqwest::{Client, RequestBuilder, Response, Url};
use seatkeeper_core::account::AccountRegistry;
use seatkeeper_core::clock::Clock;
use seatkeeper_core::config::Config;
use seatkeeper_core::types::{FrequentSeat, Reservation, Venue, VenueId};
use seatkeeper_core::upstream::{Upstream, UpstreamError, UpstreamResult};
use serde::de::DeserializeOwned;
use serde_json::Value;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info};

const USER_AGENT: &str = concat!("seatkeeper/", env!("CARGO_PKG_VERSION"));

/// Parse and normalise the configured base URL. The result always ends in
/// `/` so relative endpoint paths join beneath it.
pub fn parse_base_url(raw: &str) -> Result<Url, ClientError> {
    let trimmed = raw.trim();
    let invalid = |reason: &str| ClientError::InvalidBaseUrl {
        url: raw.to_string(),
        reason: reason.to_string(),
    };
    if trimmed.is_empty() {
        return Err(invalid("empty"));
    }
    let with_slash = if trimmed.ends_with('/') {
        trimmed.to_string()
    } else {
        format!("{trimmed}/")
    };
    let url = Url::parse(&with_slash).map_err(|e| invalid(&e.to_string()))?;
    if !matches!(url.scheme(), "http" | "https") {
        return Err(invalid("scheme must be http or https"));
    }
    Ok(url)
}

/// Build the HTTP client shared by every account session.
pub fn build_client(timeout: Duration) -> Result<Client, ClientError> {
    Ok(Client::builder()
        .timeout(timeout)
        .user_agent(USER_AGENT)
        .build()?)
}

/// Build an [`AccountRegistry`] with one [`HttpUpstream`] per configured
/// account, all sharing one connection pool.
pub fn connect(config: &Config, clock: Arc<dyn Clock>) -> Result<AccountRegistry, ClientError> {
    let base = parse_base_url(&config.upstream.base_url)?;
    let client = build_client(config.upstream.timeout())?;
    let registry = AccountRegistry::from_config(config, clock, |user, token| {
        debug!(user, base = %base, "opening upstream session");
        let upstream: Arc<dyn Upstream> =
            Arc::new(HttpUpstream::with_client(client.clone(), base.clone(), token));
        Ok(upstream)
    })?;
    info!(base = %base, accounts = registry.len(), "upstream sessions ready");
    Ok(registry)
}

// ---------------------------------------------------------------------------
// HttpUpstream
// ---------------------------------------------------------------------------

pub struct HttpUpstream {
    client: Client,
    base: Url,
    token: String,
}

impl HttpUpstream {
    pub fn new(
        base_url: &str,
        token: impl Into<String>,
        timeout: Duration,
    ) -> Result<Self, ClientError> {
        let base = parse_base_url(base_url)?;
        Ok(Self::with_client(build_client(timeout)?, base, token))
    }

    pub fn with_client(client: Client, base: Url, token: impl Into<String>) -> Self {
        Self {
            client,
            base,
            token: token.into(),
        }
    }

    pub fn base_url(&self) -> &Url {
        &self.base
    }

    fn url(&self, path: &str) -> UpstreamResult<Url> {
        self.base
            .join(path)
            .map_err(|e| UpstreamError::Transport(format!("bad endpoint {path}: {e}")))
    }

    async fn send(&self, req: RequestBuilder) -> UpstreamResult<Response> {
        let resp = req
            .bearer_auth(&self.token)
            .send()
            .await
            .map_err(|e| UpstreamError::Transport(e.to_string()))?;
        let status = resp.status();
        if status.is_success() {
            return Ok(resp);
        }
        let body = resp.text().await.unwrap_or_default();
        debug!(status = status.as_u16(), "upstream returned an error");
        Err(UpstreamError::Http {
            status: status.as_u16(),
            body,
        })
    }

    /// Send and decode the body as JSON. An empty body decodes as `null`.
    async fn send_value(&self, req: RequestBuilder) -> UpstreamResult<Value> {
        let resp = self.send(req).await?;
        let bytes = resp
            .bytes()
            .await
            .map_err(|e| UpstreamError::Transport(e.to_string()))?;
        if bytes.iter().all(u8::is_ascii_whitespace) {
            return Ok(Value::Null);
        }
        serde_json::from_slice(&bytes).map_err(|e| UpstreamError::Decode(e.to_string()))
    }

    async fn send_json<T: DeserializeOwned>(&self, req: RequestBuilder) -> UpstreamResult<T> {
        decode(self.send_value(req).await?)
    }

    async fn get_venues(&self) -> UpstreamResult<Vec<Venue>> {
        let url = self.url("venues")?;
        self.send_json(self.client.get(url)).await
    }

    async fn get_layout(&self, venue_id: VenueId) -> UpstreamResult<Value> {
        let url = self.url(&format!("venues/{venue_id}/layout"))?;
        self.send_value(self.client.get(url)).await
    }

    async fn get_reservation(&self) -> UpstreamResult<Option<Reservation>> {
        let url = self.url("reservation")?;
        let value = self.send_value(self.client.get(url)).await?;
        reservation_from(value)
    }

    async fn post_reservation(&self, venue_id: VenueId, seat_key: &str) -> UpstreamResult<()> {
        let url = self.url("reservation")?;
        let req = self
            .client
            .post(url)
            .query(&[("venueId", venue_id.to_string().as_str()), ("seatKey", seat_key)]);
        let value = self.send_value(req).await?;
        reject_soft_failure(&value)
    }

    async fn delete_reservation(&self) -> UpstreamResult<()> {
        let url = self.url("reservation")?;
        self.send_value(self.client.delete(url)).await.map(|_| ())
    }

    async fn post_sign_in(&self) -> UpstreamResult<String> {
        let url = self.url("signin")?;
        let value = self.send_value(self.client.post(url)).await?;
        Ok(match value.get("message") {
            Some(Value::String(s)) => s.clone(),
            Some(other) => other.to_string(),
            None => String::new(),
        })
    }

    async fn get_frequent_seats(&self) -> UpstreamResult<Vec<FrequentSeat>> {
        let url = self.url("frequent-seats")?;
        let value = self.send_value(self.client.get(url)).await?;
        if value.is_null() {
            return Ok(Vec::new());
        }
        decode(value)
    }
}

impl Upstream for HttpUpstream {
    fn list_venues(&self) -> BoxFuture<'_, UpstreamResult<Vec<Venue>>> {
        self.get_venues().boxed()
    }

    fn venue_layout(&self, venue_id: VenueId) -> BoxFuture<'_, UpstreamResult<Value>> {
        self.get_layout(venue_id).boxed()
    }

    fn current_reservation(&self) -> BoxFuture<'_, UpstreamResult<Option<Reservation>>> {
        self.get_reservation().boxed()
    }

    fn reserve<'a>(
        &'a self,
        venue_id: VenueId,
        seat_key: &'a str,
    ) -> BoxFuture<'a, UpstreamResult<()>> {
        self.post_reservation(venue_id, seat_key).boxed()
    }

    fn cancel_reservation(&self) -> BoxFuture<'_, UpstreamResult<()>> {
        self.delete_reservation().boxed()
    }

    fn sign_in(&self) -> BoxFuture<'_, UpstreamResult<String>> {
        self.post_sign_in().boxed()
    }

    fn frequent_seats(&self) -> BoxFuture<'_, UpstreamResult<Vec<FrequentSeat>>> {
        self.get_frequent_seats().boxed()
    }
}

// ---------------------------------------------------------------------------
// Response shapes
// ---------------------------------------------------------------------------

fn decode<T: DeserializeOwned>(value: Value) -> UpstreamResult<T> {
    serde_json::from_value(value).map_err(|e| UpstreamError::Decode(e.to_string()))
}

/// `null`, `{}` and `[]` all mean "no reservation". A list carries the
/// reservation as its first element.
fn reservation_from(value: Value) -> UpstreamResult<Option<Reservation>> {
    let value = match value {
        Value::Array(items) => items.into_iter().next().unwrap_or(Value::Null),
        other => other,
    };
    match &value {
        Value::Null => Ok(None),
        Value::Object(map) if map.is_empty() => Ok(None),
        _ => decode(value).map(Some),
    }
}

/// The backend sometimes answers a refused reservation with HTTP 200 and
/// `{"status": "restricted", "message": ..}`. Surface that as a 403.
fn reject_soft_failure(value: &Value) -> UpstreamResult<()> {
    if value.get("status").and_then(Value::as_str) == Some("restricted") {
        return Err(UpstreamError::Http {
            status: 403,
            body: value.to_string(),
        });
    }
    Ok(())
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
