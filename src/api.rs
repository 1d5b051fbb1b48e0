//! Messaging API client.
//!
//! The member listing is reached through an HTTP gateway that fronts the
//! messaging network's user API. This module provides:
//! - The [`MemberDirectory`] seam the listing loop is written against
//! - Classification of gateway failures into rate-limit, permission and
//!   transient classes
//! - A rate-limited reqwest implementation, [`HttpDirectory`]

use crate::channel::ChannelRef;
use crate::config::{Credentials, RateLimitConfig};
use crate::schemas::{ChannelInfo, PageResult};
use async_trait::async_trait;
use governor::{DefaultDirectRateLimiter, Quota, RateLimiter};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use std::num::NonZeroU32;
use std::time::Duration;
use thiserror::Error;
use tracing::debug;

#[derive(Error, Debug)]
pub enum ApiError {
    /// Server asked us to back off for `wait` before retrying
    #[error("Rate limited, retry after {wait:?}")]
    RateLimited { wait: Duration },

    #[error("Permission denied: {0}")]
    PermissionDenied(String),

    #[error("Channel could not be resolved: {0}")]
    InvalidChannel(String),

    #[error("Not authorized: {0}")]
    Unauthorized(String),

    /// Two-step verification is enabled; sign in with the password
    #[error("Account password required")]
    PasswordNeeded,

    /// Anything not covered above: network failures, 5xx, malformed bodies
    #[error("Transient failure: {0}")]
    Transient(String),

    #[error("HTTP client setup failed: {0}")]
    ClientBuild(reqwest::Error),
}

impl From<reqwest::Error> for ApiError {
    fn from(err: reqwest::Error) -> Self {
        ApiError::Transient(err.to_string())
    }
}

/// Member search filter. The export always asks for the unfiltered list.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SearchFilter {
    pub query: String,
}

impl SearchFilter {
    pub fn none() -> Self {
        Self::default()
    }
}

/// Paged member listing plus channel lookup.
#[async_trait]
pub trait MemberDirectory: Send + Sync {
    async fn resolve_channel(&self, reference: &ChannelRef) -> Result<ChannelInfo, ApiError>;

    async fn request_page(
        &self,
        channel: &ChannelInfo,
        filter: &SearchFilter,
        offset: u64,
        limit: u32,
    ) -> Result<PageResult, ApiError>;
}

/// Error payload returned by the gateway on non-2xx responses
#[derive(Debug, Default, Deserialize)]
pub struct ErrorBody {
    #[serde(default)]
    pub error: String,

    #[serde(default)]
    pub description: Option<String>,

    /// Seconds to wait, present on flood-wait errors
    #[serde(default)]
    pub retry_after: Option<u64>,
}

impl ErrorBody {
    fn message(&self) -> String {
        match &self.description {
            Some(desc) if !desc.is_empty() => format!("{}: {}", self.error, desc),
            _ => self.error.clone(),
        }
    }

    /// `FLOOD_WAIT_17` carries the wait in its name
    fn flood_wait_suffix(&self) -> Option<u64> {
        self.error
            .strip_prefix("FLOOD_WAIT_")
            .and_then(|secs| secs.parse().ok())
    }
}

/// Map a failed gateway response onto the error classes the listing loop
/// distinguishes.
pub fn classify_failure(status: u16, body: &ErrorBody, retry_after_header: Option<u64>) -> ApiError {
    let code = body.error.as_str();

    let is_flood = status == 429 || code.starts_with("FLOOD_WAIT");
    if is_flood {
        let wait = body
            .retry_after
            .or_else(|| body.flood_wait_suffix())
            .or(retry_after_header);
        return match wait {
            Some(secs) => ApiError::RateLimited {
                wait: Duration::from_secs(secs),
            },
            // A flood signal without a wait is not actionable as one
            None => ApiError::Transient(format!("HTTP {} without retry_after: {}", status, body.message())),
        };
    }

    match code {
        "CHAT_ADMIN_REQUIRED" | "CHANNEL_PRIVATE" | "CHAT_FORBIDDEN" => {
            return ApiError::PermissionDenied(body.message())
        }
        "CHANNEL_INVALID" | "USERNAME_INVALID" | "USERNAME_NOT_OCCUPIED" | "INVITE_HASH_INVALID"
        | "INVITE_HASH_EXPIRED" | "PEER_ID_INVALID" => return ApiError::InvalidChannel(body.message()),
        "SESSION_PASSWORD_NEEDED" => return ApiError::PasswordNeeded,
        "AUTH_KEY_UNREGISTERED" | "PHONE_CODE_INVALID" | "PHONE_CODE_EXPIRED"
        | "PASSWORD_HASH_INVALID" => return ApiError::Unauthorized(body.message()),
        _ => {}
    }

    match status {
        403 => ApiError::PermissionDenied(body.message()),
        401 => ApiError::Unauthorized(body.message()),
        404 => ApiError::InvalidChannel(body.message()),
        _ => ApiError::Transient(format!("HTTP {}: {}", status, body.message())),
    }
}

#[derive(Debug, Deserialize)]
pub struct SessionStatus {
    pub authorized: bool,
}

/// The signed-in account
#[derive(Debug, Clone, Deserialize)]
pub struct Account {
    pub id: i64,
    #[serde(default)]
    pub username: Option<String>,
}

#[derive(Serialize)]
struct CodeRequest<'a> {
    phone: &'a str,
}

#[derive(Serialize)]
struct SignInRequest<'a> {
    phone: &'a str,
    code: &'a str,
}

#[derive(Serialize)]
struct PasswordRequest<'a> {
    password: &'a str,
}

#[derive(Deserialize)]
struct Ack {}

/// Rate-limited gateway client.
pub struct HttpDirectory {
    client: reqwest::Client,
    base_url: String,
    credentials: Credentials,
    rate_limiter: DefaultDirectRateLimiter,
}

impl HttpDirectory {
    pub fn new(
        base_url: String,
        credentials: Credentials,
        config: &RateLimitConfig,
    ) -> Result<Self, ApiError> {
        let quota = Quota::per_second(
            NonZeroU32::new(config.requests_per_second).unwrap_or(NonZeroU32::MIN),
        );

        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.request_timeout_secs))
            .user_agent(concat!("channel-members/", env!("CARGO_PKG_VERSION")))
            .build()
            .map_err(ApiError::ClientBuild)?;

        Ok(Self {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
            credentials,
            rate_limiter: RateLimiter::direct(quota),
        })
    }

    fn url(&self, path: &str) -> String {
        format!("{}/v1/{}", self.base_url, path)
    }

    fn get(&self, path: &str) -> reqwest::RequestBuilder {
        self.authorize(self.client.get(self.url(path)))
    }

    fn post(&self, path: &str) -> reqwest::RequestBuilder {
        self.authorize(self.client.post(self.url(path)))
    }

    fn authorize(&self, request: reqwest::RequestBuilder) -> reqwest::RequestBuilder {
        request
            .header("X-Api-Id", &self.credentials.api_id)
            .header("X-Api-Hash", &self.credentials.api_hash)
            .header("X-Session", &self.credentials.username)
    }

    /// Send one request and decode its body, classifying failures.
    async fn call<R: DeserializeOwned>(&self, request: reqwest::RequestBuilder) -> Result<R, ApiError> {
        self.rate_limiter.until_ready().await;

        let response = request.send().await?;
        let status = response.status();

        if status.is_success() {
            return response
                .json::<R>()
                .await
                .map_err(|e| ApiError::Transient(format!("Invalid response body: {}", e)));
        }

        let retry_after_header = response
            .headers()
            .get(reqwest::header::RETRY_AFTER)
            .and_then(|v| v.to_str().ok())
            .and_then(|v| v.trim().parse::<u64>().ok());
        let text = response.text().await.unwrap_or_default();
        let body: ErrorBody = serde_json::from_str(&text).unwrap_or_else(|_| ErrorBody {
            error: text.chars().take(200).collect(),
            ..ErrorBody::default()
        });

        debug!("Gateway returned HTTP {}: {}", status.as_u16(), body.message());
        Err(classify_failure(status.as_u16(), &body, retry_after_header))
    }

    pub async fn session_status(&self) -> Result<SessionStatus, ApiError> {
        self.call(self.get("session/status")).await
    }

    pub async fn send_code(&self, phone: &str) -> Result<(), ApiError> {
        let _: Ack = self.call(self.post("session/code").json(&CodeRequest { phone })).await?;
        Ok(())
    }

    pub async fn sign_in_code(&self, phone: &str, code: &str) -> Result<(), ApiError> {
        let _: Ack = self
            .call(self.post("session/sign_in").json(&SignInRequest { phone, code }))
            .await?;
        Ok(())
    }

    pub async fn sign_in_password(&self, password: &str) -> Result<(), ApiError> {
        let _: Ack = self
            .call(self.post("session/password").json(&PasswordRequest { password }))
            .await?;
        Ok(())
    }

    pub async fn me(&self) -> Result<Account, ApiError> {
        self.call(self.get("session/me")).await
    }
}

#[async_trait]
impl MemberDirectory for HttpDirectory {
    async fn resolve_channel(&self, reference: &ChannelRef) -> Result<ChannelInfo, ApiError> {
        let (kind, value) = match reference {
            ChannelRef::Id(id) => ("id", id.to_string()),
            ChannelRef::Username(name) => ("username", name.clone()),
            ChannelRef::Invite(hash) => ("invite", hash.clone()),
        };
        let request = self.get("channels/resolve").query(&[(kind, value)]);
        self.call(request).await
    }

    async fn request_page(
        &self,
        channel: &ChannelInfo,
        filter: &SearchFilter,
        offset: u64,
        limit: u32,
    ) -> Result<PageResult, ApiError> {
        let request = self
            .get(&format!("channels/{}/participants", channel.id))
            .query(&[
                ("q", filter.query.clone()),
                ("offset", offset.to_string()),
                ("limit", limit.to_string()),
            ]);
        self.call(request).await
    }
}
