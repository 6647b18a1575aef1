//! GitHub-style contents API client.
//!
//! The base URL is injectable so tests (and GitHub-compatible backends) need
//! no special-casing. The contents API's blob `sha` is used as the change
//! marker recorded on mirrored files.

use crate::source::rate_limit::RateLimiter;
use base64::Engine as _;
use base64::engine::general_purpose::STANDARD as BASE64;
use benchkube_ports::{BoxFuture, SourceBlob, SourceClient, SourceEntry, SourceLocation};
use benchkube_shared::{
    DEFAULT_CALL_TIMEOUT, ErrorClass, ErrorEnvelope, RequestContext, Result, SecretString,
    bounded_call,
};
use reqwest::StatusCode;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use url::Url;

/// Configuration for the source client.
#[derive(Debug, Clone)]
pub struct GithubSourceConfig {
    /// API base URL (e.g. `https://api.github.com`).
    pub base_url: Url,
    /// Optional bearer token.
    pub token: Option<SecretString>,
    /// Requests per second per token.
    pub requests_per_second: u32,
}

/// Source client over the GitHub contents API.
#[derive(Debug, Clone)]
pub struct GithubSourceClient {
    client: reqwest::Client,
    base_url: Url,
    token: Option<SecretString>,
    limiter: Arc<RateLimiter>,
}

#[derive(Debug, Deserialize)]
struct ContentsEntry {
    name: String,
    path: String,
    sha: String,
    #[serde(rename = "type")]
    entry_type: String,
    #[serde(default)]
    content: Option<String>,
    #[serde(default)]
    encoding: Option<String>,
}

#[derive(Debug, Serialize)]
struct PutContents<'a> {
    message: &'a str,
    content: String,
    branch: &'a str,
    #[serde(skip_serializing_if = "Option::is_none")]
    sha: Option<String>,
}

#[derive(Debug, Deserialize)]
struct PutResponse {
    commit: CommitRef,
}

#[derive(Debug, Deserialize)]
struct CommitRef {
    sha: String,
}

impl GithubSourceClient {
    /// Build a client from configuration.
    pub fn new(config: GithubSourceConfig) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(DEFAULT_CALL_TIMEOUT)
            .user_agent("benchkube")
            .build()
            .map_err(|error| {
                ErrorEnvelope::unexpected(
                    benchkube_shared::ErrorCode::new("source", "client_init_failed"),
                    format!("failed to build source client: {error}"),
                    ErrorClass::NonRetriable,
                )
            })?;
        Ok(Self {
            client,
            base_url: config.base_url,
            token: config.token,
            limiter: Arc::new(RateLimiter::per_second(config.requests_per_second)),
        })
    }

    fn contents_url(&self, location: &SourceLocation, path: &str) -> Result<Url> {
        let mut url = self
            .base_url
            .join(&format!(
                "repos/{}/{}/contents/{path}",
                location.owner, location.repository
            ))
            .map_err(|error| ErrorEnvelope::invalid(format!("invalid source path: {error}")))?;
        url.query_pairs_mut()
            .append_pair("ref", &location.reference);
        Ok(url)
    }

    fn authorize(&self, request: reqwest::RequestBuilder) -> reqwest::RequestBuilder {
        match &self.token {
            Some(token) => request.bearer_auth(token.expose()),
            None => request,
        }
    }

    async fn get_json<T: for<'de> Deserialize<'de>>(
        &self,
        ctx: &RequestContext,
        url: Url,
        operation: &'static str,
    ) -> Result<T> {
        self.limiter.acquire().await;
        let request = self.authorize(self.client.get(url));
        let send = async {
            let response = request
                .send()
                .await
                .map_err(|error| ErrorEnvelope::upstream(format!("source unreachable: {error}")))?;
            map_response(response).await?.json::<T>().await.map_err(|error| {
                ErrorEnvelope::upstream(format!("source returned malformed JSON: {error}"))
            })
        };
        bounded_call(ctx, operation, send).await
    }
}

async fn map_response(response: reqwest::Response) -> Result<reqwest::Response> {
    match response.status() {
        status if status.is_success() => Ok(response),
        StatusCode::NOT_FOUND => Err(ErrorEnvelope::not_found("source path not found")),
        StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN => Err(ErrorEnvelope::unauthorized(
            "source rejected the credentials",
        )),
        StatusCode::TOO_MANY_REQUESTS => Err(ErrorEnvelope::transient(
            "source rate limit exceeded",
        )),
        status => Err(ErrorEnvelope::upstream(format!(
            "source returned {status}"
        ))),
    }
}

impl SourceClient for GithubSourceClient {
    fn list_folder<'a>(
        &'a self,
        ctx: &'a RequestContext,
        location: &'a SourceLocation,
        folder: &'a str,
    ) -> BoxFuture<'a, Result<Vec<SourceEntry>>> {
        Box::pin(async move {
            let url = self.contents_url(location, folder)?;
            let entries: Vec<ContentsEntry> =
                self.get_json(ctx, url, "source.list_folder").await?;
            Ok(entries
                .into_iter()
                .filter(|entry| entry.entry_type == "file")
                .map(|entry| SourceEntry {
                    path: entry.path.into_boxed_str(),
                    name: entry.name.into_boxed_str(),
                    sha: entry.sha.into_boxed_str(),
                })
                .collect())
        })
    }

    fn fetch_file<'a>(
        &'a self,
        ctx: &'a RequestContext,
        location: &'a SourceLocation,
        path: &'a str,
    ) -> BoxFuture<'a, Result<SourceBlob>> {
        Box::pin(async move {
            let url = self.contents_url(location, path)?;
            let entry: ContentsEntry = self.get_json(ctx, url, "source.fetch_file").await?;
            if entry.encoding.as_deref() != Some("base64") {
                return Err(ErrorEnvelope::upstream(format!(
                    "source returned unexpected encoding for {path}"
                )));
            }
            let raw = entry.content.unwrap_or_default().replace(['\n', '\r'], "");
            let content = BASE64.decode(raw).map_err(|error| {
                ErrorEnvelope::upstream(format!("source returned invalid base64: {error}"))
            })?;
            Ok(SourceBlob {
                content,
                commit: entry.sha.into_boxed_str(),
            })
        })
    }

    fn put_file<'a>(
        &'a self,
        ctx: &'a RequestContext,
        location: &'a SourceLocation,
        path: &'a str,
        content: &'a [u8],
        message: &'a str,
    ) -> BoxFuture<'a, Result<Box<str>>> {
        Box::pin(async move {
            // Updates need the current blob sha; creates go without one.
            let existing_sha = {
                let url = self.contents_url(location, path)?;
                match self
                    .get_json::<ContentsEntry>(ctx, url, "source.put_file.head")
                    .await
                {
                    Ok(entry) => Some(entry.sha),
                    Err(error) if error.code == benchkube_shared::ErrorCode::not_found() => None,
                    Err(error) => return Err(error),
                }
            };

            let url = self.contents_url(location, path)?;
            let body = PutContents {
                message,
                content: BASE64.encode(content),
                branch: &location.reference,
                sha: existing_sha,
            };
            self.limiter.acquire().await;
            let request = self.authorize(self.client.put(url)).json(&body);
            let send = async {
                let response = request.send().await.map_err(|error| {
                    ErrorEnvelope::upstream(format!("source unreachable: {error}"))
                })?;
                map_response(response)
                    .await?
                    .json::<PutResponse>()
                    .await
                    .map_err(|error| {
                        ErrorEnvelope::upstream(format!(
                            "source returned malformed JSON: {error}"
                        ))
                    })
            };
            let response = bounded_call(ctx, "source.put_file", send).await?;
            Ok(response.commit.sha.into_boxed_str())
        })
    }
}
