use crate::audit::{AuditEntry, AuditSink};
use crate::config::FetchConfig;
use crate::fetch::{Backoff, BlockReason, FetchError};
use crate::ratelimit::RateLimiterManager;
use crate::robots::{RobotsChecker, RobotsError};
use crate::url::{classify_url, extract_host, extract_path, parse_target};
use chrono::{DateTime, Utc};
use reqwest::{redirect::Policy, Client, Response, StatusCode};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio_util::sync::CancellationToken;

/// Per-call bookkeeping that ends up in the audit entry
#[derive(Debug, Default)]
struct RequestTrace {
    host: String,
    path: String,
    status: Option<u16>,
    robots_allowed: bool,
    robots_group: Option<String>,
    retry_count: u32,
}

/// HTTP client shared by all providers
///
/// Cheap to share behind an `Arc`; all state lives in the rate limiter and
/// robots checker, which are themselves safe for concurrent use.
pub struct FetchClient {
    http: Client,
    config: FetchConfig,
    limiter: Arc<RateLimiterManager>,
    robots: Arc<RobotsChecker>,
    audit: Arc<dyn AuditSink>,
}

impl FetchClient {
    /// Builds a fetch client
    ///
    /// Redirects are not followed: a 3xx response is returned to the caller
    /// so a redirect can never carry a request past the policy checks.
    ///
    /// # Arguments
    ///
    /// * `config` - Fetch settings (user agent, timeout, retries, live-fetch switch)
    /// * `limiter` - Shared rate limiter
    /// * `robots` - Shared robots.txt checker
    /// * `audit` - Destination for audit entries
    pub fn new(
        config: FetchConfig,
        limiter: Arc<RateLimiterManager>,
        robots: Arc<RobotsChecker>,
        audit: Arc<dyn AuditSink>,
    ) -> Result<Self, FetchError> {
        let http = Client::builder()
            .user_agent(config.user_agent.clone())
            .timeout(Duration::from_secs(config.http_timeout_seconds))
            .connect_timeout(Duration::from_secs(config.http_timeout_seconds.min(10)))
            .redirect(Policy::none())
            .gzip(true)
            .brotli(true)
            .build()?;

        Ok(Self {
            http,
            config,
            limiter,
            robots,
            audit,
        })
    }

    pub fn config(&self) -> &FetchConfig {
        &self.config
    }

    /// Performs a GET request with compliance checks
    ///
    /// # Request Flow
    ///
    /// 1. Parse and classify the URL
    ///    - External host with live fetch disabled → `PolicyBlocked`
    /// 2. External host: check robots.txt
    ///    - Disallowed → `PolicyBlocked`
    ///    - robots.txt unavailable → `ComplianceCheckFailed`
    /// 3. Wait for a rate-limit token for `provider_key`
    /// 4. Send the request, retrying network errors, 429 and 5xx
    ///    - Other 4xx → `PermanentHttp`
    ///    - Retries used up → `RetriesExhausted`
    ///
    /// Exactly one audit entry is recorded for every call.
    pub async fn get(
        &self,
        cancel: &CancellationToken,
        provider_key: &str,
        url: &str,
    ) -> Result<Response, FetchError> {
        let timestamp = Utc::now();
        let started = Instant::now();
        let mut trace = RequestTrace::default();

        let result = self.execute(cancel, provider_key, url, &mut trace).await;

        self.record(timestamp, started, provider_key, url, trace, &result);
        result
    }

    /// Performs a GET request and reads the body as text
    pub async fn get_text(
        &self,
        cancel: &CancellationToken,
        provider_key: &str,
        url: &str,
    ) -> Result<String, FetchError> {
        let response = self.get(cancel, provider_key, url).await?;

        tokio::select! {
            body = response.text() => body.map_err(|e| FetchError::Body {
                url: url.to_string(),
                message: e.to_string(),
            }),
            _ = cancel.cancelled() => Err(FetchError::Cancelled { url: url.to_string() }),
        }
    }

    async fn execute(
        &self,
        cancel: &CancellationToken,
        provider_key: &str,
        url: &str,
        trace: &mut RequestTrace,
    ) -> Result<Response, FetchError> {
        let cancelled = || FetchError::Cancelled {
            url: url.to_string(),
        };

        let target = parse_target(url).map_err(|e| FetchError::InvalidUrl {
            url: url.to_string(),
            message: e.to_string(),
        })?;
        trace.host = extract_host(&target);
        trace.path = extract_path(&target);

        if classify_url(&target).is_external() {
            if !self.config.allow_live_fetch {
                tracing::debug!("Blocked external request to {} (live fetch disabled)", url);
                return Err(FetchError::PolicyBlocked {
                    url: url.to_string(),
                    reason: BlockReason::LiveFetchDisabled,
                });
            }

            let decision = self
                .robots
                .can_fetch(cancel, &target, &self.config.user_agent)
                .await
                .map_err(|cause| match cause {
                    RobotsError::Cancelled { .. } => cancelled(),
                    cause => FetchError::ComplianceCheckFailed {
                        url: url.to_string(),
                        cause,
                    },
                })?;

            trace.robots_group = decision.matched_group.clone();
            if !decision.allowed {
                tracing::info!("URL {} disallowed by robots.txt", url);
                return Err(FetchError::PolicyBlocked {
                    url: url.to_string(),
                    reason: BlockReason::RobotsDisallowed {
                        group: decision.matched_group,
                    },
                });
            }
        }
        trace.robots_allowed = true;

        self.limiter
            .wait(cancel, provider_key)
            .await
            .map_err(|_| cancelled())?;

        let mut backoff = Backoff::from_config(&self.config);
        let mut attempt: u32 = 0;

        loop {
            trace.retry_count = attempt;

            let sent = tokio::select! {
                sent = self.http.get(target.clone()).send() => sent,
                _ = cancel.cancelled() => return Err(cancelled()),
            };

            let (last_status, cause) = match sent {
                Ok(response) => {
                    let status = response.status();
                    trace.status = Some(status.as_u16());

                    if status == StatusCode::TOO_MANY_REQUESTS || status.is_server_error() {
                        (Some(status.as_u16()), format!("HTTP {}", status))
                    } else if status.is_client_error() {
                        return Err(FetchError::PermanentHttp {
                            url: url.to_string(),
                            status: status.as_u16(),
                        });
                    } else {
                        return Ok(response);
                    }
                }
                Err(e) => {
                    trace.status = None;
                    (None, e.to_string())
                }
            };

            let Some(delay) = backoff.next() else {
                return Err(FetchError::RetriesExhausted {
                    url: url.to_string(),
                    attempts: attempt + 1,
                    last_status,
                    cause,
                });
            };

            tracing::warn!(
                "Request to {} failed ({}), retrying in {:?} (attempt {}/{})",
                url,
                cause,
                delay,
                attempt + 1,
                self.config.max_retries
            );

            tokio::select! {
                _ = tokio::time::sleep(delay) => {}
                _ = cancel.cancelled() => return Err(cancelled()),
            }
            attempt += 1;
        }
    }

    fn record(
        &self,
        timestamp: DateTime<Utc>,
        started: Instant,
        provider_key: &str,
        url: &str,
        trace: RequestTrace,
        result: &Result<Response, FetchError>,
    ) {
        let robots_allowed = match result {
            Err(e) if e.is_policy_blocked() => false,
            _ => trace.robots_allowed,
        };

        self.audit.record(AuditEntry {
            timestamp,
            provider: provider_key.to_string(),
            method: "GET".to_string(),
            url: url.to_string(),
            host: trace.host,
            path: trace.path,
            status: trace.status,
            duration_ms: started.elapsed().as_millis() as u64,
            user_agent: self.config.user_agent.clone(),
            robots_allowed,
            robots_group: trace.robots_group,
            retry_count: trace.retry_count,
            error: result.as_ref().err().map(|e| e.to_string()),
        });
    }
}
