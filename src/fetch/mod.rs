//! Resilient, policy-aware HTTP fetching
//!
//! This module handles every outbound request made on behalf of providers:
//! - Blocking external hosts while live fetching is disabled
//! - robots.txt compliance for external hosts
//! - Per-provider rate limiting
//! - Retries with exponential backoff for transient failures
//! - One audit entry per call

mod backoff;
mod client;

pub use backoff::Backoff;
pub use client::FetchClient;

use crate::robots::RobotsError;
use std::fmt;
use thiserror::Error;

/// Why a request was refused before reaching the network
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BlockReason {
    /// External host while live fetching is switched off
    LiveFetchDisabled,
    /// robots.txt disallows the path
    RobotsDisallowed { group: Option<String> },
}

impl fmt::Display for BlockReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::LiveFetchDisabled => write!(f, "live fetch is disabled for external hosts"),
            Self::RobotsDisallowed { group: Some(group) } => {
                write!(f, "robots.txt disallows this path (group '{}')", group)
            }
            Self::RobotsDisallowed { group: None } => write!(f, "robots.txt disallows this path"),
        }
    }
}

/// Fetch errors
#[derive(Debug, Error)]
pub enum FetchError {
    #[error("Invalid URL '{url}': {message}")]
    InvalidUrl { url: String, message: String },

    #[error("Request to {url} blocked: {reason}")]
    PolicyBlocked { url: String, reason: BlockReason },

    #[error("robots.txt check failed for {url}: {cause}")]
    ComplianceCheckFailed {
        url: String,
        #[source]
        cause: RobotsError,
    },

    #[error("{url} returned HTTP {status}")]
    PermanentHttp { url: String, status: u16 },

    #[error("{url} failed after {attempts} attempts: {cause}")]
    RetriesExhausted {
        url: String,
        attempts: u32,
        last_status: Option<u16>,
        cause: String,
    },

    #[error("Failed to read body of {url}: {message}")]
    Body { url: String, message: String },

    #[error("Request to {url} was cancelled")]
    Cancelled { url: String },

    #[error("Failed to build HTTP client: {0}")]
    Client(#[from] reqwest::Error),
}

impl FetchError {
    /// True for refusals by policy, including a failed robots.txt check
    pub fn is_policy_blocked(&self) -> bool {
        matches!(
            self,
            Self::PolicyBlocked { .. } | Self::ComplianceCheckFailed { .. }
        )
    }

    /// HTTP status associated with the error, if any
    pub fn status(&self) -> Option<u16> {
        match self {
            Self::PermanentHttp { status, .. } => Some(*status),
            Self::RetriesExhausted { last_status, .. } => *last_status,
            _ => None,
        }
    }
}
