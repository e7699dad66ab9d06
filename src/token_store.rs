//! The single live OAuth token of the process and its on-disk copy.

use std::path::{Path, PathBuf};
use std::sync::{PoisonError, RwLock};
use std::time::{Duration, SystemTime, UNIX_EPOCH};

use anyhow::Context;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use tracing::{debug, info, warn};

/// Bearer and refresh credential as stored in the token file.
///
/// Unknown fields (`scope`, `token_type`, ...) are carried through so that a
/// rewrite never loses information written by the tool that minted the token.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Token {
    pub access_token: String,
    pub refresh_token: String,
    /// Unix seconds at which the access token expires, when known.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub expires_at: Option<f64>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

/// Response body of the token endpoint for a refresh grant.
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
pub struct TokenGrant {
    pub access_token: String,
    #[serde(default)]
    pub refresh_token: Option<String>,
    #[serde(default)]
    pub expires_in: Option<u64>,
    #[serde(default)]
    pub scope: Option<String>,
    #[serde(default)]
    pub token_type: Option<String>,
}

impl Token {
    pub fn new(access_token: impl Into<String>, refresh_token: impl Into<String>) -> Self {
        Self {
            access_token: access_token.into(),
            refresh_token: refresh_token.into(),
            expires_at: None,
            extra: Map::new(),
        }
    }

    /// Build the successor of `self` from a refresh grant.
    ///
    /// The refresh token is copied forward when the grant omits it.
    pub fn renewed(&self, grant: TokenGrant, now: SystemTime) -> Self {
        let mut extra = self.extra.clone();
        if let Some(expires_in) = grant.expires_in {
            extra.insert("expires_in".to_string(), Value::from(expires_in));
        }
        if let Some(scope) = grant.scope {
            extra.insert("scope".to_string(), Value::from(scope));
        }
        if let Some(token_type) = grant.token_type {
            extra.insert("token_type".to_string(), Value::from(token_type));
        }
        let expires_at = match grant.expires_in {
            Some(secs) => Some(unix_seconds(now + Duration::from_secs(secs))),
            None => self.expires_at,
        };
        Self {
            access_token: grant.access_token,
            refresh_token: grant
                .refresh_token
                .filter(|rt| !rt.is_empty())
                .unwrap_or_else(|| self.refresh_token.clone()),
            expires_at,
            extra,
        }
    }
}

fn unix_seconds(at: SystemTime) -> f64 {
    at.duration_since(UNIX_EPOCH).unwrap_or_default().as_secs_f64()
}

/// Holds the current token and persists every renewal.
#[derive(Debug)]
pub struct TokenStore {
    current: RwLock<Token>,
    path: Option<PathBuf>,
}

impl TokenStore {
    /// A store that writes renewed tokens back to `path`.
    pub fn persistent(token: Token, path: impl Into<PathBuf>) -> Self {
        Self {
            current: RwLock::new(token),
            path: Some(path.into()),
        }
    }

    /// A store that only keeps the token in memory.
    pub fn in_memory(token: Token) -> Self {
        Self {
            current: RwLock::new(token),
            path: None,
        }
    }

    pub fn current(&self) -> Token {
        self.current
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    pub fn path(&self) -> Option<&Path> {
        self.path.as_deref()
    }

    /// Merge a refresh grant into the stored token, persist it, then swap it in.
    ///
    /// The file is written before the lock is taken; a failed write is logged
    /// and the in-memory token stays authoritative.
    pub async fn update(&self, grant: TokenGrant) -> Token {
        let next = self.current().renewed(grant, SystemTime::now());
        if let Some(path) = self.path.as_deref() {
            match write_atomically(path, &next).await {
                Ok(()) => debug!(path = %path.display(), "persisted renewed token"),
                Err(err) => warn!(
                    path = %path.display(),
                    error = %format!("{err:#}"),
                    "failed to persist renewed token; keeping it in memory"
                ),
            }
        }
        *self.current.write().unwrap_or_else(PoisonError::into_inner) = next.clone();
        info!(expires_at = ?next.expires_at, "access token renewed");
        next
    }
}

async fn write_atomically(path: &Path, token: &Token) -> anyhow::Result<()> {
    let body = serde_json::to_vec_pretty(token).context("failed to serialize token")?;
    let mut tmp = path.as_os_str().to_owned();
    tmp.push(".tmp");
    let tmp = PathBuf::from(tmp);
    tokio::fs::write(&tmp, body)
        .await
        .with_context(|| format!("failed to write {}", tmp.display()))?;
    tokio::fs::rename(&tmp, path)
        .await
        .with_context(|| format!("failed to replace {}", path.display()))?;
    Ok(())
}
