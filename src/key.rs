//! Fixture key derivation.
//!
//! Maps a request onto the storage path of its fixture. The mapping only
//! depends on the route and on the request's method, path, query and
//! (optionally) body, so it is stable across restarts.

use crate::config::RouteConfig;
use bytes::Bytes;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::fmt;
use std::path::{Path, PathBuf};

/// Suffix appended to a key to locate its placeholder fixture.
pub const PLACEHOLDER_SUFFIX: &str = ".404";

/// Longest sanitized url kept in a readable file name. Leaves room for the
/// digests, `.json` and `.404` under the usual 255-byte name limit.
const MAX_READABLE_PREFIX: usize = 150;

/// How the fixture file name is built from the request.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum KeyStrategy {
    /// SHA-256 of the request
    #[default]
    Hash,
    /// Sanitized method and url, easier to find by hand
    Readable,
}

/// Storage path of a fixture.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct FixtureKey(PathBuf);

impl FixtureKey {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self(path.into())
    }

    pub fn path(&self) -> &Path {
        &self.0
    }

    /// Sibling key where the empty mock for a miss is written.
    pub fn placeholder(&self) -> FixtureKey {
        let mut raw = self.0.clone().into_os_string();
        raw.push(PLACEHOLDER_SUFFIX);
        FixtureKey(PathBuf::from(raw))
    }
}

impl fmt::Display for FixtureKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0.display())
    }
}

/// The parts of a request that feed key derivation.
#[derive(Debug, Clone)]
pub struct RequestView {
    pub method: String,
    /// Path and query, as received
    pub url: String,
    /// Only captured when the route hashes the full request
    pub body: Option<Bytes>,
}

impl RequestView {
    pub fn new(method: impl Into<String>, url: impl Into<String>) -> Self {
        Self {
            method: method.into(),
            url: url.into(),
            body: None,
        }
    }

    pub fn with_body(mut self, body: impl Into<Bytes>) -> Self {
        self.body = Some(body.into());
        self
    }
}

/// Derive the fixture key for `request` on `route`.
pub fn mock_path(route: &RouteConfig, request: &RequestView) -> FixtureKey {
    let body = if route.hash_full_request {
        Some(request.body.as_deref().unwrap_or_default())
    } else {
        None
    };

    let file_name = match route.key_strategy {
        KeyStrategy::Hash => hash_file_name(&request.method, &request.url, body),
        KeyStrategy::Readable => readable_file_name(&request.method, &request.url, body),
    };

    FixtureKey(route.mocks_path.join(&route.name).join(file_name))
}

fn hash_file_name(method: &str, url: &str, body: Option<&[u8]>) -> String {
    let mut hasher = Sha256::new();
    hasher.update(method.to_uppercase().as_bytes());
    hasher.update(b"\n");
    hasher.update(url.as_bytes());
    if let Some(body) = body {
        hasher.update(b"\n");
        hasher.update(body);
    }
    format!("{:x}.json", hasher.finalize())
}

fn readable_file_name(method: &str, url: &str, body: Option<&[u8]>) -> String {
    let mut name = method.to_uppercase();
    name.push('_');
    name.extend(url.chars().map(|c| {
        if c.is_ascii_alphanumeric() || matches!(c, '.' | '_' | '-') {
            c
        } else {
            '_'
        }
    }));
    // Sanitized names are ASCII, so byte truncation stays on a char boundary.
    if name.len() > MAX_READABLE_PREFIX {
        name.truncate(MAX_READABLE_PREFIX);
        let mut hasher = Sha256::new();
        hasher.update(method.to_uppercase().as_bytes());
        hasher.update(b"\n");
        hasher.update(url.as_bytes());
        let digest = format!("{:x}", hasher.finalize());
        name.push('_');
        name.push_str(&digest[..16]);
    }
    if let Some(body) = body {
        let digest = format!("{:x}", Sha256::digest(body));
        name.push('_');
        name.push_str(&digest[..16]);
    }
    name.push_str(".json");
    name
}
