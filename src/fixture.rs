//! On-disk fixture format.
//!
//! ```json
//! {
//!   "requestUrl": "/users/42",
//!   "contentType": "application/json",
//!   "statusCode": 200,
//!   "data": {"id": 42}
//! }
//! ```
//!
//! `data` is either a string, replayed verbatim, or any other JSON value,
//! replayed as its compact serialization.

use crate::error::FixtureError;
use serde::{Deserialize, Serialize};

/// Content type written into placeholder fixtures.
pub const PLACEHOLDER_CONTENT_TYPE: &str = "application/javascript";

/// A recorded response.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FixtureRecord {
    pub request_url: String,
    pub content_type: String,
    pub status_code: u16,
    pub data: FixtureData,
}

/// Response body of a fixture.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum FixtureData {
    Text(String),
    Structured(serde_json::Value),
}

impl FixtureData {
    /// Body bytes as they go on the wire.
    pub fn to_body(&self) -> Result<String, FixtureError> {
        match self {
            FixtureData::Text(text) => Ok(text.clone()),
            FixtureData::Structured(value) => Ok(serde_json::to_string(value)?),
        }
    }
}

impl FixtureRecord {
    /// Empty mock persisted on a miss so it can be edited into a real one.
    pub fn placeholder(request_url: impl Into<String>) -> Self {
        Self {
            request_url: request_url.into(),
            content_type: PLACEHOLDER_CONTENT_TYPE.to_string(),
            status_code: 200,
            data: FixtureData::Structured(serde_json::Value::Object(Default::default())),
        }
    }

    pub fn from_slice(bytes: &[u8]) -> Result<Self, FixtureError> {
        Ok(serde_json::from_slice(bytes)?)
    }

    /// Pretty-printed JSON with two-space indentation.
    pub fn to_pretty_json(&self) -> Result<Vec<u8>, FixtureError> {
        Ok(serde_json::to_vec_pretty(self)?)
    }
}
