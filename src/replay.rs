//! Turns stored fixture bytes back into an HTTP response.

use crate::error::FixtureError;
use crate::fixture::FixtureRecord;
use bytes::Bytes;
use http::header::{HeaderValue, CONTENT_TYPE};
use http::{Response, StatusCode};
use http_body_util::Full;

/// Build the response recorded in `fixture`.
pub fn replay(fixture: &[u8]) -> Result<Response<Full<Bytes>>, FixtureError> {
    let record = FixtureRecord::from_slice(fixture)?;
    replay_record(&record)
}

pub fn replay_record(record: &FixtureRecord) -> Result<Response<Full<Bytes>>, FixtureError> {
    let status = StatusCode::from_u16(record.status_code)
        .map_err(|_| FixtureError::InvalidStatus(record.status_code))?;
    let content_type = HeaderValue::from_str(&record.content_type)
        .map_err(|_| FixtureError::InvalidContentType(record.content_type.clone()))?;
    let body = record.data.to_body()?;

    let mut response = Response::new(Full::new(Bytes::from(body)));
    *response.status_mut() = status;
    response.headers_mut().insert(CONTENT_TYPE, content_type);
    Ok(response)
}
