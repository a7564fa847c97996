//! Request helpers shared by the handlers

use axum::http::{HeaderMap, header};
use http_body_util::{BodyExt, LengthLimitError, Limited};

use crate::api::error::ApiError;

/// Parses and validates a Content-Type header value for application/json
///
/// Accepts `application/json` with optional parameters; rejects
/// `application/jsonp`, `application/json-patch+json`, `text/json` and
/// malformed media types.
pub fn parse_content_type(content_type: &str) -> Result<mime::Mime, ApiError> {
    let media_type: mime::Mime = content_type
        .parse()
        .map_err(|_| ApiError::InvalidPayload(format!("invalid Content-Type: {}", content_type)))?;

    if media_type.type_() != mime::APPLICATION || media_type.subtype() != mime::JSON {
        return Err(ApiError::InvalidPayload(format!(
            "Content-Type must be application/json, got: {}/{}",
            media_type.type_(),
            media_type.subtype()
        )));
    }

    Ok(media_type)
}

/// Require a JSON Content-Type header
pub fn require_json(headers: &HeaderMap) -> Result<(), ApiError> {
    let content_type = headers
        .get(header::CONTENT_TYPE)
        .and_then(|value| value.to_str().ok())
        .ok_or_else(|| ApiError::InvalidPayload("missing Content-Type header".into()))?;
    parse_content_type(content_type)?;
    Ok(())
}

/// Collect a (already decompressed) request body, refusing more than `limit` bytes
pub async fn read_body(body: axum::body::Body, limit: usize) -> Result<Vec<u8>, ApiError> {
    let collected = Limited::new(body, limit).collect().await.map_err(|err| {
        if err.downcast_ref::<LengthLimitError>().is_some() {
            ApiError::PayloadTooLarge(limit)
        } else {
            ApiError::InvalidPayload(format!("failed to read body: {}", err))
        }
    })?;

    Ok(collected.to_bytes().to_vec())
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::HeaderValue;

    #[test]
    fn test_parse_content_type_valid() {
        assert!(parse_content_type("application/json").is_ok());
        assert!(parse_content_type("application/json; charset=utf-8").is_ok());
    }

    #[test]
    fn test_parse_content_type_invalid() {
        assert!(parse_content_type("application/jsonp").is_err());
        assert!(parse_content_type("application/json-patch+json").is_err());
        assert!(parse_content_type("text/json").is_err());
        assert!(parse_content_type("").is_err());
    }

    #[test]
    fn test_require_json_header() {
        let mut headers = HeaderMap::new();
        assert!(require_json(&headers).is_err());

        headers.insert(header::CONTENT_TYPE, HeaderValue::from_static("application/json"));
        assert!(require_json(&headers).is_ok());
    }

    #[tokio::test]
    async fn test_read_body_within_limit() {
        let body = axum::body::Body::from(vec![b'x'; 100]);
        assert_eq!(read_body(body, 100).await.unwrap().len(), 100);
    }

    #[tokio::test]
    async fn test_read_body_too_large() {
        let body = axum::body::Body::from(vec![b'x'; 101]);
        match read_body(body, 100).await {
            Err(ApiError::PayloadTooLarge(limit)) => assert_eq!(limit, 100),
            other => panic!("expected PayloadTooLarge, got {other:?}"),
        }
    }
}
