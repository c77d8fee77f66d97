use axum::{body::Body, http::Request, middleware::Next, response::Response};
use serde::Deserialize;
use talk_types::StreamId;

use crate::api::ApiError;

/// Header a client uses to name the event stream its request reports to.
pub const STREAM_ID_HEADER: &str = "stream-id";

/// Wrapper for the validated `StreamId` stored in request extensions.
#[derive(Clone, Debug)]
pub struct StreamContext(pub StreamId);

/// Query parameters naming the stream a subscription connects to.
#[derive(Debug, Deserialize)]
pub struct StreamQuery {
    pub stream: Option<String>,
}

impl StreamQuery {
    /// Validates the `stream` parameter.
    pub fn stream_id(&self) -> Result<StreamId, ApiError> {
        let raw = self
            .stream
            .as_deref()
            .ok_or_else(|| ApiError::BadRequest("missing stream query parameter".to_string()))?;
        StreamId::parse(raw).map_err(|e| ApiError::BadRequest(e.to_string()))
    }
}

/// Middleware that requires a well-formed `stream-id` header.
///
/// Requests without one are rejected with 400 before any handler runs, so no
/// pipeline work starts for a client that could never see its results.
pub async fn stream_id_middleware(mut req: Request<Body>, next: Next) -> Result<Response, ApiError> {
    let raw = req
        .headers()
        .get(STREAM_ID_HEADER)
        .ok_or_else(|| ApiError::BadRequest(format!("missing {} header", STREAM_ID_HEADER)))?
        .to_str()
        .map_err(|_| ApiError::BadRequest(format!("{} header is not ASCII", STREAM_ID_HEADER)))?;

    let stream_id = StreamId::parse(raw).map_err(|e| ApiError::BadRequest(e.to_string()))?;

    req.extensions_mut().insert(StreamContext(stream_id));
    Ok(next.run(req).await)
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::StatusCode;
    use axum::{routing::post, Extension, Router};
    use tower::ServiceExt;

    async fn echo(Extension(StreamContext(id)): Extension<StreamContext>) -> String {
        id.to_string()
    }

    fn router() -> Router {
        Router::new()
            .route("/echo", post(echo))
            .layer(axum::middleware::from_fn(stream_id_middleware))
    }

    async fn call(header: Option<&str>) -> (StatusCode, String) {
        let mut builder = Request::builder().method("POST").uri("/echo");
        if let Some(value) = header {
            builder = builder.header(STREAM_ID_HEADER, value);
        }
        let response = router()
            .oneshot(builder.body(Body::empty()).unwrap())
            .await
            .unwrap();
        let status = response.status();
        let body = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .unwrap();
        (status, String::from_utf8(body.to_vec()).unwrap())
    }

    #[tokio::test]
    async fn valid_header_reaches_handler() {
        let id = "x".repeat(32);
        let (status, body) = call(Some(&id)).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body, id);
    }

    #[tokio::test]
    async fn missing_header_is_rejected() {
        let (status, body) = call(None).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert!(body.contains("missing stream-id header"));
    }

    #[test]
    fn stream_query_validates() {
        let ok = StreamQuery {
            stream: Some("Ab1".repeat(10) + "xy"),
        };
        assert!(ok.stream_id().is_ok());
        assert!(StreamQuery { stream: None }.stream_id().is_err());
        assert!(StreamQuery {
            stream: Some("nope".to_string())
        }
        .stream_id()
        .is_err());
    }

    #[tokio::test]
    async fn short_header_is_rejected() {
        let (status, _) = call(Some("abc")).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
    }
}
