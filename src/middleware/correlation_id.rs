use axum::{body::Body, extract::Request, http::HeaderValue, middleware::Next, response::Response};
use uuid::Uuid;

/// HTTP header carrying the correlation id in both directions
pub const CORRELATION_ID_HEADER: &str = "x-correlation-id";

/// Identifier tying together the logs and metrics of one request
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct CorrelationId(pub Uuid);

impl CorrelationId {
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }

    /// Parses a header value, accepting only UUIDs
    pub fn parse(value: &str) -> Option<Self> {
        Uuid::parse_str(value.trim()).ok().map(Self)
    }
}

impl Default for CorrelationId {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Display for CorrelationId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Correlation id supplied by the caller, kept for log cross-referencing only
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct ClientCorrelationId(pub Uuid);

/// Generates a fresh correlation id for every request, stores it in the
/// request extensions and returns it on the response.
///
/// A valid incoming `x-correlation-id` never replaces the generated id; it is
/// stored as a [`ClientCorrelationId`] and logged alongside it.
pub async fn correlation_id_middleware(mut request: Request, next: Next) -> Response {
    let correlation_id = CorrelationId::new();
    let client_id = request
        .headers()
        .get(CORRELATION_ID_HEADER)
        .and_then(|h| h.to_str().ok())
        .and_then(CorrelationId::parse)
        .map(|id| ClientCorrelationId(id.0));

    request.extensions_mut().insert(correlation_id);
    if let Some(client_id) = client_id {
        request.extensions_mut().insert(client_id);
    }

    let mut response = next.run(request).await;

    if let Ok(value) = HeaderValue::from_str(&correlation_id.to_string()) {
        response.headers_mut().insert(CORRELATION_ID_HEADER, value);
    }

    response
}

/// Span for `TraceLayer` carrying the correlation id
pub fn make_span_with_correlation_id(request: &Request<Body>) -> tracing::Span {
    let correlation_id = request
        .extensions()
        .get::<CorrelationId>()
        .map(|id| id.to_string())
        .unwrap_or_else(|| "unknown".to_string());

    let span = tracing::info_span!(
        "http_request",
        method = %request.method(),
        uri = %request.uri(),
        correlation_id = %correlation_id,
        client_correlation_id = tracing::field::Empty,
    );
    if let Some(client_id) = request.extensions().get::<ClientCorrelationId>() {
        span.record("client_correlation_id", tracing::field::display(client_id.0));
    }
    span
}
