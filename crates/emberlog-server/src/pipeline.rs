//! Request gates shared by every route, outermost first:
//!
//! 1. security headers
//! 2. origin allow-list and CORS headers
//! 3. repeated query parameter collapse
//! 4. per-client rate limit
//! 5. body size limit
//!
//! Authentication, upload checks and schema validation are route specific and
//! live in `auth`, `upload` and the handlers.

use crate::error::ApiError;
use crate::state::AppState;
use axum::body::Body;
use axum::extract::{ConnectInfo, DefaultBodyLimit, Request, State};
use axum::http::header::{self, HeaderMap, HeaderName, HeaderValue};
use axum::http::{Method, Uri};
use axum::middleware::{from_fn, from_fn_with_state, Next};
use axum::response::Response;
use axum::Router;
use emberlog_core::origin::OriginPolicy;
use emberlog_core::query::{collapse_repeated_params, ARRAY_PARAMS};
use std::net::SocketAddr;
use std::time::Duration;
use tower::ServiceBuilder;
use tower_http::cors::{AllowOrigin, CorsLayer};
use tower_http::trace::TraceLayer;

const CONTENT_SECURITY_POLICY: &str = "default-src 'self';\
base-uri 'self';\
font-src 'self' https://fonts.gstatic.com;\
form-action 'self';\
frame-ancestors 'self';\
img-src 'self' data: https:;\
object-src 'none';\
script-src 'self';\
script-src-attr 'none';\
style-src 'self' 'unsafe-inline' https://fonts.googleapis.com;\
upgrade-insecure-requests";

pub const SECURITY_HEADERS: &[(&str, &str)] = &[
    ("content-security-policy", CONTENT_SECURITY_POLICY),
    ("cross-origin-opener-policy", "same-origin"),
    ("cross-origin-resource-policy", "same-origin"),
    ("origin-agent-cluster", "?1"),
    ("referrer-policy", "same-origin"),
    ("strict-transport-security", "max-age=31536000; includeSubDomains; preload"),
    ("x-content-type-options", "nosniff"),
    ("x-dns-prefetch-control", "off"),
    ("x-download-options", "noopen"),
    ("x-frame-options", "DENY"),
    ("x-permitted-cross-domain-policies", "none"),
    ("x-xss-protection", "0"),
];

/// Wraps `router` in the shared gates.
pub fn apply(router: Router, state: &AppState) -> Router {
    router.layer(
        ServiceBuilder::new()
            .layer(TraceLayer::new_for_http())
            .layer(from_fn(security_headers))
            .layer(from_fn_with_state(state.clone(), reject_foreign_origin))
            .layer(cors_layer(&state.config.origins))
            .layer(from_fn(collapse_polluted_query))
            .layer(from_fn_with_state(state.clone(), rate_limit))
            .layer(from_fn_with_state(state.clone(), limit_body))
            .layer(DefaultBodyLimit::max(state.config.body_limit)),
    )
}

pub fn insert_security_headers(headers: &mut HeaderMap) {
    for &(name, value) in SECURITY_HEADERS {
        headers.insert(
            HeaderName::from_static(name),
            HeaderValue::from_static(value),
        );
    }
}

async fn security_headers(req: Request, next: Next) -> Response {
    crate::metrics::record_request(req.method().as_str());
    let mut response = next.run(req).await;
    insert_security_headers(response.headers_mut());
    response
}

async fn reject_foreign_origin(
    State(state): State<AppState>,
    req: Request,
    next: Next,
) -> Result<Response, ApiError> {
    let origin = req
        .headers()
        .get(header::ORIGIN)
        .map(|v| v.to_str().unwrap_or_default().to_string());
    if !state.config.origins.allows(origin.as_deref()) {
        let origin = origin.unwrap_or_default();
        tracing::warn!(origin = %origin, allowed = ?state.config.origins.allowed(), "CORS origin blocked");
        crate::metrics::record_rejection("cors");
        return Err(ApiError::OriginNotAllowed(origin));
    }
    Ok(next.run(req).await)
}

pub fn cors_layer(origins: &OriginPolicy) -> CorsLayer {
    let allowed: Vec<HeaderValue> = origins
        .allowed()
        .iter()
        .filter_map(|origin| match HeaderValue::from_str(origin) {
            Ok(value) => Some(value),
            Err(_) => {
                tracing::warn!(origin = %origin, "Ignoring unparseable CORS origin");
                None
            }
        })
        .collect();

    CorsLayer::new()
        .allow_origin(AllowOrigin::list(allowed))
        .allow_credentials(true)
        .allow_methods([
            Method::GET,
            Method::POST,
            Method::PUT,
            Method::DELETE,
            Method::PATCH,
            Method::OPTIONS,
        ])
        .allow_headers([
            header::ORIGIN,
            HeaderName::from_static("x-requested-with"),
            header::CONTENT_TYPE,
            header::ACCEPT,
            header::AUTHORIZATION,
            header::CACHE_CONTROL,
        ])
        .max_age(Duration::from_secs(86_400))
}

async fn collapse_polluted_query(mut req: Request, next: Next) -> Response {
    if let Some(uri) = collapsed_uri(req.uri()) {
        tracing::debug!(from = %req.uri(), to = %uri, "Collapsed repeated query parameters");
        *req.uri_mut() = uri;
    }
    next.run(req).await
}

fn collapsed_uri(uri: &Uri) -> Option<Uri> {
    let query = uri.query()?;
    let collapsed = collapse_repeated_params(query, ARRAY_PARAMS)?;
    let path_and_query = if collapsed.is_empty() {
        uri.path().to_string()
    } else {
        format!("{}?{}", uri.path(), collapsed)
    };

    let mut parts = uri.clone().into_parts();
    parts.path_and_query = Some(path_and_query.parse().ok()?);
    Uri::from_parts(parts).ok()
}

/// Rate-limit key for a request: the peer IP, or `unknown` when the
/// connection info is not available.
pub fn client_key(req: &Request) -> String {
    req.extensions()
        .get::<ConnectInfo<SocketAddr>>()
        .map(|ConnectInfo(addr)| addr.ip().to_string())
        .unwrap_or_else(|| "unknown".to_string())
}

async fn rate_limit(
    State(state): State<AppState>,
    req: Request,
    next: Next,
) -> Result<Response, ApiError> {
    let client = client_key(&req);
    match state.general_limiter.consume(&client) {
        Ok(allowed) => {
            tracing::trace!(ip = %client, remaining = allowed.remaining, "Rate limit consumed");
            Ok(next.run(req).await)
        }
        Err(limited) => {
            let retry_after_secs = limited.retry_after_secs();
            tracing::warn!(ip = %client, path = %req.uri().path(), retry_after_secs, "Rate limit exceeded");
            crate::metrics::record_rate_limited("general");
            Err(ApiError::RateLimited { retry_after_secs })
        }
    }
}

fn is_multipart(headers: &HeaderMap) -> bool {
    headers
        .get(header::CONTENT_TYPE)
        .and_then(|v| v.to_str().ok())
        .map(|v| v.trim_start().to_ascii_lowercase().starts_with("multipart/"))
        .unwrap_or(false)
}

/// Buffers non-multipart bodies up to the configured cap. Multipart bodies
/// are streamed by the upload stage, which enforces its own per-part limits.
async fn limit_body(
    State(state): State<AppState>,
    req: Request,
    next: Next,
) -> Result<Response, ApiError> {
    if is_multipart(req.headers()) {
        return Ok(next.run(req).await);
    }

    let limit = state.config.body_limit;
    let declared = req
        .headers()
        .get(header::CONTENT_LENGTH)
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.parse::<usize>().ok());
    if declared.map(|len| len > limit).unwrap_or(false) {
        return Err(body_too_large(&req, limit));
    }

    let (parts, body) = req.into_parts();
    let bytes = match axum::body::to_bytes(body, limit).await {
        Ok(bytes) => bytes,
        Err(_) => {
            let req = Request::from_parts(parts, Body::empty());
            return Err(body_too_large(&req, limit));
        }
    };
    Ok(next.run(Request::from_parts(parts, Body::from(bytes))).await)
}

fn body_too_large(req: &Request, limit: usize) -> ApiError {
    tracing::warn!(ip = %client_key(req), path = %req.uri().path(), limit, "Request body too large");
    crate::metrics::record_rejection("body_size");
    ApiError::BodyTooLarge { limit }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_security_headers_cover_required_set() {
        let mut headers = HeaderMap::new();
        insert_security_headers(&mut headers);

        assert_eq!(headers["x-content-type-options"], "nosniff");
        assert_eq!(headers["x-frame-options"], "DENY");
        assert_eq!(headers["x-xss-protection"], "0");
        assert_eq!(headers["referrer-policy"], "same-origin");
        assert!(headers["strict-transport-security"]
            .to_str()
            .unwrap()
            .starts_with("max-age=31536000"));
        assert!(headers["content-security-policy"]
            .to_str()
            .unwrap()
            .contains("object-src 'none'"));
    }

    #[test]
    fn test_collapsed_uri() {
        let uri: Uri = "/api/incidents?q=a&q=b&sort=x&sort=y".parse().unwrap();
        let collapsed = collapsed_uri(&uri).unwrap();
        assert_eq!(collapsed.path(), "/api/incidents");
        assert_eq!(collapsed.query(), Some("q=b&sort=x&sort=y"));

        let clean: Uri = "/api/incidents?q=a".parse().unwrap();
        assert!(collapsed_uri(&clean).is_none());
    }

    #[tokio::test]
    async fn test_handler_sees_collapsed_query() {
        use crate::config::AppConfig;
        use crate::store::IncidentStore;
        use axum::routing::get;
        use tower::ServiceExt;

        let dir = tempfile::tempdir().unwrap();
        let store = IncidentStore::open(dir.path().join("incidents.json")).await;
        let state = AppState::new(AppConfig::default(), store);
        let echo = Router::new().route("/echo", get(|uri: Uri| async move { uri.to_string() }));
        let app = apply(echo, &state);

        let req = axum::http::Request::builder()
            .uri("/echo?q=a&sort=x&q=b&sort=y")
            .body(Body::empty())
            .unwrap();
        let response = app.oneshot(req).await.unwrap();
        let bytes = axum::body::to_bytes(response.into_body(), usize::MAX).await.unwrap();
        assert_eq!(&bytes[..], b"/echo?sort=x&q=b&sort=y");
    }

    #[test]
    fn test_multipart_detection() {
        let mut headers = HeaderMap::new();
        assert!(!is_multipart(&headers));
        headers.insert(
            header::CONTENT_TYPE,
            HeaderValue::from_static("multipart/form-data; boundary=x"),
        );
        assert!(is_multipart(&headers));
        headers.insert(header::CONTENT_TYPE, HeaderValue::from_static("application/json"));
        assert!(!is_multipart(&headers));
    }
}
