use crate::error::ApiError;
use crate::pipeline::client_key;
use crate::state::AppState;
use axum::extract::{Request, State};
use axum::http::{header, HeaderMap};
use axum::middleware::Next;
use axum::response::Response;

/// Gate for mutating routes. The auth limiter is charged for every attempt
/// before the token is looked at, so a client guessing tokens ends up with
/// 429s instead of an endless stream of 401s.
pub async fn require_auth(
    State(state): State<AppState>,
    req: Request,
    next: Next,
) -> Result<Response, ApiError> {
    let client = client_key(&req);
    let path = req.uri().path().to_string();

    let attempts_left = match state.auth_limiter.consume(&client) {
        Ok(allowed) => allowed.remaining,
        Err(limited) => {
            let retry_after_secs = limited.retry_after_secs();
            tracing::warn!(ip = %client, path = %path, retry_after_secs, "Auth rate limit exceeded");
            crate::metrics::record_rate_limited("auth");
            return Err(ApiError::AuthRateLimited { retry_after_secs });
        }
    };

    let token = bearer_token(req.headers());
    let accepted = match (token, state.config.api_token.as_deref()) {
        (Some(presented), Some(expected)) => constant_time_eq(presented.as_bytes(), expected.as_bytes()),
        _ => false,
    };
    if !accepted {
        let user_agent = req
            .headers()
            .get(header::USER_AGENT)
            .and_then(|v| v.to_str().ok())
            .unwrap_or_default();
        tracing::warn!(ip = %client, path = %path, user_agent, has_token = token.is_some(), attempts_left, "Authentication failed");
        crate::metrics::record_auth_failure();
        return Err(ApiError::Unauthorized);
    }

    tracing::info!(ip = %client, path = %path, "Authentication successful");
    Ok(next.run(req).await)
}

/// Token after a case-sensitive `Bearer ` prefix, compared verbatim.
pub fn bearer_token(headers: &HeaderMap) -> Option<&str> {
    headers
        .get(header::AUTHORIZATION)?
        .to_str()
        .ok()?
        .strip_prefix("Bearer ")
        .filter(|token| !token.is_empty())
}

fn constant_time_eq(a: &[u8], b: &[u8]) -> bool {
    if a.len() != b.len() {
        return false;
    }
    a.iter().zip(b).fold(0u8, |diff, (x, y)| diff | (x ^ y)) == 0
}
