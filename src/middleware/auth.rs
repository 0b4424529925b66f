use crate::handlers::auth::verify_token;
use crate::models::auth::ErrorResponse;
use crate::AppState;
use axum::{
    extract::Request,
    http::{HeaderMap, StatusCode},
    middleware::Next,
    response::{IntoResponse, Json, Response},
    Extension,
};
use std::sync::Arc;

/// Reads a named cookie from the request headers.
///
/// Also used by the WebSocket upgrade handler, which authenticates from the
/// cookie itself because browsers cannot attach headers to socket requests.
pub fn cookie_value(headers: &HeaderMap, name: &str) -> Option<String> {
    for header in headers.get_all("cookie") {
        let Ok(raw) = header.to_str() else { continue };
        for pair in raw.split(';') {
            if let Some((key, value)) = pair.trim().split_once('=') {
                if key == name {
                    return Some(value.to_string());
                }
            }
        }
    }
    None
}

pub async fn auth_middleware(
    Extension(state): Extension<Arc<AppState>>,
    headers: HeaderMap,
    mut request: Request,
    next: Next,
) -> Result<Response, impl IntoResponse> {
    let token = match cookie_value(&headers, "access_token") {
        Some(token) => token,
        None => {
            return Err((
                StatusCode::UNAUTHORIZED,
                Json(ErrorResponse {
                    success: false,
                    message: "No access token".to_string(),
                }),
            ));
        }
    };

    let claims = match verify_token(&token, &state.settings.jwt_secret) {
        Some(claims) => claims,
        None => {
            return Err((
                StatusCode::UNAUTHORIZED,
                Json(ErrorResponse {
                    success: false,
                    message: "Invalid token".to_string(),
                }),
            ));
        }
    };

    // Make the claims available to handlers behind this layer.
    request.extensions_mut().insert(claims);

    Ok(next.run(request).await)
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::HeaderValue;

    #[test]
    fn test_reads_named_cookie_among_many() {
        let mut headers = HeaderMap::new();
        headers.insert(
            "cookie",
            HeaderValue::from_static("refresh_token=abc; access_token=xyz; theme=dark"),
        );

        assert_eq!(
            cookie_value(&headers, "access_token").as_deref(),
            Some("xyz")
        );
        assert_eq!(
            cookie_value(&headers, "refresh_token").as_deref(),
            Some("abc")
        );
    }

    #[test]
    fn test_missing_cookie_is_none() {
        let mut headers = HeaderMap::new();
        headers.insert("cookie", HeaderValue::from_static("theme=dark"));

        assert_eq!(cookie_value(&headers, "access_token"), None);
        assert_eq!(cookie_value(&HeaderMap::new(), "access_token"), None);
    }

    #[test]
    fn test_cookie_values_may_contain_equals_signs() {
        let mut headers = HeaderMap::new();
        headers.insert("cookie", HeaderValue::from_static("access_token=a=b=c"));

        assert_eq!(
            cookie_value(&headers, "access_token").as_deref(),
            Some("a=b=c")
        );
    }

    #[test]
    fn test_multiple_cookie_headers_are_searched() {
        let mut headers = HeaderMap::new();
        headers.append("cookie", HeaderValue::from_static("theme=dark"));
        headers.append("cookie", HeaderValue::from_static("access_token=xyz"));

        assert_eq!(
            cookie_value(&headers, "access_token").as_deref(),
            Some("xyz")
        );
    }
}
